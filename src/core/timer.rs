use crate::domain::ports::AutoSubmitListener;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Cancelled,
    Fired,
}

/// tick 的下限；`tokio::time::interval` 不接受零
const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownSchedule {
    pub duration: Duration,
    pub tick: Duration,
}

impl Default for CountdownSchedule {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(2500),
            tick: Duration::from_millis(1000),
        }
    }
}

impl CountdownSchedule {
    pub fn from_millis(duration_ms: u64, tick_ms: u64) -> Self {
        Self {
            duration: Duration::from_millis(duration_ms),
            tick: Duration::from_millis(tick_ms),
        }
    }
}

/// 剩餘秒數無條件進位，例如 2.5 秒顯示 3
pub fn remaining_whole_secs(remaining: Duration) -> u64 {
    let millis = remaining.as_millis() as u64;
    millis.div_ceil(1000)
}

struct TimerInner {
    state: TimerState,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// 單次倒數：Idle → Running → {Cancelled, Fired}。
/// 同一時間最多只有一個倒數在跑，重新 arm 會先取消舊的。
#[derive(Clone)]
pub struct AutoSubmitTimer {
    inner: Arc<Mutex<TimerInner>>,
}

impl Default for AutoSubmitTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoSubmitTimer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TimerInner {
                state: TimerState::Idle,
                generation: 0,
                task: None,
            })),
        }
    }

    pub fn state(&self) -> TimerState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 啟動倒數；到期時先通知 listener 再執行 `on_fire`
    pub fn arm<F, Fut>(
        &self,
        schedule: CountdownSchedule,
        listener: Arc<dyn AutoSubmitListener>,
        on_fire: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.lock();
        if let Some(previous) = inner.task.take() {
            tracing::debug!("Re-arming auto-submit, dropping previous countdown");
            previous.abort();
        }

        inner.generation += 1;
        inner.state = TimerState::Running;
        let generation = inner.generation;
        let shared = Arc::clone(&self.inner);

        inner.task = Some(tokio::spawn(async move {
            let deadline = Instant::now() + schedule.duration;
            let mut ticker = tokio::time::interval(schedule.tick.max(MIN_TICK));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = tokio::time::sleep_until(deadline) => break,
                    _ = ticker.tick() => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        listener.on_tick(remaining_whole_secs(remaining));
                    }
                }
            }

            {
                let mut inner = shared.lock().unwrap_or_else(|e| e.into_inner());
                if inner.generation != generation || inner.state != TimerState::Running {
                    return;
                }
                inner.state = TimerState::Fired;
                inner.task = None;
            }

            tracing::debug!("Auto-submit countdown expired");
            listener.on_fired();
            on_fire().await;
        }));
    }

    /// 取消進行中的倒數。回傳是否真的取消了什麼（可重複呼叫）。
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != TimerState::Running {
            return false;
        }
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.state = TimerState::Cancelled;
        tracing::debug!("Auto-submit countdown cancelled");
        true
    }
}

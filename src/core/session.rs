use crate::adapters::http::{build_client, HttpSettings};
use crate::core::submission::SubmissionController;
use crate::core::timer::{AutoSubmitTimer, CountdownSchedule, TimerState};
use crate::domain::model::{keys, Credentials, Outcome};
use crate::domain::ports::{AutoSubmitListener, CredentialStore};
use crate::utils::error::Result;
use crate::utils::validation::validate_endpoint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// 語音結果進來後自動倒數送出
    pub auto_submit: bool,
    pub schedule: CountdownSchedule,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_submit: true,
            schedule: CountdownSchedule::default(),
        }
    }
}

/// 快速新增畫面的狀態：輸入文字、送出按鈕是否可用、自動送出倒數。
/// 平台 UI 只需要把事件轉成這裡的方法呼叫。
pub struct QuickAddSession<S: CredentialStore> {
    controller: SubmissionController<S>,
    timer: AutoSubmitTimer,
    listener: Arc<dyn AutoSubmitListener>,
    options: SessionOptions,
    text: Mutex<String>,
    trigger_enabled: AtomicBool,
}

impl<S: CredentialStore> QuickAddSession<S> {
    pub fn new(
        controller: SubmissionController<S>,
        options: SessionOptions,
        listener: Arc<dyn AutoSubmitListener>,
    ) -> Arc<Self> {
        Arc::new(Self {
            controller,
            timer: AutoSubmitTimer::new(),
            listener,
            options,
            text: Mutex::new(String::new()),
            trigger_enabled: AtomicBool::new(true),
        })
    }

    /// 從憑證儲存載入一次憑證並建立 session
    pub async fn open(
        store: S,
        http: &HttpSettings,
        options: SessionOptions,
        listener: Arc<dyn AutoSubmitListener>,
    ) -> Result<Arc<Self>> {
        let credentials = Credentials::load(&store).await?;
        if let Some(endpoint) = credentials.endpoint.as_deref() {
            validate_endpoint(keys::ENDPOINT, endpoint)?;
        }
        let client = build_client(http)?;
        let controller = SubmissionController::new(client, store, credentials.into_shared());
        Ok(Self::new(controller, options, listener))
    }

    pub fn text(&self) -> String {
        self.text.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_trigger_enabled(&self) -> bool {
        self.trigger_enabled.load(Ordering::SeqCst)
    }

    pub fn timer_state(&self) -> TimerState {
        self.timer.state()
    }

    /// 使用者手動編輯：取消進行中的倒數
    pub fn set_text(&self, text: impl Into<String>) {
        *self.text.lock().unwrap_or_else(|e| e.into_inner()) = text.into();
        if self.timer.cancel() {
            self.listener.on_cancelled();
        }
    }

    /// 語音辨識結果接在現有文字後面（以空白分隔），必要時重新開始倒數
    pub fn append_voice(self: &Arc<Self>, spoken: &str) {
        let spoken = spoken.trim();
        if spoken.is_empty() {
            return;
        }

        {
            let mut text = self.text.lock().unwrap_or_else(|e| e.into_inner());
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(spoken);
        }

        if self.options.auto_submit {
            self.arm_auto_submit();
        }
    }

    /// 開始（或重新開始）自動送出倒數。到期時 session 已釋放則什麼都不做。
    pub fn arm_auto_submit(self: &Arc<Self>) {
        let session = Arc::downgrade(self);
        self.timer
            .arm(self.options.schedule, self.listener.clone(), move || async move {
                match session.upgrade() {
                    Some(session) => {
                        session.submit().await;
                    }
                    None => tracing::debug!("Auto-submit fired after session was closed"),
                }
            });
    }

    /// 以目前輸入送出。送出進行中再次觸發會被忽略。
    pub async fn submit(&self) -> Outcome {
        if !self.is_trigger_enabled() {
            tracing::debug!("Submit ignored, a submission is already in flight");
            return Outcome::Ignored;
        }

        // 重送時沿用這裡組好的請求，不再重新讀取輸入
        let text = self.text();
        let request = match self.controller.prepare(&text).await {
            Ok(request) => request,
            Err(e) => return self.report(Outcome::Failed(e)),
        };

        self.timer.cancel();
        if self
            .trigger_enabled
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Submit ignored, a submission is already in flight");
            return Outcome::Ignored;
        }

        let outcome = Outcome::from(self.controller.dispatch(request, false).await);
        if outcome.is_success() {
            self.text.lock().unwrap_or_else(|e| e.into_inner()).clear();
        }
        self.trigger_enabled.store(true, Ordering::SeqCst);
        self.report(outcome)
    }

    fn report(&self, outcome: Outcome) -> Outcome {
        match &outcome {
            Outcome::Success(submitted) => {
                tracing::info!("Task saved (retried: {})", submitted.retried)
            }
            Outcome::Failed(e) if e.is_auth_failure() => {
                tracing::warn!("Task not saved: {} (open the main app to sync login)", e)
            }
            Outcome::Failed(e) => tracing::warn!("Task not saved: {}", e),
            Outcome::Ignored => {}
        }
        self.listener.on_outcome(&outcome);
        outcome
    }
}

/// 畫面關閉時停止倒數，之後不再有任何 UI 通知
impl<S: CredentialStore> Drop for QuickAddSession<S> {
    fn drop(&mut self) {
        if self.timer.cancel() {
            tracing::debug!("Session closed, pending auto-submit dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryCredentialStore;
    use crate::domain::ports::NoopListener;
    use crate::utils::error::SubmitError;
    use httpmock::prelude::*;

    fn session_for(server: &MockServer, options: SessionOptions) -> Arc<QuickAddSession<MemoryCredentialStore>> {
        let credentials = Credentials {
            endpoint: Some(server.base_url()),
            api_key: Some("anon".to_string()),
            access_token: Some("A".to_string()),
            refresh_token: Some("R".to_string()),
            user_id: Some("u1".to_string()),
        };
        let client = build_client(&HttpSettings::default()).unwrap();
        let controller =
            SubmissionController::new(client, MemoryCredentialStore::new(), credentials.into_shared());
        QuickAddSession::new(controller, options, Arc::new(NoopListener))
    }

    #[test]
    fn test_voice_results_are_space_joined() {
        let server = MockServer::start();
        let session = session_for(
            &server,
            SessionOptions {
                auto_submit: false,
                ..Default::default()
            },
        );

        session.append_voice("buy");
        session.append_voice("  milk ");
        session.append_voice("");
        assert_eq!(session.text(), "buy milk");
        assert_eq!(session.timer_state(), TimerState::Idle);
    }

    #[tokio::test]
    async fn test_success_clears_text_and_reenables_trigger() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/rest/v1/tasks");
            then.status(201);
        });

        let session = session_for(&server, SessionOptions::default());
        session.set_text("buy milk");

        let outcome = session.submit().await;
        assert!(outcome.is_success());
        assert_eq!(session.text(), "");
        assert!(session.is_trigger_enabled());
    }

    #[tokio::test]
    async fn test_failure_keeps_text_and_reenables_trigger() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/rest/v1/tasks");
            then.status(503);
        });

        let session = session_for(&server, SessionOptions::default());
        session.set_text("buy milk");

        assert_eq!(
            session.submit().await,
            Outcome::Failed(SubmitError::ServerError(503))
        );
        assert_eq!(session.text(), "buy milk");
        assert!(session.is_trigger_enabled());
    }

    #[tokio::test]
    async fn test_second_trigger_while_in_flight_is_ignored() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/rest/v1/tasks");
            then.status(201).delay(std::time::Duration::from_millis(200));
        });

        let session = session_for(&server, SessionOptions::default());
        session.set_text("buy milk");

        let (first, second) = tokio::join!(session.submit(), async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            session.submit().await
        });

        assert!(first.is_success());
        assert_eq!(second, Outcome::Ignored);
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_manual_submit_cancels_running_countdown() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/rest/v1/tasks");
            then.status(201);
        });

        let session = session_for(
            &server,
            SessionOptions {
                auto_submit: true,
                schedule: CountdownSchedule::from_millis(300, 100),
            },
        );
        session.append_voice("buy milk");
        assert_eq!(session.timer_state(), TimerState::Running);

        assert!(session.submit().await.is_success());
        assert_eq!(session.timer_state(), TimerState::Cancelled);

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        mock.assert_hits(1);
    }
}

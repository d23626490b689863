use clap::Parser;
use quick_add::utils::error::ErrorSeverity;
use quick_add::utils::{logger, validation::Validate};
use quick_add::{
    AutoSubmitListener, CliConfig, FileCredentialStore, Outcome, QuickAddError, QuickAddSession,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// 終端機版的 UI：顯示倒數並把最終結果交回 main
struct ConsoleListener {
    outcomes: mpsc::UnboundedSender<Outcome>,
}

impl AutoSubmitListener for ConsoleListener {
    fn on_tick(&self, remaining_secs: u64) {
        println!("⏳ Sending in {}...", remaining_secs);
    }

    fn on_fired(&self) {
        println!("📤 Sending...");
    }

    fn on_cancelled(&self) {
        println!("Send");
    }

    fn on_outcome(&self, outcome: &Outcome) {
        let _ = self.outcomes.send(outcome.clone());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_logger(cli.log_format, cli.verbose);

    tracing::info!("Starting quick-add");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = Arc::new(ConsoleListener { outcomes: tx });
    let store = FileCredentialStore::new(&config.credentials.path, &config.credentials.namespace);

    let session = match QuickAddSession::open(
        store,
        &config.http,
        config.session_options(),
        listener,
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("❌ Failed to open session: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    if let Some(text) = &cli.text {
        session.set_text(text.as_str());
    }
    for spoken in &cli.voice {
        session.append_voice(spoken);
    }

    // 語音觸發了倒數就等它自己送出，否則立即送出
    let outcome = if session.timer_state() == quick_add::TimerState::Running {
        rx.recv().await.unwrap_or(Outcome::Ignored)
    } else {
        session.submit().await
    };

    match outcome {
        Outcome::Success(submitted) => {
            println!("✅ Task Saved! \"{}\"", submitted.request.title);
        }
        Outcome::Ignored => {
            println!("A submission is already in progress");
        }
        Outcome::Failed(e) => {
            let e = QuickAddError::from(e);
            tracing::error!(
                "❌ Submission failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

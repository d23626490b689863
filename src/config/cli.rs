use crate::config::toml_config::AppConfig;
use crate::utils::logger::LogFormat;
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "quick-add")]
#[command(about = "Quickly add a task to your backend, with optional dictated text and auto-submit")]
pub struct CliConfig {
    /// Task title typed by the user
    pub text: Option<String>,

    #[arg(short, long, default_value = "quick-add.toml")]
    pub config: String,

    /// Override the credentials file from the config
    #[arg(long)]
    pub credentials: Option<String>,

    /// Recognised speech to append to the title (repeatable)
    #[arg(long)]
    pub voice: Vec<String>,

    /// Force auto-submit countdown on or off
    #[arg(long)]
    pub auto_submit: Option<bool>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

impl CliConfig {
    /// 讀取設定檔並套用命令列覆寫
    pub fn resolve(&self) -> crate::utils::error::Result<AppConfig> {
        let mut config = AppConfig::from_file(&self.config)?;
        if let Some(path) = &self.credentials {
            config.credentials.path = path.clone();
        }
        if let Some(enabled) = self.auto_submit {
            config.auto_submit.enabled = enabled;
        }
        Ok(config)
    }
}

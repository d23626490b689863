use crate::adapters::http::HttpSettings;
use crate::adapters::storage::DEFAULT_NAMESPACE;
use crate::core::session::SessionOptions;
use crate::core::timer::CountdownSchedule;
use crate::utils::error::{QuickAddError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_path, validate_range, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub credentials: CredentialsConfig,
    pub http: HttpSettings,
    pub auto_submit: AutoSubmitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub path: String,
    pub namespace: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: "./credentials.toml".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSubmitConfig {
    pub enabled: bool,
    pub delay_ms: u64,
    pub tick_ms: u64,
}

impl Default for AutoSubmitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 2500,
            tick_ms: 1000,
        }
    }
}

impl AppConfig {
    /// 從 TOML 檔案載入配置，檔案不存在時使用預設值
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(QuickAddError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| QuickAddError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${QUICK_ADD_CREDENTIALS})，找不到的變數保留原樣
    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        use std::sync::OnceLock;

        static ENV_VAR: OnceLock<Regex> = OnceLock::new();
        let re = ENV_VAR
            .get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .to_string()
    }

    pub fn schedule(&self) -> CountdownSchedule {
        CountdownSchedule::from_millis(self.auto_submit.delay_ms, self.auto_submit.tick_ms)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            auto_submit: self.auto_submit.enabled,
            schedule: self.schedule(),
        }
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validate_path("credentials.path", &self.credentials.path)?;
        validate_non_empty_string("credentials.namespace", &self.credentials.namespace)?;

        validate_range("http.connect_timeout_ms", self.http.connect_timeout_ms, 1, 120_000)?;
        validate_range("http.write_timeout_ms", self.http.write_timeout_ms, 1, 120_000)?;
        validate_range("http.read_timeout_ms", self.http.read_timeout_ms, 1, 120_000)?;

        validate_range("auto_submit.delay_ms", self.auto_submit.delay_ms, 100, 60_000)?;
        validate_range("auto_submit.tick_ms", self.auto_submit.tick_ms, 50, 10_000)?;

        Ok(())
    }
}

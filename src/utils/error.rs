use thiserror::Error;

/// 單次送出流程可能回報給呼叫端的結果錯誤。
///
/// 需要 `Clone`：同一次 token 刷新的結果會分享給所有併發等待者。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Task title is empty")]
    EmptyInput,

    #[error("Credentials missing: {}", .fields.join(", "))]
    MissingCredentials { fields: Vec<String> },

    #[error("Access denied by backend")]
    AccessDenied,

    #[error("Session expired: {cause}")]
    SessionExpired { cause: Box<SubmitError> },

    #[error("Backend returned HTTP {0}")]
    ServerError(u16),

    #[error("Token refresh rejected with HTTP {0}")]
    RefreshRejected(u16),

    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("A token refresh is already in progress")]
    RefreshAlreadyInProgress,

    #[error("Credential store error: {0}")]
    CredentialStore(String),
}

impl SubmitError {
    pub fn missing(fields: &[&str]) -> Self {
        SubmitError::MissingCredentials {
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// 是否屬於授權類失敗（需要使用者回主程式重新登入）
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            SubmitError::AccessDenied
                | SubmitError::SessionExpired { .. }
                | SubmitError::RefreshRejected(_)
                | SubmitError::MissingCredentials { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum QuickAddError {
    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWriteError(#[from] toml::ser::Error),

    #[error("Submission failed: {0}")]
    Submit(#[from] SubmitError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Authentication,
    Network,
    Backend,
    Storage,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl QuickAddError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            QuickAddError::HttpClientError(_) => ErrorCategory::Network,
            QuickAddError::IoError(_) | QuickAddError::TomlWriteError(_) => ErrorCategory::Storage,
            QuickAddError::TomlError(_)
            | QuickAddError::ConfigError { .. }
            | QuickAddError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            QuickAddError::Submit(e) => match e {
                SubmitError::EmptyInput => ErrorCategory::Input,
                SubmitError::NetworkError(_) => ErrorCategory::Network,
                SubmitError::ServerError(_) | SubmitError::MalformedResponse(_) => {
                    ErrorCategory::Backend
                }
                SubmitError::CredentialStore(_) => ErrorCategory::Storage,
                _ => ErrorCategory::Authentication,
            },
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            QuickAddError::Submit(SubmitError::EmptyInput) => ErrorSeverity::Low,
            QuickAddError::Submit(SubmitError::NetworkError(_))
            | QuickAddError::Submit(SubmitError::ServerError(_))
            | QuickAddError::Submit(SubmitError::RefreshAlreadyInProgress) => ErrorSeverity::Medium,
            QuickAddError::Submit(_) => ErrorSeverity::High,
            _ => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            QuickAddError::Submit(SubmitError::EmptyInput) => "Enter a task name".to_string(),
            QuickAddError::Submit(SubmitError::MissingCredentials { .. }) => {
                "Credentials missing. Open the app to sync your login.".to_string()
            }
            QuickAddError::Submit(SubmitError::AccessDenied) => {
                "The server refused this request.".to_string()
            }
            QuickAddError::Submit(SubmitError::SessionExpired { .. }) => {
                "Your session has expired.".to_string()
            }
            QuickAddError::Submit(SubmitError::ServerError(code)) => format!("Error: {}", code),
            QuickAddError::Submit(SubmitError::NetworkError(msg)) => {
                format!("Network Error: {}", msg)
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Input => "Type or dictate a task title and try again",
            ErrorCategory::Authentication => "Open the main app and sign in again to sync credentials",
            ErrorCategory::Network => "Check your connection and retry",
            ErrorCategory::Backend => "Retry later; the backend may be unavailable",
            ErrorCategory::Storage => "Check permissions of the credentials file",
            ErrorCategory::Configuration => "Fix the configuration file and run again",
        }
    }
}

pub type Result<T> = std::result::Result<T, QuickAddError>;

use crate::utils::error::SubmitError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// 憑證儲存區中使用的鍵名，由主程式在登入時寫入
pub mod keys {
    pub const ENDPOINT: &str = "supabase_url";
    pub const API_KEY: &str = "supabase_key";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER_ID: &str = "user_id";
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user_id: Option<String>,
}

/// refresher 與 controller 共用的同一份憑證
pub type SharedCredentials = Arc<RwLock<Credentials>>;

impl Credentials {
    pub fn into_shared(self) -> SharedCredentials {
        Arc::new(RwLock::new(self))
    }

    /// 送出任務所需但目前缺少的欄位
    pub fn missing_for_submit(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.endpoint.is_none() {
            missing.push(keys::ENDPOINT);
        }
        if self.access_token.is_none() {
            missing.push(keys::ACCESS_TOKEN);
        }
        if self.user_id.is_none() {
            missing.push(keys::USER_ID);
        }
        missing
    }

    pub fn can_refresh(&self) -> bool {
        self.endpoint.is_some() && self.refresh_token.is_some()
    }

    /// 端點去掉結尾斜線後再串接 API 路徑
    pub fn url_for(&self, path: &str) -> Option<String> {
        self.endpoint
            .as_deref()
            .map(|base| format!("{}{}", base.trim_end_matches('/'), path))
    }

    pub(crate) fn apply(&mut self, tokens: &TokenPair) {
        self.access_token = Some(tokens.access_token.clone());
        self.refresh_token = Some(tokens.refresh_token.clone());
    }
}

/// 寫入 `tasks` 資料表的單筆任務
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub title: String,
    pub user_id: String,
    pub created_at: String,
}

impl TaskRequest {
    pub fn new(title: impl Into<String>, user_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            user_id: user_id.into(),
            created_at: format_timestamp(at),
        }
    }
}

/// `YYYY-MM-DDTHH:mm:ss.SSSZ`，固定 UTC、毫秒精度
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshBody<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// 成功送出的結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub request: TaskRequest,
    /// 是否經過一次 token 刷新後重送
    pub retried: bool,
}

/// 一次送出觸發的最終結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(Submitted),
    Failed(SubmitError),
    /// 已有送出進行中，這次觸發被忽略
    Ignored,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

impl From<std::result::Result<Submitted, SubmitError>> for Outcome {
    fn from(result: std::result::Result<Submitted, SubmitError>) -> Self {
        match result {
            Ok(submitted) => Outcome::Success(submitted),
            Err(e) => Outcome::Failed(e),
        }
    }
}

use crate::adapters::http::{self, StatusClass};
use crate::core::refresh::TokenRefresher;
use crate::domain::model::{SharedCredentials, Submitted, TaskRequest};
use crate::domain::ports::CredentialStore;
use crate::utils::error::SubmitError;
use chrono::Utc;
use reqwest::Client;

pub const TASKS_PATH: &str = "/rest/v1/tasks";

pub type SubmitResult = std::result::Result<Submitted, SubmitError>;

/// 驗證、組請求、送出，遇到 401/403 時刷新 token 並重送一次
pub struct SubmissionController<S: CredentialStore> {
    client: Client,
    credentials: SharedCredentials,
    refresher: TokenRefresher<S>,
}

impl<S: CredentialStore> SubmissionController<S> {
    /// refresher 與 controller 共用同一份憑證與 client
    pub fn new(client: Client, store: S, credentials: SharedCredentials) -> Self {
        let refresher = TokenRefresher::new(client.clone(), store, credentials.clone());
        Self {
            client,
            credentials,
            refresher,
        }
    }

    pub async fn submit(&self, text: &str) -> SubmitResult {
        let request = self.prepare(text).await?;
        self.dispatch(request, false).await
    }

    /// 不發任何網路請求：修剪輸入並確認憑證齊全
    pub async fn prepare(&self, text: &str) -> std::result::Result<TaskRequest, SubmitError> {
        let title = text.trim();
        if title.is_empty() {
            return Err(SubmitError::EmptyInput);
        }

        let credentials = self.credentials.read().await;
        let missing = credentials.missing_for_submit();
        if !missing.is_empty() {
            tracing::warn!("Cannot submit, credentials missing: {:?}", missing);
            return Err(SubmitError::missing(&missing));
        }

        let user_id = credentials.user_id.clone().unwrap_or_default();
        Ok(TaskRequest::new(title, user_id, Utc::now()))
    }

    /// 送出已建立的請求。重送沿用同一個 `TaskRequest`，只換掉 access token。
    pub async fn dispatch(&self, request: TaskRequest, is_retry: bool) -> SubmitResult {
        let mut is_retry = is_retry;

        loop {
            let credentials = self.credentials.read().await.clone();
            let (url, access_token) = match (
                credentials.url_for(TASKS_PATH),
                credentials.access_token.as_deref(),
            ) {
                (Some(url), Some(token)) => (url, token.to_string()),
                _ => return Err(SubmitError::missing(&credentials.missing_for_submit())),
            };

            let bearer = format!("Bearer {}", access_token);
            let mut headers = vec![
                ("Authorization", bearer.as_str()),
                ("Prefer", "return=minimal"),
            ];
            if let Some(key) = credentials.api_key.as_deref() {
                headers.push(("apikey", key));
            }

            tracing::debug!(
                "Posting task (retry: {}, {} chars)",
                is_retry,
                request.title.chars().count()
            );
            let reply = http::post_json(&self.client, &url, &headers, &request)
                .await
                .inspect_err(|e| tracing::warn!("Task submission transport failure: {}", e))?;

            match reply.class() {
                StatusClass::Success => {
                    tracing::info!("✅ Task saved");
                    return Ok(Submitted {
                        request,
                        retried: is_retry,
                    });
                }
                StatusClass::AuthRejected if !is_retry && credentials.can_refresh() => {
                    tracing::info!(
                        "Backend rejected access token (HTTP {}), refreshing once",
                        reply.status
                    );
                    // 另一個送出已經換過 token 時直接用新的重送
                    let rotated = self.credentials.read().await.access_token.as_deref()
                        != Some(access_token.as_str());
                    if rotated {
                        tracing::debug!("Access token already rotated, retrying without refresh");
                    } else if let Err(cause) = self.refresher.refresh().await {
                        tracing::warn!("Token refresh failed: {}", cause);
                        return Err(SubmitError::SessionExpired {
                            cause: Box::new(cause),
                        });
                    }
                    is_retry = true;
                }
                StatusClass::AuthRejected => {
                    tracing::warn!("Access denied (HTTP {}), retried: {}", reply.status, is_retry);
                    return Err(SubmitError::AccessDenied);
                }
                StatusClass::Other(code) => {
                    tracing::error!("Error posting task: HTTP {}: {}", code, reply.body);
                    return Err(SubmitError::ServerError(code));
                }
            }
        }
    }
}

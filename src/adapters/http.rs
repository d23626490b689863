use crate::utils::error::{Result, SubmitError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            write_timeout_ms: 10_000,
            read_timeout_ms: 10_000,
        }
    }
}

impl HttpSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// reqwest 沒有獨立的寫入逾時，以三段總和作為整體上限，確保請求不會無限掛起
    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(
            self.connect_timeout_ms + self.write_timeout_ms + self.read_timeout_ms,
        )
    }
}

/// 送出與刷新共用同一個 client，逾時設定一致
pub fn build_client(settings: &HttpSettings) -> Result<Client> {
    let client = Client::builder()
        .connect_timeout(settings.connect_timeout())
        .read_timeout(settings.read_timeout())
        .timeout(settings.total_timeout())
        .build()?;
    Ok(client)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    AuthRejected,
    Other(u16),
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        401 | 403 => StatusClass::AuthRejected,
        code => StatusClass::Other(code),
    }
}

#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    pub fn class(&self) -> StatusClass {
        classify_status(self.status.as_u16())
    }
}

/// 發送 JSON POST。傳輸層失敗（逾時、DNS、連線中斷）一律轉成 `NetworkError`。
pub async fn post_json<B: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    headers: &[(&str, &str)],
    body: &B,
) -> std::result::Result<HttpReply, SubmitError> {
    let mut request = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json");

    for (key, value) in headers {
        request = request.header(*key, *value);
    }

    tracing::debug!("POST {}", url);
    let response = request.json(body).send().await.map_err(network_error)?;
    let status = response.status();
    let body = response.text().await.map_err(network_error)?;
    tracing::debug!("Response status: {}", status);

    Ok(HttpReply { status, body })
}

fn network_error(e: reqwest::Error) -> SubmitError {
    let message = if e.is_timeout() {
        format!("request timed out: {}", e)
    } else {
        e.to_string()
    };
    SubmitError::NetworkError(message)
}

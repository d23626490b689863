use crate::adapters::http::{self, StatusClass};
use crate::domain::model::{keys, RefreshBody, SharedCredentials, TokenPair, TokenResponse};
use crate::domain::ports::{persist_tokens, CredentialStore};
use crate::utils::error::SubmitError;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

pub const TOKEN_PATH: &str = "/auth/v1/token?grant_type=refresh_token";

pub type RefreshResult = std::result::Result<TokenPair, SubmitError>;

/// 一次進行中的刷新。值為 `None` 代表尚未完成，後到的呼叫者訂閱同一個結果。
type Flight = watch::Receiver<Option<RefreshResult>>;

/// 真正打 token endpoint 的部分，放在背景 task 裡跑，不隨任何一個呼叫者取消
struct Exchanger<S: CredentialStore> {
    client: Client,
    store: S,
    credentials: SharedCredentials,
}

pub struct TokenRefresher<S: CredentialStore> {
    exchanger: Arc<Exchanger<S>>,
    in_flight: Arc<Mutex<Option<Flight>>>,
}

fn in_progress(flight: &Flight) -> bool {
    flight.borrow().is_none()
}

impl<S: CredentialStore> TokenRefresher<S> {
    pub fn new(client: Client, store: S, credentials: SharedCredentials) -> Self {
        Self {
            exchanger: Arc::new(Exchanger {
                client,
                store,
                credentials,
            }),
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn credentials(&self) -> &SharedCredentials {
        &self.exchanger.credentials
    }

    pub fn store(&self) -> &S {
        &self.exchanger.store
    }

    pub fn is_refreshing(&self) -> bool {
        let slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().is_some_and(in_progress)
    }

    /// 交換新的 token。已有刷新進行中時不會再發請求，而是等待同一個結果。
    pub async fn refresh(&self) -> RefreshResult {
        let flight = {
            let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref().filter(|flight| in_progress(flight)) {
                Some(flight) => {
                    tracing::debug!("Joining in-flight token refresh");
                    flight.clone()
                }
                None => self.launch(&mut slot),
            }
        };
        Self::land(flight).await
    }

    /// 與 `refresh` 相同，但已有刷新進行中時直接回傳 `RefreshAlreadyInProgress`
    pub async fn try_refresh(&self) -> RefreshResult {
        let flight = {
            let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if slot.as_ref().is_some_and(in_progress) {
                return Err(SubmitError::RefreshAlreadyInProgress);
            }
            self.launch(&mut slot)
        };
        Self::land(flight).await
    }

    /// 在背景 task 執行交換；結果送出後才清掉 slot
    fn launch(&self, slot: &mut Option<Flight>) -> Flight {
        let (tx, rx) = watch::channel(None);
        *slot = Some(rx.clone());

        let exchanger = Arc::clone(&self.exchanger);
        let in_flight = Arc::clone(&self.in_flight);
        let flight = rx.clone();
        tokio::spawn(async move {
            let outcome = exchanger.exchange().await;
            let _ = tx.send(Some(outcome));

            let mut slot = in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if slot.as_ref().is_some_and(|current| current.same_channel(&flight)) {
                *slot = None;
            }
        });
        rx
    }

    async fn land(mut flight: Flight) -> RefreshResult {
        let outcome = match flight.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        // 背景 task 沒送出結果就結束（例如 runtime 關閉）
        outcome.unwrap_or_else(|| {
            Err(SubmitError::NetworkError(
                "token refresh was interrupted".to_string(),
            ))
        })
    }
}

impl<S: CredentialStore> Exchanger<S> {
    async fn exchange(&self) -> RefreshResult {
        let snapshot = self.credentials.read().await.clone();
        let (url, refresh_token) = match (snapshot.url_for(TOKEN_PATH), snapshot.refresh_token) {
            (Some(url), Some(token)) => (url, token),
            (url, token) => {
                let mut missing = Vec::new();
                if url.is_none() {
                    missing.push(keys::ENDPOINT);
                }
                if token.is_none() {
                    missing.push(keys::REFRESH_TOKEN);
                }
                return Err(SubmitError::missing(&missing));
            }
        };

        tracing::info!("🔄 Refreshing access token");

        let mut headers = Vec::new();
        if let Some(key) = snapshot.api_key.as_deref() {
            headers.push(("apikey", key));
        }

        let body = RefreshBody {
            refresh_token: &refresh_token,
        };
        let reply = http::post_json(&self.client, &url, &headers, &body)
            .await
            .inspect_err(|e| tracing::warn!("Token refresh transport failure: {}", e))?;

        if reply.class() != StatusClass::Success {
            tracing::warn!(
                "Token refresh rejected with HTTP {}: {}",
                reply.status,
                reply.body
            );
            return Err(SubmitError::RefreshRejected(reply.status.as_u16()));
        }

        let parsed: TokenResponse = serde_json::from_str(&reply.body)
            .map_err(|e| SubmitError::MalformedResponse(e.to_string()))?;
        let access_token = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SubmitError::MalformedResponse("missing access_token".to_string()))?;

        // 回應沒帶新的 refresh_token 時沿用舊的
        let tokens = TokenPair {
            access_token,
            refresh_token: parsed.refresh_token.unwrap_or(refresh_token),
        };

        self.credentials.write().await.apply(&tokens);
        persist_tokens(&self.store, &tokens).await.map_err(|e| {
            tracing::warn!("Refreshed tokens could not be persisted: {}", e);
            SubmitError::CredentialStore(e.to_string())
        })?;

        tracing::info!("✅ Access token refreshed");
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::{build_client, HttpSettings};
    use crate::adapters::storage::MemoryCredentialStore;
    use crate::domain::model::Credentials;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn refresher_for(server: &MockServer) -> TokenRefresher<MemoryCredentialStore> {
        let credentials = Credentials {
            endpoint: Some(server.base_url()),
            api_key: Some("anon".to_string()),
            access_token: Some("A".to_string()),
            refresh_token: Some("R".to_string()),
            user_id: Some("u1".to_string()),
        };
        let client = build_client(&HttpSettings::default()).unwrap();
        TokenRefresher::new(client, MemoryCredentialStore::new(), credentials.into_shared())
    }

    #[tokio::test]
    async fn test_refresh_updates_credentials_and_store() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "refresh_token")
                .header("apikey", "anon")
                .json_body(serde_json::json!({"refresh_token": "R"}));
            then.status(200)
                .json_body(serde_json::json!({"access_token": "A2", "refresh_token": "R2"}));
        });

        let refresher = refresher_for(&server);
        let tokens = refresher.refresh().await.unwrap();

        mock.assert();
        assert_eq!(tokens.access_token, "A2");
        assert_eq!(tokens.refresh_token, "R2");

        let creds = refresher.credentials().read().await.clone();
        assert_eq!(creds.access_token.as_deref(), Some("A2"));
        assert_eq!(creds.refresh_token.as_deref(), Some("R2"));

        let stored = refresher.store().snapshot();
        assert_eq!(stored.get("access_token").map(String::as_str), Some("A2"));
        assert_eq!(stored.get("refresh_token").map(String::as_str), Some("R2"));
        assert!(!refresher.is_refreshing());
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_refresh_token_when_absent() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "A2"}));
        });

        let refresher = refresher_for(&server);
        let tokens = refresher.refresh().await.unwrap();

        assert_eq!(tokens.refresh_token, "R");
        let stored = refresher.store().snapshot();
        assert_eq!(stored.get("refresh_token").map(String::as_str), Some("R"));
    }

    #[tokio::test]
    async fn test_missing_access_token_is_malformed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(200)
                .json_body(serde_json::json!({"refresh_token": "R2"}));
        });

        let refresher = refresher_for(&server);
        let result = refresher.refresh().await;

        assert!(matches!(result, Err(SubmitError::MalformedResponse(_))));
        let creds = refresher.credentials().read().await.clone();
        assert_eq!(creds.access_token.as_deref(), Some("A"));
        assert!(refresher.store().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(200).body("<html>oops</html>");
        });

        let refresher = refresher_for(&server);
        assert!(matches!(
            refresher.refresh().await,
            Err(SubmitError::MalformedResponse(_))
        ));
        assert!(!refresher.is_refreshing());
    }

    #[tokio::test]
    async fn test_rejected_refresh_leaves_credentials_untouched() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(400)
                .json_body(serde_json::json!({"error": "invalid_grant"}));
        });

        let refresher = refresher_for(&server);
        assert_eq!(
            refresher.refresh().await,
            Err(SubmitError::RefreshRejected(400))
        );

        // slot 已清除，下一次刷新會重新發出請求
        assert_eq!(
            refresher.refresh().await,
            Err(SubmitError::RefreshRejected(400))
        );
        mock.assert_hits(2);

        let creds = refresher.credentials().read().await.clone();
        assert_eq!(creds.access_token.as_deref(), Some("A"));
        assert_eq!(creds.refresh_token.as_deref(), Some("R"));
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(200)
                .delay(Duration::from_millis(200))
                .json_body(serde_json::json!({"access_token": "A2", "refresh_token": "R2"}));
        });

        let refresher = refresher_for(&server);
        let (first, second) = tokio::join!(refresher.refresh(), refresher.refresh());

        mock.assert_hits(1);
        assert_eq!(first, second);
        assert_eq!(first.unwrap().access_token, "A2");
    }

    #[tokio::test]
    async fn test_try_refresh_rejects_while_in_flight() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(200)
                .delay(Duration::from_millis(300))
                .json_body(serde_json::json!({"access_token": "A2"}));
        });

        let refresher = refresher_for(&server);
        let (leader, late) = tokio::join!(refresher.refresh(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            refresher.try_refresh().await
        });

        mock.assert_hits(1);
        assert!(leader.is_ok());
        assert_eq!(late, Err(SubmitError::RefreshAlreadyInProgress));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_makes_no_call() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(200);
        });

        let refresher = refresher_for(&server);
        refresher.credentials().write().await.refresh_token = None;

        assert!(matches!(
            refresher.refresh().await,
            Err(SubmitError::MissingCredentials { .. })
        ));
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn test_cancelled_leader_does_not_restart_refresh() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(200)
                .delay(Duration::from_millis(400))
                .json_body(serde_json::json!({"access_token": "A2", "refresh_token": "R2"}));
        });

        let refresher = Arc::new(refresher_for(&server));
        let leader = tokio::spawn({
            let refresher = Arc::clone(&refresher);
            async move { refresher.refresh().await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        let follower = tokio::spawn({
            let refresher = Arc::clone(&refresher);
            async move { refresher.refresh().await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        leader.abort();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(refresher.is_refreshing());

        let late = refresher.refresh().await.unwrap();
        let joined = follower.await.unwrap().unwrap();

        mock.assert_hits(1);
        assert_eq!(late.access_token, "A2");
        assert_eq!(joined, late);
        assert!(!refresher.is_refreshing());
        let stored = refresher.store().snapshot();
        assert_eq!(stored.get("access_token").map(String::as_str), Some("A2"));
    }

    #[tokio::test]
    async fn test_transport_failure_clears_slot_and_keeps_credentials() {
        let client = build_client(&HttpSettings::default()).unwrap();
        let credentials = Credentials {
            endpoint: Some("http://127.0.0.1:1".to_string()),
            access_token: Some("A".to_string()),
            refresh_token: Some("R".to_string()),
            user_id: Some("u1".to_string()),
            ..Default::default()
        };
        let refresher =
            TokenRefresher::new(client, MemoryCredentialStore::new(), credentials.into_shared());

        assert!(matches!(
            refresher.refresh().await,
            Err(SubmitError::NetworkError(_))
        ));
        assert!(!refresher.is_refreshing());

        let creds = refresher.credentials().read().await.clone();
        assert_eq!(creds.access_token.as_deref(), Some("A"));
        assert_eq!(creds.refresh_token.as_deref(), Some("R"));
        assert!(refresher.store().snapshot().is_empty());

        // 失敗後可以立即再試
        assert!(matches!(
            refresher.try_refresh().await,
            Err(SubmitError::NetworkError(_))
        ));
    }
}

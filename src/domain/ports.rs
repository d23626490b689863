use crate::domain::model::{keys, Credentials, Outcome, TokenPair};
use crate::utils::error::Result;

/// 外部的 key-value 憑證儲存（單一 namespace）。
/// 本 crate 只在刷新成功時寫入 `access_token` / `refresh_token`，從不刪除。
pub trait CredentialStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl std::future::Future<Output = Result<Option<String>>> + Send;
    fn set(
        &self,
        key: &str,
        value: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// 一次寫入多個 key。能原子寫入的儲存應覆寫此方法，避免只寫進一半。
    fn set_many(
        &self,
        entries: &[(&str, &str)],
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        async move {
            for (key, value) in entries {
                self.set(key, value).await?;
            }
            Ok(())
        }
    }
}

/// 倒數計時與送出結果的 UI 通知
pub trait AutoSubmitListener: Send + Sync {
    fn on_tick(&self, remaining_secs: u64);
    fn on_fired(&self);
    /// 使用者編輯輸入而取消倒數，UI 回到一般標籤
    fn on_cancelled(&self) {}
    fn on_outcome(&self, _outcome: &Outcome) {}
}

/// 不需要 UI 回饋時使用
pub struct NoopListener;

impl AutoSubmitListener for NoopListener {
    fn on_tick(&self, _remaining_secs: u64) {}
    fn on_fired(&self) {}
}

impl Credentials {
    pub async fn load<S: CredentialStore>(store: &S) -> Result<Self> {
        let credentials = Self {
            endpoint: store.get(keys::ENDPOINT).await?,
            api_key: store.get(keys::API_KEY).await?,
            access_token: store.get(keys::ACCESS_TOKEN).await?,
            refresh_token: store.get(keys::REFRESH_TOKEN).await?,
            user_id: store.get(keys::USER_ID).await?,
        };

        tracing::debug!(
            "Credentials loaded. endpoint: {}, user: {}, refresh token: {}",
            credentials.endpoint.is_some(),
            credentials.user_id.is_some(),
            credentials.refresh_token.is_some()
        );

        if credentials.endpoint.is_none() || credentials.access_token.is_none() {
            tracing::warn!("No synced login found; open the main app to sync credentials");
        }

        Ok(credentials)
    }
}

pub async fn persist_tokens<S: CredentialStore>(store: &S, tokens: &TokenPair) -> Result<()> {
    store
        .set_many(&[
            (keys::ACCESS_TOKEN, tokens.access_token.as_str()),
            (keys::REFRESH_TOKEN, tokens.refresh_token.as_str()),
        ])
        .await
}

use crate::domain::ports::CredentialStore;
use crate::utils::error::Result;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const DEFAULT_NAMESPACE: &str = "CapacitorStorage";

/// 以 TOML 檔保存的憑證，每個 namespace 一個 table：
///
/// ```toml
/// [CapacitorStorage]
/// supabase_url = "https://xyz.supabase.co"
/// access_token = "..."
/// ```
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
    namespace: String,
    write_lock: Arc<Mutex<()>>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            namespace: namespace.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn read_document(&self) -> Result<toml::Table> {
        if !self.path.exists() {
            return Ok(toml::Table::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(content.parse::<toml::Table>()?)
    }

    /// 讀出整份文件、改完後整份寫回，多個 key 只寫一次檔
    fn write_entries(&self, entries: &[(&str, &str)]) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut document = self.read_document()?;
        let namespace = document
            .entry(self.namespace.clone())
            .or_insert(toml::Value::Table(toml::Table::new()));

        // namespace 被寫成非 table 的值時整個覆蓋
        if !namespace.is_table() {
            *namespace = toml::Value::Table(toml::Table::new());
        }
        if let Some(table) = namespace.as_table_mut() {
            for (key, value) in entries {
                table.insert(key.to_string(), toml::Value::String(value.to_string()));
            }
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(&self.path, toml::to_string(&document)?)?;
        tracing::debug!("Persisted {} credential key(s) to {:?}", entries.len(), self.path);
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let document = self.read_document()?;
        let value = document
            .get(&self.namespace)
            .and_then(|ns| ns.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.write_entries(&[(key, value)])
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        self.write_entries(entries)
    }
}

/// 行程內的憑證儲存，嵌入使用或測試時用
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: Arc::new(Mutex::new(values)),
        }
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        for (key, value) in entries {
            values.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}

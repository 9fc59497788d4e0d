use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ApiError;

/// Abstraction over a short-lived key-value store used for OAuth state.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError>;
    async fn get(&self, key: &str) -> Result<Option<String>, ApiError>;
    async fn del(&self, key: &str) -> Result<(), ApiError>;

    /// Read and delete a key. Implementations should make this atomic so a
    /// single-use value can only be consumed once.
    async fn take(&self, key: &str) -> Result<Option<String>, ApiError> {
        let val = self.get(key).await?;
        if val.is_some() {
            self.del(key).await?;
        }
        Ok(val)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

pub struct MemoryStore {
    data: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        let mut data = self.data.lock();
        // Opportunistic cleanup so abandoned logins don't accumulate.
        let now = Instant::now();
        data.retain(|_, (_, exp)| *exp > now);
        data.insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        let data = self.data.lock();
        Ok(data
            .get(key)
            .filter(|(_, exp)| *exp > Instant::now())
            .map(|(v, _)| v.clone()))
    }

    async fn del(&self, key: &str) -> Result<(), ApiError> {
        self.data.lock().remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, ApiError> {
        let removed = self.data.lock().remove(key);
        Ok(removed
            .filter(|(_, exp)| *exp > Instant::now())
            .map(|(v, _)| v))
    }
}

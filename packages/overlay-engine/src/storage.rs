//! Extension key-value storage and the preferences read from it.
//!
//! Storage is a flat JSON record. A missing key is never an error: it reads
//! as the falsy default for that preference.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

pub const ONBOARDING_KEY: &str = "onboardingComplete";
pub const DARK_MODE_KEY: &str = "darkMode";
pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const AUTH_EXPIRY_KEY: &str = "authTokenExpiry";
pub const LAST_USER_ID_KEY: &str = "lastUserId";

/// Async key-value store provided by the extension host.
#[async_trait(?Send)]
pub trait KeyValueStore {
    /// Values for the requested keys. Absent keys are simply missing from
    /// the returned record.
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    /// Merge `record` into the store.
    async fn set(&self, record: HashMap<String, Value>) -> Result<()>;
}

/// User preferences consulted by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preferences {
    pub onboarding_complete: bool,
    pub dark_mode: bool,
    pub auth_token: Option<String>,
    pub auth_expires_at: Option<DateTime<Utc>>,
    pub last_user_id: Option<String>,
}

impl Preferences {
    pub const KEYS: [&'static str; 5] = [
        ONBOARDING_KEY,
        DARK_MODE_KEY,
        AUTH_TOKEN_KEY,
        AUTH_EXPIRY_KEY,
        LAST_USER_ID_KEY,
    ];

    pub async fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let record = store.get(&Self::KEYS).await?;
        let prefs = Self::from_record(&record);
        debug!(
            onboarding_complete = prefs.onboarding_complete,
            dark_mode = prefs.dark_mode,
            has_token = prefs.auth_token.is_some(),
            "preferences loaded"
        );
        Ok(prefs)
    }

    pub fn from_record(record: &HashMap<String, Value>) -> Self {
        let flag = |key: &str| record.get(key).map(truthy).unwrap_or(false);
        let text = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            onboarding_complete: flag(ONBOARDING_KEY),
            dark_mode: flag(DARK_MODE_KEY),
            auth_token: text(AUTH_TOKEN_KEY),
            auth_expires_at: record.get(AUTH_EXPIRY_KEY).and_then(parse_expiry),
            last_user_id: text(LAST_USER_ID_KEY),
        }
    }

    /// The cached token, if present and not expired at `now`. A token with
    /// no recorded expiry is treated as expired.
    pub fn valid_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.auth_token, self.auth_expires_at) {
            (Some(token), Some(expires)) if expires > now => Some(token.as_str()),
            _ => None,
        }
    }

    /// Persist the onboarding marker.
    pub async fn mark_onboarded(store: &dyn KeyValueStore) -> Result<()> {
        let mut record = HashMap::new();
        record.insert(ONBOARDING_KEY.to_string(), Value::Bool(true));
        store.set(record).await
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Expiry is either epoch milliseconds or an RFC 3339 string.
fn parse_expiry(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_absent_keys_are_falsy() {
        let store = MemoryStore::new();
        let prefs = Preferences::load(&store).await.unwrap();
        assert_eq!(prefs, Preferences::default());
        assert!(prefs.valid_token(Utc::now()).is_none());
    }

    #[tokio::test]
    async fn test_loads_flags_and_token() {
        let expires = Utc::now() + Duration::hours(1);
        let store = MemoryStore::with([
            (DARK_MODE_KEY, json!(true)),
            (ONBOARDING_KEY, json!(1)),
            (AUTH_TOKEN_KEY, json!("tok_123")),
            (AUTH_EXPIRY_KEY, json!(expires.timestamp_millis())),
            (LAST_USER_ID_KEY, json!("user-9")),
        ]);
        let prefs = Preferences::load(&store).await.unwrap();

        assert!(prefs.dark_mode);
        assert!(prefs.onboarding_complete);
        assert_eq!(prefs.valid_token(Utc::now()), Some("tok_123"));
        assert_eq!(prefs.last_user_id.as_deref(), Some("user-9"));
    }

    #[test]
    fn test_expired_token_is_ignored() {
        let record = HashMap::from([
            (AUTH_TOKEN_KEY.to_string(), json!("old")),
            (AUTH_EXPIRY_KEY.to_string(), json!("2020-01-01T00:00:00Z")),
        ]);
        let prefs = Preferences::from_record(&record);
        assert!(prefs.auth_expires_at.is_some());
        assert_eq!(prefs.valid_token(Utc::now()), None);
    }

    #[test]
    fn test_token_without_expiry_is_not_used() {
        let record = HashMap::from([(AUTH_TOKEN_KEY.to_string(), json!("tok"))]);
        assert_eq!(Preferences::from_record(&record).valid_token(Utc::now()), None);
    }

    #[test]
    fn test_falsy_values() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!("yes")));
    }

    #[tokio::test]
    async fn test_mark_onboarded_persists() {
        let store = MemoryStore::new();
        Preferences::mark_onboarded(&store).await.unwrap();
        assert_eq!(store.value(ONBOARDING_KEY), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = MemoryStore::new();
        store.fail_next();
        assert!(Preferences::load(&store).await.is_err());
    }
}

//! Bearer tokens and the optional per-session token cache.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Tokens this close to expiry are treated as already expired.
pub const EXPIRY_SKEW_SECS: i64 = 5 * 60;

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    pub fn secret(&self) -> &str {
        &self.token
    }

    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on - ChronoDuration::seconds(EXPIRY_SKEW_SECS) > now
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"**********")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

type CacheKey = (String, Vec<String>);

/// Tokens keyed by tenant and scope set.
///
/// Handed to a [`CredentialProvider`](super::CredentialProvider) explicitly;
/// there is no process-wide instance.
pub struct TokenCache {
    entries: Mutex<HashMap<CacheKey, AccessToken>>,
    clock: Arc<dyn Clock>,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("entries", &lock(&self.entries).len())
            .finish()
    }
}

impl TokenCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn get(&self, tenant_id: &str, scopes: &[String]) -> Option<AccessToken> {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);
        let key = cache_key(tenant_id, scopes);

        match entries.get(&key) {
            Some(token) if token.is_fresh_at(now) => Some(token.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, tenant_id: &str, scopes: &[String], token: AccessToken) {
        lock(&self.entries).insert(cache_key(tenant_id, scopes), token);
    }

    pub fn invalidate(&self, tenant_id: &str, scopes: &[String]) {
        lock(&self.entries).remove(&cache_key(tenant_id, scopes));
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cache_key(tenant_id: &str, scopes: &[String]) -> CacheKey {
    let mut scopes = scopes.to_vec();
    scopes.sort();
    scopes.dedup();
    (tenant_id.to_string(), scopes)
}

// A poisoned lock only means another caller panicked mid-update of a plain map.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Accepts `3599` as well as `"3599"`; identity endpoints disagree on which.
pub(crate) fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn scopes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cache_hit_until_skew_window() {
        let clock = Arc::new(ManualClock::new(start()));
        let cache = TokenCache::new(clock.clone());
        let scope = scopes(&["https://api.powerplatform.com/.default"]);

        cache.insert(
            "tenant",
            &scope,
            AccessToken::new("abc", start() + ChronoDuration::minutes(60)),
        );
        assert_eq!(cache.get("tenant", &scope).unwrap().secret(), "abc");

        clock.advance(ChronoDuration::minutes(54));
        assert!(cache.get("tenant", &scope).is_some());

        clock.advance(ChronoDuration::minutes(1));
        assert!(cache.get("tenant", &scope).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_key_ignores_scope_order() {
        let cache = TokenCache::new(Arc::new(ManualClock::new(start())));
        let expires = start() + ChronoDuration::hours(1);

        cache.insert("tenant", &scopes(&["b", "a"]), AccessToken::new("t", expires));
        assert!(cache.get("tenant", &scopes(&["a", "b"])).is_some());
        assert!(cache.get("other-tenant", &scopes(&["a", "b"])).is_none());
    }

    #[test]
    fn test_invalidate() {
        let cache = TokenCache::new(Arc::new(ManualClock::new(start())));
        let scope = scopes(&["a"]);
        cache.insert("tenant", &scope, AccessToken::new("t", start() + ChronoDuration::hours(1)));

        cache.invalidate("tenant", &scope);
        assert!(cache.get("tenant", &scope).is_none());
    }

    #[test]
    fn test_access_token_debug_hides_secret() {
        let token = AccessToken::new("very-secret-token", start());
        assert!(!format!("{:?}", token).contains("very-secret-token"));
    }

    #[test]
    fn test_lenient_u64() {
        #[derive(Deserialize)]
        struct ExpiresIn {
            #[serde(default, deserialize_with = "lenient_u64")]
            value: Option<u64>,
        }

        let parsed: ExpiresIn = serde_json::from_str(r#"{"value": 3599}"#).unwrap();
        assert_eq!(parsed.value, Some(3599));
        let parsed: ExpiresIn = serde_json::from_str(r#"{"value": "3599"}"#).unwrap();
        assert_eq!(parsed.value, Some(3599));
        let parsed: ExpiresIn = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(parsed.value, None);
    }
}

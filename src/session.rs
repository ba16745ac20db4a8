use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::models::CapturedProfile;
use crate::store::{keys, save, Store};

/// Coerces a stored document into a list: arrays keep their well-formed
/// entries, a lone object becomes a one-element list, anything else is empty.
pub fn normalize_records<T: DeserializeOwned>(value: Option<Value>) -> Vec<T> {
    match value {
        Some(Value::Array(items)) => {
            let total = items.len();
            let records: Vec<T> = items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect();
            if records.len() < total {
                warn!("Dropped {} malformed cached records", total - records.len());
            }
            records
        }
        Some(value @ Value::Object(_)) => serde_json::from_value(value).ok().into_iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            warn!("Ignoring cached data of unexpected type: {}", other);
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub profiles: Vec<CapturedProfile>,
    pub profile_count: usize,
    pub session_start: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
}

impl SessionData {
    fn from_value(value: Value) -> Self {
        let timestamp = |key: &str| {
            value
                .get(key)
                .cloned()
                .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok())
        };
        let session_start = timestamp("sessionStart");
        let last_update = timestamp("lastUpdate");
        let profiles: Vec<CapturedProfile> = normalize_records(value.get("profiles").cloned());
        Self {
            profile_count: profiles.len(),
            profiles,
            session_start,
            last_update,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry {
    pub name: String,
    pub url: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub profile_count: usize,
    pub session_start: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub profiles: Vec<CachedEntry>,
}

/// The captured-profile cache for the current browsing session, plus the
/// persistent archive every capture is also merged into.
pub struct SessionCache<'a> {
    store: &'a dyn Store,
}

impl<'a> SessionCache<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Result<SessionData> {
        Ok(self
            .store
            .get(keys::SESSION_DATA)?
            .map(SessionData::from_value)
            .unwrap_or_default())
    }

    pub fn save_profile(&self, captured: CapturedProfile) -> Result<SessionData> {
        self.save_profile_at(captured, Utc::now())
    }

    /// Upserts by URL. A re-capture replaces the entry in place, keeping
    /// its original `captured_at` and advancing `updated_at`.
    pub fn save_profile_at(&self, mut captured: CapturedProfile, now: DateTime<Utc>) -> Result<SessionData> {
        let mut session = self.load()?;
        if session.session_start.is_none() {
            session.session_start = Some(now);
        }

        captured.updated_at = now;
        match session.profiles.iter_mut().find(|p| p.url == captured.url) {
            Some(existing) => {
                debug!("Updating cached profile {}", captured.url);
                captured.captured_at = existing.captured_at;
                *existing = captured.clone();
            }
            None => {
                debug!("Caching new profile {}", captured.url);
                captured.captured_at = now;
                session.profiles.push(captured.clone());
            }
        }
        session.last_update = Some(now);
        session.profile_count = session.profiles.len();
        save(self.store, keys::SESSION_DATA, &session)?;

        self.archive(captured)?;
        Ok(session)
    }

    fn archive(&self, captured: CapturedProfile) -> Result<()> {
        let mut saved = self.saved_profiles()?;
        match saved.iter().position(|p| p.url == captured.url) {
            Some(i) => {
                saved[i].profile = captured.profile;
                saved[i].updated_at = captured.updated_at;
                saved[i].source = captured.source;
            }
            None => saved.insert(0, captured),
        }
        save(self.store, keys::SAVED_PROFILES, &saved)
    }

    /// Every profile ever captured, newest first. Survives uploads.
    pub fn saved_profiles(&self) -> Result<Vec<CapturedProfile>> {
        Ok(normalize_records(self.store.get(keys::SAVED_PROFILES)?))
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let session = self.load()?;
        Ok(CacheStats {
            profile_count: session.profile_count,
            session_start: session.session_start,
            last_update: session.last_update,
            profiles: session
                .profiles
                .iter()
                .map(|p| CachedEntry {
                    name: p.profile.display_name(),
                    url: p.url.clone(),
                    captured_at: p.captured_at,
                })
                .collect(),
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(keys::SESSION_DATA)?;
        info!("Session cache cleared");
        Ok(())
    }
}

/// Open tabs on the session domain. Closing the last one ends the session.
#[derive(Debug, Clone)]
pub struct TabTracker {
    domain: String,
    open: HashSet<u64>,
}

impl TabTracker {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_lowercase(),
            open: HashSet::new(),
        }
    }

    fn on_domain(&self, url: &str) -> bool {
        url.to_lowercase().contains(&self.domain)
    }

    /// A tab finished loading `url`. Tabs that navigate off the domain stop
    /// counting as session tabs.
    pub fn tab_updated(&mut self, tab_id: u64, url: &str) {
        if self.on_domain(url) {
            self.open.insert(tab_id);
        } else {
            self.open.remove(&tab_id);
        }
    }

    /// Returns true when this closed the last session tab.
    pub fn tab_closed(&mut self, tab_id: u64) -> bool {
        self.open.remove(&tab_id) && self.open.is_empty()
    }

    /// A window closing always ends the session.
    pub fn window_closed(&mut self, tab_ids: &[u64]) -> bool {
        for id in tab_ids {
            self.open.remove(id);
        }
        true
    }

    pub fn has_open_tabs(&self) -> bool {
        !self.open.is_empty()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Profile;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use serde_json::json;

    fn captured(url: &str, name: &str) -> CapturedProfile {
        let mut profile = Profile::default();
        profile.full_name = name.to_string();
        CapturedProfile::new(url, profile, "linkedin")
    }

    #[test]
    fn test_recapture_updates_in_place() {
        let store = MemoryStore::new();
        let cache = SessionCache::new(&store);
        let t0 = Utc::now() - Duration::minutes(10);
        let t1 = t0 + Duration::minutes(5);

        cache.save_profile_at(captured("https://linkedin.com/in/ada", "Ada"), t0).unwrap();
        cache.save_profile_at(captured("https://linkedin.com/in/bob", "Bob"), t0).unwrap();
        let before = cache.load().unwrap();

        let after = cache
            .save_profile_at(captured("https://linkedin.com/in/ada", "Ada Lovelace"), t1)
            .unwrap();
        assert_eq!(after.profile_count, before.profile_count);
        assert_eq!(after.profiles.len(), 2);
        let ada = &after.profiles[0];
        assert_eq!(ada.profile.full_name, "Ada Lovelace");
        assert_eq!(ada.captured_at, t0);
        assert!(ada.updated_at > before.profiles[0].updated_at);
        assert_eq!(after.session_start, Some(t0));
        assert_eq!(after.last_update, Some(t1));
    }

    #[test]
    fn test_archive_survives_clear() {
        let store = MemoryStore::new();
        let cache = SessionCache::new(&store);
        cache.save_profile(captured("https://linkedin.com/in/ada", "Ada")).unwrap();
        cache.save_profile(captured("https://linkedin.com/in/bob", "Bob")).unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.load().unwrap().profile_count, 0);
        let saved = cache.saved_profiles().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].url, "https://linkedin.com/in/bob");
    }

    #[test]
    fn test_stats() {
        let store = MemoryStore::new();
        let cache = SessionCache::new(&store);
        cache.save_profile(captured("https://linkedin.com/in/ada", "Ada")).unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.profile_count, 1);
        assert_eq!(stats.profiles[0].name, "Ada");
        assert!(stats.session_start.is_some());
    }

    #[test]
    fn test_normalize_records() {
        let good = json!({"url": "u1", "capturedAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-01T00:00:00Z"});
        let list: Vec<CapturedProfile> = normalize_records(Some(json!([good.clone(), 7, {"nope": true}])));
        assert_eq!(list.len(), 1);
        let single: Vec<CapturedProfile> = normalize_records(Some(good));
        assert_eq!(single.len(), 1);
        let none: Vec<CapturedProfile> = normalize_records(Some(json!("garbage")));
        assert!(none.is_empty());
        let missing: Vec<CapturedProfile> = normalize_records(None);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_malformed_session_loads_empty() {
        let store = MemoryStore::new();
        store.set(keys::SESSION_DATA, &json!({"profiles": "oops", "sessionStart": 12})).unwrap();
        let session = SessionCache::new(&store).load().unwrap();
        assert_eq!(session.profile_count, 0);
        assert_eq!(session.session_start, None);
        assert!(store.get(keys::SESSION_DATA).unwrap().is_some());
    }

    #[test]
    fn test_tab_tracker_lifecycle() {
        let mut tabs = TabTracker::new("linkedin.com");
        tabs.tab_updated(1, "https://www.linkedin.com/in/ada");
        tabs.tab_updated(2, "https://www.LinkedIn.com/feed");
        tabs.tab_updated(3, "https://example.com");
        assert_eq!(tabs.open_count(), 2);
        assert!(!tabs.tab_closed(3));
        assert!(!tabs.tab_closed(1));
        assert!(tabs.has_open_tabs());
        assert!(tabs.tab_closed(2));
        assert!(!tabs.has_open_tabs());

        tabs.tab_updated(4, "https://linkedin.com/in/bob");
        tabs.tab_updated(4, "https://example.com");
        assert!(!tabs.has_open_tabs());
        assert!(tabs.window_closed(&[]));
    }
}

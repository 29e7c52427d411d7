use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::KeyError;
use crate::id::{KeyId, Secret};
use crate::record::{KeyInfo, KeyRecord};

const BLOCKED_NOT_BOOLEAN: &str = "\"blocked\" field must be a boolean";

/// Result of [`KeyStore::issue`].
#[derive(Clone, Debug)]
pub struct IssuedKey {
    pub id: KeyId,
    pub secret: Secret,
}

/// Counts reported by [`KeyStore::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub keys: usize,
    pub leased: usize,
    pub blocked: usize,
}

/// In-memory map of issued keys.
///
/// Cloning is cheap and yields another handle to the same map, which is how
/// the request handlers and the [`Reaper`](crate::Reaper) share it. Every
/// operation is a single critical section, so operations on one id are
/// linearizable and no caller ever observes a partially written record.
#[derive(Clone)]
pub struct KeyStore {
    records: Arc<RwLock<HashMap<KeyId, KeyRecord>>>,
    clock: Arc<dyn Clock>,
    lease: TimeDelta,
}

impl KeyStore {
    /// Create an empty store on the wall clock.
    #[must_use]
    pub fn new(lease: TimeDelta) -> Self {
        Self::with_clock(lease, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(lease: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            clock,
            lease,
        }
    }

    #[must_use]
    pub const fn lease_duration(&self) -> TimeDelta {
        self.lease
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Issue a new key with no lease engaged.
    pub fn issue(&self) -> IssuedKey {
        let now = self.clock.now();
        let secret = Secret::generate();

        let mut records = self.records.write();

        let id = loop {
            let id = KeyId::generate();
            if !records.contains_key(&id) {
                break id;
            }
        };

        let _ignored = records.insert(id, KeyRecord::new(id, secret.clone(), now));
        drop(records);

        debug!(%id, "Issued key");

        IssuedKey { id, secret }
    }

    /// Return the secret of a valid key. Never touches the lease.
    pub fn fetch(&self, id: &KeyId) -> Result<Secret, KeyError> {
        let now = self.clock.now();
        let records = self.records.read();

        let record = records.get(id).ok_or(KeyError::NotFound)?;

        record.check_valid(now).map_err(|reason| {
            debug!(%id, %reason, "Refused to hand out invalid key");
            KeyError::Forbidden(reason)
        })?;

        Ok(record.secret.clone())
    }

    /// Diagnostic view, available for blocked and lapsed keys too.
    pub fn describe(&self, id: &KeyId) -> Result<KeyInfo, KeyError> {
        self.records
            .read()
            .get(id)
            .map(KeyRecord::info)
            .ok_or(KeyError::NotFound)
    }

    pub fn delete(&self, id: &KeyId) -> Result<(), KeyError> {
        let removed = self.records.write().remove(id);

        if removed.is_none() {
            return Err(KeyError::NotFound);
        }

        debug!(%id, "Deleted key");

        Ok(())
    }

    /// Set or clear the administrative block.
    ///
    /// `None` stands for a flag that was missing or not a boolean at the
    /// boundary. It is rejected only after the id is known to exist, and the
    /// record is left untouched.
    pub fn set_blocked(&self, id: &KeyId, blocked: Option<bool>) -> Result<bool, KeyError> {
        let mut records = self.records.write();

        let record = records.get_mut(id).ok_or(KeyError::NotFound)?;

        let Some(blocked) = blocked else {
            return Err(KeyError::InvalidArgument(BLOCKED_NOT_BOOLEAN));
        };

        record.blocked = blocked;
        drop(records);

        debug!(%id, blocked, "Updated key block flag");

        Ok(blocked)
    }

    /// Engage or renew the lease of a valid key, returning the new deadline.
    ///
    /// A blocked or lapsed key cannot be revived this way. A key the reaper
    /// already removed reports `NotFound`; it is never recreated.
    pub fn keep_alive(&self, id: &KeyId) -> Result<DateTime<Utc>, KeyError> {
        let now = self.clock.now();
        let mut records = self.records.write();

        let record = records.get_mut(id).ok_or(KeyError::NotFound)?;

        record.check_valid(now).map_err(|reason| {
            debug!(%id, %reason, "Rejected keep-alive for invalid key");
            KeyError::Forbidden(reason)
        })?;

        let expires_at = record.touch(now, self.lease);
        drop(records);

        debug!(%id, %expires_at, "Renewed key lease");

        Ok(expires_at)
    }

    /// Whether `id` names a record that is neither blocked nor lapsed.
    #[must_use]
    pub fn is_valid(&self, id: &KeyId) -> bool {
        let now = self.clock.now();
        self.records
            .read()
            .get(id)
            .is_some_and(|record| record.is_valid(now))
    }

    /// Remove every record whose lease lapsed without a keep-alive.
    ///
    /// Runs as one critical section, so a keep-alive racing with the sweep
    /// either lands first (and the record survives) or finds it gone.
    pub fn reap(&self) -> Vec<KeyId> {
        let now = self.clock.now();
        let lease = self.lease;
        let mut reaped = Vec::new();

        self.records.write().retain(|id, record| {
            if record.is_reapable(now, lease) {
                reaped.push(*id);
                return false;
            }
            true
        });

        reaped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let records = self.records.read();

        records.values().fold(
            StoreStats {
                keys: records.len(),
                ..StoreStats::default()
            },
            |mut stats, record| {
                stats.leased += usize::from(record.expires_at.is_some());
                stats.blocked += usize::from(record.blocked);
                stats
            },
        )
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("keys", &self.len())
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::Invalidity;

    fn store() -> (KeyStore, Arc<ManualClock>) {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = KeyStore::with_clock(TimeDelta::minutes(5), clock.clone());
        (store, clock)
    }

    #[test]
    fn test_issue_then_fetch_returns_secret() {
        let (store, _clock) = store();

        let issued = store.issue();
        let secret = store.fetch(&issued.id).unwrap();

        assert_eq!(secret, issued.secret);
        assert!(store.is_valid(&issued.id));
    }

    #[test]
    fn test_issue_initial_state() {
        let (store, clock) = store();

        let issued = store.issue();
        let info = store.describe(&issued.id).unwrap();

        assert_eq!(
            info,
            KeyInfo {
                blocked: false,
                created_at: clock.now(),
                expires_at: None,
                last_activity: clock.now(),
            }
        );
    }

    #[test]
    fn test_issued_ids_and_secrets_are_unique() {
        let (store, _clock) = store();

        let issued: Vec<_> = (0..500).map(|_| store.issue()).collect();

        let mut ids: Vec<_> = issued.iter().map(|key| key.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 500);

        let mut secrets: Vec<_> = issued.iter().map(|key| key.secret.expose()).collect();
        secrets.sort_unstable();
        secrets.dedup();
        assert_eq!(secrets.len(), 500);

        assert_eq!(store.len(), 500);
    }

    #[test]
    fn test_unknown_id_is_not_found_everywhere() {
        let (store, _clock) = store();
        let id = KeyId::generate();

        assert_eq!(store.fetch(&id).unwrap_err(), KeyError::NotFound);
        assert_eq!(store.describe(&id).unwrap_err(), KeyError::NotFound);
        assert_eq!(store.delete(&id).unwrap_err(), KeyError::NotFound);
        assert_eq!(
            store.set_blocked(&id, Some(true)).unwrap_err(),
            KeyError::NotFound
        );
        assert_eq!(store.keep_alive(&id).unwrap_err(), KeyError::NotFound);
        assert!(!store.is_valid(&id));
    }

    #[test]
    fn test_fetch_does_not_touch_lease() {
        let (store, clock) = store();
        let issued = store.issue();
        let expires_at = store.keep_alive(&issued.id).unwrap();

        clock.advance(TimeDelta::minutes(2));
        let _secret = store.fetch(&issued.id).unwrap();

        let info = store.describe(&issued.id).unwrap();
        assert_eq!(info.expires_at, Some(expires_at));
        assert_eq!(info.last_activity, expires_at - TimeDelta::minutes(5));
    }

    #[test]
    fn test_first_keep_alive_engages_full_lease() {
        let (store, clock) = store();
        let issued = store.issue();

        clock.advance(TimeDelta::seconds(42));
        let expires_at = store.keep_alive(&issued.id).unwrap();

        assert_eq!(expires_at, clock.now() + TimeDelta::minutes(5));

        let info = store.describe(&issued.id).unwrap();
        assert_eq!(info.last_activity, clock.now());
        assert_eq!(info.expires_at, Some(expires_at));
    }

    #[test]
    fn test_repeated_keep_alive_is_not_cumulative() {
        let (store, clock) = store();
        let issued = store.issue();

        let first = store.keep_alive(&issued.id).unwrap();
        let second = store.keep_alive(&issued.id).unwrap();
        assert_eq!(first, second);

        clock.advance(TimeDelta::minutes(3));
        let third = store.keep_alive(&issued.id).unwrap();
        assert_eq!(third, clock.now() + TimeDelta::minutes(5));
        assert_eq!(third - first, TimeDelta::minutes(3));
    }

    #[test]
    fn test_blocked_key_is_forbidden() {
        let (store, _clock) = store();
        let issued = store.issue();
        let _expires_at = store.keep_alive(&issued.id).unwrap();

        assert_eq!(store.set_blocked(&issued.id, Some(true)), Ok(true));

        assert_eq!(
            store.fetch(&issued.id).unwrap_err(),
            KeyError::Forbidden(Invalidity::Blocked)
        );
        assert_eq!(
            store.keep_alive(&issued.id).unwrap_err(),
            KeyError::Forbidden(Invalidity::Blocked)
        );
        assert!(store.describe(&issued.id).unwrap().blocked);

        assert_eq!(store.set_blocked(&issued.id, Some(false)), Ok(false));
        assert_eq!(store.fetch(&issued.id).unwrap(), issued.secret);
    }

    #[test]
    fn test_lapsed_key_is_forbidden_until_reaped() {
        let (store, clock) = store();
        let issued = store.issue();
        let _expires_at = store.keep_alive(&issued.id).unwrap();

        clock.advance(TimeDelta::seconds(301));

        assert_eq!(
            store.fetch(&issued.id).unwrap_err(),
            KeyError::Forbidden(Invalidity::Expired)
        );
        assert_eq!(
            store.keep_alive(&issued.id).unwrap_err(),
            KeyError::Forbidden(Invalidity::Expired)
        );
        // Rejected keep-alive must not have moved the deadline
        assert!(store.describe(&issued.id).unwrap().expires_at < Some(clock.now()));

        assert_eq!(store.reap(), vec![issued.id]);
        assert_eq!(store.fetch(&issued.id).unwrap_err(), KeyError::NotFound);
        assert_eq!(store.keep_alive(&issued.id).unwrap_err(), KeyError::NotFound);
        assert!(store.is_empty());
    }

    #[test]
    fn test_unblocking_lapsed_key_keeps_it_invalid() {
        let (store, clock) = store();
        let issued = store.issue();
        let _expires_at = store.keep_alive(&issued.id).unwrap();
        let _blocked = store.set_blocked(&issued.id, Some(true)).unwrap();

        clock.advance(TimeDelta::minutes(6));
        let _unblocked = store.set_blocked(&issued.id, Some(false)).unwrap();

        assert_eq!(
            store.fetch(&issued.id).unwrap_err(),
            KeyError::Forbidden(Invalidity::Expired)
        );
    }

    #[test]
    fn test_set_blocked_rejects_malformed_flag() {
        let (store, _clock) = store();
        let issued = store.issue();
        let _blocked = store.set_blocked(&issued.id, Some(true)).unwrap();

        assert_eq!(
            store.set_blocked(&issued.id, None).unwrap_err(),
            KeyError::InvalidArgument(BLOCKED_NOT_BOOLEAN)
        );
        assert!(store.describe(&issued.id).unwrap().blocked);
    }

    #[test]
    fn test_delete_is_idempotent_for_caller() {
        let (store, _clock) = store();
        let issued = store.issue();

        assert_eq!(store.delete(&issued.id), Ok(()));
        assert_eq!(store.delete(&issued.id), Err(KeyError::NotFound));
        assert_eq!(store.delete(&issued.id), Err(KeyError::NotFound));
        assert_eq!(store.fetch(&issued.id).unwrap_err(), KeyError::NotFound);
    }

    #[test]
    fn test_reap_ignores_unleased_and_live_records() {
        let (store, clock) = store();
        let unleased = store.issue();
        let live = store.issue();
        let lapsing = store.issue();

        let _expires_at = store.keep_alive(&lapsing.id).unwrap();
        clock.advance(TimeDelta::minutes(4));
        let _expires_at = store.keep_alive(&live.id).unwrap();
        clock.advance(TimeDelta::minutes(2));

        assert_eq!(store.reap(), vec![lapsing.id]);
        assert!(store.is_valid(&live.id));

        clock.advance(TimeDelta::days(30));
        assert_eq!(store.reap(), vec![live.id]);
        assert_eq!(store.fetch(&unleased.id).unwrap(), unleased.secret);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reap_waits_for_full_lease_since_last_activity() {
        let (store, clock) = store();
        let issued = store.issue();
        let _expires_at = store.keep_alive(&issued.id).unwrap();

        clock.advance(TimeDelta::minutes(5));
        assert!(store.reap().is_empty());

        clock.advance(TimeDelta::milliseconds(1));
        assert_eq!(store.reap(), vec![issued.id]);
    }

    #[test]
    fn test_keep_alive_with_oversized_lease_saturates() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let lease = TimeDelta::try_seconds(10_000_000_000_000).unwrap();
        let store = KeyStore::with_clock(lease, clock);
        let issued = store.issue();

        assert_eq!(
            store.keep_alive(&issued.id),
            Ok(DateTime::<Utc>::MAX_UTC)
        );
        assert!(store.is_valid(&issued.id));
    }

    #[test]
    fn test_stats() {
        let (store, _clock) = store();
        let first = store.issue();
        let second = store.issue();
        let _third = store.issue();

        let _expires_at = store.keep_alive(&first.id).unwrap();
        let _expires_at = store.keep_alive(&second.id).unwrap();
        let _blocked = store.set_blocked(&second.id, Some(true)).unwrap();

        assert_eq!(
            store.stats(),
            StoreStats {
                keys: 3,
                leased: 2,
                blocked: 1,
            }
        );
    }

    #[test]
    fn test_clones_share_records() {
        let (store, _clock) = store();
        let handle = store.clone();

        let issued = store.issue();
        assert_eq!(handle.fetch(&issued.id).unwrap(), issued.secret);

        handle.delete(&issued.id).unwrap();
        assert!(store.is_empty());
    }
}

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Invalidity;
use crate::id::{KeyId, Secret};

/// An issued key and its lease state.
#[derive(Clone, Debug)]
pub struct KeyRecord {
    pub id: KeyId,

    pub secret: Secret,

    /// When the key was issued
    pub created_at: DateTime<Utc>,

    /// Administrative hold, overrides lease validity
    pub blocked: bool,

    /// Last keep-alive, or issuance if none has been received yet
    pub last_activity: DateTime<Utc>,

    /// Lease deadline, `None` while no lease is engaged
    pub expires_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    #[must_use]
    pub const fn new(id: KeyId, secret: Secret, now: DateTime<Utc>) -> Self {
        Self {
            id,
            secret,
            created_at: now,
            blocked: false,
            last_activity: now,
            expires_at: None,
        }
    }

    /// Blocked wins over expiry when both apply.
    pub fn check_valid(&self, now: DateTime<Utc>) -> Result<(), Invalidity> {
        if self.blocked {
            return Err(Invalidity::Blocked);
        }

        match self.expires_at {
            Some(expires_at) if now > expires_at => Err(Invalidity::Expired),
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.check_valid(now).is_ok()
    }

    /// Engage or renew the lease to a full window starting at `now`.
    ///
    /// Renewal resets the deadline, it does not add to the remaining time.
    /// A `now` earlier than the last activity counts as the last activity, so
    /// the deadline never moves backward. Deadlines past the end of the
    /// calendar saturate.
    pub fn touch(&mut self, now: DateTime<Utc>, lease: TimeDelta) -> DateTime<Utc> {
        let now = now.max(self.last_activity);
        let expires_at = now
            .checked_add_signed(lease)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.last_activity = now;
        self.expires_at = Some(expires_at);
        expires_at
    }

    /// Whether the reaper may evict this record.
    ///
    /// Measured from `last_activity`, which equals `expires_at - lease` for as
    /// long as [`KeyRecord::touch`] is the only writer of both fields. Records
    /// without a lease are never reapable.
    #[must_use]
    pub fn is_reapable(&self, now: DateTime<Utc>, lease: TimeDelta) -> bool {
        self.expires_at.is_some() && now.signed_duration_since(self.last_activity) > lease
    }

    #[must_use]
    pub const fn info(&self) -> KeyInfo {
        KeyInfo {
            blocked: self.blocked,
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_activity: self.last_activity,
        }
    }
}

/// Diagnostic view of a record, returned regardless of validity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
}

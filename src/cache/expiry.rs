//! Expiration Policy Module
//!
//! Converts caller timeouts into absolute expiry instants stored as Unix
//! epoch milliseconds in the `expires` column.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timeouts above this many seconds are absolute Unix timestamps (30 days).
pub const MAX_RELATIVE_TIMEOUT: f64 = 60.0 * 60.0 * 24.0 * 30.0;

/// 9999-12-31T23:59:59.999Z, stored for entries that never expire.
const FOREVER_MILLIS: i64 = 253_402_300_799_999;

// == Timeout ==
/// How long a written value stays visible.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeout {
    /// Use the cache's configured default timeout
    #[default]
    Default,
    /// Never expire
    Never,
    /// Seconds from now; `<= 0` expires immediately, above 30 days it is an
    /// absolute Unix timestamp
    Seconds(f64),
}

impl Timeout {
    /// Substitutes `fallback` for [`Timeout::Default`].
    pub fn or(self, fallback: Timeout) -> Timeout {
        match self {
            Timeout::Default => fallback,
            other => other,
        }
    }
}

impl From<u64> for Timeout {
    fn from(secs: u64) -> Self {
        Timeout::Seconds(secs as f64)
    }
}

impl From<f64> for Timeout {
    fn from(secs: f64) -> Self {
        Timeout::Seconds(secs)
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::Seconds(duration.as_secs_f64())
    }
}

/// `None` means "never expire", mirroring the `TIMEOUT: null` setting.
impl From<Option<f64>> for Timeout {
    fn from(secs: Option<f64>) -> Self {
        secs.map_or(Timeout::Never, Timeout::Seconds)
    }
}

// == Expiry ==
/// Absolute expiry instant in Unix epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Expiry(i64);

impl Expiry {
    /// The sentinel stored for entries that never expire.
    pub const FOREVER: Expiry = Expiry(FOREVER_MILLIS);

    /// Wraps a stored `expires` value.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    // == Resolve ==
    /// Computes the expiry for `timeout` at `now`, with `fallback` standing in
    /// for [`Timeout::Default`].
    pub fn resolve(timeout: Timeout, fallback: Timeout, now: DateTime<Utc>) -> Self {
        let now_ms = now.timestamp_millis();
        match timeout.or(fallback) {
            Timeout::Default | Timeout::Never => Self::FOREVER,
            // NaN lands here too
            Timeout::Seconds(secs) if !(secs > 0.0) => Self(now_ms - 1000),
            Timeout::Seconds(secs) if secs > MAX_RELATIVE_TIMEOUT => {
                Self(((secs * 1000.0) as i64).min(FOREVER_MILLIS))
            }
            Timeout::Seconds(secs) => Self(now_ms + (secs * 1000.0).round() as i64),
        }
    }

    pub fn is_forever(&self) -> bool {
        self.0 >= FOREVER_MILLIS
    }

    // == Is Expired ==
    /// An entry is expired once `now` reaches its expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_forever() && self.0 <= now.timestamp_millis()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_never_is_forever() {
        let expiry = Expiry::resolve(Timeout::Never, Timeout::Seconds(300.0), now());
        assert_eq!(expiry, Expiry::FOREVER);
        assert!(!expiry.is_expired(now()));
        assert!(expiry.is_forever());
    }

    #[test]
    fn test_default_uses_fallback() {
        let expiry = Expiry::resolve(Timeout::Default, Timeout::Seconds(300.0), now());
        assert_eq!(expiry.as_millis(), now().timestamp_millis() + 300_000);

        let forever = Expiry::resolve(Timeout::Default, Timeout::Never, now());
        assert!(forever.is_forever());
    }

    #[test]
    fn test_zero_and_negative_expire_immediately() {
        for secs in [0.0, -1.0, -3600.0, f64::NAN] {
            let expiry = Expiry::resolve(Timeout::Seconds(secs), Timeout::Never, now());
            assert!(expiry.is_expired(now()), "timeout {} should be expired", secs);
        }
    }

    #[test]
    fn test_relative_timeout() {
        let expiry = Expiry::resolve(Timeout::Seconds(100.2), Timeout::Never, now());
        assert_eq!(expiry.as_millis(), now().timestamp_millis() + 100_200);
        assert!(!expiry.is_expired(now()));
    }

    #[test]
    fn test_long_timeout_is_absolute() {
        // 30 days + 1 second is read as a Unix timestamp in early 1970
        let expiry = Expiry::resolve(Timeout::Seconds(MAX_RELATIVE_TIMEOUT + 1.0), Timeout::Never, now());
        assert_eq!(expiry.as_millis(), (MAX_RELATIVE_TIMEOUT as i64 + 1) * 1000);

        let future = now().timestamp() as f64 + 3600.0;
        let expiry = Expiry::resolve(Timeout::Seconds(future), Timeout::Never, now());
        assert_eq!(expiry.as_millis(), now().timestamp_millis() + 3_600_000);
        assert!(!expiry.is_expired(now()));
    }

    #[test]
    fn test_absolute_timeout_clamped_to_sentinel() {
        let expiry = Expiry::resolve(Timeout::Seconds(1e18), Timeout::Never, now());
        assert!(expiry.is_forever());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let expiry = Expiry::from_millis(now().timestamp_millis());
        assert!(expiry.is_expired(now()), "Entry should be expired at boundary");
    }

    #[test]
    fn test_timeout_conversions() {
        assert_eq!(Timeout::from(5u64), Timeout::Seconds(5.0));
        assert_eq!(Timeout::from(Duration::from_millis(1500)), Timeout::Seconds(1.5));
        assert_eq!(Timeout::from(None::<f64>), Timeout::Never);
        assert_eq!(Timeout::Default.or(Timeout::Never), Timeout::Never);
        assert_eq!(Timeout::Seconds(1.0).or(Timeout::Never), Timeout::Seconds(1.0));
    }
}

//! Domain primitives: TimeMs, Address, Signature.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const MS_PER_MINUTE: i64 = 60 * 1000;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    pub fn plus_minutes(&self, minutes: i64) -> Self {
        TimeMs(self.0.saturating_add(minutes.saturating_mul(MS_PER_MINUTE)))
    }

    /// Milliseconds elapsed from `earlier` to `self` (negative if `earlier` is later).
    pub fn millis_since(&self, earlier: TimeMs) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0)
            .single()
            .unwrap_or_default()
    }
}

impl std::fmt::Display for TimeMs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

/// Base58 account address (position, pool, mint or token account).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    /// Create an Address from a string.
    pub fn new(addr: impl Into<String>) -> Self {
        Address(addr.into())
    }

    /// Get the address as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction signature returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(pub String);

impl Signature {
    pub fn new(sig: impl Into<String>) -> Self {
        Signature(sig.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plus_minutes_and_millis_since() {
        let t = TimeMs::new(1_000);
        let later = t.plus_minutes(5);
        assert_eq!(later.as_ms(), 1_000 + 5 * 60 * 1000);
        assert_eq!(later.millis_since(t), 5 * 60 * 1000);
        assert_eq!(t.millis_since(later), -5 * 60 * 1000);
    }

    #[test]
    fn test_timems_display_is_utc() {
        assert_eq!(TimeMs::new(0).to_string(), "1970-01-01 00:00:00 UTC");
    }

    #[test]
    fn test_address_serializes_as_plain_string() {
        let addr = Address::new("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin\"");
        assert_eq!(addr.to_string(), addr.as_str());
    }
}

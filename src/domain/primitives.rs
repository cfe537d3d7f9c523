//! Domain primitives: TimeMs and the string identifiers used across the store.

use serde::{Deserialize, Serialize};

pub const MS_PER_MINUTE: i64 = 60_000;
pub const MS_PER_DAY: i64 = 86_400_000;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed from `earlier` to `self` (negative if `earlier` is later).
    pub fn millis_since(&self, earlier: TimeMs) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn minus_days(&self, days: i64) -> TimeMs {
        TimeMs(self.0.saturating_sub(days.saturating_mul(MS_PER_DAY)))
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Trading agent identifier.
    AgentId
);
string_id!(
    /// One deployment of an agent onto a user wallet.
    DeploymentId
);
string_id!(
    /// Traded token symbol (e.g. "BTC").
    TokenSymbol
);
string_id!(
    /// Venue-assigned handle addressing one position.
    TradeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timems_arithmetic() {
        let now = TimeMs::new(10 * MS_PER_DAY);
        assert_eq!(now.minus_days(3), TimeMs::new(7 * MS_PER_DAY));
        assert_eq!(now.millis_since(TimeMs::new(4 * MS_PER_DAY)), 6 * MS_PER_DAY);
        assert!(now.millis_since(TimeMs::new(11 * MS_PER_DAY)) < 0);
    }

    #[test]
    fn test_ids_display() {
        assert_eq!(AgentId::new("agent-1").to_string(), "agent-1");
        assert_eq!(TradeId::new("42").as_str(), "42");
    }
}

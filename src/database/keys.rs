//! Type-safe document store path builders

use std::fmt;

/// Longest key the store accepts, in bytes
pub const MAX_KEY_LEN: usize = 768;

/// Whether `key` can name a single node. Store keys may not contain
/// `/ . # $ [ ]` or control characters, so a value that does could escape
/// its namespace once joined into a path.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key
            .chars()
            .any(|c| c.is_control() || matches!(c, '/' | '.' | '#' | '$' | '[' | ']'))
}

pub mod bill {
    use super::*;

    pub const NAMESPACE: &str = "bill_mappings";

    #[derive(Debug, Clone)]
    pub struct MappingPath {
        pub bill_code: String,
    }

    impl MappingPath {
        pub fn new(bill_code: impl Into<String>) -> Self {
            Self {
                bill_code: bill_code.into(),
            }
        }
    }

    impl fmt::Display for MappingPath {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}/{}", NAMESPACE, self.bill_code)
        }
    }
}

pub mod commission {
    use super::*;

    /// Current ledger location; also doubles as a driver directory
    pub const NAMESPACE: &str = "driver_commissions";
    /// Legacy ledger written by older app versions
    pub const LEGACY_NAMESPACE: &str = "commissions";

    #[derive(Debug, Clone)]
    pub struct SummaryPath {
        pub driver_id: String,
    }

    impl SummaryPath {
        pub fn new(driver_id: impl Into<String>) -> Self {
            Self {
                driver_id: driver_id.into(),
            }
        }
    }

    impl fmt::Display for SummaryPath {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}/{}/commission_summary", NAMESPACE, self.driver_id)
        }
    }

    #[derive(Debug, Clone)]
    pub struct LegacySummaryPath {
        pub driver_id: String,
    }

    impl LegacySummaryPath {
        pub fn new(driver_id: impl Into<String>) -> Self {
            Self {
                driver_id: driver_id.into(),
            }
        }
    }

    impl fmt::Display for LegacySummaryPath {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}/{}", LEGACY_NAMESPACE, self.driver_id)
        }
    }
}

pub mod payment {
    use super::*;

    pub const NAMESPACE: &str = "commission_payment";

    #[derive(Debug, Clone)]
    pub struct HistoryPath {
        pub driver_id: String,
    }

    impl HistoryPath {
        pub fn new(driver_id: impl Into<String>) -> Self {
            Self {
                driver_id: driver_id.into(),
            }
        }
    }

    impl fmt::Display for HistoryPath {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}/{}", NAMESPACE, self.driver_id)
        }
    }
}

pub mod callback {
    use super::*;

    pub const NAMESPACE: &str = "processed_callbacks";

    #[derive(Debug, Clone)]
    pub struct ProcessedPath {
        pub bill_code: String,
    }

    impl ProcessedPath {
        pub fn new(bill_code: impl Into<String>) -> Self {
            Self {
                bill_code: bill_code.into(),
            }
        }
    }

    impl fmt::Display for ProcessedPath {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}/{}", NAMESPACE, self.bill_code)
        }
    }
}

/// Driver profiles, keyed by driver id
pub const DRIVERS: &str = "drivers";

pub const HEALTH_PROBE: &str = "health_probe";

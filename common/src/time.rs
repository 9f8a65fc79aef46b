//! Time utilities and constants for ratefeed.

use std::time::Duration;

/// Timing constants.
pub mod constants {
    use super::Duration;

    /// How long a rate query waits for the first load of its feed (30 seconds).
    pub const FIRST_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connect timeout for remote feed locations (10 seconds).
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Total read timeout for one remote transfer (60 seconds).
    pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

    /// How long shutdown waits for in-flight loads (30 seconds).
    pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Convert a chrono duration to std, clamping negatives to zero.
pub fn to_std(duration: chrono::Duration) -> Duration {
    duration.to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_std_clamps_negative() {
        assert_eq!(to_std(chrono::Duration::seconds(-5)), Duration::ZERO);
        assert_eq!(to_std(chrono::Duration::seconds(5)), Duration::from_secs(5));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::state::CrawlerState;

/// One instance's periodically refreshed liveness record in the shared
/// `instance-heartbeats` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceHeartbeat {
    pub state: CrawlerState,
    pub timestamp: DateTime<Utc>,
}

impl InstanceHeartbeat {
    pub fn now(state: CrawlerState) -> Self {
        Self {
            state,
            timestamp: Utc::now(),
        }
    }

    pub fn has_expired(&self, timeout: Duration) -> bool {
        self.has_expired_at(Utc::now(), timeout)
    }

    pub fn has_expired_at(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        self.timestamp + timeout < now
    }

    /// Milliseconds of silence as of `now`.
    pub fn silence_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.timestamp).num_milliseconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_detection() {
        let hb = InstanceHeartbeat {
            state: CrawlerState::Crawling,
            timestamp: Utc::now() - chrono::Duration::seconds(30),
        };
        assert!(hb.has_expired(Duration::from_secs(20)));
        assert!(!hb.has_expired(Duration::from_secs(60)));
    }

    #[test]
    fn test_silence_is_never_negative() {
        let hb = InstanceHeartbeat::now(CrawlerState::Idle);
        assert_eq!(hb.silence_ms(hb.timestamp - chrono::Duration::seconds(1)), 0);
        assert!(hb.silence_ms(hb.timestamp + chrono::Duration::seconds(2)) >= 2000);
    }
}

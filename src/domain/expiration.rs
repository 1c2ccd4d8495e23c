use chrono::{DateTime, Utc};

use super::clock::Clock;

pub const DEFAULT_EXPIRATION_MINUTES: i64 = 10;

/// Computes when a freshly created payment stops accepting confirmation.
#[derive(Debug, Clone, Copy)]
pub struct ExpirationPolicy {
    window_minutes: i64,
}

impl ExpirationPolicy {
    pub fn new(window_minutes: i64) -> Self {
        Self { window_minutes }
    }

    pub fn window_minutes(&self) -> i64 {
        self.window_minutes
    }

    pub fn expires_at(&self, clock: &dyn Clock) -> DateTime<Utc> {
        clock.add_minutes(clock.now(), self.window_minutes)
    }
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRATION_MINUTES)
    }
}

//! Wall-clock session countdown
//!
//! Runs independently of the physics step. The owner feeds it real elapsed
//! time and pauses the simulation once it reports expiry.

/// Countdown of a fixed session length; a zero length disables it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTimer {
    length_secs: f32,
    remaining_secs: f32,
    expired: bool,
}

impl SessionTimer {
    pub fn new(length_secs: f32) -> Self {
        let length_secs = length_secs.max(0.0);
        Self {
            length_secs,
            remaining_secs: length_secs,
            expired: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.length_secs > 0.0
    }

    pub fn remaining(&self) -> f32 {
        self.remaining_secs
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Change the length, keeping elapsed time where possible
    pub fn set_length(&mut self, length_secs: f32) {
        let length_secs = length_secs.max(0.0);
        if length_secs == self.length_secs {
            return;
        }
        let elapsed = self.length_secs - self.remaining_secs;
        self.length_secs = length_secs;
        self.remaining_secs = (length_secs - elapsed).max(0.0);
        self.expired = self.is_enabled() && self.remaining_secs <= 0.0;
    }

    /// Count down while running. Returns true exactly once, on the call that
    /// reaches zero.
    pub fn advance(&mut self, elapsed_secs: f32, running: bool) -> bool {
        if !self.is_enabled() || self.expired || !running || !elapsed_secs.is_finite() {
            return false;
        }
        self.remaining_secs = (self.remaining_secs - elapsed_secs.max(0.0)).max(0.0);
        if self.remaining_secs <= 0.0 {
            self.expired = true;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.remaining_secs = self.length_secs;
        self.expired = false;
    }
}

//! Aggregate statistics for the control surface
//!
//! Everything here is derived from counters and agent state owned by the
//! world; nothing feeds back into the simulation.

use std::fmt;

use super::types::finite_or;

/// Counters the world bumps as events happen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Throughput {
    /// Customers that crossed the outside threshold, served or not
    pub departed: usize,
    /// Customers that gave up waiting in the foyer
    pub balked: usize,
    /// Departures that had been seated
    pub served: usize,
    pub spawned: usize,
    pub requests_served: usize,
    pub teleports: usize,
    /// Spend booked at each served departure, at the price then in force
    pub revenue: f32,
}

/// Snapshot of live and cumulative metrics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimStats {
    pub time: f32,
    pub pending: usize,
    pub inside: usize,
    pub seated: usize,
    pub exiting: usize,
    pub departed: usize,
    pub balked: usize,
    pub served: usize,
    pub active_tables: usize,
    pub table_count: usize,
    pub seat_count: usize,
    pub staff_count: usize,
    pub utilization: f32,
    pub pending_requests: usize,
    pub revenue: f32,
    /// Served departures per table
    pub turnover: f32,
    /// Revenue per available seat-hour of simulated time
    pub revpash: f32,
    pub service_coefficient: f32,
}

impl SimStats {
    /// Fill in the derived financial rates from booked revenue
    pub fn with_rates(mut self, revenue: f32) -> Self {
        self.revenue = finite_or(revenue, 0.0);
        self.turnover = if self.table_count > 0 {
            self.served as f32 / self.table_count as f32
        } else {
            0.0
        };
        let seat_hours = self.seat_count as f32 * self.time / 3600.0;
        self.revpash = if seat_hours > 0.0 {
            finite_or(self.revenue / seat_hours, 0.0)
        } else {
            0.0
        };
        self
    }

    /// One-line summary for logs and the headless runner
    pub fn summary(&self) -> String {
        format!(
            "Time: {:.1}s | Pending: {} | Inside: {} | Seated: {} | Departed: {} (balked {}) | Revenue: ${:.2}",
            self.time, self.pending, self.inside, self.seated, self.departed, self.balked, self.revenue
        )
    }
}

impl fmt::Display for SimStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

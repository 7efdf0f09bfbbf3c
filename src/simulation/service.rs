//! Service requests raised when a table gets its first guest

use std::collections::VecDeque;

use super::types::{Position, RequestId, TableId};

/// A table waiting for a staff visit
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub table: TableId,
    pub position: Position,
    /// Simulation time the request was raised
    pub created_at: f32,
    /// Times a staff member gave up on reaching the table
    pub failed_attempts: u32,
}

/// FIFO of unclaimed requests; the oldest is claimed first
#[derive(Debug, Clone, Default)]
pub struct RequestQueue {
    pending: VecDeque<ServiceRequest>,
    /// Total ever raised
    pub raised: usize,
    /// Total ever claimed by staff
    pub claimed: usize,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: ServiceRequest) {
        self.raised += 1;
        self.pending.push_back(request);
    }

    /// Put a request back at the head of the line without counting it again
    pub fn requeue_front(&mut self, request: ServiceRequest) {
        self.claimed = self.claimed.saturating_sub(1);
        self.pending.push_front(request);
    }

    pub fn claim_oldest(&mut self) -> Option<ServiceRequest> {
        let request = self.pending.pop_front()?;
        self.claimed += 1;
        Some(request)
    }

    /// Drop every pending request for tables that no longer exist
    pub fn retain_tables(&mut self, mut exists: impl FnMut(TableId) -> bool) {
        self.pending.retain(|r| exists(r.table));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceRequest> {
        self.pending.iter()
    }
}

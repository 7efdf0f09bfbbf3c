//! Staff pool management
//!
//! Keeps the pool at the configured headcount, hands out service requests,
//! runs every agent's update, and provides the fail-safe reset used when a
//! staff tick goes wrong.

use anyhow::{bail, Result};
use log::debug;
use std::collections::HashMap;

use super::room::Room;
use super::seats::service_spots;
use super::service::{RequestQueue, ServiceRequest};
use super::staff::{StaffAgent, StaffContext, StaffPhase, StaffUpdateResult, KITCHEN_SLOT_SPACING};
use super::steering::STAFF_PARAMS;
use super::table::Table;
use super::types::{AgentId, Position, TableId};

/// Compact per-agent state for diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaffSnapshot {
    pub id: AgentId,
    pub phase: StaffPhase,
    pub position: Position,
    pub table: Option<TableId>,
}

/// All staff agents plus the time totals of agents already removed
#[derive(Debug, Clone, Default)]
pub struct StaffPool {
    pub agents: Vec<StaffAgent>,
    retired_busy_secs: f32,
    retired_total_secs: f32,
}

/// Kitchen slot `slot` alternates either side of the pass: 0, +1, -1, +2, ...
pub fn kitchen_slot_position(room: &Room, slot: usize) -> Position {
    let step = ((slot + 1) / 2) as f32 * KITCHEN_SLOT_SPACING;
    let offset = if slot % 2 == 1 { step } else { -step };
    room.inner(STAFF_PARAMS.radius)
        .clamp(room.kitchen_point() + Position::new(offset, 0.0))
}

impl StaffPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agents still on the floor and not leaving
    pub fn active_count(&self) -> usize {
        self.agents
            .iter()
            .filter(|a| !matches!(a.phase, StaffPhase::Exiting | StaffPhase::Despawn))
            .count()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    fn free_slot(&self) -> usize {
        (0..)
            .find(|slot| !self.agents.iter().any(|a| a.slot == *slot))
            .unwrap_or(0)
    }

    fn retire(&mut self, agent: &StaffAgent) {
        self.retired_busy_secs += agent.busy_secs;
        self.retired_total_secs += agent.total_secs;
    }

    /// Grow to `target` with idle agents at the kitchen, or shrink by removing
    /// idle agents only. Returns (spawned, removed).
    pub fn sync_size(
        &mut self,
        target: usize,
        room: &Room,
        mut next_id: impl FnMut() -> AgentId,
    ) -> (usize, usize) {
        let mut spawned = 0;
        while self.active_count() < target {
            let slot = self.free_slot();
            let agent = StaffAgent::new(next_id(), slot, kitchen_slot_position(room, slot));
            debug!("Staff {} spawned at kitchen slot {}", agent.id, slot);
            self.agents.push(agent);
            spawned += 1;
        }

        let mut removed = 0;
        while self.active_count() > target {
            // Highest slot first so the remaining idle agents stay packed
            let Some(index) = self
                .agents
                .iter()
                .enumerate()
                .filter(|(_, a)| a.phase == StaffPhase::Idle)
                .max_by_key(|(_, a)| a.slot)
                .map(|(i, _)| i)
            else {
                break;
            };
            let agent = self.agents.remove(index);
            debug!("Staff {} removed from the pool", agent.id);
            self.retire(&agent);
            removed += 1;
        }
        (spawned, removed)
    }

    /// Re-seat idle agents after the kitchen moved
    pub fn refresh_homes(&mut self, room: &Room) {
        for agent in &mut self.agents {
            agent.home = kitchen_slot_position(room, agent.slot);
            if agent.phase == StaffPhase::Idle {
                agent.position = agent.home;
                agent.target = agent.home;
            } else if agent.phase == StaffPhase::Returning {
                agent.target = agent.home;
            }
        }
    }

    /// Idle agents take the oldest pending requests, lowest id first
    pub fn assign_requests(
        &mut self,
        queue: &mut RequestQueue,
        tables: &HashMap<TableId, Table>,
        room: &Room,
    ) -> Vec<(AgentId, ServiceRequest)> {
        let inner = room.inner(STAFF_PARAMS.radius);
        let mut claimed = Vec::new();
        let mut idle: Vec<&mut StaffAgent> = self
            .agents
            .iter_mut()
            .filter(|a| a.phase == StaffPhase::Idle)
            .collect();
        idle.sort_by_key(|a| a.id);

        for agent in idle {
            let request = loop {
                match queue.claim_oldest() {
                    Some(request) if tables.contains_key(&request.table) => break Some(request),
                    Some(stale) => debug!("Dropping request for removed table {}", stale.table),
                    None => break None,
                }
            };
            let Some(request) = request else {
                break;
            };
            let Some(table) = tables.get(&request.table) else {
                continue;
            };
            let spots = service_spots(table, agent.home, &inner);
            debug!("Staff {} claimed request for table {}", agent.id, request.table);
            claimed.push((agent.id, request.clone()));
            agent.claim(request, spots);
        }
        claimed
    }

    /// Update every agent, dropping the despawned ones afterwards
    pub fn update_all(
        &mut self,
        ctx: &StaffContext,
        dt: f32,
    ) -> Result<Vec<(AgentId, StaffUpdateResult)>> {
        let mut results = Vec::new();
        for agent in &mut self.agents {
            let result = agent.update(ctx, dt)?;
            if !agent.position.is_finite() || !agent.velocity.is_finite() {
                bail!("Staff {} has a non-finite position after its update", agent.id);
            }
            if result != StaffUpdateResult::Continue {
                results.push((agent.id, result));
            }
        }

        let (gone, kept): (Vec<StaffAgent>, Vec<StaffAgent>) = std::mem::take(&mut self.agents)
            .into_iter()
            .partition(|a| a.phase == StaffPhase::Despawn);
        self.agents = kept;
        for agent in &gone {
            self.retire(agent);
        }
        Ok(results)
    }

    /// Send everyone out through the kitchen. Returns the requests that were
    /// in flight so they can be served after a resume.
    pub fn begin_exit(&mut self, room: &Room) -> Vec<ServiceRequest> {
        let mut in_flight = Vec::new();
        for agent in &mut self.agents {
            if agent.phase == StaffPhase::Exiting {
                continue;
            }
            if let Some(assignment) = agent.assignment.take() {
                in_flight.push(assignment.request);
            }
            agent.begin_exit(room);
        }
        in_flight
    }

    /// Send home anyone assigned to a table that is gone
    pub fn abandon_missing_tables(&mut self, exists: impl Fn(TableId) -> bool) {
        for agent in &mut self.agents {
            let gone = agent.assignment.as_ref().is_some_and(|a| !exists(a.table));
            if gone {
                debug!("Staff {} lost its table; returning to the kitchen", agent.id);
                agent.send_home();
            }
        }
    }

    /// Drop all agents; the next sync spawns a fresh pool
    pub fn clear(&mut self) {
        for agent in std::mem::take(&mut self.agents) {
            self.retire(&agent);
        }
    }

    /// Known-good state: every agent idle at its kitchen slot. Returns the
    /// requests that were in flight.
    pub fn reset_to_kitchen(&mut self, room: &Room) -> Vec<ServiceRequest> {
        let mut in_flight = Vec::new();
        for agent in &mut self.agents {
            agent.home = kitchen_slot_position(room, agent.slot);
            if let Some(request) = agent.reset_to_kitchen() {
                in_flight.push(request);
            }
        }
        in_flight
    }

    /// Busy share of all tracked staff time, including removed agents
    pub fn utilization(&self) -> f32 {
        let busy: f32 = self.retired_busy_secs + self.agents.iter().map(|a| a.busy_secs).sum::<f32>();
        let total: f32 =
            self.retired_total_secs + self.agents.iter().map(|a| a.total_secs).sum::<f32>();
        if total > 0.0 {
            (busy / total).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> Vec<StaffSnapshot> {
        self.agents
            .iter()
            .map(|a| StaffSnapshot {
                id: a.id,
                phase: a.phase,
                position: a.position,
                table: a.assignment.as_ref().map(|x| x.table),
            })
            .collect()
    }
}

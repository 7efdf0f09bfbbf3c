//! Staff agents: walking to tables, serving, and walking back
//!
//! Staff route around tables and seated guests with tangent waypoints, track
//! progress towards their goal, and escalate through alternate spots, jitter,
//! replans and finally a teleport so no agent can stay wedged forever.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;

use super::config::SimConfig;
use super::obstacles::{Circle, NarrowGap, ObstacleSet};
use super::room::Room;
use super::seats::ServiceSpots;
use super::service::ServiceRequest;
use super::spatial::{AgentSample, SpatialHash};
use super::steering::{self, StuckTracker, STAFF_PARAMS};
use super::table::Table;
use super::types::{AgentId, AgentKind, Position, TableId};

/// Tight radius around the exact service spot that counts as arrival
pub const SERVICE_ARRIVE_RADIUS: f32 = 0.15;
/// Radius around the kitchen slot that counts as home
pub const KITCHEN_ARRIVE_RADIUS: f32 = 0.3;
/// Base serving time before the service coefficient
pub const BASE_SERVICE_SECS: f32 = 3.0;
/// Idle or parked longer than this triggers a reset
pub const WATCHDOG_SECS: f32 = 3.0;
/// Near-spot radius used by the parked watchdog
const PARKED_RADIUS: f32 = 0.6;

/// Improvement needed for the progress trackers to reset
const PROGRESS_EPSILON: f32 = 0.05;
/// No progress for this long tries the alternate spot, then a jitter
pub const NO_PROGRESS_SECS: f32 = 2.0;
/// No progress for this long spends one replan attempt
pub const REPLAN_STALL_SECS: f32 = 2.6;
/// Replans allowed before teleporting
pub const MAX_REPLANS: u32 = 3;
/// Crawling this long forces a fresh waypoint
const WAYPOINT_DEBOUNCE_SECS: f32 = 0.6;
const WAYPOINT_SLOW_SPEED: f32 = 0.1;
/// Within this distance of the service spot the target table stops repelling
const TABLE_EXEMPT_RADIUS: f32 = 1.5;
/// Within this distance of the goal narrow-gap nudges are ignored
const GAP_EXEMPT_RADIUS: f32 = 1.0;

/// Spacing of idle slots along the kitchen pass
pub const KITCHEN_SLOT_SPACING: f32 = 0.6;

/// Lifecycle phase of a staff member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaffPhase {
    Idle,
    GoToTable,
    Serving,
    Returning,
    Exiting,
    Despawn,
}

impl StaffPhase {
    pub fn label(&self) -> &'static str {
        match self {
            StaffPhase::Idle => "IDLE",
            StaffPhase::GoToTable => "GO_TO_TABLE",
            StaffPhase::Serving => "SERVING",
            StaffPhase::Returning => "RETURNING",
            StaffPhase::Exiting => "EXITING",
            StaffPhase::Despawn => "DESPAWN",
        }
    }

    /// Counted as working time for utilization
    pub fn is_busy(&self) -> bool {
        !matches!(self, StaffPhase::Idle | StaffPhase::Despawn)
    }

    /// Standing still on purpose; hard separation pushes others instead
    pub fn is_pinned(&self) -> bool {
        matches!(self, StaffPhase::Idle | StaffPhase::Serving)
    }
}

impl fmt::Display for StaffPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The table a staff member is currently handling
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub request: ServiceRequest,
    pub table: TableId,
    pub spots: ServiceSpots,
    pub using_secondary: bool,
}

impl Assignment {
    pub fn spot(&self) -> Position {
        if self.using_secondary {
            self.spots.secondary
        } else {
            self.spots.primary
        }
    }
}

/// Waypoint and progress bookkeeping for one goal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplanState {
    pub waypoint: Option<Position>,
    pub best_distance: f32,
    /// Reset on progress or after a fallback action
    pub no_progress_secs: f32,
    /// Reset on progress or after a replan
    pub stall_secs: f32,
    pub attempts: u32,
    pub tried_secondary: bool,
    pub jittered: bool,
    pub slow_secs: f32,
}

impl Default for ReplanState {
    fn default() -> Self {
        Self {
            waypoint: None,
            best_distance: f32::INFINITY,
            no_progress_secs: 0.0,
            stall_secs: 0.0,
            attempts: 0,
            tried_secondary: false,
            jittered: false,
            slow_secs: 0.0,
        }
    }
}

/// Result of a staff update indicating what the pool must do
#[derive(Debug, Clone, PartialEq)]
pub enum StaffUpdateResult {
    Continue,
    ArrivedAtTable(TableId),
    FinishedServing(TableId),
    ReturnedToKitchen,
    Despawned,
    /// Gave up on the goal and jumped there; any dropped request is returned
    Teleported(Option<ServiceRequest>),
    /// Watchdog sent the agent home; any dropped request is returned
    Abandoned(Option<ServiceRequest>),
}

/// Read-only state staff steer against
pub struct StaffContext<'a> {
    pub room: &'a Room,
    pub config: &'a SimConfig,
    pub tables: &'a HashMap<TableId, Table>,
    pub obstacles: &'a ObstacleSet,
    pub gaps: &'a [NarrowGap],
    pub neighbors: &'a SpatialHash,
    pub service_coefficient: f32,
}

/// A staff agent
#[derive(Debug, Clone, PartialEq)]
pub struct StaffAgent {
    pub id: AgentId,
    pub position: Position,
    pub velocity: Position,
    pub phase: StaffPhase,
    /// Current goal (service spot, kitchen slot or exit point)
    pub target: Position,
    pub phase_elapsed: f32,
    /// Idle slot along the kitchen pass
    pub slot: usize,
    pub home: Position,
    pub assignment: Option<Assignment>,
    pub replan: ReplanState,
    pub stuck: StuckTracker,
    pub parked_secs: f32,
    pub busy_secs: f32,
    pub total_secs: f32,
}

impl StaffAgent {
    pub fn new(id: AgentId, slot: usize, home: Position) -> Self {
        Self {
            id,
            position: home,
            velocity: Position::ZERO,
            phase: StaffPhase::Idle,
            target: home,
            phase_elapsed: 0.0,
            slot,
            home,
            assignment: None,
            replan: ReplanState::default(),
            stuck: StuckTracker::default(),
            parked_secs: 0.0,
            busy_secs: 0.0,
            total_secs: 0.0,
        }
    }

    fn enter(&mut self, phase: StaffPhase, target: Position) {
        self.phase = phase;
        self.target = target;
        self.phase_elapsed = 0.0;
        self.replan = ReplanState::default();
        self.stuck = StuckTracker::default();
        self.parked_secs = 0.0;
    }

    pub fn sample(&self) -> AgentSample {
        AgentSample {
            id: self.id,
            kind: AgentKind::Staff,
            position: self.position,
            velocity: self.velocity,
            radius: STAFF_PARAMS.radius,
            pinned: self.phase.is_pinned(),
        }
    }

    /// Snap back to the kitchen slot with no task
    pub fn reset_to_kitchen(&mut self) -> Option<ServiceRequest> {
        let dropped = self.assignment.take().map(|a| a.request);
        self.position = self.home;
        self.velocity = Position::ZERO;
        self.enter(StaffPhase::Idle, self.home);
        dropped
    }

    /// Take a request and head for its table
    pub fn claim(&mut self, request: ServiceRequest, spots: ServiceSpots) {
        let table = request.table;
        self.assignment = Some(Assignment {
            request,
            table,
            spots,
            using_secondary: false,
        });
        self.enter(StaffPhase::GoToTable, spots.primary);
    }

    /// Drop the task and walk home
    pub fn send_home(&mut self) -> Option<ServiceRequest> {
        let dropped = self.assignment.take().map(|a| a.request);
        self.enter(StaffPhase::Returning, self.home);
        dropped
    }

    /// Leave through the kitchen; tasks are dropped without bookkeeping
    pub fn begin_exit(&mut self, room: &Room) {
        if self.phase == StaffPhase::Despawn {
            return;
        }
        self.assignment = None;
        self.enter(StaffPhase::Exiting, room.staff_exit_point());
    }

    pub fn update(&mut self, ctx: &StaffContext, dt: f32) -> Result<StaffUpdateResult> {
        if self.phase != StaffPhase::Despawn {
            self.total_secs += dt;
            if self.phase.is_busy() {
                self.busy_secs += dt;
            }
        }
        self.phase_elapsed += dt;

        match self.phase {
            StaffPhase::Idle => {
                self.position = self.home;
                self.velocity = Position::ZERO;
                if self.phase_elapsed > WATCHDOG_SECS {
                    // Re-pin and clear leftovers; stays idle
                    let dropped = self.reset_to_kitchen();
                    if dropped.is_some() {
                        return Ok(StaffUpdateResult::Abandoned(dropped));
                    }
                }
                Ok(StaffUpdateResult::Continue)
            }
            StaffPhase::GoToTable => {
                let assignment = self
                    .assignment
                    .as_ref()
                    .context("Staff heading to a table without an assignment")?;
                let table_id = assignment.table;
                ctx.tables
                    .get(&table_id)
                    .with_context(|| format!("Assigned table {} no longer exists", table_id))?;
                let spot = assignment.spot();
                self.target = spot;

                let exempt = (self.position.distance(&spot) < TABLE_EXEMPT_RADIUS).then_some(table_id);
                if self.navigate(ctx, dt, exempt, true) {
                    let dropped = self.reset_to_kitchen();
                    return Ok(StaffUpdateResult::Teleported(dropped));
                }

                let dist = self.position.distance(&self.target);
                if dist < SERVICE_ARRIVE_RADIUS {
                    self.position = self.target;
                    self.velocity = Position::ZERO;
                    let spot = self.target;
                    self.enter(StaffPhase::Serving, spot);
                    return Ok(StaffUpdateResult::ArrivedAtTable(table_id));
                }

                if dist < PARKED_RADIUS {
                    self.parked_secs += dt;
                    if self.parked_secs > WATCHDOG_SECS {
                        let dropped = self.send_home();
                        return Ok(StaffUpdateResult::Abandoned(dropped));
                    }
                } else {
                    self.parked_secs = 0.0;
                }
                Ok(StaffUpdateResult::Continue)
            }
            StaffPhase::Serving => {
                self.position = self.target;
                self.velocity = Position::ZERO;
                let table_id = self
                    .assignment
                    .as_ref()
                    .map(|a| a.table)
                    .context("Staff serving without an assignment")?;
                if self.phase_elapsed >= BASE_SERVICE_SECS * ctx.service_coefficient {
                    self.assignment = None;
                    self.enter(StaffPhase::Returning, self.home);
                    return Ok(StaffUpdateResult::FinishedServing(table_id));
                }
                Ok(StaffUpdateResult::Continue)
            }
            StaffPhase::Returning => {
                self.target = self.home;
                if self.navigate(ctx, dt, None, true) {
                    self.reset_to_kitchen();
                    return Ok(StaffUpdateResult::Teleported(None));
                }
                if self.position.distance(&self.home) < KITCHEN_ARRIVE_RADIUS {
                    self.reset_to_kitchen();
                    return Ok(StaffUpdateResult::ReturnedToKitchen);
                }
                Ok(StaffUpdateResult::Continue)
            }
            StaffPhase::Exiting => {
                self.target = ctx.room.staff_exit_point();
                if self.navigate(ctx, dt, None, false) {
                    self.position = self.target;
                }
                if self.position.z < ctx.room.staff_exit_boundary_z() {
                    self.velocity = Position::ZERO;
                    self.enter(StaffPhase::Despawn, self.position);
                    return Ok(StaffUpdateResult::Despawned);
                }
                Ok(StaffUpdateResult::Continue)
            }
            StaffPhase::Despawn => Ok(StaffUpdateResult::Continue),
        }
    }

    /// Steer towards `self.target`. Returns true when the replan ceiling is
    /// exceeded and the caller must teleport the agent.
    fn navigate(
        &mut self,
        ctx: &StaffContext,
        dt: f32,
        exempt_table: Option<TableId>,
        stay_inside: bool,
    ) -> bool {
        let params = STAFF_PARAMS;
        let r = params.radius;
        let pairs = &ctx.config.avoidance;
        let inner = ctx.room.inner(r);

        // Progress towards the goal, not the waypoint
        let dist = self.position.distance(&self.target);
        if dist < self.replan.best_distance - PROGRESS_EPSILON {
            self.replan.best_distance = dist;
            self.replan.no_progress_secs = 0.0;
            self.replan.stall_secs = 0.0;
        } else {
            self.replan.no_progress_secs += dt;
            self.replan.stall_secs += dt;
        }

        if self.replan.no_progress_secs > NO_PROGRESS_SECS {
            self.replan.no_progress_secs = 0.0;
            let can_switch = self.phase == StaffPhase::GoToTable && !self.replan.tried_secondary;
            if can_switch {
                if let Some(assignment) = self.assignment.as_mut() {
                    assignment.using_secondary = true;
                    self.target = assignment.spot();
                }
                self.replan.tried_secondary = true;
                self.replan.waypoint = None;
                self.replan.best_distance = self.position.distance(&self.target);
                debug!("Staff {} switching to the alternate service spot", self.id);
            } else if !self.replan.jittered {
                self.replan.jittered = true;
                self.velocity += steering::jitter_impulse(self.target - self.position, self.id.parity());
            }
        }

        if self.replan.stall_secs > REPLAN_STALL_SECS {
            self.replan.stall_secs = 0.0;
            self.replan.attempts += 1;
            if self.replan.attempts > MAX_REPLANS {
                warn!(
                    "Staff {} made no progress after {} replans during {}; teleporting",
                    self.id,
                    MAX_REPLANS,
                    self.phase
                );
                return true;
            }
            self.replan.waypoint = None;
            debug!("Staff {} replanning (attempt {})", self.id, self.replan.attempts);
        }

        // Waypoints route around tables and seated guests only
        let route_circles: Vec<Circle> = ctx
            .obstacles
            .tables
            .iter()
            .chain(ctx.obstacles.seated.iter())
            .map(|o| o.circle)
            .collect();

        let speed = self.velocity.length();
        if speed < WAYPOINT_SLOW_SPEED {
            self.replan.slow_secs += dt;
        } else {
            self.replan.slow_secs = 0.0;
        }
        if let Some(wp) = self.replan.waypoint {
            if self.position.distance(&wp) < steering::WAYPOINT_REACHED {
                self.replan.waypoint = None;
            }
        }
        if self.replan.waypoint.is_none() || self.replan.slow_secs > WAYPOINT_DEBOUNCE_SECS {
            self.replan.slow_secs = 0.0;
            self.replan.waypoint = steering::route_waypoint(
                self.position,
                self.target,
                &route_circles,
                r,
                self.replan.attempts as usize,
                self.id.parity(),
                &inner,
            );
        }

        let pos = self.position;
        let aim = self.replan.waypoint.unwrap_or(self.target);
        let mut desired = steering::seek(pos, aim, params.max_speed);

        let reach = steering::SEPARATION_RADIUS.max(pairs.staff_customer.radius + 2.0 * r);
        let neighbors: Vec<&AgentSample> = ctx
            .neighbors
            .neighbors(pos, reach)
            .filter(|s| s.id != self.id)
            .collect();
        desired += steering::separation(pos, self.id, neighbors.iter().copied());

        desired += steering::avoidance(
            pos,
            r,
            ctx.obstacles
                .seated
                .iter()
                .chain(ctx.obstacles.crowd.iter())
                .map(|o| o.circle),
            pairs.staff_customer,
        );
        desired += steering::avoidance(
            pos,
            r,
            ctx.obstacles
                .tables
                .iter()
                .filter(|o| exempt_table.map_or(true, |t| !o.is_table(t)))
                .map(|o| o.circle),
            pairs.staff_obstacle,
        );
        if dist > GAP_EXEMPT_RADIUS {
            desired += steering::narrow_gap_push(pos, ctx.gaps);
        }
        if stay_inside {
            desired += steering::boundary_push(pos, &ctx.room.interior(), r, false);
        }

        let wants_to_move = dist > SERVICE_ARRIVE_RADIUS;
        if self.stuck.update(speed, wants_to_move, dt) {
            self.velocity += steering::jitter_impulse(aim - pos, self.id.parity());
        }

        steering::integrate(&mut self.position, &mut self.velocity, desired, dt, &params);
        steering::resolve_penetration(&mut self.position, &mut self.velocity, r, &route_circles);
        if stay_inside {
            self.position = inner.clamp(self.position);
        }
        false
    }
}

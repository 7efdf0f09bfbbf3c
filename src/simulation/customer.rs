//! Customer agents and their visit lifecycle
//!
//! A customer walks in through its door lane, waits in the foyer for a seat,
//! sits, optionally visits the restroom once, and leaves. Transitions that only
//! depend on the customer itself happen here; anything touching shared seat or
//! table state is reported back to the world as a `CustomerUpdateResult`.

use std::collections::HashMap;
use std::fmt;

use super::config::SimConfig;
use super::obstacles::{Circle, ObstacleSet};
use super::room::Room;
use super::seats::{SeatAnchor, SeatId};
use super::spatial::{AgentSample, SpatialHash};
use super::steering::{self, StuckTracker, CUSTOMER_PARAMS};
use super::types::{AgentId, AgentKind, Position, TableId};

/// Seconds a restroom visit keeps the customer out of sight
pub const RESTROOM_USE_SECS: f32 = 10.0;
/// Earliest a restroom trip may start after sitting down
pub const RESTROOM_MIN_DELAY: f32 = 5.0;
/// A trip must be over this long before the planned departure
pub const RESTROOM_END_MARGIN: f32 = 12.0;

/// A restroom trip is cut short this close to the planned departure
const RESTROOM_RETURN_MARGIN: f32 = 0.5;

/// Distance at which a customer snaps into its seat
pub const SEAT_SNAP_RADIUS: f32 = 0.2;
/// Distance at which the approach point counts as reached
const APPROACH_REACHED: f32 = 0.3;
/// Distance at which the restroom door counts as reached
const RESTROOM_REACHED: f32 = 0.3;
/// Speed of the scripted walk off stage
const OFFSTAGE_SPEED: f32 = 1.0;
const OFFSTAGE_REACHED: f32 = 0.1;

/// Lifecycle phase of a customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomerPhase {
    ApproachDoor,
    Foyer,
    ToSeat,
    Seated,
    ToiletGo,
    ToiletUse,
    Exit,
    Outside,
}

impl CustomerPhase {
    pub fn label(&self) -> &'static str {
        match self {
            CustomerPhase::ApproachDoor => "approachDoor",
            CustomerPhase::Foyer => "foyer",
            CustomerPhase::ToSeat => "toSeat",
            CustomerPhase::Seated => "seated",
            CustomerPhase::ToiletGo => "toiletGo",
            CustomerPhase::ToiletUse => "toiletUse",
            CustomerPhase::Exit => "exit",
            CustomerPhase::Outside => "outside",
        }
    }

    /// Phases driven by the steering engine
    pub fn is_walking(&self) -> bool {
        matches!(
            self,
            CustomerPhase::ApproachDoor
                | CustomerPhase::Foyer
                | CustomerPhase::ToSeat
                | CustomerPhase::ToiletGo
                | CustomerPhase::Exit
        )
    }

    /// Phases that may cross the front wall line
    pub fn passes_door(&self) -> bool {
        matches!(self, CustomerPhase::ApproachDoor | CustomerPhase::Exit)
    }

    pub fn is_visible(&self) -> bool {
        !matches!(self, CustomerPhase::ToiletUse)
    }
}

impl fmt::Display for CustomerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Restroom trip bookkeeping; rolled once per visit
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RestroomPlan {
    pub elected: bool,
    /// Scheduled start, if a trip fits in the stay
    pub at: Option<f32>,
    pub done: bool,
}

/// Result of a customer update indicating what the world must do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CustomerUpdateResult {
    Continue,
    /// Waiting in the foyer and ready for a seat
    WantsSeat,
    /// Gave up waiting; already switched to `Exit`
    Balked,
    /// Snapped into the assigned seat for the first time
    ArrivedAtSeat(SeatId),
    /// Back in the seat after the restroom
    ReturnedToSeat(SeatId),
    /// Stay is over; the seat must be released
    LeaveSeat(SeatId),
    /// The assigned seat no longer exists
    SeatLost,
    /// Crossed the outside threshold; already switched to `Outside`
    Departed,
    /// Reached the off-stage point; drop from the pool
    Remove,
}

/// Read-only state a customer steers against
pub struct CustomerContext<'a> {
    pub now: f32,
    pub room: &'a Room,
    pub config: &'a SimConfig,
    pub seats: &'a HashMap<SeatId, SeatAnchor>,
    pub neighbors: &'a SpatialHash,
    pub obstacles: &'a ObstacleSet,
}

/// A customer agent
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: AgentId,
    pub position: Position,
    pub velocity: Position,
    /// Door lane used on the way in and out
    pub lane: usize,
    pub phase: CustomerPhase,
    pub target: Position,
    pub seat: Option<SeatId>,
    pub leave_at: Option<f32>,
    pub phase_started: f32,
    pub stuck: StuckTracker,
    pub restroom: RestroomPlan,
    pub seated_at: Option<f32>,
    /// Set once the customer has sat down this visit
    pub has_sat: bool,
    /// Walking the last stretch from the approach point into the seat
    pub final_leg: bool,
    /// Leaving customers first head for the inside of the door
    pub reached_door: bool,
}

impl Customer {
    pub fn new(id: AgentId, lane: usize, room: &Room, now: f32) -> Self {
        let position = room.spawn_point(lane);
        Self {
            id,
            position,
            velocity: Position::ZERO,
            lane,
            phase: CustomerPhase::ApproachDoor,
            target: room.door_inside_point(lane),
            seat: None,
            leave_at: None,
            phase_started: now,
            stuck: StuckTracker::default(),
            restroom: RestroomPlan::default(),
            seated_at: None,
            has_sat: false,
            final_leg: false,
            reached_door: false,
        }
    }

    fn enter(&mut self, phase: CustomerPhase, now: f32) {
        self.phase = phase;
        self.phase_started = now;
        self.stuck = StuckTracker::default();
    }

    /// Counts towards its table's occupancy
    pub fn occupies_seat(&self) -> bool {
        self.has_sat
            && self.seat.is_some()
            && !matches!(self.phase, CustomerPhase::Exit | CustomerPhase::Outside)
    }

    /// Stationary obstacle for everyone else
    pub fn is_seated_obstacle(&self) -> bool {
        self.phase == CustomerPhase::Seated
    }

    /// Walking body staff should route around
    pub fn is_crowd_obstacle(&self) -> bool {
        self.phase.is_walking()
    }

    pub fn body(&self) -> Circle {
        Circle::new(self.position, CUSTOMER_PARAMS.radius)
    }

    pub fn sample(&self) -> AgentSample {
        AgentSample {
            id: self.id,
            kind: AgentKind::Customer,
            position: self.position,
            velocity: self.velocity,
            radius: CUSTOMER_PARAMS.radius,
            pinned: false,
        }
    }

    /// Head for a seat from the foyer (or back to it after the restroom)
    pub fn assign_seat(&mut self, seat: SeatId, now: f32) {
        self.seat = Some(seat);
        self.final_leg = false;
        self.enter(CustomerPhase::ToSeat, now);
    }

    /// First sit-down of the visit
    pub fn sit(&mut self, now: f32, leave_at: f32, restroom: RestroomPlan) {
        self.has_sat = true;
        self.seated_at = Some(now);
        self.leave_at = Some(leave_at);
        self.restroom = restroom;
        self.velocity = Position::ZERO;
        self.enter(CustomerPhase::Seated, now);
    }

    /// Back from the restroom: keep the original leave time and plan
    pub fn resume_seat(&mut self, now: f32) {
        self.velocity = Position::ZERO;
        self.enter(CustomerPhase::Seated, now);
    }

    /// Give up the seat (if any) and walk out
    pub fn start_exit(&mut self, now: f32) {
        self.seat = None;
        self.reached_door = false;
        self.enter(CustomerPhase::Exit, now);
    }

    /// Seat vanished before the customer sat down: queue again
    pub fn return_to_foyer(&mut self, now: f32) {
        self.seat = None;
        self.final_leg = false;
        self.enter(CustomerPhase::Foyer, now);
    }

    pub fn update(&mut self, ctx: &CustomerContext, dt: f32) -> CustomerUpdateResult {
        let room = ctx.room;
        match self.phase {
            CustomerPhase::ApproachDoor => {
                self.target = room.door_inside_point(self.lane);
                self.steer(ctx, dt, None);
                if self.position.z < room.entry_threshold_z() {
                    self.enter(CustomerPhase::Foyer, ctx.now);
                    return CustomerUpdateResult::WantsSeat;
                }
                CustomerUpdateResult::Continue
            }
            CustomerPhase::Foyer => {
                if ctx.now - self.phase_started > ctx.config.foyer_patience() {
                    self.start_exit(ctx.now);
                    return CustomerUpdateResult::Balked;
                }
                self.target = room.foyer_point();
                self.steer(ctx, dt, None);
                CustomerUpdateResult::WantsSeat
            }
            CustomerPhase::ToSeat => {
                let Some(seat_id) = self.seat else {
                    return CustomerUpdateResult::SeatLost;
                };
                let Some(anchor) = ctx.seats.get(&seat_id) else {
                    return CustomerUpdateResult::SeatLost;
                };
                if !self.final_leg {
                    self.target = anchor.approach;
                    if self.position.distance(&anchor.approach) < APPROACH_REACHED {
                        self.final_leg = true;
                    }
                }
                if self.final_leg {
                    self.target = anchor.position;
                }

                let own_table = self.final_leg.then_some(anchor.table);
                self.steer(ctx, dt, own_table);

                if self.final_leg && self.position.distance(&anchor.position) < SEAT_SNAP_RADIUS {
                    self.position = anchor.position;
                    self.velocity = Position::ZERO;
                    return if self.has_sat {
                        CustomerUpdateResult::ReturnedToSeat(seat_id)
                    } else {
                        CustomerUpdateResult::ArrivedAtSeat(seat_id)
                    };
                }
                CustomerUpdateResult::Continue
            }
            CustomerPhase::Seated => {
                let Some(seat_id) = self.seat else {
                    return CustomerUpdateResult::SeatLost;
                };
                match ctx.seats.get(&seat_id) {
                    // Follow the seat if its table was moved
                    Some(anchor) => self.position = anchor.position,
                    None => return CustomerUpdateResult::SeatLost,
                }
                self.velocity = Position::ZERO;

                if let Some(at) = self.restroom.at {
                    if !self.restroom.done && ctx.now >= at {
                        self.target = room.restroom_point();
                        self.enter(CustomerPhase::ToiletGo, ctx.now);
                        return CustomerUpdateResult::Continue;
                    }
                }
                match self.leave_at {
                    Some(leave_at) if ctx.now >= leave_at => CustomerUpdateResult::LeaveSeat(seat_id),
                    _ => CustomerUpdateResult::Continue,
                }
            }
            CustomerPhase::ToiletGo => {
                if self.restroom_overdue(ctx.now) {
                    self.head_back_from_restroom(ctx.now);
                    return CustomerUpdateResult::Continue;
                }
                self.target = room.restroom_point();
                self.steer(ctx, dt, None);
                if self.position.distance(&self.target) < RESTROOM_REACHED {
                    self.position = self.target;
                    self.velocity = Position::ZERO;
                    self.enter(CustomerPhase::ToiletUse, ctx.now);
                }
                CustomerUpdateResult::Continue
            }
            CustomerPhase::ToiletUse => {
                if ctx.now - self.phase_started >= RESTROOM_USE_SECS || self.restroom_overdue(ctx.now) {
                    self.head_back_from_restroom(ctx.now);
                }
                CustomerUpdateResult::Continue
            }
            CustomerPhase::Exit => {
                let inside = room.door_inside_point(self.lane);
                if !self.reached_door
                    && (self.position.distance(&inside) < 0.5
                        || self.position.z > room.entry_threshold_z())
                {
                    self.reached_door = true;
                }
                self.target = if self.reached_door {
                    room.spawn_point(self.lane)
                } else {
                    inside
                };
                self.steer(ctx, dt, None);
                if self.position.z > room.outside_threshold_z() {
                    self.target = room.offstage_point();
                    self.enter(CustomerPhase::Outside, ctx.now);
                    return CustomerUpdateResult::Departed;
                }
                CustomerUpdateResult::Continue
            }
            CustomerPhase::Outside => {
                // Scripted drift, no steering or avoidance
                let offstage = room.offstage_point();
                let delta = offstage - self.position;
                let step = OFFSTAGE_SPEED * dt;
                if delta.length() <= step.max(OFFSTAGE_REACHED) {
                    self.position = offstage;
                    return CustomerUpdateResult::Remove;
                }
                self.velocity = delta.normalized() * OFFSTAGE_SPEED;
                self.position += self.velocity * dt;
                CustomerUpdateResult::Continue
            }
        }
    }

    /// The planned departure is about to pass while away from the seat
    fn restroom_overdue(&self, now: f32) -> bool {
        self.leave_at
            .is_some_and(|leave_at| leave_at - now <= RESTROOM_RETURN_MARGIN)
    }

    fn head_back_from_restroom(&mut self, now: f32) {
        self.restroom.done = true;
        self.final_leg = false;
        self.enter(CustomerPhase::ToSeat, now);
    }

    /// One steering step towards `self.target`. `own_table` is excluded from
    /// soft avoidance so the final approach into a seat is not pushed back.
    fn steer(&mut self, ctx: &CustomerContext, dt: f32, own_table: Option<TableId>) {
        let params = CUSTOMER_PARAMS;
        let pairs = &ctx.config.avoidance;
        let room = ctx.room;
        let through_door = self.phase.passes_door();
        let pos = self.position;
        let r = params.radius;

        let mut desired = steering::seek(pos, self.target, params.max_speed);
        if through_door {
            desired += steering::lane_bias(pos, room.lane_x(self.lane), room.front_z());
        }

        let reach = steering::SEPARATION_RADIUS
            .max(pairs.customer_customer.radius + 2.0 * r)
            .max(pairs.customer_staff.radius + 2.0 * r);
        let neighbors: Vec<&AgentSample> = ctx
            .neighbors
            .neighbors(pos, reach)
            .filter(|s| s.id != self.id)
            .collect();

        desired += steering::separation(pos, self.id, neighbors.iter().copied());
        desired += steering::avoidance(
            pos,
            r,
            neighbors
                .iter()
                .filter(|s| s.kind == AgentKind::Customer)
                .map(|s| Circle::new(s.position, s.radius)),
            pairs.customer_customer,
        );
        desired += steering::avoidance(
            pos,
            r,
            neighbors
                .iter()
                .filter(|s| s.kind == AgentKind::Staff)
                .map(|s| Circle::new(s.position, s.radius)),
            pairs.customer_staff,
        );
        desired += steering::avoidance(
            pos,
            r,
            ctx.obstacles
                .for_customers()
                .filter(|o| !o.is_agent(self.id))
                .filter(|o| own_table.map_or(true, |t| !o.is_table(t)))
                .map(|o| o.circle),
            pairs.customer_obstacle,
        );
        desired += steering::boundary_push(pos, &room.interior(), r, through_door);

        let to_target = self.target - pos;
        let wants_to_move = to_target.length() > SEAT_SNAP_RADIUS;
        if self.stuck.update(self.velocity.length(), wants_to_move, dt) {
            self.velocity += steering::jitter_impulse(to_target, self.id.parity());
        }

        steering::integrate(&mut self.position, &mut self.velocity, desired, dt, &params);

        let hard: Vec<Circle> = ctx
            .obstacles
            .for_customers()
            .filter(|o| !o.is_agent(self.id))
            .map(|o| o.circle)
            .collect();
        steering::resolve_penetration(&mut self.position, &mut self.velocity, r, &hard);
        self.position = room.clamp_agent(self.position, r, through_door);
    }
}

/// Restroom start time for a customer sitting down at `now` and leaving at
/// `leave_at`: about mid-stay, never before `now + 5` and never after
/// `leave_at - 12`. `None` when the stay is too short for a trip.
pub fn plan_restroom_trip(now: f32, leave_at: f32) -> Option<f32> {
    let earliest = now + RESTROOM_MIN_DELAY;
    let latest = leave_at - RESTROOM_END_MARGIN;
    if latest < earliest {
        return None;
    }
    Some(((now + leave_at) * 0.5).clamp(earliest, latest))
}

//! Main simulation world that ties everything together
//!
//! This is the entry point for running the restaurant simulation without
//! any rendering layer. `RestaurantWorld` owns the floor layout, every agent
//! and all counters, and advances them through `tick`. Callers read it
//! through views and snapshots between ticks.

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::collections::{HashMap, VecDeque};

use super::config::{ConfigDiagnostics, SimConfig};
use super::customer::{
    plan_restroom_trip, Customer, CustomerContext, CustomerPhase, CustomerUpdateResult,
    RestroomPlan,
};
use super::obstacles::{find_narrow_gaps, Circle, NarrowGap, ObstacleSet};
use super::room::{Room, LANE_COUNT};
use super::seats::{generate_anchors, SeatAnchor, SeatId};
use super::service::{RequestQueue, ServiceRequest};
use super::session::SessionTimer;
use super::spatial::SpatialHash;
use super::staff::{StaffAgent, StaffContext, StaffPhase, StaffUpdateResult};
use super::staff_manager::StaffPool;
use super::stats::{SimStats, Throughput};
use super::steering::NARROW_GAP_THRESHOLD;
use super::table::{auto_layout, validate_layout, Table};
use super::types::{
    finite_or, AgentId, AgentKind, Position, RequestId, SimId, TableId, AGENT_RADIUS, EPSILON,
    HARD_PAD, MAX_DT, MIN_DT,
};

/// Oldest events are dropped past this many undrained entries
const MAX_EVENTS: usize = 4096;

/// Times a request is handed back to the queue after a staff member gave up
const MAX_REQUEST_RETRIES: u32 = 2;

/// Upper bound on passes of the agent-agent overlap resolver per tick
const SEPARATION_PASSES: usize = 4;

/// Candidate pairs are gathered once per tick from this far apart, so pairs
/// pushed into contact by an earlier pass are still checked
const SEPARATION_QUERY_RADIUS: f32 = 2.0 * (2.0 * AGENT_RADIUS + HARD_PAD);

/// Something callers may want to react to (sounds, highlights, logs)
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    CustomerSpawned { agent: AgentId, lane: usize },
    CustomerSeated { agent: AgentId, seat: SeatId },
    TableOccupied(TableId),
    ServiceRequested { request: RequestId, table: TableId },
    ServiceStarted { staff: AgentId, table: TableId },
    ServiceCompleted { staff: AgentId, table: TableId },
    TableVacated(TableId),
    CustomerDeparted { agent: AgentId, served: bool },
    CustomerBalked(AgentId),
    StaffTeleported(AgentId),
}

/// Read-only per-agent state for the render layer
#[derive(Debug, Clone, PartialEq)]
pub struct AgentView {
    pub id: AgentId,
    pub kind: AgentKind,
    pub position: Position,
    pub yaw: f32,
    pub phase: &'static str,
    pub visible: bool,
}

/// A body taking part in agent-agent overlap resolution
#[derive(Debug, Clone, Copy)]
struct Body {
    id: AgentId,
    kind: AgentKind,
    index: usize,
    position: Position,
    pinned: bool,
    /// Customers allowed through the front wall between the jambs
    through_door: bool,
    /// Exiting staff ignore the walls
    unclamped: bool,
}

/// The main simulation world
pub struct RestaurantWorld {
    config: SimConfig,

    /// Remembers which config fields were already reported invalid
    diagnostics: ConfigDiagnostics,

    room: Room,

    /// All tables
    tables: HashMap<TableId, Table>,

    /// Seat anchors derived from the tables
    seats: HashMap<SeatId, SeatAnchor>,

    /// Seated customers per table; tables absent from the map are empty
    occupancy: HashMap<TableId, usize>,

    /// All customers still on stage
    pub customers: Vec<Customer>,

    pub staff: StaffPool,

    requests: RequestQueue,

    obstacles: ObstacleSet,

    gaps: Vec<NarrowGap>,

    neighbors: SpatialHash,

    /// Next ID to assign
    next_id: usize,

    /// Simulation time; only advances while running
    pub time: f32,

    running: bool,

    /// Arrivals waiting to come through the door
    pending_arrivals: usize,

    /// Last effective incoming value seen
    arrival_watermark: u32,

    /// Fractional auto arrivals not yet counted
    auto_arrival_fraction: f32,

    /// Base arrivals generated from the per-minute rate so far
    auto_arrivals: u32,

    throughput: Throughput,

    session: SessionTimer,

    events: VecDeque<SimEvent>,

    /// Optional seeded RNG for reproducible simulations
    rng: Option<StdRng>,
}

impl Default for RestaurantWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl RestaurantWorld {
    fn new_internal(rng: Option<StdRng>, config: SimConfig) -> Self {
        let mut diagnostics = ConfigDiagnostics::new();
        let mut config = config;
        config.normalize(&mut diagnostics);
        let room = Room::from_config(&config.room);
        let session = SessionTimer::new(config.session_length_secs);

        let mut world = Self {
            config,
            diagnostics,
            room,
            tables: HashMap::new(),
            seats: HashMap::new(),
            occupancy: HashMap::new(),
            customers: Vec::new(),
            staff: StaffPool::new(),
            requests: RequestQueue::new(),
            obstacles: ObstacleSet::new(),
            gaps: Vec::new(),
            neighbors: SpatialHash::default(),
            next_id: 0,
            time: 0.0,
            running: true,
            pending_arrivals: 0,
            arrival_watermark: 0,
            auto_arrival_fraction: 0.0,
            auto_arrivals: 0,
            throughput: Throughput::default(),
            session,
            events: VecDeque::new(),
            rng,
        };
        world.relayout();
        world.sync_arrivals();
        world
    }

    pub fn new() -> Self {
        Self::new_internal(None, SimConfig::default())
    }

    /// Create a new world with a seeded RNG for reproducible restroom rolls
    pub fn new_with_seed(seed: u64) -> Self {
        Self::new_internal(Some(StdRng::seed_from_u64(seed)), SimConfig::default())
    }

    pub fn new_with_config(config: SimConfig) -> Self {
        Self::new_internal(None, config)
    }

    pub fn new_with_config_and_seed(config: SimConfig, seed: u64) -> Self {
        Self::new_internal(Some(StdRng::seed_from_u64(seed)), config)
    }

    /// Roll a probability, using seeded RNG if available
    fn random_bool(&mut self, probability: f32) -> bool {
        let p = f64::from(finite_or(probability, 0.0).clamp(0.0, 1.0));
        match &mut self.rng {
            Some(rng) => rng.random_bool(p),
            None => rand::rng().random_bool(p),
        }
    }

    fn next_sim_id(&mut self) -> SimId {
        let id = SimId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Fresh id for a table the caller is about to place
    pub fn next_table_id(&mut self) -> TableId {
        TableId(self.next_sim_id())
    }

    fn push_event(&mut self, event: SimEvent) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Take every event since the last drain
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.events.drain(..).collect()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &ConfigDiagnostics {
        &self.diagnostics
    }

    /// Normalize and apply a new configuration. Room or table-count changes
    /// rebuild the automatic layout.
    pub fn apply_config(&mut self, config: SimConfig) {
        let mut config = config;
        config.normalize(&mut self.diagnostics);

        let room_changed = config.room != self.config.room;
        let layout_changed = room_changed
            || config.two_seat_tables != self.config.two_seat_tables
            || config.four_seat_tables != self.config.four_seat_tables;
        self.config = config;

        if room_changed {
            self.room.apply_config(&self.config.room);
            self.staff.refresh_homes(&self.room);
        }
        if layout_changed {
            self.relayout();
        }
        self.session.set_length(self.config.session_length_secs);
        self.sync_arrivals();
    }

    fn relayout(&mut self) {
        let room = self.room.clone();
        let two_seat = self.config.two_seat_tables;
        let four_seat = self.config.four_seat_tables;
        let tables = auto_layout(&room, two_seat, four_seat, || self.next_table_id());
        if let Err(err) = self.set_tables(tables) {
            warn!("Automatic layout rejected: {:#}", err);
        }
    }

    /// Replace the whole layout. Overlapping or out-of-room tables are
    /// rejected and the previous layout stays in force.
    pub fn set_tables(&mut self, tables: Vec<Table>) -> Result<()> {
        validate_layout(&tables, &self.room).context("Table layout rejected")?;

        let inner = self.room.inner(AGENT_RADIUS);
        self.seats = generate_anchors(&tables, &inner)
            .into_iter()
            .map(|anchor| (anchor.id, anchor))
            .collect();
        self.obstacles
            .set_tables(tables.iter().map(|t| (t.id, t.circle())));
        self.tables = tables.into_iter().map(|t| (t.id, t)).collect();

        self.reassign_stale_seats();
        let tables = &self.tables;
        self.requests.retain_tables(|t| tables.contains_key(&t));
        self.staff.abandon_missing_tables(|t| tables.contains_key(&t));
        self.recount_occupancy();
        self.refresh_obstacles();

        info!(
            "Layout now has {} tables and {} seats",
            self.tables.len(),
            self.seats.len()
        );
        Ok(())
    }

    /// Move or rotate one table, subject to the same validation as `set_tables`
    pub fn move_table(&mut self, id: TableId, center: Position, yaw: f32) -> Result<()> {
        let mut tables: Vec<Table> = self.tables().into_iter().cloned().collect();
        let table = tables
            .iter_mut()
            .find(|t| t.id == id)
            .with_context(|| format!("No table {}", id))?;
        table.center = center;
        table.yaw = yaw;
        self.set_tables(tables)
    }

    pub fn set_door_offset(&mut self, door_left: f32) {
        self.room.set_door_left(door_left);
    }

    pub fn set_kitchen_offset(&mut self, x: f32) {
        self.room.set_kitchen_offset(x);
        self.staff.refresh_homes(&self.room);
    }

    pub fn set_restroom_offset(&mut self, z: f32) {
        self.room.set_restroom_offset(z);
    }

    /// Holders of seats that no longer exist get a new seat or are sent on
    fn reassign_stale_seats(&mut self) {
        let now = self.time;
        for index in 0..self.customers.len() {
            let Some(seat) = self.customers[index].seat else {
                continue;
            };
            if self.seats.contains_key(&seat) {
                continue;
            }
            self.customers[index].seat = None;
            let replacement = self.nearest_free_seat(self.customers[index].position);
            let customer = &mut self.customers[index];
            let away = matches!(
                customer.phase,
                CustomerPhase::ToiletGo | CustomerPhase::ToiletUse
            );
            match replacement {
                Some(seat) if away => customer.seat = Some(seat),
                Some(seat) => customer.assign_seat(seat, now),
                None if customer.has_sat => customer.start_exit(now),
                None => customer.return_to_foyer(now),
            }
            debug!("Customer {} lost seat {:?}; now {}", customer.id, seat, customer.phase);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Pausing freezes customers and sends staff off the floor; resuming
    /// rebuilds the staff pool from zero.
    pub fn set_running(&mut self, running: bool) {
        if running == self.running {
            return;
        }
        self.running = running;
        if running {
            self.staff.clear();
            info!("Simulation resumed at {:.1}s", self.time);
        } else {
            let in_flight = self.staff.begin_exit(&self.room);
            for request in in_flight.into_iter().rev() {
                self.requests.requeue_front(request);
            }
            info!("Simulation paused at {:.1}s; staff leaving the floor", self.time);
        }
    }

    /// Feed real elapsed time to the session countdown
    pub fn advance_wall_clock(&mut self, elapsed_secs: f32) {
        if self.session.advance(elapsed_secs, self.running) {
            info!("Session time is up; pausing");
            self.set_running(false);
        }
    }

    pub fn reset_timer(&mut self) {
        self.session.reset();
    }

    pub fn session(&self) -> &SessionTimer {
        &self.session
    }

    /// Main simulation tick
    pub fn tick(&mut self, delta_secs: f32) {
        let dt = finite_or(delta_secs, MIN_DT).clamp(MIN_DT, MAX_DT);

        if self.running {
            self.time += dt;
            self.accumulate_auto_arrivals(dt);
            self.sync_arrivals();
            self.spawn_arrival();
            self.refresh_obstacles();
            self.update_customers(dt);
        }

        self.refresh_obstacles();
        self.update_staff(dt);
        self.separate_agents();
    }

    fn accumulate_auto_arrivals(&mut self, dt: f32) {
        if self.config.arrivals_per_minute <= 0.0 {
            return;
        }
        self.auto_arrival_fraction += self.config.arrivals_per_minute * dt / 60.0;
        let whole = self.auto_arrival_fraction.floor();
        if whole >= 1.0 {
            self.auto_arrivals = self.auto_arrivals.saturating_add(whole as u32);
            self.auto_arrival_fraction -= whole;
        }
    }

    /// Grow the pending counter by however much effective incoming rose
    fn sync_arrivals(&mut self) {
        let effective = self.config.effective_incoming(self.auto_arrivals);
        if effective > self.arrival_watermark {
            let added = (effective - self.arrival_watermark) as usize;
            self.pending_arrivals += added;
            debug!("{} new arrivals pending ({} total)", added, self.pending_arrivals);
        }
        self.arrival_watermark = effective;
    }

    /// Spawn at most one customer, respecting the door cap and a free lane
    fn spawn_arrival(&mut self) {
        if self.pending_arrivals == 0 {
            return;
        }
        let at_door = self
            .customers
            .iter()
            .filter(|c| c.phase == CustomerPhase::ApproachDoor)
            .count();
        if at_door >= self.room.door_capacity(AGENT_RADIUS) {
            return;
        }

        let clearance = 2.0 * AGENT_RADIUS + HARD_PAD;
        let first = self.throughput.spawned % LANE_COUNT;
        let lane = (0..LANE_COUNT)
            .map(|k| (first + k) % LANE_COUNT)
            .find(|&lane| {
                let spawn = self.room.spawn_point(lane);
                self.customers.iter().all(|c| {
                    c.phase == CustomerPhase::Outside || c.position.distance(&spawn) >= clearance
                })
            });
        let Some(lane) = lane else {
            return;
        };

        let id = AgentId(self.next_sim_id());
        self.customers
            .push(Customer::new(id, lane, &self.room, self.time));
        self.pending_arrivals -= 1;
        self.throughput.spawned += 1;
        debug!("Customer {} spawned in lane {}", id, lane);
        self.push_event(SimEvent::CustomerSpawned { agent: id, lane });
    }

    /// Rebuild the per-tick customer obstacle sets and the spatial hash
    fn refresh_obstacles(&mut self) {
        self.obstacles.set_customers(
            self.customers
                .iter()
                .filter(|c| c.is_seated_obstacle())
                .map(|c| (c.id, c.body())),
            self.customers
                .iter()
                .filter(|c| c.is_crowd_obstacle())
                .map(|c| (c.id, c.body())),
        );
        self.gaps = find_narrow_gaps(
            self.obstacles.tables.iter().chain(self.obstacles.seated.iter()),
            NARROW_GAP_THRESHOLD,
        );
        self.refresh_neighbors();
    }

    fn refresh_neighbors(&mut self) {
        self.neighbors.rebuild(
            self.customers
                .iter()
                .filter(|c| c.phase.is_walking() || c.phase == CustomerPhase::Seated)
                .map(Customer::sample)
                .chain(
                    self.staff
                        .agents
                        .iter()
                        .filter(|a| a.phase != StaffPhase::Despawn)
                        .map(StaffAgent::sample),
                ),
        );
    }

    fn update_customers(&mut self, dt: f32) {
        let ctx = CustomerContext {
            now: self.time,
            room: &self.room,
            config: &self.config,
            seats: &self.seats,
            neighbors: &self.neighbors,
            obstacles: &self.obstacles,
        };

        let mut results = Vec::new();
        for customer in &mut self.customers {
            let result = customer.update(&ctx, dt);
            if result != CustomerUpdateResult::Continue {
                results.push((customer.id, result));
            }
        }

        let mut removed = Vec::new();
        for (id, result) in results {
            if self.handle_customer_result(id, result) {
                removed.push(id);
            }
        }
        if !removed.is_empty() {
            self.customers.retain(|c| !removed.contains(&c.id));
        }
        self.recount_occupancy();
    }

    /// Apply one customer result. Returns true when the customer should be
    /// dropped from the pool.
    fn handle_customer_result(&mut self, id: AgentId, result: CustomerUpdateResult) -> bool {
        let now = self.time;
        let Some(index) = self.customers.iter().position(|c| c.id == id) else {
            return false;
        };

        match result {
            CustomerUpdateResult::Continue => {}
            CustomerUpdateResult::WantsSeat => {
                if let Some(seat) = self.nearest_free_seat(self.customers[index].position) {
                    debug!("Customer {} heading to seat {:?}", id, seat);
                    self.customers[index].assign_seat(seat, now);
                }
            }
            CustomerUpdateResult::Balked => {
                self.throughput.balked += 1;
                debug!("Customer {} gave up waiting for a seat", id);
                self.push_event(SimEvent::CustomerBalked(id));
            }
            CustomerUpdateResult::ArrivedAtSeat(seat) => {
                let table_is_new = !self.occupancy.contains_key(&seat.table);
                let active = self.occupancy.len() + usize::from(table_is_new);
                let coefficient = self.config.service_coefficient(active);
                let leave_at = now + self.config.stay_duration(coefficient);
                let elected = self.random_bool(self.config.toilet_probability);
                let restroom = RestroomPlan {
                    elected,
                    at: if elected {
                        plan_restroom_trip(now, leave_at)
                    } else {
                        None
                    },
                    done: false,
                };
                debug!(
                    "Customer {} seated at {:?} until {:.1}s (restroom {:?})",
                    id, seat, leave_at, restroom.at
                );
                self.customers[index].sit(now, leave_at, restroom);
                self.push_event(SimEvent::CustomerSeated { agent: id, seat });
            }
            CustomerUpdateResult::ReturnedToSeat(_) => {
                self.customers[index].resume_seat(now);
            }
            CustomerUpdateResult::LeaveSeat(seat) => {
                debug!("Customer {} leaving seat {:?}", id, seat);
                self.customers[index].start_exit(now);
            }
            CustomerUpdateResult::SeatLost => {
                self.customers[index].seat = None;
                let replacement = self.nearest_free_seat(self.customers[index].position);
                let customer = &mut self.customers[index];
                match replacement {
                    Some(seat) => customer.assign_seat(seat, now),
                    None if customer.has_sat => customer.start_exit(now),
                    None => customer.return_to_foyer(now),
                }
            }
            CustomerUpdateResult::Departed => {
                let served = self.customers[index].has_sat;
                self.throughput.departed += 1;
                if served {
                    self.throughput.served += 1;
                    self.throughput.revenue += self.config.effective_average_spend();
                }
                debug!("Customer {} departed (served: {})", id, served);
                self.push_event(SimEvent::CustomerDeparted { agent: id, served });
            }
            CustomerUpdateResult::Remove => return true,
        }
        false
    }

    fn seat_taken(&self, seat: SeatId) -> bool {
        self.customers.iter().any(|c| c.seat == Some(seat))
    }

    /// Closest unreserved seat, ties broken by seat id
    fn nearest_free_seat(&self, from: Position) -> Option<SeatId> {
        self.seats
            .values()
            .filter(|anchor| !self.seat_taken(anchor.id))
            .min_by_key(|anchor| (OrderedFloat(anchor.position.distance(&from)), anchor.id))
            .map(|anchor| anchor.id)
    }

    /// Recompute table occupancy from the customers holding seats. A table
    /// going from empty to occupied raises one service request.
    fn recount_occupancy(&mut self) {
        let mut counts: HashMap<TableId, usize> = HashMap::new();
        for customer in self.customers.iter().filter(|c| c.occupies_seat()) {
            if let Some(seat) = customer.seat {
                *counts.entry(seat.table).or_default() += 1;
            }
        }

        let mut occupied: Vec<TableId> = counts
            .keys()
            .filter(|t| !self.occupancy.contains_key(*t))
            .copied()
            .collect();
        let mut vacated: Vec<TableId> = self
            .occupancy
            .keys()
            .filter(|t| !counts.contains_key(*t))
            .copied()
            .collect();
        occupied.sort();
        vacated.sort();
        self.occupancy = counts;

        for table in occupied {
            self.push_event(SimEvent::TableOccupied(table));
            self.raise_request(table);
        }
        for table in &vacated {
            debug!("Table {} is empty again", table);
            self.push_event(SimEvent::TableVacated(*table));
        }
        if !vacated.is_empty() {
            let occupancy = &self.occupancy;
            self.requests.retain_tables(|t| occupancy.contains_key(&t));
        }
    }

    fn raise_request(&mut self, table: TableId) {
        let Some(position) = self.tables.get(&table).map(|t| t.center) else {
            return;
        };
        let id = RequestId(self.next_sim_id());
        self.requests.push(ServiceRequest {
            id,
            table,
            position,
            created_at: self.time,
            failed_attempts: 0,
        });
        debug!("Service requested for table {}", table);
        self.push_event(SimEvent::ServiceRequested { request: id, table });
    }

    /// Push apart any two agents closer than their hard radii. Runs last in
    /// the tick so nothing moves agents afterwards. Pinned agents (seated
    /// guests, idle or serving staff, every customer while paused) never move.
    fn separate_agents(&mut self) {
        let min_gap = 2.0 * AGENT_RADIUS + HARD_PAD;
        let frozen = !self.running;
        let mut bodies: Vec<Body> = self
            .customers
            .iter()
            .enumerate()
            .filter(|(_, c)| c.phase.is_walking() || c.phase == CustomerPhase::Seated)
            .map(|(index, c)| Body {
                id: c.id,
                kind: AgentKind::Customer,
                index,
                position: c.position,
                pinned: frozen || c.phase == CustomerPhase::Seated,
                through_door: c.phase.passes_door(),
                unclamped: false,
            })
            .chain(
                self.staff
                    .agents
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| a.phase != StaffPhase::Despawn)
                    .map(|(index, a)| Body {
                        id: a.id,
                        kind: AgentKind::Staff,
                        index,
                        position: a.position,
                        pinned: a.phase.is_pinned(),
                        through_door: false,
                        unclamped: a.phase == StaffPhase::Exiting,
                    }),
            )
            .collect();
        if bodies.len() < 2 {
            return;
        }

        // Staff moved after the last rebuild
        self.refresh_neighbors();
        let lookup: HashMap<AgentId, usize> =
            bodies.iter().enumerate().map(|(i, b)| (b.id, i)).collect();
        let mut pairs: Vec<(usize, usize)> = Vec::new();
        for (i, body) in bodies.iter().enumerate() {
            for other in self.neighbors.neighbors(body.position, SEPARATION_QUERY_RADIUS) {
                if let Some(&j) = lookup.get(&other.id) {
                    if j > i && !(body.pinned && bodies[j].pinned) {
                        pairs.push((i, j));
                    }
                }
            }
        }
        pairs.sort_unstable();
        pairs.dedup();
        if pairs.is_empty() {
            return;
        }

        let front_z = self.room.inner(AGENT_RADIUS).max_z;
        for _ in 0..SEPARATION_PASSES {
            let mut moved = false;
            for &(i, j) in &pairs {
                let (a, b) = (bodies[i], bodies[j]);
                let Some((normal, depth)) = contact(&a, &b, min_gap, front_z) else {
                    continue;
                };
                let (share_a, share_b) = match (a.pinned, b.pinned) {
                    (true, _) => (0.0, 1.0),
                    (_, true) => (1.0, 0.0),
                    _ => (0.5, 0.5),
                };
                if share_a > 0.0 {
                    bodies[i].position = self.settle(&a, a.position - normal * (depth * share_a));
                }
                if share_b > 0.0 {
                    bodies[j].position = self.settle(&b, b.position + normal * (depth * share_b));
                }
                moved = true;
            }
            if !moved {
                break;
            }
        }

        for body in bodies.iter().filter(|b| !b.pinned) {
            match body.kind {
                AgentKind::Customer => self.customers[body.index].position = body.position,
                AgentKind::Staff => self.staff.agents[body.index].position = body.position,
            }
        }
    }

    /// Keep a pushed body inside the walls it is bound by
    fn settle(&self, body: &Body, position: Position) -> Position {
        match body.kind {
            AgentKind::Customer => self.room.clamp_agent(position, AGENT_RADIUS, body.through_door),
            AgentKind::Staff if body.unclamped => position,
            AgentKind::Staff => self.room.inner(AGENT_RADIUS).clamp(position),
        }
    }

    fn update_staff(&mut self, dt: f32) {
        if self.running {
            let target = self.config.staff_count as usize;
            let next_id = &mut self.next_id;
            let (spawned, removed) = self.staff.sync_size(target, &self.room, || {
                let id = AgentId(SimId(*next_id));
                *next_id += 1;
                id
            });
            if spawned > 0 || removed > 0 {
                info!(
                    "Staff pool now {} (+{} / -{})",
                    self.staff.active_count(),
                    spawned,
                    removed
                );
            }
            for (staff, request) in
                self.staff
                    .assign_requests(&mut self.requests, &self.tables, &self.room)
            {
                debug!("Staff {} took the request for table {}", staff, request.table);
            }
        }

        let coefficient = self.service_coefficient();
        let ctx = StaffContext {
            room: &self.room,
            config: &self.config,
            tables: &self.tables,
            obstacles: &self.obstacles,
            gaps: &self.gaps,
            neighbors: &self.neighbors,
            service_coefficient: coefficient,
        };
        match self.staff.update_all(&ctx, dt) {
            Ok(results) => {
                for (id, result) in results {
                    self.handle_staff_result(id, result);
                }
            }
            Err(err) => self.recover_staff(err),
        }
    }

    fn handle_staff_result(&mut self, id: AgentId, result: StaffUpdateResult) {
        match result {
            StaffUpdateResult::Continue => {}
            StaffUpdateResult::ArrivedAtTable(table) => {
                debug!("Staff {} serving table {}", id, table);
                self.push_event(SimEvent::ServiceStarted { staff: id, table });
            }
            StaffUpdateResult::FinishedServing(table) => {
                self.throughput.requests_served += 1;
                self.push_event(SimEvent::ServiceCompleted { staff: id, table });
            }
            StaffUpdateResult::ReturnedToKitchen => {
                debug!("Staff {} back at the kitchen", id);
            }
            StaffUpdateResult::Despawned => {
                debug!("Staff {} left the floor", id);
            }
            StaffUpdateResult::Teleported(request) => {
                self.throughput.teleports += 1;
                self.push_event(SimEvent::StaffTeleported(id));
                self.retry_request(request);
            }
            StaffUpdateResult::Abandoned(request) => {
                debug!("Staff {} abandoned its task", id);
                self.retry_request(request);
            }
        }
    }

    /// Hand a dropped request back to the queue while the table still waits
    fn retry_request(&mut self, request: Option<ServiceRequest>) {
        let Some(mut request) = request else {
            return;
        };
        if !self.occupancy.contains_key(&request.table) {
            return;
        }
        if request.failed_attempts >= MAX_REQUEST_RETRIES {
            warn!(
                "Giving up on serving table {} after {} failed attempts",
                request.table, request.failed_attempts
            );
            return;
        }
        request.failed_attempts += 1;
        self.requests.requeue_front(request);
    }

    /// Fail to a known-good state: every staff member idle at the kitchen
    fn recover_staff(&mut self, err: anyhow::Error) {
        error!(
            "Staff tick failed: {:#}. Last known staff: {:?}",
            err,
            self.staff.snapshot()
        );
        let in_flight = self.staff.reset_to_kitchen(&self.room);
        for request in in_flight.into_iter().rev() {
            self.requests.requeue_front(request);
        }
        if !self.running {
            self.staff.begin_exit(&self.room);
        }
        info!("Staff pool reset to the kitchen");
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    /// All tables in id order
    pub fn tables(&self) -> Vec<&Table> {
        let mut tables: Vec<&Table> = self.tables.values().collect();
        tables.sort_by_key(|t| t.id);
        tables
    }

    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(&id)
    }

    pub fn seats(&self) -> &HashMap<SeatId, SeatAnchor> {
        &self.seats
    }

    pub fn customer(&self, id: AgentId) -> Option<&Customer> {
        self.customers.iter().find(|c| c.id == id)
    }

    pub fn table_occupancy(&self, table: TableId) -> usize {
        self.occupancy.get(&table).copied().unwrap_or(0)
    }

    pub fn active_tables(&self) -> usize {
        self.occupancy.len()
    }

    pub fn pending_arrivals(&self) -> usize {
        self.pending_arrivals
    }

    pub fn requests(&self) -> &RequestQueue {
        &self.requests
    }

    pub fn throughput(&self) -> &Throughput {
        &self.throughput
    }

    /// Current stay/service multiplier from the staff load
    pub fn service_coefficient(&self) -> f32 {
        self.config.service_coefficient(self.active_tables())
    }

    /// Combined obstacle circles (tables, seated guests, walking crowd)
    pub fn obstacles(&self) -> Vec<Circle> {
        self.obstacles.circles()
    }

    pub fn agent_views(&self) -> Vec<AgentView> {
        let heading = |velocity: Position| {
            if velocity.length() > EPSILON {
                Position::ZERO.angle_to(&velocity)
            } else {
                0.0
            }
        };

        let customers = self.customers.iter().map(|c| {
            let yaw = match (c.phase, c.seat.and_then(|s| self.seats.get(&s))) {
                (CustomerPhase::Seated, Some(anchor)) => anchor.yaw,
                _ => heading(c.velocity),
            };
            AgentView {
                id: c.id,
                kind: AgentKind::Customer,
                position: c.position,
                yaw,
                phase: c.phase.label(),
                visible: c.phase.is_visible(),
            }
        });

        let staff = self
            .staff
            .agents
            .iter()
            .filter(|a| a.phase != StaffPhase::Despawn)
            .map(|a| {
                let table = a
                    .assignment
                    .as_ref()
                    .and_then(|x| self.tables.get(&x.table));
                let yaw = match (a.phase, table) {
                    (StaffPhase::Serving, Some(table)) => a.position.angle_to(&table.center),
                    _ => heading(a.velocity),
                };
                AgentView {
                    id: a.id,
                    kind: AgentKind::Staff,
                    position: a.position,
                    yaw,
                    phase: a.phase.label(),
                    visible: true,
                }
            });

        customers.chain(staff).collect()
    }

    pub fn stats(&self) -> SimStats {
        let count = |f: fn(&Customer) -> bool| self.customers.iter().filter(|c| f(c)).count();
        SimStats {
            time: self.time,
            pending: self.pending_arrivals,
            inside: count(|c| {
                !matches!(
                    c.phase,
                    CustomerPhase::ApproachDoor | CustomerPhase::Exit | CustomerPhase::Outside
                )
            }),
            seated: count(Customer::occupies_seat),
            exiting: count(|c| c.phase == CustomerPhase::Exit),
            departed: self.throughput.departed,
            balked: self.throughput.balked,
            served: self.throughput.served,
            active_tables: self.active_tables(),
            table_count: self.tables.len(),
            seat_count: self.seats.len(),
            staff_count: self.staff.active_count(),
            utilization: self.staff.utilization(),
            pending_requests: self.requests.len(),
            service_coefficient: self.service_coefficient(),
            ..SimStats::default()
        }
        .with_rates(self.throughput.revenue)
    }

    /// Default floor with a steady stream of guests
    pub fn create_demo_world() -> Self {
        Self::build_demo_world(Self::new())
    }

    pub fn create_demo_world_with_seed(seed: u64) -> Self {
        Self::build_demo_world(Self::new_with_seed(seed))
    }

    pub fn build_demo_world(mut world: RestaurantWorld) -> Self {
        let mut config = world.config.clone();
        config.incoming = 10;
        config.arrivals_per_minute = 6.0;
        world.apply_config(config);
        world
    }

    /// Print a summary of the world state
    pub fn print_summary(&self) {
        let stats = self.stats();
        println!("=== Restaurant Simulation Summary ===");
        println!(
            "Time: {:.2}s ({})",
            self.time,
            if self.running { "running" } else { "paused" }
        );
        println!(
            "Tables: {}, Seats: {}, Active tables: {}",
            stats.table_count, stats.seat_count, stats.active_tables
        );
        println!(
            "Customers: pending={}, inside={}, seated={}, exiting={}, departed={} (balked {})",
            stats.pending, stats.inside, stats.seated, stats.exiting, stats.departed, stats.balked
        );
        println!(
            "Staff: {}, utilization={:.0}%, pending requests={}, service coefficient={:.2}",
            stats.staff_count,
            stats.utilization * 100.0,
            stats.pending_requests,
            stats.service_coefficient
        );
        println!(
            "Revenue: ${:.2}, turnover={:.2}, RevPASH=${:.2}",
            stats.revenue, stats.turnover, stats.revpash
        );
        if self.session.is_enabled() {
            println!("Session remaining: {:.0}s", self.session.remaining());
        }

        if !self.staff.is_empty() {
            println!("--- Staff ---");
            for agent in &self.staff.agents {
                println!(
                    "  Staff {}: phase={}, position=({:.1}, {:.1}), table={}",
                    agent.id,
                    agent.phase,
                    agent.position.x,
                    agent.position.z,
                    agent
                        .assignment
                        .as_ref()
                        .map(|a| a.table.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
    }

    /// Draw the floor plan in the terminal, kitchen at the top and the door
    /// at the bottom
    pub fn draw_map(&self) {
        // Two characters per metre
        let scale = 2.0;
        let half_w = self.room.width * 0.5;
        let half_d = self.room.depth * 0.5;
        let cols = (self.room.width * scale).round() as usize + 1;
        let rows = (self.room.depth * scale).round() as usize + 1;

        let to_world =
            |row: usize, col: usize| Position::new(col as f32 / scale - half_w, row as f32 / scale - half_d);
        let to_grid = |p: Position| -> Option<(usize, usize)> {
            let col = ((p.x + half_w) * scale).round();
            let row = ((p.z + half_d) * scale).round();
            if col < 0.0 || row < 0.0 {
                return None;
            }
            let (row, col) = (row as usize, col as usize);
            (row < rows && col < cols).then_some((row, col))
        };

        let (door_left, door_right) = self.room.door_span();
        let mut grid = vec![vec![' '; cols]; rows];
        for (row, line) in grid.iter_mut().enumerate() {
            for (col, cell) in line.iter_mut().enumerate() {
                let p = to_world(row, col);
                let on_wall = row == 0 || row == rows - 1 || col == 0 || col == cols - 1;
                let in_door = row == rows - 1 && p.x >= door_left && p.x <= door_right;
                if on_wall && !in_door {
                    *cell = '#';
                } else if self.tables.values().any(|t| t.footprint_contains(&p)) {
                    *cell = 'T';
                }
            }
        }

        let mut plot = |p: Position, glyph: char| {
            if let Some((row, col)) = to_grid(p) {
                grid[row][col] = glyph;
            }
        };
        plot(self.room.kitchen_point(), 'K');
        plot(self.room.restroom_point(), 'R');
        for customer in &self.customers {
            match customer.phase {
                CustomerPhase::Seated => plot(customer.position, 's'),
                CustomerPhase::ToiletUse | CustomerPhase::Outside => {}
                _ => plot(customer.position, 'c'),
            }
        }
        for agent in &self.staff.agents {
            plot(agent.position, 'W');
        }

        println!("\n=== Floor Map ===");
        println!("Legend: T=Table, s=Seated, c=Customer, W=Staff, K=Kitchen, R=Restroom, #=Wall");
        println!();
        for row in &grid {
            let line: String = row.iter().collect();
            println!("{}", line);
        }
        println!();
    }
}

/// Push direction from `a` towards `b` and how far they must part, if they
/// overlap. Two customers both between the door jambs part along z, since
/// the jambs pin their x. Coincident bodies split along +x.
fn contact(a: &Body, b: &Body, min_gap: f32, front_z: f32) -> Option<(Position, f32)> {
    let delta = b.position - a.position;
    let dist = delta.length();
    if dist >= min_gap {
        return None;
    }
    let in_door = |body: &Body| body.through_door && body.position.z > front_z;
    if in_door(a) && in_door(b) {
        let needed = (min_gap * min_gap - delta.x * delta.x).max(0.0).sqrt();
        let sign = if delta.z.abs() > EPSILON { delta.z.signum() } else { 1.0 };
        return Some((Position::new(0.0, sign), needed - delta.z.abs()));
    }
    let normal = if dist > EPSILON {
        delta * (1.0 / dist)
    } else {
        Position::new(1.0, 0.0)
    };
    Some((normal, min_gap - dist))
}

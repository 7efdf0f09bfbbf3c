//! Standalone restaurant floor simulation module
//!
//! This module contains all the core simulation logic: the floor layout,
//! customer and staff agents, the shared steering engine and the statistics
//! built on top of them. It runs without any rendering layer and can be
//! driven from the console or from tests.

mod config;
mod customer;
mod obstacles;
mod room;
mod seats;
mod service;
mod session;
mod spatial;
mod staff;
mod staff_manager;
mod stats;
mod steering;
mod table;
mod types;
mod world;

// Re-export public types for external use
// These may not be used within this crate but are part of the public API
#[allow(unused_imports)]
pub use config::{
    service_coefficient, AvoidanceConfig, AvoidancePair, ConfigDiagnostics, RoomConfig,
    SimConfig, MAX_INCOMING_MULTIPLIER, MIN_PRICE_RATIO, MIN_STAY_SECS,
};
#[allow(unused_imports)]
pub use customer::{
    plan_restroom_trip, Customer, CustomerContext, CustomerPhase, CustomerUpdateResult,
    RestroomPlan, RESTROOM_END_MARGIN, RESTROOM_MIN_DELAY, RESTROOM_USE_SECS,
};
#[allow(unused_imports)]
pub use obstacles::{
    find_narrow_gaps, point_segment_distance, Circle, NarrowGap, Obstacle, ObstacleSet,
    ObstacleSource,
};
#[allow(unused_imports)]
pub use room::{Bounds, Room, LANE_COUNT};
#[allow(unused_imports)]
pub use seats::{
    generate_anchors, seat_anchors, service_spots, SeatAnchor, SeatId, ServiceSpots,
    APPROACH_OFFSET,
};
#[allow(unused_imports)]
pub use service::{RequestQueue, ServiceRequest};
#[allow(unused_imports)]
pub use session::SessionTimer;
#[allow(unused_imports)]
pub use spatial::{AgentSample, SpatialHash};
#[allow(unused_imports)]
pub use staff::{
    StaffAgent, StaffContext, StaffPhase, StaffUpdateResult, BASE_SERVICE_SECS, MAX_REPLANS,
    WATCHDOG_SECS,
};
#[allow(unused_imports)]
pub use staff_manager::{kitchen_slot_position, StaffPool, StaffSnapshot};
#[allow(unused_imports)]
pub use stats::{SimStats, Throughput};
#[allow(unused_imports)]
pub use steering::{SteeringParams, StuckTracker, CUSTOMER_PARAMS, STAFF_PARAMS};
#[allow(unused_imports)]
pub use table::{auto_layout, validate_layout, Table, FOUR_SEAT_SIZE, TWO_SEAT_SIZE};
#[allow(unused_imports)]
pub use types::{
    finite_or, AgentId, AgentKind, Position, RequestId, SimId, TableId, AGENT_RADIUS, EPSILON,
    HARD_PAD, MAX_DT, MIN_DT,
};
pub use world::{AgentView, RestaurantWorld, SimEvent};

/// Steering primitives, exposed for tests and tooling
pub mod forces {
    pub use super::steering::{
        avoidance, boundary_push, integrate, jitter_impulse, lane_bias, narrow_gap_push,
        path_is_clear, resolve_penetration, route_waypoint, seek, separation, soft_repulsion,
    };
}

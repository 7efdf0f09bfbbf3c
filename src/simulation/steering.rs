//! Shared steering and avoidance primitives
//!
//! Customers and staff build a desired velocity from these forces, damp their
//! actual velocity towards it, integrate, and then resolve any remaining
//! penetration positionally.

use ordered_float::OrderedFloat;

use super::config::AvoidancePair;
use super::obstacles::{point_segment_distance, Circle, NarrowGap};
use super::room::Bounds;
use super::spatial::AgentSample;
use super::types::{AgentId, Position, EPSILON, HARD_PAD};

/// Per-population kinematic limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringParams {
    pub max_speed: f32,
    pub radius: f32,
    /// Time constant of the exponential velocity damping
    pub damping_tau: f32,
}

pub const CUSTOMER_PARAMS: SteeringParams = SteeringParams {
    max_speed: 1.3,
    radius: super::types::AGENT_RADIUS,
    damping_tau: 0.25,
};

pub const STAFF_PARAMS: SteeringParams = SteeringParams {
    max_speed: 1.6,
    radius: super::types::AGENT_RADIUS,
    damping_tau: 0.25,
};

/// Distance inside which seek starts slowing down
pub const ARRIVE_SLOW_RADIUS: f32 = 0.6;

pub const SEPARATION_RADIUS: f32 = 0.6;
pub const SEPARATION_GAIN: f32 = 0.12;
pub const SEPARATION_CAP: f32 = 0.8;

pub const AVOIDANCE_CAP: f32 = 2.0;

pub const BOUNDARY_PAD: f32 = 0.35;
pub const BOUNDARY_GAIN: f32 = 2.0;

/// Lane bias applies within this distance of the front wall
pub const LANE_ZONE: f32 = 1.5;
pub const LANE_GAIN: f32 = 2.5;

pub const NARROW_GAP_THRESHOLD: f32 = 2.0 * super::types::AGENT_RADIUS + 0.15;
pub const NARROW_GAP_GAIN: f32 = 1.2;

pub const STUCK_SPEED: f32 = 0.05;
pub const STUCK_SECS: f32 = 0.85;
pub const JITTER_IMPULSE: f32 = 0.9;

/// Share of a positional correction fed back into velocity
pub const CORRECTION_VELOCITY_FRACTION: f32 = 0.3;

/// Waypoint inflation levels tried in order
pub const WAYPOINT_PADS: [f32; 3] = [0.15, 0.35, 0.6];
pub const WAYPOINT_REACHED: f32 = 0.35;

/// Desired velocity towards `target`, slowing inside the arrive radius
pub fn seek(position: Position, target: Position, max_speed: f32) -> Position {
    let delta = target - position;
    let dist = delta.length();
    if dist < EPSILON {
        return Position::ZERO;
    }
    let speed = max_speed * (dist / ARRIVE_SLOW_RADIUS).min(1.0);
    delta * (speed / dist)
}

/// Lateral pull towards the centre of an entry lane near the door
pub fn lane_bias(position: Position, lane_x: f32, front_z: f32) -> Position {
    let from_wall = (front_z - position.z).abs();
    if from_wall > LANE_ZONE {
        return Position::ZERO;
    }
    let weight = 1.0 - from_wall / LANE_ZONE;
    Position::new((lane_x - position.x) * LANE_GAIN * weight, 0.0)
}

/// Inverse-distance push away from nearby agents
pub fn separation<'a>(
    position: Position,
    self_id: AgentId,
    neighbors: impl Iterator<Item = &'a AgentSample>,
) -> Position {
    let mut force = Position::ZERO;
    for other in neighbors {
        if other.id == self_id {
            continue;
        }
        let delta = position - other.position;
        let dist = delta.length();
        if dist >= SEPARATION_RADIUS {
            continue;
        }
        let away = if dist > EPSILON {
            delta * (1.0 / dist)
        } else {
            // Coincident: split by id order
            let sign = if self_id < other.id { -1.0 } else { 1.0 };
            Position::new(sign, 0.0)
        };
        force += away * (SEPARATION_GAIN / dist.max(0.1));
    }
    force.clamp_length(SEPARATION_CAP)
}

/// Linear repulsion once the gap to `other` drops below the pair radius
pub fn soft_repulsion(position: Position, radius: f32, other: Circle, pair: AvoidancePair) -> Position {
    if pair.radius <= EPSILON || pair.gain <= 0.0 {
        return Position::ZERO;
    }
    let delta = position - other.center;
    let dist = delta.length();
    if dist < EPSILON {
        return Position::ZERO;
    }
    let gap = dist - other.radius - radius;
    if gap >= pair.radius {
        return Position::ZERO;
    }
    let strength = pair.gain * (1.0 - gap.max(0.0) / pair.radius);
    delta * (strength / dist)
}

/// Sum of soft repulsions from a set of circles, capped
pub fn avoidance(
    position: Position,
    radius: f32,
    circles: impl Iterator<Item = Circle>,
    pair: AvoidancePair,
) -> Position {
    circles
        .fold(Position::ZERO, |acc, c| acc + soft_repulsion(position, radius, c, pair))
        .clamp_length(AVOIDANCE_CAP)
}

/// Inward push near the walls. `open_front` disables the front wall term
/// while an agent is passing through the door.
pub fn boundary_push(position: Position, interior: &Bounds, radius: f32, open_front: bool) -> Position {
    let inner = interior.shrink(radius);
    let strength = |d: f32| {
        if d < BOUNDARY_PAD {
            BOUNDARY_GAIN * (1.0 - d / BOUNDARY_PAD).min(2.0)
        } else {
            0.0
        }
    };
    let mut force = Position::ZERO;
    force.x += strength(position.x - inner.min_x);
    force.x -= strength(inner.max_x - position.x);
    force.z += strength(position.z - inner.min_z);
    if !open_front {
        force.z -= strength(inner.max_z - position.z);
    }
    force
}

/// Perpendicular nudge out of slots between two close obstacles
pub fn narrow_gap_push(position: Position, gaps: &[NarrowGap]) -> Position {
    let mut force = Position::ZERO;
    for gap in gaps {
        let influence = gap.width * 0.5 + 2.0 * super::types::AGENT_RADIUS;
        let offset = position - gap.midpoint;
        let dist = offset.length();
        if dist >= influence {
            continue;
        }
        let normal = gap.axis.perpendicular();
        let side = if offset.dot(&normal) >= 0.0 { normal } else { -normal };
        force += side * (NARROW_GAP_GAIN * (1.0 - dist / influence));
    }
    force.clamp_length(AVOIDANCE_CAP)
}

/// Low-speed timer that fires a one-shot jitter
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StuckTracker {
    pub secs: f32,
}

impl StuckTracker {
    /// Returns true once when the agent has crawled for longer than `STUCK_SECS`
    pub fn update(&mut self, speed: f32, wants_to_move: bool, dt: f32) -> bool {
        if wants_to_move && speed < STUCK_SPEED {
            self.secs += dt;
            if self.secs > STUCK_SECS {
                self.secs = 0.0;
                return true;
            }
        } else {
            self.secs = 0.0;
        }
        false
    }
}

/// Sideways kick relative to the goal direction; side from the id parity
pub fn jitter_impulse(toward_goal: Position, parity: bool) -> Position {
    let mut side = toward_goal.normalized().perpendicular();
    if side == Position::ZERO {
        side = Position::new(1.0, 0.0);
    }
    if parity {
        side * JITTER_IMPULSE
    } else {
        -side * JITTER_IMPULSE
    }
}

/// Damp velocity towards `desired`, cap it, and move
pub fn integrate(
    position: &mut Position,
    velocity: &mut Position,
    desired: Position,
    dt: f32,
    params: &SteeringParams,
) {
    let desired = desired.clamp_length(params.max_speed);
    let blend = 1.0 - (-dt / params.damping_tau.max(EPSILON)).exp();
    *velocity = (*velocity + (desired - *velocity) * blend).clamp_length(params.max_speed);
    *position += *velocity * dt;
}

/// Push the agent out of any circle it penetrates. Returns true if it moved.
pub fn resolve_penetration(
    position: &mut Position,
    velocity: &mut Position,
    radius: f32,
    circles: &[Circle],
) -> bool {
    let mut moved = false;
    // Second pass catches pushes into a neighbouring circle
    for _ in 0..2 {
        for circle in circles {
            let hard = circle.radius + radius + HARD_PAD;
            let delta = *position - circle.center;
            let dist = delta.length();
            if dist >= hard {
                continue;
            }
            let normal = if dist > EPSILON {
                delta * (1.0 / dist)
            } else {
                Position::new(1.0, 0.0)
            };
            let depth = hard - dist;
            *position += normal * depth;
            let inward = velocity.dot(&normal);
            if inward < 0.0 {
                *velocity -= normal * inward;
            }
            *velocity += normal * (depth * CORRECTION_VELOCITY_FRACTION);
            moved = true;
        }
    }
    moved
}

/// Whether the straight segment is clear of every circle
pub fn path_is_clear(from: Position, to: Position, circles: &[Circle], radius: f32) -> bool {
    !circles.iter().any(|c| blocks_ahead(c, from, to, radius))
}

/// A circle blocks only if it is ahead of `from`, not behind or underfoot
fn blocks_ahead(circle: &Circle, from: Position, to: Position, radius: f32) -> bool {
    let (dist, t, _) = point_segment_distance(circle.center, from, to);
    t > 0.0 && dist < circle.radius + radius + HARD_PAD
}

/// Tangent point around the nearest circle blocking the line to `goal`.
///
/// Inflation starts at `level` and escalates while the candidate is itself
/// blocked. Returns `None` when the straight line is clear.
pub fn route_waypoint(
    from: Position,
    goal: Position,
    circles: &[Circle],
    radius: f32,
    level: usize,
    parity: bool,
    bounds: &Bounds,
) -> Option<Position> {
    let blocker = circles
        .iter()
        .filter(|c| blocks_ahead(c, from, goal, radius))
        .min_by_key(|c| OrderedFloat(point_segment_distance(c.center, from, goal).1))?;

    let path = goal - from;
    let center_side = path.cross(&(blocker.center - from));
    let mut last = None;

    for pad in WAYPOINT_PADS.iter().skip(level.min(WAYPOINT_PADS.len() - 1)) {
        let inflated = blocker.radius + radius + pad;
        let candidate = bounds.clamp(tangent_point(from, blocker.center, inflated, center_side, parity));
        let clear = circles.iter().all(|c| {
            c == blocker
                || (c.center.distance(&candidate) >= c.radius + radius + HARD_PAD
                    && !blocks_ahead(c, from, candidate, radius))
        });
        if clear {
            return Some(candidate);
        }
        last = Some(candidate);
    }
    last
}

/// Tangent touch point from `from` on a circle, on the side away from the
/// circle centre relative to the travel line.
fn tangent_point(from: Position, center: Position, inflated: f32, center_side: f32, parity: bool) -> Position {
    let to_from = from - center;
    let dist = to_from.length();
    let go_left = if center_side.abs() > EPSILON {
        // Centre to the left of travel: pass on the right
        center_side < 0.0
    } else {
        parity
    };

    if dist <= inflated + EPSILON {
        // Already inside the inflated ring: step straight out sideways
        let base = if dist > EPSILON { to_from * (1.0 / dist) } else { Position::new(1.0, 0.0) };
        let side = if go_left { base.perpendicular() } else { -base.perpendicular() };
        return center + (base + side).normalized() * inflated;
    }

    let u = to_from * (1.0 / dist);
    let alpha = (inflated / dist).clamp(-1.0, 1.0).acos();
    let plus = rotate(u, alpha);
    let minus = rotate(u, -alpha);
    let travel = center - from;
    // The left-hand candidate has a positive cross with the travel direction
    let plus_is_left = travel.cross(&(center + plus * inflated - from)) > 0.0;
    let dir = if plus_is_left == go_left { plus } else { minus };
    center + dir * inflated
}

fn rotate(v: Position, angle: f32) -> Position {
    let (sin, cos) = angle.sin_cos();
    Position::new(v.x * cos - v.z * sin, v.x * sin + v.z * cos)
}

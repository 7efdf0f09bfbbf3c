//! Room shell: walls, door, and the fixed points agents walk between
//!
//! The room is centred on the origin. The door is cut into the front wall
//! (positive z), the kitchen pass sits against the back wall and the restroom
//! against the right wall.

use super::config::RoomConfig;
use super::types::Position;

/// Number of entry lanes across the door opening
pub const LANE_COUNT: usize = 3;

/// How far outside the front wall new customers appear
const SPAWN_OUTSIDE: f32 = 1.0;
/// Distance past the front wall at which a leaving customer counts as gone
const OUTSIDE_THRESHOLD: f32 = 0.6;
/// Where departed customers drift to before removal
const OFFSTAGE_DISTANCE: f32 = 4.0;
/// Staff exit point behind the back wall, and the despawn line
const STAFF_EXIT_DISTANCE: f32 = 1.5;
const STAFF_EXIT_BOUNDARY: f32 = 0.5;
/// Standing offset of kitchen and restroom points from their wall
const MODULE_STANDOFF: f32 = 0.6;

/// Axis-aligned rectangle on the floor plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl Bounds {
    pub fn new(min_x: f32, max_x: f32, min_z: f32, max_z: f32) -> Self {
        Self {
            min_x,
            max_x,
            min_z,
            max_z,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min_x < self.max_x && self.min_z < self.max_z
    }

    pub fn contains(&self, p: &Position) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.z >= self.min_z && p.z <= self.max_z
    }

    pub fn clamp(&self, p: Position) -> Position {
        Position::new(
            p.x.clamp(self.min_x, self.max_x),
            p.z.clamp(self.min_z, self.max_z),
        )
    }

    /// Shrink on every side by `amount`
    pub fn shrink(&self, amount: f32) -> Bounds {
        Bounds::new(
            self.min_x + amount,
            self.max_x - amount,
            self.min_z + amount,
            self.max_z - amount,
        )
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn depth(&self) -> f32 {
        self.max_z - self.min_z
    }
}

/// The room the simulation runs in
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub width: f32,
    pub depth: f32,
    pub height: f32,
    pub wall_thickness: f32,
    pub door_width: f32,
    pub door_height: f32,
    pub door_left: f32,
    /// X of the kitchen pass along the back wall
    pub kitchen_offset: f32,
    /// Z of the restroom along the right wall
    pub restroom_offset: f32,
}

impl Room {
    pub fn from_config(config: &RoomConfig) -> Self {
        let mut room = Self {
            width: config.width,
            depth: config.depth,
            height: config.height,
            wall_thickness: config.wall_thickness,
            door_width: config.door_width,
            door_height: config.door_height,
            door_left: config.door_left,
            kitchen_offset: config.width * 0.25,
            restroom_offset: -config.depth * 0.15,
        };
        room.set_door_left(config.door_left);
        room
    }

    /// Apply new shell dimensions, keeping the layout-layer offsets
    pub fn apply_config(&mut self, config: &RoomConfig) {
        let kitchen_offset = self.kitchen_offset;
        let restroom_offset = self.restroom_offset;
        *self = Self::from_config(config);
        self.set_kitchen_offset(kitchen_offset);
        self.set_restroom_offset(restroom_offset);
    }

    /// Walkable floor between the inner wall faces
    pub fn interior(&self) -> Bounds {
        let hx = self.width * 0.5 - self.wall_thickness;
        let hz = self.depth * 0.5 - self.wall_thickness;
        Bounds::new(-hx, hx, -hz, hz)
    }

    /// Interior shrunk by an agent radius: where an agent centre may be
    pub fn inner(&self, radius: f32) -> Bounds {
        self.interior().shrink(radius)
    }

    /// Z of the inner face of the front wall
    pub fn front_z(&self) -> f32 {
        self.depth * 0.5 - self.wall_thickness
    }

    /// Z of the outer face of the front wall
    pub fn front_outer_z(&self) -> f32 {
        self.depth * 0.5
    }

    pub fn back_z(&self) -> f32 {
        -self.depth * 0.5 + self.wall_thickness
    }

    /// Door opening as (left jamb x, right jamb x)
    pub fn door_span(&self) -> (f32, f32) {
        let left = -self.width * 0.5 + self.wall_thickness + self.door_left;
        (left, left + self.door_width)
    }

    pub fn door_center_x(&self) -> f32 {
        let (left, right) = self.door_span();
        (left + right) * 0.5
    }

    /// Move the door along the front wall, clamped to the wall span
    pub fn set_door_left(&mut self, door_left: f32) {
        let span = self.width - 2.0 * self.wall_thickness;
        let max_left = (span - self.door_width).max(0.0);
        self.door_left = if door_left.is_finite() {
            door_left.clamp(0.0, max_left)
        } else {
            max_left * 0.5
        };
    }

    pub fn set_kitchen_offset(&mut self, x: f32) {
        let interior = self.interior().shrink(MODULE_STANDOFF);
        self.kitchen_offset = if x.is_finite() {
            x.clamp(interior.min_x, interior.max_x)
        } else {
            0.0
        };
    }

    pub fn set_restroom_offset(&mut self, z: f32) {
        let interior = self.interior().shrink(MODULE_STANDOFF);
        self.restroom_offset = if z.is_finite() {
            z.clamp(interior.min_z, interior.max_z)
        } else {
            0.0
        };
    }

    /// Centre x of an entry lane
    pub fn lane_x(&self, lane: usize) -> f32 {
        let (left, _) = self.door_span();
        let lane = lane.min(LANE_COUNT - 1) as f32;
        left + self.door_width * (lane + 0.5) / LANE_COUNT as f32
    }

    /// Where a customer on `lane` first appears, just outside the door
    pub fn spawn_point(&self, lane: usize) -> Position {
        Position::new(self.lane_x(lane), self.front_outer_z() + SPAWN_OUTSIDE)
    }

    /// A point just inside the door on `lane`
    pub fn door_inside_point(&self, lane: usize) -> Position {
        Position::new(self.lane_x(lane), self.front_z() - 0.8)
    }

    /// Z a newcomer must cross to count as inside
    pub fn entry_threshold_z(&self) -> f32 {
        self.front_z() - 0.5
    }

    /// Holding point where customers wait for a seat
    pub fn foyer_point(&self) -> Position {
        Position::new(self.door_center_x(), self.front_z() - 1.4)
    }

    /// Z a leaving customer must pass to count as outside
    pub fn outside_threshold_z(&self) -> f32 {
        self.front_outer_z() + OUTSIDE_THRESHOLD
    }

    pub fn offstage_point(&self) -> Position {
        Position::new(self.door_center_x(), self.front_outer_z() + OFFSTAGE_DISTANCE)
    }

    pub fn kitchen_point(&self) -> Position {
        Position::new(self.kitchen_offset, self.back_z() + MODULE_STANDOFF)
    }

    pub fn staff_exit_point(&self) -> Position {
        Position::new(self.kitchen_offset, -self.depth * 0.5 - STAFF_EXIT_DISTANCE)
    }

    /// Staff beyond this z have left through the kitchen
    pub fn staff_exit_boundary_z(&self) -> f32 {
        -self.depth * 0.5 - STAFF_EXIT_BOUNDARY
    }

    pub fn restroom_point(&self) -> Position {
        Position::new(
            self.width * 0.5 - self.wall_thickness - MODULE_STANDOFF,
            self.restroom_offset,
        )
    }

    /// Concurrent newcomers the door lets through
    pub fn door_capacity(&self, radius: f32) -> usize {
        ((self.door_width / (2.0 * radius).max(0.01)).floor() as usize).max(1)
    }

    /// Keep an agent centre inside the walls. With `through_door` the agent
    /// may pass the front wall, but only between the jambs.
    pub fn clamp_agent(&self, p: Position, radius: f32, through_door: bool) -> Position {
        let inner = self.inner(radius);
        if through_door && p.z > inner.max_z {
            let (left, right) = self.door_span();
            let lo = left + radius;
            let hi = (right - radius).max(lo);
            Position::new(p.x.clamp(lo, hi), p.z)
        } else {
            inner.clamp(p)
        }
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::from_config(&RoomConfig::default())
    }
}

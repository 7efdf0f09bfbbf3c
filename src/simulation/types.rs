//! Core types for the restaurant simulation
//!
//! Ids and floor-plane vector math shared by every other module.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimId(pub usize);

/// A wrapper type for agent IDs (customers and staff share one id space)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub SimId);

impl AgentId {
    /// Parity bit used to pick a side when breaking symmetric deadlocks
    pub fn parity(&self) -> bool {
        self.0 .0 % 2 == 0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0 .0)
    }
}

/// A wrapper type for table IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub SimId);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0 .0)
    }
}

/// A wrapper type for service request IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub SimId);

/// Which population an agent belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Customer,
    Staff,
}

/// A point or vector on the floor plane (x across the room, z front-to-back)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub z: f32,
}

impl Position {
    pub const ZERO: Position = Position { x: 0.0, z: 0.0 };

    pub fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    pub fn length_squared(&self) -> f32 {
        self.x * self.x + self.z * self.z
    }

    pub fn distance(&self, other: &Position) -> f32 {
        (*other - *self).length()
    }

    pub fn dot(&self, other: &Position) -> f32 {
        self.x * other.x + self.z * other.z
    }

    /// 2D cross product (z component of the 3D cross)
    pub fn cross(&self, other: &Position) -> f32 {
        self.x * other.z - self.z * other.x
    }

    /// Unit vector in the same direction, or zero for degenerate input
    pub fn normalized(&self) -> Position {
        let len = self.length();
        if len > EPSILON {
            Position::new(self.x / len, self.z / len)
        } else {
            Position::ZERO
        }
    }

    /// Rotate 90 degrees counter-clockwise (viewed from above)
    pub fn perpendicular(&self) -> Position {
        Position::new(-self.z, self.x)
    }

    /// Scale down to `max_len` if longer
    pub fn clamp_length(&self, max_len: f32) -> Position {
        let len = self.length();
        if len > max_len && len > EPSILON {
            *self * (max_len / len)
        } else {
            *self
        }
    }

    /// Calculate the yaw from this position to another (Y-axis rotation)
    pub fn angle_to(&self, other: &Position) -> f32 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        if dx.abs() > EPSILON || dz.abs() > EPSILON {
            dx.atan2(dz)
        } else {
            0.0
        }
    }

    /// Rotate by `yaw` radians around the vertical axis
    pub fn rotated(&self, yaw: f32) -> Position {
        let (sin, cos) = yaw.sin_cos();
        Position::new(self.x * cos + self.z * sin, -self.x * sin + self.z * cos)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.z.is_finite()
    }
}

impl Add for Position {
    type Output = Position;
    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.z + rhs.z)
    }
}

impl AddAssign for Position {
    fn add_assign(&mut self, rhs: Position) {
        self.x += rhs.x;
        self.z += rhs.z;
    }
}

impl Sub for Position {
    type Output = Position;
    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.z - rhs.z)
    }
}

impl SubAssign for Position {
    fn sub_assign(&mut self, rhs: Position) {
        self.x -= rhs.x;
        self.z -= rhs.z;
    }
}

impl Mul<f32> for Position {
    type Output = Position;
    fn mul(self, rhs: f32) -> Position {
        Position::new(self.x * rhs, self.z * rhs)
    }
}

impl Neg for Position {
    type Output = Position;
    fn neg(self) -> Position {
        Position::new(-self.x, -self.z)
    }
}

/// Replace a non-finite value with a fallback
pub fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Floor for divisions by distances
pub const EPSILON: f32 = 1e-4;

/// Body radius shared by customers and staff
pub const AGENT_RADIUS: f32 = 0.25;

/// Extra clearance added to every hard radius
pub const HARD_PAD: f32 = 0.02;

/// Smallest and largest frame time accepted by a step
pub const MIN_DT: f32 = 0.001;
pub const MAX_DT: f32 = 0.1;

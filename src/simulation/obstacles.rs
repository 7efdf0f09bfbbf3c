//! Circular obstacles and the three sets they are kept in
//!
//! Tables are static; seated customers and the walking crowd are refreshed
//! every step. Customers steer around tables and seated guests, staff around
//! all three.

use super::types::{AgentId, Position, TableId, EPSILON};

/// A circle on the floor plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Position,
    pub radius: f32,
}

impl Circle {
    pub fn new(center: Position, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// What produced an obstacle circle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleSource {
    Table(TableId),
    Seated(AgentId),
    Crowd(AgentId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub circle: Circle,
    pub source: ObstacleSource,
}

impl Obstacle {
    pub fn is_table(&self, table: TableId) -> bool {
        self.source == ObstacleSource::Table(table)
    }

    pub fn is_agent(&self, agent: AgentId) -> bool {
        matches!(self.source, ObstacleSource::Seated(id) | ObstacleSource::Crowd(id) if id == agent)
    }
}

/// Static, seated and crowd obstacles, maintained independently
#[derive(Debug, Clone, Default)]
pub struct ObstacleSet {
    pub tables: Vec<Obstacle>,
    pub seated: Vec<Obstacle>,
    pub crowd: Vec<Obstacle>,
}

impl ObstacleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tables(&mut self, tables: impl IntoIterator<Item = (TableId, Circle)>) {
        self.tables = tables
            .into_iter()
            .map(|(id, circle)| Obstacle {
                circle,
                source: ObstacleSource::Table(id),
            })
            .collect();
    }

    /// Replace the per-step customer circles
    pub fn set_customers(
        &mut self,
        seated: impl IntoIterator<Item = (AgentId, Circle)>,
        crowd: impl IntoIterator<Item = (AgentId, Circle)>,
    ) {
        self.seated = seated
            .into_iter()
            .map(|(id, circle)| Obstacle {
                circle,
                source: ObstacleSource::Seated(id),
            })
            .collect();
        self.crowd = crowd
            .into_iter()
            .map(|(id, circle)| Obstacle {
                circle,
                source: ObstacleSource::Crowd(id),
            })
            .collect();
    }

    /// What customers avoid: tables and seated guests
    pub fn for_customers(&self) -> impl Iterator<Item = &Obstacle> {
        self.tables.iter().chain(self.seated.iter())
    }

    /// What staff avoid: everything
    pub fn for_staff(&self) -> impl Iterator<Item = &Obstacle> {
        self.tables
            .iter()
            .chain(self.seated.iter())
            .chain(self.crowd.iter())
    }

    /// Flat circle list for the render layer
    pub fn circles(&self) -> Vec<Circle> {
        self.for_staff().map(|o| o.circle).collect()
    }
}

/// A slot between two obstacles too narrow to walk through comfortably
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NarrowGap {
    pub midpoint: Position,
    /// Unit vector from the first circle centre to the second
    pub axis: Position,
    /// Free space between the two circle edges
    pub width: f32,
}

/// Find gaps narrower than `threshold` between pairs of circles
pub fn find_narrow_gaps<'a>(
    obstacles: impl IntoIterator<Item = &'a Obstacle>,
    threshold: f32,
) -> Vec<NarrowGap> {
    let circles: Vec<Circle> = obstacles.into_iter().map(|o| o.circle).collect();
    let mut gaps = Vec::new();
    for (i, a) in circles.iter().enumerate() {
        for b in &circles[i + 1..] {
            let delta = b.center - a.center;
            let dist = delta.length();
            let width = dist - a.radius - b.radius;
            if width <= 0.0 || width >= threshold || dist < EPSILON {
                continue;
            }
            let axis = delta * (1.0 / dist);
            // Midpoint of the free span, not of the centres
            let midpoint = a.center + axis * (a.radius + width * 0.5);
            gaps.push(NarrowGap {
                midpoint,
                axis,
                width,
            });
        }
    }
    gaps
}

/// Distance from `p` to segment a-b, the segment parameter, and the closest point
pub fn point_segment_distance(p: Position, a: Position, b: Position) -> (f32, f32, Position) {
    let ab = b - a;
    let len_sq = ab.length_squared();
    let t = if len_sq > EPSILON {
        ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let closest = a + ab * t;
    (p.distance(&closest), t, closest)
}

//! Uniform spatial hash for neighbour queries
//!
//! Rebuilt from scratch once per step from the current agent positions.

use std::collections::HashMap;

use super::types::{AgentId, AgentKind, Position};

/// Bucket size in metres; matches the widest avoidance radius in use
pub const DEFAULT_CELL_SIZE: f32 = 1.0;

/// Largest query radius accepted, in cells
const MAX_QUERY_CELLS: i32 = 8;

/// Per-step copy of an agent's kinematic state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSample {
    pub id: AgentId,
    pub kind: AgentKind,
    pub position: Position,
    pub velocity: Position,
    pub radius: f32,
    /// Pinned agents are never pushed by hard separation
    pub pinned: bool,
}

#[derive(Debug, Clone)]
pub struct SpatialHash {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<usize>>,
    samples: Vec<AgentSample>,
}

impl Default for SpatialHash {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

impl SpatialHash {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(0.1),
            cells: HashMap::new(),
            samples: Vec::new(),
        }
    }

    fn cell_of(&self, p: Position) -> (i32, i32) {
        (
            (p.x / self.cell_size).floor() as i32,
            (p.z / self.cell_size).floor() as i32,
        )
    }

    /// Drop everything and index `samples`
    pub fn rebuild(&mut self, samples: impl IntoIterator<Item = AgentSample>) {
        self.cells.clear();
        self.samples.clear();
        self.samples.extend(samples);
        for (index, sample) in self.samples.iter().enumerate() {
            let key = (
                (sample.position.x / self.cell_size).floor() as i32,
                (sample.position.z / self.cell_size).floor() as i32,
            );
            self.cells.entry(key).or_default().push(index);
        }
    }

    pub fn samples(&self) -> &[AgentSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Every sample within `radius` of `center`, including one at `center`
    pub fn neighbors(
        &self,
        center: Position,
        radius: f32,
    ) -> impl Iterator<Item = &AgentSample> + '_ {
        let radius = radius.clamp(0.0, self.cell_size * MAX_QUERY_CELLS as f32);
        let (x0, z0) = self.cell_of(Position::new(center.x - radius, center.z - radius));
        let (x1, z1) = self.cell_of(Position::new(center.x + radius, center.z + radius));
        let r_sq = radius * radius;
        (x0..=x1)
            .flat_map(move |cx| (z0..=z1).map(move |cz| (cx, cz)))
            .filter_map(move |key| self.cells.get(&key))
            .flatten()
            .map(move |&index| &self.samples[index])
            .filter(move |s| (s.position - center).length_squared() <= r_sq)
    }
}

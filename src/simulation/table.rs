//! Tables: footprint, bounding circle, layout validation and auto placement

use anyhow::{bail, Result};
use log::warn;

use super::obstacles::Circle;
use super::room::Room;
use super::types::{Position, TableId, AGENT_RADIUS};

/// Footprint (width, depth) of a two-seat table
pub const TWO_SEAT_SIZE: (f32, f32) = (0.8, 0.8);
/// Footprint (width, depth) of a four-seat table
pub const FOUR_SEAT_SIZE: (f32, f32) = (1.2, 0.8);

/// Extra ring around the bounding circle that neighbouring tables may not enter
pub const TABLE_BUFFER: f32 = 0.1;

/// Walking gap left between auto-placed tables' clearance rings
const LAYOUT_GAP: f32 = 0.3;
/// Floor strips kept free in front of the kitchen and behind the door
const KITCHEN_STRIP: f32 = 1.2;
const FOYER_STRIP: f32 = 2.0;
const SIDE_MARGIN: f32 = 0.3;

/// A table on the floor
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub id: TableId,
    pub center: Position,
    /// Rotation around the vertical axis in radians
    pub yaw: f32,
    /// Extent along the table's local x axis
    pub width: f32,
    /// Extent along the table's local z axis
    pub depth: f32,
    /// Seat capacity, 2 or 4
    pub capacity: u8,
}

impl Table {
    /// A table of the standard size for `capacity` (anything above 2 becomes 4)
    pub fn new(id: TableId, center: Position, capacity: u8) -> Self {
        let (capacity, (width, depth)) = if capacity > 2 {
            (4, FOUR_SEAT_SIZE)
        } else {
            (2, TWO_SEAT_SIZE)
        };
        Self {
            id,
            center,
            yaw: 0.0,
            width,
            depth,
            capacity,
        }
    }

    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.yaw = yaw;
        self
    }

    /// Half-diagonal of the footprint
    pub fn bounding_radius(&self) -> f32 {
        0.5 * (self.width * self.width + self.depth * self.depth).sqrt()
    }

    /// Bounding radius plus the inter-table buffer
    pub fn buffered_radius(&self) -> f32 {
        self.bounding_radius() + TABLE_BUFFER
    }

    /// Radius that covers the table, its seated guests and its service spots
    pub fn clearance_radius(&self) -> f32 {
        self.buffered_radius() + 2.0 * AGENT_RADIUS + 0.05
    }

    /// Convert a point in table-local coordinates to the floor frame
    pub fn to_world(&self, local: Position) -> Position {
        self.center + local.rotated(self.yaw)
    }

    pub fn circle(&self) -> Circle {
        Circle::new(self.center, self.bounding_radius())
    }

    /// Whether a floor point lies inside the rectangular footprint
    pub fn footprint_contains(&self, p: &Position) -> bool {
        let local = (*p - self.center).rotated(-self.yaw);
        local.x.abs() <= self.width * 0.5 && local.z.abs() <= self.depth * 0.5
    }
}

/// Reject layouts the obstacle model cannot hold: tables outside the room or
/// closer than the sum of their buffered radii.
pub fn validate_layout(tables: &[Table], room: &Room) -> Result<()> {
    let interior = room.interior();
    for (i, table) in tables.iter().enumerate() {
        if !table.center.is_finite() || !table.yaw.is_finite() {
            bail!("Table {} has a non-finite transform", table.id);
        }
        if table.capacity != 2 && table.capacity != 4 {
            bail!("Table {} has unsupported capacity {}", table.id, table.capacity);
        }
        let r = table.bounding_radius();
        if !interior.shrink(r).contains(&table.center) {
            bail!("Table {} does not fit inside the room", table.id);
        }
        for other in &tables[i + 1..] {
            if other.id == table.id {
                bail!("Duplicate table id {}", table.id);
            }
            let gap = table.center.distance(&other.center);
            if gap < table.buffered_radius() + other.buffered_radius() {
                bail!("Tables {} and {} overlap", table.id, other.id);
            }
        }
    }
    Ok(())
}

/// Place tables in rows between the foyer and the kitchen strip.
///
/// Four-seat tables go first. Tables that do not fit are dropped.
pub fn auto_layout(
    room: &Room,
    two_seat: u32,
    four_seat: u32,
    mut next_id: impl FnMut() -> TableId,
) -> Vec<Table> {
    let interior = room.interior();
    let min_x = interior.min_x + SIDE_MARGIN;
    let max_x = interior.max_x - SIDE_MARGIN;
    let min_z = interior.min_z + KITCHEN_STRIP;
    let max_z = interior.max_z - FOYER_STRIP;

    // Uniform cells sized for the largest table
    let probe = Table::new(TableId(super::types::SimId(0)), Position::ZERO, 4);
    let cell = 2.0 * probe.clearance_radius() + LAYOUT_GAP;

    let cols = (((max_x - min_x) / cell).floor().max(0.0)) as usize;
    let rows = (((max_z - min_z) / cell).floor().max(0.0)) as usize;
    let slots = cols * rows;

    let wanted = (four_seat + two_seat) as usize;
    if wanted > slots {
        warn!(
            "Only {} of {} tables fit the {:.1}x{:.1} room",
            slots, wanted, room.width, room.depth
        );
    }

    // Centre the grid inside the usable region
    let used_w = cols as f32 * cell;
    let used_d = rows as f32 * cell;
    let origin_x = min_x + ((max_x - min_x) - used_w) * 0.5 + cell * 0.5;
    let origin_z = max_z - ((max_z - min_z) - used_d) * 0.5 - cell * 0.5;

    let capacities = std::iter::repeat(4u8)
        .take(four_seat as usize)
        .chain(std::iter::repeat(2u8).take(two_seat as usize));

    capacities
        .take(slots)
        .enumerate()
        .map(|(slot, capacity)| {
            let row = slot / cols.max(1);
            let col = slot % cols.max(1);
            let center = Position::new(
                origin_x + col as f32 * cell,
                origin_z - row as f32 * cell,
            );
            Table::new(next_id(), center, capacity)
        })
        .collect()
}

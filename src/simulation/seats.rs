//! Seat anchors and service spots derived from table geometry
//!
//! Anchors are never stored on their own: they are regenerated from the table
//! list whenever a table is added, removed, moved or rotated.

use ordered_float::OrderedFloat;

use super::room::Bounds;
use super::table::{Table, TABLE_BUFFER};
use super::types::{Position, TableId, AGENT_RADIUS, HARD_PAD};

/// Clearance between a seated body and the table's buffered radius
pub const SEAT_MARGIN: f32 = 0.05;

/// How far behind the anchor the approach point sits
pub const APPROACH_OFFSET: f32 = 0.6;

/// Clearance between a serving body and the table's hard radius
const SERVICE_SPOT_MARGIN: f32 = 0.06;

/// Identifies one seat of one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeatId {
    pub table: TableId,
    pub index: u8,
}

impl SeatId {
    pub fn new(table: TableId, index: u8) -> Self {
        Self { table, index }
    }
}

/// A seating position next to a table
#[derive(Debug, Clone, PartialEq)]
pub struct SeatAnchor {
    pub id: SeatId,
    pub position: Position,
    /// Unit vector from the anchor towards the table centre
    pub facing: Position,
    /// Yaw matching `facing`
    pub yaw: f32,
    /// Point further out on the same radial line, walked to before snapping in
    pub approach: Position,
    pub table: TableId,
    pub capacity: u8,
}

/// Local (lateral, side) offsets of each seat. Seats sit on the two edges
/// parallel to the table width; four-tops put two per edge a quarter of the
/// width either side of the middle.
fn seat_slots(table: &Table) -> Vec<(f32, f32)> {
    let quarter = table.width * 0.25;
    if table.capacity >= 4 {
        vec![(-quarter, 1.0), (quarter, 1.0), (-quarter, -1.0), (quarter, -1.0)]
    } else {
        vec![(0.0, 1.0), (0.0, -1.0)]
    }
}

/// Anchors for one table
pub fn seat_anchors(table: &Table, inner: &Bounds) -> Vec<SeatAnchor> {
    // Seated body must clear the bounding circle, not just the rectangle
    let ring = table.buffered_radius() + AGENT_RADIUS + SEAT_MARGIN;
    let edge = table.depth * 0.5 + TABLE_BUFFER + AGENT_RADIUS + SEAT_MARGIN;

    seat_slots(table)
        .into_iter()
        .enumerate()
        .map(|(index, (lateral, side))| {
            let out = (ring * ring - lateral * lateral).max(edge * edge).sqrt();
            let position = table.to_world(Position::new(lateral, side * out));
            let radial = (position - table.center).normalized();
            let approach = inner.clamp(position + radial * APPROACH_OFFSET);
            SeatAnchor {
                id: SeatId::new(table.id, index as u8),
                position,
                facing: -radial,
                yaw: position.angle_to(&table.center),
                approach,
                table: table.id,
                capacity: table.capacity,
            }
        })
        .collect()
}

/// Anchors for every table, in table order
pub fn generate_anchors(tables: &[Table], inner: &Bounds) -> Vec<SeatAnchor> {
    tables
        .iter()
        .flat_map(|table| seat_anchors(table, inner))
        .collect()
}

/// Where staff stand to serve a table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceSpots {
    pub primary: Position,
    pub secondary: Position,
}

/// The two candidate service spots at the middle of the table's short ends,
/// the reachable one nearest the kitchen first.
pub fn service_spots(table: &Table, kitchen: Position, inner: &Bounds) -> ServiceSpots {
    let out = table.bounding_radius() + AGENT_RADIUS + HARD_PAD + SERVICE_SPOT_MARGIN;
    let mut spots = [
        table.to_world(Position::new(out, 0.0)),
        table.to_world(Position::new(-out, 0.0)),
    ];
    spots.sort_by_key(|spot| (!inner.contains(spot), OrderedFloat(spot.distance(&kitchen))));
    ServiceSpots {
        primary: spots[0],
        secondary: spots[1],
    }
}

//! Floor geometry: room shell, tables, seat anchors, service spots and the
//! obstacle helpers derived from them.

use restaurant_sim::simulation::{
    auto_layout, find_narrow_gaps, seat_anchors, service_spots, validate_layout, AgentId,
    AgentKind, AgentSample, Bounds, Circle, ObstacleSet, Position, Room, SimId, SpatialHash, Table,
    TableId, AGENT_RADIUS,
};

fn table_id(n: usize) -> TableId {
    TableId(SimId(n))
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

fn id_counter(start: usize) -> impl FnMut() -> TableId {
    let mut next = start;
    move || {
        let id = table_id(next);
        next += 1;
        id
    }
}

#[test]
fn test_room_landmarks() {
    let room = Room::default();
    let (left, right) = room.door_span();
    assert!(approx(left, -0.6));
    assert!(approx(right, 1.0));
    assert!(approx(room.lane_x(1), 0.2));
    assert!(approx(room.spawn_point(0).z, 6.0));
    assert!(approx(room.kitchen_point().x, 3.0));
    assert!(approx(room.kitchen_point().z, -4.2));
    assert!(room.staff_exit_point().z < room.staff_exit_boundary_z());
    assert!(room.outside_threshold_z() > room.front_outer_z());
    assert!(room.entry_threshold_z() < room.front_z());
    assert_eq!(room.door_capacity(AGENT_RADIUS), 3);
}

#[test]
fn test_clamp_agent_respects_door() {
    let room = Room::default();

    // Outside the front wall an agent may only stand between the jambs
    let through = room.clamp_agent(Position::new(5.0, 5.5), AGENT_RADIUS, true);
    assert!(approx(through.x, 0.75));
    assert!(approx(through.z, 5.5));

    let blocked = room.clamp_agent(Position::new(5.0, 5.5), AGENT_RADIUS, false);
    assert!(approx(blocked.x, 5.0));
    assert!(approx(blocked.z, 4.55));

    let inside = room.clamp_agent(Position::new(-9.0, -9.0), AGENT_RADIUS, true);
    assert!(approx(inside.x, -5.55));
    assert!(approx(inside.z, -4.55));
}

#[test]
fn test_room_offsets_are_clamped() {
    let mut room = Room::default();
    room.set_door_left(100.0);
    let (_, right) = room.door_span();
    assert!(approx(right, 5.8));

    room.set_kitchen_offset(-50.0);
    assert!(approx(room.kitchen_point().x, -5.2));
    room.set_restroom_offset(f32::NAN);
    assert!(approx(room.restroom_point().z, 0.0));
}

#[test]
fn test_anchor_counts() {
    let inner = Room::default().inner(AGENT_RADIUS);
    let two = Table::new(table_id(1), Position::ZERO, 2);
    let four = Table::new(table_id(2), Position::new(3.0, 0.0), 4);
    assert_eq!(seat_anchors(&two, &inner).len(), 2);
    assert_eq!(seat_anchors(&four, &inner).len(), 4);
}

#[test]
fn test_anchors_clear_the_table() {
    let inner = Room::default().inner(AGENT_RADIUS);
    for table in [
        Table::new(table_id(1), Position::new(-1.0, 0.5), 2),
        Table::new(table_id(2), Position::new(1.5, -0.5), 4).with_yaw(0.7),
    ] {
        for anchor in seat_anchors(&table, &inner) {
            let dist = anchor.position.distance(&table.center);
            assert!(
                dist - AGENT_RADIUS > table.buffered_radius(),
                "seat {:?} too close to its table",
                anchor.id
            );
            assert!(!table.footprint_contains(&anchor.position));
            assert_eq!(anchor.table, table.id);
            assert_eq!(anchor.capacity, table.capacity);
        }
    }
}

#[test]
fn test_four_top_laterals_follow_rotation() {
    let inner = Room::default().inner(AGENT_RADIUS);
    let table = Table::new(table_id(1), Position::new(0.5, -1.0), 4).with_yaw(0.7);
    for anchor in seat_anchors(&table, &inner) {
        let local = (anchor.position - table.center).rotated(-table.yaw);
        assert!(approx(local.x.abs(), 0.3), "lateral offset {}", local.x);
    }
}

#[test]
fn test_anchor_faces_table() {
    let inner = Room::default().inner(AGENT_RADIUS);
    let table = Table::new(table_id(1), Position::new(-2.0, 1.0), 4).with_yaw(-0.4);
    for anchor in seat_anchors(&table, &inner) {
        let toward = (table.center - anchor.position).normalized();
        assert!(approx(anchor.facing.x, toward.x));
        assert!(approx(anchor.facing.z, toward.z));
        assert!(approx(anchor.yaw, toward.x.atan2(toward.z)));

        // Approach point sits further out on the same line
        assert!(anchor.approach.distance(&table.center) > anchor.position.distance(&table.center));
    }
}

#[test]
fn test_service_spots_prefer_kitchen_side() {
    let inner = Room::default().inner(AGENT_RADIUS);
    let table = Table::new(table_id(1), Position::ZERO, 2);
    let spots = service_spots(&table, Position::new(3.0, -4.2), &inner);
    assert!(spots.primary.x > 0.0);
    assert!(spots.secondary.x < 0.0);
    assert!(spots.primary.distance(&table.center) > table.bounding_radius() + AGENT_RADIUS);
}

#[test]
fn test_service_spots_skip_unreachable() {
    let inner = Room::default().inner(AGENT_RADIUS);
    let table = Table::new(table_id(1), Position::new(-4.8, 0.0), 2);
    // Kitchen on the wall side, but that spot is inside the wall
    let spots = service_spots(&table, Position::new(-6.0, 0.0), &inner);
    assert!(inner.contains(&spots.primary));
    assert!(!inner.contains(&spots.secondary));
    assert!(spots.primary.x > table.center.x);
}

#[test]
fn test_validate_layout() {
    let room = Room::default();
    let ok = vec![
        Table::new(table_id(1), Position::ZERO, 2),
        Table::new(table_id(2), Position::new(2.0, 0.0), 4),
    ];
    assert!(validate_layout(&ok, &room).is_ok());

    let overlapping = vec![
        Table::new(table_id(1), Position::ZERO, 2),
        Table::new(table_id(2), Position::new(1.0, 0.0), 2),
    ];
    assert!(validate_layout(&overlapping, &room).is_err());

    let outside = vec![Table::new(table_id(1), Position::new(5.7, 0.0), 2)];
    assert!(validate_layout(&outside, &room).is_err());

    let duplicate = vec![
        Table::new(table_id(1), Position::ZERO, 2),
        Table::new(table_id(1), Position::new(3.0, 0.0), 2),
    ];
    assert!(validate_layout(&duplicate, &room).is_err());

    let mut odd = Table::new(table_id(1), Position::ZERO, 2);
    odd.capacity = 3;
    assert!(validate_layout(&[odd], &room).is_err());

    let mut broken = Table::new(table_id(1), Position::ZERO, 2);
    broken.center.x = f32::NAN;
    assert!(validate_layout(&[broken], &room).is_err());
}

#[test]
fn test_auto_layout_four_tops_first() {
    let room = Room::default();
    let tables = auto_layout(&room, 1, 2, id_counter(10));
    let capacities: Vec<u8> = tables.iter().map(|t| t.capacity).collect();
    assert_eq!(capacities, vec![4, 4, 2]);
    assert_eq!(tables[0].id, table_id(10));
    assert!(validate_layout(&tables, &room).is_ok());
}

#[test]
fn test_auto_layout_drops_what_does_not_fit() {
    let room = Room::default();
    let tables = auto_layout(&room, 10, 0, id_counter(0));
    assert_eq!(tables.len(), 6);
    assert!(validate_layout(&tables, &room).is_ok());

    // Seats stay inside the room and clear of other tables
    let inner = room.inner(AGENT_RADIUS);
    for table in &tables {
        for anchor in seat_anchors(table, &inner) {
            assert!(room.interior().contains(&anchor.position));
            for other in tables.iter().filter(|t| t.id != table.id) {
                assert!(anchor.position.distance(&other.center) > other.buffered_radius() + AGENT_RADIUS);
            }
        }
    }
}

#[test]
fn test_auto_layout_tiny_room_is_empty() {
    let mut config = restaurant_sim::simulation::RoomConfig::default();
    config.width = 4.0;
    config.depth = 4.0;
    config.door_left = 1.0;
    let room = Room::from_config(&config);
    assert!(auto_layout(&room, 2, 2, id_counter(0)).is_empty());
}

#[test]
fn test_narrow_gaps() {
    let mut set = ObstacleSet::new();
    set.set_tables(vec![
        (table_id(1), Circle::new(Position::ZERO, 0.5)),
        (table_id(2), Circle::new(Position::new(1.4, 0.0), 0.5)),
        (table_id(3), Circle::new(Position::new(10.0, 0.0), 0.5)),
    ]);
    let gaps = find_narrow_gaps(set.tables.iter(), 0.65);
    assert_eq!(gaps.len(), 1);
    assert!(approx(gaps[0].width, 0.4));
    assert!(approx(gaps[0].midpoint.x, 0.7));
    assert!(approx(gaps[0].midpoint.z, 0.0));
    assert!(approx(gaps[0].axis.x, 1.0));
}

#[test]
fn test_obstacle_sets_per_population() {
    let mut set = ObstacleSet::new();
    set.set_tables(vec![(table_id(1), Circle::new(Position::ZERO, 0.5))]);
    let seated = AgentId(SimId(5));
    let walking = AgentId(SimId(6));
    set.set_customers(
        vec![(seated, Circle::new(Position::new(1.0, 0.0), AGENT_RADIUS))],
        vec![(walking, Circle::new(Position::new(2.0, 0.0), AGENT_RADIUS))],
    );
    assert_eq!(set.for_customers().count(), 2);
    assert_eq!(set.for_staff().count(), 3);
    assert!(set.for_staff().any(|o| o.is_agent(walking)));
    assert!(!set.for_customers().any(|o| o.is_agent(walking)));
    assert_eq!(set.circles().len(), 3);
}

#[test]
fn test_spatial_hash_neighbors() {
    let sample = |n: usize, x: f32, z: f32| AgentSample {
        id: AgentId(SimId(n)),
        kind: AgentKind::Customer,
        position: Position::new(x, z),
        velocity: Position::ZERO,
        radius: AGENT_RADIUS,
        pinned: false,
    };
    let mut hash = SpatialHash::default();
    hash.rebuild(vec![sample(1, 0.0, 0.0), sample(2, 0.5, 0.0), sample(3, 3.0, 3.0), sample(4, -0.9, 0.3)]);
    assert_eq!(hash.len(), 4);

    let mut near: Vec<usize> = hash
        .neighbors(Position::ZERO, 1.0)
        .map(|s| s.id.0 .0)
        .collect();
    near.sort();
    assert_eq!(near, vec![1, 2, 4]);

    hash.rebuild(Vec::new());
    assert!(hash.is_empty());
    assert_eq!(hash.neighbors(Position::ZERO, 5.0).count(), 0);
}

#[test]
fn test_bounds_helpers() {
    let bounds = Bounds::new(-1.0, 1.0, -2.0, 2.0);
    assert!(bounds.is_valid());
    assert!(bounds.contains(&Position::new(1.0, 2.0)));
    assert!(!bounds.contains(&Position::new(1.1, 0.0)));
    let shrunk = bounds.shrink(0.5);
    assert!(approx(shrunk.width(), 1.0));
    assert!(approx(shrunk.depth(), 3.0));
    assert!(!bounds.shrink(1.5).is_valid());
}

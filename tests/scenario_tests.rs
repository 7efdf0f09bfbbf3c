//! Whole-world scenarios driven through the public API
//!
//! These run the full tick loop: arrivals, seating, service, restroom trips,
//! departures, pausing and layout edits.

use std::collections::{HashMap, HashSet};

use restaurant_sim::simulation::{
    AgentId, Customer, CustomerPhase, Position, RestaurantWorld, SessionTimer, SimConfig, SimEvent,
    SimId, StaffPhase, Table, AGENT_RADIUS, HARD_PAD,
};

const DT: f32 = 0.1;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

/// One two-seat table, one guest, no restroom trips
fn single_table_config(staff_count: u32) -> SimConfig {
    SimConfig {
        two_seat_tables: 1,
        four_seat_tables: 0,
        staff_count,
        incoming: 1,
        toilet_probability: 0.0,
        ..SimConfig::default()
    }
}

/// Tick until `done` holds or `max_ticks` run out; returns whether it held
fn run_until(world: &mut RestaurantWorld, max_ticks: usize, mut done: impl FnMut(&RestaurantWorld) -> bool) -> bool {
    for _ in 0..max_ticks {
        world.tick(DT);
        if done(world) {
            return true;
        }
    }
    false
}

/// Agents taking part in hard separation, with whether each is pinned
fn bodies(world: &RestaurantWorld) -> Vec<(AgentId, Position, bool)> {
    let customers = world
        .customers
        .iter()
        .filter(|c| c.phase.is_walking() || c.phase == CustomerPhase::Seated)
        .map(|c| (c.id, c.position, c.phase == CustomerPhase::Seated));
    let staff = world
        .staff
        .agents
        .iter()
        .filter(|a| a.phase != StaffPhase::Despawn)
        .map(|a| (a.id, a.position, a.phase.is_pinned()));
    customers.chain(staff).collect()
}

/// Pairs closer than their hard radii plus pad, pinned pairs excluded
fn overlapping_pairs(world: &RestaurantWorld) -> HashSet<(AgentId, AgentId)> {
    let min_gap = 2.0 * AGENT_RADIUS + HARD_PAD;
    let bodies = bodies(world);
    let mut pairs = HashSet::new();
    for (i, a) in bodies.iter().enumerate() {
        for b in &bodies[i + 1..] {
            if a.2 && b.2 {
                continue;
            }
            if a.1.distance(&b.1) < min_gap - 1e-3 {
                pairs.insert((a.0.min(b.0), a.0.max(b.0)));
            }
        }
    }
    pairs
}

fn index_of(events: &[SimEvent], pred: impl Fn(&SimEvent) -> bool) -> Option<usize> {
    events.iter().position(pred)
}

/// Stay length of the first customer seen seated
fn observed_stay(world: &mut RestaurantWorld, max_ticks: usize) -> Option<f32> {
    for _ in 0..max_ticks {
        world.tick(DT);
        if let Some(c) = world.customers.iter().find(|c| c.phase == CustomerPhase::Seated) {
            return Some(c.leave_at? - c.seated_at?);
        }
    }
    None
}

#[test]
fn test_single_guest_full_visit() {
    let mut world = RestaurantWorld::new_with_config_and_seed(single_table_config(0), 7);
    assert_eq!(world.pending_arrivals(), 1);
    assert_eq!(world.tables().len(), 1);

    let stay = observed_stay(&mut world, 600).expect("guest should sit down");
    assert!(approx(stay, 45.0), "stay was {}", stay);
    assert_eq!(world.active_tables(), 1);

    let gone = run_until(&mut world, 1200, |w| w.customers.is_empty());
    assert!(gone, "guest never left");

    let throughput = world.throughput();
    assert_eq!(throughput.spawned, 1);
    assert_eq!(throughput.departed, 1);
    assert_eq!(throughput.served, 1);
    assert_eq!(throughput.balked, 0);
    assert_eq!(world.active_tables(), 0);

    let stats = world.stats();
    assert!(approx(stats.revenue, 25.0));
    assert!(approx(stats.turnover, 1.0));
    assert!(stats.revpash > 0.0);
    assert_eq!(stats.inside, 0);
    assert_eq!(stats.pending, 0);
}

#[test]
fn test_visit_events_in_order() {
    let mut world = RestaurantWorld::new_with_config_and_seed(single_table_config(0), 7);
    let mut events = Vec::new();
    let gone = run_until(&mut world, 1800, |w| w.throughput().departed == 1 && w.customers.is_empty());
    assert!(gone);
    events.extend(world.drain_events());
    assert!(world.drain_events().is_empty());

    let spawned = index_of(&events, |e| matches!(e, SimEvent::CustomerSpawned { .. })).expect("spawned");
    let seated = index_of(&events, |e| matches!(e, SimEvent::CustomerSeated { .. })).expect("seated");
    let occupied = index_of(&events, |e| matches!(e, SimEvent::TableOccupied(_))).expect("occupied");
    let requested =
        index_of(&events, |e| matches!(e, SimEvent::ServiceRequested { .. })).expect("requested");
    let vacated = index_of(&events, |e| matches!(e, SimEvent::TableVacated(_))).expect("vacated");
    let departed = index_of(&events, |e| {
        matches!(e, SimEvent::CustomerDeparted { served: true, .. })
    })
    .expect("departed");

    assert_eq!(spawned, 0);
    assert!(spawned < seated);
    assert!(seated < occupied);
    assert!(occupied < requested);
    assert!(requested < vacated);
    assert!(vacated < departed);

    // Nobody was on staff, so the request died with the vacated table
    assert!(world.requests().is_empty());
}

#[test]
fn test_staff_serves_new_table() {
    let mut world = RestaurantWorld::new_with_config_and_seed(single_table_config(1), 3);
    let table = world.tables()[0].id;

    let mut phases: Vec<StaffPhase> = Vec::new();
    let mut events = Vec::new();
    for _ in 0..1200 {
        world.tick(DT);
        events.extend(world.drain_events());
        if let Some(agent) = world.staff.agents.first() {
            if phases.last() != Some(&agent.phase) {
                phases.push(agent.phase);
            }
        }
        if world.throughput().requests_served == 1 && phases.last() == Some(&StaffPhase::Idle) {
            break;
        }
    }

    assert_eq!(
        phases,
        vec![
            StaffPhase::Idle,
            StaffPhase::GoToTable,
            StaffPhase::Serving,
            StaffPhase::Returning,
            StaffPhase::Idle
        ]
    );
    assert!(events.contains(&SimEvent::ServiceStarted {
        staff: world.staff.agents[0].id,
        table
    }));
    assert!(events.contains(&SimEvent::ServiceCompleted {
        staff: world.staff.agents[0].id,
        table
    }));
    assert_eq!(world.throughput().teleports, 0);
    assert!(world.staff.utilization() > 0.0);
    assert!(world.stats().utilization < 1.0);
}

#[test]
fn test_staff_load_lengthens_stay() {
    let config = SimConfig {
        service_load_threshold: 0.5,
        ..single_table_config(1)
    };
    let mut world = RestaurantWorld::new_with_config_and_seed(config, 5);
    let stay = observed_stay(&mut world, 600).expect("guest should sit down");
    assert!(approx(stay, 50.625), "stay was {}", stay);
    assert!(approx(world.service_coefficient(), 1.125));
}

#[test]
fn test_time_limit_caps_stay() {
    let config = SimConfig {
        time_limit_enabled: true,
        time_cap_secs: 20.0,
        ..single_table_config(0)
    };
    let mut world = RestaurantWorld::new_with_config_and_seed(config, 5);
    let stay = observed_stay(&mut world, 600).expect("guest should sit down");
    assert!(approx(stay, 20.0), "stay was {}", stay);
}

#[test]
fn test_restroom_trip_hides_guest() {
    let config = SimConfig {
        toilet_probability: 1.0,
        ..single_table_config(0)
    };
    let mut world = RestaurantWorld::new_with_config_and_seed(config, 9);

    let mut saw_away = false;
    let mut saw_hidden = false;
    let mut sat_down_again = false;
    for _ in 0..2400 {
        world.tick(DT);
        let Some(customer) = world.customers.first() else {
            if world.throughput().departed == 1 {
                break;
            }
            continue;
        };
        if customer.phase == CustomerPhase::ToiletUse {
            saw_away = true;
            saw_hidden |= world
                .agent_views()
                .iter()
                .any(|v| v.id == customer.id && !v.visible && v.phase == "toiletUse");
            // Away guests still hold their table
            assert_eq!(world.active_tables(), 1);
        }
        if saw_away && customer.phase == CustomerPhase::Seated {
            sat_down_again = true;
            assert!(customer.restroom.done);
        }
    }

    assert!(saw_away, "guest never used the restroom");
    assert!(saw_hidden);
    assert!(sat_down_again || world.throughput().departed == 1);
    assert_eq!(world.throughput().departed, 1);
    assert_eq!(world.throughput().served, 1);
}

#[test]
fn test_world_invariants_under_load() {
    let mut world = RestaurantWorld::create_demo_world_with_seed(11);
    let interior = world.room().interior();
    let mut last_departed = 0;
    let mut departed_events = 0;

    for tick in 0..1500 {
        world.tick(DT);
        departed_events += world
            .drain_events()
            .iter()
            .filter(|e| matches!(e, SimEvent::CustomerDeparted { .. }))
            .count();

        // Seats are held by at most one customer
        let mut held = HashSet::new();
        for seat in world.customers.iter().filter_map(|c| c.seat) {
            assert!(held.insert(seat), "seat {:?} held twice at tick {}", seat, tick);
        }

        // Occupancy is exactly the seated holders, within capacity
        for table in world.tables() {
            let holders = world
                .customers
                .iter()
                .filter(|c| c.occupies_seat() && c.seat.map(|s| s.table) == Some(table.id))
                .count();
            assert_eq!(world.table_occupancy(table.id), holders);
            assert!(holders <= table.capacity as usize);
        }

        for customer in &world.customers {
            assert!(customer.position.is_finite());
            if customer.phase == CustomerPhase::Seated {
                let anchor = customer
                    .seat
                    .and_then(|s| world.seats().get(&s))
                    .expect("seated customers hold a seat");
                assert!(customer.position.distance(&anchor.position) < 1e-3);
            }
        }

        // Customers off the door path stay inside the walls
        let inner = world.room().inner(AGENT_RADIUS);
        for customer in world.customers.iter().filter(|c| {
            !matches!(
                c.phase,
                CustomerPhase::ApproachDoor | CustomerPhase::Exit | CustomerPhase::Outside
            )
        }) {
            let p = customer.position;
            assert!(
                p.x >= inner.min_x - 1e-3
                    && p.x <= inner.max_x + 1e-3
                    && p.z >= inner.min_z - 1e-3
                    && p.z <= inner.max_z + 1e-3,
                "customer {} in {} out of bounds at {:?} (tick {})",
                customer.id,
                customer.phase,
                p,
                tick
            );
        }

        for agent in &world.staff.agents {
            assert!(agent.position.is_finite());
            assert!(agent.position.x >= interior.min_x - 1e-3 && agent.position.x <= interior.max_x + 1e-3);
            assert!(agent.position.z >= interior.min_z - 1e-3 && agent.position.z <= interior.max_z + 1e-3);
        }

        let departed = world.throughput().departed;
        assert!(departed >= last_departed);
        last_departed = departed;
        assert_eq!(departed_events, departed);
        assert!(world.throughput().served <= departed);
    }

    assert!(world.throughput().spawned > 0);
    assert!(world.stats().seat_count == 12);
}

#[test]
fn test_agents_never_stay_overlapped() {
    for seed in [1, 11, 23] {
        let mut world = RestaurantWorld::create_demo_world_with_seed(seed);
        let mut previous = HashSet::new();
        for tick in 0..3000 {
            world.tick(DT);
            let current = overlapping_pairs(&world);
            let repeated: Vec<_> = current.intersection(&previous).collect();
            assert!(
                repeated.is_empty(),
                "seed {}: pairs {:?} still overlapping at tick {}",
                seed,
                repeated,
                tick
            );
            previous = current;
        }
        assert!(world.throughput().departed > 0);
    }
}

#[test]
fn test_customers_in_the_doorway_part_along_z() {
    let config = SimConfig {
        incoming: 0,
        staff_count: 0,
        ..SimConfig::default()
    };
    let mut world = RestaurantWorld::new_with_config_and_seed(config, 2);
    let room = world.room().clone();
    let (left, right) = room.door_span();
    let jamb = right - AGENT_RADIUS;

    let mut leaving = Customer::new(AgentId(SimId(9000)), 2, &room, 0.0);
    leaving.phase = CustomerPhase::Exit;
    leaving.reached_door = true;
    leaving.has_sat = true;
    leaving.position = Position::new(jamb, 5.2);
    let mut arriving = Customer::new(AgentId(SimId(9001)), 2, &room, 0.0);
    arriving.position = Position::new(jamb, 5.0);
    world.customers.push(leaving);
    world.customers.push(arriving);

    let min_gap = 2.0 * AGENT_RADIUS + HARD_PAD;
    for _ in 0..10 {
        world.tick(DT);
        let [a, b] = [&world.customers[0], &world.customers[1]];
        if a.phase == CustomerPhase::Outside || b.phase == CustomerPhase::Outside {
            break;
        }
        assert!(
            a.position.distance(&b.position) >= min_gap - 1e-3,
            "{:?} vs {:?}",
            a.position,
            b.position
        );
        for c in [a, b] {
            if c.position.z > room.inner(AGENT_RADIUS).max_z {
                assert!(c.position.x >= left + AGENT_RADIUS - 1e-3);
                assert!(c.position.x <= right - AGENT_RADIUS + 1e-3);
            }
        }
    }
}

#[test]
fn test_restroom_trips_return_before_departure() {
    let config = SimConfig {
        toilet_probability: 1.0,
        incoming: 10,
        ..SimConfig::default()
    };
    let mut world = RestaurantWorld::new_with_config_and_seed(config, 5);
    let away = |phase: CustomerPhase| matches!(phase, CustomerPhase::ToiletGo | CustomerPhase::ToiletUse);

    let mut last_phase: HashMap<AgentId, CustomerPhase> = HashMap::new();
    let mut trips = 0;
    let mut returns = 0;
    for _ in 0..2000 {
        world.tick(DT);
        let now = world.time;
        for customer in &world.customers {
            let leave_at = customer.leave_at.unwrap_or(f32::INFINITY);
            if away(customer.phase) {
                assert!(leave_at - now > 0.0, "customer {} still away at {:.1}s", customer.id, now);
            }
            match last_phase.insert(customer.id, customer.phase) {
                Some(CustomerPhase::ToiletGo) if customer.phase == CustomerPhase::ToiletUse => trips += 1,
                Some(previous) if away(previous) && !away(customer.phase) => {
                    assert_eq!(customer.phase, CustomerPhase::ToSeat);
                    assert!(now <= leave_at, "customer {} back at {:.1}s after {:.1}s", customer.id, now, leave_at);
                    returns += 1;
                }
                _ => {}
            }
        }
    }

    assert!(trips > 0, "nobody used the restroom");
    assert!(returns > 0);
}

#[test]
fn test_revenue_is_booked_at_departure_price() {
    let mut world = RestaurantWorld::new_with_config_and_seed(single_table_config(0), 7);
    let gone = run_until(&mut world, 1800, |w| w.throughput().departed == 1);
    assert!(gone, "guest never left");
    assert!(approx(world.stats().revenue, 25.0));

    // A later price change does not rewrite what was already earned
    let mut config = world.config().clone();
    config.current_price = 40.0;
    world.apply_config(config);
    assert!(approx(world.config().effective_average_spend(), 50.0));
    assert!(approx(world.stats().revenue, 25.0));
    assert!(approx(world.throughput().revenue, 25.0));
}

#[test]
fn test_pause_freezes_customers_and_clears_staff() {
    let mut world = RestaurantWorld::create_demo_world_with_seed(4);
    for _ in 0..150 {
        world.tick(DT);
    }
    assert_eq!(world.staff.active_count(), 2);

    world.set_running(false);
    assert!(!world.is_running());
    assert_eq!(world.staff.active_count(), 0);
    let time = world.time;
    let positions: Vec<Position> = world.customers.iter().map(|c| c.position).collect();

    let cleared = run_until(&mut world, 300, |w| w.staff.is_empty());
    assert!(cleared, "staff did not leave the floor");
    assert_eq!(world.time, time);
    let frozen: Vec<Position> = world.customers.iter().map(|c| c.position).collect();
    assert_eq!(positions, frozen);

    world.set_running(true);
    world.tick(DT);
    assert!(world.time > time);
    assert_eq!(world.staff.active_count(), 2);
    assert!(world
        .staff
        .agents
        .iter()
        .all(|a| a.phase == StaffPhase::Idle || a.phase == StaffPhase::GoToTable));
}

#[test]
fn test_session_countdown_pauses_world() {
    let config = SimConfig {
        session_length_secs: 5.0,
        ..SimConfig::default()
    };
    let mut world = RestaurantWorld::new_with_config(config);
    for _ in 0..4 {
        world.advance_wall_clock(1.0);
    }
    assert!(world.is_running());
    assert!(approx(world.session().remaining(), 1.0));

    world.advance_wall_clock(1.0);
    assert!(!world.is_running());
    assert!(world.session().is_expired());

    world.reset_timer();
    assert!(approx(world.session().remaining(), 5.0));
    assert!(!world.is_running());

    // Paused worlds do not count down
    world.advance_wall_clock(2.0);
    assert!(approx(world.session().remaining(), 5.0));
    world.set_running(true);
    world.advance_wall_clock(2.0);
    assert!(approx(world.session().remaining(), 3.0));
}

#[test]
fn test_session_timer() {
    let mut disabled = SessionTimer::new(0.0);
    assert!(!disabled.is_enabled());
    assert!(!disabled.advance(100.0, true));

    let mut timer = SessionTimer::new(10.0);
    assert!(!timer.advance(4.0, true));
    assert!(!timer.advance(4.0, false));
    assert!(approx(timer.remaining(), 6.0));

    // Lengthening keeps the elapsed time
    timer.set_length(20.0);
    assert!(approx(timer.remaining(), 16.0));

    assert!(timer.advance(16.0, true));
    // Expiry is reported once
    assert!(!timer.advance(1.0, true));
    assert!(timer.is_expired());
}

#[test]
fn test_arrivals_only_grow_with_incoming() {
    let config = SimConfig {
        incoming: 3,
        staff_count: 0,
        ..SimConfig::default()
    };
    let mut world = RestaurantWorld::new_with_config(config.clone());
    assert_eq!(world.pending_arrivals(), 3);

    world.apply_config(SimConfig { incoming: 5, ..config.clone() });
    assert_eq!(world.pending_arrivals(), 5);

    // Lowering never removes pending guests, but moves the watermark
    world.apply_config(SimConfig { incoming: 2, ..config.clone() });
    assert_eq!(world.pending_arrivals(), 5);
    world.apply_config(SimConfig { incoming: 4, ..config });
    assert_eq!(world.pending_arrivals(), 7);
}

#[test]
fn test_price_elasticity_scales_arrivals() {
    let config = SimConfig {
        incoming: 10,
        current_price: 40.0,
        ..SimConfig::default()
    };
    let world = RestaurantWorld::new_with_config(config);
    assert_eq!(world.pending_arrivals(), 5);
}

#[test]
fn test_arrival_rate_adds_guests() {
    let config = SimConfig {
        arrivals_per_minute: 60.0,
        staff_count: 0,
        ..single_table_config(0)
    };
    let config = SimConfig { incoming: 0, ..config };
    let mut world = RestaurantWorld::new_with_config(config);
    assert_eq!(world.pending_arrivals(), 0);
    for _ in 0..12 {
        world.tick(DT);
    }
    assert_eq!(world.throughput().spawned + world.pending_arrivals(), 1);
}

#[test]
fn test_overlapping_layout_is_rejected() {
    let mut world = RestaurantWorld::new_with_seed(1);
    let before: Vec<Table> = world.tables().into_iter().cloned().collect();
    assert_eq!(before.len(), 4);

    let a = world.next_table_id();
    let b = world.next_table_id();
    let overlapping = vec![
        Table::new(a, Position::ZERO, 2),
        Table::new(b, Position::new(0.5, 0.0), 4),
    ];
    assert!(world.set_tables(overlapping).is_err());

    let after: Vec<Table> = world.tables().into_iter().cloned().collect();
    assert_eq!(before, after);
    assert_eq!(world.seats().len(), 12);
}

#[test]
fn test_move_table_regenerates_seats() {
    let mut world = RestaurantWorld::new_with_seed(1);
    let table = world.tables()[0].clone();
    let old_seat = world
        .seats()
        .values()
        .find(|s| s.table == table.id)
        .map(|s| s.position)
        .expect("seat");

    let target = Position::new(table.center.x, table.center.z - 0.3);
    world.move_table(table.id, target, 0.2).expect("valid move");
    let moved = world.table(table.id).expect("still there");
    assert_eq!(moved.center, target);
    assert_eq!(moved.yaw, 0.2);
    assert_eq!(world.seats().len(), 12);
    assert!(world.seats().values().filter(|s| s.table == table.id).all(|s| s.position != old_seat));

    // Onto a neighbour is refused
    let other = world.tables()[1].center;
    assert!(world.move_table(table.id, other, 0.0).is_err());
    assert_eq!(world.table(table.id).map(|t| t.center), Some(target));

    let missing = world.next_table_id();
    assert!(world.move_table(missing, Position::ZERO, 0.0).is_err());
}

#[test]
fn test_removed_table_reseats_guest() {
    let config = SimConfig {
        two_seat_tables: 2,
        ..single_table_config(0)
    };
    let mut world = RestaurantWorld::new_with_config_and_seed(config, 2);
    let seated = run_until(&mut world, 600, |w| {
        w.customers.iter().any(|c| c.phase == CustomerPhase::Seated)
    });
    assert!(seated);

    let held = world.customers[0].seat.expect("seat").table;
    let remaining: Vec<Table> = world
        .tables()
        .into_iter()
        .filter(|t| t.id != held)
        .cloned()
        .collect();
    let kept = remaining[0].id;
    world.set_tables(remaining).expect("smaller layout is valid");

    let customer = &world.customers[0];
    assert_eq!(customer.phase, CustomerPhase::ToSeat);
    assert_eq!(customer.seat.map(|s| s.table), Some(kept));
    assert_eq!(world.table_occupancy(held), 0);
    assert_eq!(world.table_occupancy(kept), 1);

    let gone = run_until(&mut world, 1500, |w| w.customers.is_empty());
    assert!(gone);
    assert_eq!(world.throughput().served, 1);
}

#[test]
fn test_kitchen_move_rehomes_idle_staff() {
    let config = SimConfig {
        staff_count: 1,
        ..SimConfig::default()
    };
    let mut world = RestaurantWorld::new_with_config(config);
    world.tick(DT);
    world.set_kitchen_offset(-3.0);
    let agent = &world.staff.agents[0];
    assert!(approx(agent.home.x, -3.0));
    assert_eq!(agent.position, agent.home);
}

#[test]
fn test_agent_views_match_agents() {
    let mut world = RestaurantWorld::create_demo_world_with_seed(21);
    for _ in 0..400 {
        world.tick(DT);
    }
    let views = world.agent_views();
    assert_eq!(views.len(), world.customers.len() + world.staff.len());

    for customer in &world.customers {
        let view = views.iter().find(|v| v.id == customer.id).expect("view");
        assert_eq!(view.position, customer.position);
        assert_eq!(view.visible, customer.phase != CustomerPhase::ToiletUse);
        assert_eq!(view.phase, customer.phase.label());
        if customer.phase == CustomerPhase::Seated {
            let anchor = customer.seat.and_then(|s| world.seats().get(&s)).expect("seat");
            assert!(approx(view.yaw, anchor.yaw));
        }
    }
}

#[test]
fn test_config_room_change_relayouts() {
    let mut world = RestaurantWorld::new_with_seed(1);
    let before: Vec<_> = world.tables().iter().map(|t| t.id).collect();
    let mut config = world.config().clone();
    config.room.width = 14.0;
    world.apply_config(config);
    assert!(approx(world.room().width, 14.0));
    let after: Vec<_> = world.tables().iter().map(|t| t.id).collect();
    assert_eq!(after.len(), 4);
    assert_ne!(before, after);

    // Price changes alone keep the layout
    let mut config = world.config().clone();
    config.current_price = 30.0;
    world.apply_config(config);
    let same: Vec<_> = world.tables().iter().map(|t| t.id).collect();
    assert_eq!(after, same);
}

use std::process::Command;

fn run_sim(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_restaurant_sim"))
        .args(args)
        .env("RUST_LOG", "warn,restaurant_sim=info")
        .output()
        .expect("Failed to execute simulation")
}

/// Test that the simulation runs in headless mode without crashing
#[test]
fn test_headless_simulation_runs() {
    let output = run_sim(&["--ticks", "300", "--seed", "3"]);

    assert!(
        output.status.success(),
        "Simulation failed to run in headless mode. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("SIMULATION COMPLETE"),
        "Simulation did not complete properly. stderr: {}",
        stderr
    );
}

/// Test that the summary and final statistics are printed
#[test]
fn test_simulation_statistics_printed() {
    let output = run_sim(&["--ticks", "200", "--seed", "5", "--report-every", "5"]);
    assert!(output.status.success(), "Simulation failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("=== Final State ==="), "Missing final state");
    assert!(stdout.contains("=== Restaurant Simulation Summary ==="), "Missing summary");
    assert!(stdout.contains("Revenue: $"), "Missing revenue line");
    assert!(stdout.contains("--- After tick"), "Missing periodic report");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Pending:"), "Missing stats log line");
}

/// Test that the floor map is drawn on request
#[test]
fn test_simulation_draws_map() {
    let output = run_sim(&["--ticks", "20", "--map"]);
    assert!(output.status.success(), "Simulation failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("=== Floor Map ==="));
    assert!(stdout.contains('K'));
    assert!(stdout.contains('T'));
}

/// Test that a partial config file is loaded and backfilled
#[test]
fn test_simulation_reads_config_file() {
    let path = std::env::temp_dir().join(format!("restaurant_sim_config_{}.json", std::process::id()));
    std::fs::write(&path, r#"{"staff_count": 3, "two_seat_tables": 1, "four_seat_tables": 0}"#)
        .expect("write config");

    let output = run_sim(&["--ticks", "50", "--config", path.to_str().expect("utf-8 path")]);
    let _ = std::fs::remove_file(&path);
    assert!(
        output.status.success(),
        "Simulation failed with a config file. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Tables: 1, Seats: 2"), "Config not applied: {}", stdout);
    assert!(stdout.contains("Staff: 3"), "Staff override missing: {}", stdout);
}

/// Test that a missing config file is reported as an error
#[test]
fn test_simulation_missing_config_fails() {
    let output = run_sim(&["--ticks", "10", "--config", "/definitely/not/here.json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}

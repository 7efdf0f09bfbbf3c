//! Restaurant Floor Simulation Library
//!
//! An agent-based restaurant occupancy simulation: customers and staff
//! steering around tables and each other, with live statistics.

pub mod simulation;

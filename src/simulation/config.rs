//! Tunable simulation parameters
//!
//! A single fully-populated `SimConfig` value is produced at every external
//! update boundary. Persisted JSON is merged field by field over the defaults
//! so missing or mistyped fields fall back instead of failing the whole load,
//! then `normalize` clamps everything into range.

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

use super::types::{finite_or, AGENT_RADIUS};

/// Shortest stay a seated customer will ever get
pub const MIN_STAY_SECS: f32 = 5.0;

/// Lowest price ratio fed into the elasticity curve
pub const MIN_PRICE_RATIO: f32 = 1e-3;

/// Upper bound on the elasticity multiplier
pub const MAX_INCOMING_MULTIPLIER: f32 = 10.0;

/// Extra stay slowdown per unit of staff load above the threshold
pub const SERVICE_LOAD_SLOPE: f32 = 0.25;

/// Room shell and door opening, in metres
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    pub width: f32,
    pub depth: f32,
    pub height: f32,
    pub wall_thickness: f32,
    pub door_width: f32,
    pub door_height: f32,
    /// Distance from the inner face of the left wall to the door's left jamb
    pub door_left: f32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            width: 12.0,
            depth: 10.0,
            height: 3.0,
            wall_thickness: 0.2,
            door_width: 1.6,
            door_height: 2.2,
            door_left: 5.2,
        }
    }
}

/// Activation radius and gain for one pair of populations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidancePair {
    pub radius: f32,
    pub gain: f32,
}

impl AvoidancePair {
    pub const fn new(radius: f32, gain: f32) -> Self {
        Self { radius, gain }
    }
}

impl Default for AvoidancePair {
    fn default() -> Self {
        Self::new(0.6, 1.0)
    }
}

/// Per-pair soft avoidance table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidanceConfig {
    pub customer_customer: AvoidancePair,
    pub customer_staff: AvoidancePair,
    pub customer_obstacle: AvoidancePair,
    pub staff_customer: AvoidancePair,
    pub staff_obstacle: AvoidancePair,
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            customer_customer: AvoidancePair::new(0.7, 1.2),
            customer_staff: AvoidancePair::new(0.8, 1.5),
            customer_obstacle: AvoidancePair::new(0.5, 1.0),
            staff_customer: AvoidancePair::new(0.8, 1.2),
            staff_obstacle: AvoidancePair::new(0.6, 1.4),
        }
    }
}

/// Process-wide simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub room: RoomConfig,
    pub two_seat_tables: u32,
    pub four_seat_tables: u32,
    pub staff_count: u32,
    pub base_price: f32,
    pub current_price: f32,
    /// Exponent applied to the price ratio (negative: dearer means fewer guests)
    pub price_elasticity: f32,
    pub average_spend: f32,
    pub base_stay_secs: f32,
    pub time_cap_secs: f32,
    pub time_limit_enabled: bool,
    /// Fractional price discount offered while the time limit is on
    pub time_limit_discount: f32,
    /// Base arrival count before the elasticity multiplier
    pub incoming: u32,
    /// Extra base arrivals generated per simulated minute while running
    pub arrivals_per_minute: f32,
    pub toilet_probability: f32,
    /// Active tables per staff member above which service slows down
    pub service_load_threshold: f32,
    /// Wall-clock session length; zero disables the countdown
    pub session_length_secs: f32,
    pub avoidance: AvoidanceConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            room: RoomConfig::default(),
            two_seat_tables: 2,
            four_seat_tables: 2,
            staff_count: 2,
            base_price: 20.0,
            current_price: 20.0,
            price_elasticity: -1.0,
            average_spend: 25.0,
            base_stay_secs: 45.0,
            time_cap_secs: 60.0,
            time_limit_enabled: false,
            time_limit_discount: 0.1,
            incoming: 0,
            arrivals_per_minute: 0.0,
            toilet_probability: 0.51,
            service_load_threshold: 3.0,
            session_length_secs: 0.0,
            avoidance: AvoidanceConfig::default(),
        }
    }
}

/// Remembers which invalid fields were already reported
#[derive(Debug, Default, Clone)]
pub struct ConfigDiagnostics {
    reported: HashSet<String>,
}

impl ConfigDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log an invalid field once; returns true the first time it is seen
    pub fn report(&mut self, field: &str, reason: &str) -> bool {
        if self.reported.insert(field.to_string()) {
            warn!("Invalid config field `{}` ({}); using a safe value", field, reason);
            true
        } else {
            false
        }
    }

    pub fn was_reported(&self, field: &str) -> bool {
        self.reported.contains(field)
    }

    pub fn count(&self) -> usize {
        self.reported.len()
    }
}

fn normalize_f32(
    value: &mut f32,
    default: f32,
    min: f32,
    max: f32,
    field: &str,
    diagnostics: &mut ConfigDiagnostics,
) {
    if !value.is_finite() {
        diagnostics.report(field, "not a finite number");
        *value = default.clamp(min, max);
    } else if *value < min || *value > max {
        diagnostics.report(field, "out of range");
        *value = value.clamp(min, max);
    }
}

fn normalize_u32(value: &mut u32, max: u32, field: &str, diagnostics: &mut ConfigDiagnostics) {
    if *value > max {
        diagnostics.report(field, "out of range");
        *value = max;
    }
}

impl AvoidancePair {
    fn normalize(&mut self, default: AvoidancePair, field: &str, diagnostics: &mut ConfigDiagnostics) {
        normalize_f32(
            &mut self.radius,
            default.radius,
            0.0,
            5.0,
            &format!("{field}.radius"),
            diagnostics,
        );
        normalize_f32(
            &mut self.gain,
            default.gain,
            0.0,
            20.0,
            &format!("{field}.gain"),
            diagnostics,
        );
    }
}

impl RoomConfig {
    fn normalize(&mut self, diagnostics: &mut ConfigDiagnostics) {
        let d = RoomConfig::default();
        normalize_f32(&mut self.width, d.width, 4.0, 60.0, "room.width", diagnostics);
        normalize_f32(&mut self.depth, d.depth, 4.0, 60.0, "room.depth", diagnostics);
        normalize_f32(&mut self.height, d.height, 2.0, 10.0, "room.height", diagnostics);
        normalize_f32(
            &mut self.wall_thickness,
            d.wall_thickness,
            0.05,
            1.0,
            "room.wall_thickness",
            diagnostics,
        );

        // Door must fit inside the front wall span
        let span = self.width - 2.0 * self.wall_thickness;
        let min_door = 2.0 * AGENT_RADIUS + 0.1;
        normalize_f32(
            &mut self.door_width,
            d.door_width,
            min_door,
            span - 0.2,
            "room.door_width",
            diagnostics,
        );
        normalize_f32(
            &mut self.door_height,
            d.door_height,
            1.8,
            self.height,
            "room.door_height",
            diagnostics,
        );
        normalize_f32(
            &mut self.door_left,
            d.door_left,
            0.0,
            span - self.door_width,
            "room.door_left",
            diagnostics,
        );
    }
}

impl SimConfig {
    /// Load a persisted configuration, backfilling anything missing or invalid
    pub fn from_json_str(text: &str, diagnostics: &mut ConfigDiagnostics) -> Result<Self> {
        let persisted: Value = serde_json::from_str(text).context("Config is not valid JSON")?;
        let defaults =
            serde_json::to_value(SimConfig::default()).context("Failed to encode defaults")?;
        let merged = merge_over_defaults(defaults, persisted, "", diagnostics);
        let mut config: SimConfig =
            serde_json::from_value(merged).context("Failed to decode merged config")?;
        config.normalize(diagnostics);
        Ok(config)
    }

    pub fn from_json_file(path: &Path, diagnostics: &mut ConfigDiagnostics) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json_str(&text, diagnostics)
    }

    /// Clamp every field into its valid range. Idempotent.
    pub fn normalize(&mut self, diagnostics: &mut ConfigDiagnostics) {
        let d = SimConfig::default();
        self.room.normalize(diagnostics);

        normalize_u32(&mut self.two_seat_tables, 40, "two_seat_tables", diagnostics);
        normalize_u32(&mut self.four_seat_tables, 40, "four_seat_tables", diagnostics);
        normalize_u32(&mut self.staff_count, 20, "staff_count", diagnostics);
        normalize_u32(&mut self.incoming, 10_000, "incoming", diagnostics);

        normalize_f32(&mut self.base_price, d.base_price, 0.01, 10_000.0, "base_price", diagnostics);
        normalize_f32(
            &mut self.current_price,
            d.current_price,
            0.0,
            10_000.0,
            "current_price",
            diagnostics,
        );
        normalize_f32(
            &mut self.price_elasticity,
            d.price_elasticity,
            -10.0,
            10.0,
            "price_elasticity",
            diagnostics,
        );
        normalize_f32(
            &mut self.average_spend,
            d.average_spend,
            0.0,
            100_000.0,
            "average_spend",
            diagnostics,
        );
        normalize_f32(
            &mut self.base_stay_secs,
            d.base_stay_secs,
            1.0,
            36_000.0,
            "base_stay_secs",
            diagnostics,
        );
        normalize_f32(
            &mut self.time_cap_secs,
            d.time_cap_secs,
            MIN_STAY_SECS,
            36_000.0,
            "time_cap_secs",
            diagnostics,
        );
        normalize_f32(
            &mut self.time_limit_discount,
            d.time_limit_discount,
            0.0,
            0.9,
            "time_limit_discount",
            diagnostics,
        );
        normalize_f32(
            &mut self.arrivals_per_minute,
            d.arrivals_per_minute,
            0.0,
            600.0,
            "arrivals_per_minute",
            diagnostics,
        );
        normalize_f32(
            &mut self.toilet_probability,
            d.toilet_probability,
            0.0,
            1.0,
            "toilet_probability",
            diagnostics,
        );
        normalize_f32(
            &mut self.service_load_threshold,
            d.service_load_threshold,
            0.1,
            100.0,
            "service_load_threshold",
            diagnostics,
        );
        normalize_f32(
            &mut self.session_length_secs,
            d.session_length_secs,
            0.0,
            1_000_000.0,
            "session_length_secs",
            diagnostics,
        );

        let da = AvoidanceConfig::default();
        let a = &mut self.avoidance;
        a.customer_customer
            .normalize(da.customer_customer, "avoidance.customer_customer", diagnostics);
        a.customer_staff
            .normalize(da.customer_staff, "avoidance.customer_staff", diagnostics);
        a.customer_obstacle
            .normalize(da.customer_obstacle, "avoidance.customer_obstacle", diagnostics);
        a.staff_customer
            .normalize(da.staff_customer, "avoidance.staff_customer", diagnostics);
        a.staff_obstacle
            .normalize(da.staff_obstacle, "avoidance.staff_obstacle", diagnostics);
    }

    /// Convenience for callers that do not keep diagnostics around
    pub fn normalized(mut self) -> Self {
        self.normalize(&mut ConfigDiagnostics::new());
        self
    }

    /// Menu price after the time-limit discount
    pub fn effective_price(&self) -> f32 {
        if self.time_limit_enabled {
            self.current_price * (1.0 - self.time_limit_discount)
        } else {
            self.current_price
        }
    }

    /// Effective price relative to the base price, floored away from zero
    pub fn price_ratio(&self) -> f32 {
        let ratio = self.effective_price() / self.base_price.max(MIN_PRICE_RATIO);
        finite_or(ratio, 1.0).max(MIN_PRICE_RATIO)
    }

    /// Demand multiplier from the price elasticity curve
    pub fn incoming_multiplier(&self) -> f32 {
        let multiplier = self.price_ratio().powf(self.price_elasticity);
        finite_or(multiplier, 1.0).clamp(0.0, MAX_INCOMING_MULTIPLIER)
    }

    /// Arrival count after elasticity; `extra` adds auto-generated base arrivals
    pub fn effective_incoming(&self, extra: u32) -> u32 {
        let base = (self.incoming + extra) as f32;
        let effective = finite_or(base * self.incoming_multiplier(), base);
        effective.max(0.0).floor() as u32
    }

    /// Average spend per served customer at the current price
    pub fn effective_average_spend(&self) -> f32 {
        finite_or(self.average_spend * self.price_ratio(), self.average_spend)
    }

    /// How long a customer stays once seated under the given service coefficient
    pub fn stay_duration(&self, service_coefficient: f32) -> f32 {
        let mut stay = self.base_stay_secs * finite_or(service_coefficient, 1.0);
        if self.time_limit_enabled {
            stay = stay.min(self.time_cap_secs);
        }
        stay.max(MIN_STAY_SECS)
    }

    /// How long a customer will wait in the foyer before giving up
    pub fn foyer_patience(&self) -> f32 {
        (self.base_stay_secs * 0.5).max(12.0)
    }

    /// Stay/service multiplier derived from the current staff load
    pub fn service_coefficient(&self, active_tables: usize) -> f32 {
        service_coefficient(active_tables, self.staff_count, self.service_load_threshold)
    }
}

/// `1 + 0.25 * (load - threshold)` once load exceeds the threshold
pub fn service_coefficient(active_tables: usize, staff_count: u32, threshold: f32) -> f32 {
    if staff_count == 0 {
        return 1.0;
    }
    let load = active_tables as f32 / staff_count as f32;
    if load > threshold {
        1.0 + SERVICE_LOAD_SLOPE * (load - threshold)
    } else {
        1.0
    }
}

/// Overlay `persisted` on `defaults`, keeping the default wherever the
/// persisted value is missing or has the wrong JSON type.
fn merge_over_defaults(
    defaults: Value,
    persisted: Value,
    path: &str,
    diagnostics: &mut ConfigDiagnostics,
) -> Value {
    match (defaults, persisted) {
        (Value::Object(default_map), Value::Object(mut persisted_map)) => {
            let mut merged = Map::new();
            for (key, default_value) in default_map {
                let field = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let value = match persisted_map.remove(&key) {
                    Some(persisted_value) => {
                        merge_over_defaults(default_value, persisted_value, &field, diagnostics)
                    }
                    None => default_value,
                };
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (default_value @ Value::Object(_), _) => {
            diagnostics.report(path, "expected an object");
            default_value
        }
        (Value::Number(default_number), Value::Number(number)) => {
            if default_number.is_u64() {
                // Counts: accept non-negative numbers, rounding fractions
                match number.as_f64() {
                    Some(n) if n.is_finite() && n >= 0.0 => {
                        if !number.is_u64() {
                            diagnostics.report(path, "expected a whole number");
                        }
                        Value::from(n.round().min(u32::MAX as f64) as u64)
                    }
                    _ => {
                        diagnostics.report(path, "expected a non-negative whole number");
                        Value::Number(default_number)
                    }
                }
            } else {
                Value::Number(number)
            }
        }
        (Value::Bool(_), Value::Bool(b)) => Value::Bool(b),
        (default_value, _) => {
            diagnostics.report(path, "wrong type");
            default_value
        }
    }
}

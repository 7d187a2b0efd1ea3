//! Shared utilities for integration tests

#![allow(dead_code)]

use stat_engine::{Column, Table};
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber honouring `RUST_LOG`; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

pub const MATH: [f64; 20] = [
    18.0, 20.0, 20.0, 16.0, 12.0, 14.0, 16.0, 14.0, 14.0, 13.0, 16.0, 18.0, 6.0, 10.0, 16.0, 14.0,
    4.0, 16.0, 16.0, 14.0,
];

pub const FRENCH: [f64; 20] = [
    14.0, 12.0, 14.0, 16.0, 12.0, 14.0, 16.0, 4.0, 4.0, 10.0, 6.0, 20.0, 14.0, 16.0, 14.0, 14.0,
    12.0, 2.0, 14.0, 8.0,
];

/// Twenty students' marks
pub fn marks() -> Table {
    Table::new()
        .with_column("Math", Column::Real(MATH.to_vec()))
        .and_then(|t| t.with_column("French", Column::Real(FRENCH.to_vec())))
        .unwrap()
}

/// Two categorical columns with a strong association
pub fn weather() -> Table {
    let sky = ["sun", "sun", "rain", "cloud", "rain", "sun", "cloud", "rain", "sun", "rain"];
    let umbrella = [0, 0, 1, 1, 1, 0, 0, 1, 0, 1];
    Table::new()
        .with_column("Sky", Column::Text(sky.iter().map(|s| s.to_string()).collect()))
        .and_then(|t| t.with_column("Umbrella", Column::Integer(umbrella.to_vec())))
        .unwrap()
}

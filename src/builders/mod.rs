//! Builders wiring station components from configuration.

pub mod station_builder;

pub use station_builder::StationBuilder;

//! Infrastructure adapters: durable stores, analysis executors and simulated devices.

pub mod analysis_process;
pub mod artifact_store;
pub mod position_store;
pub mod simulated;

//! Platform helpers shared by the sensor providers and counter systems

pub mod common;
pub mod procfs;

//! Test fixtures for dispatch-planner.
//!
//! Real Las Vegas / Henderson sites (from OpenStreetMap) used as customer
//! addresses and technician depots.

pub mod las_vegas_locations;

pub use las_vegas_locations::*;

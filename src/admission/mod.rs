//! Registration admission and the registered/removed node lifecycle

mod controller;
mod eviction;

pub use controller::AdmissionController;
pub use eviction::EvictionPolicy;

//! Concierge Apply: membership application wizard service.

pub mod config;
pub mod error;
pub mod replay;
pub mod wizard;

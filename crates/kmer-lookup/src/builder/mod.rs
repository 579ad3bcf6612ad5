//! Lookup table construction
//!
//! A table is built in two passes over a sharded [`KmerDatabase`]: a count
//! pass sizing every prefix bucket and a load pass filling them. Both passes
//! process database files in parallel.
//!
//! [`KmerDatabase`]: crate::database::KmerDatabase

pub mod config;
pub mod lookup_builder;
pub mod statistics;

mod count;
mod load;

pub use config::LookupConfig;
pub use lookup_builder::{BuildStage, LookupBuilder};
pub use statistics::LoadStatistics;

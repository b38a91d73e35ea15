//! rotalog - rotating log files for long-running services
//!
//! This library provides the rotating file writer, its retention/compaction
//! worker, and the logging glue that feeds it.

pub mod config;
pub mod logging;
pub mod rotate;

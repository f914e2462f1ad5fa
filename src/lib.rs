//! Stopwatch for active work time. Daily totals are written to a remote graph service, which is
//! the only place history is kept. Crossing midnight while the clock runs splits the time
//! between both days.

pub mod auth;
pub mod cli;
pub mod config;
pub mod graph;
pub mod sync;
pub mod tracker;
pub mod utils;

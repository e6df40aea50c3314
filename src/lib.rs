//! `slowpost`: a personal postal scheduler.
//!
//! Letters are submitted from text files, given a randomized delivery time
//! chained after the letter posted before them, stored in SQLite, and mailed
//! as a rendered HTML letter once their time has come.

pub mod clock;
pub mod config;
pub mod error;
pub mod intake;
pub mod mail;
pub mod model;
pub mod post_office;
pub mod render;
pub mod schedule;
pub mod store;
pub mod textgen;

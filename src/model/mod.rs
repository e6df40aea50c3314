//! Core data model types: letters and postal data.

pub mod letter;
pub mod postal;

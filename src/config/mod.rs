// src/config/mod.rs
pub mod epg;

pub use epg::{EpgConfig, ProgrammeOrder};

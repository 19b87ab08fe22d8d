//! CLI subcommands

pub mod geometries;
pub mod inspect;
pub mod plan;

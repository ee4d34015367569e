//! Seeding tool for the foreign language courses service.
//!
//! `Seeder` drives a `CoursesClient` with records from `courses_synth`,
//! either on one thread or split across a pool of worker threads, and
//! reports target and actual counts per entity.

pub mod logger;
pub mod seed;

pub use seed::{split_shares, Phase, SeedError, SeedReport, Seeder, Tally};

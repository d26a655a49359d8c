//! Bottega: a self-hosted catalog and order service.
//!
//! The library surface is what an HTTP boundary calls: application services
//! for catalog CRUD, order intake and reports, backed by trait repositories,
//! a read-path cache coordinator, and apalis-based background jobs.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;

//! LCAC: Least-Context Access Control for clinical agent memory.
//!
//! Mediates an inference agent's access to per-patient memory records so
//! information never crosses zone boundaries. Every inference runs through a
//! hook pipeline that filters context by zone, scans the response for
//! leakage, adjusts the user's trust score, revokes the session on violation,
//! and appends a provenance-hashed audit record.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod db;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod memory;
pub mod providers;
pub mod seed;
pub mod service;

pub use error::CoreError;

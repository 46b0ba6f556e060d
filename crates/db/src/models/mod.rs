//! Row structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` DTOs for inserts where the engine creates rows
//! - Conversions into `leadq_core` domain types

pub mod criterion;
pub mod lead;
pub mod outcome;
pub mod qualification;
pub mod scoring_model;
pub mod settings;
pub mod webhook;

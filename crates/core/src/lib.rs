//! Pure domain logic for the lead qualification engine.
//!
//! Nothing in this crate performs I/O. The database, HTTP and scheduling
//! layers live in `leadq-db`, `leadq-events` and `leadq-api`.

pub mod blend;
pub mod criteria;
pub mod error;
pub mod features;
pub mod model;
pub mod outcome;
pub mod scoring;
pub mod training;
pub mod types;
pub mod webhook;

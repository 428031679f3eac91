//! Data models for the EcoNexus app.
//!
//! These mirror the rows of the remote tables so they deserialize straight
//! from REST responses.

mod alert;
mod energy;
mod field;
mod profile;

pub use alert::*;
pub use energy::*;
pub use field::*;
pub use profile::*;

//! Core types, traits, constants, and errors.
//!
//! Everything in this module is independent of the MSF policy itself: it
//! describes the schedule and 6P collaborators the engine talks to and the
//! vocabulary shared between them.

pub mod constants;
mod error;
mod traits;
mod types;

pub use error::*;
pub use traits::*;
pub use types::*;

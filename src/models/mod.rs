//! Data models for the registration ledger.
//!
//! JSON field names are camelCase on the wire; enum values are snake_case.

mod archive;
mod member;
mod payment;
pub mod settings;
mod stats;
mod team;

pub use archive::*;
pub use member::*;
pub use payment::*;
pub use settings::EventSettings;
pub use stats::*;
pub use team::*;

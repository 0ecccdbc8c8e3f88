//! AssetBank Common Types
//!
//! This crate contains shared types used across the AssetBank ledger,
//! including identifiers, fixed-point amounts, unit conversion, the error
//! taxonomy, operation states and ledger events.

pub mod identifiers;
pub mod monetary;
pub mod convert;
pub mod operation;
pub mod events;
pub mod error;

pub use identifiers::*;
pub use monetary::*;
pub use operation::*;
pub use events::*;
pub use error::*;

//! Type definitions for gpuscout

mod error;
mod pricing;

pub use error::*;
pub use pricing::*;

//! Core types for rebind.

mod descriptor;
mod key;
mod record;

pub use descriptor::*;
pub use key::*;
pub use record::*;

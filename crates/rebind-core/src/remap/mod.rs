//! Identity remapping from source keys to minted identifiers.
//!
//! Source auto-increment keys collide across independently created database
//! instances. Every exported record is therefore rebound to a random unique
//! identifier, and the binding is kept so later exports of the same record
//! reuse it.

mod table;

pub use table::{RemapEntry, RemapTable};

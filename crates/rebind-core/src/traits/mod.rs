//! Collaborator contracts consumed by the exporter.

mod data_source;
mod serializer;

pub use data_source::*;
pub use serializer::*;

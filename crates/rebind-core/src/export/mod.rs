//! Export output writers.

mod jsonl;

pub use jsonl::{export_jsonl, JsonlStats};

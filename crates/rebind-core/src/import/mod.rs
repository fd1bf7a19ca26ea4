//! Readers for previously exported output.

mod jsonl;

pub use jsonl::{import_jsonl, ImportStats};

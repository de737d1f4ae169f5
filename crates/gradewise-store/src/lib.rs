//! gradewise-store: File-backed persistence collaborators.
//!
//! Implements the `RuleStore` and `RecordStore` traits from `gradewise-core`
//! on top of plain files: one JSON document per grading rule, and an
//! append-only JSON-lines log of grading records.

pub mod json_rules;
pub mod jsonl_records;

pub use json_rules::JsonRuleStore;
pub use jsonl_records::JsonlRecordStore;

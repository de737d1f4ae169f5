//! Persistence collaborator traits.
//!
//! The rule registry and quality monitor own their in-memory state and call
//! these synchronously to make it durable. File-backed implementations live in
//! `gradewise-store`; the in-memory ones here back tests and ephemeral runs.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::error::StoreError;
use crate::model::GradingRule;
use crate::quality::GradingRecord;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Rule storage
// ---------------------------------------------------------------------------

/// Key-value durability for grading rules, keyed by question type.
pub trait RuleStore: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    /// Create or replace the rule stored under `question_type`.
    fn write(&self, question_type: &str, rule: &GradingRule) -> StoreResult<()>;

    /// Every stored rule.
    fn read_all(&self) -> StoreResult<BTreeMap<String, GradingRule>>;

    /// Remove the rule stored under `question_type`. Missing keys are not an error.
    fn delete(&self, question_type: &str) -> StoreResult<()>;
}

/// Rule store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: Mutex<BTreeMap<String, GradingRule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store, e.g. to simulate previously persisted custom rules.
    pub fn with_rules(rules: impl IntoIterator<Item = GradingRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| (r.question_type.clone(), r))
            .collect();
        Self {
            rules: Mutex::new(rules),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RuleStore for MemoryRuleStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn write(&self, question_type: &str, rule: &GradingRule) -> StoreResult<()> {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(question_type.to_string(), rule.clone());
        Ok(())
    }

    fn read_all(&self) -> StoreResult<BTreeMap<String, GradingRule>> {
        Ok(self
            .rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn delete(&self, question_type: &str) -> StoreResult<()> {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(question_type);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Record storage
// ---------------------------------------------------------------------------

/// Append-only durability for grading records.
pub trait RecordStore: Send + Sync {
    fn name(&self) -> &str;

    fn append(&self, record: &GradingRecord) -> StoreResult<()>;

    /// Every stored record, in append order.
    fn read_all(&self) -> StoreResult<Vec<GradingRecord>>;
}

/// Record store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<GradingRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryRecordStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn append(&self, record: &GradingRecord) -> StoreResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    fn read_all(&self) -> StoreResult<Vec<GradingRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::builtin_rules;

    #[test]
    fn memory_rule_store_roundtrip() {
        let store = MemoryRuleStore::new();
        let rule = builtin_rules().remove(0);
        store.write(&rule.question_type, &rule).unwrap();
        assert_eq!(store.len(), 1);

        let all = store.read_all().unwrap();
        assert_eq!(all.get(&rule.question_type), Some(&rule));

        store.delete(&rule.question_type).unwrap();
        store.delete("never-existed").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn memory_record_store_keeps_order() {
        let store = MemoryRecordStore::new();
        for i in 0..3 {
            let record = GradingRecord::new("exam", &format!("q{i}"), "s1", "g1", 1.0, 2.0);
            store.append(&record).unwrap();
        }
        let ids: Vec<String> = store
            .read_all()
            .unwrap()
            .into_iter()
            .map(|r| r.question_id)
            .collect();
        assert_eq!(ids, vec!["q0", "q1", "q2"]);
    }
}

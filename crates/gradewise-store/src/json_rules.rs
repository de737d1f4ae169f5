//! Directory-of-JSON rule store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use gradewise_core::error::StoreError;
use gradewise_core::model::GradingRule;
use gradewise_core::traits::{RuleStore, StoreResult};

/// Stores each rule as `<question_type>.json` inside one directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never sees a half-written rule.
#[derive(Debug)]
pub struct JsonRuleStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonRuleStore {
    /// Open (and create if needed) a rule directory.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, question_type: &str) -> StoreResult<PathBuf> {
        let valid = !question_type.is_empty()
            && question_type
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::Other(format!(
                "question type '{question_type}' cannot be used as a file name"
            )));
        }
        Ok(self.dir.join(format!("{question_type}.json")))
    }
}

impl RuleStore for JsonRuleStore {
    fn name(&self) -> &str {
        "json-dir"
    }

    fn write(&self, question_type: &str, rule: &GradingRule) -> StoreResult<()> {
        let path = self.path_for(question_type)?;
        let json = serde_json::to_string_pretty(rule)?;

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        tracing::debug!("wrote rule {question_type} to {}", path.display());
        Ok(())
    }

    fn read_all(&self) -> StoreResult<BTreeMap<String, GradingRule>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rules = BTreeMap::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let Some(key) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };

            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<GradingRule>(&content) {
                Ok(mut rule) => {
                    if rule.question_type.is_empty() {
                        rule.question_type = key.clone();
                    }
                    rules.insert(key, rule);
                }
                Err(e) => {
                    tracing::warn!("skipping unreadable rule file {}: {e}", path.display());
                }
            }
        }

        Ok(rules)
    }

    fn delete(&self, question_type: &str) -> StoreResult<()> {
        let path = self.path_for(question_type)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use gradewise_core::rules::{builtin_rule, GradingRuleRegistry, RuleUpdate};

    #[test]
    fn write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRuleStore::open(dir.path().join("rules")).unwrap();
        let rule = builtin_rule("essay").unwrap();

        store.write("essay", &rule).unwrap();
        assert!(store.dir().join("essay.json").exists());

        let all = store.read_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["essay"], rule);

        store.delete("essay").unwrap();
        store.delete("essay").unwrap();
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRuleStore::open(dir.path()).unwrap();
        let rule = builtin_rule("essay").unwrap();
        assert!(store.write("../escape", &rule).is_err());
        assert!(store.write("", &rule).is_err());
        assert!(store.delete("a/b").is_err());
    }

    #[test]
    fn skips_corrupt_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRuleStore::open(dir.path()).unwrap();
        store.write("essay", &builtin_rule("essay").unwrap()).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        std::fs::write(dir.path().join("README.md"), "rules").unwrap();

        let all = store.read_all().unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["essay"]);
    }

    #[test]
    fn registry_changes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Arc::new(JsonRuleStore::open(dir.path()).unwrap());
            let registry = GradingRuleRegistry::new(store).unwrap();
            registry
                .update_rule(
                    "short_answer",
                    RuleUpdate {
                        similarity_threshold: Some(0.5),
                        ..RuleUpdate::default()
                    },
                )
                .unwrap();
        }

        let store = Arc::new(JsonRuleStore::open(dir.path()).unwrap());
        let registry = GradingRuleRegistry::new(store).unwrap();
        let rule = registry.get_rule("short_answer").unwrap();
        assert_eq!(rule.similarity_threshold, 0.5);
        assert_eq!(rule.version, 2);
    }
}

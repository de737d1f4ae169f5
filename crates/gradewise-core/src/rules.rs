//! Grading rule registry.
//!
//! Holds one [`GradingRule`] per question type. Five built-in rules are seeded
//! on construction and any rules already persisted in the [`RuleStore`] are
//! overlaid on top, so a stored custom rule overrides the built-in one with the
//! same key.
//!
//! Mutations are serialized by a writer lock and only touch the in-memory map
//! after the store accepted the change. Readers get cloned snapshots.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::model::{GradingRule, QuestionType, ScoringCriterion};
use crate::traits::{MemoryRuleStore, RuleStore};

/// Version of the rule export document layout.
pub const EXPORT_FORMAT_VERSION: u32 = 1;

#[allow(clippy::too_many_arguments)]
fn rule(
    question_type: QuestionType,
    name: &str,
    description: &str,
    partial_match_score: f64,
    keyword_weight: f64,
    similarity_threshold: f64,
    partial_credit: bool,
    criteria: Vec<ScoringCriterion>,
) -> GradingRule {
    let now = Utc::now();
    GradingRule {
        question_type: question_type.key().to_string(),
        name: name.to_string(),
        description: description.to_string(),
        exact_match_score: 1.0,
        partial_match_score,
        keyword_weight,
        similarity_threshold,
        case_sensitive: false,
        ignore_punctuation: true,
        partial_credit,
        criteria,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

fn text_criteria(partial: f64, keyword: f64, threshold: f64) -> Vec<ScoringCriterion> {
    vec![
        ScoringCriterion::new("exact match", "Normalized answer equals the reference", 1.0, &["exact_match"]),
        ScoringCriterion::new("high similarity", "Answer closely resembles the reference", partial, &["similarity_match"])
            .with_min_similarity(threshold),
        ScoringCriterion::new("keyword coverage", "Answer mentions reference keywords", keyword, &["keyword_match"]),
        ScoringCriterion::new("no match", "Answer shares nothing with the reference", 0.0, &["no_match"]),
    ]
}

/// The built-in rules, one per entry of [`QuestionType::BUILT_IN_RULES`].
pub fn builtin_rules() -> Vec<GradingRule> {
    vec![
        rule(
            QuestionType::SingleChoice,
            "Single choice",
            "One correct option; all or nothing",
            0.0,
            0.0,
            1.0,
            false,
            vec![
                ScoringCriterion::new("correct", "Selected the correct option", 1.0, &["exact_match"]),
                ScoringCriterion::new("incorrect", "Selected a wrong option", 0.0, &["no_match"]),
            ],
        ),
        rule(
            QuestionType::MultipleChoice,
            "Multiple choice",
            "Several correct options; proportional partial credit",
            0.5,
            0.0,
            1.0,
            true,
            vec![
                ScoringCriterion::new("all correct", "Selected exactly the correct options", 1.0, &["exact_match"]),
                ScoringCriterion::new("partially correct", "Selected some correct options", 0.5, &["partial_match"]),
                ScoringCriterion::new("incorrect", "Selected no correct option", 0.0, &["no_match"]),
            ],
        ),
        rule(
            QuestionType::FillBlank,
            "Fill in the blank",
            "Short exact answers with tolerance for typos",
            0.8,
            0.6,
            0.85,
            true,
            text_criteria(0.8, 0.6, 0.85),
        ),
        rule(
            QuestionType::ShortAnswer,
            "Short answer",
            "Sentence-length answers scored by similarity and keywords",
            0.7,
            0.7,
            0.7,
            true,
            text_criteria(0.7, 0.7, 0.7),
        ),
        rule(
            QuestionType::Essay,
            "Essay",
            "Long-form answers scored mainly by keyword coverage",
            0.6,
            0.8,
            0.6,
            true,
            text_criteria(0.6, 0.8, 0.6),
        ),
    ]
}

/// The built-in rule for `question_type`, if it has one.
pub fn builtin_rule(question_type: &str) -> Option<GradingRule> {
    builtin_rules()
        .into_iter()
        .find(|r| r.question_type == question_type)
}

fn check_unit_range(errors: &mut Vec<String>, field: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(format!("{field} {value} is outside [0, 1]"));
    }
}

/// Check a rule against its invariants. An empty list means the rule is valid.
pub fn validate_rule(rule: &GradingRule) -> Vec<String> {
    let mut errors = Vec::new();

    if rule.question_type.trim().is_empty() {
        errors.push("question_type must not be empty".to_string());
    }
    if rule.name.trim().is_empty() {
        errors.push("name must not be empty".to_string());
    }

    check_unit_range(&mut errors, "exact_match_score", rule.exact_match_score);
    check_unit_range(&mut errors, "partial_match_score", rule.partial_match_score);
    check_unit_range(&mut errors, "keyword_weight", rule.keyword_weight);
    check_unit_range(&mut errors, "similarity_threshold", rule.similarity_threshold);

    if rule.criteria.is_empty() {
        errors.push("at least one scoring criterion is required".to_string());
    }

    for (i, criterion) in rule.criteria.iter().enumerate() {
        let label = if criterion.name.trim().is_empty() {
            errors.push(format!("criterion #{} has an empty name", i + 1));
            format!("criterion #{}", i + 1)
        } else {
            format!("criterion '{}'", criterion.name)
        };
        check_unit_range(
            &mut errors,
            &format!("{label} score_percentage"),
            criterion.score_percentage,
        );
        if let Some(min) = criterion.min_similarity {
            check_unit_range(&mut errors, &format!("{label} min_similarity"), min);
        }
    }

    errors
}

/// Partial update applied by [`GradingRuleRegistry::update_rule`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub exact_match_score: Option<f64>,
    pub partial_match_score: Option<f64>,
    pub keyword_weight: Option<f64>,
    pub similarity_threshold: Option<f64>,
    pub case_sensitive: Option<bool>,
    pub ignore_punctuation: Option<bool>,
    pub partial_credit: Option<bool>,
    pub criteria: Option<Vec<ScoringCriterion>>,
}

impl RuleUpdate {
    fn apply(self, rule: &mut GradingRule) {
        if let Some(v) = self.name {
            rule.name = v;
        }
        if let Some(v) = self.description {
            rule.description = v;
        }
        if let Some(v) = self.exact_match_score {
            rule.exact_match_score = v;
        }
        if let Some(v) = self.partial_match_score {
            rule.partial_match_score = v;
        }
        if let Some(v) = self.keyword_weight {
            rule.keyword_weight = v;
        }
        if let Some(v) = self.similarity_threshold {
            rule.similarity_threshold = v;
        }
        if let Some(v) = self.case_sensitive {
            rule.case_sensitive = v;
        }
        if let Some(v) = self.ignore_punctuation {
            rule.ignore_punctuation = v;
        }
        if let Some(v) = self.partial_credit {
            rule.partial_credit = v;
        }
        if let Some(v) = self.criteria {
            rule.criteria = v;
        }
    }
}

/// On-disk layout of an exported rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleExport {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default = "Utc::now")]
    pub exported_at: DateTime<Utc>,
    /// Rules keyed by question type. An authored rule may omit its
    /// `question_type`; the key fills it in.
    pub rules: BTreeMap<String, GradingRule>,
}

fn default_format_version() -> u32 {
    EXPORT_FORMAT_VERSION
}

/// A rule that import refused to persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedRule {
    pub question_type: String,
    pub errors: Vec<String>,
}

/// Outcome of [`GradingRuleRegistry::import_rules`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: Vec<String>,
    pub rejected: Vec<RejectedRule>,
}

/// Parse a rule file. `.toml` files are TOML, everything else JSON.
pub fn parse_rule_file(path: &Path) -> Result<BTreeMap<String, GradingRule>, RuleError> {
    let content = std::fs::read_to_string(path)?;
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    let export: RuleExport = if is_toml {
        toml::from_str(&content).map_err(|e| RuleError::Format(format!("{}: {e}", path.display())))?
    } else {
        serde_json::from_str(&content)
            .map_err(|e| RuleError::Format(format!("{}: {e}", path.display())))?
    };
    Ok(export
        .rules
        .into_iter()
        .map(|(key, mut rule)| {
            if rule.question_type.trim().is_empty() {
                rule.question_type = key.clone();
            }
            (key, rule)
        })
        .collect())
}

/// Registry of grading rules keyed by question type.
pub struct GradingRuleRegistry {
    rules: RwLock<BTreeMap<String, GradingRule>>,
    store: Arc<dyn RuleStore>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for GradingRuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradingRuleRegistry")
            .field("store", &self.store.name())
            .field("rules", &self.keys())
            .finish()
    }
}

impl GradingRuleRegistry {
    /// Seed the built-in rules and overlay every valid rule from `store`.
    ///
    /// Invalid persisted rules are skipped with a warning.
    pub fn new(store: Arc<dyn RuleStore>) -> Result<Self, RuleError> {
        let mut rules: BTreeMap<String, GradingRule> = builtin_rules()
            .into_iter()
            .map(|r| (r.question_type.clone(), r))
            .collect();

        let persisted = store.read_all()?;
        let mut overlaid = 0usize;
        for (key, rule) in persisted {
            let errors = validate_rule(&rule);
            if !errors.is_empty() {
                tracing::warn!(
                    "skipping invalid stored rule '{key}' from {}: {}",
                    store.name(),
                    errors.join("; ")
                );
                continue;
            }
            rules.insert(key, rule);
            overlaid += 1;
        }

        tracing::info!(
            "rule registry ready: {} rules ({overlaid} from {} store)",
            rules.len(),
            store.name()
        );

        Ok(Self {
            rules: RwLock::new(rules),
            store,
            writer: Mutex::new(()),
        })
    }

    /// A registry backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        let rules = builtin_rules()
            .into_iter()
            .map(|r| (r.question_type.clone(), r))
            .collect();
        Self {
            rules: RwLock::new(rules),
            store: Arc::new(MemoryRuleStore::new()),
            writer: Mutex::new(()),
        }
    }

    fn snapshot(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, GradingRule>> {
        self.rules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn install(&self, rule: GradingRule) {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(rule.question_type.clone(), rule);
    }

    /// The rule for `question_type`.
    pub fn get_rule(&self, question_type: &str) -> Option<GradingRule> {
        self.snapshot().get(question_type).cloned()
    }

    /// All rules, ordered by question type.
    pub fn list_rules(&self) -> Vec<GradingRule> {
        self.snapshot().values().cloned().collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.snapshot().keys().cloned().collect()
    }

    pub fn contains(&self, question_type: &str) -> bool {
        self.snapshot().contains_key(question_type)
    }

    /// Check a rule without touching the registry.
    pub fn validate(&self, rule: &GradingRule) -> Vec<String> {
        validate_rule(rule)
    }

    /// Validate and persist a rule, replacing any rule with the same key.
    ///
    /// Replacing bumps the version and keeps the original creation time.
    pub fn create_rule(&self, mut rule: GradingRule) -> Result<GradingRule, RuleError> {
        let errors = validate_rule(&rule);
        if !errors.is_empty() {
            return Err(RuleError::Invalid(errors));
        }

        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        if let Some(existing) = self.get_rule(&rule.question_type) {
            rule.version = existing.version + 1;
            rule.created_at = existing.created_at;
        }
        rule.updated_at = now;

        self.store.write(&rule.question_type, &rule)?;
        tracing::info!("saved rule '{}' v{}", rule.question_type, rule.version);
        self.install(rule.clone());
        Ok(rule)
    }

    /// Apply `update` to an existing rule.
    pub fn update_rule(&self, question_type: &str, update: RuleUpdate) -> Result<GradingRule, RuleError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rule = self
            .get_rule(question_type)
            .ok_or_else(|| RuleError::NotFound(question_type.to_string()))?;

        update.apply(&mut rule);
        let errors = validate_rule(&rule);
        if !errors.is_empty() {
            return Err(RuleError::Invalid(errors));
        }

        rule.version += 1;
        rule.updated_at = Utc::now();
        self.store.write(question_type, &rule)?;
        tracing::info!("updated rule '{question_type}' to v{}", rule.version);
        self.install(rule.clone());
        Ok(rule)
    }

    /// Delete a rule. A deleted built-in rule reverts to its default.
    ///
    /// Returns the rule that was removed, if any.
    pub fn delete_rule(&self, question_type: &str) -> Result<Option<GradingRule>, RuleError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.contains(question_type) {
            return Ok(None);
        }

        self.store.delete(question_type)?;

        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let removed = rules.remove(question_type);
        if let Some(default) = builtin_rule(question_type) {
            tracing::info!("rule '{question_type}' reset to built-in default");
            rules.insert(question_type.to_string(), default);
        } else {
            tracing::info!("deleted rule '{question_type}'");
        }
        Ok(removed)
    }

    /// Write every rule to `path` as a JSON export document.
    pub fn export_rules(&self, path: &Path) -> Result<usize, RuleError> {
        let rules: BTreeMap<String, GradingRule> = self
            .list_rules()
            .into_iter()
            .map(|r| (r.question_type.clone(), r))
            .collect();
        let count = rules.len();
        let export = RuleExport {
            format_version: EXPORT_FORMAT_VERSION,
            exported_at: Utc::now(),
            rules,
        };

        let json = serde_json::to_string_pretty(&export)
            .map_err(|e| RuleError::Format(e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)?;
        tracing::info!("exported {count} rules to {}", path.display());
        Ok(count)
    }

    /// Import rules from a JSON export or an authored TOML rule file.
    ///
    /// Valid rules are persisted; invalid ones are reported and skipped.
    pub fn import_rules(&self, path: &Path) -> Result<ImportSummary, RuleError> {
        let parsed = parse_rule_file(path)?;
        let mut summary = ImportSummary::default();

        for (key, rule) in parsed {
            if rule.question_type != key {
                summary.rejected.push(RejectedRule {
                    question_type: key.clone(),
                    errors: vec![format!(
                        "rule key '{key}' does not match question_type '{}'",
                        rule.question_type
                    )],
                });
                continue;
            }
            match self.create_rule(rule) {
                Ok(saved) => summary.imported.push(saved.question_type),
                Err(RuleError::Invalid(errors)) => {
                    tracing::warn!("rejected rule '{key}': {}", errors.join("; "));
                    summary.rejected.push(RejectedRule {
                        question_type: key,
                        errors,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            "imported {} rules from {} ({} rejected)",
            summary.imported.len(),
            path.display(),
            summary.rejected.len()
        );
        Ok(summary)
    }
}

impl Default for GradingRuleRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

//! The `gradewise rules` commands.

use std::path::{Path, PathBuf};

use anyhow::Result;
use comfy_table::{Cell, Table};

use gradewise_core::config::load_config_from;
use gradewise_core::error::RuleError;
use gradewise_core::rules::{parse_rule_file, validate_rule};

use super::open_registry;

pub fn list(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let registry = open_registry(&config)?;

    let mut table = Table::new();
    table.set_header(vec![
        "Type",
        "Name",
        "Version",
        "Partial",
        "Keyword",
        "Threshold",
        "Partial credit",
    ]);
    for rule in registry.list_rules() {
        table.add_row(vec![
            Cell::new(&rule.question_type),
            Cell::new(&rule.name),
            Cell::new(rule.version),
            Cell::new(format!("{:.2}", rule.partial_match_score)),
            Cell::new(format!("{:.2}", rule.keyword_weight)),
            Cell::new(format!("{:.2}", rule.similarity_threshold)),
            Cell::new(if rule.partial_credit { "yes" } else { "no" }),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn show(question_type: &str, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let registry = open_registry(&config)?;
    let rule = registry
        .get_rule(question_type)
        .ok_or_else(|| RuleError::NotFound(question_type.to_string()))?;
    println!("{}", serde_json::to_string_pretty(&rule)?);
    Ok(())
}

pub fn validate(file: &Path) -> Result<()> {
    let rules = parse_rule_file(file)?;
    println!("Rule file: {} ({} rules)", file.display(), rules.len());

    let mut invalid = 0;
    for (key, rule) in &rules {
        let mut errors = validate_rule(rule);
        if &rule.question_type != key {
            errors.push(format!(
                "rule key '{key}' does not match question_type '{}'",
                rule.question_type
            ));
        }
        if errors.is_empty() {
            println!("  [{key}] OK");
        } else {
            invalid += 1;
            for e in &errors {
                println!("  [{key}] ERROR: {e}");
            }
        }
    }

    anyhow::ensure!(invalid == 0, "{invalid} invalid rule(s) in {}", file.display());
    println!("All rules valid.");
    Ok(())
}

pub fn export(output: &Path, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let registry = open_registry(&config)?;
    let count = registry.export_rules(output)?;
    println!("Exported {count} rules to {}", output.display());
    Ok(())
}

pub fn import(file: &Path, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let registry = open_registry(&config)?;
    let summary = registry.import_rules(file)?;

    for key in &summary.imported {
        println!("  Imported: {key}");
    }
    for rejected in &summary.rejected {
        println!(
            "  Rejected: {}: {}",
            rejected.question_type,
            rejected.errors.join("; ")
        );
    }
    println!(
        "{} imported, {} rejected",
        summary.imported.len(),
        summary.rejected.len()
    );
    Ok(())
}

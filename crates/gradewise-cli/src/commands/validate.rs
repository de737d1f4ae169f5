//! The `gradewise validate` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use gradewise_core::config::load_config_from;
use gradewise_core::engine::GradingEngine;
use gradewise_core::parser;

use super::open_registry;

fn reference_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("failed to read directory: {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml" || ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

pub fn execute(reference_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let engine = GradingEngine::new(open_registry(&config)?, config.engine.clone());

    let files = reference_files(&reference_path)?;
    anyhow::ensure!(
        !files.is_empty(),
        "no answer key files found in {}",
        reference_path.display()
    );

    let mut total_warnings = 0;

    for file in &files {
        let reference = parser::parse_reference(file)?;
        println!(
            "Exam: {} ({} questions, {} points)",
            if reference.title.is_empty() { &reference.exam_id } else { &reference.title },
            reference.questions.len(),
            reference.total_max_score()
        );

        let warnings = parser::validate_reference(&reference, &engine);
        for w in &warnings {
            let prefix = w
                .question_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All answer keys valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}

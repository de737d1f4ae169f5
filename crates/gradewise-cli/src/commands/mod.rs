//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{Context, Result};

use gradewise_core::config::GradewiseConfig;
use gradewise_core::quality::QualityMonitor;
use gradewise_core::rules::GradingRuleRegistry;
use gradewise_store::{JsonRuleStore, JsonlRecordStore};

pub mod compare;
pub mod grade;
pub mod init;
pub mod quality;
pub mod rules;
pub mod validate;

/// Rule registry backed by the configured rules directory.
pub(crate) fn open_registry(config: &GradewiseConfig) -> Result<Arc<GradingRuleRegistry>> {
    let store = JsonRuleStore::open(&config.rules_dir)
        .with_context(|| format!("failed to open rules directory {}", config.rules_dir.display()))?;
    let registry = GradingRuleRegistry::new(Arc::new(store))?;
    Ok(Arc::new(registry))
}

/// Quality monitor preloaded from the configured record log.
pub(crate) fn open_monitor(config: &GradewiseConfig) -> Result<QualityMonitor> {
    let store = JsonlRecordStore::open(&config.records_path)
        .with_context(|| format!("failed to open record log {}", config.records_path.display()))?;
    let monitor = QualityMonitor::with_store(config.monitor.clone(), Arc::new(store))?;
    Ok(monitor)
}

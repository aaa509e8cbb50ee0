//! Subcommand bodies kept out of `main` so they stay testable.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use trl_config::{LoadedConfig, UnusedKeyPolicy};
use trl_testkit::{Scenario, ScenarioReport, ScenarioRunner};

/// What `trl simulate` prints.
#[derive(Debug, Serialize)]
pub struct SimulateOutput {
    pub config_hash: String,
    pub fund_id: String,
    pub report: ScenarioReport,
}

/// Layered config with the unused-key guard applied. No paths means an empty
/// document, i.e. every ledger default.
pub fn load_config(paths: &[PathBuf], policy: UnusedKeyPolicy) -> Result<LoadedConfig> {
    let loaded = if paths.is_empty() {
        trl_config::load_layered_yaml_from_strings(&[])?
    } else {
        trl_config::load_layered_yaml(paths)?
    };

    let report = trl_config::report_unused_keys(&loaded.config_json, policy)?;
    for pointer in &report.unused_leaf_pointers {
        warn!(pointer = %pointer, "config key is not read by anything");
    }
    Ok(loaded)
}

pub fn simulate(
    scenario_path: &Path,
    config_paths: &[PathBuf],
    policy: UnusedKeyPolicy,
) -> Result<SimulateOutput> {
    let loaded = load_config(config_paths, policy)?;
    let scenario = Scenario::load(scenario_path)?;
    info!(
        config_hash = %loaded.config_hash,
        fund_id = %loaded.ledger.fund_id,
        scenario = %scenario_path.display(),
        "simulate"
    );

    let report = ScenarioRunner::new(loaded.ledger.clone())
        .run(&scenario)
        .with_context(|| format!("simulate failed: {}", scenario_path.display()))?;

    Ok(SimulateOutput {
        config_hash: loaded.config_hash,
        fund_id: loaded.ledger.fund_id,
        report,
    })
}

pub fn ensure_no_violations(report: &ScenarioReport) -> Result<()> {
    if let Some(first) = report.invariant_violations.first() {
        bail!(
            "INVARIANT_VIOLATION: {} violation(s); first at action {}: {}",
            report.invariant_violations.len(),
            first.index,
            first.message
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trl_testkit::Violation;

    fn scenario(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../scenarios")
            .join(name)
    }

    #[test]
    fn simulate_without_config_uses_defaults() {
        let out = simulate(&scenario("single_staker.yaml"), &[], UnusedKeyPolicy::Fail).unwrap();
        let defaults = trl_config::load_layered_yaml_from_strings(&[]).unwrap();
        assert_eq!(out.config_hash, defaults.config_hash);
        assert_eq!(out.fund_id, defaults.ledger.fund_id);
        assert_eq!(out.report.total_minted, "50");
    }

    #[test]
    fn violations_are_reported_with_first_index() {
        let mut out =
            simulate(&scenario("single_staker.yaml"), &[], UnusedKeyPolicy::Warn).unwrap();
        assert!(ensure_no_violations(&out.report).is_ok());

        out.report.invariant_violations.push(Violation {
            index: 3,
            message: "history length 0 != version 1".into(),
        });
        let err = ensure_no_violations(&out.report).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("INVARIANT_VIOLATION"), "got: {msg}");
        assert!(msg.contains("action 3"), "got: {msg}");
    }
}

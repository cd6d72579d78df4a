// run.rs — Replay a program offline against canned tool results.
//
// Builds a default effective configuration around the compiled policy,
// feeds the program through a scripted planner, and prints the run
// report as JSON. The report includes policy checks and the final
// namespace so a replay shows every decision the policy made.

use std::path::Path;

use warden_config::{EffectiveConfig, ReportOptions};
use warden_interp::{PlannerTurn, Program, RunStatus, ScriptedPlanner, TurnRequest, TurnRunner};
use warden_policy::{source_for, PolicyConfig, PolicyPresets};
use warden_session::SessionStore;

use super::tools;

pub fn execute(
    policy: &Path,
    language: &str,
    program: &Path,
    tool_catalog: Option<&Path>,
    fail_fast: bool,
) -> anyhow::Result<()> {
    let registry = tools::load_registry(tool_catalog)?;
    let registered = registry.names();

    let source = std::fs::read_to_string(policy)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", policy.display()))?;
    let rules = source_for(language)?
        .compile(&source, Some(&registered))
        .map_err(|error| anyhow::anyhow!("{}: {error}", policy.display()))?;
    for warning in &rules.warnings {
        eprintln!("{warning}");
    }

    let program_json = std::fs::read_to_string(program)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", program.display()))?;
    let program = Program::from_json(&program_json)?;

    let config = EffectiveConfig {
        policy: PolicyConfig::from_rules(rules, fail_fast, PolicyPresets::default()),
        policy_language: language.to_string(),
        report: ReportOptions {
            include_program: false,
            include_policy_checks: true,
            include_namespace: true,
        },
        ..Default::default()
    };

    let store = SessionStore::new();
    let mut planner = ScriptedPlanner::new(vec![PlannerTurn::Program(program)]);
    let runner = TurnRunner::new(&config, &registry, None);
    let report = runner.run_turn(
        &store,
        &mut planner,
        &TurnRequest {
            query: "offline replay",
            session_id: None,
        },
    )?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.status == RunStatus::Failure {
        anyhow::bail!("run failed");
    }
    Ok(())
}

// check.rs — Parse and compile a policy file, printing diagnostics.

use std::path::Path;

use warden_policy::source_for;

use super::tools;

pub fn execute(file: &Path, language: &str, tool_catalog: Option<&Path>) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", file.display()))?;

    let registered = match tool_catalog {
        Some(path) => Some(tools::load_registry(Some(path))?.names()),
        None => None,
    };

    match source_for(language)?.compile(&source, registered.as_deref()) {
        Ok(rules) => {
            for warning in &rules.warnings {
                println!("{warning}");
            }
            println!(
                "{}: {} check rule(s), {} update rule(s) compiled.",
                file.display(),
                rules.check_rules.len(),
                rules.update_rules.len()
            );
            Ok(())
        }
        Err(error) => {
            eprintln!("{}: {error}", file.display());
            anyhow::bail!("policy compilation failed");
        }
    }
}

// Cross-adapter pipeline tests: the same policy expressed in different
// surface syntaxes must produce the same decisions, and compiled
// configurations must survive serialization without changing behavior.

use std::collections::BTreeMap;

use serde_json::json;
use warden_meta::{Metadata, Value};
use warden_policy::{
    check_call, source_for, CallContext, PolicyConfig, PolicyPresets, Verdict,
};

fn tagged(raw: serde_json::Value, tags: &[&str]) -> Value {
    Value::with_meta(
        raw,
        Metadata::with(
            std::iter::empty(),
            ["*".to_string()],
            tags.iter().map(|s| s.to_string()),
        ),
    )
}

fn decide(config: &PolicyConfig, tool: &str, args: &BTreeMap<String, Value>) -> Verdict {
    check_call(
        config,
        &CallContext {
            tool_id: tool,
            args,
            session_meta: &Metadata::new(),
            result: None,
        },
    )
    .unwrap()
    .verdict
}

/// A small fixed corpus of calls used to compare configurations.
fn corpus() -> Vec<(&'static str, BTreeMap<String, Value>)> {
    let mut cases = Vec::new();

    let mut args = BTreeMap::new();
    args.insert("body".to_string(), tagged(json!("q3 numbers"), &["confidential"]));
    args.insert("to".to_string(), tagged(json!("research@gmail.com"), &[]));
    cases.push(("send_email", args));

    let mut args = BTreeMap::new();
    args.insert("body".to_string(), tagged(json!("hello"), &[]));
    args.insert("to".to_string(), tagged(json!("admin@trustedcorp.com"), &[]));
    cases.push(("send_email", args));

    cases.push(("read_file", BTreeMap::new()));
    cases.push(("unregistered_tool", BTreeMap::new()));
    cases
}

#[test]
fn sift_and_rulebook_agree_on_decisions() {
    let sift = source_for("sift")
        .unwrap()
        .compile(
            r#"
            tool "send_email" {
                must deny when body.tags overlaps {"confidential"};
                should allow always;
            }
            tool "read_file" {
                should allow always;
            }
            "#,
            None,
        )
        .unwrap();
    let rulebook = source_for("rulebook")
        .unwrap()
        .compile(
            r#"[
                {"tool": "send_email", "kind": "check", "enforcement": "hard",
                 "outcome": "deny",
                 "when": {"subject": "body.tags", "test": "overlaps",
                          "values": ["confidential"]}},
                {"tool": "send_email", "kind": "check", "outcome": "allow"},
                {"tool": "read_file", "kind": "check", "outcome": "allow"}
            ]"#,
            None,
        )
        .unwrap();

    let sift_config = PolicyConfig::from_rules(sift, false, PolicyPresets::default());
    let rulebook_config = PolicyConfig::from_rules(rulebook, false, PolicyPresets::default());

    for (tool, args) in corpus() {
        assert_eq!(
            decide(&sift_config, tool, &args),
            decide(&rulebook_config, tool, &args),
            "diverging decision for {tool}"
        );
    }
}

#[test]
fn serialized_config_decides_identically() {
    let rules = source_for("sift")
        .unwrap()
        .compile(
            r#"
            let Trusted = {str matching r".*@trustedcorp\.com"};
            /// external leak guard
            tool "send_email" {
                must deny when body.tags overlaps {"confidential"}
                    and not (to.value in Trusted);
                should allow always;
            }
            tool r"^read_.*" { should allow always; }
            "#,
            None,
        )
        .unwrap();
    let config = PolicyConfig::from_rules(rules, true, PolicyPresets::default());

    let json = serde_json::to_string_pretty(&config).unwrap();
    let reparsed: PolicyConfig = serde_json::from_str(&json).unwrap();

    for (tool, args) in corpus() {
        assert_eq!(
            decide(&config, tool, &args),
            decide(&reparsed, tool, &args),
            "round trip changed the decision for {tool}"
        );
    }
}

#[test]
fn default_presets_decide_unmatched_tools() {
    let mut presets = PolicyPresets::default();
    presets.default_allow = false;
    let config = PolicyConfig::from_rules(Default::default(), false, presets);
    assert_eq!(decide(&config, "anything", &BTreeMap::new()), Verdict::Deny);
}

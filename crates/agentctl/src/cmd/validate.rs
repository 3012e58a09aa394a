use std::path::Path;

use aos_core::spec::StepKind;
use serde::Serialize;

use super::failure_code;
use crate::exit_codes;
use crate::loader::AgentBundle;
use crate::output::{print_error, print_result, OutputFormat};
use crate::OutputArgs;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResult {
    agent: String,
    agent_file: String,
    steps: Vec<String>,
    tools: Vec<String>,
    policies: Vec<String>,
    warnings: Vec<String>,
}

pub fn validate_cmd(agent_path: &Path, output: OutputArgs) -> i32 {
    let bundle = match AgentBundle::load(agent_path) {
        Ok(bundle) => bundle,
        Err(e) => {
            print_error(output.format, output.quiet, &format!("{e:#}"));
            return failure_code(&e);
        }
    };
    let result = summarize(&bundle);

    if output.format == OutputFormat::Text && !output.quiet {
        println!("Agent {} is valid ({})", result.agent, result.agent_file);
        println!("  Steps:    {}", result.steps.join(" -> "));
        println!("  Tools:    {}", list_or_none(&result.tools));
        println!("  Policies: {}", list_or_none(&result.policies));
        for warning in &result.warnings {
            println!("warning: {}", warning);
        }
    } else {
        print_result(output.format, output.quiet, &result);
    }
    exit_codes::SUCCESS
}

fn summarize(bundle: &AgentBundle) -> ValidateResult {
    let actions = bundle.actions();
    let catalog_names: Vec<&str> = bundle.policies.iter().map(|p| p.name()).collect();

    let mut warnings = Vec::new();
    for step in bundle.workflow.steps() {
        if let StepKind::Tool(tool) = &step.kind {
            if !actions.contains(&tool.action) {
                warnings.push(format!(
                    "step '{}' uses undeclared tool '{}'",
                    step.id, tool.action
                ));
            }
        }
    }
    for name in bundle.workflow.policy_names() {
        if !catalog_names.contains(&name) {
            warnings.push(format!("policy '{}' has no definition beside the agent", name));
        }
    }

    ValidateResult {
        agent: bundle.workflow.name().to_string(),
        agent_file: bundle.agent_file.display().to_string(),
        steps: bundle
            .workflow
            .steps()
            .iter()
            .map(|s| s.id.clone())
            .collect(),
        tools: actions.names().map(str::to_string).collect(),
        policies: catalog_names.iter().map(|n| n.to_string()).collect(),
        warnings,
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

use std::sync::Arc;

use agent_runner::{ActionRegistry, LocalRuntime, PolicyCatalog, RunnerConfig, RuntimeRegistry, LOCAL_RUNTIME};

use crate::exit_codes;
use crate::output::{print_result, OutputFormat};
use crate::OutputArgs;

pub fn runtimes_cmd(output: OutputArgs) -> i32 {
    let runtime = LocalRuntime::with_file_journal(
        ActionRegistry::new(),
        Arc::new(PolicyCatalog::new()),
        RunnerConfig::from_env(),
    );
    let registry = RuntimeRegistry::new().with(LOCAL_RUNTIME, Arc::new(runtime));
    let infos = registry.infos();

    if output.format == OutputFormat::Text && !output.quiet {
        for info in &infos {
            println!("{} {}", info.name, info.version);
            println!("  capabilities: {}", info.capabilities.join(", "));
        }
    } else {
        print_result(output.format, output.quiet, &infos);
    }
    exit_codes::SUCCESS
}

use std::path::PathBuf;

use agent_runner::RunnerConfig;
use anyhow::Context;
use clap::Args;
use serde_json::Value;

use crate::output::OutputFormat;

#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Args, Clone)]
pub struct DataArgs {
    /// Overrides AOS_DATA_DIR
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

impl DataArgs {
    pub fn config(&self) -> RunnerConfig {
        let config = RunnerConfig::from_env();
        match &self.data_dir {
            Some(dir) => config.with_data_dir(dir),
            None => config,
        }
    }
}

#[derive(Debug, Args, Clone)]
#[group(required = false, multiple = false)]
pub struct InputArgs {
    /// Path to a JSON file holding the run input
    #[arg(long = "input", short = 'i')]
    pub input_file: Option<PathBuf>,
    /// Run input as a JSON string
    #[arg(long = "input-json", short = 'j')]
    pub input_json: Option<String>,
}

impl InputArgs {
    /// Run input; an empty object when none was given
    pub fn load(&self) -> anyhow::Result<Value> {
        if let Some(path) = &self.input_file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read input file {}", path.display()))?;
            return serde_json::from_str(&text)
                .with_context(|| format!("input file {} is not valid JSON", path.display()));
        }
        if let Some(raw) = &self.input_json {
            return serde_json::from_str(raw).context("--input-json is not valid JSON");
        }
        Ok(Value::Object(Default::default()))
    }
}

#[derive(Debug, Args, Clone)]
#[group(required = true, multiple = false)]
pub struct DecisionArgs {
    #[arg(long)]
    pub approve: bool,
    #[arg(long)]
    pub reject: bool,
}

impl DecisionArgs {
    pub fn as_str(&self) -> &'static str {
        if self.approve {
            "approved"
        } else {
            "rejected"
        }
    }
}

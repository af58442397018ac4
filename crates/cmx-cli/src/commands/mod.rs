use std::path::PathBuf;

use clap::Args;

pub mod campaign;
pub mod env;
pub mod plan;
pub mod status;

/// File name of the run summary written next to the campaign record.
pub const REPORT_FILE: &str = "campaign_report.json";

#[derive(Args, Debug, Clone)]
pub struct DefinitionArgs {
    /// YAML campaign definition.
    #[arg(long, default_value = "conf.yaml")]
    pub conf: PathBuf,
    /// Environment directory. Campaign commands default to the test case name,
    /// environment commands to the current directory.
    #[arg(long)]
    pub env: Option<PathBuf>,
}

impl DefinitionArgs {
    pub fn env_dir(&self, test_case: &str) -> PathBuf {
        self.env
            .clone()
            .unwrap_or_else(|| PathBuf::from(test_case))
    }
}

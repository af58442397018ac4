use std::path::Path;

use cmx_core::errors::CampaignError;
use cmx_core::Trial;

use crate::config::ConfigurationSpace;

/// External collaborators a campaign drives.
///
/// Every call blocks until the collaborator finishes. Implementations report
/// failures with the matching [`CampaignError`] family: provisioning and
/// preparation as `Environment`, workload failures as `Execution`, and
/// operator cancellation as `Interrupted`.
pub trait Testbed {
    /// Provisions or reuses infrastructure through `provider`.
    fn deploy(
        &mut self,
        provider: &str,
        force: bool,
        config: &ConfigurationSpace,
        env: &Path,
    ) -> Result<(), CampaignError>;

    /// Refreshes the infrastructure inventory used by later calls.
    fn inventory(&mut self) -> Result<(), CampaignError>;

    /// Configures agents for `driver`. Must be idempotent.
    fn prepare(&mut self, driver: &str, env: &Path) -> Result<(), CampaignError>;

    /// Runs one resolved trial of `test_case`.
    fn run_trial(&mut self, test_case: &str, trial: &Trial) -> Result<(), CampaignError>;

    /// Releases trial-scoped resources. Must be safe after a failed trial.
    fn teardown(&mut self) -> Result<(), CampaignError>;
}

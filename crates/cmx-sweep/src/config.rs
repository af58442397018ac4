use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use cmx_core::errors::{CampaignError, ErrorInfo};
use cmx_core::serde::from_yaml_slice;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::space::ParameterSpace;

/// Argument vector of an external command.
pub type CommandSpec = Vec<String>;

/// Commands backing the collaborator hooks of a campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookSpec {
    /// Refreshes the infrastructure inventory.
    #[serde(default)]
    pub inventory: Option<CommandSpec>,
    /// Configures driver agents; `{driver}` is substituted.
    #[serde(default)]
    pub prepare: Option<CommandSpec>,
    /// Runs one trial; `{test_case}` is substituted.
    #[serde(default)]
    pub run: Option<CommandSpec>,
    /// Releases trial-scoped resources.
    #[serde(default)]
    pub teardown: Option<CommandSpec>,
}

/// Definition of one campaign under the `campaign` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignSpec {
    /// Keys expanded point-wise instead of combinatorially.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<Vec<String>>,
    /// Pause inserted between trials of an incremental campaign.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_between_secs: Option<f64>,
    /// Candidate values per parameter.
    #[serde(flatten)]
    pub parameters: BTreeMap<String, Vec<Value>>,
}

impl CampaignSpec {
    /// Builds the parameter space of this campaign.
    ///
    /// When the definition declares no zip group, `default_zip` is used,
    /// restricted to the keys the definition actually declares.
    pub fn space(&self, default_zip: &[&str]) -> ParameterSpace {
        let zip: Vec<String> = match &self.zip {
            Some(keys) => keys.clone(),
            None => default_zip
                .iter()
                .filter(|key| self.parameters.contains_key(**key))
                .map(|key| key.to_string())
                .collect(),
        };
        ParameterSpace::new(self.parameters.clone()).with_zip(zip)
    }

    /// Parameter space without any zip group, as used by full campaigns
    /// unless the definition declares one.
    pub fn full_space(&self) -> ParameterSpace {
        self.space(&[])
    }

    /// Pause between incremental trials, if configured.
    pub fn pause_between(&self) -> Result<Option<Duration>, CampaignError> {
        match self.pause_between_secs {
            None => Ok(None),
            Some(secs) if secs.is_finite() && secs >= 0.0 => {
                Ok(Some(Duration::from_secs_f64(secs)))
            }
            Some(secs) => Err(CampaignError::Configuration(
                ErrorInfo::new("config_bad_pause", "pause must be a non-negative number of seconds")
                    .with_context("pause_between_secs", secs.to_string()),
            )),
        }
    }
}

/// Parsed campaign definition file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSpace {
    /// Deploy command per infrastructure provider.
    #[serde(default)]
    pub providers: BTreeMap<String, CommandSpec>,
    /// Collaborator commands.
    #[serde(default)]
    pub hooks: HookSpec,
    /// Campaign definitions keyed by test case name.
    #[serde(default)]
    pub campaign: BTreeMap<String, CampaignSpec>,
}

impl ConfigurationSpace {
    /// Returns the definition of campaign `name`.
    pub fn campaign(&self, name: &str) -> Result<&CampaignSpec, CampaignError> {
        self.campaign.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.campaign.keys().map(String::as_str).collect();
            CampaignError::Configuration(
                ErrorInfo::new("config_unknown_campaign", "campaign is not defined")
                    .with_context("campaign", name.to_string())
                    .with_hint(format!("defined campaigns: {}", known.join(", "))),
            )
        })
    }

    /// Returns the deploy command of `provider`.
    pub fn provider(&self, provider: &str) -> Result<&CommandSpec, CampaignError> {
        self.providers.get(provider).ok_or_else(|| {
            CampaignError::Configuration(
                ErrorInfo::new("config_unknown_provider", "provider is not configured")
                    .with_context("provider", provider.to_string()),
            )
        })
    }
}

/// Loads a campaign definition from the YAML document at `path`.
pub fn load_config(path: &Path) -> Result<ConfigurationSpace, CampaignError> {
    let bytes = fs::read(path).map_err(|err| {
        CampaignError::Configuration(
            ErrorInfo::new("config_read", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    let config: ConfigurationSpace = from_yaml_slice(&bytes)
        .map_err(|err| err.with_context("path", path.display().to_string()))?;
    tracing::debug!(
        path = %path.display(),
        campaigns = config.campaign.len(),
        providers = config.providers.len(),
        "loaded campaign definition"
    );
    Ok(config)
}

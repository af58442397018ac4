use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use cmx_core::errors::{CampaignError, ErrorInfo};
use cmx_core::Trial;
use cmx_sweep::{CommandSpec, ConfigurationSpace, HookSpec, Testbed};
use serde_json::Value;

const DRIVER_PLACEHOLDER: &str = "{driver}";
const TEST_CASE_PLACEHOLDER: &str = "{test_case}";
const ENV_PREFIX: &str = "CMX_";
const SIGINT: i32 = 2;
const SIGINT_EXIT_CODE: i32 = 130;

/// [`Testbed`] backed by the argv commands of a campaign definition.
#[derive(Debug, Clone)]
pub struct ShellTestbed {
    hooks: HookSpec,
    env_dir: Option<PathBuf>,
}

impl ShellTestbed {
    pub fn new(config: &ConfigurationSpace) -> Self {
        Self {
            hooks: config.hooks.clone(),
            env_dir: None,
        }
    }

    /// Testbed attached to an already deployed environment.
    pub fn attached(config: &ConfigurationSpace, env_dir: &Path) -> Self {
        Self {
            hooks: config.hooks.clone(),
            env_dir: Some(env_dir.to_path_buf()),
        }
    }

    fn base_env(&self) -> Vec<(String, String)> {
        self.env_dir
            .iter()
            .map(|dir| (format!("{ENV_PREFIX}ENV_DIR"), dir.display().to_string()))
            .collect()
    }

    fn hook(
        &self,
        name: &str,
        command: Option<&CommandSpec>,
        substitutions: &[(&str, &str)],
        envs: Vec<(String, String)>,
        family: fn(ErrorInfo) -> CampaignError,
    ) -> Result<(), CampaignError> {
        let Some(argv) = command else {
            tracing::debug!(hook = name, "hook not configured; skipping");
            return Ok(());
        };
        let argv = substitute(argv, substitutions);
        let mut all_envs = self.base_env();
        all_envs.extend(envs);
        run_command(name, &argv, &all_envs, family)
    }
}

impl Testbed for ShellTestbed {
    fn deploy(
        &mut self,
        provider: &str,
        force: bool,
        config: &ConfigurationSpace,
        env: &Path,
    ) -> Result<(), CampaignError> {
        let argv = config.provider(provider)?.clone();
        fs::create_dir_all(env).map_err(|err| {
            CampaignError::Environment(
                ErrorInfo::new("env_dir_create", err.to_string())
                    .with_context("path", env.display().to_string()),
            )
        })?;
        self.hooks = config.hooks.clone();
        self.env_dir = Some(env.to_path_buf());
        let mut envs = self.base_env();
        envs.push((format!("{ENV_PREFIX}PROVIDER"), provider.to_string()));
        envs.push((format!("{ENV_PREFIX}FORCE"), force.to_string()));
        run_command("deploy", &argv, &envs, CampaignError::Environment)
    }

    fn inventory(&mut self) -> Result<(), CampaignError> {
        self.hook(
            "inventory",
            self.hooks.inventory.as_ref(),
            &[],
            Vec::new(),
            CampaignError::Environment,
        )
    }

    fn prepare(&mut self, driver: &str, env: &Path) -> Result<(), CampaignError> {
        self.env_dir = Some(env.to_path_buf());
        self.hook(
            "prepare",
            self.hooks.prepare.as_ref(),
            &[(DRIVER_PLACEHOLDER, driver)],
            vec![(format!("{ENV_PREFIX}DRIVER"), driver.to_string())],
            CampaignError::Environment,
        )
    }

    fn run_trial(&mut self, test_case: &str, trial: &Trial) -> Result<(), CampaignError> {
        if self.hooks.run.is_none() {
            return Err(CampaignError::Configuration(
                ErrorInfo::new("hook_run_missing", "no run hook configured")
                    .with_hint("declare hooks.run in the campaign definition"),
            ));
        }
        self.hook(
            "run",
            self.hooks.run.as_ref(),
            &[(TEST_CASE_PLACEHOLDER, test_case)],
            trial_env(test_case, trial),
            CampaignError::Execution,
        )
    }

    fn teardown(&mut self) -> Result<(), CampaignError> {
        self.hook(
            "teardown",
            self.hooks.teardown.as_ref(),
            &[],
            Vec::new(),
            CampaignError::Environment,
        )
    }
}

fn substitute(argv: &[String], substitutions: &[(&str, &str)]) -> Vec<String> {
    argv.iter()
        .map(|arg| {
            substitutions
                .iter()
                .fold(arg.clone(), |acc, (from, to)| acc.replace(from, to))
        })
        .collect()
}

/// Exports every trial field as `CMX_<KEY>`.
fn trial_env(test_case: &str, trial: &Trial) -> Vec<(String, String)> {
    let mut envs: BTreeMap<String, String> = trial
        .iter()
        .map(|(key, value)| {
            (
                format!("{ENV_PREFIX}{}", key.to_ascii_uppercase()),
                env_value(value),
            )
        })
        .collect();
    envs.insert(format!("{ENV_PREFIX}TEST_CASE"), test_case.to_string());
    envs.into_iter().collect()
}

fn env_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(env_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn run_command(
    hook: &str,
    argv: &[String],
    envs: &[(String, String)],
    family: fn(ErrorInfo) -> CampaignError,
) -> Result<(), CampaignError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(CampaignError::Configuration(
            ErrorInfo::new("hook_empty", "command has no program").with_context("hook", hook),
        ));
    };
    let rendered = argv.join(" ");
    tracing::info!(hook, command = %rendered, "running hook");
    let status = Command::new(program)
        .args(args)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .status()
        .map_err(|err| {
            family(
                ErrorInfo::new("hook_spawn", err.to_string())
                    .with_context("hook", hook)
                    .with_context("command", rendered.clone()),
            )
        })?;
    if status.success() {
        return Ok(());
    }
    if interrupted(&status) {
        return Err(CampaignError::Interrupted(
            ErrorInfo::new("hook_interrupted", "command was interrupted")
                .with_context("hook", hook)
                .with_context("command", rendered),
        ));
    }
    Err(family(
        ErrorInfo::new("hook_failed", format!("command exited with {status}"))
            .with_context("hook", hook)
            .with_context("command", rendered),
    ))
}

#[cfg(unix)]
fn interrupted(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(SIGINT) || status.code() == Some(SIGINT_EXIT_CODE)
}

#[cfg(not(unix))]
fn interrupted(status: &ExitStatus) -> bool {
    status.code() == Some(SIGINT_EXIT_CODE)
}

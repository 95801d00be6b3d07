//! C1 — the config model.
//!
//! `Config` is the in-memory representation handed to the validator (C2) and from there to
//! every downstream component; nothing past `load_config` re-parses raw YAML text.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ProcessManagerError;

/// A declarative, immutable description of one managed service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceSpec {
    /// Absolute path or `PATH`-resolvable executable.
    pub command: String,

    /// Ordered argument list passed to `command`.
    #[serde(default)]
    pub args: Vec<String>,

    /// When set, the runner tails this file instead of spawning `command`.
    #[serde(default)]
    pub log_file: Option<String>,

    /// Shell script run once before dependency waiting begins.
    #[serde(default)]
    pub pre_script: Option<String>,

    /// Shell script run a fixed delay after the service starts.
    #[serde(default)]
    pub pos_script: Option<String>,

    /// Local user to run the service as, via `su`.
    #[serde(default)]
    pub user: Option<String>,

    /// Predecessor service names; canonicalized from either a single name or a list.
    #[serde(default)]
    pub depends_on: DependsOn,

    /// Per-predecessor (or uniform) post-start delay in seconds.
    #[serde(default)]
    pub wait_after: WaitAfter,

    /// Whether the service is started at all. Defaults to `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// When `true`, a launch or pre-script failure escalates to a global shutdown.
    #[serde(default)]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// The set of a service's predecessors, canonicalized to a plain list regardless of whether the
/// surface YAML used a bare scalar or a sequence.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependsOn(pub Vec<String>);

impl<'de> Deserialize<'de> for DependsOn {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Surface {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Surface::deserialize(deserializer)? {
            Surface::One(name) => DependsOn(vec![name]),
            Surface::Many(names) => DependsOn(names),
        })
    }
}

impl DependsOn {
    /// Iterate over predecessor names.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Whether this service has no declared predecessors.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The post-dependency delay, either a single value applied to every predecessor or a per-edge
/// mapping from predecessor name to seconds. Canonicalized to the mapping form on load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WaitAfter {
    /// Uniform delay applied to predecessors with no explicit entry below.
    pub default_seconds: u64,
    /// Per-predecessor overrides.
    pub per_edge: HashMap<String, u64>,
}

impl<'de> Deserialize<'de> for WaitAfter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Surface {
            Uniform(u64),
            PerEdge(HashMap<String, u64>),
        }

        Ok(match Surface::deserialize(deserializer)? {
            Surface::Uniform(seconds) => WaitAfter {
                default_seconds: seconds,
                per_edge: HashMap::new(),
            },
            Surface::PerEdge(map) => WaitAfter {
                default_seconds: 0,
                per_edge: map,
            },
        })
    }
}

impl WaitAfter {
    /// The delay to apply after `dependency` has started.
    pub fn get_wait(&self, dependency: &str) -> u64 {
        self.per_edge
            .get(dependency)
            .copied()
            .unwrap_or(self.default_seconds)
    }
}

/// The four deadline knobs governing dependency waits and shutdown escalation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Timeouts {
    /// Delay, in seconds, before running a service's post-script.
    #[serde(default = "Timeouts::default_post_script")]
    pub post_script: u64,
    /// Per-service grace period between SIGTERM and SIGKILL.
    #[serde(default = "Timeouts::default_service_shutdown")]
    pub service_shutdown: u64,
    /// Whole-supervisor grace period between signal receipt and the SIGKILL wave.
    #[serde(default = "Timeouts::default_global_shutdown")]
    pub global_shutdown: u64,
    /// Maximum time a dependent waits for a predecessor to start.
    #[serde(default = "Timeouts::default_dependency_wait")]
    pub dependency_wait: u64,
}

impl Timeouts {
    fn default_post_script() -> u64 {
        7
    }
    fn default_service_shutdown() -> u64 {
        10
    }
    fn default_global_shutdown() -> u64 {
        30
    }
    fn default_dependency_wait() -> u64 {
        300
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            post_script: Self::default_post_script(),
            service_shutdown: Self::default_service_shutdown(),
            global_shutdown: Self::default_global_shutdown(),
            dependency_wait: Self::default_dependency_wait(),
        }
    }
}

/// The full, already-parsed config handed to the validator and from there to the supervisor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// All declared services, keyed by name.
    pub services: HashMap<String, ServiceSpec>,

    /// Shutdown/dependency deadline knobs.
    #[serde(default)]
    pub timeouts: Timeouts,
}

fn expand_env_vars(input: &str) -> Result<String, ProcessManagerError> {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").unwrap();
    let mut missing = None;
    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });
    if let Some(name) = missing {
        return Err(ProcessManagerError::ConfigReadError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("missing environment variable: {name}"),
        )));
    }
    Ok(result.to_string())
}

/// Load and parse a YAML config file, expanding `${VAR}`/`$VAR` references against the process
/// environment. Does not validate — callers must run the config through `validate::validate`
/// before spawning any process.
pub fn load_config(config_path: Option<&str>) -> Result<Config, ProcessManagerError> {
    let config_path = config_path.map(Path::new).unwrap_or_else(|| {
        if Path::new("supervisor.yaml").exists() {
            Path::new("supervisor.yaml")
        } else {
            Path::new("services.yaml")
        }
    });

    let content = fs::read_to_string(config_path).map_err(|e| {
        ProcessManagerError::ConfigReadError(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, config_path.display()),
        ))
    })?;

    let expanded = expand_env_vars(&content)?;
    let config: Config =
        serde_yaml::from_str(&expanded).map_err(ProcessManagerError::ConfigParseError)?;
    Ok(config)
}

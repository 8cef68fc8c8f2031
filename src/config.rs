// GAUNTLET CONFIGURATION
// gauntlet.toml, ALL KEYS OPTIONAL. DEFAULTS REPRODUCE THE STOCK BATCH:
// cubic/bbr/vegas ACROSS PROFILES A (5MS, LTE DRIVING) AND B (200MS, LTE SHORT),
// 60S PER TRIAL, 3S ROLE GRACE, 1S SAMPLING.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::scheme::Scheme;

pub const DEFAULT_CONFIG_PATH: &str = "gauntlet.toml";

const DEFAULT_DURATION_SECS: u64 = 60;
const DEFAULT_GRACE_MS: u64 = 3_000;
const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1_000;
const DEFAULT_POLL_MS: u64 = 50;
const DEFAULT_KILL_GRACE_MS: u64 = 500;
const DEFAULT_ROLE_QUERY_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub base_dir: PathBuf,
    // RELATIVE TO base_dir UNLESS ABSOLUTE.
    pub wrappers_dir: PathBuf,
    pub wrapper_suffix: String,
    // RUN ENTRY POINTS THROUGH THIS PROGRAM INSTEAD OF EXEC'ING THEM.
    pub interpreter: Option<String>,
    pub log_dir: PathBuf,
    pub peer_addr: String,
    // EXTERNAL <tool> --kill-dir <base_dir> SWEEPER, RELATIVE TO base_dir.
    pub sweep_tool: Option<PathBuf>,
    pub schemes: Vec<String>,
    pub profiles: BTreeMap<String, Profile>,
    pub trial: TrialConfig,
}

// NETWORK EMULATION DESCRIPTOR. THE HARNESS ONLY CARRIES THE ID THROUGH A
// TRIAL; DELAY AND TRACES BELONG TO THE EMULATION LAYER.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub delay: u32,
    pub downlink: PathBuf,
    pub uplink: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrialConfig {
    pub duration_secs: u64,
    pub grace_ms: u64,
    pub sample_interval_ms: u64,
    pub poll_ms: u64,
    pub kill_grace_ms: u64,
    pub role_query_timeout_secs: u64,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_DURATION_SECS,
            grace_ms: DEFAULT_GRACE_MS,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            poll_ms: DEFAULT_POLL_MS,
            kill_grace_ms: DEFAULT_KILL_GRACE_MS,
            role_query_timeout_secs: DEFAULT_ROLE_QUERY_TIMEOUT_SECS,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let profile = |delay, trace: &str| Profile {
            delay,
            downlink: PathBuf::from(format!("mahimahi/traces/{}.down", trace)),
            uplink: PathBuf::from(format!("mahimahi/traces/{}.up", trace)),
        };
        let mut profiles = BTreeMap::new();
        profiles.insert("A".to_string(), profile(5, "TMobile-LTE-driving"));
        profiles.insert("B".to_string(), profile(200, "TMobile-LTE-short"));

        Self {
            base_dir: PathBuf::from("."),
            wrappers_dir: PathBuf::from("src/wrappers"),
            wrapper_suffix: ".py".to_string(),
            interpreter: None,
            log_dir: PathBuf::from("logs"),
            peer_addr: "127.0.0.1".to_string(),
            sweep_tool: Some(PathBuf::from("tools/pkill.py")),
            schemes: ["cubic", "bbr", "vegas"].iter().map(|s| s.to_string()).collect(),
            profiles,
            trial: TrialConfig::default(),
        }
    }
}

impl Config {
    // LOAD path. WHEN explicit IS FALSE A MISSING FILE YIELDS THE
    // DEFAULTS; AN EXPLICITLY NAMED FILE MUST EXIST.
    pub fn load(path: &Path, explicit: bool) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        for name in &cfg.schemes {
            validate_scheme_name(name)?;
        }
        Ok(cfg)
    }

    fn under_base(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    pub fn wrappers_path(&self) -> PathBuf {
        self.under_base(&self.wrappers_dir)
    }

    pub fn log_path(&self) -> PathBuf {
        self.under_base(&self.log_dir)
    }

    pub fn sweep_tool_path(&self) -> Option<PathBuf> {
        self.sweep_tool.as_deref().map(|p| self.under_base(p))
    }

    pub fn resolve_scheme(&self, name: &str) -> Scheme {
        Scheme::resolve(
            name,
            &self.wrappers_path(),
            &self.wrapper_suffix,
            self.interpreter.as_deref(),
        )
    }

    // PROFILE IDS TO RUN: ALL CONFIGURED ONES, OR THE REQUESTED SUBSET IN
    // THE ORDER GIVEN.
    pub fn select_profiles(&self, requested: Option<&str>) -> Result<Vec<String>, ConfigError> {
        match requested {
            None => Ok(self.profiles.keys().cloned().collect()),
            Some(list) => list
                .split_whitespace()
                .map(|id| {
                    if self.profiles.contains_key(id) {
                        Ok(id.to_string())
                    } else {
                        Err(ConfigError::UnknownProfile(id.to_string()))
                    }
                })
                .collect(),
        }
    }

    pub fn trial_settings(&self) -> TrialSettings {
        let t = &self.trial;
        TrialSettings {
            duration: Duration::from_secs(t.duration_secs),
            grace: Duration::from_millis(t.grace_ms),
            sample_interval: Duration::from_millis(t.sample_interval_ms.max(1)),
            poll: Duration::from_millis(t.poll_ms.max(1)),
            kill_grace: Duration::from_millis(t.kill_grace_ms),
            role_query_timeout: Duration::from_secs(t.role_query_timeout_secs),
            peer_addr: self.peer_addr.clone(),
            log_dir: self.log_path(),
        }
    }
}

// EVERYTHING A SINGLE TRIAL NEEDS, RESOLVED TO CONCRETE UNITS.
#[derive(Clone, Debug)]
pub struct TrialSettings {
    pub duration: Duration,
    pub grace: Duration,
    pub sample_interval: Duration,
    pub poll: Duration,
    pub kill_grace: Duration,
    pub role_query_timeout: Duration,
    pub peer_addr: String,
    pub log_dir: PathBuf,
}

fn scheme_name_re() -> &'static Result<Regex, regex::Error> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.+-]*$"))
}

pub fn validate_scheme_name(name: &str) -> Result<(), ConfigError> {
    match scheme_name_re() {
        Ok(re) if re.is_match(name) => Ok(()),
        Ok(_) => Err(ConfigError::InvalidSchemeName(name.to_string())),
        Err(e) => Err(ConfigError::NamePattern(e.clone())),
    }
}

// PARSE A SPACE-SEPARATED SCHEME LIST. EMPTY OR MALFORMED LISTS FAIL THE
// BATCH BEFORE ANYTHING IS SPAWNED.
pub fn parse_scheme_list(list: &str) -> Result<Vec<String>, ConfigError> {
    let names: Vec<String> = list.split_whitespace().map(str::to_string).collect();
    if names.is_empty() {
        return Err(ConfigError::EmptySchemeList);
    }
    for n in &names {
        validate_scheme_name(n)?;
    }
    Ok(names)
}

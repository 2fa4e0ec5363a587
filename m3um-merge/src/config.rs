//! Configuration resolution for m3um-merge
//!
//! Bootstrap configuration comes from a TOML file, with command-line
//! arguments layered on top.
//!
//! # Config File Priority
//!
//! 1. `--config` command-line argument
//! 2. `M3UM_CONFIG` environment variable
//! 3. `./m3um.toml` in the working directory
//! 4. `<user config dir>/m3um/config.toml`
//!
//! A missing file is not fatal: the run continues on compiled defaults.
//! A file that exists but does not parse is a configuration error.

use m3um_common::filters::{TokenAppender, TokenPattern, HDNEA_PATTERN};
use m3um_common::normalizer::DEFAULT_FALLBACK_GROUP;
use m3um_common::{Error, MergeOptions, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "M3UM_CONFIG";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "m3um.toml";

/// User-agent sent when fetching sources and injected for players
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; AutoMergeBot/1.0)";

const DEFAULT_SOURCES: &[&str] = &[
    "https://raw.githubusercontent.com/alex8875/m3u/refs/heads/main/jcinema.m3u",
    "https://raw.githubusercontent.com/alex8875/m3u/refs/heads/main/jtv.m3u",
    "https://raw.githubusercontent.com/alex8875/m3u/refs/heads/main/z5.m3u",
    "https://raw.githubusercontent.com/abid58b/SonyChannelsPlaylist/refs/heads/main/sony.m3u",
    "https://raw.githubusercontent.com/abid58b/SonyLivPlayList/refs/heads/main/sonyliv.m3u",
    "https://raw.githubusercontent.com/abid58b/FanCodePlaylist/refs/heads/main/fancode.m3u",
];

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// Playlist sources (URLs or local paths), merged in this order
    pub sources: Vec<String>,

    /// Merged playlist path
    pub output: PathBuf,

    /// Run log path
    pub log_file: PathBuf,

    /// Optional JSON run summary path
    pub summary_json: Option<PathBuf>,

    pub logging: LoggingConfig,
    pub fetch: FetchConfig,
    pub normalize: NormalizeConfig,
    pub identity: IdentityConfig,
    pub tokens: TokenConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
            output: PathBuf::from("output/kaku.m3u"),
            log_file: PathBuf::from("output/merge_log.txt"),
            summary_json: None,
            logging: LoggingConfig::default(),
            fetch: FetchConfig::default(),
            normalize: NormalizeConfig::default(),
            identity: IdentityConfig::default(),
            tokens: TokenConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// HTTP fetch settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub accept: String,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: "*/*".to_string(),
            timeout_secs: 20,
        }
    }
}

/// Record normalization settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Group label for sources that yield none
    pub fallback_group: String,
    /// Add an `http-user-agent` playback directive to every record
    pub inject_user_agent: bool,
    /// User-agent written into that directive
    pub player_user_agent: String,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            fallback_group: DEFAULT_FALLBACK_GROUP.to_string(),
            inject_user_agent: false,
            player_user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Identity key settings
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct IdentityConfig {
    /// Query parameters to ignore in reference keys, on top of the built-in set
    pub extra_auth_params: Vec<String>,
}

/// Secret token appending
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TokenConfig {
    pub enabled: bool,
    pub patterns: Vec<TokenPatternConfig>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            patterns: vec![TokenPatternConfig {
                param: "__hdnea__".to_string(),
                regex: HDNEA_PATTERN.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TokenPatternConfig {
    /// Query parameter the token is written to
    pub param: String,
    /// Regex whose first capture group is the token value
    pub regex: String,
}

impl TomlConfig {
    /// Options for the merge coordinator
    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            fallback_group: self.normalize.fallback_group.clone(),
            player_user_agent: self
                .normalize
                .inject_user_agent
                .then(|| self.normalize.player_user_agent.clone()),
            extra_auth_params: self.identity.extra_auth_params.clone(),
        }
    }

    /// Token appender, if token appending is enabled
    ///
    /// **Errors:** [`Error::Config`] for invalid patterns.
    pub fn token_appender(&self) -> Result<Option<TokenAppender>> {
        if !self.tokens.enabled {
            return Ok(None);
        }

        let patterns = self
            .tokens
            .patterns
            .iter()
            .map(|p| TokenPattern::new(&p.param, &p.regex))
            .collect::<Result<Vec<_>>>()?;

        if patterns.is_empty() {
            return Err(Error::Config(
                "token appending enabled but no [[tokens.patterns]] configured".to_string(),
            ));
        }
        Ok(Some(TokenAppender::new(patterns)))
    }

    /// Apply command-line overrides on top of the file values
    pub fn apply_overrides(&mut self, overrides: CliOverrides) {
        if !overrides.sources.is_empty() {
            self.sources = overrides.sources;
        }
        if let Some(output) = overrides.output {
            self.output = output;
        }
        if let Some(log_file) = overrides.log_file {
            self.log_file = log_file;
        }
        if let Some(summary) = overrides.summary_json {
            self.summary_json = Some(summary);
        }
        if let Some(group) = overrides.fallback_group {
            self.normalize.fallback_group = group;
        }
        if overrides.inject_user_agent {
            self.normalize.inject_user_agent = true;
        }
        if let Some(user_agent) = overrides.player_user_agent {
            self.normalize.inject_user_agent = true;
            self.normalize.player_user_agent = user_agent;
        }
        if overrides.append_tokens {
            self.tokens.enabled = true;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }
}

/// Values given on the command line (all optional)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Replaces the configured source list when non-empty
    pub sources: Vec<String>,
    pub output: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub summary_json: Option<PathBuf>,
    pub fallback_group: Option<String>,
    pub inject_user_agent: bool,
    /// Implies `inject_user_agent`
    pub player_user_agent: Option<String>,
    pub append_tokens: bool,
    pub log_level: Option<String>,
}

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// Named file does not exist
    Missing(PathBuf),
    /// No file anywhere in the lookup chain
    Defaults,
}

/// Locate the config file following the priority order
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Working directory
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    // Priority 4: User config directory
    dirs::config_dir()
        .map(|dir| dir.join("m3um").join("config.toml"))
        .filter(|path| path.exists())
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the config file if there is one, compiled defaults otherwise
pub fn load_or_default(path: Option<&Path>) -> Result<(TomlConfig, ConfigOrigin)> {
    match path {
        Some(path) if path.exists() => {
            let config = load_toml_config(path)?;
            Ok((config, ConfigOrigin::File(path.to_path_buf())))
        }
        Some(path) => Ok((TomlConfig::default(), ConfigOrigin::Missing(path.to_path_buf()))),
        None => Ok((TomlConfig::default(), ConfigOrigin::Defaults)),
    }
}

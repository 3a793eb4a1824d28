// ABOUTME: resolves command-line settings into the immutable server configuration.
// ABOUTME: applies the output category defaults and validates values before the daemon starts.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTEN_PORT: u16 = 4444;
pub const DEFAULT_MAX_PARSES: usize = 1;
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max parses must be a positive integer, got {0:?}")]
    InvalidMaxParses(String),
    #[error("downstream must look like host:port, got {0:?}")]
    MalformedDownstream(String),
    #[error("invalid downstream port in {0:?}")]
    InvalidDownstreamPort(String),
    #[error("language must be non-empty")]
    EmptyLanguage,
    #[error("at least one output category must be enabled")]
    NoCategories,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutputCategory {
    Relex,
    Link,
    Anaphora,
}

/// Output toggles exactly as requested on the command line, before defaults apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryFlags {
    pub relex: bool,
    pub link: bool,
    pub anaphora: bool,
}

/// Relations are on whenever neither relations nor linkage was asked for,
/// so anaphora alone still comes with relation output.
pub fn resolve_categories(flags: CategoryFlags) -> BTreeSet<OutputCategory> {
    let mut categories = BTreeSet::new();
    if flags.relex || !flags.link {
        categories.insert(OutputCategory::Relex);
    }
    if flags.link {
        categories.insert(OutputCategory::Link);
    }
    if flags.anaphora {
        categories.insert(OutputCategory::Anaphora);
    }
    categories
}

pub fn parse_max_parses(input: &str) -> Result<usize, ConfigError> {
    match input.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ConfigError::InvalidMaxParses(input.to_string())),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Downstream {
    pub host: String,
    pub port: u16,
}

impl Downstream {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Downstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Downstream {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::MalformedDownstream(s.to_string()))?;
        if host.trim().is_empty() {
            return Err(ConfigError::MalformedDownstream(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| ConfigError::InvalidDownstreamPort(s.to_string()))?;
        Ok(Downstream {
            host: host.to_string(),
            port,
        })
    }
}

/// Process-wide settings, built once at start-up and only ever read afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_port: u16,
    pub max_parses: usize,
    pub language: String,
    pub categories: BTreeSet<OutputCategory>,
    pub verbose: bool,
    pub downstream: Option<Downstream>,
    pub io_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_port: DEFAULT_LISTEN_PORT,
            max_parses: DEFAULT_MAX_PARSES,
            language: DEFAULT_LANGUAGE.to_string(),
            categories: resolve_categories(CategoryFlags::default()),
            verbose: false,
            downstream: None,
            io_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parses == 0 {
            return Err(ConfigError::InvalidMaxParses("0".to_string()));
        }
        if self.language.trim().is_empty() {
            return Err(ConfigError::EmptyLanguage);
        }
        if self.categories.is_empty() {
            return Err(ConfigError::NoCategories);
        }
        Ok(())
    }

    pub fn shows(&self, category: OutputCategory) -> bool {
        self.categories.contains(&category)
    }

    /// Relation extraction only runs when relation output is enabled.
    /// Linkage and anaphora toggles never change what the engine computes.
    pub fn compute_relations(&self) -> bool {
        self.shows(OutputCategory::Relex)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_secs.map(Duration::from_secs)
    }
}

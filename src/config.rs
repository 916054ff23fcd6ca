use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::pricing::{ModelPrice, PriceTable};

/// Name of the config file looked up in the working root.
pub const CONFIG_FILE: &str = ".marginalia.toml";

/// Default page size for `list`.
const DEFAULT_PAGE_SIZE: usize = 20;

/// Default directory holding one JSON file per session.
const DEFAULT_SESSIONS_DIR: &str = ".marginalia/sessions";

/// Project configuration loaded from `.marginalia.toml`.
#[derive(Debug)]
pub struct Config {
    /// What to do with annotations keyed by ephemeral span ids on save.
    pub ephemeral_spans: EphemeralPolicy,
    /// Sessions per page for `list`.
    pub page_size: usize,
    /// Model prices, config overrides layered over the built-in table.
    pub pricing: PriceTable,
    /// Directory holding session files, relative to the root unless absolute.
    pub sessions_dir: PathBuf,
}

/// Handling of annotations that would not survive a reload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EphemeralPolicy {
    /// Omit them from the persisted record and log a warning.
    Drop,
    /// Fail the save.
    #[default]
    Reject,
}

/// Raw TOML structure for `.marginalia.toml`.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct MarginaliaTomlConfig {
    /// Ephemeral span policy.
    #[serde(default)]
    ephemeral_spans: EphemeralPolicy,
    /// Page size for `list`.
    page_size: Option<usize>,
    /// Per-model price overrides.
    #[serde(default)]
    pricing: HashMap<String, ModelPrice>,
    /// Session directory.
    sessions_dir: Option<PathBuf>,
}

impl Config {
    /// Load config from `.marginalia.toml` in the given root directory.
    /// Returns defaults if the file doesn't exist. A file that exists but is
    /// malformed is an error, never a silent fallback.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// `Error::TomlDe` if the TOML is malformed,
    /// or `Error::ConfigInvalid` if `page_size` is zero.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::with_root(root, Self::defaults()));
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };

        let raw: MarginaliaTomlConfig = toml::from_str(&content)?;
        if raw.page_size == Some(0) {
            return Err(Error::ConfigInvalid {
                path,
                reason: "page_size must be at least 1".to_string(),
            });
        }

        let config = Self {
            ephemeral_spans: raw.ephemeral_spans,
            page_size: raw.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            pricing: PriceTable::with_overrides(raw.pricing),
            sessions_dir: raw.sessions_dir.unwrap_or_else(|| return PathBuf::from(DEFAULT_SESSIONS_DIR)),
        };
        return Ok(Self::with_root(root, config));
    }

    /// Config used when no file exists.
    fn defaults() -> Self {
        return Self {
            ephemeral_spans: EphemeralPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
            pricing: PriceTable::default(),
            sessions_dir: PathBuf::from(DEFAULT_SESSIONS_DIR),
        };
    }

    /// Anchor a relative sessions directory at `root`.
    fn with_root(root: &Path, mut config: Self) -> Self {
        if config.sessions_dir.is_relative() {
            config.sessions_dir = root.join(&config.sessions_dir);
        }
        return config;
    }
}

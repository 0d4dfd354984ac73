use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use fence::{DelimiterSpec, Selection};
use sandbox::{DEFAULT_BRIDGE_NAME, Limits};

use crate::verifiers::VerifierKind;

/// Looked up next to the document when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "fence.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("TOML parse error in '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Opening block marker.
    pub open: String,

    /// Closing block marker.
    pub close: String,

    /// Name of the bridge function in the guest's global scope.
    pub bridge: String,

    /// Language tags to run (case-insensitive). Empty runs every block.
    pub languages: Vec<String>,

    /// Guest code prepended to every block.
    pub prelude: Option<String>,

    /// Host verification logic for bridge calls.
    pub verifier: VerifierKind,

    /// Evaluation deadline per block, in milliseconds.
    pub timeout_ms: Option<u64>,

    /// Interpreter heap limit per block, in bytes.
    pub memory_limit: Option<usize>,

    /// Exit non-zero when any block fails.
    pub strict: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let fence = DelimiterSpec::fence();
        HarnessConfig {
            open: fence.open,
            close: fence.close,
            bridge: DEFAULT_BRIDGE_NAME.to_string(),
            languages: Vec::new(),
            prelude: None,
            verifier: VerifierKind::default(),
            timeout_ms: None,
            memory_limit: None,
            strict: false,
        }
    }
}

impl HarnessConfig {
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `explicit` if given, else `fence.toml` in `document_dir` if present, else defaults.
    pub fn load(explicit: Option<&Path>, document_dir: &Path) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = document_dir.join(CONFIG_FILE_NAME);
                if !candidate.is_file() {
                    return Ok(HarnessConfig::default());
                }
                candidate
            }
        };
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&text, &path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.delimiters().is_usable() {
            return Err(ConfigError::Invalid(
                "block markers must not be empty".into(),
            ));
        }
        if !is_identifier(&self.bridge) {
            return Err(ConfigError::Invalid(format!(
                "bridge name '{}' is not a valid identifier",
                self.bridge
            )));
        }
        Ok(())
    }

    pub fn delimiters(&self) -> DelimiterSpec {
        DelimiterSpec::new(self.open.clone(), self.close.clone())
    }

    pub fn selection(&self) -> Selection {
        Selection {
            languages: self.languages.clone(),
            prelude: self.prelude.clone(),
        }
    }

    pub fn limits(&self) -> Limits {
        Limits {
            timeout: self.timeout_ms.map(Duration::from_millis),
            memory_limit: self.memory_limit,
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Command-line settings that take precedence over the config file.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Config file (default: fence.toml next to the document)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Opening block marker
    #[arg(long)]
    pub open: Option<String>,

    /// Closing block marker
    #[arg(long)]
    pub close: Option<String>,

    /// Bridge function name in the guest
    #[arg(long)]
    pub bridge: Option<String>,

    /// Run only blocks with this language tag. Repeatable.
    #[arg(short, long = "lang")]
    pub languages: Vec<String>,

    /// Verification logic for bridge calls
    #[arg(long, value_enum)]
    pub verifier: Option<VerifierKind>,

    /// Evaluation deadline per block, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(open) = &self.open {
            config.open = open.clone();
        }
        if let Some(close) = &self.close {
            config.close = close.clone();
        }
        if let Some(bridge) = &self.bridge {
            config.bridge = bridge.clone();
        }
        if !self.languages.is_empty() {
            config.languages = self.languages.clone();
        }
        if let Some(verifier) = self.verifier {
            config.verifier = verifier;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = Some(timeout_ms);
        }
    }

    /// Load the config for a document in `document_dir` and apply these overrides.
    pub fn resolve(&self, document_dir: &Path) -> Result<HarnessConfig, ConfigError> {
        let mut config = HarnessConfig::load(self.config.as_deref(), document_dir)?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}

//! Where compiled rulesets come from. The registry never compiles anything;
//! it asks a [`RulesetSource`] for `(country, key, version)` and installs
//! whatever comes back.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use cge_schemas::Ruleset;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The requested (country, key, version) does not exist at the source.
    #[error("ruleset not found: ({country}, {key}) v{version}")]
    NotFound {
        country: String,
        key: String,
        version: u32,
    },
    /// The source was reachable but the artifact could not be read or parsed.
    #[error("ruleset load failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait RulesetSource: Send + Sync {
    async fn load(&self, country: &str, key: &str, version: u32) -> Result<Ruleset, SourceError>;
}

// ---------------------------------------------------------------------------
// FsRulesetSource
// ---------------------------------------------------------------------------

/// Filesystem source: `{dir}/{country}/{key}/v{version}.json`, one compiled
/// ruleset per file. This is the deployment shape where an artifact sync
/// drops compiled rulesets next to the service.
pub struct FsRulesetSource {
    dir: PathBuf,
}

impl FsRulesetSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, country: &str, key: &str, version: u32) -> PathBuf {
        self.dir.join(country).join(key).join(format!("v{version}.json"))
    }
}

#[async_trait]
impl RulesetSource for FsRulesetSource {
    async fn load(&self, country: &str, key: &str, version: u32) -> Result<Ruleset, SourceError> {
        let path = self.path_for(country, key, version);
        // Async read: this runs under the registry's writer lock on live
        // management requests, so it must not pin a worker thread on disk.
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound {
                    country: country.to_string(),
                    key: key.to_string(),
                    version,
                })
            }
            Err(e) => return Err(SourceError::Failed(format!("read {path:?}: {e}"))),
        };

        let ruleset: Ruleset = serde_json::from_str(&raw)
            .map_err(|e| SourceError::Failed(format!("parse {path:?}: {e}")))?;
        Ok(ruleset)
    }
}

//! Request scripts replayed by `rwq run`
//!
//! ```yaml
//! requests:
//!   - url: /users
//!   - method: POST
//!     url: /users
//!     body: { name: alice }
//!   - url: /users
//!     ignore-previous-by-url: true
//! ```

use std::fs;
use std::path::Path;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Request;

/// An ordered list of requests submitted back to back
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestScript {
    #[serde(default)]
    pub requests: Vec<Request>,
}

impl RequestScript {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "RequestScript::load: called");
        let content = fs::read_to_string(path).context(format!("Failed to read script {}", path.display()))?;
        Self::parse(&content).context(format!("Failed to parse script {}", path.display()))
    }

    /// Parse and validate every request up front
    pub fn parse(content: &str) -> Result<Self> {
        let script: Self = serde_yaml::from_str(content)?;
        for (index, request) in script.requests.iter().enumerate() {
            request
                .resolve_kind()
                .context(format!("Request #{} ({}) is invalid", index + 1, request.url))?;
        }
        debug!(count = script.requests.len(), "RequestScript::parse: parsed");
        Ok(script)
    }
}

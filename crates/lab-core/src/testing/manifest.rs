//! Suite manifests.
//!
//! ```yaml
//! timeout: 10
//! query:
//!   ref: ../queries/list.fql
//!   params:
//!     url: https://example.com
//! assert:
//!   text: RETURN T::LEN(@lab.data.query.result, 3)
//! ```
//!
//! A script may also be given as a bare string, which is inline text.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::{CaseError, CaseResult};

/// Parsed suite file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SuiteManifest {
    /// Per-run timeout in seconds, overriding the runner's.
    #[serde(default)]
    pub timeout: Option<u64>,
    pub query: ScriptDescriptor,
    #[serde(rename = "assert")]
    pub assertion: ScriptDescriptor,
}

impl SuiteManifest {
    pub fn parse(content: &[u8]) -> CaseResult<Self> {
        serde_yaml::from_slice(content).map_err(|e| CaseError::Manifest(e.to_string()))
    }

    /// Timeout override, if one is set. Zero means none.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Where a script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    Text(String),
    /// Location relative to the suite, or an absolute URL.
    Ref(String),
}

/// One phase of a suite.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawDescriptor")]
pub struct ScriptDescriptor {
    pub script: Script,
    /// Parameters merged over the ambient user parameters for this phase.
    pub params: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDescriptor {
    Text(String),
    Full {
        #[serde(default)]
        text: Option<String>,
        #[serde(default, rename = "ref", alias = "src")]
        reference: Option<String>,
        #[serde(default)]
        params: Map<String, Value>,
    },
}

impl TryFrom<RawDescriptor> for ScriptDescriptor {
    type Error = String;

    fn try_from(raw: RawDescriptor) -> Result<Self, Self::Error> {
        match raw {
            RawDescriptor::Text(text) => Ok(Self {
                script: Script::Text(text),
                params: Map::new(),
            }),
            RawDescriptor::Full {
                text,
                reference,
                params,
            } => {
                let script = match (text, reference) {
                    (Some(text), None) => Script::Text(text),
                    (None, Some(reference)) => Script::Ref(reference),
                    (Some(_), Some(_)) => {
                        return Err("script must have either 'text' or 'ref', not both".to_string())
                    }
                    (None, None) => return Err("script must have 'text' or 'ref'".to_string()),
                };

                Ok(Self { script, params })
            }
        }
    }
}

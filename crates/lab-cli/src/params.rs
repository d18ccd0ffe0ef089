//! `name:json` parameter flags.

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};

/// Parse `--param` style values into a map.
///
/// The value part is JSON: `id:1`, `name:"lab"`, `opts:{"a":true}`. Later
/// entries win.
pub fn parse(entries: &[String]) -> Result<Map<String, Value>> {
    let mut out = Map::new();

    for entry in entries {
        let (name, raw) = entry
            .split_once(':')
            .ok_or_else(|| anyhow!("invalid parameter '{entry}': expected name:value"))?;

        if name.is_empty() {
            return Err(anyhow!("invalid parameter '{entry}': empty name"));
        }

        let value: Value = serde_json::from_str(raw)
            .with_context(|| format!("invalid value of parameter '{name}': {raw}"))?;
        out.insert(name.to_string(), value);
    }

    Ok(out)
}

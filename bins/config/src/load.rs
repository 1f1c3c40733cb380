//! Properties file loading and structured output.

use std::path::Path;

use netadmin::{Error, PropertyStore, Result};
use serde::Serialize;

use crate::OutputFormat;

/// Load a flat properties file. `.yaml`/`.yml` files are YAML, anything
/// else is JSON.
pub fn properties(path: &Path) -> Result<PropertyStore> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::from(e).with_context(format!("reading {}", path.display())))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&raw)
            .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e))),
        _ => Ok(serde_json::from_str(&raw)?),
    }
}

/// Print `value` to stdout in `format`.
pub fn print<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(value).map_err(|e| Error::Parse(e.to_string()))?;
            print!("{}", yaml);
        }
    }
    Ok(())
}

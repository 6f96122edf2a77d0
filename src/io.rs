//! Reading of RON files.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::{fs, path::Path};

/// Parses a value of type `T` from the RON file at the given path.
pub fn parse_ron_file<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<T> {
    let file_path = file_path.as_ref();
    let text = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read {}", file_path.display()))?;
    ron::from_str(&text).with_context(|| format!("Failed to parse {}", file_path.display()))
}

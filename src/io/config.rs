//! Read/write model configuration JSON and parameter overrides.
//!
//! A config file holds a full [`ModelConfig`]; every field is optional and
//! falls back to the reference defaults. Override files are flat JSON
//! objects mapping parameter names to numbers.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use crate::domain::ModelConfig;
use crate::error::AppError;

pub fn read_model_config(path: &Path) -> Result<ModelConfig, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open config JSON '{}': {e}", path.display())))?;
    let config: ModelConfig = serde_json::from_reader(file)
        .map_err(|e| AppError::config(format!("Invalid config JSON '{}': {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

pub fn write_model_config(path: &Path, config: &ModelConfig) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create config JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, config)
        .map_err(|e| AppError::io(format!("Failed to write config JSON: {e}")))
}

/// Read a `{ "name": value, ... }` override map.
pub fn read_overrides(path: &Path) -> Result<BTreeMap<String, f64>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open params JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::config(format!("Invalid params JSON '{}': {e}", path.display())))
}

/// Parse one `name=value` override.
pub fn parse_assignment(s: &str) -> Result<(String, f64), AppError> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| AppError::invalid_input(format!("Expected `name=value`, got '{s}'.")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::invalid_input(format!("Missing parameter name in '{s}'.")));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| AppError::invalid_input(format!("Invalid value for `{name}`: '{value}'.")))?;
    Ok((name.to_string(), value))
}

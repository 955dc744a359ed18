use std::path::Path;
use std::path::PathBuf;

use anyhow::Result;

use super::ConfigurationError;
use crate::environment::CanonicalizedPathBuf;
use crate::environment::Environment;

pub static POSSIBLE_CONFIG_FILE_NAMES: [&str; 4] = ["tree-fmt.json", "tree-fmt.jsonc", ".tree-fmt.json", ".tree-fmt.jsonc"];

/// Gets the config file to use, either the one provided or the first one
/// found in the working directory or its ancestors.
pub fn resolve_config_path(config: Option<&str>, working_dir: &CanonicalizedPathBuf, environment: &impl Environment) -> Result<CanonicalizedPathBuf> {
  if let Some(config) = config {
    let config_path = working_dir.join(config);
    return match environment.canonicalize(&config_path) {
      Ok(path) if environment.path_is_file(&path) => Ok(path),
      _ => Err(ConfigurationError(format!("Config file {} does not exist.", config_path.display())).into()),
    };
  }

  let mut current_dir = Some(working_dir.clone());
  while let Some(dir) = current_dir {
    if let Some(config_path) = get_config_file_in_dir(&dir, environment) {
      log_debug!(environment, "Found config file at {}", config_path.display());
      return Ok(environment.canonicalize(config_path)?);
    }
    current_dir = dir.parent();
  }

  Err(
    ConfigurationError(format!(
      "Could not find a config file in {} or its ancestors (looked for {}). Run `tree-fmt --init` to create one.",
      working_dir.display(),
      POSSIBLE_CONFIG_FILE_NAMES.join(", "),
    ))
    .into(),
  )
}

pub fn get_config_file_in_dir(dir: impl AsRef<Path>, environment: &impl Environment) -> Option<PathBuf> {
  for file_name in &POSSIBLE_CONFIG_FILE_NAMES {
    let config_path = dir.as_ref().join(file_name);
    if environment.path_is_file(&config_path) {
      return Some(config_path);
    }
  }
  None
}

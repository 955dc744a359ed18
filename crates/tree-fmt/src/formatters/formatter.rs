use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Result;
use globset::GlobBuilder;
use globset::GlobSet;
use globset::GlobSetBuilder;
use thiserror::Error;

use super::GraphError;
use crate::configuration::FormatterConfig;
use crate::environment::CommandInvocation;
use crate::environment::Environment;
use crate::utils::FastInsecureHasher;
use crate::utils::resolve_command_path;

#[derive(Debug, Error)]
#[error("Formatter {name} could not be found. Command `{command}` is not a file and is not in the PATH.")]
pub struct FormatterNotFoundError {
  pub name: String,
  pub command: String,
}

/// A configured formatter with its executable resolved and globs compiled.
#[derive(Debug)]
pub struct Formatter {
  name: String,
  config: FormatterConfig,
  executable: PathBuf,
  includes: GlobSet,
  excludes: GlobSet,
  signature: u64,
}

impl Formatter {
  pub fn new(name: &str, config: &FormatterConfig, base_dir: &Path, environment: &impl Environment) -> Result<Formatter> {
    let includes = build_glob_set(&config.includes, name)?;
    let excludes = build_glob_set(&config.excludes, name)?;
    let Some(executable) = resolve_command_path(&config.command, base_dir, environment) else {
      return Err(
        FormatterNotFoundError {
          name: name.to_string(),
          command: config.command.clone(),
        }
        .into(),
      );
    };
    // fingerprint the binary behind any symlinks so in place upgrades are noticed
    let executable_metadata = environment.file_metadata(environment.canonicalize(&executable)?)?;

    let mut hasher = FastInsecureHasher::default();
    hasher
      .write_str(name)
      .write_str(&config.command)
      .write_hashable(executable_metadata.size)
      .write_hashable(executable_metadata.modified);
    for values in [&config.options, &config.includes, &config.excludes] {
      hasher.write_hashable(values.len());
      for value in values {
        hasher.write_str(value);
      }
    }
    hasher.write_str(config.before.as_deref().unwrap_or_default()).write_hashable(config.priority);

    log_debug!(environment, "Resolved formatter {} to {}", name, executable.display());

    Ok(Formatter {
      name: name.to_string(),
      config: config.clone(),
      executable,
      includes,
      excludes,
      signature: hasher.finish(),
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn before(&self) -> Option<&str> {
    self.config.before.as_deref()
  }

  pub fn priority(&self) -> i64 {
    self.config.priority
  }

  pub fn executable(&self) -> &Path {
    &self.executable
  }

  /// Fingerprint of everything that affects this formatter's output,
  /// including the executable's size and modification time.
  pub fn signature(&self) -> u64 {
    self.signature
  }

  /// If the `/` separated path relative to the tree root should be formatted.
  pub fn wants(&self, relative_path: &str) -> bool {
    let included = self.config.includes.is_empty() || self.includes.is_match(relative_path);
    included && !self.excludes.is_match(relative_path)
  }

  pub fn create_invocation<'a>(&self, file_paths: impl Iterator<Item = &'a Path>, cwd: &Path) -> CommandInvocation {
    let mut args = self.config.options.iter().map(OsString::from).collect::<Vec<_>>();
    args.extend(file_paths.map(|path| path.as_os_str().to_os_string()));
    CommandInvocation {
      program: self.executable.clone(),
      args,
      cwd: cwd.to_path_buf(),
    }
  }
}

/// Compiles the patterns so each one matches at any depth of the tree.
pub fn build_glob_set(patterns: &[String], owner: &str) -> Result<GlobSet, GraphError> {
  let mut builder = GlobSetBuilder::new();
  for pattern in patterns {
    let anchored = if pattern.starts_with("**/") { pattern.clone() } else { format!("**/{}", pattern) };
    let glob = GlobBuilder::new(&anchored).literal_separator(false).build().map_err(|err| GraphError::InvalidPattern {
      owner: owner.to_string(),
      pattern: pattern.clone(),
      message: err.kind().to_string(),
    })?;
    builder.add(glob);
  }
  builder.build().map_err(|err| GraphError::InvalidPattern {
    owner: owner.to_string(),
    pattern: patterns.join(", "),
    message: err.to_string(),
  })
}

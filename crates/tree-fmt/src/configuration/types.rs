use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// A problem with the configuration: a malformed config file, invalid
/// values, or formatter relations that can't be resolved.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigurationError(pub String);

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
  #[serde(default, rename = "$schema")]
  pub schema: Option<String>,
  /// Globs excluded from every formatter.
  #[serde(default)]
  pub excludes: Vec<String>,
  #[serde(default)]
  pub on_unmatched: Option<OnUnmatched>,
  #[serde(default)]
  pub walk: Option<WalkKind>,
  #[serde(default)]
  pub formatters: IndexMap<String, FormatterConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FormatterConfig {
  pub command: String,
  #[serde(default)]
  pub options: Vec<String>,
  #[serde(default)]
  pub includes: Vec<String>,
  #[serde(default)]
  pub excludes: Vec<String>,
  /// Name of the formatter that must run after this one.
  #[serde(default)]
  pub before: Option<String>,
  #[serde(default)]
  pub priority: i64,
}

/// What to do with a path that no formatter matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnUnmatched {
  Debug,
  Info,
  #[default]
  Warn,
  Error,
  Fatal,
}

impl OnUnmatched {
  pub fn parse(text: &str) -> Option<OnUnmatched> {
    match text.to_lowercase().as_str() {
      "debug" => Some(OnUnmatched::Debug),
      "info" => Some(OnUnmatched::Info),
      "warn" => Some(OnUnmatched::Warn),
      "error" => Some(OnUnmatched::Error),
      "fatal" => Some(OnUnmatched::Fatal),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalkKind {
  /// Git when the tree root is inside a work tree, otherwise the filesystem.
  #[default]
  Auto,
  Git,
  Filesystem,
}

impl WalkKind {
  pub fn parse(text: &str) -> Option<WalkKind> {
    match text.to_lowercase().as_str() {
      "auto" => Some(WalkKind::Auto),
      "git" => Some(WalkKind::Git),
      "filesystem" => Some(WalkKind::Filesystem),
      _ => None,
    }
  }
}

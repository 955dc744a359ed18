use anyhow::Context;
use anyhow::Result;
use indexmap::IndexMap;

use super::ConfigurationError;
use super::FormatterConfig;
use super::OnUnmatched;
use super::WalkKind;
use super::deserialize_config;
use super::resolve_config_path;
use crate::arg_parser::CliArgs;
use crate::environment::CanonicalizedPathBuf;
use crate::environment::Environment;

/// Configuration after merging the cli args, environment variables and
/// config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
  pub config_file_path: CanonicalizedPathBuf,
  pub tree_root: CanonicalizedPathBuf,
  pub working_dir: CanonicalizedPathBuf,
  pub excludes: Vec<String>,
  pub on_unmatched: OnUnmatched,
  pub walk: WalkKind,
  pub formatters: IndexMap<String, FormatterConfig>,
  /// Names of the only formatters to use, when provided.
  pub formatter_filter: Option<Vec<String>>,
  pub allow_missing_formatter: bool,
  pub fail_on_change: bool,
  pub no_cache: bool,
  pub clear_cache: bool,
}

pub fn resolve_config(args: &CliArgs, environment: &impl Environment) -> Result<ResolvedConfig> {
  let working_dir = resolve_working_dir(args, environment)?;
  let config_arg = args.config.clone().or_else(|| env_var(environment, "TREE_FMT_CONFIG"));
  let config_file_path = resolve_config_path(config_arg.as_deref(), &working_dir, environment)?;
  let config_file_text = environment
    .read_file(&config_file_path)
    .with_context(|| format!("Error reading config file {}.", config_file_path.display()))?;
  let config_file = deserialize_config(&config_file_text)
    .map_err(|err| ConfigurationError(format!("Error parsing config file {}. {}", config_file_path.display(), err)))?;

  let tree_root = match args
    .tree_root
    .clone()
    .or_else(|| env_var(environment, "TREE_FMT_TREE_ROOT"))
    .or_else(|| env_var(environment, "PRJ_ROOT"))
  {
    Some(tree_root) => environment
      .canonicalize(working_dir.join(&tree_root))
      .map_err(|err| ConfigurationError(format!("Error resolving tree root {}. {}", tree_root, err)))?,
    None => match config_file_path.parent() {
      Some(parent) => parent,
      None => working_dir.clone(),
    },
  };

  let on_unmatched = match args.on_unmatched {
    Some(value) => value,
    None => match env_var(environment, "TREE_FMT_ON_UNMATCHED") {
      Some(value) => OnUnmatched::parse(&value).ok_or_else(|| ConfigurationError(format!("Invalid TREE_FMT_ON_UNMATCHED value: {}", value)))?,
      None => config_file.on_unmatched.unwrap_or_default(),
    },
  };
  let walk = match args.walk {
    Some(value) => value,
    None => match env_var(environment, "TREE_FMT_WALK") {
      Some(value) => WalkKind::parse(&value).ok_or_else(|| ConfigurationError(format!("Invalid TREE_FMT_WALK value: {}", value)))?,
      None => config_file.walk.unwrap_or_default(),
    },
  };
  let formatter_filter = if !args.formatters.is_empty() {
    Some(args.formatters.clone())
  } else {
    env_var(environment, "TREE_FMT_FORMATTERS").map(|value| split_list(&value))
  };

  let mut formatters = config_file.formatters;
  for (name, formatter) in formatters.iter_mut() {
    apply_formatter_env_vars(name, formatter, environment);
  }

  Ok(ResolvedConfig {
    config_file_path,
    tree_root,
    working_dir,
    excludes: config_file.excludes,
    on_unmatched,
    walk,
    formatters,
    formatter_filter,
    allow_missing_formatter: args.allow_missing_formatter || env_flag(environment, "TREE_FMT_ALLOW_MISSING_FORMATTER")?,
    fail_on_change: args.fail_on_change || env_flag(environment, "TREE_FMT_FAIL_ON_CHANGE")?,
    no_cache: args.no_cache || env_flag(environment, "TREE_FMT_NO_CACHE")?,
    clear_cache: args.clear_cache || env_flag(environment, "TREE_FMT_CLEAR_CACHE")?,
  })
}

pub fn resolve_working_dir(args: &CliArgs, environment: &impl Environment) -> Result<CanonicalizedPathBuf> {
  let cwd = environment.cwd()?;
  match args.working_dir.clone().or_else(|| env_var(environment, "TREE_FMT_WORKING_DIR")) {
    Some(dir) => environment
      .canonicalize(cwd.join(&dir))
      .map_err(|err| ConfigurationError(format!("Error resolving working directory {}. {}", dir, err)).into()),
    None => Ok(cwd),
  }
}

/// Replaces a formatter's globs with the comma separated values of
/// `TREE_FMT_FORMATTER_<NAME>_INCLUDES` and `TREE_FMT_FORMATTER_<NAME>_EXCLUDES`.
fn apply_formatter_env_vars(name: &str, formatter: &mut FormatterConfig, environment: &impl Environment) {
  let prefix = format!("TREE_FMT_FORMATTER_{}", formatter_env_var_name(name));
  if let Some(value) = env_var(environment, &format!("{}_INCLUDES", prefix)) {
    formatter.includes = split_list(&value);
  }
  if let Some(value) = env_var(environment, &format!("{}_EXCLUDES", prefix)) {
    formatter.excludes = split_list(&value);
  }
}

fn formatter_env_var_name(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
    .collect()
}

fn split_list(value: &str) -> Vec<String> {
  value.split(',').map(|item| item.trim().to_string()).filter(|item| !item.is_empty()).collect()
}

fn env_var(environment: &impl Environment, name: &str) -> Option<String> {
  environment.var(name).filter(|value| !value.trim().is_empty())
}

fn env_flag(environment: &impl Environment, name: &str) -> Result<bool, ConfigurationError> {
  match env_var(environment, name) {
    Some(value) => match value.trim().to_lowercase().as_str() {
      "1" | "true" | "yes" => Ok(true),
      "0" | "false" | "no" => Ok(false),
      _ => Err(ConfigurationError(format!("Invalid {} value: {}", name, value))),
    },
    None => Ok(false),
  }
}

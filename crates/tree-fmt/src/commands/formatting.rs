use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::arg_parser::CliArgs;
use crate::arg_parser::FormatSubCommand;
use crate::arg_parser::StdInFmtSubCommand;
use crate::cache::Cache;
use crate::configuration::ResolvedConfig;
use crate::configuration::resolve_config;
use crate::environment::Environment;
use crate::environment::FileKind;
use crate::format::FormatPipelineOptions;
use crate::format::UnexpectedChangesError;
use crate::format::report_unmatched;
use crate::format::run_format_pipeline;
use crate::formatters::BATCH_SIZE;
use crate::formatters::FormatterGraph;
use crate::formatters::FormatterGraphOptions;
use crate::walk::PathSource;
use crate::walk::WalkedFile;
use crate::walk::resolve_requested_paths;
use crate::walk::resolve_stdin_path;

pub async fn format<TEnvironment: Environment>(cmd: &FormatSubCommand, args: &CliArgs, environment: &TEnvironment, token: CancellationToken) -> Result<()> {
  let config = resolve_config(args, environment)?;
  let graph = Arc::new(build_formatter_graph(&config, environment)?);
  let requested = resolve_requested_paths(&cmd.paths, &config.working_dir, &config.tree_root, environment)?;
  let cache = open_cache(&config, &graph, environment)?;

  let source = PathSource::Tree {
    walk: config.walk,
    tree_root: config.tree_root.clone(),
    requested,
  };
  let options = FormatPipelineOptions {
    on_unmatched: config.on_unmatched,
    batch_size: BATCH_SIZE,
    cwd: config.tree_root.as_path().to_path_buf(),
  };
  let result = run_format_pipeline(environment.clone(), graph, source, cache.clone(), options, token).await;
  // keep the progress of a failed run
  let close_result = match &cache {
    Some(cache) => cache.close(),
    None => Ok(()),
  };
  let stats = result?;
  close_result?;

  environment.log(&stats.to_string());
  if config.fail_on_change && stats.changed() > 0 {
    return Err(UnexpectedChangesError(stats.changed()).into());
  }
  Ok(())
}

/// Formats the provided text as if it were the file at the provided path
/// and writes the result to stdout.
pub async fn stdin_fmt<TEnvironment: Environment>(cmd: &StdInFmtSubCommand, args: &CliArgs, environment: &TEnvironment, token: CancellationToken) -> Result<()> {
  let config = resolve_config(args, environment)?;
  let graph = Arc::new(build_formatter_graph(&config, environment)?);
  let (file_path, relative_path) = resolve_stdin_path(&cmd.file_path, &config.working_dir, &config.tree_root)?;

  if graph.is_globally_excluded(&relative_path) {
    environment.write_stdout_bytes(&cmd.file_text)?;
    return Ok(());
  }
  if graph.route(&relative_path).is_empty() {
    report_unmatched(environment, config.on_unmatched, &relative_path)?;
    environment.write_stdout_bytes(&cmd.file_text)?;
    return Ok(());
  }

  // formatters get a real file beside the target so they pick up the same settings
  let temp_dir = match file_path.parent() {
    Some(parent) if environment.file_metadata(parent).map(|m| m.kind == FileKind::Directory).unwrap_or(false) => parent.to_path_buf(),
    _ => config.tree_root.as_path().to_path_buf(),
  };
  let extension = file_path.extension().map(|ext| format!(".{}", ext.to_string_lossy())).unwrap_or_default();
  let temp_path = temp_dir.join(format!("tree-fmt-stdin-{:016x}{}", rand::random::<u64>(), extension));
  environment
    .write_file_bytes(&temp_path, &cmd.file_text)
    .with_context(|| format!("Error writing temporary file {}.", temp_path.display()))?;

  let result = format_temp_file(&config, graph, temp_path.clone(), relative_path, environment, token).await;
  if let Err(err) = environment.remove_file(&temp_path) {
    log_debug!(environment, "Error removing temporary file {}. {}", temp_path.display(), err);
  }
  let formatted = result?;
  environment.write_stdout_bytes(&formatted)?;
  Ok(())
}

async fn format_temp_file<TEnvironment: Environment>(
  config: &ResolvedConfig,
  graph: Arc<FormatterGraph>,
  temp_path: PathBuf,
  relative_path: String,
  environment: &TEnvironment,
  token: CancellationToken,
) -> Result<Vec<u8>> {
  let metadata = environment.file_metadata(&temp_path)?;
  let source = PathSource::Files(vec![WalkedFile {
    path: temp_path.clone(),
    relative_path,
    metadata,
  }]);
  let options = FormatPipelineOptions {
    on_unmatched: config.on_unmatched,
    batch_size: BATCH_SIZE,
    cwd: config.tree_root.as_path().to_path_buf(),
  };
  run_format_pipeline(environment.clone(), graph, source, None, options, token).await?;
  environment
    .read_file_bytes(&temp_path)
    .with_context(|| format!("Error reading formatted temporary file {}.", temp_path.display()))
}

fn build_formatter_graph(config: &ResolvedConfig, environment: &impl Environment) -> Result<FormatterGraph> {
  FormatterGraph::build(
    FormatterGraphOptions {
      formatters: &config.formatters,
      filter: config.formatter_filter.as_deref(),
      allow_missing_formatter: config.allow_missing_formatter,
      global_excludes: &config.excludes,
      base_dir: config.tree_root.as_path(),
    },
    environment,
  )
}

fn open_cache<TEnvironment: Environment>(config: &ResolvedConfig, graph: &FormatterGraph, environment: &TEnvironment) -> Result<Option<Arc<Cache<TEnvironment>>>> {
  if config.no_cache {
    if config.clear_cache {
      Cache::open(environment.clone(), &config.tree_root, graph.signature(), true)?;
    }
    return Ok(None);
  }
  let cache = Cache::open(environment.clone(), &config.tree_root, graph.signature(), config.clear_cache)?;
  log_debug!(environment, "Using cache {} with {} entries.", cache.file_path().display(), cache.len());
  Ok(Some(Arc::new(cache)))
}

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::Cache;
use crate::cache::CacheCandidate;
use crate::cache::CompletedFile;
use crate::configuration::OnUnmatched;
use crate::environment::Environment;
use crate::formatters::FileItem;
use crate::formatters::FormatterGraph;
use crate::formatters::FormatterStage;
use crate::formatters::send_item;
use crate::stats::RunStatistics;
use crate::utils::get_bytes_hash;
use crate::walk::PathSource;
use crate::walk::WalkedFile;
use crate::walk::spawn_path_source;

#[derive(Debug, Error)]
#[error("Formatting was cancelled.")]
pub struct CancelledError;

#[derive(Debug, Error)]
#[error("No formatter for path: {0}")]
pub struct UnmatchedPathError(pub String);

#[derive(Debug, Error)]
#[error("Formatting changed {0} file(s). Run without --fail-on-change to accept the changes.")]
pub struct UnexpectedChangesError(pub usize);

pub struct FormatPipelineOptions {
  pub on_unmatched: OnUnmatched,
  pub batch_size: usize,
  /// Directory the formatters are run in.
  pub cwd: PathBuf,
}

/// Keeps the first error reported by the pipeline's tasks and cancels the
/// rest of the pipeline when it arrives.
#[derive(Clone)]
struct ErrorCollector<TEnvironment: Environment> {
  first: Arc<Mutex<Option<anyhow::Error>>>,
  token: CancellationToken,
  environment: TEnvironment,
}

impl<TEnvironment: Environment> ErrorCollector<TEnvironment> {
  fn new(environment: TEnvironment, token: CancellationToken) -> Self {
    Self {
      first: Default::default(),
      token,
      environment,
    }
  }

  fn spawn(&self, future: impl Future<Output = Result<()>> + Send + 'static) -> JoinHandle<()> {
    let collector = self.clone();
    tokio::spawn(async move {
      let result = future.await;
      collector.record(result);
    })
  }

  fn record(&self, result: Result<()>) {
    let Err(err) = result else {
      return;
    };
    // caused by an earlier error or an interrupt
    if err.downcast_ref::<CancelledError>().is_some() {
      return;
    }
    let mut first = self.first.lock();
    if first.is_none() {
      *first = Some(err);
      self.token.cancel();
    } else {
      log_debug!(self.environment, "Additional error: {:#}", err);
    }
  }

  fn take(&self) -> Option<anyhow::Error> {
    self.first.lock().take()
  }
}

/// Runs every path of the source through the formatters that want it.
///
/// Paths the cache knows are unchanged are skipped. Completed paths are
/// recorded in the cache as they drain, so a failed run keeps the progress
/// of every path that made it through all its formatters. A successful walk
/// of the whole tree drops the cache entries of paths it didn't see.
pub async fn run_format_pipeline<TEnvironment: Environment>(
  environment: TEnvironment,
  graph: Arc<FormatterGraph>,
  source: PathSource,
  cache: Option<Arc<Cache<TEnvironment>>>,
  options: FormatPipelineOptions,
  token: CancellationToken,
) -> Result<Arc<RunStatistics>> {
  let start = Instant::now();
  let pipeline_token = token.child_token();
  let collector = ErrorCollector::new(environment.clone(), pipeline_token.clone());
  let stats = Arc::new(RunStatistics::default());
  let batch_size = options.batch_size.max(1);
  let seen_paths = match (&source, &cache) {
    (PathSource::Tree { requested, .. }, Some(_)) if requested.is_empty() => Some(Arc::new(Mutex::new(HashSet::new()))),
    _ => None,
  };

  let (stage_senders, stage_receivers): (Vec<_>, Vec<_>) = (0..graph.len()).map(|_| mpsc::channel::<FileItem>(batch_size)).unzip();
  let (completions_sender, completions_receiver) = mpsc::channel::<FileItem>(batch_size);
  let mut handles = Vec::with_capacity(graph.len() + 3);

  for (index, receiver) in stage_receivers.into_iter().enumerate() {
    log_debug!(
      environment,
      "Starting formatter {} with {} upstream formatter(s).",
      graph.formatter(index).name(),
      graph.upstreams(index).len()
    );
    let stage = FormatterStage {
      formatter: graph.formatter(index).clone(),
      receiver,
      // a stage only ever forwards to later stages so queues close in execution order
      downstream_senders: stage_senders
        .iter()
        .enumerate()
        .map(|(other, sender)| if other > index { Some(sender.clone()) } else { None })
        .collect(),
      completions: completions_sender.clone(),
      environment: environment.clone(),
      cwd: options.cwd.clone(),
      batch_size,
      token: pipeline_token.clone(),
    };
    handles.push(collector.spawn(stage.run()));
  }
  drop(completions_sender);

  let (walk_sender, walk_receiver) = mpsc::channel::<WalkedFile>(batch_size);
  let walker = spawn_path_source(environment.clone(), source, walk_sender, pipeline_token.clone());
  handles.push(collector.spawn(async move { walker.await? }));

  let dispatcher = Dispatcher {
    environment: environment.clone(),
    graph: graph.clone(),
    cache: cache.clone(),
    stats: stats.clone(),
    senders: stage_senders,
    seen_paths: seen_paths.clone(),
    on_unmatched: options.on_unmatched,
    token: pipeline_token.clone(),
  };
  handles.push(collector.spawn(dispatcher.run(walk_receiver, batch_size)));

  let drainer = Drainer {
    environment: environment.clone(),
    cache: cache.clone(),
    stats: stats.clone(),
    token: pipeline_token.clone(),
  };
  handles.push(collector.spawn(drainer.run(completions_receiver, batch_size)));

  for handle in handles {
    if let Err(err) = handle.await {
      collector.record(Err(err.into()));
    }
  }

  if let Some(err) = collector.take() {
    return Err(err);
  }
  if token.is_cancelled() {
    return Err(CancelledError.into());
  }
  if let (Some(cache), Some(seen_paths)) = (&cache, &seen_paths) {
    cache.retain_seen(&seen_paths.lock());
  }
  log_debug!(environment, "Formatted {} file(s) in {}ms.", stats.formatted(), start.elapsed().as_millis());
  Ok(stats)
}

/// Routes the files of the path source to the first formatter on each
/// file's route.
struct Dispatcher<TEnvironment: Environment> {
  environment: TEnvironment,
  graph: Arc<FormatterGraph>,
  cache: Option<Arc<Cache<TEnvironment>>>,
  stats: Arc<RunStatistics>,
  senders: Vec<mpsc::Sender<FileItem>>,
  /// Every traversed path, when the whole tree is walked.
  seen_paths: Option<Arc<Mutex<HashSet<String>>>>,
  on_unmatched: OnUnmatched,
  token: CancellationToken,
}

impl<TEnvironment: Environment> Dispatcher<TEnvironment> {
  async fn run(self, mut receiver: mpsc::Receiver<WalkedFile>, batch_size: usize) -> Result<()> {
    let mut files = Vec::with_capacity(batch_size);
    loop {
      let count = tokio::select! {
        biased;
        _ = self.token.cancelled() => return Err(CancelledError.into()),
        count = receiver.recv_many(&mut files, batch_size) => count,
      };
      if count == 0 {
        break;
      }
      self.dispatch(&mut files).await?;
    }
    // dropping the senders closes the stages' queues
    Ok(())
  }

  async fn dispatch(&self, files: &mut Vec<WalkedFile>) -> Result<()> {
    let mut candidates = Vec::with_capacity(files.len());
    for file in files.drain(..) {
      self.stats.add_traversed(1);
      if let Some(seen_paths) = &self.seen_paths {
        seen_paths.lock().insert(file.relative_path.clone());
      }
      if self.graph.is_globally_excluded(&file.relative_path) {
        log_debug!(self.environment, "Excluded: {}", file.relative_path);
        continue;
      }
      let route = self.graph.route(&file.relative_path);
      if route.is_empty() {
        report_unmatched(&self.environment, self.on_unmatched, &file.relative_path)?;
        continue;
      }
      self.stats.add_matched(1);
      let route_signature = self.graph.route_signature(&route);
      candidates.push((file, route, route_signature));
    }

    let candidates = match &self.cache {
      Some(cache) => {
        let cache = cache.clone();
        // the cache may hash file content
        tokio::task::spawn_blocking(move || {
          let changed = cache
            .filter_changed(candidates.iter().map(|(file, _, route_signature)| CacheCandidate {
              relative_path: &file.relative_path,
              path: &file.path,
              metadata: &file.metadata,
              route_signature: *route_signature,
            }))
            .into_iter()
            .map(String::from)
            .collect::<HashSet<_>>();
          candidates
            .into_iter()
            .filter(|(file, _, _)| changed.contains(&file.relative_path))
            .collect::<Vec<_>>()
        })
        .await?
      }
      None => candidates,
    };

    for (file, route, route_signature) in candidates {
      let first = route[0];
      let item = FileItem {
        path: file.path,
        relative_path: file.relative_path,
        route: route.into(),
        position: 0,
        route_signature,
        before_hash: None,
      };
      send_item(&self.senders[first], item, &self.token).await?;
    }
    Ok(())
  }
}

pub fn report_unmatched(environment: &impl Environment, on_unmatched: OnUnmatched, relative_path: &str) -> Result<()> {
  match on_unmatched {
    OnUnmatched::Debug => log_debug!(environment, "No formatter for path: {}", relative_path),
    OnUnmatched::Info => log_info!(environment, "No formatter for path: {}", relative_path),
    OnUnmatched::Warn => log_warn!(environment, "No formatter for path: {}", relative_path),
    OnUnmatched::Error => log_error!(environment, "No formatter for path: {}", relative_path),
    OnUnmatched::Fatal => return Err(UnmatchedPathError(relative_path.to_string()).into()),
  }
  Ok(())
}

/// Consumes the completion records of the last stage on each route.
struct Drainer<TEnvironment: Environment> {
  environment: TEnvironment,
  cache: Option<Arc<Cache<TEnvironment>>>,
  stats: Arc<RunStatistics>,
  token: CancellationToken,
}

impl<TEnvironment: Environment> Drainer<TEnvironment> {
  /// Completes the records in batches filled to `batch_size`, or with what
  /// is left once the queue closes.
  async fn run(self, mut receiver: mpsc::Receiver<FileItem>, batch_size: usize) -> Result<()> {
    let mut items = Vec::with_capacity(batch_size);
    loop {
      // a partially filled batch is discarded on cancellation
      let remaining = batch_size - items.len();
      let count = tokio::select! {
        biased;
        _ = self.token.cancelled() => return Err(CancelledError.into()),
        count = receiver.recv_many(&mut items, remaining) => count,
      };
      let is_closed = count == 0;
      if items.len() >= batch_size || (is_closed && !items.is_empty()) {
        let batch = std::mem::replace(&mut items, Vec::with_capacity(batch_size));
        self.complete(batch).await?;
      }
      if is_closed {
        return Ok(());
      }
    }
  }

  async fn complete(&self, items: Vec<FileItem>) -> Result<()> {
    let environment = self.environment.clone();
    let cache = self.cache.clone();
    let (formatted, changed) = tokio::task::spawn_blocking(move || -> Result<(usize, usize)> {
      let mut completed = Vec::with_capacity(items.len());
      let mut changed = 0;
      for item in items {
        let bytes = environment
          .read_file_bytes(&item.path)
          .with_context(|| format!("Error reading {} after formatting.", item.path.display()))?;
        let metadata = environment
          .file_metadata(&item.path)
          .with_context(|| format!("Error reading metadata of {}.", item.path.display()))?;
        let hash = get_bytes_hash(&bytes);
        if item.before_hash != Some(hash) {
          log_debug!(environment, "Changed: {}", item.relative_path);
          changed += 1;
        }
        completed.push(CompletedFile {
          relative_path: item.relative_path,
          metadata,
          hash,
          route_signature: item.route_signature,
        });
      }
      if let Some(cache) = cache {
        cache.record_completions(&completed)?;
      }
      Ok((completed.len(), changed))
    })
    .await??;
    self.stats.add_formatted(formatted);
    self.stats.add_changed(changed);
    Ok(())
  }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Formatter;
use crate::environment::Environment;
use crate::format::CancelledError;
use crate::utils::LogLevel;
use crate::utils::get_bytes_hash;

/// Number of paths passed to a single formatter invocation and the capacity
/// of the queues between stages.
pub const BATCH_SIZE: usize = 1024;

#[derive(Debug, Error)]
#[error("Formatter {name} failed. {message}")]
pub struct FormatterExecutionFailedError {
  pub name: String,
  pub message: String,
}

/// A path flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct FileItem {
  /// The file the formatters are run on.
  pub path: PathBuf,
  /// `/` separated path relative to the tree root used for matching and caching.
  pub relative_path: String,
  /// Stage indexes this path goes through, in execution order.
  pub route: Arc<[usize]>,
  /// Position in the route of the stage currently holding the path.
  pub position: usize,
  pub route_signature: u64,
  /// Content hash before any formatter ran. Set by the first stage.
  pub before_hash: Option<u64>,
}

/// Runs one formatter over every path sent to it.
pub struct FormatterStage<TEnvironment: Environment> {
  pub formatter: Arc<Formatter>,
  pub receiver: mpsc::Receiver<FileItem>,
  /// Senders indexed by stage. Only stages after this one are present.
  pub downstream_senders: Vec<Option<mpsc::Sender<FileItem>>>,
  pub completions: mpsc::Sender<FileItem>,
  pub environment: TEnvironment,
  /// Directory formatters are run in.
  pub cwd: PathBuf,
  pub batch_size: usize,
  pub token: CancellationToken,
}

impl<TEnvironment: Environment> FormatterStage<TEnvironment> {
  /// Consumes the queue until every sender is dropped, flushing whenever
  /// the batch fills up and once more at the end.
  ///
  /// A partially filled batch is discarded on cancellation.
  pub async fn run(mut self) -> Result<()> {
    let mut batch = Vec::with_capacity(self.batch_size);
    loop {
      let item = tokio::select! {
        biased;
        _ = self.token.cancelled() => return Err(CancelledError.into()),
        item = self.receiver.recv() => item,
      };
      let Some(item) = item else {
        break;
      };
      batch.push(item);
      if batch.len() >= self.batch_size {
        self.flush(&mut batch).await?;
      }
    }
    self.flush(&mut batch).await?;
    log_debug!(self.environment, "Formatter {} finished.", self.formatter.name());
    Ok(())
  }

  async fn flush(&self, batch: &mut Vec<FileItem>) -> Result<()> {
    if batch.is_empty() {
      return Ok(());
    }
    let mut items = std::mem::replace(batch, Vec::with_capacity(self.batch_size));
    self.hash_unformatted(&mut items).await?;

    let start = Instant::now();
    let invocation = self.formatter.create_invocation(items.iter().map(|item| item.path.as_path()), &self.cwd);
    let output = match self.environment.run_formatter(invocation, self.token.clone()).await {
      Ok(output) => output,
      Err(_) if self.token.is_cancelled() => return Err(CancelledError.into()),
      Err(err) => {
        return Err(
          FormatterExecutionFailedError {
            name: self.formatter.name().to_string(),
            message: format!("Error running {}. {}", self.formatter.executable().display(), err),
          }
          .into(),
        );
      }
    };
    if !output.success {
      let exit_code = match output.exit_code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
      };
      return Err(
        FormatterExecutionFailedError {
          name: self.formatter.name().to_string(),
          message: format!("Terminated by {} when formatting {} file(s).\n{}", exit_code, items.len(), output.combined_text().trim_end()),
        }
        .into(),
      );
    }

    let name = self.formatter.name();
    log_debug!(self.environment, "Formatter {} processed {} file(s) in {}ms", name, items.len(), start.elapsed().as_millis());
    if self.environment.log_level().is_enabled(LogLevel::Debug) {
      let text = output.combined_text();
      if !text.trim().is_empty() {
        self.environment.log_stderr_with_context(text.trim_end(), name);
      }
    }

    for mut item in items {
      item.position += 1;
      let sender = match item.route.get(item.position) {
        Some(next) => match self.downstream_senders.get(*next) {
          Some(Some(sender)) => sender,
          _ => bail!("Formatter {} has no stage {} to forward {} to.", name, next, item.relative_path),
        },
        None => &self.completions,
      };
      send_item(sender, item, &self.token).await?;
    }
    Ok(())
  }

  /// Records the content hash of paths entering their first stage so
  /// completion can tell whether formatting changed them.
  async fn hash_unformatted(&self, items: &mut [FileItem]) -> Result<()> {
    let paths = items
      .iter()
      .filter(|item| item.before_hash.is_none())
      .map(|item| item.path.clone())
      .collect::<Vec<_>>();
    if paths.is_empty() {
      return Ok(());
    }
    let environment = self.environment.clone();
    let hashes = tokio::task::spawn_blocking(move || {
      paths
        .iter()
        .map(|path| {
          let bytes = environment.read_file_bytes(path).with_context(|| format!("Error reading {}.", path.display()))?;
          Ok(get_bytes_hash(&bytes))
        })
        .collect::<Result<Vec<_>>>()
    })
    .await??;
    let mut hashes = hashes.into_iter();
    for item in items.iter_mut().filter(|item| item.before_hash.is_none()) {
      item.before_hash = hashes.next();
    }
    Ok(())
  }
}

/// Sends to a queue, waiting for capacity unless cancelled.
pub async fn send_item<T>(sender: &mpsc::Sender<T>, item: T, token: &CancellationToken) -> Result<()> {
  tokio::select! {
    biased;
    _ = token.cancelled() => Err(CancelledError.into()),
    // the receiver is only dropped early when its task failed
    result = sender.send(item) => result.map_err(|_| CancelledError.into()),
  }
}

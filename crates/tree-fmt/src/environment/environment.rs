use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use super::CanonicalizedPathBuf;
use crate::utils::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
  File,
  Directory,
  Symlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
  pub kind: FileKind,
  pub size: u64,
  /// Nanoseconds since the unix epoch.
  pub modified: u64,
}

impl FileMetadata {
  pub fn is_file(&self) -> bool {
    self.kind == FileKind::File
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
  pub kind: FileKind,
  pub path: PathBuf,
}

/// A single invocation of an external formatter program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
  pub program: PathBuf,
  pub args: Vec<OsString>,
  pub cwd: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
  pub success: bool,
  /// `None` when the process was terminated by a signal.
  pub exit_code: Option<i32>,
  pub stdout: Vec<u8>,
  pub stderr: Vec<u8>,
}

impl CommandOutput {
  /// Stdout followed by stderr, lossily decoded.
  pub fn combined_text(&self) -> String {
    let mut text = String::from_utf8_lossy(&self.stdout).to_string();
    text.push_str(&String::from_utf8_lossy(&self.stderr));
    text
  }
}

pub trait Environment: Clone + Send + Sync + 'static {
  fn read_file_bytes(&self, file_path: impl AsRef<Path>) -> io::Result<Vec<u8>>;
  fn read_file(&self, file_path: impl AsRef<Path>) -> io::Result<String> {
    let bytes = self.read_file_bytes(&file_path)?;
    String::from_utf8(bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
  }
  fn write_file_bytes(&self, file_path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()>;
  fn write_file(&self, file_path: impl AsRef<Path>, file_text: &str) -> io::Result<()> {
    self.write_file_bytes(file_path, file_text.as_bytes())
  }
  /// Writes to a temporary file beside the destination, then renames it over the destination.
  fn atomic_write_file_bytes(&self, file_path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()>;
  fn remove_file(&self, file_path: impl AsRef<Path>) -> io::Result<()>;
  fn mk_dir_all(&self, path: impl AsRef<Path>) -> io::Result<()>;
  /// Metadata of the path itself. Symlinks are not followed.
  fn file_metadata(&self, path: impl AsRef<Path>) -> io::Result<FileMetadata>;
  fn dir_info(&self, dir_path: impl AsRef<Path>) -> io::Result<Vec<DirEntry>>;
  fn path_exists(&self, path: impl AsRef<Path>) -> bool {
    self.file_metadata(path).is_ok()
  }
  fn path_is_file(&self, path: impl AsRef<Path>) -> bool {
    self.file_metadata(path).map(|m| m.kind != FileKind::Directory).unwrap_or(false)
  }
  fn canonicalize(&self, path: impl AsRef<Path>) -> io::Result<CanonicalizedPathBuf>;
  fn cwd(&self) -> io::Result<CanonicalizedPathBuf>;
  fn var(&self, name: &str) -> Option<String>;
  fn get_cache_dir(&self) -> PathBuf;
  fn log_level(&self) -> LogLevel;
  /// Logs to stdout unless stdout is machine readable or logging is silent.
  fn log(&self, text: &str);
  fn log_stderr(&self, text: &str) {
    self.log_stderr_with_context(text, "tree-fmt");
  }
  /// Logs to stderr, outputting a `[context_name]` header when the context changes.
  fn log_stderr_with_context(&self, text: &str, context_name: &str);
  /// Writes the bytes to stdout as-is.
  fn write_stdout_bytes(&self, bytes: &[u8]) -> io::Result<()>;
  /// Runs a short lived helper command to completion, blocking the current thread.
  fn run_command_output(&self, program: &str, args: &[&str], cwd: &Path) -> io::Result<CommandOutput>;
  /// Runs a formatter program, capturing its output. The process is killed when the token is cancelled.
  fn run_formatter(&self, invocation: CommandInvocation, token: CancellationToken) -> impl Future<Output = io::Result<CommandOutput>> + Send;
}

// use macros here so the expression provided is only evaluated when the level is enabled

macro_rules! log_debug {
  ($environment:expr, $($arg:tt)*) => {
    if $environment.log_level().is_enabled($crate::utils::LogLevel::Debug) {
      let text = format!($($arg)*);
      $environment.log_stderr(&text);
    }
  }
}

macro_rules! log_info {
  ($environment:expr, $($arg:tt)*) => {
    if $environment.log_level().is_enabled($crate::utils::LogLevel::Info) {
      let text = format!($($arg)*);
      $environment.log_stderr(&text);
    }
  }
}

macro_rules! log_warn {
  ($environment:expr, $($arg:tt)*) => {
    if $environment.log_level().is_enabled($crate::utils::LogLevel::Warn) {
      let text = format!($($arg)*);
      $environment.log_stderr(&text);
    }
  }
}

macro_rules! log_error {
  ($environment:expr, $($arg:tt)*) => {
    if $environment.log_level().is_enabled($crate::utils::LogLevel::Error) {
      let text = format!($($arg)*);
      $environment.log_stderr(&text);
    }
  }
}

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use super::CanonicalizedPathBuf;
use super::CommandInvocation;
use super::CommandOutput;
use super::DirEntry;
use super::Environment;
use super::FileKind;
use super::FileMetadata;
use crate::utils::LogLevel;
use crate::utils::Logger;
use crate::utils::LoggerOptions;

pub struct RealEnvironmentOptions {
  pub log_level: LogLevel,
  pub is_stdout_machine_readable: bool,
}

#[derive(Clone)]
pub struct RealEnvironment {
  logger: Logger,
}

impl RealEnvironment {
  pub fn new(options: &RealEnvironmentOptions) -> RealEnvironment {
    RealEnvironment {
      logger: Logger::new(&LoggerOptions {
        initial_context_name: "tree-fmt".to_string(),
        is_stdout_machine_readable: options.is_stdout_machine_readable,
        log_level: options.log_level,
      }),
    }
  }
}

impl Environment for RealEnvironment {
  fn read_file_bytes(&self, file_path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
    fs::read(file_path)
  }

  fn write_file_bytes(&self, file_path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    log_debug!(self, "Writing file: {}", file_path.as_ref().display());
    fs::write(file_path, bytes)
  }

  fn atomic_write_file_bytes(&self, file_path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    let file_path = file_path.as_ref();
    log_debug!(self, "Atomically writing file: {}", file_path.display());
    let temp_file_path = {
      let mut file_name = file_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
      file_name.push(format!(".{:x}.tmp", rand::random::<u32>()));
      file_path.with_file_name(file_name)
    };
    fs::write(&temp_file_path, bytes)?;
    if let Err(err) = fs::rename(&temp_file_path, file_path) {
      let _ = fs::remove_file(&temp_file_path);
      return Err(err);
    }
    Ok(())
  }

  fn remove_file(&self, file_path: impl AsRef<Path>) -> io::Result<()> {
    log_debug!(self, "Deleting file: {}", file_path.as_ref().display());
    fs::remove_file(file_path)
  }

  fn mk_dir_all(&self, path: impl AsRef<Path>) -> io::Result<()> {
    fs::create_dir_all(path)
  }

  fn file_metadata(&self, path: impl AsRef<Path>) -> io::Result<FileMetadata> {
    let metadata = fs::symlink_metadata(path)?;
    let file_type = metadata.file_type();
    let kind = if file_type.is_symlink() {
      FileKind::Symlink
    } else if file_type.is_dir() {
      FileKind::Directory
    } else {
      FileKind::File
    };
    let modified = metadata
      .modified()
      .ok()
      .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
      .map(|duration| duration.as_nanos() as u64)
      .unwrap_or(0);
    Ok(FileMetadata {
      kind,
      size: metadata.len(),
      modified,
    })
  }

  fn dir_info(&self, dir_path: impl AsRef<Path>) -> io::Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir_path)? {
      let entry = entry?;
      let file_type = entry.file_type()?;
      let kind = if file_type.is_symlink() {
        FileKind::Symlink
      } else if file_type.is_dir() {
        FileKind::Directory
      } else {
        FileKind::File
      };
      entries.push(DirEntry { kind, path: entry.path() });
    }
    Ok(entries)
  }

  fn canonicalize(&self, path: impl AsRef<Path>) -> io::Result<CanonicalizedPathBuf> {
    // use dunce to avoid unc paths on windows
    Ok(CanonicalizedPathBuf::new(dunce::canonicalize(path)?))
  }

  fn cwd(&self) -> io::Result<CanonicalizedPathBuf> {
    self.canonicalize(std::env::current_dir()?)
  }

  fn var(&self, name: &str) -> Option<String> {
    std::env::var(name).ok()
  }

  fn get_cache_dir(&self) -> PathBuf {
    if let Some(dir) = self.var("TREE_FMT_CACHE_DIR").filter(|d| !d.trim().is_empty()) {
      return PathBuf::from(dir);
    }
    dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("tree-fmt")
  }

  fn log_level(&self) -> LogLevel {
    self.logger.log_level()
  }

  fn log(&self, text: &str) {
    self.logger.log(text, "tree-fmt");
  }

  fn log_stderr_with_context(&self, text: &str, context_name: &str) {
    self.logger.log_stderr_with_context(text, context_name);
  }

  fn write_stdout_bytes(&self, bytes: &[u8]) -> io::Result<()> {
    self.logger.write_stdout_bytes(bytes)
  }

  fn run_command_output(&self, program: &str, args: &[&str], cwd: &Path) -> io::Result<CommandOutput> {
    log_debug!(self, "Running {} {} in {}", program, args.join(" "), cwd.display());
    let output = std::process::Command::new(program)
      .args(args)
      .current_dir(cwd)
      .stdin(Stdio::null())
      .output()?;
    Ok(to_command_output(output))
  }

  fn run_formatter(&self, invocation: CommandInvocation, token: CancellationToken) -> impl Future<Output = io::Result<CommandOutput>> + Send {
    async move {
      let mut command = tokio::process::Command::new(&invocation.program);
      command
        .args(&invocation.args)
        .current_dir(&invocation.cwd)
        .stdin(Stdio::null())
        // dropping the output future on cancellation kills the process
        .kill_on_drop(true);
      tokio::select! {
        _ = token.cancelled() => Err(io::Error::new(io::ErrorKind::Interrupted, "formatter invocation was cancelled")),
        output = command.output() => output.map(to_command_output),
      }
    }
  }
}

fn to_command_output(output: std::process::Output) -> CommandOutput {
  CommandOutput {
    success: output.status.success(),
    exit_code: output.status.code(),
    stdout: output.stdout,
    stderr: output.stderr,
  }
}

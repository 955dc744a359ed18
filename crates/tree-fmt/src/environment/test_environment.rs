use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::CanonicalizedPathBuf;
use super::CommandInvocation;
use super::CommandOutput;
use super::DirEntry;
use super::Environment;
use super::FileKind;
use super::FileMetadata;
use crate::utils::LogLevel;

type FormatterHandler = Arc<dyn Fn(&TestEnvironment, &CommandInvocation) -> CommandOutput + Send + Sync>;

#[derive(Clone)]
struct TestFile {
  kind: FileKind,
  bytes: Vec<u8>,
  modified: u64,
}

#[derive(Clone)]
pub struct TestEnvironment {
  log_level: Arc<Mutex<LogLevel>>,
  cwd: Arc<Mutex<PathBuf>>,
  files: Arc<Mutex<BTreeMap<PathBuf, TestFile>>>,
  directories: Arc<Mutex<BTreeSet<PathBuf>>>,
  clock: Arc<AtomicU64>,
  env_vars: Arc<Mutex<HashMap<String, String>>>,
  formatters: Arc<Mutex<HashMap<PathBuf, FormatterHandler>>>,
  invocations: Arc<Mutex<Vec<CommandInvocation>>>,
  command_outputs: Arc<Mutex<HashMap<String, CommandOutput>>>,
  stdout_messages: Arc<Mutex<Vec<String>>>,
  stderr_messages: Arc<Mutex<Vec<String>>>,
  stdout_bytes: Arc<Mutex<Vec<u8>>>,
  atomic_writes: Arc<Mutex<Vec<PathBuf>>>,
  is_stdout_machine_readable: Arc<Mutex<bool>>,
}

impl Default for TestEnvironment {
  fn default() -> Self {
    Self::new()
  }
}

impl TestEnvironment {
  pub fn new() -> TestEnvironment {
    let environment = TestEnvironment {
      log_level: Default::default(),
      cwd: Arc::new(Mutex::new(PathBuf::from("/"))),
      files: Default::default(),
      directories: Default::default(),
      clock: Default::default(),
      env_vars: Default::default(),
      formatters: Default::default(),
      invocations: Default::default(),
      command_outputs: Default::default(),
      stdout_messages: Default::default(),
      stderr_messages: Default::default(),
      stdout_bytes: Default::default(),
      atomic_writes: Default::default(),
      is_stdout_machine_readable: Default::default(),
    };
    environment.set_env_var("PATH", "/bin");
    environment
  }

  pub fn take_stdout_messages(&self) -> Vec<String> {
    self.stdout_messages.lock().drain(..).collect()
  }

  pub fn take_stderr_messages(&self) -> Vec<String> {
    self.stderr_messages.lock().drain(..).collect()
  }

  pub fn take_stdout_bytes(&self) -> Vec<u8> {
    self.stdout_bytes.lock().drain(..).collect()
  }

  /// Paths written with `atomic_write_file_bytes`, in order.
  pub fn take_atomic_writes(&self) -> Vec<PathBuf> {
    self.atomic_writes.lock().drain(..).collect()
  }

  pub fn set_stdout_machine_readable(&self, value: bool) {
    *self.is_stdout_machine_readable.lock() = value;
  }

  pub fn set_log_level(&self, log_level: LogLevel) {
    *self.log_level.lock() = log_level;
  }

  pub fn set_cwd(&self, new_path: impl AsRef<Path>) {
    let new_path = self.clean_path(new_path);
    self.directories.lock().insert(new_path.clone());
    *self.cwd.lock() = new_path;
  }

  pub fn set_env_var(&self, name: &str, value: &str) {
    self.env_vars.lock().insert(name.to_string(), value.to_string());
  }

  pub fn add_symlink(&self, path: impl AsRef<Path>) {
    let path = self.clean_path(path);
    let modified = self.tick();
    self.files.lock().insert(
      path,
      TestFile {
        kind: FileKind::Symlink,
        bytes: Vec::new(),
        modified,
      },
    );
  }

  /// Advances the file's modification time without changing its content.
  pub fn touch(&self, path: impl AsRef<Path>) {
    let path = self.clean_path(path);
    let modified = self.tick();
    if let Some(file) = self.files.lock().get_mut(&path) {
      file.modified = modified;
    }
  }

  /// Registers a fake formatter program at `program`.
  ///
  /// Arguments naming an existing file are treated as the files to format
  /// and everything else as options. Each file's text is replaced with the
  /// result of `format`, and an `Err` fails the invocation with its message.
  pub fn add_formatter(&self, program: impl AsRef<Path>, format: impl Fn(&str, &[String]) -> Result<String, String> + Send + Sync + 'static) {
    self.add_formatter_handler(program, move |environment, invocation| {
      let mut options = Vec::new();
      let mut paths = Vec::new();
      for arg in &invocation.args {
        let path = PathBuf::from(arg);
        if path.is_absolute() && environment.path_is_file(&path) {
          paths.push(path);
        } else {
          options.push(arg.to_string_lossy().to_string());
        }
      }
      for path in paths {
        let result = environment
          .read_file(&path)
          .map_err(|err| err.to_string())
          .and_then(|text| format(&text, &options).map(|formatted| (text, formatted)));
        match result {
          Ok((text, formatted)) => {
            if text != formatted {
              environment.write_file(&path, &formatted).unwrap();
            }
          }
          Err(message) => {
            return CommandOutput {
              success: false,
              exit_code: Some(1),
              stdout: Vec::new(),
              stderr: message.into_bytes(),
            };
          }
        }
      }
      CommandOutput {
        success: true,
        exit_code: Some(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
      }
    });
  }

  pub fn add_formatter_handler(&self, program: impl AsRef<Path>, handler: impl Fn(&TestEnvironment, &CommandInvocation) -> CommandOutput + Send + Sync + 'static) {
    let program = self.clean_path(program);
    // the executable's metadata contributes to the formatter signature
    let bytes = format!("fake formatter {}", self.tick()).into_bytes();
    self.write_file_bytes(&program, &bytes).unwrap();
    self.formatters.lock().insert(program, Arc::new(handler));
  }

  /// Sets the output of a helper command such as `git ls-files -z`.
  pub fn set_command_output(&self, command_line: &str, stdout: &[u8]) {
    self.command_outputs.lock().insert(
      command_line.to_string(),
      CommandOutput {
        success: true,
        exit_code: Some(0),
        stdout: stdout.to_vec(),
        stderr: Vec::new(),
      },
    );
  }

  pub fn take_invocations(&self) -> Vec<CommandInvocation> {
    self.invocations.lock().drain(..).collect()
  }

  pub fn run_in_runtime<T>(&self, future: impl Future<Output = T>) -> T {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    rt.block_on(future)
  }

  fn tick(&self) -> u64 {
    // use whole seconds so size and mtime comparisons look like a real fs
    (self.clock.fetch_add(1, Ordering::SeqCst) + 1) * 1_000_000_000
  }

  fn clean_path(&self, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let path = if path.is_absolute() { path.to_path_buf() } else { self.cwd.lock().join(path) };
    let mut result = PathBuf::new();
    for component in path.components() {
      match component {
        Component::CurDir => {}
        Component::ParentDir => {
          result.pop();
        }
        _ => result.push(component),
      }
    }
    result
  }

  fn is_dir(&self, path: &Path) -> bool {
    if path == Path::new("/") || self.directories.lock().contains(path) {
      return true;
    }
    let files = self.files.lock();
    files.keys().any(|key| key != path && key.starts_with(path))
  }
}

impl Environment for TestEnvironment {
  fn read_file_bytes(&self, file_path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
    let file_path = self.clean_path(file_path);
    match self.files.lock().get(&file_path) {
      Some(file) if file.kind == FileKind::File => Ok(file.bytes.clone()),
      _ => Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("Could not find file at path {}", file_path.display()),
      )),
    }
  }

  fn write_file_bytes(&self, file_path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    let file_path = self.clean_path(file_path);
    let modified = self.tick();
    self.files.lock().insert(
      file_path,
      TestFile {
        kind: FileKind::File,
        bytes: bytes.to_vec(),
        modified,
      },
    );
    Ok(())
  }

  fn atomic_write_file_bytes(&self, file_path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    self.atomic_writes.lock().push(self.clean_path(&file_path));
    self.write_file_bytes(file_path, bytes)
  }

  fn remove_file(&self, file_path: impl AsRef<Path>) -> io::Result<()> {
    let file_path = self.clean_path(file_path);
    match self.files.lock().remove(&file_path) {
      Some(_) => Ok(()),
      None => Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("Could not find file at path {}", file_path.display()),
      )),
    }
  }

  fn mk_dir_all(&self, path: impl AsRef<Path>) -> io::Result<()> {
    let path = self.clean_path(path);
    self.directories.lock().insert(path);
    Ok(())
  }

  fn file_metadata(&self, path: impl AsRef<Path>) -> io::Result<FileMetadata> {
    let path = self.clean_path(path);
    if let Some(file) = self.files.lock().get(&path) {
      return Ok(FileMetadata {
        kind: file.kind,
        size: file.bytes.len() as u64,
        modified: file.modified,
      });
    }
    if self.is_dir(&path) {
      Ok(FileMetadata {
        kind: FileKind::Directory,
        size: 0,
        modified: 0,
      })
    } else {
      Err(io::Error::new(io::ErrorKind::NotFound, format!("Path not found: {}", path.display())))
    }
  }

  fn dir_info(&self, dir_path: impl AsRef<Path>) -> io::Result<Vec<DirEntry>> {
    let dir_path = self.clean_path(dir_path);
    if !self.is_dir(&dir_path) {
      return Err(io::Error::new(io::ErrorKind::NotFound, format!("Directory not found: {}", dir_path.display())));
    }
    let mut entries = BTreeMap::new();
    let child_of = |path: &Path| -> Option<PathBuf> {
      let relative = path.strip_prefix(&dir_path).ok()?;
      let first = relative.components().next()?;
      Some(dir_path.join(first))
    };
    for (path, file) in self.files.lock().iter() {
      if let Some(child) = child_of(path) {
        let kind = if &child == path { file.kind } else { FileKind::Directory };
        entries.insert(child, kind);
      }
    }
    for path in self.directories.lock().iter() {
      if let Some(child) = child_of(path) {
        entries.insert(child, FileKind::Directory);
      }
    }
    Ok(entries.into_iter().map(|(path, kind)| DirEntry { kind, path }).collect())
  }

  fn canonicalize(&self, path: impl AsRef<Path>) -> io::Result<CanonicalizedPathBuf> {
    let path = self.clean_path(path);
    if self.path_exists(&path) {
      Ok(CanonicalizedPathBuf::new(path))
    } else {
      Err(io::Error::new(io::ErrorKind::NotFound, format!("Path not found: {}", path.display())))
    }
  }

  fn cwd(&self) -> io::Result<CanonicalizedPathBuf> {
    Ok(CanonicalizedPathBuf::new(self.cwd.lock().clone()))
  }

  fn var(&self, name: &str) -> Option<String> {
    self.env_vars.lock().get(name).cloned()
  }

  fn get_cache_dir(&self) -> PathBuf {
    PathBuf::from("/cache")
  }

  fn log_level(&self) -> LogLevel {
    *self.log_level.lock()
  }

  fn log(&self, text: &str) {
    if *self.is_stdout_machine_readable.lock() {
      return;
    }
    self.stdout_messages.lock().push(text.to_string());
  }

  fn log_stderr_with_context(&self, text: &str, _: &str) {
    self.stderr_messages.lock().push(text.to_string());
  }

  fn write_stdout_bytes(&self, bytes: &[u8]) -> io::Result<()> {
    self.stdout_bytes.lock().extend_from_slice(bytes);
    Ok(())
  }

  fn run_command_output(&self, program: &str, args: &[&str], _cwd: &Path) -> io::Result<CommandOutput> {
    let command_line = std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ");
    match self.command_outputs.lock().get(&command_line) {
      Some(output) => Ok(output.clone()),
      None => Err(io::Error::new(io::ErrorKind::NotFound, format!("{} is not available in the test environment", program))),
    }
  }

  fn run_formatter(&self, invocation: CommandInvocation, token: CancellationToken) -> impl Future<Output = io::Result<CommandOutput>> + Send {
    let environment = self.clone();
    async move {
      if token.is_cancelled() {
        return Err(io::Error::new(io::ErrorKind::Interrupted, "formatter invocation was cancelled"));
      }
      let program = environment.clean_path(&invocation.program);
      let handler = environment.formatters.lock().get(&program).cloned();
      let Some(handler) = handler else {
        return Err(io::Error::new(io::ErrorKind::NotFound, format!("Program not found: {}", program.display())));
      };
      environment.invocations.lock().push(invocation.clone());
      // yield so other stages get a chance to run between invocations
      tokio::task::yield_now().await;
      Ok(handler(&environment, &invocation))
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn lists_directories_derived_from_files() {
    let environment = TestEnvironment::new();
    environment.write_file("/tree/a.txt", "a").unwrap();
    environment.write_file("/tree/sub/b.txt", "b").unwrap();
    environment.add_symlink("/tree/link");
    let entries = environment.dir_info("/tree").unwrap();
    assert_eq!(
      entries,
      vec![
        DirEntry {
          kind: FileKind::File,
          path: PathBuf::from("/tree/a.txt"),
        },
        DirEntry {
          kind: FileKind::Symlink,
          path: PathBuf::from("/tree/link"),
        },
        DirEntry {
          kind: FileKind::Directory,
          path: PathBuf::from("/tree/sub"),
        },
      ]
    );
    assert!(environment.dir_info("/other").is_err());
  }

  #[test]
  fn advances_modified_time_on_write() {
    let environment = TestEnvironment::new();
    environment.write_file("/a.txt", "a").unwrap();
    let first = environment.file_metadata("/a.txt").unwrap();
    environment.write_file("/a.txt", "a").unwrap();
    let second = environment.file_metadata("/a.txt").unwrap();
    assert_eq!(first.size, second.size);
    assert!(second.modified > first.modified);
  }

  #[test]
  fn resolves_relative_paths_against_cwd() {
    let environment = TestEnvironment::new();
    environment.set_cwd("/tree/sub");
    environment.write_file("../a.txt", "a").unwrap();
    assert_eq!(environment.read_file("/tree/a.txt").unwrap(), "a");
    assert_eq!(environment.canonicalize("./../a.txt").unwrap().as_path(), Path::new("/tree/a.txt"));
  }
}

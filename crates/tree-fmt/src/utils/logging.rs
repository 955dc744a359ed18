use parking_lot::Mutex;
use std::io::Stderr;
use std::io::Stdout;
use std::io::Write;
use std::io::stderr;
use std::io::stdout;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
  Debug,
  #[default]
  Info,
  Warn,
  Error,
  Silent,
}

impl LogLevel {
  pub fn parse(text: &str) -> Option<LogLevel> {
    match text.to_lowercase().as_str() {
      "debug" => Some(LogLevel::Debug),
      "info" => Some(LogLevel::Info),
      "warn" => Some(LogLevel::Warn),
      "error" => Some(LogLevel::Error),
      "silent" => Some(LogLevel::Silent),
      _ => None,
    }
  }

  /// If a message logged at `level` should be output.
  #[inline]
  pub fn is_enabled(&self, level: LogLevel) -> bool {
    level != LogLevel::Silent && level >= *self
  }
}

#[derive(Clone)]
pub struct LoggerOptions {
  pub initial_context_name: String,
  /// Whether stdout will be read by a program.
  pub is_stdout_machine_readable: bool,
  pub log_level: LogLevel,
}

#[derive(Clone)]
pub struct Logger {
  output_lock: Arc<Mutex<LoggerState>>,
  is_stdout_machine_readable: bool,
  log_level: LogLevel,
}

struct LoggerState {
  last_context_name: String,
  std_out: Stdout,
  std_err: Stderr,
}

impl Logger {
  pub fn new(options: &LoggerOptions) -> Self {
    Logger {
      output_lock: Arc::new(Mutex::new(LoggerState {
        last_context_name: options.initial_context_name.clone(),
        std_out: stdout(),
        std_err: stderr(),
      })),
      is_stdout_machine_readable: options.is_stdout_machine_readable,
      log_level: options.log_level,
    }
  }

  #[inline]
  pub fn log_level(&self) -> LogLevel {
    self.log_level
  }

  pub fn log(&self, text: &str, context_name: &str) {
    if self.is_stdout_machine_readable || self.log_level == LogLevel::Silent {
      return;
    }
    let mut state = self.output_lock.lock();
    self.inner_log(&mut state, true, text, context_name);
  }

  pub fn log_stderr_with_context(&self, text: &str, context_name: &str) {
    let mut state = self.output_lock.lock();
    self.inner_log(&mut state, false, text, context_name);
  }

  pub fn write_stdout_bytes(&self, bytes: &[u8]) -> std::io::Result<()> {
    let mut state = self.output_lock.lock();
    state.std_out.write_all(bytes)?;
    state.std_out.flush()
  }

  fn inner_log(&self, state: &mut LoggerState, is_std_out: bool, text: &str, context_name: &str) {
    let mut output_text = String::new();
    if state.last_context_name != context_name {
      // don't output this if stdout is machine readable
      if !is_std_out || !self.is_stdout_machine_readable {
        output_text.push_str(&format!("[{}]\n", context_name));
      }
      state.last_context_name = context_name.to_string();
    }

    output_text.push_str(text);

    // only add a newline if the logged text does not end with one
    if !output_text.ends_with('\n') {
      output_text.push('\n');
    }

    // a closed pipe shouldn't crash the process
    if is_std_out {
      let _ = write!(state.std_out, "{}", output_text);
      let _ = state.std_out.flush();
    } else {
      let _ = write!(state.std_err, "{}", output_text);
      let _ = state.std_err.flush();
    }
  }
}

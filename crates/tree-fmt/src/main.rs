#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]

#[macro_use]
mod environment;

use crossterm::style::Stylize;
use environment::RealEnvironment;
use environment::RealEnvironmentOptions;
use run_cli::AppError;
use tokio_util::sync::CancellationToken;
use utils::LogLevel;
use utils::RealStdInReader;

mod arg_parser;
mod cache;
mod commands;
mod configuration;
mod format;
mod formatters;
mod run_cli;
mod stats;
mod utils;
mod walk;

#[cfg(test)]
mod test_helpers;

fn main() {
  let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
    Ok(rt) => rt,
    Err(err) => exit_with_error(AppError::from(anyhow::Error::from(err)), LogLevel::Info),
  };
  let result = rt.block_on(run());
  // don't wait on formatter processes that ignored the kill
  rt.shutdown_background();
  if let Err((err, log_level)) = result {
    exit_with_error(err, log_level);
  }
}

async fn run() -> Result<(), (AppError, LogLevel)> {
  let args = arg_parser::parse_args(std::env::args().collect(), RealStdInReader).map_err(|err| (err.into(), LogLevel::Info))?;

  let environment = RealEnvironment::new(&RealEnvironmentOptions {
    log_level: args.log_level,
    is_stdout_machine_readable: args.is_stdout_machine_readable(),
  });
  let token = CancellationToken::new();
  tokio::spawn({
    let token = token.clone();
    async move {
      wait_for_exit_signal().await;
      token.cancel();
    }
  });

  run_cli::run_cli(&args, &environment, token).await.map_err(|err| (err, args.log_level))
}

/// Resolves when Ctrl+C or SIGTERM is received. Pends forever when the handlers can't be installed.
#[cfg(unix)]
async fn wait_for_exit_signal() {
  use tokio::signal::unix::SignalKind;
  use tokio::signal::unix::signal;

  let interrupt = async {
    if tokio::signal::ctrl_c().await.is_err() {
      std::future::pending::<()>().await;
    }
  };
  let terminate = async {
    match signal(SignalKind::terminate()) {
      Ok(mut terminate) => {
        terminate.recv().await;
      }
      Err(_) => std::future::pending::<()>().await,
    }
  };
  tokio::select! {
    _ = interrupt => {}
    _ = terminate => {}
  }
}

#[cfg(not(unix))]
async fn wait_for_exit_signal() {
  if tokio::signal::ctrl_c().await.is_err() {
    std::future::pending::<()>().await;
  }
}

fn exit_with_error(err: AppError, log_level: LogLevel) -> ! {
  if log_level != LogLevel::Silent {
    let result = format!("{:#}", err.inner);
    #[allow(clippy::print_stderr)]
    if !result.is_empty() {
      eprintln!("{} {}", "Error:".red().bold(), result);
    }
  }
  std::process::exit(err.exit_code);
}

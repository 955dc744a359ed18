use anyhow::Result;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::arg_parser::CliArgs;
use crate::arg_parser::ParseArgsError;
use crate::arg_parser::SubCommand;
use crate::cache::CacheError;
use crate::commands;
use crate::configuration::ConfigurationError;
use crate::environment::Environment;
use crate::format::UnexpectedChangesError;
use crate::format::UnmatchedPathError;
use crate::formatters::FormatterExecutionFailedError;
use crate::formatters::FormatterNotFoundError;
use crate::formatters::GraphError;
use crate::walk::PathNotFoundError;

#[derive(Debug, Error)]
#[error("{inner:#}")]
pub struct AppError {
  pub inner: anyhow::Error,
  pub exit_code: i32,
}

impl From<ParseArgsError> for AppError {
  fn from(inner: ParseArgsError) -> Self {
    Self {
      inner: inner.into(),
      exit_code: 10,
    }
  }
}

impl From<anyhow::Error> for AppError {
  fn from(inner: anyhow::Error) -> Self {
    let exit_code = get_exit_code(&inner);
    Self { inner, exit_code }
  }
}

fn get_exit_code(err: &anyhow::Error) -> i32 {
  if err.downcast_ref::<ParseArgsError>().is_some() {
    10
  } else if err.downcast_ref::<ConfigurationError>().is_some() || err.downcast_ref::<GraphError>().is_some() {
    11
  } else if err.downcast_ref::<FormatterNotFoundError>().is_some() {
    12
  } else if err.downcast_ref::<FormatterExecutionFailedError>().is_some() {
    13
  } else if err.downcast_ref::<PathNotFoundError>().is_some() {
    14
  } else if err.downcast_ref::<CacheError>().is_some() {
    15
  } else if err.downcast_ref::<UnmatchedPathError>().is_some() {
    16
  } else if err.downcast_ref::<UnexpectedChangesError>().is_some() {
    20
  } else {
    1
  }
}

pub async fn run_cli<TEnvironment: Environment>(args: &CliArgs, environment: &TEnvironment, token: CancellationToken) -> Result<(), AppError> {
  match &args.sub_command {
    SubCommand::Version => {
      commands::output_version(environment);
      Ok(())
    }
    SubCommand::Help(text) => {
      environment.log(text);
      Ok(())
    }
    SubCommand::Init => Ok(commands::init_config_file(args, environment)?),
    SubCommand::Format(cmd) => Ok(commands::format(cmd, args, environment, token).await?),
    SubCommand::StdInFmt(cmd) => Ok(commands::stdin_fmt(cmd, args, environment, token).await?),
  }
}

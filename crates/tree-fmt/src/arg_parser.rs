use anyhow::Result;
use anyhow::bail;
use clap::ArgMatches;
use thiserror::Error;

use crate::configuration::OnUnmatched;
use crate::configuration::WalkKind;
use crate::utils::LogLevel;
use crate::utils::StdInReader;

pub struct CliArgs {
  pub sub_command: SubCommand,
  pub log_level: LogLevel,
  pub config: Option<String>,
  pub tree_root: Option<String>,
  pub working_dir: Option<String>,
  pub clear_cache: bool,
  pub no_cache: bool,
  pub fail_on_change: bool,
  pub allow_missing_formatter: bool,
  pub formatters: Vec<String>,
  pub walk: Option<WalkKind>,
  pub on_unmatched: Option<OnUnmatched>,
}

impl CliArgs {
  #[cfg(test)]
  pub fn empty() -> Self {
    Self::new_with_sub_command(SubCommand::Format(FormatSubCommand::default()))
  }

  pub fn is_stdout_machine_readable(&self) -> bool {
    // the formatted text is written to stdout
    matches!(self.sub_command, SubCommand::StdInFmt(..))
  }

  fn new_with_sub_command(sub_command: SubCommand) -> CliArgs {
    CliArgs {
      sub_command,
      log_level: LogLevel::Info,
      config: None,
      tree_root: None,
      working_dir: None,
      clear_cache: false,
      no_cache: false,
      fail_on_change: false,
      allow_missing_formatter: false,
      formatters: Vec::new(),
      walk: None,
      on_unmatched: None,
    }
  }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SubCommand {
  Format(FormatSubCommand),
  StdInFmt(StdInFmtSubCommand),
  Help(String),
  Init,
  Version,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FormatSubCommand {
  /// Files or directories to format. Everything in the tree when empty.
  pub paths: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct StdInFmtSubCommand {
  pub file_path: String,
  pub file_text: Vec<u8>,
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct ParseArgsError(#[from] anyhow::Error);

pub fn parse_args<TStdInReader: StdInReader>(args: Vec<String>, std_in_reader: TStdInReader) -> Result<CliArgs, ParseArgsError> {
  inner_parse_args(args, std_in_reader).map_err(ParseArgsError)
}

fn inner_parse_args<TStdInReader: StdInReader>(args: Vec<String>, std_in_reader: TStdInReader) -> Result<CliArgs> {
  if args.iter().skip(1).any(|arg| arg == "--help" || arg == "-h") {
    let help_text = create_cli_parser().render_help().to_string();
    return Ok(CliArgs::new_with_sub_command(SubCommand::Help(help_text)));
  }

  let cli_parser = create_cli_parser();
  let matches = cli_parser.try_get_matches_from(&args)?;

  let paths = values_to_vec(matches.get_many("paths"));
  let sub_command = if matches.get_flag("version") {
    SubCommand::Version
  } else if matches.get_flag("init") {
    SubCommand::Init
  } else if matches.get_flag("stdin") {
    if paths.len() != 1 {
      bail!("exactly one path should be specified when using the --stdin flag");
    }
    SubCommand::StdInFmt(StdInFmtSubCommand {
      file_path: paths.into_iter().next().unwrap_or_default(),
      file_text: std_in_reader.read()?,
    })
  } else {
    SubCommand::Format(FormatSubCommand { paths })
  };

  Ok(CliArgs {
    sub_command,
    log_level: parse_log_level(&matches)?,
    config: matches.get_one::<String>("config").map(String::from),
    tree_root: matches.get_one::<String>("tree-root").map(String::from),
    working_dir: matches.get_one::<String>("working-dir").map(String::from),
    clear_cache: matches.get_flag("clear-cache"),
    no_cache: matches.get_flag("no-cache"),
    fail_on_change: matches.get_flag("fail-on-change"),
    allow_missing_formatter: matches.get_flag("allow-missing-formatter"),
    formatters: values_to_vec(matches.get_many("formatters"))
      .iter()
      .flat_map(|value| value.split(','))
      .map(|name| name.trim().to_string())
      .filter(|name| !name.is_empty())
      .collect(),
    walk: matches.get_one::<String>("walk").and_then(|value| WalkKind::parse(value)),
    on_unmatched: matches.get_one::<String>("on-unmatched").and_then(|value| OnUnmatched::parse(value)),
  })
}

fn parse_log_level(matches: &ArgMatches) -> Result<LogLevel> {
  if matches.get_flag("verbose") {
    return Ok(LogLevel::Debug);
  }
  match matches.get_one::<String>("log-level") {
    Some(value) => match LogLevel::parse(value) {
      Some(level) => Ok(level),
      None => bail!("Invalid log level: {}", value),
    },
    None => Ok(LogLevel::Info),
  }
}

fn values_to_vec(values: Option<clap::parser::ValuesRef<String>>) -> Vec<String> {
  values.map(|x| x.map(std::string::ToString::to_string).collect()).unwrap_or_default()
}

pub fn create_cli_parser() -> clap::Command {
  use clap::Arg;
  use clap::ArgAction;
  use clap::Command;

  Command::new("tree-fmt")
    .bin_name("tree-fmt")
    .version(env!("CARGO_PKG_VERSION"))
    .about("Formats a source tree with many formatters in one command.")
    .override_usage("tree-fmt [OPTIONS] [PATHS]...")
    .disable_version_flag(true)
    .after_help(
      r#"ENVIRONMENT VARIABLES:
  TREE_FMT_CACHE_DIR  Directory to store the cache of formatted files.
  TREE_FMT_<OPTION>   Every option may also be set through a variable, for
                      example TREE_FMT_FAIL_ON_CHANGE=true."#,
    )
    .arg(Arg::new("paths").help("Files or directories to format. Defaults to the whole tree.").num_args(0..).action(ArgAction::Append))
    .arg(Arg::new("config").long("config").help("Path to the config file.").num_args(1))
    .arg(
      Arg::new("tree-root")
        .long("tree-root")
        .help("The root directory from which to find files. Defaults to the directory of the config file.")
        .num_args(1),
    )
    .arg(
      Arg::new("working-dir")
        .short('C')
        .long("working-dir")
        .help("Run as if started in this directory instead of the current working directory.")
        .num_args(1),
    )
    .arg(
      Arg::new("clear-cache")
        .short('c')
        .long("clear-cache")
        .help("Reset the cache of formatted files before formatting.")
        .action(ArgAction::SetTrue),
    )
    .arg(
      Arg::new("no-cache")
        .long("no-cache")
        .help("Ignore the cache and format every file.")
        .action(ArgAction::SetTrue),
    )
    .arg(
      Arg::new("fail-on-change")
        .long("fail-on-change")
        .help("Exit with an error if any files were changed by the formatters.")
        .action(ArgAction::SetTrue),
    )
    .arg(
      Arg::new("allow-missing-formatter")
        .long("allow-missing-formatter")
        .help("Skip formatters whose command can't be found instead of failing.")
        .action(ArgAction::SetTrue),
    )
    .arg(
      Arg::new("formatters")
        .short('f')
        .long("formatters")
        .help("Only use these formatters (comma separated).")
        .num_args(1)
        .action(ArgAction::Append),
    )
    .arg(
      Arg::new("walk")
        .long("walk")
        .help("How paths are found in the tree.")
        .value_parser(["auto", "git", "filesystem"])
        .num_args(1),
    )
    .arg(
      Arg::new("on-unmatched")
        .short('u')
        .long("on-unmatched")
        .help("Log level for paths that no formatter matches. Fatal exits with an error.")
        .value_parser(["debug", "info", "warn", "error", "fatal"])
        .num_args(1),
    )
    .arg(
      Arg::new("stdin")
        .long("stdin")
        .help("Format stdin as if it were the single provided path and write the result to stdout.")
        .action(ArgAction::SetTrue),
    )
    .arg(
      Arg::new("log-level")
        .long("log-level")
        .help("Minimum level of the messages to output.")
        .value_parser(["debug", "info", "warn", "error", "silent"])
        .num_args(1),
    )
    .arg(
      Arg::new("verbose")
        .short('v')
        .long("verbose")
        .help("Output debug information. Same as --log-level=debug.")
        .action(ArgAction::SetTrue),
    )
    .arg(
      Arg::new("init")
        .long("init")
        .help("Create a config file in the working directory.")
        .action(ArgAction::SetTrue),
    )
    .arg(
      Arg::new("version")
        .short('V')
        .long("version")
        .help("Print the version.")
        .action(ArgAction::SetTrue),
    )
}

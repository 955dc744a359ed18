use anyhow::Result;
use anyhow::bail;

use crate::arg_parser::CliArgs;
use crate::configuration::POSSIBLE_CONFIG_FILE_NAMES;
use crate::configuration::get_config_file_in_dir;
use crate::configuration::get_init_config_file_text;
use crate::configuration::resolve_working_dir;
use crate::environment::Environment;

pub fn output_version(environment: &impl Environment) {
  environment.log(&format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")));
}

pub fn init_config_file(args: &CliArgs, environment: &impl Environment) -> Result<()> {
  let working_dir = resolve_working_dir(args, environment)?;
  if let Some(existing) = get_config_file_in_dir(&working_dir, environment) {
    bail!("Configuration file '{}' already exists.", existing.display());
  }
  let config_file_path = working_dir.join(POSSIBLE_CONFIG_FILE_NAMES[0]);
  environment.write_file(&config_file_path, get_init_config_file_text())?;
  environment.log(&format!("Created {}", config_file_path.display()));
  Ok(())
}

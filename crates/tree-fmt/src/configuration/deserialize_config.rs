use super::ConfigFile;
use super::ConfigurationError;

pub fn deserialize_config(config_file_text: &str) -> Result<ConfigFile, ConfigurationError> {
  let value = jsonc_parser::parse_to_serde_value(config_file_text, &Default::default()).map_err(|err| ConfigurationError(err.to_string()))?;
  let value = match value {
    Some(value @ serde_json::Value::Object(_)) => value,
    Some(_) => return Err(ConfigurationError("Expected a root object in the json".to_string())),
    None => return Ok(ConfigFile::default()),
  };
  serde_json::from_value(value).map_err(|err| ConfigurationError(err.to_string()))
}

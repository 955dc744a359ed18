use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use serde_json::json;

use super::Environment;
use super::TestEnvironment;

/// Builds the text of a config file for tests.
#[derive(Default)]
pub struct TestConfigFileBuilder {
  excludes: Option<Vec<String>>,
  on_unmatched: Option<String>,
  walk: Option<String>,
  formatters: Vec<(String, Value)>,
}

impl TestConfigFileBuilder {
  pub fn to_string(&self) -> String {
    let mut root = serde_json::Map::new();
    if let Some(excludes) = &self.excludes {
      root.insert("excludes".to_string(), json!(excludes));
    }
    if let Some(on_unmatched) = &self.on_unmatched {
      root.insert("onUnmatched".to_string(), json!(on_unmatched));
    }
    if let Some(walk) = &self.walk {
      root.insert("walk".to_string(), json!(walk));
    }
    let mut formatters = serde_json::Map::new();
    for (name, value) in &self.formatters {
      formatters.insert(name.clone(), value.clone());
    }
    root.insert("formatters".to_string(), Value::Object(formatters));
    serde_json::to_string_pretty(&Value::Object(root)).unwrap()
  }

  pub fn add_excludes(&mut self, excludes_item: &str) -> &mut Self {
    self.excludes.get_or_insert_with(Vec::new).push(excludes_item.to_string());
    self
  }

  pub fn set_on_unmatched(&mut self, value: &str) -> &mut Self {
    self.on_unmatched = Some(value.to_string());
    self
  }

  pub fn set_walk(&mut self, value: &str) -> &mut Self {
    self.walk = Some(value.to_string());
    self
  }

  /// Adds a formatter section. `value` is the formatter's json object.
  pub fn add_formatter(&mut self, name: &str, value: Value) -> &mut Self {
    match self.formatters.iter_mut().find(|(n, _)| n == name) {
      Some((_, existing)) => *existing = value,
      None => self.formatters.push((name.to_string(), value)),
    }
    self
  }
}

pub struct TestEnvironmentBuilder {
  environment: TestEnvironment,
  config_files: HashMap<String, TestConfigFileBuilder>,
}

impl Default for TestEnvironmentBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl TestEnvironmentBuilder {
  /// Creates an environment whose working directory is `/tree`.
  pub fn new() -> Self {
    let environment = TestEnvironment::new();
    environment.set_cwd("/tree");
    Self {
      environment,
      config_files: HashMap::new(),
    }
  }

  pub fn build(&mut self) -> TestEnvironment {
    self.environment.clone()
  }

  pub fn with_default_config(&mut self, func: impl FnMut(&mut TestConfigFileBuilder)) -> &mut Self {
    self.with_local_config("/tree/tree-fmt.json", func)
  }

  pub fn with_local_config(&mut self, file_path: impl AsRef<Path>, mut func: impl FnMut(&mut TestConfigFileBuilder)) -> &mut Self {
    let key = file_path.as_ref().to_string_lossy().to_string();
    let config_file = self.config_files.entry(key).or_default();
    func(config_file);
    let text = config_file.to_string();
    self.write_file(file_path, &text)
  }

  pub fn write_file(&mut self, file_path: impl AsRef<Path>, text: &str) -> &mut Self {
    self.environment.write_file(file_path, text).unwrap();
    self
  }

  pub fn add_symlink(&mut self, file_path: impl AsRef<Path>) -> &mut Self {
    self.environment.add_symlink(file_path);
    self
  }

  pub fn set_cwd(&mut self, dir_path: &str) -> &mut Self {
    self.environment.set_cwd(dir_path);
    self
  }

  pub fn set_env_var(&mut self, name: &str, value: &str) -> &mut Self {
    self.environment.set_env_var(name, value);
    self
  }

  pub fn add_formatter(&mut self, program: impl AsRef<Path>, format: impl Fn(&str, &[String]) -> Result<String, String> + Send + Sync + 'static) -> &mut Self {
    self.environment.add_formatter(program, format);
    self
  }

  /// Adds a formatter at `/bin/<name>` that appends a line with its
  /// options (or its name when it has none) to every file it formats.
  pub fn add_appending_formatter(&mut self, name: &str) -> &mut Self {
    let name = name.to_string();
    self.add_formatter(format!("/bin/{}", name), move |text, options| {
      let marker = if options.is_empty() { name.clone() } else { options.join(" ") };
      Ok(format!("{}{}\n", text, marker))
    })
  }

  /// Adds a formatter at `/bin/<name>` that leaves files untouched.
  pub fn add_noop_formatter(&mut self, name: &str) -> &mut Self {
    self.add_formatter(format!("/bin/{}", name), |text, _| Ok(text.to_string()))
  }
}

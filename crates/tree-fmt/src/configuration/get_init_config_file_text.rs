pub fn get_init_config_file_text() -> &'static str {
  r#"{
  // globs excluded from every formatter
  "excludes": [],
  // log level used for paths no formatter matches (debug, info, warn, error or fatal)
  "onUnmatched": "warn",
  "formatters": {
    // "rustfmt": {
    //   "command": "rustfmt",
    //   "options": ["--edition", "2024"],
    //   "includes": ["*.rs"]
    // },
    // "prettier": {
    //   "command": "prettier",
    //   "options": ["--write"],
    //   "includes": ["*.js", "*.ts", "*.md"],
    //   "excludes": ["CHANGELOG.md"],
    //   "priority": 1
    // }
  }
}
"#
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::configuration::OnUnmatched;
  use crate::configuration::deserialize_config;

  #[test]
  fn init_text_is_valid_config() {
    let config = deserialize_config(get_init_config_file_text()).unwrap();
    assert!(config.formatters.is_empty());
    assert_eq!(config.on_unmatched, Some(OnUnmatched::Warn));
  }
}

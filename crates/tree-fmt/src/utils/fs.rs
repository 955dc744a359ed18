use std::path::Path;
use std::path::PathBuf;

use crate::environment::Environment;

/// Resolves the executable for a command.
///
/// Commands containing a path separator are resolved relative to `base_dir`
/// (absolute paths are used as-is). Bare names are searched for in `PATH`.
pub fn resolve_command_path(command: &str, base_dir: &Path, environment: &impl Environment) -> Option<PathBuf> {
  if command.contains('/') || command.contains('\\') {
    let path = base_dir.join(command).components().collect::<PathBuf>();
    return if is_executable_file(&path, environment) { Some(path) } else { None };
  }
  which_global(command, environment)
}

/// If the path resolves to a file once symlinks are followed.
fn is_executable_file(path: &Path, environment: &impl Environment) -> bool {
  environment
    .canonicalize(path)
    .and_then(|resolved| environment.file_metadata(resolved))
    .map(|metadata| metadata.is_file())
    .unwrap_or(false)
}

pub fn which_global(command_name: &str, environment: &impl Environment) -> Option<PathBuf> {
  let mut search_dirs = vec![];
  if let Some(path) = environment.var("PATH") {
    for folder in path.split(if cfg!(windows) { ';' } else { ':' }) {
      if !folder.is_empty() {
        search_dirs.push(PathBuf::from(folder));
      }
    }
  }
  let path_exts = if cfg!(windows) {
    let uc_command_name = command_name.to_uppercase();
    let path_ext = environment.var("PATHEXT").unwrap_or_else(|| ".EXE;.CMD;.BAT;.COM".to_string());
    let command_exts = path_ext
      .split(';')
      .map(|s| s.trim().to_uppercase())
      .filter(|s| !s.is_empty())
      .collect::<Vec<_>>();
    if command_exts.is_empty() || command_exts.iter().any(|ext| uc_command_name.ends_with(ext)) {
      None // use the command name as-is
    } else {
      Some(command_exts)
    }
  } else {
    None
  };

  for search_dir in search_dirs {
    let paths = if let Some(path_exts) = &path_exts {
      let mut paths = Vec::new();
      for path_ext in path_exts {
        paths.push(search_dir.join(format!("{command_name}{path_ext}")))
      }
      paths
    } else {
      vec![search_dir.join(command_name)]
    };
    for path in paths {
      if is_executable_file(&path, environment) {
        return Some(path);
      }
    }
  }

  None
}

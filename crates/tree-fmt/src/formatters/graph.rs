use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use globset::GlobSet;
use indexmap::IndexMap;
use thiserror::Error;

use super::Formatter;
use super::FormatterNotFoundError;
use super::build_glob_set;
use crate::configuration::FormatterConfig;
use crate::environment::Environment;
use crate::utils::FastInsecureHasher;

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("Formatter {formatter} is configured to run before {downstream}, but no formatter named {downstream} exists.")]
  UnknownDownstreamFormatter { formatter: String, downstream: String },
  #[error("Formatter cycle detected: {}", .0.join(" -> "))]
  FormatterCycleDetected(Vec<String>),
  #[error("Formatter {0} was selected, but it is not configured.")]
  UnknownFormatterFilter(String),
  #[error("Invalid glob pattern {pattern} in {owner}: {message}")]
  InvalidPattern { owner: String, pattern: String, message: String },
}

pub struct FormatterGraphOptions<'a> {
  pub formatters: &'a IndexMap<String, FormatterConfig>,
  /// Only instantiate these formatters when provided.
  pub filter: Option<&'a [String]>,
  pub allow_missing_formatter: bool,
  pub global_excludes: &'a [String],
  /// Directory relative commands are resolved from.
  pub base_dir: &'a Path,
}

/// The instantiated formatters in execution order along with their
/// resolved runs-before edges.
///
/// Formatters are stored in an arena sorted topologically by the runs-before
/// relation with ties broken by priority and then declaration order, so an
/// upstream formatter always has a lower index than its downstream.
pub struct FormatterGraph {
  formatters: Vec<Arc<Formatter>>,
  downstream: Vec<Option<usize>>,
  upstreams: Vec<BTreeSet<usize>>,
  global_excludes: GlobSet,
  signature: u64,
}

impl FormatterGraph {
  pub fn build(options: FormatterGraphOptions, environment: &impl Environment) -> Result<FormatterGraph> {
    let configs = options.formatters;
    validate_relations(configs)?;

    let selected = match options.filter {
      Some(filter) => {
        for name in filter {
          if !configs.contains_key(name) {
            return Err(GraphError::UnknownFormatterFilter(name.clone()).into());
          }
        }
        configs.iter().filter(|(name, _)| filter.contains(name)).collect::<Vec<_>>()
      }
      None => configs.iter().collect::<Vec<_>>(),
    };

    // (declaration index, formatter)
    let mut instantiated = Vec::with_capacity(selected.len());
    for (name, config) in selected {
      match Formatter::new(name, config, options.base_dir, environment) {
        Ok(formatter) => instantiated.push((configs.get_index_of(name).unwrap_or_default(), formatter)),
        Err(err) if options.allow_missing_formatter && err.downcast_ref::<FormatterNotFoundError>().is_some() => {
          log_debug!(environment, "Skipping formatter. {:#}", err);
        }
        Err(err) => return Err(err),
      }
    }

    let position_of = |name: &str, instantiated: &[(usize, Formatter)]| instantiated.iter().position(|(_, f)| f.name() == name);
    let declared_downstream = instantiated
      .iter()
      .map(|(_, formatter)| {
        let before = formatter.before()?;
        let position = position_of(before, &instantiated);
        if position.is_none() {
          log_debug!(
            environment,
            "Formatter {} runs before {}, which is not active. Treating it as a root.",
            formatter.name(),
            before
          );
        }
        position
      })
      .collect::<Vec<_>>();

    let order = execution_order(&instantiated, &declared_downstream);
    let mut new_index_of = vec![0; order.len()];
    for (new_index, old_index) in order.iter().enumerate() {
      new_index_of[*old_index] = new_index;
    }

    let mut slots = instantiated.into_iter().map(|(_, formatter)| Some(formatter)).collect::<Vec<_>>();
    let mut formatters = Vec::with_capacity(order.len());
    let mut downstream = Vec::with_capacity(order.len());
    for old_index in &order {
      if let Some(formatter) = slots[*old_index].take() {
        formatters.push(Arc::new(formatter));
      }
      downstream.push(declared_downstream[*old_index].map(|d| new_index_of[d]));
    }
    let mut upstreams = vec![BTreeSet::new(); formatters.len()];
    for (index, child) in downstream.iter().enumerate() {
      if let Some(child) = child {
        upstreams[*child].insert(index);
      }
    }

    let mut hasher = FastInsecureHasher::default();
    for formatter in &formatters {
      hasher.write_hashable(formatter.signature());
    }

    let graph = FormatterGraph {
      global_excludes: build_glob_set(options.global_excludes, "global excludes")?,
      formatters,
      downstream,
      upstreams,
      signature: hasher.finish(),
    };
    log_debug!(
      environment,
      "Formatter execution order: {}",
      graph.formatters.iter().map(|f| f.name()).collect::<Vec<_>>().join(", ")
    );
    Ok(graph)
  }

  pub fn len(&self) -> usize {
    self.formatters.len()
  }

  pub fn is_empty(&self) -> bool {
    self.formatters.is_empty()
  }

  pub fn formatter(&self, index: usize) -> &Arc<Formatter> {
    &self.formatters[index]
  }

  pub fn formatters(&self) -> &[Arc<Formatter>] {
    &self.formatters
  }

  pub fn downstream(&self, index: usize) -> Option<usize> {
    self.downstream[index]
  }

  pub fn upstreams(&self, index: usize) -> &BTreeSet<usize> {
    &self.upstreams[index]
  }

  pub fn is_root(&self, index: usize) -> bool {
    self.upstreams[index].is_empty()
  }

  /// Signature of every active formatter in execution order.
  pub fn signature(&self) -> u64 {
    self.signature
  }

  pub fn is_globally_excluded(&self, relative_path: &str) -> bool {
    self.global_excludes.is_match(relative_path)
  }

  /// Gets the formatters a path flows through, in execution order.
  ///
  /// This is every formatter that wants the path plus the transitive
  /// downstream formatters of those. Empty when nothing matches.
  pub fn route(&self, relative_path: &str) -> Vec<usize> {
    let mut route = BTreeSet::new();
    for (index, formatter) in self.formatters.iter().enumerate() {
      if formatter.wants(relative_path) {
        let mut current = Some(index);
        while let Some(index) = current {
          if !route.insert(index) {
            break;
          }
          current = self.downstream[index];
        }
      }
    }
    route.into_iter().collect()
  }

  /// Signature of the formatters on a route. A change to any of them
  /// invalidates the cached state of the paths taking that route.
  pub fn route_signature(&self, route: &[usize]) -> u64 {
    let mut hasher = FastInsecureHasher::default();
    for index in route {
      hasher.write_hashable(self.formatters[*index].signature());
    }
    hasher.finish()
  }
}

/// Checks every runs-before reference exists and that following them
/// never loops.
fn validate_relations(configs: &IndexMap<String, FormatterConfig>) -> Result<(), GraphError> {
  for (name, config) in configs {
    if let Some(before) = &config.before
      && !configs.contains_key(before)
    {
      return Err(GraphError::UnknownDownstreamFormatter {
        formatter: name.clone(),
        downstream: before.clone(),
      });
    }
  }

  for start in configs.keys() {
    let mut chain = vec![start.as_str()];
    let mut current = start.as_str();
    while let Some(next) = configs.get(current).and_then(|c| c.before.as_deref()) {
      if let Some(position) = chain.iter().position(|name| *name == next) {
        let mut cycle = chain[position..].iter().map(|name| name.to_string()).collect::<Vec<_>>();
        cycle.push(next.to_string());
        return Err(GraphError::FormatterCycleDetected(cycle));
      }
      chain.push(next);
      current = next;
    }
  }

  Ok(())
}

/// Topologically sorts the formatters, picking the ready formatter with the
/// lowest (priority, declaration index) first.
fn execution_order(instantiated: &[(usize, Formatter)], downstream: &[Option<usize>]) -> Vec<usize> {
  let mut in_degree = vec![0; instantiated.len()];
  for child in downstream.iter().flatten() {
    in_degree[*child] += 1;
  }
  let key = |index: usize| (instantiated[index].1.priority(), instantiated[index].0, index);
  let mut ready = (0..instantiated.len()).filter(|i| in_degree[*i] == 0).map(key).collect::<BTreeSet<_>>();
  let mut order = Vec::with_capacity(instantiated.len());
  while let Some((_, _, index)) = ready.pop_first() {
    order.push(index);
    if let Some(child) = downstream[index] {
      in_degree[child] -= 1;
      if in_degree[child] == 0 {
        ready.insert(key(child));
      }
    }
  }
  order
}

//! Config Registry (4.1): scans a directory of YAML workflow documents, maps `id -> path`,
//! and lazily compiles each on first use. Process-scoped singleton guarded by a concurrent map;
//! reads after a given id's first successful [`ConfigRegistry::ensure_loaded`] are lock-free hits.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::workflow::compiler::{compile, CompiledWorkflow};
use crate::workflow::error::ConfigError;
use crate::workflow::protocol::parse::parse;
use crate::workflow::protocol::validate::validate;
use crate::workflow::store_queries::CheckpointStore;

/// Summary row returned by [`ConfigRegistry::list`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConfigSummary {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub agents_count: usize,
    pub nodes_count: usize,
    pub edges_count: usize,
    pub cached: bool,
}

/// Scans a directory for YAML workflow documents and compiles them on first use.
pub struct ConfigRegistry {
    paths: DashMap<i64, PathBuf>,
    compiled: DashMap<i64, Arc<CompiledWorkflow>>,
    store: Arc<dyn CheckpointStore>,
}

impl ConfigRegistry {
    /// Scans `dir` for `*.yaml`/`*.yml` files (skipping any whose stem ends in `.template`),
    /// reading just enough of each to learn its `id`. Malformed files are logged and skipped;
    /// `ensure_loaded` re-surfaces their parse error if ever requested by id.
    pub fn scan(dir: impl AsRef<Path>, store: Arc<dyn CheckpointStore>) -> std::io::Result<Self> {
        let paths = DashMap::new();
        let dir = dir.as_ref();
        if dir.is_dir() {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();
                let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                    continue;
                };
                if ext != "yaml" && ext != "yml" {
                    continue;
                }
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
                if stem.ends_with(".template") {
                    continue;
                }
                match std::fs::read(&path) {
                    Ok(bytes) => match parse(&path.display().to_string(), &bytes) {
                        Ok(protocol) => {
                            paths.insert(protocol.id, path.clone());
                        }
                        Err(e) => warn!(path = %path.display(), error = %e, "skipping unparsable workflow file"),
                    },
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to read workflow file"),
                }
            }
        }
        info!(count = paths.len(), dir = %dir.display(), "config registry scanned");
        Ok(Self {
            paths,
            compiled: DashMap::new(),
            store,
        })
    }

    /// Lists every known config with its metadata and whether its graph is already compiled.
    pub fn list(&self) -> Vec<ConfigSummary> {
        self.paths
            .iter()
            .filter_map(|entry| {
                let id = *entry.key();
                let bytes = std::fs::read(entry.value()).ok()?;
                let protocol = parse(&entry.value().display().to_string(), &bytes).ok()?;
                Some(ConfigSummary {
                    id,
                    name: protocol.protocol.name.clone(),
                    description: protocol.protocol.description.clone(),
                    version: protocol.protocol.version.clone(),
                    author: protocol.protocol.author.clone(),
                    agents_count: protocol.agents.len(),
                    nodes_count: protocol.workflow.nodes.len(),
                    edges_count: protocol.workflow.edges.len(),
                    cached: self.compiled.contains_key(&id),
                })
            })
            .collect()
    }

    /// Idempotent: parses, validates, and compiles the graph for `id` if not already cached,
    /// then returns the (possibly pre-existing) compiled graph.
    pub async fn ensure_loaded(&self, id: i64) -> Result<Arc<CompiledWorkflow>, ConfigError> {
        if let Some(existing) = self.compiled.get(&id) {
            return Ok(existing.clone());
        }
        let path = self
            .paths
            .get(&id)
            .ok_or(ConfigError::UnknownId(id))?
            .clone();
        let bytes = std::fs::read(&path).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let protocol = parse(&path.display().to_string(), &bytes)?;
        let report = validate(&protocol)?;
        for warning in &report.warnings {
            warn!(id, message = %warning.message, "workflow validation warning");
        }
        let graph = compile(protocol, self.store.clone())
            .map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let graph = Arc::new(graph);
        self.compiled.insert(id, graph.clone());
        info!(id, "workflow compiled and cached");
        Ok(graph)
    }

    /// `thread_id` is `<username>_<uuid>_<config_id>`. The suffix after the username/uuid is
    /// matched against known ids; when the suffix itself contains underscores, the longest
    /// known id that suffix-matches wins (tried 3-part, then 2-part, then 1-part).
    pub fn extract_config_id_from_thread_id(&self, thread_id: &str) -> Option<i64> {
        let segments: Vec<&str> = thread_id.split('_').collect();
        for take in [3usize, 2, 1] {
            if segments.len() < take {
                continue;
            }
            let candidate = segments[segments.len() - take..].join("_");
            if let Ok(id) = candidate.parse::<i64>() {
                if self.paths.contains_key(&id) {
                    return Some(id);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::store_queries::MemoryCheckpointStore;

    fn temp_registry(files: &[(&str, &str)]) -> ConfigRegistry {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).expect("write");
        }
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let registry = ConfigRegistry::scan(dir.path(), store).expect("scan");
        std::mem::forget(dir);
        registry
    }

    const MINIMAL: &str = r#"
id: 42
protocol:
  name: demo
workflow:
  nodes:
    - {name: start, type: start}
    - {name: end, type: end}
  edges:
    - {from: start, to: end}
"#;

    #[test]
    fn scan_finds_yaml_files_and_skips_templates() {
        let registry = temp_registry(&[("a.yaml", MINIMAL), ("b.yaml.template", MINIMAL)]);
        let summaries = registry.list();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, 42);
        assert!(!summaries[0].cached);
    }

    #[tokio::test]
    async fn ensure_loaded_is_idempotent() {
        let registry = temp_registry(&[("a.yaml", MINIMAL)]);
        let first = registry.ensure_loaded(42).await.expect("first load");
        let second = registry.ensure_loaded(42).await.expect("second load");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.list()[0].cached);
    }

    #[tokio::test]
    async fn ensure_loaded_unknown_id_errors() {
        let registry = temp_registry(&[("a.yaml", MINIMAL)]);
        let err = registry.ensure_loaded(999).await.unwrap_err();
        assert!(matches!(err, ConfigError::UnknownId(999)));
    }

    #[test]
    fn extract_config_id_from_thread_id_matches_known_suffix() {
        let registry = temp_registry(&[("a.yaml", MINIMAL)]);
        assert_eq!(
            registry.extract_config_id_from_thread_id("alice_abcd1234_42"),
            Some(42)
        );
        assert_eq!(registry.extract_config_id_from_thread_id("alice_abcd1234_7"), None);
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use xlbench_adapters::registry::builtin_names;
use xlbench_adapters::{AdapterRef, AdapterRegistry, Isolation};
use xlbench_model::{BenchmarkResults, Manifest, TestFile};

use crate::config::BenchConfig;
use crate::error::HarnessError;
use crate::isolation::{default_unit_binary, run_isolated};
use crate::pool::{Job, WorkerPool};
use crate::report;
use crate::unit::{faulted, run_unit, UnitRequest};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Runs every selected (fixture, adapter) unit and aggregates the report.
pub struct Orchestrator {
    registry: AdapterRegistry,
    config: BenchConfig,
    test_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(registry: AdapterRegistry, config: BenchConfig, test_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            config,
            test_dir: test_dir.into(),
        }
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn run(&self) -> Result<BenchmarkResults, HarnessError> {
        self.config.validate()?;

        let mut selected = self.registry.clone();
        selected.retain_named(&self.config.run.libraries);
        for name in &self.config.run.libraries {
            if self.registry.get(name).is_none() {
                warn!("unknown adapter in filter: {name}");
            }
        }
        self.check_isolation(&selected)?;

        let manifest = load_manifest(&self.test_dir)?;
        let files = select_files(&manifest, &self.config.run.features)?;

        let platform = self
            .config
            .run
            .platform
            .clone()
            .unwrap_or_else(report::platform_string);
        let reference = self.registry.get(&self.config.adapters.reference_reader);
        if reference.is_none() {
            warn!(
                "reference reader '{}' is not registered; write-only adapters go unverified",
                self.config.adapters.reference_reader
            );
        }

        let jobs: Vec<Job> = files
            .iter()
            .flat_map(|file| selected.iter().map(move |adapter| (*file, adapter)))
            .map(|(file, adapter)| self.job(file, Arc::clone(adapter), reference.clone(), &platform))
            .collect();
        info!(
            "running {} unit(s): {} file(s) x {} adapter(s), {} worker(s)",
            jobs.len(),
            files.len(),
            selected.len(),
            self.config.run.workers
        );

        let pool = WorkerPool::new(self.config.run.workers, self.config.unit_timeout());
        let scores = pool.run(jobs);

        Ok(BenchmarkResults::new(
            report::metadata(&self.config.run.profile, &manifest, &platform),
            selected.iter().map(|a| a.info()),
            scores,
        ))
    }

    fn is_isolated(&self, adapter: &AdapterRef) -> bool {
        adapter.isolation() == Isolation::Subprocess || self.config.forces_isolation(&adapter.name())
    }

    /// The `xlbench-unit` worker can only construct compiled-in adapters.
    fn check_isolation(&self, selected: &AdapterRegistry) -> Result<(), HarnessError> {
        for adapter in selected.iter().filter(|a| self.is_isolated(a)) {
            let name = adapter.name();
            if !builtin_names().any(|b| b == name) {
                return Err(HarnessError::ConfigValidation(format!(
                    "adapter '{name}' cannot run in subprocess isolation: \
                     xlbench-unit only builds in {}",
                    builtin_names().collect::<Vec<_>>().join(", ")
                )));
            }
        }
        Ok(())
    }

    fn job(
        &self,
        file: &TestFile,
        adapter: AdapterRef,
        reference: Option<AdapterRef>,
        platform: &str,
    ) -> Job {
        let request = UnitRequest {
            test_dir: self.test_dir.clone(),
            file: file.clone(),
            library: adapter.name(),
            reference_reader: self.config.adapters.reference_reader.clone(),
            epsilon: self.config.compare.epsilon,
            edge_only: self.config.scoring.edge_only,
            platform: platform.to_string(),
        };
        let label = format!("{}/{}", file.feature, request.library);
        let isolated = self.is_isolated(&adapter);

        let on_fault = {
            let adapter = Arc::clone(&adapter);
            let file = file.clone();
            move |note: String| faulted(adapter.as_ref(), &file, note)
        };

        if isolated {
            let binary = self
                .config
                .adapters
                .unit_binary
                .clone()
                .unwrap_or_else(default_unit_binary);
            let timeout = self.config.unit_timeout();
            Job::new(
                label,
                move || match run_isolated(&binary, &request, timeout) {
                    Ok(score) => score,
                    Err(note) => faulted(adapter.as_ref(), &request.file, note),
                },
                on_fault,
            )
        } else {
            Job::new(
                label,
                move || run_unit(adapter.as_ref(), reference.as_deref(), &request),
                on_fault,
            )
        }
    }
}

fn load_manifest(test_dir: &Path) -> Result<Manifest, HarnessError> {
    let path = test_dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Err(HarnessError::ManifestNotFound(path));
    }
    Ok(Manifest::load(&path)?)
}

/// Files whose feature passes the filter. An empty filter selects all; a
/// filter matching nothing is an error.
fn select_files<'m>(manifest: &'m Manifest, features: &[String]) -> Result<Vec<&'m TestFile>, HarnessError> {
    if features.is_empty() {
        return Ok(manifest.files.iter().collect());
    }
    let files: Vec<&TestFile> = manifest
        .files
        .iter()
        .filter(|f| features.iter().any(|want| *want == f.feature))
        .collect();
    if files.is_empty() {
        return Err(HarnessError::NoMatchingFeatures(features.to_vec()));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> Manifest {
        Manifest::from_json(
            r#"{"files": [
                {"path": "tier1/cells.xlsx", "feature": "cells", "tier": 1, "test_cases": []},
                {"path": "tier1/borders.xlsx", "feature": "borders", "tier": 1, "test_cases": []}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_select_all_files() {
        let m = manifest();
        assert_eq!(select_files(&m, &[]).unwrap().len(), 2);
    }

    #[test]
    fn test_feature_filter() {
        let m = manifest();
        let files = select_files(&m, &["borders".to_string()]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].feature, "borders");
    }

    #[test]
    fn test_feature_filter_without_match() {
        let m = manifest();
        let err = select_files(&m, &["charts".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "No matching features for filter: charts");
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_manifest(dir.path()).unwrap_err();
        assert!(matches!(err, HarnessError::ManifestNotFound(p) if p.ends_with(MANIFEST_FILE)));
    }
}

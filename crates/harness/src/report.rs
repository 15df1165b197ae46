use std::path::Path;

use xlbench_model::results::BENCHMARK_VERSION;
use xlbench_model::{BenchmarkMetadata, BenchmarkResults, Manifest};

use crate::error::HarnessError;

/// `<os>-<arch>` of the running host, e.g. `linux-x86_64`.
pub fn platform_string() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

pub fn metadata(profile: &str, manifest: &Manifest, platform: &str) -> BenchmarkMetadata {
    BenchmarkMetadata {
        benchmark_version: BENCHMARK_VERSION.to_string(),
        profile: profile.to_string(),
        run_date: chrono::Utc::now().to_rfc3339(),
        excel_version: manifest.excel_version.clone(),
        generator_version: manifest.generator_version.clone(),
        platform: platform.to_string(),
    }
}

/// Write `results` as pretty JSON, creating parent directories.
pub fn write_report(results: &BenchmarkResults, path: &Path) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| HarnessError::Report(format!("{}: {e}", parent.display())))?;
    }
    let json = results
        .to_json_pretty()
        .map_err(|e| HarnessError::Report(e.to_string()))?;
    std::fs::write(path, json + "\n")
        .map_err(|e| HarnessError::Report(format!("{}: {e}", path.display())))
}

pub fn read_report(path: &Path) -> Result<BenchmarkResults, HarnessError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| HarnessError::Report(format!("{}: {e}", path.display())))?;
    BenchmarkResults::from_json(&raw).map_err(|e| HarnessError::Report(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xlbench_model::{Capability, FeatureScore, LibraryInfo};

    #[test]
    fn test_platform_string() {
        let p = platform_string();
        assert!(p.starts_with(std::env::consts::OS));
        assert!(p.contains('-'));
    }

    #[test]
    fn test_metadata_from_manifest() {
        let manifest = Manifest::from_json(
            r#"{"excel_version": "16.0", "generator_version": "0.3.1", "files": []}"#,
        )
        .unwrap();
        let meta = metadata("xlsx", &manifest, "linux-x86_64");
        assert_eq!(meta.benchmark_version, BENCHMARK_VERSION);
        assert_eq!(meta.excel_version, "16.0");
        assert_eq!(meta.generator_version, "0.3.1");
        assert!(chrono::DateTime::parse_from_rfc3339(&meta.run_date).is_ok());
    }

    #[test]
    fn test_write_then_read_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/results.json");
        let manifest = Manifest::from_json(r#"{"files": []}"#).unwrap();
        let results = BenchmarkResults::new(
            metadata("xlsx", &manifest, "linux-x86_64"),
            [LibraryInfo::new("calamine", "0.32", "rust", &[Capability::Read])],
            vec![FeatureScore::not_applicable("pivot_tables", "calamine", "gated")],
        );

        write_report(&results, &path).unwrap();
        assert_eq!(read_report(&path).unwrap(), results);
    }

    #[test]
    fn test_read_missing_report() {
        let err = read_report(Path::new("/no/such/results.json")).unwrap_err();
        assert!(matches!(err, HarnessError::Report(_)));
    }
}

//! Decide whether a (fixture, adapter) unit runs at all.

use std::path::Path;

use log::warn;
use xlbench_adapters::Adapter;
use xlbench_model::TestFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Run,
    /// Skipped; the string becomes the unit's note.
    NotApplicable(String),
}

impl Gate {
    pub fn is_run(&self) -> bool {
        matches!(self, Gate::Run)
    }
}

/// Checks, in order: input format, pivot fixture availability, fixture
/// presence on disk.
pub fn gate(file: &TestFile, fixture: &Path, adapter: &dyn Adapter, platform: &str) -> Gate {
    let library = adapter.name();

    if !adapter.supported_read_extensions().supports(&file.file_format) {
        return Gate::NotApplicable(format!(
            "Not applicable: {library} does not support .{} input",
            file.file_format
        ));
    }

    let exists = fixture.is_file();
    if is_pivot_feature(&file.feature)
        && (file.test_cases.is_empty() || !exists)
        && !is_windows(platform)
    {
        return Gate::NotApplicable(format!(
            "Unsupported on {} without a Windows-generated pivot fixture",
            os_display_name(platform)
        ));
    }

    if !exists {
        warn!("fixture file missing: {}", fixture.display());
        return Gate::NotApplicable(format!("Fixture file missing: {}", fixture.display()));
    }

    Gate::Run
}

fn is_pivot_feature(feature: &str) -> bool {
    feature.to_ascii_lowercase().contains("pivot")
}

fn is_windows(platform: &str) -> bool {
    platform.to_ascii_lowercase().starts_with("windows")
}

/// `macos-aarch64` -> `macOS`. Unknown families keep their own name.
fn os_display_name(platform: &str) -> &str {
    let family = platform.split(['-', '_']).next().unwrap_or(platform);
    match family.to_ascii_lowercase().as_str() {
        "macos" | "darwin" => "macOS",
        "linux" => "Linux",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        _ => family,
    }
}

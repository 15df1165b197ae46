//! Exit Code Registry
//!
//! Single source of truth for `xlbench` exit codes. Scripts and CI rely on
//! them, so codes are only ever added.
//!
//! | Code | Meaning                                          |
//! |------|--------------------------------------------------|
//! | 0    | Run completed and the report was written         |
//! | 1    | General error (unspecified)                      |
//! | 2    | Usage error (bad arguments)                      |
//! | 3    | Configuration could not be parsed or is invalid  |
//! | 4    | Manifest missing, unreadable, or filtered empty  |
//! | 5    | Report could not be written                      |
//!
//! Failing test cases never change the exit code; they are data in the report.

use crate::error::HarnessError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success.
pub const EXIT_SUCCESS: u8 = 0;

/// General error. Prefer a specific code.
pub const EXIT_ERROR: u8 = 1;

/// Bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Run (3-9)
// =============================================================================

/// Config file parse or validation failure.
pub const EXIT_CONFIG: u8 = 3;

/// Manifest not found, malformed, or no feature matched the filter.
pub const EXIT_MANIFEST: u8 = 4;

/// Report serialization or write failure.
pub const EXIT_REPORT: u8 = 5;

/// Map a run-level error to its exit code.
pub fn exit_code_for(err: &HarnessError) -> u8 {
    match err {
        HarnessError::ConfigParse(_) | HarnessError::ConfigValidation(_) => EXIT_CONFIG,
        HarnessError::ManifestNotFound(_)
        | HarnessError::ManifestParse(_)
        | HarnessError::NoMatchingFeatures(_) => EXIT_MANIFEST,
        HarnessError::Report(_) => EXIT_REPORT,
        HarnessError::Io(_) => EXIT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [EXIT_SUCCESS, EXIT_ERROR, EXIT_USAGE, EXIT_CONFIG, EXIT_MANIFEST, EXIT_REPORT];
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(exit_code_for(&HarnessError::ConfigParse("x".into())), EXIT_CONFIG);
        assert_eq!(exit_code_for(&HarnessError::ManifestNotFound(PathBuf::from("m"))), EXIT_MANIFEST);
        assert_eq!(exit_code_for(&HarnessError::NoMatchingFeatures(vec![])), EXIT_MANIFEST);
        assert_eq!(exit_code_for(&HarnessError::Report("x".into())), EXIT_REPORT);
        assert_eq!(exit_code_for(&HarnessError::Io("x".into())), EXIT_ERROR);
    }
}

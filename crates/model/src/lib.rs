//! `xlbench-model`: Canonical data model for the spreadsheet fidelity benchmark.
//!
//! Pure data crate: library-neutral cell values, formats and borders, the
//! fixture manifest, and the result containers handed to renderers.
//! No adapter or orchestration dependencies.

pub mod border;
pub mod cell;
pub mod color;
pub mod format;
pub mod lazy;
pub mod manifest;
pub mod results;

/// A JSON object as used for expected and actual payloads.
pub type Payload = serde_json::Map<String, serde_json::Value>;

pub use border::{BorderEdge, BorderInfo, BorderStyle};
pub use cell::{CellType, CellValue};
pub use color::normalize_color;
pub use format::CellFormat;
pub use lazy::Lazy;
pub use manifest::{Importance, Manifest, ManifestError, TestCase, TestFile};
pub use results::{
    BenchmarkMetadata, BenchmarkResults, Capability, FeatureScore, LibraryInfo, OperationType,
    TestResult,
};

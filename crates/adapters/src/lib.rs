//! `xlbench-adapters`: Adapter contract and bundled spreadsheet adapters.
//!
//! Every library under test is driven through the [`Adapter`] trait. Missing
//! capabilities surface as [`AdapterError::Unsupported`]; per-library quirks
//! stay inside the adapter implementations.

pub mod address;
pub mod contract;
pub mod error;
pub mod ooxml;
pub mod registry;

#[cfg(feature = "calamine")]
pub mod calamine_reader;
#[cfg(feature = "xlsxwriter")]
pub mod xlsxwriter_writer;

pub use contract::{Adapter, Isolation, ReadExtensions, WorkbookHandle};
pub use error::AdapterError;
pub use registry::{AdapterRef, AdapterRegistry};

#[cfg(feature = "calamine")]
pub use calamine_reader::CalamineAdapter;
#[cfg(feature = "xlsxwriter")]
pub use xlsxwriter_writer::RustXlsxWriterAdapter;

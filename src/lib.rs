//
// lib.rs
// nii2seg
//
// Exposes the conversion pipeline modules and re-exports the CLI entry point for both binary and library consumers.
//
// Thales Matheus Mendonça Santos - October 2026

// Each module is one step of the pipeline or a shared utility.
pub mod cli;
pub mod convert;
pub mod dicom_access;
pub mod error;
pub mod mask;
pub mod models;
pub mod orientation;
pub mod reference;
pub mod seg;
pub mod segment;
pub mod uid;

pub use cli::{run as run_cli, Cli};
pub use convert::{convert, ConversionJob, ConverterConfig};
pub use error::{ConvertError, Step};

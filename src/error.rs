//
// error.rs
// nii2seg
//
// Structured error type for the conversion pipeline: every variant names the step that failed and the file involved.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Pipeline stage in which a failure happened.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Step {
    Load,
    Discover,
    Encode,
    Persist,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Load => "load",
            Step::Discover => "discover",
            Step::Encode => "encode",
            Step::Persist => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to read NIfTI mask {path:?}")]
    LoadMask {
        path: PathBuf,
        #[source]
        source: nifti::NiftiError,
    },

    #[error("mask {path:?} must be a 3-D volume, got dimensions {dims:?}")]
    MaskDimensions { path: PathBuf, dims: Vec<usize> },

    #[error("failed to list reference directory {path:?}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("no .{extension} files found in {dir:?}")]
    NoReferenceSlices { dir: PathBuf, extension: String },

    #[error("failed to read reference slice {path:?}")]
    ReadSlice {
        path: PathBuf,
        #[source]
        source: dicom::object::ReadError,
    },

    #[error("reference slice {path:?} is missing {attribute}")]
    MissingAttribute {
        path: PathBuf,
        attribute: &'static str,
    },

    #[error("reference slice {path:?} does not belong with the series: {reason}")]
    InconsistentSeries { path: PathBuf, reason: String },

    #[error(
        "mask shape {actual:?} (frames, rows, columns) does not match reference grid {expected:?}"
    )]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    #[error("failed to encode segmentation: {reason}")]
    Encode { reason: String },

    #[error("failed to write segmentation to {path:?}")]
    Persist {
        path: PathBuf,
        #[source]
        source: dicom::object::WriteError,
    },
}

impl ConvertError {
    pub fn step(&self) -> Step {
        match self {
            ConvertError::LoadMask { .. } | ConvertError::MaskDimensions { .. } => Step::Load,
            ConvertError::ReadDirectory { .. }
            | ConvertError::NoReferenceSlices { .. }
            | ConvertError::ReadSlice { .. }
            | ConvertError::MissingAttribute { .. }
            | ConvertError::InconsistentSeries { .. } => Step::Discover,
            ConvertError::ShapeMismatch { .. } | ConvertError::Encode { .. } => Step::Encode,
            ConvertError::Persist { .. } => Step::Persist,
        }
    }

    /// Process exit status for this failure. An empty reference directory is
    /// reported like a usage error; everything else is a conversion failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            ConvertError::NoReferenceSlices { .. } => 1,
            _ => 2,
        }
    }
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_maps_to_usage_exit_code() {
        let err = ConvertError::NoReferenceSlices {
            dir: PathBuf::from("refs"),
            extension: "dcm".into(),
        };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.step(), Step::Discover);
        assert_eq!(err.to_string(), "no .dcm files found in \"refs\"");
    }

    #[test]
    fn shape_mismatch_is_an_encode_failure() {
        let err = ConvertError::ShapeMismatch {
            expected: [3, 4, 5],
            actual: [3, 5, 4],
        };
        assert_eq!(err.step(), Step::Encode);
        assert_eq!(err.exit_code(), 2);
        assert_eq!(Step::Encode.to_string(), "encode");
    }
}

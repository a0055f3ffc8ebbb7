//
// mask.rs
// nii2seg
//
// Loads NIfTI label volumes and turns them into binary foreground masks.
//
// Thales Matheus Mendonça Santos - October 2026

use std::path::{Path, PathBuf};

use ndarray::{Array3, ArrayD, Axis, Ix3};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use tracing::debug;

use crate::error::{ConvertError, Result};

/// Which voxel labels count as foreground.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub enum LabelSelector {
    /// Every value greater than zero; all labels collapse into one segment.
    #[default]
    AnyPositive,
    /// Only voxels carrying exactly this label.
    Exact(u32),
}

impl LabelSelector {
    pub fn matches(self, value: f32) -> bool {
        match self {
            LabelSelector::AnyPositive => value > 0.0,
            LabelSelector::Exact(label) => (value - label as f32).abs() < 0.5,
        }
    }
}

/// A label volume in NIfTI (i, j, k) axis order.
#[derive(Debug, Clone)]
pub struct MaskVolume {
    path: PathBuf,
    labels: Array3<f32>,
}

impl MaskVolume {
    /// Read a `.nii` or `.nii.gz` label volume.
    ///
    /// Voxels are read as `f32` so that labels outside 0-255 (or negative
    /// values) are compared as they are instead of wrapping into a byte.
    pub fn open(path: &Path) -> Result<Self> {
        let obj = ReaderOptions::new()
            .read_file(path)
            .map_err(|source| ConvertError::LoadMask {
                path: path.to_path_buf(),
                source,
            })?;

        let dims: Vec<usize> = {
            let dim = obj.header().dim;
            let ndim = (dim[0] as usize).min(7);
            dim[1..=ndim].iter().map(|&d| d as usize).collect()
        };
        debug!(path = %path.display(), ?dims, "NIfTI header read");

        let data = obj
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(|source| ConvertError::LoadMask {
                path: path.to_path_buf(),
                source,
            })?;

        let labels = squeeze_to_3d(data).ok_or_else(|| ConvertError::MaskDimensions {
            path: path.to_path_buf(),
            dims,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            labels,
        })
    }

    /// Wrap an in-memory label array, mainly for callers that already hold the data.
    pub fn from_array(path: impl Into<PathBuf>, labels: Array3<f32>) -> Self {
        Self {
            path: path.into(),
            labels,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn labels(&self) -> &Array3<f32> {
        &self.labels
    }

    pub fn shape(&self) -> [usize; 3] {
        let (i, j, k) = self.labels.dim();
        [i, j, k]
    }

    /// Threshold into a `{0, 1}` volume, keeping the NIfTI axis order.
    pub fn binarize(&self, selector: LabelSelector) -> Array3<u8> {
        self.labels.mapv(|v| u8::from(selector.matches(v)))
    }
}

/// Drop trailing unit dimensions (e.g. a 4-D file with a single time point).
fn squeeze_to_3d(mut data: ArrayD<f32>) -> Option<Array3<f32>> {
    if data.ndim() < 3 {
        return None;
    }
    while data.ndim() > 3 {
        let last = Axis(data.ndim() - 1);
        if data.len_of(last) != 1 {
            return None;
        }
        data = data.index_axis_move(last, 0);
    }
    data.into_dimensionality::<Ix3>().ok()
}

/// Number of voxels set in a binary mask.
pub fn count_foreground(binary: &Array3<u8>) -> usize {
    binary.iter().filter(|&&v| v != 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    #[test]
    fn any_positive_collapses_labels() {
        let labels = Array3::from_shape_vec((1, 2, 3), vec![0.0, 1.0, 7.0, 300.0, -2.0, 0.0])
            .expect("shape");
        let mask = MaskVolume::from_array("mem.nii", labels);
        let binary = mask.binarize(LabelSelector::AnyPositive);
        assert_eq!(binary.iter().copied().collect::<Vec<_>>(), vec![0, 1, 1, 1, 0, 0]);
        assert_eq!(count_foreground(&binary), 3);
    }

    #[test]
    fn binarizing_twice_keeps_the_foreground() {
        let labels = Array3::from_shape_fn((3, 3, 2), |(i, j, k)| ((i + j * k) % 4) as f32 * 3.0);
        let once = MaskVolume::from_array("a.nii", labels).binarize(LabelSelector::AnyPositive);
        let twice = MaskVolume::from_array("b.nii", once.mapv(f32::from))
            .binarize(LabelSelector::AnyPositive);
        assert_eq!(once, twice);
    }

    #[test]
    fn exact_label_selects_one_structure() {
        let labels = Array3::from_shape_vec((1, 1, 4), vec![7.0, 8.0, 0.0, 7.0]).expect("shape");
        let binary = MaskVolume::from_array("m.nii", labels).binarize(LabelSelector::Exact(7));
        assert_eq!(binary.iter().copied().collect::<Vec<_>>(), vec![1, 0, 0, 1]);
    }

    #[test]
    fn squeezes_singleton_time_axis_only() {
        let four_d = Array::from_elem(IxDyn(&[2, 3, 4, 1]), 1.0_f32);
        assert_eq!(squeeze_to_3d(four_d).map(|a| a.dim()), Some((2, 3, 4)));

        let series = Array::from_elem(IxDyn(&[2, 3, 4, 2]), 1.0_f32);
        assert!(squeeze_to_3d(series).is_none());

        let flat = Array::from_elem(IxDyn(&[2, 3]), 1.0_f32);
        assert!(squeeze_to_3d(flat).is_none());
    }
}

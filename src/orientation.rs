//
// orientation.rs
// nii2seg
//
// Named voxel-order mapping from NIfTI (i, j, k) axes to DICOM (frame, row, column) order.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fmt;
use std::str::FromStr;

use ndarray::{Array3, ArrayView3, Axis};
use thiserror::Error;

/// Maps the three NIfTI array axes onto (frame, row, column) output axes.
///
/// Written as three comma-separated tokens, one per output axis, each being
/// the source axis `i`, `j` or `k` with an optional `-` suffix to reverse it.
/// `k-,j,i` takes frames from `k` in reverse order, rows from `j` and
/// columns from `i`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Orientation {
    /// Source axis index for frames, rows and columns.
    axes: [usize; 3],
    /// Whether each output axis is reversed.
    flips: [bool; 3],
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrientationParseError {
    #[error("expected three comma-separated axes (e.g. `k-,j,i`), got {0:?}")]
    WrongArity(String),
    #[error("unknown axis {0:?}, expected i, j or k with an optional `-`")]
    UnknownAxis(String),
    #[error("axis {0} is used more than once")]
    RepeatedAxis(char),
}

const AXIS_NAMES: [char; 3] = ['i', 'j', 'k'];

impl Orientation {
    /// Dataset-specific mapping of the vertebra masks this tool was written
    /// for: rows and columns swapped relative to the NIfTI in-plane axes and
    /// the slice axis reversed.
    pub const LEGACY: Orientation = Orientation {
        axes: [2, 1, 0],
        flips: [true, false, false],
    };

    /// Slice axis kept in NIfTI order, no flips.
    pub const NATIVE: Orientation = Orientation {
        axes: [2, 1, 0],
        flips: [false, false, false],
    };

    pub fn new(axes: [usize; 3], flips: [bool; 3]) -> Result<Self, OrientationParseError> {
        for (pos, &axis) in axes.iter().enumerate() {
            if axis > 2 {
                return Err(OrientationParseError::UnknownAxis(axis.to_string()));
            }
            if axes[..pos].contains(&axis) {
                return Err(OrientationParseError::RepeatedAxis(AXIS_NAMES[axis]));
            }
        }
        Ok(Self { axes, flips })
    }

    /// Shape of the output for an input of the given NIfTI shape.
    pub fn output_shape(&self, input: [usize; 3]) -> [usize; 3] {
        [
            input[self.axes[0]],
            input[self.axes[1]],
            input[self.axes[2]],
        ]
    }

    /// Reorder `volume` into (frame, row, column) order. The result is in
    /// standard (C) layout so that frames can be read out contiguously.
    pub fn apply<T: Clone>(&self, volume: ArrayView3<'_, T>) -> Array3<T> {
        let mut view = volume.permuted_axes(self.axes);
        for (axis, &flip) in self.flips.iter().enumerate() {
            if flip {
                view.invert_axis(Axis(axis));
            }
        }
        view.as_standard_layout().into_owned()
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Orientation::LEGACY
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<String> = self
            .axes
            .iter()
            .zip(self.flips)
            .map(|(&axis, flip)| {
                let mut token = AXIS_NAMES[axis].to_string();
                if flip {
                    token.push('-');
                }
                token
            })
            .collect();
        f.write_str(&tokens.join(","))
    }
}

impl FromStr for Orientation {
    type Err = OrientationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => return Ok(Orientation::LEGACY),
            "native" => return Ok(Orientation::NATIVE),
            _ => {}
        }

        let tokens: Vec<&str> = s.split(',').map(str::trim).collect();
        if tokens.len() != 3 {
            return Err(OrientationParseError::WrongArity(s.to_string()));
        }

        let mut axes = [0; 3];
        let mut flips = [false; 3];
        for (slot, token) in tokens.iter().enumerate() {
            let (name, flip) = match token.strip_suffix('-') {
                Some(name) => (name, true),
                None => (*token, false),
            };
            let axis = match name {
                "i" => 0,
                "j" => 1,
                "k" => 2,
                _ => return Err(OrientationParseError::UnknownAxis(token.to_string())),
            };
            axes[slot] = axis;
            flips[slot] = flip;
        }

        Orientation::new(axes, flips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn ramp(shape: (usize, usize, usize)) -> Array3<u32> {
        Array3::from_shape_fn(shape, |(i, j, k)| (i * 100 + j * 10 + k) as u32)
    }

    #[test]
    fn parses_presets_and_tokens() {
        assert_eq!("legacy".parse::<Orientation>(), Ok(Orientation::LEGACY));
        assert_eq!("k-,j,i".parse::<Orientation>(), Ok(Orientation::LEGACY));
        assert_eq!(" k , j , i ".parse::<Orientation>(), Ok(Orientation::NATIVE));
        assert_eq!(Orientation::LEGACY.to_string(), "k-,j,i");
        assert_eq!(
            "i,j".parse::<Orientation>(),
            Err(OrientationParseError::WrongArity("i,j".into()))
        );
        assert_eq!(
            "k,k,i".parse::<Orientation>(),
            Err(OrientationParseError::RepeatedAxis('k'))
        );
        assert!(matches!(
            "x,j,i".parse::<Orientation>(),
            Err(OrientationParseError::UnknownAxis(_))
        ));
    }

    #[test]
    fn legacy_moves_slices_first_and_reverses_them() {
        let volume = ramp((4, 3, 2));
        let out = Orientation::LEGACY.apply(volume.view());

        assert_eq!(out.shape(), &[2, 3, 4]);
        assert!(out.is_standard_layout());
        // frame 0 is the last k slice; row = j, column = i
        assert_eq!(out[[0, 0, 0]], volume[[0, 0, 1]]);
        assert_eq!(out[[1, 2, 3]], volume[[3, 2, 0]]);
        assert_eq!(out[[0, 1, 2]], volume[[2, 1, 1]]);
    }

    #[test]
    fn legacy_matches_transpose_then_flip_last_axis() {
        // (i, j, k) -> transpose (1, 0, 2) -> flip axis 2, read per slice.
        let volume = ramp((3, 5, 4));
        let mut reference = volume.view().permuted_axes([1, 0, 2]);
        reference.invert_axis(Axis(2));

        let out = Orientation::LEGACY.apply(volume.view());
        for frame in 0..4 {
            for row in 0..5 {
                for col in 0..3 {
                    assert_eq!(out[[frame, row, col]], reference[[row, col, frame]]);
                }
            }
        }
    }

    #[test]
    fn output_shape_follows_axes() {
        let custom: Orientation = "j,i-,k".parse().expect("orientation");
        assert_eq!(custom.output_shape([10, 20, 30]), [20, 10, 30]);
        let out = custom.apply(ramp((2, 3, 4)).view());
        assert_eq!(out.shape(), &[3, 2, 4]);
        assert_eq!(out[[0, 0, 0]], 100);
    }
}

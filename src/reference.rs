//
// reference.rs
// nii2seg
//
// Discovers, reads and orders the reference DICOM slices a segmentation is anchored to.
//
// Thales Matheus Mendonça Santos - October 2026

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{DefaultDicomObject, OpenFileOptions};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::dicom_access::ElementAccess;
use crate::error::{ConvertError, Result};

/// How the reference slices are put in frame order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum SliceOrder {
    /// Sort by the slice position projected on the series normal.
    #[default]
    Position,
    /// Sort by file name.
    Filename,
}

/// Identifiers and geometry of one single-frame reference image.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    pub path: PathBuf,
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub frame_of_reference_uid: String,
    pub rows: u16,
    pub columns: u16,
    pub image_position: Option<[f64; 3]>,
    pub image_orientation: Option<[f64; 6]>,
    pub pixel_spacing: Option<[f64; 2]>,
    pub slice_thickness: Option<f64>,
}

/// Patient and study level attributes copied into the segmentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudyContext {
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub patient_birth_date: Option<String>,
    pub patient_sex: Option<String>,
    pub study_date: Option<String>,
    pub study_time: Option<String>,
    pub referring_physician_name: Option<String>,
    pub study_id: Option<String>,
    pub accession_number: Option<String>,
    pub content_date: Option<String>,
    pub content_time: Option<String>,
}

/// The ordered reference slices plus the shared context taken from them.
#[derive(Debug, Clone)]
pub struct ReferenceSeries {
    slices: Vec<SourceImage>,
    context: StudyContext,
    spacing_between_slices: Option<f64>,
}

/// List the files directly inside `dir` with the given extension
/// (case-insensitive), sorted by file name.
pub fn discover_slices(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ConvertError::ReadDirectory {
            path: dir.to_path_buf(),
            source,
        })?;
        let matches_extension = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case(extension));
        if entry.file_type().is_file() && matches_extension {
            files.push(entry.into_path());
        }
    }

    if files.is_empty() {
        return Err(ConvertError::NoReferenceSlices {
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
        });
    }
    Ok(files)
}

impl ReferenceSeries {
    /// Discover and load the reference series found in `dir`.
    pub fn discover(dir: &Path, extension: &str, order: SliceOrder) -> Result<Self> {
        let paths = discover_slices(dir, extension)?;
        info!("Found {} reference file(s) in {}", paths.len(), dir.display());
        Self::load(&paths, order)
    }

    /// Read the given slices (in parallel), then check and order them.
    fn load(paths: &[PathBuf], order: SliceOrder) -> Result<Self> {
        let read: Vec<(SourceImage, StudyContext)> =
            paths.par_iter().map(|path| read_slice(path)).collect::<Result<_>>()?;

        let context = read
            .first()
            .map(|(_, context)| context.clone())
            .unwrap_or_default();
        let slices = read.into_iter().map(|(slice, _)| slice).collect();
        Self::from_slices(slices, context, order)
    }

    /// Build a series from already extracted slices: they must share one
    /// image grid, study, series and frame of reference.
    pub fn from_slices(
        mut slices: Vec<SourceImage>,
        context: StudyContext,
        order: SliceOrder,
    ) -> Result<Self> {
        if slices.is_empty() {
            return Err(ConvertError::InconsistentSeries {
                path: PathBuf::new(),
                reason: String::from("the series has no slices"),
            });
        }
        check_consistency(&slices)?;

        let projections = match order {
            SliceOrder::Filename => slice_projections(&slices),
            SliceOrder::Position => match slice_projections(&slices) {
                Some(projections) => {
                    let mut keyed: Vec<(f64, SourceImage)> =
                        projections.into_iter().zip(slices).collect();
                    if keyed.windows(2).any(|w| w[1].0 < w[0].0) {
                        info!("Slice positions do not follow file name order, frames follow position");
                    }
                    // stable: equal positions keep file name order
                    keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
                    let (projections, sorted): (Vec<f64>, Vec<SourceImage>) =
                        keyed.into_iter().unzip();
                    slices = sorted;
                    Some(projections)
                }
                None => {
                    warn!("Reference slices lack position/orientation, falling back to file name order");
                    None
                }
            },
        };

        let spacing_between_slices = projections.and_then(|mut projections| {
            projections.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            if projections.windows(2).any(|w| (w[1] - w[0]).abs() < 1e-6) {
                warn!("Two or more reference slices share the same position, spacing left out");
                return None;
            }
            mean_spacing(&projections)
        });

        debug!(order = ?order, spacing = ?spacing_between_slices, "Reference slices ordered");
        Ok(Self {
            slices,
            context,
            spacing_between_slices,
        })
    }

    pub fn slices(&self) -> &[SourceImage] {
        &self.slices
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// The slice every series-level attribute is taken from. A series is never empty.
    pub fn first(&self) -> &SourceImage {
        &self.slices[0]
    }

    pub fn context(&self) -> &StudyContext {
        &self.context
    }

    pub fn spacing_between_slices(&self) -> Option<f64> {
        self.spacing_between_slices
    }

    /// Expected binary mask shape: (frames, rows, columns).
    pub fn grid_shape(&self) -> [usize; 3] {
        let first = self.first();
        [
            self.slices.len(),
            first.rows as usize,
            first.columns as usize,
        ]
    }
}

fn read_slice(path: &Path) -> Result<(SourceImage, StudyContext)> {
    let obj: DefaultDicomObject = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|source| ConvertError::ReadSlice {
            path: path.to_path_buf(),
            source,
        })?;

    let required = |tag: Tag, attribute: &'static str| {
        obj.element_str(tag)
            .ok_or_else(|| ConvertError::MissingAttribute {
                path: path.to_path_buf(),
                attribute,
            })
    };
    let required_u16 = |tag: Tag, attribute: &'static str| {
        obj.element_u16(tag)
            .ok_or_else(|| ConvertError::MissingAttribute {
                path: path.to_path_buf(),
                attribute,
            })
    };

    let slice = SourceImage {
        path: path.to_path_buf(),
        sop_class_uid: required(tags::SOP_CLASS_UID, "SOPClassUID")?,
        sop_instance_uid: required(tags::SOP_INSTANCE_UID, "SOPInstanceUID")?,
        study_instance_uid: required(tags::STUDY_INSTANCE_UID, "StudyInstanceUID")?,
        series_instance_uid: required(tags::SERIES_INSTANCE_UID, "SeriesInstanceUID")?,
        frame_of_reference_uid: required(tags::FRAME_OF_REFERENCE_UID, "FrameOfReferenceUID")?,
        rows: required_u16(tags::ROWS, "Rows")?,
        columns: required_u16(tags::COLUMNS, "Columns")?,
        image_position: fixed(obj.element_f64s(tags::IMAGE_POSITION_PATIENT)),
        image_orientation: fixed(obj.element_f64s(tags::IMAGE_ORIENTATION_PATIENT)),
        pixel_spacing: fixed(obj.element_f64s(tags::PIXEL_SPACING)),
        slice_thickness: obj
            .element_f64s(tags::SLICE_THICKNESS)
            .and_then(|v| v.first().copied()),
    };

    let context = StudyContext {
        patient_name: obj.element_str(tags::PATIENT_NAME),
        patient_id: obj.element_str(tags::PATIENT_ID),
        patient_birth_date: obj.element_str(tags::PATIENT_BIRTH_DATE),
        patient_sex: obj.element_str(tags::PATIENT_SEX),
        study_date: obj.element_str(tags::STUDY_DATE),
        study_time: obj.element_str(tags::STUDY_TIME),
        referring_physician_name: obj.element_str(tags::REFERRING_PHYSICIAN_NAME),
        study_id: obj.element_str(tags::STUDY_ID),
        accession_number: obj.element_str(tags::ACCESSION_NUMBER),
        content_date: obj.element_str(tags::CONTENT_DATE),
        content_time: obj.element_str(tags::CONTENT_TIME),
    };

    debug!(path = %path.display(), sop_instance_uid = %slice.sop_instance_uid, "Reference slice read");
    Ok((slice, context))
}

fn fixed<const N: usize>(values: Option<Vec<f64>>) -> Option<[f64; N]> {
    values.and_then(|v| v.try_into().ok())
}

fn check_consistency(slices: &[SourceImage]) -> Result<()> {
    let Some(first) = slices.first() else {
        return Ok(());
    };
    let mut seen = HashSet::new();

    for slice in slices {
        let reason = if (slice.rows, slice.columns) != (first.rows, first.columns) {
            Some(format!(
                "image size {}x{} differs from {}x{}",
                slice.rows, slice.columns, first.rows, first.columns
            ))
        } else if slice.study_instance_uid != first.study_instance_uid {
            Some(format!("study {} differs", slice.study_instance_uid))
        } else if slice.series_instance_uid != first.series_instance_uid {
            Some(format!("series {} differs", slice.series_instance_uid))
        } else if slice.frame_of_reference_uid != first.frame_of_reference_uid {
            Some(format!(
                "frame of reference {} differs",
                slice.frame_of_reference_uid
            ))
        } else if !seen.insert(slice.sop_instance_uid.as_str()) {
            Some(format!(
                "duplicate SOP instance {}",
                slice.sop_instance_uid
            ))
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(ConvertError::InconsistentSeries {
                path: slice.path.clone(),
                reason,
            });
        }
    }
    Ok(())
}

/// Signed distance of each slice along the series normal, when every slice
/// has a position and the first one has an orientation.
fn slice_projections(slices: &[SourceImage]) -> Option<Vec<f64>> {
    let orientation = slices.first()?.image_orientation?;
    let normal = cross(
        [orientation[0], orientation[1], orientation[2]],
        [orientation[3], orientation[4], orientation[5]],
    );
    slices
        .iter()
        .map(|slice| slice.image_position.map(|p| dot(p, normal)))
        .collect()
}

fn mean_spacing(projections: &[f64]) -> Option<f64> {
    if projections.len() < 2 {
        return None;
    }
    let total: f64 = projections.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    Some(total / (projections.len() - 1) as f64)
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn slice(name: &str, z: Option<f64>) -> SourceImage {
        SourceImage {
            path: PathBuf::from(name),
            sop_class_uid: "1.2.840.10008.5.1.4.1.1.2".into(),
            sop_instance_uid: format!("1.2.3.{}", name.len() + z.map_or(0, |z| z as usize)),
            study_instance_uid: "1.2.3".into(),
            series_instance_uid: "1.2.3.4".into(),
            frame_of_reference_uid: "1.2.3.5".into(),
            rows: 4,
            columns: 4,
            image_position: z.map(|z| [0.0, 0.0, z]),
            image_orientation: Some([1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
            pixel_spacing: Some([0.5, 0.5]),
            slice_thickness: Some(2.5),
        }
    }

    #[test]
    fn discovery_filters_and_sorts_by_name() {
        let dir = tempdir().expect("tempdir");
        for name in ["slice_010.dcm", "slice_002.DCM", "notes.txt", "slice_001.dcm"] {
            fs::write(dir.path().join(name), b"x").expect("write");
        }
        fs::create_dir(dir.path().join("nested.dcm")).expect("mkdir");

        let files = discover_slices(dir.path(), "dcm").expect("discover");
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["slice_001.dcm", "slice_002.DCM", "slice_010.dcm"]);
    }

    #[test]
    fn discovery_of_empty_directory_fails() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("readme.txt"), b"x").expect("write");
        let err = discover_slices(dir.path(), "dcm").unwrap_err();
        assert!(matches!(err, ConvertError::NoReferenceSlices { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn projections_follow_normal() {
        let slices = vec![slice("a", Some(10.0)), slice("b", Some(-5.0))];
        assert_eq!(slice_projections(&slices), Some(vec![10.0, -5.0]));
        assert_eq!(mean_spacing(&[0.0, 2.5, 5.0]), Some(2.5));
        assert_eq!(mean_spacing(&[1.0]), None);

        let missing = vec![slice("a", Some(1.0)), slice("b", None)];
        assert_eq!(slice_projections(&missing), None);
    }

    #[test]
    fn position_order_recovers_geometry() {
        let slices = vec![
            slice("c", Some(5.0)),
            slice("a", Some(0.0)),
            slice("bb", Some(2.5)),
        ];

        let by_position =
            ReferenceSeries::from_slices(slices.clone(), StudyContext::default(), SliceOrder::Position)
                .expect("series");
        let names: Vec<_> = by_position.slices().iter().map(|s| s.path.clone()).collect();
        assert_eq!(names, vec![PathBuf::from("a"), PathBuf::from("bb"), PathBuf::from("c")]);
        assert_eq!(by_position.spacing_between_slices(), Some(2.5));
        assert_eq!(by_position.grid_shape(), [3, 4, 4]);

        let by_name = ReferenceSeries::from_slices(slices, StudyContext::default(), SliceOrder::Filename)
            .expect("series");
        assert_eq!(by_name.first().path, PathBuf::from("c"));
        assert_eq!(by_name.spacing_between_slices(), Some(2.5));
    }

    #[test]
    fn shared_positions_leave_spacing_unknown() {
        let slices = vec![
            slice("a", Some(0.0)),
            slice("bb", Some(2.5)),
            slice("ccc", Some(2.5)),
        ];
        let series = ReferenceSeries::from_slices(slices, StudyContext::default(), SliceOrder::Position)
            .expect("series");
        assert_eq!(series.len(), 3);
        assert_eq!(series.spacing_between_slices(), None);
    }

    #[test]
    fn missing_geometry_falls_back_to_given_order() {
        let slices = vec![slice("b", None), slice("aa", None)];
        let series = ReferenceSeries::from_slices(slices, StudyContext::default(), SliceOrder::Position)
            .expect("series");
        assert_eq!(series.first().path, PathBuf::from("b"));
        assert_eq!(series.spacing_between_slices(), None);
    }

    #[test]
    fn consistency_rejects_mixed_grids_and_duplicates() {
        let mut other = slice("b", Some(2.0));
        other.rows = 8;
        let err = check_consistency(&[slice("a", Some(1.0)), other]).unwrap_err();
        assert!(matches!(err, ConvertError::InconsistentSeries { .. }));

        let dup = slice("a", Some(1.0));
        let err = check_consistency(&[dup.clone(), dup]).unwrap_err();
        assert!(err.to_string().contains("duplicate SOP instance"));

        assert!(check_consistency(&[slice("a", Some(1.0)), slice("b", Some(3.0))]).is_ok());
    }
}

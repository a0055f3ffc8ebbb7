//
// convert.rs
// nii2seg
//
// Runs one conversion: load the mask, discover the reference series, binarize, reorient, encode and write the SEG file.
//
// Thales Matheus Mendonça Santos - October 2026

use std::path::PathBuf;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::error::Result;
use crate::mask::{count_foreground, LabelSelector, MaskVolume};
use crate::models::ConversionReport;
use crate::orientation::Orientation;
use crate::reference::{ReferenceSeries, SliceOrder};
use crate::seg::{encode_segmentation, EquipmentInfo, SegmentationOptions};
use crate::segment::SegmentDescription;
use crate::uid;

/// Knobs of a conversion. `Default` reproduces the vertebra pipeline the
/// tool was written for.
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterConfig {
    pub orientation: Orientation,
    pub slice_order: SliceOrder,
    /// Reference file extension, without the leading dot.
    pub extension: String,
    pub label: LabelSelector,
    pub segment_label: String,
    pub algorithm_name: String,
    pub algorithm_version: String,
    pub series_number: i32,
    pub instance_number: i32,
    pub series_description: Option<String>,
    pub equipment: EquipmentInfo,
    /// Fixed Series Instance UID; a fresh one is generated when `None`.
    pub series_uid: Option<String>,
    /// Fixed SOP Instance UID; a fresh one is generated when `None`.
    pub instance_uid: Option<String>,
    /// Content Date/Time override.
    pub content_datetime: Option<NaiveDateTime>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            orientation: Orientation::default(),
            slice_order: SliceOrder::default(),
            extension: "dcm".into(),
            label: LabelSelector::default(),
            segment_label: "Vertebra C7".into(),
            algorithm_name: "TotalSegmentator".into(),
            algorithm_version: "1.0".into(),
            series_number: 100,
            instance_number: 1,
            series_description: None,
            equipment: EquipmentInfo::default(),
            series_uid: None,
            instance_uid: None,
            content_datetime: None,
        }
    }
}

impl ConverterConfig {
    pub fn segment(&self) -> SegmentDescription {
        SegmentDescription::vertebra(
            &self.segment_label,
            &self.algorithm_name,
            &self.algorithm_version,
        )
    }

    fn segmentation_options(&self) -> SegmentationOptions {
        let series_uid = self.series_uid.clone().unwrap_or_else(uid::generate_uid);
        let instance_uid = self.instance_uid.clone().unwrap_or_else(uid::generate_uid);
        let mut options = SegmentationOptions::new(series_uid, instance_uid);
        options.series_number = self.series_number;
        options.instance_number = self.instance_number;
        options.series_description = self.series_description.clone();
        options.content_description = Some(format!("{} segmentation", self.segment_label));
        options.equipment = self.equipment.clone();
        if let Some(datetime) = self.content_datetime {
            options.content_date = Some(datetime.format("%Y%m%d").to_string());
            options.content_time = Some(datetime.format("%H%M%S").to_string());
        }
        options
    }
}

/// Inputs and settings of one conversion.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub mask: PathBuf,
    pub reference_dir: PathBuf,
    pub output: PathBuf,
    pub config: ConverterConfig,
}

/// Convert `job.mask` into a DICOM SEG aligned with the series in
/// `job.reference_dir` and write it to `job.output`.
pub fn convert(job: &ConversionJob) -> Result<ConversionReport> {
    let config = &job.config;

    info!(path = %job.mask.display(), "Loading NIfTI mask");
    let mask = MaskVolume::open(&job.mask)?;
    info!(shape = ?mask.shape(), "Mask loaded");

    info!(dir = %job.reference_dir.display(), extension = %config.extension, "Discovering reference slices");
    let reference =
        ReferenceSeries::discover(&job.reference_dir, &config.extension, config.slice_order)?;
    info!(slices = reference.len(), "Reference series loaded");

    let binary = mask.binarize(config.label);
    let foreground_voxels = count_foreground(&binary);
    if foreground_voxels == 0 {
        warn!(selector = ?config.label, "Mask has no foreground voxels");
    }

    let oriented = config.orientation.apply(binary.view());
    info!(orientation = %config.orientation, shape = ?oriented.shape(), "Mask reoriented");

    let segment = config.segment();
    let options = config.segmentation_options();
    let encoded = encode_segmentation(&reference, oriented.view(), &segment, &options)?;
    info!(frames = encoded.frames, "Segmentation encoded");

    encoded.write_to_file(&job.output)?;
    info!(path = %job.output.display(), "Segmentation written");

    let [frames, rows, columns] = reference.grid_shape();
    Ok(ConversionReport {
        output: job.output.clone(),
        frames,
        rows,
        columns,
        foreground_voxels,
        segment_label: segment.label,
        series_instance_uid: options.series_instance_uid,
        sop_instance_uid: options.sop_instance_uid,
        pixel_data_sha256: encoded.pixel_data_sha256,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn default_config_matches_vertebra_pipeline() {
        let config = ConverterConfig::default();
        assert_eq!(config.orientation, Orientation::LEGACY);
        assert_eq!(config.extension, "dcm");
        assert_eq!(config.series_number, 100);
        let segment = config.segment();
        assert_eq!(segment.number, 1);
        assert_eq!(segment.label, "Vertebra C7");
    }

    #[test]
    fn options_use_overrides_and_generate_missing_uids() {
        let datetime = NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(7, 5, 0))
            .expect("datetime");
        let config = ConverterConfig {
            series_uid: Some("2.25.42".into()),
            content_datetime: Some(datetime),
            ..ConverterConfig::default()
        };
        let options = config.segmentation_options();
        assert_eq!(options.series_instance_uid, "2.25.42");
        assert!(uid::is_valid_uid(&options.sop_instance_uid));
        assert_eq!(options.content_date.as_deref(), Some("20240309"));
        assert_eq!(options.content_time.as_deref(), Some("070500"));
        assert_eq!(options.equipment.manufacturer, "WiseSpine");
    }
}

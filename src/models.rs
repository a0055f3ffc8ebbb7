//
// models.rs
// nii2seg
//
// Defines the serializable report printed after a conversion.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Outcome of one conversion, shown on stdout (plain or as JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub output: PathBuf,
    pub frames: usize,
    pub rows: usize,
    pub columns: usize,
    pub foreground_voxels: usize,
    pub segment_label: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
    pub pixel_data_sha256: String,
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Saved DICOM SEG to {}", self.output.display())?;
        writeln!(
            f,
            "  Frames: {} ({}x{})",
            self.frames, self.rows, self.columns
        )?;
        writeln!(f, "  Segment: {}", self.segment_label)?;
        writeln!(f, "  Foreground voxels: {}", self.foreground_voxels)?;
        writeln!(f, "  Series Instance UID: {}", self.series_instance_uid)?;
        write!(f, "  SOP Instance UID: {}", self.sop_instance_uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_with_snake_case_fields() {
        let report = ConversionReport {
            output: PathBuf::from("out/seg.dcm"),
            frames: 80,
            rows: 512,
            columns: 512,
            foreground_voxels: 1234,
            segment_label: "Vertebra C7".into(),
            series_instance_uid: "2.25.1".into(),
            sop_instance_uid: "2.25.2".into(),
            pixel_data_sha256: "00".repeat(32),
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["frames"], 80);
        assert_eq!(json["foreground_voxels"], 1234);
        assert_eq!(json["output"], "out/seg.dcm");

        let back: ConversionReport = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, report);
        assert!(report.to_string().starts_with("Saved DICOM SEG to out/seg.dcm"));
    }
}

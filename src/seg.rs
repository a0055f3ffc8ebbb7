//
// seg.rs
// nii2seg
//
// Builds a BINARY DICOM Segmentation instance (multi-frame, bit-packed) from an ordered reference series and a binary mask.
//
// Thales Matheus Mendonça Santos - October 2026

use std::path::Path;

use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dicom_value;
use dicom::dictionary_std::{tags, StandardDataDictionary};
use dicom::object::{DefaultDicomObject, FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;
use ndarray::ArrayView3;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::reference::{ReferenceSeries, SourceImage};
use crate::segment::{codes, SegmentDescription};
use crate::uid;

/// SOP Class UID of Segmentation Storage.
pub const SEGMENTATION_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.66.4";

/// Longest text a DS (decimal string) value may hold.
const DS_MAX_LEN: usize = 16;

/// Equipment attributes stamped on the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentInfo {
    pub manufacturer: String,
    pub model_name: String,
    pub software_versions: String,
    pub device_serial_number: String,
}

impl Default for EquipmentInfo {
    fn default() -> Self {
        Self {
            manufacturer: "WiseSpine".into(),
            model_name: "WiseSpine Segmentation".into(),
            software_versions: "0.1".into(),
            device_serial_number: "001".into(),
        }
    }
}

/// Series/instance level attributes of the segmentation being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationOptions {
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
    pub series_number: i32,
    pub instance_number: i32,
    pub series_description: Option<String>,
    pub content_label: String,
    pub content_description: Option<String>,
    pub content_creator_name: Option<String>,
    /// Content Date (YYYYMMDD); taken from the reference series when absent.
    pub content_date: Option<String>,
    /// Content Time (HHMMSS); taken from the reference series when absent.
    pub content_time: Option<String>,
    pub equipment: EquipmentInfo,
}

impl SegmentationOptions {
    pub fn new(series_instance_uid: impl Into<String>, sop_instance_uid: impl Into<String>) -> Self {
        Self {
            series_instance_uid: series_instance_uid.into(),
            sop_instance_uid: sop_instance_uid.into(),
            series_number: 100,
            instance_number: 1,
            series_description: None,
            content_label: "SEGMENTATION".into(),
            content_description: None,
            content_creator_name: None,
            content_date: None,
            content_time: None,
            equipment: EquipmentInfo::default(),
        }
    }
}

/// An encoded segmentation ready to be written.
#[derive(Debug, Clone)]
pub struct EncodedSegmentation {
    pub object: DefaultDicomObject,
    pub frames: usize,
    /// Hex SHA-256 of the bit-packed Pixel Data.
    pub pixel_data_sha256: String,
}

impl EncodedSegmentation {
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        self.object
            .write_to_file(path)
            .map_err(|source| ConvertError::Persist {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Encode `mask`, in (frame, row, column) order with one frame per
/// reference slice, as a BINARY segmentation of `reference`.
pub fn encode_segmentation(
    reference: &ReferenceSeries,
    mask: ArrayView3<'_, u8>,
    segment: &SegmentDescription,
    options: &SegmentationOptions,
) -> Result<EncodedSegmentation> {
    let expected = reference.grid_shape();
    let (frames, rows, columns) = mask.dim();
    if [frames, rows, columns] != expected {
        return Err(ConvertError::ShapeMismatch {
            expected,
            actual: [frames, rows, columns],
        });
    }
    for uid_value in [&options.series_instance_uid, &options.sop_instance_uid] {
        if !uid::is_valid_uid(uid_value) {
            return Err(ConvertError::Encode {
                reason: format!("invalid UID {:?}", uid_value),
            });
        }
    }

    let first = reference.first();
    let context = reference.context();
    let mut obj = InMemDicomObject::new_empty();

    // SOP Common
    put_str(&mut obj, tags::SPECIFIC_CHARACTER_SET, VR::CS, "ISO_IR 192");
    put_str(&mut obj, tags::SOP_CLASS_UID, VR::UI, SEGMENTATION_STORAGE);
    put_str(&mut obj, tags::SOP_INSTANCE_UID, VR::UI, &options.sop_instance_uid);

    // Patient and General Study, copied from the reference series
    put_type2(&mut obj, tags::PATIENT_NAME, VR::PN, context.patient_name.as_deref());
    put_type2(&mut obj, tags::PATIENT_ID, VR::LO, context.patient_id.as_deref());
    put_type2(&mut obj, tags::PATIENT_BIRTH_DATE, VR::DA, context.patient_birth_date.as_deref());
    put_type2(&mut obj, tags::PATIENT_SEX, VR::CS, context.patient_sex.as_deref());
    put_str(&mut obj, tags::STUDY_INSTANCE_UID, VR::UI, &first.study_instance_uid);
    put_type2(&mut obj, tags::STUDY_DATE, VR::DA, context.study_date.as_deref());
    put_type2(&mut obj, tags::STUDY_TIME, VR::TM, context.study_time.as_deref());
    put_type2(
        &mut obj,
        tags::REFERRING_PHYSICIAN_NAME,
        VR::PN,
        context.referring_physician_name.as_deref(),
    );
    put_type2(&mut obj, tags::STUDY_ID, VR::SH, context.study_id.as_deref());
    put_type2(&mut obj, tags::ACCESSION_NUMBER, VR::SH, context.accession_number.as_deref());

    // General Series
    put_str(&mut obj, tags::MODALITY, VR::CS, "SEG");
    put_str(&mut obj, tags::SERIES_INSTANCE_UID, VR::UI, &options.series_instance_uid);
    put_str(&mut obj, tags::SERIES_NUMBER, VR::IS, &options.series_number.to_string());
    if let Some(description) = &options.series_description {
        put_str(&mut obj, tags::SERIES_DESCRIPTION, VR::LO, description);
    }

    // Frame of Reference
    put_str(&mut obj, tags::FRAME_OF_REFERENCE_UID, VR::UI, &first.frame_of_reference_uid);
    put_type2(&mut obj, tags::POSITION_REFERENCE_INDICATOR, VR::LO, None);

    // General and Enhanced General Equipment
    let equipment = &options.equipment;
    put_str(&mut obj, tags::MANUFACTURER, VR::LO, &equipment.manufacturer);
    put_str(&mut obj, tags::MANUFACTURER_MODEL_NAME, VR::LO, &equipment.model_name);
    put_str(&mut obj, tags::DEVICE_SERIAL_NUMBER, VR::LO, &equipment.device_serial_number);
    put_str(&mut obj, tags::SOFTWARE_VERSIONS, VR::LO, &equipment.software_versions);

    // General Image
    let content_date = options
        .content_date
        .as_deref()
        .or(context.content_date.as_deref())
        .or(context.study_date.as_deref());
    let content_time = options
        .content_time
        .as_deref()
        .or(context.content_time.as_deref())
        .or(context.study_time.as_deref());
    put_str(&mut obj, tags::INSTANCE_NUMBER, VR::IS, &options.instance_number.to_string());
    put_type2(&mut obj, tags::CONTENT_DATE, VR::DA, content_date);
    put_type2(&mut obj, tags::CONTENT_TIME, VR::TM, content_time);

    // Segmentation Image
    obj.put(DataElement::new(
        tags::IMAGE_TYPE,
        VR::CS,
        dicom_value!(Strs, ["DERIVED", "PRIMARY"]),
    ));
    put_str(&mut obj, tags::CONTENT_LABEL, VR::CS, &options.content_label);
    put_type2(
        &mut obj,
        tags::CONTENT_DESCRIPTION,
        VR::LO,
        options.content_description.as_deref(),
    );
    put_type2(
        &mut obj,
        tags::CONTENT_CREATOR_NAME,
        VR::PN,
        options.content_creator_name.as_deref(),
    );
    put_str(&mut obj, tags::SEGMENTATION_TYPE, VR::CS, "BINARY");
    put_str(&mut obj, tags::SEGMENTS_OVERLAP, VR::CS, "NO");
    put_str(&mut obj, tags::LOSSY_IMAGE_COMPRESSION, VR::CS, "00");
    put_sequence(&mut obj, tags::SEGMENT_SEQUENCE, vec![segment.to_item()]);

    // Image Pixel and Multi-frame
    put_u16(&mut obj, tags::SAMPLES_PER_PIXEL, 1);
    put_str(&mut obj, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2");
    put_u16(&mut obj, tags::ROWS, first.rows);
    put_u16(&mut obj, tags::COLUMNS, first.columns);
    put_u16(&mut obj, tags::BITS_ALLOCATED, 1);
    put_u16(&mut obj, tags::BITS_STORED, 1);
    put_u16(&mut obj, tags::HIGH_BIT, 0);
    put_u16(&mut obj, tags::PIXEL_REPRESENTATION, 0);
    put_str(&mut obj, tags::NUMBER_OF_FRAMES, VR::IS, &frames.to_string());

    // Multi-frame Dimension
    // Frames are indexed by stack position when any slice lacks a position.
    let positioned = reference
        .slices()
        .iter()
        .all(|slice| slice.image_position.is_some());
    let dimension_uid = uid::derive_uid(&options.series_instance_uid, "dimension-organization");
    put_dimensions(&mut obj, &dimension_uid, positioned);

    // Functional groups
    put_sequence(
        &mut obj,
        tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE,
        vec![shared_functional_group(reference)],
    );
    let per_frame: Vec<InMemDicomObject> = reference
        .slices()
        .iter()
        .enumerate()
        .map(|(index, slice)| frame_functional_group(index, slice, segment.number, positioned))
        .collect();
    put_sequence(&mut obj, tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE, per_frame);

    // Common Instance Reference
    put_sequence(
        &mut obj,
        tags::REFERENCED_SERIES_SEQUENCE,
        vec![referenced_series(reference)],
    );

    let packed = pack_bits(mask.iter().copied());
    let pixel_data_sha256 = hex::encode(Sha256::digest(&packed));
    debug!(
        frames,
        rows,
        columns,
        bytes = packed.len(),
        "Pixel data packed"
    );
    obj.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OB,
        PrimitiveValue::from(packed),
    ));

    let file_meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN.uid())
        .media_storage_sop_class_uid(SEGMENTATION_STORAGE)
        .media_storage_sop_instance_uid(options.sop_instance_uid.as_str())
        .build()
        .map_err(|e| ConvertError::Encode {
            reason: e.to_string(),
        })?;

    let mut file_obj =
        FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, file_meta);
    for elem in obj {
        file_obj.put(elem);
    }

    Ok(EncodedSegmentation {
        object: file_obj,
        frames,
        pixel_data_sha256,
    })
}

fn shared_functional_group(reference: &ReferenceSeries) -> InMemDicomObject {
    let first = reference.first();
    let mut group = InMemDicomObject::new_empty();

    let mut measures = InMemDicomObject::new_empty();
    if let Some(spacing) = first.pixel_spacing {
        measures.put(DataElement::new(tags::PIXEL_SPACING, VR::DS, ds_values(&spacing)));
    }
    if let Some(thickness) = first.slice_thickness {
        measures.put(DataElement::new(tags::SLICE_THICKNESS, VR::DS, ds_values(&[thickness])));
    }
    if let Some(spacing) = reference.spacing_between_slices() {
        measures.put(DataElement::new(
            tags::SPACING_BETWEEN_SLICES,
            VR::DS,
            ds_values(&[spacing]),
        ));
    }
    put_sequence(&mut group, tags::PIXEL_MEASURES_SEQUENCE, vec![measures]);

    if let Some(orientation) = first.image_orientation {
        let mut plane = InMemDicomObject::new_empty();
        plane.put(DataElement::new(
            tags::IMAGE_ORIENTATION_PATIENT,
            VR::DS,
            ds_values(&orientation),
        ));
        put_sequence(&mut group, tags::PLANE_ORIENTATION_SEQUENCE, vec![plane]);
    }
    group
}

fn frame_functional_group(
    index: usize,
    slice: &SourceImage,
    segment_number: u16,
    positioned: bool,
) -> InMemDicomObject {
    let mut group = InMemDicomObject::new_empty();

    let mut source = InMemDicomObject::new_empty();
    put_str(&mut source, tags::REFERENCED_SOP_CLASS_UID, VR::UI, &slice.sop_class_uid);
    put_str(&mut source, tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, &slice.sop_instance_uid);
    put_sequence(
        &mut source,
        tags::PURPOSE_OF_REFERENCE_CODE_SEQUENCE,
        vec![codes::SOURCE_IMAGE_FOR_PROCESSING.to_item()],
    );
    let mut derivation = InMemDicomObject::new_empty();
    put_sequence(
        &mut derivation,
        tags::DERIVATION_CODE_SEQUENCE,
        vec![codes::SEGMENTATION.to_item()],
    );
    put_sequence(&mut derivation, tags::SOURCE_IMAGE_SEQUENCE, vec![source]);
    put_sequence(&mut group, tags::DERIVATION_IMAGE_SEQUENCE, vec![derivation]);

    let mut content = InMemDicomObject::new_empty();
    content.put(DataElement::new(
        tags::DIMENSION_INDEX_VALUES,
        VR::UL,
        dicom_value!(U32, [u32::from(segment_number), index as u32 + 1]),
    ));
    if !positioned {
        put_str(&mut content, tags::STACK_ID, VR::SH, "1");
        content.put(DataElement::new(
            tags::IN_STACK_POSITION_NUMBER,
            VR::UL,
            PrimitiveValue::from(index as u32 + 1),
        ));
    }
    put_sequence(&mut group, tags::FRAME_CONTENT_SEQUENCE, vec![content]);

    if let (true, Some(position)) = (positioned, slice.image_position) {
        let mut plane = InMemDicomObject::new_empty();
        plane.put(DataElement::new(
            tags::IMAGE_POSITION_PATIENT,
            VR::DS,
            ds_values(&position),
        ));
        put_sequence(&mut group, tags::PLANE_POSITION_SEQUENCE, vec![plane]);
    }

    let mut identification = InMemDicomObject::new_empty();
    put_u16(&mut identification, tags::REFERENCED_SEGMENT_NUMBER, segment_number);
    put_sequence(&mut group, tags::SEGMENT_IDENTIFICATION_SEQUENCE, vec![identification]);

    group
}

fn put_dimensions(obj: &mut InMemDicomObject, dimension_uid: &str, positioned: bool) {
    let mut organization = InMemDicomObject::new_empty();
    put_str(&mut organization, tags::DIMENSION_ORGANIZATION_UID, VR::UI, dimension_uid);
    put_sequence(obj, tags::DIMENSION_ORGANIZATION_SEQUENCE, vec![organization]);

    let index = |pointer: Tag, group: Tag, label: &str| {
        let mut item = InMemDicomObject::new_empty();
        put_str(&mut item, tags::DIMENSION_ORGANIZATION_UID, VR::UI, dimension_uid);
        item.put(DataElement::new(
            tags::DIMENSION_INDEX_POINTER,
            VR::AT,
            dicom_value!(Tags, [pointer]),
        ));
        item.put(DataElement::new(
            tags::FUNCTIONAL_GROUP_POINTER,
            VR::AT,
            dicom_value!(Tags, [group]),
        ));
        put_str(&mut item, tags::DIMENSION_DESCRIPTION_LABEL, VR::LO, label);
        item
    };
    let frame_index = if positioned {
        index(
            tags::IMAGE_POSITION_PATIENT,
            tags::PLANE_POSITION_SEQUENCE,
            "ImagePositionPatient",
        )
    } else {
        index(
            tags::IN_STACK_POSITION_NUMBER,
            tags::FRAME_CONTENT_SEQUENCE,
            "InStackPositionNumber",
        )
    };
    put_sequence(
        obj,
        tags::DIMENSION_INDEX_SEQUENCE,
        vec![
            index(
                tags::REFERENCED_SEGMENT_NUMBER,
                tags::SEGMENT_IDENTIFICATION_SEQUENCE,
                "ReferencedSegmentNumber",
            ),
            frame_index,
        ],
    );
}

fn referenced_series(reference: &ReferenceSeries) -> InMemDicomObject {
    let instances = reference
        .slices()
        .iter()
        .map(|slice| {
            let mut item = InMemDicomObject::new_empty();
            put_str(&mut item, tags::REFERENCED_SOP_CLASS_UID, VR::UI, &slice.sop_class_uid);
            put_str(&mut item, tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, &slice.sop_instance_uid);
            item
        })
        .collect();

    let mut series = InMemDicomObject::new_empty();
    put_str(
        &mut series,
        tags::SERIES_INSTANCE_UID,
        VR::UI,
        &reference.first().series_instance_uid,
    );
    put_sequence(&mut series, tags::REFERENCED_INSTANCE_SEQUENCE, instances);
    series
}

fn put_str(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: &str) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

/// Type 2 attribute: present, possibly empty.
fn put_type2(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: Option<&str>) {
    match value {
        Some(value) => put_str(obj, tag, vr, value),
        None => {
            obj.put(DataElement::new(tag, vr, PrimitiveValue::Empty));
        }
    }
}

fn put_u16(obj: &mut InMemDicomObject, tag: Tag, value: u16) {
    obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

fn put_sequence(obj: &mut InMemDicomObject, tag: Tag, items: Vec<InMemDicomObject>) {
    obj.put(DataElement::new(tag, VR::SQ, DataSetSequence::from(items)));
}

fn ds_values(values: &[f64]) -> PrimitiveValue {
    PrimitiveValue::Strs(values.iter().map(|&v| format_ds(v)).collect())
}

/// Format a number as a DICOM decimal string of at most 16 characters.
pub fn format_ds(value: f64) -> String {
    let shortest = value.to_string();
    if shortest.len() <= DS_MAX_LEN {
        return shortest;
    }
    for precision in (0..=DS_MAX_LEN).rev() {
        let text = format!("{:.*}", precision, value);
        let text = if text.contains('.') {
            text.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            text
        };
        if text.len() <= DS_MAX_LEN {
            return text;
        }
    }
    format!("{:e}", value)
}

/// Pack `{0, 1}` values into 1-bit pixel data: least significant bit first,
/// frames back to back, zero-padded to an even number of bytes.
pub fn pack_bits(values: impl IntoIterator<Item = u8>) -> Vec<u8> {
    let mut packed = Vec::new();
    let mut current = 0u8;
    let mut count = 0usize;
    for value in values {
        if value != 0 {
            current |= 1 << (count % 8);
        }
        count += 1;
        if count % 8 == 0 {
            packed.push(current);
            current = 0;
        }
    }
    if count % 8 != 0 {
        packed.push(current);
    }
    if packed.len() % 2 == 1 {
        packed.push(0);
    }
    packed
}

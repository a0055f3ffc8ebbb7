//
// segment.rs
// nii2seg
//
// Segment descriptor and the coded concepts a segmentation refers to.
//
// Thales Matheus Mendonça Santos - October 2026

use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;

/// A coded concept as used in DICOM code sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedConcept {
    pub value: &'static str,
    pub scheme: &'static str,
    pub meaning: &'static str,
}

impl CodedConcept {
    pub const fn new(value: &'static str, scheme: &'static str, meaning: &'static str) -> Self {
        Self {
            value,
            scheme,
            meaning,
        }
    }

    /// Encode as a code sequence item.
    pub fn to_item(&self) -> InMemDicomObject {
        let mut item = InMemDicomObject::new_empty();
        item.put(DataElement::new(
            tags::CODE_VALUE,
            VR::SH,
            PrimitiveValue::from(self.value),
        ));
        item.put(DataElement::new(
            tags::CODING_SCHEME_DESIGNATOR,
            VR::SH,
            PrimitiveValue::from(self.scheme),
        ));
        item.put(DataElement::new(
            tags::CODE_MEANING,
            VR::LO,
            PrimitiveValue::from(self.meaning),
        ));
        item
    }
}

pub mod codes {
    use super::CodedConcept;

    pub const TISSUE: CodedConcept = CodedConcept::new("85756007", "SCT", "Tissue");
    pub const BONE: CodedConcept = CodedConcept::new("272673000", "SCT", "Bone");
    pub const ARTIFICIAL_INTELLIGENCE: CodedConcept =
        CodedConcept::new("123110", "DCM", "Artificial Intelligence");
    pub const SEGMENTATION: CodedConcept = CodedConcept::new("113076", "DCM", "Segmentation");
    pub const SOURCE_IMAGE_FOR_PROCESSING: CodedConcept = CodedConcept::new(
        "121322",
        "DCM",
        "Source image for image processing operation",
    );
}

/// Segment Algorithm Type (0062,0008).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum AlgorithmType {
    #[default]
    Automatic,
    SemiAutomatic,
    Manual,
}

impl AlgorithmType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlgorithmType::Automatic => "AUTOMATIC",
            AlgorithmType::SemiAutomatic => "SEMIAUTOMATIC",
            AlgorithmType::Manual => "MANUAL",
        }
    }
}

/// Which algorithm produced the segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmIdentification {
    pub name: String,
    pub version: String,
    pub family: CodedConcept,
}

impl AlgorithmIdentification {
    pub fn to_item(&self) -> InMemDicomObject {
        let mut item = InMemDicomObject::new_empty();
        item.put(DataElement::new(
            tags::ALGORITHM_FAMILY_CODE_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![self.family.to_item()]),
        ));
        item.put(DataElement::new(
            tags::ALGORITHM_NAME,
            VR::LO,
            PrimitiveValue::from(self.name.as_str()),
        ));
        item.put(DataElement::new(
            tags::ALGORITHM_VERSION,
            VR::LO,
            PrimitiveValue::from(self.version.as_str()),
        ));
        item
    }
}

/// Description of the single segment written to the Segment Sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescription {
    pub number: u16,
    pub label: String,
    pub category: CodedConcept,
    pub property_type: CodedConcept,
    pub algorithm_type: AlgorithmType,
    pub algorithm: Option<AlgorithmIdentification>,
}

impl SegmentDescription {
    /// The vertebra segment produced by the automatic spine pipeline.
    pub fn vertebra(label: &str, algorithm_name: &str, algorithm_version: &str) -> Self {
        Self {
            number: 1,
            label: label.to_string(),
            category: codes::TISSUE,
            property_type: codes::BONE,
            algorithm_type: AlgorithmType::Automatic,
            algorithm: Some(AlgorithmIdentification {
                name: algorithm_name.to_string(),
                version: algorithm_version.to_string(),
                family: codes::ARTIFICIAL_INTELLIGENCE,
            }),
        }
    }

    /// Encode as a Segment Sequence item.
    pub fn to_item(&self) -> InMemDicomObject {
        let mut item = InMemDicomObject::new_empty();
        item.put(DataElement::new(
            tags::SEGMENT_NUMBER,
            VR::US,
            PrimitiveValue::from(self.number),
        ));
        item.put(DataElement::new(
            tags::SEGMENT_LABEL,
            VR::LO,
            PrimitiveValue::from(self.label.as_str()),
        ));
        item.put(DataElement::new(
            tags::SEGMENTED_PROPERTY_CATEGORY_CODE_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![self.category.to_item()]),
        ));
        item.put(DataElement::new(
            tags::SEGMENTED_PROPERTY_TYPE_CODE_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![self.property_type.to_item()]),
        ));
        item.put(DataElement::new(
            tags::SEGMENT_ALGORITHM_TYPE,
            VR::CS,
            PrimitiveValue::from(self.algorithm_type.as_str()),
        ));
        if let Some(algorithm) = &self.algorithm {
            item.put(DataElement::new(
                tags::SEGMENT_ALGORITHM_NAME,
                VR::LO,
                PrimitiveValue::from(algorithm.name.as_str()),
            ));
            item.put(DataElement::new(
                tags::SEGMENTATION_ALGORITHM_IDENTIFICATION_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(vec![algorithm.to_item()]),
            ));
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom_access::ElementAccess;

    #[test]
    fn vertebra_segment_item_carries_codes() {
        let segment = SegmentDescription::vertebra("Vertebra C7", "TotalSegmentator", "1.0");
        let item = segment.to_item();

        assert_eq!(item.element_u16(tags::SEGMENT_NUMBER), Some(1));
        assert_eq!(item.element_str(tags::SEGMENT_LABEL).as_deref(), Some("Vertebra C7"));
        assert_eq!(
            item.element_str(tags::SEGMENT_ALGORITHM_TYPE).as_deref(),
            Some("AUTOMATIC")
        );

        let category = item
            .element(tags::SEGMENTED_PROPERTY_CATEGORY_CODE_SEQUENCE)
            .expect("category")
            .items()
            .expect("items");
        assert_eq!(category.len(), 1);
        assert_eq!(category[0].element_str(tags::CODE_VALUE).as_deref(), Some("85756007"));

        let property = item
            .element(tags::SEGMENTED_PROPERTY_TYPE_CODE_SEQUENCE)
            .expect("type")
            .items()
            .expect("items");
        assert_eq!(property[0].element_str(tags::CODE_MEANING).as_deref(), Some("Bone"));

        let algorithm = item
            .element(tags::SEGMENTATION_ALGORITHM_IDENTIFICATION_SEQUENCE)
            .expect("algorithm")
            .items()
            .expect("items");
        assert_eq!(
            algorithm[0].element_str(tags::ALGORITHM_NAME).as_deref(),
            Some("TotalSegmentator")
        );
        assert_eq!(algorithm[0].element_str(tags::ALGORITHM_VERSION).as_deref(), Some("1.0"));
    }

    #[test]
    fn manual_segment_omits_algorithm() {
        let segment = SegmentDescription {
            algorithm_type: AlgorithmType::Manual,
            algorithm: None,
            ..SegmentDescription::vertebra("L1", "x", "y")
        };
        let item = segment.to_item();
        assert_eq!(item.element_str(tags::SEGMENT_ALGORITHM_TYPE).as_deref(), Some("MANUAL"));
        assert!(item.element(tags::SEGMENT_ALGORITHM_NAME).is_err());
    }
}

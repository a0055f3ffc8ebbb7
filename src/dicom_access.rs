use dicom::core::Tag;
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{DefaultDicomObject, InMemDicomObject};

/// Small helper trait to pull typed values from different DICOM object shapes.
pub trait ElementAccess {
    fn element_str(&self, tag: Tag) -> Option<String>;
    fn element_u16(&self, tag: Tag) -> Option<u16>;
    fn element_f64s(&self, tag: Tag) -> Option<Vec<f64>>;
}

impl ElementAccess for InMemDicomObject<StandardDataDictionary> {
    fn element_str(&self, tag: Tag) -> Option<String> {
        self.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.trim_end_matches(['\0', ' ']).to_string())
            .filter(|s| !s.is_empty())
    }

    fn element_u16(&self, tag: Tag) -> Option<u16> {
        self.element(tag).ok().and_then(|e| e.to_int::<u16>().ok())
    }

    fn element_f64s(&self, tag: Tag) -> Option<Vec<f64>> {
        self.element(tag)
            .ok()
            .and_then(|e| e.to_multi_float64().ok())
            .filter(|v| !v.is_empty())
    }
}

impl ElementAccess for DefaultDicomObject {
    fn element_str(&self, tag: Tag) -> Option<String> {
        (**self).element_str(tag)
    }

    fn element_u16(&self, tag: Tag) -> Option<u16> {
        (**self).element_u16(tag)
    }

    fn element_f64s(&self, tag: Tag) -> Option<Vec<f64>> {
        (**self).element_f64s(tag)
    }
}

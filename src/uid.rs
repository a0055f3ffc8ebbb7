//
// uid.rs
// nii2seg
//
// DICOM UID helpers: random UIDs under the 2.25 (UUID) root and name-based UIDs derived from a parent UID.
//
// Thales Matheus Mendonça Santos - October 2026

use uuid::Uuid;

/// Maximum length of a DICOM UID value.
pub const MAX_UID_LEN: usize = 64;

/// Generate a fresh UID of the form `2.25.<uuid as decimal>`.
pub fn generate_uid() -> String {
    from_uuid(Uuid::new_v4())
}

/// Derive a stable UID from `parent` and a discriminating `name`.
/// The same inputs always give the same UID.
pub fn derive_uid(parent: &str, name: &str) -> String {
    let seed = format!("{}/{}", parent, name);
    from_uuid(Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()))
}

fn from_uuid(uuid: Uuid) -> String {
    format!("2.25.{}", uuid.as_u128())
}

/// Check the UID grammar: dot-separated numeric components, no leading zeros, at most 64 characters.
pub fn is_valid_uid(uid: &str) -> bool {
    if uid.is_empty() || uid.len() > MAX_UID_LEN {
        return false;
    }
    uid.split('.').all(|component| {
        !component.is_empty()
            && component.bytes().all(|b| b.is_ascii_digit())
            && (component == "0" || !component.starts_with('0'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_uids_are_valid_and_unique() {
        let a = generate_uid();
        let b = generate_uid();
        assert!(a.starts_with("2.25."));
        assert!(is_valid_uid(&a), "{}", a);
        assert_ne!(a, b);
    }

    #[test]
    fn derived_uid_is_stable() {
        let parent = "2.25.1234";
        assert_eq!(derive_uid(parent, "dim"), derive_uid(parent, "dim"));
        assert_ne!(derive_uid(parent, "dim"), derive_uid(parent, "other"));
        assert!(is_valid_uid(&derive_uid(parent, "dim")));
    }

    #[test]
    fn rejects_malformed_uids() {
        assert!(!is_valid_uid(""));
        assert!(!is_valid_uid("1..2"));
        assert!(!is_valid_uid("1.02"));
        assert!(!is_valid_uid("1.2.a"));
        assert!(is_valid_uid("1.2.0.3"));
    }
}

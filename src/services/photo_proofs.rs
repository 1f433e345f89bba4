use crate::models::{PhotoProof, PhotoProofType};

/// Computes how many additional SERIAL-type proof photos are still
/// required.
///
/// When serial photos are enabled (serial capture active with at least one
/// serial recorded, on a platform with a camera), one SERIAL photo is
/// required per active serial. Platforms without camera support report
/// `serial_photos_enabled = false` and the requirement is waived; that is
/// an explicit policy relaxation, not a silent bypass.
pub fn shortfall(
    active_serial_count: u32,
    captured_proofs: &[PhotoProof],
    serial_photos_enabled: bool,
) -> u32 {
    if !serial_photos_enabled {
        return 0;
    }
    let serial_photos = captured_proofs
        .iter()
        .filter(|p| p.proof_type == PhotoProofType::Serial)
        .count() as u32;
    active_serial_count.saturating_sub(serial_photos)
}

/// Whether serial photos are in play for the current draft state.
pub fn serial_photos_enabled(
    serial_capture_active: bool,
    active_serial_count: u32,
    camera_available: bool,
) -> bool {
    camera_available && serial_capture_active && active_serial_count > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn proof(proof_type: PhotoProofType) -> PhotoProof {
        PhotoProof {
            id: Uuid::new_v4(),
            proof_type,
            payload: "blob".into(),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn one_serial_photo_per_active_serial() {
        let proofs = vec![proof(PhotoProofType::Serial), proof(PhotoProofType::Item)];
        assert_eq!(shortfall(3, &proofs, true), 2);
        assert_eq!(shortfall(1, &proofs, true), 0);
    }

    #[test]
    fn surplus_photos_never_go_negative() {
        let proofs = vec![proof(PhotoProofType::Serial), proof(PhotoProofType::Serial)];
        assert_eq!(shortfall(1, &proofs, true), 0);
    }

    #[test]
    fn requirement_waived_without_camera() {
        assert_eq!(shortfall(5, &[], false), 0);
        assert!(!serial_photos_enabled(true, 5, false));
    }

    #[test]
    fn enabled_only_with_recorded_serials() {
        assert!(!serial_photos_enabled(true, 0, true));
        assert!(!serial_photos_enabled(false, 3, true));
        assert!(serial_photos_enabled(true, 3, true));
    }
}

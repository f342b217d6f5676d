//! Static mapping from anomaly reasons to STRIDE categories and risk bumps.

use crate::siem::Stride;
use crate::validator::ReasonCode;

/// STRIDE category for a reason code; shared by scorer and alert ingest so
/// both sides categorize identically.
pub fn category_for(reason: ReasonCode) -> Stride {
    bump_for(reason).0
}

/// (category, bump) per reason. Bumps are the pre-confidence magnitudes.
pub(crate) fn bump_for(reason: ReasonCode) -> (Stride, f64) {
    match reason {
        ReasonCode::GpsMismatch => (Stride::Spoofing, 0.15),
        ReasonCode::TlsAnomaly => (Stride::Tampering, 0.18),
        ReasonCode::PostureOutdated => (Stride::Tampering, 0.12),
        ReasonCode::HighFrequency => (Stride::DoS, 0.35),
        ReasonCode::PolicyElevation => (Stride::EoP, 0.30),
        ReasonCode::BruteForce => (Stride::DoS, 0.25),
        ReasonCode::DownloadExfil => (Stride::InformationDisclosure, 0.20),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_reason_has_a_category_and_positive_bump() {
        for reason in [
            ReasonCode::GpsMismatch,
            ReasonCode::TlsAnomaly,
            ReasonCode::PostureOutdated,
            ReasonCode::HighFrequency,
            ReasonCode::PolicyElevation,
            ReasonCode::BruteForce,
            ReasonCode::DownloadExfil,
        ] {
            let (_, bump) = bump_for(reason);
            assert!(bump > 0.0 && bump <= 1.0, "{reason}");
        }
    }

    #[test]
    fn location_spoofing_maps_to_spoofing() {
        assert_eq!(category_for(ReasonCode::GpsMismatch), Stride::Spoofing);
        assert_eq!(category_for(ReasonCode::PolicyElevation), Stride::EoP);
    }
}

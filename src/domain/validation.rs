//! # Syntactic Validation
//!
//! Pure checks over payload documents, content ids, identities, and
//! timestamps. Chain-dependent validation (collateral, masternode
//! resolution, signatures) is orchestrated by the service layer; everything
//! here is decidable from the object alone plus plain parameters.

use super::config::ConsensusParams;
use super::entities::{GovernanceObject, PayloadDocument};

/// Payloads above this size are rejected outright.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024;

/// A content id in CID-v0 form is exactly this long.
pub const CID_V0_LEN: usize = 46;

/// Content ids at or above this length are never admissible.
pub const CONTENT_ID_ADMISSIBLE_MAX: usize = 50;

/// All alphanumeric characters except "0", "I", "O", and "l".
const BASE58_CHARS: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Characters allowed in identity labels and tokens.
fn is_identity_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

/// CID v0: 46 chars, `Qm` prefix, base58 alphabet.
pub fn is_cid_v0(id: &str) -> bool {
    if id.len() != CID_V0_LEN || !id.starts_with("Qm") {
        return false;
    }
    id.chars().all(|c| BASE58_CHARS.contains(c))
}

/// Whether a submitter-supplied content id is acceptable for its collateral
/// tier: the low tier may omit the id (empty or the `"0"` sentinel), the
/// high tier must carry a well-formed CID v0.
pub fn peer_content_id_valid(id: &str, collateral: u64, params: &ConsensusParams) -> bool {
    if collateral == params.low_collateral && (id.is_empty() || id == "0") {
        return true;
    }
    is_cid_v0(id)
}

/// Whether an object may enter the postponed queue on missing confirmations.
///
/// The payload must parse; the content id may be absent entirely or any
/// string shorter than the admissibility bound. Strict CID shape is only
/// demanded later, where the tier requires one.
pub fn content_id_admissible(obj: &GovernanceObject) -> bool {
    let Ok(doc) = obj.document() else {
        return false;
    };
    match doc.content_id {
        None => true,
        Some(id) => id.len() < CONTENT_ID_ADMISSIBLE_MAX,
    }
}

/// Payload byte-size gate.
pub fn check_payload_size(obj: &GovernanceObject) -> Result<(), String> {
    if obj.data.len() > MAX_PAYLOAD_SIZE {
        return Err(format!(
            "payload too large: {} > {} bytes",
            obj.data.len(),
            MAX_PAYLOAD_SIZE
        ));
    }
    Ok(())
}

/// Field checks for proposal-shaped documents (proposals and records).
///
/// Re-run periodically: a proposal whose window has closed fails here and is
/// flagged for deletion by the maintenance sweep.
pub fn proposal_fields_valid(doc: &PayloadDocument, now: i64) -> Result<(), String> {
    let name = doc.name.as_deref().unwrap_or_default();
    if name.is_empty() || name.len() > 64 {
        return Err("proposal name must be 1-64 characters".into());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '))
    {
        return Err(format!("proposal name contains invalid characters: {name}"));
    }

    let start = doc.start_epoch.unwrap_or(0);
    let end = doc.end_epoch.unwrap_or(0);
    if start <= 0 || end <= 0 || start >= end {
        return Err("proposal epoch window is invalid".into());
    }
    if end < now {
        return Err("proposal epoch window has closed".into());
    }

    if doc.payment_amount == Some(0) {
        return Err("proposal payment amount must be positive".into());
    }

    Ok(())
}

/// Validate a submitter identity against its collateral tier.
///
/// High-tier identities are dot-separated DNS-like labels; low-tier
/// identities are a single token. Identities already in use by the
/// masternode directory are rejected for either tier.
pub fn identity_valid(
    identity: &str,
    collateral: u64,
    identities_in_use: &[String],
    params: &ConsensusParams,
) -> bool {
    if identity.is_empty() || identity.len() > 255 {
        return false;
    }
    if identities_in_use.iter().any(|used| used == identity) {
        return false;
    }
    if collateral == params.high_collateral {
        identity.split('.').all(valid_label)
    } else if collateral == params.low_collateral {
        valid_token(identity)
    } else {
        false
    }
}

/// A DNS-like label: 1-63 chars over the identity alphabet. High tier only;
/// the per-label length bound does not apply to low-tier tokens.
fn valid_label(label: &str) -> bool {
    (1..=63).contains(&label.len()) && label.chars().all(is_identity_char)
}

/// A low-tier token: any length up to the global 255-char bound, restricted
/// to the identity alphabet.
fn valid_token(token: &str) -> bool {
    token.chars().all(is_identity_char)
}

/// Creation times must sit within `[now - 2·cycle, now + max_future]`.
pub fn timestamp_within_window(
    creation_time: i64,
    now: i64,
    cycle_seconds: i64,
    max_future_deviation: i64,
) -> bool {
    creation_time >= now - 2 * cycle_seconds && creation_time <= now + max_future_deviation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ObjectType, OutPoint, ZERO_HASH};

    const GOOD_CID: &str = "QmSrPmbaUKA3ZodhzPWZnpFgcPMFWF4QsxXbkWfEptTBJd";

    fn object_with_payload(payload: &[u8]) -> GovernanceObject {
        GovernanceObject::new(
            ZERO_HASH,
            1,
            1_700_000_000,
            [0xAA; 32],
            payload.to_vec(),
            ObjectType::Proposal,
            OutPoint::default(),
            [0u8; 64],
        )
    }

    // =========================================================================
    // CONTENT ID SHAPE
    // =========================================================================

    #[test]
    fn cid_v0_accepts_well_formed_ids() {
        assert!(is_cid_v0(GOOD_CID));
    }

    #[test]
    fn cid_v0_rejects_wrong_length_prefix_and_alphabet() {
        assert!(!is_cid_v0("Qmshort"));
        assert!(!is_cid_v0(&GOOD_CID.replace("Qm", "Xy")));
        // '0', 'O', 'I', 'l' are outside the base58 alphabet.
        assert!(!is_cid_v0(&format!("Qm0{}", &GOOD_CID[3..])));
        assert!(!is_cid_v0(&format!("QmO{}", &GOOD_CID[3..])));
    }

    #[test]
    fn low_tier_may_omit_content_id() {
        let params = ConsensusParams::default();
        assert!(peer_content_id_valid("", params.low_collateral, &params));
        assert!(peer_content_id_valid("0", params.low_collateral, &params));
        assert!(!peer_content_id_valid("", params.high_collateral, &params));
        assert!(peer_content_id_valid(GOOD_CID, params.high_collateral, &params));
    }

    #[test]
    fn admissibility_allows_missing_or_short_ids_only() {
        let with_cid =
            object_with_payload(format!(r#"{{"name":"p","ipfscid":"{GOOD_CID}"}}"#).as_bytes());
        assert!(content_id_admissible(&with_cid));

        let without = object_with_payload(br#"{"name":"p"}"#);
        assert!(content_id_admissible(&without));

        let oversized = object_with_payload(
            format!(r#"{{"name":"p","ipfscid":"{}"}}"#, "Q".repeat(50)).as_bytes(),
        );
        assert!(!content_id_admissible(&oversized));

        let garbage = object_with_payload(b"not json");
        assert!(!content_id_admissible(&garbage));
    }

    // =========================================================================
    // PROPOSAL FIELDS
    // =========================================================================

    fn proposal_doc() -> PayloadDocument {
        PayloadDocument {
            name: Some("net-upgrade-q3".into()),
            start_epoch: Some(1_000),
            end_epoch: Some(2_000),
            payment_amount: Some(500),
            ..PayloadDocument::default()
        }
    }

    #[test]
    fn valid_proposal_passes() {
        assert!(proposal_fields_valid(&proposal_doc(), 1_500).is_ok());
    }

    #[test]
    fn closed_window_fails() {
        let err = proposal_fields_valid(&proposal_doc(), 3_000).unwrap_err();
        assert!(err.contains("closed"));
    }

    #[test]
    fn bad_names_and_windows_fail() {
        let mut doc = proposal_doc();
        doc.name = Some(String::new());
        assert!(proposal_fields_valid(&doc, 1_500).is_err());

        let mut doc = proposal_doc();
        doc.name = Some("bad\nname".into());
        assert!(proposal_fields_valid(&doc, 1_500).is_err());

        let mut doc = proposal_doc();
        doc.start_epoch = Some(2_000);
        doc.end_epoch = Some(1_000);
        assert!(proposal_fields_valid(&doc, 1_500).is_err());
    }

    #[test]
    fn payload_size_gate() {
        let obj = object_with_payload(&vec![b'x'; MAX_PAYLOAD_SIZE + 1]);
        assert!(check_payload_size(&obj).is_err());
        let obj = object_with_payload(br#"{"name":"p"}"#);
        assert!(check_payload_size(&obj).is_ok());
    }

    // =========================================================================
    // IDENTITIES
    // =========================================================================

    #[test]
    fn high_tier_identity_is_dot_separated_labels() {
        let params = ConsensusParams::default();
        assert!(identity_valid("node.example", params.high_collateral, &[], &params));
        assert!(identity_valid("single", params.high_collateral, &[], &params));
        assert!(!identity_valid("bad..label", params.high_collateral, &[], &params));
        assert!(!identity_valid(
            &format!("{}.x", "a".repeat(64)),
            params.high_collateral,
            &[],
            &params
        ));
    }

    #[test]
    fn low_tier_identity_is_a_single_token() {
        let params = ConsensusParams::default();
        assert!(identity_valid("runner-7", params.low_collateral, &[], &params));
        assert!(!identity_valid("dot.ted", params.low_collateral, &[], &params));
        assert!(!identity_valid("spa ced", params.low_collateral, &[], &params));
    }

    #[test]
    fn low_tier_identity_has_no_label_length_bound() {
        let params = ConsensusParams::default();
        // Only the global 255-char bound applies to the low tier.
        assert!(identity_valid(&"a".repeat(100), params.low_collateral, &[], &params));
        assert!(identity_valid(&"a".repeat(255), params.low_collateral, &[], &params));
        assert!(!identity_valid(&"a".repeat(256), params.low_collateral, &[], &params));
        // The high tier still bounds each label.
        assert!(!identity_valid(&"a".repeat(100), params.high_collateral, &[], &params));
    }

    #[test]
    fn identities_in_use_are_rejected() {
        let params = ConsensusParams::default();
        let used = vec!["taken".to_string()];
        assert!(!identity_valid("taken", params.high_collateral, &used, &params));
        assert!(identity_valid("free", params.high_collateral, &used, &params));
    }

    #[test]
    fn unknown_collateral_tier_is_rejected() {
        let params = ConsensusParams::default();
        assert!(!identity_valid("anything", 12345, &[], &params));
    }

    // =========================================================================
    // TIMESTAMP WINDOW
    // =========================================================================

    #[test]
    fn window_bounds_are_inclusive() {
        let now = 100_000;
        let cycle = 1_000;
        let future = 60;
        assert!(timestamp_within_window(now - 2 * cycle, now, cycle, future));
        assert!(timestamp_within_window(now + future, now, cycle, future));
        assert!(!timestamp_within_window(now - 2 * cycle - 1, now, cycle, future));
        assert!(!timestamp_within_window(now + future + 1, now, cycle, future));
    }
}

//! Room identity: canonical room keys and participant sides.
//!
//! Every caller that needs to reference the conversation between two users
//! goes through [`derive_room_id`], so the same pair always resolves to the
//! same key no matter who initiates.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Separator placed between the two ordered identities of a room key.
pub const ROOM_ID_SEPARATOR: char = '.';

/// Maximum accepted length of a user identity, in bytes.
pub const MAX_IDENTITY_LEN: usize = 128;

/// Derive the canonical room key for a pair of participants.
///
/// The two identities are ordered lexicographically and joined with
/// [`ROOM_ID_SEPARATOR`], so `derive_room_id(a, b) == derive_room_id(b, a)`.
pub fn derive_room_id(a: &str, b: &str) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{low}{ROOM_ID_SEPARATOR}{high}")
}

/// Validate a raw user identity.
///
/// Identities containing the separator are rejected, otherwise two distinct
/// pairs could map to the same room key (`"a.b" + "c"` vs `"a" + "b.c"`).
pub fn validate_identity(identity: &str) -> Result<(), CoreError> {
    if identity.trim().is_empty() {
        return Err(CoreError::Validation("identity must not be empty".into()));
    }
    if identity.len() > MAX_IDENTITY_LEN {
        return Err(CoreError::Validation(format!(
            "identity must be at most {MAX_IDENTITY_LEN} bytes, got {}",
            identity.len()
        )));
    }
    if identity.contains(ROOM_ID_SEPARATOR) {
        return Err(CoreError::Validation(format!(
            "identity '{identity}' must not contain '{ROOM_ID_SEPARATOR}'"
        )));
    }
    Ok(())
}

/// Validate a participant pair: both identities valid and distinct.
pub fn validate_pair(a: &str, b: &str) -> Result<(), CoreError> {
    validate_identity(a)?;
    validate_identity(b)?;
    if a == b {
        return Err(CoreError::Validation(format!(
            "participants must be distinct, got '{a}' twice"
        )));
    }
    Ok(())
}

/// One side of a buyer/seller conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buyer,
    Seller,
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // derive_room_id
    // -----------------------------------------------------------------------

    #[test]
    fn room_id_is_commutative() {
        let pairs = [
            ("alice", "bob"),
            ("bob", "alice"),
            ("Zed", "amy"),
            ("user-1", "user-10"),
            ("same-prefix", "same"),
        ];
        for (a, b) in pairs {
            assert_eq!(derive_room_id(a, b), derive_room_id(b, a), "{a} / {b}");
        }
    }

    #[test]
    fn room_id_uses_lexicographic_order() {
        assert_eq!(derive_room_id("bob", "alice"), "alice.bob");
        assert_eq!(derive_room_id("alice", "bob"), "alice.bob");
        // Uppercase sorts before lowercase in byte order.
        assert_eq!(derive_room_id("amy", "Zed"), "Zed.amy");
    }

    #[test]
    fn distinct_pairs_give_distinct_ids_when_identities_are_valid() {
        let a = derive_room_id("ab", "c");
        let b = derive_room_id("a", "bc");
        assert_ne!(a, b);
    }

    // -----------------------------------------------------------------------
    // Identity validation
    // -----------------------------------------------------------------------

    #[test]
    fn valid_identities() {
        assert!(validate_identity("alice").is_ok());
        assert!(validate_identity("seller_42").is_ok());
    }

    #[test]
    fn empty_identity_rejected() {
        assert!(validate_identity("").is_err());
        assert!(validate_identity("   ").is_err());
    }

    #[test]
    fn identity_with_separator_rejected() {
        let err = validate_identity("a.b").unwrap_err();
        assert!(err.to_string().contains("must not contain"));
    }

    #[test]
    fn overlong_identity_rejected() {
        let long = "x".repeat(MAX_IDENTITY_LEN + 1);
        assert!(validate_identity(&long).is_err());
    }

    #[test]
    fn pair_must_be_distinct() {
        assert!(validate_pair("alice", "bob").is_ok());
        let err = validate_pair("alice", "alice").unwrap_err();
        assert!(err.to_string().contains("distinct"));
    }

    // -----------------------------------------------------------------------
    // Side
    // -----------------------------------------------------------------------

    #[test]
    fn side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Seller).unwrap(), r#""seller""#);
        assert_eq!(serde_json::from_str::<Side>(r#""buyer""#).unwrap(), Side::Buyer);
    }
}

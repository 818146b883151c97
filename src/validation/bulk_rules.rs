// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch-level rules for bulk and recovery requests.
//!
//! Applied to the collection as a whole, independent of the per-pack
//! rules. Evaluation order: presence, declared count, maximum size,
//! duplicates.

use std::collections::HashSet;

use super::{codes, ValidationOutcome};
use crate::pack::PackIdentifier;

/// Validate a bulk submission of `packs` against the count the caller
/// declared and the configured maximum.
pub fn validate_bulk(
    packs: &[PackIdentifier],
    declared_count: usize,
    max_packs: usize,
) -> ValidationOutcome {
    if packs.is_empty() {
        return ValidationOutcome::fail(codes::BULK_NO_PACKS, "bulk request contains no packs");
    }

    if declared_count != packs.len() {
        return ValidationOutcome::fail(
            codes::BULK_PACK_COUNT_MISMATCH,
            format!("declared {declared_count} packs but {} are present", packs.len()),
        );
    }

    if packs.len() > max_packs {
        return ValidationOutcome::fail(
            codes::BULK_TOO_MANY_PACKS,
            format!("{} packs exceed the maximum of {max_packs}", packs.len()),
        );
    }

    // No two packs may share (scheme, product code, serial number).
    let mut seen = HashSet::with_capacity(packs.len());
    for pack in packs {
        let key = (pack.scheme, pack.product_code.as_str(), pack.serial_number.as_str());
        if !seen.insert(key) {
            return ValidationOutcome::fail(
                codes::BULK_DUPLICATE_PACK,
                format!(
                    "pack {}/{} appears more than once",
                    pack.product_code, pack.serial_number
                ),
            );
        }
    }

    ValidationOutcome::valid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::CodingScheme;

    fn pack(serial: &str) -> PackIdentifier {
        PackIdentifier::new(CodingScheme::Gs1, "04012345123456", serial)
    }

    #[test]
    fn test_valid_bulk() {
        let packs = vec![pack("A"), pack("B"), pack("C")];
        assert!(validate_bulk(&packs, 3, 500_000).is_valid());
    }

    #[test]
    fn test_empty_bulk_rejected() {
        let outcome = validate_bulk(&[], 0, 500_000);
        assert_eq!(outcome.operation_code, codes::BULK_NO_PACKS);
    }

    #[test]
    fn test_declared_count_mismatch() {
        let packs = vec![pack("A"), pack("B")];
        let outcome = validate_bulk(&packs, 3, 500_000);
        assert_eq!(outcome.operation_code, codes::BULK_PACK_COUNT_MISMATCH);
    }

    #[test]
    fn test_too_many_packs() {
        let packs = vec![pack("A"), pack("B"), pack("C")];
        let outcome = validate_bulk(&packs, 3, 2);
        assert_eq!(outcome.operation_code, codes::BULK_TOO_MANY_PACKS);
    }

    #[test]
    fn test_duplicate_pack_rejected() {
        let packs = vec![pack("A"), pack("B"), pack("A")];
        let outcome = validate_bulk(&packs, 3, 500_000);
        assert_eq!(outcome.operation_code, codes::BULK_DUPLICATE_PACK);
    }

    #[test]
    fn test_same_serial_different_scheme_is_not_duplicate() {
        let mut other = pack("A");
        other.scheme = CodingScheme::Ifa;
        let packs = vec![pack("A"), other];
        assert!(validate_bulk(&packs, 2, 500_000).is_valid());
    }
}

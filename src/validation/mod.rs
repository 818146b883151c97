// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pack identifier and bulk request validation.
//!
//! Pure functions, with one deliberate side effect: validation normalizes
//! the identifier in place (trimming, case-folding, zero-padding) so every
//! later stage (suppression keys, hub requests, deferred records) sees
//! the canonical form.
//!
//! Rules are evaluated in fixed order; the first failure wins and is
//! returned as a [`ValidationOutcome`] carrying an operation code and
//! warning text. Outcomes are data, never errors: the caller decides
//! whether to reject or proceed.

mod bulk_rules;
mod pack_rules;

pub use bulk_rules::validate_bulk;
pub use pack_rules::validate_pack;

/// Operation codes reported by the validation engine.
///
/// `0` means valid. Per-pack failures use the `6102xxxx` family, bulk
/// failures the `6212xxxx` family.
pub mod codes {
    /// Valid; no rule fired.
    pub const VALID: u32 = 0;

    pub const SCHEME_UNKNOWN: u32 = 61020001;
    pub const PRODUCT_CODE_MISSING: u32 = 61020002;
    pub const GS1_PRODUCT_CODE_PATTERN: u32 = 61020003;
    pub const IFA_PRODUCT_CODE_PATTERN: u32 = 61020004;
    pub const IFA_PPN_LENGTH: u32 = 61020005;
    pub const SERIAL_NUMBER_MISSING: u32 = 61020006;
    pub const GS1_SERIAL_NUMBER_PATTERN: u32 = 61020007;
    pub const GS1_CHECK_DIGIT: u32 = 61020008;
    pub const IFA_SERIAL_NUMBER_PATTERN: u32 = 61020009;
    pub const BATCH_ID_MISSING: u32 = 61020010;
    pub const BATCH_ID_PATTERN: u32 = 61020011;
    pub const EXPIRY_DATE_MISSING: u32 = 61020012;
    pub const EXPIRY_DATE_INVALID: u32 = 61020013;

    pub const BULK_DUPLICATE_PACK: u32 = 62120000;
    pub const BULK_PACK_COUNT_MISMATCH: u32 = 62120001;
    pub const BULK_NO_PACKS: u32 = 62120002;
    pub const BULK_TOO_MANY_PACKS: u32 = 62120003;
}

/// Result of a validation run. An all-zero, absent-warning outcome means
/// the input is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// [`codes::VALID`] or the code of the first rule that fired.
    pub operation_code: u32,
    /// Warning text for the failed rule; absent when valid.
    pub warning: Option<String>,
}

impl ValidationOutcome {
    #[must_use]
    pub fn valid() -> Self {
        Self { operation_code: codes::VALID, warning: None }
    }

    pub(crate) fn fail(operation_code: u32, warning: impl Into<String>) -> Self {
        Self { operation_code, warning: Some(warning.into()) }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.operation_code == codes::VALID && self.warning.is_none()
    }
}

impl Default for ValidationOutcome {
    fn default() -> Self {
        Self::valid()
    }
}

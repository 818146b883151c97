// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-pack validation rules.
//!
//! Thirteen rules in fixed order, first failure wins. GS1 and IFA packs
//! share the rule sequence but differ in character sets, lengths and the
//! checksum: GS1 product codes are GTIN-14 with a mod-10 check digit, IFA
//! product codes are 12-digit German PPNs.

use super::{codes, ValidationOutcome};
use crate::pack::{CodingScheme, DataEntryMode, PackIdentifier};

const GTIN_LEN: usize = 14;
const SERIAL_MAX_LEN: usize = 20;

/// Validate and normalize a single pack identifier.
///
/// Normalization happens as the rules run: fields are trimmed, IFA fields
/// upper-cased and GS1 product codes zero-padded to 14 digits, all written
/// back into `pack`.
pub fn validate_pack(pack: &mut PackIdentifier, entry_mode: DataEntryMode) -> ValidationOutcome {
    // Rule 1: scheme must be decided.
    if pack.scheme == CodingScheme::Unknown {
        return ValidationOutcome::fail(codes::SCHEME_UNKNOWN, "coding scheme is unknown");
    }

    // Rule 2: product code present.
    if pack.product_code.trim().is_empty() {
        return ValidationOutcome::fail(codes::PRODUCT_CODE_MISSING, "product code is missing");
    }

    match pack.scheme {
        CodingScheme::Gs1 => {
            // Rules 3+4: digits only, padded to GTIN-14, mod-10 check digit.
            let trimmed = pack.product_code.trim();
            if !trimmed.bytes().all(|b| b.is_ascii_digit()) || trimmed.len() > GTIN_LEN {
                return ValidationOutcome::fail(
                    codes::GS1_PRODUCT_CODE_PATTERN,
                    format!("'{trimmed}' is not a GTIN-14 product code"),
                );
            }
            pack.product_code = format!("{:0>14}", trimmed);
            if !gs1_check_digit_ok(&pack.product_code) {
                return ValidationOutcome::fail(
                    codes::GS1_CHECK_DIGIT,
                    format!("check digit of '{}' is invalid", pack.product_code),
                );
            }
        }
        CodingScheme::Ifa => {
            // Rules 5+6: 5-22 alphanumerics after folding, then the PPN
            // constraint of exactly 12 digits.
            let folded = pack.product_code.trim().to_ascii_uppercase();
            let len_ok = (5..=22).contains(&folded.len());
            if !len_ok || !folded.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
                return ValidationOutcome::fail(
                    codes::IFA_PRODUCT_CODE_PATTERN,
                    format!("'{folded}' is not a PPN product code"),
                );
            }
            pack.product_code = folded;
            if pack.product_code.len() != 12
                || !pack.product_code.bytes().all(|b| b.is_ascii_digit())
            {
                return ValidationOutcome::fail(
                    codes::IFA_PPN_LENGTH,
                    format!("'{}' is not a 12-digit PPN", pack.product_code),
                );
            }
        }
        CodingScheme::Unknown => unreachable!("rejected by rule 1"),
    }

    // Rule 7: serial number present.
    if pack.serial_number.trim().is_empty() {
        return ValidationOutcome::fail(codes::SERIAL_NUMBER_MISSING, "serial number is missing");
    }

    // Rules 8/9: serial number character set and length.
    match pack.scheme {
        CodingScheme::Gs1 => {
            let trimmed = pack.serial_number.trim().to_string();
            if trimmed.len() > SERIAL_MAX_LEN || !trimmed.chars().all(is_gs1_cs82_char) {
                return ValidationOutcome::fail(
                    codes::GS1_SERIAL_NUMBER_PATTERN,
                    format!("serial number '{trimmed}' violates the GS1 character set"),
                );
            }
            pack.serial_number = trimmed;
        }
        CodingScheme::Ifa => {
            let folded = pack.serial_number.trim().to_ascii_uppercase();
            if folded.len() > SERIAL_MAX_LEN
                || !folded.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            {
                return ValidationOutcome::fail(
                    codes::IFA_SERIAL_NUMBER_PATTERN,
                    format!("serial number '{folded}' violates the IFA character set"),
                );
            }
            pack.serial_number = folded;
        }
        CodingScheme::Unknown => unreachable!("rejected by rule 1"),
    }

    // Rules 10+11: batch id presence and character set.
    let batch_blank = pack
        .batch_id
        .as_deref()
        .map_or(true, |b| b.trim().is_empty());
    if batch_blank {
        if !entry_mode.is_manual() {
            return ValidationOutcome::fail(codes::BATCH_ID_MISSING, "batch id is missing");
        }
        if pack.batch_id.is_some() {
            // Manual entry may omit the batch, but a present value must
            // not be all whitespace.
            return ValidationOutcome::fail(codes::BATCH_ID_MISSING, "batch id is blank");
        }
    } else if let Some(batch) = pack.batch_id.take() {
        let normalized = match pack.scheme {
            CodingScheme::Ifa => batch.trim().to_ascii_uppercase(),
            _ => batch.trim().to_string(),
        };
        let ok = match pack.scheme {
            CodingScheme::Gs1 => {
                normalized.len() <= SERIAL_MAX_LEN && normalized.chars().all(is_gs1_cs82_char)
            }
            CodingScheme::Ifa => {
                normalized.len() <= SERIAL_MAX_LEN
                    && normalized
                        .bytes()
                        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
            }
            CodingScheme::Unknown => unreachable!("rejected by rule 1"),
        };
        if !ok {
            return ValidationOutcome::fail(
                codes::BATCH_ID_PATTERN,
                format!("batch id '{normalized}' violates the {} character set", pack.scheme),
            );
        }
        pack.batch_id = Some(normalized);
    }

    // Rules 12+13: expiry date presence and YYMMDD calendar validity.
    let expiry_blank = pack
        .expiry_date
        .as_deref()
        .map_or(true, |e| e.trim().is_empty());
    if expiry_blank {
        if !entry_mode.is_manual() {
            return ValidationOutcome::fail(codes::EXPIRY_DATE_MISSING, "expiry date is missing");
        }
        if pack.expiry_date.is_some() {
            return ValidationOutcome::fail(codes::EXPIRY_DATE_MISSING, "expiry date is blank");
        }
    } else if let Some(expiry) = pack.expiry_date.take() {
        let trimmed = expiry.trim().to_string();
        if !expiry_date_ok(&trimmed) {
            return ValidationOutcome::fail(
                codes::EXPIRY_DATE_INVALID,
                format!("'{trimmed}' is not a valid YYMMDD expiry date"),
            );
        }
        pack.expiry_date = Some(trimmed);
    }

    ValidationOutcome::valid()
}

/// GS1 mod-10 check: digits at even 0-based indexes weigh 3, odd weigh 1;
/// the weighted sum of all 14 digits must be divisible by 10.
fn gs1_check_digit_ok(code: &str) -> bool {
    let sum: u32 = code
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let digit = u32::from(b - b'0');
            if i % 2 == 0 { digit * 3 } else { digit }
        })
        .sum();
    sum % 10 == 0
}

/// GS1 character set 82, as permitted in serial numbers and batch ids.
fn is_gs1_cs82_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '"' | '%' | '&' | '\'' | '(' | ')' | '*' | '+' | ',' | '-' | '.' | '/' | ':'
                | ';' | '<' | '=' | '>' | '?' | '_'
        )
}

/// `YYMMDD` with full calendar validity; day `00` denotes a month-level
/// expiry. Years are interpreted as 20YY for leap handling.
fn expiry_date_ok(s: &str) -> bool {
    if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let year = 2000 + s[0..2].parse::<u32>().unwrap_or(0);
    let month = s[2..4].parse::<u32>().unwrap_or(0);
    let day = s[4..6].parse::<u32>().unwrap_or(0);

    if !(1..=12).contains(&month) {
        return false;
    }
    if day == 0 {
        return true;
    }
    day <= days_in_month(year, month)
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

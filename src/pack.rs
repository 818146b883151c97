// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pack identifier and pack lifecycle types.
//!
//! The [`PackIdentifier`] is the core data unit that flows through the
//! engine. Each identifier carries a coding scheme plus the four fields
//! printed on the pack; the validation engine normalizes these fields in
//! place before anything else touches them.

use serde::{Deserialize, Serialize};

/// Product coding scheme of a pack.
///
/// `Gs1` and `Ifa` are mutually exclusive; `Unknown` never passes
/// validation and exists only so a scanner can hand over an undecoded pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CodingScheme {
    /// GTIN-14 barcodes with a mod-10 check digit.
    Gs1,
    /// German pharmacy PPN codes.
    Ifa,
    /// Scheme could not be determined from the scan.
    Unknown,
}

impl std::fmt::Display for CodingScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gs1 => write!(f, "GS1"),
            Self::Ifa => write!(f, "IFA"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// How the pack data entered the system.
///
/// Manual entry relaxes the batch and expiry requirements (§ pack rules);
/// scanned entry requires the full data matrix content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataEntryMode {
    /// Typed in by an operator.
    Manual,
    /// Decoded from a scanned data matrix.
    Scanner,
}

impl DataEntryMode {
    #[must_use]
    pub fn is_manual(self) -> bool {
        matches!(self, Self::Manual)
    }
}

impl std::fmt::Display for DataEntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "MANUAL"),
            Self::Scanner => write!(f, "SCANNER"),
        }
    }
}

/// Pack state transitions a client may request from the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestedPackState {
    Active,
    Supplied,
    Stolen,
    Destroyed,
    Sample,
    FreeSample,
    Locked,
    Exported,
    CheckedOut,
}

impl RequestedPackState {
    /// Path segment used when building the hub request URI.
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Supplied => "supplied",
            Self::Stolen => "stolen",
            Self::Destroyed => "destroyed",
            Self::Sample => "sample",
            Self::FreeSample => "free-sample",
            Self::Locked => "locked",
            Self::Exported => "exported",
            Self::CheckedOut => "checked-out",
        }
    }
}

impl std::fmt::Display for RequestedPackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path_segment())
    }
}

/// Pack states the hub may report back.
///
/// Superset of [`RequestedPackState`]: the hub can report states a client
/// is never allowed to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportedPackState {
    Active,
    Supplied,
    Stolen,
    Destroyed,
    Sample,
    FreeSample,
    Locked,
    Exported,
    CheckedOut,
    Expired,
    Recalled,
    Withdrawn,
    NotFound,
    None,
}

impl From<RequestedPackState> for ReportedPackState {
    fn from(state: RequestedPackState) -> Self {
        match state {
            RequestedPackState::Active => Self::Active,
            RequestedPackState::Supplied => Self::Supplied,
            RequestedPackState::Stolen => Self::Stolen,
            RequestedPackState::Destroyed => Self::Destroyed,
            RequestedPackState::Sample => Self::Sample,
            RequestedPackState::FreeSample => Self::FreeSample,
            RequestedPackState::Locked => Self::Locked,
            RequestedPackState::Exported => Self::Exported,
            RequestedPackState::CheckedOut => Self::CheckedOut,
        }
    }
}

/// A single pack as decoded from the data matrix or typed in manually.
///
/// # Example
///
/// ```
/// use serihub::pack::{CodingScheme, PackIdentifier};
///
/// let pack = PackIdentifier::new(
///     CodingScheme::Gs1,
///     "04012345123456",
///     "SERIAL001",
/// );
///
/// assert_eq!(pack.scheme, CodingScheme::Gs1);
/// assert!(pack.batch_id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackIdentifier {
    /// Coding scheme; determines the format of every other field.
    pub scheme: CodingScheme,
    /// GTIN-14 (GS1) or PPN (IFA) product code.
    pub product_code: String,
    /// Per-pack serial number.
    pub serial_number: String,
    /// Manufacturing batch. Optional only for manual entry.
    pub batch_id: Option<String>,
    /// Expiry date as `YYMMDD`; day `00` means month-level expiry.
    pub expiry_date: Option<String>,
}

impl PackIdentifier {
    /// Create an identifier with the two mandatory fields.
    pub fn new(
        scheme: CodingScheme,
        product_code: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        Self {
            scheme,
            product_code: product_code.into(),
            serial_number: serial_number.into(),
            batch_id: None,
            expiry_date: None,
        }
    }

    /// Builder-style batch id.
    #[must_use]
    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    /// Builder-style expiry date (`YYMMDD`).
    #[must_use]
    pub fn with_expiry(mut self, expiry_date: impl Into<String>) -> Self {
        self.expiry_date = Some(expiry_date.into());
        self
    }
}

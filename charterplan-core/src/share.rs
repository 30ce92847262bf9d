//! Compact share codes for selections.
//! Code format: `CP1.<FFFF>.<P>[:<C>]-<P>[:<C>]...`, e.g. `CP1.3fa2.0:b-4-7`
//!
//! `FFFF` is the low 16 bits of the catalog fingerprint. `P` is a provider's
//! catalog index and `C` the capability index of its active charter, both in
//! lower-case base 36.
use log::warn;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::persist::ImportReport;
use crate::selection::{CharterChange, Selection};

const PREFIX: &str = "CP1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShareCodeError {
    #[error("share code must start with CP1")]
    WrongPrefix,
    #[error("share code is missing its {0} section")]
    MissingSection(&'static str),
    #[error("invalid catalog fingerprint {0:?}")]
    BadFingerprint(String),
}

/// Result of decoding a share code against a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedShare {
    pub selection: Selection,
    pub report: ImportReport,
    /// The code was produced from a catalog with different keys.
    pub catalog_mismatch: bool,
}

fn short_fingerprint(catalog: &Catalog) -> u16 {
    (catalog.fingerprint() & 0xFFFF) as u16
}

fn to_base36(mut value: usize) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[value % 36]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn from_base36(text: &str) -> Option<usize> {
    usize::from_str_radix(text, 36).ok()
}

/// Encode a selection as a share code for `catalog`.
#[must_use]
pub fn encode(catalog: &Catalog, selection: &Selection) -> String {
    let entries: Vec<String> = selection
        .providers()
        .iter()
        .filter_map(|key| {
            let provider = to_base36(catalog.provider_index(key)?);
            let charter = selection
                .charter_of(key)
                .and_then(|charter| catalog.capability_index(charter));
            Some(match charter {
                Some(charter) => format!("{provider}:{}", to_base36(charter)),
                None => provider,
            })
        })
        .collect();
    format!(
        "{PREFIX}.{:04x}.{}",
        short_fingerprint(catalog),
        entries.join("-")
    )
}

/// Decode a share code, dropping entries whose indices the catalog does not know.
///
/// # Errors
///
/// Returns an error when the code is not structurally a share code.
pub fn decode(catalog: &Catalog, code: &str) -> Result<DecodedShare, ShareCodeError> {
    let mut parts = code.trim().splitn(3, '.');
    if !parts
        .next()
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(PREFIX))
    {
        return Err(ShareCodeError::WrongPrefix);
    }
    let fingerprint = parts
        .next()
        .ok_or(ShareCodeError::MissingSection("fingerprint"))?;
    let fingerprint = u16::from_str_radix(fingerprint, 16)
        .map_err(|_| ShareCodeError::BadFingerprint(fingerprint.to_string()))?;
    let body = parts
        .next()
        .ok_or(ShareCodeError::MissingSection("selection"))?;

    let catalog_mismatch = fingerprint != short_fingerprint(catalog);
    if catalog_mismatch {
        warn!("share code fingerprint {fingerprint:04x} does not match the loaded catalog");
    }

    let mut selection = Selection::new();
    let mut report = ImportReport::default();
    for entry in body.split('-').filter(|entry| !entry.is_empty()) {
        let (provider_part, charter_part) = match entry.split_once(':') {
            Some((provider, charter)) => (provider, Some(charter)),
            None => (entry, None),
        };
        let provider = from_base36(provider_part)
            .and_then(|idx| catalog.provider_at(idx))
            .filter(|p| selection.select(catalog, &p.key));
        let Some(provider) = provider else {
            report.drop_entry(format!("provider #{provider_part}"));
            if charter_part.is_some() {
                report.drop_entry(format!("charter #{entry}"));
            }
            continue;
        };
        report.accept();
        let Some(charter_part) = charter_part else {
            continue;
        };
        let chosen = from_base36(charter_part)
            .and_then(|idx| catalog.capability_at(idx))
            .map(|charter| selection.choose_charter(catalog, &provider.key, &charter.key));
        if chosen == Some(CharterChange::Chosen) {
            report.accept();
        } else {
            report.drop_entry(format!("charter #{entry}"));
        }
    }
    if !report.dropped.is_empty() {
        warn!("share code dropped {}", report.dropped.join(", "));
    }
    Ok(DecodedShare {
        selection,
        report,
        catalog_mismatch,
    })
}

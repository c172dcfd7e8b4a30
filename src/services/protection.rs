//! Protection status derivation
//!
//! Collapses the legacy `schutzstatus` representations into one canonical
//! label and maps that label onto the three map colors.

use bson::Bson;

use crate::db::schemas::{ProtectionStatus, Schutzstatus};

pub const LABEL_PROTECTED: &str = "gesetzlich geschützt";
pub const LABEL_VALUABLE: &str = "ökologisch hochwertig";
pub const LABEL_STANDARD: &str = "ökologisch niederwertig";
pub const LABEL_UNKNOWN: &str = "unbekannt";

/// Canonical label for a stored schutzstatus.
///
/// Labels pass through unchanged. For a weight map the key with the highest
/// numeric weight wins (first key on ties) and well-known keys are expanded;
/// non-numeric weights are skipped.
pub fn normalize(raw: Option<&Schutzstatus>) -> String {
    match raw {
        Some(Schutzstatus::Label(label)) => label.clone(),
        Some(Schutzstatus::Weights(weights)) => {
            let mut best: Option<(&str, f64)> = None;
            for (key, value) in weights {
                let Some(weight) = numeric_weight(value) else {
                    continue;
                };
                match best {
                    Some((_, top)) if weight <= top => {}
                    _ => best = Some((key.as_str(), weight)),
                }
            }
            match best {
                Some((key, _)) => expand_key(key),
                None => LABEL_UNKNOWN.to_string(),
            }
        }
        None => LABEL_UNKNOWN.to_string(),
    }
}

/// Map color for a stored schutzstatus
pub fn derive(raw: Option<&Schutzstatus>) -> ProtectionStatus {
    let label = normalize(raw).to_lowercase();
    if label.contains("gesetzlich") {
        ProtectionStatus::Red
    } else if label.contains("hochwertig") || label.contains("schützenswert") {
        ProtectionStatus::Yellow
    } else {
        ProtectionStatus::Green
    }
}

/// Convenience for plain labels, e.g. catalog entries
pub fn derive_label(label: &str) -> ProtectionStatus {
    derive(Some(&Schutzstatus::Label(label.to_string())))
}

fn numeric_weight(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(v) if v.is_finite() => Some(*v),
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        _ => None,
    }
}

fn expand_key(key: &str) -> String {
    match key {
        "gesetzlich" => LABEL_PROTECTED.to_string(),
        "hochwertig" => LABEL_VALUABLE.to_string(),
        "standard" => LABEL_STANDARD.to_string(),
        other => other.to_string(),
    }
}

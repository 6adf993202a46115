//! Versioned on-disk encoding of a [`RestrictionSelection`].
//!
//! Payloads are JSON envelopes carrying an integer `version`, so a reader can
//! tell which layout it is looking at before deserializing the body.
//!
//! ## Versions
//!
//! - **1**: `{"version": 1, "apps": [...], "categories": [...]}`, written
//!   before web domains could be restricted. Migrated on read.
//! - **2**: `{"version": 2, "selection": {apps, app_categories, domains,
//!   domain_categories}}`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::RestrictionSelection;
use crate::target::RestrictionTarget;

/// Current selection payload version.
pub const SELECTION_VERSION: u32 = 2;

#[derive(Error, Debug)]
pub enum SelectionDecodeError {
    #[error("malformed selection payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("selection payload has no version field")]
    MissingVersion,

    #[error("selection payload version {found} is not supported (expected 1 to {current})")]
    UnsupportedVersion { found: u64, current: u32 },
}

#[derive(Serialize, Deserialize)]
struct EnvelopeV2 {
    version: u32,
    selection: RestrictionSelection,
}

#[derive(Deserialize)]
struct EnvelopeV1 {
    #[serde(default)]
    apps: BTreeSet<RestrictionTarget>,
    #[serde(default)]
    categories: BTreeSet<RestrictionTarget>,
}

impl From<EnvelopeV1> for RestrictionSelection {
    fn from(v1: EnvelopeV1) -> Self {
        RestrictionSelection {
            apps: v1.apps,
            app_categories: v1.categories,
            ..Default::default()
        }
    }
}

/// Encode a selection at the current version.
pub fn encode(selection: &RestrictionSelection) -> Result<String, serde_json::Error> {
    serde_json::to_string(&EnvelopeV2 {
        version: SELECTION_VERSION,
        selection: selection.clone(),
    })
}

/// Decode any supported payload version into the current in-memory shape.
pub fn decode(payload: &str) -> Result<RestrictionSelection, SelectionDecodeError> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    let version = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .ok_or(SelectionDecodeError::MissingVersion)?;

    match version {
        1 => Ok(serde_json::from_value::<EnvelopeV1>(value)?.into()),
        2 => Ok(serde_json::from_value::<EnvelopeV2>(value)?.selection),
        found => Err(SelectionDecodeError::UnsupportedVersion {
            found,
            current: SELECTION_VERSION,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetKind;

    #[test]
    fn encodes_current_version() {
        let json = encode(&RestrictionSelection::new()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 2);
    }

    #[test]
    fn roundtrip_preserves_all_sets() {
        let sel = RestrictionSelection::new()
            .with(TargetKind::App, RestrictionTarget::from_bytes(b"app".to_vec()))
            .with(TargetKind::AppCategory, RestrictionTarget::from_bytes(b"games".to_vec()))
            .with(TargetKind::Domain, RestrictionTarget::from_bytes(b"news".to_vec()))
            .with(TargetKind::DomainCategory, RestrictionTarget::from_bytes(b"social".to_vec()));
        assert_eq!(decode(&encode(&sel).unwrap()).unwrap(), sel);
    }

    #[test]
    fn migrates_v1_payload() {
        // "YQ==" is "a", "Zw==" is "g"
        let json = r#"{"version": 1, "apps": ["YQ=="], "categories": ["Zw=="]}"#;
        let sel = decode(json).unwrap();
        assert!(sel.apps.contains(&RestrictionTarget::from_bytes(b"a".to_vec())));
        assert!(sel
            .app_categories
            .contains(&RestrictionTarget::from_bytes(b"g".to_vec())));
        assert!(sel.domains.is_empty());
        assert!(sel.domain_categories.is_empty());
    }

    #[test]
    fn rejects_future_version() {
        let json = r#"{"version": 3, "selection": {}}"#;
        assert!(matches!(
            decode(json),
            Err(SelectionDecodeError::UnsupportedVersion { found: 3, .. })
        ));
    }

    #[test]
    fn rejects_version_zero_without_calling_it_newer() {
        let err = decode(r#"{"version": 0, "selection": {}}"#).unwrap_err();
        assert!(matches!(err, SelectionDecodeError::UnsupportedVersion { found: 0, .. }));
        assert_eq!(
            err.to_string(),
            "selection payload version 0 is not supported (expected 1 to 2)"
        );
    }

    #[test]
    fn rejects_unversioned_and_garbage() {
        assert!(matches!(
            decode(r#"{"apps": []}"#),
            Err(SelectionDecodeError::MissingVersion)
        ));
        assert!(matches!(
            decode("{truncated"),
            Err(SelectionDecodeError::Malformed(_))
        ));
    }
}

//! Keyword classification of detected assets and the proof-of-ownership
//! sub-gate applied at the collateral step.

use serde::Serialize;

use super::state::{ApplicationState, DetectedAsset};

/// Category resolved from an asset's free-text name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    Vehicle,
    Property,
    Machinery,
    Unclassified,
}

/// Document type a flagged asset must supply before the collateral step can
/// be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofDocumentKind {
    VehicleLogbook,
    TitleDeed,
    OwnershipDeclaration,
}

impl ProofDocumentKind {
    pub fn label(self) -> &'static str {
        match self {
            ProofDocumentKind::VehicleLogbook => "vehicle logbook",
            ProofDocumentKind::TitleDeed => "title deed",
            ProofDocumentKind::OwnershipDeclaration => "ownership declaration",
        }
    }
}

// Extend classification by editing these tables, not by adding types.
const VEHICLE_KEYWORDS: &[&str] = &[
    "car", "truck", "pickup", "van", "lorry", "bus", "motorcycle", "boda", "tuk", "tractor",
    "toyota", "hilux", "nissan", "isuzu", "subaru", "vehicle",
];
const PROPERTY_KEYWORDS: &[&str] = &[
    "land", "plot", "acre", "house", "home", "building", "apartment", "flat", "farm", "estate",
    "shamba",
];
const MACHINERY_KEYWORDS: &[&str] = &[
    "machine", "generator", "welder", "compressor", "lathe", "grinder", "pump", "mill",
    "equipment", "posho",
];

/// Pure keyword classification over the asset's free-text name.
pub fn classify_asset(name: &str) -> AssetCategory {
    let lowered = name.to_lowercase();
    let matches_any = |keywords: &[&str]| keywords.iter().any(|keyword| lowered.contains(keyword));

    if matches_any(VEHICLE_KEYWORDS) {
        AssetCategory::Vehicle
    } else if matches_any(PROPERTY_KEYWORDS) {
        AssetCategory::Property
    } else if matches_any(MACHINERY_KEYWORDS) {
        AssetCategory::Machinery
    } else {
        AssetCategory::Unclassified
    }
}

/// The document an asset category demands. Unclassified assets demand none;
/// flagged-but-unclassifiable assets are therefore exempt from the sub-gate.
pub fn required_proof(category: AssetCategory) -> Option<ProofDocumentKind> {
    match category {
        AssetCategory::Vehicle => Some(ProofDocumentKind::VehicleLogbook),
        AssetCategory::Property => Some(ProofDocumentKind::TitleDeed),
        AssetCategory::Machinery => Some(ProofDocumentKind::OwnershipDeclaration),
        AssetCategory::Unclassified => None,
    }
}

/// Flagged assets that still owe a verified proof document, paired with the
/// document type each one requires.
pub fn outstanding_proofs(state: &ApplicationState) -> Vec<(&DetectedAsset, ProofDocumentKind)> {
    state
        .detected_assets
        .iter()
        .filter(|asset| asset.requires_proof_of_ownership)
        .filter_map(|asset| {
            let kind = required_proof(classify_asset(&asset.name))?;
            if asset.proof_verified() {
                None
            } else {
                Some((asset, kind))
            }
        })
        .collect()
}

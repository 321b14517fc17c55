//! Modules d'export (GeoJSON)

pub mod geojson;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use tots_core::{Edits, Feature, SpatialReference};

/// Exporte les échantillons courants d'un scénario
///
/// `measured` remplace les features du ledger quand un calcul a produit des
/// copies portant `AA`/`AC`.
pub fn export_scenario(
    edits: &Edits,
    scenario_id: &str,
    measured: Option<&[Feature]>,
    source: SpatialReference,
    target: SpatialReference,
    output_path: &Path,
) -> Result<usize> {
    let scenario = edits
        .find_scenario(scenario_id)
        .with_context(|| format!("Scenario not found: {}", scenario_id))?;

    let features: Vec<&Feature> = match measured {
        Some(measured) => measured.iter().collect(),
        None => edits.scenario_features(scenario_id),
    };

    let written = self::geojson::export_to_geojson(&features, source, target, output_path)?;
    info!(
        scenario = %scenario.scenario_name,
        features = written,
        output = %output_path.display(),
        "Scénario exporté"
    );
    Ok(written)
}

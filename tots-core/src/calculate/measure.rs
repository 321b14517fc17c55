//! Passe géométrique : surface réelle et nombre d'équivalents échantillons

use rayon::prelude::*;
use tracing::debug;

use crate::geodesy::{self, SpatialReference};
use crate::types::{attr, Feature};

/// Mesure d'un échantillon après la passe géométrique
#[derive(Debug, Clone, PartialEq)]
pub struct SampleMeasure {
    /// Surface réelle en pouces carrés
    pub area_sq_in: f64,
    /// Nombre de surfaces de référence contenues dans la surface réelle
    pub area_count: u64,
    /// Copie de la feature portant `AA` et `AC`
    pub feature: Feature,
}

impl SampleMeasure {
    pub fn area_sq_ft(&self) -> f64 {
        geodesy::square_inches_to_square_feet(self.area_sq_in)
    }
}

/// `AC = max(1, round(area / SA))`, arrondi au demi supérieur
///
/// Vaut 1 si la surface est inférieure à `SA` ou si `SA` est absent ou nul.
pub fn area_count(area: f64, reference_area: Option<f64>) -> u64 {
    match reference_area {
        Some(sa) if sa > 0.0 && sa.is_finite() && area >= sa => {
            let count = (area / sa + 0.5).floor();
            if count < 1.0 {
                1
            } else {
                count as u64
            }
        }
        _ => 1,
    }
}

/// Mesure une feature ; `None` si sa géométrie est inutilisable
pub fn measure_feature(feature: &Feature, sr: SpatialReference) -> Option<SampleMeasure> {
    let geometry = feature.geometry.as_ref()?;
    let area_sq_in = match geodesy::area_square_inches(geometry, sr) {
        Ok(area) => area,
        Err(e) => {
            debug!(
                id = feature.permanent_id().unwrap_or("?"),
                error = %e,
                "Feature ignorée par le calcul"
            );
            return None;
        }
    };

    let area_count = area_count(area_sq_in, feature.attr_f64(attr::SA));

    let mut measured = feature.clone();
    measured.set_attr(attr::AA, area_sq_in.round() as i64);
    measured.set_attr(attr::AC, area_count);

    Some(SampleMeasure {
        area_sq_in,
        area_count,
        feature: measured,
    })
}

/// Mesure toutes les features en parallèle, en conservant leur ordre
pub fn measure_features(features: &[&Feature], sr: SpatialReference) -> Vec<SampleMeasure> {
    features
        .par_iter()
        .filter_map(|feature| measure_feature(feature, sr))
        .collect()
}

//! Moteur de calcul du plan d'échantillonnage
//!
//! Le calcul se fait en deux passes sur les features du scénario
//! sélectionné :
//!
//! 1. passe géométrique (parallèle) : surface réelle de chaque échantillon
//!    dans la zone UTM de son centroïde, et nombre d'équivalents `AC` ;
//! 2. passe d'agrégation : sommes pondérées par `AC`, puis totaux dérivés
//!    (temps, coûts, facteur limitant).
//!
//! Le moteur réagit au jeton `count` du ledger, jamais à l'égalité des
//! objets.

mod measure;
pub mod settings;
mod totals;

pub use measure::{area_count, measure_feature, measure_features, SampleMeasure};
pub use settings::{CalculateSettings, CalculateSettingsPair};
pub use totals::{CalculateResultsData, LimitingFactor, Totals};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::edits::Edits;
use crate::error::{Result, TotsError};
use crate::geodesy::SpatialReference;
use crate::types::{EditType, Feature};

/// État du calcul pour le scénario sélectionné
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculateStatus {
    #[default]
    None,
    Fetching,
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateResults {
    pub status: CalculateStatus,
    pub panel_open: bool,
    pub data: Option<CalculateResultsData>,
}

impl CalculateResults {
    fn none() -> Self {
        Self::default()
    }
}

/// Résultat complet d'un calcul de plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanCalculation {
    pub totals: Totals,
    pub total_area_sq_ft: f64,
    pub samples: Vec<SampleMeasure>,
    pub data: CalculateResultsData,
}

/// Calcule un plan à partir de ses features et de ses paramètres
///
/// Retourne `None` s'il n'y a rien à calculer (aucune feature mesurable ou
/// surface totale nulle). Sans état caché : deux appels sur les mêmes
/// entrées donnent le même résultat.
pub fn calculate_plan(
    features: &[&Feature],
    settings: &CalculateSettings,
    sr: SpatialReference,
) -> Result<Option<PlanCalculation>> {
    settings.validate()?;

    let samples = measure_features(features, sr);
    let total_area_sq_ft: f64 = samples.iter().map(SampleMeasure::area_sq_ft).sum();

    if samples.is_empty() || total_area_sq_ft == 0.0 {
        debug!(features = features.len(), "Aucune surface à calculer");
        return Ok(None);
    }

    let totals = Totals::aggregate(&samples);
    let data = CalculateResultsData::derive(&totals, total_area_sq_ft, samples.len(), settings);

    Ok(Some(PlanCalculation {
        totals,
        total_area_sq_ft,
        samples,
        data,
    }))
}

/// Moteur de calcul lié au scénario sélectionné
#[derive(Debug, Default)]
pub struct CalculateEngine {
    sr: SpatialReference,
    last_count: Option<u64>,
    last_scenario: Option<String>,
    results: CalculateResults,
    measured: Vec<Feature>,
}

impl CalculateEngine {
    pub fn new(sr: SpatialReference) -> Self {
        Self {
            sr,
            ..Default::default()
        }
    }

    pub fn results(&self) -> &CalculateResults {
        &self.results
    }

    pub fn status(&self) -> CalculateStatus {
        self.results.status
    }

    /// Copies des features du dernier calcul, portant `AA` et `AC`
    pub fn measured_features(&self) -> &[Feature] {
        &self.measured
    }

    pub fn set_panel_open(&mut self, open: bool) {
        self.results.panel_open = open;
    }

    /// Réagit à un changement du ledger ou de la sélection
    ///
    /// Passe en `fetching` si `count` ou le scénario sélectionné a changé et
    /// que ce scénario contient au moins une feature, sauf si la dernière
    /// modification du même scénario ne portait que sur son nom ou sa
    /// description.
    pub fn on_edits_changed(&mut self, edits: &Edits, selected_scenario: Option<&str>) -> CalculateStatus {
        let scenario_changed = self.last_scenario.as_deref() != selected_scenario;
        self.last_scenario = selected_scenario.map(str::to_string);

        let scenario = selected_scenario.and_then(|id| edits.find_scenario(id));
        let Some(scenario) = scenario.filter(|s| s.feature_count() > 0) else {
            self.results = CalculateResults::none();
            self.measured.clear();
            self.last_count = Some(edits.count);
            return self.results.status;
        };

        if !scenario_changed {
            if scenario.edit_type == EditType::Properties {
                debug!(scenario = %scenario.layer_id, "Changement de propriétés, pas de recalcul");
                self.last_count = Some(edits.count);
                return self.results.status;
            }
            if self.last_count == Some(edits.count) {
                return self.results.status;
            }
        }

        self.last_count = Some(edits.count);
        self.measured.clear();
        self.results.status = CalculateStatus::Fetching;
        self.results.data = None;
        self.results.status
    }

    /// Exécute les deux passes pour le scénario sélectionné
    pub fn run(&mut self, edits: &Edits, selected_scenario: &str) -> Result<&CalculateResults> {
        let scenario = edits
            .find_scenario(selected_scenario)
            .ok_or_else(|| TotsError::ScenarioNotFound(selected_scenario.to_string()))?;
        let settings = scenario.calculate_settings.current;
        let features = edits.scenario_features(selected_scenario);

        match calculate_plan(&features, &settings, self.sr) {
            Ok(Some(plan)) => {
                info!(
                    scenario = %scenario.scenario_name,
                    samples = plan.data.total_samples,
                    total_cost = plan.data.total_cost,
                    total_time = plan.data.total_time,
                    "Plan calculé"
                );
                self.measured = plan.samples.into_iter().map(|s| s.feature).collect();
                self.results.status = CalculateStatus::Success;
                self.results.data = Some(plan.data);
            }
            Ok(None) => {
                self.measured.clear();
                self.results = CalculateResults::none();
            }
            Err(e) => {
                warn!(scenario = %scenario.scenario_name, error = %e, "Calcul impossible");
                self.measured.clear();
                self.results.status = CalculateStatus::Failure;
                self.results.data = None;
                return Err(e);
            }
        }

        Ok(&self.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edits::{
        set_calculate_settings, update_layer_edits, update_scenario_properties, EditOperation,
        EditsItem, ScenarioEdits,
    };
    use crate::geodesy::{self, geographic_to_web_mercator, Geographic};
    use crate::layer::LayerInfo;
    use crate::types::attr;

    fn square_sample(id: &str, lon: f64, area_sq_in: f64) -> Feature {
        let (x, y) = geographic_to_web_mercator(Geographic::from_degrees(lon, 38.9));
        let geometry =
            geodesy::square_buffer(x, y, area_sq_in, SpatialReference::WebMercator).unwrap();
        Feature::new(Some(geometry))
            .with_attr(attr::PERMANENT_IDENTIFIER, id)
            .with_attr(attr::SA, 100)
            .with_attr(attr::TTPK, 1)
            .with_attr(attr::TTC, "2")
            .with_attr(attr::LOD_P, 5)
    }

    fn scenario_with_samples(samples: Vec<Feature>) -> (Edits, String) {
        let scenario = ScenarioEdits::new("Plan", "", CalculateSettings::default());
        let id = scenario.layer_id.clone();
        let edits = Edits {
            count: 0,
            edits: vec![EditsItem::Scenario(scenario)],
        };
        let layer = LayerInfo::sample_layer("Samples", Some(id.as_str()));
        let edits =
            update_layer_edits(&edits, &layer, Some(id.as_str()), EditOperation::Add(samples))
                .unwrap();
        (edits, id)
    }

    #[test]
    fn test_three_samples_of_one_and_a_half_reference_areas() {
        // 160 po² pour SA=100 : arrondi à 2 équivalents
        let samples = (0..3)
            .map(|i| square_sample(&i.to_string(), -77.03 + i as f64 * 0.001, 160.0))
            .collect();
        let (edits, id) = scenario_with_samples(samples);

        let mut engine = CalculateEngine::new(SpatialReference::WebMercator);
        assert_eq!(engine.on_edits_changed(&edits, Some(id.as_str())), CalculateStatus::Fetching);
        let results = engine.run(&edits, &id).unwrap();

        assert_eq!(results.status, CalculateStatus::Success);
        let data = results.data.as_ref().unwrap();
        assert_eq!(data.total_samples, 6);
        assert_eq!(data.user_defined_samples, 3);
        assert!((data.time_to_prepare_kits - 6.0).abs() < 1e-9);
        assert!((data.time_to_collect - 12.0).abs() < 1e-9);
        assert!(engine
            .measured_features()
            .iter()
            .all(|f| f.attr_f64(attr::AC) == Some(2.0)));
    }

    #[test]
    fn test_lod_summed_unscaled() {
        let (edits, id) = scenario_with_samples(vec![square_sample("a", -77.03, 400.0)]);
        let features = edits.scenario_features(&id);
        let plan = calculate_plan(&features, &CalculateSettings::default(), SpatialReference::WebMercator)
            .unwrap()
            .unwrap();
        assert_eq!(plan.totals.ac, 4);
        assert_eq!(plan.totals.lod_p, 5.0);
        assert_eq!(plan.totals.sa, 100.0);
        assert!((plan.totals.ttpk - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_calculation_is_idempotent() {
        let (edits, id) = scenario_with_samples(vec![
            square_sample("a", -77.03, 250.0),
            square_sample("b", -77.02, 90.0),
        ]);
        let features = edits.scenario_features(&id);
        let settings = CalculateSettings::default();
        let first = calculate_plan(&features, &settings, SpatialReference::WebMercator).unwrap();
        let second = calculate_plan(&features, &settings, SpatialReference::WebMercator).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_features_is_none() {
        let (edits, id) = scenario_with_samples(vec![]);
        let mut engine = CalculateEngine::new(SpatialReference::WebMercator);
        assert_eq!(engine.on_edits_changed(&edits, Some(id.as_str())), CalculateStatus::None);
        assert_eq!(engine.on_edits_changed(&edits, None), CalculateStatus::None);
    }

    #[test]
    fn test_features_without_area_give_none() {
        let point = Feature::new(Some(geojson::Geometry::new(geojson::Value::Point(vec![
            0.0, 0.0,
        ]))))
        .with_attr(attr::PERMANENT_IDENTIFIER, "p");
        let (edits, id) = scenario_with_samples(vec![point]);

        let mut engine = CalculateEngine::new(SpatialReference::WebMercator);
        assert_eq!(engine.on_edits_changed(&edits, Some(id.as_str())), CalculateStatus::Fetching);
        let results = engine.run(&edits, &id).unwrap();
        assert_eq!(results.status, CalculateStatus::None);
        assert!(results.data.is_none());
    }

    #[test]
    fn test_properties_change_does_not_recalculate() {
        let (edits, id) = scenario_with_samples(vec![square_sample("a", -77.03, 200.0)]);
        let mut engine = CalculateEngine::new(SpatialReference::WebMercator);
        engine.on_edits_changed(&edits, Some(id.as_str()));
        engine.run(&edits, &id).unwrap();
        assert_eq!(engine.status(), CalculateStatus::Success);

        let renamed = update_scenario_properties(&edits, &id, "Renamed", "").unwrap();
        assert_eq!(engine.on_edits_changed(&renamed, Some(id.as_str())), CalculateStatus::Success);

        // même count : pas de nouvelle passe
        assert_eq!(engine.on_edits_changed(&renamed, Some(id.as_str())), CalculateStatus::Success);
    }

    #[test]
    fn test_invalid_settings_fail() {
        let (edits, id) = scenario_with_samples(vec![square_sample("a", -77.03, 200.0)]);
        let mut scenario_edits = edits.clone();
        if let Some(scenario) = scenario_edits.find_scenario_mut(&id) {
            scenario.calculate_settings.current.num_labs = 0.0;
        }

        let mut engine = CalculateEngine::new(SpatialReference::WebMercator);
        engine.on_edits_changed(&scenario_edits, Some(id.as_str()));
        assert!(matches!(
            engine.run(&scenario_edits, &id),
            Err(TotsError::InvalidSettings(_))
        ));
        assert_eq!(engine.status(), CalculateStatus::Failure);

        // des paramètres valides relancent le calcul
        let fixed = set_calculate_settings(&edits, &id, CalculateSettings::default()).unwrap();
        assert_eq!(engine.on_edits_changed(&fixed, Some(id.as_str())), CalculateStatus::Fetching);
        assert_eq!(engine.run(&fixed, &id).unwrap().status, CalculateStatus::Success);
    }
}

//! Passe d'agrégation et totaux dérivés du plan d'échantillonnage

use serde::{Deserialize, Serialize};

use super::measure::SampleMeasure;
use super::settings::CalculateSettings;
use crate::types::{attr, Feature};

/// Sommes des attributs de coût/temps sur un scénario
///
/// Les champs de coût et de temps sont multipliés par `AC` ; `LOD_P`,
/// `LOD_NON` et `SA` sont des valeurs de référence sommées telles quelles.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub ttpk: f64,
    pub ttc: f64,
    pub tta: f64,
    pub ttps: f64,
    pub lod_p: f64,
    pub lod_non: f64,
    pub mcps: f64,
    pub tcps: f64,
    pub wvps: f64,
    pub wwps: f64,
    pub sa: f64,
    pub alc: f64,
    pub amc: f64,
    pub ac: u64,
}

impl Totals {
    /// Agrège les mesures dans leur ordre
    pub fn aggregate(measures: &[SampleMeasure]) -> Self {
        measures.iter().fold(Self::default(), |mut totals, measure| {
            totals.add(&measure.feature, measure.area_count);
            totals
        })
    }

    fn add(&mut self, feature: &Feature, area_count: u64) {
        let ac = area_count as f64;
        let scaled = |key: &str| feature.attr_f64(key).unwrap_or(0.0) * ac;
        let plain = |key: &str| feature.attr_f64(key).unwrap_or(0.0);

        self.ttpk += scaled(attr::TTPK);
        self.ttc += scaled(attr::TTC);
        self.tta += scaled(attr::TTA);
        self.ttps += scaled(attr::TTPS);
        self.mcps += scaled(attr::MCPS);
        self.tcps += scaled(attr::TCPS);
        self.wvps += scaled(attr::WVPS);
        self.wwps += scaled(attr::WWPS);
        self.alc += scaled(attr::ALC);
        self.amc += scaled(attr::AMC);

        self.lod_p += plain(attr::LOD_P);
        self.lod_non += plain(attr::LOD_NON);
        self.sa += plain(attr::SA);

        self.ac += area_count;
    }
}

/// Facteur limitant la durée totale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitingFactor {
    Sampling,
    Analysis,
}

/// Résultats détaillés d'un calcul de plan
///
/// Les noms sérialisés sont les libellés affichés dans le rapport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculateResultsData {
    #[serde(rename = "User Specified Number of Available Teams for Sampling")]
    pub num_sampling_teams: f64,
    #[serde(rename = "User Specified Personnel per Sampling Team")]
    pub num_sampling_personnel: f64,
    #[serde(rename = "User Specified Sampling Team Hours per Shift")]
    pub num_sampling_hours: f64,
    #[serde(rename = "User Specified Sampling Team Shifts per Day")]
    pub num_sampling_shifts: f64,
    #[serde(rename = "User Specified Sampling Team Labor Cost")]
    pub sampling_labor_cost: f64,
    #[serde(rename = "User Specified Number of Available Labs for Analysis")]
    pub num_labs: f64,
    #[serde(rename = "User Specified Analysis Lab Hours per Day")]
    pub num_lab_hours: f64,
    #[serde(rename = "User Specified Surface Area")]
    pub surface_area: f64,
    #[serde(rename = "Total Number of User-Defined Samples")]
    pub user_defined_samples: usize,

    #[serde(rename = "Total Number of Samples")]
    pub total_samples: u64,
    #[serde(rename = "Total Sampled Area")]
    pub total_sampled_area: f64,
    #[serde(rename = "Time to Prepare Kits")]
    pub time_to_prepare_kits: f64,
    #[serde(rename = "Time to Collect")]
    pub time_to_collect: f64,
    #[serde(rename = "Sampling Material Cost")]
    pub sampling_material_cost: f64,
    #[serde(rename = "Time to Analyze")]
    pub time_to_analyze: f64,
    #[serde(rename = "Analysis Labor Cost")]
    pub analysis_labor_cost: f64,
    #[serde(rename = "Analysis Material Cost")]
    pub analysis_material_cost: f64,
    #[serde(rename = "Waste Volume")]
    pub waste_volume: f64,
    #[serde(rename = "Waste Weight")]
    pub waste_weight: f64,

    #[serde(rename = "User Specified Total AOI")]
    pub user_specified_aoi: Option<f64>,
    #[serde(rename = "Percent of Area Sampled")]
    pub percent_area_sampled: Option<f64>,

    #[serde(rename = "Total Required Sampling Time")]
    pub total_required_sampling_time: f64,
    #[serde(rename = "Sampling Hours per Day")]
    pub sampling_hours_per_day: f64,
    #[serde(rename = "Sampling Personnel hours per Day")]
    pub sampling_personnel_hours_per_day: f64,
    #[serde(rename = "Sampling Personnel Labor Cost")]
    pub sampling_personnel_labor_cost: f64,
    #[serde(rename = "Time to Complete Sampling")]
    pub time_to_complete_sampling: f64,
    #[serde(rename = "Total Sampling Labor Cost")]
    pub total_sampling_labor_cost: f64,
    #[serde(rename = "Total Sampling Cost")]
    pub total_sampling_cost: f64,
    #[serde(rename = "Total Analysis Cost")]
    pub total_analysis_cost: f64,

    #[serde(rename = "Time to Complete Analyses")]
    pub time_to_complete_analyses: f64,

    #[serde(rename = "Total Cost")]
    pub total_cost: f64,
    #[serde(rename = "Total Time")]
    pub total_time: f64,
    #[serde(rename = "Limiting Time Factor")]
    pub limiting_factor: LimitingFactor,
}

impl CalculateResultsData {
    /// Calcule les totaux dérivés à partir des sommes et des paramètres
    ///
    /// `total_area_sq_ft` est la surface échantillonnée totale en pieds
    /// carrés. Les paramètres doivent avoir été validés.
    pub fn derive(
        totals: &Totals,
        total_area_sq_ft: f64,
        user_defined_samples: usize,
        settings: &CalculateSettings,
    ) -> Self {
        let (user_specified_aoi, percent_area_sampled) = if settings.surface_area > 0.0 {
            (
                Some(settings.surface_area),
                Some(total_area_sq_ft / settings.surface_area * 100.0),
            )
        } else {
            (None, None)
        };

        let teams = settings.num_sampling_teams;
        let personnel = settings.num_sampling_personnel;
        let hours = settings.num_sampling_hours;
        let shifts = settings.num_sampling_shifts;

        // Échantillonnage
        let sampling_time_hours = totals.ttpk + totals.ttc;
        let sampling_hours = teams * hours * shifts;
        let sampling_personnel_hours_per_day = sampling_hours * personnel;
        let sampling_personnel_labor_cost = settings.sampling_labor_cost / personnel;
        let time_complete_sampling = (totals.ttc + totals.ttpk) / sampling_hours;
        let total_sampling_labor_cost = teams
            * personnel
            * hours
            * shifts
            * sampling_personnel_labor_cost
            * time_complete_sampling;

        // Analyse
        let total_lab_hours = settings.num_labs * settings.num_lab_hours;
        let mut lab_throughput = totals.tta / total_lab_hours;

        let total_sampling_cost = total_sampling_labor_cost + totals.mcps;
        let total_analysis_cost = totals.alc + totals.amc;
        let total_cost = total_sampling_cost + total_analysis_cost;

        // Un jour d'expédition vers le laboratoire avant le début des analyses
        let (total_time, limiting_factor) = if lab_throughput + 1.0 < time_complete_sampling {
            (time_complete_sampling, LimitingFactor::Sampling)
        } else {
            lab_throughput += 1.0;
            (lab_throughput, LimitingFactor::Analysis)
        };

        Self {
            num_sampling_teams: teams,
            num_sampling_personnel: personnel,
            num_sampling_hours: hours,
            num_sampling_shifts: shifts,
            sampling_labor_cost: settings.sampling_labor_cost,
            num_labs: settings.num_labs,
            num_lab_hours: settings.num_lab_hours,
            surface_area: settings.surface_area,
            user_defined_samples,

            total_samples: totals.ac,
            total_sampled_area: total_area_sq_ft,
            time_to_prepare_kits: totals.ttpk,
            time_to_collect: totals.ttc,
            sampling_material_cost: totals.mcps,
            time_to_analyze: totals.tta,
            analysis_labor_cost: totals.alc,
            analysis_material_cost: totals.amc,
            waste_volume: totals.wvps,
            waste_weight: totals.wwps,

            user_specified_aoi,
            percent_area_sampled,

            total_required_sampling_time: sampling_time_hours,
            sampling_hours_per_day: sampling_hours,
            sampling_personnel_hours_per_day,
            sampling_personnel_labor_cost,
            time_to_complete_sampling: time_complete_sampling,
            total_sampling_labor_cost,
            total_sampling_cost,
            total_analysis_cost,

            time_to_complete_analyses: lab_throughput,

            total_cost,
            total_time: (total_time * 10.0).round() / 10.0,
            limiting_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(ttpk: f64, ttc: f64, tta: f64) -> Totals {
        Totals {
            ttpk,
            ttc,
            tta,
            mcps: 10.0,
            alc: 20.0,
            amc: 5.0,
            ac: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_sampling_limited() {
        // 50 h de collecte pour 5 h/jour = 10 jours ; analyse 24/24 + 1 = 2 jours
        let data = CalculateResultsData::derive(
            &totals(20.0, 30.0, 24.0),
            12.0,
            3,
            &CalculateSettings::default(),
        );
        assert_eq!(data.sampling_hours_per_day, 5.0);
        assert_eq!(data.time_to_complete_sampling, 10.0);
        assert_eq!(data.limiting_factor, LimitingFactor::Sampling);
        assert_eq!(data.total_time, 10.0);
        assert_eq!(data.time_to_complete_analyses, 1.0);
        // 1 * 3 * 5 * 1 * (420 / 3) * 10
        assert!((data.total_sampling_labor_cost - 21_000.0).abs() < 1e-9);
        assert!((data.total_cost - (21_000.0 + 10.0 + 25.0)).abs() < 1e-9);
        assert_eq!(data.percent_area_sampled, None);
    }

    #[test]
    fn test_analysis_limited_adds_one_day() {
        let data = CalculateResultsData::derive(
            &totals(1.0, 4.0, 48.0),
            12.0,
            3,
            &CalculateSettings::default(),
        );
        assert_eq!(data.time_to_complete_sampling, 1.0);
        assert_eq!(data.time_to_complete_analyses, 3.0);
        assert_eq!(data.total_time, 3.0);
        assert_eq!(data.limiting_factor, LimitingFactor::Analysis);
    }

    #[test]
    fn test_tie_goes_to_analysis() {
        // analyse + 1 == collecte
        let data = CalculateResultsData::derive(
            &totals(5.0, 5.0, 24.0),
            1.0,
            1,
            &CalculateSettings::default(),
        );
        assert_eq!(data.time_to_complete_sampling, 2.0);
        assert_eq!(data.limiting_factor, LimitingFactor::Analysis);
        assert_eq!(data.total_time, 2.0);
    }

    #[test]
    fn test_percent_area_sampled() {
        let settings = CalculateSettings {
            surface_area: 200.0,
            ..Default::default()
        };
        let data = CalculateResultsData::derive(&totals(1.0, 1.0, 1.0), 50.0, 1, &settings);
        assert_eq!(data.user_specified_aoi, Some(200.0));
        assert_eq!(data.percent_area_sampled, Some(25.0));
    }

    #[test]
    fn test_total_time_rounded_to_one_decimal() {
        let data = CalculateResultsData::derive(
            &totals(0.0, 0.0, 10.0),
            1.0,
            1,
            &CalculateSettings::default(),
        );
        // 10 / 24 + 1 = 1.41666...
        assert_eq!(data.total_time, 1.4);
        assert!((data.time_to_complete_analyses - 1.416_666).abs() < 1e-5);
    }

    #[test]
    fn test_serialized_labels() {
        let data = CalculateResultsData::derive(
            &totals(1.0, 1.0, 1.0),
            1.0,
            1,
            &CalculateSettings::default(),
        );
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["Total Number of Samples"], 3);
        assert_eq!(json["Limiting Time Factor"], "Analysis");
        assert!(json["Percent of Area Sampled"].is_null());
    }
}

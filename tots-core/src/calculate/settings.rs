//! Paramètres de calcul d'un scénario (équipes, laboratoires, coûts)

use serde::{Deserialize, Serialize};

use crate::error::{Result, TotsError};

/// Paramètres saisis par l'utilisateur pour un scénario
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CalculateSettings {
    #[serde(rename = "OBJECTID", default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<i64>,
    /// Nombre de laboratoires disponibles pour l'analyse
    pub num_labs: f64,
    /// Heures de laboratoire par jour
    pub num_lab_hours: f64,
    /// Heures par équipe et par poste
    pub num_sampling_hours: f64,
    /// Personnel par équipe
    pub num_sampling_personnel: f64,
    /// Postes par jour
    pub num_sampling_shifts: f64,
    /// Nombre d'équipes
    pub num_sampling_teams: f64,
    /// Coût de main d'œuvre d'une équipe
    pub sampling_labor_cost: f64,
    /// Surface totale de la zone d'intérêt (pieds carrés), 0 si inconnue
    pub surface_area: f64,
}

impl Default for CalculateSettings {
    fn default() -> Self {
        Self {
            object_id: None,
            num_labs: 1.0,
            num_lab_hours: 24.0,
            num_sampling_hours: 5.0,
            num_sampling_personnel: 3.0,
            num_sampling_shifts: 1.0,
            num_sampling_teams: 1.0,
            sampling_labor_cost: 420.0,
            surface_area: 0.0,
        }
    }
}

impl CalculateSettings {
    /// Vérifie que tous les champs sont renseignés et exploitables
    ///
    /// Les diviseurs (laboratoires, heures, personnel...) doivent être
    /// strictement positifs, la surface et le coût positifs ou nuls.
    pub fn validate(&self) -> Result<()> {
        let divisors = [
            ("NUM_LABS", self.num_labs),
            ("NUM_LAB_HOURS", self.num_lab_hours),
            ("NUM_SAMPLING_HOURS", self.num_sampling_hours),
            ("NUM_SAMPLING_PERSONNEL", self.num_sampling_personnel),
            ("NUM_SAMPLING_SHIFTS", self.num_sampling_shifts),
            ("NUM_SAMPLING_TEAMS", self.num_sampling_teams),
        ];
        for (name, value) in divisors {
            if !value.is_finite() || value <= 0.0 {
                return Err(TotsError::InvalidSettings(format!(
                    "{} must be a positive number (got {})",
                    name, value
                )));
            }
        }

        for (name, value) in [
            ("SAMPLING_LABOR_COST", self.sampling_labor_cost),
            ("SURFACE_AREA", self.surface_area),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(TotsError::InvalidSettings(format!(
                    "{} must be zero or positive (got {})",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

/// Paramètres courants et derniers paramètres publiés d'un scénario
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CalculateSettingsPair {
    pub current: CalculateSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<CalculateSettings>,
}

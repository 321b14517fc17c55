//! Persistance de la session
//!
//! Chaque tranche d'état (ledger, sélections, paramètres de calcul, types
//! d'échantillons utilisateur, étendue de carte...) est stockée sous une clé
//! fixe, en JSON. Une tranche n'est écrite qu'après avoir été restaurée une
//! fois : avant cela, l'état en mémoire n'est que la valeur par défaut et ne
//! doit pas écraser la session stockée.
//!
//! Le ledger n'est réécrit que lorsque son `count` change.

mod storage;

pub use storage::{CapacityWarning, FileStorage, MemoryStorage, Storage};

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tots_core::edits::EditsItem;
use tots_core::sample_types::SampleTypeOption;
use tots_core::types::EditType;
use tots_core::{CalculateSettings, Edits, Registry, UserDefinedAttributes};

/// Tranches d'état persistées
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slice {
    Edits,
    SelectedScenario,
    SelectedSampleLayer,
    CalculateSettings,
    UserDefinedAttributes,
    MapExtent,
    Basemap,
    SampleTypeSelections,
    TrainingMode,
}

impl Slice {
    pub const ALL: [Slice; 9] = [
        Slice::Edits,
        Slice::SelectedScenario,
        Slice::SelectedSampleLayer,
        Slice::CalculateSettings,
        Slice::UserDefinedAttributes,
        Slice::MapExtent,
        Slice::Basemap,
        Slice::SampleTypeSelections,
        Slice::TrainingMode,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Slice::Edits => "tots_edits",
            Slice::SelectedScenario => "tots_selected_scenario",
            Slice::SelectedSampleLayer => "tots_selected_sample_layer",
            Slice::CalculateSettings => "tots_calculate_settings",
            Slice::UserDefinedAttributes => "tots_user_defined_sample_attributes",
            Slice::MapExtent => "tots_map_extent",
            Slice::Basemap => "tots_selected_basemap_layer",
            Slice::SampleTypeSelections => "tots_sample_type_selections",
            Slice::TrainingMode => "tots_training_mode",
        }
    }
}

/// Paramètres de calcul tels que saisis dans le panneau
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCalculateSettings {
    pub num_labs: f64,
    pub num_lab_hours: f64,
    pub num_sampling_hours: f64,
    pub num_sampling_personnel: f64,
    pub num_sampling_shifts: f64,
    pub num_sampling_teams: f64,
    pub sampling_labor_cost: f64,
    pub surface_area: f64,
}

impl From<CalculateSettings> for StoredCalculateSettings {
    fn from(s: CalculateSettings) -> Self {
        Self {
            num_labs: s.num_labs,
            num_lab_hours: s.num_lab_hours,
            num_sampling_hours: s.num_sampling_hours,
            num_sampling_personnel: s.num_sampling_personnel,
            num_sampling_shifts: s.num_sampling_shifts,
            num_sampling_teams: s.num_sampling_teams,
            sampling_labor_cost: s.sampling_labor_cost,
            surface_area: s.surface_area,
        }
    }
}

impl From<StoredCalculateSettings> for CalculateSettings {
    fn from(s: StoredCalculateSettings) -> Self {
        Self {
            object_id: None,
            num_labs: s.num_labs,
            num_lab_hours: s.num_lab_hours,
            num_sampling_hours: s.num_sampling_hours,
            num_sampling_personnel: s.num_sampling_personnel,
            num_sampling_shifts: s.num_sampling_shifts,
            num_sampling_teams: s.num_sampling_teams,
            sampling_labor_cost: s.sampling_labor_cost,
            surface_area: s.surface_area,
        }
    }
}

/// Étendue de la carte
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapExtent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub spatial_reference: Wkid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wkid {
    pub wkid: u32,
}

/// Sélection restaurée : scénario et couche d'échantillons
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    pub scenario_id: Option<String>,
    pub sample_layer_id: Option<String>,
}

/// Session persistée au-dessus d'un [`Storage`]
pub struct Session<S: Storage> {
    storage: S,
    initialized: HashSet<Slice>,
    saved_count: Option<u64>,
    warnings: Vec<CapacityWarning>,
}

impl<S: Storage> Session<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            initialized: HashSet::new(),
            saved_count: None,
            warnings: Vec::new(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn is_initialized(&self, slice: Slice) -> bool {
        self.initialized.contains(&slice)
    }

    /// Avertissements de capacité levés depuis l'ouverture
    pub fn warnings(&self) -> &[CapacityWarning] {
        &self.warnings
    }

    fn read_raw(&mut self, slice: Slice) -> Result<Option<String>> {
        self.initialized.insert(slice);
        let value = self.storage.get(slice.key())?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    fn read_json<T: DeserializeOwned>(&mut self, slice: Slice) -> Result<Option<T>> {
        let Some(raw) = self.read_raw(slice)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = slice.key(), error = %e, "Valeur de session illisible, ignorée");
                Ok(None)
            }
        }
    }

    fn write_raw(&mut self, slice: Slice, value: &str) -> Result<Option<CapacityWarning>> {
        if !self.is_initialized(slice) {
            debug!(key = slice.key(), "Tranche non restaurée, écriture ignorée");
            return Ok(None);
        }
        let warning = self.storage.set(slice.key(), value)?;
        if let Some(w) = &warning {
            self.warnings.push(w.clone());
        }
        Ok(warning)
    }

    fn write_json<T: Serialize>(&mut self, slice: Slice, value: &T) -> Result<Option<CapacityWarning>> {
        if !self.is_initialized(slice) {
            debug!(key = slice.key(), "Tranche non restaurée, écriture ignorée");
            return Ok(None);
        }
        let json = serde_json::to_string(value)
            .context(format!("Failed to serialize session key: {}", slice.key()))?;
        self.write_raw(slice, &json)
    }

    /// Restaure le ledger ; chaque entrée racine repasse en `add`
    pub fn restore_edits(&mut self) -> Result<Option<Edits>> {
        let Some(mut edits) = self.read_json::<Edits>(Slice::Edits)? else {
            return Ok(None);
        };
        for item in &mut edits.edits {
            match item {
                EditsItem::Scenario(s) => s.edit_type = EditType::Add,
                EditsItem::Layer(l) => l.edit_type = EditType::Add,
            }
        }
        self.saved_count = Some(edits.count);
        info!(count = edits.count, items = edits.edits.len(), "Ledger restauré");
        Ok(Some(edits))
    }

    /// Enregistre le ledger s'il a changé depuis la dernière écriture
    pub fn save_edits(&mut self, edits: &Edits) -> Result<Option<CapacityWarning>> {
        if self.is_initialized(Slice::Edits) && self.saved_count == Some(edits.count) {
            return Ok(None);
        }
        let warning = self.write_json(Slice::Edits, edits)?;
        if warning.is_none() && self.is_initialized(Slice::Edits) {
            self.saved_count = Some(edits.count);
        }
        Ok(warning)
    }

    /// Restaure la sélection, en ignorant les identifiants disparus
    pub fn restore_selection(&mut self, edits: &Edits, registry: &Registry) -> Result<Selection> {
        let scenario_id = self
            .read_raw(Slice::SelectedScenario)?
            .filter(|id| edits.find_scenario(id).is_some());
        let sample_layer_id = self
            .read_raw(Slice::SelectedSampleLayer)?
            .filter(|id| registry.find(id).is_some());
        Ok(Selection {
            scenario_id,
            sample_layer_id,
        })
    }

    pub fn save_selection(&mut self, selection: &Selection) -> Result<Vec<CapacityWarning>> {
        let scenario = selection.scenario_id.as_deref().unwrap_or("");
        let layer = selection.sample_layer_id.as_deref().unwrap_or("");
        let warnings = [
            self.write_raw(Slice::SelectedScenario, scenario)?,
            self.write_raw(Slice::SelectedSampleLayer, layer)?,
        ];
        Ok(warnings.into_iter().flatten().collect())
    }

    pub fn restore_calculate_settings(&mut self) -> Result<Option<CalculateSettings>> {
        Ok(self
            .read_json::<StoredCalculateSettings>(Slice::CalculateSettings)?
            .map(CalculateSettings::from))
    }

    pub fn save_calculate_settings(&mut self, settings: CalculateSettings) -> Result<Option<CapacityWarning>> {
        self.write_json(Slice::CalculateSettings, &StoredCalculateSettings::from(settings))
    }

    pub fn restore_user_defined(&mut self) -> Result<Option<UserDefinedAttributes>> {
        self.read_json(Slice::UserDefinedAttributes)
    }

    pub fn save_user_defined(&mut self, attributes: &UserDefinedAttributes) -> Result<Option<CapacityWarning>> {
        self.write_json(Slice::UserDefinedAttributes, attributes)
    }

    pub fn restore_map_extent(&mut self) -> Result<Option<MapExtent>> {
        self.read_json(Slice::MapExtent)
    }

    pub fn save_map_extent(&mut self, extent: &MapExtent) -> Result<Option<CapacityWarning>> {
        self.write_json(Slice::MapExtent, extent)
    }

    pub fn restore_basemap(&mut self) -> Result<Option<String>> {
        self.read_raw(Slice::Basemap)
    }

    pub fn save_basemap(&mut self, portal_id: &str) -> Result<Option<CapacityWarning>> {
        self.write_raw(Slice::Basemap, portal_id)
    }

    pub fn restore_sample_type_selections(&mut self) -> Result<Vec<SampleTypeOption>> {
        Ok(self.read_json(Slice::SampleTypeSelections)?.unwrap_or_default())
    }

    pub fn save_sample_type_selections(
        &mut self,
        selections: &[SampleTypeOption],
    ) -> Result<Option<CapacityWarning>> {
        self.write_json(Slice::SampleTypeSelections, &selections)
    }

    pub fn restore_training_mode(&mut self) -> Result<bool> {
        Ok(self.read_json(Slice::TrainingMode)?.unwrap_or(false))
    }

    pub fn save_training_mode(&mut self, training_mode: bool) -> Result<Option<CapacityWarning>> {
        self.write_json(Slice::TrainingMode, &training_mode)
    }

    /// Efface toutes les clés de la session
    pub fn clear(&mut self) -> Result<()> {
        for slice in Slice::ALL {
            self.storage.remove(slice.key())?;
        }
        self.saved_count = None;
        info!("Session effacée");
        Ok(())
    }
}

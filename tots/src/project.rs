//! Plan ouvert : session persistée + ledger + registre + catalogue

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use tots_core::layer::DEFAULT_SAMPLE_LAYER_NAME;
use tots_core::{
    CalculateSettings, Edits, LayerInfo, NullRenderer, Registry, SampleTypeCatalog,
};

use crate::session::{CapacityWarning, Selection, Session, Storage};

/// État de travail reconstruit depuis la session
pub struct Project<S: Storage> {
    pub session: Session<S>,
    pub edits: Edits,
    pub registry: Registry,
    pub catalog: SampleTypeCatalog,
    pub selection: Selection,
    /// Derniers paramètres saisis dans le panneau de calcul
    pub calculate_settings: CalculateSettings,
    pub training_mode: bool,
}

impl<S: Storage> Project<S> {
    /// Restaure toutes les tranches de la session
    pub fn open(storage: S) -> Result<Self> {
        let mut session = Session::new(storage);

        let edits = session.restore_edits()?.unwrap_or_default();
        let registry = Registry::from_edits(&edits);

        let mut catalog = SampleTypeCatalog::embedded().context("Failed to load sample types")?;
        if let Some(user_defined) = session.restore_user_defined()? {
            catalog.set_user_defined(user_defined);
        }

        let selection = session.restore_selection(&edits, &registry)?;
        let calculate_settings = session.restore_calculate_settings()?.unwrap_or_default();
        let training_mode = session.restore_training_mode()?;

        debug!(
            count = edits.count,
            layers = registry.layers().len(),
            scenario = ?selection.scenario_id,
            "Session ouverte"
        );
        Ok(Self {
            session,
            edits,
            registry,
            catalog,
            selection,
            calculate_settings,
            training_mode,
        })
    }

    /// Enregistre les tranches modifiées ; retourne les avertissements de capacité
    pub fn save(&mut self) -> Result<Vec<CapacityWarning>> {
        let mut warnings = Vec::new();
        warnings.extend(self.session.save_edits(&self.edits)?);
        warnings.extend(self.session.save_selection(&self.selection)?);
        warnings.extend(self.session.save_user_defined(self.catalog.user_defined())?);
        warnings.extend(self.session.save_calculate_settings(self.calculate_settings)?);
        warnings.extend(self.session.save_training_mode(self.training_mode)?);

        for w in &warnings {
            warn!(key = %w.key, "{}", w);
        }
        Ok(warnings)
    }

    /// Crée un scénario avec sa couche d'échantillons par défaut et le sélectionne
    pub fn create_scenario(
        &mut self,
        name: &str,
        description: &str,
        settings: CalculateSettings,
    ) -> Result<String> {
        let (edits, scenario_id) =
            self.registry
                .add_scenario(&self.edits, name, description, settings, &mut NullRenderer)?;
        let layer = LayerInfo::sample_layer(DEFAULT_SAMPLE_LAYER_NAME, Some(scenario_id.as_str()));
        let layer_id = layer.layer_id.clone();
        self.edits = self.registry.add_layer(&edits, layer, &mut NullRenderer)?;

        self.selection = Selection {
            scenario_id: Some(scenario_id.clone()),
            sample_layer_id: Some(layer_id),
        };
        info!(scenario = %scenario_id, name, "Scénario créé");
        Ok(scenario_id)
    }

    /// Résout un scénario par identifiant ou par nom ; à défaut la sélection,
    /// puis le premier scénario
    pub fn resolve_scenario(&self, spec: Option<&str>) -> Result<String> {
        if let Some(spec) = spec {
            return self
                .edits
                .scenarios()
                .find(|s| s.layer_id == spec || s.scenario_name == spec)
                .map(|s| s.layer_id.clone())
                .with_context(|| format!("Scenario not found: {}", spec));
        }

        self.selection
            .scenario_id
            .clone()
            .or_else(|| self.edits.scenarios().next().map(|s| s.layer_id.clone()))
            .context("No scenario in this session. Create one with `tots scenario`")
    }

    /// Couche d'échantillons active d'un scénario (créée si besoin)
    pub fn sample_layer(&mut self, scenario_id: &str) -> Result<LayerInfo> {
        let selected = self
            .selection
            .sample_layer_id
            .as_deref()
            .and_then(|id| self.registry.find(id))
            .filter(|l| l.parent_layer_id.as_deref() == Some(scenario_id))
            .filter(|l| l.layer_type.is_samples())
            .cloned();
        if let Some(layer) = selected {
            return Ok(layer);
        }

        let existing = self
            .registry
            .layers_in(scenario_id)
            .find(|l| l.layer_type.is_samples())
            .cloned();
        let layer = match existing {
            Some(layer) => layer,
            None => {
                let layer = LayerInfo::sample_layer(DEFAULT_SAMPLE_LAYER_NAME, Some(scenario_id));
                self.edits = self.registry.add_layer(&self.edits, layer.clone(), &mut NullRenderer)?;
                layer
            }
        };

        self.selection.scenario_id = Some(scenario_id.to_string());
        self.selection.sample_layer_id = Some(layer.layer_id.clone());
        Ok(layer)
    }

    pub fn storage(&self) -> &S {
        self.session.storage()
    }
}

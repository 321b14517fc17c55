//! Registre des couches et scénarios
//!
//! Le registre est le modèle de domaine pur : la liste des couches connues
//! et leur rattachement à un scénario. Les objets de rendu (couches
//! graphiques de la carte) sont gérés par un collaborateur externe, joint
//! uniquement via [`RenderAdapter`] et les identifiants `layer_id`.
//!
//! Chaque opération prend le ledger courant et retourne le nouveau ledger,
//! en tenant le registre synchronisé.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calculate::CalculateSettings;
use crate::edits::{update_layer_edits, EditOperation, Edits, EditsItem, LayerEdits, ScenarioEdits};
use crate::error::{Result, TotsError};
use crate::layer::LayerInfo;
use crate::types::{attr, generate_uuid, EditType, Feature, PublishStatus};

/// Projection des changements du domaine sur les objets de rendu
pub trait RenderAdapter {
    /// Crée l'objet de rendu d'une couche (dans son groupe parent s'il y en a un)
    fn attach(&mut self, layer: &LayerInfo);

    /// Crée le groupe de rendu d'un scénario
    fn attach_group(&mut self, scenario: &ScenarioEdits);

    /// Détruit l'objet de rendu d'une couche ou d'un groupe
    fn detach(&mut self, layer_id: &str);

    /// Déplace l'objet de rendu d'une couche vers un groupe, ou à la racine
    fn reparent(&mut self, layer_id: &str, parent_id: Option<&str>);
}

/// Adaptateur sans rendu (CLI, tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl RenderAdapter for NullRenderer {
    fn attach(&mut self, _layer: &LayerInfo) {}
    fn attach_group(&mut self, _scenario: &ScenarioEdits) {}
    fn detach(&mut self, _layer_id: &str) {}
    fn reparent(&mut self, _layer_id: &str, _parent_id: Option<&str>) {}
}

/// Liste logique des couches
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Registry {
    layers: Vec<LayerInfo>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstruit le registre depuis un ledger restauré
    pub fn from_edits(edits: &Edits) -> Self {
        let layers = edits
            .edits
            .iter()
            .flat_map(|item| match item {
                EditsItem::Layer(l) => vec![l.to_layer_info(None)],
                EditsItem::Scenario(s) => s
                    .layers
                    .iter()
                    .map(|l| l.to_layer_info(Some(s.layer_id.as_str())))
                    .collect(),
            })
            .collect();
        Self { layers }
    }

    pub fn layers(&self) -> &[LayerInfo] {
        &self.layers
    }

    pub fn find(&self, layer_id: &str) -> Option<&LayerInfo> {
        self.layers.iter().find(|l| l.layer_id == layer_id)
    }

    fn find_mut(&mut self, layer_id: &str) -> Option<&mut LayerInfo> {
        self.layers.iter_mut().find(|l| l.layer_id == layer_id)
    }

    /// Premier libellé libre dérivé de `desired` : `nom`, `nom (1)`, `nom (2)`...
    pub fn unique_label(&self, desired: &str) -> String {
        first_free(desired, |candidate| self.layers.iter().any(|l| l.label == candidate))
    }

    /// Premier nom de scénario libre dérivé de `desired`
    pub fn unique_scenario_name(edits: &Edits, desired: &str) -> String {
        first_free(desired, |candidate| {
            edits.scenarios().any(|s| s.scenario_name == candidate)
        })
    }

    /// Couches rattachées à un scénario
    pub fn layers_in(&self, scenario_id: &str) -> impl Iterator<Item = &LayerInfo> {
        let scenario_id = scenario_id.to_string();
        self.layers
            .iter()
            .filter(move |l| l.parent_layer_id.as_deref() == Some(scenario_id.as_str()))
    }

    pub fn unlinked_layers(&self) -> impl Iterator<Item = &LayerInfo> {
        self.layers.iter().filter(|l| !l.is_linked())
    }

    /// Ajoute un scénario vide ; retourne le ledger et l'identifiant du groupe
    pub fn add_scenario(
        &mut self,
        edits: &Edits,
        name: &str,
        description: &str,
        settings: CalculateSettings,
        renderer: &mut dyn RenderAdapter,
    ) -> Result<(Edits, String)> {
        settings.validate()?;

        let scenario = ScenarioEdits::new(name, description, settings);
        let scenario_id = scenario.layer_id.clone();
        renderer.attach_group(&scenario);

        let mut next = edits.clone();
        next.edits.push(EditsItem::Scenario(scenario));
        next.bump();

        info!(scenario = %scenario_id, name, "Scénario ajouté");
        Ok((next, scenario_id))
    }

    /// Ajoute une couche au registre et au ledger
    pub fn add_layer(
        &mut self,
        edits: &Edits,
        layer: LayerInfo,
        renderer: &mut dyn RenderAdapter,
    ) -> Result<Edits> {
        self.add_layer_with_features(edits, layer, Vec::new(), renderer)
    }

    /// Ajoute une couche et ses premières features en une seule modification
    pub fn add_layer_with_features(
        &mut self,
        edits: &Edits,
        layer: LayerInfo,
        features: Vec<Feature>,
        renderer: &mut dyn RenderAdapter,
    ) -> Result<Edits> {
        let next = update_layer_edits(
            edits,
            &layer,
            layer.parent_layer_id.as_deref(),
            EditOperation::Add(features),
        )?;

        renderer.attach(&layer);
        match self.find_mut(&layer.layer_id) {
            Some(existing) => *existing = layer,
            None => self.layers.push(layer),
        }
        Ok(next)
    }

    /// Rattache une couche à un scénario
    pub fn link_layer(
        &mut self,
        edits: &Edits,
        layer_id: &str,
        scenario_id: &str,
        renderer: &mut dyn RenderAdapter,
    ) -> Result<Edits> {
        let layer = self
            .find(layer_id)
            .cloned()
            .ok_or_else(|| TotsError::LayerNotFound(layer_id.to_string()))?;
        if edits.find_scenario(scenario_id).is_none() {
            return Err(TotsError::ScenarioNotFound(scenario_id.to_string()));
        }

        let mut next = edits.clone();
        let mut entry = next
            .take_layer(layer_id)
            .unwrap_or_else(|| LayerEdits::from_layer(&layer, EditType::Move));
        entry.edit_type = EditType::Move;
        entry.mark_edited();
        next.insert_layer(entry, Some(scenario_id))?;

        if let Some(scenario) = next.find_scenario_mut(scenario_id) {
            scenario.edit_type = EditType::Move;
            scenario.mark_edited();
        }
        next.bump();

        if let Some(layer) = self.find_mut(layer_id) {
            layer.parent_layer_id = Some(scenario_id.to_string());
        }
        renderer.reparent(layer_id, Some(scenario_id));

        debug!(layer = %layer_id, scenario = %scenario_id, "Couche liée");
        Ok(next)
    }

    /// Détache une couche de son scénario et la replace à la racine
    pub fn unlink_layer(
        &mut self,
        edits: &Edits,
        layer_id: &str,
        renderer: &mut dyn RenderAdapter,
    ) -> Result<Edits> {
        if self.find(layer_id).is_none() {
            return Err(TotsError::LayerNotFound(layer_id.to_string()));
        }

        let mut next = edits.clone();
        let owner = next.scenario_of_layer(layer_id).map(|s| s.layer_id.clone());
        let entry = next
            .take_layer(layer_id)
            .ok_or_else(|| TotsError::LayerNotFound(layer_id.to_string()))?;
        next.insert_layer(entry, None)?;

        if let Some(owner) = owner.as_deref() {
            if let Some(scenario) = next.find_scenario_mut(owner) {
                scenario.mark_edited();
            }
        }
        next.bump();

        if let Some(layer) = self.find_mut(layer_id) {
            layer.parent_layer_id = None;
        }
        renderer.reparent(layer_id, None);

        debug!(layer = %layer_id, "Couche détachée");
        Ok(next)
    }

    /// Copie une couche (features comprises) sous de nouveaux identifiants
    pub fn clone_layer(
        &mut self,
        edits: &Edits,
        layer_id: &str,
        renderer: &mut dyn RenderAdapter,
    ) -> Result<(Edits, LayerInfo)> {
        let source = edits
            .find_layer(layer_id)
            .ok_or_else(|| TotsError::LayerNotFound(layer_id.to_string()))?;
        let parent = edits.scenario_of_layer(layer_id).map(|s| s.layer_id.clone());

        let copy = copy_layer_edits(source, &self.unique_label(&format!("{} (copy)", source.label)));
        let info = copy.to_layer_info(parent.as_deref());

        let mut next = edits.clone();
        next.insert_layer(copy, parent.as_deref())?;
        if let Some(parent) = parent.as_deref() {
            if let Some(scenario) = next.find_scenario_mut(parent) {
                scenario.edit_type = EditType::Add;
                scenario.mark_edited();
            }
        }
        next.bump();

        renderer.attach(&info);
        self.layers.push(info.clone());
        Ok((next, info))
    }

    /// Copie un scénario et toutes ses couches sous de nouveaux identifiants
    pub fn clone_scenario(
        &mut self,
        edits: &Edits,
        scenario_id: &str,
        renderer: &mut dyn RenderAdapter,
    ) -> Result<(Edits, String)> {
        let source = edits
            .find_scenario(scenario_id)
            .ok_or_else(|| TotsError::ScenarioNotFound(scenario_id.to_string()))?;

        let name = Self::unique_scenario_name(edits, &format!("{} (copy)", source.scenario_name));
        let mut copy = ScenarioEdits::new(
            &name,
            &source.scenario_description,
            source.calculate_settings.current,
        );
        let copy_id = copy.layer_id.clone();

        let mut infos = Vec::with_capacity(source.layers.len());
        for layer in &source.layers {
            let layer_copy = copy_layer_edits(layer, &self.unique_label(&layer.label));
            let info = layer_copy.to_layer_info(Some(copy_id.as_str()));
            self.layers.push(info.clone());
            infos.push(info);
            copy.layers.push(layer_copy);
        }

        renderer.attach_group(&copy);
        for info in &infos {
            renderer.attach(info);
        }

        let mut next = edits.clone();
        next.edits.push(EditsItem::Scenario(copy));
        next.bump();

        info!(from = %scenario_id, to = %copy_id, "Scénario copié");
        Ok((next, copy_id))
    }

    /// Supprime une couche ; retourne le ledger et la couche à sélectionner
    ///
    /// Ordre de recherche du successeur : couches d'échantillons du même
    /// scénario, puis couches d'échantillons non liées.
    pub fn delete_layer(
        &mut self,
        edits: &Edits,
        layer_id: &str,
        renderer: &mut dyn RenderAdapter,
    ) -> Result<(Edits, Option<LayerInfo>)> {
        let mut next = edits.clone();
        let owner = next.scenario_of_layer(layer_id).map(|s| s.layer_id.clone());
        let removed = next.take_layer(layer_id);
        if removed.is_none() && self.find(layer_id).is_none() {
            return Err(TotsError::LayerNotFound(layer_id.to_string()));
        }
        if let Some(owner) = owner.as_deref() {
            if let Some(scenario) = next.find_scenario_mut(owner) {
                scenario.edit_type = EditType::Delete;
                scenario.mark_edited();
            }
        }
        next.bump();

        self.layers.retain(|l| l.layer_id != layer_id);
        renderer.detach(layer_id);

        let successor = self.successor_layer(&next, owner.as_deref());
        debug!(
            layer = %layer_id,
            successor = successor.as_ref().map(|l| l.layer_id.as_str()).unwrap_or("-"),
            "Couche supprimée"
        );
        Ok((next, successor))
    }

    /// Supprime un scénario et ses couches ; retourne le ledger et le
    /// scénario à sélectionner
    pub fn delete_scenario(
        &mut self,
        edits: &Edits,
        scenario_id: &str,
        renderer: &mut dyn RenderAdapter,
    ) -> Result<(Edits, Option<String>)> {
        let mut next = edits.clone();
        let scenario = next
            .take_scenario(scenario_id)
            .ok_or_else(|| TotsError::ScenarioNotFound(scenario_id.to_string()))?;
        next.bump();

        for layer in &scenario.layers {
            renderer.detach(&layer.layer_id);
        }
        renderer.detach(scenario_id);
        self.layers
            .retain(|l| l.parent_layer_id.as_deref() != Some(scenario_id));

        let successor = next.scenarios().next().map(|s| s.layer_id.clone());
        info!(
            scenario = %scenario_id,
            layers = scenario.layers.len(),
            "Scénario supprimé"
        );
        Ok((next, successor))
    }

    fn successor_layer(&self, edits: &Edits, scenario_id: Option<&str>) -> Option<LayerInfo> {
        let sibling = scenario_id
            .and_then(|id| edits.find_scenario(id))
            .and_then(|s| s.layers.iter().find(|l| l.layer_type.is_samples()))
            .map(|l| l.layer_id.clone());
        let unlinked = || {
            edits
                .root_layers()
                .find(|l| l.layer_type.is_samples())
                .map(|l| l.layer_id.clone())
        };

        sibling
            .or_else(unlinked)
            .and_then(|id| self.find(&id).cloned())
    }
}

/// Copie profonde d'une couche : nouveaux identifiants, tout repasse en ajout
fn copy_layer_edits(source: &LayerEdits, label: &str) -> LayerEdits {
    let uuid = generate_uuid();
    let adds: Vec<Feature> = source
        .current_features()
        .into_iter()
        .map(|f| {
            let mut copy = f.clone();
            let id = generate_uuid();
            copy.set_attr(attr::PERMANENT_IDENTIFIER, id.clone());
            copy.set_attr(attr::GLOBALID, id);
            copy.set_attr(attr::OBJECTID, -1);
            copy.set_decision_unit(&uuid, label, source.sort);
            copy
        })
        .collect();

    LayerEdits {
        id: -1,
        layer_id: uuid.clone(),
        uuid,
        portal_id: String::new(),
        name: label.to_string(),
        label: label.to_string(),
        status: PublishStatus::Added,
        edit_type: EditType::Add,
        adds,
        updates: Vec::new(),
        deletes: Vec::new(),
        published: Vec::new(),
        ..source.clone()
    }
}

/// `desired`, sinon `desired (1)`, `desired (2)`... selon `taken`
fn first_free(desired: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut candidate = desired.to_string();
    let mut duplicates = 0;
    while taken(&candidate) {
        duplicates += 1;
        candidate = format!("{} ({})", desired, duplicates);
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LayerTypeName;

    /// Enregistre les appels reçus
    #[derive(Default)]
    struct RecordingRenderer {
        calls: Vec<String>,
    }

    impl RenderAdapter for RecordingRenderer {
        fn attach(&mut self, layer: &LayerInfo) {
            self.calls.push(format!("attach {}", layer.name));
        }
        fn attach_group(&mut self, scenario: &ScenarioEdits) {
            self.calls.push(format!("group {}", scenario.scenario_name));
        }
        fn detach(&mut self, layer_id: &str) {
            self.calls.push(format!("detach {}", layer_id));
        }
        fn reparent(&mut self, layer_id: &str, parent_id: Option<&str>) {
            self.calls
                .push(format!("reparent {} {}", layer_id, parent_id.unwrap_or("root")));
        }
    }

    fn sample(id: &str) -> Feature {
        Feature::default()
            .with_attr(attr::PERMANENT_IDENTIFIER, id)
            .with_attr(attr::GLOBALID, id)
    }

    fn setup() -> (Registry, Edits, String, LayerInfo, RecordingRenderer) {
        let mut registry = Registry::new();
        let mut renderer = RecordingRenderer::default();
        let (edits, scenario_id) = registry
            .add_scenario(&Edits::new(), "Plan", "", CalculateSettings::default(), &mut renderer)
            .unwrap();
        let layer = LayerInfo::sample_layer("Layer 1", Some(scenario_id.as_str()));
        let edits = registry.add_layer(&edits, layer.clone(), &mut renderer).unwrap();
        let edits = update_layer_edits(
            &edits,
            &layer,
            None,
            EditOperation::Add(vec![sample("a"), sample("b")]),
        )
        .unwrap();
        (registry, edits, scenario_id, layer, renderer)
    }

    #[test]
    fn test_unlink_then_link() {
        let (mut registry, edits, scenario_id, layer, mut renderer) = setup();

        let edits = registry.unlink_layer(&edits, &layer.layer_id, &mut renderer).unwrap();
        assert!(edits.find_scenario(&scenario_id).unwrap().layers.is_empty());
        assert_eq!(edits.root_layers().count(), 1);
        assert!(!registry.find(&layer.layer_id).unwrap().is_linked());

        let edits = registry
            .link_layer(&edits, &layer.layer_id, &scenario_id, &mut renderer)
            .unwrap();
        let scenario = edits.find_scenario(&scenario_id).unwrap();
        assert_eq!(scenario.layers.len(), 1);
        assert_eq!(scenario.layers[0].adds.len(), 2);
        assert_eq!(edits.root_layers().count(), 0);
        assert_eq!(registry.layers_in(&scenario_id).count(), 1);
        assert!(renderer
            .calls
            .contains(&format!("reparent {} {}", layer.layer_id, scenario_id)));
    }

    #[test]
    fn test_link_unknown_scenario_fails() {
        let (mut registry, edits, _, layer, mut renderer) = setup();
        let result = registry.link_layer(&edits, &layer.layer_id, "{NOPE}", &mut renderer);
        assert!(matches!(result, Err(TotsError::ScenarioNotFound(_))));
    }

    #[test]
    fn test_clone_layer_regenerates_identifiers() {
        let (mut registry, edits, scenario_id, layer, mut renderer) = setup();
        let (edits, copy) = registry.clone_layer(&edits, &layer.layer_id, &mut renderer).unwrap();

        assert_ne!(copy.layer_id, layer.layer_id);
        assert_eq!(copy.parent_layer_id.as_deref(), Some(scenario_id.as_str()));

        let copied = edits.find_layer(&copy.layer_id).unwrap();
        assert_eq!(copied.adds.len(), 2);
        assert_eq!(copied.status, PublishStatus::Added);
        for feature in &copied.adds {
            let id = feature.permanent_id().unwrap();
            assert!(id != "a" && id != "b");
            assert_eq!(feature.attr_str(attr::DECISIONUNITUUID), Some(copy.uuid.as_str()));
        }
        // l'original est intact
        assert!(edits.find_layer(&layer.layer_id).unwrap().contains("a"));
    }

    #[test]
    fn test_clone_scenario_resets_publish_state() {
        let (mut registry, edits, scenario_id, layer, mut renderer) = setup();
        let edits = update_layer_edits(&edits, &layer, None, EditOperation::Arcgis(vec![sample("p")]))
            .unwrap();

        let (edits, copy_id) = registry
            .clone_scenario(&edits, &scenario_id, &mut renderer)
            .unwrap();
        let copy = edits.find_scenario(&copy_id).unwrap();
        assert_eq!(copy.scenario_name, "Plan (copy)");
        assert_eq!(copy.layers.len(), 1);
        assert_eq!(copy.layers[0].adds.len(), 3);
        assert!(copy.layers[0].published.is_empty());
        assert_ne!(copy.layers[0].layer_id, layer.layer_id);
        assert_eq!(registry.layers_in(&copy_id).count(), 1);
    }

    #[test]
    fn test_repeated_clones_get_distinct_labels() {
        let (mut registry, edits, scenario_id, layer, mut renderer) = setup();

        let (edits, first) = registry.clone_layer(&edits, &layer.layer_id, &mut renderer).unwrap();
        let (edits, second) = registry.clone_layer(&edits, &layer.layer_id, &mut renderer).unwrap();
        assert_eq!(first.label, "Layer 1 (copy)");
        assert_eq!(second.label, "Layer 1 (copy) (1)");

        let (edits, a) = registry.clone_scenario(&edits, &scenario_id, &mut renderer).unwrap();
        let (edits, b) = registry.clone_scenario(&edits, &scenario_id, &mut renderer).unwrap();
        assert_eq!(edits.find_scenario(&a).unwrap().scenario_name, "Plan (copy)");
        assert_eq!(edits.find_scenario(&b).unwrap().scenario_name, "Plan (copy) (1)");

        let mut labels: Vec<&str> = registry.layers().iter().map(|l| l.label.as_str()).collect();
        let total = labels.len();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), total);
    }

    #[test]
    fn test_delete_layer_prefers_sibling() {
        let (mut registry, edits, scenario_id, layer, mut renderer) = setup();
        let sibling = LayerInfo::sample_layer("Layer 2", Some(scenario_id.as_str()));
        let edits = registry.add_layer(&edits, sibling.clone(), &mut renderer).unwrap();
        let unlinked = LayerInfo::sample_layer("Loose", None);
        let edits = registry.add_layer(&edits, unlinked.clone(), &mut renderer).unwrap();

        let (edits, successor) = registry.delete_layer(&edits, &layer.layer_id, &mut renderer).unwrap();
        assert!(edits.find_layer(&layer.layer_id).is_none());
        assert!(registry.find(&layer.layer_id).is_none());
        assert_eq!(successor.unwrap().layer_id, sibling.layer_id);
        assert!(renderer.calls.contains(&format!("detach {}", layer.layer_id)));

        // plus de voisin : repli sur une couche non liée
        let (_, successor) = registry.delete_layer(&edits, &sibling.layer_id, &mut renderer).unwrap();
        assert_eq!(successor.unwrap().layer_id, unlinked.layer_id);
    }

    #[test]
    fn test_delete_scenario_detaches_layers() {
        let (mut registry, edits, scenario_id, layer, mut renderer) = setup();
        let (edits, _) = registry
            .add_scenario(&edits, "Plan B", "", CalculateSettings::default(), &mut renderer)
            .unwrap();
        let count = edits.count;

        let (edits, next) = registry
            .delete_scenario(&edits, &scenario_id, &mut renderer)
            .unwrap();
        assert_eq!(edits.count, count + 1);
        assert!(edits.find_scenario(&scenario_id).is_none());
        assert!(registry.find(&layer.layer_id).is_none());
        assert_eq!(
            edits.find_scenario(next.as_deref().unwrap()).unwrap().scenario_name,
            "Plan B"
        );
        assert!(renderer.calls.contains(&format!("detach {}", layer.layer_id)));
        assert!(renderer.calls.contains(&format!("detach {}", scenario_id)));
    }

    #[test]
    fn test_from_edits_rebuilds_parents() {
        let (_, edits, scenario_id, layer, _) = setup();
        let registry = Registry::from_edits(&edits);
        let info = registry.find(&layer.layer_id).unwrap();
        assert_eq!(info.parent_layer_id.as_deref(), Some(scenario_id.as_str()));
        assert_eq!(info.layer_type, LayerTypeName::Samples);
    }

    #[test]
    fn test_unique_label() {
        let (mut registry, edits, _, _, mut renderer) = setup();
        assert_eq!(registry.unique_label("Layer 1"), "Layer 1 (1)");
        assert_eq!(registry.unique_label("plan.csv"), "plan.csv");

        let taken = LayerInfo::sample_layer("Layer 1 (1)", None);
        registry.add_layer(&edits, taken, &mut renderer).unwrap();
        assert_eq!(registry.unique_label("Layer 1"), "Layer 1 (2)");
    }
}

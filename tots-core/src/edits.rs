//! Ledger des modifications (edits)
//!
//! Le ledger trace, pour chaque couche d'échantillons, les features à
//! ajouter, à mettre à jour, à supprimer et celles déjà publiées sur le
//! service distant. Il est immuable : chaque opération retourne un nouveau
//! ledger et incrémente `count` d'exactement un. Les consommateurs
//! (calcul, persistance) comparent `count`, jamais les objets eux-mêmes.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::calculate::{CalculateSettings, CalculateSettingsPair};
use crate::error::{Result, TotsError};
use crate::layer::LayerInfo;
use crate::types::{
    attr, generate_uuid, AddedFrom, DeleteFeature, EditType, Feature, LayerTypeName, ListMode,
    PublishStatus,
};

/// Ledger complet : jeton de changement + entrées racine
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Edits {
    pub count: u64,
    pub edits: Vec<EditsItem>,
}

/// Entrée racine du ledger : un scénario ou une couche non liée
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EditsItem {
    Scenario(ScenarioEdits),
    Layer(LayerEdits),
}

impl EditsItem {
    pub fn layer_id(&self) -> &str {
        match self {
            Self::Scenario(s) => &s.layer_id,
            Self::Layer(l) => &l.layer_id,
        }
    }
}

/// Modifications suivies pour une couche
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerEdits {
    pub id: i64,
    pub uuid: String,
    pub layer_id: String,
    #[serde(default)]
    pub portal_id: String,
    pub name: String,
    pub label: String,
    pub layer_type: LayerTypeName,
    pub added_from: AddedFrom,
    pub status: PublishStatus,
    pub edit_type: EditType,
    pub visible: bool,
    #[serde(default)]
    pub list_mode: ListMode,
    #[serde(default)]
    pub sort: i64,
    #[serde(default)]
    pub adds: Vec<Feature>,
    #[serde(default)]
    pub updates: Vec<Feature>,
    #[serde(default)]
    pub deletes: Vec<DeleteFeature>,
    #[serde(default)]
    pub published: Vec<Feature>,
}

/// Scénario : groupe de couches avec ses paramètres de calcul
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioEdits {
    pub id: i64,
    pub layer_id: String,
    #[serde(default)]
    pub portal_id: String,
    pub name: String,
    pub label: String,
    pub added_from: AddedFrom,
    pub status: PublishStatus,
    pub edit_type: EditType,
    pub visible: bool,
    #[serde(default)]
    pub list_mode: ListMode,
    pub scenario_name: String,
    #[serde(default)]
    pub scenario_description: String,
    #[serde(default)]
    pub layers: Vec<LayerEdits>,
    #[serde(default)]
    pub calculate_settings: CalculateSettingsPair,
}

impl ScenarioEdits {
    /// Crée un nouveau scénario vide avec un identifiant de groupe neuf
    pub fn new(name: &str, description: &str, settings: CalculateSettings) -> Self {
        Self {
            id: -1,
            layer_id: generate_uuid(),
            portal_id: String::new(),
            name: name.to_string(),
            label: name.to_string(),
            added_from: AddedFrom::Sketch,
            status: PublishStatus::Added,
            edit_type: EditType::Add,
            visible: true,
            list_mode: ListMode::Show,
            scenario_name: name.to_string(),
            scenario_description: description.to_string(),
            layers: Vec::new(),
            calculate_settings: CalculateSettingsPair {
                current: settings,
                published: None,
            },
        }
    }

    /// Nombre de features visibles dans le scénario
    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(|l| l.current_features().len()).sum()
    }

    pub(crate) fn mark_edited(&mut self) {
        if self.status == PublishStatus::Published {
            self.status = PublishStatus::Edited;
        }
    }
}

impl LayerEdits {
    /// Gabarit d'entrée pour une couche encore absente du ledger
    pub fn from_layer(layer: &LayerInfo, edit_type: EditType) -> Self {
        Self {
            id: layer.id,
            uuid: layer.uuid.clone(),
            layer_id: layer.layer_id.clone(),
            portal_id: layer.portal_id.clone(),
            name: layer.name.clone(),
            label: layer.label.clone(),
            layer_type: layer.layer_type,
            added_from: layer.added_from,
            status: layer.status,
            edit_type,
            visible: layer.visible,
            list_mode: layer.list_mode,
            sort: layer.sort,
            adds: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
            published: Vec::new(),
        }
    }

    /// Enregistrement de registre correspondant à cette entrée
    pub fn to_layer_info(&self, parent_layer_id: Option<&str>) -> LayerInfo {
        LayerInfo {
            id: self.id,
            uuid: self.uuid.clone(),
            layer_id: self.layer_id.clone(),
            portal_id: self.portal_id.clone(),
            name: self.name.clone(),
            label: self.label.clone(),
            layer_type: self.layer_type,
            edit_type: self.edit_type,
            visible: self.visible,
            list_mode: self.list_mode,
            sort: self.sort,
            geometry_type: "esriGeometryPolygon".to_string(),
            added_from: self.added_from,
            status: self.status,
            parent_layer_id: parent_layer_id.map(str::to_string),
        }
    }

    /// Features telles qu'affichées : publiées (avec leurs mises à jour),
    /// hors suppressions en attente, puis ajouts
    pub fn current_features(&self) -> Vec<&Feature> {
        let mut features: Vec<&Feature> = self
            .published
            .iter()
            .filter(|f| !self.is_pending_delete(f.permanent_id()))
            .map(|f| {
                f.permanent_id()
                    .and_then(|id| position_of(&self.updates, id))
                    .map(|idx| &self.updates[idx])
                    .unwrap_or(f)
            })
            .collect();
        features.extend(self.adds.iter());
        features
    }

    /// Identifiants vivants (ajouts, mises à jour, publiés non supprimés)
    pub fn live_ids(&self) -> Vec<&str> {
        self.current_features()
            .into_iter()
            .filter_map(Feature::permanent_id)
            .collect()
    }

    pub fn contains(&self, permanent_id: &str) -> bool {
        self.live_ids().contains(&permanent_id)
    }

    fn is_pending_delete(&self, permanent_id: Option<&str>) -> bool {
        permanent_id
            .map(|id| self.deletes.iter().any(|d| d.permanent_identifier == id))
            .unwrap_or(false)
    }

    fn is_published(&self, permanent_id: &str) -> bool {
        position_of(&self.published, permanent_id).is_some()
    }

    pub(crate) fn mark_edited(&mut self) {
        if self.status == PublishStatus::Published {
            self.status = PublishStatus::Edited;
        }
    }

    /// Ajoute (ou ressuscite) des features
    fn apply_add(&mut self, features: Vec<Feature>) {
        for feature in features {
            let Some(id) = feature.permanent_id().map(str::to_string) else {
                warn!(layer = %self.layer_id, "Feature sans PERMANENT_IDENTIFIER ignorée (add)");
                continue;
            };

            let before = self.deletes.len();
            self.deletes.retain(|d| d.permanent_identifier != id);
            if self.deletes.len() != before {
                trace!(id = %id, "Feature ressuscitée");
            }

            if self.is_published(&id) {
                // existe déjà côté serveur : un PUT suffira
                upsert(&mut self.updates, feature, &id);
            } else {
                upsert(&mut self.adds, feature, &id);
            }
        }
    }

    /// Met à jour des features existantes
    fn apply_update(&mut self, features: Vec<Feature>) {
        for feature in features {
            let Some(id) = feature.permanent_id().map(str::to_string) else {
                continue;
            };

            if let Some(idx) = position_of(&self.adds, &id) {
                // toujours en attente d'ajout : on remplace sur place
                self.adds[idx] = feature;
                continue;
            }

            upsert(&mut self.updates, feature, &id);
        }
    }

    /// Supprime des features
    pub(crate) fn apply_delete(&mut self, features: &[Feature]) {
        for feature in features {
            let Some(id) = feature.permanent_id() else {
                continue;
            };

            if let Some(idx) = position_of(&self.adds, id) {
                // jamais publiée : rien à envoyer au serveur
                self.adds.remove(idx);
                continue;
            }

            self.updates.retain(|f| f.permanent_id() != Some(id));

            if self.is_published(id) && !self.is_pending_delete(Some(id)) {
                self.deletes.push(DeleteFeature {
                    permanent_identifier: id.to_string(),
                    global_id: feature.attr_str(attr::GLOBALID).unwrap_or_default().to_string(),
                    decision_unit_uuid: self.uuid.clone(),
                });
            }
        }
    }

    /// Ensemence les features publiées depuis le service distant
    fn apply_arcgis(&mut self, features: Vec<Feature>) {
        for feature in features {
            match feature.permanent_id().map(str::to_string) {
                Some(id) => upsert(&mut self.published, feature, &id),
                None => self.published.push(feature),
            }
        }
    }

    fn refresh_metadata(&mut self, layer: &LayerInfo) {
        self.visible = layer.visible;
        self.list_mode = layer.list_mode;
        self.name = layer.name.clone();
        self.label = layer.name.clone();
        self.mark_edited();
    }
}

/// Opération à appliquer à une couche du ledger
#[derive(Debug, Clone)]
pub enum EditOperation {
    Add(Vec<Feature>),
    Update(Vec<Feature>),
    Delete(Vec<Feature>),
    /// Déplace des features vers une autre couche en conservant leur identifiant
    Move {
        to: LayerInfo,
        features: Vec<Feature>,
    },
    /// Features déjà publiées, chargées depuis le service distant
    Arcgis(Vec<Feature>),
    /// Changement de métadonnées uniquement (nom, visibilité...)
    Properties,
}

impl EditOperation {
    pub fn edit_type(&self) -> EditType {
        match self {
            Self::Add(_) => EditType::Add,
            Self::Update(_) => EditType::Update,
            Self::Delete(_) => EditType::Delete,
            Self::Move { .. } => EditType::Move,
            Self::Arcgis(_) => EditType::Arcgis,
            Self::Properties => EditType::Properties,
        }
    }

    pub fn feature_count(&self) -> usize {
        match self {
            Self::Add(f) | Self::Update(f) | Self::Delete(f) | Self::Arcgis(f) => f.len(),
            Self::Move { features, .. } => features.len(),
            Self::Properties => 0,
        }
    }
}

/// Position d'une couche ou d'un scénario dans le ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerLocation {
    /// Index du scénario (racine) contenant la couche, ou du scénario cherché
    pub scenario_index: Option<usize>,
    /// Index de la couche, dans le scénario si `scenario_index` est défini
    /// et que la couche y est imbriquée, sinon à la racine
    pub layer_index: Option<usize>,
}

/// Cherche une couche ou un scénario par son `layer_id`
pub fn find_layer_in_edits(edits: &[EditsItem], layer_id: &str) -> LayerLocation {
    let mut location = LayerLocation::default();
    for (idx, item) in edits.iter().enumerate() {
        match item {
            EditsItem::Layer(l) if l.layer_id == layer_id => {
                location.layer_index = Some(idx);
            }
            EditsItem::Scenario(s) if s.layer_id == layer_id => {
                location.scenario_index = Some(idx);
            }
            EditsItem::Scenario(s) => {
                if let Some(layer_idx) = s.layers.iter().position(|l| l.layer_id == layer_id) {
                    location.scenario_index = Some(idx);
                    location.layer_index = Some(layer_idx);
                }
            }
            EditsItem::Layer(_) => {}
        }
    }
    location
}

impl Edits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &ScenarioEdits> {
        self.edits.iter().filter_map(|item| match item {
            EditsItem::Scenario(s) => Some(s),
            EditsItem::Layer(_) => None,
        })
    }

    /// Couches non liées (à la racine)
    pub fn root_layers(&self) -> impl Iterator<Item = &LayerEdits> {
        self.edits.iter().filter_map(|item| match item {
            EditsItem::Layer(l) => Some(l),
            EditsItem::Scenario(_) => None,
        })
    }

    /// Toutes les couches, imbriquées ou non
    pub fn all_layers(&self) -> impl Iterator<Item = &LayerEdits> {
        self.edits.iter().flat_map(|item| match item {
            EditsItem::Layer(l) => std::slice::from_ref(l).iter(),
            EditsItem::Scenario(s) => s.layers.iter(),
        })
    }

    pub fn find_scenario(&self, scenario_id: &str) -> Option<&ScenarioEdits> {
        self.scenarios().find(|s| s.layer_id == scenario_id)
    }

    pub fn find_scenario_mut(&mut self, scenario_id: &str) -> Option<&mut ScenarioEdits> {
        self.edits.iter_mut().find_map(|item| match item {
            EditsItem::Scenario(s) if s.layer_id == scenario_id => Some(s),
            _ => None,
        })
    }

    pub fn find_layer(&self, layer_id: &str) -> Option<&LayerEdits> {
        self.all_layers().find(|l| l.layer_id == layer_id)
    }

    pub fn find_layer_mut(&mut self, layer_id: &str) -> Option<&mut LayerEdits> {
        self.edits.iter_mut().find_map(|item| match item {
            EditsItem::Layer(l) if l.layer_id == layer_id => Some(l),
            EditsItem::Scenario(s) => s.layers.iter_mut().find(|l| l.layer_id == layer_id),
            EditsItem::Layer(_) => None,
        })
    }

    /// Features courantes de toutes les couches d'échantillons d'un scénario,
    /// dans l'ordre des couches puis des features
    pub fn scenario_features(&self, scenario_id: &str) -> Vec<&Feature> {
        self.find_scenario(scenario_id)
            .map(|s| {
                s.layers
                    .iter()
                    .filter(|l| l.layer_type.is_samples())
                    .flat_map(|l| l.current_features())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Scénario contenant la couche, s'il y en a un
    pub fn scenario_of_layer(&self, layer_id: &str) -> Option<&ScenarioEdits> {
        self.scenarios()
            .find(|s| s.layers.iter().any(|l| l.layer_id == layer_id))
    }

    /// Retire une couche du ledger (racine ou scénario) et la retourne
    pub(crate) fn take_layer(&mut self, layer_id: &str) -> Option<LayerEdits> {
        let location = find_layer_in_edits(&self.edits, layer_id);
        match (location.scenario_index, location.layer_index) {
            (Some(s_idx), Some(l_idx)) => match &mut self.edits[s_idx] {
                EditsItem::Scenario(s) => Some(s.layers.remove(l_idx)),
                EditsItem::Layer(_) => None,
            },
            (None, Some(l_idx)) => match self.edits.remove(l_idx) {
                EditsItem::Layer(l) => Some(l),
                other => {
                    self.edits.insert(l_idx, other);
                    None
                }
            },
            _ => None,
        }
    }

    /// Insère une couche dans un scénario, ou à la racine
    pub(crate) fn insert_layer(&mut self, layer: LayerEdits, scenario_id: Option<&str>) -> Result<()> {
        match scenario_id {
            Some(id) => {
                let scenario = self
                    .find_scenario_mut(id)
                    .ok_or_else(|| TotsError::ScenarioNotFound(id.to_string()))?;
                scenario.layers.push(layer);
            }
            None => self.edits.push(EditsItem::Layer(layer)),
        }
        Ok(())
    }

    /// Retire un scénario du ledger et le retourne
    pub(crate) fn take_scenario(&mut self, scenario_id: &str) -> Option<ScenarioEdits> {
        let idx = self.edits.iter().position(|item| {
            matches!(item, EditsItem::Scenario(s) if s.layer_id == scenario_id)
        })?;
        match self.edits.remove(idx) {
            EditsItem::Scenario(s) => Some(s),
            EditsItem::Layer(_) => None,
        }
    }

    pub(crate) fn bump(&mut self) {
        self.count += 1;
    }
}

/// Applique une opération à une couche et retourne le nouveau ledger
///
/// La couche est créée dans le ledger si elle n'y figure pas encore (dans
/// `scenario_id` s'il est fourni, sinon à la racine). Le ledger d'entrée
/// n'est jamais modifié et `count` augmente d'exactement un, quel que soit
/// le nombre de features touchées.
pub fn update_layer_edits(
    edits: &Edits,
    layer: &LayerInfo,
    scenario_id: Option<&str>,
    operation: EditOperation,
) -> Result<Edits> {
    let mut next = edits.clone();
    let edit_type = operation.edit_type();
    let feature_count = operation.feature_count();

    ensure_layer_entry(&mut next, layer, scenario_id, edit_type)?;

    match operation {
        EditOperation::Move { to, features } => {
            move_features(&mut next, layer, &to, scenario_id, features)?;
        }
        operation => {
            let entry = next
                .find_layer_mut(&layer.layer_id)
                .ok_or_else(|| TotsError::LayerNotFound(layer.layer_id.clone()))?;
            match operation {
                EditOperation::Add(features) => entry.apply_add(features),
                EditOperation::Update(features) => entry.apply_update(features),
                EditOperation::Delete(features) => entry.apply_delete(&features),
                EditOperation::Arcgis(features) => entry.apply_arcgis(features),
                EditOperation::Properties | EditOperation::Move { .. } => {}
            }
        }
    }

    next.bump();
    debug!(
        layer = %layer.layer_id,
        edit_type = ?edit_type,
        features = feature_count,
        count = next.count,
        "Ledger mis à jour"
    );
    Ok(next)
}

/// Crée l'entrée de la couche si nécessaire, sinon rafraîchit ses métadonnées
fn ensure_layer_entry(
    edits: &mut Edits,
    layer: &LayerInfo,
    scenario_id: Option<&str>,
    edit_type: EditType,
) -> Result<()> {
    let scenario_id = scenario_id.or(layer.parent_layer_id.as_deref());
    if let Some(id) = scenario_id {
        if edits.find_scenario(id).is_none() {
            return Err(TotsError::ScenarioNotFound(id.to_string()));
        }
    }

    match edits.find_layer_mut(&layer.layer_id) {
        Some(entry) => {
            entry.refresh_metadata(layer);
            entry.edit_type = edit_type;
        }
        None => {
            let entry = LayerEdits::from_layer(layer, edit_type);
            edits.insert_layer(entry, scenario_id)?;
        }
    }

    // le scénario porteur suit la dernière opération (cf. court-circuit du calcul)
    let owner = edits
        .scenario_of_layer(&layer.layer_id)
        .map(|s| s.layer_id.clone());
    if let Some(owner) = owner {
        if let Some(scenario) = edits.find_scenario_mut(&owner) {
            if edit_type != EditType::Properties {
                scenario.edit_type = edit_type;
            }
            scenario.mark_edited();
        }
    }

    Ok(())
}

/// Suppression dans la couche source + ajout dans la couche destination
fn move_features(
    edits: &mut Edits,
    from: &LayerInfo,
    to: &LayerInfo,
    scenario_id: Option<&str>,
    features: Vec<Feature>,
) -> Result<()> {
    if from.layer_id == to.layer_id {
        return Err(TotsError::invalid_move(
            &from.layer_id,
            &to.layer_id,
            "source and destination are the same layer",
        ));
    }

    let target_scenario = to.parent_layer_id.as_deref().or(scenario_id);
    ensure_layer_entry(edits, to, target_scenario, EditType::Move)?;

    let moved: Vec<Feature> = features
        .iter()
        .filter(|f| f.permanent_id().is_some())
        .map(|f| {
            let mut moved = f.clone();
            moved.set_decision_unit(&to.uuid, &to.label, to.sort);
            moved
        })
        .collect();

    let source = edits
        .find_layer_mut(&from.layer_id)
        .ok_or_else(|| TotsError::LayerNotFound(from.layer_id.clone()))?;
    source.apply_delete(&features);

    let destination = edits
        .find_layer_mut(&to.layer_id)
        .ok_or_else(|| TotsError::LayerNotFound(to.layer_id.clone()))?;
    destination.apply_add(moved);

    Ok(())
}

/// Renomme un scénario ; marqué `properties` pour ne pas relancer le calcul
pub fn update_scenario_properties(
    edits: &Edits,
    scenario_id: &str,
    name: &str,
    description: &str,
) -> Result<Edits> {
    let mut next = edits.clone();
    let scenario = next
        .find_scenario_mut(scenario_id)
        .ok_or_else(|| TotsError::ScenarioNotFound(scenario_id.to_string()))?;

    scenario.scenario_name = name.to_string();
    scenario.scenario_description = description.to_string();
    scenario.name = name.to_string();
    scenario.label = name.to_string();
    scenario.edit_type = EditType::Properties;
    scenario.mark_edited();

    next.bump();
    Ok(next)
}

/// Remplace les paramètres de calcul courants d'un scénario
pub fn set_calculate_settings(
    edits: &Edits,
    scenario_id: &str,
    settings: CalculateSettings,
) -> Result<Edits> {
    settings.validate()?;

    let mut next = edits.clone();
    let scenario = next
        .find_scenario_mut(scenario_id)
        .ok_or_else(|| TotsError::ScenarioNotFound(scenario_id.to_string()))?;

    scenario.calculate_settings.current = settings;
    scenario.edit_type = EditType::Update;
    scenario.mark_edited();

    next.bump();
    Ok(next)
}

fn position_of(features: &[Feature], permanent_id: &str) -> Option<usize> {
    features
        .iter()
        .position(|f| f.permanent_id() == Some(permanent_id))
}

fn upsert(features: &mut Vec<Feature>, feature: Feature, permanent_id: &str) {
    match position_of(features, permanent_id) {
        Some(idx) => features[idx] = feature,
        None => features.push(feature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> Feature {
        Feature::default()
            .with_attr(attr::PERMANENT_IDENTIFIER, id)
            .with_attr(attr::GLOBALID, id)
            .with_attr(attr::SA, 100)
            .with_attr(attr::TTPK, 1)
    }

    fn ledger_with_scenario() -> (Edits, String, LayerInfo) {
        let scenario = ScenarioEdits::new("Plan A", "", CalculateSettings::default());
        let scenario_id = scenario.layer_id.clone();
        let edits = Edits {
            count: 0,
            edits: vec![EditsItem::Scenario(scenario)],
        };
        let layer = LayerInfo::sample_layer("Layer 1", Some(scenario_id.as_str()));
        (edits, scenario_id, layer)
    }

    #[test]
    fn test_add_creates_layer_in_scenario() {
        let (edits, scenario_id, layer) = ledger_with_scenario();
        let next = update_layer_edits(
            &edits,
            &layer,
            Some(scenario_id.as_str()),
            EditOperation::Add(vec![sample("a"), sample("b")]),
        )
        .unwrap();

        let scenario = next.find_scenario(&scenario_id).unwrap();
        assert_eq!(scenario.layers.len(), 1);
        assert_eq!(scenario.layers[0].adds.len(), 2);
        assert_eq!(next.count, 1);
        // le ledger d'origine n'est pas touché
        assert_eq!(edits.count, 0);
        assert!(edits.find_layer(&layer.layer_id).is_none());
    }

    #[test]
    fn test_add_then_delete_cancels() {
        let (edits, scenario_id, layer) = ledger_with_scenario();
        let edits = update_layer_edits(
            &edits,
            &layer,
            Some(scenario_id.as_str()),
            EditOperation::Add(vec![sample("a")]),
        )
        .unwrap();
        let edits = update_layer_edits(
            &edits,
            &layer,
            None,
            EditOperation::Delete(vec![sample("a")]),
        )
        .unwrap();

        let entry = edits.find_layer(&layer.layer_id).unwrap();
        assert!(entry.adds.is_empty());
        assert!(entry.updates.is_empty());
        assert!(entry.deletes.is_empty());
    }

    #[test]
    fn test_update_of_pending_add_stays_in_adds() {
        let (edits, scenario_id, layer) = ledger_with_scenario();
        let edits = update_layer_edits(
            &edits,
            &layer,
            Some(scenario_id.as_str()),
            EditOperation::Add(vec![sample("a")]),
        )
        .unwrap();
        let changed = sample("a").with_attr(attr::NOTES, "edited");
        let edits =
            update_layer_edits(&edits, &layer, None, EditOperation::Update(vec![changed])).unwrap();

        let entry = edits.find_layer(&layer.layer_id).unwrap();
        assert_eq!(entry.adds.len(), 1);
        assert_eq!(entry.adds[0].attr_str(attr::NOTES), Some("edited"));
        assert!(entry.updates.is_empty());
    }

    #[test]
    fn test_update_of_published_goes_to_updates() {
        let (edits, scenario_id, layer) = ledger_with_scenario();
        let edits = update_layer_edits(
            &edits,
            &layer,
            Some(scenario_id.as_str()),
            EditOperation::Arcgis(vec![sample("a")]),
        )
        .unwrap();
        let edits = update_layer_edits(
            &edits,
            &layer,
            None,
            EditOperation::Update(vec![sample("a").with_attr(attr::NOTES, "x")]),
        )
        .unwrap();
        let edits = update_layer_edits(
            &edits,
            &layer,
            None,
            EditOperation::Update(vec![sample("a").with_attr(attr::NOTES, "y")]),
        )
        .unwrap();

        let entry = edits.find_layer(&layer.layer_id).unwrap();
        assert_eq!(entry.updates.len(), 1);
        assert_eq!(entry.updates[0].attr_str(attr::NOTES), Some("y"));
        assert_eq!(entry.current_features().len(), 1);
        assert_eq!(entry.current_features()[0].attr_str(attr::NOTES), Some("y"));
    }

    #[test]
    fn test_delete_published_creates_tombstone_and_readd_resurrects() {
        let (edits, scenario_id, layer) = ledger_with_scenario();
        let edits = update_layer_edits(
            &edits,
            &layer,
            Some(scenario_id.as_str()),
            EditOperation::Arcgis(vec![sample("a")]),
        )
        .unwrap();
        let edits =
            update_layer_edits(&edits, &layer, None, EditOperation::Delete(vec![sample("a")]))
                .unwrap();
        // double suppression : une seule pierre tombale
        let edits =
            update_layer_edits(&edits, &layer, None, EditOperation::Delete(vec![sample("a")]))
                .unwrap();

        let entry = edits.find_layer(&layer.layer_id).unwrap();
        assert_eq!(entry.deletes.len(), 1);
        assert_eq!(entry.deletes[0].decision_unit_uuid, layer.uuid);
        assert!(entry.current_features().is_empty());

        let edits =
            update_layer_edits(&edits, &layer, None, EditOperation::Add(vec![sample("a")]))
                .unwrap();
        let entry = edits.find_layer(&layer.layer_id).unwrap();
        assert!(entry.deletes.is_empty());
        assert!(entry.adds.is_empty());
        assert_eq!(entry.updates.len(), 1);
        assert!(entry.contains("a"));
    }

    #[test]
    fn test_count_increments_once_per_call() {
        let (edits, scenario_id, layer) = ledger_with_scenario();
        let e1 =
            update_layer_edits(&edits, &layer, Some(scenario_id.as_str()), EditOperation::Add(vec![]))
                .unwrap();
        assert_eq!(e1.count, 1);
        let e2 = update_layer_edits(
            &e1,
            &layer,
            None,
            EditOperation::Add((0..25).map(|i| sample(&i.to_string())).collect()),
        )
        .unwrap();
        assert_eq!(e2.count, 2);
        let e3 = update_layer_edits(&e2, &layer, None, EditOperation::Properties).unwrap();
        assert_eq!(e3.count, 3);
    }

    #[test]
    fn test_move_preserves_identifier_and_payload() {
        let (edits, scenario_id, source) = ledger_with_scenario();
        let mut target = LayerInfo::sample_layer("Layer 2", Some(scenario_id.as_str()));
        target.sort = 1;

        let feature = sample("a").with_attr(attr::NOTES, "keep me");
        let edits = update_layer_edits(
            &edits,
            &source,
            Some(scenario_id.as_str()),
            EditOperation::Add(vec![feature.clone()]),
        )
        .unwrap();
        let edits = update_layer_edits(
            &edits,
            &source,
            None,
            EditOperation::Move {
                to: target.clone(),
                features: vec![feature],
            },
        )
        .unwrap();

        let src = edits.find_layer(&source.layer_id).unwrap();
        let dst = edits.find_layer(&target.layer_id).unwrap();
        assert!(!src.contains("a"));
        assert!(dst.contains("a"));

        let moved = &dst.adds[0];
        assert_eq!(moved.permanent_id(), Some("a"));
        assert_eq!(moved.attr_str(attr::NOTES), Some("keep me"));
        assert_eq!(moved.attr_str(attr::DECISIONUNITUUID), Some(target.uuid.as_str()));
        assert_eq!(moved.attr_str(attr::DECISIONUNIT), Some("Layer 2"));
        assert_eq!(dst.edit_type, EditType::Move);
        assert_eq!(edits.count, 2);
    }

    #[test]
    fn test_move_to_same_layer_rejected() {
        let (edits, scenario_id, layer) = ledger_with_scenario();
        let result = update_layer_edits(
            &edits,
            &layer,
            Some(scenario_id.as_str()),
            EditOperation::Move {
                to: layer.clone(),
                features: vec![sample("a")],
            },
        );
        assert!(matches!(result, Err(TotsError::InvalidMove { .. })));
    }

    #[test]
    fn test_unknown_scenario_rejected() {
        let (edits, _, layer) = ledger_with_scenario();
        let result = update_layer_edits(&edits, &layer, Some("{NOPE}"), EditOperation::Properties);
        assert!(matches!(result, Err(TotsError::ScenarioNotFound(_))));
    }

    #[test]
    fn test_published_layer_becomes_edited() {
        let (edits, scenario_id, mut layer) = ledger_with_scenario();
        layer.status = PublishStatus::Published;
        let edits = update_layer_edits(
            &edits,
            &layer,
            Some(scenario_id.as_str()),
            EditOperation::Arcgis(vec![sample("a")]),
        )
        .unwrap();
        let edits =
            update_layer_edits(&edits, &layer, None, EditOperation::Delete(vec![sample("a")]))
                .unwrap();
        assert_eq!(
            edits.find_layer(&layer.layer_id).unwrap().status,
            PublishStatus::Edited
        );
    }

    #[test]
    fn test_scenario_properties_short_circuit_marker() {
        let (edits, scenario_id, _) = ledger_with_scenario();
        let edits = update_scenario_properties(&edits, &scenario_id, "Renamed", "desc").unwrap();
        let scenario = edits.find_scenario(&scenario_id).unwrap();
        assert_eq!(scenario.edit_type, EditType::Properties);
        assert_eq!(scenario.scenario_name, "Renamed");
        assert_eq!(edits.count, 1);
    }

    #[test]
    fn test_set_calculate_settings_validates() {
        let (edits, scenario_id, _) = ledger_with_scenario();
        let bad = CalculateSettings {
            num_labs: 0.0,
            ..Default::default()
        };
        assert!(set_calculate_settings(&edits, &scenario_id, bad).is_err());

        let good = CalculateSettings {
            num_sampling_teams: 2.0,
            ..Default::default()
        };
        let edits = set_calculate_settings(&edits, &scenario_id, good).unwrap();
        let scenario = edits.find_scenario(&scenario_id).unwrap();
        assert_eq!(scenario.calculate_settings.current.num_sampling_teams, 2.0);
        assert_eq!(scenario.edit_type, EditType::Update);
    }

    #[test]
    fn test_find_layer_in_edits() {
        let (edits, scenario_id, layer) = ledger_with_scenario();
        let edits = update_layer_edits(
            &edits,
            &layer,
            Some(scenario_id.as_str()),
            EditOperation::Add(vec![]),
        )
        .unwrap();
        let root = LayerInfo::sample_layer("Unlinked", None);
        let edits = update_layer_edits(&edits, &root, None, EditOperation::Add(vec![])).unwrap();

        let nested = find_layer_in_edits(&edits.edits, &layer.layer_id);
        assert_eq!(nested.scenario_index, Some(0));
        assert_eq!(nested.layer_index, Some(0));

        let unlinked = find_layer_in_edits(&edits.edits, &root.layer_id);
        assert_eq!(unlinked.scenario_index, None);
        assert_eq!(unlinked.layer_index, Some(1));

        let scenario = find_layer_in_edits(&edits.edits, &scenario_id);
        assert_eq!(scenario.scenario_index, Some(0));
        assert_eq!(scenario.layer_index, None);
    }

    #[test]
    fn test_json_shape() {
        let (edits, scenario_id, layer) = ledger_with_scenario();
        let edits = update_layer_edits(
            &edits,
            &layer,
            Some(scenario_id.as_str()),
            EditOperation::Add(vec![sample("a")]),
        )
        .unwrap();

        let json = serde_json::to_value(&edits).unwrap();
        assert_eq!(json["edits"][0]["type"], "scenario");
        assert_eq!(json["edits"][0]["layers"][0]["layerType"], "Samples");
        assert_eq!(
            json["edits"][0]["layers"][0]["adds"][0]["attributes"]["PERMANENT_IDENTIFIER"],
            "a"
        );

        let back: Edits = serde_json::from_value(json).unwrap();
        assert_eq!(back, edits);
    }
}

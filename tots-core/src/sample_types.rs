//! Catalogue des types d'échantillons
//!
//! Un type d'échantillon est un gabarit d'attributs par défaut (surface de
//! référence, temps, coûts) identifié par son `TYPEUUID`. Les types
//! prédéfinis viennent d'un preset embarqué ; les types définis par
//! l'utilisateur sont versionnés par `edit_count` et portent un statut de
//! publication.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::edits::{Edits, EditsItem};
use crate::error::{Result, TotsError};
use crate::geodesy::{self, SpatialReference};
use crate::layer::LayerInfo;
use crate::types::{attr, current_date_time, generate_uuid, EditType, Feature};

/// Attributs propres à chaque feature, jamais écrasés par un type
const IDENTITY_ATTRIBUTES: [&str; 7] = [
    attr::PERMANENT_IDENTIFIER,
    attr::GLOBALID,
    attr::OBJECTID,
    attr::DECISIONUNITUUID,
    attr::DECISIONUNIT,
    attr::DECISIONUNITSORT,
    attr::CREATEDDATE,
];

/// Statut de publication d'un type défini par l'utilisateur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleTypeStatus {
    Add,
    Edit,
    Delete,
    Published,
    PublishedAgo,
}

/// Type défini par l'utilisateur
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDefinedType {
    pub status: SampleTypeStatus,
    #[serde(default)]
    pub service_id: String,
    pub attributes: Map<String, Value>,
}

/// Types définis par l'utilisateur (slice persistée de la session)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDefinedAttributes {
    pub edit_count: u64,
    #[serde(rename = "attributes")]
    pub sample_types: BTreeMap<String, UserDefinedType>,
}

/// Entrée de liste de sélection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleTypeOption {
    pub value: String,
    pub label: String,
    pub is_predefined: bool,
}

/// Catalogue des types prédéfinis tel que décrit par le preset
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    area_tolerance: f64,
    attributes_to_check: Vec<String>,
    sample_select_options: Vec<SampleTypeOption>,
    sample_attributes: BTreeMap<String, Map<String, Value>>,
}

/// Catalogue complet : types prédéfinis + types utilisateur
#[derive(Debug, Clone)]
pub struct SampleTypeCatalog {
    /// Écart toléré entre surface réelle et `SA` (pouces carrés)
    pub area_tolerance: f64,
    /// Attributs comparés au type prédéfini lors de la validation
    pub attributes_to_check: Vec<String>,
    options: Vec<SampleTypeOption>,
    predefined: BTreeMap<String, Map<String, Value>>,
    user_defined: UserDefinedAttributes,
}

impl SampleTypeCatalog {
    /// Catalogue embarqué (Sponge, Micro Vac, Wet Vac, Robot, Aggressive Air, Swab)
    pub fn embedded() -> Result<Self> {
        Self::from_json(include_str!("presets/sample_types.json"))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        for option in &file.sample_select_options {
            if !file.sample_attributes.contains_key(&option.value) {
                return Err(TotsError::UnknownSampleType(option.value.clone()));
            }
        }
        Ok(Self {
            area_tolerance: file.area_tolerance,
            attributes_to_check: file.attributes_to_check,
            options: file.sample_select_options,
            predefined: file.sample_attributes,
            user_defined: UserDefinedAttributes::default(),
        })
    }

    pub fn user_defined(&self) -> &UserDefinedAttributes {
        &self.user_defined
    }

    /// Restaure les types utilisateur (session)
    pub fn set_user_defined(&mut self, user_defined: UserDefinedAttributes) {
        self.user_defined = user_defined;
    }

    pub fn is_predefined(&self, type_uuid: &str) -> bool {
        self.predefined.contains_key(type_uuid)
    }

    /// Attributs par défaut d'un type (utilisateur ou prédéfini)
    pub fn get(&self, type_uuid: &str) -> Option<&Map<String, Value>> {
        self.user_defined
            .sample_types
            .get(type_uuid)
            .filter(|t| t.status != SampleTypeStatus::Delete)
            .map(|t| &t.attributes)
            .or_else(|| self.predefined.get(type_uuid))
    }

    /// Cherche un type par son libellé (`TYPE`)
    pub fn find_by_label(&self, label: &str) -> Option<&str> {
        self.options()
            .into_iter()
            .find(|o| o.label.eq_ignore_ascii_case(label))
            .and_then(|o| {
                self.user_defined
                    .sample_types
                    .get_key_value(&o.value)
                    .map(|(k, _)| k.as_str())
                    .or_else(|| self.predefined.get_key_value(&o.value).map(|(k, _)| k.as_str()))
            })
    }

    /// Liste de sélection : prédéfinis puis types utilisateur
    pub fn options(&self) -> Vec<SampleTypeOption> {
        let mut options = self.options.clone();
        options.extend(
            self.user_defined
                .sample_types
                .iter()
                .filter(|(_, t)| t.status != SampleTypeStatus::Delete)
                .map(|(uuid, t)| SampleTypeOption {
                    value: uuid.clone(),
                    label: t
                        .attributes
                        .get(attr::TYPE)
                        .and_then(Value::as_str)
                        .unwrap_or(uuid)
                        .to_string(),
                    is_predefined: false,
                }),
        );
        options
    }

    /// Crée un type utilisateur ; retourne son `TYPEUUID`
    pub fn add_user_type(&mut self, label: &str, attributes: Map<String, Value>) -> Result<String> {
        if self.options().iter().any(|o| o.label.eq_ignore_ascii_case(label)) {
            return Err(TotsError::SampleTypeExists(label.to_string()));
        }

        let type_uuid = generate_uuid();
        let mut attributes = attributes;
        attributes.insert(attr::TYPE.to_string(), label.into());
        attributes.insert(attr::TYPEUUID.to_string(), type_uuid.clone().into());
        attributes.insert(attr::OBJECTID.to_string(), (-1).into());

        self.user_defined.sample_types.insert(
            type_uuid.clone(),
            UserDefinedType {
                status: SampleTypeStatus::Add,
                service_id: String::new(),
                attributes,
            },
        );
        self.user_defined.edit_count += 1;

        info!(type_uuid = %type_uuid, label, "Type d'échantillon créé");
        Ok(type_uuid)
    }

    /// Modifie les attributs d'un type utilisateur
    pub fn update_user_type(&mut self, type_uuid: &str, attributes: Map<String, Value>) -> Result<()> {
        if self.is_predefined(type_uuid) {
            return Err(TotsError::PredefinedSampleType(type_uuid.to_string()));
        }
        let entry = self
            .user_defined
            .sample_types
            .get_mut(type_uuid)
            .ok_or_else(|| TotsError::UnknownSampleType(type_uuid.to_string()))?;

        let label = entry.attributes.get(attr::TYPE).cloned();
        entry.attributes = attributes;
        entry
            .attributes
            .insert(attr::TYPEUUID.to_string(), type_uuid.into());
        if let (Some(label), false) = (label, entry.attributes.contains_key(attr::TYPE)) {
            entry.attributes.insert(attr::TYPE.to_string(), label);
        }
        entry.status = match entry.status {
            SampleTypeStatus::Add => SampleTypeStatus::Add,
            _ => SampleTypeStatus::Edit,
        };
        self.user_defined.edit_count += 1;
        Ok(())
    }

    /// Supprime un type utilisateur et, en cascade, toutes ses features
    ///
    /// Retourne le nouveau ledger. Un type déjà publié reste marqué
    /// `delete` jusqu'à la prochaine publication.
    pub fn delete_user_type(&mut self, edits: &Edits, type_uuid: &str) -> Result<Edits> {
        if self.is_predefined(type_uuid) {
            return Err(TotsError::PredefinedSampleType(type_uuid.to_string()));
        }
        let status = self
            .user_defined
            .sample_types
            .get(type_uuid)
            .map(|t| t.status)
            .ok_or_else(|| TotsError::UnknownSampleType(type_uuid.to_string()))?;

        match status {
            SampleTypeStatus::Add => {
                self.user_defined.sample_types.remove(type_uuid);
            }
            _ => {
                if let Some(entry) = self.user_defined.sample_types.get_mut(type_uuid) {
                    entry.status = SampleTypeStatus::Delete;
                }
            }
        }
        self.user_defined.edit_count += 1;

        Ok(delete_features_of_type(edits, type_uuid))
    }

    /// Marque les types utilisateur comme publiés après un envoi réussi
    pub fn mark_published(&mut self) {
        self.user_defined
            .sample_types
            .retain(|_, t| t.status != SampleTypeStatus::Delete);
        for sample_type in self.user_defined.sample_types.values_mut() {
            sample_type.status = SampleTypeStatus::Published;
        }
        self.user_defined.edit_count += 1;
    }

    /// Applique les attributs d'un type à une copie de la feature
    ///
    /// Les attributs d'identité (identifiants, unité de décision, date de
    /// création) sont conservés.
    pub fn apply_sample_type(&self, feature: &Feature, type_uuid: &str) -> Result<Feature> {
        let attributes = self
            .get(type_uuid)
            .ok_or_else(|| TotsError::UnknownSampleType(type_uuid.to_string()))?;

        let mut typed = feature.clone();
        for (key, value) in attributes {
            if IDENTITY_ATTRIBUTES.contains(&key.as_str()) {
                continue;
            }
            typed.attributes.insert(key.clone(), value.clone());
        }
        typed.set_attr(attr::TYPEUUID, type_uuid);
        Ok(typed)
    }

    /// Crée un nouvel échantillon de ce type dans une couche
    pub fn create_sample(
        &self,
        geometry: Option<geojson::Geometry>,
        type_uuid: &str,
        layer: &LayerInfo,
    ) -> Result<Feature> {
        let id = generate_uuid();
        let mut sample = Feature::new(geometry)
            .with_attr(attr::PERMANENT_IDENTIFIER, id.clone())
            .with_attr(attr::GLOBALID, id)
            .with_attr(attr::OBJECTID, -1)
            .with_attr(attr::CREATEDDATE, current_date_time());
        sample.set_decision_unit(&layer.uuid, &layer.label, layer.sort);
        self.apply_sample_type(&sample, type_uuid)
    }

    /// Vérifie surfaces et attributs d'un lot d'échantillons
    pub fn validate_samples(&self, features: &[Feature], sr: SpatialReference) -> SampleIssuesOutput {
        let mut output = SampleIssuesOutput::default();

        for feature in features {
            let mut issues = SampleIssues {
                permanent_identifier: feature.permanent_id().map(str::to_string),
                ..Default::default()
            };

            let type_uuid = feature.attr_str(attr::TYPEUUID).unwrap_or_default();
            let predefined = self.predefined.get(type_uuid);

            if predefined.is_some() || feature.attr_f64(attr::SA).is_some() {
                self.check_area(feature, sr, &mut issues);
            }

            if let Some(predefined) = predefined {
                for key in &self.attributes_to_check {
                    let Some(expected) = predefined.get(key) else {
                        continue;
                    };
                    let matches = feature
                        .attributes
                        .get(key)
                        .map(|actual| values_match(expected, actual))
                        .unwrap_or(false);
                    if !matches {
                        issues.attribute_mismatch = true;
                        issues.attributes_with_mismatch.push(key.clone());
                    }
                }
            }

            if issues.area_out_of_tolerance || issues.attribute_mismatch {
                output.area_out_of_tolerance |= issues.area_out_of_tolerance;
                output.attribute_mismatch |= issues.attribute_mismatch;
                output.samples_with_issues.push(issues);
            }
        }

        if !output.samples_with_issues.is_empty() {
            debug!(
                issues = output.samples_with_issues.len(),
                "Échantillons non conformes"
            );
        }
        output
    }

    fn check_area(&self, feature: &Feature, sr: SpatialReference, issues: &mut SampleIssues) {
        let Some(geometry) = feature.geometry.as_ref() else {
            return;
        };
        let Ok(area) = geodesy::area_square_inches(geometry, sr) else {
            return;
        };
        let reference = feature.attr_f64(attr::SA).unwrap_or(0.0);
        issues.difference = area - reference;
        if issues.difference.abs() > self.area_tolerance {
            issues.area_out_of_tolerance = true;
        }
    }
}

/// Anomalies détectées sur un échantillon
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleIssues {
    pub permanent_identifier: Option<String>,
    pub area_out_of_tolerance: bool,
    pub attribute_mismatch: bool,
    pub attributes_with_mismatch: Vec<String>,
    /// Surface réelle moins `SA` (pouces carrés)
    pub difference: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleIssuesOutput {
    pub area_out_of_tolerance: bool,
    pub attribute_mismatch: bool,
    pub samples_with_issues: Vec<SampleIssues>,
}

/// Compare deux valeurs d'attribut, nombres et chaînes numériques confondus
fn values_match(expected: &Value, actual: &Value) -> bool {
    fn as_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    match (as_number(expected), as_number(actual)) {
        (Some(a), Some(b)) => (a - b).abs() < 1e-9,
        _ => expected == actual,
    }
}

/// Supprime du ledger toutes les features d'un type (un seul incrément)
fn delete_features_of_type(edits: &Edits, type_uuid: &str) -> Edits {
    let mut next = edits.clone();
    let mut deleted = 0usize;

    for item in next.edits.iter_mut() {
        let layers = match item {
            EditsItem::Layer(l) => std::slice::from_mut(l),
            EditsItem::Scenario(s) => {
                let touched = s.layers.iter().any(|l| {
                    l.current_features()
                        .iter()
                        .any(|f| f.attr_str(attr::TYPEUUID) == Some(type_uuid))
                });
                if touched {
                    s.edit_type = EditType::Delete;
                    s.mark_edited();
                }
                s.layers.as_mut_slice()
            }
        };

        for layer in layers {
            let doomed: Vec<Feature> = layer
                .current_features()
                .into_iter()
                .filter(|f| f.attr_str(attr::TYPEUUID) == Some(type_uuid))
                .cloned()
                .collect();
            if doomed.is_empty() {
                continue;
            }
            deleted += doomed.len();
            layer.apply_delete(&doomed);
            layer.edit_type = EditType::Delete;
            layer.mark_edited();
        }
    }

    next.bump();
    info!(type_uuid, deleted, "Features du type supprimées");
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edits::{update_layer_edits, EditOperation, ScenarioEdits};
    use crate::geodesy::{geographic_to_web_mercator, Geographic};
    use crate::calculate::CalculateSettings;
    use serde_json::json;

    fn catalog() -> SampleTypeCatalog {
        SampleTypeCatalog::embedded().unwrap()
    }

    #[test]
    fn test_embedded_catalog() {
        let catalog = catalog();
        assert_eq!(catalog.options().len(), 6);
        assert!(catalog.is_predefined("Sponge"));
        assert_eq!(catalog.get("Micro Vac").unwrap()["SA"], json!(144));
        assert_eq!(catalog.find_by_label("wet vac"), Some("Wet Vac"));
    }

    #[test]
    fn test_user_type_lifecycle() {
        let mut catalog = catalog();
        let attributes = json!({"SA": 50, "TTPK": 0.2}).as_object().cloned().unwrap();
        let uuid = catalog.add_user_type("Wipe", attributes.clone()).unwrap();
        assert_eq!(catalog.user_defined().edit_count, 1);
        assert_eq!(catalog.find_by_label("Wipe"), Some(uuid.as_str()));

        // nom déjà utilisé
        assert!(matches!(
            catalog.add_user_type("Sponge", attributes.clone()),
            Err(TotsError::SampleTypeExists(_))
        ));

        catalog.mark_published();
        catalog.update_user_type(&uuid, attributes).unwrap();
        let entry = &catalog.user_defined().sample_types[&uuid];
        assert_eq!(entry.status, SampleTypeStatus::Edit);
        assert_eq!(entry.attributes["TYPE"], json!("Wipe"));

        assert!(matches!(
            catalog.update_user_type("Sponge", Map::new()),
            Err(TotsError::PredefinedSampleType(_))
        ));
    }

    #[test]
    fn test_apply_sample_type_keeps_identity() {
        let catalog = catalog();
        let feature = Feature::default()
            .with_attr(attr::PERMANENT_IDENTIFIER, "{A}")
            .with_attr(attr::DECISIONUNIT, "Layer 1")
            .with_attr(attr::SA, 1);
        let typed = catalog.apply_sample_type(&feature, "Swab").unwrap();
        assert_eq!(typed.permanent_id(), Some("{A}"));
        assert_eq!(typed.attr_str(attr::DECISIONUNIT), Some("Layer 1"));
        assert_eq!(typed.attr_f64(attr::SA), Some(4.0));
        assert_eq!(typed.attr_str(attr::TYPE), Some("Swab"));

        assert!(matches!(
            catalog.apply_sample_type(&feature, "Nope"),
            Err(TotsError::UnknownSampleType(_))
        ));
    }

    #[test]
    fn test_delete_user_type_cascades() {
        let mut catalog = catalog();
        let uuid = catalog
            .add_user_type("Wipe", json!({"SA": 50}).as_object().cloned().unwrap())
            .unwrap();

        let scenario = ScenarioEdits::new("Plan", "", CalculateSettings::default());
        let scenario_id = scenario.layer_id.clone();
        let edits = Edits {
            count: 0,
            edits: vec![EditsItem::Scenario(scenario)],
        };
        let layer = LayerInfo::sample_layer("Layer", Some(scenario_id.as_str()));
        let wipe = catalog.create_sample(None, &uuid, &layer).unwrap();
        let sponge = catalog.create_sample(None, "Sponge", &layer).unwrap();
        let edits = update_layer_edits(
            &edits,
            &layer,
            None,
            EditOperation::Add(vec![wipe, sponge.clone()]),
        )
        .unwrap();

        let edits = catalog.delete_user_type(&edits, &uuid).unwrap();
        assert_eq!(edits.count, 2);
        let entry = edits.find_layer(&layer.layer_id).unwrap();
        assert_eq!(entry.adds.len(), 1);
        assert_eq!(entry.adds[0].permanent_id(), sponge.permanent_id());
        // jamais publié : le type disparaît
        assert!(catalog.get(&uuid).is_none());
    }

    #[test]
    fn test_validation_flags_area_and_attributes() {
        let catalog = catalog();
        let layer = LayerInfo::sample_layer("Layer", None);
        let (x, y) = geographic_to_web_mercator(Geographic::from_degrees(-77.03, 38.9));

        let good_geometry = geodesy::square_buffer(x, y, 100.0, SpatialReference::WebMercator).unwrap();
        let good = catalog.create_sample(Some(good_geometry), "Sponge", &layer).unwrap();

        let big_geometry = geodesy::square_buffer(x, y, 400.0, SpatialReference::WebMercator).unwrap();
        let bad = catalog
            .create_sample(Some(big_geometry), "Sponge", &layer)
            .unwrap()
            .with_attr(attr::TTPK, "9");

        let output = catalog.validate_samples(&[good, bad], SpatialReference::WebMercator);
        assert!(output.area_out_of_tolerance);
        assert!(output.attribute_mismatch);
        assert_eq!(output.samples_with_issues.len(), 1);
        let issues = &output.samples_with_issues[0];
        assert_eq!(issues.attributes_with_mismatch, vec!["TTPK".to_string()]);
        assert!((issues.difference - 300.0).abs() < 1.0);
    }

    #[test]
    fn test_numeric_strings_match_numbers() {
        assert!(values_match(&json!(0.12), &json!("0.12")));
        assert!(!values_match(&json!("Sponge"), &json!("Swab")));
    }
}

//! Publication d'un scénario
//!
//! Les couches d'un scénario sont fusionnées en un seul lot (adds, updates,
//! deletes) estampillé avec l'unité de décision de chaque couche. Les
//! résultats renvoyés par le service sont ensuite appliqués un par un : un
//! succès passe dans `published`, un échec reste dans sa file d'attente.
//! Aucune nouvelle tentative n'est faite automatiquement.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::edits::{Edits, LayerEdits};
use crate::error::{Result, TotsError};
use crate::import::{UploadResult, UploadStatus};
use crate::types::{attr, DeleteFeature, Feature, PublishStatus};

/// Lot à envoyer au service pour un scénario
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishBatch {
    pub scenario_id: String,
    pub service_name: String,
    pub service_description: String,
    pub adds: Vec<Feature>,
    pub updates: Vec<Feature>,
    pub deletes: Vec<DeleteFeature>,
}

impl PublishBatch {
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adds.len() + self.updates.len() + self.deletes.len()
    }
}

/// Résultat d'une opération unitaire renvoyé par le service
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResult {
    pub success: bool,
    #[serde(default)]
    pub object_id: Option<i64>,
    #[serde(default)]
    pub global_id: Option<String>,
}

impl EditResult {
    pub fn ok(object_id: i64, global_id: &str) -> Self {
        Self {
            success: true,
            object_id: Some(object_id),
            global_id: Some(global_id.to_string()),
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }
}

/// Réponse du service, alignée sur l'ordre du lot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyEditsResponse {
    #[serde(default)]
    pub add_results: Vec<EditResult>,
    #[serde(default)]
    pub update_results: Vec<EditResult>,
    #[serde(default)]
    pub delete_results: Vec<EditResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PublishTotals {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PublishSummary {
    pub success: String,
    pub failed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishOutcome {
    pub totals: PublishTotals,
    pub summary: PublishSummary,
}

/// Vérifie que le nom du service cible est libre
pub fn check_service_name(name: &str, existing: &[String]) -> std::result::Result<(), UploadResult> {
    if existing.iter().any(|n| n.eq_ignore_ascii_case(name)) {
        return Err(UploadResult {
            status: UploadStatus::NameNotAvailable,
            error: None,
            message: format!("The name \"{}\" is already in use", name),
        });
    }
    Ok(())
}

/// Construit le lot de publication d'un scénario
pub fn build_publish_batch(edits: &Edits, scenario_id: &str) -> Result<PublishBatch> {
    let scenario = edits
        .find_scenario(scenario_id)
        .ok_or_else(|| TotsError::ScenarioNotFound(scenario_id.to_string()))?;

    let mut batch = PublishBatch {
        scenario_id: scenario_id.to_string(),
        service_name: scenario.scenario_name.clone(),
        service_description: scenario.scenario_description.clone(),
        ..Default::default()
    };

    for layer in &scenario.layers {
        let stamp = |feature: &Feature| {
            let mut stamped = feature.clone();
            stamped.set_decision_unit(&layer.uuid, &layer.label, layer.sort);
            stamped
        };
        batch.adds.extend(layer.adds.iter().map(stamp));
        batch.updates.extend(layer.updates.iter().map(stamp));
        batch.deletes.extend(layer.deletes.iter().map(|d| DeleteFeature {
            decision_unit_uuid: layer.uuid.clone(),
            ..d.clone()
        }));
    }

    info!(
        scenario = scenario_id,
        adds = batch.adds.len(),
        updates = batch.updates.len(),
        deletes = batch.deletes.len(),
        "Lot de publication construit"
    );
    Ok(batch)
}

/// Nouvelles files d'une couche après publication
#[derive(Default)]
struct LayerChanges {
    adds: Vec<Feature>,
    updates: Vec<Feature>,
    deletes: Vec<DeleteFeature>,
    published: Vec<Feature>,
}

impl LayerChanges {
    fn from_layer(layer: &LayerEdits) -> Self {
        Self {
            published: layer.published.clone(),
            ..Default::default()
        }
    }

    fn publish(&mut self, feature: Feature) {
        let id = feature.permanent_id().map(str::to_string);
        match self
            .published
            .iter()
            .position(|p| id.is_some() && p.permanent_id() == id.as_deref())
        {
            Some(idx) => self.published[idx] = feature,
            None => self.published.push(feature),
        }
    }

    fn unpublish(&mut self, permanent_id: &str) {
        self.published.retain(|p| p.permanent_id() != Some(permanent_id));
    }
}

/// Applique les résultats du service au ledger
///
/// Le scénario passe `published` et ses paramètres de calcul courants sont
/// recopiés dans `calculate_settings.published`. Un élément du lot sans
/// résultat correspondant est compté en échec et reste en attente.
pub fn apply_publish_results(
    edits: &Edits,
    batch: &PublishBatch,
    response: &ApplyEditsResponse,
) -> Result<(Edits, PublishOutcome)> {
    let mut next = edits.clone();
    let scenario = next
        .find_scenario_mut(&batch.scenario_id)
        .ok_or_else(|| TotsError::ScenarioNotFound(batch.scenario_id.clone()))?;

    let mut changes: HashMap<String, LayerChanges> = scenario
        .layers
        .iter()
        .map(|l| (l.uuid.clone(), LayerChanges::from_layer(l)))
        .collect();
    let mut totals = PublishTotals::default();

    for (idx, item) in batch.adds.iter().enumerate() {
        let Some(layer) = owner(&mut changes, item.attr_str(attr::DECISIONUNITUUID)) else {
            continue;
        };
        match response.add_results.get(idx).filter(|r| r.success) {
            Some(result) => {
                totals.added += 1;
                layer.publish(with_server_ids(item, result));
            }
            None => {
                totals.failed += 1;
                layer.adds.push(item.clone());
            }
        }
    }

    for (idx, item) in batch.updates.iter().enumerate() {
        let Some(layer) = owner(&mut changes, item.attr_str(attr::DECISIONUNITUUID)) else {
            continue;
        };
        match response.update_results.get(idx).filter(|r| r.success) {
            Some(result) => {
                totals.updated += 1;
                layer.publish(with_server_ids(item, result));
            }
            None => {
                totals.failed += 1;
                layer.updates.push(item.clone());
            }
        }
    }

    for (idx, item) in batch.deletes.iter().enumerate() {
        let Some(layer) = owner(&mut changes, Some(item.decision_unit_uuid.as_str())) else {
            continue;
        };
        match response.delete_results.get(idx).filter(|r| r.success) {
            Some(_) => {
                totals.deleted += 1;
                layer.unpublish(&item.permanent_identifier);
            }
            None => {
                totals.failed += 1;
                layer.deletes.push(item.clone());
            }
        }
    }

    for layer in scenario.layers.iter_mut() {
        if let Some(change) = changes.remove(&layer.uuid) {
            layer.adds = change.adds;
            layer.updates = change.updates;
            layer.deletes = change.deletes;
            layer.published = change.published;
        }
        layer.status = PublishStatus::Published;
    }
    scenario.status = PublishStatus::Published;
    scenario.calculate_settings.published = Some(scenario.calculate_settings.current);

    next.bump();

    if totals.failed > 0 {
        warn!(scenario = %batch.scenario_id, failed = totals.failed, "Publication partielle");
    }
    info!(
        scenario = %batch.scenario_id,
        added = totals.added,
        updated = totals.updated,
        deleted = totals.deleted,
        "Résultats de publication appliqués"
    );

    let summary = summarize(&totals);
    Ok((next, PublishOutcome { totals, summary }))
}

fn owner<'a>(
    changes: &'a mut HashMap<String, LayerChanges>,
    decision_unit_uuid: Option<&str>,
) -> Option<&'a mut LayerChanges> {
    let layer = decision_unit_uuid.and_then(|uuid| changes.get_mut(uuid));
    if layer.is_none() {
        warn!(?decision_unit_uuid, "Résultat sans couche correspondante ignoré");
    }
    layer
}

fn with_server_ids(item: &Feature, result: &EditResult) -> Feature {
    let mut published = item.clone();
    if let Some(object_id) = result.object_id {
        published.set_attr(attr::OBJECTID, object_id);
    }
    if let Some(global_id) = &result.global_id {
        published.set_attr(attr::GLOBALID, global_id.as_str());
    }
    published
}

/// Messages de synthèse : `3 item(s) added and 1 item(s) deleted`
pub fn summarize(totals: &PublishTotals) -> PublishSummary {
    let parts: Vec<String> = [
        (totals.added, "added"),
        (totals.updated, "updated"),
        (totals.deleted, "deleted"),
    ]
    .into_iter()
    .filter(|(n, _)| *n > 0)
    .map(|(n, verb)| format!("{} item(s) {}", n, verb))
    .collect();

    let success = match parts.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
    };
    let failed = if totals.failed > 0 {
        format!("{} item(s) failed to publish.", totals.failed)
    } else {
        String::new()
    };

    PublishSummary { success, failed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculate::CalculateSettings;
    use crate::edits::{update_layer_edits, EditOperation, EditsItem, ScenarioEdits};
    use crate::layer::LayerInfo;

    fn sample(id: &str) -> Feature {
        Feature::default()
            .with_attr(attr::PERMANENT_IDENTIFIER, id)
            .with_attr(attr::GLOBALID, id)
            .with_attr(attr::OBJECTID, -1)
    }

    fn scenario_with_layer() -> (Edits, String, LayerInfo) {
        let scenario = ScenarioEdits::new("Plan", "desc", CalculateSettings::default());
        let scenario_id = scenario.layer_id.clone();
        let edits = Edits {
            count: 0,
            edits: vec![EditsItem::Scenario(scenario)],
        };
        let layer = LayerInfo::sample_layer("Layer 1", Some(scenario_id.as_str()));
        (edits, scenario_id, layer)
    }

    #[test]
    fn test_batch_stamps_decision_units() {
        let (edits, scenario_id, mut layer) = scenario_with_layer();
        layer.sort = 3;
        let edits = update_layer_edits(
            &edits,
            &layer,
            None,
            EditOperation::Add(vec![sample("a"), sample("b")]),
        )
        .unwrap();

        let batch = build_publish_batch(&edits, &scenario_id).unwrap();
        assert_eq!(batch.service_name, "Plan");
        assert_eq!(batch.adds.len(), 2);
        assert_eq!(batch.len(), 2);
        let stamped = &batch.adds[0];
        assert_eq!(stamped.attr_str(attr::DECISIONUNITUUID), Some(layer.uuid.as_str()));
        assert_eq!(stamped.attr_str(attr::DECISIONUNIT), Some("Layer 1"));
        assert_eq!(stamped.attr_f64(attr::DECISIONUNITSORT), Some(3.0));
    }

    #[test]
    fn test_partial_failure() {
        let (edits, scenario_id, layer) = scenario_with_layer();
        let edits = update_layer_edits(
            &edits,
            &layer,
            None,
            EditOperation::Arcgis(vec![sample("old")]),
        )
        .unwrap();
        let edits =
            update_layer_edits(&edits, &layer, None, EditOperation::Delete(vec![sample("old")]))
                .unwrap();
        let adds: Vec<Feature> = (0..5).map(|i| sample(&format!("n{}", i))).collect();
        let edits = update_layer_edits(&edits, &layer, None, EditOperation::Add(adds)).unwrap();

        let batch = build_publish_batch(&edits, &scenario_id).unwrap();
        let response = ApplyEditsResponse {
            add_results: vec![
                EditResult::ok(1, "{G1}"),
                EditResult::failed(),
                EditResult::ok(2, "{G2}"),
                EditResult::failed(),
                EditResult::ok(3, "{G3}"),
            ],
            update_results: vec![],
            delete_results: vec![EditResult::ok(0, "")],
        };

        let (next, outcome) = apply_publish_results(&edits, &batch, &response).unwrap();
        assert_eq!(outcome.totals.added, 3);
        assert_eq!(outcome.totals.deleted, 1);
        assert_eq!(outcome.totals.failed, 2);
        assert_eq!(outcome.summary.success, "3 item(s) added and 1 item(s) deleted");
        assert_eq!(outcome.summary.failed, "2 item(s) failed to publish.");

        let entry = next.find_layer(&layer.layer_id).unwrap();
        assert_eq!(entry.published.len(), 3);
        assert_eq!(entry.adds.len(), 2);
        assert!(entry.deletes.is_empty());
        assert_eq!(entry.adds[0].permanent_id(), Some("n1"));
        assert_eq!(entry.published[0].attr_f64(attr::OBJECTID), Some(1.0));
        assert_eq!(entry.published[0].attr_str(attr::GLOBALID), Some("{G1}"));

        let scenario = next.find_scenario(&scenario_id).unwrap();
        assert_eq!(scenario.status, PublishStatus::Published);
        assert_eq!(
            scenario.calculate_settings.published.as_ref(),
            Some(&scenario.calculate_settings.current)
        );
        assert_eq!(next.count, edits.count + 1);
    }

    #[test]
    fn test_missing_results_count_as_failures() {
        let (edits, scenario_id, layer) = scenario_with_layer();
        let edits = update_layer_edits(
            &edits,
            &layer,
            None,
            EditOperation::Add(vec![sample("a"), sample("b")]),
        )
        .unwrap();
        let batch = build_publish_batch(&edits, &scenario_id).unwrap();
        let response = ApplyEditsResponse {
            add_results: vec![EditResult::ok(7, "{G7}")],
            ..Default::default()
        };

        let (next, outcome) = apply_publish_results(&edits, &batch, &response).unwrap();
        assert_eq!(outcome.totals.failed, 1);
        assert_eq!(outcome.summary.success, "1 item(s) added");
        let entry = next.find_layer(&layer.layer_id).unwrap();
        assert_eq!(entry.adds[0].permanent_id(), Some("b"));
    }

    #[test]
    fn test_service_name_check() {
        let existing = vec!["Plan".to_string()];
        let err = check_service_name("plan", &existing).unwrap_err();
        assert_eq!(err.status, UploadStatus::NameNotAvailable);
        assert!(check_service_name("Plan 2", &existing).is_ok());
    }

    #[test]
    fn test_summary_three_parts() {
        let totals = PublishTotals {
            added: 1,
            updated: 2,
            deleted: 3,
            failed: 0,
        };
        let summary = summarize(&totals);
        assert_eq!(
            summary.success,
            "1 item(s) added, 2 item(s) updated and 3 item(s) deleted"
        );
        assert!(summary.failed.is_empty());
    }
}

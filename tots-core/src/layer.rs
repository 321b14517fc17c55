//! Enregistrement logique d'une couche (sans objet de rendu)

use serde::{Deserialize, Serialize};

use crate::types::{generate_uuid, AddedFrom, EditType, LayerTypeName, ListMode, PublishStatus};

/// Nom de la couche d'échantillons créée par défaut
pub const DEFAULT_SAMPLE_LAYER_NAME: &str = "Default Sample Layer";

/// Couche telle que connue du registre
///
/// Le lien avec l'objet de rendu passe uniquement par `layer_id`
/// (voir [`crate::registry::RenderAdapter`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerInfo {
    pub id: i64,
    pub uuid: String,
    pub layer_id: String,
    #[serde(default)]
    pub portal_id: String,
    pub name: String,
    pub label: String,
    pub layer_type: LayerTypeName,
    pub edit_type: EditType,
    pub visible: bool,
    #[serde(default)]
    pub list_mode: ListMode,
    #[serde(default)]
    pub sort: i64,
    #[serde(default = "default_geometry_type")]
    pub geometry_type: String,
    pub added_from: AddedFrom,
    pub status: PublishStatus,
    /// Groupe parent (scénario) auquel la couche est rattachée
    #[serde(default)]
    pub parent_layer_id: Option<String>,
}

fn default_geometry_type() -> String {
    "esriGeometryPolygon".to_string()
}

impl LayerInfo {
    /// Construit une couche d'échantillons dessinée, éventuellement rattachée
    /// à un scénario
    pub fn sample_layer(name: &str, parent_layer_id: Option<&str>) -> Self {
        let uuid = generate_uuid();
        Self {
            id: -1,
            layer_id: uuid.clone(),
            uuid,
            portal_id: String::new(),
            name: name.to_string(),
            label: name.to_string(),
            layer_type: LayerTypeName::Samples,
            edit_type: EditType::Add,
            visible: true,
            list_mode: ListMode::Show,
            sort: 0,
            geometry_type: default_geometry_type(),
            added_from: AddedFrom::Sketch,
            status: PublishStatus::Added,
            parent_layer_id: parent_layer_id.map(str::to_string),
        }
    }

    /// Construit une couche importée depuis un fichier
    pub fn file_layer(name: &str, layer_type: LayerTypeName, parent_layer_id: Option<&str>) -> Self {
        Self {
            layer_type,
            added_from: AddedFrom::File,
            ..Self::sample_layer(name, parent_layer_id)
        }
    }

    /// Couche de masque d'échantillonnage dessinée
    pub fn sampling_mask() -> Self {
        Self {
            name: "Sketched Sampling Mask".to_string(),
            label: "Sketched Sampling Mask".to_string(),
            layer_type: LayerTypeName::SamplingMask,
            list_mode: ListMode::Hide,
            ..Self::sample_layer("Sketched Sampling Mask", None)
        }
    }

    pub fn is_linked(&self) -> bool {
        self.parent_layer_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_layer_defaults() {
        let layer = LayerInfo::sample_layer(DEFAULT_SAMPLE_LAYER_NAME, Some("{SCENARIO}"));
        assert_eq!(layer.layer_id, layer.uuid);
        assert_eq!(layer.layer_type, LayerTypeName::Samples);
        assert_eq!(layer.status, PublishStatus::Added);
        assert_eq!(layer.parent_layer_id.as_deref(), Some("{SCENARIO}"));
        assert!(layer.is_linked());
    }

    #[test]
    fn test_file_layer() {
        let layer = LayerInfo::file_layer("import.csv", LayerTypeName::Vsp, None);
        assert_eq!(layer.added_from, AddedFrom::File);
        assert_eq!(layer.layer_type, LayerTypeName::Vsp);
        assert!(!layer.is_linked());
    }
}

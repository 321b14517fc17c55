//! Types de données partagés : features, statuts, types de couche

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Noms des attributs portés par les features d'échantillonnage
pub mod attr {
    pub const PERMANENT_IDENTIFIER: &str = "PERMANENT_IDENTIFIER";
    pub const GLOBALID: &str = "GLOBALID";
    pub const OBJECTID: &str = "OBJECTID";
    pub const TYPE: &str = "TYPE";
    pub const TYPEUUID: &str = "TYPEUUID";
    pub const SHAPE_TYPE: &str = "ShapeType";
    pub const DECISIONUNITUUID: &str = "DECISIONUNITUUID";
    pub const DECISIONUNIT: &str = "DECISIONUNIT";
    pub const DECISIONUNITSORT: &str = "DECISIONUNITSORT";
    pub const CREATEDDATE: &str = "CREATEDDATE";
    pub const NOTES: &str = "Notes";

    pub const TTPK: &str = "TTPK";
    pub const TTC: &str = "TTC";
    pub const TTA: &str = "TTA";
    pub const TTPS: &str = "TTPS";
    pub const LOD_P: &str = "LOD_P";
    pub const LOD_NON: &str = "LOD_NON";
    pub const MCPS: &str = "MCPS";
    pub const TCPS: &str = "TCPS";
    pub const WVPS: &str = "WVPS";
    pub const WWPS: &str = "WWPS";
    pub const SA: &str = "SA";
    pub const AA: &str = "AA";
    pub const AC: &str = "AC";
    pub const ALC: &str = "ALC";
    pub const AMC: &str = "AMC";

    pub const CONTAMTYPE: &str = "CONTAMTYPE";
    pub const CONTAMVAL: &str = "CONTAMVAL";
    pub const CONTAMUNIT: &str = "CONTAMUNIT";
}

/// Une feature d'échantillonnage : sac d'attributs + géométrie optionnelle
///
/// La géométrie est stockée en GeoJSON, dans la référence spatiale de la
/// session (Web Mercator par défaut).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<geojson::Geometry>,
}

impl Feature {
    pub fn new(geometry: Option<geojson::Geometry>) -> Self {
        Self {
            attributes: Map::new(),
            geometry,
        }
    }

    /// Identifiant permanent, s'il est présent et non vide
    pub fn permanent_id(&self) -> Option<&str> {
        self.attr_str(attr::PERMANENT_IDENTIFIER)
            .filter(|id| !id.is_empty())
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Lit un attribut numérique (nombre JSON ou chaîne numérique)
    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        match self.attributes.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn has_attr(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    /// Variante builder de `set_attr`
    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Rattache la feature à une couche (unité de décision)
    pub fn set_decision_unit(&mut self, uuid: &str, label: &str, sort: i64) {
        self.set_attr(attr::DECISIONUNITUUID, uuid);
        self.set_attr(attr::DECISIONUNIT, label);
        self.set_attr(attr::DECISIONUNITSORT, sort);
    }
}

/// Pierre tombale d'une feature publiée à supprimer sur le service distant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFeature {
    #[serde(rename = "PERMANENT_IDENTIFIER")]
    pub permanent_identifier: String,
    #[serde(rename = "GLOBALID", default)]
    pub global_id: String,
    #[serde(rename = "DECISIONUNITUUID", default)]
    pub decision_unit_uuid: String,
}

/// Type de couche TOTS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerTypeName {
    #[serde(rename = "Contamination Map")]
    ContaminationMap,
    #[serde(rename = "Samples")]
    Samples,
    #[serde(rename = "Reference Layer")]
    ReferenceLayer,
    #[serde(rename = "Area of Interest")]
    AreaOfInterest,
    #[serde(rename = "VSP")]
    Vsp,
    #[serde(rename = "Sampling Mask")]
    SamplingMask,
}

impl LayerTypeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContaminationMap => "Contamination Map",
            Self::Samples => "Samples",
            Self::ReferenceLayer => "Reference Layer",
            Self::AreaOfInterest => "Area of Interest",
            Self::Vsp => "VSP",
            Self::SamplingMask => "Sampling Mask",
        }
    }

    /// Couches dont les features entrent dans les calculs
    pub fn is_samples(&self) -> bool {
        matches!(self, Self::Samples | Self::Vsp)
    }
}

impl std::str::FromStr for LayerTypeName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Contamination Map" => Ok(Self::ContaminationMap),
            "Samples" => Ok(Self::Samples),
            "Reference Layer" => Ok(Self::ReferenceLayer),
            "Area of Interest" => Ok(Self::AreaOfInterest),
            "VSP" => Ok(Self::Vsp),
            "Sampling Mask" => Ok(Self::SamplingMask),
            other => Err(format!("Unknown layer type: {}", other)),
        }
    }
}

/// Origine d'une couche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddedFrom {
    File,
    Sketch,
    Tots,
}

/// Statut de publication d'une couche ou d'un scénario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Added,
    Edited,
    Published,
}

/// Dernière opération appliquée à une entrée du ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditType {
    Add,
    Update,
    Delete,
    Arcgis,
    Properties,
    Move,
}

/// Visibilité dans la légende
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListMode {
    Hide,
    HideChildren,
    #[default]
    Show,
}

/// Génère un identifiant unique au format `{UUID-EN-MAJUSCULES}`
pub fn generate_uuid() -> String {
    format!("{{{}}}", Uuid::new_v4().to_string().to_uppercase())
}

/// Horodatage courant au format `YYYY/MM/DD hh:mm:ss.sss`
pub fn current_date_time() -> String {
    chrono::Local::now()
        .format("%Y/%m/%d %H:%M:%S%.3f")
        .to_string()
}

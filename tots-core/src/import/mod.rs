//! Import de fichiers en couche du plan
//!
//! Formats acceptés :
//! - CSV avec colonnes `x` et `y` (Web Mercator ou WGS84)
//! - GeoJSON (`.geojson`, `.geo.json`, `.json`), coordonnées WGS84
//!
//! L'import ne panique jamais : chaque échec est rendu sous forme
//! d'[`UploadResult`] avec un statut de la taxonomie [`UploadStatus`].

pub mod csv;
mod geojson_file;

pub use geojson_file::parse as parse_geojson;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::edits::Edits;
use crate::error::{Result, TotsError};
use crate::geodesy::{self, SpatialReference};
use crate::layer::LayerInfo;
use crate::registry::{RenderAdapter, Registry};
use crate::sample_types::SampleTypeCatalog;
use crate::types::{attr, current_date_time, generate_uuid, Feature, LayerTypeName};

/// Attributs exigés pour une couche de contamination
pub const CONTAMINATION_REQUIRED_FIELDS: [&str; 3] =
    [attr::CONTAMTYPE, attr::CONTAMVAL, attr::CONTAMUNIT];

/// Attributs exigés pour une couche d'échantillons
pub const SAMPLES_REQUIRED_FIELDS: [&str; 15] = [
    attr::TYPE,
    attr::TTPK,
    attr::TTC,
    attr::TTA,
    attr::TTPS,
    attr::LOD_P,
    attr::LOD_NON,
    attr::MCPS,
    attr::TCPS,
    attr::WVPS,
    attr::WWPS,
    attr::SA,
    attr::NOTES,
    attr::ALC,
    attr::AMC,
];

/// Statut d'un import (ou d'une publication)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    Fetching,
    Success,
    InvalidFileType,
    FileReadError,
    ImportError,
    NoData,
    MissingAttributes,
    UnknownSampleType,
    UserCanceled,
    NameNotAvailable,
    Failure,
    OverMaxFeatures,
}

impl UploadStatus {
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Fetching | Self::Success)
    }
}

/// Résultat structuré d'un import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub status: UploadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
}

impl UploadResult {
    fn new(status: UploadStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            error: None,
            message: message.into(),
        }
    }

    fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Format de fichier reconnu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    GeoJson,
}

impl FileKind {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".csv") {
            Some(Self::Csv)
        } else if lower.ends_with(".geojson") || lower.ends_with(".json") {
            Some(Self::GeoJson)
        } else {
            None
        }
    }
}

/// Paramètres d'un import
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub layer_type: LayerTypeName,
    /// Référence spatiale des colonnes `x`/`y` d'un CSV
    pub csv_spatial_reference: SpatialReference,
    /// Référence spatiale des géométries de la session
    pub session_spatial_reference: SpatialReference,
    /// Nombre maximal de features acceptées
    pub max_features: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            layer_type: LayerTypeName::Samples,
            csv_spatial_reference: SpatialReference::WebMercator,
            session_spatial_reference: SpatialReference::WebMercator,
            max_features: 4000,
        }
    }
}

/// Couche prête à entrer dans le registre
#[derive(Debug, Clone)]
pub struct ImportedLayer {
    pub layer: LayerInfo,
    pub features: Vec<Feature>,
}

/// Attributs requis absents d'une feature
pub fn file_verification(layer_type: LayerTypeName, attributes: &Map<String, Value>) -> Vec<&'static str> {
    let required: &[&'static str] = match layer_type {
        LayerTypeName::ContaminationMap => &CONTAMINATION_REQUIRED_FIELDS,
        LayerTypeName::Samples => &SAMPLES_REQUIRED_FIELDS,
        _ => &[],
    };
    required
        .iter()
        .copied()
        .filter(|field| !attributes.contains_key(*field))
        .collect()
}

/// Liste triée au format `A, B and C`
pub fn format_missing_attributes(missing: &[String]) -> String {
    let mut sorted = missing.to_vec();
    sorted.sort();
    sorted.dedup();
    match sorted.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
    }
}

/// Lit et vérifie un fichier, sans toucher au ledger
///
/// `label` est le libellé (déjà dédoublonné) de la couche à créer et
/// `scenario_id` le scénario qui recevra une couche d'échantillons.
pub fn read_file(
    filename: &str,
    content: &[u8],
    label: &str,
    scenario_id: Option<&str>,
    catalog: &SampleTypeCatalog,
    options: &ImportOptions,
) -> std::result::Result<ImportedLayer, UploadResult> {
    let kind = FileKind::from_filename(filename).ok_or_else(|| {
        UploadResult::new(
            UploadStatus::InvalidFileType,
            format!(
                "{} is an invalid file type. The accepted file types are .csv, .json and .geojson",
                filename
            ),
        )
    })?;

    let raw = parse_features(kind, filename, content, options)?;

    if raw.is_empty() {
        return Err(UploadResult::new(
            UploadStatus::NoData,
            format!("The {} file did not have any data to display on the map", filename),
        ));
    }
    if raw.len() > options.max_features {
        return Err(UploadResult::new(
            UploadStatus::OverMaxFeatures,
            format!(
                "The {} file has {} features, more than the maximum of {}",
                filename,
                raw.len(),
                options.max_features
            ),
        ));
    }

    let parent = scenario_id.filter(|_| options.layer_type.is_samples());
    let layer = LayerInfo::file_layer(label, options.layer_type, parent);

    let mut missing: Vec<String> = Vec::new();
    let mut unknown_sample_type = false;
    let mut features = Vec::with_capacity(raw.len());

    for feature in raw {
        match prepare_feature(feature, &layer, catalog) {
            Prepared::Ready(feature, missing_fields) => {
                for field in missing_fields {
                    if !missing.iter().any(|m| m == field) {
                        missing.push(field.to_string());
                    }
                }
                features.push(buffer_point(feature, options.session_spatial_reference));
            }
            Prepared::UnknownType => unknown_sample_type = true,
        }
    }

    if unknown_sample_type {
        let known: Vec<String> = catalog.options().into_iter().map(|o| o.label).collect();
        return Err(UploadResult::new(
            UploadStatus::UnknownSampleType,
            format!(
                "An unknown sample type was found. Please use one of the sample types recognized by TOTS ({}).",
                known.join(", ")
            ),
        ));
    }

    if !missing.is_empty() {
        let list = format_missing_attributes(&missing);
        warn!(file = filename, missing = %list, "Attributs requis manquants");
        return Err(UploadResult::new(
            UploadStatus::MissingAttributes,
            format!(
                "Features in the {} are missing the following required attributes: {}",
                filename, list
            ),
        ));
    }

    debug!(file = filename, features = features.len(), "Fichier vérifié");
    Ok(ImportedLayer { layer, features })
}

/// Importe un fichier : vérification, puis ajout de la couche au registre
/// et au ledger en une seule modification
///
/// En cas d'échec le ledger retourné est celui d'entrée.
#[allow(clippy::too_many_arguments)]
pub fn import_file(
    edits: &Edits,
    registry: &mut Registry,
    catalog: &SampleTypeCatalog,
    filename: &str,
    content: &[u8],
    scenario_id: Option<&str>,
    options: &ImportOptions,
    renderer: &mut dyn RenderAdapter,
) -> (Edits, UploadResult) {
    let label = registry.unique_label(filename);
    let imported = match read_file(filename, content, &label, scenario_id, catalog, options) {
        Ok(imported) => imported,
        Err(result) => return (edits.clone(), result),
    };

    let layer_id = imported.layer.layer_id.clone();
    let count = imported.features.len();
    match registry.add_layer_with_features(edits, imported.layer, imported.features, renderer) {
        Ok(next) => {
            info!(file = filename, layer = %layer_id, features = count, "Fichier importé");
            let message = if label == filename {
                format!("\"{}\" was successfully uploaded", filename)
            } else {
                format!("\"{}\" was successfully uploaded as \"{}\"", filename, label)
            };
            (next, UploadResult::new(UploadStatus::Success, message))
        }
        Err(e) => (
            edits.clone(),
            UploadResult::new(UploadStatus::Failure, format!("Failed to add {}", filename))
                .with_error(e),
        ),
    }
}

fn parse_features(
    kind: FileKind,
    filename: &str,
    content: &[u8],
    options: &ImportOptions,
) -> std::result::Result<Vec<Feature>, UploadResult> {
    let read_error = |e: TotsError| {
        UploadResult::new(
            UploadStatus::FileReadError,
            format!("Failed to read the {} file.", filename),
        )
        .with_error(e)
    };

    match kind {
        FileKind::GeoJson => {
            geojson_file::parse(content, filename, options.session_spatial_reference)
                .map_err(read_error)
        }
        FileKind::Csv => {
            let table = csv::parse(content, filename).map_err(read_error)?;
            if table.rows.is_empty() {
                return Ok(Vec::new());
            }
            let (Some(x_col), Some(y_col)) = (table.column("x"), table.column("y")) else {
                return Err(UploadResult::new(
                    UploadStatus::ImportError,
                    format!("The {} file has no x and y columns", filename),
                ));
            };
            table
                .rows
                .iter()
                .map(|row| {
                    let geometry = csv_point(row, x_col, y_col, filename, options)?;
                    Ok(Feature {
                        attributes: table.attributes(row, &[x_col, y_col]),
                        geometry: Some(geometry),
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map_err(read_error)
        }
    }
}

fn csv_point(
    row: &[String],
    x_col: usize,
    y_col: usize,
    filename: &str,
    options: &ImportOptions,
) -> Result<geojson::Geometry> {
    let coordinate = |idx: usize| -> Result<f64> {
        row[idx].trim().parse::<f64>().map_err(|_| {
            TotsError::parse_error(filename, format!("invalid coordinate '{}'", row[idx]))
        })
    };
    let point = geojson::Geometry::new(geojson::Value::Point(vec![
        coordinate(x_col)?,
        coordinate(y_col)?,
    ]));
    geodesy::reproject(
        &point,
        options.csv_spatial_reference,
        options.session_spatial_reference,
    )
}

enum Prepared {
    Ready(Feature, Vec<&'static str>),
    UnknownType,
}

/// Estampille identifiants et unité de décision, applique le type d'échantillon
fn prepare_feature(mut feature: Feature, layer: &LayerInfo, catalog: &SampleTypeCatalog) -> Prepared {
    let timestamp = current_date_time();
    let uuid = generate_uuid();

    match layer.layer_type {
        LayerTypeName::Samples => {
            let Some(type_uuid) = feature
                .attr_str(attr::TYPE)
                .and_then(|label| catalog.find_by_label(label))
                .map(str::to_string)
            else {
                return Prepared::UnknownType;
            };
            // vérification sur les attributs du fichier, avant application du type
            let missing = file_verification(layer.layer_type, &feature.attributes);

            let notes = feature.attributes.get(attr::NOTES).cloned().unwrap_or(Value::Null);
            let mut typed = Feature::new(feature.geometry.take());
            if let Some(defaults) = catalog.get(&type_uuid) {
                typed.attributes = defaults.clone();
            }
            typed.set_attr(attr::TYPEUUID, type_uuid);
            typed.set_attr(attr::AA, Value::Null);
            typed.set_attr(attr::AC, Value::Null);
            typed.set_attr(attr::CREATEDDATE, timestamp);
            typed.set_attr(attr::PERMANENT_IDENTIFIER, uuid.clone());
            typed.set_attr(attr::GLOBALID, uuid);
            typed.set_attr(attr::NOTES, notes);
            typed.set_decision_unit(&layer.uuid, &layer.label, 0);
            return Prepared::Ready(typed, missing);
        }
        LayerTypeName::Vsp => {
            feature.set_attr(attr::AA, Value::Null);
            feature.set_attr(attr::AC, Value::Null);
            feature.set_decision_unit(&layer.uuid, &layer.label, 0);
            if !feature.has_attr(attr::CREATEDDATE) {
                feature.set_attr(attr::CREATEDDATE, timestamp);
            }
            if !feature.has_attr(attr::SHAPE_TYPE) {
                if let Some(shape) = feature.attributes.get("SHAPETYPE").cloned() {
                    feature.attributes.insert(attr::SHAPE_TYPE.to_string(), shape);
                }
            }
        }
        _ => {}
    }

    if feature.attr_str(attr::TYPE).is_none() {
        feature.set_attr(attr::TYPE, layer.layer_type.as_str());
    }
    if feature.permanent_id().is_none() {
        feature.set_attr(attr::PERMANENT_IDENTIFIER, uuid.clone());
    }
    if feature.attr_str(attr::GLOBALID).map_or(true, str::is_empty) {
        feature.set_attr(attr::GLOBALID, uuid);
    }

    let missing = file_verification(layer.layer_type, &feature.attributes);
    Prepared::Ready(feature, missing)
}

/// Remplace un point d'échantillon par un carré de surface `SA`
fn buffer_point(mut feature: Feature, sr: SpatialReference) -> Feature {
    let Some(reference_area) = feature.attr_f64(attr::SA).filter(|sa| *sa > 0.0) else {
        return feature;
    };
    let point = match feature.geometry.as_ref().map(|g| &g.value) {
        Some(geojson::Value::Point(coords)) if coords.len() >= 2 => (coords[0], coords[1]),
        _ => return feature,
    };

    match geodesy::square_buffer(point.0, point.1, reference_area, sr) {
        Ok(square) => {
            feature.geometry = Some(square);
            if !feature.has_attr(attr::SHAPE_TYPE) {
                feature.set_attr(attr::SHAPE_TYPE, "point");
            }
        }
        Err(e) => warn!(error = %e, "Point d'échantillon conservé sans tampon"),
    }
    feature
}

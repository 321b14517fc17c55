//! Configuration de la session et des services

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tots_core::{ImportOptions, LayerTypeName, SpatialReference};

/// Configuration principale
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Référence spatiale des géométries de la session (WKID)
    #[serde(default = "default_wkid")]
    pub spatial_reference: u32,

    /// Paramètres du service de génération et de publication
    #[serde(default)]
    pub service: ServiceConfig,

    /// Paramètres de persistance de la session
    #[serde(default)]
    pub storage: StorageConfig,

    /// Paramètres d'import de fichiers
    #[serde(default)]
    pub import: ImportConfig,
}

/// Limites du service distant
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Nombre maximal d'enregistrements par requête de génération
    pub max_record_count: usize,
}

/// Persistance de la session
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Quota en octets (5 Mo par défaut, comme un stockage de navigateur)
    pub quota_bytes: usize,

    /// Répertoire de session (un fichier JSON par clé)
    #[serde(default)]
    pub session_dir: Option<PathBuf>,
}

/// Import de fichiers
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportConfig {
    pub max_features: usize,

    /// WKID des colonnes `x`/`y` d'un CSV
    #[serde(default = "default_wkid")]
    pub csv_spatial_reference: u32,
}

fn default_wkid() -> u32 {
    SpatialReference::WebMercator.wkid()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_record_count: 500,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            quota_bytes: 5 * 1024 * 1024,
            session_dir: None,
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_features: 4000,
            csv_spatial_reference: default_wkid(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spatial_reference: default_wkid(),
            service: ServiceConfig::default(),
            storage: StorageConfig::default(),
            import: ImportConfig::default(),
        }
    }
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "default" => Self::load_embedded(include_str!("presets/default.json")),
            "training" => Self::load_embedded(include_str!("presets/training.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: default, training", preset),
        }
    }

    /// Nom de preset ou chemin vers un fichier JSON
    pub fn resolve(spec: &str) -> Result<Self> {
        match spec {
            "default" | "training" => Self::from_preset(spec),
            _ => Self::load(Path::new(spec)),
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }

    /// Surcharge depuis les variables d'environnement (`TOTS_*`)
    pub fn apply_env_overrides(&mut self) {
        if let Some(count) = env_parse("TOTS_MAX_RECORD_COUNT") {
            self.service.max_record_count = count;
        }
        if let Some(quota) = env_parse("TOTS_STORAGE_QUOTA") {
            self.storage.quota_bytes = quota;
        }
        if let Ok(dir) = std::env::var("TOTS_SESSION_DIR") {
            self.storage.session_dir = Some(PathBuf::from(dir));
        }
        if let Some(wkid) = env_parse("TOTS_SPATIAL_REFERENCE") {
            self.spatial_reference = wkid;
        }
    }

    pub fn spatial_reference(&self) -> Result<SpatialReference> {
        SpatialReference::from_wkid(self.spatial_reference)
            .context(format!("Unsupported session spatial reference: {}", self.spatial_reference))
    }

    /// Options d'import dérivées de la configuration
    pub fn import_options(&self, layer_type: LayerTypeName) -> Result<ImportOptions> {
        let csv_spatial_reference = SpatialReference::from_wkid(self.import.csv_spatial_reference)
            .context(format!(
                "Unsupported CSV spatial reference: {}",
                self.import.csv_spatial_reference
            ))?;

        Ok(ImportOptions {
            layer_type,
            csv_spatial_reference,
            session_spatial_reference: self.spatial_reference()?,
            max_features: self.import.max_features,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preset_matches_defaults() {
        let config = Config::from_preset("default").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_training_preset() {
        let config = Config::from_preset("training").unwrap();
        assert_eq!(config.service.max_record_count, 100);
        assert_eq!(config.spatial_reference().unwrap(), SpatialReference::WebMercator);
    }

    #[test]
    fn test_unknown_preset() {
        let err = Config::from_preset("nope").unwrap_err();
        assert!(err.to_string().contains("Unknown preset"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tots.json");
        std::fs::write(&path, r#"{"service":{"maxRecordCount":50}}"#).unwrap();

        let config = Config::resolve(path.to_str().unwrap()).unwrap();
        assert_eq!(config.service.max_record_count, 50);
        assert_eq!(config.spatial_reference, 3857);
        assert_eq!(config.storage.quota_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_import_options() {
        let mut config = Config::default();
        config.import.csv_spatial_reference = 4326;
        let options = config.import_options(LayerTypeName::Samples).unwrap();
        assert_eq!(options.csv_spatial_reference, SpatialReference::Wgs84);
        assert_eq!(options.max_features, 4000);
    }
}

//! Types d'erreurs pour le crate tots-core

use thiserror::Error;

/// Erreurs pouvant survenir dans le ledger, le registre ou le calcul
#[derive(Debug, Error)]
pub enum TotsError {
    /// Couche introuvable dans le ledger ou le registre
    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    /// Scénario introuvable
    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    /// Feature sans PERMANENT_IDENTIFIER
    #[error("Feature is missing its PERMANENT_IDENTIFIER")]
    MissingIdentifier,

    /// Déplacement impossible (même couche source et destination, etc.)
    #[error("Invalid move from {from} to {to}: {reason}")]
    InvalidMove {
        from: String,
        to: String,
        reason: String,
    },

    /// Paramètres de calcul incomplets ou invalides
    #[error("Invalid calculate settings: {0}")]
    InvalidSettings(String),

    /// Géométrie inutilisable
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Projection impossible
    #[error("Projection failed: {0}")]
    Projection(String),

    /// Type d'échantillon inconnu
    #[error("Unknown sample type: {0}")]
    UnknownSampleType(String),

    /// Un type d'échantillon porte déjà ce nom
    #[error("Sample type name already in use: {0}")]
    SampleTypeExists(String),

    /// Les types prédéfinis ne sont pas modifiables
    #[error("Predefined sample type cannot be modified: {0}")]
    PredefinedSampleType(String),

    /// Erreur de parsing d'un fichier importé
    #[error("Parse error in {file}: {reason}")]
    ParseError { file: String, reason: String },

    /// Erreur de (dé)sérialisation JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TotsError {
    /// Crée une erreur de parsing avec contexte
    pub fn parse_error(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de déplacement invalide
    pub fn invalid_move(
        from: impl Into<String>,
        to: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidMove {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }
}

/// Alias de résultat pour le crate
pub type Result<T> = std::result::Result<T, TotsError>;

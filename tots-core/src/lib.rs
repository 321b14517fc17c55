//! # tots-core
//!
//! Cœur du Trade-off Tool for Sampling (TOTS) : plans d'échantillonnage
//! environnemental, sans interface graphique.
//!
//! ## Features
//!
//! - Ledger immuable des modifications (ajout, mise à jour, suppression,
//!   déplacement) par couche et par scénario
//! - Moteur de calcul coûts/temps/surfaces, surfaces projetées en UTM
//! - Registre des couches et scénarios, rendu découplé via [`RenderAdapter`]
//! - Catalogue des types d'échantillons (prédéfinis et utilisateur)
//! - Import CSV/GeoJSON et fusion des résultats de publication
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tots_core::{calculate_plan, CalculateSettings, Edits, SpatialReference};
//!
//! let features = edits.scenario_features(&scenario_id);
//! if let Some(plan) = calculate_plan(&features, &CalculateSettings::default(), SpatialReference::WebMercator)? {
//!     println!("Coût total: {:.2}", plan.data.total_cost);
//! }
//! ```

pub mod calculate;
pub mod edits;
pub mod error;
pub mod geodesy;
pub mod import;
pub mod layer;
pub mod publish;
pub mod registry;
pub mod sample_types;
pub mod types;

pub use calculate::{
    calculate_plan, CalculateEngine, CalculateResults, CalculateResultsData, CalculateSettings,
    CalculateStatus, PlanCalculation,
};
pub use edits::{update_layer_edits, EditOperation, Edits, EditsItem, LayerEdits, ScenarioEdits};
pub use error::{Result, TotsError};
pub use geodesy::SpatialReference;
pub use import::{ImportOptions, UploadResult, UploadStatus};
pub use layer::LayerInfo;
pub use registry::{NullRenderer, Registry, RenderAdapter};
pub use sample_types::{SampleTypeCatalog, UserDefinedAttributes};
pub use types::{Feature, LayerTypeName};

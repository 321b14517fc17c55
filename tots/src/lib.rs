//! # tots
//!
//! Trade-off Tool for Sampling : préparation, chiffrage et export de plans
//! d'échantillonnage environnemental, au-dessus de `tots-core`.
//!
//! ## Features
//!
//! - Session persistée (un fichier JSON par tranche d'état, avec quota)
//! - Génération d'échantillons aléatoires par lots concurrents
//! - Export GeoJSON d'un scénario
//! - Rapport de plan (console et JSON)
//! - CLI simple
//!
//! ## Usage CLI
//!
//! ```bash
//! # Créer un scénario et y importer des échantillons
//! tots scenario "Building 12"
//! tots import ./samples.csv
//!
//! # Générer 200 éponges dans une zone d'intérêt
//! tots generate --aoi ./aoi.geojson --count 200 --sample-type Sponge
//!
//! # Chiffrer le plan et l'exporter
//! tots calculate --report ./report.json
//! tots export --output ./plan.geojson
//! ```

pub mod config;
pub mod export;
pub mod generate;
pub mod project;
pub mod report;
pub mod session;

pub use config::Config;
pub use generate::{generate_random_samples, Generation, LocalRandomGenerator, SampleGenerator};
pub use project::Project;
pub use report::{PlanReport, PlanStatus};
pub use session::{FileStorage, MemoryStorage, Session, Storage};

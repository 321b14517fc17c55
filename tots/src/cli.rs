//! Définition et implémentation des commandes CLI
//!
//! Toutes les commandes travaillent sur une session stockée dans un
//! répertoire (un fichier JSON par clé) :
//! - `scenario` : nouveau scénario avec sa couche d'échantillons
//! - `import` : fichier CSV/GeoJSON → couche
//! - `generate` : échantillons aléatoires dans une zone d'intérêt
//! - `calculate` : coûts, temps et surfaces du plan
//! - `export` : échantillons d'un scénario → GeoJSON

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::{info, warn};

use tots::export::export_scenario;
use tots::generate::{GenerateOutcome, GenerateRequest};
use tots::report::PlanReport;
use tots::{generate_random_samples, Config, FileStorage, Generation, LocalRandomGenerator, Project, Storage};
use tots_core::edits::set_calculate_settings;
use tots_core::import::{import_file, parse_geojson};
use tots_core::{calculate_plan, CalculateSettings, Feature, LayerTypeName, NullRenderer, SpatialReference};

#[derive(Subcommand)]
pub enum Commands {
    /// Create a scenario (with its default sample layer) and select it
    Scenario {
        /// Scenario name
        name: String,

        /// Scenario description
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Import a CSV or GeoJSON file as a new layer
    Import {
        /// Path to a .csv, .json or .geojson file
        path: PathBuf,

        /// Layer type: Samples, VSP, Contamination Map, Reference Layer, Area of Interest
        #[arg(long, default_value = "Samples")]
        layer_type: String,

        /// Target scenario (name or id, default: selected scenario)
        #[arg(long)]
        scenario: Option<String>,
    },

    /// Generate random samples inside an area of interest
    Generate {
        /// GeoJSON file with the area of interest polygons (WGS84)
        #[arg(long)]
        aoi: PathBuf,

        /// Number of samples to place
        #[arg(short = 'n', long)]
        count: usize,

        /// Sample type (TYPEUUID or label)
        #[arg(long, default_value = "Sponge")]
        sample_type: String,

        /// Target scenario (name or id, default: selected scenario)
        #[arg(long)]
        scenario: Option<String>,

        /// Seed for reproducible placement
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Compute cost, time and area of a scenario
    Calculate {
        /// Scenario (name or id, default: selected scenario)
        #[arg(long)]
        scenario: Option<String>,

        /// Save the report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Export the samples of a scenario to GeoJSON
    Export {
        /// Output GeoJSON file
        #[arg(short, long)]
        output: PathBuf,

        /// Scenario (name or id, default: selected scenario)
        #[arg(long)]
        scenario: Option<String>,

        /// Target SRID (4326 or 3857)
        #[arg(long, default_value_t = 4326)]
        srid: u32,
    },

    /// List scenarios, layers and sample types of the session
    Summary,

    /// Remove every stored session key
    Reset,
}

/// Surcharges des paramètres de calcul
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Number of labs available for analysis
    #[arg(long)]
    pub num_labs: Option<f64>,
    /// Analysis lab hours per day
    #[arg(long)]
    pub num_lab_hours: Option<f64>,
    /// Sampling team hours per shift
    #[arg(long)]
    pub num_sampling_hours: Option<f64>,
    /// Personnel per sampling team
    #[arg(long)]
    pub num_sampling_personnel: Option<f64>,
    /// Sampling team shifts per day
    #[arg(long)]
    pub num_sampling_shifts: Option<f64>,
    /// Number of available sampling teams
    #[arg(long)]
    pub num_sampling_teams: Option<f64>,
    /// Sampling team labor cost
    #[arg(long)]
    pub sampling_labor_cost: Option<f64>,
    /// Total area of interest (sq ft)
    #[arg(long)]
    pub surface_area: Option<f64>,
}

impl SettingsArgs {
    fn apply(&self, settings: &mut CalculateSettings) -> bool {
        let mut changed = false;
        let mut set = |target: &mut f64, value: Option<f64>| {
            if let Some(value) = value {
                changed |= *target != value;
                *target = value;
            }
        };
        set(&mut settings.num_labs, self.num_labs);
        set(&mut settings.num_lab_hours, self.num_lab_hours);
        set(&mut settings.num_sampling_hours, self.num_sampling_hours);
        set(&mut settings.num_sampling_personnel, self.num_sampling_personnel);
        set(&mut settings.num_sampling_shifts, self.num_sampling_shifts);
        set(&mut settings.num_sampling_teams, self.num_sampling_teams);
        set(&mut settings.sampling_labor_cost, self.sampling_labor_cost);
        set(&mut settings.surface_area, self.surface_area);
        changed
    }
}

/// Charge la configuration : preset ou fichier, puis variables `TOTS_*`
pub fn load_config(spec: &str) -> Result<Config> {
    let mut config = Config::resolve(spec)?;
    config.apply_env_overrides();
    Ok(config)
}

/// Ouvre la session du répertoire donné (ou celui de la configuration)
pub fn open_project(session_dir: Option<&Path>, config: &Config) -> Result<Project<FileStorage>> {
    let dir = session_dir
        .map(Path::to_path_buf)
        .or_else(|| config.storage.session_dir.clone())
        .unwrap_or_else(|| PathBuf::from(".tots"));
    let storage = FileStorage::open(&dir, config.storage.quota_bytes)?;
    Project::open(storage).context(format!("Failed to restore session from {}", dir.display()))
}

fn save_project(project: &mut Project<FileStorage>) -> Result<()> {
    for warning in project.save()? {
        eprintln!("{}: {}", warning.title(), warning);
    }
    Ok(())
}

/// Exécute la commande scenario
pub fn cmd_scenario(project: &mut Project<FileStorage>, name: &str, description: &str) -> Result<()> {
    let settings = project.calculate_settings;
    let scenario_id = project.create_scenario(name, description, settings)?;
    save_project(project)?;
    println!("Scenario \"{}\" created ({})", name, scenario_id);
    Ok(())
}

/// Exécute la commande import
pub fn cmd_import(
    project: &mut Project<FileStorage>,
    config: &Config,
    path: &Path,
    layer_type: &str,
    scenario: Option<&str>,
) -> Result<()> {
    let layer_type: LayerTypeName = layer_type.parse().map_err(anyhow::Error::msg)?;
    let options = config.import_options(layer_type)?;
    let scenario_id = if layer_type.is_samples() {
        Some(project.resolve_scenario(scenario)?)
    } else {
        None
    };

    let content = std::fs::read(path).context(format!("Failed to read file: {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .context(format!("Invalid file name: {}", path.display()))?;

    let (edits, result) = import_file(
        &project.edits,
        &mut project.registry,
        &project.catalog,
        filename,
        &content,
        scenario_id.as_deref(),
        &options,
        &mut NullRenderer,
    );
    if result.status.is_error() {
        match &result.error {
            Some(error) => anyhow::bail!("{} ({})", result.message, error),
            None => anyhow::bail!("{}", result.message),
        }
    }

    project.edits = edits;
    save_project(project)?;
    println!("{}", result.message);
    Ok(())
}

/// Exécute la commande generate
#[allow(clippy::too_many_arguments)]
pub async fn cmd_generate(
    project: &mut Project<FileStorage>,
    config: &Config,
    aoi: &Path,
    count: usize,
    sample_type: &str,
    scenario: Option<&str>,
    seed: Option<u64>,
) -> Result<()> {
    let sr = config.spatial_reference()?;
    let type_uuid = resolve_sample_type(project, sample_type)?;
    let scenario_id = project.resolve_scenario(scenario)?;
    let layer = project.sample_layer(&scenario_id)?;

    let content = std::fs::read(aoi).context(format!("Failed to read area of interest: {}", aoi.display()))?;
    let area: Vec<geojson::Geometry> = parse_geojson(&content, &aoi.display().to_string(), sr)?
        .into_iter()
        .filter_map(|f| f.geometry)
        .collect();

    let generator = Arc::new(match seed {
        Some(seed) => LocalRandomGenerator::with_seed(seed),
        None => LocalRandomGenerator::new(),
    });
    let outcome = generate_random_samples(
        generator,
        &Generation::new(),
        &project.edits,
        &project.catalog,
        GenerateRequest {
            number_of_samples: count,
            type_uuid: &type_uuid,
            area_of_interest: &area,
            layer: &layer,
            scenario_id: Some(scenario_id.as_str()),
        },
        config.service.max_record_count,
        sr,
    )
    .await?;

    match outcome {
        GenerateOutcome::Success { edits, added } => {
            project.edits = edits;
            save_project(project)?;
            println!("{} samples added to \"{}\"", added, layer.label);
        }
        GenerateOutcome::ExceededTransferLimit => {
            anyhow::bail!("The generated samples exceeded the transfer limit of the service")
        }
        GenerateOutcome::Stale => warn!("Generation superseded, nothing applied"),
    }
    Ok(())
}

fn resolve_sample_type(project: &Project<FileStorage>, spec: &str) -> Result<String> {
    if project.catalog.get(spec).is_some() {
        return Ok(spec.to_string());
    }
    project
        .catalog
        .find_by_label(spec)
        .map(str::to_string)
        .with_context(|| {
            let known: Vec<String> = project.catalog.options().into_iter().map(|o| o.label).collect();
            format!("Unknown sample type: {}. Use: {}", spec, known.join(", "))
        })
}

/// Exécute la commande calculate
pub fn cmd_calculate(
    project: &mut Project<FileStorage>,
    config: &Config,
    scenario: Option<&str>,
    report_path: Option<&Path>,
    overrides: &SettingsArgs,
) -> Result<()> {
    let start = Instant::now();
    let sr = config.spatial_reference()?;
    let scenario_id = project.resolve_scenario(scenario)?;
    let current = project
        .edits
        .find_scenario(&scenario_id)
        .with_context(|| format!("Scenario not found: {}", scenario_id))?;
    let name = current.scenario_name.clone();

    let mut settings = current.calculate_settings.current;
    if overrides.apply(&mut settings) {
        project.edits = set_calculate_settings(&project.edits, &scenario_id, settings)?;
        info!(scenario = %name, "Paramètres de calcul mis à jour");
    }
    project.calculate_settings = settings;
    project.selection.scenario_id = Some(scenario_id.clone());

    let mut report = PlanReport::new(&name);
    let features = project.edits.scenario_features(&scenario_id);
    match calculate_plan(&features, &settings, sr) {
        Ok(Some(plan)) => report.record_calculation(&plan),
        Ok(None) => info!(scenario = %name, "Aucun échantillon à calculer"),
        Err(e) => report.record_failure(&e.to_string()),
    }

    let samples: Vec<Feature> = features.into_iter().cloned().collect();
    report.record_sample_issues(&project.catalog.validate_samples(&samples, sr));

    save_project(project)?;
    for warning in project.session.warnings() {
        report.record_warning(warning.to_string());
    }

    report.set_duration(start.elapsed());
    report.finalize();
    report.display();

    if let Some(path) = report_path {
        report.save_to_file(path)?;
        println!("Report saved to {}", path.display());
    }
    println!("{}", report.summary());
    Ok(())
}

/// Exécute la commande export
pub fn cmd_export(
    project: &Project<FileStorage>,
    config: &Config,
    output: &Path,
    scenario: Option<&str>,
    srid: u32,
) -> Result<()> {
    let sr = config.spatial_reference()?;
    let target = SpatialReference::from_wkid(srid)?;
    let scenario_id = project.resolve_scenario(scenario)?;
    let scenario = project
        .edits
        .find_scenario(&scenario_id)
        .with_context(|| format!("Scenario not found: {}", scenario_id))?;

    // copies mesurées (AA/AC) si le plan est calculable
    let features = project.edits.scenario_features(&scenario_id);
    let measured: Option<Vec<Feature>> = match calculate_plan(&features, &scenario.calculate_settings.current, sr) {
        Ok(Some(plan)) => Some(plan.samples.into_iter().map(|s| s.feature).collect()),
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Export sans mesures");
            None
        }
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let written = export_scenario(&project.edits, &scenario_id, measured.as_deref(), sr, target, output)?;
    println!(
        "Export complete: {} features (EPSG:{}) -> {}",
        written,
        target.wkid(),
        output.display()
    );
    Ok(())
}

/// Exécute la commande summary
pub fn cmd_summary(project: &Project<FileStorage>) -> Result<()> {
    let selected = project.selection.scenario_id.as_deref();

    println!("Ledger: {} change(s)", project.edits.count);
    for scenario in project.edits.scenarios() {
        let marker = if Some(scenario.layer_id.as_str()) == selected { "*" } else { " " };
        println!(
            "{} {} [{:?}] {} feature(s)",
            marker,
            scenario.scenario_name,
            scenario.status,
            scenario.feature_count()
        );
        for layer in &scenario.layers {
            println!(
                "    - {} ({}) {} feature(s)",
                layer.label,
                layer.layer_type.as_str(),
                layer.current_features().len()
            );
        }
    }

    let unlinked: Vec<_> = project.registry.unlinked_layers().collect();
    if !unlinked.is_empty() {
        println!("Unlinked layers:");
        for layer in unlinked {
            println!("    - {} ({})", layer.label, layer.layer_type.as_str());
        }
    }

    let user_types: Vec<_> = project
        .catalog
        .options()
        .into_iter()
        .filter(|o| !o.is_predefined)
        .collect();
    if !user_types.is_empty() {
        println!("User-defined sample types:");
        for option in user_types {
            println!("    - {}", option.label);
        }
    }

    println!(
        "Session storage: {}K",
        (project.storage().used_bytes()? + 512) / 1024
    );
    Ok(())
}

/// Exécute la commande reset
pub fn cmd_reset(project: &mut Project<FileStorage>) -> Result<()> {
    project.session.clear()?;
    println!("Session cleared");
    Ok(())
}

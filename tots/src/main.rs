//! Point d'entrée CLI pour tots

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::Commands;

/// Préparer, chiffrer et exporter des plans d'échantillonnage
#[derive(Parser)]
#[command(name = "tots")]
#[command(author, version)]
#[command(about = "Trade-off Tool for Sampling : plans d'échantillonnage, coûts et délais")]
#[command(long_about = "Prépare des plans d'échantillonnage environnemental (scénarios, couches, échantillons), \
calcule coûts, délais et surfaces, et exporte les échantillons en GeoJSON.\n\n\
L'état de travail est conservé entre deux appels dans le répertoire de session.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Répertoire de session (défaut : configuration, puis .tots)
    #[arg(long, global = true)]
    session: Option<PathBuf>,

    /// Configuration : preset (default, training) ou fichier JSON
    #[arg(long, global = true, default_value = "default")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();

    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    let config = cli::load_config(&cli.config)?;
    let mut project = cli::open_project(cli.session.as_deref(), &config)?;
    debug!(config = %cli.config, "Session prête");

    match cli.command {
        Commands::Scenario { name, description } => {
            cli::cmd_scenario(&mut project, &name, &description)?;
        }
        Commands::Import {
            path,
            layer_type,
            scenario,
        } => {
            cli::cmd_import(&mut project, &config, &path, &layer_type, scenario.as_deref())?;
        }
        Commands::Generate {
            aoi,
            count,
            sample_type,
            scenario,
            seed,
        } => {
            cli::cmd_generate(
                &mut project,
                &config,
                &aoi,
                count,
                &sample_type,
                scenario.as_deref(),
                seed,
            )
            .await?;
        }
        Commands::Calculate {
            scenario,
            report,
            settings,
        } => {
            cli::cmd_calculate(
                &mut project,
                &config,
                scenario.as_deref(),
                report.as_deref(),
                &settings,
            )?;
        }
        Commands::Export {
            output,
            scenario,
            srid,
        } => {
            cli::cmd_export(&project, &config, &output, scenario.as_deref(), srid)?;
        }
        Commands::Summary => cli::cmd_summary(&project)?,
        Commands::Reset => cli::cmd_reset(&mut project)?,
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}

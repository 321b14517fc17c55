//! Génération d'échantillons aléatoires dans une zone d'intérêt
//!
//! Une demande de N échantillons est découpée en lots de `max_record_count`
//! au plus. Les lots partent en parallèle et le ledger n'est mis à jour
//! qu'une fois, quand tous ont répondu. Si une autre génération a démarré
//! (ou a été annulée) entre-temps, le résultat est abandonné.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use geo::{BoundingRect, Contains, MultiPolygon, Polygon};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use tots_core::geodesy::{self, SpatialReference};
use tots_core::types::attr;
use tots_core::{update_layer_edits, EditOperation, Edits, LayerInfo, SampleTypeCatalog};

/// Jeton de génération
///
/// Chaque démarrage (ou annulation) incrémente le compteur ; un résultat
/// n'est appliqué que si le jeton capturé au départ est toujours le courant.
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Démarre une génération et retourne son jeton
    pub fn begin(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Rend caduques toutes les générations en cours
    pub fn cancel(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.0.load(Ordering::SeqCst) == token
    }
}

/// Un lot envoyé au générateur
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub index: usize,
    pub number_of_samples: usize,
    /// Surface de référence d'un échantillon (`SA`, pouces carrés)
    pub reference_area: f64,
    pub area_of_interest: Arc<MultiPolygon<f64>>,
    pub spatial_reference: SpatialReference,
}

/// Réponse d'un lot
#[derive(Debug, Clone, Default)]
pub struct GeneratedChunk {
    pub geometries: Vec<geojson::Geometry>,
    pub exceeded_transfer_limit: bool,
}

/// Service de géotraitement « Generate Random »
pub trait SampleGenerator: Send + Sync {
    fn generate(&self, request: ChunkRequest) -> BoxFuture<'static, Result<GeneratedChunk>>;
}

/// Générateur local : carrés de surface `SA` tirés uniformément dans la zone
#[derive(Debug, Clone, Default)]
pub struct LocalRandomGenerator {
    seed: Option<u64>,
    max_attempts_per_sample: usize,
}

impl LocalRandomGenerator {
    pub fn new() -> Self {
        Self {
            seed: None,
            max_attempts_per_sample: 1000,
        }
    }

    /// Tirages reproductibles (chaque lot dérive sa graine de son index)
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::new()
        }
    }
}

impl SampleGenerator for LocalRandomGenerator {
    fn generate(&self, request: ChunkRequest) -> BoxFuture<'static, Result<GeneratedChunk>> {
        let seed = self.seed.map(|s| s.wrapping_add(request.index as u64));
        let max_attempts = self.max_attempts_per_sample.max(1);
        async move {
            tokio::task::spawn_blocking(move || place_squares(&request, seed, max_attempts))
                .await
                .context("Sample placement task failed")?
        }
        .boxed()
    }
}

fn place_squares(request: &ChunkRequest, seed: Option<u64>, max_attempts: usize) -> Result<GeneratedChunk> {
    let bounds = request
        .area_of_interest
        .bounding_rect()
        .context("Area of interest is empty")?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut geometries = Vec::with_capacity(request.number_of_samples);
    let mut attempts = 0;
    while geometries.len() < request.number_of_samples {
        if attempts >= max_attempts * request.number_of_samples {
            anyhow::bail!(
                "Unable to place {} samples inside the area of interest (placed {})",
                request.number_of_samples,
                geometries.len()
            );
        }
        attempts += 1;

        let x = rng.gen_range(bounds.min().x..=bounds.max().x);
        let y = rng.gen_range(bounds.min().y..=bounds.max().y);
        let square = geodesy::square_buffer(x, y, request.reference_area, request.spatial_reference)?;
        let polygon: Polygon<f64> = match geodesy::to_geo(&square)? {
            geo::Geometry::Polygon(p) => p,
            _ => continue,
        };
        if request.area_of_interest.contains(&polygon) {
            geometries.push(square);
        }
    }

    debug!(
        chunk = request.index,
        samples = geometries.len(),
        attempts,
        "Lot généré"
    );
    Ok(GeneratedChunk {
        geometries,
        exceeded_transfer_limit: false,
    })
}

/// Tailles des lots pour `total` échantillons
pub fn chunk_sizes(total: usize, max_record_count: usize) -> Vec<usize> {
    let max = max_record_count.max(1);
    let mut sizes = Vec::with_capacity(total.div_ceil(max));
    let mut left = total;
    while left > 0 {
        let size = left.min(max);
        sizes.push(size);
        left -= size;
    }
    sizes
}

/// Demande de génération
#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub number_of_samples: usize,
    pub type_uuid: &'a str,
    /// Polygones de la zone d'intérêt, dans la référence spatiale de la session
    pub area_of_interest: &'a [geojson::Geometry],
    pub layer: &'a LayerInfo,
    pub scenario_id: Option<&'a str>,
}

/// Issue d'une génération
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    Success { edits: Edits, added: usize },
    /// Une génération plus récente a démarré : rien n'est appliqué
    Stale,
    ExceededTransferLimit,
}

/// Génère des échantillons et les ajoute au ledger en une seule modification
pub async fn generate_random_samples(
    generator: Arc<dyn SampleGenerator>,
    generation: &Generation,
    edits: &Edits,
    catalog: &SampleTypeCatalog,
    request: GenerateRequest<'_>,
    max_record_count: usize,
    spatial_reference: SpatialReference,
) -> Result<GenerateOutcome> {
    let token = generation.begin();

    let attributes = catalog
        .get(request.type_uuid)
        .with_context(|| format!("Unknown sample type: {}", request.type_uuid))?;
    let reference_area = attributes
        .get(attr::SA)
        .and_then(serde_json::Value::as_f64)
        .filter(|sa| *sa > 0.0)
        .with_context(|| format!("Sample type {} has no reference area", request.type_uuid))?;

    let area_of_interest = Arc::new(collect_polygons(request.area_of_interest)?);
    if area_of_interest.0.is_empty() {
        anyhow::bail!("Area of interest has no polygon");
    }

    let sizes = chunk_sizes(request.number_of_samples, max_record_count);
    info!(
        samples = request.number_of_samples,
        chunks = sizes.len(),
        sample_type = request.type_uuid,
        "Génération aléatoire"
    );

    let requests = sizes.into_iter().enumerate().map(|(index, number_of_samples)| {
        generator.generate(ChunkRequest {
            index,
            number_of_samples,
            reference_area,
            area_of_interest: Arc::clone(&area_of_interest),
            spatial_reference,
        })
    });
    let chunks = try_join_all(requests).await?;

    if !generation.is_current(token) {
        info!(token, "Génération obsolète, résultat ignoré");
        return Ok(GenerateOutcome::Stale);
    }
    if chunks.iter().any(|c| c.exceeded_transfer_limit) {
        warn!("Limite de transfert dépassée");
        return Ok(GenerateOutcome::ExceededTransferLimit);
    }

    let samples = chunks
        .into_iter()
        .flat_map(|c| c.geometries)
        .map(|geometry| catalog.create_sample(Some(geometry), request.type_uuid, request.layer))
        .collect::<tots_core::Result<Vec<_>>>()?;
    let added = samples.len();

    let edits = update_layer_edits(edits, request.layer, request.scenario_id, EditOperation::Add(samples))?;
    Ok(GenerateOutcome::Success { edits, added })
}

fn collect_polygons(geometries: &[geojson::Geometry]) -> Result<MultiPolygon<f64>> {
    let mut polygons = Vec::new();
    for geometry in geometries {
        match geodesy::to_geo(geometry)? {
            geo::Geometry::Polygon(p) => polygons.push(p),
            geo::Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
            _ => debug!("Géométrie non surfacique ignorée dans la zone d'intérêt"),
        }
    }
    Ok(MultiPolygon::new(polygons))
}

//! Export vers GeoJSON avec geozero (streaming)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;
use tracing::debug;

use tots_core::geodesy::{self, SpatialReference};
use tots_core::Feature;

/// Exporte des échantillons dans un fichier GeoJSON
///
/// Les géométries sont reprojetées de `source` vers `target`. Retourne le
/// nombre de features écrites.
pub fn export_to_geojson(
    features: &[&Feature],
    source: SpatialReference,
    target: SpatialReference,
    output_path: &Path,
) -> Result<usize> {
    let file = File::create(output_path)
        .context(format!("Failed to create file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    let written = write_feature_collection(&mut writer, features, source, target)?;
    writer.flush()?;

    debug!(path = %output_path.display(), features = written, "GeoJSON écrit");
    Ok(written)
}

/// Écrit une FeatureCollection complète
pub fn write_feature_collection<W: Write>(
    writer: &mut W,
    features: &[&Feature],
    source: SpatialReference,
    target: SpatialReference,
) -> Result<usize> {
    // Header FeatureCollection avec CRS
    write!(
        writer,
        r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"features":["#,
        target.wkid()
    )?;

    for (i, feature) in features.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write_feature(writer, feature, source, target)?;
    }

    // Footer
    write!(writer, "]}}")?;
    Ok(features.len())
}

/// Écrit une feature en GeoJSON
fn write_feature<W: Write>(
    writer: &mut W,
    feature: &Feature,
    source: SpatialReference,
    target: SpatialReference,
) -> Result<()> {
    write!(writer, r#"{{"type":"Feature","#)?;
    if let Some(id) = feature.permanent_id() {
        write!(writer, r#""id":"{}","#, escape_json(id))?;
    }

    write!(writer, r#""geometry":"#)?;
    match &feature.geometry {
        Some(geometry) => {
            let projected = geodesy::reproject(geometry, source, target)?;
            let geometry = geodesy::to_geo(&projected)?;
            let mut geom_buf = Vec::new();
            let mut geom_writer = GeoJsonWriter::new(&mut geom_buf);
            geometry.process_geom(&mut geom_writer)?;
            writer.write_all(&geom_buf)?;
        }
        None => write!(writer, "null")?,
    }

    write!(writer, r#","properties":{{"#)?;
    for (i, (key, value)) in feature.attributes.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write!(writer, r#""{}":{}"#, escape_json(key), value)?;
    }
    write!(writer, "}}}}")?;

    Ok(())
}

/// Échappe une chaîne pour JSON
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

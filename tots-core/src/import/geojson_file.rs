//! Lecture des fichiers GeoJSON (WGS84)

use std::str::FromStr;

use geojson::GeoJson;

use crate::error::{Result, TotsError};
use crate::geodesy::{self, SpatialReference};
use crate::types::Feature;

/// Features d'un document GeoJSON, géométries ramenées dans `target`
pub fn parse(data: &[u8], file: &str, target: SpatialReference) -> Result<Vec<Feature>> {
    let text = std::str::from_utf8(data)
        .map_err(|e| TotsError::parse_error(file, format!("invalid UTF-8: {}", e)))?;
    let document =
        GeoJson::from_str(text).map_err(|e| TotsError::parse_error(file, e.to_string()))?;

    let raw = match document {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![geojson::Feature {
            geometry: Some(geometry),
            ..Default::default()
        }],
    };

    raw.into_iter()
        .map(|feature| {
            let geometry = feature
                .geometry
                .as_ref()
                .map(|g| geodesy::reproject(g, SpatialReference::Wgs84, target))
                .transpose()?;
            Ok(Feature {
                attributes: feature.properties.unwrap_or_default(),
                geometry,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_collection() {
        let data = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"TYPE": "Sponge", "Notes": "n"},
                    "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}
                },
                {
                    "type": "Feature",
                    "properties": null,
                    "geometry": null
                }
            ]
        })
        .to_string();

        let features = parse(data.as_bytes(), "plan.geojson", SpatialReference::WebMercator).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].attr_str("TYPE"), Some("Sponge"));
        assert!(features[0].geometry.is_some());
        assert!(features[1].attributes.is_empty());
        assert!(features[1].geometry.is_none());
    }

    #[test]
    fn test_invalid_document() {
        let err = parse(b"{\"type\": \"Nope\"}", "bad.geojson", SpatialReference::Wgs84).unwrap_err();
        assert!(matches!(err, TotsError::ParseError { .. }));
    }
}

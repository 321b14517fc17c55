//! Géodésie légère en Rust pur
//!
//! Les géométries de la session sont en Web Mercator (EPSG:3857) ou en
//! WGS84 (EPSG:4326). Les surfaces sont calculées après projection dans la
//! zone UTM du centroïde, ce qui suffit pour des échantillons de quelques
//! mètres à quelques centaines de mètres.

mod ellipsoid;
mod mercator;
mod utm;

pub use ellipsoid::{METERS_PER_INCH, SQ_FEET_PER_SQ_INCH, SQ_INCHES_PER_SQ_METER, WGS84};
pub use mercator::{geographic_to_web_mercator, web_mercator_to_geographic};
pub use utm::{geographic_to_utm, utm_to_geographic, UtmZone};

use geo::{Area, Centroid, Coord, MapCoords, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TotsError};

/// Point en coordonnées géographiques (radians)
#[derive(Debug, Clone, Copy)]
pub struct Geographic {
    /// Longitude en radians
    pub lon: f64,
    /// Latitude en radians
    pub lat: f64,
}

impl Geographic {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Convertit en degrés
    pub fn to_degrees(self) -> (f64, f64) {
        (self.lon.to_degrees(), self.lat.to_degrees())
    }

    /// Crée depuis des degrés
    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self {
            lon: lon_deg.to_radians(),
            lat: lat_deg.to_radians(),
        }
    }
}

/// Référence spatiale des géométries stockées
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpatialReference {
    #[default]
    WebMercator,
    Wgs84,
}

impl SpatialReference {
    pub fn wkid(&self) -> u32 {
        match self {
            Self::WebMercator => 3857,
            Self::Wgs84 => 4326,
        }
    }

    /// 102100 est l'alias historique de 3857
    pub fn from_wkid(wkid: u32) -> Result<Self> {
        match wkid {
            3857 | 102100 => Ok(Self::WebMercator),
            4326 => Ok(Self::Wgs84),
            other => Err(TotsError::Projection(format!(
                "EPSG:{} not supported. Supported: 3857, 102100, 4326",
                other
            ))),
        }
    }

    pub fn to_geographic(&self, x: f64, y: f64) -> Geographic {
        match self {
            Self::WebMercator => web_mercator_to_geographic(x, y),
            Self::Wgs84 => Geographic::from_degrees(x, y),
        }
    }

    pub fn from_geographic(&self, geo: Geographic) -> (f64, f64) {
        match self {
            Self::WebMercator => geographic_to_web_mercator(geo),
            Self::Wgs84 => geo.to_degrees(),
        }
    }
}

/// Convertit une géométrie GeoJSON en géométrie `geo`
pub fn to_geo(geometry: &geojson::Geometry) -> Result<geo::Geometry<f64>> {
    geo::Geometry::<f64>::try_from(geometry.clone())
        .map_err(|e| TotsError::InvalidGeometry(e.to_string()))
}

/// Convertit une géométrie `geo` en GeoJSON
pub fn to_geojson(geometry: &geo::Geometry<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(geometry))
}

/// Zone UTM du centroïde d'une géométrie
pub fn utm_zone_of(geometry: &geo::Geometry<f64>, sr: SpatialReference) -> Result<UtmZone> {
    let centroid = geometry
        .centroid()
        .ok_or_else(|| TotsError::InvalidGeometry("empty geometry".to_string()))?;
    let (lon, lat) = sr.to_geographic(centroid.x(), centroid.y()).to_degrees();
    if !lon.is_finite() || !lat.is_finite() {
        return Err(TotsError::Projection(format!(
            "centroid ({}, {}) cannot be located",
            centroid.x(),
            centroid.y()
        )));
    }
    Ok(UtmZone::from_lon_lat(lon, lat))
}

/// Projette une géométrie dans la zone UTM de son centroïde
pub fn project_to_utm(
    geometry: &geo::Geometry<f64>,
    sr: SpatialReference,
) -> Result<(geo::Geometry<f64>, UtmZone)> {
    let zone = utm_zone_of(geometry, sr)?;
    let projected = geometry.map_coords(|c: Coord<f64>| {
        let (x, y) = geographic_to_utm(sr.to_geographic(c.x, c.y), zone);
        Coord { x, y }
    });
    Ok((projected, zone))
}

/// Change la référence spatiale d'une géométrie GeoJSON
pub fn reproject(
    geometry: &geojson::Geometry,
    from: SpatialReference,
    to: SpatialReference,
) -> Result<geojson::Geometry> {
    if from == to {
        return Ok(geometry.clone());
    }
    let projected = to_geo(geometry)?.map_coords(|c: Coord<f64>| {
        let (x, y) = to.from_geographic(from.to_geographic(c.x, c.y));
        Coord { x, y }
    });
    Ok(to_geojson(&projected))
}

/// Surface planaire (m²) d'un polygone ou multipolygone
pub fn area_square_meters(geometry: &geojson::Geometry, sr: SpatialReference) -> Result<f64> {
    let geometry = to_geo(geometry)?;
    match geometry {
        geo::Geometry::Polygon(_) | geo::Geometry::MultiPolygon(_) => {}
        other => {
            return Err(TotsError::InvalidGeometry(format!(
                "area requires a polygon, got {}",
                geometry_type_name(&other)
            )))
        }
    }

    let (projected, _) = project_to_utm(&geometry, sr)?;
    let area = projected.unsigned_area();
    if !area.is_finite() {
        return Err(TotsError::Projection("area is not finite".to_string()));
    }
    Ok(area)
}

/// Surface d'un échantillon en pouces carrés (unité de `SA`)
pub fn area_square_inches(geometry: &geojson::Geometry, sr: SpatialReference) -> Result<f64> {
    Ok(area_square_meters(geometry, sr)? * SQ_INCHES_PER_SQ_METER)
}

pub fn square_inches_to_square_feet(sq_in: f64) -> f64 {
    sq_in * SQ_FEET_PER_SQ_INCH
}

/// Carré centré sur un point, de surface `area_sq_in` pouces carrés
///
/// Le carré est construit dans la zone UTM du point puis ramené dans la
/// référence spatiale d'origine.
pub fn square_buffer(x: f64, y: f64, area_sq_in: f64, sr: SpatialReference) -> Result<geojson::Geometry> {
    if !area_sq_in.is_finite() || area_sq_in <= 0.0 {
        return Err(TotsError::InvalidGeometry(format!(
            "reference area must be positive (got {})",
            area_sq_in
        )));
    }

    let center = sr.to_geographic(x, y);
    let (lon, lat) = center.to_degrees();
    let zone = UtmZone::from_lon_lat(lon, lat);
    let (cx, cy) = geographic_to_utm(center, zone);

    let half = area_sq_in.sqrt() * METERS_PER_INCH / 2.0;
    let ring = [
        (cx - half, cy - half),
        (cx + half, cy - half),
        (cx + half, cy + half),
        (cx - half, cy + half),
        (cx - half, cy - half),
    ]
    .into_iter()
    .map(|(ux, uy)| {
        let (x, y) = sr.from_geographic(utm_to_geographic(ux, uy, zone));
        Coord { x, y }
    })
    .collect::<Vec<_>>();

    let polygon = Polygon::new(ring.into(), vec![]);
    Ok(to_geojson(&geo::Geometry::Polygon(polygon)))
}

pub(crate) fn geometry_type_name(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wgs84_square(lon: f64, lat: f64, size_deg: f64) -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
            vec![lon, lat],
            vec![lon + size_deg, lat],
            vec![lon + size_deg, lat + size_deg],
            vec![lon, lat + size_deg],
            vec![lon, lat],
        ]]))
    }

    #[test]
    fn test_area_near_equator() {
        // 0.001° ≈ 110.6 m en latitude, 111.3 m en longitude à l'équateur
        let geometry = wgs84_square(3.0, 0.0, 0.001);
        let area = area_square_meters(&geometry, SpatialReference::Wgs84).unwrap();
        assert!((area - 12_308.0).abs() / 12_308.0 < 0.01, "area={}", area);
    }

    #[test]
    fn test_area_same_in_web_mercator() {
        let wgs84 = wgs84_square(-77.03, 38.9, 0.001);
        let mercator = {
            let g = to_geo(&wgs84).unwrap().map_coords(|c: Coord<f64>| {
                let (x, y) = geographic_to_web_mercator(Geographic::from_degrees(c.x, c.y));
                Coord { x, y }
            });
            to_geojson(&g)
        };
        let a1 = area_square_meters(&wgs84, SpatialReference::Wgs84).unwrap();
        let a2 = area_square_meters(&mercator, SpatialReference::WebMercator).unwrap();
        assert!((a1 - a2).abs() / a1 < 1e-6, "a1={} a2={}", a1, a2);
    }

    #[test]
    fn test_reproject_point() {
        let point = geojson::Geometry::new(geojson::Value::Point(vec![-77.03, 38.9]));
        let mercator =
            reproject(&point, SpatialReference::Wgs84, SpatialReference::WebMercator).unwrap();
        let back =
            reproject(&mercator, SpatialReference::WebMercator, SpatialReference::Wgs84).unwrap();
        match back.value {
            geojson::Value::Point(c) => {
                assert!((c[0] + 77.03).abs() < 1e-9);
                assert!((c[1] - 38.9).abs() < 1e-9);
            }
            other => panic!("unexpected geometry {:?}", other),
        }
    }

    #[test]
    fn test_point_has_no_area() {
        let point = geojson::Geometry::new(geojson::Value::Point(vec![0.0, 0.0]));
        assert!(matches!(
            area_square_meters(&point, SpatialReference::Wgs84),
            Err(TotsError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_square_buffer_area() {
        let (x, y) = geographic_to_web_mercator(Geographic::from_degrees(-77.03, 38.9));
        let square = square_buffer(x, y, 144.0, SpatialReference::WebMercator).unwrap();
        let area = area_square_inches(&square, SpatialReference::WebMercator).unwrap();
        assert!((area - 144.0).abs() / 144.0 < 0.01, "area={}", area);
    }

    #[test]
    fn test_square_buffer_rejects_zero_area() {
        assert!(square_buffer(0.0, 0.0, 0.0, SpatialReference::WebMercator).is_err());
    }

    #[test]
    fn test_spatial_reference_wkid() {
        assert_eq!(SpatialReference::from_wkid(102100).unwrap(), SpatialReference::WebMercator);
        assert_eq!(SpatialReference::Wgs84.wkid(), 4326);
        assert!(SpatialReference::from_wkid(2154).is_err());
    }

    #[test]
    fn test_square_feet_conversion() {
        assert!((square_inches_to_square_feet(144.0) - 1.0).abs() < 1e-4);
    }
}

//! Projection Web Mercator (EPSG:3857)
//!
//! Aussi connu sous le nom de Pseudo-Mercator ou Spherical Mercator.
//! C'est la référence spatiale par défaut des géométries de la session.

use super::ellipsoid::WGS84;
use super::Geographic;

/// Latitude maximale représentable
const MAX_LAT_DEG: f64 = 85.0511287798;

/// Convertit coordonnées géographiques vers Web Mercator (EPSG:3857)
pub fn geographic_to_web_mercator(geo: Geographic) -> (f64, f64) {
    // Web Mercator utilise un modèle sphérique avec le rayon équatorial
    let r = WGS84::A;

    // Limiter la latitude pour éviter l'infini
    let lat = geo
        .lat
        .clamp(-MAX_LAT_DEG.to_radians(), MAX_LAT_DEG.to_radians());

    // X = R * longitude
    let x = r * geo.lon;

    // Y = R * ln(tan(π/4 + lat/2))
    let y = r * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln();

    (x, y)
}

/// Convertit Web Mercator vers coordonnées géographiques
pub fn web_mercator_to_geographic(x: f64, y: f64) -> Geographic {
    let r = WGS84::A;

    // Longitude = x / R
    let lon = x / r;

    // Latitude = 2 * atan(exp(y/R)) - π/2
    let lat = 2.0 * (y / r).exp().atan() - std::f64::consts::FRAC_PI_2;

    Geographic::new(lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_washington_to_web_mercator() {
        // Washington DC: -77.0365°, 38.8977°
        let geo = Geographic::from_degrees(-77.0365, 38.8977);
        let (x, y) = geographic_to_web_mercator(geo);

        // X ≈ -8575600, Y ≈ 4707000
        assert!((x - (-8575600.0)).abs() < 1000.0, "x={}", x);
        assert!((y - 4707000.0).abs() < 10000.0, "y={}", y);
    }

    #[test]
    fn test_roundtrip() {
        let geo = Geographic::from_degrees(2.35, 48.85);
        let (x, y) = geographic_to_web_mercator(geo);
        let (lon, lat) = web_mercator_to_geographic(x, y).to_degrees();

        assert!((lon - 2.35).abs() < 1e-9, "lon={}", lon);
        assert!((lat - 48.85).abs() < 1e-9, "lat={}", lat);
    }

    #[test]
    fn test_pole_is_clamped() {
        let (_, y) = geographic_to_web_mercator(Geographic::from_degrees(0.0, 90.0));
        assert!(y.is_finite());
    }
}

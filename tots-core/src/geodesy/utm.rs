//! Projection UTM (Universal Transverse Mercator)
//!
//! Toutes les zones WGS84 (EPSG:32601-32660 au nord, 32701-32760 au sud).
//! Les surfaces d'échantillons sont calculées dans la zone UTM de leur
//! centroïde.

use super::ellipsoid::WGS84;
use super::Geographic;

/// Facteur d'échelle sur le méridien central
const K0: f64 = 0.9996;
/// False easting
const X0: f64 = 500000.0;
/// False northing de l'hémisphère sud
const Y0_SOUTH: f64 = 10000000.0;

/// Zone UTM et hémisphère
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    pub zone: u32,
    pub south: bool,
}

impl UtmZone {
    /// Zone UTM du point (degrés) :
    /// `wkid = (lat > 0 ? 32600 : 32700) + floor((lon + 180) / 6) + 1`
    pub fn from_lon_lat(lon_deg: f64, lat_deg: f64) -> Self {
        let zone = ((lon_deg + 180.0) / 6.0).floor() as i64 + 1;
        Self {
            zone: zone.clamp(1, 60) as u32,
            south: lat_deg <= 0.0,
        }
    }

    /// Code EPSG de la zone
    pub fn wkid(&self) -> u32 {
        let base = if self.south { 32700 } else { 32600 };
        base + self.zone
    }

    /// Zone correspondant à un code EPSG UTM WGS84
    pub fn from_wkid(wkid: u32) -> Option<Self> {
        match wkid {
            32601..=32660 => Some(Self {
                zone: wkid - 32600,
                south: false,
            }),
            32701..=32760 => Some(Self {
                zone: wkid - 32700,
                south: true,
            }),
            _ => None,
        }
    }

    /// Longitude du méridien central en radians
    fn central_meridian(&self) -> f64 {
        ((self.zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
    }
}

/// Convertit des coordonnées géographiques WGS84 vers UTM
pub fn geographic_to_utm(geo: Geographic, zone: UtmZone) -> (f64, f64) {
    let a = WGS84::A;
    let e2 = WGS84::E2;
    let ep2 = WGS84::EP2;
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    let phi = geo.lat;
    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let tan_phi = phi.tan();

    let n = a / (1.0 - e2 * sin_phi.powi(2)).sqrt();
    let t = tan_phi.powi(2);
    let c = ep2 * cos_phi.powi(2);
    let big_a = (geo.lon - zone.central_meridian()) * cos_phi;

    // Longueur de l'arc de méridien
    let m = a
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());

    let x = K0
        * n
        * (big_a
            + (1.0 - t + c) * big_a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t.powi(2) + 72.0 * c - 58.0 * ep2) * big_a.powi(5) / 120.0)
        + X0;

    let y = K0
        * (m + n
            * tan_phi
            * (big_a.powi(2) / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c.powi(2)) * big_a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t.powi(2) + 600.0 * c - 330.0 * ep2) * big_a.powi(6)
                    / 720.0));

    let y = if zone.south { y + Y0_SOUTH } else { y };

    (x, y)
}

/// Convertit UTM vers coordonnées géographiques WGS84
pub fn utm_to_geographic(x: f64, y: f64, zone: UtmZone) -> Geographic {
    let a = WGS84::A;
    let e2 = WGS84::E2;
    let ep2 = WGS84::EP2;

    let y0 = if zone.south { Y0_SOUTH } else { 0.0 };
    let lon0 = zone.central_meridian();

    // Coordonnées réduites
    let x = x - X0;
    let y = y - y0;

    // Calcul du footprint latitude
    let m = y / K0;
    let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));

    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let n1 = a / (1.0 - e2 * sin_phi1.powi(2)).sqrt();
    let t1 = tan_phi1.powi(2);
    let c1 = ep2 * cos_phi1.powi(2);
    let r1 = a * (1.0 - e2) / (1.0 - e2 * sin_phi1.powi(2)).powf(1.5);
    let d = x / (n1 * K0);

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1.powi(2) - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1.powi(2) - 252.0 * ep2 - 3.0 * c1.powi(2))
                    * d.powi(6)
                    / 720.0);

    let lon = lon0
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1.powi(2) + 8.0 * ep2 + 24.0 * t1.powi(2))
                * d.powi(5)
                / 120.0)
            / cos_phi1;

    Geographic::new(lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_from_lon_lat() {
        // Washington DC
        let zone = UtmZone::from_lon_lat(-77.03, 38.9);
        assert_eq!(zone.wkid(), 32618);

        // Saint-Denis, Réunion
        let zone = UtmZone::from_lon_lat(55.45, -20.88);
        assert_eq!(zone.wkid(), 32740);

        assert_eq!(UtmZone::from_wkid(32740), Some(zone));
        assert_eq!(UtmZone::from_wkid(3857), None);
    }

    #[test]
    fn test_martinique() {
        // Fort-de-France approximativement, UTM Zone 20N: 708000, 1615000
        let zone = UtmZone::from_wkid(32620).unwrap();
        let (lon, lat) = utm_to_geographic(708000.0, 1615000.0, zone).to_degrees();

        assert!((lon - (-61.07)).abs() < 0.2, "lon={}", lon);
        assert!((lat - 14.60).abs() < 0.2, "lat={}", lat);
    }

    #[test]
    fn test_forward_central_meridian() {
        // Sur le méridien central : x = false easting
        let zone = UtmZone::from_wkid(32631).unwrap();
        let (x, y) = geographic_to_utm(Geographic::from_degrees(3.0, 45.0), zone);
        assert!((x - 500000.0).abs() < 0.01, "x={}", x);
        assert!((y - 4982950.4).abs() < 1.0, "y={}", y);
    }

    #[test]
    fn test_roundtrip() {
        let zone = UtmZone::from_lon_lat(-77.03, 38.9);
        let start = Geographic::from_degrees(-77.03, 38.9);
        let (x, y) = geographic_to_utm(start, zone);
        let (lon, lat) = utm_to_geographic(x, y, zone).to_degrees();

        assert!((lon - (-77.03)).abs() < 1e-6, "lon={}", lon);
        assert!((lat - 38.9).abs() < 1e-6, "lat={}", lat);
    }

    #[test]
    fn test_southern_hemisphere_roundtrip() {
        let zone = UtmZone::from_lon_lat(55.45, -20.88);
        let (x, y) = geographic_to_utm(Geographic::from_degrees(55.45, -20.88), zone);
        assert!(y > 7_000_000.0, "y={}", y);
        let (lon, lat) = utm_to_geographic(x, y, zone).to_degrees();
        assert!((lon - 55.45).abs() < 1e-6, "lon={}", lon);
        assert!((lat - (-20.88)).abs() < 1e-6, "lat={}", lat);
    }
}

//! Ellipsoïde de référence et constantes d'unités

/// Ellipsoïde WGS84
pub struct WGS84;

impl WGS84 {
    /// Demi-grand axe (rayon équatorial) en mètres
    pub const A: f64 = 6378137.0;

    /// Aplatissement
    pub const F: f64 = 1.0 / 298.257223563;

    /// Demi-petit axe (rayon polaire) en mètres
    pub const B: f64 = Self::A * (1.0 - Self::F);

    /// Première excentricité au carré
    pub const E2: f64 = 2.0 * Self::F - Self::F * Self::F;

    /// Première excentricité
    pub const E: f64 = 0.0818191908426215; // sqrt(E2)

    /// Deuxième excentricité au carré
    pub const EP2: f64 = Self::E2 / (1.0 - Self::E2);
}

/// Pouces carrés par mètre carré
pub const SQ_INCHES_PER_SQ_METER: f64 = 1550.0031000062;

/// Facteur pouces carrés vers pieds carrés (1/144)
pub const SQ_FEET_PER_SQ_INCH: f64 = 0.00694444;

/// Mètres par pouce
pub const METERS_PER_INCH: f64 = 0.0254;

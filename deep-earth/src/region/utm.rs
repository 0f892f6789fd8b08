//! Transverse Mercator projection on the WGS84 ellipsoid.
//!
//! Uses the Krüger series to third order in the third flattening `n`,
//! which is accurate to well under a millimeter within a UTM zone.

use super::types::UtmZone;

const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
const FLATTENING: f64 = 1.0 / 298.257_223_563;
const SCALE_FACTOR: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

struct Series {
    /// Rectifying radius scaled by k0
    k0_a: f64,
    eccentricity: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
}

fn series() -> Series {
    let n = FLATTENING / (2.0 - FLATTENING);
    let n2 = n * n;
    let n3 = n2 * n;
    let rectifying = SEMI_MAJOR_AXIS / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);

    Series {
        k0_a: SCALE_FACTOR * rectifying,
        eccentricity: (FLATTENING * (2.0 - FLATTENING)).sqrt(),
        alpha: [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
            61.0 * n3 / 240.0,
        ],
        beta: [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
            n2 / 48.0 + n3 / 15.0,
            17.0 * n3 / 480.0,
        ],
        delta: [
            2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
            7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
            56.0 * n3 / 15.0,
        ],
    }
}

fn false_northing(zone: UtmZone) -> f64 {
    if zone.north {
        0.0
    } else {
        FALSE_NORTHING_SOUTH
    }
}

/// Projects a geodetic position (degrees) into the given UTM zone.
///
/// Returns `(easting, northing)` in meters. Positions outside the zone
/// are still projected; accuracy degrades with distance from the
/// central meridian.
pub fn forward(lat: f64, lon: f64, zone: UtmZone) -> (f64, f64) {
    let s = series();
    let phi = lat.to_radians();
    let lambda = (lon - zone.central_meridian()).to_radians();

    let e = s.eccentricity;
    let t = (phi.sin().atanh() - e * (e * phi.sin()).atanh()).sinh();
    let xi_prime = t.atan2(lambda.cos());
    let eta_prime = (lambda.sin() / (1.0 + t * t).sqrt()).atanh();

    let mut xi = xi_prime;
    let mut eta = eta_prime;
    for (j, alpha) in s.alpha.iter().enumerate() {
        let k = 2.0 * (j as f64 + 1.0);
        xi += alpha * (k * xi_prime).sin() * (k * eta_prime).cosh();
        eta += alpha * (k * xi_prime).cos() * (k * eta_prime).sinh();
    }

    (
        FALSE_EASTING + s.k0_a * eta,
        false_northing(zone) + s.k0_a * xi,
    )
}

/// Inverse of [`forward`]: UTM `(easting, northing)` back to `(lat, lon)`
/// in degrees.
pub fn inverse(easting: f64, northing: f64, zone: UtmZone) -> (f64, f64) {
    let s = series();
    let xi = (northing - false_northing(zone)) / s.k0_a;
    let eta = (easting - FALSE_EASTING) / s.k0_a;

    let mut xi_prime = xi;
    let mut eta_prime = eta;
    for (j, beta) in s.beta.iter().enumerate() {
        let k = 2.0 * (j as f64 + 1.0);
        xi_prime -= beta * (k * xi).sin() * (k * eta).cosh();
        eta_prime -= beta * (k * xi).cos() * (k * eta).sinh();
    }

    let chi = (xi_prime.sin() / eta_prime.cosh()).asin();
    let mut phi = chi;
    for (j, delta) in s.delta.iter().enumerate() {
        let k = 2.0 * (j as f64 + 1.0);
        phi += delta * (k * chi).sin();
    }
    let lambda = eta_prime.sinh().atan2(xi_prime.cos());

    (phi.to_degrees(), zone.central_meridian() + lambda.to_degrees())
}

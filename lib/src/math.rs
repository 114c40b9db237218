//! Math utilities.

use nalgebra::Vector2;

/// Standard gravity, used to turn specific impulse into exhaust
/// velocity (m/s^2).
pub const G0: f64 = 9.80665;

/// Tsiolkovsky rocket equation. Masses in any consistent unit.
pub fn rocket_equation(isp: f64, wet_mass: f64, dry_mass: f64) -> f64 {
    if isp <= 0.0 || dry_mass <= 0.0 || wet_mass <= dry_mass {
        0.0
    } else {
        isp * G0 * libm::log(wet_mass / dry_mass)
    }
}

/// Serialize a `Vector2<f64>` as a plain `(x, y)` pair.
pub mod vec2 {
    use nalgebra::Vector2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Vector2<f64>, s: S) -> Result<S::Ok, S::Error> {
        (v.x, v.y).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vector2<f64>, D::Error> {
        let (x, y) = <(f64, f64)>::deserialize(d)?;
        Ok(Vector2::new(x, y))
    }
}

/// Euclidean distance between two points.
pub fn distance(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    (a - b).norm()
}

#[test]
fn rocket_equation_matches_closed_form() {
    let dv = rocket_equation(300.0, 2.0, 1.0);
    assert!((dv - 300.0 * G0 * std::f64::consts::LN_2).abs() < 1e-9);
    assert_eq!(rocket_equation(300.0, 1.0, 1.0), 0.0);
    assert_eq!(rocket_equation(0.0, 2.0, 1.0), 0.0);
}

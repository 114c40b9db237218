//! Exponential atmosphere.

use crate::config::AtmosphereConfig;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Atmosphere {
    sea_level_density: f64,
    scale_height: f64,
}

impl Atmosphere {
    pub fn new(config: &AtmosphereConfig) -> Self {
        Self {
            sea_level_density: config.sea_level_density,
            scale_height: config.scale_height.max(f64::MIN_POSITIVE),
        }
    }

    fn falloff(&self, altitude: f64) -> f64 {
        libm::exp(-altitude.max(0.0) / self.scale_height)
    }

    /// Pressure relative to sea level (atm). 1 on the ground, tends to
    /// 0 with altitude.
    pub fn pressure(&self, altitude: f64) -> f64 {
        self.falloff(altitude)
    }

    /// Air density (kg/m^3).
    pub fn density(&self, altitude: f64) -> f64 {
        self.sea_level_density * self.falloff(altitude)
    }
}

impl Default for Atmosphere {
    fn default() -> Self {
        Self::new(&AtmosphereConfig::default())
    }
}

#[test]
fn falls_off_by_e_per_scale_height() {
    let atm = Atmosphere::default();
    assert_eq!(atm.pressure(0.0), 1.0);
    assert_eq!(atm.pressure(-50.0), 1.0);
    assert!((atm.pressure(7000.0) - libm::exp(-1.0)).abs() < 1e-12);
    assert!((atm.density(14000.0) - 1.225 * libm::exp(-2.0)).abs() < 1e-12);
}

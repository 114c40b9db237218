//! Tunable constants for the editor and the flight simulator.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sim: SimConfig,
    pub editor: EditorConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Logical time advanced by every tick (s)
    pub dt: f64,
    /// Surface gravity (m/s^2)
    pub gravity: f64,
    /// Highest vertical touchdown speed that still counts as a
    /// landing (m/s). Inclusive.
    pub safe_landing_speed: f64,
    /// Delay between detecting a spent stage and staging it (s)
    pub auto_stage_delay: f64,
    /// Steering limit on either side of vertical (deg)
    pub max_steering_deg: f64,
    pub drag_coefficient: f64,
    /// Vehicle cross-section used for drag (m^2)
    pub reference_area: f64,
    pub atmosphere: AtmosphereConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: 0.02,
            gravity: 9.81,
            safe_landing_speed: 10.0,
            auto_stage_delay: 0.5,
            max_steering_deg: 45.0,
            drag_coefficient: 0.3,
            reference_area: 1.0,
            atmosphere: AtmosphereConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtmosphereConfig {
    /// Air density at altitude zero (kg/m^3)
    pub sea_level_density: f64,
    /// Altitude over which pressure and density fall by a factor of e (m)
    pub scale_height: f64,
}

impl Default for AtmosphereConfig {
    fn default() -> Self {
        Self {
            sea_level_density: 1.225,
            scale_height: 7000.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Snap distance for a freshly placed part.
    pub placement_threshold: f64,
    /// Snap distance for a part dragged after placement.
    pub post_move_threshold: f64,
    /// Distance at which an existing connection breaks. Larger than
    /// `post_move_threshold`.
    pub breaking_threshold: f64,
    /// Largest size-class difference two connected points may have.
    pub size_tolerance: f64,
    /// World units per attachment offset unit.
    pub scale: f64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            placement_threshold: 120.0,
            post_move_threshold: 25.0,
            breaking_threshold: 50.0,
            size_tolerance: 0.1,
            scale: 1.0,
        }
    }
}

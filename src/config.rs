use glam::Vec3;
use physics::{vehicle::WheelOptions, WorldConfig};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed scenario {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Chassis dimensions and the wheels hung off it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarConfig {
    pub chassis_half_extents: Vec3,
    pub chassis_mass: f32,
    pub spawn_position: Vec3,
    /// Shared by every wheel, `chassis_connection_point` and `is_front_wheel` are overridden
    /// per wheel from `wheel_positions`.
    pub wheel: WheelOptions,
    pub wheel_positions: Vec<Vec3>,
    pub engine_force: f32,
    pub max_steering: f32,
    pub brake_force: f32,
}

impl Default for CarConfig {
    fn default() -> Self {
        CarConfig {
            chassis_half_extents: Vec3::new(1.0, 0.5, 2.0),
            chassis_mass: 150.0,
            spawn_position: Vec3::new(0.0, 1.0, 0.0),
            wheel: WheelOptions {
                radius: 0.4,
                suspension_rest_length: 0.3,
                suspension_stiffness: 30.0,
                damping_compression: 4.4,
                damping_relaxation: 2.3,
                friction_slip: 5.0,
                max_suspension_travel: 0.3,
                max_suspension_force: 100_000.0,
                roll_influence: 0.01,
                custom_sliding_rotational_speed: -30.0,
                use_custom_sliding_rotational_speed: true,
                ..Default::default()
            },
            wheel_positions: vec![
                Vec3::new(1.0, 0.0, 1.5),
                Vec3::new(-1.0, 0.0, 1.5),
                Vec3::new(1.0, 0.0, -1.5),
                Vec3::new(-1.0, 0.0, -1.5),
            ],
            engine_force: 500.0,
            max_steering: 0.5,
            brake_force: 10.0,
        }
    }
}

/// A headless driving scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub world: WorldConfig,
    pub car: CarConfig,
    /// Number of host frames to simulate.
    pub frames: u32,
    /// Wall time between host frames, fed to the accumulator.
    pub frame_time: f32,
    pub fixed_time_step: f32,
    pub max_substeps: u32,
    pub seed: u64,
    pub crates: u32,
    /// Area around the spawn point that crates are scattered over.
    pub crate_spread: f32,
    /// Optional hull JSON used for some of the crates.
    pub hull_path: Option<PathBuf>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig {
            world: WorldConfig {
                gravity: Vec3::new(0.0, -9.81, 0.0),
                allow_sleep: true,
                ..Default::default()
            },
            car: CarConfig::default(),
            frames: 1200,
            frame_time: 1.0 / 50.0,
            fixed_time_step: 1.0 / 60.0,
            max_substeps: 3,
            seed: 0x5eed,
            crates: 24,
            crate_spread: 30.0,
            hull_path: None,
        }
    }
}

impl DemoConfig {
    /// Reads a scenario. A missing file is not an error, the defaults are used instead.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "scenario not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("raycast-racer-no-such-scenario.json");
        let config = DemoConfig::load(&path).unwrap();
        assert_eq!(config, DemoConfig::default());
    }

    #[test]
    fn test_partial_scenario() {
        let path = std::env::temp_dir().join("raycast-racer-partial-scenario.json");
        std::fs::write(&path, r#"{ "frames": 10, "car": { "engine_force": 800.0 } }"#).unwrap();
        let config = DemoConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.frames, 10);
        assert_eq!(config.car.engine_force, 800.0);
        assert_eq!(config.car.wheel_positions.len(), 4);
        assert_eq!(config.world, DemoConfig::default().world);
    }

    #[test]
    fn test_malformed_scenario() {
        let path = std::env::temp_dir().join("raycast-racer-bad-scenario.json");
        std::fs::write(&path, "{ frames: ").unwrap();
        let result = DemoConfig::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(ConfigError::Json { .. })));
    }
}

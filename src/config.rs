use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::movement::validator::ValidationLimits;
use crate::world::grid::GridSettings;
use crate::world::instance::InstanceSettings;

const CONFIG_ENV: &str = "WORLD_CONFIG";

#[derive(Debug)]
pub struct AppConfig {
    /// YAML file with the world settings; `None` runs on defaults.
    pub config_path: Option<PathBuf>,
    pub world: WorldConfig,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        if args.iter().skip(1).any(|arg| arg == "-h" || arg == "--help") {
            return Err("usage: world_server [config.yaml]".to_string());
        }
        let config_path = if args.len() > 1 {
            Some(PathBuf::from(&args[1]))
        } else {
            std::env::var(CONFIG_ENV).ok().and_then(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(trimmed))
                }
            })
        };
        let world = match config_path.as_deref() {
            Some(path) => WorldConfig::load(path)?,
            None => WorldConfig::default(),
        };
        Ok(Self { config_path, world })
    }
}

/// Every tunable of a world instance. Keys missing from the file keep
/// their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Update loop period; 33ms is roughly 30 ticks per second.
    pub tick_interval_ms: u64,
    pub tile_size: f32,
    pub map_size: f32,
    /// Sight radius in tiles.
    pub sight_radius: i32,
    pub pending_change_timeout_ms: u64,
    /// Longest gap between packets of a moving unit.
    pub latency_tolerance_ms: u32,
    pub mover_update_interval_ms: u64,
    pub path_cache_capacity: usize,
    pub log_dir: PathBuf,
    pub log_filter: String,
    /// Extra spells added to the built-in set.
    pub spell_file: Option<PathBuf>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        let grid = GridSettings::default();
        let limits = ValidationLimits::default();
        let instance = InstanceSettings::default();
        Self {
            tick_interval_ms: 33,
            tile_size: grid.tile_size,
            map_size: grid.map_size,
            sight_radius: grid.sight_radius,
            pending_change_timeout_ms: instance.pending_change_timeout_ms,
            latency_tolerance_ms: limits.latency_tolerance_ms,
            mover_update_interval_ms: instance.mover_update_interval_ms,
            path_cache_capacity: 1024,
            log_dir: PathBuf::from("log"),
            log_filter: "info".to_string(),
            spell_file: None,
        }
    }
}

impl WorldConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let source = std::fs::read_to_string(path)
            .map_err(|err| format!("read config {} failed: {}", path.display(), err))?;
        Self::from_yaml_str(&source)
            .map_err(|err| format!("parse config {} failed: {}", path.display(), err))
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, String> {
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(source).map_err(|err| err.to_string())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be positive".to_string());
        }
        if !(self.tile_size > 0.0) || !(self.map_size >= self.tile_size) {
            return Err(format!(
                "map_size {} must be at least one tile of {}",
                self.map_size, self.tile_size
            ));
        }
        if self.sight_radius < 0 {
            return Err("sight_radius must not be negative".to_string());
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn instance_settings(&self) -> InstanceSettings {
        InstanceSettings {
            grid: GridSettings {
                tile_size: self.tile_size,
                map_size: self.map_size,
                sight_radius: self.sight_radius,
            },
            limits: ValidationLimits {
                latency_tolerance_ms: self.latency_tolerance_ms,
                ..ValidationLimits::default()
            },
            pending_change_timeout_ms: self.pending_change_timeout_ms,
            mover_update_interval_ms: self.mover_update_interval_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_keys_keep_defaults() {
        let config = WorldConfig::from_yaml_str("sight_radius: 3\nlog_filter: debug\n").expect("config");
        assert_eq!(config.sight_radius, 3);
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.tick_interval_ms, 33);
        let settings = config.instance_settings();
        assert_eq!(settings.grid.sight_radius, 3);
        assert_eq!(settings.limits.max_moving_packet_gap_ms(), 500);
    }

    #[test]
    fn rejects_impossible_grid() {
        assert!(WorldConfig::from_yaml_str("tile_size: 0").is_err());
        assert!(WorldConfig::from_yaml_str("tick_interval_ms: 0").is_err());
        assert!(WorldConfig::from_yaml_str("sight_radius: [1]").is_err());
    }

    #[test]
    fn loads_config_named_on_the_command_line() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "tick_interval_ms: 50\nlatency_tolerance_ms: 250").expect("write");
        let path = file.path().to_string_lossy().to_string();
        let config = AppConfig::from_args(&["world_server".to_string(), path]).expect("config");
        assert_eq!(config.world.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.world.instance_settings().limits.max_moving_packet_gap_ms(), 250);
    }

    #[test]
    fn unreadable_config_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("missing.yaml");
        let err = WorldConfig::load(&missing).expect_err("missing file");
        assert!(err.contains("missing.yaml"));
    }
}

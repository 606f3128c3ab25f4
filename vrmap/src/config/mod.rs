//! Map configuration file.
//!
//! The configuration lives in an INI file, by default
//! `~/.vrmap/config.ini`:
//!
//! ```ini
//! [map]
//! max_feature_add_per_tick = 5
//! modules = tiles, pois
//! drain_order = lifo
//!
//! [producer]
//! zoom = 16
//! radius = 2
//!
//! [preset.Innsbruck]
//! latitude = 47.2692
//! longitude = 11.4041
//! ```
//!
//! Presets keep their declaration order; the first one is the startup scene.
//! A malformed file is a [`ConfigError`] and blocks startup.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::{Ini, Properties};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::admission::DrainOrder;
use crate::geo::{GeoPoint, LocationPreset};
use crate::layer::LayerId;

/// Directory under the home directory holding VRMap files.
pub const CONFIG_DIR_NAME: &str = ".vrmap";

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Default cap on `add` deliveries per render tick.
pub const DEFAULT_MAX_FEATURE_ADD_PER_TICK: usize = 5;

/// Default producer tile zoom level.
pub const DEFAULT_PRODUCER_ZOOM: u8 = 16;

/// Default producer radius in tiles around the camera tile.
pub const DEFAULT_PRODUCER_RADIUS: u32 = 2;

/// Highest zoom level the tile producer accepts.
pub const MAX_PRODUCER_ZOOM: u8 = 19;

/// Largest radius the tile producer accepts. The grid holds
/// `(2 * radius + 1)^2` tiles per layer.
pub const MAX_PRODUCER_RADIUS: u32 = 8;

const PRESET_PREFIX: &str = "preset.";

/// Errors that block startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Can't load {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Can't parse configuration: {0}")]
    Parse(String),

    #[error("Missing required key '{key}' in section [{section}]")]
    MissingKey { section: String, key: String },

    #[error("Invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("No location presets configured")]
    NoPresets,

    #[error("Module '{0}' is enabled but no layer implementation is available")]
    UnknownModule(String),

    #[error("Can't write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Settings consumed by the tile producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerSettings {
    /// Web Mercator zoom level of produced tiles.
    pub zoom: u8,
    /// Tiles kept around the camera tile in each direction.
    pub radius: u32,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_PRODUCER_ZOOM,
            radius: DEFAULT_PRODUCER_RADIUS,
        }
    }
}

/// Parsed map configuration.
///
/// Serialized (camelCase) into the producer's `init` handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapConfig {
    /// Cap on `add` deliveries per render tick. Always ≥ 1.
    pub max_feature_add_per_tick: usize,
    /// Enabled layer modules, in the order they are set up.
    pub modules: Vec<LayerId>,
    /// Named scene centers in declaration order. Never empty.
    pub presets: Vec<LocationPreset>,
    /// Order in which queued adds are drained.
    #[serde(default)]
    pub drain_order: DrainOrder,
    #[serde(default)]
    pub producer: ProducerSettings,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            max_feature_add_per_tick: DEFAULT_MAX_FEATURE_ADD_PER_TICK,
            modules: vec![LayerId::from("tiles")],
            presets: vec![
                LocationPreset::new("Innsbruck", 47.2692, 11.4041),
                LocationPreset::new("Vienna", 48.2082, 16.3738),
            ],
            drain_order: DrainOrder::default(),
            producer: ProducerSettings::default(),
        }
    }
}

impl MapConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = Self::from_ini(&ini)?;
        tracing::info!(
            path = %path.display(),
            modules = config.modules.len(),
            presets = config.presets.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let map = ini
            .section(Some("map"))
            .ok_or_else(|| missing("map", "max_feature_add_per_tick"))?;

        let max_feature_add_per_tick: usize =
            parse_required(map, "map", "max_feature_add_per_tick")?;
        if max_feature_add_per_tick == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_feature_add_per_tick".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let modules = map
            .get("modules")
            .ok_or_else(|| missing("map", "modules"))?
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(LayerId::from)
            .collect();

        let drain_order = parse_optional(map, "drain_order")?.unwrap_or_default();

        let producer = match ini.section(Some("producer")) {
            Some(section) => {
                let defaults = ProducerSettings::default();
                let zoom = parse_optional(section, "zoom")?.unwrap_or(defaults.zoom);
                if zoom > MAX_PRODUCER_ZOOM {
                    return Err(ConfigError::InvalidValue {
                        key: "zoom".to_string(),
                        value: zoom.to_string(),
                        reason: format!("must be at most {}", MAX_PRODUCER_ZOOM),
                    });
                }
                let radius = parse_optional(section, "radius")?.unwrap_or(defaults.radius);
                if radius > MAX_PRODUCER_RADIUS {
                    return Err(ConfigError::InvalidValue {
                        key: "radius".to_string(),
                        value: radius.to_string(),
                        reason: format!("must be at most {}", MAX_PRODUCER_RADIUS),
                    });
                }
                ProducerSettings { zoom, radius }
            }
            None => ProducerSettings::default(),
        };

        let presets = parse_presets(ini)?;
        if presets.is_empty() {
            return Err(ConfigError::NoPresets);
        }

        Ok(Self {
            max_feature_add_per_tick,
            modules,
            presets,
            drain_order,
            producer,
        })
    }

    /// Find a preset by title (case-insensitive).
    pub fn preset(&self, title: &str) -> Option<&LocationPreset> {
        self.presets
            .iter()
            .find(|p| p.title.eq_ignore_ascii_case(title))
    }

    /// The preset loaded at startup.
    pub fn startup_preset(&self) -> Option<&LocationPreset> {
        self.presets.first()
    }

    /// Render this configuration as INI.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        let modules: Vec<&str> = self.modules.iter().map(LayerId::as_str).collect();
        ini.with_section(Some("map"))
            .set(
                "max_feature_add_per_tick",
                self.max_feature_add_per_tick.to_string(),
            )
            .set("modules", modules.join(", "))
            .set("drain_order", self.drain_order.as_str());
        ini.with_section(Some("producer"))
            .set("zoom", self.producer.zoom.to_string())
            .set("radius", self.producer.radius.to_string());
        for preset in &self.presets {
            ini.with_section(Some(format!("{}{}", PRESET_PREFIX, preset.title)))
                .set("latitude", preset.latitude.to_string())
                .set("longitude", preset.longitude.to_string());
        }
        ini
    }

    /// Write this configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }
}

/// Default configuration file path (`~/.vrmap/config.ini`).
pub fn config_file_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn missing(section: &str, key: &str) -> ConfigError {
    ConfigError::MissingKey {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_required<T>(props: &Properties, section: &str, key: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = props.get(key).ok_or_else(|| missing(section, key))?;
    parse_value(key, raw)
}

fn parse_optional<T>(props: &Properties, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    props.get(key).map(|raw| parse_value(key, raw)).transpose()
}

fn parse_presets(ini: &Ini) -> Result<Vec<LocationPreset>, ConfigError> {
    let mut presets = Vec::new();
    for (name, props) in ini.iter() {
        let Some(title) = name.and_then(|n| n.strip_prefix(PRESET_PREFIX)) else {
            continue;
        };
        let section = format!("{}{}", PRESET_PREFIX, title);
        let latitude: f64 = parse_required(props, &section, "latitude")?;
        let longitude: f64 = parse_required(props, &section, "longitude")?;

        GeoPoint::new(latitude, longitude)
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                key: format!("{}.latitude/longitude", section),
                value: format!("{}, {}", latitude, longitude),
                reason: e.to_string(),
            })?;

        presets.push(LocationPreset::new(title.trim(), latitude, longitude));
    }
    Ok(presets)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[map]
max_feature_add_per_tick = 3
modules = tiles, pois
drain_order = fifo

[producer]
zoom = 15
radius = 1

[preset.Innsbruck]
latitude = 47.2692
longitude = 11.4041

[preset.New York]
latitude = 40.7128
longitude = -74.0060
"#;

    #[test]
    fn test_parse_sample() {
        let config = MapConfig::from_ini_str(SAMPLE).unwrap();

        assert_eq!(config.max_feature_add_per_tick, 3);
        assert_eq!(
            config.modules,
            vec![LayerId::from("tiles"), LayerId::from("pois")]
        );
        assert_eq!(config.drain_order, DrainOrder::Fifo);
        assert_eq!(config.producer, ProducerSettings { zoom: 15, radius: 1 });
        assert_eq!(config.presets.len(), 2);
        assert_eq!(config.presets[0].title, "Innsbruck");
        assert_eq!(config.presets[1].title, "New York");
        assert_eq!(config.startup_preset().unwrap().title, "Innsbruck");
    }

    #[test]
    fn test_defaults_for_optional_keys() {
        let config = MapConfig::from_ini_str(
            "[map]\nmax_feature_add_per_tick = 1\nmodules = tiles\n\n[preset.Home]\nlatitude = 1\nlongitude = 2\n",
        )
        .unwrap();

        assert_eq!(config.drain_order, DrainOrder::Lifo);
        assert_eq!(config.producer, ProducerSettings::default());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let text = SAMPLE.replace("max_feature_add_per_tick = 3", "max_feature_add_per_tick = 0");
        let err = MapConfig::from_ini_str(&text).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "max_feature_add_per_tick"
        ));
    }

    #[test]
    fn test_non_numeric_limit_rejected() {
        let text = SAMPLE.replace(
            "max_feature_add_per_tick = 3",
            "max_feature_add_per_tick = lots",
        );
        assert!(matches!(
            MapConfig::from_ini_str(&text),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_missing_modules() {
        let text = SAMPLE.replace("modules = tiles, pois\n", "");
        let err = MapConfig::from_ini_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { ref key, .. } if key == "modules"));
    }

    #[test]
    fn test_missing_map_section() {
        let err =
            MapConfig::from_ini_str("[preset.Home]\nlatitude = 1\nlongitude = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { .. }));
    }

    #[test]
    fn test_no_presets() {
        let err =
            MapConfig::from_ini_str("[map]\nmax_feature_add_per_tick = 2\nmodules = tiles\n")
                .unwrap_err();
        assert!(matches!(err, ConfigError::NoPresets));
    }

    #[test]
    fn test_invalid_preset_coordinates() {
        let text = SAMPLE.replace("latitude = 47.2692", "latitude = 123");
        assert!(matches!(
            MapConfig::from_ini_str(&text),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_drain_order() {
        let text = SAMPLE.replace("drain_order = fifo", "drain_order = random");
        assert!(matches!(
            MapConfig::from_ini_str(&text),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zoom_out_of_range() {
        let text = SAMPLE.replace("zoom = 15", "zoom = 25");
        assert!(matches!(
            MapConfig::from_ini_str(&text),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_radius_out_of_range() {
        let text = SAMPLE.replace("radius = 1", "radius = 1000000");
        let err = MapConfig::from_ini_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "radius"));

        let text = SAMPLE.replace("radius = 1", &format!("radius = {}", MAX_PRODUCER_RADIUS));
        let config = MapConfig::from_ini_str(&text).unwrap();
        assert_eq!(config.producer.radius, MAX_PRODUCER_RADIUS);
    }

    #[test]
    fn test_preset_lookup() {
        let config = MapConfig::from_ini_str(SAMPLE).unwrap();
        assert!(config.preset("new york").is_some());
        assert!(config.preset("Paris").is_none());
    }

    #[test]
    fn test_load_unreadable_file() {
        let err = MapConfig::load(Path::new("/nonexistent/vrmap/config.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let config = MapConfig::from_ini_str(SAMPLE).unwrap();
        config.save(&path).unwrap();

        assert_eq!(MapConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_serializes_camel_case_for_init() {
        let value = serde_json::to_value(MapConfig::default()).unwrap();
        assert_eq!(
            value["maxFeatureAddPerTick"],
            DEFAULT_MAX_FEATURE_ADD_PER_TICK
        );
        assert_eq!(value["modules"][0], "tiles");
        assert_eq!(value["producer"]["zoom"], DEFAULT_PRODUCER_ZOOM);
    }
}

//! Simulation parameters and the sources that produce them.
//!
//! A [`Config`] is fixed for the lifetime of a run. Where it comes from is a
//! separate concern modelled by [`ConfigSource`]: built-in defaults, a JSON
//! or key-value file, or command-line overrides layered over either.
//!
//! Files ending in `.ini` or `.toml` are read as flat `key = value` lines,
//! so the classic `numboids = 30` / `sidelen = 5.0` files load unchanged.
//! Anything else is read as JSON. Both accept the short key names as
//! aliases.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Immutable simulation parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Seed for placement and turning noise.
    pub seed: u64,
    /// Total number of boids across all ranks.
    #[serde(alias = "numboids")]
    pub num_boids: u64,
    /// Number of ticks to simulate.
    #[serde(alias = "numticks")]
    pub num_ticks: u64,
    /// Constant boid speed.
    pub v: f64,
    /// Time step.
    pub dt: f64,
    /// Amplitude of the uniform turning noise, in radians.
    pub noise: f64,
    /// Neighbor radius for velocity averaging.
    pub cutoff: f64,
    /// Side length of the square periodic domain.
    #[serde(alias = "sidelen")]
    pub side_len: f64,
    /// Shared output file for per-tick frames; no output when unset.
    pub output: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 1,
            num_boids: 30,
            num_ticks: 100,
            v: 0.03,
            dt: 1.0,
            noise: 1.0,
            cutoff: 1.0,
            side_len: 5.0,
            output: None,
        }
    }
}

fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

impl Config {
    /// Check every parameter is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.side_len.is_finite() && self.side_len > 0.0) {
            return Err(invalid("side_len", "must be positive and finite"));
        }
        if !(self.v.is_finite() && self.v > 0.0) {
            return Err(invalid("v", "must be positive and finite"));
        }
        if !(self.dt.is_finite() && self.dt >= 0.0) {
            return Err(invalid("dt", "must be non-negative and finite"));
        }
        if !(self.noise.is_finite() && self.noise >= 0.0) {
            return Err(invalid("noise", "must be non-negative and finite"));
        }
        if !(self.cutoff.is_finite() && self.cutoff >= 0.0) {
            return Err(invalid("cutoff", "must be non-negative and finite"));
        }
        if self.v * self.dt >= self.side_len {
            return Err(invalid("v", "times dt must be shorter than side_len"));
        }
        Ok(())
    }

    /// Distance a boid covers in one tick.
    pub fn step_length(&self) -> f64 {
        self.v * self.dt
    }

    /// Load a configuration file. Missing keys take defaults.
    ///
    /// `.ini` and `.toml` files are read as `key = value` lines, anything
    /// else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if is_key_value_file(path) {
            return toml::from_str(&text).map_err(|source| ConfigError::ParseKeyValue {
                path: path.to_path_buf(),
                source,
            });
        }
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save the configuration to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

fn is_key_value_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("ini" | "toml")
    )
}

/// Something that can produce a populated [`Config`].
pub trait ConfigSource {
    fn load(&self) -> Result<Config, ConfigError>;
}

/// The built-in defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSource;

impl ConfigSource for DefaultSource {
    fn load(&self) -> Result<Config, ConfigError> {
        Ok(Config::default())
    }
}

/// A configuration file, JSON or `key = value`.
#[derive(Clone, Debug)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::load(&self.path)
    }
}

/// Individual values layered over another source, e.g. from the command line.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Overrides {
    pub seed: Option<u64>,
    pub num_boids: Option<u64>,
    pub num_ticks: Option<u64>,
    pub v: Option<f64>,
    pub dt: Option<f64>,
    pub noise: Option<f64>,
    pub cutoff: Option<f64>,
    pub side_len: Option<f64>,
    pub output: Option<PathBuf>,
}

impl Overrides {
    /// Apply these overrides on top of `base`.
    pub fn over<S: ConfigSource>(self, base: S) -> Layered<S> {
        Layered {
            base,
            overrides: self,
        }
    }

    fn apply(&self, config: &mut Config) {
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(n) = self.num_boids {
            config.num_boids = n;
        }
        if let Some(n) = self.num_ticks {
            config.num_ticks = n;
        }
        if let Some(v) = self.v {
            config.v = v;
        }
        if let Some(dt) = self.dt {
            config.dt = dt;
        }
        if let Some(noise) = self.noise {
            config.noise = noise;
        }
        if let Some(cutoff) = self.cutoff {
            config.cutoff = cutoff;
        }
        if let Some(side_len) = self.side_len {
            config.side_len = side_len;
        }
        if let Some(output) = &self.output {
            config.output = Some(output.clone());
        }
    }
}

/// A source with [`Overrides`] applied on top.
#[derive(Clone, Debug)]
pub struct Layered<S> {
    base: S,
    overrides: Overrides,
}

impl<S: ConfigSource> ConfigSource for Layered<S> {
    fn load(&self) -> Result<Config, ConfigError> {
        let mut config = self.base.load()?;
        self.overrides.apply(&mut config);
        Ok(config)
    }
}

impl<S: ConfigSource + ?Sized> ConfigSource for Box<S> {
    fn load(&self) -> Result<Config, ConfigError> {
        (**self).load()
    }
}

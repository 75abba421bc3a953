//! Configuration management for livescope
//!
//! Pipeline timing, auto-scale percentiles, noise measurement limits and the
//! paint queue are read from a TOML file. `load_layered` additionally applies
//! `LIVESCOPE__<SECTION>__<KEY>` environment overrides on top of the file.

use crate::errors::PipelineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub timing: TimingConfig,
    pub contrast: ContrastConfig,
    pub noise: NoiseConfig,
    pub presentation: PresentationConfig,
}

/// Loop and throttle periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Period of the frame fetch loop in milliseconds
    pub fetch_period_ms: u64,
    /// Minimum spacing between histogram updates in milliseconds
    pub histogram_interval_ms: u64,
    /// Minimum spacing between spatial noise estimates in milliseconds
    pub spatial_noise_interval_ms: u64,
    /// Sliding window for the FPS readout in milliseconds
    pub fps_window_ms: u64,
}

/// Auto-scale behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastConfig {
    /// Lower clip point in percent of samples (0-100)
    pub low_percentile: f64,
    /// Upper clip point in percent of samples (0-100)
    pub high_percentile: f64,
    /// Start the viewing session with auto-scale on
    pub auto_scale_on_start: bool,
}

/// Noise measurement limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Frames per temporal measurement when the caller does not choose
    pub default_temporal_frames: usize,
    /// Largest burst a temporal measurement may request
    pub max_temporal_frames: usize,
    /// Whether the noise panel starts expanded (enables spatial noise)
    pub noise_panel_expanded: bool,
}

/// Paint queue between the fetch task and the presentation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Frames waiting to be painted; older frames are dropped when full
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            contrast: ContrastConfig::default(),
            noise: NoiseConfig::default(),
            presentation: PresentationConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            fetch_period_ms: 100,
            histogram_interval_ms: 200,
            spatial_noise_interval_ms: 500,
            fps_window_ms: 1000,
        }
    }
}

impl Default for ContrastConfig {
    fn default() -> Self {
        Self {
            low_percentile: crate::contrast::DEFAULT_LOW_PERCENTILE,
            high_percentile: crate::contrast::DEFAULT_HIGH_PERCENTILE,
            auto_scale_on_start: false,
        }
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            default_temporal_frames: 10,
            max_temporal_frames: 200,
            noise_panel_expanded: false,
        }
    }
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self { queue_capacity: 1 }
    }
}

impl TimingConfig {
    pub fn fetch_period(&self) -> Duration {
        Duration::from_millis(self.fetch_period_ms)
    }

    pub fn histogram_interval(&self) -> Duration {
        Duration::from_millis(self.histogram_interval_ms)
    }

    pub fn spatial_noise_interval(&self) -> Duration {
        Duration::from_millis(self.spatial_noise_interval_ms)
    }

    pub fn fps_window(&self) -> Duration {
        Duration::from_millis(self.fps_window_ms)
    }
}

impl PipelineConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("Failed to read config file: {}", e)))?;

        let config: PipelineConfig = toml::from_str(&contents)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load the TOML file (if any) with environment overrides applied on top.
    ///
    /// `LIVESCOPE__TIMING__FETCH_PERIOD_MS=50` overrides `timing.fetch_period_ms`.
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("LIVESCOPE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to assemble config: {}", e)))?;

        let config: PipelineConfig = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), PipelineError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PipelineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        fs::write(path, self.to_toml()?)
            .map_err(|e| PipelineError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, PipelineError> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("livescope.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), PipelineError> {
        let t = &self.timing;
        if t.fetch_period_ms == 0 || t.fps_window_ms == 0 {
            return Err(PipelineError::Config(
                "Fetch period and FPS window must be non-zero".to_string(),
            ));
        }

        let c = &self.contrast;
        if !(0.0..=100.0).contains(&c.low_percentile) || !(0.0..=100.0).contains(&c.high_percentile)
        {
            return Err(PipelineError::Config(
                "Percentiles must be between 0 and 100".to_string(),
            ));
        }
        if c.low_percentile >= c.high_percentile {
            return Err(PipelineError::Config(
                "Low percentile must be below high percentile".to_string(),
            ));
        }

        let n = &self.noise;
        if n.default_temporal_frames < crate::noise::MIN_TEMPORAL_FRAMES {
            return Err(PipelineError::Config(format!(
                "Temporal noise needs at least {} frames",
                crate::noise::MIN_TEMPORAL_FRAMES
            )));
        }
        if n.max_temporal_frames < n.default_temporal_frames {
            return Err(PipelineError::Config(
                "Maximum temporal frames must not be below the default".to_string(),
            ));
        }

        if self.presentation.queue_capacity == 0 {
            return Err(PipelineError::Config(
                "Presentation queue capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

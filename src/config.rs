//! Block Configuration Module
//!
//! Bus widths, kernel shape and pipeline depths for the three checked
//! blocks. Every derived width is computed from these structs, so a
//! configuration fully determines the arithmetic of its checker.

use serde::{Deserialize, Serialize};

use crate::error::{OracleError, Result};
use crate::fixed_point::MAX_WIDTH;

/// Widest packed input bus, in bits
pub const MAX_BUS_WIDTH: u32 = 1 << 16;

/// Configuration of every block the oracle can check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Stand-alone multiply-add unit
    pub mac: MacConfig,
    /// One-row windowed slice accumulator
    pub slice: SliceConfig,
    /// Full convolution engine
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacConfig {
    /// Bus width of the 'm1' operand
    pub m1_width: u32,
    /// Bus width of the 'm2' operand
    pub m2_width: u32,
    /// Edges between driving operands and observing the result
    pub pipeline_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceConfig {
    /// Number of multipliers in the slice
    pub mac_count: usize,
    /// Number of pixels that belong to the following beat
    pub offset: usize,
    /// Bus width of kernel weight numbers
    pub weight_width: u32,
    /// Bus width of image numbers
    pub image_width: u32,
    /// Edges between a beat and its completing sum
    pub pipeline_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number width of kernel weights
    pub weight_width: u32,
    /// Number width of image pixels
    pub image_width: u32,
    /// Number of pixels per image row on the bus
    pub image_count: usize,
    /// Width of the convolution kernel
    pub kernel_width: usize,
    /// Height of the convolution kernel
    pub kernel_height: usize,
    /// Width of the rescale configuration bus
    pub shift_width: u32,
    /// Edges between a beat and its rescaled result word
    pub pipeline_depth: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            mac: MacConfig::default(),
            slice: SliceConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for MacConfig {
    fn default() -> Self {
        MacConfig {
            m1_width: 16,
            m2_width: 16,
            pipeline_depth: 5,
        }
    }
}

impl Default for SliceConfig {
    fn default() -> Self {
        SliceConfig {
            mac_count: 3,
            offset: 1,
            weight_width: 8,
            image_width: 16,
            pipeline_depth: 18,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            weight_width: 8,
            image_width: 16,
            image_count: 3,
            kernel_width: 3,
            kernel_height: 3,
            shift_width: 7,
            pipeline_depth: 28,
        }
    }
}

fn check_width(what: &str, width: u32) -> Result<()> {
    if width == 0 || width > MAX_WIDTH {
        return Err(OracleError::invalid_config(format!(
            "{what} must be between 1 and {MAX_WIDTH} bits, got {width}"
        )));
    }
    Ok(())
}

/// `fields` lanes of `field_width` bits must fit one bus.
fn check_bus(what: &str, field_width: u32, fields: usize) -> Result<()> {
    let width = u32::try_from(fields)
        .ok()
        .and_then(|n| n.checked_mul(field_width))
        .filter(|&w| w <= MAX_BUS_WIDTH);
    if width.is_none() {
        return Err(OracleError::invalid_config(format!(
            "{what} of {fields} x {field_width} bits exceeds {MAX_BUS_WIDTH} bits"
        )));
    }
    Ok(())
}

fn check_depth(what: &str, depth: usize) -> Result<()> {
    if depth == 0 {
        return Err(OracleError::invalid_config(format!(
            "{what} pipeline depth must be at least 1"
        )));
    }
    Ok(())
}

impl MacConfig {
    /// Width of the exact product
    pub fn product_width(&self) -> u32 {
        self.m1_width + self.m2_width
    }

    /// Width of the 'add' operand and the result
    pub fn result_width(&self) -> u32 {
        self.product_width() + 1
    }

    pub fn validate(&self) -> Result<()> {
        check_width("m1 width", self.m1_width)?;
        check_width("m2 width", self.m2_width)?;
        check_width("mac result width", self.result_width())?;
        check_depth("mac", self.pipeline_depth)
    }
}

impl SliceConfig {
    pub fn product_width(&self) -> u32 {
        self.image_width + self.weight_width
    }

    /// Width of the completing sum
    pub fn result_width(&self) -> u32 {
        self.product_width() + 1
    }

    /// Width of the packed image bus
    pub fn image_bus_width(&self) -> u32 {
        self.image_width * self.mac_count as u32
    }

    pub fn validate(&self) -> Result<()> {
        check_width("slice image width", self.image_width)?;
        check_width("slice weight width", self.weight_width)?;
        check_width("slice result width", self.result_width())?;
        if self.mac_count == 0 {
            return Err(OracleError::invalid_config("slice needs at least one MAC"));
        }
        check_bus("slice image bus", self.image_width, self.mac_count)?;
        if self.offset >= self.mac_count {
            return Err(OracleError::invalid_config(format!(
                "slice offset {} must be below the MAC count {}",
                self.offset, self.mac_count
            )));
        }
        check_depth("slice", self.pipeline_depth)
    }
}

impl EngineConfig {
    pub fn product_width(&self) -> u32 {
        self.image_width + self.weight_width
    }

    /// Width of every slice sum before rescaling
    pub fn result_width(&self) -> u32 {
        self.product_width() + 1
    }

    /// Width of the result word (one rescaled pixel per position)
    pub fn word_width(&self) -> u32 {
        self.image_width * self.image_count as u32
    }

    /// Width of the packed image bus (one word per kernel row)
    pub fn image_bus_width(&self) -> u32 {
        self.word_width() * self.kernel_height as u32
    }

    /// Number of weights in one kernel
    pub fn kernel_count(&self) -> usize {
        self.kernel_width * self.kernel_height
    }

    /// Number of pixels in one beat
    pub fn beat_len(&self) -> usize {
        self.image_count * self.kernel_height
    }

    /// Largest shift the configuration bus can carry
    pub fn max_shift(&self) -> u32 {
        ((1u64 << self.shift_width) - 1).min(u64::from(u32::MAX)) as u32
    }

    pub fn validate(&self) -> Result<()> {
        check_width("engine image width", self.image_width)?;
        check_width("engine weight width", self.weight_width)?;
        // group sums carry two guard bits
        check_width("engine group sum width", self.result_width() + 2)?;
        if self.kernel_width == 0 || self.kernel_height == 0 {
            return Err(OracleError::invalid_config("kernel must be at least 1x1"));
        }
        if self.image_count == 0 {
            return Err(OracleError::invalid_config("engine needs at least one channel"));
        }
        let beat_len = self.image_count.checked_mul(self.kernel_height).unwrap_or(usize::MAX);
        check_bus("engine image bus", self.image_width, beat_len)?;
        if self.word_width() > 128 {
            return Err(OracleError::invalid_config(format!(
                "engine result word of {} bits exceeds 128",
                self.word_width()
            )));
        }
        if self.shift_width == 0 || self.shift_width > 32 {
            return Err(OracleError::invalid_config(format!(
                "shift bus must be between 1 and 32 bits, got {}",
                self.shift_width
            )));
        }
        if beat_len < self.kernel_width {
            return Err(OracleError::invalid_config(format!(
                "beat of {} pixels cannot cover a kernel {} wide",
                beat_len, self.kernel_width
            )));
        }
        check_depth("engine", self.pipeline_depth)
    }
}

impl OracleConfig {
    /// Validate every block
    pub fn validate(&self) -> Result<()> {
        self.mac.validate()?;
        self.slice.validate()?;
        self.engine.validate()
    }

    /// Small kernel configuration for quick runs
    pub fn small() -> Self {
        OracleConfig {
            mac: MacConfig {
                m1_width: 8,
                m2_width: 8,
                ..Default::default()
            },
            slice: SliceConfig {
                mac_count: 2,
                offset: 1,
                weight_width: 4,
                image_width: 8,
                ..Default::default()
            },
            engine: EngineConfig {
                weight_width: 4,
                image_width: 8,
                image_count: 2,
                kernel_width: 2,
                kernel_height: 2,
                ..Default::default()
            },
        }
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &str) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Load and validate configuration from TOML file
    pub fn load(path: &str) -> Result<Self> {
        let toml_str = std::fs::read_to_string(path)?;
        let config: OracleConfig = toml::from_str(&toml_str)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_widths() {
        let config = OracleConfig::default();
        assert_eq!(config.mac.result_width(), 33);
        assert_eq!(config.slice.result_width(), 25);
        assert_eq!(config.engine.result_width(), 25);
        assert_eq!(config.engine.word_width(), 48);
        assert_eq!(config.engine.image_bus_width(), 144);
        assert_eq!(config.engine.kernel_count(), 9);
        assert_eq!(config.engine.max_shift(), 127);
    }

    #[test]
    fn test_presets_validate() {
        OracleConfig::default().validate().unwrap();
        OracleConfig::small().validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let mut slice = SliceConfig::default();
        slice.offset = 3;
        assert!(slice.validate().is_err());

        // fewer channels than kernel taps is fine while the beat covers the kernel
        let mut engine = EngineConfig::default();
        engine.image_count = 2;
        assert!(engine.validate().is_ok());
        engine.kernel_height = 1;
        assert!(engine.validate().is_err());

        let mut mac = MacConfig::default();
        mac.pipeline_depth = 0;
        assert!(mac.validate().is_err());

        let mut mac = MacConfig::default();
        mac.m1_width = 100;
        assert!(mac.validate().is_err());
    }

    #[test]
    fn test_bus_width_limits() {
        let wide = SliceConfig {
            mac_count: 200,
            ..Default::default()
        };
        wide.validate().unwrap();
        assert_eq!(wide.image_bus_width(), 3200);

        let too_wide = SliceConfig {
            mac_count: (MAX_BUS_WIDTH / 16 + 1) as usize,
            ..Default::default()
        };
        assert!(matches!(too_wide.validate(), Err(OracleError::InvalidConfig { .. })));

        let huge = SliceConfig {
            mac_count: usize::MAX,
            ..Default::default()
        };
        assert!(huge.validate().is_err());

        let tall = EngineConfig {
            kernel_height: usize::MAX,
            ..Default::default()
        };
        assert!(tall.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = OracleConfig::small();
        let text = toml::to_string_pretty(&config).unwrap();
        let recovered: OracleConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, recovered);

        let json = serde_json::to_string_pretty(&config).unwrap();
        let recovered: OracleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.engine.kernel_width, recovered.engine.kernel_width);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("mac-oracle-{}.toml", std::process::id()));
        let path = path.to_string_lossy().to_string();
        OracleConfig::default().save(&path).unwrap();
        let loaded = OracleConfig::load(&path).unwrap();
        assert_eq!(loaded, OracleConfig::default());
        std::fs::remove_file(&path).unwrap();
    }
}

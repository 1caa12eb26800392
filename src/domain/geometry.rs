//! Tick to bin mapping.
//!
//! A market covers ticks `[min_tick, max_tick)` split into bins of
//! `tick_spacing` ticks each. Trade ranges are given in ticks with the
//! lower bound inclusive and the upper bound exclusive.

use serde::{Deserialize, Serialize};

use super::error::{ClmsrError, Result};
use super::range_tree::MAX_BIN_COUNT;

/// Deserialization goes through [`BinGeometry::new`], so a decoded
/// geometry is as valid as a constructed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGeometry")]
pub struct BinGeometry {
    min_tick: i64,
    max_tick: i64,
    tick_spacing: i64,
}

#[derive(Deserialize)]
struct RawGeometry {
    min_tick: i64,
    max_tick: i64,
    tick_spacing: i64,
}

impl TryFrom<RawGeometry> for BinGeometry {
    type Error = ClmsrError;

    fn try_from(raw: RawGeometry) -> Result<Self> {
        Self::new(raw.min_tick, raw.max_tick, raw.tick_spacing)
    }
}

impl BinGeometry {
    /// Validates and builds a geometry.
    ///
    /// # Errors
    /// `InvalidTickRange` for an empty or misaligned tick range,
    /// `InvalidBinCount` when the range holds more than `MAX_BIN_COUNT` bins.
    pub fn new(min_tick: i64, max_tick: i64, tick_spacing: i64) -> Result<Self> {
        let span = max_tick.checked_sub(min_tick).unwrap_or(0);
        if tick_spacing <= 0 || span <= 0 || span % tick_spacing != 0 {
            return Err(ClmsrError::InvalidTickRange {
                lower: min_tick,
                upper: max_tick,
            });
        }
        let bins = span / tick_spacing;
        let bin_count = u32::try_from(bins).unwrap_or(u32::MAX);
        if bin_count > MAX_BIN_COUNT {
            return Err(ClmsrError::InvalidBinCount(bin_count));
        }
        Ok(Self {
            min_tick,
            max_tick,
            tick_spacing,
        })
    }

    pub const fn min_tick(&self) -> i64 {
        self.min_tick
    }

    pub const fn max_tick(&self) -> i64 {
        self.max_tick
    }

    pub const fn tick_spacing(&self) -> i64 {
        self.tick_spacing
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn bin_count(&self) -> u32 {
        // bounded by MAX_BIN_COUNT at construction
        ((self.max_tick - self.min_tick) / self.tick_spacing) as u32
    }

    /// Bin whose lower edge is `tick`.
    pub fn tick_to_bin(&self, tick: i64) -> Result<u32> {
        if tick < self.min_tick || tick >= self.max_tick {
            return Err(self.invalid_tick(tick));
        }
        self.edge_index(tick)
    }

    /// Inclusive bin range covered by the tick range `[lower_tick, upper_tick)`.
    pub fn range_to_bins(&self, lower_tick: i64, upper_tick: i64) -> Result<(u32, u32)> {
        if lower_tick >= upper_tick {
            return Err(ClmsrError::InvalidTickRange {
                lower: lower_tick,
                upper: upper_tick,
            });
        }
        let lower_bin = self.tick_to_bin(lower_tick)?;
        if upper_tick > self.max_tick {
            return Err(self.invalid_tick(upper_tick));
        }
        let upper_edge = self.edge_index(upper_tick)?;
        Ok((lower_bin, upper_edge - 1))
    }

    /// Lower tick edge of `bin`.
    pub fn bin_lower_tick(&self, bin: u32) -> Result<i64> {
        if bin >= self.bin_count() {
            return Err(ClmsrError::IndexOutOfBounds {
                index: bin,
                bin_count: self.bin_count(),
            });
        }
        Ok(self.min_tick + i64::from(bin) * self.tick_spacing)
    }

    fn edge_index(&self, tick: i64) -> Result<u32> {
        let offset = tick - self.min_tick;
        if offset % self.tick_spacing != 0 {
            return Err(self.invalid_tick(tick));
        }
        u32::try_from(offset / self.tick_spacing).map_err(|_| self.invalid_tick(tick))
    }

    const fn invalid_tick(&self, tick: i64) -> ClmsrError {
        ClmsrError::InvalidTick {
            tick,
            spacing: self.tick_spacing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_validates() {
        let geometry: BinGeometry =
            serde_json::from_str(r#"{"min_tick":0,"max_tick":10,"tick_spacing":2}"#).unwrap();
        assert_eq!(geometry, BinGeometry::new(0, 10, 2).unwrap());
        assert_eq!(geometry.bin_count(), 5);

        for bad in [
            r#"{"min_tick":0,"max_tick":10,"tick_spacing":0}"#,
            r#"{"min_tick":0,"max_tick":10,"tick_spacing":3}"#,
            r#"{"min_tick":10,"max_tick":0,"tick_spacing":1}"#,
            r#"{"min_tick":0,"max_tick":2000000,"tick_spacing":1}"#,
        ] {
            assert!(serde_json::from_str::<BinGeometry>(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_bin_count_and_mapping() {
        let geometry = BinGeometry::new(100_000, 140_000, 100).unwrap();
        assert_eq!(geometry.bin_count(), 400);
        assert_eq!(geometry.tick_to_bin(100_000).unwrap(), 0);
        assert_eq!(geometry.tick_to_bin(139_900).unwrap(), 399);
        assert_eq!(geometry.range_to_bins(100_500, 101_000).unwrap(), (5, 9));
        assert_eq!(geometry.range_to_bins(100_000, 140_000).unwrap(), (0, 399));
        assert_eq!(geometry.bin_lower_tick(5).unwrap(), 100_500);
    }

    #[test]
    fn test_negative_ticks() {
        let geometry = BinGeometry::new(-500, 500, 10).unwrap();
        assert_eq!(geometry.bin_count(), 100);
        assert_eq!(geometry.tick_to_bin(-500).unwrap(), 0);
        assert_eq!(geometry.tick_to_bin(0).unwrap(), 50);
    }

    #[test]
    fn test_rejects_misaligned_and_out_of_range_ticks() {
        let geometry = BinGeometry::new(0, 1_000, 10).unwrap();
        assert!(matches!(
            geometry.tick_to_bin(15),
            Err(ClmsrError::InvalidTick { tick: 15, spacing: 10 })
        ));
        assert!(geometry.tick_to_bin(1_000).is_err());
        assert!(geometry.tick_to_bin(-10).is_err());
        assert!(geometry.range_to_bins(0, 1_010).is_err());
        assert!(matches!(
            geometry.range_to_bins(50, 50),
            Err(ClmsrError::InvalidTickRange { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_geometry() {
        assert!(BinGeometry::new(0, 0, 1).is_err());
        assert!(BinGeometry::new(0, 105, 10).is_err());
        assert!(BinGeometry::new(0, 100, 0).is_err());
        assert_eq!(
            BinGeometry::new(0, 2_000_000, 1),
            Err(ClmsrError::InvalidBinCount(2_000_000))
        );
    }
}

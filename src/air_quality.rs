//! Index of Air Quality (IAQ) scoring and equivalent CO2 estimation.
//!
//! Both work on compensated readings and a finished [`Baseline`]. They never
//! touch the bus and never mutate the baseline.

use crate::{Baseline, Measurement};

/// Reference humidity in percent. 30 % to 50 % is the usual indoor comfort band.
pub const HUMIDITY_BASELINE: i32 = 40;

/// Share of the IAQ percentage contributed by humidity. Gas contributes the rest.
pub const HUMIDITY_WEIGHTING: f64 = 0.25;

/// Typical floor for occupied, well-ventilated rooms.
pub const ECO2_BASELINE_PPM: u32 = 400;

/// Window in which a humidity jump counts as breath.
pub const BREATH_WINDOW_MS: u64 = 5000;

/// Humidity rise in percentage points that counts as breath.
pub const BREATH_HUMIDITY_RISE: i32 = 3;

/// Flat eCO2 addition when breath is detected.
pub const BREATH_PPM: u32 = 1500;

/// Piecewise mapping from IAQ score to eCO2: `(score_low, score_high, ppm_low, ppm_high)`.
const ECO2_BANDS: [(u16, u16, u32, u32); 7] = [
    (0, 24, 250, 399),
    (25, 100, 400, 1000),
    (101, 150, 1001, 2000),
    (151, 200, 2001, 3500),
    (201, 350, 3501, 5000),
    (351, 450, 5001, 40000),
    (451, 500, 40001, 100000),
];

/// Text bucket for an IAQ score.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirQualityRating {
    Excellent,
    Good,
    LightlyPolluted,
    ModeratelyPolluted,
    HeavilyPolluted,
    SeverelyPolluted,
    ExtremelyPolluted,
}

impl AirQualityRating {
    /// Buckets have inclusive upper bounds at 50, 100, 150, 200, 250 and 350.
    pub fn from_score(score: u16) -> Self {
        match score {
            0..=50 => Self::Excellent,
            51..=100 => Self::Good,
            101..=150 => Self::LightlyPolluted,
            151..=200 => Self::ModeratelyPolluted,
            201..=250 => Self::HeavilyPolluted,
            251..=350 => Self::SeverelyPolluted,
            _ => Self::ExtremelyPolluted,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::LightlyPolluted => "Lightly Polluted",
            Self::ModeratelyPolluted => "Moderately Polluted",
            Self::HeavilyPolluted => "Heavily Polluted",
            Self::SeverelyPolluted => "Severely Polluted",
            Self::ExtremelyPolluted => "Extremely Polluted",
        }
    }
}

impl core::fmt::Display for AirQualityRating {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one IAQ evaluation.
///
/// `percent` runs from 0 (worst) to 100 (best). `score = (100 - percent) * 5`,
/// so 25 corresponds to typically good air and 250 to typically polluted air.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirQuality {
    pub percent: u8,
    pub score: u16,
    pub rating: AirQualityRating,
}

impl AirQuality {
    pub fn from_percent(percent: u8) -> Self {
        let percent = percent.min(100);
        let score = (100 - percent as u16) * 5;
        Self {
            percent,
            score,
            rating: AirQualityRating::from_score(score),
        }
    }
}

/// Scores a reading against the burn-in gas baseline and the fixed humidity reference.
///
/// With humidity exactly at 40 % and gas exactly at baseline the result is 95 %,
/// which leaves headroom for air cleaner than the baseline.
pub fn score_air_quality(reading: &Measurement, baseline: &Baseline) -> AirQuality {
    let humidity = reading.hum.percent();
    let gas = reading.gas.0 as f64;
    let gas_baseline = baseline.gas_resistance.0 as f64;

    let humidity_offset = humidity - HUMIDITY_BASELINE;
    let humidity_ratio = if humidity_offset > 0 {
        (100 - HUMIDITY_BASELINE - humidity_offset) as f64 / (100 - HUMIDITY_BASELINE) as f64
    } else {
        (HUMIDITY_BASELINE + humidity_offset) as f64 / HUMIDITY_BASELINE as f64
    };
    let humidity_score = humidity_ratio * (HUMIDITY_WEIGHTING * 100.0);

    let gas_score = if gas_baseline - gas > 0.0 {
        (gas / gas_baseline) * (100.0 - HUMIDITY_WEIGHTING * 100.0)
    } else {
        libm::round(70.0 + 5.0 * ((gas / gas_baseline) - 1.0)).min(75.0)
    };

    let percent = (humidity_score + gas_score) as i32;
    AirQuality::from_percent(percent.clamp(0, 100) as u8)
}

fn map_band(score: u16, band: (u16, u16, u32, u32)) -> f64 {
    let (from_low, from_high, to_low, to_high) = band;
    to_low as f64
        + ((score - from_low) as f64 / (from_high - from_low) as f64) * (to_high - to_low) as f64
}

/// Estimates the equivalent CO2 concentration in ppm.
///
/// A score of exactly 25 is pinned to 400 ppm. Otherwise the score is mapped
/// through the band table, scaled up when humidity and/or temperature sit above
/// their baselines, and raised by 1500 ppm when humidity jumped by at least
/// three points within five seconds of `previous`.
pub fn estimate_co2(
    score: u16,
    reading: &Measurement,
    baseline: &Baseline,
    previous: Option<&Measurement>,
) -> u32 {
    if score == 25 {
        return ECO2_BASELINE_PPM;
    }

    let score = score.min(500);
    let band = ECO2_BANDS
        .iter()
        .copied()
        .find(|&(low, high, _, _)| (low..=high).contains(&score))
        .unwrap_or(ECO2_BANDS[ECO2_BANDS.len() - 1]);
    let mut eco2 = map_band(score, band) as u32;

    let humidity = reading.hum.percent();
    let humidity_above = humidity > HUMIDITY_BASELINE;
    let humidity_factor = (humidity - HUMIDITY_BASELINE) as f64 / HUMIDITY_BASELINE as f64;

    // No ambient mean yet means there is nothing to compare against.
    let temperature_factor = baseline
        .ambient_temp
        .filter(|ambient| ambient.0 > 0 && reading.temp.0 > ambient.0)
        .map(|ambient| (reading.temp.0 - ambient.0) as f64 / ambient.0 as f64);

    eco2 = match (humidity_above, temperature_factor) {
        (true, Some(temperature_factor)) => {
            (eco2 as f64 * (1.0 + humidity_factor + temperature_factor)) as u32
        }
        (true, None) => (eco2 as f64 * (humidity_factor + 1.0)) as u32,
        (false, Some(temperature_factor)) => (eco2 as f64 * (temperature_factor + 1.0)) as u32,
        (false, None) => eco2,
    };

    if let Some(previous) = previous {
        let elapsed = reading.captured_at_ms.saturating_sub(previous.captured_at_ms);
        let rise = humidity - previous.hum.percent();
        if elapsed <= BREATH_WINDOW_MS && rise >= BREATH_HUMIDITY_RISE {
            eco2 += BREATH_PPM;
        }
    }

    eco2
}

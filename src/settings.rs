use crate::{Celsius, Milliseconds, Temperature};

/// Oversampling settings for temperature, pressure and humidity.
///
/// Higher rates average more conversions in hardware. They reduce noise at the
/// cost of a longer measurement cycle and more current per cycle.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Oversampling {
    /// No measurement. Disables the channel entirely.
    Skipped = 0,
    /// 1x oversampling.
    #[default]
    X1 = 1,
    /// 2x oversampling.
    X2 = 2,
    /// 4x oversampling.
    X4 = 3,
    /// 8x oversampling.
    X8 = 4,
    /// 16x oversampling. Best precision, longest conversion.
    X16 = 5,
}

impl Oversampling {
    /// Decodes a 3-bit register field. Reserved codes (6, 7) behave as 16x on the chip.
    pub fn from_u8(value: u8) -> Self {
        match value & 0x07 {
            0 => Oversampling::Skipped,
            1 => Oversampling::X1,
            2 => Oversampling::X2,
            3 => Oversampling::X4,
            4 => Oversampling::X8,
            _ => Oversampling::X16,
        }
    }
}

/// Grouped oversampling configuration for the three environmental channels.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OversamplingConfig {
    /// Temperature oversampling (`ctrl_meas` bits 7:5).
    pub temp_osrs: Oversampling,
    /// Humidity oversampling (`ctrl_hum` bits 2:0).
    pub hum_osrs: Oversampling,
    /// Pressure oversampling (`ctrl_meas` bits 4:2).
    pub pres_osrs: Oversampling,
}

impl Default for OversamplingConfig {
    fn default() -> Self {
        Self {
            temp_osrs: Oversampling::X2,
            hum_osrs: Oversampling::X2,
            pres_osrs: Oversampling::X16,
        }
    }
}

impl OversamplingConfig {
    /// Value for `ctrl_hum`, bits 2:0.
    pub fn ctrl_hum_bits(&self) -> u8 {
        self.hum_osrs as u8
    }

    /// Value for `ctrl_meas` with the mode bits (1:0) left at sleep.
    pub fn ctrl_meas_bits(&self) -> u8 {
        ((self.temp_osrs as u8) << 5) | ((self.pres_osrs as u8) << 2)
    }

    /// Decodes the configuration from raw `ctrl_hum` and `ctrl_meas` bytes.
    ///
    /// Mode bits and reserved bits are ignored.
    pub fn from_registers(ctrl_hum: u8, ctrl_meas: u8) -> Self {
        Self {
            temp_osrs: Oversampling::from_u8(ctrl_meas >> 5),
            hum_osrs: Oversampling::from_u8(ctrl_hum),
            pres_osrs: Oversampling::from_u8(ctrl_meas >> 2),
        }
    }
}

/// Infinite Impulse Response (IIR) filter coefficient.
///
/// Smooths short-term disturbances in pressure and temperature (slammed doors,
/// drafts). Has no effect on humidity or gas.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IIRFilter {
    /// Filter disabled.
    IIR0 = 0,
    IIR1 = 1,
    #[default]
    IIR3 = 2,
    IIR7 = 3,
    IIR15 = 4,
    IIR31 = 5,
    IIR63 = 6,
    IIR127 = 7,
}

impl IIRFilter {
    /// Value for the `config` register, bits 4:2.
    pub fn config_bits(self) -> u8 {
        (self as u8) << 2
    }

    /// Decodes bits 4:2 of a raw `config` register byte.
    pub fn from_config_bits(value: u8) -> Self {
        match (value >> 2) & 0x07 {
            0 => IIRFilter::IIR0,
            1 => IIRFilter::IIR1,
            2 => IIRFilter::IIR3,
            3 => IIRFilter::IIR7,
            4 => IIRFilter::IIR15,
            5 => IIRFilter::IIR31,
            6 => IIRFilter::IIR63,
            _ => IIRFilter::IIR127,
        }
    }
}

/// Heater step 0 profile for the gas sensor hot plate.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasProfile {
    /// Target hot plate temperature, clamped to 200..=400 °C when applied.
    pub target_temp: Celsius,
    /// Heating duration before the gas conversion, clamped to 0..=4032 ms.
    pub duration: Milliseconds,
}

impl Default for GasProfile {
    fn default() -> Self {
        Self {
            target_temp: Celsius(300),
            duration: Milliseconds(150),
        }
    }
}

/// Bounded polling strategy.
///
/// The driver reads a register up to `attempts` times and waits `interval_us`
/// between reads. Exhausting the budget turns into an error instead of hanging
/// the caller.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of reads. `0` is treated as `1`.
    pub attempts: u32,
    /// Delay between two reads in microseconds.
    pub interval_us: u32,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, interval_us: u32) -> Self {
        Self {
            attempts,
            interval_us,
        }
    }

    pub(crate) fn budget(&self) -> u32 {
        self.attempts.max(1)
    }
}

/// Complete driver configuration.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// 7-bit I2C address (0x77 or 0x76 depending on SDO).
    pub address: u8,
    /// Oversampling for T, P and H.
    pub osrs_config: OversamplingConfig,
    /// IIR filter applied to T and P.
    pub iir_filter: IIRFilter,
    /// Profile applied when the burn-in runs on an unconfigured gas sensor.
    pub gas_profile: GasProfile,
    /// Ambient temperature used for the heater code until a measurement or a
    /// baseline provides a better estimate.
    pub ambient_temp: Temperature,
    /// Wait between two burn-in samples.
    pub burn_in_interval: Milliseconds,
    /// Settle time after the soft reset.
    pub reset_delay: Milliseconds,
    /// Chip identity check.
    pub chip_id_retry: RetryPolicy,
    /// New-data polling after a forced measurement has been triggered.
    pub data_ready_retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: 0x77,
            osrs_config: OversamplingConfig::default(),
            iir_filter: IIRFilter::default(),
            gas_profile: GasProfile::default(),
            ambient_temp: Temperature(2500),
            burn_in_interval: Milliseconds(5000),
            reset_delay: Milliseconds(1000),
            chip_id_retry: RetryPolicy::new(10, 10_000),
            // Heater duration tops out at 4032 ms, so the budget covers ~5 s.
            data_ready_retry: RetryPolicy::new(5000, 1000),
        }
    }
}

/// Convenience builder for a [`Config`].
#[derive(Default)]
pub struct Bme688Builder {
    config: Config,
}

impl Bme688Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the I2C address.
    pub fn address(mut self, address: u8) -> Self {
        self.config.address = address;
        self
    }

    /// Sets the temperature oversampling.
    pub fn temp_oversampling(mut self, os: Oversampling) -> Self {
        self.config.osrs_config.temp_osrs = os;
        self
    }

    /// Sets the humidity oversampling.
    pub fn hum_oversampling(mut self, os: Oversampling) -> Self {
        self.config.osrs_config.hum_osrs = os;
        self
    }

    /// Sets the pressure oversampling.
    pub fn pres_oversampling(mut self, os: Oversampling) -> Self {
        self.config.osrs_config.pres_osrs = os;
        self
    }

    /// Sets the IIR filter coefficient.
    pub fn iir_filter(mut self, filter: IIRFilter) -> Self {
        self.config.iir_filter = filter;
        self
    }

    /// Sets the default heater profile.
    pub fn gas_profile(mut self, profile: GasProfile) -> Self {
        self.config.gas_profile = profile;
        self
    }

    /// Sets the initial ambient temperature estimate for the heater computation.
    pub fn ambient_temp(mut self, temp: Temperature) -> Self {
        self.config.ambient_temp = temp;
        self
    }

    /// Sets the wait between burn-in samples.
    pub fn burn_in_interval(mut self, interval: Milliseconds) -> Self {
        self.config.burn_in_interval = interval;
        self
    }

    /// Sets the settle time after a soft reset.
    pub fn reset_delay(mut self, delay: Milliseconds) -> Self {
        self.config.reset_delay = delay;
        self
    }

    pub fn chip_id_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.chip_id_retry = policy;
        self
    }

    pub fn data_ready_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.data_ready_retry = policy;
        self
    }

    /// Finalizes the builder.
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversampling_registers_round_trip() {
        let config = OversamplingConfig {
            temp_osrs: Oversampling::X4,
            hum_osrs: Oversampling::X1,
            pres_osrs: Oversampling::X16,
        };
        let ctrl_meas = config.ctrl_meas_bits();
        let ctrl_hum = config.ctrl_hum_bits();
        assert_eq!(ctrl_meas, 0b011_101_00);
        assert_eq!(ctrl_hum, 0b001);
        assert_eq!(OversamplingConfig::from_registers(ctrl_hum, ctrl_meas), config);
    }

    #[test]
    fn default_oversampling_matches_reference_bytes() {
        let config = OversamplingConfig::default();
        assert_eq!(config.ctrl_meas_bits(), (0x02 << 5) | (0x05 << 2));
        assert_eq!(config.ctrl_hum_bits(), 0x02);
    }

    #[test]
    fn from_registers_ignores_mode_bits() {
        let config = OversamplingConfig::default();
        let forced = config.ctrl_meas_bits() | 0x01;
        assert_eq!(OversamplingConfig::from_registers(0xF8 | 0x02, forced), config);
    }

    #[test]
    fn iir_filter_round_trip() {
        for filter in [
            IIRFilter::IIR0,
            IIRFilter::IIR1,
            IIRFilter::IIR3,
            IIRFilter::IIR7,
            IIRFilter::IIR15,
            IIRFilter::IIR31,
            IIRFilter::IIR63,
            IIRFilter::IIR127,
        ] {
            assert_eq!(IIRFilter::from_config_bits(filter.config_bits()), filter);
        }
        assert_eq!(IIRFilter::IIR3.config_bits(), 0x08);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = Bme688Builder::new()
            .address(0x76)
            .iir_filter(IIRFilter::IIR0)
            .burn_in_interval(Milliseconds(0))
            .data_ready_retry(RetryPolicy::new(3, 0))
            .build();
        assert_eq!(config.address, 0x76);
        assert_eq!(config.iir_filter, IIRFilter::IIR0);
        assert_eq!(config.burn_in_interval, Milliseconds(0));
        assert_eq!(config.data_ready_retry.budget(), 3);
        assert_eq!(config.gas_profile, GasProfile::default());
    }

    #[test]
    fn zero_attempts_still_reads_once() {
        assert_eq!(RetryPolicy::new(0, 0).budget(), 1);
    }
}

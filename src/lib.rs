#![cfg_attr(not(test), no_std)]

//! # BME688 Environmental Sensor Driver
//!
//! A `no_std` driver for the Bosch BME688 that turns raw ADC counts into
//! calibrated readings and derives an air-quality index and an equivalent CO2
//! estimate from them.
//!
//! ## Features
//! - **Fixed-Point Compensation**: Bit-exact integer formulas, no FPU required
//!   for temperature, pressure, humidity and gas resistance.
//! - **Bounded Polling**: Chip identity and data-ready polling run on an
//!   injectable [`RetryPolicy`] instead of spinning forever.
//! - **Burn-In Baseline**: 60-sample gas baseline plus an ambient temperature
//!   mean persisted through an [`AmbientStore`].
//! - **IAQ and eCO2**: Percent, 0-500 score, text rating and ppm estimate with
//!   humidity/temperature scaling and breath detection.
//!
//! ## Units
//! - **Temperature**: Centigrade (C * 100) -> 2350 = 23.50 °C
//! - **Humidity**: Milli-percent (RH % * 1000), whole-percent precision -> 45000 = 45 %
//! - **Pressure**: Pascal (Pa) -> 101325 = 1013.25 hPa
//! - **Gas Resistance**: Ohms (Ω)

mod air_quality;
mod baseline;
mod calc;
mod settings;

use core::sync::atomic::{AtomicBool, Ordering};
use embedded_hal::{delay::DelayNs, i2c};
use log::{debug, info, warn};

pub use air_quality::{
    estimate_co2, score_air_quality, AirQuality, AirQualityRating, BREATH_HUMIDITY_RISE,
    BREATH_PPM, BREATH_WINDOW_MS, ECO2_BASELINE_PPM, HUMIDITY_BASELINE, HUMIDITY_WEIGHTING,
};
pub use baseline::{
    Baseline, BurnIn, AMBIENT_BASE_OFFSET, AMBIENT_SLOT_SIZE, BURN_IN_SAMPLES,
};
pub use calc::{
    calc_gas, calc_hum, calc_pres, calc_temp, compensate, heater_duration_code,
    heater_resistance_code, HEATER_DURATION_MAX_MS, HEATER_TEMP_MAX, HEATER_TEMP_MIN,
};
pub use settings::{
    Bme688Builder, Config, GasProfile, IIRFilter, Oversampling, OversamplingConfig, RetryPolicy,
};

use baseline::AmbientBuffer;

/// Expected content of the chip identity register.
pub const CHIP_ID: u8 = 0x61;

/// Register addresses and bit values.
pub mod regs {
    pub const ADDR_CHIP_ID: u8 = 0xD0;
    pub const ADDR_RESET: u8 = 0xE0;
    pub const CMD_SOFT_RESET: u8 = 0xB6;

    pub const ADDR_CTRL_GAS_1: u8 = 0x71;
    pub const ADDR_CTRL_HUM: u8 = 0x72;
    pub const ADDR_CTRL_MEAS: u8 = 0x74;
    pub const ADDR_CONFIG: u8 = 0x75;

    pub const ADDR_RES_HEAT_0: u8 = 0x5A;
    pub const ADDR_GAS_WAIT_0: u8 = 0x64;

    pub const ADDR_MEAS_STATUS_0: u8 = 0x1D;

    pub const ADDR_RES_HEAT_VAL: u8 = 0x00;
    pub const ADDR_RES_HEAT_RANGE: u8 = 0x02;

    /// Gas conversion enable in `ctrl_gas_1`.
    ///
    /// The datasheet names bit 4, the part only starts conversions with bit 5.
    pub const RUN_GAS: u8 = 0x20;
    /// Forced mode in `ctrl_meas`, bits 1:0.
    pub const MODE_FORCED: u8 = 0x01;
    pub const MODE_MASK: u8 = 0x03;
}

/// Memory addresses and sizes for calibration data registers.
mod calib_mem {
    pub const ADDR: [u8; 2] = [0x89, 0xE1];
    pub const SIZES: [usize; 2] = [25, 16];
    pub const TOTAL_SIZE: usize = 25 + 16;
}

/// Memory address and size for the measurement data registers (0x1F..=0x2D).
mod raw_data_mem {
    pub const ADDR: u8 = 0x1F;
    pub const SIZE: usize = 15;
}

/// Error types for the BME688 driver.
pub mod error {
    /// Errors that can occur during communication, acquisition or scoring.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Bme688Error<E> {
        /// I2C bus error.
        I2CError(E),
        /// Chip identity register kept returning something other than 0x61.
        InvalidChipId(u8),
        /// New-data bit was not set within the polling budget.
        Timeout,
        /// The ambient-temperature store failed.
        Storage,
        /// Burn-in was cancelled through its token.
        Cancelled,
        /// Scoring was requested before any measurement.
        NoMeasurement,
        /// Scoring was requested before a complete burn-in.
        BaselineIncomplete,
    }

    impl<E: core::fmt::Debug> core::fmt::Display for Bme688Error<E> {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            match self {
                Self::I2CError(e) => write!(f, "i2c error: {e:?}"),
                Self::InvalidChipId(id) => write!(f, "unexpected chip id {id:#04x}"),
                Self::Timeout => f.write_str("measurement did not complete in time"),
                Self::Storage => f.write_str("ambient store failure"),
                Self::Cancelled => f.write_str("burn-in cancelled"),
                Self::NoMeasurement => f.write_str("no measurement taken yet"),
                Self::BaselineIncomplete => f.write_str("baseline burn-in not complete"),
            }
        }
    }

    /// Result type alias for BME688 operations.
    pub type Result<T, E> = core::result::Result<T, Bme688Error<E>>;
}

/// Byte-addressable non-volatile store holding the ambient-temperature slots.
pub trait AmbientStore {
    type Error;

    fn read_byte(&mut self, offset: u16) -> Result<u8, Self::Error>;
    fn write_byte(&mut self, offset: u16, value: u8) -> Result<(), Self::Error>;
}

/// Monotonic millisecond clock used to stamp captures.
pub trait Clock {
    fn now_ms(&mut self) -> u64;
}

/// Cooperative cancellation for the burn-in.
///
/// Checked before every sample, so cancelling takes effect within one
/// burn-in interval.
#[derive(Debug, Default)]
pub struct CancelToken(AtomicBool);

impl CancelToken {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Plate temperature in whole degrees Celsius.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Celsius(pub i32);

/// Duration wrapper for type-safety. Stored in milliseconds.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Milliseconds(pub u32);

/// Factory-fused calibration coefficients read from the sensor.
/// These are unique to every individual chip and required for compensation formulas.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CalibData {
    pub par_h1: u16,
    pub par_h2: u16,
    pub par_h3: i8,
    pub par_h4: i8,
    pub par_h5: i8,
    pub par_h6: i8,
    pub par_h7: i8,
    pub par_g1: i8,
    pub par_g2: i16,
    pub par_g3: u8,
    pub par_t1: i16,
    pub par_t2: i16,
    pub par_t3: i8,
    pub par_p1: u16,
    pub par_p2: i16,
    pub par_p3: i8,
    pub par_p4: i16,
    pub par_p5: i16,
    pub par_p6: i8,
    pub par_p7: i8,
    pub par_p8: i16,
    pub par_p9: i16,
    pub par_p10: i8,
    pub res_heat_range: u8,
    pub res_heat_val: i8,
}

impl CalibData {
    /// Decodes the two calibration blocks (0x89..=0xA1 followed by 0xE1..=0xF0)
    /// plus the heater resistance value and range registers.
    pub fn from_bytes(buffer: &[u8; calib_mem::TOTAL_SIZE], res_heat_val: u8, res_heat_range: u8) -> Self {
        let word = |lsb: usize, msb: usize| (buffer[lsb] as u16) | ((buffer[msb] as u16) << 8);

        CalibData {
            par_t1: word(33, 34) as i16,
            par_t2: word(1, 2) as i16,
            par_t3: buffer[3] as i8,
            par_p1: word(5, 6),
            par_p2: word(7, 8) as i16,
            par_p3: buffer[9] as i8,
            par_p4: word(11, 12) as i16,
            par_p5: word(13, 14) as i16,
            par_p6: buffer[16] as i8,
            par_p7: buffer[15] as i8,
            par_p8: word(19, 20) as i16,
            par_p9: word(21, 22) as i16,
            par_p10: buffer[23] as i8,
            // H1 and H2 share the nibbles of 0xE2.
            par_h1: ((buffer[27] as u16) << 4) | (buffer[26] & 0x0F) as u16,
            par_h2: ((buffer[25] as u16) << 4) | (buffer[26] >> 4) as u16,
            par_h3: buffer[28] as i8,
            par_h4: buffer[29] as i8,
            par_h5: buffer[30] as i8,
            par_h6: buffer[31] as i8,
            par_h7: buffer[32] as i8,
            par_g1: buffer[37] as i8,
            par_g2: word(35, 36) as i16,
            par_g3: buffer[38],
            res_heat_val: res_heat_val as i8,
            res_heat_range: (res_heat_range >> 4) & 0x03,
        }
    }
}

/// Raw ADC output and status bits of one forced-mode cycle.
///
/// All fields come from a single burst read and are replaced together.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RawData {
    pub temp_adc: u32,
    pub press_adc: u32,
    pub hum_adc: u16,
    pub gas_adc: u16,
    /// Gas resistance range, low nibble of `gas_r_lsb`.
    pub gas_range: u8,
    /// Indicates if the gas measurement is valid.
    pub gas_valid_r: bool,
    /// Indicates if the target heater temperature was reached.
    pub heat_stab_r: bool,
    /// Clock reading taken right after the registers were read.
    pub captured_at_ms: u64,
}

impl RawData {
    /// Reconstructs the ADC values from the 0x1F..=0x2D register block.
    fn from_registers(buffer: &[u8; raw_data_mem::SIZE], captured_at_ms: u64) -> Self {
        // 20-bit values, the XLSB register carries them in bits 7:4.
        let press_adc =
            ((buffer[2] as u32) >> 4) | ((buffer[1] as u32) << 4) | ((buffer[0] as u32) << 12);
        let temp_adc =
            ((buffer[5] as u32) >> 4) | ((buffer[4] as u32) << 4) | ((buffer[3] as u32) << 12);
        let hum_adc = ((buffer[7] as u32) | ((buffer[6] as u32) << 8)) as u16;
        let gas_adc = (((buffer[14] as u32) >> 6) | ((buffer[13] as u32) << 2)) as u16;

        Self {
            temp_adc,
            press_adc,
            hum_adc,
            gas_adc,
            gas_range: buffer[14] & 0x0F,
            gas_valid_r: ((buffer[14] >> 5) & 0x1) != 0,
            heat_stab_r: ((buffer[14] >> 4) & 0x1) != 0,
            captured_at_ms,
        }
    }
}

/// Intermediate temperature values used for compensation.
///
/// `temp_fine` feeds the pressure formula of the same cycle only.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CalcTempData {
    pub temp_fine: i32,
    pub temp_comp: i32,
}

/// Represents temperature in Centigrade (degrees Celsius * 100).
///
/// # Example
/// A value of `2350` represents **23.50 °C**.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Temperature(pub i32);

impl Temperature {
    /// Splits the fixed-point value into integral (degrees) and fractional (decimals) parts.
    ///
    /// # Example
    /// ```rust
    /// use bme688_driver::Temperature;
    /// let temp = Temperature(2350);
    /// assert_eq!(temp.split(), (23, 50)); // Represents 23.50 °C
    /// ```
    pub fn split(&self) -> (i32, i32) {
        (self.0 / 100, self.0 % 100)
    }
}

/// Represents relative humidity in milli-percent (percent * 1000).
///
/// The compensation only delivers whole percent, so the last three digits are zero.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Humidity(pub i32);

impl Humidity {
    /// Splits the fixed-point value into integral and fractional parts.
    ///
    /// # Example
    /// ```rust
    /// use bme688_driver::Humidity;
    /// let hum = Humidity(45123);
    /// assert_eq!(hum.split(), (45, 123));
    /// ```
    pub fn split(&self) -> (i32, i32) {
        (self.0 / 1000, self.0 % 1000)
    }

    /// Whole percent.
    pub fn percent(&self) -> i32 {
        self.0 / 1000
    }
}

/// Represents atmospheric pressure in Pascal (Pa).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pressure(pub u32);

impl Pressure {
    /// Converts the raw Pascal value to Hectopascal (hPa) and splits it into parts.
    ///
    /// # Example
    /// ```rust
    /// use bme688_driver::Pressure;
    /// let press = Pressure(101325);
    /// assert_eq!(press.as_hpa(), (1013, 25)); // Represents 1013.25 hPa
    /// ```
    pub fn as_hpa(&self) -> (u32, u32) {
        (self.0 / 100, self.0 % 100)
    }
}

/// Represents gas resistance in Ohms (Ω).
///
/// A higher gas resistance typically indicates cleaner air (fewer VOCs).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Gas(pub u32);

/// Compensated measurement result in physical units.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Measurement {
    /// Temperature data.
    pub temp: Temperature,
    /// Humidity data.
    pub hum: Humidity,
    /// Atmospheric pressure data.
    pub pres: Pressure,
    /// Gas resistance data. Provisional when `heater_stable` is false.
    pub gas: Gas,
    /// Hot plate reached its target before the gas conversion.
    pub heater_stable: bool,
    /// Sensor flagged the gas conversion as valid.
    pub gas_valid: bool,
    /// Capture time from the driver's [`Clock`].
    pub captured_at_ms: u64,
}

/// Decoded `meas_status_0` register.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Status {
    pub new_data: bool,
    pub gas_measuring: bool,
    pub measuring: bool,
    pub gas_index: u8,
}

impl Status {
    pub fn from_bits(status: u8) -> Self {
        Self {
            new_data: (status & (1 << 7)) != 0,
            gas_measuring: (status & (1 << 6)) != 0,
            measuring: (status & (1 << 5)) != 0,
            gas_index: status & 0x0F,
        }
    }
}

/// Heater step 0 values as written to the sensor.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaterSetting {
    /// Target after clamping to 200..=400 °C.
    pub target_temp: Celsius,
    /// Duration after clamping to 0..=4032 ms.
    pub duration: Milliseconds,
    /// Ambient temperature the resistance code was derived from.
    pub ambient_temp: Temperature,
    /// Value written to `res_heat_0`.
    pub res_heat: u8,
    /// Value written to `gas_wait_0`.
    pub gas_wait: u8,
    /// At least one input was out of range and has been clamped.
    pub clamped: bool,
}

/// Acquisition state of the driver.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum State {
    /// Sensor idle. Initial state and the state after configuration.
    #[default]
    Sleep,
    /// Reset issued, registers being programmed.
    Configuring,
    /// Forced mode triggered, waiting for the new-data bit.
    ForcedPending,
    /// Registers of the last cycle have been read and compensated.
    DataReady,
}

/// The main BME688 driver structure.
///
/// Owns the bus, the ambient store and the clock. Delays are borrowed per call.
/// All mutable sensor state lives here, so several sensors can be driven by
/// independent instances.
pub struct Bme688<I2C, S, C> {
    i2c: I2C,
    store: S,
    clock: C,
    config: Config,
    calib_data: Option<CalibData>,
    state: State,
    initialized: bool,
    gas_configured: bool,
    raw_data: Option<RawData>,
    latest: Option<Measurement>,
    previous: Option<Measurement>,
    ambient: AmbientBuffer,
    baseline: Baseline,
    air_quality: Option<AirQuality>,
}

impl<I2C, S, C, E> Bme688<I2C, S, C>
where
    I2C: i2c::I2c<Error = E>,
    S: AmbientStore,
    C: Clock,
{
    /// Creates a new driver instance.
    ///
    /// This does not communicate with the sensor yet.
    pub fn new(i2c: I2C, store: S, clock: C, config: Config) -> Self {
        Self {
            i2c,
            store,
            clock,
            config,
            calib_data: None,
            state: State::Sleep,
            initialized: false,
            gas_configured: false,
            raw_data: None,
            latest: None,
            previous: None,
            ambient: AmbientBuffer::default(),
            baseline: Baseline::default(),
            air_quality: None,
        }
    }

    /// Verifies the chip, soft-resets it, loads the calibration and programs
    /// oversampling, IIR filter and gas enable.
    ///
    /// # Errors
    /// [`error::Bme688Error::InvalidChipId`] or [`error::Bme688Error::I2CError`]
    /// once the chip-id retry budget is spent. Both are fatal.
    pub fn initialize(&mut self, delay: &mut impl DelayNs) -> error::Result<(), E> {
        self.verify_chip_id(delay)?;

        self.state = State::Configuring;
        self.reset(delay)?;

        if self.calib_data.is_none() {
            self.calib_data = Some(self.read_calib_data()?);
        }

        let osrs = self.config.osrs_config;
        self.write_reg(&[regs::ADDR_CTRL_MEAS, 0x00])?;
        self.write_reg(&[regs::ADDR_CTRL_HUM, osrs.ctrl_hum_bits()])?;
        self.write_reg(&[regs::ADDR_CTRL_MEAS, osrs.ctrl_meas_bits()])?;
        self.write_reg(&[regs::ADDR_CONFIG, self.config.iir_filter.config_bits()])?;
        self.write_reg(&[regs::ADDR_CTRL_GAS_1, regs::RUN_GAS])?;

        // The reset wiped the heater registers.
        self.gas_configured = false;
        self.initialized = true;
        self.state = State::Sleep;
        info!("bme688: initialized at {:#04x}", self.config.address);

        Ok(())
    }

    /// Verifies the chip identity and reads the calibration coefficients.
    ///
    /// A no-op once the coefficients are loaded.
    pub fn load_calibration(&mut self, delay: &mut impl DelayNs) -> error::Result<CalibData, E> {
        if let Some(calib) = self.calib_data {
            return Ok(calib);
        }
        self.verify_chip_id(delay)?;
        let calib = self.read_calib_data()?;
        self.calib_data = Some(calib);
        Ok(calib)
    }

    /// Programs heater step 0 and selects it.
    ///
    /// Out-of-range inputs are clamped (200..=400 °C, 0..=4032 ms) and reported
    /// through [`HeaterSetting::clamped`]. The resistance code uses the burn-in
    /// ambient mean if there is one, else the last measured temperature, else
    /// [`Config::ambient_temp`].
    pub fn configure_heater(
        &mut self,
        delay: &mut impl DelayNs,
        target_temp: Celsius,
        duration: Milliseconds,
    ) -> error::Result<HeaterSetting, E> {
        if !self.initialized {
            self.initialize(delay)?;
        }

        let target = target_temp.0.clamp(calc::HEATER_TEMP_MIN, calc::HEATER_TEMP_MAX);
        let duration_ms = duration.0.min(calc::HEATER_DURATION_MAX_MS);
        let clamped = target != target_temp.0 || duration_ms != duration.0;
        if clamped {
            warn!(
                "bme688: heater profile {}°C/{}ms clamped to {}°C/{}ms",
                target_temp.0, duration.0, target, duration_ms
            );
        }

        let ambient_temp = self.heater_ambient();
        let calib = self.load_calibration(delay)?;
        let res_heat = calc::heater_resistance_code(&calib, ambient_temp, target);
        let gas_wait = calc::heater_duration_code(Milliseconds(duration_ms));

        self.write_reg(&[regs::ADDR_RES_HEAT_0, res_heat])?;
        self.write_reg(&[regs::ADDR_GAS_WAIT_0, gas_wait])?;

        // Select heater step 0 and keep the gas enable bit.
        let register = self.read_reg_byte(regs::ADDR_CTRL_GAS_1)?;
        self.write_reg(&[regs::ADDR_CTRL_GAS_1, register & regs::RUN_GAS])?;

        self.gas_configured = true;
        debug!(
            "bme688: heater step 0 res_heat={:#04x} gas_wait={:#04x}",
            res_heat, gas_wait
        );

        Ok(HeaterSetting {
            target_temp: Celsius(target),
            duration: Milliseconds(duration_ms),
            ambient_temp,
            res_heat,
            gas_wait,
            clamped,
        })
    }

    /// Triggers a measurement in forced mode, waits for completion and returns
    /// compensated data.
    ///
    /// Initializes the sensor first if that has not happened yet. A reading
    /// with `heater_stable == false` is still returned; its gas value is
    /// provisional.
    pub fn acquire(&mut self, delay: &mut impl DelayNs) -> error::Result<Measurement, E> {
        if !self.initialized {
            self.initialize(delay)?;
        }
        let calib = self.load_calibration(delay)?;

        self.activate_forced_mode()?;
        self.state = State::ForcedPending;

        if let Err(e) = self.wait_for_new_data(delay) {
            self.state = State::Sleep;
            return Err(e);
        }

        let mut buffer = [0u8; raw_data_mem::SIZE];
        if let Err(e) = self.read_into(raw_data_mem::ADDR, &mut buffer) {
            self.state = State::Sleep;
            return Err(e);
        }
        let raw_data = RawData::from_registers(&buffer, self.clock.now_ms());

        let measurement = calc::compensate(&calib, &raw_data);
        if self.gas_configured && !measurement.heater_stable {
            warn!("bme688: heater not stable, gas reading is provisional");
        }

        // A reading only becomes current once its ambient slot is persisted.
        if let Err(e) = self.record_ambient(measurement.temp) {
            self.state = State::Sleep;
            return Err(e);
        }

        self.raw_data = Some(raw_data);
        self.previous = self.latest.replace(measurement);
        self.state = State::DataReady;

        Ok(measurement)
    }

    /// Runs the 60-sample burn-in and returns the resulting baseline.
    ///
    /// Each iteration reports progress (0..=98, then 100 on completion), takes
    /// a measurement and waits [`Config::burn_in_interval`]. The ambient buffer
    /// is rewound first, so the burn-in also produces a fresh ambient mean.
    /// Configures the default heater profile if the gas sensor was not set up.
    ///
    /// # Errors
    /// [`error::Bme688Error::Cancelled`] if `cancel` fires. On any error the
    /// previous baseline stays in place and the ambient buffer returns to its
    /// state before the burn-in.
    pub fn calibrate_baseline(
        &mut self,
        delay: &mut impl DelayNs,
        mut progress: impl FnMut(u8),
        cancel: &CancelToken,
    ) -> error::Result<Baseline, E> {
        if !self.initialized {
            self.initialize(delay)?;
        }
        if !self.gas_configured {
            let profile = self.config.gas_profile;
            self.configure_heater(delay, profile.target_temp, profile.duration)?;
        }

        let ambient = self.ambient;
        self.ambient.reset();
        info!("bme688: burn-in started");

        let burn_in = match self.sample_burn_in(delay, &mut progress, cancel) {
            Ok(burn_in) => burn_in,
            Err(e) => {
                self.ambient = ambient;
                return Err(e);
            }
        };
        progress(100);

        self.baseline = burn_in.baseline(self.baseline.ambient_temp);
        info!(
            "bme688: baseline gas={} ohm ambient={:?}",
            self.baseline.gas_resistance.0, self.baseline.ambient_temp
        );

        Ok(self.baseline)
    }

    /// Recomputes the ambient mean from the persisted slots, e.g. after a power
    /// cycle, and freezes the buffer so later measurements keep it intact.
    pub fn restore_ambient_temperature(&mut self) -> error::Result<Temperature, E> {
        let mean = baseline::read_mean(&mut self.store).map_err(|_| error::Bme688Error::Storage)?;
        self.ambient.freeze();
        self.baseline.ambient_temp = Some(mean);
        Ok(mean)
    }

    /// Scores the latest measurement against the baseline.
    pub fn score_air_quality(&mut self) -> error::Result<AirQuality, E> {
        let reading = self.latest.ok_or(error::Bme688Error::NoMeasurement)?;
        if !self.baseline.complete {
            return Err(error::Bme688Error::BaselineIncomplete);
        }

        let result = air_quality::score_air_quality(&reading, &self.baseline);
        self.air_quality = Some(result);
        Ok(result)
    }

    /// Estimates eCO2 in ppm from the latest measurement, its IAQ score and the
    /// measurement before it.
    pub fn estimate_co2(&mut self) -> error::Result<u32, E> {
        let result = self.score_air_quality()?;
        let reading = self.latest.ok_or(error::Bme688Error::NoMeasurement)?;

        Ok(air_quality::estimate_co2(
            result.score,
            &reading,
            &self.baseline,
            self.previous.as_ref(),
        ))
    }

    /// Reads the Chip ID from the sensor (expected value: 0x61).
    pub fn read_chip_id(&mut self) -> error::Result<u8, E> {
        self.read_reg_byte(regs::ADDR_CHIP_ID)
    }

    /// Reads and decodes `meas_status_0`.
    pub fn read_status(&mut self) -> error::Result<Status, E> {
        Ok(Status::from_bits(self.read_reg_byte(regs::ADDR_MEAS_STATUS_0)?))
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn calib_data(&self) -> Option<&CalibData> {
        self.calib_data.as_ref()
    }

    pub fn raw_data(&self) -> Option<&RawData> {
        self.raw_data.as_ref()
    }

    pub fn latest_measurement(&self) -> Option<&Measurement> {
        self.latest.as_ref()
    }

    pub fn previous_measurement(&self) -> Option<&Measurement> {
        self.previous.as_ref()
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn air_quality(&self) -> Option<&AirQuality> {
        self.air_quality.as_ref()
    }

    /// Releases the owned bus, store and clock.
    pub fn release(self) -> (I2C, S, C) {
        (self.i2c, self.store, self.clock)
    }

    fn sample_burn_in(
        &mut self,
        delay: &mut impl DelayNs,
        progress: &mut impl FnMut(u8),
        cancel: &CancelToken,
    ) -> error::Result<BurnIn, E> {
        let mut burn_in = BurnIn::new();

        while !burn_in.is_complete() {
            if cancel.is_cancelled() {
                warn!("bme688: burn-in cancelled after {} samples", burn_in.count());
                return Err(error::Bme688Error::Cancelled);
            }
            progress(burn_in.progress());

            let measurement = self.acquire(delay)?;
            burn_in.push(measurement.gas);
            delay.delay_ms(self.config.burn_in_interval.0);
        }

        Ok(burn_in)
    }

    fn heater_ambient(&self) -> Temperature {
        self.baseline
            .ambient_temp
            .or(self.latest.map(|m| m.temp))
            .unwrap_or(self.config.ambient_temp)
    }

    fn record_ambient(&mut self, temp: Temperature) -> error::Result<(), E> {
        let mean = self.ambient.record(&mut self.store, temp).map_err(|_| {
            warn!("bme688: ambient store write failed");
            error::Bme688Error::Storage
        })?;

        if let Some(mean) = mean {
            info!("bme688: ambient temperature mean {}", mean.0);
            self.baseline.ambient_temp = Some(mean);
        }
        Ok(())
    }

    /// Polls the chip identity register within the configured retry budget.
    fn verify_chip_id(&mut self, delay: &mut impl DelayNs) -> error::Result<(), E> {
        let policy = self.config.chip_id_retry;
        let mut last_error = error::Bme688Error::InvalidChipId(0);

        for attempt in 0..policy.budget() {
            match self.read_chip_id() {
                Ok(CHIP_ID) => return Ok(()),
                Ok(id) => last_error = error::Bme688Error::InvalidChipId(id),
                Err(e) => last_error = e,
            }
            if attempt + 1 < policy.budget() {
                delay.delay_us(policy.interval_us);
            }
        }

        warn!("bme688: chip id check failed after {} attempts", policy.budget());
        Err(last_error)
    }

    /// Polls the new-data bit within the configured retry budget.
    fn wait_for_new_data(&mut self, delay: &mut impl DelayNs) -> error::Result<(), E> {
        let policy = self.config.data_ready_retry;

        for attempt in 0..policy.budget() {
            if self.read_status()?.new_data {
                return Ok(());
            }
            if attempt + 1 < policy.budget() {
                delay.delay_us(policy.interval_us);
            }
        }

        warn!("bme688: no new data after {} polls", policy.budget());
        Err(error::Bme688Error::Timeout)
    }

    /// Performs a soft-reset of the sensor.
    ///
    /// This resets all internal registers to their default values.
    fn reset(&mut self, delay: &mut impl DelayNs) -> error::Result<(), E> {
        self.write_reg(&[regs::ADDR_RESET, regs::CMD_SOFT_RESET])?;
        delay.delay_ms(self.config.reset_delay.0);
        debug!("bme688: soft reset");
        Ok(())
    }

    /// Reads factory-fused calibration coefficients from the sensor's ROM.
    ///
    /// The coefficients live in two non-contiguous blocks plus two heater registers.
    fn read_calib_data(&mut self) -> error::Result<CalibData, E> {
        let mut buffer = [0u8; calib_mem::TOTAL_SIZE];

        self.read_into(calib_mem::ADDR[0], &mut buffer[0..calib_mem::SIZES[0]])?;
        self.read_into(calib_mem::ADDR[1], &mut buffer[calib_mem::SIZES[0]..])?;

        let res_heat_val = self.read_reg_byte(regs::ADDR_RES_HEAT_VAL)?;
        let res_heat_range = self.read_reg_byte(regs::ADDR_RES_HEAT_RANGE)?;

        debug!("bme688: calibration loaded");
        Ok(CalibData::from_bytes(&buffer, res_heat_val, res_heat_range))
    }

    /// Sets forced mode, keeping the oversampling bits in `ctrl_meas`.
    ///
    /// The sensor returns to sleep mode automatically after the measurement.
    fn activate_forced_mode(&mut self) -> error::Result<(), E> {
        let register = self.read_reg_byte(regs::ADDR_CTRL_MEAS)?;
        self.write_reg(&[
            regs::ADDR_CTRL_MEAS,
            (register & !regs::MODE_MASK) | regs::MODE_FORCED,
        ])
    }

    /// Reads data from a starting register address into a provided buffer.
    fn read_into(&mut self, reg_address: u8, buffer: &mut [u8]) -> error::Result<(), E> {
        self.i2c
            .write_read(self.config.address, &[reg_address], buffer)
            .map_err(error::Bme688Error::I2CError)
    }

    /// Reads a single byte from a specific register address.
    fn read_reg_byte(&mut self, reg_address: u8) -> error::Result<u8, E> {
        let mut buffer = [0];
        self.read_into(reg_address, &mut buffer)?;
        Ok(buffer[0])
    }

    /// Writes a byte slice (typically `[Register, Value]`) to the sensor.
    fn write_reg(&mut self, data: &[u8]) -> error::Result<(), E> {
        self.i2c
            .write(self.config.address, data)
            .map_err(error::Bme688Error::I2CError)
    }
}

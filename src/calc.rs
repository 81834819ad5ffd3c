//! Fixed-point compensation formulas and heater register encoders.
//!
//! Everything here is a pure function of the raw counts and the factory
//! calibration. The shifts and truncating divisions mirror the sensor's own
//! integer pipeline and must not be "simplified". Intermediates that can leave
//! the 32-bit range on extreme inputs are carried in `i64`; for every input the
//! 32-bit pipeline handles, the results are identical.

use crate::{
    CalcTempData, CalibData, Gas, Humidity, Measurement, Milliseconds, Pressure, RawData,
    Temperature,
};

/// Lowest accepted hot plate target in °C.
pub const HEATER_TEMP_MIN: i32 = 200;
/// Highest accepted hot plate target in °C.
pub const HEATER_TEMP_MAX: i32 = 400;
/// Longest heating duration the `gas_wait` register can express.
pub const HEATER_DURATION_MAX_MS: u32 = 4032;

/// Converts the raw temperature count into centi-degrees and the fine temperature.
///
/// `temp_fine` is only meaningful for the pressure compensation of the same cycle.
pub fn calc_temp(calib: &CalibData, temp_adc: u32) -> CalcTempData {
    let var1 = ((temp_adc as i64) >> 3) - ((calib.par_t1 as i64) << 1);
    let var2 = (var1 * calib.par_t2 as i64) >> 11;
    let var3 = ((((var1 >> 1) * (var1 >> 1)) >> 12) * ((calib.par_t3 as i64) << 4)) >> 14;
    let temp_fine = var2 + var3;

    CalcTempData {
        temp_fine: temp_fine as i32,
        temp_comp: (((temp_fine * 5) + 128) >> 8) as i32,
    }
}

/// Converts the raw pressure count into Pascal.
///
/// Requires `t_fine` from [`calc_temp`] of the same measurement cycle.
pub fn calc_pres(calib: &CalibData, t_fine: i32, press_adc: u32) -> u32 {
    let t_fine = t_fine as i64;
    let mut var1 = (t_fine >> 1) - 64_000;
    let mut var2 = ((((var1 >> 2) * (var1 >> 2)) >> 11) * calib.par_p6 as i64) >> 2;
    var2 += (var1 * calib.par_p5 as i64) << 1;
    var2 = (var2 >> 2) + ((calib.par_p4 as i64) << 16);
    var1 = (((((var1 >> 2) * (var1 >> 2)) >> 13) * ((calib.par_p3 as i64) << 5)) >> 3)
        + ((calib.par_p2 as i64 * var1) >> 1);
    var1 >>= 18;
    var1 = ((32768 + var1) * calib.par_p1 as i64) >> 15;

    if var1 == 0 {
        // Only reachable with a corrupt calibration block.
        return 0;
    }

    let mut press_comp = 1_048_576 - press_adc as i64;
    press_comp = (press_comp - (var2 >> 12)) * 3125;

    // Two division orders keep the 32-bit pipeline from overflowing.
    if press_comp >= (1 << 30) {
        press_comp = (press_comp / var1) << 1;
    } else {
        press_comp = (press_comp << 1) / var1;
    }

    let var1 = (calib.par_p9 as i64 * (((press_comp >> 3) * (press_comp >> 3)) >> 13)) >> 12;
    let var2 = ((press_comp >> 2) * calib.par_p8 as i64) >> 13;
    let var3 =
        ((press_comp >> 8) * (press_comp >> 8) * (press_comp >> 8) * calib.par_p10 as i64) >> 17;

    press_comp += (var1 + var2 + var3 + ((calib.par_p7 as i64) << 7)) >> 4;
    press_comp.max(0) as u32
}

/// Converts the raw humidity count into milli-percent.
///
/// `temp_comp` is the compensated temperature in centi-degrees, not the fine
/// temperature. The result keeps whole-percent precision only: the milli-percent
/// value is truncated to a multiple of 1000.
pub fn calc_hum(calib: &CalibData, temp_comp: i32, hum_adc: u16) -> i32 {
    let temp = temp_comp as i64;
    let var1 = hum_adc as i64
        - ((calib.par_h1 as i64) << 4)
        - (((temp * calib.par_h3 as i64) / 100) >> 1);
    let var2 = (calib.par_h2 as i64
        * (((temp * calib.par_h4 as i64) / 100)
            + (((temp * ((temp * calib.par_h5 as i64) / 100)) >> 6) / 100)
            + (1 << 14)))
        >> 10;
    let var3 = var1 * var2;
    let var4 = (((calib.par_h6 as i64) << 7) + ((temp * calib.par_h7 as i64) / 100)) >> 4;
    let var5 = ((var3 >> 14) * (var3 >> 14)) >> 10;
    let var6 = (var4 * var5) >> 1;

    let milli = (((var3 + var6) >> 10) * 1000) >> 12;
    ((milli / 1000) * 1000) as i32
}

/// Converts the 10-bit gas count and its range into Ohms.
pub fn calc_gas(gas_adc: u16, gas_range: u8) -> u32 {
    let var1 = 262_144i64 >> (gas_range & 0x0F);
    let var2 = 4096 + 3 * (gas_adc as i64 - 512);

    (((10_000 * var1) / var2) * 100) as u32
}

/// Runs the full compensation chain for one raw sample.
///
/// Humidity uses the compensated temperature and pressure uses the fine
/// temperature of this very sample, so the cycle never leaks into the next one.
pub fn compensate(calib: &CalibData, raw: &RawData) -> Measurement {
    let temp = calc_temp(calib, raw.temp_adc);

    Measurement {
        temp: Temperature(temp.temp_comp),
        hum: Humidity(calc_hum(calib, temp.temp_comp, raw.hum_adc)),
        pres: Pressure(calc_pres(calib, temp.temp_fine, raw.press_adc)),
        gas: Gas(calc_gas(raw.gas_adc, raw.gas_range)),
        heater_stable: raw.heat_stab_r,
        gas_valid: raw.gas_valid_r,
        captured_at_ms: raw.captured_at_ms,
    }
}

/// Computes the `res_heat_0` code for a hot plate target.
///
/// `ambient` is the ambient temperature in centi-degrees and `target_temp` the
/// plate target in whole degrees. Clamping the target is the caller's job.
pub fn heater_resistance_code(calib: &CalibData, ambient: Temperature, target_temp: i32) -> u8 {
    let var1 = ((ambient.0 * calib.par_g3 as i32) / 1000) << 8;
    let var2 = (calib.par_g1 as i32 + 784)
        * (((((calib.par_g2 as i32 + 154_009) * target_temp * 5) / 100) + 3_276_800) / 10);
    let var3 = var1 + (var2 >> 1);
    let var4 = var3 / (calib.res_heat_range as i32 + 4);
    let var5 = 131 * calib.res_heat_val as i32 + 65_536;

    let res_heat_x100 = ((var4 / var5) - 250) * 34;
    ((res_heat_x100 + 50) / 100).clamp(0, u8::MAX as i32) as u8
}

/// Encodes a heating duration into the `gas_wait_0` format.
///
/// Bits 7:6 hold a multiplier (1, 4, 16, 64) and bits 5:0 the base count.
/// Durations are clamped to 4032 ms, which maps to the saturated code `0xFF`.
pub fn heater_duration_code(duration: Milliseconds) -> u8 {
    let mut remainder = duration.0.min(HEATER_DURATION_MAX_MS);
    if remainder >= HEATER_DURATION_MAX_MS {
        return 0xFF;
    }

    let mut factor = 0u8;
    while remainder > 63 {
        remainder /= 4;
        factor += 1;
    }

    remainder as u8 + factor * 64
}

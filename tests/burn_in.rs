mod common;

use std::cell::RefCell;

use bme688_driver::error::Bme688Error;
use bme688_driver::{
    calc_gas, AirQualityRating, Bme688, CancelToken, Config, Gas, Temperature, BREATH_PPM,
    BURN_IN_SAMPLES,
};
use common::*;

fn sensor() -> (
    Bme688<FakeSensor, MemStore, FakeClock>,
    FakeSensor,
    FakeDelay,
    SimTime,
) {
    let time = SimTime::default();
    let fake = FakeSensor::new();
    let sensor = Bme688::new(
        fake.clone(),
        MemStore::new(),
        FakeClock(time.clone()),
        Config::default(),
    );
    (sensor, fake, FakeDelay(time.clone()), time)
}

/// Gas ADC of the n-th burn-in sample.
fn gas_adc(sample: u32) -> u16 {
    400 + (sample % 8) as u16
}

#[test]
fn burn_in_averages_sixty_samples() {
    let (mut sensor, fake, mut delay, _) = sensor();
    let progress = RefCell::new(Vec::new());
    let cancel = CancelToken::new();

    let feeder = fake.clone();
    let baseline = sensor
        .calibrate_baseline(
            &mut delay,
            |percent| {
                let mut progress = progress.borrow_mut();
                feeder.set_gas_adc(gas_adc(progress.len() as u32));
                progress.push(percent);
            },
            &cancel,
        )
        .unwrap();

    let expected: u64 = (0..BURN_IN_SAMPLES as u32)
        .map(|i| calc_gas(gas_adc(i), 5) as u64)
        .sum::<u64>()
        / BURN_IN_SAMPLES as u64;

    assert!(baseline.complete);
    assert_eq!(baseline.sample_count, BURN_IN_SAMPLES);
    assert_eq!(baseline.gas_resistance, Gas(expected as u32));
    assert_eq!(baseline.ambient_temp, Some(Temperature(2545)));
    assert_eq!(sensor.baseline(), &baseline);
    assert_eq!(fake.forced_count.get(), BURN_IN_SAMPLES as u32);

    let progress = progress.into_inner();
    assert_eq!(progress.len(), BURN_IN_SAMPLES as usize + 1);
    assert_eq!(progress[0], 0);
    assert_eq!(progress[30], 50);
    assert_eq!(progress[59], 98);
    assert_eq!(progress[60], 100);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn burn_in_configures_default_heater() {
    let (mut sensor, fake, mut delay, _) = sensor();

    sensor
        .calibrate_baseline(&mut delay, |_| {}, &CancelToken::new())
        .unwrap();

    let regs = fake.regs.borrow();
    assert_eq!(regs[0x5A], 113);
    assert_eq!(regs[0x64], 101);
    assert_eq!(regs[0x71], 0x20);
}

#[test]
fn burn_in_takes_five_seconds_per_sample() {
    let (mut sensor, _, mut delay, time) = sensor();

    sensor
        .calibrate_baseline(&mut delay, |_| {}, &CancelToken::new())
        .unwrap();

    // Reset settle time plus one interval per sample.
    assert_eq!(time.get() / 1_000_000, 1000 + 60 * 5000);
    assert_eq!(sensor.latest_measurement().unwrap().captured_at_ms, 1000 + 59 * 5000);
}

#[test]
fn cancelled_burn_in_keeps_previous_baseline() {
    let (mut sensor, fake, mut delay, _) = sensor();
    let cancel = CancelToken::new();
    let mut calls = 0;

    let result = sensor.calibrate_baseline(
        &mut delay,
        |_| {
            calls += 1;
            if calls == 3 {
                cancel.cancel();
            }
        },
        &cancel,
    );

    assert_eq!(result, Err(Bme688Error::Cancelled));
    assert_eq!(fake.forced_count.get(), 3);
    assert!(!sensor.baseline().complete);
    assert_eq!(sensor.score_air_quality(), Err(Bme688Error::BaselineIncomplete));
}

#[test]
fn cancelled_burn_in_keeps_ambient_buffer_frozen() {
    let (mut sensor, fake, mut delay, _) = sensor();
    sensor
        .calibrate_baseline(&mut delay, |_| {}, &CancelToken::new())
        .unwrap();
    let baseline = *sensor.baseline();
    assert_eq!(baseline.ambient_temp, Some(Temperature(2545)));

    fake.regs.borrow_mut()[0x22] = 0x7F;
    let cancel = CancelToken::new();
    let mut calls = 0;
    let result = sensor.calibrate_baseline(
        &mut delay,
        |_| {
            calls += 1;
            if calls == 3 {
                cancel.cancel();
            }
        },
        &cancel,
    );
    assert_eq!(result, Err(Bme688Error::Cancelled));

    for _ in 0..BURN_IN_SAMPLES {
        sensor.acquire(&mut delay).unwrap();
    }
    assert_eq!(sensor.baseline(), &baseline);
}

#[test]
fn ambient_buffer_is_written_once() {
    let (mut sensor, fake, mut delay, _) = sensor();

    sensor
        .calibrate_baseline(&mut delay, |_| {}, &CancelToken::new())
        .unwrap();

    // Warmer samples after the buffer froze must not shift the mean.
    {
        let mut regs = fake.regs.borrow_mut();
        regs[0x22] = 0x7F;
    }
    sensor.acquire(&mut delay).unwrap();
    assert_eq!(sensor.baseline().ambient_temp, Some(Temperature(2545)));

    let (_, store, clock) = sensor.release();
    let mut restored = Bme688::new(FakeSensor::new(), store, clock, Config::default());
    assert_eq!(restored.restore_ambient_temperature(), Ok(Temperature(2545)));
    assert_eq!(restored.baseline().ambient_temp, Some(Temperature(2545)));
}

#[test]
fn scoring_after_burn_in() {
    let (mut sensor, fake, mut delay, _) = sensor();
    fake.set_gas_adc(400);

    sensor
        .calibrate_baseline(&mut delay, |_| {}, &CancelToken::new())
        .unwrap();

    // Same gas as the baseline, 55 %rH: 18.75 + 70.
    let quality = sensor.score_air_quality().unwrap();
    assert_eq!(quality.percent, 88);
    assert_eq!(quality.score, 60);
    assert_eq!(quality.rating, AirQualityRating::Good);
    assert_eq!(sensor.air_quality(), Some(&quality));
}

#[test]
fn breath_adds_flat_offset() {
    let (mut sensor, fake, mut delay, _) = sensor();
    sensor
        .calibrate_baseline(&mut delay, |_| {}, &CancelToken::new())
        .unwrap();

    let before = sensor.acquire(&mut delay).unwrap();
    let quiet = sensor.estimate_co2().unwrap();

    // 61 %rH, captured without any delay in between.
    fake.set_hum_adc(24_000);
    let after = sensor.acquire(&mut delay).unwrap();
    assert!(after.hum.percent() - before.hum.percent() >= 3);
    assert_eq!(after.captured_at_ms, before.captured_at_ms);
    assert_eq!(sensor.previous_measurement(), Some(&before));

    let score = sensor.score_air_quality().unwrap().score;
    let unadjusted = bme688_driver::estimate_co2(score, &after, sensor.baseline(), None);
    assert_eq!(sensor.estimate_co2().unwrap(), unadjusted + BREATH_PPM);
    assert!(quiet < unadjusted + BREATH_PPM);
}

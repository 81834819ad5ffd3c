//! Burn-in sampling and the persisted ambient-temperature buffer.
//!
//! The averaging here knows nothing about the bus. The driver feeds it one
//! sample per forced measurement and owns the timing.

use crate::{AmbientStore, Gas, Temperature};

/// Number of samples taken during the burn-in, and number of ambient slots.
pub const BURN_IN_SAMPLES: u16 = 60;

/// Offset of the first ambient-temperature slot in the store.
pub const AMBIENT_BASE_OFFSET: u16 = 13 * 128;

/// Bytes per ambient slot (big-endian `i16`, centi-degrees).
pub const AMBIENT_SLOT_SIZE: u16 = 2;

/// Reference values the air-quality scoring compares against.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Baseline {
    /// Mean gas resistance over the burn-in.
    pub gas_resistance: Gas,
    /// Mean of the 60 persisted ambient samples, once the buffer has been filled.
    pub ambient_temp: Option<Temperature>,
    /// Gas samples accumulated so far.
    pub sample_count: u16,
    /// Set once all burn-in samples have been accumulated.
    pub complete: bool,
}

/// Running sum of burn-in gas readings.
#[derive(Debug, Clone, Copy, Default)]
pub struct BurnIn {
    sum: u64,
    count: u16,
}

impl BurnIn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one gas reading. Readings past the sample limit are ignored.
    pub fn push(&mut self, gas: Gas) {
        if self.is_complete() {
            return;
        }
        self.sum += gas.0 as u64;
        self.count += 1;
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn is_complete(&self) -> bool {
        self.count >= BURN_IN_SAMPLES
    }

    /// Percentage of the burn-in done before sample `count + 1`, rounded half up.
    pub fn progress(&self) -> u8 {
        ((self.count as u32 * 100 + BURN_IN_SAMPLES as u32 / 2) / BURN_IN_SAMPLES as u32) as u8
    }

    /// Truncated mean of all readings, available once the burn-in is complete.
    pub fn mean(&self) -> Option<Gas> {
        if !self.is_complete() {
            return None;
        }
        Some(Gas((self.sum / self.count as u64) as u32))
    }

    /// Baseline snapshot with the given ambient mean.
    pub fn baseline(&self, ambient_temp: Option<Temperature>) -> Baseline {
        Baseline {
            gas_resistance: self.mean().unwrap_or_default(),
            ambient_temp,
            sample_count: self.count,
            complete: self.is_complete(),
        }
    }
}

/// Write cursor over the ambient-temperature slots.
///
/// Slots are filled once, in order. After the last one is written the buffer is
/// frozen and further samples are dropped until [`AmbientBuffer::reset`].
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AmbientBuffer {
    position: u16,
    frozen: bool,
}

impl AmbientBuffer {
    pub(crate) fn reset(&mut self) {
        self.position = 0;
        self.frozen = false;
    }

    /// Stops recording, e.g. after the slots were restored from the store.
    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    #[cfg(test)]
    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Persists one sample. Returns the mean of all slots when this sample
    /// filled the buffer.
    pub(crate) fn record<S: AmbientStore>(
        &mut self,
        store: &mut S,
        temp: Temperature,
    ) -> Result<Option<Temperature>, S::Error> {
        if self.frozen {
            return Ok(None);
        }

        write_slot(store, self.position, temp)?;
        self.position += 1;

        if self.position < BURN_IN_SAMPLES {
            return Ok(None);
        }

        self.frozen = true;
        read_mean(store).map(Some)
    }
}

fn slot_offset(slot: u16) -> u16 {
    AMBIENT_BASE_OFFSET + slot * AMBIENT_SLOT_SIZE
}

fn write_slot<S: AmbientStore>(store: &mut S, slot: u16, temp: Temperature) -> Result<(), S::Error> {
    let [high, low] = (temp.0 as i16).to_be_bytes();
    let offset = slot_offset(slot);
    store.write_byte(offset, high)?;
    store.write_byte(offset + 1, low)
}

fn read_slot<S: AmbientStore>(store: &mut S, slot: u16) -> Result<Temperature, S::Error> {
    let offset = slot_offset(slot);
    let high = store.read_byte(offset)?;
    let low = store.read_byte(offset + 1)?;
    Ok(Temperature(i16::from_be_bytes([high, low]) as i32))
}

/// Truncated mean of all persisted ambient slots.
pub(crate) fn read_mean<S: AmbientStore>(store: &mut S) -> Result<Temperature, S::Error> {
    let mut total: i32 = 0;
    for slot in 0..BURN_IN_SAMPLES {
        total += read_slot(store, slot)?.0;
    }
    Ok(Temperature(total / BURN_IN_SAMPLES as i32))
}

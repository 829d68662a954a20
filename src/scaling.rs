//! Fixed-point scaling between physical units and raw register words.
//!
//! The eTM-xxxxP stores every analogue quantity as an unsigned integer in a fixed
//! decimal unit: centivolts, milliamps and milliwatts. Power is wider than a
//! single register and is split across two, high word first.
//!
//! Decoding follows the device convention of only dividing positive raw values:
//! a raw `0` decodes to exactly `0.0`.

/// Decimal scale of one register unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    /// Raw units per physical unit. E.g. `100` for centivolts.
    pub factor: u32,
}

/// Volts <-> centivolts.
pub const VOLTAGE: Scale = Scale::new(100);
/// Amps <-> milliamps.
pub const CURRENT: Scale = Scale::new(1000);
/// Watts <-> milliwatts.
pub const POWER: Scale = Scale::new(1000);

impl Scale {
    pub const fn new(factor: u32) -> Self {
        Self { factor }
    }

    /// Physical value to raw units, rounded to the nearest unit.
    ///
    /// Values outside the representable range saturate; callers validate first.
    #[inline]
    pub fn encode_u32(&self, value: f64) -> u32 {
        (value * self.factor as f64).round() as u32
    }

    /// Physical value to a single register word. Saturates at `u16::MAX`.
    #[inline]
    pub fn encode(&self, value: f64) -> u16 {
        (value * self.factor as f64).round() as u16
    }

    /// Raw units to a physical value.
    #[inline]
    pub fn decode_u32(&self, raw: u32) -> f64 {
        if raw > 0 {
            raw as f64 / self.factor as f64
        } else {
            0.0
        }
    }

    /// Single register word to a physical value.
    #[inline]
    pub fn decode(&self, raw: u16) -> f64 {
        self.decode_u32(raw as u32)
    }
}

/// A 32-bit value as the two registers the device stores it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitWord {
    /// Written to, and read from, the lower address.
    pub hi: u16,
    pub lo: u16,
}

impl SplitWord {
    pub const fn from_u32(raw: u32) -> Self {
        Self {
            hi: ((raw >> 16) & 0xFFFF) as u16,
            lo: (raw & 0xFFFF) as u16,
        }
    }

    pub const fn to_u32(self) -> u32 {
        ((self.hi as u32) << 16) | self.lo as u32
    }

    /// Build from registers in wire order (`[hi, lo]`).
    pub const fn from_registers(registers: [u16; 2]) -> Self {
        Self {
            hi: registers[0],
            lo: registers[1],
        }
    }
}

pub fn volts_to_raw(volts: f64) -> u16 {
    VOLTAGE.encode(volts)
}

pub fn raw_to_volts(raw: u16) -> f64 {
    VOLTAGE.decode(raw)
}

pub fn amps_to_raw(amps: f64) -> u16 {
    CURRENT.encode(amps)
}

pub fn raw_to_amps(raw: u16) -> f64 {
    CURRENT.decode(raw)
}

/// Watts to the high/low register pair.
pub fn watts_to_raw(watts: f64) -> SplitWord {
    SplitWord::from_u32(POWER.encode_u32(watts))
}

pub fn raw_to_watts(word: SplitWord) -> f64 {
    POWER.decode_u32(word.to_u32())
}

//! This module is used to define the registers on the eTM-xxxxP PSUs.
//!
//! Register map as documented at <https://sigrok.org/wiki/ETommens_eTM-xxxxP_Series#Protocol>.

use modular_bitfield::prelude::*;
use strum_macros::EnumIter;

/// Every attribute the controller reads or writes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
pub enum PsuRegister {
    /// __R/W__ - Output switch.
    /// * `0` - Off.
    /// * `1` - On.
    OutputState,
    /// __R__ - Protection status. See [`ProtectionFlags`].
    ProtectionState,
    /// __R__ - Model identifier.
    ModelId,
    /// __R__ - Measured output voltage, centivolts. Drops to 0 when the output is off.
    OutputVoltage,
    /// __R__ - Measured output current, milliamps.
    OutputCurrent,
    /// __R__ - Measured output power, milliwatts, high word first.
    OutputPower,
    /// __R/W__ - Over-voltage protection level, centivolts.
    OverVoltageProtection,
    /// __R/W__ - Over-current protection level, milliamps.
    OverCurrentProtection,
    /// __R/W__ - Over-power protection level, milliwatts, high word first.
    OverPowerProtection,
    /// __R/W__ - Target output voltage, centivolts. E.g. 5.0V => `500`.
    TargetVoltage,
    /// __R/W__ - Output current limit, milliamps. E.g. 1.5A => `1500`.
    CurrentLimit,
    /// __R/W__ - Key press beep.
    /// * `0` - Disabled.
    /// * `1` - Enabled.
    Buzzer,
}

/// Access mode of a register as enforced by the device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub const fn is_readable(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub const fn is_writable(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// Where and how wide an attribute lives on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegisterDescriptor {
    pub name: &'static str,
    /// Address of the first (for split words, the high) register.
    pub address: u16,
    /// `1` for plain words, `2` for 32-bit values split high/low.
    pub register_count: u16,
    pub access: Access,
}

impl RegisterDescriptor {
    const fn new(name: &'static str, address: u16, register_count: u16, access: Access) -> Self {
        Self {
            name,
            address,
            register_count,
            access,
        }
    }

    /// Address of the low word of a split register, or the register itself for plain words.
    pub const fn last_address(&self) -> u16 {
        self.address + self.register_count - 1
    }
}

/// The full eTM-xxxxP register map, in [`PsuRegister`] declaration order.
pub const REGISTER_MAP: [RegisterDescriptor; 12] = [
    RegisterDescriptor::new("output state", 0x0001, 1, Access::ReadWrite),
    RegisterDescriptor::new("protection state", 0x0002, 1, Access::Read),
    RegisterDescriptor::new("model id", 0x0004, 1, Access::Read),
    RegisterDescriptor::new("output voltage", 0x0010, 1, Access::Read),
    RegisterDescriptor::new("output current", 0x0011, 1, Access::Read),
    RegisterDescriptor::new("output power", 0x0012, 2, Access::Read),
    RegisterDescriptor::new("over-voltage protection", 0x0020, 1, Access::ReadWrite),
    RegisterDescriptor::new("over-current protection", 0x0021, 1, Access::ReadWrite),
    RegisterDescriptor::new("over-power protection", 0x0022, 2, Access::ReadWrite),
    RegisterDescriptor::new("target voltage", 0x0030, 1, Access::ReadWrite),
    RegisterDescriptor::new("current limit", 0x0031, 1, Access::ReadWrite),
    RegisterDescriptor::new("buzzer", 0x8804, 1, Access::ReadWrite),
];

/// Look up the descriptor of an attribute.
pub const fn descriptor_for(register: PsuRegister) -> RegisterDescriptor {
    REGISTER_MAP[register as usize]
}

impl PsuRegister {
    pub const fn descriptor(self) -> RegisterDescriptor {
        descriptor_for(self)
    }

    pub const fn address(self) -> u16 {
        self.descriptor().address
    }

    /// Number of registers covered by a contiguous read from `first` through `last`.
    pub const fn span(first: PsuRegister, last: PsuRegister) -> u16 {
        last.descriptor().last_address() - first.address() + 1
    }
}

impl From<PsuRegister> for u16 {
    fn from(value: PsuRegister) -> Self {
        value.address()
    }
}

/// Used to be less ambiguous about whether something is on or off.
#[repr(u16)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum State {
    /// Disabled.
    #[default]
    Off = 0x00,
    /// Enabled.
    On = 0x01,
}

impl From<State> for bool {
    fn from(value: State) -> Self {
        match value {
            State::Off => false,
            State::On => true,
        }
    }
}

impl From<bool> for State {
    fn from(value: bool) -> Self {
        match value {
            true => State::On,
            false => State::Off,
        }
    }
}

impl From<State> for u16 {
    fn from(value: State) -> Self {
        value as u16
    }
}

/// Decoded "protection status" register. A set bit means that protection has tripped.
#[bitfield(bits = 16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionFlags {
    /// OVP, over-voltage protection.
    pub over_voltage: bool,
    /// OCP, over-current protection.
    pub over_current: bool,
    /// OPP, over-power protection.
    pub over_power: bool,
    /// OTP, over-temperature protection.
    pub over_temperature: bool,
    /// SCP, short-circuit protection.
    pub short_circuit: bool,
    #[skip]
    __: B11,
}

impl ProtectionFlags {
    pub fn from_raw(raw: u16) -> Self {
        Self::from_bytes(raw.to_le_bytes())
    }

    /// True when any protection has tripped.
    pub fn any(&self) -> bool {
        self.over_voltage()
            || self.over_current()
            || self.over_power()
            || self.over_temperature()
            || self.short_circuit()
    }
}

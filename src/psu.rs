use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    config::PsuConfig,
    error::{Error, LinkError, Result},
    limits,
    register::{ProtectionFlags, PsuRegister, State},
    scaling::{
        SplitWord, amps_to_raw, raw_to_amps, raw_to_volts, raw_to_watts, volts_to_raw,
        watts_to_raw,
    },
    transport::{BoxedTransport, ConnectionTarget, Connector, SystemConnector},
};

/// Modbus unit id the PSU ships with.
pub const DEFAULT_UNIT_ID: u8 = 1;

/// Unit ids a single Modbus device may use.
const VALID_UNIT_IDS: core::ops::RangeInclusive<u8> = 1..=247;

/// Reject unit ids outside 1-247.
pub(crate) fn check_unit_id(unit_id: u8) -> Result<()> {
    if VALID_UNIT_IDS.contains(&unit_id) {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "unit id {unit_id} is outside {}-{}",
            VALID_UNIT_IDS.start(),
            VALID_UNIT_IDS.end()
        )))
    }
}

/// Measured output, read as one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutputStats {
    pub volts: f64,
    pub amps: f64,
    pub watts: f64,
}

/// Configured protection trip levels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProtectionValues {
    pub over_volts: f64,
    pub over_amps: f64,
    pub over_watts: f64,
}

/// Lifecycle of the link held by an [`EtmPsu`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Default)]
struct Session {
    state: SessionState,
    link: Option<BoxedTransport>,
}

impl Session {
    /// Drop the link, if any. Returns whether there was one.
    fn close(&mut self) -> bool {
        self.state = SessionState::Disconnected;
        self.link.take().is_some()
    }
}

/// Controller for an eTM-xxxxP PSU, reached over a serial port or a TCP bridge.
///
/// For its methods, "get" reads a value back from the PSU and "set" writes one. Setters check
/// the value against the device range before anything is sent.
///
/// All methods take `&self`; the link sits behind a mutex that is held for a whole register
/// operation, so an `EtmPsu` can be shared between threads with an `Arc`.
pub struct EtmPsu<C: Connector = SystemConnector> {
    connector: C,
    /// Default for PSU is 0x01.
    unit_id: u8,
    session: Mutex<Session>,
    /// Serializes `connect` calls while the session lock is released.
    connecting: Mutex<()>,
}

impl EtmPsu<SystemConnector> {
    /// Create a disconnected controller for the PSU at `unit_id`.
    pub fn new(unit_id: u8) -> Self {
        Self::with_connector(SystemConnector, unit_id)
    }

    /// Create a controller from `config` and connect it.
    pub fn open(config: &PsuConfig) -> Result<Self> {
        Self::open_with(SystemConnector, config)
    }
}

impl Default for EtmPsu<SystemConnector> {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT_ID)
    }
}

impl<C: Connector> EtmPsu<C> {
    /// Create a disconnected controller that opens its links through `connector`.
    pub fn with_connector(connector: C, unit_id: u8) -> Self {
        Self {
            connector,
            unit_id,
            session: Mutex::new(Session::default()),
            connecting: Mutex::new(()),
        }
    }

    /// Like [`EtmPsu::open`], with a custom connector.
    pub fn open_with(connector: C, config: &PsuConfig) -> Result<Self> {
        config.validate()?;
        let psu = Self::with_connector(connector, config.unit_id);
        psu.connect(&config.target, config.timeout())?;
        Ok(psu)
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn state(&self) -> SessionState {
        self.session.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Open a link to `target`. Any link already open is closed first.
    ///
    /// The session reports [`SessionState::Connecting`] while the link is being opened, and
    /// operations issued meanwhile fail with [`Error::NotConnected`]. On failure, or if
    /// [`Self::disconnect`] is called before the link is up, the controller is left disconnected.
    pub fn connect(&self, target: &ConnectionTarget, timeout: Duration) -> Result<()> {
        check_unit_id(self.unit_id)?;

        let _connecting = self.connecting.lock();
        {
            let mut session = self.session.lock();
            if session.close() {
                info!("closed previous PSU link");
            }
            session.state = SessionState::Connecting;
        }

        let opened = self.connector.open(target, timeout);

        let mut session = self.session.lock();
        match opened {
            Ok(link) if session.state == SessionState::Connecting => {
                session.link = Some(link);
                session.state = SessionState::Connected;
                info!(%target, kind = ?target.kind(), unit_id = self.unit_id, "connected to PSU");
                Ok(())
            }
            Ok(_) => {
                info!(%target, "disconnected while connecting, link dropped");
                Err(Error::NotConnected)
            }
            Err(source) => {
                session.state = SessionState::Disconnected;
                Err(Error::Connect {
                    target: target.to_string(),
                    source,
                })
            }
        }
    }

    /// Close the link. Does nothing when not connected.
    pub fn disconnect(&self) {
        if self.session.lock().close() {
            info!(unit_id = self.unit_id, "disconnected from PSU");
        }
    }

    /// Read whether the output is enabled (`1`) or disabled (`0`).
    pub fn get_output(&self) -> Result<u16> {
        self.read_word(PsuRegister::OutputState)
    }

    /// Raw protection status word. See [`Self::get_protection_flags`].
    pub fn get_protection_state(&self) -> Result<u16> {
        self.read_word(PsuRegister::ProtectionState)
    }

    /// Return which protections have tripped, if any.
    pub fn get_protection_flags(&self) -> Result<ProtectionFlags> {
        Ok(ProtectionFlags::from_raw(self.get_protection_state()?))
    }

    /// Raw model identifier.
    pub fn get_model(&self) -> Result<u16> {
        self.read_word(PsuRegister::ModelId)
    }

    /// Measured output voltage, current and power.
    ///
    /// Voltage drops to 0 when the output is off.
    pub fn get_output_stats(&self) -> Result<OutputStats> {
        let registers = self.read_block(PsuRegister::OutputVoltage, PsuRegister::OutputPower)?;
        Ok(OutputStats {
            volts: raw_to_volts(registers[0]),
            amps: raw_to_amps(registers[1]),
            watts: raw_to_watts(SplitWord::from_registers([registers[2], registers[3]])),
        })
    }

    /// The target output voltage in volts.
    pub fn get_target_volts(&self) -> Result<f64> {
        Ok(raw_to_volts(self.read_word(PsuRegister::TargetVoltage)?))
    }

    /// The output current limit in amps.
    pub fn get_current_limit(&self) -> Result<f64> {
        Ok(raw_to_amps(self.read_word(PsuRegister::CurrentLimit)?))
    }

    /// The over-voltage, over-current and over-power protection levels.
    pub fn get_protection_values(&self) -> Result<ProtectionValues> {
        let registers = self.read_block(
            PsuRegister::OverVoltageProtection,
            PsuRegister::OverPowerProtection,
        )?;
        Ok(ProtectionValues {
            over_volts: raw_to_volts(registers[0]),
            over_amps: raw_to_amps(registers[1]),
            over_watts: raw_to_watts(SplitWord::from_registers([registers[2], registers[3]])),
        })
    }

    /// Read whether key press beeps are enabled (`1`) or disabled (`0`).
    pub fn get_buzzer(&self) -> Result<u16> {
        self.read_word(PsuRegister::Buzzer)
    }

    /// Enable/disable the output.
    pub fn set_output(&self, state: impl Into<State>) -> Result<()> {
        let state: State = state.into();
        self.write_word(PsuRegister::OutputState, state.into())
    }

    /// Set the output target voltage, in volts.
    pub fn set_voltage(&self, volts: f64) -> Result<()> {
        let volts = limits::TARGET_VOLTAGE.check(volts)?;
        self.write_word(PsuRegister::TargetVoltage, volts_to_raw(volts))
    }

    /// Set the output current limit, in amps.
    pub fn set_current_limit(&self, amps: f64) -> Result<()> {
        let amps = limits::CURRENT_LIMIT.check(amps)?;
        self.write_word(PsuRegister::CurrentLimit, amps_to_raw(amps))
    }

    /// Set the over-voltage protection level, in volts.
    pub fn set_over_voltage_p(&self, volts: f64) -> Result<()> {
        let volts = limits::OVER_VOLTAGE_PROTECTION.check(volts)?;
        self.write_word(PsuRegister::OverVoltageProtection, volts_to_raw(volts))
    }

    /// Set the over-current protection level, in amps.
    pub fn set_over_current_p(&self, amps: f64) -> Result<()> {
        let amps = limits::OVER_CURRENT_PROTECTION.check(amps)?;
        self.write_word(PsuRegister::OverCurrentProtection, amps_to_raw(amps))
    }

    /// Set the over-power protection level, in watts.
    ///
    /// __Note:__ the level spans two registers and the PSU has no atomic 32-bit write. The high
    /// word is written first; if the low word then fails, the high word has already been applied
    /// and the error reports the low word's address.
    pub fn set_over_power_p(&self, watts: f64) -> Result<()> {
        let watts = limits::OVER_POWER_PROTECTION.check(watts)?;
        let word = watts_to_raw(watts);
        let descriptor = PsuRegister::OverPowerProtection.descriptor();
        let (hi_address, lo_address) = (descriptor.address, descriptor.last_address());

        self.with_link(|link, unit_id| {
            write_register(link, unit_id, hi_address, word.hi)?;
            write_register(link, unit_id, lo_address, word.lo).inspect_err(|err| {
                warn!(
                    watts,
                    hi = word.hi,
                    error = %err,
                    "over-power protection partially written, high word applied but low word failed"
                );
            })
        })
    }

    /// Enable/disable key press beeps.
    pub fn set_buzzer(&self, state: impl Into<State>) -> Result<()> {
        let state: State = state.into();
        self.write_word(PsuRegister::Buzzer, state.into())
    }

    /// Run `f` against the live link, holding the session lock throughout.
    fn with_link<T>(&self, f: impl FnOnce(&mut BoxedTransport, u8) -> Result<T>) -> Result<T> {
        let mut session = self.session.lock();
        let link = session.link.as_mut().ok_or(Error::NotConnected)?;
        f(link, self.unit_id)
    }

    /// Read every register from `first` through `last` in one request.
    fn read_block(&self, first: PsuRegister, last: PsuRegister) -> Result<Vec<u16>> {
        let address = first.address();
        let count = PsuRegister::span(first, last);
        self.with_link(|link, unit_id| read_registers(link, unit_id, address, count))
    }

    fn read_word(&self, register: PsuRegister) -> Result<u16> {
        let registers = self.read_block(register, register)?;
        Ok(registers[0])
    }

    fn write_word(&self, register: PsuRegister, value: u16) -> Result<()> {
        let address = register.address();
        self.with_link(|link, unit_id| write_register(link, unit_id, address, value))
    }
}

impl<C: Connector> Drop for EtmPsu<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn read_registers(
    link: &mut BoxedTransport,
    unit_id: u8,
    address: u16,
    count: u16,
) -> Result<Vec<u16>> {
    debug!(unit_id, address, count, "read holding registers");
    let registers = link
        .read_holding_registers(unit_id, address, count)
        .map_err(|source| Error::Transport { address, source })?;
    if registers.len() != count as usize {
        return Err(Error::Transport {
            address,
            source: LinkError::InvalidResponse,
        });
    }
    Ok(registers)
}

fn write_register(link: &mut BoxedTransport, unit_id: u8, address: u16, value: u16) -> Result<()> {
    debug!(unit_id, address, value, "write single register");
    link.write_single_register(unit_id, address, value)
        .map_err(|source| Error::Transport { address, source })
}

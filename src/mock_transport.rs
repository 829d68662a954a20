//! Register-level test doubles for the controller.
//!
//! [`MockDevice`] is an in-process register bank that records every request made of it.
//! [`MockConnector`] hands out links to one shared device and counts how many are alive.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::LinkError;
use crate::transport::{BoxedTransport, ConnectionTarget, Connector, RegisterTransport, TransportKind};

/// One request as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Read { unit_id: u8, start: u16, count: u16 },
    Write { unit_id: u8, address: u16, value: u16 },
}

#[derive(Default)]
struct Bank {
    registers: HashMap<u16, u16>,
    calls: Vec<Call>,
    /// Any request touching this address times out.
    fail_at: Option<u16>,
}

/// Shared handle to a simulated PSU. Clones see the same registers.
#[derive(Clone, Default)]
pub struct MockDevice {
    bank: Arc<Mutex<Bank>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registers(registers: &[(u16, u16)]) -> Self {
        let device = Self::new();
        for &(address, value) in registers {
            device.set_register(address, value);
        }
        device
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.bank.lock().registers.insert(address, value);
    }

    /// Current value of a register. Unset registers read as `0`.
    pub fn register(&self, address: u16) -> u16 {
        self.bank.lock().registers.get(&address).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.bank.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.bank.lock().calls.len()
    }

    pub fn fail_at(&self, address: Option<u16>) {
        self.bank.lock().fail_at = address;
    }
}

impl RegisterTransport for MockDevice {
    fn read_holding_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, LinkError> {
        let mut bank = self.bank.lock();
        bank.calls.push(Call::Read { unit_id, start, count });
        if bank
            .fail_at
            .is_some_and(|address| (start..start + count).contains(&address))
        {
            return Err(LinkError::Timeout);
        }
        Ok((start..start + count)
            .map(|address| bank.registers.get(&address).copied().unwrap_or(0))
            .collect())
    }

    fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), LinkError> {
        let mut bank = self.bank.lock();
        bank.calls.push(Call::Write { unit_id, address, value });
        if bank.fail_at == Some(address) {
            return Err(LinkError::Timeout);
        }
        bank.registers.insert(address, value);
        Ok(())
    }
}

/// A link handed out by [`MockConnector`]. Counts itself as live until dropped.
struct MockLink {
    device: MockDevice,
    live: Arc<AtomicUsize>,
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RegisterTransport for MockLink {
    fn read_holding_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, LinkError> {
        self.device.read_holding_registers(unit_id, start, count)
    }

    fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), LinkError> {
        self.device.write_single_register(unit_id, address, value)
    }
}

/// Connector that opens links to a [`MockDevice`] instead of real hardware.
#[derive(Clone, Default)]
pub struct MockConnector {
    device: MockDevice,
    opened: Arc<Mutex<Vec<(TransportKind, Duration)>>>,
    live: Arc<AtomicUsize>,
    refuse: bool,
}

impl MockConnector {
    pub fn new(device: MockDevice) -> Self {
        Self {
            device,
            ..Self::default()
        }
    }

    /// A connector whose every `open` fails with "connection refused".
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Kind and timeout of every link opened so far.
    pub fn opened(&self) -> Vec<(TransportKind, Duration)> {
        self.opened.lock().clone()
    }

    /// Links opened and not yet dropped.
    pub fn live_links(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn open(
        &self,
        target: &ConnectionTarget,
        timeout: Duration,
    ) -> Result<BoxedTransport, LinkError> {
        if self.refuse {
            return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
        }
        self.opened.lock().push((target.kind(), timeout));
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockLink {
            device: self.device.clone(),
            live: self.live.clone(),
        }))
    }
}

//! The shared bus: a single arbiter serializing all memory traffic.

use crate::fault::HwFault;
use crate::memory::Memory;
use crate::word::Word;
use core::fmt;
use std::sync::{Mutex, MutexGuard};

/// Who is driving the bus for a given access.
///
/// Purely observational: the arbiter treats every client the same, but the
/// tag makes the access log legible when the CPU fetch path and the DMA
/// worker interleave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusClient {
    Cpu,
    Dma,
    Loader,
}

impl fmt::Display for BusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BusClient::Cpu => "cpu",
            BusClient::Dma => "dma",
            BusClient::Loader => "loader",
        })
    }
}

/// The memory arbiter.
///
/// Exactly one client holds the bus at a time; each access acquires the
/// lock, performs one physical operation, and releases it. Nothing holds
/// the bus across disk I/O, so accesses stay short and linearizable per
/// address.
#[derive(Debug)]
pub struct Bus {
    memory: Mutex<Memory>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Power on the bus and the memory behind it.
    #[must_use]
    pub fn new() -> Self {
        log::info!("bus: initialized");
        Self {
            memory: Mutex::new(Memory::new()),
        }
    }

    fn memory(&self) -> MutexGuard<'_, Memory> {
        // A poisoned lock means a peer thread panicked mid-access; the word
        // array itself is always valid, so recover the guard and continue.
        match self.memory.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Read one word of physical memory on behalf of `client`.
    pub fn read(&self, address: i64, client: BusClient) -> Result<Word, HwFault> {
        log::trace!("bus: {client} read [{address}]");
        self.memory().read(address)
    }

    /// Write one word of physical memory on behalf of `client`.
    pub fn write(&self, address: i64, word: Word, client: BusClient) -> Result<(), HwFault> {
        log::trace!("bus: {client} write [{address}] <- {word}");
        self.memory().write(address, word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn last_write_wins_per_address() {
        let bus = Bus::new();
        bus.write(100, Word(7), BusClient::Cpu).unwrap();
        bus.write(100, Word(8), BusClient::Dma).unwrap();
        assert_eq!(bus.read(100, BusClient::Cpu).unwrap(), Word(8));
    }

    #[test]
    fn propagates_hardware_faults() {
        let bus = Bus::new();
        assert_eq!(
            bus.read(5000, BusClient::Cpu),
            Err(HwFault::AddressOutOfRange(5000))
        );
    }

    #[test]
    fn concurrent_clients_serialize() {
        let bus = Arc::new(Bus::new());
        let writer = {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for i in 0..200 {
                    bus.write(400 + (i % 10), Word(i), BusClient::Dma).unwrap();
                }
            })
        };
        for i in 0..200 {
            bus.write(500 + (i % 10), Word(i), BusClient::Cpu).unwrap();
        }
        writer.join().unwrap();
        for i in 0..10 {
            assert_eq!(bus.read(500 + i, BusClient::Cpu).unwrap(), Word(190 + i));
            assert_eq!(bus.read(400 + i, BusClient::Cpu).unwrap(), Word(190 + i));
        }
    }
}

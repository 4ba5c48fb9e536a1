//! The DMA controller: register file, busy protocol, and worker thread.
//!
//! The CPU configures the controller through the SDMA* instructions and
//! kicks a transfer off with SDMAON; the transfer itself runs on a worker
//! thread that contends for the same bus as the CPU and reports completion
//! by raising IO_END on the interrupt latch. The controller never sees CPU
//! types; the latch is its only way back.

use crate::interrupt::{Interrupt, InterruptLatch};
use crate::processor::psw::Mode;
use deka::{
    Bus, BusClient, Disk, Sector, Word, DISK_CYLINDERS, DISK_SECTORS, DISK_TRACKS, MEM_SIZE,
    OS_RESERVED, SECTOR_BYTES,
};
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Simulated seek-plus-transfer latency per sector operation.
const TRANSFER_LATENCY: Duration = Duration::from_millis(10);

/// Why `SDMAON` refused to start a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    /// A transfer is in flight; retry on the next tick.
    Busy,
    /// Parameter validation failed; the controller state is marked failed.
    Rejected,
}

/// The register file. `state` follows the wire convention: 0 means the
/// last transfer succeeded, 1 means failed or in progress.
#[derive(Debug, Clone, Copy, Default)]
struct Registers {
    track: i64,
    cylinder: i64,
    sector: i64,
    io: i64,
    address: i64,
    state: i64,
}

/// The DMA controller.
///
/// `busy` is observable without touching the register lock; the register
/// lock itself is held by the worker for the duration of a transfer, so
/// `state()` callers may block momentarily. At most one worker exists at a
/// time, and its handle is retained so shutdown can join it.
#[derive(Debug)]
pub struct Dma {
    registers: Mutex<Registers>,
    busy: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    bus: Arc<Bus>,
    disk: Arc<Disk>,
    interrupts: Arc<InterruptLatch>,
}

impl Dma {
    #[must_use]
    pub fn new(bus: Arc<Bus>, disk: Arc<Disk>, interrupts: Arc<InterruptLatch>) -> Self {
        info!("dma: initialized");
        Self {
            registers: Mutex::new(Registers {
                // Nothing has completed yet.
                state: 1,
                ..Registers::default()
            }),
            busy: AtomicBool::new(false),
            worker: Mutex::new(None),
            bus,
            disk,
            interrupts,
        }
    }

    fn registers(&self) -> MutexGuard<'_, Registers> {
        match self.registers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_track(&self, track: i64) {
        self.registers().track = track;
        debug!("dma: track <- {track}");
    }

    pub fn set_cylinder(&self, cylinder: i64) {
        self.registers().cylinder = cylinder;
        debug!("dma: cylinder <- {cylinder}");
    }

    pub fn set_sector(&self, sector: i64) {
        self.registers().sector = sector;
        debug!("dma: sector <- {sector}");
    }

    /// 0 transfers memory to disk, 1 disk to memory.
    pub fn set_io(&self, io: i64) {
        self.registers().io = io;
        debug!("dma: io <- {io}");
    }

    /// Store the transfer address. Callers hand over a physical address;
    /// user-mode relocation already happened CPU-side.
    pub fn set_address(&self, address: i64) {
        self.registers().address = address;
        debug!("dma: address <- {address}");
    }

    /// Whether a transfer is in flight. Never blocks.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// The completion state of the last transfer (0 success, 1 failed or
    /// in progress). Reads under the register lock; never touches disk.
    #[must_use]
    pub fn state(&self) -> i64 {
        self.registers().state
    }

    /// Begin the configured transfer.
    ///
    /// Refuses with [`StartError::Busy`] while a worker is outstanding so
    /// the CPU can rewind and retry, and with [`StartError::Rejected`]
    /// when the parameters fail validation. `origin` is the privilege
    /// mode of the instruction that asked: user-origin transfers may not
    /// target the kernel region.
    pub fn start(self: &Arc<Self>, origin: Mode) -> Result<(), StartError> {
        if self.is_busy() {
            debug!("dma: start refused, transfer in flight");
            return Err(StartError::Busy);
        }

        let mut registers = self.registers();
        if !Self::validate(&registers, origin) {
            error!(
                "dma: rejected transfer: address {}, track {}, cylinder {}, sector {} ({origin:?} origin)",
                registers.address, registers.track, registers.cylinder, registers.sector
            );
            registers.state = 1;
            return Err(StartError::Rejected);
        }
        registers.state = 1; // in progress
        let io = registers.io;
        drop(registers);

        self.busy.store(true, Ordering::Release);
        let mut slot = self.worker_slot();
        if let Some(finished) = slot.take() {
            // The previous worker already cleared busy; reap its handle.
            let _ = finished.join();
        }
        let dma = Arc::clone(self);
        *slot = Some(thread::spawn(move || dma.run_transfer()));
        info!(
            "dma: transfer started ({})",
            if io == 1 { "disk -> memory" } else { "memory -> disk" }
        );
        Ok(())
    }

    fn validate(registers: &Registers, origin: Mode) -> bool {
        let floor = match origin {
            Mode::Kernel => 0,
            Mode::User => OS_RESERVED as i64,
        };
        (floor..MEM_SIZE as i64).contains(&registers.address)
            && (0..DISK_TRACKS as i64).contains(&registers.track)
            && (0..DISK_CYLINDERS as i64).contains(&registers.cylinder)
            && (0..DISK_SECTORS as i64).contains(&registers.sector)
    }

    /// Join any outstanding worker. The driver calls this before tearing
    /// down disk and bus.
    pub fn shutdown(&self) {
        if let Some(worker) = self.worker_slot().take() {
            let _ = worker.join();
            info!("dma: worker joined");
        }
    }

    /// Worker body. Holds the register lock for the whole transfer, then
    /// clears busy, releases the lock, and finally raises IO_END, so a
    /// state read issued after the interrupt sees the final status.
    fn run_transfer(&self) {
        let mut registers = self.registers();
        thread::sleep(TRANSFER_LATENCY);
        let ok = if registers.io == 1 {
            self.sector_to_memory(&registers)
        } else {
            self.memory_to_sector(&registers)
        };
        registers.state = i64::from(!ok);
        info!("dma: transfer finished, state {}", registers.state);
        self.busy.store(false, Ordering::Release);
        drop(registers);
        self.interrupts.raise(Interrupt::IoEnd);
    }

    fn memory_to_sector(&self, registers: &Registers) -> bool {
        let word = match self.bus.read(registers.address, BusClient::Dma) {
            Ok(word) => word,
            Err(fault) => {
                error!("dma: bus read failed: {fault}");
                return false;
            }
        };
        let Some(image) = sector_image(word) else {
            error!("dma: word {word} does not fit a sector image");
            return false;
        };
        match self
            .disk
            .write_sector(registers.track, registers.cylinder, registers.sector, &image)
        {
            Ok(()) => true,
            Err(fault) => {
                error!("dma: disk write failed: {fault}");
                false
            }
        }
    }

    fn sector_to_memory(&self, registers: &Registers) -> bool {
        let image = match self
            .disk
            .read_sector(registers.track, registers.cylinder, registers.sector)
        {
            Ok(image) => image,
            Err(fault) => {
                error!("dma: disk read failed: {fault}");
                return false;
            }
        };
        let Some(word) = parse_sector(&image) else {
            error!("dma: sector does not hold a decimal word");
            return false;
        };
        match self.bus.write(registers.address, word, BusClient::Dma) {
            Ok(()) => true,
            Err(fault) => {
                error!("dma: bus write failed: {fault}");
                false
            }
        }
    }
}

/// Render a word as its eight-digit sector image, NUL terminated.
fn sector_image(word: Word) -> Option<Sector> {
    let digits = word.to_string();
    if digits.len() > SECTOR_BYTES - 1 {
        return None;
    }
    let mut image = [0u8; SECTOR_BYTES];
    image[..digits.len()].copy_from_slice(digits.as_bytes());
    Some(image)
}

/// Parse a sector image back into a word: the digits up to the
/// terminator, optionally signed.
fn parse_sector(image: &Sector) -> Option<Word> {
    let end = image.iter().position(|&b| b == 0).unwrap_or(SECTOR_BYTES);
    let text = core::str::from_utf8(&image[..end]).ok()?;
    text.trim().parse::<i64>().ok().map(Word)
}

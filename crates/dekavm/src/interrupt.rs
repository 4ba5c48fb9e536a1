//! Interrupt codes and the single-slot pending latch.

use core::fmt;
use std::sync::Mutex;

/// The machine's interrupt taxonomy. The numeric code doubles as the
/// vector slot the CPU reads the handler entry point from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Privileged operation attempted in User mode.
    SyscallInvalid,
    /// Generic invalid operation (bad addressing mode, immediate store).
    InvalidOp,
    /// Software trap (`SVC`).
    Syscall,
    /// Timer.
    Clock,
    /// DMA transfer completed (success or failure; see the DMA state).
    IoEnd,
    /// Illegal opcode.
    InvInstr,
    /// Segmentation violation.
    InvAddr,
    /// Stack underflow.
    Underflow,
    /// Stack overflow or arithmetic fault.
    Overflow,
}

impl Interrupt {
    /// Vector slot for this interrupt.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Interrupt::SyscallInvalid => 0,
            Interrupt::InvalidOp => 1,
            Interrupt::Syscall => 2,
            Interrupt::Clock => 3,
            Interrupt::IoEnd => 4,
            Interrupt::InvInstr => 5,
            Interrupt::InvAddr => 6,
            Interrupt::Underflow => 7,
            Interrupt::Overflow => 8,
        }
    }

    /// Fatal interrupts skip the context save; the driver reports them
    /// and terminates the program.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Interrupt::InvInstr | Interrupt::InvAddr | Interrupt::Underflow | Interrupt::Overflow
        )
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Interrupt::SyscallInvalid => "SYSCALL_INVALID",
            Interrupt::InvalidOp => "INVALID_OP",
            Interrupt::Syscall => "SYSCALL",
            Interrupt::Clock => "CLOCK",
            Interrupt::IoEnd => "IO_END",
            Interrupt::InvInstr => "INV_INSTR",
            Interrupt::InvAddr => "INV_ADDR",
            Interrupt::Underflow => "UNDERFLOW",
            Interrupt::Overflow => "OVERFLOW",
        }
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// The pending-interrupt cell shared between the CPU and every interrupt
/// source, the DMA worker included.
///
/// A single slot: a later assertion overwrites an undelivered one. The CPU
/// consumes it at instruction boundaries; everyone else only raises.
#[derive(Debug, Default)]
pub struct InterruptLatch {
    cell: Mutex<Option<Interrupt>>,
}

impl InterruptLatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self) -> std::sync::MutexGuard<'_, Option<Interrupt>> {
        match self.cell.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Assert an interrupt. Any source may call this from any thread.
    pub fn raise(&self, interrupt: Interrupt) {
        log::info!("interrupt requested: {interrupt}");
        *self.cell() = Some(interrupt);
    }

    /// Peek at the pending interrupt without consuming it.
    #[must_use]
    pub fn pending(&self) -> Option<Interrupt> {
        *self.cell()
    }

    /// Consume the pending interrupt if it can be delivered now.
    ///
    /// Fatal interrupts are always deliverable; anything else waits until
    /// the PSW interrupt-enable bit is set, staying latched meanwhile.
    #[must_use]
    pub fn take_deliverable(&self, interrupts_enabled: bool) -> Option<Interrupt> {
        let mut cell = self.cell();
        match *cell {
            Some(interrupt) if interrupt.is_fatal() || interrupts_enabled => {
                *cell = None;
                Some(interrupt)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_vector_slots() {
        assert_eq!(Interrupt::SyscallInvalid.code(), 0);
        assert_eq!(Interrupt::Syscall.code(), 2);
        assert_eq!(Interrupt::IoEnd.code(), 4);
        assert_eq!(Interrupt::Overflow.code(), 8);
    }

    #[test]
    fn masked_interrupts_stay_latched() {
        let latch = InterruptLatch::new();
        latch.raise(Interrupt::Syscall);
        assert_eq!(latch.take_deliverable(false), None);
        assert_eq!(latch.pending(), Some(Interrupt::Syscall));
        assert_eq!(latch.take_deliverable(true), Some(Interrupt::Syscall));
        assert_eq!(latch.pending(), None);
    }

    #[test]
    fn fatal_interrupts_ignore_the_mask() {
        let latch = InterruptLatch::new();
        latch.raise(Interrupt::InvAddr);
        assert_eq!(latch.take_deliverable(false), Some(Interrupt::InvAddr));
    }

    #[test]
    fn later_assertions_overwrite() {
        let latch = InterruptLatch::new();
        latch.raise(Interrupt::Clock);
        latch.raise(Interrupt::Syscall);
        assert_eq!(latch.take_deliverable(true), Some(Interrupt::Syscall));
    }
}

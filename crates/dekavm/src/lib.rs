//! A didactic single-core decimal machine simulator.
//!
//! `dekavm` executes programs written as line-oriented text of decimal
//! words: an instruction set of 34 opcodes with three addressing modes, a
//! signed-magnitude ALU, a relocating base/limit MMU, an interrupt model
//! with context save/restore through a descending kernel stack, and a DMA
//! controller that moves sectors between the shared bus and a block-device
//! disk on its own thread.
//!
//! # Architecture
//!
//! The simulator is built from a few cooperating pieces:
//!
//! - **[`processor::Cpu`]**: the register file and the
//!   fetch–decode–execute tick, including interrupt entry and `RETRN`.
//! - **[`mmu`]**: pure logical-to-physical translation with segment
//!   protection.
//! - **[`dma::Dma`]**: the controller configured by the SDMA*
//!   instructions; transfers run on a worker thread that raises IO_END
//!   through the [`interrupt::InterruptLatch`] when done.
//! - **[`loader`]**: streams program text into physical memory.
//! - **[`Machine`]**: owns the CPU context, wires the shared devices, and
//!   drives the run loop.
//!
//! The hardware primitives (decimal words, memory, bus, disk) come from
//! the sibling [`deka`] crate.
//!
//! # Quick Start
//!
//! ```
//! use deka::{BusClient, Word};
//! use dekavm::loader::LoadInfo;
//! use dekavm::{Machine, RunConfig, USER_PROGRAM_START};
//!
//! let mut machine = Machine::new();
//! // LOAD #5; SUM #3
//! for (offset, word) in [4_100_005, 100_003].into_iter().enumerate() {
//!     machine
//!         .bus()
//!         .write(USER_PROGRAM_START + offset as i64, Word(word), BusClient::Loader)
//!         .unwrap();
//! }
//! machine.attach(LoadInfo {
//!     load_address: USER_PROGRAM_START,
//!     n_words: 2,
//!     index_start: 0,
//!     name: None,
//! });
//!
//! let summary = machine.run(&RunConfig::unpaced());
//! assert!(summary.program_ended());
//! assert_eq!(machine.cpu().ac, Word(8));
//! ```

pub mod dma;
pub mod instruction;
pub mod interrupt;
pub mod loader;
pub mod machine;
pub mod mmu;
pub mod processor;
pub mod shell;

pub use dma::Dma;
pub use instruction::{Decoded, Opcode};
pub use interrupt::{Interrupt, InterruptLatch};
pub use loader::{LoadError, LoadInfo};
pub use machine::{Machine, USER_PROGRAM_START};
pub use processor::{
    Cond, Cpu, Mode, Psw, RunConfig, RunOutcome, RunSummary, Step, STACK_FLOOR, STACK_TOP,
};

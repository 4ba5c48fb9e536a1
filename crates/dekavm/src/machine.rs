//! The machine driver: component wiring, kernel bootstrap, and the run
//! loop.

use crate::dma::Dma;
use crate::interrupt::InterruptLatch;
use crate::loader::{self, LoadError, LoadInfo};
use crate::processor::cpu::{Cpu, Step, STACK_TOP};
use crate::processor::psw::Mode;
use crate::processor::run::{RunConfig, RunOutcome, RunSummary};
use deka::{Bus, BusClient, Disk, Word, MEM_SIZE, OS_RESERVED, VECTOR_WORDS};
use log::{error, info};
use std::path::Path;
use std::sync::Arc;
use std::thread;

/// Physical base where user programs load.
pub const USER_PROGRAM_START: i64 = OS_RESERVED as i64;

/// Physical address of the bootstrap RETRN stub every vector slot points
/// at until real handlers are installed.
const RETRN_STUB: i64 = 20;

/// The RETRN instruction word (opcode 14, direct mode, operand 0).
const RETRN_WORD: Word = Word(14_000_000);

/// Upper physical bound handed to a freshly loaded program.
const USER_LIMIT: i64 = MEM_SIZE as i64 - 1;

/// The assembled machine: CPU context owned as a value, devices shared
/// behind `Arc`s with the DMA worker.
#[derive(Debug)]
pub struct Machine {
    bus: Arc<Bus>,
    disk: Arc<Disk>,
    dma: Arc<Dma>,
    interrupts: Arc<InterruptLatch>,
    cpu: Cpu,
    program: Option<LoadInfo>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    /// Power on every component and bootstrap the interrupt vector.
    #[must_use]
    pub fn new() -> Self {
        let bus = Arc::new(Bus::new());
        let disk = Arc::new(Disk::new());
        let interrupts = Arc::new(InterruptLatch::new());
        let dma = Arc::new(Dma::new(
            Arc::clone(&bus),
            Arc::clone(&disk),
            Arc::clone(&interrupts),
        ));
        let machine = Self {
            bus,
            disk,
            dma,
            interrupts,
            cpu: Cpu::new(),
            program: None,
        };
        machine.bootstrap_vector();
        info!("machine: system initialized");
        machine
    }

    /// Point every vector slot at the RETRN stub so any interrupt taken
    /// before real handlers exist returns immediately.
    fn bootstrap_vector(&self) {
        let mut write = |address: i64, word: Word| {
            if let Err(fault) = self.bus.write(address, word, BusClient::Cpu) {
                error!("machine: vector bootstrap write failed: {fault}");
            }
        };
        for slot in 0..RETRN_STUB {
            write(slot, Word(RETRN_STUB));
        }
        write(RETRN_STUB, RETRN_WORD);
        for slot in (RETRN_STUB + 1)..VECTOR_WORDS as i64 {
            write(slot, Word::ZERO);
        }
        info!("machine: interrupt vector bootstrapped");
    }

    /// Load a program file at [`USER_PROGRAM_START`] and configure the
    /// CPU to run it.
    pub fn load(&mut self, path: &Path) -> Result<LoadInfo, LoadError> {
        let info = loader::load_program(&self.bus, path, USER_PROGRAM_START)?;
        self.attach(info.clone());
        Ok(info)
    }

    /// Adopt an already-streamed program image: reset the CPU and set up
    /// the user segment, stack, and entry point.
    pub fn attach(&mut self, info: LoadInfo) {
        self.cpu.reset();
        self.cpu.rb = info.load_address;
        self.cpu.rl = USER_LIMIT;
        self.cpu.sp = STACK_TOP;
        self.cpu.psw.pc = info.index_start;
        self.cpu.psw.mode = Mode::User;
        info!(
            "machine: process ready, pc {} rb {} rl {}",
            self.cpu.psw.pc, self.cpu.rb, self.cpu.rl
        );
        self.program = Some(info);
    }

    #[must_use]
    pub fn loaded(&self) -> bool {
        self.program.is_some()
    }

    #[must_use]
    pub fn program(&self) -> Option<&LoadInfo> {
        self.program.as_ref()
    }

    #[must_use]
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    #[must_use]
    pub fn disk(&self) -> &Arc<Disk> {
        &self.disk
    }

    #[must_use]
    pub fn dma(&self) -> &Arc<Dma> {
        &self.dma
    }

    #[must_use]
    pub fn interrupts(&self) -> &Arc<InterruptLatch> {
        &self.interrupts
    }

    /// One CPU tick, without pacing. The debugger steps through this.
    pub fn step(&mut self) -> Step {
        self.cpu.step(&self.bus, &self.dma, &self.interrupts)
    }

    /// True when the loaded user program has run off the end of its text.
    fn program_finished(&self) -> bool {
        match &self.program {
            Some(info) => self.cpu.psw.mode == Mode::User && self.cpu.psw.pc >= info.n_words,
            None => false,
        }
    }

    /// Drive the tick loop until the program completes, faults, or hits
    /// the configured limit. A program that already completed is
    /// restarted from its entry point first.
    pub fn run(&mut self, config: &RunConfig) -> RunSummary {
        let mut summary = RunSummary::default();
        if self.program.is_none() {
            summary.mark(RunOutcome::ProgramEnd);
            return summary;
        }
        if self.program_finished() {
            info!("machine: restarting program from its entry point");
            if let Some(info) = self.program.clone() {
                self.attach(info);
            }
        }

        loop {
            if let Some(limit) = config.instruction_limit {
                if summary.instructions_executed >= limit {
                    summary.mark(RunOutcome::HitInstructionLimit);
                    break;
                }
            }
            match self.step() {
                Step::Continue => {}
                Step::Fatal(interrupt) => {
                    summary.mark(RunOutcome::Fatal(interrupt));
                    break;
                }
                Step::Fault(fault) => {
                    summary.mark(RunOutcome::Fault(fault));
                    break;
                }
            }
            summary.instructions_executed += 1;
            // A latched interrupt still gets delivered even when the
            // raising instruction was the last word of the program.
            if self.interrupts.pending().is_none() && self.program_finished() {
                info!(
                    "machine: program finished, pc {} past its {} words",
                    self.cpu.psw.pc,
                    self.program.as_ref().map_or(0, |p| p.n_words)
                );
                summary.mark(RunOutcome::ProgramEnd);
                break;
            }
            if !config.quantum.is_zero() {
                thread::sleep(config.quantum);
            }
        }
        summary
    }

    /// Peek at the word the next fetch would read, for the debugger.
    /// Returns the current PC and the raw instruction word.
    #[must_use]
    pub fn peek_instruction(&self) -> Option<(i64, Word)> {
        let pc = self.cpu.psw.pc;
        let physical = match self.cpu.psw.mode {
            Mode::User => pc + self.cpu.rb,
            Mode::Kernel => pc,
        };
        self.bus
            .read(physical, BusClient::Cpu)
            .ok()
            .map(|word| (pc, word))
    }

    /// Join any outstanding DMA worker. Also runs on drop.
    pub fn shutdown(&mut self) {
        self.dma.shutdown();
        info!("machine: halted");
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        self.dma.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::psw::Cond;

    fn attach_program(machine: &mut Machine, words: &[i64]) {
        for (offset, &word) in words.iter().enumerate() {
            machine
                .bus()
                .write(
                    USER_PROGRAM_START + offset as i64,
                    Word(word),
                    BusClient::Loader,
                )
                .unwrap();
        }
        machine.attach(LoadInfo {
            load_address: USER_PROGRAM_START,
            n_words: words.len() as i64,
            index_start: 0,
            name: None,
        });
    }

    #[test]
    fn vector_slots_point_at_the_retrn_stub() {
        let machine = Machine::new();
        for slot in 0..20 {
            assert_eq!(
                machine.bus().read(slot, BusClient::Cpu).unwrap(),
                Word(20),
                "slot {slot}"
            );
        }
        assert_eq!(
            machine.bus().read(20, BusClient::Cpu).unwrap(),
            Word(14_000_000)
        );
        assert_eq!(machine.bus().read(25, BusClient::Cpu).unwrap(), Word::ZERO);
    }

    #[test]
    fn runs_a_program_to_completion() {
        let mut machine = Machine::new();
        // LOAD #5; SUM #3
        attach_program(&mut machine, &[4_100_005, 100_003]);

        let summary = machine.run(&RunConfig::unpaced());
        assert!(summary.program_ended());
        assert_eq!(summary.instructions_executed, 2);
        assert_eq!(machine.cpu().ac, Word(8));
        assert_eq!(machine.cpu().psw.cc, Cond::Greater);
    }

    #[test]
    fn rerunning_restarts_a_finished_program() {
        let mut machine = Machine::new();
        // LOAD #1; SUM #1
        attach_program(&mut machine, &[4_100_001, 100_001]);

        assert!(machine.run(&RunConfig::unpaced()).program_ended());
        assert_eq!(machine.cpu().ac, Word(2));

        // The accumulator starts over; nothing accumulates across runs.
        assert!(machine.run(&RunConfig::unpaced()).program_ended());
        assert_eq!(machine.cpu().ac, Word(2));
    }

    #[test]
    fn fatal_interrupts_stop_the_run() {
        let mut machine = Machine::new();
        // DIVI #0
        attach_program(&mut machine, &[3_100_000]);

        let summary = machine.run(&RunConfig::unpaced());
        assert_eq!(
            summary.fatal(),
            Some(crate::interrupt::Interrupt::Overflow)
        );
    }

    #[test]
    fn instruction_limit_bounds_a_runaway_loop() {
        let mut machine = Machine::new();
        // J 0: jump to itself forever.
        attach_program(&mut machine, &[27_000_000]);

        let config = RunConfig {
            instruction_limit: Some(100),
            ..RunConfig::unpaced()
        };
        let summary = machine.run(&config);
        assert!(summary.hit_instruction_limit());
        assert_eq!(summary.instructions_executed, 100);
    }

    #[test]
    fn peek_reads_through_the_user_segment() {
        let mut machine = Machine::new();
        attach_program(&mut machine, &[4_100_005]);
        let (pc, word) = machine.peek_instruction().unwrap();
        assert_eq!(pc, 0);
        assert_eq!(word, Word(4_100_005));
    }
}

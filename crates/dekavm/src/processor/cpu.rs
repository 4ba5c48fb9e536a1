//! The CPU: register file, kernel stack discipline, interrupt entry and
//! return, and the fetch–decode–execute tick.

use crate::dma::{Dma, StartError};
use crate::instruction::{Decoded, Opcode};
use crate::interrupt::{Interrupt, InterruptLatch};
use crate::mmu;
use crate::processor::addressing::AddressingMode;
use crate::processor::alu::{self, ArithOp};
use crate::processor::psw::{Cond, Mode, Psw};
use deka::{Bus, BusClient, HwFault, Word};
use log::{debug, error, info};
use std::sync::Arc;

/// Lowest kernel-stack slot; a push below this is a stack overflow.
pub const STACK_FLOOR: i64 = 30;

/// Empty-stack resting position. `push` predecrements away from it and a
/// pop at or above it is a stack underflow; the slot itself is never
/// written.
pub const STACK_TOP: i64 = 299;

/// Result of one CPU tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep ticking.
    Continue,
    /// A fatal interrupt; the driver reports it and terminates.
    Fatal(Interrupt),
    /// An internal bus or stack failure below the interrupt model.
    Fault(HwFault),
}

/// The processor context: every register the machine defines, owned as a
/// plain value by whoever drives the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cpu {
    /// Accumulator.
    pub ac: Word,
    /// Memory address register.
    pub mar: i64,
    /// Memory data register.
    pub mdr: Word,
    /// Instruction register.
    pub ir: Word,
    /// Segment base.
    pub rb: i64,
    /// Segment limit (absolute physical upper bound).
    pub rl: i64,
    /// Index register.
    pub rx: i64,
    /// Stack pointer; the kernel stack grows downward inside
    /// `[STACK_FLOOR, STACK_TOP]`.
    pub sp: i64,
    /// Program status word.
    pub psw: Psw,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    /// Power-on state: zeroed registers, the stack at its resting
    /// position, User mode with interrupts enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ac: Word::ZERO,
            mar: 0,
            mdr: Word::ZERO,
            ir: Word::ZERO,
            rb: 0,
            rl: 0,
            rx: 0,
            sp: STACK_TOP,
            psw: Psw::default(),
        }
    }

    /// Reset to the power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
        info!("cpu: reset");
    }

    /// Run one tick: deliver a pending interrupt, or fetch, decode, and
    /// execute one instruction.
    pub fn step(&mut self, bus: &Bus, dma: &Arc<Dma>, interrupts: &InterruptLatch) -> Step {
        if let Some(interrupt) = interrupts.take_deliverable(self.psw.interrupts_enabled) {
            return self.deliver(interrupt, bus, dma);
        }

        // Fetch.
        self.mar = self.psw.pc;
        let physical = match mmu::translate(self.mar, self.psw.mode, self.rb, self.rl) {
            Ok(physical) => physical,
            Err(violation) => {
                error!("cpu: fetch: {violation}");
                interrupts.raise(Interrupt::InvAddr);
                return Step::Continue;
            }
        };
        self.mdr = match bus.read(physical, BusClient::Cpu) {
            Ok(word) => word,
            Err(fault) => {
                error!("cpu: fetch at pc {} failed: {fault}", self.psw.pc);
                interrupts.raise(Interrupt::InvAddr);
                return Step::Continue;
            }
        };
        self.ir = self.mdr;
        self.psw.pc += 1;

        // Decode.
        let decoded = Decoded::from_word(self.ir);
        let Some(opcode) = Opcode::from_code(decoded.opcode) else {
            error!(
                "cpu: illegal opcode {} at pc {}",
                decoded.opcode,
                self.psw.pc - 1
            );
            interrupts.raise(Interrupt::InvInstr);
            return Step::Continue;
        };

        // Execute.
        self.execute(opcode, decoded, bus, dma, interrupts)
    }

    fn execute(
        &mut self,
        opcode: Opcode,
        decoded: Decoded,
        bus: &Bus,
        dma: &Arc<Dma>,
        interrupts: &InterruptLatch,
    ) -> Step {
        match opcode {
            Opcode::Sum | Opcode::Res | Opcode::Mult | Opcode::Divi => {
                self.arithmetic(opcode, decoded, bus, interrupts);
            }
            Opcode::Load => {
                if let Some(value) = self.operand_value(decoded, bus, interrupts) {
                    self.ac = value;
                    debug!("cpu: LOAD -> ac {}", self.ac);
                }
            }
            Opcode::Str => {
                let word = self.ac;
                self.store(opcode, decoded, word, bus, interrupts);
            }
            Opcode::Loadrx => {
                if let Some(value) = self.operand_value(decoded, bus, interrupts) {
                    self.rx = value.0;
                    debug!("cpu: LOADRX -> rx {}", self.rx);
                }
            }
            Opcode::Strrx => {
                let word = Word(self.rx);
                self.store(opcode, decoded, word, bus, interrupts);
            }
            Opcode::Comp => {
                if let Some(value) = self.operand_value(decoded, bus, interrupts) {
                    self.psw.cc = alu::compare(self.ac, value);
                    debug!("cpu: COMP -> cc {:?}", self.psw.cc);
                }
            }
            Opcode::Jmpe => self.jump_if(self.psw.cc == Cond::Equal, decoded.operand),
            Opcode::Jmpne => self.jump_if(self.psw.cc != Cond::Equal, decoded.operand),
            Opcode::Jmplt => self.jump_if(self.psw.cc == Cond::Less, decoded.operand),
            Opcode::Jmplgt => self.jump_if(self.psw.cc == Cond::Greater, decoded.operand),
            Opcode::J => {
                self.psw.pc = decoded.operand;
                debug!("cpu: J -> pc {}", self.psw.pc);
            }
            Opcode::Svc => {
                debug!("cpu: SVC");
                interrupts.raise(Interrupt::Syscall);
            }
            Opcode::Retrn => return self.retrn(bus, interrupts),
            Opcode::Hab => {
                debug!("cpu: HAB");
                self.psw.interrupts_enabled = true;
            }
            Opcode::Dhab => {
                debug!("cpu: DHAB");
                self.psw.interrupts_enabled = false;
            }
            Opcode::Tti => {
                // Timer checkpoint; no generator is wired, so no state changes.
                debug!("cpu: TTI checkpoint");
            }
            Opcode::Chmod => {
                if self.require_kernel(opcode, interrupts) {
                    if let Some(value) = self.operand_value(decoded, bus, interrupts) {
                        match value.0 {
                            0 => self.psw.mode = Mode::User,
                            1 => self.psw.mode = Mode::Kernel,
                            other => {
                                error!("cpu: CHMOD with invalid mode {other}");
                                interrupts.raise(Interrupt::InvalidOp);
                                return Step::Continue;
                            }
                        }
                        debug!("cpu: CHMOD -> {}", self.psw.mode);
                    }
                }
            }
            Opcode::Loadrb => {
                if self.require_kernel(opcode, interrupts) {
                    if let Some(value) = self.operand_value(decoded, bus, interrupts) {
                        self.rb = value.0;
                        debug!("cpu: LOADRB -> rb {}", self.rb);
                    }
                }
            }
            Opcode::Strrb => {
                if self.require_kernel(opcode, interrupts) {
                    let word = Word(self.rb);
                    self.store(opcode, decoded, word, bus, interrupts);
                }
            }
            Opcode::Loadrl => {
                if self.require_kernel(opcode, interrupts) {
                    if let Some(value) = self.operand_value(decoded, bus, interrupts) {
                        self.rl = value.0;
                        debug!("cpu: LOADRL -> rl {}", self.rl);
                    }
                }
            }
            Opcode::Strrl => {
                if self.require_kernel(opcode, interrupts) {
                    let word = Word(self.rl);
                    self.store(opcode, decoded, word, bus, interrupts);
                }
            }
            Opcode::Loadsp => {
                if self.require_kernel(opcode, interrupts) {
                    if let Some(value) = self.operand_value(decoded, bus, interrupts) {
                        self.sp = value.0;
                        debug!("cpu: LOADSP -> sp {}", self.sp);
                    }
                }
            }
            Opcode::Strsp => {
                if self.require_kernel(opcode, interrupts) {
                    let word = Word(self.sp);
                    self.store(opcode, decoded, word, bus, interrupts);
                }
            }
            Opcode::Psh => {
                if let Some(value) = self.operand_value(decoded, bus, interrupts) {
                    match self.push(value, bus) {
                        Ok(()) => debug!("cpu: PSH {value} -> sp {}", self.sp),
                        Err(Step::Fatal(interrupt)) => interrupts.raise(interrupt),
                        Err(step) => return step,
                    }
                }
            }
            Opcode::Pop => {
                if let Some(physical) = self.store_address(decoded, interrupts) {
                    match self.pop(bus) {
                        Ok(word) => {
                            if let Err(fault) = bus.write(physical, word, BusClient::Cpu) {
                                error!("cpu: POP write failed: {fault}");
                                interrupts.raise(Interrupt::InvAddr);
                            } else {
                                debug!("cpu: POP {word} -> [{physical}]");
                            }
                        }
                        Err(Step::Fatal(interrupt)) => interrupts.raise(interrupt),
                        Err(step) => return step,
                    }
                }
            }
            Opcode::Sdmap => {
                if let Some(value) = self.operand_value(decoded, bus, interrupts) {
                    dma.set_track(value.0);
                }
            }
            Opcode::Sdmac => {
                if let Some(value) = self.operand_value(decoded, bus, interrupts) {
                    dma.set_cylinder(value.0);
                }
            }
            Opcode::Sdmas => {
                if let Some(value) = self.operand_value(decoded, bus, interrupts) {
                    dma.set_sector(value.0);
                }
            }
            Opcode::Sdmaio => {
                if let Some(value) = self.operand_value(decoded, bus, interrupts) {
                    dma.set_io(value.0);
                }
            }
            Opcode::Sdmam => {
                if let Some(value) = self.operand_value(decoded, bus, interrupts) {
                    // The controller always sees a physical address: user
                    // callers go through the segment check here.
                    let address = match self.psw.mode {
                        Mode::Kernel => value.0,
                        Mode::User => {
                            match self.translate_or_raise(value.0, interrupts) {
                                Some(physical) => physical,
                                None => return Step::Continue,
                            }
                        }
                    };
                    dma.set_address(address);
                }
            }
            Opcode::Sdmaon => match dma.start(self.psw.mode) {
                Ok(()) => {}
                Err(StartError::Busy) => {
                    // Cooperative back-pressure: retry this instruction on
                    // the next tick.
                    debug!("cpu: SDMAON busy, rewinding pc");
                    self.psw.pc -= 1;
                }
                Err(StartError::Rejected) => {
                    error!("cpu: SDMAON rejected");
                    interrupts.raise(Interrupt::IoEnd);
                }
            },
        }
        Step::Continue
    }

    fn arithmetic(
        &mut self,
        opcode: Opcode,
        decoded: Decoded,
        bus: &Bus,
        interrupts: &InterruptLatch,
    ) {
        let Some(value) = self.operand_value(decoded, bus, interrupts) else {
            return;
        };
        let op = match opcode {
            Opcode::Sum => ArithOp::Add,
            Opcode::Res => ArithOp::Sub,
            Opcode::Mult => ArithOp::Mul,
            _ => ArithOp::Div,
        };
        if op == ArithOp::Div && value.value() == 0 {
            error!("cpu: division by zero");
            interrupts.raise(Interrupt::Overflow);
            return;
        }
        let (result, cc) = alu::arithmetic(op, self.ac, value);
        self.ac = result;
        self.psw.cc = cc;
        debug!(
            "cpu: {} -> ac {}, cc {:?}",
            opcode.mnemonic(),
            self.ac,
            self.psw.cc
        );
    }

    fn jump_if(&mut self, taken: bool, operand: i64) {
        if taken {
            self.psw.pc = operand;
            debug!("cpu: jump taken -> pc {operand}");
        }
    }

    /// Resolve the operand per its addressing mode. `None` means the
    /// instruction aborted after raising an interrupt; the tick still
    /// completes.
    fn operand_value(
        &mut self,
        decoded: Decoded,
        bus: &Bus,
        interrupts: &InterruptLatch,
    ) -> Option<Word> {
        let Some(mode) = AddressingMode::from_digit(decoded.mode) else {
            error!("cpu: invalid addressing mode {}", decoded.mode);
            interrupts.raise(Interrupt::InvalidOp);
            return None;
        };
        match mode.logical_address(decoded.operand, self.rx) {
            None => Some(Word(decoded.operand)),
            Some(logical) => {
                let physical = self.translate_or_raise(logical, interrupts)?;
                match bus.read(physical, BusClient::Cpu) {
                    Ok(word) => Some(word),
                    Err(fault) => {
                        error!("cpu: operand read at {physical} failed: {fault}");
                        interrupts.raise(Interrupt::InvAddr);
                        None
                    }
                }
            }
        }
    }

    /// Effective physical address for the store-form instructions and
    /// POP; immediate mode is illegal here.
    fn store_address(&mut self, decoded: Decoded, interrupts: &InterruptLatch) -> Option<i64> {
        let Some(mode) = AddressingMode::from_digit(decoded.mode) else {
            error!("cpu: invalid addressing mode {}", decoded.mode);
            interrupts.raise(Interrupt::InvalidOp);
            return None;
        };
        let Some(logical) = mode.logical_address(decoded.operand, self.rx) else {
            error!("cpu: immediate mode is illegal for store-form instructions");
            interrupts.raise(Interrupt::InvalidOp);
            return None;
        };
        self.translate_or_raise(logical, interrupts)
    }

    fn translate_or_raise(&self, logical: i64, interrupts: &InterruptLatch) -> Option<i64> {
        match mmu::translate(logical, self.psw.mode, self.rb, self.rl) {
            Ok(physical) => Some(physical),
            Err(violation) => {
                error!("cpu: {violation}");
                interrupts.raise(Interrupt::InvAddr);
                None
            }
        }
    }

    fn store(
        &mut self,
        opcode: Opcode,
        decoded: Decoded,
        word: Word,
        bus: &Bus,
        interrupts: &InterruptLatch,
    ) {
        let Some(physical) = self.store_address(decoded, interrupts) else {
            return;
        };
        if let Err(fault) = bus.write(physical, word, BusClient::Cpu) {
            error!("cpu: {} write failed: {fault}", opcode.mnemonic());
            interrupts.raise(Interrupt::InvAddr);
        } else {
            debug!("cpu: {} {word} -> [{physical}]", opcode.mnemonic());
        }
    }

    fn require_kernel(&self, opcode: Opcode, interrupts: &InterruptLatch) -> bool {
        if self.psw.mode == Mode::User {
            error!("cpu: {} requires kernel mode", opcode.mnemonic());
            interrupts.raise(Interrupt::SyscallInvalid);
            return false;
        }
        true
    }

    /// Push a word onto the kernel stack. The stack grows downward:
    /// predecrement, then write physically through the bus.
    fn push(&mut self, word: Word, bus: &Bus) -> Result<(), Step> {
        let next = self.sp - 1;
        if next < STACK_FLOOR {
            error!("cpu: stack overflow (sp would reach {next})");
            return Err(Step::Fatal(Interrupt::Overflow));
        }
        bus.write(next, word, BusClient::Cpu).map_err(Step::Fault)?;
        self.sp = next;
        Ok(())
    }

    /// Pop a word: read where SP points, then postincrement.
    fn pop(&mut self, bus: &Bus) -> Result<Word, Step> {
        if self.sp >= STACK_TOP {
            error!("cpu: stack underflow (sp {})", self.sp);
            return Err(Step::Fatal(Interrupt::Underflow));
        }
        let word = bus.read(self.sp, BusClient::Cpu).map_err(Step::Fault)?;
        self.sp += 1;
        Ok(word)
    }

    fn deliver(&mut self, interrupt: Interrupt, bus: &Bus, dma: &Dma) -> Step {
        if interrupt.is_fatal() {
            error!("cpu: fatal interrupt {interrupt}");
            return Step::Fatal(interrupt);
        }
        if interrupt == Interrupt::IoEnd && dma.state() != 0 {
            error!("cpu: I/O completion reported a failed transfer");
            return Step::Fatal(interrupt);
        }
        self.enter_interrupt(interrupt, bus)
    }

    /// Save the context, switch to kernel mode with interrupts masked,
    /// and vector to the handler.
    fn enter_interrupt(&mut self, interrupt: Interrupt, bus: &Bus) -> Step {
        info!("cpu: entering interrupt {interrupt}");
        // Save order must mirror the RETRN restore exactly:
        // PC, AC, RX, RB, RL, CC, Mode.
        let frame = [
            Word(self.psw.pc),
            self.ac,
            Word(self.rx),
            Word(self.rb),
            Word(self.rl),
            Word(self.psw.cc.code()),
            Word(self.psw.mode.code()),
        ];
        for word in frame {
            if let Err(step) = self.push(word, bus) {
                return step;
            }
        }
        self.psw.mode = Mode::Kernel;
        self.psw.interrupts_enabled = false;

        match bus.read(interrupt.code(), BusClient::Cpu) {
            Ok(handler) => {
                self.psw.pc = handler.0;
                info!("cpu: context saved, vectoring to {}", self.psw.pc);
                Step::Continue
            }
            Err(fault) => {
                error!("cpu: interrupt vector read failed: {fault}");
                Step::Fault(fault)
            }
        }
    }

    /// `RETRN`: restore the context saved at interrupt entry, in reverse
    /// order, and atomically re-enable interrupts.
    fn retrn(&mut self, bus: &Bus, interrupts: &InterruptLatch) -> Step {
        if self.psw.mode == Mode::User {
            error!("cpu: RETRN in user mode");
            interrupts.raise(Interrupt::SyscallInvalid);
            return Step::Continue;
        }
        let mut frame = [Word::ZERO; 7];
        for slot in &mut frame {
            match self.pop(bus) {
                Ok(word) => *slot = word,
                Err(Step::Fatal(interrupt)) => {
                    interrupts.raise(interrupt);
                    return Step::Continue;
                }
                Err(step) => return step,
            }
        }
        let [mode, cc, rl, rb, rx, ac, pc] = frame;
        self.psw.mode = Mode::from_code(mode.0);
        self.psw.cc = Cond::from_code(cc.0);
        self.rl = rl.0;
        self.rb = rb.0;
        self.rx = rx.0;
        self.ac = ac;
        self.psw.pc = pc.0;
        self.psw.interrupts_enabled = true;
        info!("cpu: RETRN, resuming at pc {}", self.psw.pc);
        Step::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deka::Disk;

    struct Fixture {
        cpu: Cpu,
        bus: Arc<Bus>,
        dma: Arc<Dma>,
        interrupts: Arc<InterruptLatch>,
    }

    /// A machine with the vector bootstrapped the way the driver does it:
    /// every slot points at the RETRN stub at physical 20.
    fn fixture() -> Fixture {
        let bus = Arc::new(Bus::new());
        let disk = Arc::new(Disk::new());
        let interrupts = Arc::new(InterruptLatch::new());
        let dma = Arc::new(Dma::new(
            Arc::clone(&bus),
            Arc::clone(&disk),
            Arc::clone(&interrupts),
        ));
        for slot in 0..20 {
            bus.write(slot, Word(20), BusClient::Cpu).unwrap();
        }
        bus.write(20, Word(14_000_000), BusClient::Cpu).unwrap();
        Fixture {
            cpu: Cpu::new(),
            bus,
            dma,
            interrupts,
        }
    }

    fn load_user_program(fixture: &Fixture, cpu: &mut Cpu, words: &[i64]) {
        for (offset, &word) in words.iter().enumerate() {
            fixture
                .bus
                .write(300 + offset as i64, Word(word), BusClient::Loader)
                .unwrap();
        }
        cpu.rb = 300;
        cpu.rl = 1999;
        cpu.sp = STACK_TOP;
        cpu.psw.pc = 0;
        cpu.psw.mode = Mode::User;
    }

    fn step(fixture: &mut Fixture) -> Step {
        let Fixture {
            cpu,
            bus,
            dma,
            interrupts,
        } = fixture;
        cpu.step(bus, dma, interrupts)
    }

    #[test]
    fn push_then_pop_restores_sp_and_value() {
        let mut f = fixture();
        f.cpu.sp = STACK_TOP;
        f.cpu.push(Word(1234), &f.bus).unwrap();
        assert_eq!(f.cpu.sp, STACK_TOP - 1);
        let word = f.cpu.pop(&f.bus).unwrap();
        assert_eq!(word, Word(1234));
        assert_eq!(f.cpu.sp, STACK_TOP);
    }

    #[test]
    fn push_below_the_floor_overflows() {
        let mut f = fixture();
        f.cpu.sp = STACK_FLOOR;
        assert_eq!(
            f.cpu.push(Word(1), &f.bus),
            Err(Step::Fatal(Interrupt::Overflow))
        );
    }

    #[test]
    fn pop_at_the_resting_position_underflows() {
        let mut f = fixture();
        f.cpu.sp = STACK_TOP;
        assert_eq!(f.cpu.pop(&f.bus), Err(Step::Fatal(Interrupt::Underflow)));
    }

    #[test]
    fn load_sum_and_store_through_the_segment() {
        let mut f = fixture();
        let mut cpu = Cpu::new();
        // LOAD #5; SUM #3; STR 10
        load_user_program(&f, &mut cpu, &[4_100_005, 100_003, 5_000_010]);
        f.cpu = cpu;

        assert_eq!(step(&mut f), Step::Continue);
        assert_eq!(f.cpu.ac, Word(5));
        assert_eq!(step(&mut f), Step::Continue);
        assert_eq!(f.cpu.ac, Word(8));
        assert_eq!(f.cpu.psw.cc, Cond::Greater);
        assert_eq!(step(&mut f), Step::Continue);
        assert_eq!(f.bus.read(310, BusClient::Cpu).unwrap(), Word(8));
    }

    #[test]
    fn indexed_addressing_adds_rx() {
        let mut f = fixture();
        let mut cpu = Cpu::new();
        // LOADRX #4; LOAD 2,X (logical 2 + 4 = 6 -> physical 306)
        load_user_program(&f, &mut cpu, &[6_100_004, 4_200_002, 0, 0, 0, 0, 777]);
        f.cpu = cpu;

        assert_eq!(step(&mut f), Step::Continue);
        assert_eq!(f.cpu.rx, 4);
        assert_eq!(step(&mut f), Step::Continue);
        assert_eq!(f.cpu.ac, Word(777));
    }

    #[test]
    fn conditional_jumps_follow_the_condition_code() {
        let mut f = fixture();
        let mut cpu = Cpu::new();
        // LOAD #5; COMP #5; JMPE 5
        load_user_program(&f, &mut cpu, &[4_100_005, 8_100_005, 9_000_005]);
        f.cpu = cpu;

        for _ in 0..3 {
            assert_eq!(step(&mut f), Step::Continue);
        }
        assert_eq!(f.cpu.psw.cc, Cond::Equal);
        assert_eq!(f.cpu.psw.pc, 5);
    }

    #[test]
    fn immediate_store_is_an_invalid_operation() {
        let mut f = fixture();
        let mut cpu = Cpu::new();
        // STR #7 is illegal
        load_user_program(&f, &mut cpu, &[5_100_007]);
        f.cpu = cpu;

        assert_eq!(step(&mut f), Step::Continue);
        assert_eq!(f.interrupts.pending(), Some(Interrupt::InvalidOp));
    }

    #[test]
    fn privileged_instruction_in_user_mode_raises() {
        let mut f = fixture();
        let mut cpu = Cpu::new();
        // CHMOD #1 from user mode
        load_user_program(&f, &mut cpu, &[18_100_001]);
        f.cpu = cpu;

        assert_eq!(step(&mut f), Step::Continue);
        assert_eq!(f.cpu.psw.mode, Mode::User);
        assert_eq!(f.interrupts.pending(), Some(Interrupt::SyscallInvalid));
    }

    #[test]
    fn illegal_opcode_becomes_a_fatal_interrupt() {
        let mut f = fixture();
        let mut cpu = Cpu::new();
        load_user_program(&f, &mut cpu, &[99_000_000]);
        f.cpu = cpu;

        assert_eq!(step(&mut f), Step::Continue);
        assert_eq!(step(&mut f), Step::Fatal(Interrupt::InvInstr));
    }

    #[test]
    fn segment_violation_is_fatal_and_leaves_memory_untouched() {
        let mut f = fixture();
        let mut cpu = Cpu::new();
        // STR 50 with a limit of 310: physical 350 is out of bounds.
        load_user_program(&f, &mut cpu, &[5_000_050]);
        cpu.rl = 310;
        cpu.ac = Word(42);
        f.cpu = cpu;

        assert_eq!(step(&mut f), Step::Continue);
        assert_eq!(step(&mut f), Step::Fatal(Interrupt::InvAddr));
        assert_eq!(f.bus.read(350, BusClient::Cpu).unwrap(), Word::ZERO);
    }

    #[test]
    fn division_by_zero_preserves_ac() {
        let mut f = fixture();
        let mut cpu = Cpu::new();
        // DIVI #0
        load_user_program(&f, &mut cpu, &[3_100_000]);
        cpu.ac = Word(10);
        f.cpu = cpu;

        assert_eq!(step(&mut f), Step::Continue);
        assert_eq!(f.cpu.ac, Word(10));
        assert_eq!(step(&mut f), Step::Fatal(Interrupt::Overflow));
    }

    #[test]
    fn svc_saves_and_retrn_restores_the_full_context() {
        let mut f = fixture();
        let mut cpu = Cpu::new();
        // SVC; the handler is the bootstrap RETRN stub.
        load_user_program(&f, &mut cpu, &[13_000_000, 0]);
        cpu.ac = Word(7);
        cpu.rx = 9;
        cpu.psw.cc = Cond::Greater;
        f.cpu = cpu;

        assert_eq!(step(&mut f), Step::Continue); // SVC raises
        assert_eq!(step(&mut f), Step::Continue); // entry vectors to 20
        assert_eq!(f.cpu.psw.mode, Mode::Kernel);
        assert!(!f.cpu.psw.interrupts_enabled);
        assert_eq!(f.cpu.psw.pc, 20);
        assert_eq!(step(&mut f), Step::Continue); // RETRN restores

        assert_eq!(f.cpu.ac, Word(7));
        assert_eq!(f.cpu.rx, 9);
        assert_eq!(f.cpu.psw.cc, Cond::Greater);
        assert_eq!(f.cpu.psw.mode, Mode::User);
        assert!(f.cpu.psw.interrupts_enabled);
        assert_eq!(f.cpu.psw.pc, 1);
        assert_eq!(f.cpu.sp, STACK_TOP);
    }

    #[test]
    fn retrn_in_user_mode_is_a_privilege_violation() {
        let mut f = fixture();
        let mut cpu = Cpu::new();
        load_user_program(&f, &mut cpu, &[14_000_000]);
        f.cpu = cpu;

        assert_eq!(step(&mut f), Step::Continue);
        assert_eq!(f.interrupts.pending(), Some(Interrupt::SyscallInvalid));
    }

    #[test]
    fn psh_and_pop_move_words_through_the_stack() {
        let mut f = fixture();
        let mut cpu = Cpu::new();
        // PSH #321; POP 5 (physical 305)
        load_user_program(&f, &mut cpu, &[25_100_321, 26_000_005]);
        f.cpu = cpu;

        assert_eq!(step(&mut f), Step::Continue);
        assert_eq!(f.cpu.sp, STACK_TOP - 1);
        assert_eq!(step(&mut f), Step::Continue);
        assert_eq!(f.cpu.sp, STACK_TOP);
        assert_eq!(f.bus.read(305, BusClient::Cpu).unwrap(), Word(321));
    }

    #[test]
    fn masked_interrupts_wait_for_hab() {
        let mut f = fixture();
        let mut cpu = Cpu::new();
        // DHAB; SVC; HAB
        load_user_program(&f, &mut cpu, &[16_000_000, 13_000_000, 15_000_000, 0]);
        f.cpu = cpu;

        assert_eq!(step(&mut f), Step::Continue); // DHAB
        assert_eq!(step(&mut f), Step::Continue); // SVC latches
        assert_eq!(step(&mut f), Step::Continue); // HAB executes; SVC still latched
        assert_eq!(f.cpu.psw.pc, 3);
        assert_eq!(step(&mut f), Step::Continue); // delivery
        assert_eq!(f.cpu.psw.pc, 20);
        assert_eq!(f.cpu.psw.mode, Mode::Kernel);
    }
}

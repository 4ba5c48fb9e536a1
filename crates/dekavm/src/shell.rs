//! The interactive shell: `cargar`, `ejecutar`, `debug`, `salir`.

use crate::instruction::{Decoded, Opcode};
use crate::interrupt::Interrupt;
use crate::machine::Machine;
use crate::processor::cpu::{Cpu, Step};
use crate::processor::run::{RunConfig, RunOutcome};
use std::io::{self, BufRead, Write};
use std::path::Path;

fn print_banner() {
    println!();
    println!("Shell");
    println!("Commands:");
    println!("  cargar <file>  - load a program into memory");
    println!("  ejecutar       - run the loaded program");
    println!("  debug          - step through with register state");
    println!("  salir          - shut the simulator down");
    println!();
}

fn print_registers(cpu: &Cpu) {
    println!();
    println!("[CPU STATE] ------------------------------------");
    println!(
        " PC: {:08} | IR: {} | AC: {}",
        cpu.psw.pc, cpu.ir, cpu.ac
    );
    println!(
        " RX: {:08} | SP: {:08} | Mode: {}",
        cpu.rx, cpu.sp, cpu.psw.mode
    );
    println!(
        " RB: {:08} | RL: {:08} | CC: {}",
        cpu.rb,
        cpu.rl,
        cpu.psw.cc.code()
    );
    println!("------------------------------------------------");
}

fn prompt(text: &str) {
    print!("{text}");
    let _ = io::stdout().flush();
}

/// Drive the shell until `salir` or end of input. Returns the process
/// exit code: 0 on a clean shutdown, else the last fatal interrupt code.
pub fn run(machine: &mut Machine) -> u8 {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut last_fatal: Option<Interrupt> = None;

    print_banner();
    loop {
        prompt("Shell> ");
        let Some(Ok(line)) = lines.next() else {
            break;
        };
        let command = line.trim();

        if command == "salir" {
            println!("Shutting the system down...");
            break;
        } else if command == "cargar" {
            println!("Usage: cargar <file>");
        } else if let Some(rest) = command.strip_prefix("cargar ") {
            let filename = rest.trim();
            if filename.is_empty() {
                println!("Usage: cargar <file>");
                continue;
            }
            match machine.load(Path::new(filename)) {
                Ok(info) => {
                    println!("Program loaded: {} words.", info.n_words);
                    println!(
                        "Process ready: PC={}, RB={}, RL={}",
                        machine.cpu().psw.pc,
                        machine.cpu().rb,
                        machine.cpu().rl
                    );
                }
                Err(error) => println!("Load failed: {error}"),
            }
        } else if command == "ejecutar" {
            if let Some(fatal) = execute(machine) {
                last_fatal = Some(fatal);
            }
        } else if command == "debug" {
            if let Some(fatal) = debug(machine, &mut lines) {
                last_fatal = Some(fatal);
            }
        } else if !command.is_empty() {
            println!("Unrecognized command.");
        }
    }

    machine.shutdown();
    last_fatal.map_or(0, |interrupt| interrupt.code() as u8)
}

fn execute(machine: &mut Machine) -> Option<Interrupt> {
    if !machine.loaded() {
        println!("Error: no program loaded.");
        return None;
    }
    println!("Running...");
    let summary = machine.run(&RunConfig::default());
    let fatal = summary.fatal();
    match summary.outcome {
        RunOutcome::ProgramEnd => println!(
            ">> End of program: no more instructions (PC={}).",
            machine.cpu().psw.pc
        ),
        RunOutcome::Fatal(interrupt) => println!(">> CPU stopped: {interrupt}"),
        RunOutcome::Fault(fault) => println!(">> Hardware fault: {fault}"),
        RunOutcome::HitInstructionLimit | RunOutcome::InProgress => {}
    }
    print_registers(machine.cpu());
    fatal
}

fn debug<I>(machine: &mut Machine, lines: &mut I) -> Option<Interrupt>
where
    I: Iterator<Item = io::Result<String>>,
{
    if !machine.loaded() {
        println!("Error: no program loaded.");
        return None;
    }
    println!("Commands: 'step', 'regs', 'salir'");
    print_registers(machine.cpu());
    let mut last_fatal = None;

    loop {
        prompt("Debug> ");
        let Some(Ok(line)) = lines.next() else {
            break;
        };
        match line.trim() {
            "step" => {
                if let Some((pc, word)) = machine.peek_instruction() {
                    let decoded = Decoded::from_word(word);
                    let mnemonic = Opcode::from_code(decoded.opcode)
                        .map_or("UNKNOWN", Opcode::mnemonic);
                    println!(">> line {} (PC={pc}) | instr: {mnemonic}", pc + 1);
                }
                match machine.step() {
                    Step::Continue => print_registers(machine.cpu()),
                    Step::Fatal(interrupt) => {
                        println!(">> Program terminated: {interrupt}");
                        last_fatal = Some(interrupt);
                        break;
                    }
                    Step::Fault(fault) => {
                        println!(">> Hardware fault: {fault}");
                        break;
                    }
                }
            }
            "regs" => print_registers(machine.cpu()),
            "salir" => {
                println!(">> Leaving the debugger.");
                break;
            }
            other if !other.is_empty() => println!("Unknown debug command."),
            _ => {}
        }
    }
    last_fatal
}

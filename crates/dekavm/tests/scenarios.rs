//! End-to-end scenarios driven through the `Machine` API.

use deka::{BusClient, Word};
use dekavm::loader::LoadInfo;
use dekavm::{Interrupt, Machine, Mode, RunConfig, RunOutcome, USER_PROGRAM_START};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Stream `words` into the user segment and configure the CPU for them.
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
fn arithmetic_then_svc_runs_the_handler_and_completes() {
    init_logs();
    let mut machine = Machine::new();
    // LOAD #5; SUM #3; SVC
    attach_program(&mut machine, &[4_100_005, 100_003, 13_000_000]);

    let summary = machine.run(&RunConfig::unpaced());

    // The syscall vectors through slot 2 to the RETRN stub and resumes,
    // so the program still ends normally with its state intact.
    assert!(summary.program_ended());
    assert_eq!(machine.cpu().ac, Word(8));
    assert_eq!(machine.cpu().psw.mode, Mode::User);
    assert!(machine.cpu().psw.interrupts_enabled);
    assert_eq!(machine.cpu().psw.pc, 3);
}

#[test]
fn segment_violation_terminates_without_touching_memory() {
    init_logs();
    let mut machine = Machine::new();
    // STR 50 with the limit pulled down to 310: physical 350 is outside.
    attach_program(&mut machine, &[5_000_050]);
    machine.cpu_mut().rl = 310;
    machine.cpu_mut().ac = Word(42);

    let summary = machine.run(&RunConfig::unpaced());
    assert_eq!(summary.outcome, RunOutcome::Fatal(Interrupt::InvAddr));
    assert_eq!(
        machine.bus().read(350, BusClient::Cpu).unwrap(),
        Word::ZERO
    );
}

#[test]
fn division_by_zero_is_fatal_with_ac_preserved() {
    init_logs();
    let mut machine = Machine::new();
    // DIVI #0
    attach_program(&mut machine, &[3_100_000]);
    machine.cpu_mut().ac = Word(10);

    let summary = machine.run(&RunConfig::unpaced());
    assert_eq!(summary.fatal(), Some(Interrupt::Overflow));
    assert_eq!(machine.cpu().ac, Word(10));
}

#[test]
fn comparison_drives_a_countdown_loop() {
    init_logs();
    let mut machine = Machine::new();
    // Count AC down from 3 to 0:
    //   LOAD #3; RES #1; COMP #0; JMPNE 1
    attach_program(
        &mut machine,
        &[4_100_003, 1_100_001, 8_100_000, 10_000_001],
    );

    let summary = machine.run(&RunConfig::unpaced());
    assert!(summary.program_ended());
    assert_eq!(machine.cpu().ac, Word::ZERO);
    // 1 load + 3 iterations of (RES, COMP, JMPNE)
    assert_eq!(summary.instructions_executed, 10);
}

#[test]
fn loads_a_program_file_and_runs_it() {
    init_logs();
    let source = "\
// add five and three, then trap
.NombreProg suma
.NumeroPalabras 3
_start 1
04100005
00100003
13000000
";
    let path = std::env::temp_dir().join(format!("dekavm-scenario-{}.txt", std::process::id()));
    std::fs::write(&path, source).unwrap();

    let mut machine = Machine::new();
    let info = machine.load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(info.n_words, 3);
    assert_eq!(info.index_start, 0);
    assert_eq!(info.name.as_deref(), Some("suma"));
    assert_eq!(machine.cpu().rb, USER_PROGRAM_START);
    assert_eq!(machine.cpu().rl, 1999);

    let summary = machine.run(&RunConfig::unpaced());
    assert!(summary.program_ended());
    assert_eq!(machine.cpu().ac, Word(8));
}

#[test]
fn word_count_mismatch_refuses_the_load() {
    init_logs();
    let source = ".NumeroPalabras 5\n04100005\n";
    let path = std::env::temp_dir().join(format!("dekavm-mismatch-{}.txt", std::process::id()));
    std::fs::write(&path, source).unwrap();

    let mut machine = Machine::new();
    let result = machine.load(&path);
    std::fs::remove_file(&path).ok();

    assert!(result.is_err());
    assert!(!machine.loaded());
}

#[test]
fn stack_discipline_survives_nested_data_movement() {
    init_logs();
    let mut machine = Machine::new();
    // PSH #7; PSH #9; POP 20; POP 21
    attach_program(
        &mut machine,
        &[25_100_007, 25_100_009, 26_000_020, 26_000_021],
    );

    let summary = machine.run(&RunConfig::unpaced());
    assert!(summary.program_ended());
    // Pops come back in reverse push order.
    assert_eq!(
        machine.bus().read(320, BusClient::Cpu).unwrap(),
        Word(9)
    );
    assert_eq!(
        machine.bus().read(321, BusClient::Cpu).unwrap(),
        Word(7)
    );
    assert_eq!(machine.cpu().sp, 299);
}

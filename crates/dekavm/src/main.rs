use dekavm::Machine;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    let mut machine = Machine::new();
    let code = dekavm::shell::run(&mut machine);
    ExitCode::from(code)
}

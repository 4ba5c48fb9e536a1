//! Instruction word decoding and the opcode table.

use deka::Word;

/// Raw fields of an instruction word: `OO M DDDDD`.
///
/// Extraction is pure digit arithmetic; validity (known opcode, known
/// addressing mode) is judged by the execution stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub opcode: i64,
    pub mode: i64,
    pub operand: i64,
}

impl Decoded {
    #[must_use]
    pub fn from_word(word: Word) -> Self {
        let raw = word.0;
        Self {
            operand: raw % 100_000,
            mode: (raw / 100_000) % 10,
            opcode: raw / 1_000_000,
        }
    }
}

/// The 34 operations of the instruction set, in opcode order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Sum,
    Res,
    Mult,
    Divi,
    Load,
    Str,
    Loadrx,
    Strrx,
    Comp,
    Jmpe,
    Jmpne,
    Jmplt,
    Jmplgt,
    Svc,
    Retrn,
    Hab,
    Dhab,
    Tti,
    Chmod,
    Loadrb,
    Strrb,
    Loadrl,
    Strrl,
    Loadsp,
    Strsp,
    Psh,
    Pop,
    J,
    Sdmap,
    Sdmac,
    Sdmas,
    Sdmaio,
    Sdmam,
    Sdmaon,
}

const OPCODES: [Opcode; 34] = [
    Opcode::Sum,
    Opcode::Res,
    Opcode::Mult,
    Opcode::Divi,
    Opcode::Load,
    Opcode::Str,
    Opcode::Loadrx,
    Opcode::Strrx,
    Opcode::Comp,
    Opcode::Jmpe,
    Opcode::Jmpne,
    Opcode::Jmplt,
    Opcode::Jmplgt,
    Opcode::Svc,
    Opcode::Retrn,
    Opcode::Hab,
    Opcode::Dhab,
    Opcode::Tti,
    Opcode::Chmod,
    Opcode::Loadrb,
    Opcode::Strrb,
    Opcode::Loadrl,
    Opcode::Strrl,
    Opcode::Loadsp,
    Opcode::Strsp,
    Opcode::Psh,
    Opcode::Pop,
    Opcode::J,
    Opcode::Sdmap,
    Opcode::Sdmac,
    Opcode::Sdmas,
    Opcode::Sdmaio,
    Opcode::Sdmam,
    Opcode::Sdmaon,
];

impl Opcode {
    /// Look up an opcode by its numeric code; `None` for anything the
    /// machine does not implement.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Opcode> {
        usize::try_from(code).ok().and_then(|c| OPCODES.get(c)).copied()
    }

    /// Assembly mnemonic, as the debugger prints it.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Sum => "SUM",
            Opcode::Res => "RES",
            Opcode::Mult => "MULT",
            Opcode::Divi => "DIVI",
            Opcode::Load => "LOAD",
            Opcode::Str => "STR",
            Opcode::Loadrx => "LOADRX",
            Opcode::Strrx => "STRRX",
            Opcode::Comp => "COMP",
            Opcode::Jmpe => "JMPE",
            Opcode::Jmpne => "JMPNE",
            Opcode::Jmplt => "JMPLT",
            Opcode::Jmplgt => "JMPLGT",
            Opcode::Svc => "SVC",
            Opcode::Retrn => "RETRN",
            Opcode::Hab => "HAB",
            Opcode::Dhab => "DHAB",
            Opcode::Tti => "TTI",
            Opcode::Chmod => "CHMOD",
            Opcode::Loadrb => "LOADRB",
            Opcode::Strrb => "STRRB",
            Opcode::Loadrl => "LOADRL",
            Opcode::Strrl => "STRRL",
            Opcode::Loadsp => "LOADSP",
            Opcode::Strsp => "STRSP",
            Opcode::Psh => "PSH",
            Opcode::Pop => "POP",
            Opcode::J => "J",
            Opcode::Sdmap => "SDMAP",
            Opcode::Sdmac => "SDMAC",
            Opcode::Sdmas => "SDMAS",
            Opcode::Sdmaio => "SDMAIO",
            Opcode::Sdmam => "SDMAM",
            Opcode::Sdmaon => "SDMAON",
        }
    }
}

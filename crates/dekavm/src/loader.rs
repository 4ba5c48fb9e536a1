//! The program text loader.
//!
//! Programs are line-oriented ASCII: `//` comments, the `_start`,
//! `.NumeroPalabras`, and `.NombreProg` directives, and decimal words
//! streamed to consecutive physical addresses through the bus.

use deka::{Bus, BusClient, HwFault, Word};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read program file: {0}")]
    Io(#[from] io::Error),

    /// `.NumeroPalabras` must match the words actually streamed.
    #[error("header declares {declared} words but {loaded} were read")]
    WordCountMismatch { declared: i64, loaded: i64 },

    #[error("bad word on line {line}: {text:?}")]
    BadWord { line: usize, text: String },

    #[error("memory write failed at address {address}: {fault}")]
    Write { address: i64, fault: HwFault },
}

/// What the loader learned about a program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadInfo {
    /// Physical base the words were written at.
    pub load_address: i64,
    /// Number of words streamed.
    pub n_words: i64,
    /// Zero-based entry offset (the `_start` line number minus one).
    pub index_start: i64,
    /// `.NombreProg`, when present.
    pub name: Option<String>,
}

/// Load a program file at `base_address`.
pub fn load_program(bus: &Bus, path: &Path, base_address: i64) -> Result<LoadInfo, LoadError> {
    info!(
        "loader: loading {} at physical {base_address}",
        path.display()
    );
    let file = File::open(path)?;
    let info = load_from(bus, BufReader::new(file), base_address)?;
    info!("loader: finished, {} words written", info.n_words);
    Ok(info)
}

/// Load program text from any reader; `load_program` is the file-backed
/// wrapper around this.
pub fn load_from<R: BufRead>(
    bus: &Bus,
    reader: R,
    base_address: i64,
) -> Result<LoadInfo, LoadError> {
    let mut info = LoadInfo {
        load_address: base_address,
        ..LoadInfo::default()
    };
    let mut declared: Option<i64> = None;
    let mut offset = 0i64;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let number = index + 1;
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };
        if first.starts_with("//") {
            continue;
        }
        let rest = line.split_whitespace().nth(1);
        match first {
            "_start" => match rest.and_then(|t| t.parse::<i64>().ok()) {
                Some(entry_line) => {
                    info.index_start = (entry_line - 1).max(0);
                    debug!(
                        "loader: entry line {entry_line} (offset {})",
                        info.index_start
                    );
                }
                None => warn!("loader: malformed _start on line {number}"),
            },
            ".NumeroPalabras" => match rest.and_then(|t| t.parse::<i64>().ok()) {
                Some(count) => {
                    declared = Some(count);
                    debug!("loader: header declares {count} words");
                }
                None => warn!("loader: malformed .NumeroPalabras on line {number}"),
            },
            ".NombreProg" => {
                info.name = rest.map(str::to_owned);
                debug!("loader: program name {:?}", info.name);
            }
            token if starts_numeric(token) => {
                let word: i64 = token.parse().map_err(|_| LoadError::BadWord {
                    line: number,
                    text: token.to_owned(),
                })?;
                let address = base_address + offset;
                bus.write(address, Word(word), BusClient::Loader)
                    .map_err(|fault| LoadError::Write { address, fault })?;
                offset += 1;
            }
            token => debug!("loader: ignoring line {number}: {token:?}"),
        }
    }

    info.n_words = offset;
    if let Some(declared) = declared {
        if declared != offset {
            return Err(LoadError::WordCountMismatch {
                declared,
                loaded: offset,
            });
        }
    }
    Ok(info)
}

fn starts_numeric(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some('-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        Some(c) => c.is_ascii_digit(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn bus() -> Bus {
        Bus::new()
    }

    #[test]
    fn loads_words_at_consecutive_addresses() {
        let bus = bus();
        let source = "// demo\n04100005\n00100003\n13000000\n";
        let info = load_from(&bus, Cursor::new(source), 300).unwrap();

        assert_eq!(info.load_address, 300);
        assert_eq!(info.n_words, 3);
        assert_eq!(info.index_start, 0);
        assert_eq!(bus.read(300, BusClient::Cpu).unwrap(), Word(4_100_005));
        assert_eq!(bus.read(302, BusClient::Cpu).unwrap(), Word(13_000_000));
    }

    #[test]
    fn directives_fill_the_load_info() {
        let bus = bus();
        let source = "\
.NombreProg demo
.NumeroPalabras 2
_start 2
04100005
13000000
";
        let info = load_from(&bus, Cursor::new(source), 300).unwrap();
        assert_eq!(info.name.as_deref(), Some("demo"));
        assert_eq!(info.index_start, 1);
        assert_eq!(info.n_words, 2);
    }

    #[test]
    fn negative_words_are_legal() {
        let bus = bus();
        let info = load_from(&bus, Cursor::new("-42\n"), 500).unwrap();
        assert_eq!(info.n_words, 1);
        assert_eq!(bus.read(500, BusClient::Cpu).unwrap(), Word(-42));
    }

    #[test]
    fn word_count_mismatch_is_a_load_error() {
        let bus = bus();
        let source = ".NumeroPalabras 3\n04100005\n";
        match load_from(&bus, Cursor::new(source), 300) {
            Err(LoadError::WordCountMismatch { declared, loaded }) => {
                assert_eq!(declared, 3);
                assert_eq!(loaded, 1);
            }
            other => panic!("expected a word-count mismatch, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tokens_are_skipped() {
        let bus = bus();
        let source = "hello world\n\n04100005\n";
        let info = load_from(&bus, Cursor::new(source), 300).unwrap();
        assert_eq!(info.n_words, 1);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let bus = bus();
        assert!(matches!(
            load_from(&bus, Cursor::new("12x4\n"), 300),
            Err(LoadError::BadWord { line: 1, .. })
        ));
    }

    #[test]
    fn out_of_range_base_is_a_write_error() {
        let bus = bus();
        assert!(matches!(
            load_from(&bus, Cursor::new("1\n"), 2000),
            Err(LoadError::Write { address: 2000, .. })
        ));
    }
}

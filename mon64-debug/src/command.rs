// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use mon64_core::{MemSpace, MemoryOp, OpMask};

use crate::condition::{parse_number, Condition, ParseError};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CheckpointKind {
    Break,
    Watch,
    Trace,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Address {
    pub space: Option<MemSpace>,
    pub address: u16,
}

#[derive(Debug)]
pub enum Cmd {
    // Checkpoint
    Checkpoint {
        kind: CheckpointKind,
        ops: Option<OpMask>,
        range: Option<(Address, Option<u16>)>,
        condition: Option<Condition>,
    },
    Until(Option<Address>),
    Condition(u32, Condition),
    Command(u32, String),
    Delete(Option<u32>),
    Disable(Option<u32>),
    Enable(Option<u32>),
    Ignore(u32, u32),
    // Machine
    Memory(Option<Address>, Option<u16>),
    RegRead,
    RegWrite(Vec<(String, u16)>),
    // Monitor
    Exit,
    Quit,
    Radix(Option<u32>),
}

#[derive(Clone, Debug)]
struct Word {
    text: String,
    /// Character column, used for error carets.
    position: usize,
    /// Byte offset into the input line.
    offset: usize,
    quoted: bool,
}

struct Words<'a> {
    input: &'a str,
    words: Vec<Word>,
    pos: usize,
}

impl<'a> Words<'a> {
    fn next(&mut self) -> Option<Word> {
        let word = self.words.get(self.pos).cloned();
        if word.is_some() {
            self.pos += 1;
        }
        word
    }

    fn peek(&self) -> Option<&Word> {
        self.words.get(self.pos)
    }

    /// Remaining input from the next word on, with its column.
    fn rest(&mut self) -> Option<(&'a str, usize)> {
        let word = self.words.get(self.pos)?;
        let rest = (&self.input[word.offset..], word.position);
        self.pos = self.words.len();
        Some(rest)
    }

    fn end(&self) -> usize {
        self.input.chars().count()
    }
}

pub struct CommandParser {
    radix: u32,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self { radix: 16 }
    }
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_radix(&self) -> u32 {
        self.radix
    }

    pub fn set_radix(&mut self, radix: u32) {
        self.radix = radix;
    }

    pub fn parse(&self, input: &str) -> Result<Cmd, ParseError> {
        let mut words = Words {
            input,
            words: split_words(input)?,
            pos: 0,
        };
        let command = match words.next() {
            Some(word) => word,
            None => return Err(ParseError::new(0, "Missing command".to_string())),
        };
        match command.text.to_lowercase().as_str() {
            // Checkpoint
            "break" | "bk" => self.parse_checkpoint(CheckpointKind::Break, &mut words),
            "watch" | "w" => self.parse_checkpoint(CheckpointKind::Watch, &mut words),
            "trace" | "tr" => self.parse_checkpoint(CheckpointKind::Trace, &mut words),
            "until" | "un" => self.parse_until(&mut words),
            "condition" | "cond" => self.parse_condition(&mut words),
            "command" => self.parse_command(&mut words),
            "delete" | "del" => self.parse_index_maybe(&mut words).map(Cmd::Delete),
            "disable" | "dis" => self.parse_index_maybe(&mut words).map(Cmd::Disable),
            "enable" | "en" => self.parse_index_maybe(&mut words).map(Cmd::Enable),
            "ignore" => self.parse_ignore(&mut words),
            // Machine
            "mem" | "m" => self.parse_memory(&mut words),
            "registers" | "r" => self.parse_registers(&mut words),
            // Monitor
            "exit" | "x" => self.ensure_eos(&mut words).map(|_| Cmd::Exit),
            "quit" => self.ensure_eos(&mut words).map(|_| Cmd::Quit),
            "radix" | "rad" => self.parse_radix(&mut words),
            _ => Err(ParseError::new(
                command.position,
                format!("Invalid command {}", command.text),
            )),
        }
    }

    // -- Checkpoint

    fn parse_checkpoint(&self, kind: CheckpointKind, words: &mut Words) -> Result<Cmd, ParseError> {
        let mut ops: Option<OpMask> = None;
        while let Some(op) = words.peek().and_then(|word| parse_op(&word.text)) {
            words.next();
            ops = Some(ops.unwrap_or_default() | op);
        }
        let range = match words.peek() {
            Some(word) if !is_keyword(word, "if") => {
                let start = self.parse_address(words.next())?;
                let end = match words.peek() {
                    Some(word) if !is_keyword(word, "if") => {
                        Some(self.parse_address(words.next())?)
                    }
                    _ => None,
                };
                if let Some(end) = end {
                    if end.space.is_some() && end.space != start.space {
                        return Err(ParseError::new(0, "Memspace mismatch".to_string()));
                    }
                }
                Some((start, end.map(|end| end.address)))
            }
            _ => None,
        };
        let condition = match words.next() {
            Some(ref word) if is_keyword(word, "if") => Some(self.parse_expression(words)?),
            Some(word) => {
                return Err(ParseError::new(
                    word.position,
                    format!("Unexpected token {}", word.text),
                ))
            }
            None => None,
        };
        if range.is_none() && (ops.is_some() || condition.is_some()) {
            return Err(ParseError::new(words.end(), "Missing address".to_string()));
        }
        Ok(Cmd::Checkpoint {
            kind,
            ops,
            range,
            condition,
        })
    }

    fn parse_until(&self, words: &mut Words) -> Result<Cmd, ParseError> {
        let address = match words.peek() {
            Some(_) => Some(self.parse_address(words.next())?),
            None => None,
        };
        self.ensure_eos(words)?;
        Ok(Cmd::Until(address))
    }

    fn parse_condition(&self, words: &mut Words) -> Result<Cmd, ParseError> {
        let index = self.parse_index(words.next(), words.end())?;
        match words.next() {
            Some(ref word) if is_keyword(word, "if") => {}
            Some(word) => {
                return Err(ParseError::new(word.position, "Missing keyword if".to_string()))
            }
            None => return Err(ParseError::new(words.end(), "Missing keyword if".to_string())),
        }
        let condition = self.parse_expression(words)?;
        Ok(Cmd::Condition(index, condition))
    }

    fn parse_command(&self, words: &mut Words) -> Result<Cmd, ParseError> {
        let index = self.parse_index(words.next(), words.end())?;
        let command = match words.next() {
            Some(ref word) if word.quoted => word.text.clone(),
            Some(word) => {
                return Err(ParseError::new(
                    word.position,
                    "Command must be quoted".to_string(),
                ))
            }
            None => return Err(ParseError::new(words.end(), "Missing command".to_string())),
        };
        self.ensure_eos(words)?;
        Ok(Cmd::Command(index, command))
    }

    fn parse_ignore(&self, words: &mut Words) -> Result<Cmd, ParseError> {
        let index = self.parse_index(words.next(), words.end())?;
        let count = self.parse_index_maybe(words)?;
        Ok(Cmd::Ignore(index, count.unwrap_or(1)))
    }

    fn parse_expression(&self, words: &mut Words) -> Result<Condition, ParseError> {
        match words.rest() {
            Some((expr, position)) => {
                Condition::parse(expr, self.radix).map_err(|err| err.offset(position))
            }
            None => Err(ParseError::new(
                words.end(),
                "Missing expression".to_string(),
            )),
        }
    }

    // -- Machine

    fn parse_memory(&self, words: &mut Words) -> Result<Cmd, ParseError> {
        let start = match words.peek() {
            Some(_) => Some(self.parse_address(words.next())?),
            None => None,
        };
        let end = match words.peek() {
            Some(_) => Some(self.parse_address(words.next())?.address),
            None => None,
        };
        self.ensure_eos(words)?;
        Ok(Cmd::Memory(start, end))
    }

    fn parse_registers(&self, words: &mut Words) -> Result<Cmd, ParseError> {
        let mut ops = Vec::new();
        while let Some(name) = words.next() {
            match words.next() {
                Some(ref op) if op.text == "=" => {}
                Some(op) => {
                    return Err(ParseError::new(
                        op.position,
                        format!("Invalid operator {}", op.text),
                    ))
                }
                None => return Err(ParseError::new(words.end(), "Missing =".to_string())),
            }
            let value = self.parse_num(words.next(), words.end())?;
            ops.push((name.text.to_uppercase(), value));
            match words.next() {
                Some(ref sep) if sep.text == "," => {}
                Some(sep) => {
                    return Err(ParseError::new(
                        sep.position,
                        format!("Unexpected token {}", sep.text),
                    ))
                }
                None => break,
            }
        }
        if ops.is_empty() {
            Ok(Cmd::RegRead)
        } else {
            Ok(Cmd::RegWrite(ops))
        }
    }

    // -- Monitor

    fn parse_radix(&self, words: &mut Words) -> Result<Cmd, ParseError> {
        let radix = match words.next() {
            Some(word) => {
                let radix = match word.text.to_lowercase().as_str() {
                    "h" | "16" => 16,
                    "d" | "10" => 10,
                    "o" | "8" => 8,
                    "b" | "2" => 2,
                    _ => {
                        return Err(ParseError::new(
                            word.position,
                            format!("Invalid radix {}", word.text),
                        ))
                    }
                };
                Some(radix)
            }
            None => None,
        };
        self.ensure_eos(words)?;
        Ok(Cmd::Radix(radix))
    }

    // -- Helpers

    fn ensure_eos(&self, words: &mut Words) -> Result<(), ParseError> {
        match words.next() {
            Some(word) => Err(ParseError::new(
                word.position,
                format!("Unexpected token {}", word.text),
            )),
            None => Ok(()),
        }
    }

    fn parse_address(&self, word: Option<Word>) -> Result<Address, ParseError> {
        let word = match word {
            Some(word) => word,
            None => return Err(ParseError::new(0, "Missing address".to_string())),
        };
        let (space, text) = match word.text.find(':') {
            Some(pos) => {
                let prefix = &word.text[..pos];
                let space = MemSpace::from_prefix(prefix).ok_or_else(|| {
                    ParseError::new(word.position, format!("Invalid memspace {}", prefix))
                })?;
                (Some(space), &word.text[pos + 1..])
            }
            None => (None, word.text.as_str()),
        };
        let address = parse_number(text, self.radix).ok_or_else(|| {
            ParseError::new(word.position, format!("Invalid address {}", word.text))
        })?;
        Ok(Address { space, address })
    }

    fn parse_index(&self, word: Option<Word>, end: usize) -> Result<u32, ParseError> {
        match word {
            Some(word) => parse_number(&word.text, self.radix)
                .map(u32::from)
                .ok_or_else(|| {
                    ParseError::new(word.position, format!("Invalid number {}", word.text))
                }),
            None => Err(ParseError::new(end, "Missing argument".to_string())),
        }
    }

    fn parse_index_maybe(&self, words: &mut Words) -> Result<Option<u32>, ParseError> {
        let index = match words.peek() {
            Some(_) => Some(self.parse_index(words.next(), words.end())?),
            None => None,
        };
        self.ensure_eos(words)?;
        Ok(index)
    }

    fn parse_num(&self, word: Option<Word>, end: usize) -> Result<u16, ParseError> {
        match word {
            Some(word) => parse_number(&word.text, self.radix).ok_or_else(|| {
                ParseError::new(word.position, format!("Invalid number {}", word.text))
            }),
            None => Err(ParseError::new(end, "Missing argument".to_string())),
        }
    }
}

fn parse_op(text: &str) -> Option<MemoryOp> {
    match text.to_lowercase().as_str() {
        "load" => Some(MemoryOp::Load),
        "store" => Some(MemoryOp::Store),
        "exec" => Some(MemoryOp::Exec),
        _ => None,
    }
}

fn is_keyword(word: &Word, keyword: &str) -> bool {
    !word.quoted && word.text.eq_ignore_ascii_case(keyword)
}

fn split_words(input: &str) -> Result<Vec<Word>, ParseError> {
    let mut words = Vec::new();
    let mut iter = input.char_indices().enumerate().peekable();
    while let Some(&(position, (offset, c))) = iter.peek() {
        if c.is_whitespace() {
            iter.next();
            continue;
        }
        let mut text = String::new();
        if c == '"' {
            iter.next();
            let mut closed = false;
            for (_, (_, c)) in iter.by_ref() {
                if c == '"' {
                    closed = true;
                    break;
                }
                text.push(c);
            }
            if !closed {
                return Err(ParseError::new(position, "Unterminated string".to_string()));
            }
            words.push(Word {
                text,
                position,
                offset,
                quoted: true,
            });
            continue;
        }
        if c == ',' || c == '=' {
            iter.next();
            text.push(c);
        } else {
            while let Some(&(_, (_, c))) = iter.peek() {
                if c.is_whitespace() || c == ',' || c == '"' || c == '=' {
                    break;
                }
                iter.next();
                text.push(c);
            }
        }
        words.push(Word {
            text,
            position,
            offset,
            quoted: false,
        });
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Cmd {
        CommandParser::new().parse(input).unwrap()
    }

    fn parse_err(input: &str) -> ParseError {
        CommandParser::new().parse(input).err().unwrap()
    }

    #[test]
    fn break_exec_default() {
        match parse("break 1000") {
            Cmd::Checkpoint {
                kind,
                ops,
                range,
                condition,
            } => {
                assert_eq!(CheckpointKind::Break, kind);
                assert!(ops.is_none());
                let (start, end) = range.unwrap();
                assert_eq!(0x1000, start.address);
                assert_eq!(None, start.space);
                assert_eq!(None, end);
                assert!(condition.is_none());
            }
            _ => panic!("expected checkpoint"),
        }
    }

    #[test]
    fn watch_with_ops_range_and_condition() {
        match parse("w store 8:0400 07ff if A == $10 && X != 0") {
            Cmd::Checkpoint {
                kind,
                ops,
                range,
                condition,
            } => {
                assert_eq!(CheckpointKind::Watch, kind);
                assert_eq!(Some(OpMask::from(MemoryOp::Store)), ops);
                let (start, end) = range.unwrap();
                assert_eq!(Some(MemSpace::Disk8), start.space);
                assert_eq!(0x0400, start.address);
                assert_eq!(Some(0x07ff), end);
                assert_eq!(
                    "(A == $10) && (X != $00)",
                    condition.unwrap().to_string()
                );
            }
            _ => panic!("expected checkpoint"),
        }
    }

    #[test]
    fn break_without_address_lists() {
        match parse("bk") {
            Cmd::Checkpoint { range: None, .. } => {}
            _ => panic!("expected list"),
        }
        assert_eq!(7, parse_err("bk load").position);
    }

    #[test]
    fn condition_error_position_is_absolute() {
        let error = parse_err("cond 1 if A ==");
        assert_eq!(14, error.position);
        let error = parse_err("break 1000 if A # 1");
        assert_eq!(16, error.position);
    }

    #[test]
    fn command_requires_quotes() {
        match parse("command 2 \"mem 1000 1010\"") {
            Cmd::Command(2, command) => assert_eq!("mem 1000 1010", command),
            _ => panic!("expected command"),
        }
        assert_eq!(10, parse_err("command 2 mem").position);
        assert_eq!(10, parse_err("command 2 \"mem").position);
    }

    #[test]
    fn ignore_defaults_to_one() {
        match parse("ignore 3") {
            Cmd::Ignore(3, 1) => {}
            _ => panic!("expected ignore"),
        }
        match parse("ignore 3 a") {
            Cmd::Ignore(3, 10) => {}
            _ => panic!("expected ignore"),
        }
    }

    #[test]
    fn delete_enable_disable() {
        match parse("del") {
            Cmd::Delete(None) => {}
            _ => panic!("expected delete"),
        }
        match parse("en 2") {
            Cmd::Enable(Some(2)) => {}
            _ => panic!("expected enable"),
        }
        assert_eq!(6, parse_err("dis 2 3").position);
    }

    #[test]
    fn registers_write() {
        match parse("r a = 10, pc=$c000") {
            Cmd::RegWrite(ops) => assert_eq!(
                vec![("A".to_string(), 0x10), ("PC".to_string(), 0xc000)],
                ops
            ),
            _ => panic!("expected register write"),
        }
    }

    #[test]
    fn radix_uses_parser_radix() {
        let mut parser = CommandParser::new();
        parser.set_radix(10);
        match parser.parse("until 4096").unwrap() {
            Cmd::Until(Some(address)) => assert_eq!(0x1000, address.address),
            _ => panic!("expected until"),
        }
    }

    #[test]
    fn invalid_command() {
        let error = parse_err("  foo 1");
        assert_eq!(2, error.position);
        assert_eq!("Invalid command foo", error.message);
    }

    #[test]
    fn invalid_radix() {
        assert_eq!(6, parse_err("radix 7").position);
    }
}

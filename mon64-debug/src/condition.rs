// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![cfg_attr(feature = "cargo-clippy", allow(clippy::cast_lossless))]

use std::fmt;
use std::iter::{Enumerate, Peekable};
use std::str::Chars;

use mon64_core::{LineCycle, Machine, MemSpace};

// Design:
//   Conditions are parsed once into a tagged expression tree and evaluated on every
//   checkpoint hit. Evaluation only peeks memory so it never changes machine state.
//   Register names are resolved against the memspace interface at evaluation time.

const KNOWN_REGISTERS: [&str; 6] = ["A", "X", "Y", "PC", "SP", "FL"];

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseError {
    /// Character column of the offending token.
    pub position: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(position: usize, message: String) -> Self {
        Self { position, message }
    }

    pub fn offset(self, by: usize) -> Self {
        Self {
            position: self.position + by,
            message: self.message,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a number using the `$` (hex) and `%` (binary) prefixes or the given radix.
pub fn parse_number(text: &str, radix: u32) -> Option<u16> {
    let (digits, radix) = if text.starts_with('$') {
        (&text[1..], 16)
    } else if text.starts_with('%') {
        (&text[1..], 2)
    } else {
        (text, radix)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u16::from_str_radix(digits, radix).ok()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operator {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    fn from(op: &str) -> Option<Operator> {
        match op {
            "||" => Some(Operator::Or),
            "&&" => Some(Operator::And),
            "|" => Some(Operator::BitOr),
            "^" => Some(Operator::BitXor),
            "&" => Some(Operator::BitAnd),
            "==" => Some(Operator::Equal),
            "!=" => Some(Operator::NotEqual),
            "<" => Some(Operator::Less),
            ">" => Some(Operator::Greater),
            "<=" => Some(Operator::LessEqual),
            ">=" => Some(Operator::GreaterEqual),
            "+" => Some(Operator::Add),
            "-" => Some(Operator::Sub),
            "*" => Some(Operator::Mul),
            "/" => Some(Operator::Div),
            _ => None,
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Operator::Or => 1,
            Operator::And => 2,
            Operator::BitOr => 3,
            Operator::BitXor => 4,
            Operator::BitAnd => 5,
            Operator::Equal | Operator::NotEqual => 6,
            Operator::Less
            | Operator::Greater
            | Operator::LessEqual
            | Operator::GreaterEqual => 7,
            Operator::Add | Operator::Sub => 8,
            Operator::Mul | Operator::Div => 9,
        }
    }

    fn apply(self, lhs: u16, rhs: u16) -> u16 {
        match self {
            Operator::Or => (lhs != 0 || rhs != 0) as u16,
            Operator::And => (lhs != 0 && rhs != 0) as u16,
            Operator::BitOr => lhs | rhs,
            Operator::BitXor => lhs ^ rhs,
            Operator::BitAnd => lhs & rhs,
            Operator::Equal => (lhs == rhs) as u16,
            Operator::NotEqual => (lhs != rhs) as u16,
            Operator::Less => (lhs < rhs) as u16,
            Operator::Greater => (lhs > rhs) as u16,
            Operator::LessEqual => (lhs <= rhs) as u16,
            Operator::GreaterEqual => (lhs >= rhs) as u16,
            Operator::Add => lhs.wrapping_add(rhs),
            Operator::Sub => lhs.wrapping_sub(rhs),
            Operator::Mul => lhs.wrapping_mul(rhs),
            Operator::Div => lhs.checked_div(rhs).unwrap_or(0),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match *self {
            Operator::Or => "||",
            Operator::And => "&&",
            Operator::BitOr => "|",
            Operator::BitXor => "^",
            Operator::BitAnd => "&",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::LessEqual => "<=",
            Operator::GreaterEqual => ">=",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expr {
    Const(u16),
    Register {
        space: Option<MemSpace>,
        name: String,
    },
    RasterLine,
    Cycle,
    Memory {
        bank: Option<String>,
        address: u16,
    },
    Binary {
        op: Operator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn eval(&self, machine: &dyn Machine, space: MemSpace) -> u16 {
        match *self {
            Expr::Const(value) => value,
            Expr::Register {
                space: reg_space,
                ref name,
            } => {
                let space = reg_space.unwrap_or(space);
                machine
                    .interface(space)
                    .and_then(|iface| {
                        iface
                            .find_register(name)
                            .and_then(|reg| iface.get_register(reg.id))
                    })
                    .unwrap_or_else(|| {
                        debug!(target: "checkpoint", "Register {}:{} not available", space, name);
                        0
                    })
            }
            Expr::RasterLine => line_cycle(machine, space).map_or(0, |pos| pos.line as u16),
            Expr::Cycle => line_cycle(machine, space).map_or(0, |pos| pos.cycle as u16),
            Expr::Memory { ref bank, address } => machine.interface(space).map_or(0, |iface| {
                let bank = bank
                    .as_ref()
                    .and_then(|name| iface.find_bank(name))
                    .unwrap_or(0);
                iface.peek(bank, address) as u16
            }),
            Expr::Binary { op, ref lhs, ref rhs } => {
                op.apply(lhs.eval(machine, space), rhs.eval(machine, space))
            }
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Expr::Binary { .. } => write!(f, "({})", self),
            _ => write!(f, "{}", self),
        }
    }
}

fn line_cycle(machine: &dyn Machine, space: MemSpace) -> Option<LineCycle> {
    machine
        .interface(space)
        .and_then(|iface| iface.get_line_cycle())
        .or_else(|| {
            machine
                .interface(MemSpace::Computer)
                .and_then(|iface| iface.get_line_cycle())
        })
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Expr::Const(value) if value <= 0xff => write!(f, "${:02x}", value),
            Expr::Const(value) => write!(f, "${:04x}", value),
            Expr::Register {
                space: Some(space),
                ref name,
            } => write!(f, "{}:{}", space, name),
            Expr::Register {
                space: None,
                ref name,
            } => write!(f, "{}", name),
            Expr::RasterLine => write!(f, "RL"),
            Expr::Cycle => write!(f, "CY"),
            Expr::Memory {
                bank: Some(ref bank),
                address,
            } => write!(f, "@{}:${:04x}", bank, address),
            Expr::Memory { bank: None, address } => write!(f, "@${:04x}", address),
            Expr::Binary { op, ref lhs, ref rhs } => {
                lhs.fmt_operand(f)?;
                write!(f, " {} ", op)?;
                rhs.fmt_operand(f)
            }
        }
    }
}

/// Boolean expression attached to a checkpoint; non-zero is true.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Condition {
    expr: Expr,
}

impl Condition {
    pub fn parse(input: &str, radix: u32) -> Result<Condition, ParseError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            radix,
            end: input.chars().count(),
        };
        let expr = parser.parse_expr(0)?;
        match parser.peek() {
            Some(lexeme) => Err(ParseError::new(
                lexeme.position,
                format!("Unexpected token {}", lexeme.token),
            )),
            None => Ok(Condition { expr }),
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn eval(&self, machine: &dyn Machine, space: MemSpace) -> bool {
        self.expr.eval(machine, space) != 0
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

struct Parser {
    tokens: Vec<Lexeme>,
    pos: usize,
    radix: u32,
    end: usize,
}

impl Parser {
    fn parse_expr(&mut self, min_precedence: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_primary()?;
        while let Some(op) = self.peek_operator()? {
            if op.precedence() < min_precedence {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_expr(op.precedence() + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let lexeme = self.next_lexeme()?;
        match lexeme.token {
            Token::Open => {
                let expr = self.parse_expr(0)?;
                match self.next_lexeme()? {
                    Lexeme {
                        token: Token::Close,
                        ..
                    } => Ok(expr),
                    other => Err(ParseError::new(
                        other.position,
                        format!("Expected ) but found {}", other.token),
                    )),
                }
            }
            Token::At => self.parse_memory(),
            Token::Atom(ref text) if self.peek_colon() => {
                let space = MemSpace::from_prefix(text).ok_or_else(|| {
                    ParseError::new(lexeme.position, format!("Invalid memspace {}", text))
                })?;
                self.pos += 1;
                let (name, position) = self.next_atom()?;
                register(Some(space), &name, position)
            }
            Token::Atom(ref text) => self.parse_value(text, lexeme.position),
            ref token => Err(ParseError::new(
                lexeme.position,
                format!("Unexpected token {}", token),
            )),
        }
    }

    fn parse_memory(&mut self) -> Result<Expr, ParseError> {
        let (first, position) = self.next_atom()?;
        let (bank, text, position) = if self.peek_colon() {
            self.pos += 1;
            let (address, address_pos) = self.next_atom()?;
            (Some(first.to_lowercase()), address, address_pos)
        } else {
            (None, first, position)
        };
        let address = parse_number(&text, self.radix)
            .ok_or_else(|| ParseError::new(position, format!("Invalid address {}", text)))?;
        Ok(Expr::Memory { bank, address })
    }

    fn parse_value(&self, text: &str, position: usize) -> Result<Expr, ParseError> {
        let name = text.to_uppercase();
        match name.as_str() {
            "RL" => return Ok(Expr::RasterLine),
            "CY" => return Ok(Expr::Cycle),
            _ => {}
        }
        if KNOWN_REGISTERS.contains(&name.as_str()) {
            return Ok(Expr::Register { space: None, name });
        }
        match parse_number(text, self.radix) {
            Some(value) => Ok(Expr::Const(value)),
            None if text.starts_with(|c: char| c.is_ascii_alphabetic()) => {
                register(None, text, position)
            }
            None => Err(ParseError::new(position, format!("Invalid number {}", text))),
        }
    }

    fn peek(&self) -> Option<&Lexeme> {
        self.tokens.get(self.pos)
    }

    fn peek_colon(&self) -> bool {
        match self.peek() {
            Some(lexeme) => lexeme.token == Token::Colon,
            None => false,
        }
    }

    fn peek_operator(&self) -> Result<Option<Operator>, ParseError> {
        match self.peek() {
            Some(Lexeme {
                token: Token::Op(ref op),
                position,
            }) => Operator::from(op)
                .map(Some)
                .ok_or_else(|| ParseError::new(*position, format!("Invalid operator {}", op))),
            _ => Ok(None),
        }
    }

    fn next_lexeme(&mut self) -> Result<Lexeme, ParseError> {
        match self.tokens.get(self.pos) {
            Some(lexeme) => {
                self.pos += 1;
                Ok(lexeme.clone())
            }
            None => Err(ParseError::new(
                self.end,
                "Unexpected end of expression".to_string(),
            )),
        }
    }

    fn next_atom(&mut self) -> Result<(String, usize), ParseError> {
        match self.next_lexeme()? {
            Lexeme {
                token: Token::Atom(text),
                position,
            } => Ok((text, position)),
            other => Err(ParseError::new(
                other.position,
                format!("Unexpected token {}", other.token),
            )),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Token {
    Atom(String),
    Op(String),
    Open,
    Close,
    At,
    Colon,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Token::Atom(ref text) | Token::Op(ref text) => write!(f, "{}", text),
            Token::Open => write!(f, "("),
            Token::Close => write!(f, ")"),
            Token::At => write!(f, "@"),
            Token::Colon => write!(f, ":"),
        }
    }
}

#[derive(Clone, Debug)]
struct Lexeme {
    token: Token,
    position: usize,
}

fn tokenize(input: &str) -> Result<Vec<Lexeme>, ParseError> {
    let mut iter = input.chars().enumerate().peekable();
    let mut tokens = Vec::new();
    while let Some(&(position, c)) = iter.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                iter.next();
                continue;
            }
            '$' | '%' => {
                iter.next();
                let mut atom = c.to_string();
                atom.push_str(&consume_while(&mut iter, |c| c.is_alphanumeric()));
                Token::Atom(atom)
            }
            c if c.is_alphanumeric() || c == '_' => {
                Token::Atom(consume_while(&mut iter, |c| c.is_alphanumeric() || c == '_'))
            }
            '(' => {
                iter.next();
                Token::Open
            }
            ')' => {
                iter.next();
                Token::Close
            }
            '@' => {
                iter.next();
                Token::At
            }
            ':' => {
                iter.next();
                Token::Colon
            }
            c if is_symbol(c) => {
                iter.next();
                let mut op = c.to_string();
                if let Some(&(_, next)) = iter.peek() {
                    let pair = format!("{}{}", c, next);
                    if is_pair(&pair) {
                        iter.next();
                        op = pair;
                    }
                }
                Token::Op(op)
            }
            _ => return Err(ParseError::new(position, format!("Invalid character {}", c))),
        };
        tokens.push(Lexeme { token, position });
    }
    Ok(tokens)
}

fn consume_while<F>(iter: &mut Peekable<Enumerate<Chars<'_>>>, predicate: F) -> String
where
    F: Fn(char) -> bool,
{
    let mut s = String::new();
    while let Some(&(_, c)) = iter.peek() {
        if !predicate(c) {
            break;
        }
        iter.next();
        s.push(c);
    }
    s
}

fn is_symbol(c: char) -> bool {
    match c {
        '|' | '&' | '^' | '=' | '!' | '<' | '>' | '+' | '-' | '*' | '/' => true,
        _ => false,
    }
}

fn is_pair(op: &str) -> bool {
    match op {
        "||" | "&&" | "==" | "!=" | "<=" | ">=" => true,
        _ => false,
    }
}

fn register(space: Option<MemSpace>, text: &str, position: usize) -> Result<Expr, ParseError> {
    let name = text.to_uppercase();
    if KNOWN_REGISTERS.contains(&name.as_str()) {
        Ok(Expr::Register { space, name })
    } else {
        Err(ParseError::new(position, format!("Unknown register {}", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mon64_core::system::memory::{BANK_IO, BANK_RAM};
    use mon64_core::system::Sandbox;
    use mon64_core::Machine;

    fn setup_machine() -> Sandbox {
        let mut machine = Sandbox::new(true);
        {
            let iface = machine.interface_mut(MemSpace::Computer).unwrap();
            iface.set_register(0x00, 0x10).unwrap();
            iface.set_register(0x01, 0x01).unwrap();
            iface.write(BANK_RAM, 0xd020, 0x07);
            iface.write(BANK_IO, 0xd020, 0x0e);
        }
        machine
    }

    fn eval(expr: &str) -> bool {
        let machine = setup_machine();
        Condition::parse(expr, 16)
            .unwrap()
            .eval(&machine, MemSpace::Computer)
    }

    #[test]
    fn parse_number_prefixes() {
        assert_eq!(Some(0x1000), parse_number("$1000", 10));
        assert_eq!(Some(5), parse_number("%101", 16));
        assert_eq!(Some(100), parse_number("100", 10));
        assert_eq!(Some(0x100), parse_number("100", 16));
        assert_eq!(None, parse_number("$", 16));
        assert_eq!(None, parse_number("12g", 16));
        assert_eq!(None, parse_number("+12", 10));
    }

    #[test]
    fn precedence() {
        let condition = Condition::parse("A == 10 && X == 1 || Y", 16).unwrap();
        assert_eq!("((A == $10) && (X == $01)) || Y", condition.to_string());
        let condition = Condition::parse("1 + 2 * 3 == 7", 16).unwrap();
        assert_eq!("($01 + ($02 * $03)) == $07", condition.to_string());
    }

    #[test]
    fn parentheses_override_precedence() {
        let condition = Condition::parse("(1 + 2) * 3", 16).unwrap();
        assert_eq!("($01 + $02) * $03", condition.to_string());
        assert_eq!(9, condition.expr().eval(&setup_machine(), MemSpace::Computer));
    }

    #[test]
    fn eval_registers() {
        assert!(eval("A == $10"));
        assert!(eval("a == 10 && x == 1"));
        assert!(!eval("A != $10"));
        assert!(eval("X < A"));
        assert!(eval("PC == $e000"));
    }

    #[test]
    fn eval_memory_banks() {
        assert!(eval("@ram:$d020 == 7"));
        assert!(eval("@io:$d020 == e"));
        assert!(eval("@$d020 == e"));
    }

    #[test]
    fn eval_memspace_prefix() {
        assert!(eval("8:PC == $eaa0"));
        assert!(eval("c:A == $10"));
    }

    #[test]
    fn eval_line_cycle() {
        assert!(eval("RL == 0 && CY == 0"));
    }

    #[test]
    fn divide_by_zero_is_zero() {
        assert!(eval("(A / 0) == 0"));
    }

    #[test]
    fn unknown_register_is_rejected() {
        let error = Condition::parse("ZZ == 0", 16).err().unwrap();
        assert_eq!(0, error.position);
        assert_eq!("Unknown register ZZ", error.message);
        let error = Condition::parse("A == 1 && 8:QQ == 0", 10).err().unwrap();
        assert_eq!(12, error.position);
    }

    #[test]
    fn error_position() {
        let error = Condition::parse("A == ", 16).err().unwrap();
        assert_eq!(5, error.position);
        let error = Condition::parse("A # 1", 16).err().unwrap();
        assert_eq!(2, error.position);
        let error = Condition::parse("A = 1", 16).err().unwrap();
        assert_eq!(2, error.position);
        assert_eq!("Invalid operator =", error.message);
        let error = Condition::parse("(A == 1", 16).err().unwrap();
        assert_eq!(7, error.position);
    }

    #[test]
    fn invalid_memspace_prefix() {
        let error = Condition::parse("7:A == 1", 16).err().unwrap();
        assert_eq!(0, error.position);
    }

    #[test]
    fn decimal_radix() {
        let condition = Condition::parse("A == 16", 10).unwrap();
        assert_eq!("A == $10", condition.to_string());
    }
}

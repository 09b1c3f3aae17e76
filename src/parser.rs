//! Command parser for MiniKV
//!
//! Turns one script line into a [`Command`]. The command surface is the
//! classic simulation language:
//!
//! ```text
//! begin(T1)        beginRO(T2)      R(T1,x4)      W(T1,x6,101)
//! fail(3)          recover(3)       end(T1)       dump()
//! ```
//!
//! Blank lines and `//` comments parse to `None`. Site ids are range-checked
//! by the coordinator (an unknown site is a status line, not a parse error),
//! but variable names must be one of `x1`..`x20`.

use crate::error::{MiniKvError, Result};
use crate::lexer::{Lexer, Token};
use crate::types::{SiteId, VarId};

/// One parsed script command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Begin { txn: String },
    BeginRo { txn: String },
    Read { txn: String, var: VarId },
    Write { txn: String, var: VarId, value: i64 },
    Fail { site: SiteId },
    Recover { site: SiteId },
    End { txn: String },
    Dump,
}

/// Command parser
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Parse a single script line. `Ok(None)` means the line holds no
    /// command (blank or comment-only).
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let tokens = Lexer::new(line).tokenize()?;
        let mut parser = Parser { tokens, pos: 0 };
        parser.parse_command()
    }

    fn parse_command(&mut self) -> Result<Option<Command>> {
        if self.peek() == &Token::Eof {
            return Ok(None);
        }
        let name = self.expect_identifier()?;
        let args = self.parse_arguments()?;
        if self.peek() != &Token::Eof {
            return Err(MiniKvError::Syntax(format!(
                "Trailing input after command '{}'",
                name
            )));
        }

        let command = match name.as_str() {
            "begin" => Command::Begin {
                txn: self.one_identifier(&name, &args)?,
            },
            "beginRO" => Command::BeginRo {
                txn: self.one_identifier(&name, &args)?,
            },
            "R" => {
                let (txn, var) = self.txn_and_var(&name, &args)?;
                Command::Read { txn, var }
            }
            "W" => {
                if args.len() != 3 {
                    return Err(MiniKvError::bad_arity(&name, 3, args.len()));
                }
                let txn = identifier(&args[0])?;
                let var = VarId::parse(&identifier(&args[1])?)?;
                let value = number(&args[2])?;
                Command::Write { txn, var, value }
            }
            "fail" => Command::Fail {
                site: self.one_site(&name, &args)?,
            },
            "recover" => Command::Recover {
                site: self.one_site(&name, &args)?,
            },
            "end" => Command::End {
                txn: self.one_identifier(&name, &args)?,
            },
            "dump" => {
                if !args.is_empty() {
                    return Err(MiniKvError::bad_arity(&name, 0, args.len()));
                }
                Command::Dump
            }
            _ => return Err(MiniKvError::unknown_command(&name)),
        };
        Ok(Some(command))
    }

    /// A parenthesized, comma-separated argument list
    fn parse_arguments(&mut self) -> Result<Vec<Token>> {
        self.expect(Token::LeftParen)?;
        let mut args = Vec::new();
        if self.peek() == &Token::RightParen {
            self.advance();
            return Ok(args);
        }
        loop {
            match self.advance() {
                Token::Identifier(name) => args.push(Token::Identifier(name)),
                Token::Number(n) => args.push(Token::Number(n)),
                other => {
                    return Err(MiniKvError::Syntax(format!(
                        "Expected argument, found {:?}",
                        other
                    )))
                }
            }
            match self.advance() {
                Token::Comma => continue,
                Token::RightParen => return Ok(args),
                other => {
                    return Err(MiniKvError::Syntax(format!(
                        "Expected ',' or ')', found {:?}",
                        other
                    )))
                }
            }
        }
    }

    fn one_identifier(&self, command: &str, args: &[Token]) -> Result<String> {
        if args.len() != 1 {
            return Err(MiniKvError::bad_arity(command, 1, args.len()));
        }
        identifier(&args[0])
    }

    fn one_site(&self, command: &str, args: &[Token]) -> Result<SiteId> {
        if args.len() != 1 {
            return Err(MiniKvError::bad_arity(command, 1, args.len()));
        }
        let n = number(&args[0])?;
        u32::try_from(n).map_err(|_| MiniKvError::Syntax(format!("Bad site id '{}'", n)))
    }

    fn txn_and_var(&self, command: &str, args: &[Token]) -> Result<(String, VarId)> {
        if args.len() != 2 {
            return Err(MiniKvError::bad_arity(command, 2, args.len()));
        }
        let txn = identifier(&args[0])?;
        let var = VarId::parse(&identifier(&args[1])?)?;
        Ok((txn, var))
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let token = self.advance();
        if token == expected {
            Ok(())
        } else {
            Err(MiniKvError::Syntax(format!(
                "Expected {:?}, found {:?}",
                expected, token
            )))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.advance() {
            Token::Identifier(name) => Ok(name),
            other => Err(MiniKvError::Syntax(format!(
                "Expected command name, found {:?}",
                other
            ))),
        }
    }
}

fn identifier(token: &Token) -> Result<String> {
    match token {
        Token::Identifier(name) => Ok(name.clone()),
        other => Err(MiniKvError::Syntax(format!(
            "Expected name, found {:?}",
            other
        ))),
    }
}

fn number(token: &Token) -> Result<i64> {
    match token {
        Token::Number(n) => Ok(*n),
        other => Err(MiniKvError::Syntax(format!(
            "Expected number, found {:?}",
            other
        ))),
    }
}

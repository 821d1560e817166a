// infix -> postfix rewriting for the restricted regex syntax
// <atom>     ::= [A-Za-z] | <blank>
// <operator> ::= '|' | '*' | '.' (explicit concatenation)
// grouping with '(' ')', concatenation is implicit between adjacent atoms

use std::fmt::{self, Display};

use thiserror::Error;
use tracing::debug;

use crate::Config;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    Literal(char),
    Blank,
    Alternate,
    Concat,
    Star,
    LParen,
    RParen,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("empty expression")]
    Empty,
    #[error("invalid token {ch:?} at position {position}")]
    InvalidToken { ch: char, position: usize },
    #[error("unmatched ')' at position {position}")]
    UnmatchedClose { position: usize },
    #[error("group opened at position {position} is never closed")]
    UnclosedGroup { position: usize },
    #[error("{0:?} cannot be the blank, it is already a letter or an operator")]
    InvalidBlank(char),
}

impl Token {
    fn is_operand(self) -> bool {
        matches!(self, Token::Literal(_) | Token::Blank)
    }

    // '*' binds tightest, then concatenation, then alternation.
    // every operator is left-associative
    fn precedence(self) -> Option<u32> {
        match self {
            Token::Alternate => Some(1),
            Token::Concat => Some(2),
            Token::Star => Some(3),
            _ => None,
        }
    }
}

/// Expression in reverse polish order, ready for Thompson construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Postfix {
    pub(crate) tokens: Vec<Token>,
    pub(crate) blank: char,
}

impl Postfix {
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn blank(&self) -> char {
        self.blank
    }
}

impl Display for Postfix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            let c = match token {
                Token::Literal(c) => *c,
                Token::Blank => self.blank,
                Token::Alternate => '|',
                Token::Concat => '.',
                Token::Star => '*',
                Token::LParen => '(',
                Token::RParen => ')',
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

// tokens paired with their char offset in the source expression
pub type Spanned = (Token, usize);

pub fn tokenize(expr: &str, config: &Config) -> Result<Vec<Spanned>, SyntaxError> {
    config.validate()?;

    let mut tokens = Vec::with_capacity(expr.len());
    for (position, ch) in expr.chars().enumerate() {
        let token = match ch {
            c if c == config.blank => Token::Blank,
            c if c.is_ascii_alphabetic() => Token::Literal(c),
            '|' => Token::Alternate,
            '.' => Token::Concat,
            '*' => Token::Star,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ch => return Err(SyntaxError::InvalidToken { ch, position }),
        };
        tokens.push((token, position));
    }

    if tokens.is_empty() {
        return Err(SyntaxError::Empty);
    }

    Ok(tokens)
}

// the blank atom counts as an operand here, so "a b" reads as a.<blank>.b
pub fn insert_concatenation(tokens: &[Spanned]) -> Vec<Spanned> {
    let mut result = Vec::with_capacity(tokens.len() * 2);
    for (i, (token, position)) in tokens.iter().copied().enumerate() {
        result.push((token, position));
        let Some((next, next_position)) = tokens.get(i + 1).copied() else {
            break;
        };

        let left = token.is_operand() || token == Token::Star || token == Token::RParen;
        let right = next.is_operand() || next == Token::LParen;
        if left && right {
            result.push((Token::Concat, next_position));
        }
    }
    result
}

// shunting yard, operators pop while the stack top binds at least as tightly
pub fn to_postfix(tokens: &[Spanned], blank: char) -> Result<Postfix, SyntaxError> {
    let mut output: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut operators: Vec<Spanned> = Vec::new();

    for (token, position) in tokens.iter().copied() {
        match token {
            Token::Literal(_) | Token::Blank => output.push(token),
            Token::LParen => operators.push((token, position)),
            Token::RParen => loop {
                match operators.pop() {
                    Some((Token::LParen, _)) => break,
                    Some((op, _)) => output.push(op),
                    None => return Err(SyntaxError::UnmatchedClose { position }),
                }
            },
            Token::Alternate | Token::Concat | Token::Star => {
                let incoming = token.precedence().unwrap_or_default();
                while let Some((top, _)) = operators.last().copied() {
                    match top.precedence() {
                        Some(p) if p >= incoming => {
                            output.push(top);
                            operators.pop();
                        }
                        _ => break,
                    }
                }
                operators.push((token, position));
            }
        }
    }

    while let Some((op, position)) = operators.pop() {
        if op == Token::LParen {
            return Err(SyntaxError::UnclosedGroup { position });
        }
        output.push(op);
    }

    Ok(Postfix {
        tokens: output,
        blank,
    })
}

pub fn parse(expr: &str, config: &Config) -> Result<Postfix, SyntaxError> {
    let tokens = tokenize(expr, config)?;
    let tokens = insert_concatenation(&tokens);
    let postfix = to_postfix(&tokens, config.blank)?;
    debug!("infix {:?} -> postfix {}", expr, postfix);
    Ok(postfix)
}

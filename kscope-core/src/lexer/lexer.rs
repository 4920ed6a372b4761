use super::error::{LexicalError, LexicalErrorType};
use super::token::{str_to_keyword, Literal, Token, TokenKind};
use std::fmt::Display;
use crate::utils::prelude::SrcSpan;

pub type LexResult = std::result::Result<Token, LexicalError>;

/// Tokenizes a whole source text, ending with an `Eof` token.
///
/// Stops at the first lexical error.
pub fn scan(source: &str) -> Result<Vec<Token>, LexicalError> {
	let lexer = Lexer::new(source.char_indices().map(|(i, c)| (i as u32, c)));

	lexer.collect()
}

#[derive(Debug)]
pub struct Lexer<T: Iterator<Item = (u32, char)>> {
	position: u32,
	next_position: u32,
	ch: Option<char>,
	next_ch: Option<char>,
	line: u32,
	finished: bool,
	input: T,
}

impl<T: Iterator<Item = (u32, char)>> Display for Lexer<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f,
			"Lexer {{\n\tposition: {},\n\tline: {},\n\tch: {:?}, next_ch: {:?}\n}}",
			self.position, self.line, self.ch, self.next_ch
		)
	}
}

impl<T: Iterator<Item = (u32, char)>> Lexer<T> {
	pub fn new(input: T) -> Self {
		let mut lexer = Self {
			position: 0,
			next_position: 0,
			ch: None,
			next_ch: None,
			line: 1,
			finished: false,
			input,
		};

		lexer.next_char();
		lexer.next_char();

		lexer
	}

	pub fn next_token(&mut self) -> LexResult {
		self.skip_trivia();

		let token = match self.ch {
			Some(ch) => match ch {
				'(' => self.eat_one_char(TokenKind::LParen),
				')' => self.eat_one_char(TokenKind::RParen),
				',' => self.eat_one_char(TokenKind::Comma),
				';' => self.eat_one_char(TokenKind::Semicolon),
				'=' if self.next_ch == Some('=') => self.eat_operator(2),
				'=' => self.eat_one_char(TokenKind::Equal),
				c if c.is_alphabetic() => self.lex_ident(),
				c if c.is_ascii_digit() => return self.lex_number(),
				'.' if self.next_ch.is_some_and(|c| c.is_ascii_digit()) => {
					let start_pos = self.position;
					self.next_char();
					self.skip_digits();

					return Err(LexicalError {
						error: LexicalErrorType::MissingDigitBeforePeriod,
						location: SrcSpan::from(start_pos, self.position),
						line: self.line,
					});
				},
				_ => self.eat_operator(1),
			},
			None => {
				let location = self.position;

				Token::new(TokenKind::Eof, "", self.line, SrcSpan::from(location, location))
			}
		};

		Ok(token)
	}

	fn next_char(&mut self) -> Option<char> {
		let ch = self.ch;

		let next = match self.input.next() {
			Some((pos, ch)) => {
				self.position = self.next_position;
				self.next_position = pos;

				Some(ch)
			},
			None => {
				self.position = self.next_position;
				self.next_position += self.next_ch.map_or(1, |c| c.len_utf8() as u32);

				None
			}
		};

		self.ch = self.next_ch;
		self.next_ch = next;

		ch
	}

	fn skip_trivia(&mut self) {
		loop {
			match self.ch {
				Some('\n') => {
					self.line += 1;
					self.next_char();
				},
				Some(ch) if ch.is_whitespace() => {
					self.next_char();
				},
				// comment runs to the end of the line
				Some('#') => {
					while !matches!(self.ch, None | Some('\n') | Some('\r')) {
						self.next_char();
					}
				},
				_ => break
			}
		}
	}

	fn skip_digits(&mut self) {
		while self.ch.is_some_and(|ch| ch.is_ascii_digit()) {
			self.next_char();
		}
	}

	fn eat_one_char(&mut self, kind: TokenKind) -> Token {
		let start_pos = self.position;
		let lexeme = self.next_char().map(String::from).unwrap_or_default();
		let end_pos = self.position;

		Token::new(kind, lexeme, self.line, SrcSpan::from(start_pos, end_pos))
	}

	fn eat_operator(&mut self, width: usize) -> Token {
		let start_pos = self.position;
		let lexeme = (0..width)
			.filter_map(|_| self.next_char())
			.collect::<String>();
		let end_pos = self.position;

		Token::new(TokenKind::Operator, lexeme.clone(), self.line, SrcSpan::from(start_pos, end_pos))
			.with_literal(Literal::Ident(lexeme))
	}

	fn lex_ident(&mut self) -> Token {
		let start_pos = self.position;
		let mut ident = String::new();

		while let Some(ch) = self.ch {
			if !ch.is_alphanumeric() {
				break;
			}
			ident.push(ch);
			self.next_char();
		}

		let end_pos = self.position;
		let span = SrcSpan::from(start_pos, end_pos);

		match str_to_keyword(&ident) {
			Some(kind) => Token::new(kind, ident, self.line, span),
			None => Token::new(TokenKind::Ident, ident.clone(), self.line, span)
				.with_literal(Literal::Ident(ident)),
		}
	}

	fn lex_number(&mut self) -> LexResult {
		let start_pos = self.position;
		let mut value = String::new();

		while let Some(ch) = self.ch.filter(|ch| ch.is_ascii_digit()) {
			value.push(ch);
			self.next_char();
		}

		if self.ch == Some('.') {
			if !self.next_ch.is_some_and(|ch| ch.is_ascii_digit()) {
				self.next_char();

				return Err(LexicalError {
					error: LexicalErrorType::MissingDigitAfterPeriod,
					location: SrcSpan::from(start_pos, self.position),
					line: self.line,
				});
			}

			value.push('.');
			self.next_char();

			while let Some(ch) = self.ch.filter(|ch| ch.is_ascii_digit()) {
				value.push(ch);
				self.next_char();
			}

			if self.ch == Some('.') {
				self.next_char();
				self.skip_digits();

				return Err(LexicalError {
					error: LexicalErrorType::MultipleFloatingPoints,
					location: SrcSpan::from(start_pos, self.position),
					line: self.line,
				});
			}
		}

		let location = SrcSpan::from(start_pos, self.position);

		let number = value.parse::<f64>().map_err(|_| LexicalError {
			error: LexicalErrorType::MalformedNumber,
			location,
			line: self.line,
		})?;

		Ok(Token::new(TokenKind::Number, value, self.line, location)
			.with_literal(Literal::Number(number)))
	}
}

impl<T: Iterator<Item = (u32, char)>> Iterator for Lexer<T> {
	type Item = LexResult;

	fn next(&mut self) -> Option<Self::Item> {
		if self.finished {
			return None;
		}

		let token = self.next_token();

		if matches!(&token, Ok(Token { kind: TokenKind::Eof, .. })) {
			self.finished = true;
		}

		Some(token)
	}
}

use std::io::Write;

use kscope_core::{
	lexer::prelude::scan,
	parser::prelude::{parse_tokens, OperatorTable},
};

const PROMPT: &str = ">> ";

/// Operators declared on one line stay known on the following ones.
pub fn start(print_ast: bool) -> std::io::Result<()> {
	let stdin = std::io::stdin();
	let mut operators = OperatorTable::new();

	loop {
		let mut input = String::from("");

		print!("{}", PROMPT);
		std::io::stdout().flush()?;

		if stdin.read_line(&mut input)? == 0 {
			return Ok(());
		}

		if let Some('\n') = input.chars().next_back() {
			input.pop();
		}
		if let Some('\r') = input.chars().next_back() {
			input.pop();
		}

		match input.as_str() {
			"" => {},
			".exit" => return Ok(()),
			_ => {
				let tokens = match scan(&input) {
					Ok(tokens) => tokens,
					Err(err) => {
						let (message, messages) = err.details();

						println!("Lexical error: {}.\n\t{}", message, messages.join(";\n\t"));
						continue;
					}
				};

				let parsed = parse_tokens(tokens, &mut operators);

				for form in &parsed.forms {
					if print_ast {
						println!("{form:#?}");
					} else {
						println!("{form}");
					}
				}

				for err in &parsed.errors {
					let (message, messages) = err.details();

					println!("Parse error: {}.\n\t{}", message, messages.join(";\n\t"))
				}
			}
		}
	}
}

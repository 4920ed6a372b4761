use std::io::Write;

use kscope_core::{backend::prelude::Backend, session::Session};

use crate::runner::{evaluate, Options};

const PROMPT: &str = "> ";
const FAREWELL: &str = "See you soon!";

/// Evaluates standard input line by line, each line is its own batch.
pub fn start<B: Backend>(mut session: Session<B>, options: Options) -> std::io::Result<()> {
	ctrlc::set_handler(|| {
		println!("\n{FAREWELL}");
		std::process::exit(0);
	}).map_err(std::io::Error::other)?;

	let stdin = std::io::stdin();

	loop {
		let mut input = String::from("");

		print!("{}", PROMPT);
		std::io::stdout().flush()?;

		if stdin.read_line(&mut input)? == 0 {
			println!("{FAREWELL}");
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
			".exit" => {
				println!("{FAREWELL}");
				return Ok(());
			},
			_ => {
				evaluate(&mut session, &input, options);
			}
		}
	}
}

//! Primitives a program can reach through `extern`.

use std::io::Write;

pub type Primitive = extern "C" fn(f64) -> f64;

/// Name and implementation of every primitive, in binding order.
pub const PRIMITIVES: [(&str, Primitive); 2] = [
    ("putchard", putchard),
    ("printd", printd),
];

/// Writes the character with code `x` to stdout.
#[no_mangle]
pub extern "C" fn putchard(x: f64) -> f64 {
    let mut stdout = std::io::stdout();

    // out of range codes become U+FFFD
    let ch = char::from_u32(x as u32).unwrap_or(char::REPLACEMENT_CHARACTER);

    let _ = write!(stdout, "{ch}");
    let _ = stdout.flush();

    0.0
}

/// Writes `x` followed by a newline to stdout.
#[no_mangle]
pub extern "C" fn printd(x: f64) -> f64 {
    let mut stdout = std::io::stdout();

    let _ = writeln!(stdout, "{x}");
    let _ = stdout.flush();

    0.0
}

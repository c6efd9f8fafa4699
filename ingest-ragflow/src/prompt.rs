//! Interactive prompts, generic over the input and output streams so they can be driven from tests.

use std::io::{self, BufRead, Write};

pub const INVALID_INDEX: &str = "Invalid index. Please enter a number within the range.";
pub const INVALID_NUMBER: &str = "Please enter a valid number.";

fn read_answer<R: BufRead>(input: &mut R) -> io::Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no answer on standard input",
        ));
    }
    Ok(line.trim().to_string())
}

/// Ask a yes/no question. Only `y` (any case) counts as yes.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<bool> {
    write!(output, "{question} (y/n): ")?;
    output.flush()?;
    Ok(read_answer(input)?.eq_ignore_ascii_case("y"))
}

/// Ask for an index in `0..len`, repeating until the answer is valid.
pub fn select_index<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
    len: usize,
) -> io::Result<usize> {
    if len == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "nothing to select from"));
    }
    loop {
        write!(output, "{question}: ")?;
        output.flush()?;
        match read_answer(input)?.parse::<usize>() {
            Ok(index) if index < len => return Ok(index),
            Ok(_) => writeln!(output, "{INVALID_INDEX}")?,
            Err(_) => writeln!(output, "{INVALID_NUMBER}")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn confirm_accepts_only_y() {
        let mut out = Vec::new();
        assert!(confirm(&mut Cursor::new("Y\n"), &mut out, "Create new dataset?").unwrap());
        assert!(!confirm(&mut Cursor::new("yes\n"), &mut out, "Create new dataset?").unwrap());
        assert!(!confirm(&mut Cursor::new("n\n"), &mut out, "Create new dataset?").unwrap());
        assert!(String::from_utf8(out).unwrap().starts_with("Create new dataset? (y/n): "));
    }

    #[test]
    fn select_index_reprompts_until_valid() {
        let mut out = Vec::new();
        let index = select_index(&mut Cursor::new("abc\n7\n1\n"), &mut out, "Enter dataset index", 3).unwrap();
        assert_eq!(index, 1);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains(INVALID_NUMBER));
        assert!(printed.contains(INVALID_INDEX));
    }

    #[test]
    fn select_index_fails_on_eof_and_empty_choice() {
        let mut out = Vec::new();
        let err = select_index(&mut Cursor::new(""), &mut out, "pick", 2).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        let err = select_index(&mut Cursor::new("0\n"), &mut out, "pick", 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}

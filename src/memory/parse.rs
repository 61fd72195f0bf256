//! Program source parser.
//!
//! A program source is plain text with one binary byte literal per line:
//!
//! ```text
//! 10000010 # LDI r0, 8
//! 00000000
//! 00001000
//! 01000111 # PRN r0
//! 00000000
//! 00000001 # HLT
//! ```
//!
//! Everything after a `#` is a comment; blank and comment-only lines are
//! skipped. The parsed image is loaded into memory starting at address 0.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::fs;
use std::path::Path;

use color_eyre::eyre::{eyre, WrapErr};

use super::Byte;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    context: Cow<'static, str>,
    line_nr: usize,
}

impl ParseError {
    fn new<S>(context: S, line_nr: usize) -> Self
    where
        S: Into<Cow<'static, str>>,
    {
        Self {
            context: context.into(),
            line_nr,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error [ln: {}]: {}", self.line_nr, self.context)
    }
}

impl error::Error for ParseError {}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

/// Parses a program source into its byte image.
///
/// # Errors
///
/// All errors which may occur are collected and returned at the end.
pub fn parse_image(source: &str) -> Result<Vec<Byte>, Vec<ParseError>> {
    let mut image = Vec::new();
    let mut errors = Vec::new();

    for (nr, raw) in source.lines().enumerate() {
        let line = match raw.find('#') {
            Some(index) => &raw[..index],
            None => raw,
        };
        let line = line.trim();

        if line.is_empty() {
            // Comment or empty line; skip
            continue;
        }

        match parse_literal(line, nr + 1) {
            Ok(byte) => image.push(byte),
            Err(err) => {
                log::error!("{}", err);
                errors.push(err);
            }
        }
    }

    if errors.is_empty() {
        Ok(image)
    } else {
        Err(errors)
    }
}

/// Parses a single binary byte literal. A `0b` prefix is allowed.
fn parse_literal(line: &str, line_nr: usize) -> Result<Byte> {
    let digits = line.strip_prefix("0b").unwrap_or(line);

    Byte::from_str_radix(digits, 2).map_err(|_| {
        ParseError::new(
            format!("failed to parse `{}` as a binary byte", line),
            line_nr,
        )
    })
}

/// Reads a program file and parses it into its byte image.
pub fn load_file<P: AsRef<Path>>(path: P) -> color_eyre::eyre::Result<Vec<Byte>> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read program file `{}`", path.display()))?;

    parse_image(&source)
        .map_err(|errors| eyre!("program source contains {} invalid lines", errors.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    #[test]
    fn parse_print_program() -> Result<()> {
        let source = r#"
            # load 8 into r0 and print it
            10000010 # LDI r0, 8
            00000000
            00001000

            01000111 # PRN r0
            00000000
            00000001 # HLT
        "#;

        let image = parse_image(source).unwrap();
        assert_eq!(image, vec![0x82, 0, 8, 0x47, 0, 0x01]);

        Ok(())
    }

    #[test]
    fn parse_prefixed_literals() -> Result<()> {
        let source = "0b10000010\n0b00000000\n0b00001000\n";

        let image = parse_image(source).unwrap();
        assert_eq!(image, vec![0x82, 0, 8]);

        Ok(())
    }

    #[test]
    fn parse_empty_source() -> Result<()> {
        let image = parse_image("# nothing but comments\n\n").unwrap();
        assert!(image.is_empty());

        Ok(())
    }

    #[test]
    fn parse_rejects_garbage() -> Result<()> {
        let errors = parse_image("10000010\nnot a byte\n").unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line_nr, 2);

        Ok(())
    }

    #[test]
    fn parse_collects_all_errors() -> Result<()> {
        let source = "2\n10000010\n100000101\nxx\n";

        let errors = parse_image(source).unwrap_err();
        let lines: Vec<usize> = errors.iter().map(|err| err.line_nr).collect();

        // `2` is not a binary digit and nine bits exceed a byte
        assert_eq!(lines, vec![1, 3, 4]);

        Ok(())
    }
}

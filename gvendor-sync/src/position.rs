//! Position syntax for mapping paths.
//!
//! ```text
//! path[:L<n>[C<n>][-L<n>[C<n>]|-EOF]]
//! ```
//!
//! Lines and columns are 1-indexed. A column is a byte offset into its line;
//! an end column is inclusive. This module only parses and formats; the
//! byte arithmetic lives in [`crate::extract`].

use std::fmt;

use thiserror::Error;

/// Reasons a position is malformed or cannot be applied to some content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("malformed position: {reason}")]
    Malformed { reason: String },

    #[error("line numbers start at 1")]
    ZeroLine,

    #[error("column numbers start at 1")]
    ZeroColumn,

    #[error("range ends before it starts")]
    EndBeforeStart,

    #[error("unterminated range; expected L<n>[C<n>] or EOF after '-'")]
    UnterminatedRange,

    #[error("line {line} is beyond the end of the file ({total} lines)")]
    LineOutOfRange { line: usize, total: usize },

    #[error("column {col} is beyond the end of line {line} ({len} bytes)")]
    ColumnOutOfRange { line: usize, col: usize, len: usize },

    #[error("column {col} on line {line} falls inside a multi-byte character")]
    NotCharBoundary { line: usize, col: usize },

    #[error("content is not valid UTF-8 text")]
    NotUtf8,

    #[error("binary content (NUL byte found); positions apply only to text files")]
    BinaryContent,
}

impl PositionError {
    /// Content did not match what a position can apply to, as opposed to a
    /// malformed request.
    pub fn is_integrity(&self) -> bool {
        matches!(self, PositionError::BinaryContent | PositionError::NotUtf8)
    }
}

/// A line/column range inside a text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionSpec {
    pub start_line: usize,
    /// 0 means "same as `start_line`".
    pub end_line: usize,
    /// 0 means "from the start of the line".
    pub start_col: usize,
    /// 0 means "to the end of the line"; otherwise inclusive.
    pub end_col: usize,
    /// Extract through the final line, ignoring `end_line`/`end_col`.
    pub to_eof: bool,
}

impl PositionSpec {
    pub fn line(n: usize) -> Self {
        Self {
            start_line: n,
            ..Self::default()
        }
    }

    pub fn lines(start: usize, end: usize) -> Self {
        Self {
            start_line: start,
            end_line: end,
            ..Self::default()
        }
    }

    pub fn to_eof(start: usize) -> Self {
        Self {
            start_line: start,
            to_eof: true,
            ..Self::default()
        }
    }

    /// Effective last line (for non-EOF specs).
    pub fn last_line(&self) -> usize {
        if self.end_line == 0 {
            self.start_line
        } else {
            self.end_line
        }
    }

    /// Structural checks that do not depend on content.
    pub fn validate(&self) -> Result<(), PositionError> {
        if self.start_line == 0 {
            return Err(PositionError::ZeroLine);
        }
        if self.to_eof {
            return Ok(());
        }
        let last = self.last_line();
        if last < self.start_line {
            return Err(PositionError::EndBeforeStart);
        }
        if last == self.start_line
            && self.start_col > 0
            && self.end_col > 0
            && self.end_col < self.start_col
        {
            return Err(PositionError::EndBeforeStart);
        }
        Ok(())
    }

    /// Parse the part after the `:` (`L5-L20`, `L3C4-EOF`, ...).
    pub fn parse(input: &str) -> Result<Self, PositionError> {
        let (start_line, start_col, rest) = parse_point(input)?;
        let mut spec = PositionSpec {
            start_line,
            start_col,
            ..Self::default()
        };

        if !rest.is_empty() {
            let Some(range) = rest.strip_prefix('-') else {
                return Err(malformed(format!("unexpected '{rest}'")));
            };
            if range.is_empty() {
                return Err(PositionError::UnterminatedRange);
            }
            if range == "EOF" {
                spec.to_eof = true;
            } else {
                if !range.starts_with('L') {
                    return Err(PositionError::UnterminatedRange);
                }
                let (end_line, end_col, tail) = parse_point(range)?;
                if !tail.is_empty() {
                    return Err(malformed(format!("unexpected '{tail}'")));
                }
                spec.end_line = end_line;
                spec.end_col = end_col;
            }
        }

        spec.validate()?;
        Ok(spec)
    }
}

impl fmt::Display for PositionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.start_line)?;
        if self.start_col > 0 {
            write!(f, "C{}", self.start_col)?;
        }
        if self.to_eof {
            return write!(f, "-EOF");
        }
        let last = self.last_line();
        if last != self.start_line || self.end_col > 0 {
            write!(f, "-L{last}")?;
            if self.end_col > 0 {
                write!(f, "C{}", self.end_col)?;
            }
        }
        Ok(())
    }
}

/// A mapping side: a path plus an optional position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    pub path: String,
    pub position: Option<PositionSpec>,
}

impl PathSpec {
    /// Split `path[:position]`.
    ///
    /// The suffix counts as a position only when the last `:` is followed by
    /// `L` and a digit (or nothing), so `C:\dir\file` and `a:Lib/x` stay
    /// plain paths.
    pub fn parse(input: &str) -> Result<Self, PositionError> {
        if let Some(idx) = input.rfind(":L") {
            let suffix = &input[idx + 1..];
            let after_l = &suffix[1..];
            if after_l.is_empty() {
                return Err(malformed("missing line number after 'L'"));
            }
            if after_l.starts_with(|c: char| c.is_ascii_digit()) {
                let path = &input[..idx];
                if path.is_empty() {
                    return Err(malformed("missing path before position"));
                }
                return Ok(PathSpec {
                    path: path.to_string(),
                    position: Some(PositionSpec::parse(suffix)?),
                });
            }
        }
        Ok(PathSpec {
            path: input.to_string(),
            position: None,
        })
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            Some(pos) => write!(f, "{}:{pos}", self.path),
            None => write!(f, "{}", self.path),
        }
    }
}

fn malformed(reason: impl Into<String>) -> PositionError {
    PositionError::Malformed {
        reason: reason.into(),
    }
}

/// `L<n>[C<n>]` → (line, col, rest).
fn parse_point(input: &str) -> Result<(usize, usize, &str), PositionError> {
    let Some(rest) = input.strip_prefix('L') else {
        return Err(malformed(format!("expected 'L' at '{input}'")));
    };
    let (line, rest) = parse_number(rest)?;
    if line == 0 {
        return Err(PositionError::ZeroLine);
    }
    match rest.strip_prefix('C') {
        Some(after_c) => {
            let (col, rest) = parse_number(after_c)?;
            if col == 0 {
                return Err(PositionError::ZeroColumn);
            }
            Ok((line, col, rest))
        }
        None => Ok((line, 0, rest)),
    }
}

fn parse_number(input: &str) -> Result<(usize, &str), PositionError> {
    let end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    if end == 0 {
        return Err(malformed(format!("expected a number at '{input}'")));
    }
    let n = input[..end]
        .parse::<usize>()
        .map_err(|e| malformed(format!("'{}': {e}", &input[..end])))?;
    Ok((n, &input[end..]))
}

//! Field path addressing
//!
//! A field path names a location inside a message:
//!
//! ```text
//! players[2].name
//! places['tile_123'].latitude
//! metadata.labels["env"]
//! ```
//!
//! Dot-separated field names, each optionally followed by subscripts: a
//! numeric subscript indexes a sequence, a quoted subscript keys a mapping.
//! Inside quotes a backslash escapes the next character.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One step of a field path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Named message field
    Field(String),
    /// Sequence position
    Index(usize),
    /// Mapping key
    Key(String),
}

/// Errors from parsing a field path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Empty field path")]
    Empty,

    #[error("Expected a field name at position {position}")]
    ExpectedField { position: usize },

    #[error("Unexpected character '{found}' at position {position}")]
    UnexpectedChar { position: usize, found: char },

    #[error("Unterminated subscript starting at position {position}")]
    UnterminatedSubscript { position: usize },

    #[error("Invalid index '{text}' at position {position}")]
    InvalidIndex { position: usize, text: String },
}

/// A parsed field path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parse a field path
    pub fn parse(input: &str) -> Result<Self, PathError> {
        if input.is_empty() {
            return Err(PathError::Empty);
        }

        let chars: Vec<char> = input.chars().collect();
        let mut segments = Vec::new();
        let mut pos = 0;
        let mut expect_field = true;

        loop {
            if expect_field {
                let start = pos;
                while pos < chars.len() && is_ident_char(chars[pos]) {
                    pos += 1;
                }
                if start == pos {
                    return Err(PathError::ExpectedField { position: start });
                }
                segments.push(PathSegment::Field(chars[start..pos].iter().collect()));
                expect_field = false;
            }

            let Some(&c) = chars.get(pos) else {
                break;
            };

            match c {
                '.' => {
                    pos += 1;
                    expect_field = true;
                }
                '[' => {
                    let (segment, next) = parse_subscript(&chars, pos)?;
                    segments.push(segment);
                    pos = next;
                }
                found => return Err(PathError::UnexpectedChar { position: pos, found }),
            }
        }

        Ok(Self { segments })
    }

    /// The parsed segments
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Parse `[N]`, `['key']` or `["key"]` starting at the opening bracket
fn parse_subscript(chars: &[char], open: usize) -> Result<(PathSegment, usize), PathError> {
    let mut pos = open + 1;

    match chars.get(pos) {
        Some(&quote) if quote == '\'' || quote == '"' => {
            pos += 1;
            let mut key = String::new();
            loop {
                match chars.get(pos) {
                    None => return Err(PathError::UnterminatedSubscript { position: open }),
                    Some('\\') => {
                        let escaped = chars
                            .get(pos + 1)
                            .ok_or(PathError::UnterminatedSubscript { position: open })?;
                        key.push(*escaped);
                        pos += 2;
                    }
                    Some(&c) if c == quote => {
                        pos += 1;
                        break;
                    }
                    Some(&c) => {
                        key.push(c);
                        pos += 1;
                    }
                }
            }
            match chars.get(pos) {
                Some(']') => Ok((PathSegment::Key(key), pos + 1)),
                Some(&found) => Err(PathError::UnexpectedChar { position: pos, found }),
                None => Err(PathError::UnterminatedSubscript { position: open }),
            }
        }
        _ => {
            let start = pos;
            while pos < chars.len() && chars[pos] != ']' {
                pos += 1;
            }
            if pos >= chars.len() {
                return Err(PathError::UnterminatedSubscript { position: open });
            }
            let text: String = chars[start..pos].iter().collect();
            let index = text
                .trim()
                .parse::<usize>()
                .map_err(|_| PathError::InvalidIndex { position: start, text })?;
            Ok((PathSegment::Index(index), pos + 1))
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Field(name) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", name)?;
                }
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
                PathSegment::Key(key) => {
                    write!(f, "['")?;
                    for c in key.chars() {
                        if c == '\'' || c == '\\' {
                            write!(f, "\\")?;
                        }
                        write!(f, "{}", c)?;
                    }
                    write!(f, "']")?;
                }
            }
        }
        Ok(())
    }
}

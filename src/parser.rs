//! Low-level pieces of the eventsource wire grammar: line splitting, field
//! decomposition and message-delimiter scanning.
//!
//! The grammar is line oriented. Any of the three line-ending conventions
//! (`\r\n`, `\n`, `\r`) may be used, mixed freely within one stream, and a
//! message block ends at the first blank line, i.e. at the earliest
//! occurrence of `\r\n\r\n`, `\n\n` or `\r\r`.

use nom::{IResult, Parser, bytes::complete::take_till, combinator::opt};

/// UTF-8 byte order mark, tolerated (and dropped) at the very start of a stream.
pub(crate) const BOM: &[u8] = b"\xef\xbb\xbf";

/// Decompose a single line into `(name, value)`.
///
/// Everything before the first colon is the field name. When a colon is
/// present, a single space directly after it is stripped from the value; a
/// line without a colon carries no value. A line with an empty name is a
/// comment.
pub(crate) fn field_line(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    let (rest, name) = take_till(|c| c == ':').parse(input)?;
    let (rest, colon) = opt(nom::character::complete::char(':')).parse(rest)?;
    let value = colon.map(|_| rest.strip_prefix(' ').unwrap_or(rest));
    Ok(("", (name, value)))
}

/// Iterate over the lines of a message block.
pub(crate) fn lines(block: &str) -> Lines<'_> {
    Lines { rest: block }
}

pub(crate) struct Lines<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        match memchr::memchr2(b'\r', b'\n', self.rest.as_bytes()) {
            Some(pos) => {
                let line = &self.rest[..pos];
                let bytes = self.rest.as_bytes();
                let width = if bytes[pos] == b'\r' && bytes.get(pos + 1) == Some(&b'\n') {
                    2
                } else {
                    1
                };
                self.rest = &self.rest[pos + width..];
                Some(line)
            }
            None => Some(std::mem::take(&mut self.rest)),
        }
    }
}

/// Scan `buf` for the earliest message delimiter: `\r\n\r\n`, `\n\n` or
/// `\r\r`, whichever occurs first, scanning left to right. The forms are
/// matched literally and are not coalesced with each other.
///
/// Returns the delimiter's byte offset and width.
pub(crate) fn find_message_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    for pos in memchr::memchr2_iter(b'\r', b'\n', buf) {
        let rest = &buf[pos..];
        if rest.starts_with(b"\r\n\r\n") {
            return Some((pos, 4));
        }
        if rest.starts_with(b"\n\n") || rest.starts_with(b"\r\r") {
            return Some((pos, 2));
        }
    }
    None
}

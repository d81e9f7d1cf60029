use std::{fmt, time::Duration};

use smol_str::SmolStr;

use crate::parser;

/// One parsed server-sent event.
///
/// An `Event` is built from exactly one raw message block and is immutable
/// once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    event: Option<SmolStr>,
    id: Option<SmolStr>,
    data: String,
    retry: Option<Duration>,
}

impl Event {
    /// Parse a single message block into an [`Event`].
    ///
    /// `raw` is the in-buffer text of one message with the trailing blank-line
    /// delimiter already stripped: zero or more lines, separated by any of
    /// `\r\n`, `\n` or `\r`, mixed usage permitted.
    ///
    /// Field effects, per line:
    ///
    /// - `event` sets the event type, last occurrence wins;
    /// - `data` appends to the data buffer, joined with `\n` when the buffer
    ///   already has content;
    /// - `id` sets the id, last occurrence wins — an empty value counts as
    ///   "no id", and a value containing U+0000 NULL is ignored outright;
    /// - `retry` is parsed as a base-10 integer of milliseconds, with any
    ///   non-numeric value coerced to 0;
    /// - an empty name marks a comment line, which is skipped;
    /// - any other name is skipped without affecting subsequent lines.
    ///
    /// This function is pure: it never touches connection state, and parsing
    /// the same input twice yields identical events.
    ///
    /// # Examples
    ///
    /// ```
    /// use evsource::Event;
    ///
    /// let event = Event::parse("event: add\ndata: a\ndata: b\nid: 7")?;
    /// assert_eq!(event.event_type(), "add");
    /// assert_eq!(event.data(), "a\nb");
    /// assert_eq!(event.id(), Some("7"));
    /// # Ok::<_, evsource::ParseError>(())
    /// ```
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let mut event = Self {
            event: None,
            id: None,
            data: String::new(),
            retry: None,
        };
        for line in parser::lines(raw) {
            let (_, (name, value)) =
                parser::field_line(line).map_err(|_| ParseError::invalid_line(line))?;
            let value = value.unwrap_or("");
            match name {
                "" => {
                    tracing::trace!("skipping sse comment line");
                }
                "event" => event.event = Some(SmolStr::new(value)),
                "data" => {
                    if !event.data.is_empty() {
                        event.data.push('\n');
                    }
                    event.data.push_str(value);
                }
                "id" => {
                    if value.contains('\u{0000}') {
                        tracing::trace!("skipping sse id field containing NULL");
                    } else {
                        event.id = (!value.is_empty()).then(|| SmolStr::new(value));
                    }
                }
                "retry" => {
                    event.retry = Some(Duration::from_millis(value.parse().unwrap_or(0)));
                }
                other => {
                    tracing::trace!(field = other, "skipping unrecognized sse field");
                }
            }
        }
        Ok(event)
    }

    /// Return the event's type (`event: <name>`).
    ///
    /// Defaults to `"message"` when the field was unspecified or set to the
    /// empty string, matching how browsers dispatch such events.
    pub fn event_type(&self) -> &str {
        match self.event.as_deref() {
            Some(event) if !event.is_empty() => event,
            _ => "message",
        }
    }

    /// Return the event's resumption identifier (`id: <identifier>`).
    ///
    /// `None` when the message carried no id, or only an empty one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Return the event's data content: all `data` fields of the message,
    /// joined with `\n` in arrival order. Empty when the message carried
    /// no data.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Consume `self` and return the data content.
    pub fn into_data(self) -> String {
        self.data
    }

    /// Deserialize the data content as JSON.
    pub fn json_data<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.data)
    }

    /// Return the server-suggested reconnection delay (`retry: <millis>`),
    /// if this message carried one.
    ///
    /// A `retry` field with a non-numeric value coerces to a zero duration,
    /// which the client treats as "no override".
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }
}

/// Error returned when a message block cannot be parsed into an [`Event`].
#[derive(Debug)]
pub struct ParseError {
    kind: ParseErrorKind,
}

#[derive(Debug)]
enum ParseErrorKind {
    InvalidUtf8(std::str::Utf8Error),
    InvalidLine(SmolStr),
}

impl ParseError {
    pub(crate) fn invalid_utf8(err: std::str::Utf8Error) -> Self {
        Self {
            kind: ParseErrorKind::InvalidUtf8(err),
        }
    }

    pub(crate) fn invalid_line(line: &str) -> Self {
        Self {
            kind: ParseErrorKind::InvalidLine(SmolStr::new(line)),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParseErrorKind::InvalidUtf8(err) => {
                write!(f, "sse message block is not valid utf-8: {err}")
            }
            ParseErrorKind::InvalidLine(line) => {
                write!(f, "sse line cannot be decomposed into a field: {line:?}")
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ParseErrorKind::InvalidUtf8(err) => Some(err),
            ParseErrorKind::InvalidLine(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_deterministic() {
        let raw = "event: tick\ndata: a\ndata: b\nid: 5\nretry: 100";
        assert_eq!(Event::parse(raw).unwrap(), Event::parse(raw).unwrap());
    }

    #[test]
    fn multi_line_data_joined_with_newline() {
        let event = Event::parse("data: a\ndata: b").unwrap();
        assert_eq!(event.data(), "a\nb");
    }

    #[test]
    fn empty_block_yields_defaults() {
        let event = Event::parse("").unwrap();
        assert_eq!(event.event_type(), "message");
        assert_eq!(event.data(), "");
        assert_eq!(event.id(), None);
        assert_eq!(event.retry(), None);
    }

    #[test]
    fn comment_lines_never_affect_fields() {
        let event = Event::parse(": keep-alive\ndata: x\n: another").unwrap();
        assert_eq!(event.event_type(), "message");
        assert_eq!(event.data(), "x");
        assert_eq!(event.id(), None);
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let event = Event::parse("flavor: vanilla\ndata: x\nnocolon\nid: 3").unwrap();
        assert_eq!(event.data(), "x");
        assert_eq!(event.id(), Some("3"));
    }

    #[test]
    fn last_event_occurrence_wins() {
        let event = Event::parse("event: add\nevent: remove").unwrap();
        assert_eq!(event.event_type(), "remove");
    }

    #[test]
    fn empty_event_type_falls_back_to_message() {
        let event = Event::parse("event: add\nevent:").unwrap();
        assert_eq!(event.event_type(), "message");
    }

    #[test]
    fn empty_id_counts_as_absent() {
        assert_eq!(Event::parse("id:").unwrap().id(), None);
        assert_eq!(Event::parse("id: 7\nid:").unwrap().id(), None);
        assert_eq!(Event::parse("id: 7").unwrap().id(), Some("7"));
    }

    #[test]
    fn id_with_null_is_ignored() {
        let event = Event::parse("id: 7\nid: a\u{0000}b").unwrap();
        assert_eq!(event.id(), Some("7"));
    }

    #[test]
    fn retry_parses_milliseconds() {
        let event = Event::parse("retry: 5000").unwrap();
        assert_eq!(event.retry(), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn non_numeric_retry_coerces_to_zero() {
        let event = Event::parse("retry: soon").unwrap();
        assert_eq!(event.retry(), Some(Duration::ZERO));
    }

    #[test]
    fn mixed_line_endings_within_one_block() {
        let event = Event::parse("data: a\r\ndata: b\rdata: c\ndata: d").unwrap();
        assert_eq!(event.data(), "a\nb\nc\nd");
    }

    #[test]
    fn single_leading_space_is_stripped_from_value() {
        assert_eq!(Event::parse("data:x").unwrap().data(), "x");
        assert_eq!(Event::parse("data: x").unwrap().data(), "x");
        assert_eq!(Event::parse("data:  x").unwrap().data(), " x");
    }

    #[test]
    fn json_data_decodes_payload() {
        let event = Event::parse("data: {\"answer\": 42}").unwrap();
        let value: serde_json::Value = event.json_data().unwrap();
        assert_eq!(value["answer"], 42);
    }
}

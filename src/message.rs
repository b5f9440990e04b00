//! Message identifiers and messages.
//!
//! A `MessageId` pairs the value of the queue's atomic id counter with an
//! optional segment label. Its canonical text form is `msg:<counter>:<segment>`,
//! with an empty segment written as a bare trailing colon (`msg:1:`).
//!
//! # Parsing
//!
//! The text must start with the `msg` tag. What follows is the counter and,
//! optionally, one segment field. `msg:1:` and `msg:1` both decode to a
//! message without a segment. A segment can therefore never contain `:`.

use std::fmt;
use std::str::FromStr;

use crate::error::QueueError;

const TAG: &str = "msg";
const SEPARATOR: char = ':';

/// Identifier of a queued message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId {
    counter: u64,
    segment: Option<String>,
}

impl MessageId {
    /// Builds an id. An empty segment is the same as no segment.
    pub fn new(counter: u64, segment: Option<impl Into<String>>) -> Self {
        let segment = segment.map(Into::into).filter(|s: &String| !s.is_empty());
        Self { counter, segment }
    }

    /// Checks that a segment label can be carried in the text form.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::MalformedIdentifier` if the label contains `:`.
    pub fn check_segment(segment: &str) -> Result<(), QueueError> {
        if segment.contains(SEPARATOR) {
            return Err(QueueError::malformed(
                segment,
                "segment must not contain ':'",
            ));
        }
        Ok(())
    }

    /// Builds an id without a segment.
    pub fn unsegmented(counter: u64) -> Self {
        Self {
            counter,
            segment: None,
        }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn segment(&self) -> Option<&str> {
        self.segment.as_deref()
    }

    /// Canonical text form.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decodes the canonical text form.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::MalformedIdentifier` for a wrong tag, a missing or
    /// non-numeric counter, or more than three `:`-separated fields.
    pub fn parse(text: &str) -> Result<Self, QueueError> {
        let fields: Vec<&str> = text.trim().split(SEPARATOR).collect();
        if fields.len() > 3 {
            return Err(QueueError::malformed(
                text,
                format!("expected at most 3 fields, found {}", fields.len()),
            ));
        }
        if fields[0] != TAG {
            return Err(QueueError::malformed(text, "missing 'msg' tag"));
        }

        let counter = match fields.get(1) {
            Some(raw) if !raw.is_empty() => raw
                .parse::<u64>()
                .map_err(|_| QueueError::malformed(text, "counter is not an unsigned integer"))?,
            _ => return Err(QueueError::malformed(text, "missing counter")),
        };

        let segment = fields.get(2).copied();
        Ok(Self::new(counter, segment))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            TAG,
            SEPARATOR,
            self.counter,
            SEPARATOR,
            self.segment.as_deref().unwrap_or("")
        )
    }
}

impl FromStr for MessageId {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A message id together with its opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(id: MessageId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// Payload as UTF-8 text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

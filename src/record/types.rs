//! Record stream wire format.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ RECORD (repeated until End)          │
//! │  tag: u8 (one of the bytes below)    │
//! │  length: u32 LE                      │
//! │  payload: [u8; length]               │
//! └──────────────────────────────────────┘
//! ```
//!
//! A queue file is a sequence of records: a fixed-width Size record first
//! (patched in place at finalization), then envelope records, a MessageStart
//! boundary, header/body text, an ExtractedStart boundary, extracted
//! recipients, and a terminal End record.

/// Closed set of record tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Message extent: content length, content offset, recipient count, flags.
    Size,
    /// Posting time (decimal Unix seconds).
    Time,
    /// Sender full name.
    FullName,
    /// Envelope sender.
    Sender,
    /// Envelope recipient.
    Recipient,
    /// Recipient address as originally submitted, before expansion.
    OrigRecipient,
    /// Terminator for the preceding recipient's bookkeeping.
    Done,
    /// Scheduled delay-warning time.
    Warn,
    /// Named attribute (key=value).
    Attr,
    /// Content filter action (pipeline-synthesized only).
    Filter,
    /// Redirect action (pipeline-synthesized only).
    Redirect,
    /// Return-receipt address (pipeline-synthesized only).
    ReturnReceipt,
    /// Errors-to address (pipeline-synthesized only).
    ErrorsTo,
    /// Boundary: message content follows.
    MessageStart,
    /// One line of header or body text.
    Normal,
    /// Continuation chunk of an overlong text line.
    Continuation,
    /// Filler emitted so a short record can be patched in place.
    Padding,
    /// Boundary: extracted-recipient segment follows.
    ExtractedStart,
    /// End of stream.
    End,
}

impl RecordType {
    /// The wire tag byte for this record type.
    pub fn tag(self) -> u8 {
        match self {
            Self::Size => b'C',
            Self::Time => b'T',
            Self::FullName => b'F',
            Self::Sender => b'S',
            Self::Recipient => b'R',
            Self::OrigRecipient => b'O',
            Self::Done => b'D',
            Self::Warn => b'W',
            Self::Attr => b'A',
            Self::Filter => b'L',
            Self::Redirect => b'r',
            Self::ReturnReceipt => b'm',
            Self::ErrorsTo => b'e',
            Self::MessageStart => b'M',
            Self::Normal => b'N',
            Self::Continuation => b'+',
            Self::Padding => b'P',
            Self::ExtractedStart => b'X',
            Self::End => b'E',
        }
    }

    /// Decode a wire tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            b'C' => Self::Size,
            b'T' => Self::Time,
            b'F' => Self::FullName,
            b'S' => Self::Sender,
            b'R' => Self::Recipient,
            b'O' => Self::OrigRecipient,
            b'D' => Self::Done,
            b'W' => Self::Warn,
            b'A' => Self::Attr,
            b'L' => Self::Filter,
            b'r' => Self::Redirect,
            b'm' => Self::ReturnReceipt,
            b'e' => Self::ErrorsTo,
            b'M' => Self::MessageStart,
            b'N' => Self::Normal,
            b'+' => Self::Continuation,
            b'P' => Self::Padding,
            b'X' => Self::ExtractedStart,
            b'E' => Self::End,
            _ => return None,
        })
    }

    /// Text-like records may be transparently chunked on output.
    pub fn is_text(self) -> bool {
        matches!(self, Self::Normal | Self::Continuation)
    }

    /// Records that begin a recipient's bookkeeping in the envelope and
    /// extracted phases.
    pub fn is_recipient_class(self) -> bool {
        matches!(self, Self::Recipient | Self::OrigRecipient | Self::Done)
    }

    /// Human-readable name for diagnostics and the `inspect` subcommand.
    pub fn name(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Time => "time",
            Self::FullName => "full-name",
            Self::Sender => "sender",
            Self::Recipient => "recipient",
            Self::OrigRecipient => "orig-recipient",
            Self::Done => "done",
            Self::Warn => "warn",
            Self::Attr => "attr",
            Self::Filter => "filter",
            Self::Redirect => "redirect",
            Self::ReturnReceipt => "return-receipt",
            Self::ErrorsTo => "errors-to",
            Self::MessageStart => "message-start",
            Self::Normal => "normal-text",
            Self::Continuation => "continuation",
            Self::Padding => "padding",
            Self::ExtractedStart => "extracted-start",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded record.
///
/// The payload carries an explicit length and is never NUL-terminated; it
/// may contain arbitrary bytes up to the configured line-length limit.
/// Records are transient: produced by the reader, consumed by the current
/// phase handler, and copied into session state only where bookkeeping
/// requires it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub rtype: RecordType,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(rtype: RecordType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            rtype,
            payload: payload.into(),
        }
    }

    /// Payload as text. Headers and addresses travel as UTF-8 or Latin-1;
    /// the lossy view is only used for classification and logging, the
    /// original bytes are what gets written through.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        for rtype in [
            RecordType::Size,
            RecordType::Time,
            RecordType::FullName,
            RecordType::Sender,
            RecordType::Recipient,
            RecordType::OrigRecipient,
            RecordType::Done,
            RecordType::Warn,
            RecordType::Attr,
            RecordType::Filter,
            RecordType::Redirect,
            RecordType::ReturnReceipt,
            RecordType::ErrorsTo,
            RecordType::MessageStart,
            RecordType::Normal,
            RecordType::Continuation,
            RecordType::Padding,
            RecordType::ExtractedStart,
            RecordType::End,
        ] {
            assert_eq!(RecordType::from_tag(rtype.tag()), Some(rtype));
        }
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(RecordType::from_tag(b'?'), None);
    }

    #[test]
    fn test_recipient_class() {
        assert!(RecordType::Recipient.is_recipient_class());
        assert!(RecordType::OrigRecipient.is_recipient_class());
        assert!(RecordType::Done.is_recipient_class());
        assert!(!RecordType::Sender.is_recipient_class());
    }
}

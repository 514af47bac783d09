//! Record stream reader.

use std::io::{BufRead, ErrorKind};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Result, ScrubError};
use crate::record::types::{Record, RecordType};

/// Reads `(tag, length, payload)` triples from any buffered source.
///
/// The reader enforces the configured line-length limit on every payload so
/// that a corrupt or hostile length field cannot cause an unbounded
/// allocation.
pub struct RecordReader<R: BufRead> {
    inner: R,
    offset: u64,
    line_length_limit: u32,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(inner: R, line_length_limit: u32) -> Self {
        Self {
            inner,
            offset: 0,
            line_length_limit,
        }
    }

    /// Byte offset of the next unread record.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next record, or `None` at a clean end of input.
    ///
    /// A truncated record (EOF inside the length field or payload) is a
    /// malformed-input error, not a clean end.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let mut tag = [0u8; 1];
        match self.inner.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let rtype = RecordType::from_tag(tag[0]).ok_or(ScrubError::UnknownRecordTag {
            offset: self.offset,
            tag: tag[0],
        })?;

        let length = self
            .inner
            .read_u32::<LittleEndian>()
            .map_err(|_| ScrubError::MalformedRecord {
                offset: self.offset,
                reason: "truncated length field".into(),
            })?;

        if length > self.line_length_limit {
            return Err(ScrubError::RecordTooLong {
                offset: self.offset,
                length,
                limit: self.line_length_limit,
            });
        }

        let mut payload = vec![0u8; length as usize];
        self.inner
            .read_exact(&mut payload)
            .map_err(|_| ScrubError::MalformedRecord {
                offset: self.offset,
                reason: format!("truncated payload, expected {length} bytes"),
            })?;

        self.offset += 1 + 4 + u64::from(length);
        Ok(Some(Record { rtype, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    fn encode(records: &[(RecordType, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        for (rtype, payload) in records {
            buf.push(rtype.tag());
            buf.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
            buf.extend_from_slice(payload);
        }
        buf
    }

    #[test]
    fn test_read_sequence() {
        let bytes = encode(&[
            (RecordType::Sender, b"alice@example.com"),
            (RecordType::End, b""),
        ]);
        let mut reader = RecordReader::new(Cursor::new(bytes), 2048);

        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(first.rtype, RecordType::Sender);
        assert_eq!(first.payload, b"alice@example.com");

        let second = reader.next_record().unwrap().unwrap();
        assert_eq!(second.rtype, RecordType::End);
        assert!(second.payload.is_empty());

        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_offset_tracking() {
        let bytes = encode(&[(RecordType::Time, b"1700000000")]);
        let mut reader = RecordReader::new(Cursor::new(bytes), 2048);
        reader.next_record().unwrap();
        assert_eq!(reader.offset(), 1 + 4 + 10);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let bytes = vec![b'?', 0, 0, 0, 0];
        let mut reader = RecordReader::new(Cursor::new(bytes), 2048);
        assert!(matches!(
            reader.next_record(),
            Err(ScrubError::UnknownRecordTag { tag: b'?', .. })
        ));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut bytes = vec![RecordType::Normal.tag()];
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut reader = RecordReader::new(Cursor::new(bytes), 2048);
        assert!(matches!(
            reader.next_record(),
            Err(ScrubError::RecordTooLong { .. })
        ));
    }

    #[test]
    fn test_truncated_payload_is_error() {
        let mut bytes = vec![RecordType::Normal.tag()];
        bytes.extend_from_slice(&10u32.to_le_bytes());
        bytes.extend_from_slice(b"shor");
        let mut reader = RecordReader::new(Cursor::new(bytes), 2048);
        assert!(matches!(
            reader.next_record(),
            Err(ScrubError::MalformedRecord { .. })
        ));
    }
}

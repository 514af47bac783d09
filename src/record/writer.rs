//! Record Output Service: appends typed records to a growing queue file.
//!
//! The writer owns the output path for the lifetime of one message. The
//! file begins with a fixed-width placeholder Size record that is rewritten
//! in place at finalization, once the true message extent is known. On any
//! exit path that does not reach [`QueueWriter::commit`], the partial file
//! is deleted; a half-written queue entry is never left live for the next
//! pipeline stage.

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::{debug, warn};

use crate::error::{Result, ScrubError};
use crate::record::types::RecordType;
use crate::status::Status;

/// Width of each decimal field in the Size record payload.
const SIZE_FIELD_WIDTH: usize = 15;

/// Total Size record payload length: four fixed-width fields, space-separated.
const SIZE_PAYLOAD_LEN: usize = 4 * SIZE_FIELD_WIDTH + 3;

/// Reserved extent for a patchable header line; shorter lines are followed
/// by a Padding filler so an in-place overwrite never has to resize.
const PATCH_RESERVE: usize = 64;

/// The fields stored in the leading Size record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeFields {
    /// Length of the message content segment in the queue file.
    pub content_length: u64,
    /// Offset of the first message content record.
    pub content_offset: u64,
    /// Number of committed recipients.
    pub recipient_count: u64,
    /// Accumulated status flag bits.
    pub flags: u32,
}

impl SizeFields {
    /// Encode as the fixed-width payload. The width never varies, which is
    /// what makes the in-place patch possible.
    pub fn encode(&self) -> Vec<u8> {
        format!(
            "{:>width$} {:>width$} {:>width$} {:>width$}",
            self.content_length,
            self.content_offset,
            self.recipient_count,
            self.flags,
            width = SIZE_FIELD_WIDTH
        )
        .into_bytes()
    }

    /// Decode a Size record payload.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(payload).ok()?;
        let mut fields = text.split_whitespace();
        let content_length = fields.next()?.parse().ok()?;
        let content_offset = fields.next()?.parse().ok()?;
        let recipient_count = fields.next()?.parse().ok()?;
        let flags = fields.next()?.parse().ok()?;
        Some(Self {
            content_length,
            content_offset,
            recipient_count,
            flags,
        })
    }
}

/// Buffered, seekable record writer with delete-on-drop crash safety.
pub struct QueueWriter {
    path: PathBuf,
    file: BufWriter<File>,
    offset: u64,
    max_record_length: usize,
    committed: bool,
}

impl QueueWriter {
    /// Create the queue file and write the placeholder Size record.
    pub fn create(path: impl AsRef<Path>, max_record_length: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| ScrubError::io(&path, e))?;
        let mut writer = Self {
            path,
            file: BufWriter::new(file),
            offset: 0,
            max_record_length,
            committed: false,
        };
        let placeholder = SizeFields::default().encode();
        writer
            .write_record(RecordType::Size, &placeholder)
            .map_err(|e| ScrubError::io(&writer.path, e))?;
        Ok(writer)
    }

    /// Current output cursor (bytes written so far).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Append one logical record.
    ///
    /// A text-like payload longer than the maximum single-record length is
    /// transparently split into Continuation records followed by a final
    /// record of the original type; readers reassemble the sequence, so the
    /// split is invisible to callers. Once `status` carries an output-fatal
    /// flag the call returns immediately.
    pub fn emit(&mut self, status: &mut Status, rtype: RecordType, payload: &[u8]) {
        if !status.can_output() {
            return;
        }
        let result = if payload.len() > self.max_record_length && rtype.is_text() {
            self.write_chunked(rtype, payload)
        } else {
            self.write_record(rtype, payload)
        };
        if let Err(e) = result {
            self.latch_write_error(status, &e);
        }
    }

    /// Emit a possibly multi-line logical header.
    ///
    /// The first physical line goes out as-is; continuation lines get a
    /// leading tab unless they already start with whitespace. In patchable
    /// mode, short lines are followed by a Padding filler record so the line
    /// can later be overwritten in place.
    pub fn emit_header(&mut self, status: &mut Status, header: &str, patchable: bool) {
        for (i, line) in header.split('\n').enumerate() {
            let owned;
            let line: &str = if i == 0 || line.starts_with([' ', '\t']) {
                line
            } else {
                owned = format!("\t{line}");
                &owned
            };
            self.emit(status, RecordType::Normal, line.as_bytes());
            if patchable && line.len() < PATCH_RESERVE {
                let filler = vec![b' '; PATCH_RESERVE - line.len()];
                self.emit(status, RecordType::Padding, &filler);
            }
        }
    }

    /// Flush buffered output and rewrite the leading Size record in place.
    pub fn patch_size(&mut self, status: &mut Status, fields: SizeFields) {
        if !status.can_output() {
            return;
        }
        if let Err(e) = self.patch_size_inner(fields) {
            self.latch_write_error(status, &e);
        }
    }

    fn patch_size_inner(&mut self, fields: SizeFields) -> std::io::Result<()> {
        self.file.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        let payload = fields.encode();
        debug_assert_eq!(payload.len(), SIZE_PAYLOAD_LEN);
        self.file.write_all(&[RecordType::Size.tag()])?;
        self.file.write_u32::<LittleEndian>(payload.len() as u32)?;
        self.file.write_all(&payload)?;
        self.file.seek(SeekFrom::End(0))?;
        self.file.flush()?;
        Ok(())
    }

    /// Hand the finished queue file to the next stage. Disarms the
    /// delete-on-drop guard.
    pub fn commit(mut self) -> Result<PathBuf> {
        self.file
            .flush()
            .map_err(|e| ScrubError::io(&self.path, e))?;
        self.file
            .get_ref()
            .sync_all()
            .map_err(|e| ScrubError::io(&self.path, e))?;
        self.committed = true;
        Ok(self.path.clone())
    }

    fn write_chunked(&mut self, rtype: RecordType, payload: &[u8]) -> std::io::Result<()> {
        let mut chunks = payload.chunks(self.max_record_length).peekable();
        while let Some(chunk) = chunks.next() {
            let chunk_type = if chunks.peek().is_some() {
                RecordType::Continuation
            } else {
                rtype
            };
            self.write_record(chunk_type, chunk)?;
        }
        Ok(())
    }

    fn write_record(&mut self, rtype: RecordType, payload: &[u8]) -> std::io::Result<()> {
        self.file.write_all(&[rtype.tag()])?;
        self.file.write_u32::<LittleEndian>(payload.len() as u32)?;
        self.file.write_all(payload)?;
        self.offset += 1 + 4 + payload.len() as u64;
        Ok(())
    }

    fn latch_write_error(&self, status: &mut Status, error: &std::io::Error) {
        let flag = match error.kind() {
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded => Status::SIZE,
            _ => Status::WRITE,
        };
        // First latch wins; can_output() suppresses every later attempt,
        // so this logs once per cause.
        warn!(path = %self.path.display(), error = %error, flag = %flag, "Queue file write failed");
        status.insert(flag);
    }
}

impl Drop for QueueWriter {
    fn drop(&mut self) {
        if !self.committed {
            debug!(path = %self.path.display(), "Removing uncommitted queue file");
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Could not remove partial queue file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::reader::RecordReader;
    use std::io::BufReader;

    fn read_all(path: &Path) -> Vec<(RecordType, Vec<u8>)> {
        let file = File::open(path).unwrap();
        let mut reader = RecordReader::new(BufReader::new(file), 1 << 20);
        let mut records = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            records.push((record.rtype, record.payload));
        }
        records
    }

    #[test]
    fn test_placeholder_then_patch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue");
        let mut status = Status::empty();

        let mut writer = QueueWriter::create(&path, 2048).unwrap();
        writer.emit(&mut status, RecordType::Sender, b"alice@example.com");
        let fields = SizeFields {
            content_length: 42,
            content_offset: 7,
            recipient_count: 3,
            flags: 0,
        };
        writer.patch_size(&mut status, fields);
        writer.commit().unwrap();

        let records = read_all(&path);
        assert_eq!(records[0].0, RecordType::Size);
        assert_eq!(SizeFields::parse(&records[0].1).unwrap(), fields);
        assert_eq!(records[1].0, RecordType::Sender);
    }

    #[test]
    fn test_chunking_is_reversible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue");
        let mut status = Status::empty();

        let mut writer = QueueWriter::create(&path, 10).unwrap();
        let long_line = b"0123456789abcdefghijKLMNO";
        writer.emit(&mut status, RecordType::Normal, long_line);
        writer.commit().unwrap();

        let records = read_all(&path);
        // Size record, then two Continuation chunks, then the final Normal.
        assert_eq!(records[1].0, RecordType::Continuation);
        assert_eq!(records[2].0, RecordType::Continuation);
        assert_eq!(records[3].0, RecordType::Normal);
        let rejoined: Vec<u8> = records[1..]
            .iter()
            .flat_map(|(_, payload)| payload.iter().copied())
            .collect();
        assert_eq!(rejoined, long_line);
        assert!(records[1..]
            .iter()
            .all(|(_, payload)| payload.len() <= 10));
    }

    #[test]
    fn test_non_text_records_never_chunked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue");
        let mut status = Status::empty();

        let mut writer = QueueWriter::create(&path, 4).unwrap();
        writer.emit(&mut status, RecordType::Sender, b"averylongsender@example.com");
        writer.commit().unwrap();

        let records = read_all(&path);
        assert_eq!(records[1].0, RecordType::Sender);
        assert_eq!(records[1].1, b"averylongsender@example.com");
    }

    #[test]
    fn test_emit_header_folds_continuations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue");
        let mut status = Status::empty();

        let mut writer = QueueWriter::create(&path, 2048).unwrap();
        writer.emit_header(&mut status, "Subject: hello\nworld\n already indented", false);
        writer.commit().unwrap();

        let records = read_all(&path);
        assert_eq!(records[1].1, b"Subject: hello");
        assert_eq!(records[2].1, b"\tworld");
        assert_eq!(records[3].1, b" already indented");
    }

    #[test]
    fn test_emit_header_patchable_padding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue");
        let mut status = Status::empty();

        let mut writer = QueueWriter::create(&path, 2048).unwrap();
        writer.emit_header(&mut status, "X-Short: x", true);
        writer.commit().unwrap();

        let records = read_all(&path);
        assert_eq!(records[1].0, RecordType::Normal);
        assert_eq!(records[2].0, RecordType::Padding);
        assert_eq!(records[1].1.len() + records[2].1.len(), PATCH_RESERVE);
    }

    #[test]
    fn test_emit_no_op_after_fatal_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue");
        let mut status = Status::empty();

        let mut writer = QueueWriter::create(&path, 2048).unwrap();
        let before = writer.offset();
        status.insert(Status::BAD);
        writer.emit(&mut status, RecordType::Normal, b"ignored");
        assert_eq!(writer.offset(), before);
    }

    #[test]
    fn test_uncommitted_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue");
        {
            let _writer = QueueWriter::create(&path, 2048).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists(), "partial queue file must not survive");
    }
}

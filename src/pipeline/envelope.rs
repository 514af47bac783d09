//! Envelope phase: sender/recipient/attribute records preceding the
//! message content.
//!
//! Ordering invariants enforced here: exactly one sender, sender and
//! posting time before any recipient, original-recipient values attach
//! only to the immediately following recipient.

use chrono::{DateTime, Duration};
use tracing::{debug, warn};

use crate::address::RewriteContext;
use crate::record::{Record, RecordType};
use crate::status::Status;

use super::{AddressClass, Flow, Phase, Pipeline};

impl Pipeline {
    pub(crate) fn handle_envelope(&mut self, record: &Record) -> Flow {
        match record.rtype {
            RecordType::Time => self.envelope_time(record),
            RecordType::Sender => self.envelope_sender(record),
            RecordType::FullName => {
                if self.state.full_name.is_none() {
                    self.state.full_name = Some(record.text().trim().to_string());
                    self.emit(RecordType::FullName, &record.payload);
                } else {
                    debug!("Duplicate full-name record ignored");
                }
            }
            RecordType::Attr | RecordType::Warn => {
                self.emit(record.rtype, &record.payload);
            }
            RecordType::OrigRecipient => {
                if self.state.pending_orig_recipient.is_some() {
                    warn!("Unmatched original recipient discarded");
                }
                self.state.pending_orig_recipient = Some(record.text().trim().to_string());
            }
            RecordType::Done => {
                self.state.pending_orig_recipient = None;
            }
            RecordType::Recipient => self.envelope_recipient(record),
            RecordType::MessageStart => return self.envelope_message_start(record),
            RecordType::End => {
                warn!("End record before message content");
                self.state.status.insert(Status::BAD);
                self.state.phase = Phase::Done;
            }
            _ => {
                warn!(rtype = %record.rtype, "Unexpected record in envelope");
                self.state.status.insert(Status::BAD);
            }
        }
        Flow::Handled
    }

    fn envelope_time(&mut self, record: &Record) {
        if self.state.posting_time.is_some() {
            debug!("Duplicate time record ignored");
            return;
        }
        let Some(time) = record
            .text()
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
        else {
            warn!(payload = %record.text(), "Unparseable time record");
            self.state.status.insert(Status::BAD);
            return;
        };
        self.state.posting_time = Some(time);
        self.emit(RecordType::Time, &record.payload);
    }

    fn envelope_sender(&mut self, record: &Record) {
        if self.state.sender.is_some() {
            warn!("Second sender record");
            self.state.status.insert(Status::BAD);
            return;
        }
        let raw = record.text().trim().to_string();
        let canonical = self.canonicalize(RewriteContext::Envelope, AddressClass::Sender, &raw);
        self.emit(RecordType::Sender, canonical.as_bytes());
        self.state.sender = Some(canonical);
    }

    fn envelope_recipient(&mut self, record: &Record) {
        if !self.state.in_recipient_run {
            if self.state.sender.is_none() || self.state.posting_time.is_none() {
                warn!("Recipient record before sender and time");
                self.state.status.insert(Status::BAD);
                self.state.pending_orig_recipient = None;
                return;
            }
            self.state.in_recipient_run = true;
            let delay = self.config.general.delay_warn_time;
            if delay > 0 {
                // posting_time checked above
                let warn_at = self.state.posting_time.expect("posting time accepted")
                    + Duration::seconds(delay as i64);
                self.emit(
                    RecordType::Warn,
                    warn_at.timestamp().to_string().as_bytes(),
                );
            }
        }
        self.state.envelope_recipient_seen = true;
        let raw = record.text().trim().to_string();
        let original = self
            .state
            .pending_orig_recipient
            .take()
            .unwrap_or_else(|| raw.clone());
        let canonical = self.canonicalize(RewriteContext::Envelope, AddressClass::Recipient, &raw);
        self.accept_recipient(Some(&original), &canonical);
    }

    fn envelope_message_start(&mut self, record: &Record) -> Flow {
        if self.state.pending_orig_recipient.take().is_some() {
            warn!("Original recipient without recipient at end of envelope");
        }
        if self.state.sender.is_none() || self.state.posting_time.is_none() {
            warn!("Message content without complete envelope");
            self.state.status.insert(Status::BAD);
            return Flow::Handled;
        }
        self.emit(RecordType::MessageStart, &record.payload);
        self.state.message_start = Some(self.writer.offset());
        self.state.phase = Phase::MessageHeader;
        Flow::Handled
    }
}

//! Extracted phase: the optional second recipient list, synthesized
//! extras, and finalization of the queue file.

use tracing::{debug, warn};

use crate::address::RewriteContext;
use crate::record::{writer::SizeFields, Record, RecordType};
use crate::status::Status;

use super::{AddressClass, Flow, Phase, Pipeline};

impl Pipeline {
    pub(crate) fn handle_extracted(&mut self, record: &Record) -> Flow {
        // Synthesized extras go out ahead of the first recipient-class
        // record of this segment.
        if record.rtype.is_recipient_class() {
            self.emit_extras_once();
        }
        match record.rtype {
            RecordType::Filter
            | RecordType::Redirect
            | RecordType::ReturnReceipt
            | RecordType::ErrorsTo
            | RecordType::Attr => {
                // Only this pipeline may synthesize these; an upstream copy
                // is discarded in favor of our own canonical one.
                debug!(rtype = %record.rtype, "Discarding upstream-supplied extracted record");
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
            RecordType::Recipient => {
                let raw = record.text().trim().to_string();
                let original = self
                    .state
                    .pending_orig_recipient
                    .take()
                    .unwrap_or_else(|| raw.clone());
                let canonical =
                    self.canonicalize(RewriteContext::Envelope, AddressClass::Recipient, &raw);
                self.accept_recipient(Some(&original), &canonical);
            }
            RecordType::End => self.finish_extracted(),
            _ => {
                warn!(rtype = %record.rtype, "Unexpected record in extracted segment");
                self.state.status.insert(Status::BAD);
            }
        }
        Flow::Handled
    }

    /// Emit the pending synthesized extras once, in fixed order, ahead of
    /// the first recipient of this segment.
    fn emit_extras_once(&mut self) {
        if self.state.extras_emitted {
            return;
        }
        self.state.extras_emitted = true;

        if let Some(filter) = self.config.general.content_filter.clone() {
            self.emit(RecordType::Filter, filter.as_bytes());
        }
        if let Some(redirect) = self.config.general.redirect_recipient.clone() {
            self.emit(RecordType::Redirect, redirect.as_bytes());
        }
        if self.state.saw_8bit {
            self.emit(RecordType::Attr, b"encoding=8bit");
        }
        if let Some(address) = self.state.return_receipt.clone() {
            self.emit(RecordType::ReturnReceipt, address.as_bytes());
        }
        if let Some(address) = self.state.errors_to.clone() {
            self.emit(RecordType::ErrorsTo, address.as_bytes());
        }
    }

    /// Terminal record: commit header-extracted recipients, the always-bcc
    /// copy, the End marker, then patch the leading size record in place.
    fn finish_extracted(&mut self) {
        if self.state.pending_orig_recipient.take().is_some() {
            warn!("Original recipient without recipient at end of stream");
        }
        self.emit_extras_once();

        if !self.state.envelope_recipient_seen {
            let candidates = std::mem::take(&mut self.state.extracted_candidates);
            debug!(count = candidates.len(), "Committing header-extracted recipients");
            for (original, canonical) in candidates {
                self.accept_recipient(Some(&original), &canonical);
            }
        }

        if self.state.recipient_count > 0 {
            if let Some(bcc) = self.config.general.always_bcc.clone() {
                let canonical =
                    self.canonicalize(RewriteContext::Envelope, AddressClass::Recipient, &bcc);
                self.accept_recipient(None, &canonical);
            }
        }

        if self.state.recipient_count == 0 {
            warn!("Message has no recipients");
            self.state.status.insert(Status::RCPT);
        }

        self.emit(RecordType::End, b"");

        let (Some(start), Some(extracted)) = (self.state.message_start, self.state.extracted_start)
        else {
            // Unreachable through the phase machine; refuse to guess.
            warn!("Finalizing without both segment offsets");
            self.state.status.insert(Status::BAD);
            self.state.phase = Phase::Done;
            return;
        };
        let fields = SizeFields {
            content_length: extracted - start,
            content_offset: start,
            recipient_count: self.state.recipient_count,
            flags: self.state.status.bits(),
        };
        self.writer.patch_size(&mut self.state.status, fields);
        self.state.phase = Phase::Done;
    }
}

//! Message phase: header accumulation, rewriting and synthesis, then body
//! pass-through.
//!
//! Headers are folded logical units: a whitespace-led line continues the
//! header in progress. One oversized header latches a non-fatal overflow
//! flag and everything past it is treated as body text; accumulation never
//! grows without bound.

use chrono::Utc;
use tracing::{debug, warn};

use crate::address::parse::{extract_addresses, quote_822_local, rewrite_header_value};
use crate::address::RewriteContext;
use crate::inspect::Verdict;
use crate::record::{Record, RecordType};
use crate::status::Status;

use super::{AddressClass, Flow, Phase, Pipeline};

/// Dispatch role of a known header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderRole {
    /// From, Resent-From: addresses rewritten; presence suppresses
    /// missing-From synthesis.
    Sender,
    /// To, Cc, Resent-To, Resent-Cc: rewritten, visible to recipients,
    /// candidates for envelope-recipient extraction.
    VisibleRecipient,
    /// Bcc: recipients extracted, the header itself never emitted.
    BlindRecipient,
    /// Return-Receipt-To: rewritten, retained for the extracted segment.
    ReturnReceipt,
    /// Errors-To: rewritten, retained for the extracted segment.
    ErrorsTo,
    /// Recognized but never emitted.
    Dropped,
    /// Received: counts a hop.
    Received,
    Date,
    MessageId,
    Other,
}

fn classify_header(name: &str) -> HeaderRole {
    if name.eq_ignore_ascii_case("from") || name.eq_ignore_ascii_case("resent-from") {
        HeaderRole::Sender
    } else if name.eq_ignore_ascii_case("to")
        || name.eq_ignore_ascii_case("cc")
        || name.eq_ignore_ascii_case("resent-to")
        || name.eq_ignore_ascii_case("resent-cc")
    {
        HeaderRole::VisibleRecipient
    } else if name.eq_ignore_ascii_case("bcc") {
        HeaderRole::BlindRecipient
    } else if name.eq_ignore_ascii_case("return-receipt-to") {
        HeaderRole::ReturnReceipt
    } else if name.eq_ignore_ascii_case("errors-to") {
        HeaderRole::ErrorsTo
    } else if name.eq_ignore_ascii_case("return-path") || name.eq_ignore_ascii_case("content-length")
    {
        // Synthesized downstream; an upstream copy would be a forgery.
        HeaderRole::Dropped
    } else if name.eq_ignore_ascii_case("received") {
        HeaderRole::Received
    } else if name.eq_ignore_ascii_case("date") {
        HeaderRole::Date
    } else if name.eq_ignore_ascii_case("message-id") {
        HeaderRole::MessageId
    } else {
        HeaderRole::Other
    }
}

/// Decode record bytes for classification. UTF-8 first, Latin-1 fallback
/// (which accepts every byte), so inspection and rewriting always see text.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => encoding_rs::mem::decode_latin1(bytes).into_owned(),
    }
}

/// A line shaped like `Name: value` with a non-empty RFC 5322 field name.
fn is_header_line(line: &str) -> bool {
    let Some(colon) = line.find(':') else {
        return false;
    };
    colon > 0
        && line[..colon]
            .bytes()
            .all(|b| (33..=126).contains(&b) && b != b':')
}

impl Pipeline {
    // ── Header sub-state ────────────────────────────────────────

    pub(crate) fn handle_header(&mut self, record: &Record) -> Flow {
        if record.rtype != RecordType::Normal {
            // Any non-text record ends the header section.
            self.end_headers();
            self.state.phase = Phase::MessageBody;
            return Flow::Reprocess;
        }

        let line = decode_text(&record.payload);

        if !self.state.header_buffer.is_empty() && line.starts_with([' ', '\t']) {
            if self.state.header_buffer.len() + line.len() + 1
                > self.config.limits.header_size_limit
            {
                warn!(
                    limit = self.config.limits.header_size_limit,
                    "Header exceeds size limit, truncating"
                );
                self.state.status.insert(Status::HOVFL);
                self.end_headers();
                self.state.phase = Phase::MessageBody;
                // The overflowing tail is body text from here on.
                return Flow::Reprocess;
            }
            self.state.header_buffer.push('\n');
            self.state.header_buffer.push_str(&line);
            return Flow::Handled;
        }

        self.flush_header();

        if is_header_line(&line) {
            if line.len() > self.config.limits.header_size_limit {
                warn!(
                    limit = self.config.limits.header_size_limit,
                    "Header exceeds size limit, truncating"
                );
                self.state.status.insert(Status::HOVFL);
                self.end_headers();
                self.state.phase = Phase::MessageBody;
                return Flow::Reprocess;
            }
            self.state.header_buffer = line;
            return Flow::Handled;
        }

        // First non-header line: synthesize what is missing, then hand the
        // record to the body sub-state. A transitioning record with content
        // gets exactly one blank separator line first.
        self.end_headers();
        self.state.phase = Phase::MessageBody;
        if !record.payload.is_empty() {
            self.emit_text("");
        }
        Flow::Reprocess
    }

    /// Classify and emit the header in progress, if any.
    pub(crate) fn flush_header(&mut self) {
        if self.state.header_buffer.is_empty() {
            return;
        }
        let header = std::mem::take(&mut self.state.header_buffer);

        if let Some(inspector) = &self.collab.header_checks {
            match inspector.classify(&header) {
                Verdict::Reject => {
                    warn!(header = %first_line(&header), "Header rejected by content inspection");
                    self.state.status.insert(Status::CONT);
                }
                Verdict::Ignore => {
                    debug!(header = %first_line(&header), "Header dropped by content inspection");
                    return;
                }
                Verdict::Pass => {}
            }
        }

        let Some((name, value)) = header.split_once(':') else {
            // Accumulation only starts on header-shaped lines.
            self.emit_folded_header(&header);
            return;
        };
        let name = name.trim().to_string();
        let value = value.trim().to_string();

        match classify_header(&name) {
            HeaderRole::Sender => self.header_sender_role(&name, &value),
            HeaderRole::VisibleRecipient => self.header_recipient_role(&name, &value),
            HeaderRole::BlindRecipient => self.header_blind_recipient(&value),
            HeaderRole::ReturnReceipt => {
                let rewritten = self.header_special_recipient(&name, &value);
                if self.state.return_receipt.is_none() {
                    self.state.return_receipt = rewritten;
                }
            }
            HeaderRole::ErrorsTo => {
                let rewritten = self.header_special_recipient(&name, &value);
                if self.state.errors_to.is_none() {
                    self.state.errors_to = rewritten;
                }
            }
            HeaderRole::Dropped => {
                debug!(header = %name, "Dropped header");
            }
            HeaderRole::Received => {
                self.state.hop_count += 1;
                if self.state.hop_count > self.config.limits.hopcount_limit
                    && !self.state.status.contains(Status::HOPS)
                {
                    warn!(
                        hops = self.state.hop_count,
                        limit = self.config.limits.hopcount_limit,
                        "Hop count limit exceeded"
                    );
                    self.state.status.insert(Status::HOPS);
                }
                self.emit_folded_header(&header);
            }
            HeaderRole::Date => {
                self.state.headers_seen.date = true;
                self.emit_folded_header(&header);
            }
            HeaderRole::MessageId => {
                self.state.headers_seen.message_id = true;
                self.emit_folded_header(&header);
            }
            HeaderRole::Other => {
                self.emit_folded_header(&header);
            }
        }
    }

    /// From / Resent-From.
    fn header_sender_role(&mut self, name: &str, value: &str) {
        let rewritten = rewrite_header_value(value, &mut |addr| {
            self.canonicalize(RewriteContext::Header, AddressClass::Sender, addr)
        });
        self.state.headers_seen.from = true;
        self.emit_folded_header(&format!("{name}: {rewritten}"));
    }

    /// To / Cc / Resent-To / Resent-Cc.
    fn header_recipient_role(&mut self, name: &str, value: &str) {
        let originals = extract_addresses(value);
        let rewritten = rewrite_header_value(value, &mut |addr| {
            self.canonicalize(RewriteContext::Header, AddressClass::Recipient, addr)
        });
        self.state.headers_seen.recipient_visible = true;
        self.collect_candidates(originals, &rewritten);
        self.emit_folded_header(&format!("{name}: {rewritten}"));
    }

    /// Bcc: same extraction as the visible recipient headers, but the
    /// header itself must never reach the queue file.
    fn header_blind_recipient(&mut self, value: &str) {
        let originals = extract_addresses(value);
        let rewritten = rewrite_header_value(value, &mut |addr| {
            self.canonicalize(RewriteContext::Header, AddressClass::Recipient, addr)
        });
        self.collect_candidates(originals, &rewritten);
        debug!("Dropped blind-recipient header");
    }

    /// Extraction feeds the extracted phase only when the envelope carried
    /// no recipients of its own.
    fn collect_candidates(&mut self, originals: Vec<String>, rewritten: &str) {
        if self.state.envelope_recipient_seen {
            return;
        }
        let canonicals = extract_addresses(rewritten);
        for (original, canonical) in originals.into_iter().zip(canonicals) {
            if self.state.extracted_candidates.len() >= self.config.limits.extract_recipient_limit {
                warn!(
                    limit = self.config.limits.extract_recipient_limit,
                    "Header recipient extraction limit reached"
                );
                break;
            }
            self.state.extracted_candidates.push((original, canonical));
        }
    }

    /// Return-Receipt-To / Errors-To: emitted like any recipient-role
    /// header, first address retained for the extracted segment.
    fn header_special_recipient(&mut self, name: &str, value: &str) -> Option<String> {
        let rewritten = rewrite_header_value(value, &mut |addr| {
            self.canonicalize(RewriteContext::Header, AddressClass::Recipient, addr)
        });
        self.emit_folded_header(&format!("{name}: {rewritten}"));
        extract_addresses(&rewritten).into_iter().next()
    }

    /// Synthesize any missing mandatory headers, exactly once per message.
    pub(crate) fn end_headers(&mut self) {
        self.flush_header();
        if self.state.headers_finished {
            return;
        }
        self.state.headers_finished = true;

        let time = self.state.posting_time.unwrap_or_else(Utc::now);

        if !self.state.headers_seen.from {
            let sender = self.state.sender.clone().unwrap_or_default();
            let line = if sender.is_empty() {
                "From: MAILER-DAEMON".to_string()
            } else {
                let quoted = quote_822_local(&sender);
                match self.state.full_name.clone() {
                    Some(name) if !name.is_empty() => format!("From: {name} <{quoted}>"),
                    _ => format!("From: {quoted}"),
                }
            };
            self.emit_folded_header(&line);
        }
        if !self.state.headers_seen.date {
            self.emit_folded_header(&format!("Date: {}", time.to_rfc2822()));
        }
        if !self.state.headers_seen.message_id {
            self.emit_folded_header(&format!(
                "Message-Id: <{:x}.{}@{}>",
                time.timestamp_micros(),
                self.identity.queue_id,
                self.identity.hostname
            ));
        }
        if !self.state.headers_seen.recipient_visible {
            self.emit_folded_header("To: undisclosed-recipients:;");
        }
    }

    // ── Body sub-state ──────────────────────────────────────────

    pub(crate) fn handle_body(&mut self, record: &Record) -> Flow {
        match record.rtype {
            RecordType::Normal | RecordType::Continuation => {
                if record.payload.iter().any(|b| b & 0x80 != 0) {
                    self.state.saw_8bit = true;
                }
                if let Some(inspector) = &self.collab.body_checks {
                    match inspector.classify(&decode_text(&record.payload)) {
                        Verdict::Reject => {
                            warn!("Body line rejected by content inspection");
                            self.state.status.insert(Status::CONT);
                        }
                        Verdict::Ignore => {
                            debug!("Body line dropped by content inspection");
                            return Flow::Handled;
                        }
                        Verdict::Pass => {}
                    }
                }
                self.emit(record.rtype, &record.payload);
            }
            RecordType::ExtractedStart => {
                self.state.extracted_start = Some(self.writer.offset());
                self.emit(RecordType::ExtractedStart, &record.payload);
                self.state.phase = Phase::Extracted;
            }
            _ => {
                warn!(rtype = %record.rtype, "Unexpected record in message body");
                self.state.status.insert(Status::BAD);
            }
        }
        Flow::Handled
    }
}

fn first_line(header: &str) -> &str {
    header.split('\n').next().unwrap_or(header)
}

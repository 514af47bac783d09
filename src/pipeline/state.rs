//! Per-message session state.
//!
//! One instance exists per message, exclusively owned by the pipeline from
//! stream open to finalization. Phase handlers mutate it record by record;
//! nothing here is shared, so no locking exists anywhere in the core.

use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use lru::LruCache;

use crate::config::Config;
use crate::status::Status;

/// The current phase of the transducer.
///
/// The driver `match`es on this; a handler may hand the same record to the
/// next phase (soft boundaries).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Sender/recipient/attribute records preceding the message content.
    Envelope,
    /// Header lines of the message content.
    MessageHeader,
    /// Body lines of the message content.
    MessageBody,
    /// The optional second recipient list after the content.
    Extracted,
    /// Terminal record seen; nothing further is accepted.
    Done,
}

/// Which headers have been seen (or synthesized), for missing-header
/// synthesis and first-instance-wins bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadersSeen {
    pub date: bool,
    pub message_id: bool,
    pub from: bool,
    /// Any recipient-visible header (To, Cc, Resent-To, Resent-Cc).
    pub recipient_visible: bool,
}

/// All mutable state for one message.
pub struct SessionState {
    /// Accumulated status flags; never cleared once set.
    pub status: Status,
    pub phase: Phase,

    /// Canonical envelope sender; exactly one accepted, first Sender record
    /// wins and a second is a hard parse error.
    pub sender: Option<String>,
    /// Sender full name, first instance wins.
    pub full_name: Option<String>,
    /// Posting time, first instance wins.
    pub posting_time: Option<DateTime<Utc>>,

    /// Original-recipient value awaiting its Recipient record.
    pub pending_orig_recipient: Option<String>,
    /// Whether the envelope carried any recipient record; gates header
    /// recipient extraction.
    pub envelope_recipient_seen: bool,
    /// Whether the envelope entered its recipient run (delay warning and
    /// ordering checks happen on this edge).
    pub in_recipient_run: bool,

    /// Number of recipients committed to the output.
    pub recipient_count: u64,
    /// Bounded duplicate filter keyed by case-folded normalized address.
    pub dedup: LruCache<String, ()>,

    /// In-progress logical header accumulation.
    pub header_buffer: String,
    /// All mandatory-header synthesis already performed.
    pub headers_finished: bool,
    pub headers_seen: HeadersSeen,
    /// Received: header count.
    pub hop_count: u32,

    /// Recipient candidates extracted from headers as (as-submitted,
    /// canonical) pairs; used only when the envelope carried no recipients.
    pub extracted_candidates: Vec<(String, String)>,
    /// Return-receipt address extracted from headers, first wins.
    pub return_receipt: Option<String>,
    /// Errors-to address extracted from headers, first wins.
    pub errors_to: Option<String>,
    /// A body line carried non-ASCII bytes; drives the encoding attribute.
    pub saw_8bit: bool,
    /// The extracted phase's synthesized extras were already emitted.
    pub extras_emitted: bool,

    /// Output offset of the first message content record.
    pub message_start: Option<u64>,
    /// Output offset where the extracted segment begins.
    pub extracted_start: Option<u64>,
}

impl SessionState {
    pub fn new(config: &Config) -> Self {
        let capacity = NonZeroUsize::new(config.limits.duplicate_filter_limit)
            .unwrap_or(NonZeroUsize::new(1000).expect("default capacity is non-zero"));
        Self {
            status: Status::empty(),
            phase: Phase::Envelope,
            sender: None,
            full_name: None,
            posting_time: None,
            pending_orig_recipient: None,
            envelope_recipient_seen: false,
            in_recipient_run: false,
            recipient_count: 0,
            dedup: LruCache::new(capacity),
            header_buffer: String::new(),
            headers_finished: false,
            headers_seen: HeadersSeen::default(),
            hop_count: 0,
            extracted_candidates: Vec::new(),
            return_receipt: None,
            errors_to: None,
            saw_8bit: false,
            extras_emitted: false,
            message_start: None,
            extracted_start: None,
        }
    }
}

//! The cleanup pipeline: a single-pass, single-threaded streaming record
//! transducer.
//!
//! Control flows strictly forward: Envelope → Message-Header → Message-Body
//! → Extracted → Done. Phase boundaries are soft: a handler may hand the
//! record it was given to the next phase by returning [`Flow::Reprocess`].
//! All per-message state lives in one [`SessionState`]; the collaborators
//! (rewriting oracle, lookup tables, inspectors) are constructed once and
//! injected, the pipeline itself holds no global state.

pub mod envelope;
pub mod extracted;
pub mod message;
pub mod recipient;
pub mod state;

use std::io::BufRead;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::address::parse::split_address;
use crate::address::{
    map_one_to_one, masquerade, rewrite_address, DomainRewriter, HashMapTable, LookupTable,
    RewriteContext, Rewriter,
};
use crate::config::Config;
use crate::error::Result;
use crate::inspect::{Inspector, RegexInspector};
use crate::record::{QueueWriter, Record, RecordReader, RecordType};
use crate::status::Status;

pub use state::{Phase, SessionState};

/// What a phase handler did with the record it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// The record was consumed.
    Handled,
    /// The record belongs to the next phase; dispatch it again.
    Reprocess,
}

/// External collaborators, injected once at construction.
pub struct Collaborators {
    /// The canonicalization oracle.
    pub rewriter: Box<dyn Rewriter>,
    /// One-to-one map applied to every address.
    pub canonical_map: Option<Box<dyn LookupTable>>,
    /// One-to-one map applied to senders only.
    pub sender_canonical_map: Option<Box<dyn LookupTable>>,
    /// One-to-one map applied to recipients only.
    pub recipient_canonical_map: Option<Box<dyn LookupTable>>,
    /// One-to-many virtual alias expansion.
    pub virtual_alias_map: Option<Box<dyn LookupTable>>,
    /// Pattern table applied to each logical header.
    pub header_checks: Option<Box<dyn Inspector>>,
    /// Pattern table applied to each body line.
    pub body_checks: Option<Box<dyn Inspector>>,
}

impl Collaborators {
    /// Build the default collaborator set from configuration: file-backed
    /// tables and the built-in domain rewriter.
    pub fn from_config(config: &Config, hostname: &str) -> Result<Self> {
        let origin = if config.address.origin_domain.is_empty() {
            hostname
        } else {
            &config.address.origin_domain
        };
        let load_table = |path: &Option<PathBuf>| -> Result<Option<Box<dyn LookupTable>>> {
            match path {
                Some(path) => Ok(Some(
                    Box::new(HashMapTable::from_file(path)?) as Box<dyn LookupTable>
                )),
                None => Ok(None),
            }
        };
        let load_checks = |path: &Option<PathBuf>| -> Result<Option<Box<dyn Inspector>>> {
            match path {
                Some(path) => Ok(Some(
                    Box::new(RegexInspector::from_file(path)?) as Box<dyn Inspector>
                )),
                None => Ok(None),
            }
        };
        Ok(Self {
            rewriter: Box::new(DomainRewriter::new(origin)),
            canonical_map: load_table(&config.address.canonical_map)?,
            sender_canonical_map: load_table(&config.address.sender_canonical_map)?,
            recipient_canonical_map: load_table(&config.address.recipient_canonical_map)?,
            virtual_alias_map: load_table(&config.address.virtual_alias_map)?,
            header_checks: load_checks(&config.inspect.header_checks)?,
            body_checks: load_checks(&config.inspect.body_checks)?,
        })
    }
}

/// Queue identity used for header synthesis.
#[derive(Debug, Clone)]
pub struct Identity {
    pub hostname: String,
    pub queue_id: String,
}

impl Identity {
    /// Generate a fresh queue id from the clock and process id.
    pub fn generate(hostname: impl Into<String>) -> Self {
        let queue_id = format!(
            "{:X}{:X}",
            Utc::now().timestamp_micros(),
            std::process::id()
        );
        Self {
            hostname: hostname.into(),
            queue_id,
        }
    }
}

/// Final disposition of one message.
#[derive(Debug)]
pub enum Disposition {
    /// The queue file was committed for the next stage.
    Accepted { path: PathBuf, recipients: u64 },
    /// The message was undeliverable; a local failure notification was
    /// synthesized and the original discarded.
    Bounced { notice: String, status: Status },
    /// The raw status is propagated to the caller; the original was
    /// discarded.
    Rejected { status: Status },
}

/// Which address-specific canonical map applies.
#[derive(Debug, Clone, Copy)]
pub(crate) enum AddressClass {
    Sender,
    Recipient,
}

/// The streaming transducer for one message.
pub struct Pipeline {
    pub(crate) config: Config,
    pub(crate) collab: Collaborators,
    pub(crate) identity: Identity,
    pub(crate) writer: QueueWriter,
    pub(crate) state: SessionState,
}

impl Pipeline {
    /// Open the queue file (placeholder size record included) and set up
    /// the session.
    pub fn new(
        config: Config,
        collab: Collaborators,
        identity: Identity,
        output: &Path,
    ) -> Result<Self> {
        let writer = QueueWriter::create(output, config.limits.line_length_limit as usize)?;
        let state = SessionState::new(&config);
        info!(queue_id = %identity.queue_id, output = %output.display(), "Session opened");
        Ok(Self {
            config,
            collab,
            identity,
            writer,
            state,
        })
    }

    /// Accumulated status flags so far.
    pub fn status(&self) -> Status {
        self.state.status
    }

    /// Recipients committed to the output so far.
    pub fn recipients(&self) -> u64 {
        self.state.recipient_count
    }

    /// Feed one record through the current phase.
    pub fn process(&mut self, record: &Record) {
        let mut flow = self.dispatch(record);
        while flow == Flow::Reprocess {
            flow = self.dispatch(record);
        }
    }

    fn dispatch(&mut self, record: &Record) -> Flow {
        // A malformed-input flag ends all trust in the stream; keep
        // draining so the reader stays in sync, but process nothing.
        if self.state.status.contains(Status::BAD) {
            if record.rtype == RecordType::End {
                self.state.phase = Phase::Done;
            } else {
                debug!(rtype = %record.rtype, "Draining untrusted stream");
            }
            return Flow::Handled;
        }
        match self.state.phase {
            Phase::Envelope => self.handle_envelope(record),
            Phase::MessageHeader => self.handle_header(record),
            Phase::MessageBody => self.handle_body(record),
            Phase::Extracted => self.handle_extracted(record),
            Phase::Done => {
                debug!(rtype = %record.rtype, "Record after end of stream, ignored");
                Flow::Handled
            }
        }
    }

    /// Drain an input stream to its End record (or EOF).
    ///
    /// Record-level violations latch flags and keep draining; a stream that
    /// cannot be decoded at all (bad tag, truncation) cannot be resynced
    /// and is returned as an error. Either way the queue file is discarded
    /// unless [`Pipeline::finish`] commits it.
    pub fn run<R: BufRead>(&mut self, reader: &mut RecordReader<R>) -> Result<()> {
        loop {
            match reader.next_record() {
                Ok(Some(record)) => {
                    let terminal = record.rtype == RecordType::End;
                    self.process(&record);
                    if terminal {
                        return Ok(());
                    }
                }
                Ok(None) => {
                    if self.state.phase != Phase::Done {
                        warn!(queue_id = %self.identity.queue_id, "Input ended before End record");
                        self.state.status.insert(Status::BAD);
                    }
                    return Ok(());
                }
                Err(e) => {
                    self.state.status.insert(Status::BAD);
                    return Err(e);
                }
            }
        }
    }

    /// Decide the message's fate and release the queue file accordingly.
    pub fn finish(self) -> Result<Disposition> {
        let Self {
            config,
            identity,
            writer,
            state,
            ..
        } = self;
        let status = state.status;

        if status.is_clean() {
            let path = writer.commit()?;
            info!(queue_id = %identity.queue_id, recipients = state.recipient_count, "Message accepted");
            return Ok(Disposition::Accepted {
                path,
                recipients: state.recipient_count,
            });
        }

        // Dropping the writer removes the partial queue file.
        drop(writer);
        match (&state.sender, config.general.bounce_on_error) {
            (Some(sender), true) if !sender.is_empty() => {
                let notice = format!(
                    "message {} from <{}> could not be accepted: {}",
                    identity.queue_id, sender, status
                );
                warn!(queue_id = %identity.queue_id, status = %status, "Message bounced");
                Ok(Disposition::Bounced { notice, status })
            }
            _ => {
                warn!(queue_id = %identity.queue_id, status = %status, "Message rejected");
                Ok(Disposition::Rejected { status })
            }
        }
    }

    // ── Shared helpers for the phase handlers ───────────────────

    pub(crate) fn emit(&mut self, rtype: RecordType, payload: &[u8]) {
        self.writer.emit(&mut self.state.status, rtype, payload);
    }

    pub(crate) fn emit_text(&mut self, line: &str) {
        self.writer
            .emit(&mut self.state.status, RecordType::Normal, line.as_bytes());
    }

    pub(crate) fn emit_folded_header(&mut self, header: &str) {
        self.writer
            .emit_header(&mut self.state.status, header, false);
    }

    /// Run one address through the full canonicalization chain: rewriting
    /// oracle, common canonical map, class-specific canonical map (each
    /// mapped result re-qualified by the oracle), then masquerading.
    pub(crate) fn canonicalize(
        &mut self,
        context: RewriteContext,
        class: AddressClass,
        address: &str,
    ) -> String {
        let rewriter = self.collab.rewriter.as_ref();
        let (mut addr, _) = rewrite_address(rewriter, context, address);
        let specific = match class {
            AddressClass::Sender => &self.collab.sender_canonical_map,
            AddressClass::Recipient => &self.collab.recipient_canonical_map,
        };
        for table in [&self.collab.canonical_map, specific] {
            let Some(table) = table else { continue };
            match map_one_to_one(table.as_ref(), &addr) {
                Ok(Some(mapped)) => {
                    addr = rewrite_address(rewriter, context, &mapped).0;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, address = %addr, "Canonical map failed");
                    self.state.status.insert(Status::WRITE);
                }
            }
        }
        if self.config.address.masquerade_domains.is_empty() || self.is_exposed_user(&addr) {
            addr
        } else {
            masquerade(&addr, &self.config.address.masquerade_domains)
        }
    }

    /// Exposed users keep their full domain through masquerading.
    fn is_exposed_user(&self, address: &str) -> bool {
        let (local, _) = split_address(address);
        self.config
            .address
            .masquerade_exceptions
            .iter()
            .any(|user| user.eq_ignore_ascii_case(local))
    }
}

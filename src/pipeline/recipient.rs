//! Recipient output filter: virtual expansion, duplicate suppression, and
//! the final commit of each recipient to the output stream.

use tracing::{debug, warn};

use crate::address::map_one_to_many;
use crate::address::parse::normalize_key;
use crate::record::RecordType;
use crate::status::Status;

use super::Pipeline;

impl Pipeline {
    /// Commit one logical recipient.
    ///
    /// `original` is the recipient as originally submitted, before virtual
    /// expansion and canonicalization; it is recorded at most once per
    /// logical recipient, never once per expanded candidate. Callers pass
    /// it through unchanged and must not re-derive it after expansion.
    pub(crate) fn accept_recipient(&mut self, original: Option<&str>, address: &str) {
        let candidates = match &self.collab.virtual_alias_map {
            Some(table) => {
                match map_one_to_many(
                    table.as_ref(),
                    address,
                    self.config.limits.expansion_recursion_limit,
                    self.config.limits.expansion_fanout_limit,
                ) {
                    Ok(expansion) => {
                        if expansion.truncated {
                            self.state.status.insert(Status::DEFER);
                        }
                        expansion.addresses
                    }
                    Err(e) => {
                        warn!(error = %e, address, "Virtual alias expansion failed");
                        self.state.status.insert(Status::WRITE);
                        return;
                    }
                }
            }
            None => vec![address.to_string()],
        };

        let mut original_recorded = false;
        for candidate in candidates {
            let key = normalize_key(&candidate);
            if self.state.dedup.contains(&key) {
                debug!(address = %candidate, "Duplicate recipient dropped");
                continue;
            }
            self.state.dedup.put(key, ());
            if !original_recorded {
                if let Some(original) = original {
                    self.emit(RecordType::OrigRecipient, original.as_bytes());
                }
                original_recorded = true;
            }
            self.emit(RecordType::Recipient, candidate.as_bytes());
            self.state.recipient_count += 1;
        }
    }
}

//! Per-message status flags.
//!
//! Flags accumulate over the lifetime of one message and are never cleared
//! once set; the single end-of-message disposition decision reads the final
//! union. Call sites insert flags through [`Status::insert`] so each
//! contribution to the final status stays auditable.

use std::fmt;

/// A typed set of status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status(u32);

impl Status {
    /// Record-ordering violation, unknown record type in a phase, or a
    /// missing mandatory envelope field. The stream is still drained but
    /// no longer trusted.
    pub const BAD: Status = Status(1 << 0);
    /// One logical header exceeded the header size limit.
    pub const HOVFL: Status = Status(1 << 1);
    /// Hop count limit exceeded.
    pub const HOPS: Status = Status(1 << 2);
    /// Output storage exhausted.
    pub const SIZE: Status = Status(1 << 3);
    /// Output write failure.
    pub const WRITE: Status = Status(1 << 4);
    /// Content inspection rejected a header or body line.
    pub const CONT: Status = Status(1 << 5);
    /// No recipient was committed for this message.
    pub const RCPT: Status = Status(1 << 6);
    /// A resource cap truncated address expansion; the result cannot be
    /// trusted for delivery and the message should be retried.
    pub const DEFER: Status = Status(1 << 7);

    /// Flags after which further output is pointless: the stream is either
    /// untrusted or the sink is gone.
    const OUTPUT_FATAL: Status = Status(Self::BAD.0 | Self::SIZE.0 | Self::WRITE.0);

    /// The empty flag set.
    pub fn empty() -> Self {
        Status(0)
    }

    /// No flag set: the message is deliverable as written.
    pub fn is_clean(self) -> bool {
        self.0 == 0
    }

    /// Latch `flag` into the set. Never clears anything.
    pub fn insert(&mut self, flag: Status) {
        self.0 |= flag.0;
    }

    pub fn contains(self, flag: Status) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// Whether the output service should still accept records.
    pub fn can_output(self) -> bool {
        self.0 & Self::OUTPUT_FATAL.0 == 0
    }

    /// Raw bit representation, stored in the queue file's size record.
    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        Status(bits)
    }
}

impl std::ops::BitOr for Status {
    type Output = Status;

    fn bitor(self, rhs: Status) -> Status {
        Status(self.0 | rhs.0)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return f.write_str("clean");
        }
        let names = [
            (Self::BAD, "bad"),
            (Self::HOVFL, "header-overflow"),
            (Self::HOPS, "hopcount"),
            (Self::SIZE, "size"),
            (Self::WRITE, "write"),
            (Self::CONT, "content"),
            (Self::RCPT, "no-recipient"),
            (Self::DEFER, "defer"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("+")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_never_clear() {
        let mut status = Status::empty();
        assert!(status.is_clean());
        status.insert(Status::HOPS);
        status.insert(Status::CONT);
        assert!(status.contains(Status::HOPS));
        assert!(status.contains(Status::CONT));
        assert!(!status.contains(Status::BAD));
    }

    #[test]
    fn test_output_gating() {
        let mut status = Status::empty();
        status.insert(Status::HOVFL);
        assert!(status.can_output(), "soft flags keep the output open");
        status.insert(Status::WRITE);
        assert!(!status.can_output());
    }

    #[test]
    fn test_display() {
        let status = Status::BAD | Status::RCPT;
        assert_eq!(status.to_string(), "bad+no-recipient");
        assert_eq!(Status::empty().to_string(), "clean");
    }
}

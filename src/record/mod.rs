//! Typed, length-delimited records: the atomic unit of the queue-file stream.

pub mod reader;
pub mod types;
pub mod writer;

pub use reader::RecordReader;
pub use types::{Record, RecordType};
pub use writer::{QueueWriter, SizeFields};

pub mod record_store;
pub mod retry_writer;

pub use record_store::{BookmarkSink, JsonlStore, RecordSink};
pub use retry_writer::RetryWriter;

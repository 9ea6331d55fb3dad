pub mod cache;
pub mod convert;
pub mod discover;
pub mod failures;
pub mod ingest;
pub mod status;
pub mod unpack;

pub use cache::{ArchiveRecord, ArchiveState, IngestCache};
pub use discover::{ArchiveScanner, DiscoveredArchive, file_sha256};
pub use failures::{FailureLog, FailureRecord};
pub use ingest::{IngestError, IngestOptions, IngestReport, Ingestor};
pub use status::{IngestStatus, Phase, StatusBoard};
pub use unpack::{UnpackError, extract_archive};

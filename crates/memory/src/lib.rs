pub mod journal;
pub mod pending;
pub mod ring;
pub mod service;
pub mod snippets;

pub use journal::{Journal, JournalError};
pub use pending::{PendingQueue, PendingWrite};
pub use ring::EventRing;
pub use service::{DrainReport, MemoryError, MemoryService};
pub use snippets::{classify, load_snippets_dir};

// Write-Ahead Log implementation for durable publishes
//
// The WAL provides:
// - Append-only framed writes with CRC32 validation
// - Bounded segment files, rolled over at a configured size
// - Full crash recovery by replaying frames in write order
// - Configurable fsync cadence (per write, by byte volume, or manual)

pub mod entry;
pub mod journal;
mod segment;

pub use self::entry::WalEntry;
pub use self::journal::{WalIter, WalJournal, WalPosition};

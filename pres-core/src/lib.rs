//! Self-healing single-file archives.
//!
//! An archive is the original file followed by Reed-Solomon parity shards and
//! three copies of a plain-text configuration that records the layout and a
//! CRC-32C per shard. Any `parity_shards` damaged shards, and one damaged
//! configuration copy, can be repaired from the archive alone.

pub mod checksum;
pub mod coder;
pub mod conf;
pub mod encode;
pub mod error;
pub mod layout;
pub mod options;
pub mod paths;
pub mod progress;
pub mod quorum;
pub mod restore;
pub mod rs_codec;
pub mod stream;
pub mod verify;

pub use encode::create_archive;
pub use error::{ErrorKind, PresError, Result, Warning};
pub use options::ArchiveOptions;
pub use restore::{restore_archive, restore_archive_into, restore_archive_to_path, RestoreReport};
pub use verify::{verify_archive, Health, ShardState, VerifyReport};

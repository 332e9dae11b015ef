//! # ferry-archive
//!
//! Lossless conversion between a directory tree and a deterministic set of
//! tar objects.
//!
//! - [`TarArchiver`] — one `<prefix>archive.tar` object
//! - [`ShardedTarArchiver`] — `<prefix>shard-NNNN.tar` objects that extract
//!   independently
//!
//! Build either from configuration with [`from_config`].

pub mod archiver;
pub mod entry;
pub mod error;
pub mod sharded;
pub mod tarball;

pub use archiver::{prepare_destination, Archiver, IndexVisitor, ObjectVisitor};
pub use entry::{EntryKind, EntryName};
pub use error::ArchiveError;
pub use ferry_core::SymlinkPolicy;
pub use sharded::ShardedTarArchiver;
pub use tarball::TarArchiver;

use ferry_core::{ArchiverConfig, ArchiverKind};

/// Build the archiver an [`ArchiverConfig`] describes.
pub fn from_config(config: &ArchiverConfig) -> Result<Box<dyn Archiver>, ArchiveError> {
    Ok(match config.kind {
        ArchiverKind::Tar => Box::new(TarArchiver::new(&config.key_prefix, config.symlinks)?),
        ArchiverKind::Sharded => Box::new(ShardedTarArchiver::new(
            &config.key_prefix,
            config.shards,
            config.symlinks,
        )?),
    })
}

//! Multi-object layout: a fixed number of independent tar shards.
//!
//! Every entry goes to shard `sha256(name)[0..8] mod shards`. A shard also
//! carries the headers of its entries' ancestor directories, so shards can
//! be extracted in any order, or concurrently.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use sha2::{Digest, Sha256};
use tar::Builder;
use tracing::debug;

use ferry_core::config::MAX_SHARDS;
use ferry_core::{ObjectKey, SymlinkPolicy};

use crate::archiver::{validate_key_prefix, Archiver, IndexVisitor, ObjectVisitor};
use crate::entry::{walk_source, EntryKind, EntryName, SourceEntry};
use crate::error::{io_err, ArchiveError};
use crate::tarball::{append_entry, extract_stream, finish_builder, new_builder};

#[derive(Debug, Clone)]
pub struct ShardedTarArchiver {
    keys: Vec<ObjectKey>,
    symlinks: SymlinkPolicy,
}

impl ShardedTarArchiver {
    pub fn new(
        key_prefix: &str,
        shards: usize,
        symlinks: SymlinkPolicy,
    ) -> Result<Self, ArchiveError> {
        validate_key_prefix(key_prefix)?;
        if !(1..=MAX_SHARDS).contains(&shards) {
            return Err(ArchiveError::InvalidShardCount {
                shards,
                max: MAX_SHARDS,
            });
        }
        let keys = (0..shards)
            .map(|i| ObjectKey::join(key_prefix, &shard_name(i)))
            .collect();
        Ok(Self { keys, symlinks })
    }

    pub fn shard_count(&self) -> usize {
        self.keys.len()
    }

    /// Shard an entry name belongs to.
    pub fn shard_of(&self, name: &[u8]) -> usize {
        let digest = Sha256::digest(name);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(head) % self.keys.len() as u64) as usize
    }
}

/// `shard-0000.tar`, `shard-0001.tar`, …
pub fn shard_name(index: usize) -> String {
    format!("shard-{index:04}.tar")
}

impl Archiver for ShardedTarArchiver {
    fn index(&self, visit: &mut IndexVisitor<'_>) -> Result<(), ArchiveError> {
        for key in &self.keys {
            visit(key)?;
        }
        Ok(())
    }

    fn archive(&self, source: &Path, visit: &mut ObjectVisitor<'_>) -> Result<(), ArchiveError> {
        let mut shards = Vec::with_capacity(self.keys.len());
        for _ in &self.keys {
            shards.push(Shard {
                builder: new_builder(source)?,
                dirs: HashSet::new(),
            });
        }

        walk_source(source, self.symlinks, |entry| {
            let shard = &mut shards[self.shard_of(entry.name.as_bytes())];
            shard.append_ancestors(source, &entry.name)?;
            if entry.kind == EntryKind::Directory && !shard.dirs.insert(entry.name.clone()) {
                return Ok(());
            }
            append_entry(&mut shard.builder, &entry)
        })?;

        for (key, shard) in self.keys.iter().zip(shards) {
            let mut object = finish_builder(shard.builder, source)?;
            debug!(key = %key, "shard ready");
            visit(key, &mut object)?;
        }
        Ok(())
    }

    fn extract(
        &self,
        destination: &Path,
        key: &ObjectKey,
        object: &mut File,
    ) -> Result<(), ArchiveError> {
        if !self.keys.contains(key) {
            return Err(ArchiveError::UnknownKey { key: key.clone() });
        }
        extract_stream(destination, object, self.symlinks)
    }
}

struct Shard {
    builder: Builder<File>,
    /// Directory names whose header this shard already holds.
    dirs: HashSet<EntryName>,
}

impl Shard {
    /// Headers for every ancestor directory of `name` not yet in this shard,
    /// outermost first.
    fn append_ancestors(&mut self, source: &Path, name: &EntryName) -> Result<(), ArchiveError> {
        let mut missing = Vec::new();
        let mut current = name.parent();
        while let Some(dir) = current {
            if self.dirs.contains(&dir) {
                break;
            }
            current = dir.parent();
            missing.push(dir);
        }
        for dir in missing.into_iter().rev() {
            let path = source.join(dir.to_host_path()?);
            let meta = std::fs::symlink_metadata(&path).map_err(|e| io_err(&path, e))?;
            append_entry(
                &mut self.builder,
                &SourceEntry {
                    name: dir.clone(),
                    path,
                    meta,
                    kind: EntryKind::Directory,
                },
            )?;
            self.dirs.insert(dir);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

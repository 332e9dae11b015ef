//! Single-object tar layout and the tar stream helpers both layouts share.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::Path;

use tar::{Builder, EntryType, Header, HeaderMode};
use tracing::{debug, warn};

use ferry_core::{ObjectKey, SymlinkPolicy};

use crate::archiver::{validate_key_prefix, Archiver, IndexVisitor, ObjectVisitor};
use crate::entry::{
    ensure_no_links, entry_path, host_segment, symlink_stays_inside, walk_source, EntryKind,
    EntryName, SourceEntry,
};
use crate::error::{io_err, ArchiveError};

/// Object name of the single tar archive.
pub const ARCHIVE_NAME: &str = "archive.tar";

/// Writes the whole tree into one `<prefix>archive.tar` object.
#[derive(Debug, Clone)]
pub struct TarArchiver {
    key: ObjectKey,
    symlinks: SymlinkPolicy,
}

impl TarArchiver {
    pub fn new(key_prefix: &str, symlinks: SymlinkPolicy) -> Result<Self, ArchiveError> {
        validate_key_prefix(key_prefix)?;
        Ok(Self {
            key: ObjectKey::join(key_prefix, ARCHIVE_NAME),
            symlinks,
        })
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }
}

impl Archiver for TarArchiver {
    fn index(&self, visit: &mut IndexVisitor<'_>) -> Result<(), ArchiveError> {
        visit(&self.key)
    }

    fn archive(&self, source: &Path, visit: &mut ObjectVisitor<'_>) -> Result<(), ArchiveError> {
        let mut builder = new_builder(source)?;
        walk_source(source, self.symlinks, |entry| append_entry(&mut builder, &entry))?;
        let mut object = finish_builder(builder, source)?;
        debug!(key = %self.key, "archive object ready");
        visit(&self.key, &mut object)
    }

    fn extract(
        &self,
        destination: &Path,
        key: &ObjectKey,
        object: &mut File,
    ) -> Result<(), ArchiveError> {
        if key != &self.key {
            return Err(ArchiveError::UnknownKey { key: key.clone() });
        }
        extract_stream(destination, object, self.symlinks)
    }
}

// ---------------------------------------------------------------------------
// Stream helpers
// ---------------------------------------------------------------------------

/// A tar builder over an anonymous temporary file.
pub(crate) fn new_builder(source: &Path) -> Result<Builder<File>, ArchiveError> {
    let file = tempfile::tempfile().map_err(|e| io_err(source, e))?;
    let mut builder = Builder::new(file);
    builder.follow_symlinks(false);
    Ok(builder)
}

/// Write the end-of-archive marker and rewind to the start of the object.
pub(crate) fn finish_builder(builder: Builder<File>, source: &Path) -> Result<File, ArchiveError> {
    let mut file = builder.into_inner().map_err(|e| io_err(source, e))?;
    file.seek(SeekFrom::Start(0)).map_err(|e| io_err(source, e))?;
    Ok(file)
}

/// Append one header (plus content for regular files).
pub(crate) fn append_entry(
    builder: &mut Builder<File>,
    entry: &SourceEntry,
) -> Result<(), ArchiveError> {
    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(&entry.meta, HeaderMode::Complete);
    let path = &entry.path;
    let name = entry.name.to_host_path()?;
    match &entry.kind {
        EntryKind::Directory => {
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            builder
                .append_data(&mut header, &name, io::empty())
                .map_err(|e| io_err(path, e))?;
        }
        EntryKind::RegularFile => {
            let file = File::open(path).map_err(|e| io_err(path, e))?;
            header.set_entry_type(EntryType::Regular);
            builder
                .append_data(&mut header, &name, file)
                .map_err(|e| io_err(path, e))?;
        }
        EntryKind::Symlink(target) => {
            let link = host_segment(target).ok_or_else(|| ArchiveError::UnsafeSymlink {
                name: entry.name.to_string(),
                target: String::from_utf8_lossy(target).into_owned(),
            })?;
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            builder
                .append_link(&mut header, &name, Path::new(link))
                .map_err(|e| io_err(path, e))?;
        }
        EntryKind::Unsupported => {
            return Err(ArchiveError::UnsupportedEntry {
                path: path.clone(),
                kind: entry.kind.describe(),
            })
        }
    }
    debug!(name = %entry.name, kind = entry.kind.describe(), "archived entry");
    Ok(())
}

/// Extract every entry of one tar object under `destination`.
pub(crate) fn extract_stream(
    destination: &Path,
    object: &mut File,
    symlinks: SymlinkPolicy,
) -> Result<(), ArchiveError> {
    let mut archive = tar::Archive::new(object);
    let entries = archive.entries().map_err(|e| io_err(destination, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| io_err(destination, e))?;
        let name = EntryName::from(&*entry.path_bytes());
        let target = entry_path(destination, name.as_bytes())?;
        ensure_no_links(destination, &target, &name)?;
        let mode = entry.header().mode().unwrap_or(0o644) & 0o7777;
        let kind = header_kind(&entry);

        match kind {
            EntryKind::Directory => {
                std::fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
                set_mode(&target, mode | 0o700)?;
            }
            EntryKind::RegularFile => {
                create_parent(&target)?;
                let mut file = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&target)
                    .map_err(|e| exists_or_io(&target, e))?;
                io::copy(&mut entry, &mut file).map_err(|e| io_err(&target, e))?;
                drop(file);
                set_mode(&target, mode)?;
            }
            EntryKind::Symlink(link) => match symlinks {
                SymlinkPolicy::Preserve => {
                    if !symlink_stays_inside(&name, &link) {
                        return Err(ArchiveError::UnsafeSymlink {
                            name: name.to_string(),
                            target: String::from_utf8_lossy(&link).into_owned(),
                        });
                    }
                    create_parent(&target)?;
                    create_symlink(&link, &target)?;
                }
                SymlinkPolicy::Skip => {
                    warn!(name = %name, "skipping symbolic link");
                    continue;
                }
                SymlinkPolicy::Reject => {
                    return Err(ArchiveError::UnsupportedEntry {
                        path: target,
                        kind: "symbolic link",
                    })
                }
            },
            EntryKind::Unsupported => match symlinks {
                SymlinkPolicy::Reject => {
                    return Err(ArchiveError::UnsupportedEntry {
                        path: target,
                        kind: "special file",
                    })
                }
                SymlinkPolicy::Preserve | SymlinkPolicy::Skip => {
                    warn!(name = %name, "skipping unsupported entry");
                    continue;
                }
            },
        }
        debug!(name = %name, "extracted entry");
    }
    Ok(())
}

fn header_kind<R: io::Read>(entry: &tar::Entry<'_, R>) -> EntryKind {
    let entry_type = entry.header().entry_type();
    if entry_type.is_dir() {
        EntryKind::Directory
    } else if entry_type.is_file() {
        EntryKind::RegularFile
    } else if entry_type.is_symlink() {
        let link = entry
            .link_name_bytes()
            .map(|b| b.into_owned())
            .unwrap_or_default();
        EntryKind::Symlink(link)
    } else {
        EntryKind::Unsupported
    }
}

fn create_parent(target: &Path) -> Result<(), ArchiveError> {
    match target.parent() {
        Some(parent) => std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e)),
        None => Ok(()),
    }
}

fn exists_or_io(path: &Path, e: io::Error) -> ArchiveError {
    if e.kind() == io::ErrorKind::AlreadyExists {
        ArchiveError::EntryExists {
            path: path.to_path_buf(),
        }
    } else {
        io_err(path, e)
    }
}

#[cfg(unix)]
fn create_symlink(link: &[u8], target: &Path) -> Result<(), ArchiveError> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    std::os::unix::fs::symlink(OsStr::from_bytes(link), target)
        .map_err(|e| exists_or_io(target, e))
}
#[cfg(not(unix))]
fn create_symlink(_link: &[u8], target: &Path) -> Result<(), ArchiveError> {
    warn!(path = %target.display(), "symbolic links are not restored on this platform");
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), ArchiveError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), ArchiveError> {
    Ok(())
}

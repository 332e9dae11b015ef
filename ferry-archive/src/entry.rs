//! Archive entries: kinds, name encoding, and the source tree walk.
//!
//! Entry names are always relative and `/`-separated, whatever the host
//! separator is. On Unix they carry the raw bytes of each file name, so names
//! that are not UTF-8 survive a round trip. [`entry_path`] turns a name back
//! into a path under the extraction destination and refuses anything that
//! would land outside it.

use std::ffi::OsStr;
use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use ferry_core::SymlinkPolicy;

use crate::error::{io_err, ArchiveError};

/// What an archive entry is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    RegularFile,
    /// Link target as stored in the archive, `/`-separated.
    Symlink(Vec<u8>),
    /// FIFOs, sockets, devices and anything else.
    Unsupported,
}

impl EntryKind {
    pub fn describe(&self) -> &'static str {
        match self {
            EntryKind::Directory => "directory",
            EntryKind::RegularFile => "regular file",
            EntryKind::Symlink(_) => "symbolic link",
            EntryKind::Unsupported => "special file",
        }
    }
}

/// A relative, `/`-separated archive name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryName(Vec<u8>);

impl EntryName {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parent directory name, `None` at top level.
    pub fn parent(&self) -> Option<EntryName> {
        let trimmed = trim_trailing_slashes(&self.0);
        let split = trimmed.iter().rposition(|b| *b == b'/')?;
        Some(EntryName(trimmed[..split].to_vec()))
    }

    /// The name as a relative host path, for writing tar headers.
    pub(crate) fn to_host_path(&self) -> Result<PathBuf, ArchiveError> {
        let mut path = PathBuf::new();
        for segment in self.0.split(|b| *b == b'/').filter(|s| !s.is_empty()) {
            path.push(host_segment(segment).ok_or_else(|| self.unsafe_name())?);
        }
        Ok(path)
    }

    fn unsafe_name(&self) -> ArchiveError {
        ArchiveError::UnsafeEntryName {
            name: self.to_string(),
        }
    }
}

impl From<&[u8]> for EntryName {
    fn from(bytes: &[u8]) -> Self {
        EntryName(bytes.to_vec())
    }
}

impl From<&str> for EntryName {
    fn from(name: &str) -> Self {
        EntryName(name.as_bytes().to_vec())
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

fn trim_trailing_slashes(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| *b != b'/').map_or(0, |i| i + 1);
    &bytes[..end]
}

// ---------------------------------------------------------------------------
// Host encoding
// ---------------------------------------------------------------------------

#[cfg(unix)]
pub(crate) fn host_segment(bytes: &[u8]) -> Option<&OsStr> {
    use std::os::unix::ffi::OsStrExt;
    Some(OsStr::from_bytes(bytes))
}
#[cfg(not(unix))]
pub(crate) fn host_segment(bytes: &[u8]) -> Option<&OsStr> {
    std::str::from_utf8(bytes).ok().map(OsStr::new)
}

#[cfg(unix)]
fn segment_bytes(segment: &OsStr) -> Option<Vec<u8>> {
    use std::os::unix::ffi::OsStrExt;
    Some(segment.as_bytes().to_vec())
}
#[cfg(not(unix))]
fn segment_bytes(segment: &OsStr) -> Option<Vec<u8>> {
    segment.to_str().map(|s| s.replace('\\', "/").into_bytes())
}

// ---------------------------------------------------------------------------
// Name encoding
// ---------------------------------------------------------------------------

/// Relative path of `path` under `root`, re-encoded with `/`.
pub fn entry_name(root: &Path, path: &Path) -> Result<EntryName, ArchiveError> {
    let rel = path.strip_prefix(root).map_err(|_| ArchiveError::UnsafeEntryName {
        name: path.display().to_string(),
    })?;
    let unsafe_name = || ArchiveError::UnsafeEntryName {
        name: rel.display().to_string(),
    };
    let mut name = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                let bytes = segment_bytes(part).ok_or_else(unsafe_name)?;
                if !name.is_empty() {
                    name.push(b'/');
                }
                name.extend_from_slice(&bytes);
            }
            Component::CurDir => {}
            _ => return Err(unsafe_name()),
        }
    }
    Ok(EntryName(name))
}

/// Host path of entry `name` under `destination`.
///
/// Rejects absolute names, `..` segments, and segments the host would read as
/// a drive prefix or root.
pub fn entry_path(destination: &Path, name: &[u8]) -> Result<PathBuf, ArchiveError> {
    let unsafe_name = || ArchiveError::UnsafeEntryName {
        name: String::from_utf8_lossy(name).into_owned(),
    };
    if name.first() == Some(&b'/') {
        return Err(unsafe_name());
    }
    let mut path = destination.to_path_buf();
    let mut pushed = false;
    for segment in name.split(|b| *b == b'/') {
        match segment {
            b"" | b"." => continue,
            b".." => return Err(unsafe_name()),
            _ => {}
        }
        let segment = host_segment(segment).ok_or_else(unsafe_name)?;
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => path.push(segment),
            _ => return Err(unsafe_name()),
        }
        pushed = true;
    }
    if !pushed {
        return Err(unsafe_name());
    }
    Ok(path)
}

/// Whether a symlink stored at entry `name` pointing at `target` resolves to
/// somewhere inside the extraction root.
///
/// Targets must climb first and then descend: `..` after a named segment is
/// refused, since that segment may itself be a link once extracted.
pub(crate) fn symlink_stays_inside(name: &EntryName, target: &[u8]) -> bool {
    if target.is_empty() || target[0] == b'/' || target.contains(&b'\\') {
        return false;
    }
    let mut depth = match name.parent() {
        Some(parent) => parent
            .as_bytes()
            .split(|b| *b == b'/')
            .filter(|s| !s.is_empty())
            .count(),
        None => 0,
    };
    let mut descending = false;
    for segment in target.split(|b| *b == b'/') {
        match segment {
            b"" | b"." => {}
            b".." => {
                if descending || depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            other => {
                if other.contains(&b':') {
                    return false;
                }
                descending = true;
            }
        }
    }
    true
}

/// Fails when `path`, or any directory between `destination` and it, is
/// already a symbolic link. Extraction never writes through a link.
pub(crate) fn ensure_no_links(
    destination: &Path,
    path: &Path,
    name: &EntryName,
) -> Result<(), ArchiveError> {
    let rel = path.strip_prefix(destination).map_err(|_| name.unsafe_name())?;
    let mut current = destination.to_path_buf();
    for component in rel.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(ArchiveError::UnsafeEntryName {
                    name: name.to_string(),
                })
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(io_err(&current, e)),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Source walk
// ---------------------------------------------------------------------------

/// One entry of the source tree, ready to become a tar header.
#[derive(Debug)]
pub(crate) struct SourceEntry {
    pub name: EntryName,
    pub path: PathBuf,
    pub meta: Metadata,
    pub kind: EntryKind,
}

/// Walk `source` in file-name order, calling `visit` for every entry the
/// symlink policy lets through.
pub(crate) fn walk_source(
    source: &Path,
    policy: SymlinkPolicy,
    mut visit: impl FnMut(SourceEntry) -> Result<(), ArchiveError>,
) -> Result<(), ArchiveError> {
    let meta = std::fs::metadata(source).map_err(|e| io_err(source, e))?;
    if !meta.is_dir() {
        return Err(ArchiveError::NotADirectory {
            path: source.to_path_buf(),
        });
    }

    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry?;
        let path = entry.path().to_path_buf();
        let meta = entry.metadata()?;
        let name = entry_name(source, &path)?;
        let file_type = meta.file_type();

        let kind = if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::RegularFile
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(&path).map_err(|e| io_err(&path, e))?;
            let bytes = segment_bytes(target.as_os_str()).ok_or_else(|| {
                ArchiveError::UnsafeSymlink {
                    name: name.to_string(),
                    target: target.display().to_string(),
                }
            })?;
            EntryKind::Symlink(bytes)
        } else {
            EntryKind::Unsupported
        };

        let admitted = match (&kind, policy) {
            (EntryKind::Directory | EntryKind::RegularFile, _) => true,
            (EntryKind::Symlink(_), SymlinkPolicy::Preserve) => true,
            (EntryKind::Symlink(_) | EntryKind::Unsupported, SymlinkPolicy::Reject) => {
                return Err(ArchiveError::UnsupportedEntry {
                    path,
                    kind: kind.describe(),
                })
            }
            (EntryKind::Symlink(_) | EntryKind::Unsupported, _) => {
                warn!(path = %path.display(), kind = kind.describe(), "skipping entry");
                false
            }
        };
        if admitted {
            visit(SourceEntry {
                name,
                path,
                meta,
                kind,
            })?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn entry_name_uses_forward_slashes() {
        let root = Path::new("/data");
        let path = root.join("a").join("b").join("c.txt");
        assert_eq!(entry_name(root, &path).unwrap(), EntryName::from("a/b/c.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn entry_name_keeps_raw_bytes() {
        use std::os::unix::ffi::OsStrExt;
        let root = Path::new("/data");
        let path = root.join(OsStr::from_bytes(b"caf\xe9.txt"));
        let name = entry_name(root, &path).unwrap();
        assert_eq!(name.as_bytes(), b"caf\xe9.txt");
        assert_eq!(
            entry_path(Path::new("/out"), name.as_bytes()).unwrap(),
            Path::new("/out").join(OsStr::from_bytes(b"caf\xe9.txt"))
        );
    }

    #[test]
    fn entry_path_joins_under_destination() {
        let dest = Path::new("/out");
        assert_eq!(
            entry_path(dest, b"a/b/c.txt").unwrap(),
            dest.join("a").join("b").join("c.txt")
        );
        assert_eq!(entry_path(dest, b"dir/").unwrap(), dest.join("dir"));
    }

    #[rstest]
    #[case::absolute("/etc/passwd")]
    #[case::parent("../escape")]
    #[case::nested_parent("a/../../escape")]
    #[case::empty("")]
    #[case::only_dots("./")]
    fn unsafe_names_are_rejected(#[case] name: &str) {
        let err = entry_path(Path::new("/out"), name.as_bytes()).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafeEntryName { .. }), "{name}: {err}");
    }

    #[rstest]
    #[case::sibling("a/link", "b", true)]
    #[case::up_and_over("a/b/link", "../c", true)]
    #[case::to_root_level("a/link", "../top", true)]
    #[case::escapes("link", "../outside", false)]
    #[case::escapes_deep("a/link", "../../outside", false)]
    #[case::absolute("a/link", "/etc/passwd", false)]
    #[case::empty("a/link", "", false)]
    #[case::climb_after_descent("a/link", "b/../c", false)]
    #[case::climb_through_sibling("link", "a/../../x", false)]
    fn symlink_containment(#[case] name: &str, #[case] target: &str, #[case] inside: bool) {
        assert_eq!(
            symlink_stays_inside(&EntryName::from(name), target.as_bytes()),
            inside
        );
    }

    #[test]
    fn parent_of_nested_entries() {
        assert_eq!(EntryName::from("a/b/c").parent(), Some(EntryName::from("a/b")));
        assert_eq!(EntryName::from("a/").parent(), None);
        assert_eq!(EntryName::from("top").parent(), None);
    }

    #[cfg(unix)]
    #[test]
    fn paths_below_a_link_are_refused() {
        let dest = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dest.path().join("real")).unwrap();
        std::os::unix::fs::symlink(".", dest.path().join("a")).unwrap();

        let inside = dest.path().join("real").join("file");
        assert!(ensure_no_links(dest.path(), &inside, &EntryName::from("real/file")).is_ok());

        let through = dest.path().join("a").join("b");
        let err = ensure_no_links(dest.path(), &through, &EntryName::from("a/b")).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafeEntryName { .. }), "{err}");

        let onto = dest.path().join("a");
        assert!(ensure_no_links(dest.path(), &onto, &EntryName::from("a")).is_err());
    }
}

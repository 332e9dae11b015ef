//! Archive → store → unarchive round trips for both layouts, plus the
//! extraction safety rules.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use ferry_archive::{
    from_config, prepare_destination, ArchiveError, Archiver, ShardedTarArchiver, SymlinkPolicy,
    TarArchiver,
};
use ferry_core::{ArchiverConfig, ArchiverKind, ObjectKey};
use rstest::rstest;
use tempfile::TempDir;
use walkdir::WalkDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Node {
    Dir,
    File { content: Vec<u8>, mode: u32 },
    Link(String),
}

/// Every entry under `root`, keyed by `/`-separated relative name.
fn snapshot(root: &Path) -> BTreeMap<String, Node> {
    let mut out = BTreeMap::new();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry.expect("walk");
        let name = entry
            .path()
            .strip_prefix(root)
            .unwrap()
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let ft = entry.file_type();
        let node = if ft.is_dir() {
            Node::Dir
        } else if ft.is_symlink() {
            let target = std::fs::read_link(entry.path()).unwrap();
            Node::Link(target.to_string_lossy().into_owned())
        } else {
            Node::File {
                content: std::fs::read(entry.path()).unwrap(),
                mode: mode_of(entry.path()),
            }
        };
        out.insert(name, node);
    }
    out
}

#[cfg(unix)]
fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
}
#[cfg(not(unix))]
fn mode_of(_path: &Path) -> u32 {
    0
}

#[cfg(unix)]
fn chmod(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
}
#[cfg(not(unix))]
fn chmod(_path: &Path, _mode: u32) {}

fn write(root: &Path, name: &str, content: &[u8], mode: u32) {
    let path = root.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    chmod(&path, mode);
}

/// A tree with nested dirs, an empty dir, odd permissions, a unicode name
/// and a name longer than a classic tar header allows.
fn sample_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "README.md", b"# dataset\n", 0o644);
    write(root, "bin/run.sh", b"#!/bin/sh\necho hi\n", 0o755);
    write(root, "data/train/part-0001.csv", b"a,b\n1,2\n", 0o600);
    write(root, "data/train/part-0002.csv", &vec![7u8; 70_000], 0o640);
    write(root, "data/ünïcödé.txt", "grüße".as_bytes(), 0o644);
    let long = format!("deep/{}/file.txt", "x".repeat(120));
    write(root, &long, b"long name", 0o644);
    std::fs::create_dir_all(root.join("empty/inner")).unwrap();
    dir
}

/// Archive `source` into an in-memory object map.
fn archive_to_map(archiver: &dyn Archiver, source: &Path) -> HashMap<ObjectKey, Vec<u8>> {
    let mut objects = HashMap::new();
    archiver
        .archive(source, &mut |key, file| {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).expect("read object");
            objects.insert(key.clone(), buf);
            Ok(())
        })
        .expect("archive");
    objects
}

fn unarchive_from_map(
    archiver: &dyn Archiver,
    objects: &HashMap<ObjectKey, Vec<u8>>,
    dest: &Path,
) -> Result<(), ArchiveError> {
    archiver.unarchive(dest, &mut |key, file| {
        file.write_all(&objects[key]).expect("fill object");
        Ok(())
    })
}

fn object_from_bytes(bytes: &[u8]) -> File {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file
}

// ---------------------------------------------------------------------------
// 1. Round trips
// ---------------------------------------------------------------------------

#[test]
fn tar_round_trip_preserves_tree() {
    let source = sample_tree();
    let archiver = TarArchiver::new("d-1/", SymlinkPolicy::Preserve).unwrap();
    let objects = archive_to_map(&archiver, source.path());
    assert_eq!(objects.len(), 1);
    assert!(objects.contains_key(&ObjectKey::from("d-1/archive.tar")));

    let dest = TempDir::new().unwrap();
    unarchive_from_map(&archiver, &objects, dest.path()).expect("unarchive");
    assert_eq!(snapshot(source.path()), snapshot(dest.path()));
}

#[rstest]
#[case::one_shard(1)]
#[case::few_shards(3)]
#[case::more_shards_than_entries(64)]
fn sharded_round_trip_preserves_tree(#[case] shards: usize) {
    let source = sample_tree();
    let archiver = ShardedTarArchiver::new("", shards, SymlinkPolicy::Preserve).unwrap();
    let objects = archive_to_map(&archiver, source.path());
    assert_eq!(objects.len(), shards);

    let dest = TempDir::new().unwrap();
    unarchive_from_map(&archiver, &objects, dest.path()).expect("unarchive");
    assert_eq!(snapshot(source.path()), snapshot(dest.path()));
}

#[test]
fn shards_extract_in_any_order() {
    let source = sample_tree();
    let archiver = ShardedTarArchiver::new("", 5, SymlinkPolicy::Preserve).unwrap();
    let objects = archive_to_map(&archiver, source.path());

    let dest = TempDir::new().unwrap();
    prepare_destination(dest.path()).unwrap();
    for key in archiver.keys().unwrap().iter().rev() {
        let mut object = object_from_bytes(&objects[key]);
        archiver.extract(dest.path(), key, &mut object).expect("extract");
    }
    assert_eq!(snapshot(source.path()), snapshot(dest.path()));
}

#[test]
fn archive_produces_exactly_the_indexed_keys() {
    let source = sample_tree();
    for config in [
        ArchiverConfig::default(),
        ArchiverConfig {
            kind: ArchiverKind::Sharded,
            shards: 6,
            key_prefix: "p/".to_string(),
            ..ArchiverConfig::default()
        },
    ] {
        let archiver = from_config(&config).unwrap();
        let objects = archive_to_map(archiver.as_ref(), source.path());
        let mut produced: Vec<_> = objects.keys().cloned().collect();
        produced.sort();
        let mut indexed = archiver.keys().unwrap();
        indexed.sort();
        assert_eq!(produced, indexed);
    }
}

#[test]
fn archiving_is_deterministic() {
    let source = sample_tree();
    let archiver = ShardedTarArchiver::new("", 4, SymlinkPolicy::Preserve).unwrap();
    let first = archive_to_map(&archiver, source.path());
    let second = archive_to_map(&archiver, source.path());
    assert_eq!(first, second);
}

#[test]
fn empty_tree_round_trips() {
    let source = TempDir::new().unwrap();
    let archiver = ShardedTarArchiver::new("", 2, SymlinkPolicy::Preserve).unwrap();
    let objects = archive_to_map(&archiver, source.path());
    let dest = TempDir::new().unwrap();
    unarchive_from_map(&archiver, &objects, dest.path()).expect("unarchive");
    assert!(snapshot(dest.path()).is_empty());
}

// ---------------------------------------------------------------------------
// 2. Preconditions and failure semantics
// ---------------------------------------------------------------------------

#[test]
fn non_empty_destination_is_rejected_before_any_fetch() {
    let archiver = TarArchiver::new("", SymlinkPolicy::Preserve).unwrap();
    let dest = TempDir::new().unwrap();
    std::fs::write(dest.path().join("existing.txt"), b"keep").unwrap();

    let mut fetches = 0;
    let err = archiver
        .unarchive(dest.path(), &mut |_, _| {
            fetches += 1;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, ArchiveError::DestinationNotEmpty { .. }), "{err}");
    assert_eq!(fetches, 0);
    assert_eq!(snapshot(dest.path()).len(), 1);
}

#[test]
fn source_must_be_a_directory() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("plain.txt");
    std::fs::write(&file, b"x").unwrap();
    let archiver = TarArchiver::new("", SymlinkPolicy::Preserve).unwrap();
    let err = archiver.archive(&file, &mut |_, _| Ok(())).unwrap_err();
    assert!(matches!(err, ArchiveError::NotADirectory { .. }), "{err}");
}

#[test]
fn visitor_error_is_returned_unchanged() {
    let source = sample_tree();
    let archiver = ShardedTarArchiver::new("", 3, SymlinkPolicy::Preserve).unwrap();
    let mut seen = 0;
    let err = archiver
        .archive(source.path(), &mut |key, _| {
            seen += 1;
            Err(ArchiveError::Interrupted { key: key.clone() })
        })
        .unwrap_err();
    assert!(matches!(err, ArchiveError::Interrupted { ref key } if key.0 == "shard-0000.tar"));
    assert_eq!(seen, 1);
}

#[test]
fn duplicate_file_entry_fails_on_second_write() {
    let mut builder = tar::Builder::new(Vec::new());
    for content in [&b"first"[..], &b"second"[..]] {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, "dup.txt", content).unwrap();
    }
    let bytes = builder.into_inner().unwrap();

    let archiver = TarArchiver::new("", SymlinkPolicy::Preserve).unwrap();
    let dest = TempDir::new().unwrap();
    let mut object = object_from_bytes(&bytes);
    let err = archiver
        .extract(dest.path(), &ObjectKey::from("archive.tar"), &mut object)
        .unwrap_err();
    assert!(matches!(err, ArchiveError::EntryExists { .. }), "{err}");
    assert_eq!(std::fs::read(dest.path().join("dup.txt")).unwrap(), b"first");
}

#[test]
fn parent_dir_entry_name_is_rejected() {
    let mut header = tar::Header::new_gnu();
    let name = b"../evil.txt";
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_size(4);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&header, &b"evil"[..]).unwrap();
    let bytes = builder.into_inner().unwrap();

    let parent = TempDir::new().unwrap();
    let dest = parent.path().join("dest");
    prepare_destination(&dest).unwrap();
    let archiver = TarArchiver::new("", SymlinkPolicy::Preserve).unwrap();
    let err = archiver
        .extract(&dest, &ObjectKey::from("archive.tar"), &mut object_from_bytes(&bytes))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::UnsafeEntryName { .. }), "{err}");
    assert!(!parent.path().join("evil.txt").exists());
}

#[test]
fn wrong_key_is_rejected() {
    let archiver = TarArchiver::new("a/", SymlinkPolicy::Preserve).unwrap();
    let dest = TempDir::new().unwrap();
    let err = archiver
        .extract(dest.path(), &ObjectKey::from("archive.tar"), &mut object_from_bytes(&[]))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::UnknownKey { .. }));
}

#[test]
fn invalid_key_prefix_fails_construction() {
    let err = TarArchiver::new("no-slash", SymlinkPolicy::Preserve).unwrap_err();
    assert!(matches!(err, ArchiveError::InvalidKeyPrefix { .. }));
    assert!(ShardedTarArchiver::new("no-slash", 2, SymlinkPolicy::Preserve).is_err());
}

// ---------------------------------------------------------------------------
// 3. Symlink policy
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod symlinks {
    use super::*;
    use std::os::unix::fs::symlink;

    fn tree_with_link() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "data/real.txt", b"real", 0o644);
        symlink("real.txt", dir.path().join("data/alias.txt")).unwrap();
        dir
    }

    #[test]
    fn preserve_keeps_the_link_itself() {
        let source = tree_with_link();
        let archiver = TarArchiver::new("", SymlinkPolicy::Preserve).unwrap();
        let objects = archive_to_map(&archiver, source.path());
        let dest = TempDir::new().unwrap();
        unarchive_from_map(&archiver, &objects, dest.path()).expect("unarchive");

        let snap = snapshot(dest.path());
        assert_eq!(snap["data/alias.txt"], Node::Link("real.txt".to_string()));
        assert_eq!(snapshot(source.path()), snap);
    }

    #[test]
    fn skip_leaves_links_out() {
        let source = tree_with_link();
        let archiver = TarArchiver::new("", SymlinkPolicy::Skip).unwrap();
        let objects = archive_to_map(&archiver, source.path());
        let dest = TempDir::new().unwrap();
        unarchive_from_map(&archiver, &objects, dest.path()).expect("unarchive");

        let snap = snapshot(dest.path());
        assert!(!snap.contains_key("data/alias.txt"));
        assert!(snap.contains_key("data/real.txt"));
    }

    #[test]
    fn reject_fails_the_archive() {
        let source = tree_with_link();
        let archiver = TarArchiver::new("", SymlinkPolicy::Reject).unwrap();
        let err = archiver.archive(source.path(), &mut |_, _| Ok(())).unwrap_err();
        assert!(
            matches!(err, ArchiveError::UnsupportedEntry { kind: "symbolic link", .. }),
            "{err}"
        );
    }

    fn link_header() -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        header
    }

    #[test]
    fn chained_links_cannot_reach_outside() {
        let mut builder = tar::Builder::new(Vec::new());
        builder.append_link(&mut link_header(), "a", ".").unwrap();
        builder.append_link(&mut link_header(), "a/b", "..").unwrap();
        let mut header = tar::Header::new_gnu();
        header.set_size(4);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, "a/b/evil", &b"evil"[..]).unwrap();
        let bytes = builder.into_inner().unwrap();

        let parent = TempDir::new().unwrap();
        let dest = parent.path().join("dest");
        let archiver = TarArchiver::new("", SymlinkPolicy::Preserve).unwrap();
        let err = archiver
            .unarchive(&dest, &mut |_, file| {
                file.write_all(&bytes).unwrap();
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafeEntryName { .. }), "{err}");
        assert!(!parent.path().join("evil").exists());
        assert!(std::fs::symlink_metadata(parent.path().join("b")).is_err());
        assert!(std::fs::symlink_metadata(dest.join("b")).is_err());
    }

    #[test]
    fn directory_entry_over_a_link_is_refused() {
        let mut builder = tar::Builder::new(Vec::new());
        builder.append_link(&mut link_header(), "data", ".").unwrap();
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Directory);
        builder.append_data(&mut header, "data/", std::io::empty()).unwrap();
        let bytes = builder.into_inner().unwrap();

        let dest = TempDir::new().unwrap();
        let archiver = TarArchiver::new("", SymlinkPolicy::Preserve).unwrap();
        let err = archiver
            .extract(dest.path(), &ObjectKey::from("archive.tar"), &mut object_from_bytes(&bytes))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafeEntryName { .. }), "{err}");
    }

    #[test]
    fn escaping_link_is_refused_on_extract() {
        let source = TempDir::new().unwrap();
        symlink("../../etc/passwd", source.path().join("escape")).unwrap();
        let archiver = TarArchiver::new("", SymlinkPolicy::Preserve).unwrap();
        let objects = archive_to_map(&archiver, source.path());

        let dest = TempDir::new().unwrap();
        let err = unarchive_from_map(&archiver, &objects, dest.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafeSymlink { .. }), "{err}");
        assert!(std::fs::symlink_metadata(dest.path().join("escape")).is_err());
    }
}

// ---------------------------------------------------------------------------
// 4. Raw file names
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
mod raw_names {
    use super::*;
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    fn tree_with_latin1_names() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(OsStr::from_bytes(b"caf\xe9.txt")), b"latin-1").unwrap();
        let nested = dir.path().join(OsStr::from_bytes(b"d\xff"));
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("inner.txt"), b"inner").unwrap();
        dir
    }

    #[rstest]
    #[case::tar(ArchiverConfig::default())]
    #[case::sharded(ArchiverConfig { kind: ArchiverKind::Sharded, shards: 3, ..ArchiverConfig::default() })]
    fn non_utf8_names_round_trip(#[case] config: ArchiverConfig) {
        let source = tree_with_latin1_names();
        let archiver = from_config(&config).unwrap();
        let objects = archive_to_map(archiver.as_ref(), source.path());

        let dest = TempDir::new().unwrap();
        unarchive_from_map(archiver.as_ref(), &objects, dest.path()).expect("unarchive");
        assert_eq!(
            std::fs::read(dest.path().join(OsStr::from_bytes(b"caf\xe9.txt"))).unwrap(),
            b"latin-1"
        );
        assert_eq!(
            std::fs::read(dest.path().join(OsStr::from_bytes(b"d\xff")).join("inner.txt")).unwrap(),
            b"inner"
        );
        assert_eq!(snapshot(source.path()), snapshot(dest.path()));
    }
}

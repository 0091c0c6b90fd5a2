// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A mutable, lazily-materialized handle onto a subtree rooted in a `cas`
//! store. A `VDirHandle` is cheap to clone (it shares the backing store and
//! a reference-counted node) but each node has exactly one owning handle
//! lineage: mutating a child rewrites that child's manifest, then cascades
//! the new digest up through every ancestor so that a handle held at the
//! root always observes its descendants' latest state without needing to
//! be told about the mutation directly.

mod error;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cas::{LocalStore, ManifestEntry};
use hashing::Digest;
use parking_lot::Mutex;

pub use error::Error;

struct Node {
    digest: Digest,
    parent: Option<(Arc<Mutex<Node>>, String)>,
}

/// A handle onto one directory within a CAS-backed tree. Cloning shares the
/// same node: two clones observe each other's mutations immediately.
#[derive(Clone)]
pub struct VDirHandle {
    store: LocalStore,
    node: Arc<Mutex<Node>>,
}

/// Where `import_files` should read its source tree from.
pub enum ImportSource<'a> {
    /// A real filesystem directory, walked and hashed in.
    Fs(&'a Path),
    /// Another handle backed by the same store: merging this requires no
    /// byte copying, since both sides already address content by digest.
    VDir(&'a VDirHandle),
}

impl VDirHandle {
    /// A fresh, empty, unparented directory.
    pub fn empty(store: LocalStore) -> Result<VDirHandle, Error> {
        let digest = store.put_manifest(Vec::new())?;
        Ok(VDirHandle {
            store,
            node: Arc::new(Mutex::new(Node {
                digest,
                parent: None,
            })),
        })
    }

    /// A handle rooted at an already-existing manifest digest (for example,
    /// one recovered from an artifact's recorded root).
    pub fn at_digest(store: LocalStore, digest: Digest) -> VDirHandle {
        VDirHandle {
            store,
            node: Arc::new(Mutex::new(Node {
                digest,
                parent: None,
            })),
        }
    }

    pub fn digest(&self) -> Digest {
        self.node.lock().digest
    }

    fn manifest(&self) -> Result<cas::Manifest, Error> {
        Ok(self.store.get_manifest(&self.digest())?)
    }

    /// Rewrites this node's manifest by applying `f` to the current one,
    /// stores the result, updates this node's digest, then propagates the
    /// new digest into the parent's entry for this node (recursively, all
    /// the way to the root).
    fn mutate_self_manifest(
        &self,
        f: impl FnOnce(cas::Manifest) -> Result<cas::Manifest, Error>,
    ) -> Result<(), Error> {
        let current = self.manifest()?;
        let updated = f(current)?;
        let new_digest = self.store.put_manifest(updated.entries().to_vec())?;

        let parent = {
            let mut node = self.node.lock();
            node.digest = new_digest;
            node.parent.clone()
        };

        if let Some((parent_node, name_in_parent)) = parent {
            Self::propagate(&self.store, &parent_node, &name_in_parent, new_digest)?;
        }
        Ok(())
    }

    /// Rewrites `parent_node`'s manifest so that its entry named
    /// `name_in_parent` points at `child_digest`, then cascades the same
    /// update into the parent's own parent, and so on to the root.
    fn propagate(
        store: &LocalStore,
        parent_node: &Arc<Mutex<Node>>,
        name_in_parent: &str,
        child_digest: Digest,
    ) -> Result<(), Error> {
        let (parent_digest, grandparent) = {
            let node = parent_node.lock();
            (node.digest, node.parent.clone())
        };
        let parent_manifest = store.get_manifest(&parent_digest)?;
        let updated = parent_manifest.with_entry(ManifestEntry::Directory {
            name: name_in_parent.to_string(),
            digest: child_digest,
        });
        let new_parent_digest = store.put_manifest(updated.entries().to_vec())?;
        parent_node.lock().digest = new_parent_digest;

        if let Some((grandparent_node, name_in_grandparent)) = grandparent {
            Self::propagate(store, &grandparent_node, &name_in_grandparent, new_parent_digest)?;
        }
        Ok(())
    }

    /// Looks up `name` as an immediate child directory, creating it (and
    /// rewriting this node's manifest) if absent and `create` is true.
    pub fn descend(&self, name: &str, create: bool) -> Result<VDirHandle, Error> {
        let manifest = self.manifest()?;
        match manifest.get(name) {
            Some(ManifestEntry::Directory { digest, .. }) => Ok(VDirHandle {
                store: self.store.clone(),
                node: Arc::new(Mutex::new(Node {
                    digest: *digest,
                    parent: Some((Arc::clone(&self.node), name.to_string())),
                })),
            }),
            Some(_) => Err(Error::NotADirectory(name.to_string())),
            None if create => {
                let empty_digest = self.store.put_manifest(Vec::new())?;
                self.mutate_self_manifest(|m| {
                    Ok(m.with_entry(ManifestEntry::Directory {
                        name: name.to_string(),
                        digest: empty_digest,
                    }))
                })?;
                Ok(VDirHandle {
                    store: self.store.clone(),
                    node: Arc::new(Mutex::new(Node {
                        digest: empty_digest,
                        parent: Some((Arc::clone(&self.node), name.to_string())),
                    })),
                })
            }
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    pub fn exists(&self, name: &str) -> Result<bool, Error> {
        Ok(self.manifest()?.get(name).is_some())
    }

    pub fn get_child_digest(&self, name: &str) -> Result<Option<Digest>, Error> {
        Ok(self.manifest()?.get(name).and_then(|e| e.digest()))
    }

    /// Total bytes reachable from this directory: every file's recorded
    /// size plus the serialized size of every manifest in the subtree.
    pub fn get_size(&self) -> Result<u64, Error> {
        let mut total = 0u64;
        let mut stack = vec![self.digest()];
        while let Some(digest) = stack.pop() {
            let manifest = self.store.get_manifest(&digest)?;
            total += manifest.to_bytes().len() as u64;
            for entry in manifest.entries() {
                match entry {
                    ManifestEntry::File { digest, .. } => total += digest.size_bytes as u64,
                    ManifestEntry::Directory { digest, .. } => stack.push(*digest),
                    ManifestEntry::Symlink { .. } => {}
                }
            }
        }
        Ok(total)
    }

    /// The real on-disk path of a file directly contained by this
    /// directory, for callers that need to hand a path to an external
    /// process rather than read bytes through the store.
    pub fn objpath(&self, name: &str) -> Result<PathBuf, Error> {
        match self.manifest()?.get(name) {
            Some(ManifestEntry::File { digest, .. }) => Ok(self.store.object_path(digest)),
            Some(_) => Err(Error::NotADirectory(name.to_string())),
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    /// Merges `source`'s top-level entries into this directory, overwriting
    /// any existing entries of the same name.
    pub fn import_files(&self, source: ImportSource) -> Result<(), Error> {
        match source {
            ImportSource::VDir(other) => {
                let incoming = other.manifest()?;
                self.mutate_self_manifest(|mut m| {
                    for entry in incoming.entries() {
                        m = m.with_entry(entry.clone());
                    }
                    Ok(m)
                })
            }
            ImportSource::Fs(path) => {
                let entries = import_fs_subtree(&self.store, path)?;
                self.mutate_self_manifest(|mut m| {
                    for entry in entries {
                        m = m.with_entry(entry);
                    }
                    Ok(m)
                })
            }
        }
    }
}

/// Recursively hashes the contents of a real filesystem directory into the
/// store and returns its entries in a form suitable for `with_entry`.
/// Children are visited in filename order so that the resulting manifest
/// (already canonicalized again by `Manifest::new`) is deterministic
/// regardless of the platform's raw directory-iteration order.
fn import_fs_subtree(store: &LocalStore, path: &Path) -> Result<Vec<ManifestEntry>, Error> {
    let mut children: Vec<_> = fs::read_dir(path)?.collect::<Result<_, _>>()?;
    children.sort_by_key(|e| e.file_name());

    let mut entries = Vec::with_capacity(children.len());
    for child in children {
        let name = child.file_name().to_string_lossy().into_owned();
        let child_path = child.path();
        let file_type = child.file_type()?;

        let entry = if file_type.is_symlink() {
            let target = fs::read_link(&child_path)?;
            ManifestEntry::Symlink {
                name,
                target: target.to_string_lossy().into_owned(),
            }
        } else if file_type.is_dir() {
            let sub_entries = import_fs_subtree(store, &child_path)?;
            let digest = store.put_manifest(sub_entries)?;
            ManifestEntry::Directory { name, digest }
        } else {
            let bytes = fs::read(&child_path)?;
            let digest = store.put_blob(&bytes)?;
            ManifestEntry::File {
                name,
                digest,
                is_executable: is_executable(&child_path)?,
            }
        };
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> Result<bool, Error> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::metadata(path)?.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> Result<bool, Error> {
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalStore) {
        cache_testutil::tempdir_store()
    }

    #[test]
    fn descend_without_create_on_missing_is_not_found() {
        let (_dir, store) = store();
        let root = VDirHandle::empty(store).unwrap();
        assert!(matches!(root.descend("nope", false), Err(Error::NotFound(_))));
    }

    #[test]
    fn descend_with_create_makes_an_empty_child() {
        let (_dir, store) = store();
        let root = VDirHandle::empty(store).unwrap();
        let child = root.descend("sub", true).unwrap();
        assert!(root.exists("sub").unwrap());
        assert_eq!(child.get_size().unwrap(), 0);
    }

    #[test]
    fn descend_onto_a_file_is_not_a_directory() {
        let (_dir, store) = store();
        let fixture = cache_testutil::TestTree::new().file("a.txt", b"hi");
        let root = VDirHandle::empty(store).unwrap();
        root.import_files(ImportSource::Fs(fixture.path())).unwrap();
        assert!(matches!(root.descend("a.txt", false), Err(Error::NotADirectory(_))));
    }

    #[test]
    fn child_mutation_propagates_to_root() {
        let (_dir, store) = store();
        let root = VDirHandle::empty(store).unwrap();
        let before = root.digest();

        let child = root.descend("sub", true).unwrap();
        let grandchild = child.descend("leaf", true).unwrap();
        let _ = grandchild;

        assert_ne!(root.digest(), before);
        assert!(root.descend("sub", false).unwrap().exists("leaf").unwrap());
    }

    #[test]
    fn import_files_from_fs_walks_nested_directories() {
        let (_dir, store) = store();
        let fixture = cache_testutil::TestTree::new()
            .file("top.txt", b"top")
            .file("nested/deep.txt", b"deep");

        let root = VDirHandle::empty(store).unwrap();
        root.import_files(ImportSource::Fs(fixture.path())).unwrap();

        assert!(root.exists("top.txt").unwrap());
        let nested = root.descend("nested", false).unwrap();
        assert!(nested.exists("deep.txt").unwrap());
        assert_eq!(root.get_size().unwrap(), nested.get_size().unwrap() + "top".len() as u64);
    }

    #[test]
    fn import_files_from_vdir_shares_digests_without_copying_bytes() {
        let (_dir, store) = store();
        let fixture = cache_testutil::TestTree::new().file("a.txt", b"shared");

        let source = VDirHandle::empty(store.clone()).unwrap();
        source.import_files(ImportSource::Fs(fixture.path())).unwrap();

        let dest = VDirHandle::empty(store).unwrap();
        dest.import_files(ImportSource::VDir(&source)).unwrap();

        assert_eq!(
            dest.get_child_digest("a.txt").unwrap(),
            source.get_child_digest("a.txt").unwrap()
        );
    }

    #[test]
    fn objpath_points_at_the_stores_real_file() {
        let (_dir, store) = store();
        let fixture = cache_testutil::TestTree::new().file("a.txt", b"hi");
        let root = VDirHandle::empty(store).unwrap();
        root.import_files(ImportSource::Fs(fixture.path())).unwrap();

        let path = root.objpath("a.txt").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"hi");
    }
}

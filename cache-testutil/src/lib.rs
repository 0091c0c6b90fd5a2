// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Shared fixtures for the artifact cache crates' test suites. Never a
//! runtime dependency of anything in this workspace; only `[dev-dependencies]`.

use std::fs;
use std::path::Path;

use cas::LocalStore;
use hashing::HashAlgorithm;

pub fn owned_string_vec(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

pub fn as_bytes(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

/// A fresh `LocalStore` rooted in a tempdir that is deleted when the
/// returned guard is dropped.
pub fn tempdir_store() -> (tempfile::TempDir, LocalStore) {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let store =
        LocalStore::new(dir.path(), HashAlgorithm::Sha256).expect("failed to create store");
    (dir, store)
}

/// Builds a small directory fixture on disk, suitable for feeding into
/// `vfs::VDirHandle::import_files(ImportSource::Fs(..))`.
pub struct TestTree {
    root: tempfile::TempDir,
}

impl TestTree {
    pub fn new() -> TestTree {
        TestTree {
            root: tempfile::tempdir().expect("failed to create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Writes `contents` at `relative_path` (e.g. `"nested/a.txt"`),
    /// creating parent directories as needed.
    pub fn file(self, relative_path: &str, contents: &[u8]) -> TestTree {
        let target = self.root.path().join(relative_path);
        fs::create_dir_all(target.parent().expect("file path has a parent")).unwrap();
        fs::write(&target, contents).unwrap();
        self
    }

    #[cfg(unix)]
    pub fn executable_file(self, relative_path: &str, contents: &[u8]) -> TestTree {
        use std::os::unix::fs::PermissionsExt;
        let tree = self.file(relative_path, contents);
        let target = tree.root.path().join(relative_path);
        let mut permissions = fs::metadata(&target).unwrap().permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&target, permissions).unwrap();
        tree
    }

    pub fn symlink(self, relative_path: &str, target: &str) -> TestTree {
        let link = self.root.path().join(relative_path);
        fs::create_dir_all(link.parent().expect("link path has a parent")).unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(target, &link).unwrap();
        self
    }
}

impl Default for TestTree {
    fn default() -> TestTree {
        TestTree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_nested_fixture() {
        let tree = TestTree::new().file("a.txt", b"hi").file("nested/b.txt", b"bye");
        assert_eq!(fs::read(tree.path().join("a.txt")).unwrap(), b"hi");
        assert_eq!(fs::read(tree.path().join("nested/b.txt")).unwrap(), b"bye");
    }
}

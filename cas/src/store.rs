// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use hashing::{Digest, Fingerprint, HashAlgorithm};
use log::{debug, trace};

use crate::manifest::{Manifest, ManifestEntry};
use crate::Error;

/// A durable, local, content-addressable store of blobs and directory
/// manifests, rooted at a filesystem directory it owns exclusively.
///
/// Blobs live at `objects/<alg>/<first-two-hex>/<rest-hex>`, sharded by the
/// first byte of the fingerprint so that no single directory accumulates an
/// unreasonable number of entries. Manifests are ordinary blobs: a
/// `put_manifest` call just canonicalizes its entries and delegates to
/// `put_blob`.
#[derive(Clone)]
pub struct LocalStore {
    root: PathBuf,
    algorithm: HashAlgorithm,
}

impl LocalStore {
    /// Opens (creating if necessary) a store rooted at `root` using
    /// `algorithm`. The root is expected to be owned exclusively by this
    /// store instance; nothing else should write into it.
    pub fn new(root: impl AsRef<Path>, algorithm: HashAlgorithm) -> Result<LocalStore, Error> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let store = LocalStore { root, algorithm };
        std::fs::create_dir_all(store.objects_dir())?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join("objects").join(self.algorithm.as_str())
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.fingerprint.to_hex();
        self.objects_dir().join(&hex[..2]).join(&hex[2..])
    }

    /// The real filesystem path a blob is (or would be) stored at, so that
    /// external consumers can read a materialized file through the normal
    /// filesystem API rather than allocating through the store.
    pub fn object_path(&self, digest: &Digest) -> PathBuf {
        self.blob_path(digest)
    }

    /// Writes `bytes` under their computed digest. Idempotent: if the digest
    /// is already present, this is a no-op beyond the hash computation.
    /// Concurrent callers writing the same digest race harmlessly, since
    /// they write byte-identical content to a temp path and only the
    /// winning rename survives; the loser's temp file is discarded.
    pub fn put_blob(&self, bytes: &[u8]) -> Result<Digest, Error> {
        let digest = Digest::of_bytes(self.algorithm, bytes);
        let path = self.blob_path(&digest);
        if path.exists() {
            trace!("blob {digest} already present, skipping write");
            return Ok(digest);
        }

        let parent = path.parent().expect("blob path always has a parent");
        std::fs::create_dir_all(parent)?;

        let mut tmp = tempfile::Builder::new().tempfile_in(parent)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        match tmp.persist(&path) {
            Ok(_) => {
                debug!("wrote blob {digest} ({} bytes)", bytes.len());
            }
            Err(e) if path.exists() => {
                // Another writer won the race with byte-identical content.
                trace!("lost race persisting blob {digest}: {e}");
            }
            Err(e) => return Err(e.error.into()),
        }
        Ok(digest)
    }

    pub fn put_manifest(&self, entries: Vec<ManifestEntry>) -> Result<Digest, Error> {
        let manifest = Manifest::new(entries).map_err(Error::Malformed)?;
        self.put_blob(&manifest.to_bytes())
    }

    /// Reads back the bytes stored under `digest`. Corruption (stored bytes
    /// that don't hash to the name they're stored under) is detected here,
    /// lazily, rather than by any background scan.
    pub fn get_blob(&self, digest: &Digest) -> Result<Vec<u8>, Error> {
        let path = self.blob_path(digest);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(*digest));
            }
            Err(e) => return Err(e.into()),
        };
        let actual = Digest::of_bytes(self.algorithm, &bytes);
        if actual != *digest {
            return Err(Error::Malformed(format!(
                "blob at {path:?} hashes to {actual} but is stored under {digest}"
            )));
        }
        Ok(bytes)
    }

    pub fn get_manifest(&self, digest: &Digest) -> Result<Manifest, Error> {
        let bytes = self.get_blob(digest)?;
        Manifest::from_bytes(&bytes)
    }

    /// True if every manifest transitively reachable from `root` is present
    /// locally (`with_files = false`), or if additionally every file blob
    /// they reference is present and uncorrupted (`with_files = true`).
    /// Symlink targets are never chased. Traversal is depth-first and
    /// returns as soon as any required blob is missing.
    pub fn contains_directory(&self, root: Digest, with_files: bool) -> Result<bool, Error> {
        let mut stack = vec![root];
        let mut visited = HashSet::new();

        while let Some(digest) = stack.pop() {
            if !visited.insert(digest) {
                continue;
            }
            let manifest = match self.get_manifest(&digest) {
                Ok(m) => m,
                Err(Error::NotFound(_)) => return Ok(false),
                Err(e) => return Err(e),
            };
            for entry in manifest.entries() {
                match entry {
                    ManifestEntry::Directory { digest, .. } => stack.push(*digest),
                    ManifestEntry::File { digest, .. } if with_files => {
                        match self.get_blob(digest) {
                            Ok(_) => {}
                            Err(Error::NotFound(_)) => return Ok(false),
                            Err(e) => return Err(e),
                        }
                    }
                    ManifestEntry::File { .. } | ManifestEntry::Symlink { .. } => {}
                }
            }
        }
        Ok(true)
    }

    /// Total on-disk size of every blob and manifest currently held. Walks
    /// only `objects/`, not the store root: a collaborator such as
    /// `refcache` may keep its own `refs/` subtree alongside this store, and
    /// those files point at blobs rather than being one.
    pub fn size(&self) -> Result<u64, Error> {
        let mut total = 0u64;
        for entry in walkdir::WalkDir::new(self.objects_dir()) {
            let entry = entry.map_err(|e| {
                Error::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walk failed")
                }))
            })?;
            if entry.file_type().is_file() {
                total += entry.metadata().map_err(|e| {
                    Error::Io(e.into_io_error().unwrap_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::Other, "stat failed")
                    }))
                })?.len();
            }
        }
        Ok(total)
    }

    /// Removes a single blob from disk, used by the quota manager when a
    /// reference becomes unreachable. Missing blobs are not an error: the
    /// caller may be racing another eviction of the same orphaned content.
    pub fn remove_blob(&self, digest: &Digest) -> Result<(), Error> {
        let path = self.blob_path(digest);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Every digest currently stored, reconstructed from the sharded path
    /// layout (fingerprint) and the file's length on disk (size_bytes).
    /// Used by the quota manager's eviction sweep to find blobs no longer
    /// reachable from any live reference.
    pub fn all_digests(&self) -> Result<Vec<Digest>, Error> {
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(self.objects_dir())
            .min_depth(2)
            .max_depth(2)
        {
            let entry = entry.map_err(|e| {
                Error::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walk failed")
                }))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let prefix = entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let rest = entry.file_name().to_string_lossy();
            let fingerprint = match Fingerprint::from_hex_string(&format!("{prefix}{rest}")) {
                Ok(f) => f,
                Err(_) => continue,
            };
            let size_bytes = entry
                .metadata()
                .map_err(|e| {
                    Error::Io(e.into_io_error().unwrap_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::Other, "stat failed")
                    }))
                })?
                .len() as usize;
            out.push(Digest::new(fingerprint, size_bytes));
        }
        Ok(out)
    }
}

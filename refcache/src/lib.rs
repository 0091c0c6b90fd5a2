//! Maps human-level reference strings to root manifest digests, serializes
//! concurrent commits per reference, and enforces a storage quota by
//! evicting least-recently-used references.

mod error;

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::PathBuf;

use cas::{LocalStore, ManifestEntry};
use hashing::Digest;
use indexmap::IndexMap;
use log::{debug, info};
use parking_lot::Mutex;

pub use error::Error;

const SHARD_COUNT: usize = 16;

struct State {
    cache_size: u64,
    /// Reference strings in least-to-most-recently-touched order.
    lru: IndexMap<String, ()>,
    /// References with a commit currently in flight; skipped by eviction.
    in_flight: HashSet<String>,
}

/// The on-disk `refs/` tree plus the in-memory bookkeeping layered over it.
pub struct ReferenceIndex {
    store: LocalStore,
    refs_root: PathBuf,
    quota_bytes: u64,
    shards: Vec<Mutex<()>>,
    state: Mutex<State>,
}

impl ReferenceIndex {
    pub fn new(store: LocalStore, quota_bytes: u64) -> Result<ReferenceIndex, Error> {
        let refs_root = store.root().join("refs");
        fs::create_dir_all(&refs_root)?;
        let index = ReferenceIndex {
            store,
            refs_root,
            quota_bytes,
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(())).collect(),
            state: Mutex::new(State {
                cache_size: 0,
                lru: IndexMap::new(),
                in_flight: HashSet::new(),
            }),
        };
        index.rebuild_lru_from_disk()?;
        Ok(index)
    }

    pub fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    fn shard_for(&self, reference: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        reference.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    fn ref_path(&self, reference: &str) -> PathBuf {
        self.refs_root.join(reference)
    }

    /// On startup, the in-memory LRU order is rebuilt from file mtimes so a
    /// restarted process recovers eviction order without a separate journal.
    fn rebuild_lru_from_disk(&self) -> Result<(), Error> {
        let mut entries = Vec::new();
        for entry in walkdir::WalkDir::new(&self.refs_root) {
            let entry = entry.map_err(|e| {
                Error::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walk failed")
                }))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let reference = entry
                .path()
                .strip_prefix(&self.refs_root)
                .expect("walked entry is under refs_root")
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            let mtime = entry.metadata()?.modified()?;
            entries.push((mtime, reference));
        }
        entries.sort_by_key(|(mtime, _)| *mtime);

        let mut state = self.state.lock();
        for (_, reference) in entries {
            state.lru.insert(reference, ());
        }
        Ok(())
    }

    fn touch(&self, reference: &str) {
        let mut state = self.state.lock();
        state.lru.shift_remove(reference);
        state.lru.insert(reference.to_string(), ());
    }

    pub fn resolve(&self, reference: &str) -> Result<Digest, Error> {
        let bytes = match fs::read(self.ref_path(reference)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(reference.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let digest = parse_ref_file(&bytes, reference)?;
        self.touch(reference);
        Ok(digest)
    }

    /// Atomically installs `digest` under every reference in `references`.
    /// Each reference is serialized independently via a striped mutex, so
    /// concurrent commits to distinct references never contend, and
    /// concurrent commits to the same reference produce one well-defined
    /// final binding.
    pub fn commit(&self, references: &[String], digest: Digest) -> Result<(), Error> {
        for reference in references {
            let _guard = self.shard_for(reference).lock();
            {
                let mut state = self.state.lock();
                state.in_flight.insert(reference.clone());
            }
            let result = self.write_ref_file(reference, digest);
            {
                let mut state = self.state.lock();
                state.in_flight.remove(reference);
            }
            result?;
            self.touch(reference);
        }
        debug!("committed {digest} under {} reference(s)", references.len());
        Ok(())
    }

    fn write_ref_file(&self, reference: &str, digest: Digest) -> Result<(), Error> {
        let path = self.ref_path(reference);
        let parent = path.parent().expect("ref path always has a parent");
        fs::create_dir_all(parent)?;
        let mut tmp = tempfile::Builder::new().tempfile_in(parent)?;
        tmp.write_all(digest.to_string().as_bytes())?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Drops a single reference. The blobs it pointed at are not removed
    /// here; they become eligible for removal on the next `evict_to` sweep.
    pub fn remove(&self, reference: &str) -> Result<(), Error> {
        let _guard = self.shard_for(reference).lock();
        match fs::remove_file(self.ref_path(reference)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.state.lock().lru.shift_remove(reference);
        Ok(())
    }

    pub fn compute_cache_size(&self) -> Result<u64, Error> {
        Ok(self.store.size()?)
    }

    pub fn set_cache_size(&self, bytes: u64) {
        self.state.lock().cache_size = bytes;
    }

    pub fn cache_size(&self) -> u64 {
        self.state.lock().cache_size
    }

    /// Removes references in least-recently-used order, sweeping any blobs
    /// they leave unreachable, until total stored bytes is at or below
    /// `target_bytes`. References with a commit in flight are skipped.
    /// Fails with `QuotaExceeded` if no reference can be evicted and the
    /// target is still not met.
    pub fn evict_to(&self, target_bytes: u64) -> Result<(), Error> {
        loop {
            let current = self.store.size()?;
            if current <= target_bytes {
                self.set_cache_size(current);
                return Ok(());
            }

            let victim = {
                let state = self.state.lock();
                state
                    .lru
                    .keys()
                    .find(|r| !state.in_flight.contains(*r))
                    .cloned()
            };
            let reference = victim.ok_or(Error::QuotaExceeded)?;

            info!("evicting reference {reference} ({current} bytes stored, target {target_bytes})");
            self.remove(&reference)?;
            let keep = self.reachable_digests()?;
            self.sweep(&keep)?;
        }
    }

    fn reachable_digests(&self) -> Result<HashSet<Digest>, Error> {
        let mut keep = HashSet::new();
        for entry in walkdir::WalkDir::new(&self.refs_root) {
            let entry = entry.map_err(|e| {
                Error::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walk failed")
                }))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let bytes = fs::read(entry.path())?;
            let reference = entry
                .path()
                .strip_prefix(&self.refs_root)
                .expect("walked entry is under refs_root")
                .to_string_lossy()
                .into_owned();
            let root = parse_ref_file(&bytes, &reference)?;
            self.collect_reachable(root, &mut keep)?;
        }
        Ok(keep)
    }

    fn collect_reachable(&self, root: Digest, keep: &mut HashSet<Digest>) -> Result<(), Error> {
        let mut stack = vec![root];
        while let Some(digest) = stack.pop() {
            if !keep.insert(digest) {
                continue;
            }
            match self.store.get_manifest(&digest) {
                Ok(manifest) => {
                    for entry in manifest.entries() {
                        match entry {
                            ManifestEntry::Directory { digest, .. } => stack.push(*digest),
                            ManifestEntry::File { digest, .. } => {
                                keep.insert(*digest);
                            }
                            ManifestEntry::Symlink { .. } => {}
                        }
                    }
                }
                Err(cas::Error::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn sweep(&self, keep: &HashSet<Digest>) -> Result<(), Error> {
        for digest in self.store.all_digests()? {
            if !keep.contains(&digest) {
                self.store.remove_blob(&digest)?;
            }
        }
        Ok(())
    }
}

fn parse_ref_file(bytes: &[u8], reference: &str) -> Result<Digest, Error> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::Malformed(format!("reference {reference} is not valid UTF-8: {e}")))?;
    let (fingerprint, size_bytes) = text
        .split_once(':')
        .ok_or_else(|| Error::Malformed(format!("reference {reference} has no digest separator")))?;
    let fingerprint = hashing::Fingerprint::from_hex_string(fingerprint)
        .map_err(|e| Error::Malformed(format!("reference {reference}: bad fingerprint: {e}")))?;
    let size_bytes = size_bytes
        .parse::<usize>()
        .map_err(|e| Error::Malformed(format!("reference {reference}: bad size: {e}")))?;
    Ok(Digest::new(fingerprint, size_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cas::ManifestEntry;

    fn index(quota: u64) -> (tempfile::TempDir, ReferenceIndex) {
        let (dir, store) = cache_testutil::tempdir_store();
        let index = ReferenceIndex::new(store, quota).unwrap();
        (dir, index)
    }

    #[test]
    fn commit_then_resolve_both_references() {
        let (_dir, index) = index(u64::MAX);
        let digest = index.store.put_blob(&cache_testutil::as_bytes("hello")).unwrap();
        index
            .commit(&cache_testutil::owned_string_vec(&["a/b/strong", "a/b/weak"]), digest)
            .unwrap();

        assert_eq!(index.resolve("a/b/strong").unwrap(), digest);
        assert_eq!(index.resolve("a/b/weak").unwrap(), digest);
    }

    #[test]
    fn resolve_missing_reference_is_not_found() {
        let (_dir, index) = index(u64::MAX);
        assert!(matches!(index.resolve("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn remove_drops_the_binding() {
        let (_dir, index) = index(u64::MAX);
        let digest = index.store.put_blob(b"hello").unwrap();
        index.commit(&["r".to_string()], digest).unwrap();
        index.remove("r").unwrap();
        assert!(matches!(index.resolve("r"), Err(Error::NotFound(_))));
    }

    #[test]
    fn evict_to_removes_lru_reference_and_its_blobs() {
        let (_dir, index) = index(u64::MAX);

        let digest_a = index
            .store
            .put_manifest(vec![ManifestEntry::File {
                name: "a.txt".to_string(),
                digest: index.store.put_blob(b"aaaaaaaaaa").unwrap(),
                is_executable: false,
            }])
            .unwrap();
        index.commit(&["ref-a".to_string()], digest_a).unwrap();

        let digest_b = index
            .store
            .put_manifest(vec![ManifestEntry::File {
                name: "b.txt".to_string(),
                digest: index.store.put_blob(b"bbbbbbbbbb").unwrap(),
                is_executable: false,
            }])
            .unwrap();
        index.commit(&["ref-b".to_string()], digest_b).unwrap();

        let size_with_both = index.store.size().unwrap();
        index.evict_to(size_with_both / 2).unwrap();

        assert!(matches!(index.resolve("ref-a"), Err(Error::NotFound(_))));
        assert_eq!(index.resolve("ref-b").unwrap(), digest_b);
        assert!(index.store.size().unwrap() < size_with_both);
    }

    #[test]
    fn evict_to_unreachable_target_fails_with_quota_exceeded() {
        let (_dir, index) = index(u64::MAX);
        let digest = index
            .store
            .put_manifest(vec![ManifestEntry::File {
                name: "a.txt".to_string(),
                digest: index.store.put_blob(b"aaaaaaaaaa").unwrap(),
                is_executable: false,
            }])
            .unwrap();
        index.commit(&["only-ref".to_string()], digest).unwrap();

        {
            let mut state = index.state.lock();
            state.in_flight.insert("only-ref".to_string());
        }
        assert!(matches!(index.evict_to(0), Err(Error::QuotaExceeded)));
    }
}

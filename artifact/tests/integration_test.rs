//! Cross-crate scenarios that exercise `artifact` and `refcache` together,
//! the way a scheduler actually drives them: commit an artifact, publish it
//! under its keys, and later resolve or evict it by reference.

use std::collections::BTreeMap;
use std::fs;

use artifact::{Artifact, BuildResult, CommitInput, MaterializationPolicy};
use refcache::ReferenceIndex;
use vfs::{ImportSource, VDirHandle};

fn commit_artifact(
    store: &cas::LocalStore,
    scratch_root: &std::path::Path,
    contents: &[u8],
    strong_key: &str,
    weak_key: &str,
) -> (Artifact, Vec<String>) {
    let files_src = tempfile::tempdir().unwrap();
    fs::write(files_src.path().join("out"), contents).unwrap();
    let files = VDirHandle::empty(store.clone()).unwrap();
    files.import_files(ImportSource::Fs(files_src.path())).unwrap();

    let input = CommitInput {
        scratch_root,
        collected_files: Some(&files),
        build_tree: None,
        build_log_path: None,
        build_result: BuildResult {
            success: true,
            description: "succeeded".to_string(),
            detail: None,
        },
        public_data: serde_yaml::Value::Mapping(Default::default()),
        strong_key: strong_key.to_string(),
        weak_key: weak_key.to_string(),
        dependencies: BTreeMap::new(),
        workspaced: false,
        workspaced_dependencies: Vec::new(),
    };
    Artifact::commit(store.clone(), input).unwrap()
}

#[test]
fn commit_publish_and_resolve_round_trips_through_the_reference_index() {
    let (_dir, store) = cache_testutil::tempdir_store();
    let index = ReferenceIndex::new(store.clone(), u64::MAX).unwrap();
    let scratch = tempfile::tempdir().unwrap();

    let (artifact, keys) = commit_artifact(&store, scratch.path(), b"hello", "aaaa", "bbbb");
    index.commit(&keys, artifact.digest()).unwrap();

    let resolved_strong = index.resolve("aaaa").unwrap();
    let resolved_weak = index.resolve("bbbb").unwrap();
    assert_eq!(resolved_strong, artifact.digest());
    assert_eq!(resolved_weak, artifact.digest());

    let reloaded = Artifact::at_digest(store, resolved_strong);
    assert!(reloaded.cached(MaterializationPolicy::full()).unwrap());
    assert_eq!(reloaded.keys().unwrap().strong, "aaaa");
}

#[test]
fn eviction_boundary_keeps_the_most_recently_committed_artifact() {
    let (_dir, store) = cache_testutil::tempdir_store();
    let scratch = tempfile::tempdir().unwrap();

    let (artifact_a, keys_a) =
        commit_artifact(&store, scratch.path(), b"aaaaaaaaaa", "key-a", "weak-a");
    let size_after_a = store.size().unwrap();
    // Only one artifact's worth of data is allowed to fit at a time.
    let index = ReferenceIndex::new(store.clone(), size_after_a).unwrap();
    index.commit(&keys_a, artifact_a.digest()).unwrap();

    let (artifact_b, keys_b) =
        commit_artifact(&store, scratch.path(), b"bbbbbbbbbb", "key-b", "weak-b");
    index.commit(&keys_b, artifact_b.digest()).unwrap();
    index.evict_to(index.quota_bytes()).unwrap();

    assert!(matches!(index.resolve("key-a"), Err(refcache::Error::NotFound(_))));
    assert_eq!(index.resolve("key-b").unwrap(), artifact_b.digest());
    assert!(store.size().unwrap() <= index.quota_bytes());
}

#[test]
fn an_artifact_never_committed_to_the_index_does_not_resolve() {
    // P5: nothing about assembling an `Artifact` alone publishes it under a
    // reference. A reference only resolves once `ReferenceIndex::commit` has
    // bound it.
    let (_dir, store) = cache_testutil::tempdir_store();
    let index = ReferenceIndex::new(store.clone(), u64::MAX).unwrap();
    let scratch = tempfile::tempdir().unwrap();

    let (_artifact, _keys) =
        commit_artifact(&store, scratch.path(), b"uncommitted", "only-key", "only-weak");

    assert!(matches!(index.resolve("only-key"), Err(refcache::Error::NotFound(_))));
}

//! Concurrent-commit scenario: independent workers racing to publish the
//! same content under the same reference must leave exactly one surviving
//! binding and never duplicate the blob on disk.

use std::sync::Arc;
use std::thread;

use cas::ManifestEntry;
use refcache::ReferenceIndex;

#[test]
fn concurrent_commits_of_identical_content_converge_on_one_binding() {
    let (_dir, store) = cache_testutil::tempdir_store();
    let index = Arc::new(ReferenceIndex::new(store.clone(), u64::MAX).unwrap());

    let file_digest = store.put_blob(b"shared contents").unwrap();
    let root = store
        .put_manifest(vec![ManifestEntry::File {
            name: "out".to_string(),
            digest: file_digest,
            is_executable: false,
        }])
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let index = Arc::clone(&index);
            thread::spawn(move || index.commit(&["shared-ref".to_string()], root).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(index.resolve("shared-ref").unwrap(), root);

    let blob_path = store.object_path(&file_digest);
    let containing_dir = blob_path.parent().unwrap();
    let entries: Vec<_> = std::fs::read_dir(containing_dir).unwrap().collect();
    assert_eq!(entries.len(), 1, "exactly one blob file, no duplicates");
}

//! Directory-backed catalog store behaviour on a real filesystem.

#[path = "common/fixtures.rs"]
mod fixtures;

use camino::Utf8PathBuf;
use fixtures::{TEST_ENDPOINT, TEST_REGION, load};
use rstest::{fixture, rstest};
use stratus::test_support::{PRODUCT_METADATA_PATH, remove_test_image_data, use_test_image_data};
use stratus::{CatalogStore, DirStore, StoreError};
use tempfile::TempDir;

struct TempStore {
    store: DirStore,
    _tmp: TempDir,
}

#[fixture]
fn temp_store() -> TempStore {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().join("catalog"))
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
    let store = DirStore::open(&root).unwrap_or_else(|err| panic!("open store: {err}"));
    TempStore { store, _tmp: tmp }
}

#[rstest]
fn open_creates_the_root(temp_store: TempStore) {
    assert!(temp_store.store.root().is_dir());
}

#[rstest]
fn nested_paths_round_trip(temp_store: TempStore) {
    let store = &temp_store.store;
    store
        .put("streams/v1/index.json", b"{}", 2)
        .expect("put nested");

    assert_eq!(store.get("streams/v1/index.json").expect("get"), b"{}");
    assert!(store.root().join("streams/v1/index.json").is_file());
}

#[rstest]
fn overwrite_replaces_contents(temp_store: TempStore) {
    let store = &temp_store.store;
    store.put("doc.json", b"first", 5).expect("put");
    store.put("doc.json", b"2nd", 3).expect("overwrite");

    assert_eq!(store.get("doc.json").expect("get"), b"2nd");
}

#[rstest]
fn size_mismatch_writes_nothing(temp_store: TempStore) {
    let store = &temp_store.store;
    let err = store.put("doc.json", b"abc", 9).expect_err("size differs");

    assert!(matches!(err, StoreError::SizeMismatch { declared: 9, actual: 3, .. }));
    assert!(matches!(
        store.get("doc.json"),
        Err(StoreError::NotFound { .. })
    ));
}

#[rstest]
#[case::parent("../escape.json")]
#[case::absolute("/tmp/escape.json")]
#[case::empty_component("a//b.json")]
fn paths_cannot_escape_the_root(temp_store: TempStore, #[case] path: &str) {
    let err = temp_store
        .store
        .put(path, b"x", 1)
        .expect_err("path rejected");
    assert!(matches!(err, StoreError::InvalidPath { .. }), "unexpected error: {err}");
}

#[rstest]
fn listing_walks_subdirectories_in_order(temp_store: TempStore) {
    let store = &temp_store.store;
    for path in ["b.json", "a/z.json", "a/deep/y.json"] {
        store.put(path, b"{}", 2).expect("put");
    }

    let all: Vec<String> = store.list("").expect("list").collect();
    let under_a: Vec<String> = store.list("a/").expect("list").collect();

    assert_eq!(all, ["a/deep/y.json", "a/z.json", "b.json"]);
    assert_eq!(under_a, ["a/deep/y.json", "a/z.json"]);
}

#[rstest]
fn published_catalog_loads_and_clears(temp_store: TempStore) {
    let store = &temp_store.store;
    use_test_image_data(store, TEST_REGION, TEST_ENDPOINT).expect("publish");

    let catalog = load(store, TEST_REGION);
    assert_eq!(catalog.products.len(), 8);
    assert!(
        store
            .list("")
            .expect("list")
            .any(|path| path == PRODUCT_METADATA_PATH)
    );

    remove_test_image_data(store).expect("remove");
    assert_eq!(store.list("").expect("list").total(), 0);
    assert!(store.root().is_dir());
}

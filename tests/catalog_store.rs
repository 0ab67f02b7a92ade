use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use picture_frame::catalog::{CURRENT_SCHEMA_VERSION, CatalogStore};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::tempdir;

fn seeded() -> (CatalogStore, i64, i64) {
    let store = CatalogStore::open_in_memory().unwrap();
    let a = store.upsert_album("A", "A", "/media").unwrap();
    let b = store.upsert_album("B", "B", "/media").unwrap();
    store.upsert_image("img1.jpg", a).unwrap();
    store.upsert_image("img2.jpg", a).unwrap();
    store.upsert_image("img1.jpg", b).unwrap();
    (store, a, b)
}

#[test]
fn upserts_are_idempotent() {
    let store = CatalogStore::open_in_memory().unwrap();
    let first = store.upsert_album("Summer", "2024/Summer", "/media").unwrap();
    let again = store.upsert_album("Summer", "2024/Summer", "/media").unwrap();
    assert_eq!(first, again);

    let img = store.upsert_image("beach.jpg", first).unwrap();
    let img_again = store.upsert_image("beach.jpg", first).unwrap();
    assert_eq!(img, img_again);
    assert_eq!(store.count_all_images(None), 1);
}

#[test]
fn same_album_name_under_two_roots_is_two_albums() {
    let store = CatalogStore::open_in_memory().unwrap();
    let left = store.upsert_album("Trips", "Trips", "/left").unwrap();
    let right = store.upsert_album("Trips", "Trips", "/right").unwrap();
    assert_ne!(left, right);
    assert_eq!(
        store.list_album_names(),
        BTreeSet::from(["Trips".to_string()])
    );
}

#[test]
fn image_for_missing_album_is_rejected() {
    let store = CatalogStore::open_in_memory().unwrap();
    assert_eq!(store.upsert_image("orphan.jpg", 999), None);
}

#[test]
fn displayed_marks_shrink_the_undisplayed_pool() {
    let (store, _, _) = seeded();
    assert_eq!(store.count_undisplayed_images(None), 3);

    let first = store.list_all_images(Some("A"))[0].clone();
    assert!(store.mark_displayed(first.id));
    assert!(store.mark_displayed(first.id), "re-marking refreshes the mark");

    assert_eq!(store.count_all_images(Some("A")), 2);
    assert_eq!(store.count_undisplayed_images(Some("A")), 1);
    assert_eq!(store.count_undisplayed_images(None), 2);
    let undisplayed: Vec<PathBuf> = store
        .list_undisplayed_images(None)
        .into_iter()
        .map(|r| r.relative_path)
        .collect();
    assert!(!undisplayed.contains(&first.relative_path));
    assert!(store.last_displayed_at().is_some());

    assert!(store.clear_displayed_marks());
    assert_eq!(store.count_undisplayed_images(None), 3);
    assert!(store.last_displayed_at().is_none());
}

#[test]
fn album_filter_matches_exact_name() {
    let (store, _, _) = seeded();
    let b: Vec<_> = store.list_all_images(Some("B"));
    assert_eq!(b.len(), 1);
    assert_eq!(b[0].relative_path, Path::new("B/img1.jpg"));
    assert_eq!(b[0].album_name, "B");
    assert_eq!(b[0].source_root, Path::new("/media"));
    assert!(store.list_all_images(Some("b")).is_empty());
    assert_eq!(store.count_all_images(Some("Nope")), 0);
}

#[test]
fn sampling_respects_filter_and_marks() {
    let (store, _, _) = seeded();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let rec = store.sample_random_image(Some("A"), &mut rng).unwrap();
        assert_eq!(rec.album_name, "A");
    }

    for rec in store.list_all_images(Some("A")) {
        store.mark_displayed(rec.id);
    }
    assert!(
        store
            .sample_random_undisplayed_image(Some("A"), &mut rng)
            .is_none()
    );
    let rec = store
        .sample_random_undisplayed_image(None, &mut rng)
        .unwrap();
    assert_eq!(rec.relative_path, Path::new("B/img1.jpg"));
}

#[test]
fn sampling_reaches_every_candidate() {
    let (store, _, _) = seeded();
    let mut rng = StdRng::seed_from_u64(11);
    let mut seen = BTreeSet::new();
    for _ in 0..200 {
        seen.insert(store.sample_random_image(None, &mut rng).unwrap().id);
    }
    assert_eq!(seen.len(), 3);
}

#[test]
fn state_survives_reopen() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("nested").join("frame.db");
    let marked = {
        let store = CatalogStore::open(&db, None).unwrap();
        let album = store.upsert_album("A", "A", "/media").unwrap();
        let id = store.upsert_image("x.jpg", album).unwrap();
        store.upsert_image("y.jpg", album).unwrap();
        assert!(store.mark_displayed(id));
        id
    };

    let store = CatalogStore::open(&db, None).unwrap();
    assert_eq!(store.path(), Some(db.as_path()));
    assert_eq!(store.schema_version(), CURRENT_SCHEMA_VERSION);
    assert_eq!(store.count_all_images(None), 2);
    let remaining = store.list_undisplayed_images(None);
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0].id, marked);
}

#[test]
fn schema_version_round_trips() {
    let store = CatalogStore::open_in_memory().unwrap();
    assert_eq!(store.schema_version(), CURRENT_SCHEMA_VERSION);
    assert!(store.set_schema_version(CURRENT_SCHEMA_VERSION + 1));
    assert_eq!(store.schema_version(), CURRENT_SCHEMA_VERSION + 1);
}

/// File-backed store with one marked image, whose tables are then dropped
/// behind its back through a second connection.
fn store_with_dropped_tables(dir: &Path) -> CatalogStore {
    let db = dir.join("catalog.db");
    let store = CatalogStore::open(&db, None).unwrap();
    let album = store.upsert_album("A", "A", "/media").unwrap();
    let image = store.upsert_image("a.jpg", album).unwrap();
    assert!(store.mark_displayed(image));

    let other = rusqlite::Connection::open(&db).unwrap();
    other
        .execute_batch(
            "DROP TABLE displayed_images;
             DROP TABLE images;
             DROP TABLE albums;",
        )
        .unwrap();
    store
}

#[test]
fn storage_failures_degrade_to_empty_results() {
    let dir = tempdir().unwrap();
    let store = store_with_dropped_tables(dir.path());
    let mut rng = StdRng::seed_from_u64(1);

    assert_eq!(store.upsert_album("B", "B", "/media"), None);
    assert_eq!(store.upsert_image("b.jpg", 1), None);
    assert!(!store.mark_displayed(1));
    assert!(!store.clear_displayed_marks());

    assert_eq!(store.count_all_images(None), 0);
    assert_eq!(store.count_undisplayed_images(Some("A")), 0);
    assert!(store.list_all_images(None).is_empty());
    assert!(store.list_undisplayed_images(None).is_empty());
    assert!(store.list_album_names().is_empty());
    assert!(store.sample_random_image(None, &mut rng).is_none());
    assert!(store.sample_random_undisplayed_image(None, &mut rng).is_none());
    assert!(store.last_displayed_at().is_none());

    // The version table was left alone and still answers.
    assert_eq!(store.schema_version(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn same_leaf_name_in_one_root_shares_the_first_album() {
    let store = CatalogStore::open_in_memory().unwrap();
    let first = store.upsert_album("Summer", "2023/Summer", "/media").unwrap();
    let second = store.upsert_album("Summer", "2024/Summer", "/media").unwrap();
    assert_eq!(first, second);

    store.upsert_image("a.jpg", first).unwrap();
    store.upsert_image("b.jpg", second).unwrap();
    store.upsert_image("a.jpg", second).unwrap();

    assert_eq!(
        store.list_album_names(),
        BTreeSet::from(["Summer".to_string()])
    );
    let paths: BTreeSet<PathBuf> = store
        .list_all_images(Some("Summer"))
        .into_iter()
        .map(|r| r.relative_path)
        .collect();
    assert_eq!(
        paths,
        BTreeSet::from([
            PathBuf::from("2023/Summer/a.jpg"),
            PathBuf::from("2023/Summer/b.jpg"),
        ])
    );
}

use adage_loader::store::{DATABASE_FILE, Store};

#[test]
fn default_layout() {
    let store = Store::new().unwrap();
    assert!(store.project_root().ends_with(".adage"));
    assert!(store.database_path(None).ends_with(DATABASE_FILE));
    assert!(store.cache_root().ends_with("adage-loader"));
    assert!(store.geneset_path("homo-sapiens").starts_with(store.cache_root()));
}

//! File-backed session store behaviour.

use serde_json::json;

use tukang::session::{FileSessionStore, SessionError, SessionStore};

#[tokio::test]
async fn missing_file_means_never_paired() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = FileSessionStore::new(tmp.path().join("auth").join("creds.json"));
    assert!(store.load().await.expect("load").is_none());
}

#[tokio::test]
async fn save_creates_parent_and_reloads_identically() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = FileSessionStore::new(tmp.path().join("auth").join("creds.json"));
    let creds = json!({
        "noiseKey": { "private": "cHJpdg==", "public": "cHVi" },
        "registrationId": 4242,
        "me": { "id": "6281100000009:4@s.whatsapp.net" }
    });

    store.save(&creds).await.expect("save");

    assert!(store.path().exists());
    assert_eq!(store.load().await.expect("load"), Some(creds));
}

#[tokio::test]
async fn save_replaces_previous_blob_without_leftovers() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = FileSessionStore::new(tmp.path().join("creds.json"));

    store.save(&json!({ "v": 1 })).await.expect("first save");
    store.save(&json!({ "v": 2 })).await.expect("second save");

    assert_eq!(store.load().await.expect("load"), Some(json!({ "v": 2 })));
    let names: Vec<_> = std::fs::read_dir(tmp.path())
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("creds.json")]);
}

#[tokio::test]
async fn corrupt_file_is_reported() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("creds.json");
    std::fs::write(&path, b"{ not json").expect("write");

    let err = FileSessionStore::new(&path).load().await.expect_err("corrupt");
    assert!(matches!(err, SessionError::Corrupt { .. }), "{err}");
}

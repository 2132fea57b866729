//! Upload dispatch end to end: manifest on disk, transfer program, status store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use irgsh_dispatch::fakes::RecordingTransport;
use irgsh_dispatch::{
    BrokerConfig, DispatchConfig, DispatchError, ErrorKind, FileTransport, ScpTransport,
    UploadConfig, UploadDispatcher,
};
use irgsh_state::fakes::MemoryStore;
use irgsh_state::{SpecId, SpecStatus, Specification};
use tempfile::TempDir;

const S2_MANIFEST: &str = "Format: 3.0 (native)\nSource: pkg\nFiles:\n \
    abcd1234 2048 pkg_1.0.dsc\n efgh5678 4096 pkg_1.0.tar.gz\n";

fn upload_config(program: &str) -> UploadConfig {
    UploadConfig::new("repo", "archive.example.org", 22, "incoming").with_program(program)
}

fn config(root: &Path, upload: UploadConfig) -> DispatchConfig {
    DispatchConfig::new(
        BrokerConfig {
            url: "amqp://localhost".to_string(),
        },
        upload,
        root,
    )
}

fn seed(store: &MemoryStore, root: &Path, id: &str, manifest: &str) {
    store.put_specification(Specification {
        id: SpecId::new(id),
        distribution: "arok".to_string(),
        source: "pkg".to_string(),
        version: "1.0".to_string(),
        status: SpecStatus(103),
    });
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("pkg_1.0.dsc"), manifest).unwrap();
}

fn dispatcher(
    root: &TempDir,
    upload: UploadConfig,
    store: &Arc<MemoryStore>,
    transport: Arc<dyn FileTransport>,
) -> UploadDispatcher {
    UploadDispatcher::new(config(root.path(), upload), store.clone(), transport)
}

#[tokio::test]
async fn manifest_name_is_appended_and_three_files_transferred() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, root.path(), "S2", S2_MANIFEST);
    let transport = RecordingTransport::new();

    let outcome = dispatcher(&root, upload_config("scp"), &store, Arc::new(transport.clone()))
        .run(&SpecId::new("S2"))
        .await
        .unwrap();

    let dir = root.path().join("S2");
    let expected: Vec<PathBuf> = ["pkg_1.0.dsc", "pkg_1.0.tar.gz", "pkg_1.0.dsc"]
        .iter()
        .map(|name| dir.join(name))
        .collect();
    assert_eq!(outcome.files, expected);
    assert_eq!(transport.batches(), vec![expected]);
    assert!(outcome.files.iter().all(|f| f.is_absolute()));
}

#[tokio::test]
async fn successful_transfer_writes_uploaded_only() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, root.path(), "S2", S2_MANIFEST);
    let transport = Arc::new(ScpTransport::new(upload_config("true")));

    dispatcher(&root, upload_config("true"), &store, transport)
        .run(&SpecId::new("S2"))
        .await
        .unwrap();

    assert_eq!(
        store.status_writes(),
        vec![(SpecId::new("S2"), SpecStatus::UPLOADED)]
    );
}

#[tokio::test]
async fn non_zero_exit_marks_failed_and_propagates() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, root.path(), "S3", S2_MANIFEST);
    let transport = Arc::new(ScpTransport::new(upload_config("false")));

    let err = dispatcher(&root, upload_config("false"), &store, transport)
        .run(&SpecId::new("S3"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::TransferError {
            exit_code: Some(1),
            ..
        }
    ));
    assert_eq!(
        store.status_writes(),
        vec![(SpecId::new("S3"), SpecStatus::FAILED)]
    );
}

#[tokio::test]
async fn malformed_record_marks_failed_without_transfer() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, root.path(), "S4", "Files:\n abcd1234 pkg_1.0.tar.gz\n");
    let transport = RecordingTransport::new();

    let err = dispatcher(&root, upload_config("scp"), &store, Arc::new(transport.clone()))
        .run(&SpecId::new("S4"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedManifest);
    assert!(transport.batches().is_empty());
    assert_eq!(store.status_of(&SpecId::new("S4")), Some(SpecStatus::FAILED));
}

#[tokio::test]
async fn failed_failure_write_still_returns_transfer_error() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, root.path(), "S3", S2_MANIFEST);
    store.reject_status(SpecStatus::FAILED);

    let err = dispatcher(
        &root,
        upload_config("scp"),
        &store,
        Arc::new(RecordingTransport::failing(1)),
    )
    .run(&SpecId::new("S3"))
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::TransferError {
            exit_code: Some(1),
            ..
        }
    ));
    assert!(store.status_writes().is_empty());
    assert_eq!(store.status_of(&SpecId::new("S3")), Some(SpecStatus(103)));
}

#[tokio::test]
async fn rejected_uploaded_write_falls_back_to_failed() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, root.path(), "S2", S2_MANIFEST);
    store.reject_status(SpecStatus::UPLOADED);
    let transport = RecordingTransport::new();

    let err = dispatcher(&root, upload_config("scp"), &store, Arc::new(transport.clone()))
        .run(&SpecId::new("S2"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(transport.batches().len(), 1);
    assert_eq!(
        store.status_writes(),
        vec![(SpecId::new("S2"), SpecStatus::FAILED)]
    );
}

#[tokio::test]
async fn names_outside_artifact_dir_are_never_transferred() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(
        &store,
        root.path(),
        "S9",
        "Files:\n a 1 /etc/passwd\n b 2 ../../../root/.ssh/id_rsa\n",
    );
    let transport = RecordingTransport::new();

    let err = dispatcher(&root, upload_config("scp"), &store, Arc::new(transport.clone()))
        .run(&SpecId::new("S9"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedManifest);
    assert!(transport.batches().is_empty());
    assert_eq!(store.status_of(&SpecId::new("S9")), Some(SpecStatus::FAILED));
}

#[tokio::test]
async fn unknown_spec_is_not_found_without_status_write() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let transport = RecordingTransport::new();

    let err = dispatcher(&root, upload_config("scp"), &store, Arc::new(transport.clone()))
        .run(&SpecId::new("S404"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(store.status_writes().is_empty());
    assert!(transport.batches().is_empty());
}

#[tokio::test]
async fn empty_files_section_uploads_manifest_alone() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, root.path(), "S8", "Source: pkg\nVersion: 1.0\n");
    let transport = RecordingTransport::new();

    let outcome = dispatcher(&root, upload_config("scp"), &store, Arc::new(transport.clone()))
        .run(&SpecId::new("S8"))
        .await
        .unwrap();

    assert_eq!(outcome.files, vec![root.path().join("S8").join("pkg_1.0.dsc")]);
    assert_eq!(store.status_of(&SpecId::new("S8")), Some(SpecStatus::UPLOADED));
}

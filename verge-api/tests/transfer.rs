mod common;

use serde_json::json;
use verge_api::transfer::{download_bytes, download_to, upload_chunks};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{api, connected};

#[tokio::test]
async fn test_upload_sends_fixed_chunks_with_offsets() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    for offset in ["0", "262144", "524288"] {
        Mock::given(method("PUT"))
            .and(path(api("files/7")))
            .and(query_param("filepos", offset))
            .and(header("content-type", "application/octet-stream"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    let data = vec![0xAB_u8; 262_144 * 2 + 1000];
    let mut seen = Vec::new();
    let mut progress = |sent: u64, total: u64| seen.push((sent, total));
    let sent = upload_chunks(
        &client,
        "files/7",
        &mut data.as_slice(),
        data.len() as u64,
        Some(&mut progress),
    )
    .await
    .unwrap();

    assert_eq!(sent, data.len() as u64);
    assert_eq!(
        seen,
        vec![
            (262_144, 525_288),
            (524_288, 525_288),
            (525_288, 525_288)
        ]
    );
}

#[tokio::test]
async fn test_upload_stops_at_failed_chunk() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("PUT"))
        .and(path(api("files/7")))
        .respond_with(ResponseTemplate::new(507).set_body_json(json!({"err": "out of space"})))
        .expect(1)
        .mount(&server)
        .await;

    let data = vec![1u8; 300_000];
    let err = upload_chunks(&client, "files/7", &mut data.as_slice(), 300_000, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(507));
}

#[tokio::test]
async fn test_download_streams_to_disk_and_refuses_overwrite() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(api("files/3")))
        .and(query_param("download", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ISO-CONTENTS".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("image.iso");
    let query = [("download".to_owned(), "1".to_owned())];

    let written = download_to(&client, "files/3", &query, &dest, false).await.unwrap();
    assert_eq!(written, 12);
    assert_eq!(std::fs::read(&dest).unwrap(), b"ISO-CONTENTS");

    let err = download_to(&client, "files/3", &query, &dest, false).await.unwrap_err();
    assert!(matches!(err, verge_api::Error::Io(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists));

    download_to(&client, "files/3", &query, &dest, true).await.unwrap();
    assert_eq!(download_bytes(&client, "files/3", &query).await.unwrap(), b"ISO-CONTENTS");
}

#[tokio::test]
async fn test_download_error_leaves_no_file() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path(api("files/4")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("missing.bin");
    let err = download_to(&client, "files/4", &[], &dest, false).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!dest.exists());
}

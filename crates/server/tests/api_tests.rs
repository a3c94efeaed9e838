//! Integration tests for HTTP API endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{CLI_AGENT, StaticValidator, TestServer};
use ferry_core::{FileId, UploadId};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;

const TOKEN: &str = "ccccccbcgujhingjrdejhgfnuetrgigvejhhgbkugded";

fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[tokio::test]
async fn test_create_upload_with_defaults() {
    let server = TestServer::new().await;

    let response = server
        .send(Request::post("/upload").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let json = response.json();
    assert_eq!(json["id"].as_str().unwrap().len(), 16);
    assert_eq!(json["uploadToken"].as_str().unwrap().len(), 32);
    assert_eq!(json["ttl"], server.state.config.server.default_ttl_secs);
    assert_eq!(json["oneShot"], false);
    assert_eq!(json["removable"], false);
    assert!(json.get("remoteIp").is_none());
}

#[tokio::test]
async fn test_get_upload_hides_secrets() {
    let server = TestServer::new().await;
    let (upload_id, upload_token) = server
        .new_upload(json!({"ttl": 3600, "comments": "hello"}))
        .await;
    let file_id = server
        .new_file(&upload_id, &upload_token, "a.txt", b"0123456789")
        .await;

    let response = server.get(&format!("/upload/{upload_id}")).await;
    assert_eq!(response.status, StatusCode::OK);

    let json = response.json();
    assert_eq!(json["comments"], "hello");
    assert!(json.get("uploadToken").is_none());
    let file = &json["files"][file_id.as_str()];
    assert_eq!(file["name"], "a.txt");
    assert_eq!(file["size"], 10);
    assert_eq!(file["status"], "uploaded");
    assert!(file.get("backendDetails").is_none());
}

#[tokio::test]
async fn test_unknown_upload_is_not_found() {
    let server = TestServer::new().await;

    let response = server.get("/upload/0123456789abcdef").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = server.get("/upload/..%2F..%2Fetc").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_create_requests() {
    let server = TestServer::with_config(|config| {
        config.server.max_ttl_secs = 3600;
        config.server.default_ttl_secs = 60;
    })
    .await;

    let response = server.create_upload(json!({"ttl": 7200})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    // Unlimited uploads are refused when a maximum is configured.
    let response = server.create_upload(json!({"ttl": 0})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = server.create_upload(json!({"ttl": -5})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = server
        .send(
            Request::post("/upload")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    // Token protection is not offered by this server.
    let response = server.create_upload(json!({"token": TOKEN})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_add_file_records_digest_size_and_type() {
    let server = TestServer::new().await;
    let (upload_id, upload_token) = server.new_upload(json!({})).await;

    let mut png = b"\x89PNG\r\n\x1A\n".to_vec();
    png.extend_from_slice(&[0u8; 100]);
    let response = server
        .add_file(&upload_id, &upload_token, "image.png", &png)
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let json = response.json();
    assert_eq!(json["name"], "image.png");
    assert_eq!(json["size"], 108);
    assert_eq!(json["type"], "image/png");
    assert_eq!(json["digest"], sha256_hex(&png));
    assert_eq!(json["status"], "uploaded");
}

#[tokio::test]
async fn test_add_file_requires_upload_token() {
    let server = TestServer::new().await;
    let (upload_id, _) = server.new_upload(json!({})).await;

    let response = server
        .add_file(&upload_id, "not-the-token", "a.txt", b"data")
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = server.get(&format!("/upload/{upload_id}")).await;
    assert_eq!(response.json()["files"], json!({}));
}

#[tokio::test]
async fn test_add_file_over_limit_is_rejected() {
    let server = TestServer::with_config(|config| {
        config.server.max_file_size = 8;
    })
    .await;
    let (upload_id, upload_token) = server.new_upload(json!({})).await;

    let response = server
        .add_file(&upload_id, &upload_token, "big.bin", b"0123456789")
        .await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);

    let response = server
        .add_file(&upload_id, &upload_token, "small.bin", b"01234567")
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let json = server.get(&format!("/upload/{upload_id}")).await.json();
    let files = json["files"].as_object().unwrap();
    assert_eq!(files.len(), 1);
    assert!(files.values().all(|f| f["name"] == "small.bin"));
}

#[tokio::test]
async fn test_download_streams_content() {
    let server = TestServer::new().await;
    let (upload_id, upload_token) = server.new_upload(json!({})).await;
    let file_id = server
        .new_file(&upload_id, &upload_token, "notes.txt", b"hello ferry")
        .await;

    let response = server
        .get(&format!("/upload/{upload_id}/file/{file_id}"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"hello ferry");
    assert_eq!(response.header("content-length"), Some("11"));
    assert_eq!(
        response.header("content-disposition"),
        Some("inline; filename=\"notes.txt\"")
    );

    // Downloading again is fine for regular uploads.
    let response = server
        .get(&format!("/file/{upload_id}/{file_id}/notes.txt?dl=1"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"hello ferry");
    assert_eq!(
        response.header("content-disposition"),
        Some("attachment; filename=\"notes.txt\"")
    );
}

#[tokio::test]
async fn test_one_shot_file_is_served_once() {
    let server = TestServer::new().await;
    let (upload_id, upload_token) = server
        .new_upload(json!({"ttl": 3600, "oneShot": true}))
        .await;
    let file_id = server
        .new_file(&upload_id, &upload_token, "a.txt", b"0123456789")
        .await;
    let uri = format!("/file/{upload_id}/{file_id}/a.txt");

    let first = server.get(&uri).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body, b"0123456789");

    let second = server.get(&uri).await;
    assert_eq!(second.status, StatusCode::UNAUTHORIZED);

    let json = server.get(&format!("/upload/{upload_id}")).await.json();
    assert_eq!(json["files"][file_id.as_str()]["status"], "downloaded");
}

#[tokio::test]
async fn test_one_shot_over_tcp_is_served_once() {
    let server = TestServer::new().await;
    let (upload_id, upload_token) = server
        .new_upload(json!({"ttl": 3600, "oneShot": true}))
        .await;
    let file_id = server
        .new_file(&upload_id, &upload_token, "a.txt", b"0123456789")
        .await;

    let base = server.serve().await;
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let url = format!("{base}/upload/{upload_id}/file/{file_id}");

    let first = client
        .get(&url)
        .header("user-agent", CLI_AGENT)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 200);
    assert_eq!(first.bytes().await.unwrap().as_ref(), b"0123456789");

    let second = client
        .get(&url)
        .header("user-agent", CLI_AGENT)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 401);

    let json = server.get(&format!("/upload/{upload_id}")).await.json();
    assert_eq!(json["files"][file_id.as_str()]["status"], "downloaded");
    let file_id = FileId::parse(&file_id).unwrap();
    let upload_id = UploadId::parse(&upload_id).unwrap();
    assert!(server.state.storage.read_file(&upload_id, &file_id).await.is_err());
}

#[tokio::test]
async fn test_aborted_one_shot_download_stays_available() {
    let server = TestServer::new().await;
    let (upload_id, upload_token) = server.new_upload(json!({"oneShot": true})).await;
    // Far more than loopback socket buffers hold.
    let data = vec![b'x'; 32 * 1024 * 1024];
    let file_id = server
        .new_file(&upload_id, &upload_token, "big.bin", &data)
        .await;

    let base = server.serve().await;
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let url = format!("{base}/upload/{upload_id}/file/{file_id}");

    let mut response = client
        .get(&url)
        .header("user-agent", CLI_AGENT)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let first = response.chunk().await.unwrap().unwrap();
    assert!(first.len() < data.len());
    drop(response);
    drop(client);

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let json = server.get(&format!("/upload/{upload_id}")).await.json();
    assert_eq!(json["files"][file_id.as_str()]["status"], "uploaded");

    let response = server
        .get(&format!("/upload/{upload_id}/file/{file_id}"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.len(), data.len());
}

#[tokio::test]
async fn test_head_does_not_consume_one_shot() {
    let server = TestServer::new().await;
    let (upload_id, upload_token) = server.new_upload(json!({"oneShot": true})).await;
    let file_id = server
        .new_file(&upload_id, &upload_token, "a.txt", b"0123456789")
        .await;
    let uri = format!("/file/{upload_id}/{file_id}/a.txt");

    let response = server
        .send(
            Request::head(uri.as_str())
                .header("user-agent", CLI_AGENT)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-length"), Some("10"));
    assert!(response.body.is_empty());

    let response = server.get(&uri).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"0123456789");
}

#[tokio::test]
async fn test_pretty_link_name_must_match() {
    let server = TestServer::new().await;
    let (upload_id, upload_token) = server.new_upload(json!({})).await;
    let file_id = server
        .new_file(&upload_id, &upload_token, "a.txt", b"data")
        .await;

    let response = server
        .get(&format!("/file/{upload_id}/{file_id}/b.txt"))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = server
        .get(&format!("/file/{upload_id}/0123456789abcdef/a.txt"))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_browser_errors_redirect_to_web_client() {
    let server = TestServer::new().await;
    let (upload_id, _) = server.new_upload(json!({})).await;

    let response = server
        .send(
            Request::get(format!("/file/{upload_id}/0123456789abcdef/a.txt"))
                .header("user-agent", "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
    let location = response.header("location").unwrap();
    assert!(location.starts_with("/#/?err="));
    assert!(location.contains("errcode=404"));
}

#[tokio::test]
async fn test_password_protected_upload() {
    let server = TestServer::new().await;

    let response = server
        .create_upload(json!({"login": "alice", "password": "secret"}))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let authorization = response.header("authorization").unwrap().to_string();
    assert_eq!(authorization, "Basic YWxpY2U6c2VjcmV0");

    let json = response.json();
    assert_eq!(json["protectedByPassword"], true);
    assert_eq!(json["login"], "alice");
    assert!(json.get("password").is_none());
    let upload_id = json["id"].as_str().unwrap().to_string();
    let upload_token = json["uploadToken"].as_str().unwrap().to_string();

    // Adding files needs the credentials too.
    let response = server
        .add_file(&upload_id, &upload_token, "a.txt", b"data")
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    let response = server
        .add_file_as(&upload_id, &upload_token, "a.txt", b"data", Some(&authorization))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let file_id = response.json()["id"].as_str().unwrap().to_string();

    let uri = format!("/file/{upload_id}/{file_id}/a.txt");
    // Browsers get the challenge too, never a redirect.
    let response = server
        .send(
            Request::get(uri.as_str())
                .header("user-agent", "Mozilla/5.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.header("www-authenticate"),
        Some("Basic realm=\"ferry\"")
    );

    let response = server
        .send(
            Request::get(uri.as_str())
                .header("user-agent", CLI_AGENT)
                .header("authorization", "Basic YWxpY2U6d3Jvbmc=")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = server
        .send(
            Request::get(uri.as_str())
                .header("user-agent", CLI_AGENT)
                .header("authorization", authorization.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"data");

    let response = server.get(&format!("/upload/{upload_id}")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_password_without_login_uses_default_login() {
    let server = TestServer::new().await;

    let response = server.create_upload(json!({"password": "secret"})).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["login"], "ferry");
    assert_eq!(
        response.header("authorization"),
        Some("Basic ZmVycnk6c2VjcmV0")
    );
}

#[tokio::test]
async fn test_remove_file() {
    let server = TestServer::new().await;
    let (upload_id, upload_token) = server.new_upload(json!({"removable": true})).await;
    let file_id = server
        .new_file(&upload_id, &upload_token, "a.txt", b"data")
        .await;
    let uri = format!("/upload/{upload_id}/file/{file_id}");

    let delete = || {
        Request::delete(uri.as_str())
            .body(Body::empty())
            .unwrap()
    };

    let response = server.send(delete()).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["status"], "removed");

    // Removing again is harmless.
    let response = server.send(delete()).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = server.get(&uri).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    // The upload itself survives its last file.
    let response = server.get(&format!("/upload/{upload_id}")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["files"][file_id.as_str()]["status"], "removed");
}

#[tokio::test]
async fn test_remove_file_requires_removable_upload() {
    let server = TestServer::new().await;
    let (upload_id, upload_token) = server.new_upload(json!({})).await;
    let file_id = server
        .new_file(&upload_id, &upload_token, "a.txt", b"data")
        .await;

    let response = server
        .send(
            Request::delete(format!("/upload/{upload_id}/file/{file_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = server
        .get(&format!("/upload/{upload_id}/file/{file_id}"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_expired_upload_is_not_found() {
    let server = TestServer::new().await;
    let (upload_id, upload_token) = server.new_upload(json!({"ttl": 1})).await;
    let file_id = server
        .new_file(&upload_id, &upload_token, "a.txt", b"data")
        .await;

    tokio::time::sleep(std::time::Duration::from_millis(2100)).await;

    let response = server.get(&format!("/upload/{upload_id}")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = server
        .get(&format!("/file/{upload_id}/{file_id}/a.txt"))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = server
        .add_file(&upload_id, &upload_token, "b.txt", b"late")
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_token_protected_upload() {
    let server = TestServer::with_validator(Arc::new(StaticValidator {
        accepted: vec![TOKEN.to_string()],
    }))
    .await;

    let response = server.create_upload(json!({"token": "too-short"})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let stale = format!("{}{}", &TOKEN[..12], "x".repeat(32));
    let response = server.create_upload(json!({"token": stale})).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = server.create_upload(json!({"token": TOKEN})).await;
    assert_eq!(response.status, StatusCode::OK);
    let json = response.json();
    assert_eq!(json["protectedByToken"], true);
    assert!(json.get("tokenPrefix").is_none());
    let upload_id = json["id"].as_str().unwrap().to_string();
    let upload_token = json["uploadToken"].as_str().unwrap().to_string();

    let file_id = server
        .new_file(&upload_id, &upload_token, "a.txt", b"data")
        .await;

    let response = server
        .get(&format!("/upload/{upload_id}/file/{file_id}"))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    // Another device's token fails the prefix check.
    let other_device = format!("{}{}", "d".repeat(12), &TOKEN[12..]);
    let response = server
        .get(&format!(
            "/upload/{upload_id}/file/{file_id}?token={other_device}"
        ))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = server
        .get(&format!("/upload/{upload_id}/file/{file_id}?token={TOKEN}"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"data");

    let response = server
        .get(&format!("/file/{upload_id}/{file_id}/a.txt/token/{TOKEN}"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"data");
}

#[tokio::test]
async fn test_health_and_config() {
    let server = TestServer::with_config(|config| {
        config.server.max_file_size = 1024;
        config.server.max_ttl_secs = 86400;
        config.server.default_ttl_secs = 3600;
    })
    .await;

    let response = server.get("/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["status"], "ok");

    let response = server.get("/config").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({
            "maxFileSize": 1024,
            "maxTtl": 86400,
            "defaultTtl": 3600,
            "tokenProtection": false,
        })
    );
}

#[tokio::test]
async fn test_metrics_endpoint_can_be_disabled() {
    let server = TestServer::with_config(|config| {
        config.server.metrics_enabled = false;
    })
    .await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

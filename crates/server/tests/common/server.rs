//! Server test utilities.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use ferry_core::config::{AppConfig, MetadataConfig, StorageConfig};
use ferry_metadata::{MetadataStore, SqliteStore};
use ferry_server::auth::AccessError;
use ferry_server::validator::{DisabledValidator, TokenValidator};
use ferry_server::{AppState, create_router};
use ferry_storage::{DataBackend, FilesystemBackend};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Multipart boundary used by [`multipart_body`].
pub const BOUNDARY: &str = "ferry-test-boundary";

/// User agent of a command-line client, which never gets redirected.
pub const CLI_AGENT: &str = "curl/8.5.0";

/// Validator accepting a fixed set of one-time tokens.
#[allow(dead_code)]
pub struct StaticValidator {
    pub accepted: Vec<String>,
}

#[async_trait]
impl TokenValidator for StaticValidator {
    async fn validate(&self, token: &str) -> Result<bool, AccessError> {
        Ok(self.accepted.iter().any(|t| t == token))
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// A buffered response.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, Arc::new(DisabledValidator)).await
    }

    /// Create a test server offering token protection through `validator`.
    pub async fn with_validator(validator: Arc<dyn TokenValidator>) -> Self {
        Self::build(|_| {}, validator).await
    }

    async fn build<F>(modifier: F, validator: Arc<dyn TokenValidator>) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("files");
        let storage: Arc<dyn DataBackend> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem { path: storage_path };
        config.metadata = MetadataConfig::Sqlite {
            path: db_path,
            query_timeout_secs: None,
        };
        modifier(&mut config);

        let state = AppState::new(config, storage, metadata, validator);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Serve the router on an ephemeral loopback port, returning its base URL.
    pub async fn serve(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = self
            .router
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Send a request and buffer the whole response.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// GET `uri` as a command-line client.
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(
            Request::get(uri)
                .header("user-agent", CLI_AGENT)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// POST /upload with a JSON body, returning the response.
    pub async fn create_upload(&self, options: Value) -> TestResponse {
        self.send(
            Request::post("/upload")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&options).unwrap()))
                .unwrap(),
        )
        .await
    }

    /// Create an upload and return its id and upload token.
    pub async fn new_upload(&self, options: Value) -> (String, String) {
        let response = self.create_upload(options).await;
        assert_eq!(response.status, StatusCode::OK, "create failed: {:?}", response.json());
        let json = response.json();
        (
            json["id"].as_str().unwrap().to_string(),
            json["uploadToken"].as_str().unwrap().to_string(),
        )
    }

    /// POST one file to an upload, optionally with Basic credentials.
    pub async fn add_file_as(
        &self,
        upload_id: &str,
        upload_token: &str,
        name: &str,
        data: &[u8],
        authorization: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::post(format!("/upload/{upload_id}/file"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header("x-uploadtoken", upload_token);
        if let Some(value) = authorization {
            builder = builder.header("authorization", value);
        }
        self.send(builder.body(Body::from(multipart_body(name, data))).unwrap())
            .await
    }

    /// POST one file to an unprotected upload.
    pub async fn add_file(
        &self,
        upload_id: &str,
        upload_token: &str,
        name: &str,
        data: &[u8],
    ) -> TestResponse {
        self.add_file_as(upload_id, upload_token, name, data, None)
            .await
    }

    /// Add a file and return its id.
    pub async fn new_file(
        &self,
        upload_id: &str,
        upload_token: &str,
        name: &str,
        data: &[u8],
    ) -> String {
        let response = self.add_file(upload_id, upload_token, name, data).await;
        assert_eq!(response.status, StatusCode::OK, "add failed: {:?}", response.json());
        response.json()["id"].as_str().unwrap().to_string()
    }
}

/// Build a multipart body with a single `file` part.
pub fn multipart_body(name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

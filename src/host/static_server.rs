//! Per-project static file server.
//!
//! Each running project gets one of these: an axum server bound to the
//! project's port that maps request paths onto files under the project
//! directory.
//!
//! ## Request mapping
//!
//! | Request path        | File served                          |
//! |---------------------|--------------------------------------|
//! | `/`                 | `<root>/index.html`                  |
//! | `/docs/`            | `<root>/docs/index.html`             |
//! | `/docs` (a dir)     | `<root>/docs/index.html`             |
//! | `/css/app.css`      | `<root>/css/app.css`                 |
//! | `/../etc/passwd`    | 404, never leaves `<root>`           |
//!
//! Missing files answer `404 File not found`; any other read failure answers
//! `500 Server error`.
//!
//! ## Lifecycle
//!
//! [`StaticServer::start`] binds the listener before returning, so a bind
//! failure is reported to the caller instead of being lost in a background
//! task. [`ServerHandle::stop`] signals graceful shutdown and waits for the
//! server task to finish, which means the listener is closed and the port is
//! free by the time it returns.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use super::workspace::{INDEX_FILE, contain, sanitize_relative};
use crate::errors::{HostError, HostResult};

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Content type for a served file.
///
/// The common web types come from a fixed table; anything else is looked up
/// with `mime_guess`. Files without an extension are served as HTML.
pub fn content_type_for(path: &Path) -> String {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_ascii_lowercase(),
        None => return "text/html".to_string(),
    };
    let known = match ext.as_str() {
        "html" | "htm" => Some("text/html"),
        "css" => Some("text/css"),
        "js" | "mjs" => Some("text/javascript"),
        "json" => Some("application/json"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    };
    match known {
        Some(ct) => ct.to_string(),
        None => mime_guess::from_ext(&ext).first_or_octet_stream().to_string(),
    }
}

#[derive(Clone)]
struct ServeState {
    root: Arc<PathBuf>,
}

/// Router serving files from `root`. `root` must be canonical.
fn build_router(root: PathBuf) -> Router {
    Router::new()
        .fallback(serve_file)
        .layer(TraceLayer::new_for_http())
        .with_state(ServeState {
            root: Arc::new(root),
        })
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain")],
        "File not found",
    )
        .into_response()
}

fn is_missing(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

fn read_failure(path: &Path, err: &std::io::Error) -> Response {
    if is_missing(err) {
        return not_found();
    }
    tracing::error!(path = %path.display(), error = %err, "Error reading file");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/plain")],
        "Server error",
    )
        .into_response()
}

/// Map a raw request path onto a file under `root`.
///
/// `Ok(None)` means the request does not name a servable file, either
/// because it does not exist or because it would escape the root.
async fn resolve_request(root: &Path, raw_path: &str) -> std::io::Result<Option<PathBuf>> {
    let Ok(decoded) = percent_decode_str(raw_path).decode_utf8() else {
        return Ok(None);
    };
    let Some(clean) = sanitize_relative(&decoded) else {
        return Ok(None);
    };

    let mut candidate = root.join(&clean);
    if clean.as_os_str().is_empty() || decoded.ends_with('/') {
        candidate.push(INDEX_FILE);
    }

    let resolved = match contain(root, &candidate).await {
        Ok(Some(path)) => path,
        Ok(None) => return Ok(None),
        Err(e) if is_missing(&e) => return Ok(None),
        Err(e) => return Err(e),
    };

    if tokio::fs::metadata(&resolved).await?.is_dir() {
        return match contain(root, &resolved.join(INDEX_FILE)).await {
            Ok(found) => Ok(found),
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(e),
        };
    }
    Ok(Some(resolved))
}

async fn serve_file(State(state): State<ServeState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, HEAD")],
            "Method not allowed",
        )
            .into_response();
    }

    let path = match resolve_request(&state.root, uri.path()).await {
        Ok(Some(path)) => path,
        Ok(None) => return not_found(),
        Err(e) => return read_failure(&state.root.join(uri.path().trim_start_matches('/')), &e),
    };

    match tokio::fs::read(&path).await {
        Ok(content) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type_for(&path))],
            content,
        )
            .into_response(),
        Err(e) => read_failure(&path, &e),
    }
}

/// Builder for a project's static server.
#[derive(Debug, Clone)]
pub struct StaticServer {
    root: PathBuf,
    bind_host: String,
    stop_timeout: Duration,
}

impl StaticServer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bind_host: "0.0.0.0".to_string(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Bind `port` and start serving. Port `0` picks an ephemeral port.
    ///
    /// # Errors
    ///
    /// `ServerStartFailure` if the listener cannot bind, `IoFailure` if the
    /// root directory cannot be resolved.
    pub async fn start(self, port: u16) -> HostResult<ServerHandle> {
        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| HostError::io(&self.root, e))?;

        let listener = TcpListener::bind((self.bind_host.as_str(), port))
            .await
            .map_err(|source| HostError::ServerStartFailure { port, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| HostError::ServerStartFailure { port, source })?;

        tracing::debug!(%addr, root = %root.display(), "Static server listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = build_router(root);

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                tracing::error!(%addr, error = %e, "Static server error");
            }
        });

        Ok(ServerHandle {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
            stop_timeout: self.stop_timeout,
        })
    }
}

/// A running static server. Owned by the server registry.
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    stop_timeout: Duration,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Shut the server down and wait for its listener to close.
    ///
    /// Safe to call more than once; later calls return immediately. If
    /// in-flight connections do not drain within the stop timeout the server
    /// task is aborted.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let Some(mut task) = self.task.take() else {
            return;
        };
        if tokio::time::timeout(self.stop_timeout, &mut task)
            .await
            .is_err()
        {
            tracing::warn!(addr = %self.addr, "Static server did not drain in time, aborting");
            task.abort();
            let _ = task.await;
        }
        tracing::debug!(addr = %self.addr, "Static server stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn site() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("site");
        std::fs::create_dir_all(root.join("css")).unwrap();
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(root.join("css/app.css"), "body { color: red; }").unwrap();
        std::fs::write(root.join("docs/index.html"), "<h1>docs</h1>").unwrap();
        std::fs::write(root.join("data.json"), r#"{"ok":true}"#).unwrap();
        std::fs::write(root.join("README"), "plain").unwrap();
        std::fs::write(tmp.path().join("secret.txt"), "top secret").unwrap();
        let root = root.canonicalize().unwrap();
        (tmp, root)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let ct = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = resp.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, ct, body)
    }

    fn http_client() -> reqwest::Client {
        reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_content_type_table() {
        let cases = [
            ("index.html", "text/html"),
            ("site.css", "text/css"),
            ("app.js", "text/javascript"),
            ("data.json", "application/json"),
            ("logo.png", "image/png"),
            ("photo.jpg", "image/jpeg"),
            ("PHOTO.JPEG", "image/jpeg"),
            ("README", "text/html"),
            ("archive.unknownext", "application/octet-stream"),
        ];
        for (file, expected) in cases {
            assert_eq!(content_type_for(Path::new(file)), expected, "for {}", file);
        }
    }

    #[test]
    fn test_content_type_falls_back_to_mime_guess() {
        assert_eq!(content_type_for(Path::new("icon.svg")), "image/svg+xml");
    }

    #[tokio::test]
    async fn test_root_serves_index() {
        let (_tmp, root) = site();
        let (status, ct, body) = get(build_router(root), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ct.as_deref(), Some("text/html"));
        assert_eq!(body, b"<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_nested_file_with_content_type() {
        let (_tmp, root) = site();
        let (status, ct, body) = get(build_router(root.clone()), "/css/app.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ct.as_deref(), Some("text/css"));
        assert_eq!(body, b"body { color: red; }");

        let (_, ct, _) = get(build_router(root), "/data.json?cache=1").await;
        assert_eq!(ct.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_directory_serves_its_index() {
        let (_tmp, root) = site();
        let (status, _, body) = get(build_router(root.clone()), "/docs/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<h1>docs</h1>");

        let (status, _, body) = get(build_router(root), "/docs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<h1>docs</h1>");
    }

    #[tokio::test]
    async fn test_directory_without_index_is_404() {
        let (_tmp, root) = site();
        let (status, _, _) = get(build_router(root), "/css/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_file_is_plain_404() {
        let (_tmp, root) = site();
        let (status, ct, body) = get(build_router(root), "/nope.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(ct.as_deref(), Some("text/plain"));
        assert_eq!(body, b"File not found");
    }

    #[tokio::test]
    async fn test_percent_encoded_paths() {
        let (_tmp, root) = site();
        std::fs::write(root.join("my page.html"), "spaced").unwrap();
        let (status, _, body) = get(build_router(root.clone()), "/my%20page.html").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"spaced");

        let (status, _, _) = get(build_router(root), "/%2e%2e/secret.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let (_tmp, root) = site();
        for uri in ["/../secret.txt", "/css/../../secret.txt", "/..%2fsecret.txt"] {
            let (status, _, body) = get(build_router(root.clone()), uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "for {}", uri);
            assert_ne!(body, b"top secret");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_root_is_rejected() {
        let (tmp, root) = site();
        std::os::unix::fs::symlink(tmp.path().join("secret.txt"), root.join("leak.txt")).unwrap();
        let (status, _, _) = get(build_router(root), "/leak.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_is_rejected() {
        let (_tmp, root) = site();
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let resp = build_router(root).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_read_failure_mapping() {
        let missing = std::io::Error::new(ErrorKind::NotFound, "gone");
        assert_eq!(
            read_failure(Path::new("/x"), &missing).status(),
            StatusCode::NOT_FOUND
        );
        let denied = std::io::Error::new(ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            read_failure(Path::new("/x"), &denied).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_start_serve_and_stop() {
        let (_tmp, root) = site();
        let mut handle = StaticServer::new(&root)
            .bind_host("127.0.0.1")
            .start(0)
            .await
            .unwrap();
        assert!(handle.is_running());
        let url = format!("http://{}/css/app.css", handle.addr());

        let resp = http_client().get(&url).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/css");
        assert_eq!(resp.bytes().await.unwrap().as_ref(), b"body { color: red; }");

        handle.stop().await;
        assert!(!handle.is_running());
        assert!(http_client().get(&url).send().await.is_err());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (_tmp, root) = site();
        let mut handle = StaticServer::new(&root)
            .bind_host("127.0.0.1")
            .start(0)
            .await
            .unwrap();
        handle.stop().await;
        handle.stop().await;
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_port_can_be_rebound_after_stop() {
        let (_tmp, root) = site();
        let mut first = StaticServer::new(&root)
            .bind_host("127.0.0.1")
            .start(0)
            .await
            .unwrap();
        let port = first.port();
        first.stop().await;

        let mut second = StaticServer::new(&root)
            .bind_host("127.0.0.1")
            .start(port)
            .await
            .unwrap();
        assert_eq!(second.port(), port);
        second.stop().await;
    }

    #[tokio::test]
    async fn test_bind_conflict_is_server_start_failure() {
        let (_tmp, root) = site();
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = blocker.local_addr().unwrap().port();

        let result = StaticServer::new(&root)
            .bind_host("127.0.0.1")
            .start(port)
            .await;
        match result {
            Err(HostError::ServerStartFailure { port: p, .. }) => assert_eq!(p, port),
            other => panic!("Expected ServerStartFailure, got {:?}", other.map(|h| h.addr())),
        }
    }

    #[tokio::test]
    async fn test_missing_root_is_io_failure() {
        let tmp = TempDir::new().unwrap();
        let result = StaticServer::new(tmp.path().join("absent")).start(0).await;
        assert!(matches!(result, Err(HostError::IoFailure { .. })));
    }
}

use std::convert::Infallible;
use std::io::Read;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use flate2::read::GzDecoder;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use serde_json::Value;
use tokio::net::TcpListener;
use url::Url;

#[derive(Debug, Clone)]
pub struct CollectedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    /// JSON body, gunzipped first when the request was compressed.
    pub body: Value,
}

#[derive(Clone)]
pub struct Collector {
    pub url: Url,
    requests: Arc<Mutex<Vec<CollectedRequest>>>,
    status: Arc<AtomicU16>,
}

impl Collector {
    /// Bind an in-process bulk endpoint on an OS-assigned port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind collector listener");
        let port = listener.local_addr().unwrap().port();

        let collector = Self {
            url: Url::parse(&format!("http://127.0.0.1:{port}")).unwrap(),
            requests: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(AtomicU16::new(200)),
        };

        let state = collector.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener
                    .accept()
                    .await
                    .expect("failed to accept connection");
                let state = state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let state = state.clone();
                        async move { state.handle(req).await }
                    });
                    let _ = Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        collector
    }

    /// Status code returned for subsequent requests.
    pub fn respond_with(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<CollectedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Wait until at least `min_expected` requests arrived or `timeout` passes.
    pub async fn wait_for(&self, min_expected: usize, timeout: Duration) -> Vec<CollectedRequest> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.requests.lock().unwrap().len() < min_expected
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.requests()
    }

    async fn handle<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
    {
        let method = req.method().to_string();
        let path = req.uri().path().to_owned();
        let (authorization, content_type, content_encoding) = {
            let header = |name: &str| {
                req.headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_owned())
            };
            (
                header("authorization"),
                header("content-type"),
                header("content-encoding"),
            )
        };

        let raw = req
            .collect()
            .await
            .map(|c| c.to_bytes())
            .unwrap_or_default();

        let body = if content_encoding.as_deref() == Some("gzip") {
            let mut decoded = Vec::new();
            GzDecoder::new(&raw[..])
                .read_to_end(&mut decoded)
                .expect("invalid gzip body");
            serde_json::from_slice(&decoded)
        } else {
            serde_json::from_slice(&raw)
        }
        .unwrap_or(Value::Null);

        self.requests.lock().unwrap().push(CollectedRequest {
            method,
            path,
            authorization,
            content_type,
            content_encoding,
            body,
        });

        let status = StatusCode::from_u16(self.status.load(Ordering::SeqCst))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Ok(Response::builder()
            .status(status)
            .body(Full::default())
            .unwrap())
    }
}

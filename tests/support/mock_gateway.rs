use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, RwLock},
    time::Duration,
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

#[derive(Clone)]
struct Route {
    status: u16,
    body: String,
    delay: Option<Duration>,
}

/// IPFS gateway stand-in: scripted responses per path plus a hit counter
/// for every path requested, scripted or not.
#[derive(Clone, Default)]
pub struct MockGateway {
    routes: Arc<RwLock<HashMap<String, Route>>>,
    hits: Arc<RwLock<HashMap<String, usize>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_document(&self, path: &str, document: Value) {
        self.set_route(
            path,
            Route {
                status: 200,
                body: document.to_string(),
                delay: None,
            },
        );
    }

    pub fn set_raw(&self, path: &str, status: u16, body: &str) {
        self.set_route(
            path,
            Route {
                status,
                body: body.to_owned(),
                delay: None,
            },
        );
    }

    pub fn set_delay(&self, path: &str, delay: Duration) {
        let mut routes = self.routes.write().expect("mock gateway poisoned");
        if let Some(route) = routes.get_mut(path) {
            route.delay = Some(delay);
        }
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .read()
            .expect("mock gateway poisoned")
            .get(path)
            .copied()
            .unwrap_or_default()
    }

    pub fn total_hits(&self) -> usize {
        self.hits.read().expect("mock gateway poisoned").values().sum()
    }

    fn set_route(&self, path: &str, route: Route) {
        self.routes
            .write()
            .expect("mock gateway poisoned")
            .insert(path.to_owned(), route);
    }

    fn record_hit(&self, path: &str) -> Option<Route> {
        *self
            .hits
            .write()
            .expect("mock gateway poisoned")
            .entry(path.to_owned())
            .or_default() += 1;
        self.routes
            .read()
            .expect("mock gateway poisoned")
            .get(path)
            .cloned()
    }
}

pub struct MockGatewayServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockGatewayServer {
    pub async fn start(gateway: MockGateway) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock gateway listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let gateway = gateway.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(gateway.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock gateway server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}/", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Base URL with a trailing slash, ready to use as the gateway URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(
    gateway: MockGateway,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::GET {
        let mut response = Response::new(Body::from("Unsupported method"));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return Ok(response);
    }

    let path = req.uri().path().to_owned();
    let Some(route) = gateway.record_hit(&path) else {
        let mut response = Response::new(Body::from("not found"));
        *response.status_mut() = StatusCode::NOT_FOUND;
        return Ok(response);
    };

    if let Some(delay) = route.delay {
        sleep(delay).await;
    }

    let mut response = Response::new(Body::from(route.body));
    *response.status_mut() =
        StatusCode::from_u16(route.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

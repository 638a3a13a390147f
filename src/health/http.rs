// ABOUTME: HTTP GET against a port on the target host, over an SSH tunnel or locally.
// ABOUTME: Speaks HTTP/1.1 with hyper on whatever byte stream the transport opens.

use crate::ssh::Session;
use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("cannot connect to port {port}: {reason}")]
    Connect { port: u16, reason: String },

    #[error("request failed: {0}")]
    Request(String),
}

/// A successful round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// `GET http://127.0.0.1:<port><path>` as seen from the target host.
    async fn get(&self, port: u16, path: &str) -> Result<HttpResponse, HttpError>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn get(&self, port: u16, path: &str) -> Result<HttpResponse, HttpError> {
        (**self).get(port, path).await
    }
}

/// Tunnels each request through a `direct-tcpip` channel.
pub struct SshHttp {
    session: Arc<Session>,
}

impl SshHttp {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl HttpTransport for SshHttp {
    async fn get(&self, port: u16, path: &str) -> Result<HttpResponse, HttpError> {
        let stream = self
            .session
            .open_tcp(port)
            .await
            .map_err(|e| HttpError::Connect {
                port,
                reason: e.to_string(),
            })?;
        send_get(stream, port, path).await
    }
}

/// Dials the port on this machine, for `target_server: local`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalHttp;

#[async_trait]
impl HttpTransport for LocalHttp {
    async fn get(&self, port: u16, path: &str) -> Result<HttpResponse, HttpError> {
        let stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .map_err(|e| HttpError::Connect {
                port,
                reason: e.to_string(),
            })?;
        send_get(stream, port, path).await
    }
}

async fn send_get<S>(stream: S, port: u16, path: &str) -> Result<HttpResponse, HttpError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| HttpError::Request(format!("HTTP handshake failed: {}", e)))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("probe connection closed: {}", e);
        }
    });

    let req = hyper::Request::builder()
        .method("GET")
        .uri(path)
        .header("Host", format!("127.0.0.1:{}", port))
        .header("User-Agent", concat!("slotctl/", env!("CARGO_PKG_VERSION")))
        .body(Empty::<bytes::Bytes>::new())
        .map_err(|e| HttpError::Request(format!("failed to build request: {}", e)))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| HttpError::Request(e.to_string()))?;
    let status = resp.status().as_u16();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| HttpError::Request(format!("failed to read response: {}", e)))?
        .to_bytes();

    Ok(HttpResponse {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn local_transport_reads_status_and_body() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 4\r\n\r\ndown")
                .await
                .unwrap();
        });

        let resp = LocalHttp.get(port, "/health").await.unwrap();
        assert_eq!(resp.status, 503);
        assert_eq!(resp.body, "down");
        assert!(!resp.is_success());
    }

    #[tokio::test]
    async fn closed_port_is_a_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(matches!(
            LocalHttp.get(port, "/health").await,
            Err(HttpError::Connect { .. })
        ));
    }
}

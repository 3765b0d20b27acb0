//! Test server wrapper that runs the proxy router on a random port

use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use claudeproxy_llm::{Adapter, GroqAdapter, XaiAdapter};
use claudeproxy_server::Server;
use claudeproxy_tools::{OsFamily, ToolRegistry};

/// A running proxy instance under test
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
}

impl TestServer {
    /// Start the proxy with an xAI adapter pointed at a mock backend
    pub async fn start_xai(backend_url: url::Url) -> anyhow::Result<Self> {
        let registry = Arc::new(ToolRegistry::for_os(OsFamily::Unix));
        let adapter = XaiAdapter::with_base_url(
            backend_url,
            SecretString::from("sk-test"),
            registry,
            false,
        )?;
        Self::start(Arc::new(adapter)).await
    }

    /// Start the proxy with a Groq adapter pointed at a mock backend
    pub async fn start_groq(backend_url: url::Url) -> anyhow::Result<Self> {
        let registry = Arc::new(ToolRegistry::for_os(OsFamily::Unix));
        let adapter = GroqAdapter::with_base_url(
            backend_url,
            SecretString::from("gsk-test"),
            registry,
            false,
        )?;
        Self::start(Arc::new(adapter)).await
    }

    /// Start the proxy around any adapter
    pub async fn start(adapter: Arc<dyn Adapter>) -> anyhow::Result<Self> {
        let router = Server::new(adapter, 0).into_router();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown,
            client: reqwest::Client::new(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

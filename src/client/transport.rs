use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Outcome of one HTTP exchange as seen by the protocol layer
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_status(
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn header(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Seam to the host's HTTP stack.
///
/// The worker never touches sockets itself; the host wires this trait to
/// whatever client it runs (and to its server-list failover strategy). An
/// implementation returns `Ok` for any HTTP status it received - transport
/// errors mean the exchange itself failed on every reachable server.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigTransport: Send + Sync {
    async fn http_get(
        &self,
        path: &str,
        headers: Vec<(String, String)>,
        params: Vec<(String, String)>,
        timeout: Duration,
    ) -> Result<HttpResponse>;

    async fn http_post(
        &self,
        path: &str,
        headers: Vec<(String, String)>,
        params: Vec<(String, String)>,
        timeout: Duration,
    ) -> Result<HttpResponse>;
}

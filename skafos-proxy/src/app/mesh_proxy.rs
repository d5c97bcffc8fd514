use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use log::{error, info};
use pingora::prelude::HttpPeer;
use pingora::proxy::{ProxyHttp, Session};

use crate::engine::{parse_host_port, CompiledConfig};

/// Per-request state: the resolved destination, computed once in
/// `upstream_peer` and reused by `upstream_request_filter` so the
/// round-robin cursor only advances once per request.
#[derive(Default)]
pub struct RequestCtx {
    destination: Option<String>,
}

/// The data-plane `ProxyHttp` implementation. Holds a copy-on-write pointer
/// to the compiled rule table; the config-push server swaps it atomically,
/// readers on the request path never block.
pub struct MeshProxy {
    rules: Arc<ArcSwap<CompiledConfig>>,
}

impl MeshProxy {
    pub fn new(rules: Arc<ArcSwap<CompiledConfig>>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl ProxyHttp for MeshProxy {
    type CTX = RequestCtx;

    fn new_ctx(&self) -> Self::CTX {
        RequestCtx::default()
    }

    /// Rejects any request whose protocol doesn't begin with `HTTP`, per
    /// the forwarding pipeline's first step. Anything else is allowed
    /// through to `upstream_peer`.
    async fn request_filter(
        &self,
        session: &mut Session,
        _ctx: &mut Self::CTX,
    ) -> pingora::Result<bool> {
        let version = format!("{:?}", session.req_header().version);
        if !version.to_uppercase().starts_with("HTTP") {
            session.respond_error_with_body(502, "only http is supported".into()).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Resolves the upstream peer by parsing the `Host` header and looking
    /// it up in the compiled rule table. An unparseable port is rejected
    /// with a 502, matching the "invalid port" scenario.
    async fn upstream_peer(
        &self,
        session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> pingora::Result<Box<HttpPeer>> {
        let host_header = session
            .req_header()
            .headers
            .get("host")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let (host, port) = match parse_host_port(&host_header) {
            Ok(hp) => hp,
            Err(msg) => {
                session.respond_error_with_body(502, msg.into()).await?;
                return Err(pingora::Error::new_str("invalid request port"));
            }
        };

        let headers: Vec<(String, String)> = session
            .req_header()
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let dest = self.rules.load().lookup(&host, port, &headers);
        ctx.destination = Some(dest.clone());
        Ok(Box::new(HttpPeer::new(dest, false, "".to_string())))
    }

    /// Rewrites the `Host` header to the resolved upstream before the
    /// request is forwarded, per forwarding pipeline step 4. Pingora
    /// already rewrites the connection-level destination from the peer
    /// returned by `upstream_peer`; this only needs to fix up the header
    /// the upstream actually sees.
    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut pingora::http::RequestHeader,
        ctx: &mut Self::CTX,
    ) -> pingora::Result<()> {
        if let Some(dest) = &ctx.destination {
            upstream_request.insert_header("Host", dest)?;
        }
        Ok(())
    }

    async fn logging(&self, session: &mut Session, e: Option<&pingora::Error>, _ctx: &mut Self::CTX) {
        if let Some(err) = e {
            error!("upstream error: {err}");
            return;
        }
        let status = session.response_written().map_or(0, |resp| resp.status.as_u16());
        info!("response status: {status}");
    }
}

/// Produces the opaque key partitioning rate limits between clients.
///
/// Returning `None` means the request carries no usable identity; the
/// service surfaces that as [`DripError::Key`](crate::DripError::Key)
/// rather than guessing a bucket.
pub trait KeyExtractor<Req>: Send + Sync {
    /// The key for `req`, if one can be derived.
    fn extract(&self, req: &Req) -> Option<String>;
}

impl<Req, F> KeyExtractor<Req> for F
where
    F: Fn(&Req) -> Option<String> + Send + Sync,
{
    fn extract(&self, req: &Req) -> Option<String> {
        self(req)
    }
}

/// Keys requests by client network address, the default for http
/// servers.
///
/// Reads `ConnectInfo` from the request extensions, so the app must be
/// served with `into_make_service_with_connect_info::<SocketAddr>()`.
#[cfg(feature = "axum")]
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerAddrKey;

#[cfg(feature = "axum")]
impl<B> KeyExtractor<http::Request<B>> for PeerAddrKey {
    fn extract(&self, req: &http::Request<B>) -> Option<String> {
        use std::net::SocketAddr;

        use axum::extract::ConnectInfo;

        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    }
}

use api_client::Authentication;
use http::header::{HeaderValue, InvalidHeaderValue};
use credentials::Secret;

/// `Authorization: <scheme> <token>` for registry calls.
///
/// The header is only sent when both a scheme and a token are configured and
/// non-empty, so an unconfigured registry is called anonymously.
#[derive(Debug, Clone, Default)]
pub struct SchemeAuth {
    scheme: Option<String>,
    token: Option<Secret>,
}

impl SchemeAuth {
    /// Authenticate with `scheme` and `token`, if both are present.
    pub fn new(scheme: Option<String>, token: Option<Secret>) -> Self {
        Self { scheme, token }
    }

    /// Authenticate with a bearer token.
    pub fn bearer<T: Into<Secret>>(token: T) -> Self {
        Self::new(Some("Bearer".into()), Some(token.into()))
    }

    /// Send no credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The `Authorization` value to send, `None` when unconfigured.
    ///
    /// Fails when the scheme or token cannot appear in a header.
    pub fn header_value(&self) -> Result<Option<HeaderValue>, InvalidHeaderValue> {
        match (&self.scheme, &self.token) {
            (Some(scheme), Some(token)) if self.is_configured() => {
                token.with_scheme(scheme).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// True when a header will be attached.
    pub fn is_configured(&self) -> bool {
        matches!(
            (&self.scheme, &self.token),
            (Some(scheme), Some(token)) if !scheme.is_empty() && !token.is_empty()
        )
    }
}

impl Authentication for SchemeAuth {
    fn authenticate<B>(&self, mut req: http::Request<B>) -> http::Request<B> {
        if req.headers().contains_key(http::header::AUTHORIZATION) {
            tracing::warn!("{} header already set", http::header::AUTHORIZATION);
            return req;
        }

        match self.header_value() {
            Ok(Some(value)) => {
                req.headers_mut().append(http::header::AUTHORIZATION, value);
            }
            Ok(None) => {}
            Err(_) => tracing::error!("registry credentials are not a valid header value"),
        }
        req
    }
}

//! Request authentication.
//!
//! Each backend decides how it signs requests by implementing [`Authentication`].
//! The client keeps the current value behind an [`ArcSwap`], so credentials can
//! be rotated while requests are in flight.

use std::sync::Arc;
use std::task::{Context, Poll};

use arc_swap::ArcSwap;
use tower::layer::Layer;

/// Signs outgoing requests.
pub trait Authentication: Clone {
    /// Attach credentials to `req`.
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B>;
}

/// Anonymous access.
impl Authentication for () {
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B> {
        req
    }
}

/// Wraps a service so every request passes through the current [`Authentication`].
#[derive(Debug)]
pub struct AuthLayer<A> {
    current: Arc<ArcSwap<A>>,
}

impl<A> AuthLayer<A> {
    pub(crate) fn new(current: Arc<ArcSwap<A>>) -> Self {
        Self { current }
    }
}

impl<A> Clone for AuthLayer<A> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.current))
    }
}

impl<A, S> Layer<S> for AuthLayer<A> {
    type Service = AuthService<A, S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            current: Arc::clone(&self.current),
        }
    }
}

/// Service produced by [`AuthLayer`].
#[derive(Debug)]
pub struct AuthService<A, S> {
    inner: S,
    current: Arc<ArcSwap<A>>,
}

impl<A, S: Clone> Clone for AuthService<A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            current: Arc::clone(&self.current),
        }
    }
}

impl<A, S, ReqBody> tower::Service<http::Request<ReqBody>> for AuthService<A, S>
where
    A: Authentication,
    S: tower::Service<http::Request<ReqBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        let signed = self.current.load().authenticate(req);
        self.inner.call(signed)
    }
}

#[cfg(test)]
mod tests {
    use tower::{Service as _, ServiceExt as _};

    use super::*;

    #[derive(Debug, Clone)]
    struct Marker(&'static str);

    impl Authentication for Marker {
        fn authenticate<B>(&self, mut req: http::Request<B>) -> http::Request<B> {
            req.headers_mut().insert(
                http::header::AUTHORIZATION,
                http::HeaderValue::from_static(self.0),
            );
            req
        }
    }

    #[tokio::test]
    async fn swapped_credentials_apply_to_later_requests() {
        let current = Arc::new(ArcSwap::new(Arc::new(Marker("first"))));
        let echo = tower::service_fn(|req: http::Request<()>| async move {
            Ok::<_, std::convert::Infallible>(req.headers().get(http::header::AUTHORIZATION).cloned())
        });
        let mut service = AuthLayer::new(current.clone()).layer(echo);

        let seen = service.ready().await.unwrap().call(http::Request::new(())).await.unwrap();
        assert_eq!(seen.unwrap(), "first");

        current.store(Arc::new(Marker("second")));
        let seen = service.ready().await.unwrap().call(http::Request::new(())).await.unwrap();
        assert_eq!(seen.unwrap(), "second");
    }
}

//! Conversions between `url::Url` and `http::Uri`, and joining endpoints onto a base.

use camino::Utf8Path;
use http::uri::PathAndQuery;
use http::Uri;
use thiserror::Error;
use url::Url;

/// A string or URL could not be used as a request base.
#[derive(Debug, Error)]
pub enum ParseUriError {
    /// Not a URL at all.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// A URL such as `mailto:` which has no path to join onto.
    #[error("cannot be a base URL: {0}")]
    CannotBeABase(Url),

    /// A valid URL which `http::Uri` still rejects.
    #[error("invalid URI: {0}")]
    Invalid(#[from] http::uri::InvalidUri),
}

/// Values which name an HTTP endpoint.
pub trait IntoUri {
    /// Convert to an `http::Uri`.
    fn into_uri(self) -> Result<Uri, ParseUriError>;
}

impl IntoUri for Url {
    fn into_uri(self) -> Result<Uri, ParseUriError> {
        if self.cannot_be_a_base() {
            return Err(ParseUriError::CannotBeABase(self));
        }
        Ok(self.as_str().parse()?)
    }
}

impl IntoUri for &str {
    fn into_uri(self) -> Result<Uri, ParseUriError> {
        Url::parse(self)?.into_uri()
    }
}

impl IntoUri for Uri {
    fn into_uri(self) -> Result<Uri, ParseUriError> {
        Ok(self)
    }
}

/// Path joining for `http::Uri`.
pub trait UriExtension {
    /// Join `path` onto this URI's path, the way a filesystem path joins.
    ///
    /// An absolute `path` replaces the base path. Any query on the base is dropped.
    fn join<P: AsRef<str>>(self, path: P) -> Uri;
}

impl UriExtension for Uri {
    fn join<P: AsRef<str>>(self, path: P) -> Uri {
        let base = self.path();
        let joined = Utf8Path::new(if base.is_empty() { "/" } else { base }).join(path.as_ref());

        let mut parts = self.clone().into_parts();
        let Ok(path_and_query) = PathAndQuery::from_maybe_shared(joined.into_string()) else {
            tracing::warn!(uri = %self, "joined path is not a valid URI path");
            return self;
        };
        parts.path_and_query = Some(path_and_query);
        Uri::from_parts(parts).unwrap_or(self)
    }
}

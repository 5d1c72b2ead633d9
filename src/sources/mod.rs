//! # Sources
//!
//! Turning a user locator (URL or free text) into a playable stream.
//!
//! [`Resolver`] is the seam: [`youtube::YtDlpResolver`] implements it in
//! production and tests plug in fakes. The playback core never calls a
//! resolver directly; it goes through [`ResolutionAdapter`], which bounds every
//! call with the configured timeout and rejects streams that cannot be played.
//! The same adapter serves `/search`, which lists candidates instead of
//! picking the first one.

pub mod youtube;

use async_trait::async_trait;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, warn};
use url::Url;

use crate::error::ResolveError;

pub use youtube::YtDlpResolver;

/// Metadata y URL de stream devueltas por un resolutor.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub stream_url: String,
    pub title: String,
    pub duration: Option<Duration>,
    pub uploader: Option<String>,
    pub webpage_url: Option<String>,
    pub thumbnail: Option<String>,
}

/// Un candidato de `/search`. `url` es la página, no el stream: la pista se
/// resuelve de nuevo al encolarla.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
    pub uploader: Option<String>,
}

/// Trait común para los resolutores de música
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resuelve una URL o búsqueda a un único stream reproducible.
    async fn resolve(&self, locator: &str) -> Result<ResolvedTrack, ResolveError>;

    /// Hasta `limit` candidatos para una búsqueda de texto.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ResolveError>;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}

/// Envoltura con límite de tiempo alrededor de un [`Resolver`].
#[derive(Clone)]
pub struct ResolutionAdapter {
    inner: Arc<dyn Resolver>,
    timeout: Duration,
}

impl ResolutionAdapter {
    pub fn new(inner: Arc<dyn Resolver>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub async fn resolve(&self, locator: &str) -> Result<ResolvedTrack, ResolveError> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(ResolveError::NotFound);
        }

        debug!("🔍 Resolviendo con {}: {}", self.inner.source_name(), locator);

        let resolved = self.bounded(locator, self.inner.resolve(locator)).await?;

        if !is_playable_stream_url(&resolved.stream_url) {
            return Err(ResolveError::Unplayable(format!(
                "URL de audio no válida para `{}`",
                resolved.title
            )));
        }

        Ok(resolved)
    }

    /// Candidatos enlazables para `query`; una lista vacía es `NotFound`.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, ResolveError> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Err(ResolveError::NotFound);
        }

        debug!("🔍 Buscando con {}: {}", self.inner.source_name(), query);

        let mut results = self.bounded(query, self.inner.search(query, limit)).await?;
        results.retain(|result| is_url(&result.url));
        results.truncate(limit);

        if results.is_empty() {
            return Err(ResolveError::NotFound);
        }
        Ok(results)
    }

    async fn bounded<T>(
        &self,
        what: &str,
        call: impl Future<Output = Result<T, ResolveError>>,
    ) -> Result<T, ResolveError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                warn!("⏰ Timeout resolviendo {} tras {:?}", what, self.timeout);
                ResolveError::Timeout(self.timeout)
            })?
    }
}

/// ¿El locator es una URL http(s) en lugar de una búsqueda?
pub fn is_url(locator: &str) -> bool {
    Url::parse(locator.trim())
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

/// Una URL de stream sirve si es http(s) y no apunta a una playlist.
pub fn is_playable_stream_url(stream_url: &str) -> bool {
    is_url(stream_url) && !stream_url.to_lowercase().contains("playlist")
}

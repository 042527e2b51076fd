//! Source resolution and metadata caching
//!
//! [`Resolver`] is the single process-wide component that owns both caches.
//! Share it between screens with an `Arc`; every method blocks on the
//! network and must only run on producer threads.

pub mod cache;
pub mod redirect;

use std::sync::Arc;
use std::time::Duration;

pub use cache::{MetaCache, ResolvedMeta, TtlCache, META_TTL, RESOLVER_TTL};
pub use redirect::{HttpProbe, ProbeResponse, RedirectFollower, UreqProbe};

use crate::error::ResolveError;

/// Output of an external resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Directly decodable URL
    pub url: String,
    /// Duration reported by the resolver, 0 when unknown
    pub duration_hint_ms: i64,
}

/// Turns an indirect link (a video-sharing page) into a stream URL
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, url: &str) -> Result<Resolved, ResolveError>;
}

/// Whether `url` points at a video-sharing page rather than a stream
pub fn is_indirect(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.contains("youtube.com") || lower.contains("youtu.be")
}

/// Resolution settings
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub meta_ttl: Duration,
    pub resolver_ttl: Duration,
    pub max_redirect_hops: usize,
    pub hop_timeout: Duration,
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            meta_ttl: META_TTL,
            resolver_ttl: RESOLVER_TTL,
            max_redirect_hops: redirect::MAX_REDIRECT_HOPS,
            hop_timeout: redirect::HOP_TIMEOUT,
            user_agent: "Mozilla/5.0".to_string(),
        }
    }
}

/// Owns the metadata cache, the resolver cache and the redirect follower
pub struct Resolver {
    meta: MetaCache,
    resolved: TtlCache<Resolved>,
    redirects: RedirectFollower,
    external: Option<Arc<dyn SourceResolver>>,
}

impl Resolver {
    /// Resolver using `ureq` for redirect probes and no external resolver
    pub fn new(config: &ResolverConfig) -> Self {
        let probe = UreqProbe::new(config.hop_timeout, config.user_agent.clone());
        Self::with_probe(config, Box::new(probe))
    }

    pub fn with_probe(config: &ResolverConfig, probe: Box<dyn HttpProbe>) -> Self {
        Self {
            meta: MetaCache::new(config.meta_ttl),
            resolved: TtlCache::new(config.resolver_ttl),
            redirects: RedirectFollower::new(probe, config.max_redirect_hops),
            external: None,
        }
    }

    /// Use `resolver` for indirect links
    pub fn with_external(mut self, resolver: Arc<dyn SourceResolver>) -> Self {
        self.external = Some(resolver);
        self
    }

    pub fn meta(&self) -> &MetaCache {
        &self.meta
    }

    /// Directly decodable URL for `url`
    ///
    /// Never fails: when resolution does not work out the original URL is
    /// returned and decoding tries it as-is.
    pub fn resolve(&self, url: &str) -> Resolved {
        let original = Resolved {
            url: url.to_string(),
            duration_hint_ms: 0,
        };

        if is_indirect(url) {
            if let Some(hit) = self.resolved.get(url) {
                return hit;
            }
            let Some(external) = &self.external else {
                tracing::warn!(url = %url, "No resolver configured for indirect link");
                return original;
            };
            return match external.resolve(url) {
                Ok(resolved) if !resolved.url.trim().is_empty() => {
                    tracing::info!(
                        url = %url,
                        duration_ms = resolved.duration_hint_ms,
                        "Indirect link resolved"
                    );
                    self.resolved.insert(url, resolved.clone());
                    resolved
                }
                Ok(_) => original,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Indirect link resolution failed");
                    original
                }
            };
        }

        match self.redirects.follow(url) {
            Ok(Some(final_url)) => {
                tracing::debug!(url = %url, resolved = %final_url, "Redirects followed");
                Resolved {
                    url: final_url,
                    duration_hint_ms: 0,
                }
            }
            Ok(None) => original,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Redirect resolution failed");
                original
            }
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("meta_entries", &self.meta.len())
            .field("resolved_entries", &self.resolved.len())
            .field("external", &self.external.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::redirect::tests::FakeProbe;
    use super::*;

    struct CountingResolver {
        calls: AtomicUsize,
        fail: bool,
    }

    impl SourceResolver for CountingResolver {
        fn resolve(&self, url: &str) -> Result<Resolved, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ResolveError::Resolver(format!("cannot resolve {url}")));
            }
            Ok(Resolved {
                url: "https://cdn.example/stream.mp4".into(),
                duration_hint_ms: 212_000,
            })
        }
    }

    #[test]
    fn test_is_indirect() {
        assert!(is_indirect("https://www.YouTube.com/watch?v=abcdefghijk"));
        assert!(is_indirect("https://youtu.be/abcdefghijk"));
        assert!(!is_indirect("https://example.com/video.mp4"));
    }

    #[test]
    fn test_indirect_resolution_cached() {
        let external = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let resolver = Resolver::with_probe(&ResolverConfig::default(), Box::new(FakeProbe::default()))
            .with_external(external.clone());

        let url = "https://youtu.be/abcdefghijk";
        let first = resolver.resolve(url);
        let second = resolver.resolve(url);

        assert_eq!(first.url, "https://cdn.example/stream.mp4");
        assert_eq!(first.duration_hint_ms, 212_000);
        assert_eq!(first, second);
        assert_eq!(external.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failures_fall_back_to_original() {
        let external = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let resolver = Resolver::with_probe(&ResolverConfig::default(), Box::new(FakeProbe::default()))
            .with_external(external);

        let url = "https://youtu.be/abcdefghijk";
        assert_eq!(resolver.resolve(url).url, url);

        // Redirect probe has no route, so the HTTP request fails
        let direct = "https://example.com/v.mp4";
        assert_eq!(resolver.resolve(direct).url, direct);
    }

    #[test]
    fn test_redirects_resolved() {
        let probe = FakeProbe::default()
            .route("HEAD", "https://drive.example/f", 303, Some("https://usercontent.example/f"))
            .route("HEAD", "https://usercontent.example/f", 200, None);
        let resolver = Resolver::with_probe(&ResolverConfig::default(), Box::new(probe));

        assert_eq!(
            resolver.resolve("https://drive.example/f").url,
            "https://usercontent.example/f"
        );
    }
}

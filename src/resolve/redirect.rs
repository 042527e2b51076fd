//! Plain HTTP redirect chains
//!
//! Some hosts bounce a download through several 3xx hops. The decode
//! library follows redirects itself but slowly, so the chain is walked up
//! front with body-less requests and the final URL handed to it instead.

use std::time::Duration;

use url::Url;

use crate::error::ResolveError;

/// Maximum hops followed
pub const MAX_REDIRECT_HOPS: usize = 5;

/// Per-request timeout
pub const HOP_TIMEOUT: Duration = Duration::from_secs(4);

/// Status and redirect target of a probe request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub location: Option<String>,
}

impl ProbeResponse {
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Body-less HTTP requests that never follow redirects
pub trait HttpProbe: Send + Sync {
    /// `HEAD url`
    fn head(&self, url: &str) -> Result<ProbeResponse, ResolveError>;

    /// `GET url` with `Range: bytes=0-0`
    fn ranged_get(&self, url: &str) -> Result<ProbeResponse, ResolveError>;
}

/// [`HttpProbe`] on a blocking `ureq` agent
#[derive(Debug, Clone)]
pub struct UreqProbe {
    agent: ureq::Agent,
    user_agent: String,
}

impl UreqProbe {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .max_redirects(0)
            .max_redirects_will_error(false)
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            user_agent: user_agent.into(),
        }
    }

    fn finish(
        result: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    ) -> Result<ProbeResponse, ResolveError> {
        let response = result.map_err(|e| ResolveError::Http(e.to_string()))?;
        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(ProbeResponse {
            status: response.status().as_u16(),
            location,
        })
    }
}

impl Default for UreqProbe {
    fn default() -> Self {
        Self::new(HOP_TIMEOUT, "Mozilla/5.0")
    }
}

impl HttpProbe for UreqProbe {
    fn head(&self, url: &str) -> Result<ProbeResponse, ResolveError> {
        Self::finish(
            self.agent
                .head(url)
                .header("User-Agent", &self.user_agent)
                .call(),
        )
    }

    fn ranged_get(&self, url: &str) -> Result<ProbeResponse, ResolveError> {
        Self::finish(
            self.agent
                .get(url)
                .header("User-Agent", &self.user_agent)
                .header("Range", "bytes=0-0")
                .call(),
        )
    }
}

/// Walks 3xx chains with an [`HttpProbe`]
pub struct RedirectFollower {
    probe: Box<dyn HttpProbe>,
    max_hops: usize,
}

impl RedirectFollower {
    pub fn new(probe: Box<dyn HttpProbe>, max_hops: usize) -> Self {
        Self { probe, max_hops }
    }

    /// Final URL of the chain starting at `url`
    ///
    /// Returns `Ok(None)` when `url` is not HTTP(S) or does not redirect.
    pub fn follow(&self, url: &str) -> Result<Option<String>, ResolveError> {
        let start = url.trim();
        if !(start.starts_with("http://") || start.starts_with("https://")) {
            return Ok(None);
        }

        let mut current =
            Url::parse(start).map_err(|_| ResolveError::InvalidUrl(start.to_string()))?;

        for _ in 0..self.max_hops {
            let response = match self.probe.head(current.as_str()) {
                Ok(r) if r.status != 405 && r.status != 501 => r,
                // HEAD rejected or failed; some hosts only answer GET
                _ => self.probe.ranged_get(current.as_str())?,
            };

            if !response.is_redirect() {
                return Ok((current.as_str() != start).then(|| current.to_string()));
            }

            let Some(location) = response.location.filter(|l| !l.trim().is_empty()) else {
                // Redirect without a target; keep what we have
                return Ok((current.as_str() != start).then(|| current.to_string()));
            };
            current = current
                .join(location.trim())
                .map_err(|_| ResolveError::InvalidUrl(location.clone()))?;
            tracing::trace!(next = %current, status = response.status, "Following redirect");
        }

        Err(ResolveError::TooManyRedirects(self.max_hops))
    }
}

impl std::fmt::Debug for RedirectFollower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectFollower")
            .field("max_hops", &self.max_hops)
            .finish()
    }
}

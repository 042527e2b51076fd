//! Player configuration

use std::time::Duration;

use crate::decode::{NetOptions, ProducerConfig, SkipLimits};
use crate::media::SizeLimits;
use crate::resolve::ResolverConfig;

/// Client-side playback configuration
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Queued frames needed before presentation starts
    pub low_watermark: usize,

    /// Queue size at which the producer waits
    pub high_watermark: usize,

    /// Pixel buffers per screen; always more than `high_watermark + 2`
    pub pool_size: usize,

    /// Source resolution and caching
    pub resolver: ResolverConfig,

    /// Decode worker tuning
    pub producer: ProducerConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            low_watermark: 15,
            high_watermark: 45,
            pool_size: 60,
            resolver: ResolverConfig::default(),
            producer: ProducerConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Set the queue watermarks
    ///
    /// The pool grows if it would no longer cover a full queue.
    pub fn watermarks(mut self, low: usize, high: usize) -> Self {
        self.high_watermark = high.max(1);
        self.low_watermark = low.clamp(1, self.high_watermark);
        self.pool_size = self.pool_size.max(min_pool(self.high_watermark));
        self
    }

    /// Set the pool size
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(min_pool(self.high_watermark));
        self
    }

    /// Set the output size limits
    pub fn size_limits(mut self, limits: SizeLimits) -> Self {
        self.producer.size_limits = limits;
        self
    }

    /// Set the network options for probing and decoding
    pub fn net(mut self, net: NetOptions) -> Self {
        self.producer.net = net;
        self
    }

    /// Set the post-seek skip limits
    pub fn skip(mut self, skip: SkipLimits) -> Self {
        self.producer.skip = skip;
        self
    }

    /// Set the metadata cache TTL
    pub fn meta_ttl(mut self, ttl: Duration) -> Self {
        self.resolver.meta_ttl = ttl;
        self
    }

    /// Set the resolver configuration
    pub fn resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    /// Pool size actually used, honouring the minimum
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size.max(min_pool(self.high_watermark))
    }
}

fn min_pool(high_watermark: usize) -> usize {
    high_watermark + 3
}

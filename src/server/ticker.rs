//! Periodic authoritative tick
//!
//! Drives [`SyncRuntime::tick`] and runs the duration probes it asks for.
//! Probes run as their own tasks so a slow probe never delays end detection.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;

use crate::server::probe::DurationProbe;
use crate::stats::TickStats;
use crate::sync::{ProbeRequest, SyncRuntime};

/// Spawn the tick loop on the current runtime
pub fn spawn_ticker(runtime: Arc<SyncRuntime>, probe: Arc<dyn DurationProbe>) -> JoinHandle<()> {
    tokio::spawn(async move { tick_loop(runtime, probe).await })
}

/// Run the tick loop until `shutdown` resolves
pub async fn run_until<F>(runtime: Arc<SyncRuntime>, probe: Arc<dyn DurationProbe>, shutdown: F)
where
    F: std::future::Future<Output = ()>,
{
    tokio::select! {
        _ = shutdown => {
            tracing::info!("Ticker stopped");
        }
        _ = tick_loop(runtime, probe) => {}
    }
}

async fn tick_loop(runtime: Arc<SyncRuntime>, probe: Arc<dyn DurationProbe>) {
    let mut interval = tokio::time::interval(runtime.config().tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut stats = TickStats::new("server");

    loop {
        interval.tick().await;
        let started = Instant::now();

        let report = runtime.tick().await;
        for request in report.probes {
            spawn_probe(Arc::clone(&runtime), Arc::clone(&probe), request);
        }

        stats.record(started, Instant::now());
    }
}

/// Probe one screen's duration and apply the result
pub fn spawn_probe(
    runtime: Arc<SyncRuntime>,
    probe: Arc<dyn DurationProbe>,
    request: ProbeRequest,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!(screen = %request.screen, url = %request.url, "Probing duration");
        match probe.duration_ms(&request.url).await {
            Some(ms) => {
                runtime
                    .apply_server_duration(&request.screen, &request.url, ms)
                    .await;
            }
            None => {
                tracing::debug!(screen = %request.screen, "Duration probe found nothing");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::protocol::Bounds;
    use crate::server::config::ServerConfig;
    use crate::sync::{ManualClock, ScreenSpec};

    const T0: i64 = 1_700_000_000_000;

    struct FixedProbe(Option<i64>);

    #[async_trait]
    impl DurationProbe for FixedProbe {
        async fn duration_ms(&self, _url: &str) -> Option<i64> {
            self.0
        }
    }

    async fn playing_runtime() -> (Arc<SyncRuntime>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let config = ServerConfig::default().tick_interval(Duration::from_millis(10));
        let runtime = Arc::new(SyncRuntime::with_clock(config, clock.clone()));
        runtime
            .add_screen(
                ScreenSpec::new("lobby", "world", Bounds::default(), 0),
                "https://cdn.example/a.mp4",
            )
            .await
            .unwrap();
        runtime.play("lobby").await.unwrap();
        (runtime, clock)
    }

    #[tokio::test]
    async fn test_probe_result_applied() {
        let (runtime, clock) = playing_runtime().await;
        clock.advance(6_000);

        let report = runtime.tick().await;
        assert_eq!(report.probes.len(), 1);
        let request = report.probes.into_iter().next().unwrap();
        spawn_probe(runtime.clone(), Arc::new(FixedProbe(Some(42_000))), request)
            .await
            .unwrap();

        assert_eq!(runtime.screen("lobby").await.unwrap().duration_ms, 42_000);
    }

    #[tokio::test]
    async fn test_ticker_ends_video() {
        let (runtime, clock) = playing_runtime().await;
        clock.advance(6_000);

        let ticker = spawn_ticker(runtime.clone(), Arc::new(FixedProbe(Some(5_000))));

        let mut stopped = false;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if !runtime.screen("lobby").await.unwrap().record.playing {
                stopped = true;
                break;
            }
        }
        ticker.abort();
        assert!(stopped);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let (runtime, _) = playing_runtime().await;
        let probe: Arc<dyn DurationProbe> = Arc::new(FixedProbe(None));
        tokio::time::timeout(
            Duration::from_secs(1),
            run_until(runtime, probe, tokio::time::sleep(Duration::from_millis(30))),
        )
        .await
        .unwrap();
    }
}

use crate::{Metrics, settings::Readiness as ReadinessSettings};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    ResourceExt,
    api::{Api, ListParams},
};
use rand::Rng;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::*;

/// How a wait ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready { pod: String, attempts: u32 },
    TimedOut { attempts: u32, elapsed: Duration },
}

/// Exponential backoff between polls, capped at `max`
#[derive(Clone, Debug)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
}

impl Backoff {
    pub fn new(settings: &ReadinessSettings) -> Self {
        Self {
            next: settings.initial_interval(),
            max: settings.max_interval(),
            // NaN falls back to a fixed interval and no jitter
            multiplier: settings.multiplier.max(1.0),
            jitter: if settings.jitter.is_nan() {
                0.0
            } else {
                settings.jitter.clamp(0.0, 1.0)
            },
        }
    }

    /// Delay before the next poll, with up to `jitter` of it added or removed
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next.min(self.max);
        self.next = Duration::try_from_secs_f64(base.as_secs_f64() * self.multiplier)
            .map_or(self.max, |next| next.min(self.max));

        if self.jitter == 0.0 {
            return base;
        }
        let factor = rand::rng().random_range(-self.jitter..=self.jitter);
        base.mul_f64(1.0 + factor)
    }
}

pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Poll pods matching `selector` until one is Ready or the deadline passes
///
/// Failed list calls are logged and count as a poll that saw no ready pod.
/// A list call still pending at the deadline is abandoned.
#[instrument(skip(pods, settings, metrics))]
pub async fn wait_for_ready(
    pods: &Api<Pod>,
    selector: &str,
    settings: &ReadinessSettings,
    metrics: &Metrics,
) -> Readiness {
    let start = Instant::now();
    let deadline = start + settings.timeout();
    let params = ListParams::default().labels(selector);
    let mut backoff = Backoff::new(settings);
    let mut attempts = 0;

    loop {
        attempts += 1;
        metrics.readiness.polls.inc();

        match timeout_at(deadline, pods.list(&params)).await {
            Ok(Ok(list)) => {
                if let Some(pod) = list.items.iter().find(|p| is_pod_ready(p)) {
                    info!("Pod \"{}\" is ready after {attempts} polls", pod.name_any());
                    return Readiness::Ready {
                        pod: pod.name_any(),
                        attempts,
                    };
                }
                debug!(matching = list.items.len(), attempts, "no ready pod yet");
            }
            Ok(Err(err)) => {
                metrics.readiness.poll_errors.inc();
                warn!(attempts, "listing pods failed: {err}");
            }
            Err(_) => {
                metrics.readiness.poll_errors.inc();
                warn!(attempts, "listing pods did not finish before the deadline");
            }
        }

        let now = Instant::now();
        if now >= deadline {
            let elapsed = now - start;
            warn!("Gave up waiting for `{selector}` after {elapsed:?}");
            return Readiness::TimedOut { attempts, elapsed };
        }
        sleep(backoff.next_delay().min(deadline - now)).await;
    }
}

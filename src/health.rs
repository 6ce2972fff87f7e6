use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::pipeline::republish::Tier;

/// How long a pipeline may go without reporting before the probe fails.
/// Must be comfortably above the pipeline's heartbeat interval.
pub const BEAT_DEADLINE: Duration = Duration::from_secs(30);

/// What the liveness probe reports for one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    /// The supervisor claimed the tier but its pipeline has not reported yet
    Starting,
    /// Reported within the deadline
    Beating,
    /// Went quiet past the deadline: wedged on a broker call or stuck
    /// mid-drain, so the orchestrator should restart the process
    Stalled,
}

#[derive(Default)]
struct TierSlot {
    claimed: AtomicBool,
    // Unix seconds of the last report; 0 until the first one lands
    last_beat: AtomicI64,
}

/// Liveness for the consumption pipelines. This process runs at most one
/// pipeline per topic tier, so the tracker is three fixed slots rather than
/// an open registry: the supervisor claims a tier, the pipeline beats its
/// slot, and the probe is healthy only while every claimed tier is beating.
pub struct PipelineHealth {
    deadline: Duration,
    slots: [TierSlot; 3],
}

impl PipelineHealth {
    pub fn new(deadline: Duration) -> Arc<Self> {
        Arc::new(Self {
            deadline,
            slots: Default::default(),
        })
    }

    /// Claim the slot for a tier. The returned handle is how that tier's
    /// pipeline reports; a claimed slot that never beats keeps the probe red.
    pub fn claim(self: &Arc<Self>, tier: Tier) -> PipelineBeat {
        self.slots[slot_index(tier)]
            .claimed
            .store(true, Ordering::SeqCst);
        PipelineBeat {
            health: Arc::clone(self),
            tier,
        }
    }

    pub fn status(&self) -> LivenessStatus {
        let now = now_unix();
        let mut pipelines = Vec::new();

        for tier in [Tier::Main, Tier::Retry, Tier::Error] {
            let slot = &self.slots[slot_index(tier)];
            if !slot.claimed.load(Ordering::SeqCst) {
                continue;
            }

            let status = match slot.last_beat.load(Ordering::SeqCst) {
                0 => PipelineStatus::Starting,
                last if now - last <= self.deadline.as_secs() as i64 => PipelineStatus::Beating,
                _ => PipelineStatus::Stalled,
            };
            pipelines.push((tier_name(tier), status));
        }

        // A probe with no claimed tiers is red: the supervisor has not
        // started anything yet
        let healthy = !pipelines.is_empty()
            && pipelines.iter().all(|(_, s)| *s == PipelineStatus::Beating);

        if !healthy {
            warn!("liveness check failed: {:?}", pipelines);
        }

        LivenessStatus { healthy, pipelines }
    }

    fn record(&self, tier: Tier) {
        self.slots[slot_index(tier)]
            .last_beat
            .store(now_unix(), Ordering::SeqCst);
    }
}

/// A single tier's reporting handle, held by its pipeline.
#[derive(Clone)]
pub struct PipelineBeat {
    health: Arc<PipelineHealth>,
    tier: Tier,
}

impl PipelineBeat {
    /// Must be called more frequently than the tracker's deadline.
    pub fn report_healthy(&self) {
        self.health.record(self.tier);
    }
}

pub struct LivenessStatus {
    pub healthy: bool,
    pub pipelines: Vec<(&'static str, PipelineStatus)>,
}

impl IntoResponse for LivenessStatus {
    fn into_response(self) -> Response {
        let mut body = String::new();
        for (name, status) in &self.pipelines {
            body.push_str(name);
            body.push_str(": ");
            body.push_str(match status {
                PipelineStatus::Starting => "starting",
                PipelineStatus::Beating => "beating",
                PipelineStatus::Stalled => "stalled",
            });
            body.push('\n');
        }
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

fn slot_index(tier: Tier) -> usize {
    match tier {
        Tier::Main => 0,
        Tier::Retry => 1,
        Tier::Error => 2,
    }
}

fn tier_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Main => "main-pipeline",
        Tier::Retry => "retry-pipeline",
        Tier::Error => "error-pipeline",
    }
}

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod test {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn no_claimed_tiers_is_unhealthy() {
        let health = PipelineHealth::new(BEAT_DEADLINE);
        assert!(!health.status().healthy);
        assert!(health.status().pipelines.is_empty());
    }

    #[test]
    fn a_claimed_tier_starts_red_and_goes_green_on_its_first_beat() {
        let health = PipelineHealth::new(BEAT_DEADLINE);
        let beat = health.claim(Tier::Main);

        let status = health.status();
        assert!(!status.healthy);
        assert_eq!(
            status.pipelines,
            vec![("main-pipeline", PipelineStatus::Starting)]
        );

        beat.report_healthy();
        let status = health.status();
        assert!(status.healthy);
        assert_eq!(
            status.pipelines,
            vec![("main-pipeline", PipelineStatus::Beating)]
        );
    }

    #[test]
    fn a_quiet_pipeline_stalls_the_probe() {
        let health = PipelineHealth::new(Duration::from_secs(30));
        let beat = health.claim(Tier::Retry);
        beat.report_healthy();
        assert!(health.status().healthy);

        // Age the last beat past the deadline
        health.slots[slot_index(Tier::Retry)]
            .last_beat
            .store(now_unix() - 31, Ordering::SeqCst);

        let status = health.status();
        assert!(!status.healthy);
        assert_eq!(
            status.pipelines,
            vec![("retry-pipeline", PipelineStatus::Stalled)]
        );
    }

    #[test]
    fn every_claimed_tier_must_beat() {
        let health = PipelineHealth::new(BEAT_DEADLINE);
        let main = health.claim(Tier::Main);
        let _retry = health.claim(Tier::Retry);

        main.report_healthy();
        assert!(!health.status().healthy);

        health.claim(Tier::Retry).report_healthy();
        assert!(health.status().healthy);
    }

    #[test]
    fn the_probe_response_codes_track_health() {
        let health = PipelineHealth::new(BEAT_DEADLINE);
        assert_eq!(
            health.status().into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        health.claim(Tier::Main).report_healthy();
        assert_eq!(health.status().into_response().status(), StatusCode::OK);
    }
}

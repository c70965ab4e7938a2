use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::MonitorConfig;
use crate::monitor::change::Transition;
use crate::monitor::store::StateStore;
use crate::notify::{DispatchOutcome, DispatchRecord, NotificationRouter};
use crate::probe::{CheckResult, Prober};
use crate::target::Target;

/// What happened to one target during a run.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub target_id: String,
    pub result: CheckResult,
    /// `None` when the state file could not be read or written.
    pub transition: Option<Transition>,
    pub dispatches: Vec<DispatchRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_error: Option<String>,
}

impl TargetReport {
    pub fn changed(&self) -> bool {
        self.transition.as_ref().is_some_and(Transition::is_changed)
    }

    pub fn delivery_failures(&self) -> usize {
        self.dispatches
            .iter()
            .filter(|d| matches!(d.outcome, DispatchOutcome::Failed(_)))
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reports: Vec<TargetReport>,
}

impl RunSummary {
    pub fn changed_count(&self) -> usize {
        self.reports.iter().filter(|r| r.changed()).count()
    }

    pub fn failing_count(&self) -> usize {
        self.reports.iter().filter(|r| !r.result.is_ok()).count()
    }

    pub fn notifications_sent(&self) -> usize {
        self.reports
            .iter()
            .flat_map(|r| &r.dispatches)
            .filter(|d| d.outcome == DispatchOutcome::Sent)
            .count()
    }

    pub fn delivery_failures(&self) -> usize {
        self.reports.iter().map(TargetReport::delivery_failures).sum()
    }

    pub fn state_errors(&self) -> usize {
        self.reports.iter().filter(|r| r.state_error.is_some()).count()
    }
}

/// Runs `Probe -> Diff -> Route` for every configured target, in order.
pub struct Monitor {
    config: MonitorConfig,
    targets: Vec<Target>,
    prober: Arc<dyn Prober>,
    store: StateStore,
    router: NotificationRouter,
}

impl Monitor {
    pub fn new(
        targets: Vec<Target>,
        config: MonitorConfig,
        prober: Arc<dyn Prober>,
        router: NotificationRouter,
    ) -> Self {
        let store = StateStore::new(config.status_dir.clone());
        Self {
            config,
            targets,
            prober,
            store,
            router,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Check every target once. Individual probe, state or delivery failures
    /// are reported in the summary and never abort the run.
    pub async fn run_once(&self) -> RunSummary {
        let started_at = Utc::now();
        info!(targets = self.targets.len(), client = %self.config.client_name, "Starting check run");

        let mut reports = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            reports.push(self.check_target(target).await);
        }

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            reports,
        };
        info!(
            targets = summary.reports.len(),
            failing = summary.failing_count(),
            changed = summary.changed_count(),
            sent = summary.notifications_sent(),
            delivery_failures = summary.delivery_failures(),
            "Check run complete"
        );
        summary
    }

    pub async fn check_target(&self, target: &Target) -> TargetReport {
        let target_id = target.id().to_string();
        let result = self.prober.probe(target).await;
        debug!(target = %target_id, code = result.code, message = %result.message, "Probe finished");

        // State is written before routing so a delivery failure cannot
        // leave it stale.
        let previous = match self.store.get_previous_and_persist(&target_id, result.code) {
            Ok(previous) => previous,
            Err(e) => {
                error!(target = %target_id, error = %e, "State update failed, skipping notifications");
                return TargetReport {
                    target_id,
                    result,
                    transition: None,
                    dispatches: Vec::new(),
                    state_error: Some(e.to_string()),
                };
            }
        };

        let transition = Transition::detect(previous.as_deref(), result.code);
        if transition.is_changed() {
            info!(
                target = %target_id,
                code = result.code,
                message = %result.message,
                client = %self.config.client_name,
                %transition,
                "Status changed"
            );
        }

        let dispatches = self
            .router
            .dispatch(target, &result, &transition, &self.config.client_name)
            .await;

        TargetReport {
            target_id,
            result,
            transition: Some(transition),
            dispatches,
            state_error: None,
        }
    }
}

use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use croner::Cron;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// What happens when a trigger fires while an earlier run is still going.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Single-flight: the new trigger is dropped.
    #[default]
    Skip,
    /// Start the new run concurrently.
    Allow,
}

impl FromStr for OverlapPolicy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "allow" => Ok(Self::Allow),
            other => bail!("unknown overlap policy `{other}` (expected `skip` or `allow`)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// `minute hour day month weekday`, or the same with a leading seconds field.
    pub expression: String,
    pub overlap: OverlapPolicy,
}

/// Turns a five-field cron expression into the seconds-first form.
pub fn normalize_expression(expression: &str) -> Result<String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {}", fields.join(" "))),
        6 => Ok(fields.join(" ")),
        n => bail!("schedule `{expression}` has {n} fields, expected `minute hour day month weekday`"),
    }
}

/// Process-wide "a run is in progress" flag.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
}

/// Held for the whole run; dropping it lets the next trigger in.
#[derive(Debug)]
pub struct FlightPermit {
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn try_acquire(&self) -> Option<FlightPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct Admission {
    policy: OverlapPolicy,
    flight: SingleFlight,
}

impl Admission {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            policy,
            flight: SingleFlight::default(),
        }
    }

    /// `None` means the trigger must be skipped. The inner permit is only
    /// present under [`OverlapPolicy::Skip`].
    pub fn admit(&self) -> Option<Option<FlightPermit>> {
        match self.policy {
            OverlapPolicy::Allow => Some(None),
            OverlapPolicy::Skip => self.flight.try_acquire().map(Some),
        }
    }
}

/// A validated recurrence.
///
/// Day-of-month and weekday combine the way classic cron does: when both are
/// restricted, an instant matching either one fires.
pub struct CronSchedule {
    expression: String,
    cron: Cron,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let normalized = normalize_expression(expression)?;
        let cron = Cron::new(&normalized)
            .with_seconds_required()
            .parse()
            .map_err(|e| anyhow!("invalid schedule `{expression}`: {e}"))?;
        Ok(Self {
            expression: expression.to_owned(),
            cron,
        })
    }

    /// First matching instant strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.cron
            .find_next_occurrence(after, false)
            .map_err(|e| anyhow!("schedule `{}` has no next occurrence: {e}", self.expression))
    }
}

/// Handle to the running trigger loop.
#[derive(Debug)]
pub struct Scheduler {
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Stops firing new triggers. Runs already spawned are left to finish.
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

/// Validates the schedule and starts firing `action` on every matching instant.
///
/// Each admitted firing is spawned as its own task, so the loop never waits on
/// a run and a panicking run cannot take the scheduler down.
pub fn start<F, Fut>(settings: &ScheduleSettings, action: F) -> Result<Scheduler>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let schedule = CronSchedule::parse(&settings.expression)?;
    let first = schedule.next_after(&Utc::now())?;
    let admission = Admission::new(settings.overlap);

    info!(
        schedule = %settings.expression,
        overlap = ?settings.overlap,
        next = %first.to_rfc3339(),
        "backup scheduler started"
    );
    let handle = tokio::spawn(scheduler_loop(schedule, admission, Arc::new(action)));
    Ok(Scheduler { handle })
}

async fn scheduler_loop<F, Fut>(schedule: CronSchedule, admission: Admission, action: Arc<F>)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut after = Utc::now();
    loop {
        let next = match schedule.next_after(&after) {
            Ok(next) => next,
            Err(e) => {
                error!(error = %e, "backup scheduler stopped");
                return;
            }
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        sleep(wait).await;
        after = next;

        let Some(permit) = admission.admit() else {
            warn!(
                fire_time = %next.to_rfc3339(),
                "previous backup run still in progress; skipping this trigger"
            );
            continue;
        };
        let action = Arc::clone(&action);
        tokio::spawn(async move {
            (*action)().await;
            drop(permit);
        });
    }
}

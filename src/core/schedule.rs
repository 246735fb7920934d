use std::future::Future;

use chrono::{DateTime, Local, TimeDelta, TimeZone, Timelike};
use tokio::{task::JoinSet, time::sleep};

use crate::prelude::*;

/// Wall-clock trigger, `None` matches any hour or minute.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimeTrigger {
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub second: u32,
}

impl TimeTrigger {
    pub const fn daily(hour: u32, minute: u32, second: u32) -> Self {
        Self { hour: Some(hour), minute: Some(minute), second }
    }

    pub const fn hourly(minute: u32, second: u32) -> Self {
        Self { hour: None, minute: Some(minute), second }
    }

    /// Next matching instant strictly after `now`.
    ///
    /// Local times skipped by a DST transition never match, ambiguous ones match the earliest.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let timezone = now.timezone();
        let start = now.naive_local().with_minute(0)?.with_second(0)?.with_nanosecond(0)?;
        for n_hours in 0..=48 {
            let hour_start = start + TimeDelta::hours(n_hours);
            if self.hour.is_some_and(|hour| hour != hour_start.hour()) {
                continue;
            }
            let minutes = self.minute.map_or(0..=59, |minute| minute..=minute);
            for minute in minutes {
                let naive = hour_start.with_minute(minute).and_then(|it| it.with_second(self.second));
                let Some(naive) = naive else {
                    continue;
                };
                if let Some(candidate) = timezone.from_local_datetime(&naive).earliest()
                    && candidate > *now
                {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

/// Owns the scheduled job loops, dropping the scheduler aborts them.
#[derive(Default)]
pub struct Scheduler(JoinSet<()>);

impl Scheduler {
    /// Run `job` every time `trigger` fires in the local timezone.
    pub fn spawn<J, F>(&mut self, name: &'static str, trigger: TimeTrigger, job: J)
    where
        J: Fn() -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(name, ?trigger, "registering…");
        self.0.spawn(async move {
            let mut last_fired_at: Option<DateTime<Local>> = None;
            loop {
                let now = Local::now();
                let after = last_fired_at.map_or(now, |last_fired_at| last_fired_at.max(now));
                let Some(next) = trigger.next_after(&after) else {
                    error!(name, ?trigger, "the trigger never fires");
                    return;
                };
                debug!(name, %next, "sleeping…");
                sleep((next - now).to_std().unwrap_or_default()).await;
                debug!(name, "firing…");
                job().await;
                last_fired_at = Some(next);
            }
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub async fn shutdown(mut self) {
        self.0.shutdown().await;
    }
}

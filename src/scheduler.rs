//! # Daily Scheduler
//!
//! Esegue il runner una volta al giorno a un orario fisso (ora locale).
//!
//! ## Ciclo di vita:
//! - `Scheduler::start()`: registra il task ricorrente (spawn di un task tokio)
//! - `ScheduleHandle::stop()`: deregistra il task; un run in corso viene
//!   cancellato ma salva comunque i progressi parziali
//!
//! ## Prima esecuzione:
//! Calcolata rispetto all'ora corrente: oggi se l'orario non è ancora passato,
//! altrimenti domani. Se l'orario cade in un buco DST si slitta in avanti.
//!
//! La sovrapposizione di due run è impedita dal lock interno del runner.

use crate::error::OptimizeError;
use crate::optimizer::IncrementalRunner;
use crate::shutdown::{self, Shutdown, ShutdownTrigger};
use anyhow::Result;
use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Recurrence rule: every day at a fixed local time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
}

impl DailySchedule {
    pub fn new(at: NaiveTime) -> Self {
        Self { at }
    }

    /// Parse "HH:MM" or "HH:MM:SS"
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        NaiveTime::parse_from_str(value, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
            .map(Self::new)
            .map_err(|_| {
                OptimizeError::Config(format!("Invalid schedule time '{}', expected HH:MM", value)).into()
            })
    }

    pub fn at(&self) -> NaiveTime {
        self.at
    }

    /// First firing strictly after `now`
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let local_now = now.naive_local();

        let mut day = local_now.date();
        if day.and_time(self.at) <= local_now {
            day = day.succ_opt().unwrap_or(day);
        }

        let mut candidate = day.and_time(self.at);
        // DST gaps are never longer than a couple of hours
        for _ in 0..3 {
            if let Some(fire) = tz.from_local_datetime(&candidate).earliest() {
                if fire > *now {
                    return fire;
                }
            }
            candidate += Duration::hours(1);
        }

        now.clone() + Duration::days(1)
    }
}

/// Registers the runner with a daily recurrence
pub struct Scheduler {
    schedule: DailySchedule,
}

impl Scheduler {
    pub fn new(schedule: DailySchedule) -> Self {
        Self { schedule }
    }

    pub fn start(&self, runner: Arc<IncrementalRunner>) -> ScheduleHandle {
        let (trigger, shutdown) = shutdown::channel();
        info!("Scheduling daily optimisation at {}", self.schedule.at().format("%H:%M:%S"));
        let task = tokio::spawn(run_daily(self.schedule, runner, shutdown));
        ScheduleHandle { trigger, task }
    }
}

/// Handle of a started schedule
pub struct ScheduleHandle {
    trigger: ShutdownTrigger,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Unschedule, cancel any in-flight run and wait for the task to end
    pub async fn stop(self) {
        self.trigger.trigger();
        if let Err(e) = self.task.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
    }
}

async fn run_daily(schedule: DailySchedule, runner: Arc<IncrementalRunner>, mut shutdown: Shutdown) {
    loop {
        let now = Local::now();
        let next = schedule.next_after(&now);
        let wait = (next - now).to_std().unwrap_or_default();
        info!("Next optimisation run at {}", next.format("%Y-%m-%d %H:%M:%S"));

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.wait() => break,
        }

        match runner.run(shutdown.clone()).await {
            Ok(report) => report.log_summary(),
            Err(e) => error!("Scheduled optimisation run failed: {:#}", e),
        }

        if shutdown.is_triggered() {
            break;
        }
    }
    info!("Scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_manager::ImagePath;
    use crate::optimizer::testing::Harness;
    use chrono::Utc;
    use chrono_tz::Europe::Rome;
    use std::time::Duration as StdDuration;

    fn at(h: u32, m: u32) -> DailySchedule {
        DailySchedule::new(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    #[test]
    fn test_parse() {
        assert_eq!(DailySchedule::parse("03:00").unwrap(), at(3, 0));
        assert_eq!(DailySchedule::parse(" 23:45:00 ").unwrap(), at(23, 45));
        assert!(DailySchedule::parse("24:00").is_err());
        assert!(DailySchedule::parse("3am").is_err());
    }

    #[test]
    fn test_first_firing_later_today() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 1, 30, 0).unwrap();
        let next = at(3, 0).next_after(&now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_first_firing_tomorrow_when_passed() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let next = at(3, 0).next_after(&now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 2, 3, 0, 0).unwrap());

        let exactly = Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap();
        assert_eq!(
            at(3, 0).next_after(&exactly),
            Utc.with_ymd_and_hms(2024, 5, 2, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_month_rollover() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();
        let next = at(3, 0).next_after(&now);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 1, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_dst_gap_shifts_forward() {
        // 2024-03-31 02:00 CET jumps to 03:00 CEST
        let now = Rome.with_ymd_and_hms(2024, 3, 31, 1, 0, 0).unwrap();
        let next = at(2, 30).next_after(&now);
        assert_eq!(next, Rome.with_ymd_and_hms(2024, 3, 31, 3, 30, 0).unwrap());
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 31, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_dst_overlap_takes_earliest() {
        // 2024-10-27 02:00-03:00 happens twice
        let now = Rome.with_ymd_and_hms(2024, 10, 27, 1, 0, 0).unwrap();
        let next = at(2, 30).next_after(&now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 10, 27, 0, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn test_firing_runs_the_optimiser() {
        let harness = Harness::new(&["/srv/a.jpg", "/srv/b.jpg"]);
        let runner = Arc::new(harness.runner());

        let soon = (Local::now() + Duration::seconds(1)).time();
        let handle = Scheduler::new(DailySchedule::new(soon)).start(runner);

        let fired = tokio::time::timeout(StdDuration::from_secs(5), async {
            while harness.store.snapshot().await.len() < 2 {
                tokio::time::sleep(StdDuration::from_millis(50)).await;
            }
        })
        .await;
        assert!(fired.is_ok());
        assert!(!handle.is_finished());

        handle.stop().await;
        assert_eq!(harness.compressor.calls().await, 2);
        assert_eq!(harness.compressor.validations(), 1);
    }

    #[tokio::test]
    async fn test_stop_cancels_run_and_keeps_progress() {
        let mut harness = Harness::new(&["/srv/a.jpg", "/srv/b.jpg", "/srv/c.jpg"]);
        harness.config.item_delay_ms = 60_000;
        let (entered, release) = harness.compressor.hold().await;
        let runner = Arc::new(harness.runner());

        let soon = (Local::now() + Duration::seconds(1)).time();
        let handle = Scheduler::new(DailySchedule::new(soon)).start(runner);

        let started = tokio::time::timeout(StdDuration::from_secs(5), entered.notified()).await;
        assert!(started.is_ok());
        release.notify_one();

        let stopped = tokio::time::timeout(StdDuration::from_secs(5), handle.stop()).await;
        assert!(stopped.is_ok());
        assert_eq!(harness.compressor.calls().await, 1);
        assert_eq!(
            harness.store.snapshot().await.into_iter().collect::<Vec<_>>(),
            vec![ImagePath::from("/srv/a.jpg")]
        );
    }

    #[tokio::test]
    async fn test_stop_before_first_firing() {
        let harness = Harness::new(&["/srv/a.jpg"]);
        let runner = Arc::new(harness.runner());

        let in_an_hour = (Local::now() + Duration::hours(1)).time();
        let handle = Scheduler::new(DailySchedule::new(in_an_hour)).start(runner);
        assert!(!handle.is_finished());
        handle.stop().await;

        assert_eq!(harness.compressor.calls().await, 0);
        assert!(harness.store.snapshot().await.is_empty());
    }
}

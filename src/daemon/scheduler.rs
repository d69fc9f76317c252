//! Elapsed-time timers polled once per loop iteration.
//!
//! Timers are checked in priority order (day boundary, then the longest
//! interval down to the shortest) and only the first due timer fires on a
//! given tick. A fired timer restarts from the tick time, so a late tick never
//! produces catch-up fires; a due timer that lost on priority stays due and
//! fires on a later tick.
//!
//! CHANGELOG:
//! - 10/26/2026 - Local calendar days, checked intervals, restart
//! - 10/12/2026 - Initial implementation

use chrono::{DateTime, Datelike, Duration, Local, Utc};

use crate::config::TimerConfig;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once each time the wall-clock day number changes.
    DayBoundary,
    /// Fires when at least this long has passed since the last fire.
    Every(Duration),
}

/// How the day-boundary timer numbers days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayZone {
    /// Fixed offset from UTC, in seconds.
    Fixed(i64),
    /// The local calendar, following daylight-saving changes.
    Local,
}

impl DayZone {
    fn day_of(self, at: DateTime<Utc>) -> i64 {
        match self {
            DayZone::Fixed(offset_secs) => day_number(at, offset_secs),
            DayZone::Local => i64::from(at.with_timezone(&Local).date_naive().num_days_from_ce()),
        }
    }
}

#[derive(Debug, Clone)]
struct Timer {
    name: String,
    kind: TimerKind,
    notice: String,
    last_fired: DateTime<Utc>,
}

/// A timer that fired on a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimer {
    pub name: String,
    pub kind: TimerKind,
    pub notice: String,
}

/// Set of named elapsed-time timers.
#[derive(Debug, Clone)]
pub struct PeriodicScheduler {
    timers: Vec<Timer>,
    started_at: DateTime<Utc>,
    zone: DayZone,
}

impl PeriodicScheduler {
    /// Empty scheduler; every timer added later starts counting at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            timers: Vec::new(),
            started_at: start,
            zone: DayZone::Fixed(0),
        }
    }

    /// Scheduler with the add-in's standard timers.
    ///
    /// An interval too large to represent is left out; config validation
    /// rejects those before a scheduler is built.
    pub fn from_config(config: &TimerConfig, program_name: &str, start: DateTime<Utc>) -> Self {
        let mut scheduler = Self::new(start);
        if config.daily {
            scheduler = scheduler.day_boundary("daily", format!("{}: Another day has passed...", program_name));
        }
        match config.minutes_interval() {
            Ok(Some(interval)) => {
                scheduler = scheduler.every(
                    format!("{}-minute", config.minutes),
                    interval,
                    format!("{}: {} more minutes have gone by...", program_name, config.minutes),
                );
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "minutes timer disabled"),
        }
        match config.seconds_interval() {
            Ok(Some(interval)) => {
                scheduler = scheduler.every(
                    format!("{}-second", config.seconds),
                    interval,
                    format!("{}: {} seconds, and all is well...", program_name, config.seconds),
                );
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "seconds timer disabled"),
        }
        scheduler
    }

    /// Shift where day boundaries fall by a fixed offset from UTC.
    pub fn with_utc_offset(mut self, offset_secs: i64) -> Self {
        self.zone = DayZone::Fixed(offset_secs);
        self
    }

    /// Put day boundaries at local midnight, as the local calendar has it on
    /// each tick.
    pub fn with_local_days(mut self) -> Self {
        self.zone = DayZone::Local;
        self
    }

    /// Start every timer counting again from `start`.
    pub fn restart(&mut self, start: DateTime<Utc>) {
        self.started_at = start;
        for timer in &mut self.timers {
            timer.last_fired = start;
        }
    }

    /// Add a day-boundary timer.
    pub fn day_boundary(self, name: impl Into<String>, notice: impl Into<String>) -> Self {
        self.with_timer(name.into(), TimerKind::DayBoundary, notice.into())
    }

    /// Add a fixed-interval timer.
    pub fn every(self, name: impl Into<String>, interval: Duration, notice: impl Into<String>) -> Self {
        self.with_timer(name.into(), TimerKind::Every(interval), notice.into())
    }

    fn with_timer(mut self, name: String, kind: TimerKind, notice: String) -> Self {
        self.timers.push(Timer {
            name,
            kind,
            notice,
            last_fired: self.started_at,
        });
        self.timers.sort_by_key(|t| std::cmp::Reverse(priority(t.kind)));
        self
    }

    /// Timer names in the order they are checked.
    pub fn timer_names(&self) -> Vec<&str> {
        self.timers.iter().map(|t| t.name.as_str()).collect()
    }

    /// Evaluate all timers against `now`. At most one timer fires.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<FiredTimer> {
        let zone = self.zone;
        let due = self.timers.iter_mut().find(|t| is_due(t, now, zone));

        match due {
            Some(timer) => {
                timer.last_fired = now;
                vec![FiredTimer {
                    name: timer.name.clone(),
                    kind: timer.kind,
                    notice: timer.notice.clone(),
                }]
            }
            None => Vec::new(),
        }
    }
}

fn priority(kind: TimerKind) -> (bool, Duration) {
    match kind {
        TimerKind::DayBoundary => (true, Duration::zero()),
        TimerKind::Every(interval) => (false, interval),
    }
}

fn day_number(at: DateTime<Utc>, offset_secs: i64) -> i64 {
    (at.timestamp() + offset_secs).div_euclid(SECONDS_PER_DAY)
}

fn is_due(timer: &Timer, now: DateTime<Utc>, zone: DayZone) -> bool {
    match timer.kind {
        TimerKind::DayBoundary => zone.day_of(now) > zone.day_of(timer.last_fired),
        TimerKind::Every(interval) => now - timer.last_fired >= interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 23, 50, 0).unwrap()
    }

    fn standard() -> PeriodicScheduler {
        PeriodicScheduler::from_config(&TimerConfig::default(), "AddinServer", start())
    }

    fn names(fired: &[FiredTimer]) -> Vec<&str> {
        fired.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_priority_order() {
        let scheduler = PeriodicScheduler::new(start())
            .every("short", Duration::seconds(30), "s")
            .day_boundary("daily", "d")
            .every("long", Duration::minutes(3), "l");
        assert_eq!(scheduler.timer_names(), vec!["daily", "long", "short"]);
    }

    #[test]
    fn test_nothing_fires_immediately() {
        let mut scheduler = standard();
        assert!(scheduler.tick(start()).is_empty());
        assert!(scheduler.tick(start() + Duration::seconds(29)).is_empty());
    }

    #[test]
    fn test_seconds_timer_fires_and_resets_from_now() {
        let mut scheduler = standard();
        let fired = scheduler.tick(start() + Duration::seconds(31));
        assert_eq!(names(&fired), vec!["30-second"]);
        assert_eq!(fired[0].notice, "AddinServer: 30 seconds, and all is well...");

        // Reset is from the late tick (31s), not from 30s
        assert!(scheduler.tick(start() + Duration::seconds(60)).is_empty());
        assert_eq!(
            names(&scheduler.tick(start() + Duration::seconds(61))),
            vec!["30-second"]
        );
    }

    #[test]
    fn test_no_catch_up_after_long_gap() {
        let mut scheduler = PeriodicScheduler::new(start()).every("short", Duration::seconds(30), "s");
        assert_eq!(scheduler.tick(start() + Duration::seconds(300)).len(), 1);
        assert!(scheduler.tick(start() + Duration::seconds(301)).is_empty());
    }

    #[test]
    fn test_longer_interval_wins_then_shorter_follows() {
        let mut scheduler = standard();
        let at = start() + Duration::minutes(3);
        assert_eq!(names(&scheduler.tick(at)), vec!["3-minute"]);
        // The 30-second timer was due too and fires on the next tick
        assert_eq!(
            names(&scheduler.tick(at + Duration::milliseconds(500))),
            vec!["30-second"]
        );
    }

    #[test]
    fn test_day_boundary_wins_over_intervals() {
        let mut scheduler = standard();
        // 23:50 -> 00:05 next day: all three are due
        let at = start() + Duration::minutes(15);
        let fired = scheduler.tick(at);
        assert_eq!(names(&fired), vec!["daily"]);
        assert_eq!(fired[0].kind, TimerKind::DayBoundary);
        assert_eq!(fired[0].notice, "AddinServer: Another day has passed...");

        // Same day again: day timer does not refire
        let later = at + Duration::hours(5);
        assert_eq!(names(&scheduler.tick(later)), vec!["3-minute"]);
    }

    #[test]
    fn test_day_boundary_with_offset() {
        // 23:50 UTC is 01:50 the next day at +02:00, so midnight UTC is not a boundary
        let mut scheduler = PeriodicScheduler::new(start())
            .day_boundary("daily", "d")
            .with_utc_offset(2 * 3600);
        assert!(scheduler.tick(start() + Duration::minutes(15)).is_empty());
        assert_eq!(scheduler.tick(start() + Duration::hours(23)).len(), 1);
    }

    #[test]
    fn test_disabled_timers_from_config() {
        let config = TimerConfig {
            daily: false,
            minutes: 0,
            seconds: 10,
        };
        let scheduler = PeriodicScheduler::from_config(&config, "X", start());
        assert_eq!(scheduler.timer_names(), vec!["10-second"]);
    }

    #[test]
    fn test_oversized_intervals_are_left_out() {
        let huge = TimerConfig {
            daily: false,
            minutes: 0,
            seconds: 10_000_000_000_000_000,
        };
        let scheduler = PeriodicScheduler::from_config(&huge, "X", start());
        assert!(scheduler.timer_names().is_empty());

        // u64::MAX must not wrap into a negative interval that fires every tick
        let wrapped = TimerConfig {
            daily: false,
            minutes: u64::MAX,
            seconds: u64::MAX,
        };
        let mut scheduler = PeriodicScheduler::from_config(&wrapped, "X", start());
        for ms in 1..=5 {
            assert!(scheduler.tick(start() + Duration::milliseconds(ms)).is_empty());
        }
    }

    #[test]
    fn test_restart_moves_every_timer() {
        let mut scheduler = standard();
        let later = start() - Duration::days(400);
        scheduler.restart(later);
        assert!(scheduler.tick(later + Duration::seconds(10)).is_empty());
        assert_eq!(
            names(&scheduler.tick(later + Duration::seconds(31))),
            vec!["30-second"]
        );
    }

    #[test]
    fn test_local_days_follow_the_local_calendar() {
        let noon = Local
            .with_ymd_and_hms(2026, 3, 4, 12, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc);
        let next_noon = Local
            .with_ymd_and_hms(2026, 3, 5, 12, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc);

        let mut scheduler = PeriodicScheduler::new(noon)
            .day_boundary("daily", "d")
            .with_local_days();
        assert!(scheduler.tick(noon + Duration::hours(11)).is_empty());
        assert_eq!(names(&scheduler.tick(next_noon)), vec!["daily"]);
        assert!(scheduler.tick(next_noon + Duration::hours(1)).is_empty());
    }

    #[test]
    fn test_clock_going_backwards_fires_nothing() {
        let mut scheduler = standard();
        assert!(scheduler.tick(start() - Duration::hours(2)).is_empty());
    }

    proptest! {
        #[test]
        fn prop_at_most_one_fire_per_tick_and_per_interval(
            steps in prop::collection::vec(0i64..200_000, 1..200)
        ) {
            let mut scheduler = standard();
            let mut now = start();
            let mut last: std::collections::HashMap<String, DateTime<Utc>> = Default::default();
            let mut last_day: Option<i64> = Some(day_number(start(), 0));

            for step in steps {
                now += Duration::milliseconds(step);
                let fired = scheduler.tick(now);
                prop_assert!(fired.len() <= 1);

                for timer in fired {
                    match timer.kind {
                        TimerKind::Every(interval) => {
                            let prev = last.get(&timer.name).copied().unwrap_or(start());
                            prop_assert!(now - prev >= interval);
                            last.insert(timer.name.clone(), now);
                        }
                        TimerKind::DayBoundary => {
                            let day = day_number(now, 0);
                            prop_assert!(Some(day) > last_day);
                            last_day = Some(day);
                        }
                    }
                }
            }
        }
    }
}

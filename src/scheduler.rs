//! Polling state machine
//!
//! Pure bookkeeping with no I/O: it decides when a read starts, whether a
//! finished read is committed and rendered, and what the interval timer
//! should do. [`crate::poller::Poller`] carries out those decisions.
//!
//! ```text
//!            begin(Tick|Forced)            finish(result)
//!   Idle ─────────────────────────► InFlight ─────────────► Idle
//!                                      │  Forced → pending      │ pending? → begin(Forced)
//!                                      │  Tick   → dropped      │
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use miao_transport::{DeviceConfig, TransportError};
use tracing::debug;

use crate::status::Status;

/// Identifies one display surface (key, tray icon, export target)
pub type ConsumerId = String;

/// What asked for a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Interval timer fired
    Tick,
    /// Out-of-band request; renders even if the value did not change
    Forced,
}

/// Instruction for the interval timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDirective {
    /// Leave the running timer (or its absence) alone
    Keep,
    /// Cancel any running timer and start one with this period
    Start(Duration),
    /// Cancel the running timer
    Stop,
}

/// Scheduler response to a config or consumer change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaction {
    pub timer: TimerDirective,
    /// Issue a forced poll right away
    pub poll_now: bool,
}

impl Reaction {
    const NONE: Reaction = Reaction {
        timer: TimerDirective::Keep,
        poll_now: false,
    };
}

/// Proof that a poll was started; handed back on completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTicket {
    forced: bool,
}

impl PollTicket {
    pub fn is_forced(&self) -> bool {
        self.forced
    }
}

/// Outcome of a finished poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Newly committed status to render, if any
    pub committed: Option<Status>,
    /// A forced request arrived mid-read; start one more forced poll now
    pub follow_up: bool,
}

/// Scheduler-private flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollingState {
    pub in_flight: bool,
    pub pending_forced_refresh: bool,
    /// Period of the running timer, `None` while stopped
    pub timer_interval: Option<Duration>,
}

pub struct PollingScheduler {
    config: Arc<DeviceConfig>,
    cached: Status,
    state: PollingState,
    consumers: BTreeSet<ConsumerId>,
}

impl PollingScheduler {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config: Arc::new(config),
            cached: Status::Unknown,
            state: PollingState::default(),
            consumers: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &Arc<DeviceConfig> {
        &self.config
    }

    /// Currently committed status
    pub fn status(&self) -> &Status {
        &self.cached
    }

    pub fn state(&self) -> &PollingState {
        &self.state
    }

    pub fn consumers(&self) -> impl Iterator<Item = &ConsumerId> {
        self.consumers.iter()
    }

    pub fn has_consumers(&self) -> bool {
        !self.consumers.is_empty()
    }

    /// Replace the config snapshot
    ///
    /// With consumers present the change is reflected immediately: the timer
    /// restarts if the interval moved, and a forced poll is requested.
    pub fn apply_config(&mut self, config: DeviceConfig) -> Reaction {
        self.config = Arc::new(config);
        if !self.has_consumers() {
            return Reaction::NONE;
        }

        let desired = self.config.poll_interval();
        let timer = if self.state.timer_interval != Some(desired) {
            debug!(
                "Poll interval {:?} -> {:?}",
                self.state.timer_interval, desired
            );
            self.state.timer_interval = Some(desired);
            TimerDirective::Start(desired)
        } else {
            TimerDirective::Keep
        };

        Reaction {
            timer,
            poll_now: true,
        }
    }

    /// Add a display surface; the first one starts polling
    pub fn register_consumer(&mut self, id: ConsumerId) -> Reaction {
        let was_idle = self.consumers.is_empty();
        self.consumers.insert(id);
        if !was_idle || self.state.timer_interval.is_some() {
            return Reaction::NONE;
        }

        let interval = self.config.poll_interval();
        self.state.timer_interval = Some(interval);
        Reaction {
            timer: TimerDirective::Start(interval),
            poll_now: true,
        }
    }

    /// Remove a display surface; the last one stops the timer
    ///
    /// Idempotent. A read already in flight still completes.
    pub fn unregister_consumer(&mut self, id: &str) -> TimerDirective {
        self.consumers.remove(id);
        if self.consumers.is_empty() && self.state.timer_interval.take().is_some() {
            TimerDirective::Stop
        } else {
            TimerDirective::Keep
        }
    }

    /// Try to start a poll
    ///
    /// While a read is in flight, ticks are dropped and forced requests
    /// collapse into a single pending refresh.
    pub fn begin(&mut self, trigger: Trigger) -> Option<PollTicket> {
        if self.state.in_flight {
            if trigger == Trigger::Forced {
                self.state.pending_forced_refresh = true;
            }
            return None;
        }
        self.state.in_flight = true;
        Some(PollTicket {
            forced: trigger == Trigger::Forced,
        })
    }

    /// Record a finished read
    pub fn finish(
        &mut self,
        ticket: PollTicket,
        result: &Result<u8, TransportError>,
    ) -> Completion {
        let status = Status::from_read(result);
        let committed = if status != self.cached || ticket.forced {
            self.cached = status.clone();
            Some(status)
        } else {
            None
        };

        self.state.in_flight = false;
        let follow_up = std::mem::take(&mut self.state.pending_forced_refresh);
        Completion {
            committed,
            follow_up,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_scheduler() -> PollingScheduler {
        let mut scheduler = PollingScheduler::new(DeviceConfig::default());
        scheduler.register_consumer("key-1".into());
        scheduler
    }

    #[test]
    fn test_first_consumer_starts_timer_and_polls() {
        let mut scheduler = PollingScheduler::new(DeviceConfig::default());
        let reaction = scheduler.register_consumer("key-1".into());
        assert_eq!(
            reaction,
            Reaction {
                timer: TimerDirective::Start(Duration::from_secs(30)),
                poll_now: true
            }
        );

        // Second consumer joins a running timer
        assert_eq!(scheduler.register_consumer("key-2".into()), Reaction::NONE);
    }

    #[test]
    fn test_last_consumer_stops_timer() {
        let mut scheduler = active_scheduler();
        scheduler.register_consumer("key-2".into());

        assert_eq!(scheduler.unregister_consumer("key-1"), TimerDirective::Keep);
        assert_eq!(scheduler.unregister_consumer("key-2"), TimerDirective::Stop);
        assert_eq!(scheduler.unregister_consumer("key-2"), TimerDirective::Keep);
        assert_eq!(scheduler.state().timer_interval, None);
    }

    #[test]
    fn test_consumer_reappearing_restarts_timer() {
        let mut scheduler = active_scheduler();
        scheduler.unregister_consumer("key-1");
        let reaction = scheduler.register_consumer("key-1".into());
        assert_eq!(reaction.timer, TimerDirective::Start(Duration::from_secs(30)));
        assert!(reaction.poll_now);
    }

    #[test]
    fn test_interval_change_restarts_timer_and_forces_poll() {
        let mut scheduler = active_scheduler();
        let reaction = scheduler.apply_config(DeviceConfig {
            poll_interval_seconds: 10.0,
            ..Default::default()
        });
        assert_eq!(
            reaction,
            Reaction {
                timer: TimerDirective::Start(Duration::from_secs(10)),
                poll_now: true
            }
        );
        assert_eq!(
            scheduler.state().timer_interval,
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_same_interval_keeps_timer() {
        let mut scheduler = active_scheduler();
        let reaction = scheduler.apply_config(DeviceConfig {
            hid_path: Some("/dev/hidraw4".into()),
            ..Default::default()
        });
        assert_eq!(reaction.timer, TimerDirective::Keep);
        assert!(reaction.poll_now);
        assert_eq!(
            scheduler.config().hid_path.as_deref(),
            Some("/dev/hidraw4")
        );
    }

    #[test]
    fn test_interval_floor_applies_to_timer() {
        let mut scheduler = active_scheduler();
        let reaction = scheduler.apply_config(DeviceConfig {
            poll_interval_seconds: 1.0,
            ..Default::default()
        });
        assert_eq!(reaction.timer, TimerDirective::Start(Duration::from_secs(5)));
    }

    #[test]
    fn test_config_without_consumers_only_stores() {
        let mut scheduler = PollingScheduler::new(DeviceConfig::default());
        let reaction = scheduler.apply_config(DeviceConfig {
            poll_interval_seconds: 10.0,
            ..Default::default()
        });
        assert_eq!(reaction, Reaction::NONE);

        // The stored interval is used once a consumer appears
        let reaction = scheduler.register_consumer("key-1".into());
        assert_eq!(reaction.timer, TimerDirective::Start(Duration::from_secs(10)));
    }

    #[test]
    fn test_tick_while_in_flight_is_dropped() {
        let mut scheduler = active_scheduler();
        let ticket = scheduler.begin(Trigger::Tick).unwrap();
        assert!(scheduler.begin(Trigger::Tick).is_none());

        let completion = scheduler.finish(ticket, &Ok(40));
        assert!(!completion.follow_up);
        assert!(!scheduler.state().in_flight);
    }

    #[test]
    fn test_forced_requests_collapse_to_one_follow_up() {
        let mut scheduler = active_scheduler();
        let ticket = scheduler.begin(Trigger::Tick).unwrap();
        for _ in 0..5 {
            assert!(scheduler.begin(Trigger::Forced).is_none());
        }
        assert!(scheduler.state().pending_forced_refresh);

        let completion = scheduler.finish(ticket, &Ok(40));
        assert!(completion.follow_up);
        assert!(!scheduler.state().pending_forced_refresh);

        let ticket = scheduler.begin(Trigger::Forced).unwrap();
        assert!(ticket.is_forced());
        let completion = scheduler.finish(ticket, &Ok(40));
        assert!(!completion.follow_up);
    }

    #[test]
    fn test_unchanged_value_is_not_rerendered() {
        let mut scheduler = active_scheduler();

        let ticket = scheduler.begin(Trigger::Tick).unwrap();
        let first = scheduler.finish(ticket, &Ok(57));
        assert_eq!(first.committed, Some(Status::Value { percent: 57 }));

        let ticket = scheduler.begin(Trigger::Tick).unwrap();
        let second = scheduler.finish(ticket, &Ok(57));
        assert_eq!(second.committed, None);

        let ticket = scheduler.begin(Trigger::Tick).unwrap();
        let third = scheduler.finish(ticket, &Ok(56));
        assert_eq!(third.committed, Some(Status::Value { percent: 56 }));
        assert_eq!(scheduler.status(), &Status::Value { percent: 56 });
    }

    #[test]
    fn test_forced_poll_always_renders() {
        let mut scheduler = active_scheduler();
        let ticket = scheduler.begin(Trigger::Tick).unwrap();
        scheduler.finish(ticket, &Ok(57));

        let ticket = scheduler.begin(Trigger::Forced).unwrap();
        let completion = scheduler.finish(ticket, &Ok(57));
        assert_eq!(completion.committed, Some(Status::Value { percent: 57 }));
    }

    #[test]
    fn test_repeated_error_is_deduplicated() {
        let mut scheduler = active_scheduler();
        let err = || {
            Err(TransportError::DeviceNotFound {
                vid: 0x3151,
                pid: 0x5007,
            })
        };

        let ticket = scheduler.begin(Trigger::Tick).unwrap();
        assert!(scheduler.finish(ticket, &err()).committed.is_some());

        let ticket = scheduler.begin(Trigger::Tick).unwrap();
        assert!(scheduler.finish(ticket, &err()).committed.is_none());

        let ticket = scheduler.begin(Trigger::Tick).unwrap();
        let other = Err(TransportError::Read("io".into()));
        assert!(scheduler.finish(ticket, &other).committed.is_some());
    }

    #[test]
    fn test_first_result_always_commits() {
        let mut scheduler = PollingScheduler::new(DeviceConfig::default());
        let ticket = scheduler.begin(Trigger::Tick).unwrap();
        let completion = scheduler.finish(ticket, &Ok(0));
        assert_eq!(completion.committed, Some(Status::Value { percent: 0 }));
    }
}

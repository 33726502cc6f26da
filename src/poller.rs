//! Poller task
//!
//! Drives [`PollingScheduler`] on a single task: commands, the interval
//! timer and the one in-flight read are multiplexed with `tokio::select!`,
//! so at most one HID handle is ever open and status changes are ordered by
//! read completion.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use miao_transport::{BatteryReader, DeviceConfig, TransportError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::render::Renderer;
use crate::scheduler::{ConsumerId, PollTicket, PollingScheduler, Reaction, TimerDirective, Trigger};
use crate::status::Status;

/// Anything that can produce a battery reading for a config snapshot
#[async_trait]
pub trait BatterySource: Send + Sync {
    async fn read(&self, config: &DeviceConfig) -> Result<u8, TransportError>;
}

#[async_trait]
impl BatterySource for BatteryReader {
    async fn read(&self, config: &DeviceConfig) -> Result<u8, TransportError> {
        BatteryReader::read(self, config).await
    }
}

enum PollerCommand {
    ForceRefresh,
    UpdateConfig(DeviceConfig),
    Register(ConsumerId),
    Unregister(ConsumerId),
    Snapshot(oneshot::Sender<Status>),
    Shutdown,
}

/// Cloneable handle to a running [`Poller`]
///
/// Calls on a stopped poller are ignored.
#[derive(Clone)]
pub struct PollerHandle {
    tx: mpsc::UnboundedSender<PollerCommand>,
}

impl PollerHandle {
    fn send(&self, command: PollerCommand) {
        if self.tx.send(command).is_err() {
            debug!("Poller stopped, command dropped");
        }
    }

    /// Poll now and render even if the value is unchanged
    pub fn force_refresh(&self) {
        self.send(PollerCommand::ForceRefresh);
    }

    /// Replace the config snapshot
    pub fn update_config(&self, config: DeviceConfig) {
        self.send(PollerCommand::UpdateConfig(config));
    }

    /// A display surface appeared
    pub fn register(&self, consumer: impl Into<ConsumerId>) {
        self.send(PollerCommand::Register(consumer.into()));
    }

    /// A display surface went away
    pub fn unregister(&self, consumer: impl Into<ConsumerId>) {
        self.send(PollerCommand::Unregister(consumer.into()));
    }

    /// Currently committed status, `None` once the poller has stopped
    pub async fn status(&self) -> Option<Status> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(PollerCommand::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    pub fn shutdown(&self) {
        self.send(PollerCommand::Shutdown);
    }
}

type ReadFuture = BoxFuture<'static, (PollTicket, Result<u8, TransportError>)>;

pub struct Poller<R: Renderer> {
    scheduler: PollingScheduler,
    source: Arc<dyn BatterySource>,
    renderer: R,
    commands: mpsc::UnboundedReceiver<PollerCommand>,
}

impl<R: Renderer> Poller<R> {
    pub fn new(
        source: Arc<dyn BatterySource>,
        renderer: R,
        config: DeviceConfig,
    ) -> (Self, PollerHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let poller = Self {
            scheduler: PollingScheduler::new(config),
            source,
            renderer,
            commands,
        };
        (poller, PollerHandle { tx })
    }

    /// Start the poller on the current runtime
    pub fn spawn(
        source: Arc<dyn BatterySource>,
        renderer: R,
        config: DeviceConfig,
    ) -> (PollerHandle, JoinHandle<()>) {
        let (poller, handle) = Self::new(source, renderer, config);
        (handle, tokio::spawn(poller.run()))
    }

    /// Run until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        let mut timer: Option<Interval> = None;
        let mut in_flight: Option<ReadFuture> = None;

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    match command {
                        PollerCommand::Shutdown => break,
                        PollerCommand::ForceRefresh => {
                            self.trigger(Trigger::Forced, &mut in_flight);
                        }
                        PollerCommand::UpdateConfig(config) => {
                            let reaction = self.scheduler.apply_config(config);
                            self.react(reaction, &mut timer, &mut in_flight);
                        }
                        PollerCommand::Register(consumer) => {
                            info!("Consumer {} registered", consumer);
                            let status = self.scheduler.status().clone();
                            self.renderer.render(&consumer, &status);
                            let reaction = self.scheduler.register_consumer(consumer);
                            self.react(reaction, &mut timer, &mut in_flight);
                        }
                        PollerCommand::Unregister(consumer) => {
                            info!("Consumer {} unregistered", consumer);
                            let directive = self.scheduler.unregister_consumer(&consumer);
                            apply_timer(directive, &mut timer);
                        }
                        PollerCommand::Snapshot(reply) => {
                            let _ = reply.send(self.scheduler.status().clone());
                        }
                    }
                }
                _ = next_tick(&mut timer) => {
                    self.trigger(Trigger::Tick, &mut in_flight);
                }
                (ticket, result) = wait_read(&mut in_flight) => {
                    in_flight = None;
                    let completion = self.scheduler.finish(ticket, &result);
                    if let Some(status) = completion.committed {
                        self.render_all(&status);
                    }
                    if completion.follow_up {
                        debug!("Honouring forced refresh requested during read");
                        self.trigger(Trigger::Forced, &mut in_flight);
                    }
                }
            }
        }

        debug!("Poller stopped");
    }

    fn trigger(&mut self, trigger: Trigger, in_flight: &mut Option<ReadFuture>) {
        let Some(ticket) = self.scheduler.begin(trigger) else {
            debug!("Read in flight, {:?} trigger deferred or dropped", trigger);
            return;
        };

        let source = Arc::clone(&self.source);
        let config = Arc::clone(self.scheduler.config());
        *in_flight = Some(Box::pin(async move {
            let result = source.read(&config).await;
            (ticket, result)
        }));
    }

    fn react(
        &mut self,
        reaction: Reaction,
        timer: &mut Option<Interval>,
        in_flight: &mut Option<ReadFuture>,
    ) {
        apply_timer(reaction.timer, timer);
        if reaction.poll_now {
            self.trigger(Trigger::Forced, in_flight);
        }
    }

    fn render_all(&mut self, status: &Status) {
        for consumer in self.scheduler.consumers() {
            self.renderer.render(consumer, status);
        }
    }
}

fn apply_timer(directive: TimerDirective, timer: &mut Option<Interval>) {
    match directive {
        TimerDirective::Keep => {}
        TimerDirective::Start(period) => {
            // First tick one full period out; callers issue their own immediate poll
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *timer = Some(interval);
            info!("Polling every {:?}", period);
        }
        TimerDirective::Stop => {
            *timer = None;
            info!("Polling stopped, no consumers");
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn wait_read(in_flight: &mut Option<ReadFuture>) -> (PollTicket, Result<u8, TransportError>) {
    match in_flight {
        Some(read) => read.await,
        None => std::future::pending().await,
    }
}

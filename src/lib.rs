// Angry Miao receiver battery poller - shared library
// Status model, polling scheduler, config adapter and renderers

pub mod config;
pub mod poller;
pub mod render;
pub mod scheduler;
pub mod status;

pub use config::{
    backoff_delay, reconcile, BackoffState, ConfigAdapter, ConfigError, ConfigSource,
    ConfigUpdate, FileConfigSource, LoadOutcome, RawConfig,
};
pub use poller::{BatterySource, Poller, PollerHandle};
pub use render::{ConsoleFormat, ConsoleRenderer, PowerSupplyStatus, Renderer, StatusFileRenderer};
pub use scheduler::{ConsumerId, PollingScheduler, PollingState, TimerDirective, Trigger};
pub use status::Status;

pub use miao_transport::{BatteryReader, DeviceConfig, TransportError};

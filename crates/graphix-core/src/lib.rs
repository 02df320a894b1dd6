pub mod clock;
pub mod codec;
pub mod controller;
pub mod schedule;
pub mod state;
pub mod status;
pub mod tags;
pub mod transport;
#[cfg(feature = "simulation")]
pub mod transport_sim;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{ChecksumAlgorithm, Command, DecodeError, FrameCodec, FrameFormat};
pub use controller::{ScrapeConfig, ScrapeController, TickOutcome};
pub use schedule::{IntervalScheduler, Scheduler};
pub use state::{CachedState, Reading, ScrapeCounters, StateExchange};
pub use status::{ScrapeFailure, ScrapeStatus};
pub use transport::{Transport, TransportError};
#[cfg(feature = "simulation")]
pub use transport_sim::{ScriptedTransport, SimulatedGauge};

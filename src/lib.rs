//! vario - real-time flight instrument core for glider navigation
//!
//! This library ingests the line-oriented GPS/Flarm sensor protocol,
//! maintains the aircraft's navigational state, and evaluates task
//! progress, airspace proximity and nearby traffic. Presentation layers
//! consume the event stream; they never reach into engine state.

pub mod airspace;
pub mod airspace_engine;
pub mod client;
pub mod config;
pub mod flarm;
pub mod geodesy;
pub mod instrument;
pub mod position;
pub mod sentence;
pub mod task;
pub mod task_engine;

pub use airspace::{ActivityWindow, AirspaceClass, AirspaceVolume, AltitudeLimit};
pub use airspace_engine::{AirspaceProximityEngine, ProximityBand, ProximityWarning};
pub use client::{DeviceClient, DeviceClientConfig, DeviceEvent};
pub use config::InstrumentConfig;
pub use flarm::{AlarmLevel, CollisionAlert, FlarmAlertDecoder, TrafficTarget};
pub use instrument::{CoreEvent, InstrumentCore};
pub use position::{AltitudeSource, FixQuality, PositionFix, PositionTracker};
pub use sentence::{Sentence, SentenceError, parse_sentence};
pub use task::{Task, TaskClass, TaskError, TaskPoint, TaskRole, TaskScheme};
pub use task_engine::{TaskEngine, TaskEvent, TaskState};

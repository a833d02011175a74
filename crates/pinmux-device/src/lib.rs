//! Device model for the pinmux engine.
//!
//! A [`Registry`] owns the pins, signals and peripherals of one device. The
//! [`MappingGraph`] on top of it records which pin/mux placements are
//! selected and keeps selections mutually exclusive. [`check_conflicts`]
//! scans the graph for pins or signals claimed twice. A [`DeviceSession`]
//! owns the graph together with the device's variables, applies pin maps
//! driven by those variables and saves and restores everything through
//! [`Settings`](pinmux_vars::Settings).

pub mod conflict;
pub mod error;
pub mod mapping;
pub mod pcr;
pub mod registry;
pub mod session;
pub mod template;
pub mod writer;

pub use conflict::{check_conflicts, CheckRequest, ConflictReport, ConflictScheduler};
pub use error::DeviceError;
pub use mapping::{MappingGraph, ModelNode};
pub use pcr::{pcr_value, PcrField, PROPERTIES_MASK};
pub use registry::{
    is_power_signal, ClockInfo, MappingId, MappingInfo, Peripheral, PeripheralId, Pin, PinId, Registry, Signal,
    SignalId,
};
pub use session::{DeviceSession, Placements, SessionConfig};
pub use template::{SignalParts, TemplateRule, TemplateSet};
pub use writer::{ordered_signals, writer_for, GenericWriter, PeripheralWriter};

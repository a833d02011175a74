//! Shared vocabulary for the pinmux engine.
//!
//! Everything here is used by both the variable engine (`pinmux-vars`) and the
//! device model (`pinmux-device`): the change notification [`Bus`], severity
//! tagged [`Status`] values, the [`MuxSelection`] enumeration and the
//! [`StructuralError`] raised while a model is being built.

pub mod error;
pub mod mux;
pub mod notify;
pub mod status;

pub use error::StructuralError;
pub use mux::MuxSelection;
pub use notify::{Bus, ChangeEvent, ListenerId, Properties};
pub use status::{most_severe, Severity, Status, StatusKind};

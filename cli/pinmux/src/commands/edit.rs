//! `pinmux map`, `release`, `select` and `set`.
//!
//! Each edit is followed by the conflict check it triggers; any conflicts
//! found are appended to the command's output.

use std::time::Duration;

use anyhow::Result;
use pinmux_core::MuxSelection;
use pinmux_device::DeviceSession;

/// Wait for the debounced check, or run one directly if none is scheduled.
fn settle(session: &mut DeviceSession, mut out: String) -> String {
    let timeout = session.config().debounce() + Duration::from_secs(1);
    let report = match session.wait_for_conflict_check(timeout) {
        Some(report) => report,
        None => session.check_conflicts_now(),
    };
    for message in report.messages() {
        out.push_str("\nconflict: ");
        out.push_str(message);
    }
    out
}

fn outcome(changed: bool, what: String) -> String {
    if changed {
        what
    } else {
        format!("{what} (unchanged)")
    }
}

pub fn map(session: &mut DeviceSession, signal: &str, pin: &str) -> Result<String> {
    let changed = session.map_signal(signal, pin)?;
    Ok(settle(session, outcome(changed, format!("{signal} -> {pin}"))))
}

pub fn release(session: &mut DeviceSession, signal: &str) -> Result<String> {
    let changed = session.release_signal(signal)?;
    Ok(settle(session, outcome(changed, format!("{signal} released"))))
}

pub fn select(session: &mut DeviceSession, pin: &str, mux: &str) -> Result<String> {
    let mux: MuxSelection = mux.parse()?;
    let changed = session.select_pin(pin, mux)?;
    let id = session.registry().find_pin(pin)?;
    let now = session.graph().pin_selection(id);
    Ok(settle(session, outcome(changed, format!("{pin} = {now}"))))
}

pub fn set(session: &mut DeviceSession, key: &str, value: &str) -> Result<String> {
    let changed = session.set_persistent_value(key, value)?;
    let shown = super::inspect::get(session, key)?;
    Ok(settle(session, outcome(changed, shown)))
}

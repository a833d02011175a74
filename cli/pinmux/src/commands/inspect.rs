//! `pinmux pins`, `pinmux signals`, `pinmux get` and `pinmux subst`.

use std::fmt::Write;

use anyhow::{Context, Result};
use pinmux_core::Status;
use pinmux_device::{ordered_signals, writer_for, DeviceSession};

fn status_suffix(status: Option<&Status>) -> String {
    match status {
        Some(s) if s.is_problem() => format!("  ! {s}"),
        _ => String::new(),
    }
}

/// Every pin with its current setting and the options it offers.
pub fn pins(session: &DeviceSession) -> String {
    let reg = session.registry();
    let graph = session.graph();
    let mut out = String::new();
    for (id, pin) in reg.pins() {
        let current = graph.pin_selection(id);
        let carried: Vec<String> = graph
            .selected_on_pin(id)
            .into_iter()
            .map(|m| reg.signal_list(m))
            .collect();
        let _ = write!(out, "{} = {current}", pin.name());
        if !carried.is_empty() {
            let _ = write!(out, " ({})", carried.join(", "));
        }
        if pin.properties() != 0 {
            let _ = write!(out, "  pcr={:#010x}", graph.pin_pcr(id));
        }
        if let Some(desc) = pin.description() {
            let _ = write!(out, "  \"{desc}\"");
        }
        let _ = writeln!(out, "{}", status_suffix(pin.status()));
        for (mux, mapping) in pin.mappings() {
            let marker = if reg.mapping(mapping).is_selected() { '*' } else { ' ' };
            let reset = if mux == pin.reset_mux() { "  (reset)" } else { "" };
            let _ = writeln!(out, "  {marker} {:<8}{}{reset}", mux.short_name(), reg.signal_list(mapping));
        }
    }
    out
}

/// Signals grouped by peripheral, each with the pin it sits on.
pub fn signals(session: &DeviceSession) -> String {
    let reg = session.registry();
    let graph = session.graph();
    let mut out = String::new();
    for (id, peripheral) in reg.peripherals() {
        let writer = writer_for(peripheral.base());
        let _ = writeln!(
            out,
            "{} [{}]{}",
            writer.class_name(peripheral),
            writer.group_name(),
            status_suffix(session.peripheral_status(id).as_ref())
        );
        for signal_id in ordered_signals(reg, peripheral) {
            let signal = reg.signal(signal_id);
            let pin = graph.signal_pin(signal_id);
            let place = if pin.is_sentinel() {
                "(unassigned)".to_string()
            } else {
                reg.pin(pin).name().to_string()
            };
            let _ = writeln!(out, "  {:<16} -> {place}{}", signal.name(), status_suffix(signal.status()));
        }
    }
    out
}

pub fn get(session: &DeviceSession, key: &str) -> Result<String> {
    let var = session
        .vars()
        .variable(key)
        .with_context(|| format!("no variable {key}"))?;
    let mut out = format!("{} = {}", var.key(), var.value_as_string());
    if var.is_derived() {
        out.push_str("  (derived)");
    }
    if !var.is_enabled() {
        out.push_str("  (disabled)");
    }
    out.push_str(&status_suffix(var.status()));
    Ok(out)
}

pub fn subst(session: &DeviceSession, key: &str) -> Result<String> {
    Ok(session.vars().substitution_value(key)?)
}

//! `pinmux check`: report mapping conflicts and variable problems.

use anyhow::{bail, Result};
use pinmux_core::Severity;
use pinmux_device::DeviceSession;

pub fn run(session: &mut DeviceSession) -> Result<String> {
    let report = session.check_conflicts_now();
    let mut problems: Vec<String> = report.messages().map(|m| format!("conflict: {m}")).collect();
    let mut warnings = Vec::new();
    for (_, var) in session.vars().iter() {
        let Some(status) = var.status().filter(|s| s.is_problem()) else {
            continue;
        };
        let line = format!("{}: {}", var.key(), status.message);
        if status.severity == Severity::Error {
            problems.push(line);
        } else {
            warnings.push(line);
        }
    }
    if !problems.is_empty() {
        problems.extend(warnings);
        bail!("{} problem(s)\n{}", problems.len(), problems.join("\n"));
    }
    tracing::info!(pins = session.registry().pin_count(), "device is consistent");
    let mut out = String::from("ok");
    for warning in warnings {
        out.push_str("\nwarning: ");
        out.push_str(&warning);
    }
    Ok(out)
}

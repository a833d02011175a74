//! Conflict detection over the selected mappings.
//!
//! A scan visits every selected mapping once and fills two buckets: the
//! distinct signal lists seen on each pin, and the distinct pins seen for
//! each signal list. A bucket with more than one entry is a conflict. Every
//! pin, signal and mapping involved gets an error status; anything that was
//! conflicted before but is no longer involved has its status cleared.
//!
//! Scans are requested through a [`ConflictScheduler`], which debounces
//! requests on a timer thread. The timer only posts a message; the scan
//! itself runs on the thread that owns the graph.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pinmux_core::{Properties, Status, StatusKind};
use uuid::Uuid;

use crate::mapping::{MappingGraph, ModelNode};
use crate::registry::{MappingId, PinId, SignalId};

/// Outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    /// One message per pin carrying more than one signal list.
    pub pin_conflicts: Vec<String>,
    /// One message per signal list active on more than one pin.
    pub signal_conflicts: Vec<String>,
    /// Nodes whose status was set or cleared by this scan.
    pub updated: usize,
}

impl ConflictReport {
    pub fn is_clean(&self) -> bool {
        self.pin_conflicts.is_empty() && self.signal_conflicts.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.pin_conflicts
            .iter()
            .chain(&self.signal_conflicts)
            .map(String::as_str)
    }
}

#[derive(Default)]
struct Findings {
    pins: BTreeMap<PinId, String>,
    signals: BTreeMap<SignalId, String>,
    mappings: BTreeMap<MappingId, String>,
}

impl Findings {
    fn blame_mapping(&mut self, graph: &MappingGraph, id: MappingId, message: &str) {
        self.mappings.entry(id).or_insert_with(|| message.to_string());
        for signal in graph.registry().mapping(id).signals() {
            self.signals.entry(*signal).or_insert_with(|| message.to_string());
        }
    }
}

/// Scan the graph and publish conflict statuses.
pub fn check_conflicts(graph: &mut MappingGraph) -> ConflictReport {
    let reg = graph.registry();

    let mut by_pin: BTreeMap<PinId, BTreeMap<String, Vec<MappingId>>> = BTreeMap::new();
    let mut by_list: BTreeMap<String, BTreeMap<PinId, Vec<MappingId>>> = BTreeMap::new();
    for (id, m) in reg.mappings() {
        if !m.is_selected() || m.pin().is_sentinel() {
            continue;
        }
        let list = reg.signal_list(id);
        by_pin
            .entry(m.pin())
            .or_default()
            .entry(list.clone())
            .or_default()
            .push(id);
        if !m.is_fixed() {
            by_list.entry(list).or_default().entry(m.pin()).or_default().push(id);
        }
    }

    let mut report = ConflictReport::default();
    let mut found = Findings::default();

    for (pin, lists) in &by_pin {
        if lists.len() < 2 {
            continue;
        }
        let claims: Vec<String> = lists
            .values()
            .flatten()
            .map(|id| {
                let m = reg.mapping(*id);
                format!("{}@{}", reg.signal_list(*id), m.mux())
            })
            .collect();
        let message = format!(
            "({}) =>> {}: pin mapped to multiple signals",
            claims.join(", "),
            reg.pin(*pin).name()
        );
        found.pins.entry(*pin).or_insert_with(|| message.clone());
        for id in lists.values().flatten() {
            found.blame_mapping(graph, *id, &message);
        }
        report.pin_conflicts.push(message);
    }

    for (list, pins) in &by_list {
        if pins.len() < 2 {
            continue;
        }
        let names: Vec<&str> = pins.keys().map(|p| reg.pin(*p).name()).collect();
        let message = format!("{list} =>> ({}): signal mapped to multiple pins", names.join(", "));
        for (pin, ids) in pins {
            found.pins.entry(*pin).or_insert_with(|| message.clone());
            for id in ids {
                found.blame_mapping(graph, *id, &message);
            }
        }
        report.signal_conflicts.push(message);
    }

    report.updated = publish(graph, found);
    if report.is_clean() {
        tracing::debug!(updated = report.updated, "conflict check clean");
    } else {
        tracing::info!(
            pins = report.pin_conflicts.len(),
            signals = report.signal_conflicts.len(),
            "conflicts detected"
        );
    }
    report
}

fn conflict_status(message: Option<&String>) -> Option<Status> {
    message.map(|m| Status::error(StatusKind::Conflict, m.clone()))
}

/// Replace conflict statuses, notifying only nodes whose status changed.
fn publish(graph: &mut MappingGraph, found: Findings) -> usize {
    let mut changed = Vec::new();
    let reg = graph.registry_mut();

    let pins: Vec<PinId> = reg.pins().map(|(id, _)| id).collect();
    for id in pins {
        let pin = reg.pin_mut(id);
        if replace_conflict(&mut pin.status, conflict_status(found.pins.get(&id))) {
            changed.push(ModelNode::Pin(id));
        }
    }
    let signals: Vec<SignalId> = reg.signals().map(|(id, _)| id).collect();
    for id in signals {
        let signal = reg.signal_mut(id);
        if replace_conflict(&mut signal.status, conflict_status(found.signals.get(&id))) {
            changed.push(ModelNode::Signal(id));
        }
    }
    let mappings: Vec<MappingId> = reg.mappings().map(|(id, _)| id).collect();
    for id in mappings {
        let mapping = reg.mapping_mut(id);
        if replace_conflict(&mut mapping.status, conflict_status(found.mappings.get(&id))) {
            changed.push(ModelNode::Mapping(id));
        }
    }

    for node in &changed {
        graph.bus().notify(*node, Properties::STATUS);
    }
    changed.len()
}

/// Set or clear a conflict status. Statuses of other kinds are left alone
/// unless a conflict replaces them.
fn replace_conflict(slot: &mut Option<Status>, next: Option<Status>) -> bool {
    match next {
        Some(next) => {
            if slot.as_ref() == Some(&next) {
                return false;
            }
            *slot = Some(next);
            true
        }
        None if slot.as_ref().is_some_and(|s| s.kind == StatusKind::Conflict) => {
            *slot = None;
            true
        }
        None => false,
    }
}

/// Message posted by the debounce timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckRequest {
    pub session: Uuid,
}

/// Debounces conflict-check requests.
///
/// The first request arms a timer thread; further requests while it is armed
/// are coalesced. When the timer fires it posts a [`CheckRequest`] tagged
/// with the session id. The owner drains requests with
/// [`take_due`](Self::take_due) and runs the scan itself. Requests carrying
/// an older session id are discarded.
#[derive(Debug)]
pub struct ConflictScheduler {
    session: Uuid,
    interval: Duration,
    pending: Arc<AtomicBool>,
    tx: Sender<CheckRequest>,
    rx: Receiver<CheckRequest>,
}

impl ConflictScheduler {
    pub fn new(session: Uuid, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            session,
            interval,
            pending: Arc::new(AtomicBool::new(false)),
            tx,
            rx,
        }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// A check has been requested and not yet taken.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Arm the timer unless it is already armed.
    pub fn request(&self) {
        if self.pending.swap(true, Ordering::AcqRel) {
            tracing::trace!(session = %self.session, "conflict check already pending");
            return;
        }
        let request = CheckRequest { session: self.session };
        let tx = self.tx.clone();
        let interval = self.interval;
        let spawned = thread::Builder::new()
            .name("pinmux-conflict-timer".into())
            .spawn(move || {
                thread::sleep(interval);
                let _ = tx.send(request);
            });
        match spawned {
            Ok(_) => tracing::trace!(session = %self.session, ?interval, "conflict check scheduled"),
            Err(e) => {
                tracing::warn!(error = %e, "timer thread unavailable, check due immediately");
                let _ = self.tx.send(request);
            }
        }
    }

    /// Start a new session id. Requests already in flight become stale.
    pub fn renew(&mut self, session: Uuid) {
        tracing::debug!(old = %self.session, new = %session, "conflict scheduler renewed");
        self.session = session;
        self.pending.store(false, Ordering::Release);
    }

    /// Drain posted requests. Returns true if a current one arrived.
    pub fn take_due(&self) -> bool {
        let mut due = false;
        while let Ok(request) = self.rx.try_recv() {
            due |= self.accept(request);
        }
        due
    }

    /// Block until a current request arrives or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(request) => {
                    if self.accept(request) {
                        return true;
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    fn accept(&self, request: CheckRequest) -> bool {
        if request.session != self.session {
            tracing::debug!(stale = %request.session, "dropping stale conflict check");
            return false;
        }
        self.pending.store(false, Ordering::Release);
        true
    }
}

#[cfg(test)]
mod tests {
    use pinmux_core::MuxSelection;

    use super::*;
    use crate::registry::Registry;

    fn graph() -> (MappingGraph, PinId, PinId, SignalId, SignalId) {
        let mut reg = Registry::new();
        let ptb0 = reg.create_pin("PTB0").unwrap();
        let ptb1 = reg.create_pin("PTB1").unwrap();
        let uart = reg.create_peripheral("UART", "0").unwrap();
        let spi = reg.create_peripheral("SPI", "0").unwrap();
        let tx = reg.create_signal("UART0_TX", uart, "TX").unwrap();
        let sck = reg.create_signal("SPI0_SCK", spi, "SCK").unwrap();
        let mut graph = MappingGraph::new(reg);
        graph.create_mapping(ptb0, MuxSelection::Mux2, tx).unwrap();
        graph.create_mapping(ptb0, MuxSelection::Mux3, sck).unwrap();
        graph.create_mapping(ptb1, MuxSelection::Mux2, tx).unwrap();
        (graph, ptb0, ptb1, tx, sck)
    }

    #[test]
    fn clean_graph_has_no_statuses() {
        let (mut graph, ptb0, _, tx, _) = graph();
        graph.select_from_pin(ptb0, MuxSelection::Mux2).unwrap();
        let report = check_conflicts(&mut graph);
        assert!(report.is_clean());
        assert_eq!(report.updated, 0);
        assert!(graph.registry().signal(tx).status().is_none());
    }

    #[test]
    fn pin_claimed_twice() {
        let (mut graph, ptb0, _, tx, sck) = graph();
        let a = graph.registry().pin(ptb0).mapping(MuxSelection::Mux2).unwrap();
        let b = graph.registry().pin(ptb0).mapping(MuxSelection::Mux3).unwrap();
        graph.restore_selection(a);
        graph.restore_selection(b);

        let report = check_conflicts(&mut graph);
        assert_eq!(
            report.pin_conflicts,
            vec!["(UART0_TX@mux2, SPI0_SCK@mux3) =>> PTB0: pin mapped to multiple signals".to_string()]
        );
        let reg = graph.registry();
        for status in [
            reg.pin(ptb0).status(),
            reg.signal(tx).status(),
            reg.signal(sck).status(),
            reg.mapping(a).status(),
        ] {
            let status = status.unwrap();
            assert!(status.is_problem());
            assert_eq!(status.kind, StatusKind::Conflict);
        }
    }

    #[test]
    fn signal_on_two_pins_then_resolved() {
        let (mut graph, ptb0, ptb1, tx, _) = graph();
        let a = graph.registry().pin(ptb0).mapping(MuxSelection::Mux2).unwrap();
        let b = graph.registry().pin(ptb1).mapping(MuxSelection::Mux2).unwrap();
        graph.restore_selection(a);
        graph.restore_selection(b);

        let report = check_conflicts(&mut graph);
        assert_eq!(
            report.signal_conflicts,
            vec!["UART0_TX =>> (PTB0, PTB1): signal mapped to multiple pins".to_string()]
        );
        assert!(graph.registry().pin(ptb1).status().is_some());

        graph.select_from_signal(tx, b).unwrap();
        let report = check_conflicts(&mut graph);
        assert!(report.is_clean());
        assert!(report.updated > 0);
        assert!(graph.registry().pin(ptb0).status().is_none());
        assert!(graph.registry().signal(tx).status().is_none());
    }

    #[test]
    fn rescan_without_change_is_quiet() {
        let (mut graph, ptb0, ptb1, _, _) = graph();
        let a = graph.registry().pin(ptb0).mapping(MuxSelection::Mux2).unwrap();
        let b = graph.registry().pin(ptb1).mapping(MuxSelection::Mux2).unwrap();
        graph.restore_selection(a);
        graph.restore_selection(b);
        assert!(check_conflicts(&mut graph).updated > 0);
        assert_eq!(check_conflicts(&mut graph).updated, 0);
    }

    #[test]
    fn requests_coalesce() {
        let scheduler = ConflictScheduler::new(Uuid::new_v4(), Duration::from_millis(10));
        scheduler.request();
        scheduler.request();
        assert!(scheduler.is_pending());
        assert!(scheduler.wait(Duration::from_secs(5)));
        assert!(!scheduler.is_pending());
        thread::sleep(Duration::from_millis(30));
        assert!(!scheduler.take_due());
    }

    #[test]
    fn stale_requests_dropped() {
        let mut scheduler = ConflictScheduler::new(Uuid::new_v4(), Duration::from_millis(10));
        scheduler.request();
        scheduler.renew(Uuid::new_v4());
        assert!(!scheduler.is_pending());
        assert!(!scheduler.wait(Duration::from_millis(200)));
    }
}

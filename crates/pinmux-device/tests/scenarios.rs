//! End-to-end selection and conflict behaviour of the mapping graph.

use std::cell::Cell;
use std::rc::Rc;

use pinmux_core::{MuxSelection, Severity, StatusKind, StructuralError};
use pinmux_device::{check_conflicts, MappingGraph, MappingId, PinId, Registry, SignalId, TemplateSet};
use proptest::prelude::*;

const TABLE: &[(&str, MuxSelection, &str)] = &[
    ("PTA0", MuxSelection::Mux1, "UART0_TX"),
    ("PTA0", MuxSelection::Mux2, "SPI0_SCK"),
    ("PTA1", MuxSelection::Mux1, "UART0_TX"),
    ("PTA1", MuxSelection::Mux3, "FTM0_CH0"),
    ("PTA2", MuxSelection::Mux0, "GPIOA_2"),
    ("PTA2", MuxSelection::Mux0, "LLWU_P1"),
    ("PTA2", MuxSelection::Mux2, "SPI0_SCK"),
    ("PTA3", MuxSelection::Mux3, "FTM0_CH0"),
    ("PTA3", MuxSelection::Mux4, "LLWU_P1"),
    ("PTB0", MuxSelection::Mux0, "GPIOB_0"),
    ("PTB0", MuxSelection::Mux2, "I2C0_SCL"),
];

fn build(table: &[(&str, MuxSelection, &str)]) -> MappingGraph {
    let templates = TemplateSet::with_defaults().unwrap();
    let mut reg = Registry::new();
    let rows: Vec<(PinId, MuxSelection, SignalId)> = table
        .iter()
        .map(|(pin, mux, signal)| {
            let pin = reg.find_or_create_pin(pin);
            let (_, signal) = templates.register(&mut reg, signal).unwrap();
            (pin, *mux, signal)
        })
        .collect();
    let mut graph = MappingGraph::new(reg);
    for (pin, mux, signal) in rows {
        graph.create_mapping(pin, mux, signal).unwrap();
    }
    graph
}

#[derive(Debug, Clone, Copy)]
enum Op {
    FromPin(usize, usize),
    FromSignal(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..16usize, 0..16usize).prop_map(|(a, b)| Op::FromPin(a, b)),
        (0..16usize, 0..16usize).prop_map(|(a, b)| Op::FromSignal(a, b)),
    ]
}

fn apply(graph: &mut MappingGraph, op: Op) {
    match op {
        Op::FromPin(a, b) => {
            let pins: Vec<PinId> = graph.registry().pins().map(|(id, _)| id).collect();
            let pin = pins[a % pins.len()];
            let mut options: Vec<MuxSelection> = graph.registry().pin(pin).mappings().map(|(m, _)| m).collect();
            options.extend([MuxSelection::Disabled, MuxSelection::Reset, MuxSelection::Unassigned]);
            graph.select_from_pin(pin, options[b % options.len()]).unwrap();
        }
        Op::FromSignal(a, b) => {
            let signals: Vec<SignalId> = graph.registry().signals().map(|(id, _)| id).collect();
            let signal = signals[a % signals.len()];
            let mut options = graph.registry().signal(signal).mappings().to_vec();
            options.push(MappingId::UNASSIGNED);
            graph.select_from_signal(signal, options[b % options.len()]).unwrap();
        }
    }
}

fn selection(graph: &MappingGraph) -> Vec<bool> {
    graph.registry().mappings().map(|(_, m)| m.is_selected()).collect()
}

fn assert_exclusive(graph: &MappingGraph) {
    let reg = graph.registry();
    for (_, pin) in reg.pins() {
        let selected = pin
            .mappings()
            .filter(|(_, id)| reg.mapping(*id).is_selected() && !reg.mapping(*id).is_fixed())
            .count();
        assert!(selected <= 1, "{} has {selected} selected mappings", pin.name());
    }
    for (id, signal) in reg.signals() {
        let placements: Vec<MappingId> = signal
            .mappings()
            .iter()
            .copied()
            .filter(|m| reg.mapping(*m).is_selected())
            .collect();
        assert!(placements.len() <= 1, "{} placed {} times", signal.name(), placements.len());
        let expected = placements.first().copied().unwrap_or(MappingId::UNASSIGNED);
        assert_eq!(graph.signal_placement(id), expected);
    }
}

fn count_notifications(graph: &MappingGraph) -> Rc<Cell<usize>> {
    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    graph.bus().subscribe_all(move |_| c.set(c.get() + 1));
    count
}

proptest! {
    #[test]
    fn selections_stay_exclusive(ops in prop::collection::vec(op(), 0..40)) {
        let mut graph = build(TABLE);
        for op in ops {
            apply(&mut graph, op);
            assert_exclusive(&graph);
        }
    }

    #[test]
    fn pin_and_signal_selection_converge(ops in prop::collection::vec(op(), 0..20), pick in any::<prop::sample::Index>()) {
        let mut via_pin = build(TABLE);
        let mut via_signal = build(TABLE);
        for op in ops {
            apply(&mut via_pin, op);
            apply(&mut via_signal, op);
        }
        let mappings: Vec<MappingId> = via_pin.registry().mappings().map(|(id, _)| id).collect();
        let target = mappings[pick.index(mappings.len())];
        let info = via_pin.registry().mapping(target);
        let (pin, mux, signal) = (info.pin(), info.mux(), info.signals()[0]);

        via_pin.select_from_pin(pin, mux).unwrap();
        via_signal.select_from_signal(signal, target).unwrap();
        prop_assert_eq!(selection(&via_pin), selection(&via_signal));
        prop_assert!(via_pin.registry().mapping(target).is_selected());
    }

    #[test]
    fn reselection_is_silent(ops in prop::collection::vec(op(), 1..20)) {
        let mut graph = build(TABLE);
        for op in ops {
            apply(&mut graph, op);
        }
        let selected: Vec<MappingId> = graph
            .registry()
            .mappings()
            .filter(|(_, m)| m.is_selected())
            .map(|(id, _)| id)
            .collect();
        let count = count_notifications(&graph);
        for id in selected {
            let info = graph.registry().mapping(id);
            let (pin, mux, signal) = (info.pin(), info.mux(), info.signals()[0]);
            prop_assert!(!graph.select_from_pin(pin, mux).unwrap());
            prop_assert!(!graph.select_from_signal(signal, id).unwrap());
        }
        prop_assert_eq!(count.get(), 0);
    }
}

#[test]
fn selecting_alternate_function_moves_signals() {
    let mut graph = build(&[
        ("PTA3", MuxSelection::Mux0, "GPIOA_3"),
        ("PTA3", MuxSelection::Mux2, "I2C0_SCL"),
    ]);
    let reg = graph.registry();
    let pta3 = reg.find_pin("PTA3").unwrap();
    let gpio = reg.find_signal("GPIOA_3").unwrap();
    let scl = reg.find_signal("I2C0_SCL").unwrap();

    graph.select_from_pin(pta3, MuxSelection::Mux0).unwrap();
    graph.select_from_pin(pta3, MuxSelection::Mux2).unwrap();

    let reg = graph.registry();
    assert!(!reg.mapping(reg.pin(pta3).mapping(MuxSelection::Mux0).unwrap()).is_selected());
    assert_eq!(graph.signal_placement(gpio), MappingId::UNASSIGNED);
    assert_eq!(graph.signal_pin(scl), pta3);

    assert!(check_conflicts(&mut graph).is_clean());
    let reg = graph.registry();
    assert!(reg.pin(pta3).status().is_none());
    assert!(reg.signal(gpio).status().is_none());
    assert!(reg.signal(scl).status().is_none());
}

#[test]
fn two_signals_forced_onto_one_pin() {
    let mut graph = build(&[
        ("PTB0", MuxSelection::Mux2, "UART0_TX"),
        ("PTB0", MuxSelection::Mux3, "SPI0_SCK"),
    ]);
    let reg = graph.registry();
    let ptb0 = reg.find_pin("PTB0").unwrap();
    let tx = reg.find_signal("UART0_TX").unwrap();
    let sck = reg.find_signal("SPI0_SCK").unwrap();
    let first = reg.pin(ptb0).mapping(MuxSelection::Mux2).unwrap();
    let second = reg.pin(ptb0).mapping(MuxSelection::Mux3).unwrap();

    graph.restore_selection(first);
    graph.restore_selection(second);
    let report = check_conflicts(&mut graph);
    assert_eq!(report.pin_conflicts.len(), 1);

    let reg = graph.registry();
    for status in [reg.pin(ptb0).status(), reg.signal(tx).status(), reg.signal(sck).status()] {
        let status = status.expect("conflict status");
        assert_eq!(status.severity, Severity::Error);
        assert_eq!(status.kind, StatusKind::Conflict);
        assert!(status.message.contains("PTB0"));
    }

    graph.select_from_pin(ptb0, MuxSelection::Mux3).unwrap();
    assert!(check_conflicts(&mut graph).is_clean());
    assert!(graph.registry().pin(ptb0).status().is_none());
}

#[test]
fn supply_nets_do_not_conflict() {
    let mut graph = build(&[("VDD_1", MuxSelection::Fixed, "VDD"), ("VDD_2", MuxSelection::Fixed, "VDD")]);
    assert!(check_conflicts(&mut graph).is_clean());
}

#[test]
fn duplicate_pin_rejected() {
    let mut reg = Registry::new();
    reg.create_pin("PTA3").unwrap();
    assert_eq!(reg.create_pin("PTA3"), Err(StructuralError::DuplicatePin("PTA3".into())));
}

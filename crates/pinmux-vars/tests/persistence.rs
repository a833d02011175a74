//! Persistent values must round-trip through their string form.

use pinmux_vars::{ChoiceData, Settings, SettingsFile, Value, Variable, VariableStore};
use proptest::prelude::*;

fn store_with(variable: Variable) -> VariableStore {
    let mut store = VariableStore::new();
    store.add(variable).unwrap();
    store
}

fn round_trips(mut store: VariableStore, key: &str) {
    let before = store.variable(key).unwrap().value_as_string();
    let persisted = store.persistent_value(key).unwrap();
    assert!(!store.set_persistent_value(key, &persisted).unwrap());
    assert_eq!(store.variable(key).unwrap().value_as_string(), before);
}

proptest! {
    #[test]
    fn long_round_trip(v in any::<i64>(), hex in any::<bool>()) {
        let var = Variable::long("/x/long", v).with_radix(if hex { 16 } else { 10 });
        round_trips(store_with(var), "/x/long");
    }

    #[test]
    fn boolean_round_trip(v in any::<bool>()) {
        round_trips(store_with(Variable::boolean("/x/flag", v)), "/x/flag");
    }

    #[test]
    fn string_round_trip(v in ".*") {
        round_trips(store_with(Variable::string("/x/text", v)), "/x/text");
    }

    #[test]
    fn choice_round_trip(names in prop::collection::vec("[A-Za-z][A-Za-z0-9 ]{0,8}", 1..6), pick in any::<prop::sample::Index>()) {
        let choices: Vec<ChoiceData> = names
            .iter()
            .enumerate()
            .map(|(i, n)| ChoiceData::new(n.clone(), format!("V{i}")))
            .collect();
        let index = pick.index(choices.len());
        round_trips(store_with(Variable::choice("/x/choice", choices, index)), "/x/choice");
    }

    #[test]
    fn bitmask_round_trip(permitted in any::<u64>(), v in any::<u64>()) {
        let var = Variable::bitmask("/x/mask", permitted, v & permitted);
        let store = store_with(var);
        prop_assert!(store.persistent_value("/x/mask").unwrap().starts_with("0x"));
        round_trips(store, "/x/mask");
    }

    #[test]
    fn list_round_trip(items in prop::collection::vec("[A-Za-z0-9_]{1,6}", 0..5), semicolon in any::<bool>()) {
        let separator = if semicolon { ';' } else { ',' };
        let var = Variable::list("/x/list", "").with_separator(separator);
        let mut store = store_with(var);
        let joined = items.join(&format!("{separator} "));
        store.set_persistent_value("/x/list", &joined).unwrap();
        prop_assert_eq!(store.persistent_value("/x/list").unwrap(), items.join(&separator.to_string()));
        round_trips(store, "/x/list");
    }

    #[test]
    fn double_round_trip(v in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
        round_trips(store_with(Variable::double("/x/real", v)), "/x/real");
    }
}

#[test]
fn settings_file_restores_store() {
    let mut store = VariableStore::new();
    let rate = store.add(Variable::long("/UART0/baud", 9600)).unwrap();
    store.add(Variable::boolean("/UART0/parity", false)).unwrap();
    store.set_value(rate, 115_200i64).unwrap();

    let mut settings = Settings::new();
    store.save_to(&mut settings);
    let bytes = SettingsFile::new(settings).to_bytes().unwrap();

    let decoded = SettingsFile::from_bytes(&bytes).unwrap();
    let mut fresh = VariableStore::new();
    let fresh_rate = fresh.add(Variable::long("/UART0/baud", 9600)).unwrap();
    fresh.add(Variable::boolean("/UART0/parity", true)).unwrap();
    assert!(fresh.load_from(&decoded.settings).is_empty());
    assert_eq!(fresh.get(fresh_rate).value(), &Value::Long(115_200));
    assert_eq!(fresh.variable("/UART0/parity").unwrap().value_as_bool(), Some(false));
}

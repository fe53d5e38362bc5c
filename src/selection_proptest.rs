//! Property-based tests for client selection.
//!
//! These tests use proptest to generate random client sets and selection
//! modes and verify that selection returns exactly the active clients that
//! pass the chosen membership test, in input order.

#[cfg(test)]
mod proptest_tests {
    use crate::config::{parse_client, ClientRecord};
    use crate::selection::{select, ClientFilter, SelectionCriteria};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn record(name: &str, active: bool) -> ClientRecord {
        parse_client(&format!("name: \"{}\"\nactive: {}\ngitlab: {{}}\n", name, active)).unwrap()
    }

    fn clients_strategy() -> impl Strategy<Value = Vec<(String, bool)>> {
        prop::collection::vec(("[A-Za-z]{1,6}", any::<bool>()), 0..12)
    }

    fn names_strategy() -> impl Strategy<Value = BTreeSet<String>> {
        prop::collection::btree_set("[a-z]{1,6}", 0..6)
    }

    #[derive(Debug, Clone)]
    enum Mode {
        None,
        Single(String),
        Include(BTreeSet<String>),
        Exclude(BTreeSet<String>),
    }

    fn mode_strategy() -> impl Strategy<Value = Mode> {
        prop_oneof![
            Just(Mode::None),
            "[A-Za-z]{1,6}".prop_map(Mode::Single),
            names_strategy().prop_map(Mode::Include),
            names_strategy().prop_map(Mode::Exclude),
        ]
    }

    fn criteria_for(mode: &Mode) -> SelectionCriteria {
        match mode {
            Mode::None => SelectionCriteria::all(ClientFilter::All),
            Mode::Single(name) => SelectionCriteria::single(name.clone(), ClientFilter::All),
            Mode::Include(names) => SelectionCriteria::all(ClientFilter::include(names)),
            Mode::Exclude(names) => SelectionCriteria::all(ClientFilter::exclude(names)),
        }
    }

    fn expected(mode: &Mode, name: &str, active: bool) -> bool {
        let key = name.to_lowercase();
        active
            && match mode {
                Mode::None => true,
                Mode::Single(wanted) => wanted.to_lowercase() == key,
                Mode::Include(names) => names.contains(&key),
                Mode::Exclude(names) => !names.contains(&key),
            }
    }

    proptest! {
        /// Property: selection returns exactly the active clients that satisfy
        /// the one selection mode in effect, preserving input order
        #[test]
        fn select_matches_membership_test(spec in clients_strategy(), mode in mode_strategy()) {
            let clients: Vec<ClientRecord> =
                spec.iter().map(|(n, a)| record(n, *a)).collect();
            let criteria = criteria_for(&mode);

            let got: Vec<usize> = select(&clients, &criteria)
                .map(|c| clients.iter().position(|x| std::ptr::eq(x, c)).unwrap())
                .collect();
            let want: Vec<usize> = spec
                .iter()
                .enumerate()
                .filter(|(_, (n, a))| expected(&mode, n, *a))
                .map(|(i, _)| i)
                .collect();

            prop_assert_eq!(got, want);
        }

        /// Property: inactive clients are never returned, whatever the mode
        #[test]
        fn select_never_returns_inactive(spec in clients_strategy(), mode in mode_strategy()) {
            let clients: Vec<ClientRecord> =
                spec.iter().map(|(n, a)| record(n, *a)).collect();
            let criteria = criteria_for(&mode);
            for client in select(&clients, &criteria) {
                prop_assert!(client.active, "inactive client {} selected", client.name);
            }
        }

        /// Property: an include list and the complementary exclude list
        /// partition the active clients
        #[test]
        fn include_and_exclude_partition_active(spec in clients_strategy(), names in names_strategy()) {
            let clients: Vec<ClientRecord> =
                spec.iter().map(|(n, a)| record(n, *a)).collect();
            let include = SelectionCriteria::all(ClientFilter::include(&names));
            let exclude = SelectionCriteria::all(ClientFilter::exclude(&names));
            let active = clients.iter().filter(|c| c.active).count();
            prop_assert_eq!(
                select(&clients, &include).count() + select(&clients, &exclude).count(),
                active
            );
        }
    }
}

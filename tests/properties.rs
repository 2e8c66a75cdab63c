//! Property-based tests for clock algebra and order-insensitive delivery.

use core::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crdt_sync::clock::{StrictVectorClock, VectorClock};
use crdt_sync::prelude::*;
use parking_lot::Mutex;
use proptest::prelude::*;

fn vector_clock() -> impl Strategy<Value = VectorClock> {
    proptest::collection::btree_map("[a-d]", 1u64..6, 0..4)
        .prop_map(|entries: BTreeMap<String, u64>| entries.into_iter().collect())
}

/// Record every command a CRDT publishes.
fn recorder<C: Crdt + 'static>(crdt: &C) -> Arc<Mutex<Vec<C::Command>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let _sub = crdt.publish(move |command: &C::Command| sink.lock().push(command.clone()));
    log
}

proptest! {
    #[test]
    fn merge_is_commutative(a in vector_clock(), b in vector_clock()) {
        prop_assert_eq!(a.merge(&b), b.merge(&a));
    }

    #[test]
    fn merge_is_associative(a in vector_clock(), b in vector_clock(), c in vector_clock()) {
        prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }

    #[test]
    fn merge_is_idempotent(a in vector_clock()) {
        prop_assert_eq!(a.merge(&a), a.clone());
    }

    #[test]
    fn merge_dominates_or_equals_inputs(a in vector_clock(), b in vector_clock()) {
        let merged = a.merge(&b);
        for input in [&a, &b] {
            prop_assert!(matches!(
                merged.causal_cmp(input),
                Some(Ordering::Greater | Ordering::Equal)
            ));
        }
    }

    #[test]
    fn increment_dominates(a in vector_clock(), replica in "[a-f]") {
        let next = a.increment(&replica);
        prop_assert!(next.dominates(&a));
        prop_assert_eq!(next.get(&replica), a.get(&replica) + 1);
    }

    #[test]
    fn causal_cmp_is_antisymmetric(a in vector_clock(), b in vector_clock()) {
        prop_assert_eq!(a.causal_cmp(&b).map(Ordering::reverse), b.causal_cmp(&a));
    }

    #[test]
    fn strict_clocks_are_totally_ordered(
        a in vector_clock(),
        b in vector_clock(),
        ra in "[p-s]",
        rb in "[p-s]",
    ) {
        let x = StrictVectorClock::new(ra).merge(&from_clock(&a));
        let y = StrictVectorClock::new(rb).merge(&from_clock(&b));
        prop_assert_eq!(x.compare(&y), y.compare(&x).reverse());
        if x.compare(&y) == Ordering::Equal {
            prop_assert!(x == y || x.replica() == y.replica());
        }
    }

    #[test]
    fn gcounter_updates_commute(
        amounts in proptest::collection::vec((0usize..3, 1u64..10), 1..20),
        order in Just((0..20).collect::<Vec<usize>>()).prop_shuffle(),
    ) {
        let writers: Vec<GCounter> = ["w0", "w1", "w2"]
            .iter()
            .map(|id| GCounter::new(*id, "hits"))
            .collect();
        let logs: Vec<_> = writers.iter().map(recorder).collect();
        for &(writer, amount) in &amounts {
            writers[writer].increment_by(amount).unwrap();
        }
        let updates: Vec<GCounterCommand> = logs.iter().flat_map(|log| log.lock().clone()).collect();

        let reader = GCounter::new("reader", "hits");
        for i in order.into_iter().filter(|&i| i < updates.len()) {
            reader.apply(&updates[i]);
        }
        let total: u64 = amounts.iter().map(|&(_, amount)| amount).sum();
        prop_assert_eq!(reader.get(), total);
    }

    #[test]
    fn orset_delivery_order_does_not_matter(
        ops in proptest::collection::vec((0usize..2, any::<bool>(), 0u8..4), 1..16),
        order in Just((0..16).collect::<Vec<usize>>()).prop_shuffle(),
    ) {
        let writers = [ORSet::new("w0", "s"), ORSet::new("w1", "s")];
        let logs: Vec<_> = writers.iter().map(recorder).collect();
        for &(writer, add, value) in &ops {
            if add {
                writers[writer].add(value);
            } else {
                writers[writer].remove(&value);
            }
        }
        let commands: Vec<ORSetCommand<u8>> = logs.iter().flat_map(|log| log.lock().clone()).collect();

        let in_order = ORSet::new("x", "s");
        for command in &commands {
            in_order.apply(command);
        }
        let shuffled = ORSet::new("y", "s");
        for i in order.into_iter().filter(|&i| i < commands.len()) {
            shuffled.apply(&commands[i]);
        }
        prop_assert_eq!(in_order.elements(), shuffled.elements());
    }

    #[test]
    fn rga_head_inserts_converge(
        counts in proptest::collection::vec(1usize..4, 2..4),
        order in Just((0..12).collect::<Vec<usize>>()).prop_shuffle(),
    ) {
        let writers: Vec<Rga<String>> = (0..counts.len())
            .map(|n| Rga::new(format!("w{n}"), "doc"))
            .collect();
        let logs: Vec<_> = writers.iter().map(recorder).collect();
        for (n, &count) in counts.iter().enumerate() {
            for k in 0..count {
                writers[n].add(0, format!("w{n}-{k}")).unwrap();
            }
        }
        let commands: Vec<RgaCommand<String>> = logs.iter().flat_map(|log| log.lock().clone()).collect();

        let in_order = Rga::new("x", "doc");
        for command in &commands {
            in_order.apply(command);
        }
        let shuffled = Rga::new("y", "doc");
        for i in order.into_iter().filter(|&i| i < commands.len()) {
            shuffled.apply(&commands[i]);
        }
        prop_assert_eq!(in_order.len(), commands.len());
        prop_assert_eq!(in_order.to_vec(), shuffled.to_vec());
    }
}

fn from_clock(clock: &VectorClock) -> StrictVectorClock {
    let mut strict = StrictVectorClock::new("");
    for (replica, count) in clock.iter() {
        let mut owned = StrictVectorClock::new(replica);
        for _ in 0..count {
            owned = owned.increment();
        }
        strict = strict.merge(&owned);
    }
    strict
}

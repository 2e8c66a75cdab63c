//! Integration tests verifying convergence across connected replicas.
//!
//! Replicas exchange commands through connect/disconnect, history replay and
//! transitive forwarding; every scenario must end with identical state.

use std::thread;

use crdt_sync::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

fn s(value: &str) -> String {
    value.to_owned()
}

/// Two replicas that share every CRDT created so far, then go offline.
fn offline_pair() -> (Replica<String>, Replica<String>) {
    (Replica::new("N_1"), Replica::new("N_2"))
}

fn share(a: &Replica<String>, b: &Replica<String>) {
    a.connect(b);
    a.disconnect(b);
}

#[test]
fn orset_concurrent_add_survives_remove() {
    let (alice, bob) = offline_pair();
    let on_alice = alice.create_or_set(Some("fruit")).unwrap();
    share(&alice, &bob);
    let on_bob = bob.find_or_set("fruit").unwrap();

    // alice's pear has not reached bob, who adds and removes his own
    on_alice.add(s("pear"));
    on_bob.add(s("pear"));
    assert!(on_bob.remove(&s("pear")));
    assert!(!on_bob.contains(&s("pear")));

    alice.connect(&bob);
    assert!(on_alice.contains(&s("pear")));
    assert!(on_bob.contains(&s("pear")));
    assert_eq!(on_alice.elements(), on_bob.elements());
}

#[test]
fn lww_concurrent_writes_pick_greater_replica() {
    let (n1, n2) = offline_pair();
    let on_n1 = n1.create_lww_register(Some("greeting")).unwrap();
    share(&n1, &n2);
    let on_n2 = n2.find_lww_register("greeting").unwrap();

    on_n1.set(s("Hello"));
    on_n2.set(s("Goodbye"));

    n1.connect(&n2);
    assert_eq!(on_n1.get(), Some(s("Goodbye")));
    assert_eq!(on_n2.get(), Some(s("Goodbye")));

    // a later write from the losing side dominates
    on_n1.set(s("Hello again"));
    assert_eq!(on_n2.get(), Some(s("Hello again")));
}

#[test]
fn mv_register_collapses_after_observing_conflict() {
    let (a, b) = offline_pair();
    let c = Replica::new("N_3");
    let on_a = a.create_mv_register(Some("flavour")).unwrap();
    share(&a, &b);
    let on_b = b.find_mv_register("flavour").unwrap();

    on_a.set(s("strawberry"));
    on_b.set(s("pear"));

    a.connect(&b);
    assert!(on_a.is_conflicted());
    assert_eq!(on_a.get(), vec![s("pear"), s("strawberry")]);
    assert_eq!(on_b.get(), on_a.get());
    assert_eq!(on_b.entries(), on_a.entries());

    b.connect(&c);
    let on_c = c.find_mv_register("flavour").unwrap();
    on_c.set(s("orange"));

    for register in [&on_a, &on_b, &on_c] {
        assert_eq!(register.get(), vec![s("orange")]);
    }
}

#[test]
fn rga_concurrent_inserts_have_one_order() {
    let (a, b) = offline_pair();
    let on_a = a.create_rga(Some("doc")).unwrap();
    on_a.push(s("base"));
    share(&a, &b);
    let on_b = b.find_rga("doc").unwrap();

    on_a.add(1, s("from-a")).unwrap();
    on_b.add(1, s("from-b")).unwrap();
    on_b.add(0, s("head-b")).unwrap();

    // a third replica hears b first, a fourth hears a first
    let c = Replica::new("N_3");
    let d = Replica::new("N_4");
    b.connect(&c);
    c.connect(&a);
    a.connect(&d);
    d.connect(&b);

    let expected = on_a.to_vec();
    assert_eq!(expected.len(), 4);
    assert_eq!(on_b.to_vec(), expected);
    assert_eq!(c.find_rga("doc").unwrap().to_vec(), expected);
    assert_eq!(d.find_rga("doc").unwrap().to_vec(), expected);
}

#[test]
fn late_joiner_replays_history() {
    let a = Replica::<String>::new("a");
    let counter = a.create_pn_counter(Some("stock")).unwrap();
    let tags = a.create_twop_set(Some("tags")).unwrap();
    let doc = a.create_rga(Some("doc")).unwrap();

    counter.increment_by(10).unwrap();
    counter.decrement_by(3).unwrap();
    tags.add(s("new"));
    tags.add(s("sale"));
    tags.remove(&s("new"));
    for word in ["a", "b", "c"] {
        doc.push(s(word));
    }
    doc.remove(1).unwrap();

    let late = Replica::new("late");
    late.connect(&a);

    assert_eq!(late.crdt_ids(), a.crdt_ids());
    assert_eq!(late.history(), a.history());
    assert_eq!(late.find_pn_counter("stock").unwrap().get(), 7);
    let late_tags = late.find_twop_set("tags").unwrap();
    assert_eq!(late_tags.to_vec(), vec![s("sale")]);
    assert!(!late_tags.add(s("new")));
    assert_eq!(late.find_rga("doc").unwrap().to_vec(), vec![s("a"), s("c")]);
}

#[test]
fn commands_travel_through_intermediate_replica() {
    let a = Replica::<String>::new("a");
    let b = Replica::<String>::new("b");
    let c = Replica::<String>::new("c");
    a.connect(&b);
    b.connect(&c);
    assert!(!a.is_connected("c"));

    let on_a = a.create_g_set(Some("seen")).unwrap();
    on_a.add(s("from-a"));
    let on_c = c.find_g_set("seen").unwrap();
    on_c.add(s("from-c"));

    assert_eq!(on_a.to_vec(), vec![s("from-a"), s("from-c")]);
    assert_eq!(on_c.to_vec(), on_a.to_vec());
    assert_eq!(b.find_g_set("seen").unwrap().to_vec(), on_a.to_vec());
}

#[test]
fn cyclic_topology_does_not_loop() {
    let replicas: Vec<Replica<String>> = ["a", "b", "c", "d"]
        .into_iter()
        .map(Replica::new)
        .collect();
    for (i, replica) in replicas.iter().enumerate() {
        replica.connect(&replicas[(i + 1) % replicas.len()]);
    }
    replicas[0].connect(&replicas[2]);

    let counter = replicas[1].create_g_counter(Some("hits")).unwrap();
    for _ in 0..5 {
        counter.increment().unwrap();
    }
    let set = replicas[3].create_u_set(Some("ids")).unwrap();
    set.add(s("x"));
    set.remove(&s("x"));

    for replica in &replicas {
        assert_eq!(replica.history().len(), 1 + 5 + 1 + 2);
        assert_eq!(replica.find_g_counter("hits").unwrap().get(), 5);
        assert!(replica.find_u_set("ids").unwrap().is_empty());
    }
}

#[test]
fn disconnect_keeps_applied_state() {
    let a = Replica::<String>::new("a");
    let b = Replica::<String>::new("b");
    a.connect(&b);

    let on_a = a.create_g_counter(Some("hits")).unwrap();
    on_a.increment_by(2).unwrap();
    let on_b = b.find_g_counter("hits").unwrap();

    a.disconnect(&b);
    assert!(!b.is_connected("a"));
    assert_eq!(on_b.get(), 2);

    on_a.increment().unwrap();
    on_b.increment_by(4).unwrap();
    assert_eq!(on_a.get(), 3);
    assert_eq!(on_b.get(), 6);

    b.connect(&a);
    assert_eq!(on_a.get(), 7);
    assert_eq!(on_b.get(), 7);
}

#[test]
fn gcounter_never_decreases_under_shuffled_delivery() {
    let writers: Vec<Replica<String>> = ["w1", "w2", "w3"]
        .into_iter()
        .map(Replica::new)
        .collect();
    let first = writers[0].create_g_counter(Some("hits")).unwrap();
    for writer in &writers[1..] {
        writers[0].connect(writer);
        writers[0].disconnect(writer);
    }
    first.increment_by(2).unwrap();
    for (n, writer) in writers.iter().enumerate() {
        let counter = writer.find_g_counter("hits").unwrap();
        for _ in 0..=n {
            counter.increment_by(n as u64 + 1).unwrap();
        }
    }

    let mut commands: Vec<ReplicaCommand<String>> = Vec::new();
    for writer in &writers {
        for command in writer.history() {
            if !commands.contains(&command) {
                commands.push(command);
            }
        }
    }
    let (announce, mut updates): (Vec<_>, Vec<_>) = commands
        .into_iter()
        .partition(|c| matches!(c, ReplicaCommand::Announce { .. }));

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..10 {
        updates.shuffle(&mut rng);
        let reader = Replica::<String>::new("reader");
        for command in &announce {
            reader.deliver(command.clone());
        }
        let counter = reader.find_g_counter("hits").unwrap();
        let mut last = 0;
        for command in &updates {
            reader.deliver(command.clone());
            assert!(counter.get() >= last);
            last = counter.get();
        }
        // 2 + 1 + 2*2 + 3*3
        assert_eq!(counter.get(), 16);
    }
}

#[test]
fn orset_converges_under_shuffled_delivery() {
    let (a, b) = offline_pair();
    let on_a = a.create_or_set(Some("basket")).unwrap();
    share(&a, &b);
    let on_b = b.find_or_set("basket").unwrap();

    for fruit in ["apple", "pear", "plum"] {
        on_a.add(s(fruit));
        on_b.add(s(fruit));
    }
    on_a.remove(&s("pear"));
    on_b.remove(&s("apple"));
    on_b.add(s("kiwi"));

    let mut commands = a.history();
    commands.extend(b.history().into_iter().skip(1));
    let announce = commands.remove(0);

    let mut rng = StdRng::seed_from_u64(11);
    let mut results = Vec::new();
    for _ in 0..5 {
        commands.shuffle(&mut rng);
        let reader = Replica::<String>::new("reader");
        reader.deliver(announce.clone());
        for command in &commands {
            reader.deliver(command.clone());
        }
        results.push(reader.find_or_set("basket").unwrap().elements());
    }

    a.connect(&b);
    assert_eq!(on_a.elements(), on_b.elements());
    assert_eq!(on_a.to_vec(), vec![s("apple"), s("kiwi"), s("pear"), s("plum")]);
    for elements in results {
        assert_eq!(elements, on_a.elements());
    }
}

fn mesh(ids: &[&str]) -> Vec<Replica<String>> {
    let replicas: Vec<Replica<String>> = ids.iter().map(|id| Replica::new(*id)).collect();
    for (i, replica) in replicas.iter().enumerate() {
        for peer in &replicas[i + 1..] {
            replica.connect(peer);
        }
    }
    replicas
}

#[test]
fn concurrent_pushes_converge_across_a_mesh() {
    const PUSHES: usize = 300;
    for _ in 0..5 {
        let replicas = mesh(&["a", "b", "r"]);
        replicas[0].create_rga(Some("doc")).unwrap();

        thread::scope(|scope| {
            for writer in &replicas[..2] {
                scope.spawn(move || {
                    let doc = writer.find_rga("doc").unwrap();
                    for i in 0..PUSHES {
                        doc.push(format!("{}-{i}", writer.id()));
                    }
                });
            }
        });

        let expected = replicas[0].find_rga("doc").unwrap().to_vec();
        assert_eq!(expected.len(), 2 * PUSHES);
        for replica in &replicas {
            assert_eq!(replica.find_rga("doc").unwrap().to_vec(), expected);
            assert_eq!(replica.history().len(), 1 + 2 * PUSHES);
        }
        // each writer's own items keep their relative order
        for writer in ["a", "b"] {
            let own: Vec<&String> = expected
                .iter()
                .filter(|item| item.starts_with(&format!("{writer}-")))
                .collect();
            let pushed: Vec<String> = (0..PUSHES).map(|i| format!("{writer}-{i}")).collect();
            assert_eq!(own, pushed.iter().collect::<Vec<_>>());
        }
    }
}

#[test]
fn concurrent_set_and_sequence_writers_converge() {
    const ROUNDS: usize = 150;
    for _ in 0..3 {
        let replicas = mesh(&["a", "b", "c", "d"]);
        replicas[0].create_or_set(Some("tags")).unwrap();
        replicas[1].create_rga(Some("log")).unwrap();

        thread::scope(|scope| {
            for writer in &replicas[..3] {
                scope.spawn(move || {
                    let tags = writer.find_or_set("tags").unwrap();
                    let log = writer.find_rga("log").unwrap();
                    for i in 0..ROUNDS {
                        tags.add(format!("tag-{}", i % 7));
                        if i % 3 == 0 {
                            tags.remove(&format!("tag-{}", (i + 2) % 7));
                        }
                        log.add(0, format!("{}-{i}", writer.id())).unwrap();
                        if i % 5 == 0 {
                            // another writer may already have emptied the log
                            let _ = log.remove(0);
                        }
                    }
                });
            }
        });

        let tags = replicas[0].find_or_set("tags").unwrap();
        let log = replicas[0].find_rga("log").unwrap();
        let history = replicas[0].history().len();
        for replica in &replicas[1..] {
            assert_eq!(replica.find_or_set("tags").unwrap().elements(), tags.elements());
            assert_eq!(replica.find_rga("log").unwrap().to_vec(), log.to_vec());
            assert_eq!(replica.history().len(), history);
        }
        // concurrent removes of the same head collapse into one tombstone
        assert!(log.len() >= 3 * (ROUNDS - ROUNDS / 5));
        assert!(log.len() < 3 * ROUNDS);
    }
}

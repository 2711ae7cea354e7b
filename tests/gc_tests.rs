//! Collector behavior observed through the public VM surface.
//!
//! The default heap threshold is 1 MiB, so these programs deliberately
//! churn through enough string data to force several collection cycles.
//! (Building with `--features stress-gc` collects on every allocation and
//! exercises the same assertions much harder.)

use kestrel::Vm;

#[test]
fn temporary_strings_are_collected() {
    let mut vm = Vm::new();
    vm.capture_output();

    // Each iteration allocates a fresh ~4 KiB string and drops the old
    // one; tens of megabytes pass through a heap whose live set is one
    // string.
    vm.run_source(
        "
        var chunk = \"0123456789abcdef\";
        var big = \"\";
        for (var i = 0; i < 8; i = i + 1) { big = big + big + chunk; }
        for (var i = 0; i < 5000; i = i + 1) {
            var temp = big + i;
        }
        print(\"done\");
        ",
    )
    .unwrap();
    assert_eq!(vm.take_output(), "done\n");

    // The interning table held the temporaries weakly: they must not
    // have piled up. (Some slack: garbage younger than the last cycle
    // is still in the arena.)
    assert!(
        vm.heap().live_objects() < 2000,
        "heap retained {} objects",
        vm.heap().live_objects()
    );
}

#[test]
fn cyclic_instance_graphs_are_collected() {
    let mut vm = Vm::new();
    vm.capture_output();

    // a <-> b cycles become garbage at the end of every iteration; a
    // reference-counting collector would never reclaim them.
    vm.run_source(
        "
        class Node { init() { this.other = null; } }
        var pad = \"xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx\";
        for (var i = 0; i < 20000; i = i + 1) {
            var a = Node();
            var b = Node();
            a.other = b;
            b.other = a;
            a.payload = pad + i;
        }
        print(\"done\");
        ",
    )
    .unwrap();
    assert_eq!(vm.take_output(), "done\n");
    // 60,000+ objects passed through; anything near that means the
    // cycles were never reclaimed.
    assert!(
        vm.heap().live_objects() < 20000,
        "heap retained {} objects",
        vm.heap().live_objects()
    );
}

#[test]
fn reachable_data_survives_collection_pressure() {
    let mut vm = Vm::new();
    vm.capture_output();

    vm.run_source(
        "
        class Keeper {
            init(tag) { this.tag = tag; }
            get() { return this.tag; }
        }
        var kept = [];
        include(\"list\");
        for (var i = 0; i < 50; i = i + 1) {
            list.append(kept, Keeper(\"tag\" + i));
        }

        // Churn: force collections while `kept` stays reachable.
        var big = \"abcdefghijklmnop\";
        for (var i = 0; i < 8; i = i + 1) { big = big + big; }
        for (var i = 0; i < 3000; i = i + 1) {
            var temp = big + i;
        }

        print(kept[0].get());
        print(kept[49].get());
        include(\"list\");
        print(list.count(kept));
        ",
    )
    .unwrap();
    assert_eq!(vm.take_output(), "tag0\ntag49\n50\n");
}

#[test]
fn bound_methods_keep_their_receivers_alive() {
    let mut vm = Vm::new();
    vm.capture_output();

    vm.run_source(
        "
        class Counter {
            init() { this.n = 0; }
            bump() { this.n = this.n + 1; return this.n; }
        }
        var bump = Counter().bump;

        var big = \"abcdefghijklmnop\";
        for (var i = 0; i < 8; i = i + 1) { big = big + big; }
        for (var i = 0; i < 3000; i = i + 1) {
            var temp = big + i;
        }

        bump();
        bump();
        print(bump());
        ",
    )
    .unwrap();
    assert_eq!(vm.take_output(), "3\n");
}

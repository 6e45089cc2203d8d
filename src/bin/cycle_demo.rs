use cycle_gc::{DEBUG_COLLECTABLE, DEBUG_STATS, Gc, Heap, HeapConfig, trace_fields};
use std::fmt;

struct Node {
    name: String,
    next: Gc<Node>,
}

trace_fields!(Node { next });

impl Node {
    fn new(heap: &Heap, name: &str) -> Self {
        println!("Constructed {}.", NodeName(name));
        Self {
            name: name.to_string(),
            next: heap.null(),
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        println!("Destructed {}.", NodeName(&self.name));
    }
}

struct NodeName<'a>(&'a str);

impl fmt::Display for NodeName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

fn main() {
    env_logger::init();

    let heap = Heap::with_config(HeapConfig::default().with_debug(DEBUG_STATS | DEBUG_COLLECTABLE));

    let root = heap.make(|heap| Node::new(heap, "A"));
    root.next.set(&heap.make(|heap| Node::new(heap, "B")));
    root.next.next.set(&root);

    println!("Collecting with {} reachable: nothing should be destroyed...", NodeName(&root.name));
    let stats = heap.collect();
    println!("  destroyed {}", stats.destroyed);

    root.clear();
    println!("Collecting again: the cycle is unreachable now...");
    let stats = heap.collect();
    println!("  destroyed {}", stats.destroyed);

    let totals = heap.stats();
    println!(
        "{} collections, {} destroyed, {} still tracked",
        totals.collections, totals.destroyed, totals.tracked
    );
}

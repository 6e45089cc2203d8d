use cycle_gc::{Gc, GcError, Heap, HeapConfig, Trace, Tracer, global, trace_fields};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

struct Node {
    name: String,
    next: Gc<Node>,
    log: Log,
}

trace_fields!(Node { next });

impl Node {
    fn new(heap: &Heap, name: &str, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            next: heap.null(),
            log: log.clone(),
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.log.borrow_mut().push(self.name.clone());
    }
}

fn node(heap: &Heap, name: &str, log: &Log) -> Gc<Node> {
    heap.make(|heap| Node::new(heap, name, log))
}

fn destroyed(log: &Log) -> Vec<String> {
    let mut names = log.borrow().clone();
    names.sort();
    names
}

#[test]
fn test_two_node_cycle_scenario() {
    let heap = Heap::new();
    let log = Log::default();

    let root = node(&heap, "A", &log);
    root.next.set(&node(&heap, "B", &log));
    root.next.next.set(&root);

    assert_eq!(heap.collect().destroyed, 0);
    assert!(log.borrow().is_empty());
    assert_eq!(root.next.next.name, "A");

    root.clear();
    let stats = heap.collect();
    assert_eq!(stats.destroyed, 2);
    assert_eq!(destroyed(&log), ["A", "B"]);

    assert_eq!(heap.collect().destroyed, 0);
    assert_eq!(log.borrow().len(), 2);
}

#[test]
fn test_collection_is_idempotent() {
    let heap = Heap::new();
    let log = Log::default();
    let keep = node(&heap, "keep", &log);
    keep.next.set(&node(&heap, "child", &log));
    drop(node(&heap, "garbage", &log));

    let first = heap.collect();
    let second = heap.collect();
    assert_eq!(first.destroyed, 1);
    assert_eq!(second.destroyed, 0);
    assert_eq!(first.marked, second.marked);
    assert_eq!(destroyed(&log), ["garbage"]);
}

#[test]
fn test_only_unreachable_nodes_are_destroyed() {
    let heap = Heap::new();
    let log = Log::default();

    // live: a -> b -> c; dead: d -> e -> d, f
    let a = node(&heap, "a", &log);
    a.next.set(&node(&heap, "b", &log));
    a.next.next.set(&node(&heap, "c", &log));

    let d = node(&heap, "d", &log);
    d.next.set(&node(&heap, "e", &log));
    d.next.next.set(&d);
    drop(d);
    drop(node(&heap, "f", &log));

    assert_eq!(heap.tracked_count(), 6);
    let stats = heap.collect();
    assert_eq!(stats.destroyed, 3);
    assert_eq!(stats.marked, 3);
    assert_eq!(destroyed(&log), ["d", "e", "f"]);
    assert_eq!(a.next.next.name, "c");
}

#[test]
fn test_self_loop_is_collected() {
    let heap = Heap::new();
    let log = Log::default();
    let lonely = node(&heap, "self", &log);
    lonely.next.set(&lonely);
    drop(lonely);

    assert_eq!(heap.collect().destroyed, 1);
    assert_eq!(destroyed(&log), ["self"]);
}

#[test]
fn test_handles_built_inside_make_are_not_roots() {
    let heap = Heap::new();
    let log = Log::default();

    let outer = heap.make(|heap| {
        let inner = Node::new(heap, "inner", &log);
        assert!(!heap.is_rooting());
        assert!(!heap.is_root(&inner.next));
        inner
    });
    assert!(heap.is_rooting());
    assert!(heap.is_root(&outer));
    assert!(!heap.is_root(&outer.next));

    let loose = heap.null::<Node>();
    assert!(heap.is_root(&loose));
    drop(loose);
    assert_eq!(heap.root_count(), 1);
}

#[test]
fn test_adoption_strips_roots_of_traced_fields() {
    let heap = Heap::new();
    let log = Log::default();

    let first = Node::new(&heap, "first", &log);
    assert!(heap.is_root(&first.next));
    let first = heap.alloc(first);
    assert!(!heap.is_root(&first.next));

    let second = Node::new(&heap, "second", &log);
    second.next.set(&first);
    let second = heap.adopt(Box::new(second));
    assert!(!heap.is_root(&second.next));
    first.next.set(&second);

    assert_eq!(heap.root_count(), 2);
    drop(second);
    assert_eq!(heap.collect().destroyed, 0);

    drop(first);
    assert_eq!(heap.root_count(), 0);
    assert_eq!(heap.collect().destroyed, 2);
    assert_eq!(destroyed(&log), ["first", "second"]);
}

#[test]
fn test_zero_sized_values_each_get_destroyed() {
    thread_local! {
        static DROPS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
    }

    struct Token;

    unsafe impl Trace for Token {
        fn trace(&self, _tracer: &mut Tracer<'_>) {}
    }

    impl Drop for Token {
        fn drop(&mut self) {
            DROPS.with(|drops| drops.set(drops.get() + 1));
        }
    }

    let heap = Heap::new();
    drop(heap.alloc(()));
    drop(heap.alloc(Token));
    drop(heap.alloc(Token));
    assert_eq!(heap.tracked_count(), 3);

    assert_eq!(heap.collect().destroyed, 3);
    assert_eq!(DROPS.with(|drops| drops.get()), 2);
}

#[test]
fn test_handles_outliving_heap_report_destroyed_targets() {
    let log = Log::default();
    let survivor = {
        let heap = Heap::new();
        node(&heap, "gone", &log)
    };
    assert_eq!(destroyed(&log), ["gone"]);
    assert!(survivor.as_ref().is_none());
    assert_eq!(survivor.try_get().err(), Some(GcError::TargetDestroyed));
}

/// Holds handles nobody traces: they stay roots for the life of the value.
struct Hoard {
    _items: Vec<Gc<Node>>,
}

unsafe impl Trace for Hoard {
    fn trace(&self, _tracer: &mut Tracer<'_>) {}
}

#[test]
fn test_destructor_dropping_roots_is_collected_in_same_call() {
    let heap = Heap::new();
    let log = Log::default();

    let items = vec![node(&heap, "x", &log), node(&heap, "y", &log)];
    drop(heap.alloc(Hoard { _items: items }));
    assert_eq!(heap.root_count(), 2);

    let stats = heap.collect();
    assert_eq!(stats.destroyed, 3);
    assert!(stats.rounds >= 2);
    assert_eq!(destroyed(&log), ["x", "y"]);
    assert_eq!(heap.tracked_count(), 0);
}

struct Spawner {
    heap: Rc<Heap>,
    spawned: Rc<RefCell<Option<Gc<u64>>>>,
}

unsafe impl Trace for Spawner {
    fn trace(&self, _tracer: &mut Tracer<'_>) {}
}

impl Drop for Spawner {
    fn drop(&mut self) {
        *self.spawned.borrow_mut() = Some(self.heap.alloc(99));
    }
}

#[test]
fn test_destructor_may_allocate() {
    let heap = Rc::new(Heap::new());
    let spawned = Rc::new(RefCell::new(None));
    drop(heap.alloc(Spawner {
        heap: heap.clone(),
        spawned: spawned.clone(),
    }));

    assert_eq!(heap.collect().destroyed, 1);
    assert_eq!(heap.tracked_count(), 1);
    let value = spawned.borrow_mut().take().unwrap();
    assert_eq!(*value, 99);

    drop(value);
    assert_eq!(heap.collect().destroyed, 1);
}

#[test]
fn test_heap_drop_tears_down_cycles() {
    let log = Log::default();
    {
        let heap = Heap::new();
        let a = node(&heap, "a", &log);
        a.next.set(&node(&heap, "b", &log));
        a.next.next.set(&a);
    }
    assert_eq!(destroyed(&log), ["a", "b"]);
}

#[test]
fn test_heap_drop_without_teardown_leaks() {
    let log = Log::default();
    let survivor = {
        let heap = Heap::with_config(HeapConfig::default().with_teardown_on_drop(false));
        node(&heap, "leaked", &log)
    };
    assert!(log.borrow().is_empty());
    assert!(!survivor.is_attached());
}

#[test]
fn test_try_get_on_null() {
    let heap = Heap::new();
    let empty = heap.null::<Node>();
    assert_eq!(empty.try_get().err(), Some(GcError::NullHandle));
}

#[test]
fn test_global_heap_collects_cycles() {
    let log = Log::default();
    let a = global::make(|heap| Node::new(heap, "ga", &log));
    a.next.set(&global::make(|heap| Node::new(heap, "gb", &log)));
    a.next.next.set(&a);

    assert_eq!(global::collect().destroyed, 0);
    drop(a);
    assert_eq!(global::collect().destroyed, 2);
    assert_eq!(destroyed(&log), ["ga", "gb"]);
}

//! End-to-end collector scenarios driven through the public API.

use ember_gc::{ContextHandle, GcConfig, ObjectKind, Runtime, Value};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn paging_grows_and_releases() {
    init_logging();
    let mut rt = Runtime::new(GcConfig {
        page_capacity: 64,
        ..Default::default()
    });
    let class = rt.object_class();

    for _ in 0..2000 {
        let save = rt.arena_save();
        rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        rt.arena_restore(save);
    }
    // Allocation pressure ran cycles on its own along the way.
    assert!(rt.gc_stats().total_cycles() > 0);

    let pages_before = rt.page_count();
    rt.collect();
    rt.collect();
    assert!(rt.page_count() <= pages_before);
    assert!(rt.live_count() < 100);
    assert!(rt.gc_stats().objects_freed > 1000);
}

#[test]
fn collection_is_idempotent() {
    init_logging();
    let mut rt = Runtime::new(GcConfig::default());
    let class = rt.object_class();
    let mut kept = Vec::new();
    for _ in 0..50 {
        let obj = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        rt.register_root(obj);
        kept.push(obj);
    }
    rt.arena_restore(0);

    rt.collect();
    let live = rt.live_count();
    for _ in 0..3 {
        rt.collect();
        assert_eq!(rt.live_count(), live);
    }
    for obj in &kept {
        assert!(!rt.is_object_dead(*obj));
    }
}

#[test]
fn object_graph_stays_reachable_through_cycles() {
    init_logging();
    let mut rt = Runtime::new(GcConfig::default());

    // root array -> strings, built under churn that forces cycles.
    let ary = rt.alloc_array(Vec::new()).unwrap();
    rt.register_root(ary);
    let class = rt.object_class();

    for i in 0..200 {
        let save = rt.arena_save();
        let s = rt.alloc_string(&format!("item-{i}")).unwrap();
        rt.array_push(ary, Value::Obj(s)).unwrap();
        // Garbage between the keepers.
        for _ in 0..20 {
            rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        }
        rt.arena_restore(save);
        if i % 50 == 0 {
            rt.collect_incremental();
        }
    }
    rt.collect();

    assert_eq!(rt.array_len(ary), 200);
    for i in 0..200 {
        let s = rt.array_get(ary, i).as_obj().unwrap();
        assert_eq!(rt.str_value(s), Some(format!("item-{i}").as_str()));
    }
}

#[test]
fn write_barrier_keeps_young_value_stored_into_old_object() {
    init_logging();
    let mut rt = Runtime::new(GcConfig::default());
    let class = rt.object_class();

    let owner = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
    rt.register_root(owner);
    rt.arena_restore(0);
    rt.collect();

    // owner is now old; the store below crosses the generation gap.
    let save = rt.arena_save();
    let young = rt.alloc_string("young").unwrap();
    let name = rt.intern("field");
    rt.set_ivar(owner, name, Value::Obj(young)).unwrap();
    rt.arena_restore(save);

    rt.collect_incremental();
    rt.collect_incremental();
    assert!(!rt.is_object_dead(young));
    assert_eq!(rt.str_value(young), Some("young"));
}

#[test]
fn old_generation_survives_minor_and_dies_on_major() {
    init_logging();
    let mut rt = Runtime::new(GcConfig::default());
    let class = rt.object_class();

    // A sizable rooted old generation keeps the churn below the
    // old-generation ceiling, so the minor cycles below stay minor.
    for _ in 0..5000 {
        let keep = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        rt.register_root(keep);
        rt.arena_restore(0);
    }
    let obj = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
    rt.register_root(obj);
    rt.arena_restore(0);
    rt.collect();
    rt.unregister_root(obj);

    // Unreachable but old: minor cycles never reconsider it, no matter how
    // much young churn passes through.
    for _ in 0..10 {
        for _ in 0..500 {
            let save = rt.arena_save();
            rt.allocate(ObjectKind::Object, Some(class)).unwrap();
            rt.arena_restore(save);
        }
        rt.collect_incremental();
        assert!(!rt.is_object_dead(obj));
    }

    rt.collect();
    assert!(rt.is_object_dead(obj));
}

#[test]
fn heap_ceiling_reports_identical_nomem_error() {
    init_logging();
    let mut rt = Runtime::new(GcConfig {
        page_capacity: 64,
        max_objects: 64,
        ..Default::default()
    });
    let class = rt.object_class();
    let nomem = rt.nomem_error();

    let mut first = None;
    let mut second = None;
    for _ in 0..128 {
        match rt.allocate(ObjectKind::Object, Some(class)) {
            Ok(r) => rt.register_root(r),
            Err(e) => {
                first = Some(e);
                break;
            }
        }
    }
    // A second attempt fails with the very same pre-allocated object.
    if first.is_some() {
        second = rt.allocate(ObjectKind::Object, Some(class)).err();
    }

    let first = first.expect("ceiling should be reached");
    let second = second.expect("still at ceiling");
    assert_eq!(first.exception, nomem);
    assert_eq!(second.exception, nomem);
    assert!(rt.out_of_memory());
}

#[test]
fn arena_overflow_reports_identical_arena_error() {
    init_logging();
    let mut rt = Runtime::new(GcConfig::default());
    let class = rt.object_class();
    let arena_err = rt.arena_error();

    let mut raised = None;
    for _ in 0..300 {
        if let Err(e) = rt.allocate(ObjectKind::Object, Some(class)) {
            raised = Some(e);
            break;
        }
    }
    assert_eq!(raised.expect("arena should overflow").exception, arena_err);
    assert_eq!(rt.exc(), Some(arena_err));

    // The arena was truncated to leave room, so work can continue.
    rt.clear_exc();
    assert!(rt.allocate(ObjectKind::Object, Some(class)).is_ok());
}

#[test]
fn disabled_collector_only_grows() {
    init_logging();
    let mut rt = Runtime::new(GcConfig::default());
    let class = rt.object_class();

    rt.set_gc_enabled(false);
    for _ in 0..100 {
        let save = rt.arena_save();
        rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        rt.arena_restore(save);
    }
    let live = rt.live_count();
    rt.collect();
    assert_eq!(rt.live_count(), live);

    rt.set_gc_enabled(true);
    rt.collect();
    assert!(rt.live_count() < live);
}

#[test]
fn generational_mode_toggle_normalizes_heap() {
    init_logging();
    let mut rt = Runtime::new(GcConfig::default());
    let class = rt.object_class();

    let keep = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
    rt.register_root(keep);
    rt.arena_restore(0);
    rt.collect();

    rt.set_generational(false).unwrap();
    rt.collect();
    assert!(!rt.is_object_dead(keep));

    rt.set_generational(true).unwrap();
    rt.collect();
    assert!(!rt.is_object_dead(keep));
}

#[test]
fn each_live_object_sees_consistent_snapshot() {
    init_logging();
    let mut rt = Runtime::new(GcConfig::default());
    let class = rt.object_class();
    let keep = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
    rt.register_root(keep);
    let doomed = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
    rt.arena_restore(0);

    let mut visited = Vec::new();
    rt.each_live_object(|r, kind| {
        visited.push((r, kind));
        true
    });

    assert_eq!(visited.len(), rt.live_count());
    assert!(visited.iter().any(|(r, _)| *r == keep));
    // The dead object was collected before iteration started.
    assert!(!visited.iter().any(|(r, _)| *r == doomed));
}

#[test]
fn raise_builds_exception_with_message() {
    init_logging();
    let mut rt = Runtime::new(GcConfig::default());
    let class = rt.type_error_class();

    let raised = rt.raise(class, "boom");
    assert_eq!(rt.exc(), Some(raised.exception));
    assert_eq!(rt.class_of(raised.exception), Some(class));
    assert_eq!(rt.kind_of(raised.exception), Some(ObjectKind::Exception));

    // The pending exception is a root until rescued.
    rt.arena_restore(0);
    rt.collect();
    assert!(!rt.is_object_dead(raised.exception));
    rt.clear_exc();
    rt.collect();
    assert!(rt.is_object_dead(raised.exception));
}

#[test]
fn closure_capture_outlives_dead_fiber() {
    init_logging();
    let mut rt = Runtime::new(GcConfig::default());

    let fiber = rt.alloc_fiber().unwrap();
    {
        let ctx = rt.fiber_context_mut(fiber).unwrap();
        ctx.push_frame(2);
        ctx.set_register(0, Value::Int(40));
        ctx.set_register(1, Value::Int(2));
    }
    let env = rt
        .capture_stack_env(ContextHandle::Fiber(fiber), 0, 2)
        .unwrap();
    {
        let ctx = rt.fiber_context_mut(fiber).unwrap();
        ctx.frames.last_mut().unwrap().env = Some(env);
    }

    let proc_class = rt.proc_class();
    let closure = rt.allocate(ObjectKind::Proc, Some(proc_class)).unwrap();
    rt.proc_set_env(closure, env).unwrap();
    rt.register_root(closure);
    rt.arena_restore(0);

    // Reads through to the live fiber stack first.
    assert_eq!(rt.env_value(env, 0), Value::Int(40));

    rt.collect();
    assert!(rt.is_object_dead(fiber));
    assert!(!rt.is_object_dead(env));
    assert_eq!(rt.env_value(env, 0), Value::Int(40));
    assert_eq!(rt.env_value(env, 1), Value::Int(2));
}

#[test]
fn operand_stack_roots_follow_frame_discipline() {
    init_logging();
    let mut rt = Runtime::new(GcConfig::default());

    let s = rt.alloc_string("framed").unwrap();
    {
        let ctx = rt.root_context_mut();
        ctx.push_frame(1);
        ctx.set_register(0, Value::Obj(s));
    }
    rt.arena_restore(0);

    rt.collect();
    assert!(!rt.is_object_dead(s));

    // Popping the frame kills the register window.
    rt.root_context_mut().pop_frame();
    rt.collect();
    assert!(rt.is_object_dead(s));
}

#[test]
fn incremental_steps_make_progress_under_pressure() {
    init_logging();
    let mut rt = Runtime::new(GcConfig {
        generational: false,
        ..Default::default()
    });
    let class = rt.object_class();

    for _ in 0..5000 {
        let save = rt.arena_save();
        rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        rt.arena_restore(save);
    }
    let stats = rt.gc_stats();
    assert!(stats.incremental_steps > 0);
    assert!(stats.objects_freed > 0);
    // The heap is bounded even though collect() was never called.
    assert!(rt.live_count() < 5000);
}

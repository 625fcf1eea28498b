#![allow(missing_docs)]

use cryo::{
    Array, Cryo, CryoError, FnTransformer, HostHandle, Key, Object, Stasis, Value, ValueCell,
};
use std::cell::RefCell;
use std::rc::Rc;

// --- HELPERS ---

fn entry(root: &ValueCell, key: &str) -> ValueCell {
    match &*root.borrow() {
        Value::Array(arr) => arr.get(&Key::from(key)).expect("missing entry").clone(),
        other => panic!("expected array, got {}", other.kind()),
    }
}

// --- TESTS ---

/// A slot-level self-cycle (an array entry aliasing the cell that holds
/// the array) terminates on the fast path and decodes back into a cycle.
#[test]
fn test_self_referential_array_fast_path() -> cryo::Result<()> {
    let codec = Cryo::new("");

    let root = Value::Array(Array::new()).cell();
    match &mut *root.borrow_mut() {
        Value::Array(arr) => {
            arr.insert("name", Value::from("loop"));
            arr.insert_cell("me", root.clone());
        }
        _ => unreachable!(),
    }

    let back = codec.unserialize(&codec.serialize(&root)?)?;
    let me = entry(&back, "me");
    assert!(Rc::ptr_eq(&me, &back));
    Ok(())
}

/// The literal cycle scenario: `{a: 123, b: o, c: closure}` with `o.d = o`.
/// The object's self-cycle survives the placeholder rewrite around the
/// closure, and the decoded graph satisfies `decoded.b == decoded.b.d` by
/// pointer identity.
#[test]
fn test_object_cycle_beside_transformed_closure() -> cryo::Result<()> {
    let make_codec = || {
        Cryo::new("").with_transformer(Box::new(FnTransformer::new(
            |v| matches!(v, Value::Handle(_)),
            |_| Ok(Stasis::new("closure")),
            |s| s.class_tag() == "closure",
            |_| Ok(Value::Handle(HostHandle::new("closure", || 0))),
        )))
    };

    let o = Rc::new(RefCell::new(Object::new("Node")));
    o.borrow_mut()
        .fields
        .insert("d", Value::Object(o.clone()));

    let mut root = Array::new();
    root.insert("a", Value::from(123));
    root.insert("b", Value::Object(o));
    root.insert("c", Value::Handle(HostHandle::new("closure", || 1)));

    let bytes = make_codec().serialize(&Value::Array(root).cell())?;
    let back = make_codec().unserialize(&bytes)?;

    match &*entry(&back, "a").borrow() {
        Value::Int(i) => assert_eq!(*i, 123),
        other => panic!("expected int, got {}", other.kind()),
    }

    let b = entry(&back, "b").borrow().clone();
    match b {
        Value::Object(outer) => {
            let d = outer
                .borrow()
                .fields
                .get(&Key::from("d"))
                .expect("field d")
                .clone();
            let d_ref = d.borrow();
            match &*d_ref {
                Value::Object(inner) => assert!(Rc::ptr_eq(&outer, inner)),
                other => panic!("expected object, got {}", other.kind()),
            }
        }
        other => panic!("expected object, got {}", other.kind()),
    }

    match &*entry(&back, "c").borrow() {
        Value::Handle(h) => assert_eq!(h.tag(), "closure"),
        other => panic!("expected handle, got {}", other.kind()),
    }
    Ok(())
}

/// A cycle that passes through a placeholder payload: the transformer
/// captures the very array that contains the closure. The placeholder is
/// registered before its payload is walked, so the walk terminates, and
/// the resolved closure's captured environment is the decoded root
/// itself.
#[test]
fn test_cycle_through_placeholder_payload() -> cryo::Result<()> {
    let root = Value::Array(Array::new()).cell();
    match &mut *root.borrow_mut() {
        Value::Array(arr) => {
            arr.insert("f", Value::Handle(HostHandle::new("closure", || 2)));
        }
        _ => unreachable!(),
    }

    let captured = root.clone();
    let codec = Cryo::new("").with_transformer(Box::new(FnTransformer::new(
        |v| matches!(v, Value::Handle(h) if h.tag() == "closure"),
        move |_| {
            let st = Stasis::new("closure");
            st.set_payload(captured.clone());
            Ok(st)
        },
        |s| s.class_tag() == "closure",
        |s| Ok(Value::Handle(HostHandle::new("thawed", s.payload()))),
    )));

    let back = codec.unserialize(&codec.serialize(&root)?)?;

    let f = entry(&back, "f");
    match &*f.borrow() {
        Value::Handle(h) => {
            assert_eq!(h.tag(), "thawed");
            // `downcast` hands the captured payload back as `Rc<ValueCell>`.
            let env = h.downcast::<ValueCell>().expect("captured payload");
            // The environment the resolver saw is the decoded root: the
            // cycle closed through the placeholder payload.
            assert!(Rc::ptr_eq(&*env, &back));
        }
        other => panic!("expected handle, got {}", other.kind()),
    }
    Ok(())
}

/// A default placeholder whose payload references the object it replaced:
/// the reconstructed object's self-field points back at the
/// reconstruction.
#[test]
fn test_default_placeholder_self_cycle() -> cryo::Result<()> {
    let codec = Cryo::new("");

    struct Watcher;
    let conn = Rc::new(RefCell::new(Object::with_handle(
        "Watcher",
        HostHandle::new("resource", Watcher),
    )));
    conn.borrow_mut()
        .fields
        .insert("me", Value::Object(conn.clone()));

    let mut root = Array::new();
    root.insert("conn", Value::Object(conn));

    let back = codec.unserialize(&codec.serialize(&Value::Array(root).cell())?)?;

    let rebuilt = entry(&back, "conn").borrow().clone();
    match rebuilt {
        Value::Object(outer) => {
            let o = outer.borrow();
            assert_eq!(o.class, "Watcher");
            assert!(o.handle.is_none());
            let me = o.fields.get(&Key::from("me")).expect("field me").clone();
            drop(o);
            let me_ref = me.borrow();
            match &*me_ref {
                Value::Object(inner) => assert!(Rc::ptr_eq(&outer, inner)),
                other => panic!("expected object, got {}", other.kind()),
            }
        }
        other => panic!("expected object, got {}", other.kind()),
    }
    Ok(())
}

/// A transformer that reaches back and mutates an already-visited slot
/// mid-encode trips the fatal mutation check.
#[test]
fn test_source_mutation_detected() -> cryo::Result<()> {
    let mut inner = Array::new();
    inner.insert("x", Value::from(1));
    let shared = Value::Array(inner).cell();

    let hostage = shared.clone();
    let codec = Cryo::new("").with_transformer(Box::new(FnTransformer::new(
        |v| matches!(v, Value::Handle(_)),
        move |_| {
            // Misbehaving bridge: rewrite a slot the walker has already
            // snapshotted.
            *hostage.borrow_mut() = Value::Int(5);
            Ok(Stasis::new("closure"))
        },
        |_| false,
        |_| Ok(Value::Null),
    )));

    let mut root = Array::new();
    root.insert_cell("first", shared.clone());
    root.insert("job", Value::Handle(HostHandle::new("closure", || 3)));
    root.insert_cell("again", shared);

    let err = codec
        .serialize(&Value::Array(root).cell())
        .unwrap_err();
    assert!(matches!(err, CryoError::SourceMutated(_)));
    Ok(())
}

/// Revisiting an unchanged slot is not mutation; the walk reuses the
/// produced cell.
#[test]
fn test_unchanged_revisit_is_not_mutation() -> cryo::Result<()> {
    let codec = Cryo::new("").with_transformer(Box::new(FnTransformer::new(
        |v| matches!(v, Value::Handle(_)),
        |_| Ok(Stasis::new("closure")),
        |s| s.class_tag() == "closure",
        |_| Ok(Value::Handle(HostHandle::new("closure", || 4))),
    )));

    let mut inner = Array::new();
    inner.insert("x", Value::from(1));
    let shared = Value::Array(inner).cell();

    let mut root = Array::new();
    root.insert_cell("first", shared.clone());
    root.insert("job", Value::Handle(HostHandle::new("closure", || 5)));
    root.insert_cell("again", shared);

    let back = codec.unserialize(&codec.serialize(&Value::Array(root).cell())?)?;
    let first = entry(&back, "first");
    let again = entry(&back, "again");
    assert!(Rc::ptr_eq(&first, &again));
    Ok(())
}

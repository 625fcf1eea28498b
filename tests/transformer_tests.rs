#![allow(missing_docs)]

use cryo::{
    Array, Cryo, CryoError, CryoInspector, FnTransformer, HostHandle, Key, Stasis, Value,
};
use std::cell::Cell;
use std::rc::Rc;

// --- HELPERS ---

fn closure_value() -> Value {
    Value::Handle(HostHandle::new("closure", || 42))
}

fn is_closure(value: &Value) -> bool {
    matches!(value, Value::Handle(h) if h.tag() == "closure")
}

// --- TESTS ---

/// A transformer claiming every input sees the closure exactly once.
#[test]
fn test_transform_called_exactly_once() -> cryo::Result<()> {
    let calls = Rc::new(Cell::new(0usize));
    let saw_closure = Rc::new(Cell::new(false));

    let counter = calls.clone();
    let witness = saw_closure.clone();
    let codec = Cryo::new("").with_transformer(Box::new(FnTransformer::new(
        move |v| {
            let _ = v;
            true
        },
        move |v| {
            counter.set(counter.get() + 1);
            witness.set(is_closure(v));
            Ok(Stasis::new(""))
        },
        |_| false,
        |_| Ok(Value::Null),
    )));

    let bytes = codec.serialize(&closure_value().cell())?;
    assert!(!bytes.is_empty());
    assert_eq!(calls.get(), 1);
    assert!(saw_closure.get());
    Ok(())
}

/// The registry consults transformers in registration order; the first
/// claimant wins and later additions cannot shadow it.
#[test]
fn test_first_match_wins_on_encode() -> cryo::Result<()> {
    let mut codec = Cryo::new("").with_transformer(Box::new(FnTransformer::new(
        is_closure,
        |_| Ok(Stasis::new("first")),
        |_| false,
        |_| Ok(Value::Null),
    )));
    codec.add_transformer(Box::new(FnTransformer::new(
        is_closure,
        |_| Ok(Stasis::new("second")),
        |_| false,
        |_| Ok(Value::Null),
    )));

    let bytes = codec.serialize(&closure_value().cell())?;
    let report = CryoInspector::inspect(&bytes)?;
    assert_eq!(report.stasis_tags, vec!["first".to_string()]);
    Ok(())
}

/// First match wins on the resolve side too.
#[test]
fn test_first_match_wins_on_resolve() -> cryo::Result<()> {
    let encoder = Cryo::new("").with_transformer(Box::new(FnTransformer::new(
        is_closure,
        |_| Ok(Stasis::new("closure")),
        |_| false,
        |_| Ok(Value::Null),
    )));
    let bytes = encoder.serialize(&closure_value().cell())?;

    let decoder = Cryo::new("")
        .with_transformer(Box::new(FnTransformer::new(
            |_| false,
            |_| Ok(Stasis::new("")),
            |s| s.class_tag() == "closure",
            |_| Ok(Value::Str("from-first".into())),
        )))
        .with_transformer(Box::new(FnTransformer::new(
            |_| false,
            |_| Ok(Stasis::new("")),
            |s| s.class_tag() == "closure",
            |_| Ok(Value::Str("from-second".into())),
        )));

    let back = decoder.unserialize(&bytes)?;
    match &*back.borrow() {
        Value::Str(s) => assert_eq!(s, "from-first"),
        other => panic!("expected string, got {}", other.kind()),
    }
    Ok(())
}

/// A placeholder payload may itself contain live values; the encoder
/// transforms them recursively and the decoder resolves payload-first.
#[test]
fn test_payload_with_live_values_recursed() -> cryo::Result<()> {
    let make_codec = || {
        Cryo::new("")
            .with_transformer(Box::new(FnTransformer::new(
                is_closure,
                |_| {
                    // Capture an environment that itself holds a live
                    // value the native codec refuses.
                    let mut env = Array::new();
                    env.insert("label", Value::from("outer"));
                    env.insert("inner", Value::Handle(HostHandle::new("inner", || 7)));
                    Ok(Stasis::with_payload("closure", Value::Array(env)))
                },
                |s| s.class_tag() == "closure",
                |s| Ok(Value::Handle(HostHandle::new("thawed", s.payload()))),
            )))
            .with_transformer(Box::new(FnTransformer::new(
                |_| false,
                |_| Ok(Stasis::new("")),
                |s| s.class_tag() == "inner",
                |_| Ok(Value::Str("inner-live".into())),
            )))
    };

    // Encoding creates a placeholder for the payload's inner handle too,
    // in creation order: the outer placeholder precedes its payload's.
    let bytes = make_codec().serialize(&closure_value().cell())?;
    let report = CryoInspector::inspect(&bytes)?;
    assert_eq!(
        report.stasis_tags,
        vec!["closure".to_string(), "inner".to_string()]
    );

    let back = make_codec().unserialize(&bytes)?;
    match &*back.borrow() {
        Value::Handle(h) => {
            assert_eq!(h.tag(), "thawed");
            // The payload handed to the resolver was itself resolved
            // first: its inner placeholder is already live.
            let env = h.downcast::<cryo::ValueCell>().expect("captured payload");
            let env_ref = env.borrow();
            match &*env_ref {
                Value::Array(arr) => {
                    let inner = arr.get(&Key::from("inner")).expect("entry inner");
                    match &*inner.borrow() {
                        Value::Str(s) => assert_eq!(s, "inner-live"),
                        other => panic!("expected resolved inner, got {}", other.kind()),
                    }
                }
                other => panic!("expected payload array, got {}", other.kind()),
            }
        }
        other => panic!("expected handle, got {}", other.kind()),
    }
    Ok(())
}

/// A transformer error during encode is wrapped and surfaced.
#[test]
fn test_transform_failure_wrapped() {
    let codec = Cryo::new("").with_transformer(Box::new(FnTransformer::new(
        is_closure,
        |_| Err(CryoError::Native("capture backend offline".into())),
        |_| false,
        |_| Ok(Value::Null),
    )));

    let err = codec.serialize(&closure_value().cell()).unwrap_err();
    match err {
        CryoError::Transformer(msg) => assert!(msg.contains("capture backend offline")),
        other => panic!("expected transformer failure, got {other}"),
    }
}

/// A transformer error during resolve is wrapped and surfaced.
#[test]
fn test_resolve_failure_wrapped() -> cryo::Result<()> {
    let encoder = Cryo::new("").with_transformer(Box::new(FnTransformer::new(
        is_closure,
        |_| Ok(Stasis::new("closure")),
        |_| false,
        |_| Ok(Value::Null),
    )));
    let bytes = encoder.serialize(&closure_value().cell())?;

    let decoder = Cryo::new("").with_transformer(Box::new(FnTransformer::new(
        |_| false,
        |_| Ok(Stasis::new("")),
        |s| s.class_tag() == "closure",
        |_| Err(CryoError::Native("no runtime available".into())),
    )));

    let err = decoder.unserialize(&bytes).unwrap_err();
    match err {
        CryoError::Transformer(msg) => assert!(msg.contains("no runtime available")),
        other => panic!("expected transformer failure, got {other}"),
    }
    Ok(())
}

/// A bare closure placeholder with no resolver and no default instance is
/// a decode error carrying the class tag.
#[test]
fn test_unresolvable_placeholder() -> cryo::Result<()> {
    let codec = Cryo::new("");
    let bytes = codec.serialize(&closure_value().cell())?;

    let err = codec.unserialize(&bytes).unwrap_err();
    assert_eq!(err, CryoError::UnresolvableStasis("closure".into()));
    Ok(())
}

/// An introspectable object that fell back to a default placeholder
/// reconstructs as a plain object of the same class, handle dropped.
#[test]
fn test_default_placeholder_reconstruction() -> cryo::Result<()> {
    let codec = Cryo::new("");

    struct Conn;
    let mut obj = cryo::Object::with_handle("PgConnection", HostHandle::new("resource", Conn));
    obj.fields.insert("dsn", Value::from("pg://db"));

    let mut root = Array::new();
    root.insert("conn", obj.into_value());

    let back = codec.unserialize(&codec.serialize(&Value::Array(root).cell())?)?;
    match &*back.borrow() {
        Value::Array(arr) => {
            let conn = arr.get(&Key::from("conn")).expect("entry conn").borrow().clone();
            match conn {
                Value::Object(o) => {
                    let o = o.borrow();
                    assert_eq!(o.class, "PgConnection");
                    assert!(o.handle.is_none());
                    let dsn = o.fields.get(&Key::from("dsn")).expect("field dsn");
                    let dsn_ref = dsn.borrow();
                    match &*dsn_ref {
                        Value::Str(s) => assert_eq!(s, "pg://db"),
                        other => panic!("expected string, got {}", other.kind()),
                    }
                }
                other => panic!("expected object, got {}", other.kind()),
            }
        }
        other => panic!("expected array, got {}", other.kind()),
    }
    Ok(())
}

/// A placeholder the caller constructed directly, nested inside an
/// otherwise ordinary object's fields, still enters the shortcut list and
/// resolves on decode; it must not ride through inert inside an untouched
/// object.
#[test]
fn test_prebuilt_placeholder_in_object_fields() -> cryo::Result<()> {
    let make_codec = || {
        Cryo::new("").with_transformer(Box::new(FnTransformer::new(
            |_| false,
            |_| Ok(Stasis::new("")),
            |s| s.class_tag() == "token",
            |_| Ok(Value::Str("decoded-token".into())),
        )))
    };

    let mut session = cryo::Object::new("Session");
    session.fields.insert(
        "token",
        Value::Stasis(Stasis::with_payload("token", Value::Str("t-123".into()))),
    );
    session.fields.insert("user", Value::from("ada"));

    let mut root = Array::new();
    root.insert("auth", session.into_value());

    let bytes = make_codec().serialize(&Value::Array(root).cell())?;
    let report = CryoInspector::inspect(&bytes)?;
    assert!(report.enveloped);
    assert!(report.stasis_tags.contains(&"token".to_string()));

    let back = make_codec().unserialize(&bytes)?;
    match &*back.borrow() {
        Value::Array(arr) => {
            let auth = arr.get(&Key::from("auth")).expect("entry auth").borrow().clone();
            match auth {
                Value::Object(o) => {
                    let o = o.borrow();
                    assert_eq!(o.class, "Session");
                    let token = o.fields.get(&Key::from("token")).expect("field token");
                    match &*token.borrow() {
                        Value::Str(s) => assert_eq!(s, "decoded-token"),
                        other => panic!("expected resolved token, got {}", other.kind()),
                    }
                    let user = o.fields.get(&Key::from("user")).expect("field user");
                    let user_ref = user.borrow();
                    match &*user_ref {
                        Value::Str(s) => assert_eq!(s, "ada"),
                        other => panic!("expected string, got {}", other.kind()),
                    }
                }
                other => panic!("expected object, got {}", other.kind()),
            }
        }
        other => panic!("expected array, got {}", other.kind()),
    }
    Ok(())
}

/// A pre-built placeholder as the entire graph escalates to an envelope
/// even without any live handle, and decodes to the resolved value rather
/// than an inert placeholder record.
#[test]
fn test_prebuilt_placeholder_as_root() -> cryo::Result<()> {
    let make_codec = || {
        Cryo::new("").with_transformer(Box::new(FnTransformer::new(
            |_| false,
            |_| Ok(Stasis::new("")),
            |s| s.class_tag() == "token",
            |_| Ok(Value::Str("token-live".into())),
        )))
    };

    let root = Value::Stasis(Stasis::with_payload("token", Value::Str("t-9".into()))).cell();
    let bytes = make_codec().serialize(&root)?;

    let report = CryoInspector::inspect(&bytes)?;
    assert!(report.enveloped);
    assert_eq!(report.stasis_tags, vec!["token".to_string()]);

    let back = make_codec().unserialize(&bytes)?;
    match &*back.borrow() {
        Value::Str(s) => assert_eq!(s, "token-live"),
        other => panic!("expected resolved value, got {}", other.kind()),
    }
    Ok(())
}

/// Two slots holding the same live closure collapse into one placeholder
/// and decode to one shared live value.
#[test]
fn test_shared_handle_transforms_once() -> cryo::Result<()> {
    let calls = Rc::new(Cell::new(0usize));
    let counter = calls.clone();

    let make_decoder = || {
        Cryo::new("").with_transformer(Box::new(FnTransformer::new(
            |_| false,
            |_| Ok(Stasis::new("")),
            |s| s.class_tag() == "closure",
            |_| Ok(Value::Handle(HostHandle::new("thawed", || 9))),
        )))
    };

    let codec = Cryo::new("").with_transformer(Box::new(FnTransformer::new(
        is_closure,
        move |_| {
            counter.set(counter.get() + 1);
            Ok(Stasis::new("closure"))
        },
        |_| false,
        |_| Ok(Value::Null),
    )));

    let shared = closure_value();
    let mut root = Array::new();
    root.insert("x", shared.clone());
    root.insert("y", shared);

    let bytes = codec.serialize(&Value::Array(root).cell())?;
    assert_eq!(calls.get(), 1);

    let back = make_decoder().unserialize(&bytes)?;
    match &*back.borrow() {
        Value::Array(arr) => {
            let x = arr.get(&Key::from("x")).expect("entry x").borrow().clone();
            let y = arr.get(&Key::from("y")).expect("entry y").borrow().clone();
            match (x, y) {
                (Value::Handle(hx), Value::Handle(hy)) => assert!(hx.same_value(&hy)),
                _ => panic!("expected handles in both slots"),
            }
        }
        other => panic!("expected array, got {}", other.kind()),
    }
    Ok(())
}

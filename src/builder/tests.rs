//! IRBuilder unit tests.

use super::*;
use crate::keys;

fn input(name: &str, shape: &[i64]) -> Array {
    Array::new(
        Var::new(DType::Float32, name),
        shape.iter().map(|&d| Expr::Int(d)).collect(),
        "global",
    )
}

// ── Loop specification ──

#[test]
fn test_loop_spec_requires_names_and_ranges() {
    let mut b = IRBuilder::new();
    let spec = LoopSpec {
        ranges: Some(vec![Range::from(0..4)]),
        ..Default::default()
    };
    assert!(matches!(
        b.begin_loop(IterKind::Spatial, spec),
        Err(Error::Configuration(_))
    ));

    let spec = LoopSpec {
        names: Some(vec!["i".into()]),
        ..Default::default()
    };
    assert!(matches!(
        b.begin_loop(IterKind::Spatial, spec),
        Err(Error::Configuration(_))
    ));
    assert_eq!(b.tree().depth(), 1);
}

#[test]
fn test_loop_spec_length_mismatch() {
    let mut b = IRBuilder::new();
    let spec = LoopSpec::new(["i", "j"], [0..4]);
    let err = b.begin_loop(IterKind::Reduce, spec).unwrap_err();
    assert_eq!(err, Error::Configuration("2 loop names but 1 ranges".into()));

    let spec = LoopSpec::new(["i"], [0..4]).with_bindings(["x", "y"]);
    assert!(matches!(
        b.begin_loop(IterKind::Spatial, spec),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_loop_vars_are_fresh_ints() {
    let mut b = IRBuilder::new();
    let (h1, v1) = b
        .begin_loop(IterKind::Spatial, LoopSpec::single("i", 0..4))
        .unwrap();
    let (h2, v2) = b
        .begin_loop(IterKind::Spatial, LoopSpec::single("i", 0..4))
        .unwrap();
    assert_eq!(v1[0].dtype(), DType::Int32);
    assert_eq!(v1[0].name(), v2[0].name());
    assert_ne!(v1[0], v2[0]);
    b.end_scope(h2).unwrap();
    b.end_scope(h1).unwrap();
}

#[test]
fn test_default_bindings_are_empty() {
    let mut b = IRBuilder::new();
    let (h, _) = b
        .begin_loop(IterKind::Spatial, LoopSpec::new(["i", "j"], [0..2, 0..3]))
        .unwrap();
    let loop_id = b.tree().node(b.tree().root()).children[0];
    match &b.tree().node(loop_id).kind {
        ScopeKind::Loop { bindings, .. } => assert_eq!(bindings, &vec![String::new(); 2]),
        other => panic!("expected loop, got {}", other),
    }
    b.end_scope(h).unwrap();
}

// ── Stack discipline ──

#[test]
fn test_end_scope_out_of_order() {
    let mut b = IRBuilder::new();
    let (outer, _) = b
        .begin_loop(IterKind::Spatial, LoopSpec::single("i", 0..4))
        .unwrap();
    let (inner, _) = b
        .begin_loop(IterKind::Spatial, LoopSpec::single("j", 0..4))
        .unwrap();
    assert!(matches!(
        b.end_scope(outer),
        Err(Error::StackDiscipline(_))
    ));
    b.end_scope(inner).unwrap();
}

#[test]
fn test_build_with_open_scope_fails() {
    let mut b = IRBuilder::new();
    let out = input("out", &[4]);
    let (_handle, vars) = b
        .begin_loop(IterKind::Spatial, LoopSpec::single("i", 0..4))
        .unwrap();
    b.store(&out, &keys![&vars[0]], 0.0).unwrap();
    assert!(matches!(b.build(), Err(Error::StackDiscipline(_))));
}

#[test]
fn test_explicit_alloc_scope() {
    let mut b = IRBuilder::new();
    let (tmp, handle) = b.begin_alloc([4], "local", DType::Float32, "tmp");
    b.store(&tmp, &keys![0], 1.0).unwrap();
    b.end_scope(handle).unwrap();
    assert_eq!(b.tree().depth(), 1);
    assert_eq!(b.array_for(tmp.var()), Some(&tmp));

    let body = b.build().unwrap();
    assert!(matches!(body, Block::Alloc { .. }));
}

#[test]
fn test_implicit_alloc_extends_to_enclosing_scope() {
    let mut b = IRBuilder::new();
    let out = input("out", &[4]);
    b.spatial_for(LoopSpec::single("i", 0..4), |b, v| {
        let acc = b.alloc([1], "local", DType::Float32, "acc");
        b.store(&acc, &keys![0], 0.0)?;
        b.store(&out, &keys![&v[0]], acc.get(&keys![0])?)?;
        Ok(())
    })
    .unwrap();
    assert_eq!(b.tree().depth(), 1);

    let body = b.build().unwrap();
    let Block::For { body: inner, .. } = &body else {
        panic!("expected loop, got {}", body);
    };
    let Block::Alloc { body: alloc_body, .. } = inner.as_ref() else {
        panic!("expected alloc");
    };
    assert_eq!(alloc_body.statements().len(), 2);
}

// ── Leaf statements ──

#[test]
fn test_store_through_derived_view() {
    let mut b = IRBuilder::new();
    let a = input("A", &[8, 8]);
    let rows = a.slice(&keys![2..4, ..]).unwrap();
    b.store(&rows, &keys![1, 5], 2.0).unwrap();
    let body = b.build().unwrap();
    assert_eq!(
        body,
        Block::Store {
            var: a.var().clone(),
            indices: vec![Expr::Int(3), Expr::Int(5)],
            value: Expr::Float(2.0),
        }
    );
}

#[test]
fn test_store_into_partial_view_unsupported() {
    let mut b = IRBuilder::new();
    let a = input("A", &[8, 8]);
    assert!(matches!(
        b.store(&a, &keys![1, ..], 0.0),
        Err(Error::UnsupportedOperation(_))
    ));
    assert!(b.tree().is_empty());
}

#[test]
fn test_store_validates_keys() {
    let mut b = IRBuilder::new();
    let a = input("A", &[4]);
    assert!(matches!(
        b.store(&a, &keys![4], 0.0),
        Err(Error::OutOfBounds { .. })
    ));
    assert!(matches!(
        b.store(&a, &keys![0, 0], 0.0),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_fill_and_whole_load_unsupported() {
    let mut b = IRBuilder::new();
    let a = input("A", &[4]);
    assert!(matches!(b.fill(&a, 0.0), Err(Error::UnsupportedOperation(_))));
    assert!(matches!(b.load(&a), Err(Error::UnsupportedOperation(_))));
}

#[test]
fn test_call_and_map_var() {
    let mut b = IRBuilder::new();
    let out = input("out", &[8]);
    b.spatial_for(LoopSpec::single("i", 0..4), |b, v| {
        let t = b.map_var("t", &v[0] * 2);
        assert_eq!(t.dtype(), DType::Int32);
        b.call(DType::Int32, "barrier", vec![]);
        b.store(&out, &keys![&t], 1.0)
    })
    .unwrap();

    let body = b.build().unwrap();
    let Block::For { body: inner, .. } = &body else {
        panic!("expected loop");
    };
    let Block::Remap { bindings, body: remap_body } = inner.as_ref() else {
        panic!("expected remap");
    };
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].var.name(), "t");
    let stmts = remap_body.statements();
    assert!(matches!(stmts[0], Block::Evaluate(Expr::Call { name, .. }) if name == "barrier"));
    assert!(matches!(stmts[1], Block::Store { .. }));
}

#[test]
fn test_loop_closure_error_propagates() {
    let mut b = IRBuilder::new();
    let a = input("A", &[4]);
    let err = b
        .spatial_for(LoopSpec::single("i", 0..4), |b, _| b.store(&a, &keys![9], 0.0))
        .unwrap_err();
    assert!(matches!(err, Error::OutOfBounds { dim: 0, .. }));
}

#[test]
fn test_end_scope_with_handle_from_other_builder() {
    let mut first = IRBuilder::new();
    let mut handles = Vec::new();
    for name in ["a", "b", "c"] {
        let (handle, _) = first
            .begin_loop(IterKind::Spatial, LoopSpec::single(name, 0..2))
            .unwrap();
        handles.push(handle);
    }

    let mut second = IRBuilder::new();
    let foreign = handles.pop().unwrap();
    assert!(matches!(
        second.end_scope(foreign),
        Err(Error::StackDiscipline(_))
    ));
    assert_eq!(second.tree().depth(), 1);
    assert_eq!(first.tree().depth(), 4);
}

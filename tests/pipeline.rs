use stagir::builder::LoopSpec;
use stagir::config::TargetConfig;
use stagir::demos;
use stagir::kernel::{program_build_for, KernelOptions};
use stagir::{
    keys, print_ir, program_build, program_build_all, program_lower, Array, Block, DType, Error,
    Expr, IRBuilder, IntoKernel, KernelDef, TensorDesc, Var,
};

fn store_offsets(body: &Block) -> Vec<(String, Vec<Expr>)> {
    body.stores()
        .into_iter()
        .map(|s| match s {
            Block::Store { var, indices, .. } => (var.name().to_string(), indices.clone()),
            _ => unreachable!(),
        })
        .collect()
}

// ── Trace → lower → flatten ──

#[test]
fn test_unrolled_local_buffer_flattens_to_linear_offsets() {
    let out = TensorDesc::input("out", DType::Float32, [1]);
    let kernel = program_lower("fill", &[out], &[], |b, bufs, _| {
        let buf = b.alloc([2, 2], "local", DType::Float32, "buf");
        b.unroll_for(LoopSpec::new(["i", "j"], [0..2, 0..2]), |b, v| {
            b.store(&buf, &keys![&v[0], &v[1]], 1.0)
        })?;
        b.store(&bufs[0], &keys![0], buf.get(&keys![0, 0])?)
    })
    .unwrap();

    let offsets = store_offsets(&kernel.body);
    let expected: Vec<(String, Vec<Expr>)> = (0..4)
        .map(|k| ("buf".to_string(), vec![Expr::Int(k)]))
        .chain([("out".to_string(), vec![Expr::Int(0)])])
        .collect();
    assert_eq!(offsets, expected);

    let Some(Block::Store { value, .. }) = kernel.body.stores().last().copied() else {
        panic!("expected final store");
    };
    assert_eq!(value.to_string(), "buf[0]");
}

#[test]
fn test_fill_ir_snapshot() {
    let kernel = demos::fill().into_kernel().unwrap();
    insta::assert_snapshot!(print_ir(&kernel.body), @r###"
    alloc buf[4] float32 local {
      store buf[0] = 1.0
      store buf[1] = 1.0
      store buf[2] = 1.0
      store buf[3] = 1.0
      store out[0] = buf[0]
    }
    "###);
}

#[test]
fn test_sliced_view_flattens_against_root_shape() {
    let a = TensorDesc::input("A", DType::Float32, [8, 8]);
    let kernel = program_lower("rows", &[a], &[], |b, bufs, _| {
        let rows = bufs[0].slice(&keys![2..4, ..])?;
        b.store(&rows, &keys![1, 5], 0.0)
    })
    .unwrap();
    assert_eq!(
        store_offsets(&kernel.body),
        vec![("A".to_string(), vec![Expr::Int(3 * 8 + 5)])]
    );
}

#[test]
fn test_trace_errors_abort_lowering() {
    let a = TensorDesc::input("A", DType::Float32, [4, 4]);
    let err = program_lower("bad", &[a.clone()], &[], |b, bufs, _| {
        b.store(&bufs[0], &keys![4, 0], 0.0)
    })
    .unwrap_err();
    assert!(matches!(err, Error::OutOfBounds { dim: 0, .. }));

    let err = program_lower("bad", &[a], &[], |b, bufs, _| {
        let row = bufs[0].slice(&keys![1, ..])?;
        let _ = b.load(&row)?;
        Ok(())
    })
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)));
}

#[test]
fn test_without_flatten_keeps_indices() {
    let options = KernelOptions {
        flatten: false,
        ..KernelOptions::default()
    };
    let kernel = demos::gemm(2, 2, 2)
        .with_options(options)
        .into_kernel()
        .unwrap();
    let stores = store_offsets(&kernel.body);
    assert_eq!(stores.last().map(|(_, idx)| idx.len()), Some(2));

    // The C backend needs linear accesses to pointer parameters.
    let err = program_build(kernel, "c").unwrap_err();
    assert!(matches!(err, Error::UnsupportedConstruct { .. }));
}

// ── Codegen dispatch ──

#[test]
fn test_build_fill_for_c() {
    let kernel = program_build(demos::fill(), "c").unwrap();
    let source = kernel.source.as_deref().unwrap();
    assert!(source.starts_with("#include <stdint.h>\n"));
    assert!(source.contains("void fill(float *restrict out) {\n"));
    assert!(source.contains("    float buf[4];\n"));
    assert!(source.contains("    buf[3] = 1.0f;\n"));
    assert!(source.contains("    out[0] = buf[0];\n"));
    assert!(source.ends_with("}\n"));
}

#[test]
fn test_build_relu_has_scalar_parameter() {
    let kernel = program_build(demos::relu(), "c").unwrap();
    let source = kernel.source.unwrap();
    assert!(source.contains("void relu(float *restrict x, float *restrict out, int32_t len) {\n"));
    assert!(source.contains("for (int32_t i = 0; i < len; ++i) { /* spatial x */"));
    assert!(source.contains("out[i] = ((x[i]) > (0.0f) ? (x[i]) : (0.0f));"));
}

#[test]
fn test_zigzag_supported_on_c_only() {
    let c = program_build(demos::zigzag(8), "c").unwrap();
    assert!(c.source.unwrap().contains("/* zigzag */"));

    let err = program_build(demos::zigzag(8), "cortex-m").unwrap_err();
    assert!(matches!(
        err,
        Error::UnsupportedConstruct { ref target, .. } if target == "arm_m"
    ));
}

#[test]
fn test_unknown_target() {
    assert_eq!(
        program_build(demos::fill(), "wasm").unwrap_err(),
        Error::UnsupportedTarget("wasm".to_string())
    );
}

#[test]
fn test_build_with_target_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wide.json");
    std::fs::write(
        &path,
        r#"{"name": "wide", "includes": [], "restrict_keyword": "", "indent_width": 4}"#,
    )
    .unwrap();
    let config = TargetConfig::load(&path).unwrap();
    let kernel = program_build_for(demos::fill(), config).unwrap();
    let source = kernel.source.unwrap();
    assert!(source.starts_with("void fill(float *out) {\n"));
    assert!(source.contains("        buf[0] = 1.0f;\n"));
}

// ── Artifacts ──

#[test]
fn test_kernel_json_artifact() {
    let kernel = program_build(demos::fill(), "c").unwrap();
    let json: serde_json::Value = serde_json::from_str(&kernel.to_json().unwrap()).unwrap();
    assert_eq!(json["name"], "fill");
    assert_eq!(json["bufferParams"][0]["var"]["name"], "out");
    assert_eq!(json["bufferParams"][0]["var"]["dtype"], "float32");
    assert_eq!(json["scalarParams"], serde_json::json!([]));
    assert!(json["body"]["alloc"].is_object());
    assert!(json["source"].as_str().unwrap().contains("void fill"));
}

#[test]
fn test_content_hash_is_stable_across_traces() {
    let first = demos::gemm(4, 4, 4).into_kernel().unwrap();
    let second = demos::gemm(4, 4, 4).into_kernel().unwrap();
    let other = demos::gemm(4, 4, 2).into_kernel().unwrap();
    assert_eq!(first.content_hash(), second.content_hash());
    assert_ne!(first.content_hash(), other.content_hash());
    assert_eq!(first.content_hash().len(), 64);
}

// ── Parallel builds ──

#[test]
fn test_build_all_in_parallel() {
    let kernels: Vec<_> = (1..=8).map(|n| demos::gemm(n, n, n)).collect();
    let results = program_build_all(kernels, "c");
    assert_eq!(results.len(), 8);
    for (n, result) in (1..=8).zip(results) {
        let kernel = result.unwrap();
        let TensorDesc { shape, .. } = &kernel.signature.buffer_params[0];
        assert_eq!(shape, &vec![Expr::Int(n), Expr::Int(n)]);
        assert!(kernel.source.is_some());
    }
}

#[test]
fn test_build_all_reports_per_kernel_errors() {
    // Traces nothing, so lowering finds an empty root.
    let empty: demos::DemoFn =
        Box::new(|_: &mut IRBuilder, _: &[Array], _: &[Var]| Ok::<(), Error>(()));
    let kernels = vec![
        demos::fill(),
        demos::zigzag(4),
        KernelDef::new("empty", vec![], vec![], empty),
    ];
    let results = program_build_all(kernels, "arm_m");
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(Error::UnsupportedConstruct { .. })
    ));
    assert!(matches!(results[2], Err(Error::Configuration(_))));
}

//! Benchmarks for the dataflow analysis.
//!
//! Measures the cost of the pieces a trimmer pays for on every method:
//! - Control-flow graph construction
//! - Fixpoint iteration over a branchy method with string locals
//! - A reflection-heavy method that marks members and reports diagnostics
//! - Meets of wide value sets

extern crate dotreach;

use criterion::{criterion_group, criterion_main, Criterion};
use dotreach::{analysis::ControlFlowGraph, prelude::*};
use std::hint::black_box;

const CORLIB: &str = "System.Runtime";

struct Bench {
    store: MetadataStore,
    branchy: Token,
    reflective: Token,
}

/// A method with `arms` conditional stores into one local, joined in a loop.
fn branchy_body(arms: u16) -> MethodBody {
    let mut body = MethodBodyBuilder::new();
    body.local(TypeSignature::String).local(TypeSignature::I4);
    body.label("head");
    for arm in 0..arms {
        let skip = format!("skip{arm}");
        body.ldarg(0)
            .ldc_i4(i32::from(arm))
            .branch(OpCode::BneUn, &skip)
            .ldstr(&format!("arm{arm}"))
            .stloc(0)
            .label(&skip);
    }
    body.ldloc(1)
        .ldc_i4(1)
        .emit(OpCode::Add)
        .stloc(1)
        .ldloc(1)
        .ldc_i4(8)
        .branch(OpCode::Blt, "head")
        .ldloc(0)
        .emit(OpCode::Ret);
    body.build().unwrap()
}

fn setup() -> Bench {
    let mut store = MetadataStore::new();
    let public = TypeAttributes::PUBLIC;
    let statics = MethodAttributes::PUBLIC | MethodAttributes::STATIC;

    let object = store.add_type(CORLIB, "System", "Object", public, None);
    let type_type = store.add_type(CORLIB, "System", "Type", public, Some(object));
    let type_sig = TypeSignature::Class(type_type);
    let get_type = store.add_method(
        type_type,
        "GetType",
        statics,
        SignatureMethod::new_static(type_sig.clone(), vec![TypeSignature::String]),
    );
    let get_methods = store.add_method(
        type_type,
        "GetMethods",
        MethodAttributes::PUBLIC,
        SignatureMethod::new_instance(TypeSignature::Object, vec![]),
    );

    let app = store.add_type("App", "App", "Service", public, Some(object));
    for index in 0..32 {
        store.add_method(
            app,
            &format!("Handler{index}"),
            MethodAttributes::PUBLIC,
            SignatureMethod::new_instance(TypeSignature::Void, vec![]),
        );
    }

    let program = store.add_type("App", "App", "Program", public, Some(object));
    let branchy = store.add_method(
        program,
        "Branchy",
        statics,
        SignatureMethod::new_static(TypeSignature::String, vec![TypeSignature::I4]),
    );
    store.set_method_body(branchy, branchy_body(24));

    let reflective = store.add_method(
        program,
        "Reflective",
        statics,
        SignatureMethod::new_static(TypeSignature::Void, vec![TypeSignature::String]),
    );
    let mut body = MethodBodyBuilder::new();
    for name in ["App.Service", "App.Program", "App.Missing"] {
        body.ldstr(name).call(get_type).callvirt(get_methods).emit(OpCode::Pop);
    }
    body.ldarg(0).call(get_type).callvirt(get_methods).emit(OpCode::Pop);
    body.emit(OpCode::Ret);
    store.set_method_body(reflective, body.build().unwrap());

    Bench {
        store,
        branchy,
        reflective,
    }
}

fn bench_cfg_build(c: &mut Criterion) {
    let bench = setup();
    let body = bench.store.method_body(bench.branchy).unwrap();

    c.bench_function("cfg_build_branchy", |b| {
        b.iter(|| {
            let cfg = ControlFlowGraph::build(black_box(&body), bench.branchy).unwrap();
            black_box(cfg)
        });
    });
}

fn bench_fixpoint(c: &mut Criterion) {
    let bench = setup();

    c.bench_function("analyze_branchy", |b| {
        b.iter(|| {
            let host = RecordingHost::new(&bench.store);
            let session = AnalysisSession::new(&host, AnalysisConfig::sequential());
            black_box(session.analyze_method(black_box(bench.branchy)).unwrap())
        });
    });
}

fn bench_reflection(c: &mut Criterion) {
    let bench = setup();

    c.bench_function("analyze_reflective", |b| {
        b.iter(|| {
            let host = RecordingHost::new(&bench.store);
            let session = AnalysisSession::new(&host, AnalysisConfig::sequential());
            session.analyze_method(black_box(bench.reflective)).unwrap();
            black_box(host.marks.len())
        });
    });
}

fn bench_meet(c: &mut Criterion) {
    let wide = |prefix: &str| {
        (0..64).fold(MultiValue::empty(), |set, i| {
            set.merge(&MultiValue::single(AbstractValue::string(&format!("{prefix}{i}"))))
        })
    };
    let left = wide("left");
    let right = wide("right");

    c.bench_function("multivalue_meet_64x64", |b| {
        b.iter(|| black_box(black_box(&left).meet(black_box(&right))));
    });
}

criterion_group!(
    benches,
    bench_cfg_build,
    bench_fixpoint,
    bench_reflection,
    bench_meet
);
criterion_main!(benches);

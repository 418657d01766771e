//! Call-boundary benchmarks.
//!
//! Measures the cost of crossing the bridge:
//! - Global functions and methods, including overload resolution depth
//! - Wrapper lookup for objects that are already exposed
//! - Asynchronous calls queued on one object
//!
//! ## Profiling with Puffin
//!
//! ```bash
//! cargo bench --bench call_benchmarks --features profile-with-puffin -- --profile-time 5
//! ```

use std::hint::black_box;

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use hostbridge::{
    Bridge, BridgeConfig, CallContext, Module, NativeError, ParamKind, ReturnAttr, ReturnValue,
    ScriptValue, Signature, TypeHash,
};

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

struct Counter {
    value: f64,
}

fn add(ctx: &mut CallContext) -> Result<(), NativeError> {
    let a: f64 = ctx.arg(0)?;
    let b: f64 = ctx.arg(1)?;
    ctx.set_return(a + b);
    Ok(())
}

fn increment(ctx: &mut CallContext) -> Result<(), NativeError> {
    let by: f64 = ctx.arg(0)?;
    let value = ctx.with_this(|c: &mut Counter| {
        c.value += by;
        c.value
    })?;
    ctx.set_return(value);
    Ok(())
}

fn bench_module() -> Module {
    let mut module = Module::new("bench");
    let pair = |a: ParamKind, b: ParamKind| Signature::new(vec![a, b]).returns(ParamKind::Float);
    module
        .function("add", pair(ParamKind::Float, ParamKind::Float), add)
        .function("deep", pair(ParamKind::String, ParamKind::String), add)
        .function("deep", pair(ParamKind::Bool, ParamKind::Bool), add)
        .function("deep", pair(ParamKind::String, ParamKind::Float), add)
        .function("deep", pair(ParamKind::Float, ParamKind::Float), add);
    module
        .class::<Counter>("Counter")
        .constructor(vec![], |_| Ok(Counter { value: 0.0 }))
        .duplex(
            "increment",
            "incrementAsync",
            Signature::new(vec![ParamKind::Float]).returns(ParamKind::Float),
            increment,
        )
        .build();
    module
}

fn bench_bridge() -> Bridge {
    let mut bridge = Bridge::new(BridgeConfig::new().with_workers(2)).expect("bridge");
    bridge.register(bench_module()).expect("register");
    bridge
}

/// Synchronous calls through the resolver.
fn sync_call_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let bridge = bench_bridge();
    let counter = bridge.construct("Counter", &[]).expect("counter");
    let counter = counter.as_object().cloned().expect("proxy");
    let args = [ScriptValue::Number(1.0), ScriptValue::Number(2.0)];

    let mut group = c.benchmark_group("calls/sync");
    group.bench_function("global_first_overload", |b| {
        b.iter(|| {
            let result = bridge.call("add", black_box(&args));
            end_profiling_frame();
            black_box(result)
        });
    });
    group.bench_function("global_fourth_overload", |b| {
        b.iter(|| black_box(bridge.call("deep", black_box(&args))));
    });
    group.bench_function("method", |b| {
        b.iter(|| black_box(bridge.call_method(&counter, "increment", black_box(&args[..1]))));
    });
    group.finish();
}

/// Re-exposing an object that already has a wrapper.
fn wrapper_benchmarks(c: &mut Criterion) {
    let bridge = bench_bridge();
    let handle = bridge.heap().allocate(TypeHash::from_name("Counter"), Counter { value: 0.0 });
    let kind = ParamKind::object("Counter");
    let held = bridge
        .expose(ReturnValue::Reference(handle), &kind, ReturnAttr::empty())
        .expect("expose");

    let mut group = c.benchmark_group("objects");
    group.bench_function("existing_wrapper", |b| {
        b.iter(|| black_box(bridge.expose(ReturnValue::Reference(handle), &kind, ReturnAttr::empty())));
    });
    group.bench_function("array_of_wrappers", |b| {
        let items = || ReturnValue::Array((0..64).map(|_| ReturnValue::Reference(handle)).collect());
        b.iter_batched(
            items,
            |value| black_box(bridge.expose(value, &ParamKind::array(kind.clone()), ReturnAttr::empty())),
            BatchSize::SmallInput,
        );
    });
    group.finish();
    drop(held);
}

/// Queuing and settling asynchronous calls on one object.
fn async_benchmarks(c: &mut Criterion) {
    const BATCH: u64 = 256;
    let mut bridge = bench_bridge();
    let counter = bridge.construct("Counter", &[]).expect("counter");
    let counter = counter.as_object().cloned().expect("proxy");
    let by = [ScriptValue::Number(1.0)];

    let mut group = c.benchmark_group("calls/async");
    group.throughput(Throughput::Elements(BATCH));
    group.bench_function("serialized_batch", |b| {
        b.iter(|| {
            let promises: Vec<_> = (0..BATCH)
                .map(|_| bridge.call_method_async(&counter, "incrementAsync", &by))
                .collect();
            for promise in &promises {
                black_box(bridge.await_promise(promise).expect("task"));
            }
            end_profiling_frame();
        });
    });
    group.finish();
}

criterion_group!(benches, sync_call_benchmarks, wrapper_benchmarks, async_benchmarks);

criterion_main!(benches);

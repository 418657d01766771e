// tests/test_harness.rs
//! Shared fixtures for the bridge integration tests.
//!
//! Each test file pulls this in with `mod test_harness;` and builds a
//! bridge with [`bridge_with`], registering only the fixture modules it
//! needs.

#![allow(dead_code)]

use hostbridge::*;

/// Route bridge logs to the test output.
pub fn setup_test_logging() {
    logging::setup_test_logging("hostbridge=debug");
}

/// A bridge with `workers` workers and every given module registered.
pub fn bridge_with(workers: usize, modules: Vec<Module>) -> Bridge {
    setup_test_logging();
    let mut bridge = Bridge::new(BridgeConfig::new().with_workers(workers)).expect("bridge");
    for module in modules {
        bridge.register(module).expect("register");
    }
    bridge
}

/// The wrapper inside a script value.
pub fn proxy(value: &ScriptValue) -> Proxy {
    value.as_object().cloned().expect("expected an object")
}

pub fn num(value: f64) -> ScriptValue {
    ScriptValue::Number(value)
}

pub fn text(value: &str) -> ScriptValue {
    ScriptValue::String(value.to_string())
}

// ============================================================================
// Critical: a counter guarded by the per-object lock
// ============================================================================

pub struct Critical {
    pub value: i64,
    pub log: Vec<i64>,
}

/// Read-modify-write in two separate accesses, so only the per-object lock
/// keeps concurrent increments from losing updates.
fn bump(ctx: &CallContext, target: &ObjectRef, by: i64) -> Result<i64, NativeError> {
    let current = ctx.with_object(target, |c: &mut Critical| c.value)?;
    std::thread::yield_now();
    ctx.with_object(target, |c: &mut Critical| {
        c.value = current + by;
        c.value
    })
}

fn critical_increment(ctx: &mut CallContext) -> Result<(), NativeError> {
    let by: i64 = ctx.arg(0)?;
    let this = ctx.this_ref()?.clone();
    let value = bump(ctx, &this, by)?;
    ctx.set_return(value);
    Ok(())
}

fn global_increment(ctx: &mut CallContext) -> Result<(), NativeError> {
    let target = ctx.object_arg(0)?.clone();
    let by: i64 = ctx.arg(1)?;
    let value = bump(ctx, &target, by)?;
    ctx.set_return(value);
    Ok(())
}

fn critical_get(ctx: &mut CallContext) -> Result<(), NativeError> {
    let value = ctx.with_this(|c: &mut Critical| c.value)?;
    ctx.set_return(value);
    Ok(())
}

fn critical_record(ctx: &mut CallContext) -> Result<(), NativeError> {
    let entry: i64 = ctx.arg(0)?;
    ctx.with_this(|c: &mut Critical| c.log.push(entry))
}

fn critical_log(ctx: &mut CallContext) -> Result<(), NativeError> {
    let log = ctx.with_this(|c: &mut Critical| c.log.clone())?;
    ctx.set_return(log);
    Ok(())
}

fn critical_slow(ctx: &mut CallContext) -> Result<(), NativeError> {
    std::thread::sleep(std::time::Duration::from_millis(50));
    critical_get(ctx)
}

pub fn critical_module() -> Module {
    let mut module = Module::new("critical");
    module
        .class::<Critical>("Critical")
        .constructor(vec![], |_| {
            Ok(Critical {
                value: 0,
                log: Vec::new(),
            })
        })
        .duplex(
            "increment",
            "incrementAsync",
            Signature::new(vec![ParamKind::Int]).returns(ParamKind::Int),
            critical_increment,
        )
        .method("get", Signature::new(vec![]).returns(ParamKind::Int), critical_get)
        .method_async("record", Signature::new(vec![ParamKind::Int]), critical_record)
        .method("log", Signature::new(vec![]).returns(ParamKind::array(ParamKind::Int)), critical_log)
        .method_async("slow", Signature::new(vec![]).returns(ParamKind::Int), critical_slow)
        .build();
    module.function_async(
        "increment",
        Signature::new(vec![ParamKind::object("Critical"), ParamKind::Int]).returns(ParamKind::Int),
        global_increment,
    );
    module
}

// ============================================================================
// Base / Derived: inheritance with a virtual method
// ============================================================================

#[derive(Clone)]
pub struct Base {
    pub b: i64,
}

pub struct Derived {
    pub base: Base,
    pub d: i64,
}

fn base_get(ctx: &mut CallContext) -> Result<(), NativeError> {
    let value = ctx.with_this(|b: &mut Base| b.b)?;
    ctx.set_return(value);
    Ok(())
}

fn derived_get(ctx: &mut CallContext) -> Result<(), NativeError> {
    let value = ctx.with_this(|d: &mut Derived| d.d)?;
    ctx.set_return(value);
    Ok(())
}

fn return_same(ctx: &mut CallContext) -> Result<(), NativeError> {
    let handle = ctx.object_arg(0)?.handle;
    ctx.set_return(ReturnValue::Reference(handle));
    Ok(())
}

fn require_object(ctx: &mut CallContext) -> Result<(), NativeError> {
    ctx.object_arg(0)?;
    ctx.set_return(true);
    Ok(())
}

pub fn inheritance_module() -> Module {
    let mut module = Module::new("inheritance");
    module
        .class::<Base>("Base")
        .constructor(vec![ParamKind::Int], |ctx| Ok(Base { b: ctx.arg(0)? }))
        .method("get", Signature::new(vec![]).returns(ParamKind::Int), base_get)
        .method("base_get", Signature::new(vec![]).returns(ParamKind::Int), base_get)
        .copyable()
        .build();
    module
        .class::<Derived>("Derived")
        .extends::<Base>("Base", |d| &mut d.base)
        .constructor(vec![ParamKind::Int], |ctx| {
            let b: i64 = ctx.arg(0)?;
            Ok(Derived {
                base: Base { b },
                d: b + 1,
            })
        })
        .method("get", Signature::new(vec![]).returns(ParamKind::Int), derived_get)
        .method("derived_get", Signature::new(vec![]).returns(ParamKind::Int), derived_get)
        .build();
    module
        .function(
            "return_Base",
            Signature::new(vec![ParamKind::object("Base")]).returns(ParamKind::object("Base")),
            return_same,
        )
        .function(
            "copy_Base",
            Signature::new(vec![ParamKind::object("Base")])
                .returns(ParamKind::object("Base"))
                .with_attrs(ReturnAttr::COPY),
            return_same,
        )
        .function(
            "require_Base",
            Signature::new(vec![ParamKind::object("Base")]).returns(ParamKind::Bool),
            require_object,
        )
        .function(
            "require_Derived",
            Signature::new(vec![ParamKind::object("Derived")]).returns(ParamKind::Bool),
            require_object,
        );
    module
}

// ============================================================================
// Outer / Inner: nested members
// ============================================================================

pub struct Inner {
    pub value: i64,
}

pub struct Outer {
    pub inner: Inner,
    pub label: String,
}

fn inner_get(ctx: &mut CallContext) -> Result<(), NativeError> {
    let value = ctx.with_this(|i: &mut Inner| i.value)?;
    ctx.set_return(value);
    Ok(())
}

fn inner_set(ctx: &mut CallContext) -> Result<(), NativeError> {
    let value: i64 = ctx.arg(0)?;
    ctx.with_this(|i: &mut Inner| i.value = value)
}

pub fn nested_module() -> Module {
    let mut module = Module::new("nested");
    module
        .class::<Inner>("Inner")
        .method("get", Signature::new(vec![]).returns(ParamKind::Int), inner_get)
        .method("set", Signature::new(vec![ParamKind::Int]), inner_set)
        .build();
    module
        .class::<Outer>("Outer")
        .constructor(vec![ParamKind::String], |ctx| {
            Ok(Outer {
                inner: Inner { value: 0 },
                label: ctx.arg(0)?,
            })
        })
        .nested::<Inner>("inner", "Inner", |o| &mut o.inner)
        .field(
            "label",
            ParamKind::String,
            |o: &Outer| o.label.clone(),
            Some(|o: &mut Outer, label| o.label = label),
        )
        .field("size", ParamKind::Int, |o: &Outer| o.label.len() as i64, None)
        .build();
    module
}

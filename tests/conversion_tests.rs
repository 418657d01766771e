//! Binary buffers and user typemaps.

mod test_harness;

use hostbridge::*;
use test_harness::*;

fn buffer_module() -> Module {
    let mut module = Module::new("buffers");
    module
        .function(
            "get_buffer",
            Signature::new(vec![]).returns(ParamKind::Buffer),
            |ctx: &mut CallContext| -> Result<(), NativeError> {
                ctx.set_return(Buffer((0..16u8).collect()));
                Ok(())
            },
        )
        .function(
            "put_buffer",
            Signature::new(vec![ParamKind::Buffer]).returns(ParamKind::Bool),
            |ctx: &mut CallContext| -> Result<(), NativeError> {
                let buffer: Buffer = ctx.arg(0)?;
                let expected = buffer.len() == 16 && buffer.iter().enumerate().all(|(i, b)| usize::from(*b) == i);
                if !expected {
                    return Err(NativeError::other("Invalid value"));
                }
                ctx.set_return(true);
                Ok(())
            },
        );
    module
}

/// Integers that cross as decimal strings.
fn string_int() -> Typemap {
    Typemap::new("StringInt", "string")
        .from_script(|value| match value {
            ScriptValue::String(s) => s.parse::<i64>().map(NativeValue::Int).map_err(|_| CoercionFailure::Custom {
                message: format!("{s:?} is not an integer"),
            }),
            _ => Err(CoercionFailure::Custom {
                message: "Expected a string".into(),
            }),
        })
        .to_script(|value| match value {
            ReturnValue::Int(i) => Ok(ScriptValue::String(i.to_string())),
            other => Err(NativeError::other(format!("unexpected {}", other.type_name()))),
        })
}

fn add(ctx: &mut CallContext) -> Result<(), NativeError> {
    let a: i64 = ctx.arg(0)?;
    let b: i64 = ctx.arg(1)?;
    ctx.set_return(a + b);
    Ok(())
}

fn typemap_module() -> Module {
    let mut module = Module::new("typemaps");
    module
        .typemap(string_int())
        .typemap(Typemap::new("StaticString", "string").hidden(|| NativeValue::String("Static string".into())))
        .override_kind(ParamKind::Int, "StringInt")
        .function(
            "add",
            Signature::new(vec![ParamKind::Int, ParamKind::Int]).returns(ParamKind::Int),
            add,
        )
        .function(
            "hello",
            Signature::new(vec![ParamKind::custom("StaticString")]).returns(ParamKind::String),
            |ctx: &mut CallContext| -> Result<(), NativeError> {
                let suffix: String = ctx.arg(0)?;
                ctx.set_return(format!("hello {suffix}"));
                Ok(())
            },
        );
    module
}

#[test]
fn buffers_round_trip() {
    let bridge = bridge_with(1, vec![buffer_module()]);
    let buffer = bridge.call("get_buffer", &[]).expect("get");
    assert_eq!(buffer.as_buffer().map(<[u8]>::len), Some(16));
    assert_eq!(bridge.call("put_buffer", &[buffer]), Ok(ScriptValue::Bool(true)));

    let err = bridge
        .call("put_buffer", &[ScriptValue::Buffer(vec![1, 2, 3])])
        .expect_err("wrong bytes");
    assert!(matches!(
        &err,
        BridgeError::NativeOperationFailure { message, .. } if message.contains("Invalid value")
    ));
}

#[test]
fn arrays_are_not_buffers() {
    let bridge = bridge_with(1, vec![buffer_module()]);
    let bytes = ScriptValue::Array((0..16).map(|i| num(f64::from(i))).collect());
    let err = bridge.call("put_buffer", &[bytes]).expect_err("not a buffer");
    assert!(matches!(
        err,
        BridgeError::Coercion {
            failure: CoercionFailure::NotABuffer,
            ..
        }
    ));
    assert!(err.to_string().ends_with("Expected a Buffer"), "{err}");
}

#[test]
fn overridden_kinds_use_the_typemap() {
    let bridge = bridge_with(1, vec![typemap_module()]);
    assert_eq!(bridge.call("add", &[text("2"), text("3")]), Ok(text("5")));

    let err = bridge.call("add", &[num(2.0), num(3.0)]).expect_err("numbers");
    assert!(err.to_string().ends_with("Expected a string"), "{err}");
    let err = bridge.call("add", &[text("two"), text("3")]).expect_err("not an integer");
    assert!(err.to_string().contains("\"two\" is not an integer"), "{err}");
}

#[test]
fn hidden_parameters_take_no_argument() {
    let bridge = bridge_with(1, vec![typemap_module()]);
    assert_eq!(bridge.call("hello", &[]), Ok(text("hello Static string")));

    let err = bridge.call("hello", &[text("invalid")]).expect_err("too many");
    assert_eq!(err.to_string(), "hello: Expected 0 arguments, got 1");
}

#[test]
fn typemaps_are_shared_across_modules() {
    let mut later = Module::new("later");
    later.function(
        "twice",
        Signature::new(vec![ParamKind::custom("StringInt")]).returns(ParamKind::custom("StringInt")),
        |ctx: &mut CallContext| -> Result<(), NativeError> {
            let value: i64 = ctx.arg(0)?;
            ctx.set_return(value * 2);
            Ok(())
        },
    );
    let bridge = bridge_with(1, vec![typemap_module(), later]);
    assert_eq!(bridge.call("twice", &[text("21")]), Ok(text("42")));
}

#[test]
fn typemap_registration_is_checked() {
    let mut bridge = bridge_with(1, vec![typemap_module()]);

    let mut again = Module::new("again");
    again.typemap(string_int());
    assert_eq!(
        bridge.register(again),
        Err(RegistrationError::DuplicateTypemap {
            name: "StringInt".into()
        })
    );

    let mut missing = Module::new("missing");
    missing
        .function(
            "uses",
            Signature::new(vec![ParamKind::custom("Nowhere")]),
            |_: &mut CallContext| -> Result<(), NativeError> { Ok(()) },
        )
        .typemap(Typemap::new("Unused", "string"));
    assert!(matches!(
        bridge.register(missing),
        Err(RegistrationError::UnknownTypemap { callable, .. }) if callable == "uses"
    ));
    // nothing from the failed module is visible
    assert!(matches!(
        bridge.call("uses", &[]),
        Err(BridgeError::UnknownCallable { .. })
    ));
    let mut reuse = Module::new("reuse");
    reuse.typemap(Typemap::new("Unused", "string"));
    assert_eq!(bridge.register(reuse), Ok(()));
}

#[test]
fn declarations_use_typemap_spellings() {
    let bridge = bridge_with(1, vec![buffer_module(), typemap_module()]);
    let declarations = bridge.declarations();
    for line in [
        "export function add(arg0: string, arg1: string): string;",
        "export function hello(): string;",
        "export function get_buffer(): Buffer;",
        "export function put_buffer(arg0: Buffer): boolean;",
    ] {
        assert!(
            declarations.lines().any(|l| l == line),
            "missing {line:?} in:\n{declarations}"
        );
    }
}

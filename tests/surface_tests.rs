//! Collections, declarations, registration and configuration.

mod test_harness;

use std::collections::BTreeMap;

use hostbridge::*;
use test_harness::*;

fn collections_module() -> Module {
    let mut module = Module::new("collections");
    module
        .function(
            "sum",
            Signature::new(vec![ParamKind::array(ParamKind::Float)]).returns(ParamKind::Float),
            |ctx: &mut CallContext| -> Result<(), NativeError> {
                let values: Vec<f64> = ctx.arg(0)?;
                ctx.set_return(values.iter().sum::<f64>());
                Ok(())
            },
        )
        .function(
            "lengths",
            Signature::new(vec![ParamKind::map(ParamKind::String)])
                .returns(ParamKind::map(ParamKind::Int)),
            |ctx: &mut CallContext| -> Result<(), NativeError> {
                let words: BTreeMap<String, String> = ctx.arg(0)?;
                let lengths: BTreeMap<String, i64> = words
                    .into_iter()
                    .map(|(key, word)| (key, word.len() as i64))
                    .collect();
                ctx.set_return(lengths);
                Ok(())
            },
        )
        .function(
            "values",
            Signature::new(vec![ParamKind::array(ParamKind::object("Critical"))])
                .returns(ParamKind::array(ParamKind::Int)),
            |ctx: &mut CallContext| -> Result<(), NativeError> {
                let objects: Vec<ObjectRef> = ctx.arg(0)?;
                let values = objects
                    .iter()
                    .map(|object| ctx.with_object(object, |c: &mut Critical| c.value))
                    .collect::<Result<Vec<_>, _>>()?;
                ctx.set_return(values);
                Ok(())
            },
        )
        .function(
            "spawn",
            Signature::new(vec![ParamKind::Int])
                .returns(ParamKind::array(ParamKind::object("Critical"))),
            |ctx: &mut CallContext| -> Result<(), NativeError> {
                let count: usize = ctx.arg(0)?;
                let objects = (0..count)
                    .map(|i| {
                        ReturnValue::object(
                            "Critical",
                            Critical {
                                value: i as i64,
                                log: Vec::new(),
                            },
                        )
                    })
                    .collect();
                ctx.set_return(ReturnValue::Array(objects));
                Ok(())
            },
        );
    module
}

#[test]
fn arrays_and_maps_cross_by_value() {
    let bridge = bridge_with(1, vec![collections_module()]);
    let numbers = ScriptValue::Array(vec![num(1.5), num(2.5), num(3.0)]);
    assert_eq!(bridge.call("sum", &[numbers]), Ok(num(7.0)));
    assert_eq!(bridge.call("sum", &[ScriptValue::Array(vec![])]), Ok(num(0.0)));

    let words = ScriptValue::Map(BTreeMap::from([
        ("a".to_string(), text("one")),
        ("b".to_string(), text("three")),
    ]));
    let expected = ScriptValue::Map(BTreeMap::from([
        ("a".to_string(), num(3.0)),
        ("b".to_string(), num(5.0)),
    ]));
    assert_eq!(bridge.call("lengths", &[words]), Ok(expected));
}

#[test]
fn collection_failures_name_the_bad_element() {
    let bridge = bridge_with(1, vec![collections_module()]);
    let err = bridge
        .call("sum", &[ScriptValue::Array(vec![num(1.0), text("x")])])
        .expect_err("bad element");
    assert_eq!(err.to_string(), "sum: argument 0: element 1: Not a number");

    let err = bridge
        .call("lengths", &[ScriptValue::Map(BTreeMap::from([("k".to_string(), num(1.0))]))])
        .expect_err("bad entry");
    assert!(matches!(
        err,
        BridgeError::Coercion {
            failure: CoercionFailure::Entry { .. },
            ..
        }
    ));
    assert!(matches!(
        bridge.call("sum", &[num(1.0)]),
        Err(BridgeError::Coercion {
            failure: CoercionFailure::NotAnArray,
            ..
        })
    ));
}

#[test]
fn arrays_of_objects_keep_identity() {
    let bridge = bridge_with(1, vec![critical_module(), collections_module()]);
    let spawned = bridge.call("spawn", &[num(3.0)]).expect("spawn");
    let objects = spawned.as_array().expect("array").to_vec();
    assert_eq!(objects.len(), 3);
    for object in &objects {
        assert_eq!(bridge.ownership_of(&proxy(object)), Some(Ownership::Owned));
    }

    bridge
        .call_method(&proxy(&objects[2]), "increment", &[num(10.0)])
        .expect("increment");
    let values = bridge.call("values", &[spawned.clone()]).expect("values");
    assert_eq!(values, ScriptValue::Array(vec![num(0.0), num(1.0), num(12.0)]));

    drop(objects);
    drop(spawned);
    assert_eq!(bridge.collect_garbage(), 3);
    assert!(bridge.heap().is_empty());
}

#[test]
fn declarations_describe_registered_surface() {
    let bridge = bridge_with(1, vec![critical_module(), inheritance_module(), nested_module()]);
    let declarations = bridge.declarations();

    for line in [
        "export class Critical {",
        "  constructor();",
        "  increment(arg0: number): number;",
        "  incrementAsync(arg0: number): Promise<number>;",
        "  log(): number[];",
        "export class Derived extends Base {",
        "export abstract class Inner {",
        "  readonly inner: Inner;",
        "  label: string;",
        "  readonly size: number;",
        "export function copy_Base(arg0: Base): Base;",
        "export function increment(arg0: Critical, arg1: number): Promise<number>;",
    ] {
        assert!(
            declarations.lines().any(|l| l == line),
            "missing {line:?} in:\n{declarations}"
        );
    }
}

#[test]
fn registration_rejects_unknown_bases() {
    struct Orphan;
    struct Missing;

    let mut module = Module::new("orphans");
    module
        .class::<Orphan>("Orphan")
        .extends::<Missing>("Missing", |_| unreachable!())
        .build();
    module.function("after", Signature::new(vec![]), |_: &mut CallContext| -> Result<(), NativeError> { Ok(()) });

    let mut bridge = bridge_with(1, vec![]);
    let err = bridge.register(module).expect_err("unknown base");
    assert_eq!(
        err,
        RegistrationError::UnknownBase {
            class: "Orphan".into(),
            base: "Missing".into()
        }
    );
    assert_eq!(err.to_string(), "Base class Missing not found, is the class defined?");

    // nothing from the failed module is visible
    assert!(bridge.classes().is_empty());
    assert!(matches!(
        bridge.call("after", &[]),
        Err(BridgeError::UnknownCallable { .. })
    ));
}

#[test]
fn registration_rejects_duplicates() {
    let mut bridge = bridge_with(1, vec![critical_module()]);
    assert_eq!(
        bridge.register(critical_module()),
        Err(RegistrationError::DuplicateClass {
            name: "Critical".into()
        })
    );

    let mut module = Module::new("twice");
    let noop = |_: &mut CallContext| -> Result<(), NativeError> { Ok(()) };
    module
        .function("twice", Signature::new(vec![ParamKind::Int]), noop)
        .function("twice", Signature::new(vec![ParamKind::Int]), noop);
    assert_eq!(
        bridge.register(module),
        Err(RegistrationError::DuplicateFunction {
            name: "twice".into()
        })
    );
}

#[test]
fn bases_may_come_from_an_earlier_module() {
    struct Puppy {
        base: Base,
    }

    let mut module = Module::new("puppies");
    module
        .class::<Puppy>("Puppy")
        .extends::<Base>("Base", |p| &mut p.base)
        .constructor(vec![], |_| Ok(Puppy { base: Base { b: 2 } }))
        .build();

    let mut bridge = bridge_with(1, vec![inheritance_module()]);
    bridge.register(module).expect("register");
    let puppy = bridge.construct("Puppy", &[]).expect("puppy");
    assert!(bridge.instance_of(&puppy, "Base"));
    assert_eq!(bridge.call_method(&proxy(&puppy), "get", &[]), Ok(num(2.0)));
    assert_eq!(bridge.call("require_Base", &[puppy]), Ok(ScriptValue::Bool(true)));
}

#[test]
fn unknown_names_are_reported() {
    let bridge = bridge_with(1, vec![critical_module()]);
    let critical = bridge.construct("Critical", &[]).expect("critical");
    assert_eq!(
        bridge.call("missing", &[]),
        Err(BridgeError::UnknownCallable {
            name: "missing".into()
        })
    );
    assert_eq!(
        bridge.call_method(&proxy(&critical), "missing", &[]),
        Err(BridgeError::UnknownCallable {
            name: "Critical.missing".into()
        })
    );
    let err = bridge.call_static("Nowhere", "f", &[]).expect_err("unknown class");
    assert_eq!(err.to_string(), "Class Nowhere not found, is the class defined?");
}

#[test]
fn configuration_from_variables() {
    let vars = BTreeMap::from([
        ("HOSTBRIDGE_WORKERS", "2"),
        ("HOSTBRIDGE_BLOCK_POLICY", "warn"),
        ("HOSTBRIDGE_DEBUG", "lock,task"),
    ]);
    let config = BridgeConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).expect("config");
    assert_eq!(config.workers, 2);
    assert_eq!(config.block_policy, BlockPolicy::Warn);
    assert_eq!(config.filter_directives(), "hostbridge::lock=debug,hostbridge::task=debug");

    let bridge = Bridge::new(config).expect("bridge");
    assert_eq!(bridge.config().block_policy, BlockPolicy::Warn);

    assert!(matches!(
        BridgeConfig::from_lookup(|key| (key == "HOSTBRIDGE_WORKERS").then(|| "0".to_string())),
        Err(ConfigError::InvalidWorkers { .. })
    ));
}

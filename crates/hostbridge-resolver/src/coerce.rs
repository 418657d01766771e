//! Per-parameter coercion strategies.
//!
//! Each [`ParamKind`] has one strategy that either produces a
//! [`NativeValue`] or says why the argument does not fit. Strategies never
//! convert across families: numbers are not stringified, strings are not
//! parsed, and null only fits a nullable parameter. A [`ParamKind::Custom`]
//! parameter is read by its user typemap instead, which sets its own rules.

use std::collections::BTreeMap;

use hostbridge_core::{
    CoercionFailure, NativeHeap, NativeValue, ObjectRef, ParamKind, Proxy, ScriptValue, TypeHash,
};
use hostbridge_registry::{ClassTable, WrapperRegistry};

use crate::TypemapTable;

/// What a coercion may consult: classes, live wrappers, the heap and user
/// typemaps.
#[derive(Clone, Copy)]
pub struct CoercionScope<'a> {
    pub classes: &'a ClassTable,
    pub registry: &'a WrapperRegistry,
    pub heap: &'a NativeHeap,
    pub typemaps: Option<&'a TypemapTable>,
}

impl<'a> CoercionScope<'a> {
    /// Create a coercion scope.
    pub fn new(classes: &'a ClassTable, registry: &'a WrapperRegistry, heap: &'a NativeHeap) -> Self {
        Self {
            classes,
            registry,
            heap,
            typemaps: None,
        }
    }

    /// Consult `typemaps` for custom kinds.
    pub fn with_typemaps(mut self, typemaps: &'a TypemapTable) -> Self {
        self.typemaps = Some(typemaps);
        self
    }

    /// Number of script arguments a parameter of `kind` consumes.
    pub fn inputs(&self, kind: &ParamKind) -> usize {
        self.typemaps.map_or(1, |maps| maps.inputs(kind))
    }

    /// Coerce one argument to `kind`.
    pub fn coerce(&self, value: &ScriptValue, kind: &ParamKind) -> Result<NativeValue, CoercionFailure> {
        if let ParamKind::Custom(hash) = kind {
            return match self.typemaps.and_then(|maps| maps.get(*hash)) {
                Some(map) => map.read(value),
                None => Err(CoercionFailure::Custom {
                    message: format!("no typemap registered for {hash}"),
                }),
            };
        }
        if let ParamKind::Nullable(inner) = kind {
            if value.is_nullish() {
                return Ok(NativeValue::Null);
            }
            return self.coerce(value, inner);
        }
        if matches!(kind, ParamKind::Void) {
            return Ok(NativeValue::Void);
        }
        if value.is_nullish() {
            return Err(CoercionFailure::NullNotAllowed);
        }

        match kind {
            ParamKind::Int => match value {
                // truncates toward zero; NaN becomes 0
                ScriptValue::Number(n) => Ok(NativeValue::Int(*n as i64)),
                _ => Err(CoercionFailure::NotANumber),
            },
            ParamKind::Float => match value {
                ScriptValue::Number(n) => Ok(NativeValue::Float(*n)),
                _ => Err(CoercionFailure::NotANumber),
            },
            ParamKind::String => match value {
                ScriptValue::String(s) => Ok(NativeValue::String(s.clone())),
                _ => Err(CoercionFailure::NotAString),
            },
            ParamKind::Bool => match value {
                ScriptValue::Bool(b) => Ok(NativeValue::Bool(*b)),
                _ => Err(CoercionFailure::NotABoolean),
            },
            ParamKind::Object(class) | ParamKind::Pointer(class) => match value {
                ScriptValue::Object(proxy) => self.object_ref(proxy, *class).map(NativeValue::Object),
                _ => Err(CoercionFailure::NotAnObject),
            },
            ParamKind::Array(element) => match value {
                ScriptValue::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        self.coerce(item, element).map_err(|failure| CoercionFailure::Element {
                            index,
                            failure: Box::new(failure),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(NativeValue::Array),
                _ => Err(CoercionFailure::NotAnArray),
            },
            ParamKind::Map(entry) => match value {
                ScriptValue::Map(entries) => entries
                    .iter()
                    .map(|(key, item)| {
                        self.coerce(item, entry)
                            .map(|v| (key.clone(), v))
                            .map_err(|failure| CoercionFailure::Entry {
                                key: key.clone(),
                                failure: Box::new(failure),
                            })
                    })
                    .collect::<Result<BTreeMap<_, _>, _>>()
                    .map(NativeValue::Map),
                _ => Err(CoercionFailure::NotAMap),
            },
            ParamKind::Buffer => match value {
                ScriptValue::Buffer(bytes) => Ok(NativeValue::Buffer(bytes.clone())),
                _ => Err(CoercionFailure::NotABuffer),
            },
            // iterator steps are only ever returned
            ParamKind::IterStep(_) => Err(CoercionFailure::NotAMap),
            ParamKind::Void | ParamKind::Nullable(_) | ParamKind::Custom(_) => Ok(NativeValue::Void),
        }
    }

    /// View a wrapped object as `expected`.
    ///
    /// The wrapper must be the one the registry currently holds for its
    /// object, and the object's runtime class must be `expected` or derive
    /// from it.
    pub fn object_ref(&self, proxy: &Proxy, expected: TypeHash) -> Result<ObjectRef, CoercionFailure> {
        let wrong_class = || CoercionFailure::WrongClass {
            expected: self.classes.name_of(expected),
            actual: self.classes.name_of(proxy.class()),
        };
        let handle = proxy.handle();
        if !self.registry.is_registered(proxy) {
            return Err(wrong_class());
        }
        let path = self
            .classes
            .upcast_path(proxy.class(), expected)
            .ok_or_else(wrong_class)?;
        let cell = self.heap.cell(handle).ok_or_else(wrong_class)?;
        let lock_key = self
            .registry
            .lock_key(handle)
            .unwrap_or_else(|| self.heap.root_of(handle));
        Ok(ObjectRef::new(handle, expected, lock_key, cell, path))
    }
}

#[cfg(test)]
mod tests {
    use hostbridge_core::project;
    use hostbridge_registry::{ClassInfo, Ownership, WrapRequest};

    use super::*;
    use crate::Typemap;

    struct Base {
        value: i32,
    }

    struct Derived {
        base: Base,
    }

    struct Other;

    struct Fixture {
        classes: ClassTable,
        registry: WrapperRegistry,
        heap: NativeHeap,
    }

    impl Fixture {
        fn new() -> Self {
            let mut classes = ClassTable::new();
            classes.insert(ClassInfo::new::<Base>("Base")).expect("base");
            classes.insert(ClassInfo::new::<Derived>("Derived")).expect("derived");
            classes.insert(ClassInfo::new::<Other>("Other")).expect("other");
            classes
                .add_base(
                    TypeHash::from_name("Derived"),
                    "Base",
                    project(|d: &mut Derived| &mut d.base),
                )
                .expect("edge");
            let (registry, _finalizer) = WrapperRegistry::with_finalizer();
            Self {
                classes,
                registry,
                heap: NativeHeap::new(),
            }
        }

        fn scope(&self) -> CoercionScope<'_> {
            CoercionScope::new(&self.classes, &self.registry, &self.heap)
        }

        fn wrap<T: Send + 'static>(&self, class: &str, value: T) -> Proxy {
            let class = TypeHash::from_name(class);
            let handle = self.heap.allocate(class, value);
            self.registry
                .lookup_or_create(WrapRequest {
                    handle,
                    class,
                    ownership: Ownership::Owned,
                    lock_key: handle,
                    parent: None,
                })
                .into_proxy()
        }
    }

    #[test]
    fn scalars_do_not_cross_families() {
        let fixture = Fixture::new();
        let scope = fixture.scope();
        assert!(matches!(
            scope.coerce(&ScriptValue::from(3.9), &ParamKind::Int),
            Ok(NativeValue::Int(3))
        ));
        assert_eq!(
            scope.coerce(&ScriptValue::from("3"), &ParamKind::Int).err(),
            Some(CoercionFailure::NotANumber)
        );
        assert_eq!(
            scope.coerce(&ScriptValue::from(3), &ParamKind::String).err(),
            Some(CoercionFailure::NotAString)
        );
        assert_eq!(
            scope.coerce(&ScriptValue::from(1), &ParamKind::Bool).err(),
            Some(CoercionFailure::NotABoolean)
        );
    }

    #[test]
    fn buffers_only_accept_buffers() {
        let fixture = Fixture::new();
        let scope = fixture.scope();
        assert!(matches!(
            scope.coerce(&ScriptValue::Buffer(vec![0xde, 0xad]), &ParamKind::Buffer),
            Ok(NativeValue::Buffer(bytes)) if bytes == [0xde, 0xad]
        ));
        let numbers = ScriptValue::Array(vec![ScriptValue::from(1)]);
        assert_eq!(
            scope.coerce(&numbers, &ParamKind::Buffer).err().map(|f| f.to_string()),
            Some("Expected a Buffer".to_string())
        );
        assert_eq!(
            scope.coerce(&ScriptValue::from("bytes"), &ParamKind::Buffer).err(),
            Some(CoercionFailure::NotABuffer)
        );
        assert!(matches!(
            scope.coerce(&ScriptValue::Null, &ParamKind::nullable(ParamKind::Buffer)),
            Ok(NativeValue::Null)
        ));
    }

    #[test]
    fn custom_kinds_go_through_their_typemap() {
        let fixture = Fixture::new();
        let mut maps = TypemapTable::new();
        maps.insert(
            Typemap::new("Shout", "string").from_script(|value| match value {
                ScriptValue::String(s) => Ok(NativeValue::String(s.to_uppercase())),
                _ => Err(CoercionFailure::Custom {
                    message: "Expected a string".into(),
                }),
            }),
        )
        .expect("insert");
        let kind = ParamKind::custom("Shout");

        assert!(matches!(
            fixture.scope().coerce(&ScriptValue::from("hi"), &kind),
            Err(CoercionFailure::Custom { .. })
        ));
        let scope = fixture.scope().with_typemaps(&maps);
        assert!(matches!(
            scope.coerce(&ScriptValue::from("hi"), &kind),
            Ok(NativeValue::String(s)) if s == "HI"
        ));
        assert_eq!(
            scope.coerce(&ScriptValue::from(1), &kind).err().map(|f| f.to_string()),
            Some("Expected a string".to_string())
        );
        assert!(matches!(
            scope.coerce(&ScriptValue::Null, &ParamKind::nullable(kind)),
            Ok(NativeValue::Null)
        ));
    }

    #[test]
    fn null_only_fits_nullable() {
        let fixture = Fixture::new();
        let scope = fixture.scope();
        assert_eq!(
            scope.coerce(&ScriptValue::Null, &ParamKind::String).err(),
            Some(CoercionFailure::NullNotAllowed)
        );
        assert!(matches!(
            scope.coerce(&ScriptValue::Undefined, &ParamKind::nullable(ParamKind::String)),
            Ok(NativeValue::Null)
        ));
        assert!(matches!(
            scope.coerce(&ScriptValue::from("s"), &ParamKind::nullable(ParamKind::String)),
            Ok(NativeValue::String(_))
        ));
    }

    #[test]
    fn derived_object_fits_base_parameter() {
        let fixture = Fixture::new();
        let proxy = fixture.wrap(
            "Derived",
            Derived {
                base: Base { value: 10 },
            },
        );
        let value = fixture
            .scope()
            .coerce(&ScriptValue::Object(proxy), &ParamKind::object("Base"))
            .expect("upcast");
        let NativeValue::Object(obj) = value else {
            panic!("expected an object, got {value:?}");
        };
        assert_eq!(obj.view, TypeHash::from_name("Base"));
        assert_eq!(obj.class, TypeHash::from_name("Derived"));
        assert_eq!(obj.with_mut(|b: &mut Base| b.value), Some(10));
    }

    #[test]
    fn wrong_and_unregistered_objects() {
        let fixture = Fixture::new();
        let scope = fixture.scope();
        let other = fixture.wrap("Other", Other);
        assert_eq!(
            scope.coerce(&ScriptValue::Object(other), &ParamKind::object("Base")).err(),
            Some(CoercionFailure::WrongClass {
                expected: "Base".into(),
                actual: "Other".into(),
            })
        );
        let base = fixture.wrap("Base", Base { value: 1 });
        assert!(matches!(
            scope.coerce(&ScriptValue::Object(base), &ParamKind::object("Derived")),
            Err(CoercionFailure::WrongClass { .. })
        ));

        let stray = Proxy::detached(
            hostbridge_core::NativeHandle::new(99, 0),
            TypeHash::from_name("Base"),
            hostbridge_core::WrapperId(1234),
        );
        assert!(matches!(
            scope.coerce(&ScriptValue::Object(stray), &ParamKind::object("Base")),
            Err(CoercionFailure::WrongClass { .. })
        ));
        assert_eq!(
            scope.coerce(&ScriptValue::from(1), &ParamKind::object("Base")).err(),
            Some(CoercionFailure::NotAnObject)
        );
    }

    #[test]
    fn collections_report_the_failing_element() {
        let fixture = Fixture::new();
        let scope = fixture.scope();
        let items = ScriptValue::Array(vec![ScriptValue::from(1), ScriptValue::from("two")]);
        assert_eq!(
            scope.coerce(&items, &ParamKind::array(ParamKind::Float)).err(),
            Some(CoercionFailure::Element {
                index: 1,
                failure: Box::new(CoercionFailure::NotANumber),
            })
        );

        let map = ScriptValue::Map(BTreeMap::from([
            ("a".to_string(), ScriptValue::from(1)),
            ("b".to_string(), ScriptValue::from(2)),
        ]));
        let Ok(NativeValue::Map(entries)) = scope.coerce(&map, &ParamKind::map(ParamKind::Int)) else {
            panic!("map should coerce");
        };
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(
            scope.coerce(&items, &ParamKind::map(ParamKind::Int)).err(),
            Some(CoercionFailure::NotAMap)
        );
    }
}

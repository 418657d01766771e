//! ClassBuilder for registering native types.
//!
//! ```ignore
//! module.class::<Counter>("Counter")
//!     .constructor(vec![ParamKind::Float], |ctx| Ok(Counter { value: ctx.arg(0)? }))
//!     .duplex("increment", "incrementAsync", Signature::new(vec![ParamKind::Float]).returns(ParamKind::Float), increment)
//!     .field("value", ParamKind::Float, |c: &Counter| c.value, Some(|c: &mut Counter, v| c.value = v))
//!     .build();
//!
//! module.class::<Derived>("Derived")
//!     .extends::<Base>("Base", |d| &mut d.base)
//!     .nested::<Inner>("inner", "Inner", |d| &mut d.inner)
//!     .build();
//!
//! module.class::<Shelf>("Shelf")
//!     .iterable_nested::<Book>("Book", |s, i| s.books.get_mut(i))
//!     .build();
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use hostbridge_core::{
    CallContext, FromNative, IntoReturn, MemberProjection, NativeCallable, NativeError, NativeFn,
    ParamKind, ReturnAttr, ReturnValue, Signature, TypeHash, project,
};
use hostbridge_registry::ClassInfo;
use hostbridge_resolver::Overload;

use crate::Module;
use crate::iteration::{self, Cursor};

/// A method, static or constructor overload with its script-visible name.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub overload: Overload,
}

/// A property exposed through a getter and an optional setter.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    /// Script-visible name
    pub name: String,
    /// Kind of the value
    pub kind: ParamKind,
    /// Reads the value from the receiver
    pub getter: NativeFn,
    /// Writes argument 0 into the receiver
    pub setter: Option<NativeFn>,
}

impl PropertyDef {
    /// Check if the property cannot be assigned.
    pub fn is_readonly(&self) -> bool {
        self.setter.is_none()
    }
}

/// Everything registered for one class.
#[derive(Clone)]
pub struct ClassDef {
    pub(crate) info: ClassInfo,
    pub(crate) base: Option<(String, MemberProjection)>,
    pub(crate) constructors: Vec<Overload>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) statics: Vec<MethodDef>,
    pub(crate) properties: Vec<PropertyDef>,
}

impl ClassDef {
    /// Class metadata.
    pub fn info(&self) -> &ClassInfo {
        &self.info
    }

    /// Name of the direct base, if any.
    pub fn base_name(&self) -> Option<&str> {
        self.base.as_ref().map(|(name, _)| name.as_str())
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.info.name)
            .field("base", &self.base_name())
            .field("constructors", &self.constructors.len())
            .field("methods", &self.methods.len())
            .field("statics", &self.statics.len())
            .field("properties", &self.properties.len())
            .finish()
    }
}

/// Builder for one class.
///
/// Created by [`Module::class`]; [`ClassBuilder::build`] adds the class to
/// the module.
pub struct ClassBuilder<'m, T: Any + Send> {
    module: &'m mut Module,
    def: ClassDef,
    companions: Vec<ClassDef>,
    _marker: PhantomData<fn() -> T>,
}

impl<'m, T: Any + Send> ClassBuilder<'m, T> {
    pub(crate) fn new(module: &'m mut Module, name: &str) -> Self {
        Self {
            module,
            def: ClassDef {
                info: ClassInfo::new::<T>(name),
                base: None,
                constructors: Vec::new(),
                methods: Vec::new(),
                statics: Vec::new(),
                properties: Vec::new(),
            },
            companions: Vec::new(),
            _marker: PhantomData,
        }
    }

    fn class(&self) -> TypeHash {
        self.def.info.hash
    }

    /// Add a constructor overload.
    ///
    /// `f` builds the native object from the coerced arguments. An error
    /// from `f` surfaces as a construction failure.
    pub fn constructor<F>(mut self, params: Vec<ParamKind>, f: F) -> Self
    where
        F: Fn(&CallContext) -> Result<T, NativeError> + Send + Sync + 'static,
    {
        let class = self.class();
        let signature = Signature::new(params).returns(ParamKind::Object(class));
        let id = TypeHash::from_constructor(class, &signature.param_hashes());
        let body = NativeFn::new(id, move |ctx: &mut CallContext| {
            let value = f(ctx)?;
            ctx.set_return(ReturnValue::New {
                class,
                value: Box::new(value),
            });
            Ok(())
        });
        self.def.constructors.push(Overload::new(signature, body));
        self
    }

    /// Add a method overload.
    ///
    /// The receiver is available through [`CallContext::with_this`]. A
    /// signature carrying [`ReturnAttr::ASYNC`] registers an asynchronous
    /// overload.
    pub fn method<F>(mut self, name: &str, signature: Signature, f: F) -> Self
    where
        F: NativeCallable + Send + Sync + 'static,
    {
        let id = TypeHash::from_method(self.class(), name, &signature.param_hashes());
        self.def.methods.push(MethodDef {
            name: name.to_string(),
            overload: Overload::new(signature, NativeFn::new(id, f)),
        });
        self
    }

    /// Add an asynchronous method overload.
    pub fn method_async<F>(self, name: &str, signature: Signature, f: F) -> Self
    where
        F: NativeCallable + Send + Sync + 'static,
    {
        self.method(name, signature.with_attrs(ReturnAttr::ASYNC), f)
    }

    /// Expose one native body as a synchronous and an asynchronous method.
    pub fn duplex<F>(mut self, name: &str, async_name: &str, signature: Signature, f: F) -> Self
    where
        F: NativeCallable + Send + Sync + 'static,
    {
        let id = TypeHash::from_method(self.class(), name, &signature.param_hashes());
        let body = NativeFn::new(id, f);
        self.def.methods.push(MethodDef {
            name: name.to_string(),
            overload: Overload::new(signature.clone(), body.clone()),
        });
        self.def.methods.push(MethodDef {
            name: async_name.to_string(),
            overload: Overload::new(signature.with_attrs(ReturnAttr::ASYNC), body),
        });
        self
    }

    /// Add a static method overload (no receiver).
    pub fn static_method<F>(mut self, name: &str, signature: Signature, f: F) -> Self
    where
        F: NativeCallable + Send + Sync + 'static,
    {
        let id = TypeHash::from_method(self.class(), name, &signature.param_hashes());
        self.def.statics.push(MethodDef {
            name: name.to_string(),
            overload: Overload::new(signature, NativeFn::new(id, f)),
        });
        self
    }

    /// Expose a field by value. Without a setter the property is read-only.
    pub fn field<V>(mut self, name: &str, kind: ParamKind, get: fn(&T) -> V, set: Option<fn(&mut T, V)>) -> Self
    where
        V: IntoReturn + FromNative + 'static,
    {
        let class = self.class();
        let getter = NativeFn::new(
            TypeHash::from_method(class, name, &[]),
            move |ctx: &mut CallContext| {
                let value = ctx.with_this(|this: &mut T| get(this))?;
                ctx.set_return(value);
                Ok(())
            },
        );
        let setter = set.map(|set| {
            NativeFn::new(
                TypeHash::from_method(class, name, &[kind.type_hash()]),
                move |ctx: &mut CallContext| {
                    let value: V = ctx.arg(0)?;
                    ctx.with_this(|this: &mut T| set(this, value))
                },
            )
        });
        self.def.properties.push(PropertyDef {
            name: name.to_string(),
            kind,
            getter,
            setter,
        });
        self
    }

    /// Expose a member object by reference.
    ///
    /// Every read returns the same wrapper for as long as it is alive, and
    /// that wrapper keeps the receiver's wrapper alive.
    pub fn nested<C: Any>(mut self, name: &'static str, class: &str, f: fn(&mut T) -> &mut C) -> Self {
        let member_class = class.to_string();
        let getter = NativeFn::new(
            TypeHash::from_method(self.class(), name, &[]),
            move |ctx: &mut CallContext| {
                ctx.set_return(ReturnValue::member::<T, C>(&member_class, name, f));
                Ok(())
            },
        );
        self.def.properties.push(PropertyDef {
            name: name.to_string(),
            kind: ParamKind::object(class),
            getter,
            setter: None,
        });
        self
    }

    /// Make the class iterable, yielding elements by value.
    ///
    /// `at` reads the element at a position and returns `None` past the
    /// end. Adds `iterator()` and the companion class `<Name>Iterator`.
    pub fn iterable<V>(self, element: ParamKind, at: fn(&T, usize) -> Option<V>) -> Self
    where
        V: IntoReturn + 'static,
    {
        self.with_iterator(element, iteration::next_copy(at))
    }

    /// Make the class iterable, yielding elements of class `element` by
    /// reference.
    ///
    /// Each element gets one wrapper, shared across iterators, which keeps
    /// the container's wrapper alive.
    pub fn iterable_nested<E: Any>(self, element: &str, at: fn(&mut T, usize) -> Option<&mut E>) -> Self {
        let kind = ParamKind::object(element);
        self.with_iterator(kind, iteration::next_nested(element.to_string(), at))
    }

    fn with_iterator<F>(mut self, element: ParamKind, next: F) -> Self
    where
        F: NativeCallable + Send + Sync + 'static,
    {
        let name = iteration::iterator_class(&self.def.info.name);
        let mut companion = ClassDef {
            info: ClassInfo::new::<Cursor>(&name),
            base: None,
            constructors: Vec::new(),
            methods: Vec::new(),
            statics: Vec::new(),
            properties: Vec::new(),
        };
        let cursor = companion.info.hash;
        companion.methods.push(MethodDef {
            name: "next".to_string(),
            overload: Overload::new(
                Signature::new(Vec::new()).returns(ParamKind::iter_step(element)),
                NativeFn::new(TypeHash::from_method(cursor, "next", &[]), next),
            ),
        });
        self.companions.push(companion);

        let id = TypeHash::from_method(self.class(), "iterator", &[]);
        self.def.methods.push(MethodDef {
            name: "iterator".to_string(),
            overload: Overload::new(
                Signature::new(Vec::new()).returns(ParamKind::Object(cursor)),
                NativeFn::new(id, iteration::open(cursor)),
            ),
        });
        self
    }

    /// Derive from the class named `base`, embedded in `T` at `upcast`.
    pub fn extends<B: Any>(mut self, base: &str, upcast: fn(&mut T) -> &mut B) -> Self {
        self.def.base = Some((base.to_string(), project(upcast)));
        self
    }

    /// Finish the class and add it to the module.
    pub fn build(self) {
        tracing::trace!(target: "hostbridge::init", class = %self.def.info.name, "class defined");
        self.module.add_class(self.def);
        for companion in self.companions {
            self.module.add_class(companion);
        }
    }
}

impl<T: Any + Send + Clone> ClassBuilder<'_, T> {
    /// Allow `COPY` returns of this class.
    pub fn copyable(mut self) -> Self {
        self.def.info = self.def.info.copyable::<T>();
        self
    }
}

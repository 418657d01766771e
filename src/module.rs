//! Registration units.
//!
//! A [`Module`] collects global functions and classes. Nothing is visible
//! to scripts until the module is handed to [`Bridge::register`].
//!
//! ```ignore
//! let mut module = Module::new("greeter");
//! module.function("hello", Signature::new(vec![ParamKind::String]).returns(ParamKind::String), |ctx: &mut CallContext| {
//!     let name: String = ctx.arg(0)?;
//!     ctx.set_return(format!("Hello, {name}"));
//!     Ok(())
//! });
//! module.class::<Counter>("Counter")
//!     .constructor(vec![ParamKind::Float], |ctx| Ok(Counter { value: ctx.arg(0)? }))
//!     .build();
//! bridge.register(module)?;
//! ```
//!
//! [`Bridge::register`]: crate::Bridge::register

use std::any::Any;

use hostbridge_core::{NativeCallable, NativeFn, ParamKind, ReturnAttr, Signature, TypeHash};
use hostbridge_resolver::{Overload, Typemap};

use crate::class_builder::{ClassBuilder, ClassDef};

/// A global function overload awaiting registration.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    /// Script-visible name
    pub name: String,
    /// Signature and body
    pub overload: Overload,
}

/// Functions and classes registered together.
#[derive(Debug, Default)]
pub struct Module {
    name: String,
    functions: Vec<FunctionDef>,
    classes: Vec<ClassDef>,
    typemaps: Vec<Typemap>,
    overrides: Vec<(ParamKind, ParamKind)>,
}

/// A module taken apart for registration.
pub(crate) struct ModuleParts {
    pub name: String,
    pub functions: Vec<FunctionDef>,
    pub classes: Vec<ClassDef>,
    pub typemaps: Vec<Typemap>,
    pub overrides: Vec<(ParamKind, ParamKind)>,
}

impl Module {
    /// Create an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            classes: Vec::new(),
            typemaps: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// Add a global function overload.
    ///
    /// Overloads sharing a name are tried in the order they are added.
    /// A signature carrying [`ReturnAttr::ASYNC`] registers an asynchronous
    /// overload.
    pub fn function<F>(&mut self, name: &str, signature: Signature, f: F) -> &mut Self
    where
        F: NativeCallable + Send + Sync + 'static,
    {
        let id = TypeHash::from_function(name, &signature.param_hashes());
        self.functions.push(FunctionDef {
            name: name.to_string(),
            overload: Overload::new(signature, NativeFn::new(id, f)),
        });
        self
    }

    /// Add an asynchronous global function overload.
    pub fn function_async<F>(&mut self, name: &str, signature: Signature, f: F) -> &mut Self
    where
        F: NativeCallable + Send + Sync + 'static,
    {
        self.function(name, signature.with_attrs(ReturnAttr::ASYNC), f)
    }

    /// Start registering class `name`, backed by Rust type `T`.
    pub fn class<T: Any + Send>(&mut self, name: &str) -> ClassBuilder<'_, T> {
        ClassBuilder::new(self, name)
    }

    /// Add a typemap. Signatures refer to it with [`ParamKind::custom`].
    pub fn typemap(&mut self, map: Typemap) -> &mut Self {
        self.typemaps.push(map);
        self
    }

    /// Read and write every `kind` in this module through the typemap
    /// `typemap`, including inside arrays, maps and nullables.
    ///
    /// The typemap may come from this module or an earlier one.
    pub fn override_kind(&mut self, kind: ParamKind, typemap: &str) -> &mut Self {
        self.overrides.push((kind, ParamKind::custom(typemap)));
        self
    }

    pub(crate) fn add_class(&mut self, class: ClassDef) {
        self.classes.push(class);
    }

    /// Module name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Global functions in registration order.
    pub fn functions(&self) -> &[FunctionDef] {
        &self.functions
    }

    /// Classes in registration order.
    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    /// Typemaps in registration order.
    pub fn typemaps(&self) -> &[Typemap] {
        &self.typemaps
    }

    pub(crate) fn into_parts(self) -> ModuleParts {
        ModuleParts {
            name: self.name,
            functions: self.functions,
            classes: self.classes,
            typemaps: self.typemaps,
            overrides: self.overrides,
        }
    }
}

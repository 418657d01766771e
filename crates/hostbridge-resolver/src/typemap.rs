//! User typemaps.
//!
//! A [`Typemap`] is a named conversion that signatures refer to with
//! [`ParamKind::Custom`]. It can replace how one argument is read from the
//! scripting side, supply an argument without consuming any script value
//! (a hidden parameter), and replace how a return value is handed back.
//!
//! ```ignore
//! let lenient = Typemap::new("LenientInt", "string")
//!     .from_script(|value| match value {
//!         ScriptValue::String(s) => Ok(NativeValue::Int(s.trim().parse().unwrap_or(0))),
//!         _ => Err(CoercionFailure::Custom { message: "Expected a string".into() }),
//!     })
//!     .to_script(|value| match value {
//!         ReturnValue::Int(i) => Ok(ScriptValue::String(i.to_string())),
//!         other => Err(NativeError::other(format!("unexpected {}", other.type_name()))),
//!     });
//! ```

use std::fmt;
use std::sync::Arc;

use hostbridge_core::{
    CoercionFailure, NativeError, NativeValue, ParamKind, ReturnValue, ScriptValue, TypeHash,
};
use rustc_hash::FxHashMap;

/// Reads one script argument.
pub type FromScriptFn =
    Arc<dyn Fn(&ScriptValue) -> Result<NativeValue, CoercionFailure> + Send + Sync>;

/// Supplies a hidden argument.
pub type HiddenFn = Arc<dyn Fn() -> NativeValue + Send + Sync>;

/// Converts a native return value.
pub type ToScriptFn = Arc<dyn Fn(ReturnValue) -> Result<ScriptValue, NativeError> + Send + Sync>;

#[derive(Clone)]
enum Input {
    None,
    Script(FromScriptFn),
    Hidden(HiddenFn),
}

/// A named, user-supplied conversion.
#[derive(Clone)]
pub struct Typemap {
    name: String,
    hash: TypeHash,
    declared: String,
    input: Input,
    output: Option<ToScriptFn>,
}

impl Typemap {
    /// A typemap called `name`, spelled `declared` in declarations.
    pub fn new(name: &str, declared: &str) -> Self {
        Self {
            name: name.to_string(),
            hash: TypeHash::from_name(name),
            declared: declared.to_string(),
            input: Input::None,
            output: None,
        }
    }

    /// Read arguments of this kind with `f`.
    pub fn from_script<F>(mut self, f: F) -> Self
    where
        F: Fn(&ScriptValue) -> Result<NativeValue, CoercionFailure> + Send + Sync + 'static,
    {
        self.input = Input::Script(Arc::new(f));
        self
    }

    /// Supply arguments of this kind with `f`, consuming no script value.
    pub fn hidden<F>(mut self, f: F) -> Self
    where
        F: Fn() -> NativeValue + Send + Sync + 'static,
    {
        self.input = Input::Hidden(Arc::new(f));
        self
    }

    /// Convert return values of this kind with `f`.
    pub fn to_script<F>(mut self, f: F) -> Self
    where
        F: Fn(ReturnValue) -> Result<ScriptValue, NativeError> + Send + Sync + 'static,
    {
        self.output = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> TypeHash {
        self.hash
    }

    /// TypeScript spelling.
    pub fn declared(&self) -> &str {
        &self.declared
    }

    /// The kind that refers to this typemap.
    pub fn kind(&self) -> ParamKind {
        ParamKind::Custom(self.hash)
    }

    /// Whether parameters of this kind take no script argument.
    pub fn is_hidden(&self) -> bool {
        matches!(self.input, Input::Hidden(_))
    }

    /// Read one argument.
    pub fn read(&self, value: &ScriptValue) -> Result<NativeValue, CoercionFailure> {
        match &self.input {
            Input::Script(f) => f(value),
            Input::Hidden(f) => Ok(f()),
            Input::None => Err(CoercionFailure::Custom {
                message: format!("{} cannot be passed from script", self.name),
            }),
        }
    }

    /// Return conversion, if this typemap replaces it.
    pub fn output(&self) -> Option<&ToScriptFn> {
        self.output.as_ref()
    }
}

impl fmt::Debug for Typemap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Typemap")
            .field("name", &self.name)
            .field("declared", &self.declared)
            .field("hidden", &self.is_hidden())
            .field("to_script", &self.output.is_some())
            .finish()
    }
}

/// Typemaps by name hash.
#[derive(Debug, Clone, Default)]
pub struct TypemapTable {
    maps: FxHashMap<TypeHash, Typemap>,
}

impl TypemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `map`. Returns it back if the name is taken.
    pub fn insert(&mut self, map: Typemap) -> Result<(), Typemap> {
        if self.maps.contains_key(&map.hash) {
            return Err(map);
        }
        self.maps.insert(map.hash, map);
        Ok(())
    }

    pub fn get(&self, hash: TypeHash) -> Option<&Typemap> {
        self.maps.get(&hash)
    }

    pub fn contains(&self, hash: TypeHash) -> bool {
        self.maps.contains_key(&hash)
    }

    /// Typemap behind `kind`, looking through `Nullable`.
    pub fn for_kind(&self, kind: &ParamKind) -> Option<&Typemap> {
        match kind {
            ParamKind::Custom(hash) => self.get(*hash),
            ParamKind::Nullable(inner) => self.for_kind(inner),
            _ => None,
        }
    }

    /// Number of script arguments a parameter of `kind` consumes.
    pub fn inputs(&self, kind: &ParamKind) -> usize {
        match kind {
            ParamKind::Custom(hash) if self.get(*hash).is_some_and(Typemap::is_hidden) => 0,
            _ => 1,
        }
    }

    /// Script-visible arity of `params`.
    pub fn arity(&self, params: &[ParamKind]) -> usize {
        params.iter().map(|kind| self.inputs(kind)).sum()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

//! Object-identity bridge between native Rust objects and a garbage-collected
//! scripting host.
//!
//! Native classes and functions are registered through a [`Module`]. The
//! [`Bridge`] exposes them to the host: it resolves overloads first-match
//! in declaration order, keeps exactly one wrapper per live native object,
//! applies each object's ownership discipline once its wrapper is
//! collected, and runs asynchronous calls on a worker pool with per-object
//! FIFO serialization.
//!
//! ## Key Types
//!
//! - [`Bridge`]: the call boundary
//! - [`Module`] / [`ClassBuilder`]: registration surface
//! - [`ScriptValue`] / [`Proxy`]: host-side values and wrappers
//! - [`Ownership`]: who destroys a bridged object, and when
//! - [`ScriptPromise`]: result of an asynchronous call
//! - [`Typemap`]: user-supplied argument and return conversions
//! - [`BridgeConfig`]: worker count, block policy and log categories
//!
//! ## Example
//!
//! ```ignore
//! use hostbridge::{Bridge, BridgeConfig, CallContext, Module, ParamKind, Signature};
//!
//! struct Counter {
//!     value: f64,
//! }
//!
//! fn increment(ctx: &mut CallContext) -> Result<(), hostbridge::NativeError> {
//!     let by: f64 = ctx.arg(0)?;
//!     let value = ctx.with_this(|c: &mut Counter| {
//!         c.value += by;
//!         c.value
//!     })?;
//!     ctx.set_return(value);
//!     Ok(())
//! }
//!
//! let mut module = Module::new("counter");
//! module
//!     .class::<Counter>("Counter")
//!     .constructor(vec![ParamKind::Float], |ctx| Ok(Counter { value: ctx.arg(0)? }))
//!     .duplex(
//!         "increment",
//!         "incrementAsync",
//!         Signature::new(vec![ParamKind::Float]).returns(ParamKind::Float),
//!         increment,
//!     )
//!     .build();
//!
//! let mut bridge = Bridge::new(BridgeConfig::default())?;
//! bridge.register(module)?;
//! let counter = bridge.construct("Counter", &[0.0.into()])?;
//! let promise = bridge.call_method_async(counter.as_object().unwrap(), "incrementAsync", &[1.0.into()]);
//! assert_eq!(bridge.await_promise(&promise)?, 1.0.into());
//! ```

mod bridge;
mod catalog;
mod class_builder;
mod config;
mod declarations;
mod error;
mod iteration;
pub mod logging;
mod marshal;
mod module;

pub use bridge::{Bridge, ScriptPromise};
pub use class_builder::{ClassBuilder, ClassDef, MethodDef, PropertyDef};
pub use config::{BlockPolicy, BridgeConfig, ConfigError, DEBUG_CATEGORIES};
pub use error::InitError;
pub use module::{FunctionDef, Module};

pub use hostbridge_core::{
    BridgeError, Buffer, CallContext, CoercionFailure, ConversionError, FromNative, IntoReturn,
    NativeError, NativeHandle, NativeHeap, NativeValue, ObjectRef, ParamKind, Proxy, Rejection,
    ReturnAttr, ReturnValue, ScriptValue, SharedRef, Signature, TypeHash, WeakProxy, WrapperId,
};
pub use hostbridge_dispatch::PromiseStatus;
pub use hostbridge_registry::{ClassTable, Ownership, PromotionError, RegistrationError};
pub use hostbridge_resolver::{FromScriptFn, HiddenFn, ToScriptFn, Typemap, TypemapTable};

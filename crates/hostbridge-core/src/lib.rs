//! Core types shared by every hostbridge crate.
//!
//! This crate holds the data that crosses the bridge in either direction:
//! identities, the native object heap, scripting-side values and proxies,
//! declared signatures, and the call context native bodies run against.
//!
//! ## Key Types
//!
//! - [`TypeHash`]: deterministic class and callable identity
//! - [`NativeHeap`]: generational arena holding native objects
//! - [`ScriptValue`] / [`Proxy`]: values and wrappers on the scripting side
//! - [`NativeValue`] / [`ObjectRef`]: coerced arguments on the native side
//! - [`Signature`] / [`ParamKind`] / [`ReturnAttr`]: declared call shapes
//! - [`CallContext`] / [`NativeFn`] / [`ReturnValue`]: native call plumbing
//! - [`BridgeError`]: the error taxonomy visible to scripts

mod call_context;
pub mod convert;
mod error;
mod handle;
pub mod heap;
mod native;
mod native_fn;
mod proxy;
mod return_value;
mod signature;
mod type_hash;
mod value;

pub use call_context::CallContext;
pub use convert::{Buffer, FromNative, IntoReturn};
pub use error::{BridgeError, CoercionFailure, ConversionError, NativeError, Rejection};
pub use handle::{NativeHandle, WrapperId};
pub use heap::{MemberProjection, NativeCell, NativeHeap, SharedRef, chain, project, projection};
pub use native::{NativeValue, ObjectRef};
pub use native_fn::{NativeCallable, NativeFn};
pub use proxy::{Finalization, Proxy, WeakProxy};
pub use return_value::ReturnValue;
pub use signature::{ParamKind, ReturnAttr, Signature};
pub use type_hash::{TypeHash, hash_constants};
pub use value::ScriptValue;

//! Argument coercion and overload resolution for hostbridge.
//!
//! ## Key Types
//!
//! - [`CoercionScope`]: turns dynamically typed arguments into native values
//! - [`OverloadSet`]: candidates tried first-match in declaration order
//! - [`Resolved`]: the selected candidate with its coerced arguments
//! - [`Typemap`] / [`TypemapTable`]: user conversions for custom kinds

mod coerce;
mod overload;
mod typemap;

pub use coerce::CoercionScope;
pub use overload::{Overload, OverloadSet, Resolved};
pub use typemap::{FromScriptFn, HiddenFn, ToScriptFn, Typemap, TypemapTable};

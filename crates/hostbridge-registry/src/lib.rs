//! Object store and class metadata for hostbridge.
//!
//! ## Key Types
//!
//! - [`ClassTable`] / [`ClassHierarchy`]: registered classes and their bases
//! - [`Ownership`] / [`adopt`]: who destroys a bridged object, and when
//! - [`WrapperRegistry`]: exactly one live wrapper per native object
//! - [`Finalizer`]: applies ownership once a wrapper is collected

mod class_table;
mod finalizer;
mod hierarchy;
mod ownership;
mod wrapper_registry;

pub use class_table::{ClassInfo, ClassTable, Copier, RegistrationError};
pub use finalizer::{Finalized, Finalizer, on_proxy_collected};
pub use hierarchy::ClassHierarchy;
pub use ownership::{Adoption, Disposal, Ownership, PromotionError, ReturnShape, adopt};
pub use wrapper_registry::{Exposure, WrapRequest, WrapperEntry, WrapperRegistry};

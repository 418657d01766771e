//! Registered classes and their relations.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use hostbridge_core::{MemberProjection, TypeHash};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ClassHierarchy;

/// Produces an independent copy of an object viewed as its class.
pub type Copier = Arc<dyn Fn(&dyn Any) -> Option<Box<dyn Any + Send>> + Send + Sync>;

/// Errors raised while registering classes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("Class {name} is already registered")]
    DuplicateClass { name: String },

    #[error("Base class {base} not found, is the class defined?")]
    UnknownBase { class: String, base: String },

    #[error("Function {name} is already registered")]
    DuplicateFunction { name: String },

    #[error("Typemap {name} is already registered")]
    DuplicateTypemap { name: String },

    #[error("{callable} uses typemap {typemap}, which is not registered")]
    UnknownTypemap { callable: String, typemap: String },
}

/// Metadata for one registered class.
#[derive(Clone)]
pub struct ClassInfo {
    /// Class identity
    pub hash: TypeHash,
    /// Name exposed to scripts
    pub name: String,
    /// Rust type of the stored object
    pub type_id: TypeId,
    /// Direct base, if any
    pub base: Option<TypeHash>,
    /// Copy support for `COPY` returns
    pub copier: Option<Copier>,
}

impl ClassInfo {
    /// Metadata for class `name` backed by Rust type `T`.
    pub fn new<T: Any>(name: &str) -> Self {
        Self {
            hash: TypeHash::from_name(name),
            name: name.to_string(),
            type_id: TypeId::of::<T>(),
            base: None,
            copier: None,
        }
    }

    /// Allow copying objects of this class.
    pub fn copyable<T: Any + Clone + Send>(mut self) -> Self {
        self.copier = Some(Arc::new(|any: &dyn Any| {
            any.downcast_ref::<T>()
                .map(|value| Box::new(value.clone()) as Box<dyn Any + Send>)
        }));
        self
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("hash", &self.hash)
            .field("base", &self.base)
            .field("copyable", &self.copier.is_some())
            .finish()
    }
}

/// All registered classes plus the hierarchy between them.
#[derive(Default, Debug)]
pub struct ClassTable {
    classes: FxHashMap<TypeHash, ClassInfo>,
    hierarchy: ClassHierarchy,
}

impl ClassTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class.
    pub fn insert(&mut self, info: ClassInfo) -> Result<(), RegistrationError> {
        if self.classes.contains_key(&info.hash) {
            return Err(RegistrationError::DuplicateClass { name: info.name });
        }
        self.hierarchy.add_class(info.hash);
        self.classes.insert(info.hash, info);
        Ok(())
    }

    /// Record that `derived` extends the class named `base_name`.
    pub fn add_base(
        &mut self,
        derived: TypeHash,
        base_name: &str,
        upcast: MemberProjection,
    ) -> Result<(), RegistrationError> {
        let base = TypeHash::from_name(base_name);
        if !self.classes.contains_key(&base) {
            return Err(RegistrationError::UnknownBase {
                class: self.name_of(derived),
                base: base_name.to_string(),
            });
        }
        if let Some(info) = self.classes.get_mut(&derived) {
            info.base = Some(base);
        }
        self.hierarchy.add_base(derived, base, upcast);
        Ok(())
    }

    /// Metadata for `class`.
    pub fn get(&self, class: TypeHash) -> Option<&ClassInfo> {
        self.classes.get(&class)
    }

    /// Metadata for the class named `name`.
    pub fn by_name(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(&TypeHash::from_name(name))
    }

    /// Whether `class` is registered.
    pub fn contains(&self, class: TypeHash) -> bool {
        self.classes.contains_key(&class)
    }

    /// Script-visible name of `class`.
    pub fn name_of(&self, class: TypeHash) -> String {
        self.classes
            .get(&class)
            .map(|info| info.name.clone())
            .unwrap_or_else(|| format!("<class {class}>"))
    }

    /// Whether `class` is `ancestor` or derives from it.
    pub fn is_a(&self, class: TypeHash, ancestor: TypeHash) -> bool {
        self.hierarchy.is_a(class, ancestor)
    }

    /// Upcast steps from `from` to `to`.
    pub fn upcast_path(&self, from: TypeHash, to: TypeHash) -> Option<Vec<MemberProjection>> {
        self.hierarchy.upcast_path(from, to)
    }

    /// `class` followed by its ancestors, nearest first.
    pub fn lineage(&self, class: TypeHash) -> Vec<TypeHash> {
        let mut lineage = vec![class];
        lineage.extend(self.hierarchy.ancestors(class));
        lineage
    }

    /// The class hierarchy.
    pub fn hierarchy(&self) -> &ClassHierarchy {
        &self.hierarchy
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check if no classes are registered.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use hostbridge_core::project;

    use super::*;

    #[derive(Clone)]
    struct Base {
        value: i32,
    }

    struct Derived {
        base: Base,
    }

    #[test]
    fn insert_and_lookup() {
        let mut table = ClassTable::new();
        table.insert(ClassInfo::new::<Base>("Base")).expect("insert");
        assert!(table.contains(TypeHash::from_name("Base")));
        assert_eq!(table.by_name("Base").map(|c| c.type_id), Some(TypeId::of::<Base>()));
        assert_eq!(
            table.insert(ClassInfo::new::<Base>("Base")),
            Err(RegistrationError::DuplicateClass { name: "Base".into() })
        );
    }

    #[test]
    fn unknown_base_is_rejected() {
        let mut table = ClassTable::new();
        table.insert(ClassInfo::new::<Derived>("Derived")).expect("insert");
        let err = table
            .add_base(
                TypeHash::from_name("Derived"),
                "Base",
                project(|d: &mut Derived| &mut d.base),
            )
            .expect_err("base missing");
        assert_eq!(err.to_string(), "Base class Base not found, is the class defined?");
    }

    #[test]
    fn lineage_and_copy() {
        let mut table = ClassTable::new();
        table.insert(ClassInfo::new::<Base>("Base").copyable::<Base>()).expect("base");
        table.insert(ClassInfo::new::<Derived>("Derived")).expect("derived");
        table
            .add_base(
                TypeHash::from_name("Derived"),
                "Base",
                project(|d: &mut Derived| &mut d.base),
            )
            .expect("edge");
        assert_eq!(
            table.lineage(TypeHash::from_name("Derived")),
            vec![TypeHash::from_name("Derived"), TypeHash::from_name("Base")]
        );
        let copier = table
            .get(TypeHash::from_name("Base"))
            .and_then(|c| c.copier.clone())
            .expect("copier");
        let copy = copier(&Base { value: 3 }).expect("copy");
        assert_eq!(copy.downcast_ref::<Base>().map(|b| b.value), Some(3));
        assert!(copier(&5u8).is_none());
    }
}

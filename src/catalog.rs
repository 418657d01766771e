//! Everything registered with a bridge, indexed for calls.
//!
//! Registration of a module is all-or-nothing: the whole module is
//! validated before the first class or function becomes visible. Kind
//! overrides are applied and typemap references checked during that
//! validation.

use std::collections::BTreeMap;

use hostbridge_core::{MemberProjection, ParamKind, Signature, TypeHash};
use hostbridge_registry::{ClassTable, RegistrationError};
use hostbridge_resolver::{Overload, OverloadSet, TypemapTable};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::Module;
use crate::class_builder::{ClassDef, PropertyDef};
use crate::module::{FunctionDef, ModuleParts};

// ============================================================================
// Callables
// ============================================================================

/// Overload sets by name, synchronous and asynchronous kept apart.
#[derive(Debug, Clone, Default)]
pub struct Callables {
    sync: BTreeMap<String, OverloadSet>,
    deferred: BTreeMap<String, OverloadSet>,
}

impl Callables {
    /// Add an overload under `name`. `label` names the set in errors.
    fn add(&mut self, name: &str, label: String, overload: Overload) -> Result<(), RegistrationError> {
        let table = if overload.signature.is_async() {
            &mut self.deferred
        } else {
            &mut self.sync
        };
        let set = table
            .entry(name.to_string())
            .or_insert_with(|| OverloadSet::new(label.clone()));
        let params = overload.signature.param_hashes();
        if set
            .overloads()
            .iter()
            .any(|existing| existing.signature.param_hashes() == params)
        {
            return Err(RegistrationError::DuplicateFunction { name: label });
        }
        set.push(overload);
        Ok(())
    }

    /// The overload set called `name`.
    pub fn get(&self, name: &str, deferred: bool) -> Option<&OverloadSet> {
        if deferred {
            self.deferred.get(name)
        } else {
            self.sync.get(name)
        }
    }

    /// All synchronous sets, by name.
    pub fn sync(&self) -> impl Iterator<Item = (&str, &OverloadSet)> {
        self.sync.iter().map(|(name, set)| (name.as_str(), set))
    }

    /// All asynchronous sets, by name.
    pub fn deferred(&self) -> impl Iterator<Item = (&str, &OverloadSet)> {
        self.deferred.iter().map(|(name, set)| (name.as_str(), set))
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.sync.is_empty() && self.deferred.is_empty()
    }
}

// ============================================================================
// ClassEntry
// ============================================================================

/// Callable surface of one class.
#[derive(Debug, Clone)]
pub struct ClassEntry {
    pub hash: TypeHash,
    pub name: String,
    pub base: Option<String>,
    pub constructors: OverloadSet,
    pub methods: Callables,
    pub statics: Callables,
    pub properties: Vec<PropertyDef>,
}

impl ClassEntry {
    fn build(def: &ClassDef) -> Result<Self, RegistrationError> {
        let name = def.info.name.clone();
        let mut constructors = OverloadSet::new(name.clone());
        for ctor in &def.constructors {
            let params = ctor.signature.param_hashes();
            if constructors
                .overloads()
                .iter()
                .any(|existing| existing.signature.param_hashes() == params)
            {
                return Err(RegistrationError::DuplicateFunction {
                    name: format!("{name}.constructor"),
                });
            }
            constructors.push(ctor.clone());
        }

        let mut methods = Callables::default();
        for method in &def.methods {
            let label = format!("{name}.{}", method.name);
            methods.add(&method.name, label, method.overload.clone())?;
        }
        let mut statics = Callables::default();
        for method in &def.statics {
            let label = format!("{name}.{}", method.name);
            statics.add(&method.name, label, method.overload.clone())?;
        }

        let mut seen = FxHashSet::default();
        for property in &def.properties {
            if !seen.insert(property.name.as_str()) {
                return Err(RegistrationError::DuplicateFunction {
                    name: format!("{name}.{}", property.name),
                });
            }
        }

        Ok(Self {
            hash: def.info.hash,
            name,
            base: def.base_name().map(str::to_string),
            constructors,
            methods,
            statics,
            properties: def.properties.clone(),
        })
    }

    /// The property called `name`, declared on this class itself.
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Registered classes and global functions.
#[derive(Debug, Default)]
pub struct Catalog {
    classes: ClassTable,
    entries: FxHashMap<TypeHash, ClassEntry>,
    order: Vec<TypeHash>,
    functions: Callables,
    typemaps: TypemapTable,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every class and function of `module`.
    ///
    /// Nothing is added if any part of the module is rejected.
    pub fn register(&mut self, module: Module) -> Result<(), RegistrationError> {
        let ModuleParts {
            name: module_name,
            mut functions,
            mut classes,
            typemaps,
            overrides,
        } = module.into_parts();

        let mut staged_typemaps = self.typemaps.clone();
        for map in typemaps {
            staged_typemaps
                .insert(map)
                .map_err(|map| RegistrationError::DuplicateTypemap {
                    name: map.name().to_string(),
                })?;
        }
        for (from, to) in &overrides {
            apply_override(&mut functions, &mut classes, from, to);
        }
        check_typemaps(&staged_typemaps, &functions, &classes)?;

        let mut incoming = FxHashSet::default();
        for def in &classes {
            if self.classes.contains(def.info.hash) || !incoming.insert(def.info.hash) {
                return Err(RegistrationError::DuplicateClass {
                    name: def.info.name.clone(),
                });
            }
        }
        for def in &classes {
            if let Some(base) = def.base_name() {
                let hash = TypeHash::from_name(base);
                if !self.classes.contains(hash) && !incoming.contains(&hash) {
                    return Err(RegistrationError::UnknownBase {
                        class: def.info.name.clone(),
                        base: base.to_string(),
                    });
                }
            }
        }

        let mut staged_functions = self.functions.clone();
        for function in functions {
            let label = function.name.clone();
            staged_functions.add(&function.name, label, function.overload)?;
        }
        let entries = classes
            .iter()
            .map(ClassEntry::build)
            .collect::<Result<Vec<_>, _>>()?;

        // validated; nothing below can fail
        let mut bases: Vec<(TypeHash, String, MemberProjection)> = Vec::new();
        for def in classes {
            if let Some((base, upcast)) = def.base {
                bases.push((def.info.hash, base, upcast));
            }
            self.classes.insert(def.info)?;
        }
        for (derived, base, upcast) in bases {
            self.classes.add_base(derived, &base, upcast)?;
        }
        let class_count = entries.len();
        for entry in entries {
            tracing::debug!(target: "hostbridge::init", class = %entry.name, base = ?entry.base, "class registered");
            self.order.push(entry.hash);
            self.entries.insert(entry.hash, entry);
        }
        self.functions = staged_functions;
        self.typemaps = staged_typemaps;

        tracing::debug!(
            target: "hostbridge::init",
            module = %module_name,
            classes = class_count,
            "module registered"
        );
        Ok(())
    }

    /// Registered classes and their hierarchy.
    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    /// Callable surface of `class`.
    pub fn entry(&self, class: TypeHash) -> Option<&ClassEntry> {
        self.entries.get(&class)
    }

    /// Callable surface of the class named `name`.
    pub fn entry_by_name(&self, name: &str) -> Option<&ClassEntry> {
        self.entry(TypeHash::from_name(name))
    }

    /// Class entries in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &ClassEntry> {
        self.order.iter().filter_map(|hash| self.entries.get(hash))
    }

    /// Registered typemaps.
    pub fn typemaps(&self) -> &TypemapTable {
        &self.typemaps
    }

    /// Global functions.
    pub fn functions(&self) -> &Callables {
        &self.functions
    }

    /// Global function set called `name`.
    pub fn function(&self, name: &str, deferred: bool) -> Option<&OverloadSet> {
        self.functions.get(name, deferred)
    }

    /// Walk `class` and its ancestors, nearest first, returning the first
    /// hit together with the class that declares it.
    fn find_in_lineage<'s, R>(
        &'s self,
        class: TypeHash,
        find: impl Fn(&'s ClassEntry) -> Option<R>,
    ) -> Option<(TypeHash, R)> {
        self.classes
            .lineage(class)
            .into_iter()
            .filter_map(|c| self.entries.get(&c))
            .find_map(|entry| find(entry).map(|hit| (entry.hash, hit)))
    }

    /// Method `name` as seen on an object whose runtime class is `class`,
    /// with its declaring class.
    ///
    /// The most derived declaration wins.
    pub fn find_method(&self, class: TypeHash, name: &str, deferred: bool) -> Option<(TypeHash, &OverloadSet)> {
        self.find_in_lineage(class, |entry| entry.methods.get(name, deferred))
    }

    /// Static method `name` of `class` or its nearest ancestor declaring it.
    pub fn find_static(&self, class: TypeHash, name: &str, deferred: bool) -> Option<(TypeHash, &OverloadSet)> {
        self.find_in_lineage(class, |entry| entry.statics.get(name, deferred))
    }

    /// Property `name` as seen on an object whose runtime class is `class`,
    /// with its declaring class.
    pub fn find_property(&self, class: TypeHash, name: &str) -> Option<(TypeHash, &PropertyDef)> {
        self.find_in_lineage(class, |entry| entry.property(name))
    }
}

// ============================================================================
// Typemaps
// ============================================================================

fn apply_override(functions: &mut [FunctionDef], classes: &mut [ClassDef], from: &ParamKind, to: &ParamKind) {
    let rewrite = |overload: &mut Overload| {
        overload.signature = overload.signature.substitute(from, to);
    };
    functions.iter_mut().for_each(|f| rewrite(&mut f.overload));
    for def in classes {
        def.constructors.iter_mut().for_each(rewrite);
        def.methods
            .iter_mut()
            .chain(def.statics.iter_mut())
            .for_each(|m| rewrite(&mut m.overload));
        for property in &mut def.properties {
            property.kind = property.kind.substitute(from, to);
        }
    }
}

/// Every custom kind must name a registered typemap.
fn check_typemaps(table: &TypemapTable, functions: &[FunctionDef], classes: &[ClassDef]) -> Result<(), RegistrationError> {
    for function in functions {
        check_kinds(table, &function.name, signature_kinds(&function.overload.signature))?;
    }
    for def in classes {
        let class = &def.info.name;
        for ctor in &def.constructors {
            check_kinds(table, &format!("{class}.constructor"), &ctor.signature.params)?;
        }
        for method in def.methods.iter().chain(&def.statics) {
            let label = format!("{class}.{}", method.name);
            check_kinds(table, &label, signature_kinds(&method.overload.signature))?;
        }
        for property in &def.properties {
            check_kinds(table, &format!("{class}.{}", property.name), [&property.kind])?;
        }
    }
    Ok(())
}

fn signature_kinds(signature: &Signature) -> impl Iterator<Item = &ParamKind> {
    signature.params.iter().chain(std::iter::once(&signature.returns))
}

fn check_kinds<'k>(
    table: &TypemapTable,
    callable: &str,
    kinds: impl IntoIterator<Item = &'k ParamKind>,
) -> Result<(), RegistrationError> {
    let mut used = Vec::new();
    kinds.into_iter().for_each(|kind| kind.collect_custom(&mut used));
    match used.into_iter().find(|hash| !table.contains(*hash)) {
        Some(missing) => Err(RegistrationError::UnknownTypemap {
            callable: callable.to_string(),
            typemap: missing.to_string(),
        }),
        None => Ok(()),
    }
}

//! Native returns into script values.
//!
//! Every object that crosses into the scripting side goes through the
//! wrapper registry, so a native object seen twice yields the same proxy.
//! The return shape and [`ReturnAttr`] flags decide the ownership recorded
//! for objects new to the registry (see [`adopt`]). A kind backed by a
//! typemap with a return conversion goes through that conversion instead.

use hostbridge_core::{
    BridgeError, NativeHandle, NativeHeap, ObjectRef, ParamKind, Proxy, ReturnAttr, ReturnValue,
    ScriptValue, TypeHash, chain,
};
use hostbridge_registry::{
    Adoption, ClassTable, Exposure, Ownership, ReturnShape, WrapRequest, WrapperRegistry, adopt,
};
use hostbridge_resolver::TypemapTable;

/// The object a method or property was invoked on.
#[derive(Debug, Clone)]
pub(crate) struct Receiver {
    /// Its wrapper
    pub proxy: Proxy,
    /// Its native view as the declaring class
    pub object: ObjectRef,
}

/// Converts one call's return value.
pub(crate) struct Marshal<'a> {
    pub heap: &'a NativeHeap,
    pub classes: &'a ClassTable,
    pub registry: &'a WrapperRegistry,
    pub typemaps: &'a TypemapTable,
    pub callable: &'a str,
    pub receiver: Option<&'a Receiver>,
}

impl Marshal<'_> {
    /// Convert `value`, declared as `kind` with `attrs`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn to_script(&self, value: ReturnValue, kind: &ParamKind, attrs: ReturnAttr) -> Result<ScriptValue, BridgeError> {
        if !value.is_null()
            && !matches!(value, ReturnValue::Void)
            && let Some(output) = self.typemaps.for_kind(kind).and_then(|map| map.output())
        {
            return output(value).map_err(|err| self.failure(err.to_string()));
        }
        let owner = self.receiver.map(|r| &r.proxy);
        match value {
            ReturnValue::Void => Ok(ScriptValue::Undefined),
            ReturnValue::Null => {
                if attrs.contains(ReturnAttr::NON_NULL) {
                    Err(BridgeError::NullReturnRejected {
                        callable: self.callable.to_string(),
                    })
                } else {
                    Ok(ScriptValue::Null)
                }
            }
            ReturnValue::Bool(b) => Ok(ScriptValue::Bool(b)),
            ReturnValue::Int(i) => Ok(ScriptValue::Number(i as f64)),
            ReturnValue::Float(f) => Ok(ScriptValue::Number(f)),
            ReturnValue::String(s) => Ok(ScriptValue::String(s)),
            ReturnValue::New { class, value } => {
                let handle = self.heap.allocate_boxed(class, value);
                self.adopt(handle, ReturnShape::Fresh, kind, attrs, owner)
            }
            ReturnValue::Pointer(handle) => self.adopt(handle, ReturnShape::Pointer, kind, attrs, owner),
            ReturnValue::Reference(handle) => self.adopt(handle, ReturnShape::Reference, kind, attrs, owner),
            ReturnValue::Shared(shared) => {
                let handle = shared.handle();
                if !self.heap.contains(handle) {
                    return Err(BridgeError::ObjectExpired { handle });
                }
                if attrs.contains(ReturnAttr::COPY) {
                    return self.copy(handle, kind);
                }
                let exposure = self.wrap(handle, Ownership::SharedCounted, None)?;
                if exposure.is_created() {
                    // the new entry keeps this count until finalization
                    shared.into_handle();
                }
                Ok(ScriptValue::Object(exposure.into_proxy()))
            }
            ReturnValue::Member { class, name, project } => {
                let receiver = self
                    .receiver
                    .ok_or_else(|| self.failure(format!("member {name} returned without a receiver")))?;
                let parent = receiver.proxy.handle();
                let projection = chain(receiver.object.path(), project);
                let handle = self
                    .heap
                    .member(parent, name, class, projection)
                    .ok_or(BridgeError::ObjectExpired { handle: parent })?;
                self.adopt(handle, ReturnShape::Member, kind, attrs, owner)
            }
            ReturnValue::Element {
                container,
                class,
                index,
                project,
            } => {
                let parent = container.handle;
                let holder = self
                    .registry
                    .lookup(parent)
                    .ok_or(BridgeError::ObjectExpired { handle: parent })?;
                let projection = chain(container.path(), project);
                let handle = self
                    .heap
                    .element(parent, index, class, projection)
                    .ok_or(BridgeError::ObjectExpired { handle: parent })?;
                self.adopt(handle, ReturnShape::Member, kind, attrs, Some(&holder))
            }
            ReturnValue::Iterator { class, value } => {
                let receiver = self
                    .receiver
                    .ok_or_else(|| self.failure("iterator returned without a receiver".to_string()))?;
                let handle = self.heap.allocate_boxed(class, value);
                let exposure = self.registry.lookup_or_create(WrapRequest {
                    handle,
                    class,
                    ownership: Ownership::Owned,
                    lock_key: receiver.object.lock_key,
                    parent: Some(receiver.proxy.clone()),
                });
                Ok(ScriptValue::Object(exposure.into_proxy()))
            }
            ReturnValue::Buffer(bytes) => Ok(ScriptValue::Buffer(bytes)),
            ReturnValue::Array(items) => {
                let element = element_kind(kind);
                let attrs = attrs - ReturnAttr::NON_NULL;
                items
                    .into_iter()
                    .map(|item| self.to_script(item, &element, attrs))
                    .collect::<Result<Vec<_>, _>>()
                    .map(ScriptValue::Array)
            }
            ReturnValue::Map(entries) => {
                let element = element_kind(kind);
                let step = matches!(kind, ParamKind::IterStep(_));
                let attrs = attrs - ReturnAttr::NON_NULL;
                entries
                    .into_iter()
                    .map(|(key, item)| {
                        let kind = if step && key == "done" { &ParamKind::Bool } else { &element };
                        self.to_script(item, kind, attrs).map(|v| (key, v))
                    })
                    .collect::<Result<_, _>>()
                    .map(ScriptValue::Map)
            }
        }
    }

    fn failure(&self, message: String) -> BridgeError {
        BridgeError::NativeOperationFailure {
            callable: self.callable.to_string(),
            message,
        }
    }

    /// Wrap or copy `handle`. `owner` becomes the parent of nested children.
    fn adopt(
        &self,
        handle: NativeHandle,
        shape: ReturnShape,
        kind: &ParamKind,
        attrs: ReturnAttr,
        owner: Option<&Proxy>,
    ) -> Result<ScriptValue, BridgeError> {
        if !self.heap.contains(handle) {
            return Err(BridgeError::ObjectExpired { handle });
        }
        match adopt(shape, attrs, owner.map(Proxy::handle)) {
            Adoption::Copy => self.copy(handle, kind),
            Adoption::Wrap(ownership) => self
                .wrap(handle, ownership, owner)
                .map(|exposure| ScriptValue::Object(exposure.into_proxy())),
        }
    }

    /// Find or create the wrapper for `handle`.
    fn wrap(&self, handle: NativeHandle, ownership: Ownership, owner: Option<&Proxy>) -> Result<Exposure, BridgeError> {
        let class = self
            .heap
            .class_of(handle)
            .ok_or(BridgeError::ObjectExpired { handle })?;
        let (parent, lock_key) = match ownership {
            Ownership::NestedChild(parent) => (
                owner.cloned(),
                self.registry
                    .lock_key(parent)
                    .unwrap_or_else(|| self.heap.root_of(parent)),
            ),
            _ => (None, self.heap.root_of(handle)),
        };
        Ok(self.registry.lookup_or_create(WrapRequest {
            handle,
            class,
            ownership,
            lock_key,
            parent,
        }))
    }

    /// Wrap an owned copy of `source`, made as the declared class.
    fn copy(&self, source: NativeHandle, kind: &ParamKind) -> Result<ScriptValue, BridgeError> {
        let runtime = self
            .heap
            .class_of(source)
            .ok_or(BridgeError::ObjectExpired { handle: source })?;
        let declared = kind.class().unwrap_or(runtime);
        let info = self
            .classes
            .get(declared)
            .ok_or_else(|| BridgeError::UnknownClass {
                name: self.classes.name_of(declared),
            })?;
        let failure = |message: String| self.failure(message);
        let copier = info
            .copier
            .clone()
            .ok_or_else(|| failure(format!("class {} cannot be copied", info.name)))?;
        let path = self
            .classes
            .upcast_path(runtime, declared)
            .ok_or_else(|| failure(format!("{} is not a {}", self.classes.name_of(runtime), info.name)))?;
        let cell = self
            .heap
            .cell(source)
            .ok_or(BridgeError::ObjectExpired { handle: source })?;

        let mut copied = None;
        cell.visit(&mut |root| {
            let mut current = root;
            for step in &path {
                match step(current) {
                    Some(next) => current = next,
                    None => return,
                }
            }
            copied = copier(&*current);
        });
        let value = copied.ok_or_else(|| failure(format!("copying {} failed", info.name)))?;

        let handle = self.heap.allocate_boxed(declared, value);
        tracing::trace!(target: "hostbridge::object", %source, copy = %handle, class = %info.name, "copied object");
        self.wrap(handle, Ownership::Owned, None)
            .map(|exposure| ScriptValue::Object(exposure.into_proxy()))
    }
}

/// Element kind of a collection kind.
fn element_kind(kind: &ParamKind) -> ParamKind {
    match kind {
        ParamKind::Nullable(inner) => element_kind(inner),
        ParamKind::Array(element) | ParamKind::Map(element) | ParamKind::IterStep(element) => {
            (**element).clone()
        }
        other => other.clone(),
    }
}

/// Whether `value` wraps an object of `class` or a class derived from it.
pub(crate) fn instance_of(classes: &ClassTable, value: &ScriptValue, class: TypeHash) -> bool {
    value
        .as_object()
        .is_some_and(|proxy| classes.is_a(proxy.class(), class))
}

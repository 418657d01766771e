//! The call boundary.
//!
//! [`Bridge`] owns the native heap, the registered classes and functions,
//! the wrapper registry, the finalization bridge, the per-object locks and
//! the worker pool. Every host interaction goes through it.
//!
//! The thread that owns the bridge is the control thread. Synchronous calls
//! run there. Asynchronous calls coerce their arguments there, run their
//! native body on a worker, and are settled there again by
//! [`Bridge::run_pending`] or [`Bridge::await_promise`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use hostbridge_core::{
    BridgeError, CallContext, NativeError, NativeFn, NativeHandle, NativeHeap, NativeValue,
    ParamKind, Proxy, ReturnAttr, ReturnValue, ScriptValue, Signature, TypeHash,
};
use hostbridge_dispatch::{
    Completion, Deferred, Grant, LockGuard, LockTable, Promise, Scheduler, TaskId, TaskPanic,
};
use hostbridge_registry::{
    ClassTable, Finalizer, Ownership, PromotionError, RegistrationError, WrapperRegistry,
};
use hostbridge_resolver::{CoercionScope, OverloadSet};
use rustc_hash::FxHashMap;

use crate::catalog::Catalog;
use crate::marshal::{self, Marshal, Receiver};
use crate::{BlockPolicy, BridgeConfig, InitError, Module, declarations};

/// Promise handed to the scripting side by asynchronous calls.
pub type ScriptPromise = Promise<ScriptValue, BridgeError>;

type TaskOutput = Result<ReturnValue, NativeError>;

/// How long [`Bridge::await_promise`] waits for one completion.
const AWAIT_SLICE: Duration = Duration::from_millis(100);

/// A resolved call, ready to run.
struct Prepared {
    callable: String,
    func: NativeFn,
    signature: Signature,
    keys: Vec<NativeHandle>,
    ctx: CallContext,
    receiver: Option<Receiver>,
}

/// An asynchronous call waiting for its completion.
struct PendingTask {
    deferred: Deferred<ScriptValue, BridgeError>,
    callable: String,
    signature: Signature,
    receiver: Option<Receiver>,
    // keeps argument wrappers alive until the task settles
    _args: Vec<ScriptValue>,
}

/// Native/scripting bridge.
pub struct Bridge {
    config: BridgeConfig,
    heap: NativeHeap,
    catalog: Catalog,
    registry: WrapperRegistry,
    finalizer: Finalizer,
    locks: LockTable,
    scheduler: Scheduler<TaskOutput>,
    pending: FxHashMap<TaskId, PendingTask>,
}

impl Bridge {
    /// Create a bridge and start its workers.
    pub fn new(config: BridgeConfig) -> Result<Self, InitError> {
        let scheduler = Scheduler::new(config.workers)?;
        let (registry, finalizer) = WrapperRegistry::with_finalizer();
        tracing::debug!(
            target: "hostbridge::init",
            workers = config.workers,
            block_policy = %config.block_policy,
            "bridge created"
        );
        Ok(Self {
            config,
            heap: NativeHeap::new(),
            catalog: Catalog::new(),
            registry,
            finalizer,
            locks: LockTable::new(),
            scheduler,
            pending: FxHashMap::default(),
        })
    }

    /// Create a bridge configured from the `HOSTBRIDGE_*` variables.
    pub fn from_env() -> Result<Self, InitError> {
        Self::new(BridgeConfig::from_env()?)
    }

    /// Make the classes and functions of `module` callable.
    pub fn register(&mut self, module: Module) -> Result<(), RegistrationError> {
        self.catalog.register(module)
    }

    // ========================================================================
    // Synchronous calls
    // ========================================================================

    /// Construct an instance of `class`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn construct(&self, class: &str, args: &[ScriptValue]) -> Result<ScriptValue, BridgeError> {
        let entry = self
            .catalog
            .entry_by_name(class)
            .ok_or_else(|| BridgeError::UnknownClass {
                name: class.to_string(),
            })?;
        if entry.constructors.is_empty() {
            return Err(BridgeError::ConstructionFailure {
                class: entry.name.clone(),
                message: "no constructor is registered".to_string(),
            });
        }
        let mut prepared = self.prepare(&entry.constructors, None, args)?;
        let guard = self.acquire(&prepared.callable, &prepared.keys)?;
        execute(&prepared.func, &mut prepared.ctx).map_err(|error| BridgeError::ConstructionFailure {
            class: entry.name.clone(),
            message: error.to_string(),
        })?;
        drop(guard);
        self.finish(prepared)
    }

    /// Call the global function `name`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&self, name: &str, args: &[ScriptValue]) -> Result<ScriptValue, BridgeError> {
        let set = self
            .catalog
            .function(name, false)
            .ok_or_else(|| BridgeError::UnknownCallable {
                name: name.to_string(),
            })?;
        self.invoke(set, None, args)
    }

    /// Call method `name` on `target`.
    ///
    /// The method is looked up on the runtime class of `target` first,
    /// then on its ancestors.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_method(&self, target: &Proxy, name: &str, args: &[ScriptValue]) -> Result<ScriptValue, BridgeError> {
        let (declaring, set) = self
            .catalog
            .find_method(target.class(), name, false)
            .ok_or_else(|| self.unknown_member(target.class(), name))?;
        let receiver = self.receiver(target, declaring)?;
        self.invoke(set, Some(receiver), args)
    }

    /// Call static method `name` of `class`.
    pub fn call_static(&self, class: &str, name: &str, args: &[ScriptValue]) -> Result<ScriptValue, BridgeError> {
        let (_, set) = self.find_static(class, name, false)?;
        self.invoke(set, None, args)
    }

    /// Read property `name` of `target`.
    pub fn get_property(&self, target: &Proxy, name: &str) -> Result<ScriptValue, BridgeError> {
        let (declaring, property) = self
            .catalog
            .find_property(target.class(), name)
            .ok_or_else(|| self.unknown_member(target.class(), name))?;
        let label = format!("{}.{}", self.catalog.classes().name_of(declaring), property.name);
        let receiver = self.receiver(target, declaring)?;

        let guard = self.acquire(&label, &[receiver.object.lock_key])?;
        let mut ctx = CallContext::new(self.heap.clone(), Some(receiver.object.clone()), Vec::new());
        execute(&property.getter, &mut ctx).map_err(|error| BridgeError::native(&label, &error))?;
        drop(guard);
        self.marshal(&label, Some(&receiver))
            .to_script(ctx.into_return(), &property.kind, ReturnAttr::empty())
    }

    /// Assign property `name` of `target`.
    pub fn set_property(&self, target: &Proxy, name: &str, value: &ScriptValue) -> Result<(), BridgeError> {
        let (declaring, property) = self
            .catalog
            .find_property(target.class(), name)
            .ok_or_else(|| self.unknown_member(target.class(), name))?;
        let label = format!("{}.{}", self.catalog.classes().name_of(declaring), property.name);
        let setter = property
            .setter
            .as_ref()
            .ok_or_else(|| BridgeError::NativeOperationFailure {
                callable: label.clone(),
                message: "property is read-only".to_string(),
            })?;
        let receiver = self.receiver(target, declaring)?;
        let native = self
            .scope()
            .coerce(value, &property.kind)
            .map_err(|failure| BridgeError::Coercion {
                callable: label.clone(),
                index: 0,
                failure,
            })?;

        let mut keys = vec![receiver.object.lock_key];
        native.collect_lock_keys(&mut keys);
        let _guard = self.acquire(&label, &keys)?;
        let mut ctx = CallContext::new(self.heap.clone(), Some(receiver.object), vec![native]);
        execute(setter, &mut ctx).map_err(|error| BridgeError::native(&label, &error))
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn invoke(&self, set: &OverloadSet, receiver: Option<Receiver>, args: &[ScriptValue]) -> Result<ScriptValue, BridgeError> {
        let mut prepared = self.prepare(set, receiver, args)?;
        let guard = self.acquire(&prepared.callable, &prepared.keys)?;
        execute(&prepared.func, &mut prepared.ctx)
            .map_err(|error| BridgeError::native(&prepared.callable, &error))?;
        drop(guard);
        self.finish(prepared)
    }

    /// Marshal the return value of a call that has run.
    fn finish(&self, prepared: Prepared) -> Result<ScriptValue, BridgeError> {
        let Prepared {
            callable,
            signature,
            ctx,
            receiver,
            ..
        } = prepared;
        self.marshal(&callable, receiver.as_ref())
            .to_script(ctx.into_return(), &signature.returns, signature.attrs)
    }

    // ========================================================================
    // Asynchronous calls
    // ========================================================================

    /// Call the asynchronous global function `name`.
    ///
    /// Failures before the native body runs reject the returned promise.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_async(&mut self, name: &str, args: &[ScriptValue]) -> ScriptPromise {
        let prepared = match self.catalog.function(name, true) {
            Some(set) => self.prepare(set, None, args),
            None => Err(BridgeError::UnknownCallable {
                name: name.to_string(),
            }),
        };
        self.submit(prepared, args)
    }

    /// Call asynchronous method `name` on `target`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_method_async(&mut self, target: &Proxy, name: &str, args: &[ScriptValue]) -> ScriptPromise {
        let prepared = self
            .catalog
            .find_method(target.class(), name, true)
            .ok_or_else(|| self.unknown_member(target.class(), name))
            .and_then(|(declaring, set)| {
                let receiver = self.receiver(target, declaring)?;
                self.prepare(set, Some(receiver), args)
            });
        self.submit(prepared, args)
    }

    /// Call asynchronous static method `name` of `class`.
    pub fn call_static_async(&mut self, class: &str, name: &str, args: &[ScriptValue]) -> ScriptPromise {
        let prepared = self
            .find_static(class, name, true)
            .and_then(|(_, set)| self.prepare(set, None, args));
        self.submit(prepared, args)
    }

    fn submit(&mut self, prepared: Result<Prepared, BridgeError>, args: &[ScriptValue]) -> ScriptPromise {
        let Prepared {
            callable,
            func,
            signature,
            keys,
            mut ctx,
            receiver,
        } = match prepared {
            Ok(prepared) => prepared,
            Err(error) => {
                tracing::debug!(target: "hostbridge::task", %error, "rejected before submission");
                return Promise::rejected(error);
            }
        };

        let (promise, deferred) = Promise::pending();
        let spawner = match self.scheduler.spawner() {
            Ok(spawner) => spawner,
            Err(error) => {
                deferred.reject(BridgeError::NativeOperationFailure {
                    callable,
                    message: error.to_string(),
                });
                return promise;
            }
        };
        let task = self.scheduler.reserve_task();
        tracing::trace!(target: "hostbridge::task", %task, callable = %callable, "submitted");
        self.pending.insert(
            task,
            PendingTask {
                deferred,
                callable,
                signature,
                receiver,
                _args: args.to_vec(),
            },
        );

        // the ticket is taken now, so tasks on one object run in call order;
        // the job reaches a worker only once its keys are granted
        let job = move |grant: Grant| {
            let _guard = grant.claim();
            execute(&func, &mut ctx).map(|()| ctx.into_return())
        };
        self.locks.reserve(&keys, move |grant| {
            if let Err(error) = spawner.spawn(task, move || job(grant)) {
                tracing::error!(target: "hostbridge::task", %task, %error, "could not queue granted task");
            }
        });
        promise
    }

    /// Settle every finished task, then collect garbage.
    ///
    /// Returns the number of promises settled.
    pub fn run_pending(&mut self) -> usize {
        let mut settled = 0;
        while let Some(completion) = self.scheduler.try_complete() {
            if self.complete(completion) {
                settled += 1;
            }
        }
        self.collect_garbage();
        settled
    }

    /// Drive completions until `promise` settles.
    ///
    /// Fails if the promise is pending but no task could settle it.
    pub fn await_promise(&mut self, promise: &ScriptPromise) -> Result<ScriptValue, BridgeError> {
        loop {
            if let Some(outcome) = promise.result() {
                self.collect_garbage();
                return outcome;
            }
            if self.pending.is_empty() {
                return Err(BridgeError::NativeOperationFailure {
                    callable: "await".to_string(),
                    message: "promise is pending with no task to settle it".to_string(),
                });
            }
            if let Some(completion) = self.scheduler.complete_timeout(AWAIT_SLICE) {
                self.complete(completion);
            }
        }
    }

    fn complete(&mut self, completion: Completion<TaskOutput>) -> bool {
        let Some(task) = self.pending.remove(&completion.task) else {
            tracing::warn!(target: "hostbridge::task", task = %completion.task, "completion for unknown task");
            return false;
        };
        let outcome = self.settle(&task, completion.outcome);
        tracing::debug!(
            target: "hostbridge::task",
            task = %completion.task,
            callable = %task.callable,
            ok = outcome.is_ok(),
            "settled"
        );
        task.deferred.settle(outcome);
        true
    }

    fn settle(&self, task: &PendingTask, outcome: Result<TaskOutput, TaskPanic>) -> Result<ScriptValue, BridgeError> {
        match outcome {
            Ok(Ok(value)) => self
                .marshal(&task.callable, task.receiver.as_ref())
                .to_script(value, &task.signature.returns, task.signature.attrs - ReturnAttr::ASYNC),
            Ok(Err(error)) => Err(BridgeError::native(&task.callable, &error)),
            Err(panic) => Err(BridgeError::native(
                &task.callable,
                &NativeError::Panic {
                    message: panic.message,
                },
            )),
        }
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Apply pending finalizations. Returns how many were processed.
    pub fn collect_garbage(&self) -> usize {
        let outcomes = self.finalizer.drain(&self.registry, &self.heap);
        if !outcomes.is_empty() {
            tracing::debug!(target: "hostbridge::store", collected = outcomes.len(), "collected wrappers");
        }
        outcomes.len()
    }

    /// Whether `value` wraps an instance of `class` or of a class derived
    /// from it.
    pub fn instance_of(&self, value: &ScriptValue, class: &str) -> bool {
        marshal::instance_of(self.catalog.classes(), value, TypeHash::from_name(class))
    }

    /// Hand a native value to the scripting side as if a call returned it.
    pub fn expose(&self, value: ReturnValue, kind: &ParamKind, attrs: ReturnAttr) -> Result<ScriptValue, BridgeError> {
        self.marshal("expose", None).to_script(value, kind, attrs)
    }

    /// Give the wrapper of a borrowed object ownership of it.
    ///
    /// Promoting to [`Ownership::SharedCounted`] takes a new shared count
    /// for the wrapper.
    pub fn promote(&self, target: &Proxy, to: Ownership) -> Result<Ownership, PromotionError> {
        let handle = target.handle();
        if !self.registry.is_registered(target) {
            return Err(PromotionError::NotRegistered { handle });
        }
        let previous = self.registry.promote(handle, to)?;
        if to == Ownership::SharedCounted {
            self.heap.add_ref(handle);
        }
        Ok(previous)
    }

    /// Ownership recorded for the object behind `target`.
    pub fn ownership_of(&self, target: &Proxy) -> Option<Ownership> {
        self.registry.ownership(target.handle())
    }

    /// TypeScript declarations for everything registered.
    pub fn declarations(&self) -> String {
        declarations::render(&self.catalog)
    }

    /// The native heap.
    pub fn heap(&self) -> &NativeHeap {
        &self.heap
    }

    /// Registered classes.
    pub fn classes(&self) -> &ClassTable {
        self.catalog.classes()
    }

    /// Active configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Number of objects with a reachable wrapper.
    pub fn live_wrappers(&self) -> usize {
        self.registry.live_wrappers()
    }

    /// Number of registry entries, including ones awaiting finalization.
    pub fn registered_objects(&self) -> usize {
        self.registry.len()
    }

    /// Number of asynchronous calls not settled yet.
    pub fn pending_tasks(&self) -> usize {
        self.pending.len()
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn scope(&self) -> CoercionScope<'_> {
        CoercionScope::new(self.catalog.classes(), &self.registry, &self.heap)
            .with_typemaps(self.catalog.typemaps())
    }

    fn marshal<'a>(&'a self, callable: &'a str, receiver: Option<&'a Receiver>) -> Marshal<'a> {
        Marshal {
            heap: &self.heap,
            classes: self.catalog.classes(),
            registry: &self.registry,
            typemaps: self.catalog.typemaps(),
            callable,
            receiver,
        }
    }

    fn find_static(&self, class: &str, name: &str, deferred: bool) -> Result<(TypeHash, &OverloadSet), BridgeError> {
        let hash = TypeHash::from_name(class);
        if self.catalog.entry(hash).is_none() {
            return Err(BridgeError::UnknownClass {
                name: class.to_string(),
            });
        }
        self.catalog
            .find_static(hash, name, deferred)
            .ok_or_else(|| self.unknown_member(hash, name))
    }

    fn unknown_member(&self, class: TypeHash, name: &str) -> BridgeError {
        BridgeError::UnknownCallable {
            name: format!("{}.{name}", self.catalog.classes().name_of(class)),
        }
    }

    /// Check that `target` is live and view it as `declaring`.
    fn receiver(&self, target: &Proxy, declaring: TypeHash) -> Result<Receiver, BridgeError> {
        let handle = target.handle();
        if !self.heap.contains(handle) {
            return Err(BridgeError::ObjectExpired { handle });
        }
        let object = self
            .scope()
            .object_ref(target, declaring)
            .map_err(|_| BridgeError::ObjectExpired { handle })?;
        Ok(Receiver {
            proxy: target.clone(),
            object,
        })
    }

    fn prepare(&self, set: &OverloadSet, receiver: Option<Receiver>, args: &[ScriptValue]) -> Result<Prepared, BridgeError> {
        let resolved = set.resolve(&self.scope(), args)?;
        let keys = lock_keys(receiver.as_ref(), &resolved.args);
        let this = receiver.as_ref().map(|r| r.object.clone());
        Ok(Prepared {
            callable: set.name().to_string(),
            func: resolved.overload.func.clone(),
            signature: resolved.overload.signature.clone(),
            keys,
            ctx: CallContext::new(self.heap.clone(), this, resolved.args),
            receiver,
        })
    }

    /// Lock `keys` for a synchronous call, honouring the block policy.
    fn acquire(&self, callable: &str, keys: &[NativeHandle]) -> Result<LockGuard, BridgeError> {
        match self.config.block_policy {
            BlockPolicy::Block => Ok(self.locks.lock(keys)),
            BlockPolicy::Warn => {
                if self.locks.is_contended(keys) {
                    tracing::warn!(
                        target: "hostbridge::lock",
                        callable,
                        "synchronous call waits for an asynchronous call on the same object"
                    );
                }
                Ok(self.locks.lock(keys))
            }
            BlockPolicy::Error => match self.locks.try_lock(keys) {
                Some(guard) => Ok(guard),
                None => {
                    let busy = keys
                        .iter()
                        .copied()
                        .find(|key| self.locks.is_contended(std::slice::from_ref(key)));
                    match busy.or_else(|| keys.first().copied()) {
                        Some(key) => Err(BridgeError::WouldBlock {
                            callable: callable.to_string(),
                            key,
                        }),
                        None => Ok(self.locks.lock(keys)),
                    }
                }
            },
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("classes", &self.catalog.classes().len())
            .field("live_wrappers", &self.registry.live_wrappers())
            .field("pending_tasks", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// Run a native body, turning a panic into an error.
fn execute(func: &NativeFn, ctx: &mut CallContext) -> Result<(), NativeError> {
    match catch_unwind(AssertUnwindSafe(|| func.call(ctx))) {
        Ok(result) => result,
        Err(payload) => Err(NativeError::from_panic(&*payload)),
    }
}

/// Lock keys of the receiver and every object argument.
fn lock_keys(receiver: Option<&Receiver>, args: &[NativeValue]) -> Vec<NativeHandle> {
    let mut keys = Vec::new();
    if let Some(receiver) = receiver {
        keys.push(receiver.object.lock_key);
    }
    for arg in args {
        arg.collect_lock_keys(&mut keys);
    }
    keys
}

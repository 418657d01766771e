//! Generational arena for native objects.
//!
//! The heap owns every native object that has crossed (or may cross) into
//! the scripting side. Objects live in reference-counted [`NativeCell`]s so a
//! call that is already running can keep using an object whose slot was
//! freed in the meantime; handles to freed slots never resolve again.
//!
//! Nested member objects get their own slot and handle but no storage of
//! their own: their cell projects into the parent's storage.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::{NativeHandle, TypeHash};

/// Projection from an object to one of its sub-objects.
///
/// Used both for nested members (parent to field) and for upcasts
/// (derived to embedded base).
pub type MemberProjection =
    Arc<dyn for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any> + Send + Sync>;

/// Erase a projection closure.
pub fn projection<F>(f: F) -> MemberProjection
where
    F: for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Typed projection from `P` to a field of type `C`.
///
/// ```
/// use hostbridge_core::project;
///
/// struct Outer { inner: u32 }
/// let step = project(|o: &mut Outer| &mut o.inner);
/// let mut outer = Outer { inner: 7 };
/// let inner = step(&mut outer).and_then(|any| any.downcast_mut::<u32>());
/// assert_eq!(inner, Some(&mut 7));
/// ```
pub fn project<P: Any, C: Any>(f: fn(&mut P) -> &mut C) -> MemberProjection {
    projection(move |any| any.downcast_mut::<P>().map(|p| f(p) as &mut dyn Any))
}

/// Compose `steps` followed by `last` into one projection.
pub fn chain(steps: &[MemberProjection], last: MemberProjection) -> MemberProjection {
    if steps.is_empty() {
        return last;
    }
    let steps = steps.to_vec();
    projection(move |any| {
        let mut current = any;
        for step in &steps {
            current = step(current)?;
        }
        last(current)
    })
}

/// Walk `path` from `root`, stopping at the first object that is a `T`.
pub fn descend<'a, T: Any>(root: &'a mut dyn Any, path: &[MemberProjection]) -> Option<&'a mut T> {
    let mut current = root;
    let mut steps = path.iter();
    loop {
        if current.is::<T>() {
            return current.downcast_mut::<T>();
        }
        let step = steps.next()?;
        current = step(current)?;
    }
}

// ============================================================================
// NativeCell
// ============================================================================

/// Storage for one native object.
pub struct NativeCell {
    class: TypeHash,
    storage: CellStorage,
}

enum CellStorage {
    Boxed(Mutex<Box<dyn Any + Send>>),
    Member {
        parent: Arc<NativeCell>,
        project: MemberProjection,
    },
}

impl NativeCell {
    fn boxed(class: TypeHash, value: Box<dyn Any + Send>) -> Self {
        Self {
            class,
            storage: CellStorage::Boxed(Mutex::new(value)),
        }
    }

    fn member(class: TypeHash, parent: Arc<NativeCell>, project: MemberProjection) -> Self {
        Self {
            class,
            storage: CellStorage::Member { parent, project },
        }
    }

    /// Runtime class of the stored object.
    pub fn class(&self) -> TypeHash {
        self.class
    }

    /// Address of the cell that actually owns the storage.
    ///
    /// Two cells with the same root id share one mutex.
    pub fn root_id(&self) -> usize {
        match &self.storage {
            CellStorage::Boxed(_) => self as *const NativeCell as usize,
            CellStorage::Member { parent, .. } => parent.root_id(),
        }
    }

    /// Run `f` on the stored object. Returns false if a member projection
    /// no longer applies.
    pub fn visit(&self, f: &mut dyn FnMut(&mut dyn Any)) -> bool {
        match &self.storage {
            CellStorage::Boxed(value) => {
                let mut guard = value.lock();
                f(&mut **guard);
                true
            }
            CellStorage::Member { parent, project } => {
                let mut hit = false;
                parent.visit(&mut |any| {
                    if let Some(inner) = project(any) {
                        hit = true;
                        f(inner);
                    }
                });
                hit
            }
        }
    }

    /// Typed mutable access along an upcast path.
    pub fn with_mut<T: Any, R>(
        &self,
        path: &[MemberProjection],
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let mut f = Some(f);
        let mut out = None;
        self.visit(&mut |root| {
            if let Some(target) = descend::<T>(root, path)
                && let Some(f) = f.take()
            {
                out = Some(f(target));
            }
        });
        out
    }
}

impl fmt::Debug for NativeCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.storage {
            CellStorage::Boxed(_) => "boxed",
            CellStorage::Member { .. } => "member",
        };
        f.debug_struct("NativeCell")
            .field("class", &self.class)
            .field("kind", &kind)
            .finish()
    }
}

// ============================================================================
// NativeHeap
// ============================================================================

/// Shared native object arena.
///
/// Cloning the heap clones a handle to the same arena.
#[derive(Clone, Default)]
pub struct NativeHeap {
    inner: Arc<RwLock<HeapSlots>>,
}

/// Member name plus position, so container elements get a slot each.
type MemberKey = (&'static str, usize);

/// Member name under which container elements are keyed.
const ELEMENT: &str = "[]";

#[derive(Default)]
struct HeapSlots {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    members: FxHashMap<(NativeHandle, MemberKey), NativeHandle>,
    live: usize,
}

struct HeapSlot {
    generation: u32,
    cell: Option<Arc<NativeCell>>,
    ref_count: u32,
    parent: Option<(NativeHandle, MemberKey)>,
    children: Vec<NativeHandle>,
}

impl HeapSlots {
    fn slot(&self, handle: NativeHandle) -> Option<&HeapSlot> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.cell.is_some())
    }

    fn slot_mut(&mut self, handle: NativeHandle) -> Option<&mut HeapSlot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.cell.is_some())
    }

    fn insert(
        &mut self,
        cell: Arc<NativeCell>,
        parent: Option<(NativeHandle, MemberKey)>,
    ) -> NativeHandle {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.cell = Some(cell);
            slot.ref_count = 1;
            slot.parent = parent;
            slot.children.clear();
            NativeHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                cell: Some(cell),
                ref_count: 1,
                parent,
                children: Vec::new(),
            });
            NativeHandle::new(index, 0)
        }
    }

    /// Free a slot and every member slot hanging off it. Freed cells are
    /// pushed to `graveyard` so they drop after the heap lock is released.
    fn free(&mut self, handle: NativeHandle, graveyard: &mut Vec<Arc<NativeCell>>) -> bool {
        let Some(slot) = self.slot_mut(handle) else {
            return false;
        };
        if let Some(cell) = slot.cell.take() {
            graveyard.push(cell);
        }
        let parent = slot.parent.take();
        let children = std::mem::take(&mut slot.children);
        slot.ref_count = 0;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.live -= 1;

        if let Some(key) = parent {
            self.members.remove(&key);
            if let Some(owner) = self.slot_mut(key.0) {
                owner.children.retain(|child| *child != handle);
            }
        }
        for child in children {
            self.free(child, graveyard);
        }
        true
    }
}

impl NativeHeap {
    /// Create a new empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a native object and return its handle.
    pub fn allocate<T: Any + Send>(&self, class: TypeHash, value: T) -> NativeHandle {
        self.allocate_boxed(class, Box::new(value))
    }

    /// Store an already boxed native object.
    pub fn allocate_boxed(&self, class: TypeHash, value: Box<dyn Any + Send>) -> NativeHandle {
        let cell = Arc::new(NativeCell::boxed(class, value));
        let handle = self.inner.write().insert(cell, None);
        tracing::trace!(target: "hostbridge::object", %handle, %class, "allocated native object");
        handle
    }

    /// Stable handle for the member `name` of `parent`.
    ///
    /// Repeated calls for the same live parent and name return the same
    /// handle. Returns `None` if the parent is gone.
    pub fn member(
        &self,
        parent: NativeHandle,
        name: &'static str,
        class: TypeHash,
        project: MemberProjection,
    ) -> Option<NativeHandle> {
        self.member_slot(parent, (name, 0), class, project)
    }

    /// Stable handle for element `index` of the container `parent`.
    pub fn element(
        &self,
        parent: NativeHandle,
        index: usize,
        class: TypeHash,
        project: MemberProjection,
    ) -> Option<NativeHandle> {
        self.member_slot(parent, (ELEMENT, index), class, project)
    }

    fn member_slot(
        &self,
        parent: NativeHandle,
        member: MemberKey,
        class: TypeHash,
        project: MemberProjection,
    ) -> Option<NativeHandle> {
        let mut slots = self.inner.write();
        let key = (parent, member);
        if let Some(existing) = slots.members.get(&key).copied()
            && slots.slot(existing).is_some()
        {
            return Some(existing);
        }
        let parent_cell = slots.slot(parent)?.cell.clone()?;
        let cell = Arc::new(NativeCell::member(class, parent_cell, project));
        let handle = slots.insert(cell, Some(key));
        slots.members.insert(key, handle);
        if let Some(owner) = slots.slot_mut(parent) {
            owner.children.push(handle);
        }
        tracing::trace!(
            target: "hostbridge::object",
            %handle,
            %parent,
            member = member.0,
            index = member.1,
            "created member slot"
        );
        Some(handle)
    }

    /// Cell backing `handle`, if the handle is live.
    pub fn cell(&self, handle: NativeHandle) -> Option<Arc<NativeCell>> {
        self.inner.read().slot(handle)?.cell.clone()
    }

    /// Runtime class of the object behind `handle`.
    pub fn class_of(&self, handle: NativeHandle) -> Option<TypeHash> {
        self.cell(handle).map(|cell| cell.class())
    }

    /// Whether `handle` still resolves.
    pub fn contains(&self, handle: NativeHandle) -> bool {
        self.inner.read().slot(handle).is_some()
    }

    /// Typed mutable access to the object behind `handle`.
    pub fn with_mut<T: Any, R>(&self, handle: NativeHandle, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.cell(handle)?.with_mut(&[], f)
    }

    /// Increment the shared-ownership count.
    pub fn add_ref(&self, handle: NativeHandle) -> bool {
        if let Some(slot) = self.inner.write().slot_mut(handle) {
            slot.ref_count = slot.ref_count.saturating_add(1);
            return true;
        }
        false
    }

    /// Decrement the shared-ownership count, freeing the object at zero.
    ///
    /// Returns true if the object was freed.
    pub fn release(&self, handle: NativeHandle) -> bool {
        let mut graveyard = Vec::new();
        let freed = {
            let mut slots = self.inner.write();
            match slots.slot_mut(handle) {
                Some(slot) => {
                    slot.ref_count = slot.ref_count.saturating_sub(1);
                    slot.ref_count == 0 && slots.free(handle, &mut graveyard)
                }
                None => false,
            }
        };
        if freed {
            tracing::trace!(target: "hostbridge::object", %handle, "last shared reference released");
        }
        drop(graveyard);
        freed
    }

    /// Free the object immediately, regardless of its count.
    ///
    /// Idempotent: only the call that actually frees the slot returns true.
    /// Member slots of the object are freed with it.
    pub fn destroy(&self, handle: NativeHandle) -> bool {
        let mut graveyard = Vec::new();
        let freed = self.inner.write().free(handle, &mut graveyard);
        if freed {
            tracing::trace!(target: "hostbridge::object", %handle, "destroyed native object");
        }
        drop(graveyard);
        freed
    }

    /// Current shared-ownership count.
    pub fn ref_count(&self, handle: NativeHandle) -> Option<u32> {
        Some(self.inner.read().slot(handle)?.ref_count)
    }

    /// Parent of a member slot.
    pub fn parent_of(&self, handle: NativeHandle) -> Option<NativeHandle> {
        Some(self.inner.read().slot(handle)?.parent?.0)
    }

    /// Outermost owner of `handle`, following member parents.
    pub fn root_of(&self, handle: NativeHandle) -> NativeHandle {
        let slots = self.inner.read();
        let mut current = handle;
        while let Some((parent, _)) = slots.slot(current).and_then(|slot| slot.parent) {
            current = parent;
        }
        current
    }

    /// Number of live objects (members included).
    pub fn len(&self) -> usize {
        self.inner.read().live
    }

    /// Check if the heap holds no live objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for NativeHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.inner.read();
        f.debug_struct("NativeHeap")
            .field("slot_count", &slots.slots.len())
            .field("live", &slots.live)
            .field("free_count", &slots.free_list.len())
            .finish()
    }
}

// ============================================================================
// SharedRef
// ============================================================================

/// Native-side shared owner of a heap object.
///
/// Each `SharedRef` holds one unit of the object's shared count and gives it
/// back on drop. [`SharedRef::into_handle`] hands the unit over to whoever
/// takes the handle.
pub struct SharedRef {
    heap: NativeHeap,
    handle: NativeHandle,
    transferred: bool,
}

impl SharedRef {
    /// Allocate `value` with a shared count of one owned by the result.
    pub fn new<T: Any + Send>(heap: &NativeHeap, class: TypeHash, value: T) -> Self {
        Self {
            heap: heap.clone(),
            handle: heap.allocate(class, value),
            transferred: false,
        }
    }

    /// Take an additional shared count on an existing object.
    pub fn from_handle(heap: &NativeHeap, handle: NativeHandle) -> Option<Self> {
        heap.add_ref(handle).then(|| Self {
            heap: heap.clone(),
            handle,
            transferred: false,
        })
    }

    /// The shared object's handle.
    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    /// Typed mutable access to the shared object.
    pub fn with_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.heap.with_mut(self.handle, f)
    }

    /// Give up this owner without releasing its count.
    pub fn into_handle(mut self) -> NativeHandle {
        self.transferred = true;
        self.handle
    }
}

impl Clone for SharedRef {
    fn clone(&self) -> Self {
        self.heap.add_ref(self.handle);
        Self {
            heap: self.heap.clone(),
            handle: self.handle,
            transferred: false,
        }
    }
}

impl Drop for SharedRef {
    fn drop(&mut self) {
        if !self.transferred {
            self.heap.release(self.handle);
        }
    }
}

impl fmt::Debug for SharedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRef").field("handle", &self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Outer {
        value: i32,
        inner: Inner,
    }

    struct Inner {
        value: i32,
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn class(name: &str) -> TypeHash {
        TypeHash::from_name(name)
    }

    #[test]
    fn allocate_and_access() {
        let heap = NativeHeap::new();
        let handle = heap.allocate(class("i32"), 42i32);
        assert_eq!(heap.with_mut(handle, |v: &mut i32| *v), Some(42));
        assert_eq!(heap.class_of(handle), Some(class("i32")));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn wrong_type_does_not_resolve() {
        let heap = NativeHeap::new();
        let handle = heap.allocate(class("i32"), 42i32);
        assert_eq!(heap.with_mut(handle, |v: &mut String| v.len()), None);
    }

    #[test]
    fn destroy_is_idempotent() {
        let heap = NativeHeap::new();
        let drops = Arc::new(AtomicUsize::new(0));
        let handle = heap.allocate(class("D"), DropCounter(drops.clone()));
        assert!(heap.destroy(handle));
        assert!(!heap.destroy(handle));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(!heap.contains(handle));
    }

    #[test]
    fn stale_handle_after_reuse() {
        let heap = NativeHeap::new();
        let first = heap.allocate(class("i32"), 1i32);
        heap.destroy(first);
        let second = heap.allocate(class("i32"), 2i32);
        assert_eq!(first.index, second.index);
        assert_ne!(first.generation, second.generation);
        assert_eq!(heap.with_mut(first, |v: &mut i32| *v), None);
        assert_eq!(heap.with_mut(second, |v: &mut i32| *v), Some(2));
    }

    #[test]
    fn shared_counts() {
        let heap = NativeHeap::new();
        let drops = Arc::new(AtomicUsize::new(0));
        let shared = SharedRef::new(&heap, class("D"), DropCounter(drops.clone()));
        let handle = shared.handle();
        let other = shared.clone();
        assert_eq!(heap.ref_count(handle), Some(2));
        drop(shared);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(other);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(!heap.contains(handle));
    }

    #[test]
    fn into_handle_transfers_count() {
        let heap = NativeHeap::new();
        let shared = SharedRef::new(&heap, class("i32"), 5i32);
        let handle = shared.into_handle();
        assert_eq!(heap.ref_count(handle), Some(1));
        assert!(heap.release(handle));
    }

    #[test]
    fn member_handles_are_stable() {
        let heap = NativeHeap::new();
        let outer = heap.allocate(
            class("Outer"),
            Outer {
                value: 1,
                inner: Inner { value: 2 },
            },
        );
        let step = project(|o: &mut Outer| &mut o.inner);
        let a = heap.member(outer, "inner", class("Inner"), step.clone());
        let b = heap.member(outer, "inner", class("Inner"), step);
        assert!(a.is_some());
        assert_eq!(a, b);

        let inner = a.unwrap_or(outer);
        heap.with_mut(inner, |i: &mut Inner| i.value = 20);
        assert_eq!(heap.with_mut(outer, |o: &mut Outer| (o.value, o.inner.value)), Some((1, 20)));
        assert_eq!(heap.root_of(inner), outer);
        assert_eq!(heap.parent_of(inner), Some(outer));
    }

    #[test]
    fn destroying_parent_frees_members() {
        let heap = NativeHeap::new();
        let outer = heap.allocate(
            class("Outer"),
            Outer {
                value: 1,
                inner: Inner { value: 2 },
            },
        );
        let inner = heap
            .member(outer, "inner", class("Inner"), project(|o: &mut Outer| &mut o.inner))
            .expect("member");
        assert!(heap.destroy(outer));
        assert!(!heap.contains(inner));
        assert!(!heap.destroy(inner));
        assert!(heap.is_empty());
    }

    #[test]
    fn member_bookkeeping_is_released() {
        let heap = NativeHeap::new();
        let step = project(|o: &mut Outer| &mut o.inner);
        let parents: Vec<_> = (0..2000)
            .map(|i| {
                let outer = heap.allocate(
                    class("Outer"),
                    Outer {
                        value: i,
                        inner: Inner { value: i },
                    },
                );
                heap.member(outer, "inner", class("Inner"), step.clone())
                    .expect("member");
                outer
            })
            .collect();
        assert_eq!(heap.len(), 4000);

        // a member freed on its own leaves its parent's child list
        let first_inner = heap.member(parents[0], "inner", class("Inner"), step.clone()).expect("member");
        assert!(heap.destroy(first_inner));
        assert!(heap.inner.read().slot(parents[0]).is_some_and(|slot| slot.children.is_empty()));

        for outer in parents {
            assert!(heap.destroy(outer));
        }
        let slots = heap.inner.read();
        assert_eq!(slots.live, 0);
        assert!(slots.members.is_empty());
    }

    #[test]
    fn elements_get_a_slot_each() {
        let heap = NativeHeap::new();
        let list = heap.allocate(class("List"), vec![Inner { value: 1 }, Inner { value: 2 }]);
        let at = |index: usize| {
            projection(move |any| {
                any.downcast_mut::<Vec<Inner>>()
                    .and_then(|items| items.get_mut(index))
                    .map(|item| item as &mut dyn Any)
            })
        };
        let first = heap.element(list, 0, class("Inner"), at(0)).expect("first");
        let second = heap.element(list, 1, class("Inner"), at(1)).expect("second");
        assert_ne!(first, second);
        assert_eq!(heap.element(list, 1, class("Inner"), at(1)), Some(second));
        assert_eq!(heap.with_mut(second, |i: &mut Inner| i.value), Some(2));
        assert_eq!(heap.root_of(second), list);

        assert!(heap.destroy(list));
        assert!(!heap.contains(first));
        assert!(heap.is_empty());
    }

    #[test]
    fn chained_projection() {
        struct Wrapper {
            outer: Outer,
        }
        let heap = NativeHeap::new();
        let handle = heap.allocate(
            class("Wrapper"),
            Wrapper {
                outer: Outer {
                    value: 3,
                    inner: Inner { value: 4 },
                },
            },
        );
        let path = [project(|w: &mut Wrapper| &mut w.outer)];
        let cell = heap.cell(handle).expect("cell");
        assert_eq!(cell.with_mut(&path, |o: &mut Outer| o.value), Some(3));
        let deep = chain(&path, project(|o: &mut Outer| &mut o.inner));
        let mut found = None;
        cell.visit(&mut |any| {
            found = deep(any).and_then(|i| i.downcast_mut::<Inner>()).map(|i| i.value);
        });
        assert_eq!(found, Some(4));
    }

    #[test]
    fn drop_can_reenter_heap() {
        struct Holder(Option<SharedRef>);
        let heap = NativeHeap::new();
        let shared = SharedRef::new(&heap, class("i32"), 1i32);
        let inner = shared.handle();
        let holder = heap.allocate(class("Holder"), Holder(Some(shared)));
        assert!(heap.destroy(holder));
        assert!(!heap.contains(inner));
    }
}

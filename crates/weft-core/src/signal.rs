use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::effects::Dispose;
use crate::value::Value;

pub type SubId = u64;

/// Identity comparison used to decide whether a signal write is a change.
///
/// Scalars and strings compare by value; shared containers compare by
/// pointer. There is deliberately no implementation for `Vec<T>` or other
/// owned collections: wrap them in an `Rc` and replace the `Rc` to publish
/// a change.
pub trait Identity {
    fn identical(&self, other: &Self) -> bool;
}

macro_rules! identity_by_eq {
    ($($t:ty),*) => {
        $(impl Identity for $t {
            fn identical(&self, other: &Self) -> bool {
                self == other
            }
        })*
    };
}

identity_by_eq!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char,
    (), String, &'static str
);

impl<T: ?Sized> Identity for Rc<T> {
    fn identical(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: Identity> Identity for Option<T> {
    fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.identical(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Identity for Value {
    fn identical(&self, other: &Self) -> bool {
        Value::identical(self, other)
    }
}

/// A reactive cell. Cloning yields another handle to the same cell.
pub struct Signal<T>(Rc<Inner<T>>);

struct Inner<T> {
    value: RefCell<T>,
    subs: RefCell<Vec<(SubId, Rc<dyn Fn(&T)>)>>,
    next_sub: Cell<SubId>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signal").field(&*self.0.value.borrow()).finish()
    }
}

impl<T: 'static> Signal<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(Inner {
            value: RefCell::new(value),
            subs: RefCell::new(Vec::new()),
            next_sub: Cell::new(0),
        }))
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.0.value.borrow().clone()
    }

    /// Reads without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.value.borrow())
    }

    /// Stores `v` and notifies subscribers, unless `v` is identical to the
    /// current value. Subscribers run synchronously, in subscription order,
    /// and only ever see the new value. A panicking subscriber stops the
    /// remaining ones from running for this write.
    pub fn set(&self, v: T)
    where
        T: Identity + Clone,
    {
        if self.0.value.borrow().identical(&v) {
            return;
        }
        *self.0.value.borrow_mut() = v.clone();
        let subs: Vec<Rc<dyn Fn(&T)>> = self
            .0
            .subs
            .borrow()
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        for s in subs {
            s(&v);
        }
    }

    /// Computes a replacement from the current value and writes it.
    pub fn update(&self, f: impl FnOnce(&T) -> T)
    where
        T: Identity + Clone,
    {
        let next = f(&self.0.value.borrow());
        self.set(next);
    }

    /// Manual observation. The returned [`Dispose`] unsubscribes.
    pub fn watch(&self, f: impl Fn(&T) + 'static) -> Dispose {
        let id = self.0.next_sub.get();
        self.0.next_sub.set(id + 1);
        self.0.subs.borrow_mut().push((id, Rc::new(f)));

        let weak: Weak<Inner<T>> = Rc::downgrade(&self.0);
        Dispose::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subs.borrow_mut().retain(|(sid, _)| *sid != id);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subs.borrow().len()
    }

    pub fn ptr_eq(&self, other: &Signal<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: 'static> Identity for Signal<T> {
    fn identical(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

pub fn signal<T: 'static>(t: T) -> Signal<T> {
    Signal::new(t)
}

trait ErasedSignal {
    fn read(&self) -> Value;
    fn watch_any(self: Rc<Self>, f: Rc<dyn Fn()>) -> Dispose;
    fn subscriber_count(&self) -> usize;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<T> ErasedSignal for Inner<T>
where
    T: Clone + Into<Value> + 'static,
{
    fn read(&self) -> Value {
        self.value.borrow().clone().into()
    }

    fn watch_any(self: Rc<Self>, f: Rc<dyn Fn()>) -> Dispose {
        Signal(self).watch(move |_| f())
    }

    fn subscriber_count(&self) -> usize {
        self.subs.borrow().len()
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// A type-erased signal handle, as stored in a component context.
#[derive(Clone)]
pub struct AnySignal(Rc<dyn ErasedSignal>);

impl AnySignal {
    /// Current value converted to a [`Value`].
    pub fn read(&self) -> Value {
        self.0.read()
    }

    pub fn watch(&self, f: impl Fn() + 'static) -> Dispose {
        self.0.clone().watch_any(Rc::new(f))
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subscriber_count()
    }

    /// Recovers the typed handle.
    pub fn downcast<T: 'static>(&self) -> Option<Signal<T>> {
        self.0.clone().into_any().downcast::<Inner<T>>().ok().map(Signal)
    }

    pub fn ptr_eq(&self, other: &AnySignal) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl fmt::Debug for AnySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnySignal").field(&self.read()).finish()
    }
}

impl<T> From<Signal<T>> for AnySignal
where
    T: Clone + Into<Value> + 'static,
{
    fn from(s: Signal<T>) -> Self {
        AnySignal(s.0)
    }
}

impl<T> From<Signal<T>> for Value
where
    T: Clone + Into<Value> + 'static,
{
    fn from(s: Signal<T>) -> Self {
        Value::Signal(s.into())
    }
}

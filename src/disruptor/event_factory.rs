//! Event factories
//!
//! Ring buffer slots are pre-allocated once at construction time. An event
//! factory is called exactly once per slot to produce its initial value; after
//! that, producers only ever overwrite slots in place.

/// Factory for the events that pre-populate the ring buffer
///
/// Any `Fn() -> T` closure is a factory, so most callers never implement this
/// trait by hand.
///
/// # Examples
/// ```
/// use seqring::disruptor::EventFactory;
///
/// struct Tick {
///     price: f64,
/// }
///
/// struct TickFactory;
///
/// impl EventFactory<Tick> for TickFactory {
///     fn new_instance(&self) -> Tick {
///         Tick { price: 0.0 }
///     }
/// }
///
/// assert_eq!(TickFactory.new_instance().price, 0.0);
/// ```
pub trait EventFactory<T>: Send + Sync {
    /// Produce the initial value of one slot
    fn new_instance(&self) -> T;
}

impl<T, F> EventFactory<T> for F
where
    F: Fn() -> T + Send + Sync,
{
    fn new_instance(&self) -> T {
        self()
    }
}

/// Fills every slot with `T::default()`
pub struct DefaultEventFactory<T> {
    _phantom: std::marker::PhantomData<fn() -> T>,
}

impl<T: Default> DefaultEventFactory<T> {
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: Default> Default for DefaultEventFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> EventFactory<T> for DefaultEventFactory<T> {
    fn new_instance(&self) -> T {
        T::default()
    }
}

/// Fills every slot with a clone of a prototype event
///
/// Handy when slots carry pre-sized buffers, so that producers overwrite
/// instead of allocating:
///
/// ```
/// use seqring::disruptor::{EventFactory, PrototypeEventFactory};
///
/// let factory = PrototypeEventFactory::new(Vec::<u8>::with_capacity(512));
/// assert!(factory.new_instance().capacity() >= 512);
/// ```
#[derive(Debug, Clone)]
pub struct PrototypeEventFactory<T> {
    prototype: T,
}

impl<T> PrototypeEventFactory<T>
where
    T: Clone + Send + Sync,
{
    pub fn new(prototype: T) -> Self {
        Self { prototype }
    }

    /// The event every slot starts as
    pub fn prototype(&self) -> &T {
        &self.prototype
    }
}

impl<T> EventFactory<T> for PrototypeEventFactory<T>
where
    T: Clone + Send + Sync,
{
    fn new_instance(&self) -> T {
        self.prototype.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Order {
        id: u64,
        tags: Vec<String>,
    }

    fn fill<F: EventFactory<Order>>(factory: &F, n: usize) -> Vec<Order> {
        (0..n).map(|_| factory.new_instance()).collect()
    }

    #[test]
    fn test_default_factory() {
        let slots = fill(&DefaultEventFactory::<Order>::new(), 3);
        assert!(slots.iter().all(|o| *o == Order::default()));
    }

    #[test]
    fn test_prototype_factory_clones_each_time() {
        let factory = PrototypeEventFactory::new(Order {
            id: 9,
            tags: vec!["new".to_string()],
        });
        let slots = fill(&factory, 4);
        assert_eq!(slots.len(), 4);
        assert!(slots.iter().all(|o| o == factory.prototype()));
    }

    #[test]
    fn test_closure_is_called_once_per_instance() {
        let calls = AtomicUsize::new(0);
        let factory = || Order {
            id: calls.fetch_add(1, Ordering::Relaxed) as u64,
            tags: Vec::new(),
        };
        let ids: Vec<u64> = fill(&factory, 5).into_iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }
}

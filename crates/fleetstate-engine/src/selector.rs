//! Selector graph
//!
//! Selectors project the aggregate state into the values observers care
//! about. A root selector reads the state directly and runs on every call. A
//! derived selector combines the outputs of other selectors and memoizes its
//! result: its function only runs when the tuple of input values differs from
//! the one seen last time.
//!
//! Selectors are shared through `Arc`, so one selector can feed several
//! derived selectors and the graph may be any DAG.
//!
//! ```
//! use fleetstate_engine::selector::{self, Select};
//! use std::collections::BTreeMap;
//!
//! type State = BTreeMap<String, i64>;
//!
//! let a = selector::root(|s: &State| s.get("a").copied().unwrap_or(0));
//! let b = selector::root(|s: &State| s.get("b").copied().unwrap_or(0));
//! let sum = selector::derived((a, b), |(a, b): &(i64, i64)| a + b);
//!
//! let state: State = [("a".to_string(), 2), ("b".to_string(), 3)].into();
//! assert_eq!(sum.select(&state), 5);
//! ```

use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;

/// Computes a value from the state
pub trait Select<S>: Send + Sync {
    /// Selected value; compared to detect changes
    type Output: Clone + PartialEq + Send + Sync + 'static;

    /// Compute the value for `state`
    fn select(&self, state: &S) -> Self::Output;

    /// Forget any memoized result
    fn invalidate(&self) {}
}

impl<S, T> Select<S> for Arc<T>
where
    T: Select<S> + ?Sized,
{
    type Output = T::Output;

    fn select(&self, state: &S) -> Self::Output {
        (**self).select(state)
    }

    fn invalidate(&self) {
        (**self).invalidate()
    }
}

/// Selector reading the state directly
pub struct RootSelector<S, T> {
    select: Box<dyn Fn(&S) -> T + Send + Sync>,
}

impl<S, T> RootSelector<S, T> {
    /// Wrap a projection of the state
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&S) -> T + Send + Sync + 'static,
    {
        Self {
            select: Box::new(f),
        }
    }
}

impl<S, T> Select<S> for RootSelector<S, T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Output = T;

    fn select(&self, state: &S) -> T {
        (self.select)(state)
    }
}

/// Inputs of a derived selector
///
/// Implemented for tuples of one to four selectors and for a `Vec` of
/// selectors sharing an output type.
pub trait SelectorInputs<S>: Send + Sync {
    /// Input values passed to the derived function
    type Values: Clone + PartialEq + Send + Sync + 'static;

    /// Select every input
    fn select_all(&self, state: &S) -> Self::Values;

    /// Invalidate every input
    fn invalidate_all(&self);
}

macro_rules! impl_tuple_inputs {
    ($($sel:ident => $idx:tt),+) => {
        impl<S, $($sel),+> SelectorInputs<S> for ($($sel,)+)
        where
            $($sel: Select<S>),+
        {
            type Values = ($(<$sel as Select<S>>::Output,)+);

            fn select_all(&self, state: &S) -> Self::Values {
                ($(self.$idx.select(state),)+)
            }

            fn invalidate_all(&self) {
                $(self.$idx.invalidate();)+
            }
        }
    };
}

impl_tuple_inputs!(A => 0);
impl_tuple_inputs!(A => 0, B => 1);
impl_tuple_inputs!(A => 0, B => 1, C => 2);
impl_tuple_inputs!(A => 0, B => 1, C => 2, D => 3);

impl<S, Sel> SelectorInputs<S> for Vec<Sel>
where
    Sel: Select<S>,
{
    type Values = Vec<Sel::Output>;

    fn select_all(&self, state: &S) -> Self::Values {
        self.iter().map(|selector| selector.select(state)).collect()
    }

    fn invalidate_all(&self) {
        for selector in self {
            selector.invalidate();
        }
    }
}

/// Memoizing selector over other selectors
pub struct DerivedSelector<S, I, T>
where
    I: SelectorInputs<S>,
{
    inputs: I,
    compute: Box<dyn Fn(&I::Values) -> T + Send + Sync>,
    memo: Mutex<Option<(I::Values, T)>>,
    _state: PhantomData<fn(&S)>,
}

impl<S, I, T> DerivedSelector<S, I, T>
where
    I: SelectorInputs<S>,
{
    /// Combine `inputs` with `f`
    pub fn new<F>(inputs: I, f: F) -> Self
    where
        F: Fn(&I::Values) -> T + Send + Sync + 'static,
    {
        Self {
            inputs,
            compute: Box::new(f),
            memo: Mutex::new(None),
            _state: PhantomData,
        }
    }

    /// Whether a result is memoized
    pub fn is_cached(&self) -> bool {
        self.memo.lock().is_some()
    }
}

impl<S, I, T> Select<S> for DerivedSelector<S, I, T>
where
    I: SelectorInputs<S>,
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Output = T;

    fn select(&self, state: &S) -> T {
        let values = self.inputs.select_all(state);

        let mut memo = self.memo.lock();
        if let Some((previous, result)) = memo.as_ref() {
            if *previous == values {
                return result.clone();
            }
        }

        let result = (self.compute)(&values);
        *memo = Some((values, result.clone()));
        result
    }

    fn invalidate(&self) {
        self.memo.lock().take();
        self.inputs.invalidate_all();
    }
}

/// Shared root selector
pub fn root<S, T, F>(f: F) -> Arc<RootSelector<S, T>>
where
    F: Fn(&S) -> T + Send + Sync + 'static,
{
    Arc::new(RootSelector::new(f))
}

/// Shared memoizing selector over `inputs`
pub fn derived<S, I, T, F>(inputs: I, f: F) -> Arc<DerivedSelector<S, I, T>>
where
    I: SelectorInputs<S>,
    F: Fn(&I::Values) -> T + Send + Sync + 'static,
{
    Arc::new(DerivedSelector::new(inputs, f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type State = BTreeMap<String, i64>;

    fn state(pairs: &[(&str, i64)]) -> State {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn field(name: &'static str) -> Arc<RootSelector<State, i64>> {
        root(move |s: &State| s.get(name).copied().unwrap_or_default())
    }

    #[test]
    fn test_root_always_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let selector = {
            let calls = calls.clone();
            root(move |s: &State| {
                calls.fetch_add(1, Ordering::SeqCst);
                s.len()
            })
        };
        let s = state(&[("a", 1)]);
        selector.select(&s);
        selector.select(&s);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_derived_memoizes_on_equal_inputs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sum = {
            let calls = calls.clone();
            derived((field("a"), field("b")), move |(a, b): &(i64, i64)| {
                calls.fetch_add(1, Ordering::SeqCst);
                a + b
            })
        };

        assert_eq!(sum.select(&state(&[("a", 1), ("b", 2)])), 3);
        // unrelated key changed; inputs are the same
        assert_eq!(sum.select(&state(&[("a", 1), ("b", 2), ("c", 9)])), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(sum.select(&state(&[("a", 5), ("b", 2)])), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let calls = Arc::new(AtomicUsize::new(0));
        let doubled = {
            let calls = calls.clone();
            derived((field("a"),), move |(a,): &(i64,)| {
                calls.fetch_add(1, Ordering::SeqCst);
                a * 2
            })
        };
        let s = state(&[("a", 4)]);
        doubled.select(&s);
        assert!(doubled.is_cached());

        doubled.invalidate();
        assert!(!doubled.is_cached());
        assert_eq!(doubled.select(&s), 8);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_vec_inputs() {
        let inputs: Vec<Arc<dyn Select<State, Output = i64>>> =
            vec![field("a"), field("b"), field("c")];
        let total = derived(inputs, |values: &Vec<i64>| values.iter().sum::<i64>());
        assert_eq!(total.select(&state(&[("a", 1), ("b", 2), ("c", 3)])), 6);
    }

    #[test]
    fn test_shared_child_in_dag() {
        let a = field("a");
        let plus_one = derived((a.clone(),), |(a,): &(i64,)| a + 1);
        let times_two = derived((a.clone(),), |(a,): &(i64,)| a * 2);
        let both = derived((plus_one, times_two), |(p, t): &(i64, i64)| format!("{p}/{t}"));
        assert_eq!(both.select(&state(&[("a", 3)])), "4/6");
    }
}

//! Operation chain: an ordered, stateless composition of per-element steps (filter, map,
//! flat-map, distinct) that every batch applies independently.
//!
//! The chain is a factory. [`OpChain::instantiate`] builds a [`Stage`] for one terminal call;
//! distinct steps allocate their [`DedupRegistry`] at that point, so registries never outlive
//! the call that created them.

use std::hash::Hash;
use std::sync::Arc;

use super::dedup::DedupRegistry;

/// Whether the sink wants more elements from the current batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The batch's partial is decided; skip its remaining elements.
    Stop,
}

/// Result of pushing one element through a step. Errors come from user closures.
pub type StepResult = anyhow::Result<Flow>;

/// An instantiated chain: push one source element through every step into `emit`.
/// Shared by reference across all workers of one call.
pub type Stage<S, T> = Arc<dyn Fn(&S, &mut dyn FnMut(T) -> StepResult) -> StepResult + Send + Sync>;

type Build<S, T> = Arc<dyn Fn() -> Stage<S, T> + Send + Sync>;

/// Lazy description of the per-element work; cheap to clone, executes nothing by itself.
pub struct OpChain<S, T> {
    build: Build<S, T>,
    steps: Vec<&'static str>,
}

impl<S, T> Clone for OpChain<S, T> {
    fn clone(&self) -> Self {
        Self {
            build: Arc::clone(&self.build),
            steps: self.steps.clone(),
        }
    }
}

impl<S, T> std::fmt::Debug for OpChain<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpChain").field("steps", &self.steps).finish()
    }
}

impl<S> OpChain<S, S>
where
    S: Clone + 'static,
{
    /// Chain with no steps: every source element is emitted as a clone.
    pub fn identity() -> Self {
        let build: Build<S, S> = Arc::new(|| {
            let stage: Stage<S, S> =
                Arc::new(|s: &S, emit: &mut dyn FnMut(S) -> StepResult| emit(s.clone()));
            stage
        });
        Self {
            build,
            steps: Vec::new(),
        }
    }
}

impl<S, T> OpChain<S, T>
where
    S: 'static,
    T: 'static,
{
    /// Build a fresh stage for one terminal call.
    pub fn instantiate(&self) -> Stage<S, T> {
        (self.build)()
    }

    /// Step names in application order, e.g. `["select", "collect"]`.
    pub fn steps(&self) -> &[&'static str] {
        &self.steps
    }

    /// `identity` when empty, otherwise the steps joined with ` -> `.
    pub fn describe(&self) -> String {
        if self.steps.is_empty() {
            "identity".to_string()
        } else {
            self.steps.join(" -> ")
        }
    }

    fn then<U, W>(self, name: &'static str, wrap: W) -> OpChain<S, U>
    where
        U: 'static,
        W: Fn(Stage<S, T>) -> Stage<S, U> + Send + Sync + 'static,
    {
        let prev = self.build;
        let mut steps = self.steps;
        steps.push(name);
        OpChain {
            build: Arc::new(move || wrap(prev())),
            steps,
        }
    }

    /// Keep elements for which `pred` holds.
    pub fn select<P>(self, pred: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let pred = Arc::new(pred);
        self.then("select", move |prev| {
            let pred = Arc::clone(&pred);
            let stage: Stage<S, T> = Arc::new(move |s: &S, emit: &mut dyn FnMut(T) -> StepResult| {
                prev(s, &mut |t: T| {
                    if pred(&t) {
                        emit(t)
                    } else {
                        Ok(Flow::Continue)
                    }
                })
            });
            stage
        })
    }

    /// Drop elements for which `pred` holds.
    pub fn reject<P>(self, pred: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let chain = self.select(move |t: &T| !pred(t));
        chain.rename_last("reject")
    }

    /// Like [`select`](Self::select), but the predicate may fail; the error aborts the batch.
    pub fn try_select<P, E>(self, pred: P) -> Self
    where
        P: Fn(&T) -> Result<bool, E> + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        let pred = Arc::new(pred);
        self.then("try_select", move |prev| {
            let pred = Arc::clone(&pred);
            let stage: Stage<S, T> = Arc::new(move |s: &S, emit: &mut dyn FnMut(T) -> StepResult| {
                prev(s, &mut |t: T| {
                    if pred(&t).map_err(Into::<anyhow::Error>::into)? {
                        emit(t)
                    } else {
                        Ok(Flow::Continue)
                    }
                })
            });
            stage
        })
    }

    /// Map every element.
    pub fn collect<U, F>(self, f: F) -> OpChain<S, U>
    where
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.then("collect", move |prev| {
            let f = Arc::clone(&f);
            let stage: Stage<S, U> = Arc::new(move |s: &S, emit: &mut dyn FnMut(U) -> StepResult| {
                prev(s, &mut |t: T| emit(f(t)))
            });
            stage
        })
    }

    /// Map every element with a fallible function; the error aborts the batch.
    pub fn try_collect<U, F, E>(self, f: F) -> OpChain<S, U>
    where
        U: 'static,
        F: Fn(T) -> Result<U, E> + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        let f = Arc::new(f);
        self.then("try_collect", move |prev| {
            let f = Arc::clone(&f);
            let stage: Stage<S, U> = Arc::new(move |s: &S, emit: &mut dyn FnMut(U) -> StepResult| {
                prev(s, &mut |t: T| emit(f(t).map_err(Into::<anyhow::Error>::into)?))
            });
            stage
        })
    }

    /// Filter and map in one step: elements failing `pred` are dropped, the rest mapped by `f`.
    pub fn collect_if<U, P, F>(self, pred: P, f: F) -> OpChain<S, U>
    where
        U: 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let pred = Arc::new(pred);
        let f = Arc::new(f);
        self.then("collect_if", move |prev| {
            let pred = Arc::clone(&pred);
            let f = Arc::clone(&f);
            let stage: Stage<S, U> = Arc::new(move |s: &S, emit: &mut dyn FnMut(U) -> StepResult| {
                prev(s, &mut |t: T| {
                    if pred(&t) {
                        emit(f(t))
                    } else {
                        Ok(Flow::Continue)
                    }
                })
            });
            stage
        })
    }

    /// Map every element to zero or more outputs, emitted in iteration order.
    pub fn flat_collect<U, I, F>(self, f: F) -> OpChain<S, U>
    where
        U: 'static,
        I: IntoIterator<Item = U>,
        F: Fn(T) -> I + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.then("flat_collect", move |prev| {
            let f = Arc::clone(&f);
            let stage: Stage<S, U> = Arc::new(move |s: &S, emit: &mut dyn FnMut(U) -> StepResult| {
                prev(s, &mut |t: T| {
                    for u in f(t) {
                        if emit(u)? == Flow::Stop {
                            return Ok(Flow::Stop);
                        }
                    }
                    Ok(Flow::Continue)
                })
            });
            stage
        })
    }

    /// Let each value through only the first time it is seen across all batches of a call.
    /// Later steps (and terminal predicates) never see the duplicates.
    pub fn distinct(self) -> Self
    where
        T: Eq + Hash + Clone + Send + Sync,
    {
        self.then("distinct", |prev| {
            let registry = Arc::new(DedupRegistry::<T>::new());
            let stage: Stage<S, T> = Arc::new(move |s: &S, emit: &mut dyn FnMut(T) -> StepResult| {
                prev(s, &mut |t: T| {
                    if registry.insert_if_absent(t.clone()) {
                        emit(t)
                    } else {
                        Ok(Flow::Continue)
                    }
                })
            });
            stage
        })
    }

    fn rename_last(mut self, name: &'static str) -> Self {
        if let Some(last) = self.steps.last_mut() {
            *last = name;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_all<S: 'static, T: 'static>(chain: &OpChain<S, T>, src: &[S]) -> anyhow::Result<Vec<T>> {
        let stage = chain.instantiate();
        let mut out = Vec::new();
        for s in src {
            stage(s, &mut |t: T| {
                out.push(t);
                Ok(Flow::Continue)
            })?;
        }
        Ok(out)
    }

    #[test]
    fn steps_apply_in_order() {
        let chain = OpChain::<i32, i32>::identity()
            .select(|x| x % 2 == 0)
            .collect(|x| x * 10)
            .reject(|x| *x == 40);
        assert_eq!(chain.describe(), "select -> collect -> reject");
        assert_eq!(run_all(&chain, &[1, 2, 3, 4, 5, 6]).unwrap(), vec![20, 60]);
    }

    #[test]
    fn flat_collect_expands_in_order() {
        let chain = OpChain::<u8, u8>::identity().flat_collect(|x| vec![x; x as usize]);
        assert_eq!(run_all(&chain, &[1, 0, 3]).unwrap(), vec![1, 3, 3, 3]);
    }

    #[test]
    fn flat_collect_honors_stop() {
        let chain = OpChain::<u8, u8>::identity().flat_collect(|x| vec![x, x + 1, x + 2]);
        let stage = chain.instantiate();
        let mut seen = Vec::new();
        let flow = stage(&10, &mut |t: u8| {
            seen.push(t);
            Ok(if t == 11 { Flow::Stop } else { Flow::Continue })
        })
        .unwrap();
        assert_eq!(flow, Flow::Stop);
        assert_eq!(seen, vec![10, 11]);
    }

    #[test]
    fn distinct_registry_is_fresh_per_instantiation() {
        let chain = OpChain::<i32, i32>::identity().distinct();
        assert_eq!(run_all(&chain, &[1, 1, 2]).unwrap(), vec![1, 2]);
        assert_eq!(run_all(&chain, &[1, 1, 2]).unwrap(), vec![1, 2]);
    }

    #[test]
    fn try_collect_surfaces_error() {
        let chain = OpChain::<i32, i32>::identity()
            .try_collect(|x| if x == 3 { Err(anyhow::anyhow!("bad {}", x)) } else { Ok(x) });
        let err = run_all(&chain, &[1, 2, 3, 4]).unwrap_err();
        assert_eq!(err.to_string(), "bad 3");
    }

    #[test]
    fn collect_if_filters_then_maps() {
        let chain = OpChain::<i32, i32>::identity().collect_if(|x| *x > 1, |x| x.to_string());
        assert_eq!(run_all(&chain, &[1, 2, 3]).unwrap(), vec!["2", "3"]);
    }
}

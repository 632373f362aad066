//! Parallel facade: a lazy view over a source slice plus an operation chain.
//!
//! Chainable methods return a new view and execute nothing. Terminal methods instantiate the
//! chain, split the source, dispatch the batches and combine the partial results, all within the
//! call; nothing from one call (dedup registries, combiner state) survives into the next.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::pipeline::OpChain;
use crate::types::DispatchStats;
use crate::{Config, Result};

use super::combiner::{
    AllCombiner, AllProcedure, AnyCombiner, AnyProcedure, BatchProcedure, Combinable,
    CountProcedure, DetectCombiner, DetectProcedure, FoldCombiner, FoldProcedure,
    ForEachProcedure, GroupByCombiner, GroupByEachProcedure, GroupByProcedure,
    GroupByUniqueKeyProcedure, SetCombiner, ShortCircuitable, SumCombiner, UniqueKeyCombiner,
    UnitCombiner, VecCombiner, VecProcedure,
};
use super::operation::run_operation;

/// Lazy parallel view of `source` through an [`OpChain`].
pub struct ParallelIterable<'a, S, T> {
    source: &'a [S],
    chain: OpChain<S, T>,
    config: Config,
}

impl<S, T> Clone for ParallelIterable<'_, S, T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source,
            chain: self.chain.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, T> std::fmt::Debug for ParallelIterable<'_, S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelIterable")
            .field("len", &self.source.len())
            .field("chain", &self.chain)
            .field("config", &self.config)
            .finish()
    }
}

impl<'a, S> ParallelIterable<'a, S, S>
where
    S: Clone + Send + Sync + 'static,
{
    /// View of `source` with an empty chain. `config.distinct` is not applied here; use
    /// [`par_iter`](crate::par_iter) or [`distinct`](Self::distinct) for that.
    pub fn new(source: &'a [S], config: Config) -> Self {
        if config.distinct {
            log::debug!("ParallelIterable::new ignores config.distinct; use par_iter or distinct()");
        }
        Self {
            source,
            chain: OpChain::identity(),
            config,
        }
    }
}

impl<'a, S, T> ParallelIterable<'a, S, T>
where
    S: Send + Sync + 'static,
    T: Send + 'static,
{
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn chain(&self) -> &OpChain<S, T> {
        &self.chain
    }

    fn map_chain<U>(self, f: impl FnOnce(OpChain<S, T>) -> OpChain<S, U>) -> ParallelIterable<'a, S, U> {
        ParallelIterable {
            source: self.source,
            chain: f(self.chain),
            config: self.config,
        }
    }

    // ---- Chainable ----

    pub fn select<P>(self, pred: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.map_chain(|c| c.select(pred))
    }

    pub fn reject<P>(self, pred: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.map_chain(|c| c.reject(pred))
    }

    pub fn try_select<P, E>(self, pred: P) -> Self
    where
        P: Fn(&T) -> std::result::Result<bool, E> + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        self.map_chain(|c| c.try_select(pred))
    }

    pub fn collect<U, F>(self, f: F) -> ParallelIterable<'a, S, U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.map_chain(|c| c.collect(f))
    }

    pub fn try_collect<U, F, E>(self, f: F) -> ParallelIterable<'a, S, U>
    where
        U: Send + 'static,
        F: Fn(T) -> std::result::Result<U, E> + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        self.map_chain(|c| c.try_collect(f))
    }

    pub fn collect_if<U, P, F>(self, pred: P, f: F) -> ParallelIterable<'a, S, U>
    where
        U: Send + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.map_chain(|c| c.collect_if(pred, f))
    }

    pub fn flat_collect<U, I, F>(self, f: F) -> ParallelIterable<'a, S, U>
    where
        U: Send + 'static,
        I: IntoIterator<Item = U>,
        F: Fn(T) -> I + Send + Sync + 'static,
    {
        self.map_chain(|c| c.flat_collect(f))
    }

    /// Globally de-duplicated view. Any/all/detect on it evaluate the predicate at most once per
    /// distinct value; for `all_satisfy` a duplicate counts as satisfying.
    pub fn distinct(self) -> Self
    where
        T: Eq + Hash + Clone + Sync,
    {
        self.map_chain(|c| c.distinct())
    }

    // ---- Terminal ----

    fn run<B, C>(&self, name: &'static str, procedure: B, combiner: C) -> Result<(C::Output, DispatchStats)>
    where
        B: BatchProcedure<T>,
        C: Combinable<B::Partial> + ShortCircuitable,
    {
        run_operation(name, self.source, &self.config, &self.chain, &procedure, combiner)
    }

    /// All chain outputs. Order follows the source under `combine_one = false`, arrival otherwise.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        self.to_vec_with_stats().map(|(v, _)| v)
    }

    pub fn to_vec_with_stats(&self) -> Result<(Vec<T>, DispatchStats)> {
        self.run(
            "to_vec",
            VecProcedure,
            VecCombiner::new(self.config.merge_policy()),
        )
    }

    pub fn to_set(&self) -> Result<HashSet<T>>
    where
        T: Eq + Hash,
    {
        self.run("to_set", VecProcedure, SetCombiner::default())
            .map(|(v, _)| v)
    }

    /// Run `f` on every chain output, concurrently across batches.
    pub fn for_each<F>(&self, f: F) -> Result<()>
    where
        F: Fn(T) + Sync,
    {
        self.run("for_each", ForEachProcedure(f), UnitCombiner)
            .map(|(v, _)| v)
    }

    pub fn count(&self) -> Result<usize> {
        self.run("count", CountProcedure, SumCombiner::default())
            .map(|(v, _)| v)
    }

    /// Fold each batch from `identity()` with `fold_op`, then merge batch results with
    /// `reduce_op`, which must be associative and commutative (batches finish in any order).
    pub fn fold<R, ID, F, RD>(&self, identity: ID, fold_op: F, reduce_op: RD) -> Result<R>
    where
        R: Send,
        ID: Fn() -> R + Sync,
        F: Fn(R, T) -> R + Sync,
        RD: Fn(R, R) -> R,
    {
        let procedure = FoldProcedure {
            identity: &identity,
            fold_op,
        };
        let combiner = FoldCombiner::new(&identity, reduce_op);
        self.run("fold", procedure, combiner).map(|(v, _)| v)
    }

    pub fn any_satisfy<P>(&self, pred: P) -> Result<bool>
    where
        P: Fn(&T) -> bool + Sync,
    {
        self.any_satisfy_with_stats(pred).map(|(v, _)| v)
    }

    pub fn any_satisfy_with_stats<P>(&self, pred: P) -> Result<(bool, DispatchStats)>
    where
        P: Fn(&T) -> bool + Sync,
    {
        self.run("any_satisfy", AnyProcedure(pred), AnyCombiner::default())
    }

    pub fn all_satisfy<P>(&self, pred: P) -> Result<bool>
    where
        P: Fn(&T) -> bool + Sync,
    {
        self.all_satisfy_with_stats(pred).map(|(v, _)| v)
    }

    pub fn all_satisfy_with_stats<P>(&self, pred: P) -> Result<(bool, DispatchStats)>
    where
        P: Fn(&T) -> bool + Sync,
    {
        self.run("all_satisfy", AllProcedure(pred), AllCombiner::default())
    }

    pub fn none_satisfy<P>(&self, pred: P) -> Result<bool>
    where
        P: Fn(&T) -> bool + Sync,
    {
        self.any_satisfy(pred).map(|any| !any)
    }

    /// First element satisfying `pred` in source order: the match from the lowest batch index wins.
    pub fn detect<P>(&self, pred: P) -> Result<Option<T>>
    where
        P: Fn(&T) -> bool + Sync,
    {
        self.detect_with_stats(pred).map(|(v, _)| v)
    }

    pub fn detect_with_stats<P>(&self, pred: P) -> Result<(Option<T>, DispatchStats)>
    where
        P: Fn(&T) -> bool + Sync,
    {
        self.run("detect", DetectProcedure(pred), DetectCombiner::default())
    }

    pub fn group_by<K, F>(&self, key: F) -> Result<HashMap<K, Vec<T>>>
    where
        K: Eq + Hash + Send,
        F: Fn(&T) -> K + Sync,
    {
        let combiner = GroupByCombiner::new(self.config.merge_policy());
        self.run("group_by", GroupByProcedure(key), combiner)
            .map(|(v, _)| v)
    }

    /// Like [`group_by`](Self::group_by), but an element joins the group of every key `keys` yields.
    pub fn group_by_each<K, I, F>(&self, keys: F) -> Result<HashMap<K, Vec<T>>>
    where
        T: Clone,
        K: Eq + Hash + Send,
        I: IntoIterator<Item = K>,
        F: Fn(&T) -> I + Sync,
    {
        let combiner = GroupByCombiner::new(self.config.merge_policy());
        self.run("group_by_each", GroupByEachProcedure(keys), combiner)
            .map(|(v, _)| v)
    }

    /// Index outputs by a key that must be unique; a repeated key fails the operation.
    pub fn group_by_unique_key<K, F>(&self, key: F) -> Result<HashMap<K, T>>
    where
        K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug,
        F: Fn(&T) -> K + Sync,
    {
        self.run(
            "group_by_unique_key",
            GroupByUniqueKeyProcedure::new(key),
            UniqueKeyCombiner::default(),
        )
        .map(|(v, _)| v)
    }
}

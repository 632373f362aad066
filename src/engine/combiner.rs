//! Combiner contract and the concrete procedures/combiners behind each terminal operation.
//!
//! Each terminal is split in two halves:
//! - a [`BatchProcedure`], shared by reference across workers, that turns the elements of one
//!   batch into a partial result;
//! - a [`Combinable`], owned by the calling thread, that merges partials as their reports arrive.
//!
//! Only the calling thread ever touches a combiner, so merges are single-writer without a lock.

use anyhow::anyhow;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::pipeline::{DedupRegistry, Flow, StepResult};
use crate::types::MergePolicy;

/// Worker half: builds one batch's partial result.
pub trait BatchProcedure<T>: Sync {
    type Partial: Send;

    fn new_partial(&self) -> Self::Partial;

    /// Fold one chain output into the batch's partial. [`Flow::Stop`] ends the batch early.
    fn accept(&self, partial: &mut Self::Partial, item: T) -> StepResult;
}

/// Calling-thread half: merges partial results into the final value.
pub trait Combinable<P> {
    type Output;

    fn policy(&self) -> MergePolicy;

    fn combine(&mut self, batch: usize, partial: P);

    fn finish(self) -> Self::Output;
}

/// Capability of reaching a decisive value before every batch has reported.
pub trait ShortCircuitable {
    /// Lowest batch index that produced a decisive partial, once one has been combined.
    fn decision(&self) -> Option<usize> {
        None
    }
}

// ---- Containers ----

/// Collects chain outputs in batch traversal order.
pub struct VecProcedure;

impl<T: Send> BatchProcedure<T> for VecProcedure {
    type Partial = Vec<T>;

    fn new_partial(&self) -> Vec<T> {
        Vec::new()
    }

    fn accept(&self, partial: &mut Vec<T>, item: T) -> StepResult {
        partial.push(item);
        Ok(Flow::Continue)
    }
}

/// Appends partial lists. [`MergePolicy::CombineAll`] holds them and concatenates in batch order,
/// so the result follows source order.
pub struct VecCombiner<T> {
    policy: MergePolicy,
    result: Vec<T>,
    held: Vec<(usize, Vec<T>)>,
}

impl<T> VecCombiner<T> {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            result: Vec::new(),
            held: Vec::new(),
        }
    }
}

impl<T> Combinable<Vec<T>> for VecCombiner<T> {
    type Output = Vec<T>;

    fn policy(&self) -> MergePolicy {
        self.policy
    }

    fn combine(&mut self, batch: usize, partial: Vec<T>) {
        match self.policy {
            MergePolicy::CombineOne => self.result.extend(partial),
            MergePolicy::CombineAll => self.held.push((batch, partial)),
        }
    }

    fn finish(mut self) -> Vec<T> {
        self.held.sort_unstable_by_key(|(batch, _)| *batch);
        let total = self.held.iter().map(|(_, p)| p.len()).sum::<usize>();
        self.result.reserve(total);
        for (_, partial) in self.held {
            self.result.extend(partial);
        }
        self.result
    }
}

impl<T> ShortCircuitable for VecCombiner<T> {}

/// Merges partial lists into one set.
pub struct SetCombiner<T> {
    result: HashSet<T>,
}

impl<T> Default for SetCombiner<T> {
    fn default() -> Self {
        Self {
            result: HashSet::new(),
        }
    }
}

impl<T: Eq + Hash> Combinable<Vec<T>> for SetCombiner<T> {
    type Output = HashSet<T>;

    fn policy(&self) -> MergePolicy {
        MergePolicy::CombineOne
    }

    fn combine(&mut self, _batch: usize, partial: Vec<T>) {
        self.result.extend(partial);
    }

    fn finish(self) -> HashSet<T> {
        self.result
    }
}

impl<T> ShortCircuitable for SetCombiner<T> {}

/// Runs a side effect per element; the partial is empty.
pub struct ForEachProcedure<F>(pub F);

impl<T, F> BatchProcedure<T> for ForEachProcedure<F>
where
    F: Fn(T) + Sync,
{
    type Partial = ();

    fn new_partial(&self) {}

    fn accept(&self, _partial: &mut (), item: T) -> StepResult {
        (self.0)(item);
        Ok(Flow::Continue)
    }
}

#[derive(Default)]
pub struct UnitCombiner;

impl Combinable<()> for UnitCombiner {
    type Output = ();

    fn policy(&self) -> MergePolicy {
        MergePolicy::CombineOne
    }

    fn combine(&mut self, _batch: usize, _partial: ()) {}

    fn finish(self) {}
}

impl ShortCircuitable for UnitCombiner {}

// ---- Grouping ----

/// Groups chain outputs by a key function.
pub struct GroupByProcedure<F>(pub F);

impl<T, K, F> BatchProcedure<T> for GroupByProcedure<F>
where
    T: Send,
    K: Eq + Hash + Send,
    F: Fn(&T) -> K + Sync,
{
    type Partial = HashMap<K, Vec<T>>;

    fn new_partial(&self) -> Self::Partial {
        HashMap::new()
    }

    fn accept(&self, partial: &mut Self::Partial, item: T) -> StepResult {
        partial.entry((self.0)(&item)).or_default().push(item);
        Ok(Flow::Continue)
    }
}

/// Groups chain outputs under every key yielded by a key function (an element may land in several groups).
pub struct GroupByEachProcedure<F>(pub F);

impl<T, K, I, F> BatchProcedure<T> for GroupByEachProcedure<F>
where
    T: Clone + Send,
    K: Eq + Hash + Send,
    I: IntoIterator<Item = K>,
    F: Fn(&T) -> I + Sync,
{
    type Partial = HashMap<K, Vec<T>>;

    fn new_partial(&self) -> Self::Partial {
        HashMap::new()
    }

    fn accept(&self, partial: &mut Self::Partial, item: T) -> StepResult {
        for key in (self.0)(&item) {
            partial.entry(key).or_default().push(item.clone());
        }
        Ok(Flow::Continue)
    }
}

/// Merges partial groupings. Under [`MergePolicy::CombineAll`] each group lists its elements in source order.
pub struct GroupByCombiner<K, T> {
    policy: MergePolicy,
    result: HashMap<K, Vec<T>>,
    held: Vec<(usize, HashMap<K, Vec<T>>)>,
}

impl<K, T> GroupByCombiner<K, T> {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            result: HashMap::new(),
            held: Vec::new(),
        }
    }

    fn merge(result: &mut HashMap<K, Vec<T>>, partial: HashMap<K, Vec<T>>)
    where
        K: Eq + Hash,
    {
        for (key, values) in partial {
            result.entry(key).or_default().extend(values);
        }
    }
}

impl<K: Eq + Hash, T> Combinable<HashMap<K, Vec<T>>> for GroupByCombiner<K, T> {
    type Output = HashMap<K, Vec<T>>;

    fn policy(&self) -> MergePolicy {
        self.policy
    }

    fn combine(&mut self, batch: usize, partial: HashMap<K, Vec<T>>) {
        match self.policy {
            MergePolicy::CombineOne => Self::merge(&mut self.result, partial),
            MergePolicy::CombineAll => self.held.push((batch, partial)),
        }
    }

    fn finish(mut self) -> Self::Output {
        self.held.sort_unstable_by_key(|(batch, _)| *batch);
        for (_, partial) in self.held {
            Self::merge(&mut self.result, partial);
        }
        self.result
    }
}

impl<K, T> ShortCircuitable for GroupByCombiner<K, T> {}

/// Maps each element to a key that must be unique across the whole call. A repeated key fails
/// the batch that loses the registry race.
pub struct GroupByUniqueKeyProcedure<K: Eq + Hash, F> {
    key: F,
    seen: DedupRegistry<K>,
}

impl<K: Eq + Hash, F> GroupByUniqueKeyProcedure<K, F> {
    pub fn new(key: F) -> Self {
        Self {
            key,
            seen: DedupRegistry::new(),
        }
    }
}

impl<T, K, F> BatchProcedure<T> for GroupByUniqueKeyProcedure<K, F>
where
    T: Send,
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug,
    F: Fn(&T) -> K + Sync,
{
    type Partial = HashMap<K, T>;

    fn new_partial(&self) -> Self::Partial {
        HashMap::new()
    }

    fn accept(&self, partial: &mut Self::Partial, item: T) -> StepResult {
        let key = (self.key)(&item);
        if !self.seen.insert_if_absent(key.clone()) {
            return Err(anyhow!("key {:?} is not unique", key));
        }
        partial.insert(key, item);
        Ok(Flow::Continue)
    }
}

pub struct UniqueKeyCombiner<K, T> {
    result: HashMap<K, T>,
}

impl<K, T> Default for UniqueKeyCombiner<K, T> {
    fn default() -> Self {
        Self {
            result: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, T> Combinable<HashMap<K, T>> for UniqueKeyCombiner<K, T> {
    type Output = HashMap<K, T>;

    fn policy(&self) -> MergePolicy {
        MergePolicy::CombineOne
    }

    fn combine(&mut self, _batch: usize, partial: HashMap<K, T>) {
        self.result.extend(partial);
    }

    fn finish(self) -> Self::Output {
        self.result
    }
}

impl<K, T> ShortCircuitable for UniqueKeyCombiner<K, T> {}

// ---- Reductions ----

pub struct CountProcedure;

impl<T> BatchProcedure<T> for CountProcedure {
    type Partial = usize;

    fn new_partial(&self) -> usize {
        0
    }

    fn accept(&self, partial: &mut usize, _item: T) -> StepResult {
        *partial += 1;
        Ok(Flow::Continue)
    }
}

#[derive(Default)]
pub struct SumCombiner {
    total: usize,
}

impl Combinable<usize> for SumCombiner {
    type Output = usize;

    fn policy(&self) -> MergePolicy {
        MergePolicy::CombineAll
    }

    fn combine(&mut self, _batch: usize, partial: usize) {
        self.total += partial;
    }

    fn finish(self) -> usize {
        self.total
    }
}

impl ShortCircuitable for SumCombiner {}

/// Per-batch fold seeded by `identity`. The partial stays `None` until the first element.
pub struct FoldProcedure<'f, ID, F> {
    pub identity: &'f ID,
    pub fold_op: F,
}

impl<T, R, ID, F> BatchProcedure<T> for FoldProcedure<'_, ID, F>
where
    R: Send,
    ID: Fn() -> R + Sync,
    F: Fn(R, T) -> R + Sync,
{
    type Partial = Option<R>;

    fn new_partial(&self) -> Option<R> {
        None
    }

    fn accept(&self, partial: &mut Option<R>, item: T) -> StepResult {
        let acc = partial.take().unwrap_or_else(self.identity);
        *partial = Some((self.fold_op)(acc, item));
        Ok(Flow::Continue)
    }
}

/// Folds batch results as they arrive; `reduce_op` must be associative and commutative.
pub struct FoldCombiner<'f, R, ID, RD> {
    acc: Option<R>,
    identity: &'f ID,
    reduce_op: RD,
}

impl<'f, R, ID, RD> FoldCombiner<'f, R, ID, RD> {
    pub fn new(identity: &'f ID, reduce_op: RD) -> Self {
        Self {
            acc: None,
            identity,
            reduce_op,
        }
    }
}

impl<R, ID, RD> Combinable<Option<R>> for FoldCombiner<'_, R, ID, RD>
where
    ID: Fn() -> R,
    RD: Fn(R, R) -> R,
{
    type Output = R;

    fn policy(&self) -> MergePolicy {
        MergePolicy::CombineAll
    }

    fn combine(&mut self, _batch: usize, partial: Option<R>) {
        let Some(partial) = partial else {
            return;
        };
        self.acc = Some(match self.acc.take() {
            None => partial,
            Some(acc) => (self.reduce_op)(acc, partial),
        });
    }

    fn finish(self) -> R {
        self.acc.unwrap_or_else(self.identity)
    }
}

impl<R, ID, RD> ShortCircuitable for FoldCombiner<'_, R, ID, RD> {}

// ---- Short-circuit queries ----

/// Partial is `true` once an element satisfies the predicate; the batch stops there.
pub struct AnyProcedure<P>(pub P);

impl<T, P> BatchProcedure<T> for AnyProcedure<P>
where
    P: Fn(&T) -> bool + Sync,
{
    type Partial = bool;

    fn new_partial(&self) -> bool {
        false
    }

    fn accept(&self, partial: &mut bool, item: T) -> StepResult {
        if (self.0)(&item) {
            *partial = true;
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }
}

/// Logical OR over batches; decisive on the first `true`.
#[derive(Default)]
pub struct AnyCombiner {
    found_in: Option<usize>,
}

impl Combinable<bool> for AnyCombiner {
    type Output = bool;

    fn policy(&self) -> MergePolicy {
        MergePolicy::CombineAll
    }

    fn combine(&mut self, batch: usize, partial: bool) {
        if partial {
            self.found_in = Some(self.found_in.map_or(batch, |b| b.min(batch)));
        }
    }

    fn finish(self) -> bool {
        self.found_in.is_some()
    }
}

impl ShortCircuitable for AnyCombiner {
    fn decision(&self) -> Option<usize> {
        self.found_in
    }
}

/// Partial is `false` once an element violates the predicate; the batch stops there.
pub struct AllProcedure<P>(pub P);

impl<T, P> BatchProcedure<T> for AllProcedure<P>
where
    P: Fn(&T) -> bool + Sync,
{
    type Partial = bool;

    fn new_partial(&self) -> bool {
        true
    }

    fn accept(&self, partial: &mut bool, item: T) -> StepResult {
        if !(self.0)(&item) {
            *partial = false;
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }
}

/// Logical AND over batches; decisive on the first `false`.
#[derive(Default)]
pub struct AllCombiner {
    violated_in: Option<usize>,
}

impl Combinable<bool> for AllCombiner {
    type Output = bool;

    fn policy(&self) -> MergePolicy {
        MergePolicy::CombineAll
    }

    fn combine(&mut self, batch: usize, partial: bool) {
        if !partial {
            self.violated_in = Some(self.violated_in.map_or(batch, |b| b.min(batch)));
        }
    }

    fn finish(self) -> bool {
        self.violated_in.is_none()
    }
}

impl ShortCircuitable for AllCombiner {
    fn decision(&self) -> Option<usize> {
        self.violated_in
    }
}

/// Partial is the first element of the batch that satisfies the predicate.
pub struct DetectProcedure<P>(pub P);

impl<T, P> BatchProcedure<T> for DetectProcedure<P>
where
    T: Send,
    P: Fn(&T) -> bool + Sync,
{
    type Partial = Option<T>;

    fn new_partial(&self) -> Option<T> {
        None
    }

    fn accept(&self, partial: &mut Option<T>, item: T) -> StepResult {
        if (self.0)(&item) {
            *partial = Some(item);
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }
}

/// Keeps the match from the lowest batch index among every batch that found one.
pub struct DetectCombiner<T> {
    best: Option<(usize, T)>,
}

impl<T> Default for DetectCombiner<T> {
    fn default() -> Self {
        Self { best: None }
    }
}

impl<T> Combinable<Option<T>> for DetectCombiner<T> {
    type Output = Option<T>;

    fn policy(&self) -> MergePolicy {
        MergePolicy::CombineAll
    }

    fn combine(&mut self, batch: usize, partial: Option<T>) {
        let Some(found) = partial else {
            return;
        };
        if self.best.as_ref().is_none_or(|(b, _)| batch < *b) {
            self.best = Some((batch, found));
        }
    }

    fn finish(self) -> Option<T> {
        self.best.map(|(_, found)| found)
    }
}

impl<T> ShortCircuitable for DetectCombiner<T> {
    fn decision(&self) -> Option<usize> {
        self.best.as_ref().map(|(b, _)| *b)
    }
}

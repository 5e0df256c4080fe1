/**
 * AlsReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use fnv::FnvHashMap;
use scoped_pool::Pool;

use crate::config::PredictionSettings;
use crate::error::{Error, Result};
use crate::id_index::{IdIndex, IdTranslation};
use crate::metrics::RunMetrics;
use crate::scoring::TopNScorer;
use crate::types::{BlockRecommendations, EntityId, FeatureMatrix, RecommendFilter,
                   RecommendedItem, SparseRatingVector, UserRecommendations};
use crate::utils;

/// Shared flag to stop a run. Tasks check it between users, a cancelled run never commits
/// any output.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {

    pub fn new() -> Self {
        Default::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The data owned by a single block: the merged ratings of its users, their features, and
/// the slice of the user id index if long ids are used.
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    pub user_ratings: FnvHashMap<EntityId, SparseRatingVector>,
    pub user_features: FeatureMatrix,
    pub user_index: Option<IdIndex>,
}

/// Read-only data shared by all blocks.
#[derive(Clone, Debug, Default)]
pub struct SharedData {
    pub item_features: FeatureMatrix,
    pub item_index: Option<IdIndex>,
    pub recommend_filter: Option<RecommendFilter>,
}

/// Everything a prediction task gets to see for its block.
pub struct BlockInput<'a> {
    pub block: u32,
    pub user_ratings: &'a FnvHashMap<EntityId, SparseRatingVector>,
    pub user_features: &'a FeatureMatrix,
    pub item_features: &'a FeatureMatrix,
    pub user_index: Option<&'a IdIndex>,
    pub item_index: Option<&'a IdIndex>,
    pub recommend_filter: Option<&'a RecommendFilter>,
    pub settings: PredictionSettings,
    pub metrics: &'a RunMetrics,
    pub cancellation: &'a CancellationToken,
}

/// A unit of work computing the recommendations for all users of one block. Tasks of
/// different blocks run concurrently and must not depend on each other.
pub trait BlockPredictionTask: Sync {
    fn run(&self, input: &BlockInput) -> Result<BlockRecommendations>;
}

/// Receives the recommendations of every block once all blocks have succeeded. Written blocks
/// are staged and only become visible with `commit`, `abort` discards everything staged so far.
pub trait RecommendationSink {
    fn write_block(&mut self, block: u32, recommendations: &[UserRecommendations]) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn abort(&mut self);
}

/// Keeps the recommendations in memory, keyed by block.
#[derive(Debug, Default)]
pub struct InMemorySink {
    pub blocks: FnvHashMap<u32, BlockRecommendations>,
    staged: FnvHashMap<u32, BlockRecommendations>,
}

impl InMemorySink {

    pub fn new() -> Self {
        Default::default()
    }

    pub fn num_users(&self) -> usize {
        self.blocks.values().map(|block| block.len()).sum()
    }

    pub fn recommendations_for(&self, user: i64) -> Option<&UserRecommendations> {
        self.blocks.values()
            .flat_map(|block| block.iter())
            .find(|recommendations| recommendations.user == user)
    }
}

impl RecommendationSink for InMemorySink {
    fn write_block(&mut self, block: u32, recommendations: &[UserRecommendations]) -> Result<()> {
        self.staged.insert(block, recommendations.to_vec());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.blocks = std::mem::replace(&mut self.staged, FnvHashMap::default());
        Ok(())
    }

    fn abort(&mut self) {
        self.staged.clear();
    }
}

/// Default prediction task: scores all items for each user of the block with the top-n scorer,
/// on `num_threads` worker threads.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockPredictor;

impl BlockPredictionTask for BlockPredictor {

    fn run(&self, input: &BlockInput) -> Result<BlockRecommendations> {

        let block_start = Instant::now();

        let mut users: Vec<EntityId> = input.user_ratings.keys().cloned().collect();
        users.sort();

        let num_threads = input.settings.num_threads;
        let scorer = TopNScorer::new(input.settings.num_recommendations, input.settings.max_rating);

        let results: Mutex<Vec<Result<(EntityId, UserRecommendations)>>> =
            Mutex::new(Vec::with_capacity(users.len()));

        let pool = Pool::new(num_threads.max(1));
        pool.scoped(|scope| {
            for chunk in utils::chunks_for(&users, num_threads) {
                let results = &results;
                let scorer = &scorer;
                scope.execute(move || {
                    let recommended = recommend_users(chunk, scorer, input);
                    utils::lock(results).extend(recommended);
                });
            }
        });
        pool.shutdown();

        let results = match results.into_inner() {
            Ok(results) => results,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut recommendations = results.into_iter().collect::<Result<Vec<_>>>()?;
        recommendations.sort_by_key(|&(user, _)| user);

        debug!(
            block = input.block,
            num_users = recommendations.len(),
            duration_ms = utils::to_millis(block_start.elapsed()),
            "block prediction finished"
        );

        Ok(recommendations.into_iter().map(|(_, recommendations)| recommendations).collect())
    }
}

/// Scores a chunk of users. Users without features are logged and skipped, any other problem
/// ends the chunk with an error.
fn recommend_users(
    users: &[EntityId],
    scorer: &TopNScorer,
    input: &BlockInput,
) -> Vec<Result<(EntityId, UserRecommendations)>> {

    let mut recommended = Vec::with_capacity(users.len());

    for user in users.iter() {

        if input.cancellation.is_cancelled() {
            recommended.push(Err(Error::Cancelled));
            break;
        }

        match recommend_user(*user, scorer, input) {
            Ok(recommendations) => {
                input.metrics.user_scored(recommendations.items.len());
                recommended.push(Ok((*user, recommendations)));
            },
            Err(Error::MissingFeatures { user }) => {
                warn!(block = input.block, user, "no feature vector for user, skipping");
                input.metrics.user_missing_features();
            },
            Err(error) => {
                recommended.push(Err(error));
                break;
            },
        }
    }

    recommended
}

fn recommend_user(
    user: EntityId,
    scorer: &TopNScorer,
    input: &BlockInput,
) -> Result<UserRecommendations> {

    let user_features = input.user_features.get(&user)
        .ok_or(Error::MissingFeatures { user })?;

    if !user_features.iter().all(|value| value.is_finite()) {
        return Err(Error::NonFiniteFeatures { entity: user });
    }

    // Item vectors are checked to share one dimension before any block runs
    if let Some(item_features) = input.item_features.values().next() {
        if item_features.len() != user_features.len() {
            return Err(Error::DimensionMismatch {
                entity: user,
                expected: item_features.len(),
                found: user_features.len(),
            });
        }
    }

    let rated_items = if input.settings.exclude_rated_items {
        input.user_ratings.get(&user)
    } else {
        None
    };

    let filtered_items = input.recommend_filter.and_then(|filter| filter.get(&user));

    let top_items = scorer.top_items(user_features, input.item_features, |item| {
        rated_items.map_or(false, |rated| rated.contains_key(&item))
            || filtered_items.map_or(false, |filtered| filtered.contains(&item))
    });

    let user_ids = IdTranslation::new(input.user_index);
    let item_ids = IdTranslation::new(input.item_index);

    let items = top_items.into_iter()
        .map(|scored_item| {
            Ok(RecommendedItem { item: item_ids.translate(scored_item.item)?, score: scored_item.score })
        })
        .collect::<Result<Vec<RecommendedItem>>>()?;

    Ok(UserRecommendations { user: user_ids.translate(user)?, items })
}

/// All item vectors must be finite and have the same dimension.
fn check_item_features(item_features: &FeatureMatrix) -> Result<()> {
    let mut num_features: Option<usize> = None;

    for (item, features) in item_features.iter() {
        if !features.iter().all(|value| value.is_finite()) {
            return Err(Error::NonFiniteFeatures { entity: *item });
        }

        match num_features {
            Some(expected) if expected != features.len() => {
                return Err(Error::DimensionMismatch { entity: *item, expected, found: features.len() })
            },
            None => num_features = Some(features.len()),
            _ => {},
        }
    }

    Ok(())
}

/// Blocks beyond the number of cores queue up for a free thread.
fn block_pool_size(num_blocks: usize) -> usize {
    num_blocks.min(num_cpus::get()).max(1)
}

/// Runs one prediction task per block concurrently, at most one per core, and waits for all
/// of them. The output of the run is only committed to the sink if every block succeeded and
/// every block could be written; otherwise the run fails, failed blocks are reported in sorted
/// order and nothing becomes visible.
pub fn run_blocks<T, S>(
    task: &T,
    blocks: &[BlockData],
    shared: &SharedData,
    settings: PredictionSettings,
    sink: &mut S,
    metrics: &RunMetrics,
    cancellation: &CancellationToken,
) -> Result<()>
    where T: BlockPredictionTask, S: RecommendationSink {

    if cancellation.is_cancelled() {
        return Err(Error::Cancelled);
    }

    check_item_features(&shared.item_features)?;

    let run_start = Instant::now();

    info!(num_blocks = blocks.len(), "starting block prediction tasks");

    let results: Mutex<Vec<(u32, Result<BlockRecommendations>)>> =
        Mutex::new(Vec::with_capacity(blocks.len()));

    let pool = Pool::new(block_pool_size(blocks.len()));
    pool.scoped(|scope| {
        for (block, data) in blocks.iter().enumerate() {
            let results = &results;
            scope.execute(move || {
                let input = BlockInput {
                    block: block as u32,
                    user_ratings: &data.user_ratings,
                    user_features: &data.user_features,
                    item_features: &shared.item_features,
                    user_index: data.user_index.as_ref(),
                    item_index: shared.item_index.as_ref(),
                    recommend_filter: shared.recommend_filter.as_ref(),
                    settings,
                    metrics,
                    cancellation,
                };

                let result = task.run(&input);
                utils::lock(results).push((block as u32, result));
            });
        }
    });
    pool.shutdown();

    let mut results = match results.into_inner() {
        Ok(results) => results,
        Err(poisoned) => poisoned.into_inner(),
    };
    results.sort_by_key(|&(block, _)| block);

    if cancellation.is_cancelled() {
        warn!("run was cancelled, discarding the output of all blocks");
        return Err(Error::Cancelled);
    }

    let mut failed_blocks = Vec::new();
    for &(block, ref result) in results.iter() {
        metrics.block_finished(result.is_ok());
        if let Err(ref error) = *result {
            error!(block, %error, "block prediction task failed");
            failed_blocks.push(block);
        }
    }

    if !failed_blocks.is_empty() {
        return Err(Error::PartialFailure { failed_blocks });
    }

    let committed = results.into_iter()
        .try_for_each(|(block, result)| sink.write_block(block, &result?))
        .and_then(|_| sink.commit());

    if let Err(error) = committed {
        error!(%error, "unable to write recommendations, discarding the output of all blocks");
        sink.abort();
        return Err(error);
    }

    info!(
        num_blocks = blocks.len(),
        duration_ms = utils::to_millis(run_start.elapsed()),
        "all block prediction tasks finished"
    );

    Ok(())
}

#[cfg(test)]
mod tests {

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use fnv::{FnvHashMap, FnvHashSet};

    use crate::config::PredictionSettings;
    use crate::error::{Error, Result};
    use crate::id_index::IdIndex;
    use crate::metrics::RunMetrics;
    use crate::types::{self, BlockRecommendations, SparseRatingVector, UserRecommendations};
    use super::{BlockData, BlockInput, BlockPredictionTask, BlockPredictor, CancellationToken,
                InMemorySink, RecommendationSink, SharedData, run_blocks};

    fn settings() -> PredictionSettings {
        PredictionSettings {
            num_recommendations: 2,
            max_rating: 5.0,
            num_threads: 2,
            exclude_rated_items: true,
        }
    }

    fn ratings(items: &[u32]) -> SparseRatingVector {
        items.iter().map(|item| (*item, 1.0)).collect()
    }

    /// Five blocks with users 0..10 (user u lives in block u % 5), each rated item 0.
    fn five_blocks() -> (Vec<BlockData>, SharedData) {
        let mut blocks: Vec<BlockData> = (0..5).map(|_| BlockData::default()).collect();
        for user in 0..10_u32 {
            let block = &mut blocks[(user % 5) as usize];
            block.user_ratings.insert(user, ratings(&[0]));
            block.user_features.insert(user, vec![1.0, user as f64]);
        }

        let mut item_features = types::new_feature_matrix(4);
        item_features.insert(0, vec![10.0, 10.0]);
        item_features.insert(1, vec![1.0, 0.0]);
        item_features.insert(2, vec![0.0, 0.5]);
        item_features.insert(3, vec![0.1, 0.1]);

        (blocks, SharedData { item_features, ..Default::default() })
    }

    struct FailingBlock {
        failing: u32,
    }

    impl BlockPredictionTask for FailingBlock {
        fn run(&self, input: &BlockInput) -> Result<BlockRecommendations> {
            if input.block == self.failing {
                Err(Error::Configuration(String::from("simulated failure")))
            } else {
                BlockPredictor.run(input)
            }
        }
    }

    #[test]
    fn all_blocks_succeed() {
        let (blocks, shared) = five_blocks();
        let metrics = RunMetrics::new();
        let mut sink = InMemorySink::new();

        run_blocks(&BlockPredictor, &blocks, &shared, settings(), &mut sink, &metrics,
            &CancellationToken::new()).unwrap();

        assert_eq!(sink.blocks.len(), 5);
        assert_eq!(sink.num_users(), 10);

        // Item 0 was rated by everyone and must not come back
        for block in sink.blocks.values() {
            for recommendations in block.iter() {
                assert!(recommendations.items.iter().all(|item| item.item != 0));
            }
        }

        // User 4 scores item 2 with 2.0 and item 1 with 1.0
        let user_four = sink.recommendations_for(4).unwrap();
        assert_eq!(user_four.items[0].item, 2);
        assert_eq!(user_four.items[0].score, 2.0);
        assert_eq!(user_four.items[1].item, 1);

        // Users within a block are ordered
        let block_one: Vec<i64> = sink.blocks[&1].iter().map(|r| r.user).collect();
        assert_eq!(block_one, vec![1, 6]);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.users_scored, 10);
        assert_eq!(snapshot.blocks_succeeded, 5);
        assert_eq!(snapshot.blocks_failed, 0);
    }

    #[test]
    fn one_failing_block_fails_the_run_without_output() {
        let (blocks, shared) = five_blocks();
        let metrics = RunMetrics::new();
        let mut sink = InMemorySink::new();

        let result = run_blocks(&FailingBlock { failing: 2 }, &blocks, &shared, settings(),
            &mut sink, &metrics, &CancellationToken::new());

        match result {
            Err(Error::PartialFailure { failed_blocks }) => assert_eq!(failed_blocks, vec![2]),
            other => panic!("expected partial failure, got {:?}", other),
        }

        assert!(sink.blocks.is_empty());
        assert_eq!(metrics.snapshot().blocks_failed, 1);
        assert_eq!(metrics.snapshot().blocks_succeeded, 4);
    }

    #[test]
    fn missing_features_skip_only_the_user() {
        let (mut blocks, shared) = five_blocks();
        blocks[3].user_features.remove(&8);

        let metrics = RunMetrics::new();
        let mut sink = InMemorySink::new();

        run_blocks(&BlockPredictor, &blocks, &shared, settings(), &mut sink, &metrics,
            &CancellationToken::new()).unwrap();

        assert_eq!(sink.blocks[&3].len(), 1);
        assert_eq!(sink.blocks[&3][0].user, 3);
        assert!(sink.recommendations_for(8).is_none());
        assert_eq!(metrics.snapshot().users_missing_features, 1);
    }

    #[test]
    fn filtered_items_are_never_recommended() {
        let (blocks, mut shared) = five_blocks();

        let mut filtered = FnvHashSet::default();
        filtered.insert(2_u32);
        let mut filter = FnvHashMap::default();
        filter.insert(4_u32, filtered);
        shared.recommend_filter = Some(filter);

        let mut sink = InMemorySink::new();
        run_blocks(&BlockPredictor, &blocks, &shared, settings(), &mut sink, &RunMetrics::new(),
            &CancellationToken::new()).unwrap();

        let user_four = sink.recommendations_for(4).unwrap();
        assert_eq!(user_four.items.len(), 2);
        assert!(user_four.items.iter().all(|item| item.item != 2));

        // Other users are not affected by the filter of user 4
        let user_nine = sink.recommendations_for(9).unwrap();
        assert_eq!(user_nine.items[0].item, 2);
    }

    #[test]
    fn ids_are_translated() {
        let (mut blocks, mut shared) = five_blocks();

        for (block, data) in blocks.iter_mut().enumerate() {
            let pairs = vec![(block as u32, 1000 + block as i64), (block as u32 + 5, 2000 + block as i64)];
            data.user_index = Some(IdIndex::from_pairs(pairs).unwrap());
        }
        shared.item_index = Some(IdIndex::from_pairs((0..4).map(|item| (item, -i64::from(item) - 1))).unwrap());

        let mut sink = InMemorySink::new();
        run_blocks(&BlockPredictor, &blocks, &shared, settings(), &mut sink, &RunMetrics::new(),
            &CancellationToken::new()).unwrap();

        // Internal user 4 is external user 1004, internal item 2 is external item -3
        let user_four = sink.recommendations_for(1004).unwrap();
        assert_eq!(user_four.items[0].item, -3);
        assert!(sink.recommendations_for(4).is_none());
    }

    #[test]
    fn unknown_ids_fail_the_block() {
        let (mut blocks, shared) = five_blocks();
        blocks[1].user_index = Some(IdIndex::from_pairs(vec![(1, 100)]).unwrap());

        let mut sink = InMemorySink::new();
        let result = run_blocks(&BlockPredictor, &blocks, &shared, settings(), &mut sink,
            &RunMetrics::new(), &CancellationToken::new());

        match result {
            Err(Error::PartialFailure { failed_blocks }) => assert_eq!(failed_blocks, vec![1]),
            other => panic!("expected partial failure, got {:?}", other),
        }
        assert!(sink.blocks.is_empty());
    }

    #[test]
    fn cancelled_runs_write_nothing() {
        let (blocks, shared) = five_blocks();
        let cancellation = CancellationToken::new();
        cancellation.clone().cancel();

        let mut sink = InMemorySink::new();
        match run_blocks(&BlockPredictor, &blocks, &shared, settings(), &mut sink,
            &RunMetrics::new(), &cancellation) {
            Err(Error::Cancelled) => {},
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert!(sink.blocks.is_empty());
    }

    struct CancellingBlock {
        cancellation: CancellationToken,
    }

    impl BlockPredictionTask for CancellingBlock {
        fn run(&self, input: &BlockInput) -> Result<BlockRecommendations> {
            if input.block == 0 {
                self.cancellation.cancel();
            }
            BlockPredictor.run(input)
        }
    }

    #[test]
    fn cancellation_during_the_run_discards_finished_blocks() {
        let (blocks, shared) = five_blocks();
        let cancellation = CancellationToken::new();
        let task = CancellingBlock { cancellation: cancellation.clone() };

        let mut sink = InMemorySink::new();
        match run_blocks(&task, &blocks, &shared, settings(), &mut sink, &RunMetrics::new(),
            &cancellation) {
            Err(Error::Cancelled) => {},
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert!(sink.blocks.is_empty());
    }

    /// Stages like the in-memory sink but cannot write one of the blocks.
    struct UnwritableBlockSink {
        unwritable: u32,
        inner: InMemorySink,
        aborted: bool,
    }

    impl RecommendationSink for UnwritableBlockSink {

        fn write_block(&mut self, block: u32, recommendations: &[UserRecommendations]) -> Result<()> {
            if block == self.unwritable {
                return Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")));
            }
            self.inner.write_block(block, recommendations)
        }

        fn commit(&mut self) -> Result<()> {
            self.inner.commit()
        }

        fn abort(&mut self) {
            self.aborted = true;
            self.inner.abort();
        }
    }

    #[test]
    fn failing_writes_discard_the_written_blocks() {
        let (blocks, shared) = five_blocks();
        let mut sink = UnwritableBlockSink { unwritable: 3, inner: InMemorySink::new(), aborted: false };

        match run_blocks(&BlockPredictor, &blocks, &shared, settings(), &mut sink,
            &RunMetrics::new(), &CancellationToken::new()) {
            Err(Error::Io(_)) => {},
            other => panic!("expected io error, got {:?}", other),
        }

        assert!(sink.aborted);
        assert!(sink.inner.blocks.is_empty());

        // Nothing staged survives into a later commit either
        sink.inner.commit().unwrap();
        assert!(sink.inner.blocks.is_empty());
    }

    #[test]
    fn non_finite_item_features_fail_before_any_block_runs() {
        let (blocks, mut shared) = five_blocks();
        shared.item_features.insert(1, vec![std::f64::NAN, 0.0]);

        let metrics = RunMetrics::new();
        let mut sink = InMemorySink::new();

        match run_blocks(&BlockPredictor, &blocks, &shared, settings(), &mut sink, &metrics,
            &CancellationToken::new()) {
            Err(Error::NonFiniteFeatures { entity }) => assert_eq!(entity, 1),
            other => panic!("expected non-finite features, got {:?}", other),
        }

        assert!(sink.blocks.is_empty());
        assert_eq!(metrics.snapshot().users_scored, 0);
    }

    #[test]
    fn non_finite_user_features_fail_the_block() {
        let (mut blocks, shared) = five_blocks();
        blocks[2].user_features.insert(7, vec![std::f64::INFINITY, 1.0]);

        let mut sink = InMemorySink::new();
        match run_blocks(&BlockPredictor, &blocks, &shared, settings(), &mut sink,
            &RunMetrics::new(), &CancellationToken::new()) {
            Err(Error::PartialFailure { failed_blocks }) => assert_eq!(failed_blocks, vec![2]),
            other => panic!("expected partial failure, got {:?}", other),
        }
        assert!(sink.blocks.is_empty());
    }

    #[test]
    fn item_features_of_mixed_dimension_are_rejected() {
        let (blocks, mut shared) = five_blocks();
        shared.item_features.insert(4, vec![1.0, 1.0, 1.0]);

        let mut sink = InMemorySink::new();
        match run_blocks(&BlockPredictor, &blocks, &shared, settings(), &mut sink,
            &RunMetrics::new(), &CancellationToken::new()) {
            Err(Error::DimensionMismatch { .. }) => {},
            other => panic!("expected dimension mismatch, got {:?}", other),
        }
        assert!(sink.blocks.is_empty());
    }

    /// Records how many blocks run at the same time.
    #[derive(Default)]
    struct CountingBlock {
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl BlockPredictionTask for CountingBlock {
        fn run(&self, input: &BlockInput) -> Result<BlockRecommendations> {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            self.running.fetch_sub(1, Ordering::SeqCst);

            BlockPredictor.run(input)
        }
    }

    #[test]
    fn many_blocks_share_a_bounded_pool() {
        let (_, shared) = five_blocks();
        let num_blocks = num_cpus::get() * 8;

        let blocks: Vec<BlockData> = (0..num_blocks as u32)
            .map(|block| {
                let mut data = BlockData::default();
                data.user_ratings.insert(block, ratings(&[0]));
                data.user_features.insert(block, vec![1.0, 1.0]);
                data
            })
            .collect();

        let task = CountingBlock::default();
        let mut sink = InMemorySink::new();
        run_blocks(&task, &blocks, &shared, settings(), &mut sink, &RunMetrics::new(),
            &CancellationToken::new()).unwrap();

        assert_eq!(sink.blocks.len(), num_blocks);
        assert!(task.max_running.load(Ordering::SeqCst) <= num_cpus::get());
    }
}

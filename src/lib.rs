extern crate csv;
extern crate fnv;
extern crate num_cpus;
extern crate scoped_pool;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
#[macro_use]
extern crate tracing;

use std::time::Instant;

pub mod blocks;
pub mod config;
pub mod contribution;
pub mod controller;
pub mod error;
pub mod id_index;
pub mod io;
pub mod merge;
pub mod metrics;
pub mod scoring;
pub mod types;
pub mod utils;

pub use blocks::{assign_block, BlockAssigner};
pub use config::{PredictionSettings, RecommenderConfig};
pub use contribution::{CholeskySolver, Contribution, ContributionCombiner, Solver};
pub use controller::{BlockData, BlockInput, BlockPredictionTask, BlockPredictor,
                     CancellationToken, InMemorySink, RecommendationSink, SharedData};
pub use error::{Error, Result};
pub use id_index::IdIndex;
pub use metrics::{MetricsSnapshot, RunMetrics};

use crate::types::{FeatureMatrix, Rating, RecommendFilter};

/// The inputs of a recommendation run. Ratings may be partitioned arbitrarily.
#[derive(Clone, Debug, Default)]
pub struct RecommenderInputs {
    pub ratings: Vec<Vec<Rating>>,
    pub user_features: FeatureMatrix,
    pub item_features: FeatureMatrix,
    pub user_index: Option<IdIndex>,
    pub item_index: Option<IdIndex>,
    pub recommend_filter: Option<RecommendFilter>,
}

/// Computes the top-n recommendations for every user with ratings. First merges the ratings
/// into one vector per user, grouped by the user's block, then runs one prediction task per
/// block. Nothing is written to the sink unless every block succeeds.
pub fn recommend<S: RecommendationSink>(
    config: &RecommenderConfig,
    inputs: RecommenderInputs,
    merge_pool_size: usize,
    sink: &mut S,
    metrics: &RunMetrics,
    cancellation: &CancellationToken,
) -> Result<()> {

    let (assigner, settings) = config.validate()?;

    let (user_index, item_index) = if config.uses_long_ids {
        match (inputs.user_index, inputs.item_index) {
            (Some(user_index), Some(item_index)) => (Some(user_index), Some(item_index)),
            _ => return Err(Error::Configuration(
                String::from("usesLongIDs requires a user and an item id index"))),
        }
    } else {
        (None, None)
    };

    let run_start = Instant::now();

    let ratings_by_block =
        merge::merge_user_vectors(&inputs.ratings, &assigner, merge_pool_size, metrics)?;

    if cancellation.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let feature_slices = assigner.slice_by_block(inputs.user_features);

    let blocks: Vec<BlockData> = ratings_by_block.into_blocks()
        .into_iter()
        .zip(feature_slices.into_iter())
        .enumerate()
        .map(|(block, (user_ratings, user_features))| {
            let user_index = user_index.as_ref()
                .map(|index| index.retain(|user| assigner.block_of(user) == block as u32));

            BlockData { user_ratings, user_features, user_index }
        })
        .collect();

    let shared = SharedData {
        item_features: inputs.item_features,
        item_index,
        recommend_filter: inputs.recommend_filter,
    };

    controller::run_blocks(&BlockPredictor, &blocks, &shared, settings, sink, metrics, cancellation)?;

    let summary = metrics.snapshot();
    info!(
        users_merged = summary.users_merged,
        users_scored = summary.users_scored,
        users_missing_features = summary.users_missing_features,
        recommendations_emitted = summary.recommendations_emitted,
        duration_ms = utils::to_millis(run_start.elapsed()),
        "recommendation run finished"
    );

    Ok(())
}

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

use std::collections::hash_map::Entry;
use std::sync::Mutex;
use std::time::Instant;

use fnv::FnvHashMap;
use scoped_pool::Pool;

use crate::blocks::BlockAssigner;
use crate::error::{Error, Result};
use crate::metrics::RunMetrics;
use crate::types::{self, EntityId, Rating, SparseRatingVector};
use crate::utils;

/// Merged rating vectors of all users, one partition per block.
#[derive(Debug)]
pub struct UserRatingsByBlock {
    blocks: Vec<FnvHashMap<EntityId, SparseRatingVector>>,
}

impl UserRatingsByBlock {

    pub fn new(assigner: &BlockAssigner) -> Self {
        let blocks = assigner.blocks().map(|_| FnvHashMap::default()).collect();
        UserRatingsByBlock { blocks }
    }

    pub fn write(&mut self, block: u32, user: EntityId, ratings: SparseRatingVector) {
        self.blocks[block as usize].insert(user, ratings);
    }

    pub fn block(&self, block: u32) -> &FnvHashMap<EntityId, SparseRatingVector> {
        &self.blocks[block as usize]
    }

    pub fn num_blocks(&self) -> u32 {
        self.blocks.len() as u32
    }

    pub fn num_users(&self) -> usize {
        self.blocks.iter().map(|block| block.len()).sum()
    }

    pub fn into_blocks(self) -> Vec<FnvHashMap<EntityId, SparseRatingVector>> {
        self.blocks
    }
}

/// Adds the entries of `partial` to `target`. Observing the same counterpart twice means that
/// the input contains duplicates, which we refuse to resolve silently.
pub fn merge_into(
    target: &mut SparseRatingVector,
    entity: EntityId,
    partial: SparseRatingVector,
) -> Result<()> {

    for (counterpart, rating) in partial.into_iter() {
        match target.entry(counterpart) {
            Entry::Occupied(_) => return Err(Error::DataIntegrity { entity, counterpart }),
            Entry::Vacant(entry) => { entry.insert(rating); },
        }
    }

    Ok(())
}

pub fn merge_vectors(
    entity: EntityId,
    first: SparseRatingVector,
    second: SparseRatingVector,
) -> Result<SparseRatingVector> {

    // Always copy the smaller vector into the larger one
    let (mut larger, smaller) = if first.len() >= second.len() {
        (first, second)
    } else {
        (second, first)
    };

    merge_into(&mut larger, entity, smaller)?;
    Ok(larger)
}

/// Local pre-merge of a single input partition, applied before partials of different
/// partitions are brought together.
pub fn combine_partition(partition: &[Rating]) -> Result<FnvHashMap<EntityId, SparseRatingVector>> {

    let mut partials: FnvHashMap<EntityId, SparseRatingVector> = FnvHashMap::default();

    for rating in partition.iter() {
        let vector = partials.entry(rating.user)
            .or_insert_with(|| types::new_sparse_rating_vector(10));

        match vector.entry(rating.item) {
            Entry::Occupied(_) => {
                return Err(Error::DataIntegrity { entity: rating.user, counterpart: rating.item })
            },
            Entry::Vacant(entry) => { entry.insert(rating.value); },
        }
    }

    Ok(partials)
}

/// Splits a stream of ratings into `num_partitions` partitions of similar size.
pub fn partition_ratings(ratings: &[Rating], num_partitions: usize) -> Vec<Vec<Rating>> {
    utils::chunks_for(ratings, num_partitions)
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Builds one rating vector per user from arbitrarily partitioned ratings and routes it to the
/// partition of the user's block. Partitions are pre-merged in parallel on `pool_size` threads.
pub fn merge_user_vectors(
    partitions: &[Vec<Rating>],
    assigner: &BlockAssigner,
    pool_size: usize,
    metrics: &RunMetrics,
) -> Result<UserRatingsByBlock> {

    let merge_start = Instant::now();

    let pool = Pool::new(pool_size.max(1));
    let partials: Mutex<Vec<(usize, Result<FnvHashMap<EntityId, SparseRatingVector>>)>> =
        Mutex::new(Vec::with_capacity(partitions.len()));

    pool.scoped(|scope| {
        for (index, partition) in partitions.iter().enumerate() {
            let partials = &partials;
            scope.execute(move || {
                let combined = combine_partition(partition);
                utils::lock(partials).push((index, combined));
            });
        }
    });
    pool.shutdown();

    let mut partials = match partials.into_inner() {
        Ok(partials) => partials,
        Err(poisoned) => poisoned.into_inner(),
    };
    // Report the same conflict regardless of thread timing
    partials.sort_by_key(|&(index, _)| index);

    let mut merged: FnvHashMap<EntityId, SparseRatingVector> = FnvHashMap::default();

    for (_, partial) in partials.into_iter() {
        for (user, vector) in partial?.into_iter() {
            match merged.entry(user) {
                Entry::Occupied(mut entry) => merge_into(entry.get_mut(), user, vector)?,
                Entry::Vacant(entry) => { entry.insert(vector); },
            }
        }
    }

    let mut ratings_by_block = UserRatingsByBlock::new(assigner);

    for (user, vector) in merged.into_iter() {
        ratings_by_block.write(assigner.block_of(user), user, vector);
        metrics.user_merged();
    }

    info!(
        num_users = ratings_by_block.num_users(),
        num_blocks = assigner.num_blocks(),
        duration_ms = utils::to_millis(merge_start.elapsed()),
        "merged user rating vectors"
    );

    Ok(ratings_by_block)
}

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

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::types::{self, EntityId, FeatureMatrix};

/// Result type used to find the top-n items per user via a binary heap
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ScoredItem {
    pub item: EntityId,
    pub score: f64,
}

/// Ordering for our max-heap: better items compare as smaller, so that the top of the heap is
/// the worst item retained so far. Higher scores are better, equal scores prefer the smaller
/// item id. There is no total order on floating point numbers, NaN compares as equal.
fn cmp_reverse(scored_item_a: &ScoredItem, scored_item_b: &ScoredItem) -> Ordering {
    match scored_item_a.score.partial_cmp(&scored_item_b.score) {
        Some(Ordering::Less) => Ordering::Greater,
        Some(Ordering::Greater) => Ordering::Less,
        _ => scored_item_a.item.cmp(&scored_item_b.item),
    }
}

impl Eq for ScoredItem {}

impl Ord for ScoredItem {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_reverse(self, other)
    }
}

impl PartialOrd for ScoredItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(cmp_reverse(self, other))
    }
}

/// Scores candidate items for a user by the dot product of their latent factors.
#[derive(Clone, Copy, Debug)]
pub struct TopNScorer {
    num_recommendations: usize,
    max_rating: f64,
}

impl TopNScorer {

    pub fn new(num_recommendations: usize, max_rating: f64) -> Self {
        TopNScorer { num_recommendations, max_rating }
    }

    /// Returns the best `num_recommendations` items for the user, best first. Items for which
    /// `is_excluded` holds are never considered, and neither are items whose score is NaN.
    pub fn top_items<F>(
        &self,
        user_features: &[f64],
        item_features: &FeatureMatrix,
        is_excluded: F,
    ) -> Vec<ScoredItem>
        where F: Fn(EntityId) -> bool {

        let n = self.num_recommendations;
        if n == 0 {
            return Vec::new();
        }

        let mut heap: BinaryHeap<ScoredItem> = BinaryHeap::with_capacity(n);

        for (item, features) in item_features.iter() {

            if is_excluded(*item) {
                continue;
            }

            let score = types::dot(user_features, features);
            if score.is_nan() {
                continue;
            }

            // Capped at the top of the rating scale, there is no lower bound
            let scored_item = ScoredItem { item: *item, score: score.min(self.max_rating) };

            if heap.len() < n {
                heap.push(scored_item);
            } else if let Some(mut top) = heap.peek_mut() {
                if scored_item < *top {
                    *top = scored_item;
                }
            }
        }

        heap.into_sorted_vec()
    }
}

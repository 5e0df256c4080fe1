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

use fnv::{FnvHashMap, FnvHashSet};

/// Internal, consecutive identifier of a user or an item.
pub type EntityId = u32;

/// External identifier of a user or an item, as found in the raw data.
pub type ExternalId = i64;

pub type DenseVector = Vec<f64>;

/// Ratings of a single entity, keyed by the counterpart entity.
pub type SparseRatingVector = FnvHashMap<EntityId, f64>;

/// Dense latent factors per entity, all of the same dimension.
pub type FeatureMatrix = FnvHashMap<EntityId, DenseVector>;

/// Items which must never be recommended to a given user.
pub type RecommendFilter = FnvHashMap<EntityId, FnvHashSet<EntityId>>;

/// A single observed rating of an item by a user.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rating {
    pub user: EntityId,
    pub item: EntityId,
    pub value: f64,
}

impl Rating {
    pub fn new(user: EntityId, item: EntityId, value: f64) -> Self {
        Rating { user, item, value }
    }
}

/// A recommended item together with its (capped) predicted rating.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RecommendedItem {
    pub item: ExternalId,
    pub score: f64,
}

/// The ranked recommendations for a single user, best item first.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserRecommendations {
    pub user: ExternalId,
    pub items: Vec<RecommendedItem>,
}

/// All recommendations computed for the users of one block, ordered by user.
pub type BlockRecommendations = Vec<UserRecommendations>;

pub fn new_sparse_rating_vector(capacity: usize) -> SparseRatingVector {
    FnvHashMap::with_capacity_and_hasher(capacity, Default::default())
}

pub fn new_feature_matrix(capacity: usize) -> FeatureMatrix {
    FnvHashMap::with_capacity_and_hasher(capacity, Default::default())
}

#[inline(always)]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

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

use fnv::FnvHashMap;
use scoped_pool::Pool;

use crate::error::{Error, Result};
use crate::types::{self, DenseVector, EntityId, FeatureMatrix};
use crate::utils;

/// Sufficient statistics of a least squares problem for one entity: the Gram matrix `a`
/// (k x k, row-major) and the right-hand side `b` (k). Contributions form a commutative monoid
/// under element-wise addition with the all-zero contribution as identity.
#[derive(Clone, Debug, PartialEq)]
pub struct Contribution {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl Contribution {

    pub fn zero(num_features: usize) -> Self {
        Contribution {
            a: vec![0.0; num_features * num_features],
            b: vec![0.0; num_features],
        }
    }

    /// Contribution of a single observation `rating` for counterpart `features`, i.e. the
    /// outer product x xᵀ and the scaled vector r x.
    pub fn from_observation(features: &[f64], rating: f64) -> Self {
        let k = features.len();
        let mut a = vec![0.0; k * k];

        for row in 0..k {
            let scale = features[row];
            for (cell, value) in a[row * k..(row + 1) * k].iter_mut().zip(features.iter()) {
                *cell = scale * value;
            }
        }

        let b = features.iter().map(|value| rating * value).collect();

        Contribution { a, b }
    }

    pub fn num_features(&self) -> usize {
        self.b.len()
    }

    fn add_assign(&mut self, other: &Contribution) {
        for (sum, value) in self.a.iter_mut().zip(other.a.iter()) {
            *sum += value;
        }
        for (sum, value) in self.b.iter_mut().zip(other.b.iter()) {
            *sum += value;
        }
    }
}

/// Reduces contributions per key. The same operator serves as local pre-aggregation and as
/// final aggregation, so any partial result may be fed back into `combine`.
#[derive(Clone, Copy, Debug)]
pub struct ContributionCombiner {
    num_features: usize,
}

impl ContributionCombiner {

    pub fn new(num_features: i64) -> Result<Self> {
        if num_features <= 0 {
            return Err(Error::Configuration(
                format!("numFeatures must be greater than 0, got {}", num_features)));
        }

        Ok(ContributionCombiner { num_features: num_features as usize })
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    fn check(&self, key: EntityId, contribution: &Contribution) -> Result<()> {
        let k = self.num_features;
        if contribution.b.len() != k || contribution.a.len() != k * k {
            return Err(Error::DimensionMismatch {
                entity: key,
                expected: k,
                found: contribution.b.len(),
            });
        }
        Ok(())
    }

    pub fn combine<'a, I>(&self, key: EntityId, contributions: I) -> Result<Contribution>
        where I: IntoIterator<Item=&'a Contribution> {

        let mut combined = Contribution::zero(self.num_features);

        for contribution in contributions {
            self.check(key, contribution)?;
            combined.add_assign(contribution);
        }

        Ok(combined)
    }

    /// Pre-reduces each partition independently on the pool, then reduces the partial results.
    pub fn combine_partitioned(
        &self,
        key: EntityId,
        partitions: &[Vec<Contribution>],
        pool: &Pool,
    ) -> Result<Contribution> {

        let partials: Mutex<Vec<Result<Contribution>>> =
            Mutex::new(Vec::with_capacity(partitions.len()));

        pool.scoped(|scope| {
            for partition in partitions.iter() {
                let partials = &partials;
                scope.execute(move || {
                    let partial = self.combine(key, partition.iter());
                    utils::lock(partials).push(partial);
                });
            }
        });

        let partials = match partials.into_inner() {
            Ok(partials) => partials,
            Err(poisoned) => poisoned.into_inner(),
        };

        let partials = partials.into_iter().collect::<Result<Vec<Contribution>>>()?;
        self.combine(key, partials.iter())
    }

    /// Reduces a stream of keyed contributions to a single contribution per key.
    pub fn combine_by_key<I>(&self, records: I) -> Result<FnvHashMap<EntityId, Contribution>>
        where I: IntoIterator<Item=(EntityId, Contribution)> {

        let mut combined: FnvHashMap<EntityId, Contribution> = FnvHashMap::default();

        for (key, contribution) in records {
            self.check(key, &contribution)?;
            match combined.entry(key) {
                Entry::Occupied(mut entry) => entry.get_mut().add_assign(&contribution),
                Entry::Vacant(entry) => { entry.insert(contribution); },
            }
        }

        Ok(combined)
    }
}

/// Turns the sufficient statistics of an entity into its refined feature vector.
pub trait Solver: Sync {
    fn solve(&self, key: EntityId, contribution: &Contribution) -> Result<DenseVector>;
}

/// Solves the regularized normal equations (A + λI) x = b via a Cholesky decomposition.
#[derive(Clone, Copy, Debug)]
pub struct CholeskySolver {
    pub lambda: f64,
}

impl Solver for CholeskySolver {

    fn solve(&self, key: EntityId, contribution: &Contribution) -> Result<DenseVector> {
        let k = contribution.num_features();

        if contribution.a.len() != k * k {
            return Err(Error::DimensionMismatch { entity: key, expected: k * k, found: contribution.a.len() });
        }
        if !contribution.a.iter().chain(contribution.b.iter()).all(|value| value.is_finite()) {
            return Err(Error::Unsolvable(key));
        }

        let mut a = contribution.a.clone();

        for diagonal in 0..k {
            a[diagonal * k + diagonal] += self.lambda;
        }

        // In-place lower triangular factor L with A = L Lᵀ
        for column in 0..k {
            let mut pivot = a[column * k + column];
            for j in 0..column {
                pivot -= a[column * k + j] * a[column * k + j];
            }
            // Also rejects NaN pivots
            if !(pivot > 1e-12) {
                return Err(Error::Unsolvable(key));
            }
            let pivot = pivot.sqrt();
            a[column * k + column] = pivot;

            for row in (column + 1)..k {
                let mut value = a[row * k + column];
                for j in 0..column {
                    value -= a[row * k + j] * a[column * k + j];
                }
                a[row * k + column] = value / pivot;
            }
        }

        // Forward substitution L y = b, then backward substitution Lᵀ x = y
        let mut x = contribution.b.clone();
        for row in 0..k {
            for j in 0..row {
                x[row] -= a[row * k + j] * x[j];
            }
            x[row] /= a[row * k + row];
        }
        for row in (0..k).rev() {
            for j in (row + 1)..k {
                x[row] -= a[j * k + row] * x[j];
            }
            x[row] /= a[row * k + row];
        }

        Ok(x)
    }
}

/// Applies the solver to the combined statistics of every key, on `num_threads` threads.
pub fn refine_features<S: Solver>(
    combined: &FnvHashMap<EntityId, Contribution>,
    solver: &S,
    num_threads: usize,
) -> Result<FeatureMatrix> {

    let keys: Vec<EntityId> = combined.keys().cloned().collect();
    let solved: Mutex<Vec<Result<(EntityId, DenseVector)>>> = Mutex::new(Vec::with_capacity(keys.len()));

    let pool = Pool::new(num_threads.max(1));
    pool.scoped(|scope| {
        for chunk in utils::chunks_for(&keys, num_threads) {
            let solved = &solved;
            scope.execute(move || {
                let results: Vec<Result<(EntityId, DenseVector)>> = chunk.iter()
                    .map(|key| solver.solve(*key, &combined[key]).map(|features| (*key, features)))
                    .collect();
                utils::lock(solved).extend(results);
            });
        }
    });
    pool.shutdown();

    let solved = match solved.into_inner() {
        Ok(solved) => solved,
        Err(poisoned) => poisoned.into_inner(),
    };

    let mut features = types::new_feature_matrix(solved.len());
    for result in solved.into_iter() {
        let (key, vector) = result?;
        features.insert(key, vector);
    }

    Ok(features)
}

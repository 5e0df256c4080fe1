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

use fnv::FnvHashMap;

use crate::error::{Error, Result};
use crate::types::EntityId;

/// Maps a user to its block. The prediction task of a block only sees the data of its own
/// users, so the merge stage and the prediction stage must agree on this mapping.
pub fn assign_block(user: EntityId, num_blocks: i64) -> Result<u32> {
    let assigner = BlockAssigner::new(num_blocks)?;
    Ok(assigner.block_of(user))
}

/// Validated block count, used in loops so that the count is not re-checked per user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockAssigner {
    num_blocks: u32,
}

impl BlockAssigner {

    pub fn new(num_blocks: i64) -> Result<Self> {
        if num_blocks <= 0 || num_blocks > i64::from(u32::max_value()) {
            return Err(Error::Configuration(
                format!("numBlocks must be in [1, {}], got {}", u32::max_value(), num_blocks)));
        }

        Ok(BlockAssigner { num_blocks: num_blocks as u32 })
    }

    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    #[inline(always)]
    pub fn block_of(&self, user: EntityId) -> u32 {
        user % self.num_blocks
    }

    pub fn blocks(&self) -> std::ops::Range<u32> {
        0..self.num_blocks
    }

    /// Partitions values keyed by user id into one map per block.
    pub fn slice_by_block<V>(&self, values: FnvHashMap<EntityId, V>) -> Vec<FnvHashMap<EntityId, V>> {
        let mut slices: Vec<FnvHashMap<EntityId, V>> = self.blocks()
            .map(|_| FnvHashMap::default())
            .collect();

        for (user, value) in values.into_iter() {
            slices[self.block_of(user) as usize].insert(user, value);
        }

        slices
    }
}

#[cfg(test)]
mod tests {

    use fnv::FnvHashMap;

    use crate::error::Error;
    use super::{assign_block, BlockAssigner};

    #[test]
    fn rejects_non_positive_block_counts() {
        match assign_block(7, 0) {
            Err(Error::Configuration(_)) => {},
            other => panic!("expected configuration error, got {:?}", other),
        }

        assert!(BlockAssigner::new(-3).is_err());
    }

    #[test]
    fn assignment_is_deterministic_and_in_range() {
        let assigner = BlockAssigner::new(7).unwrap();

        for user in 0..1_000 {
            let block = assigner.block_of(user);
            assert!(block < 7);
            assert_eq!(block, assigner.block_of(user));
            assert_eq!(block, assign_block(user, 7).unwrap());
        }

        assert_eq!(assign_block(u32::max_value(), 1).unwrap(), 0);
    }

    #[test]
    fn slicing_colocates_with_assignment() {
        let assigner = BlockAssigner::new(3).unwrap();

        let mut features = FnvHashMap::default();
        for user in 0..20_u32 {
            features.insert(user, vec![user as f64]);
        }

        let slices = assigner.slice_by_block(features);
        assert_eq!(slices.len(), 3);

        let mut num_users = 0;
        for (block, slice) in slices.iter().enumerate() {
            for user in slice.keys() {
                assert_eq!(assigner.block_of(*user), block as u32);
            }
            num_users += slice.len();
        }
        assert_eq!(num_users, 20);
    }
}

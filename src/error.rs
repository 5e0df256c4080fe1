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

use std::io;

use thiserror::Error;

use crate::types::{EntityId, ExternalId};

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing option, detected before any work is scheduled.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The same counterpart was observed twice for one entity.
    #[error("duplicate observation of counterpart {counterpart} for entity {entity}")]
    DataIntegrity { entity: EntityId, counterpart: EntityId },

    /// A contribution or feature vector does not have the configured rank.
    #[error("entity {entity} has dimension {found}, expected {expected}")]
    DimensionMismatch { entity: EntityId, expected: usize, found: usize },

    /// A feature vector contains NaN or an infinite value.
    #[error("entity {entity} has a non-finite feature value")]
    NonFiniteFeatures { entity: EntityId },

    /// A user of a block has no feature vector. Recovered per user.
    #[error("no feature vector for user {user}")]
    MissingFeatures { user: EntityId },

    /// An id has no counterpart in the supplied id index.
    #[error("id {0} is not contained in the id index")]
    UnknownId(EntityId),

    /// An id index maps an id to two different counterparts.
    #[error("id index is not bijective at internal id {internal}, external id {external}")]
    IndexConflict { internal: EntityId, external: ExternalId },

    #[error("{} block prediction task(s) failed: {:?}", .failed_blocks.len(), .failed_blocks)]
    PartialFailure { failed_blocks: Vec<u32> },

    #[error("run was cancelled")]
    Cancelled,

    #[error("unable to solve for entity {0}, the system is not positive definite")]
    Unsolvable(EntityId),

    #[error("malformed input in {path}: {message}")]
    MalformedInput { path: String, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

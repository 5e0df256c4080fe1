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

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use fnv::FnvHashSet;

use crate::controller::RecommendationSink;
use crate::error::{Error, Result};
use crate::id_index::IdIndex;
use crate::types::{self, EntityId, ExternalId, FeatureMatrix, Rating, RecommendFilter,
                   UserRecommendations};

/// Reads a CSV input file. We expect NO headers, and tab separated fields.
pub fn csv_reader<P: AsRef<Path>>(file: P) -> Result<csv::Reader<File>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .flexible(true)
        .from_path(file)?;

    Ok(reader)
}

/// Reads `user<TAB>item<TAB>rating` triples.
pub fn read_ratings<P: AsRef<Path>>(file: P) -> Result<Vec<Rating>> {
    let mut reader = csv_reader(file)?;

    let mut ratings = Vec::new();
    for record in reader.deserialize() {
        let (user, item, value): (EntityId, EntityId, f64) = record?;
        ratings.push(Rating::new(user, item, value));
    }

    Ok(ratings)
}

/// Reads a feature matrix with one `id<TAB>f1<TAB>...<TAB>fk` row per entity. All rows must
/// have the same number of features.
pub fn read_features<P: AsRef<Path>>(file: P) -> Result<FeatureMatrix> {
    let path = file.as_ref().display().to_string();
    let mut reader = csv_reader(file)?;

    let mut features = types::new_feature_matrix(1_000);
    let mut num_features: Option<usize> = None;

    for record in reader.records() {
        let record = record?;

        let malformed = |message: String| Error::MalformedInput { path: path.clone(), message };

        let id: EntityId = record.get(0)
            .ok_or_else(|| malformed(String::from("empty row")))?
            .trim()
            .parse()
            .map_err(|_| malformed(format!("invalid id in row {:?}", record)))?;

        let vector = record.iter()
            .skip(1)
            .map(|value| value.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
            .map_err(|_| malformed(format!("invalid feature value for entity {}", id)))?;

        if !vector.iter().all(|value| value.is_finite()) {
            return Err(malformed(format!("non-finite feature value for entity {}", id)));
        }

        match num_features {
            Some(expected) if expected != vector.len() => {
                return Err(Error::DimensionMismatch { entity: id, expected, found: vector.len() })
            },
            None if vector.is_empty() => {
                return Err(malformed(format!("entity {} has no features", id)))
            },
            None => num_features = Some(vector.len()),
            _ => {},
        }

        features.insert(id, vector);
    }

    Ok(features)
}

/// Reads `internal<TAB>external` id pairs.
pub fn read_id_index<P: AsRef<Path>>(file: P) -> Result<IdIndex> {
    let mut reader = csv_reader(file)?;

    let mut pairs = Vec::new();
    for record in reader.deserialize() {
        let pair: (EntityId, ExternalId) = record?;
        pairs.push(pair);
    }

    IdIndex::from_pairs(pairs)
}

/// Reads `user<TAB>item` pairs of items never to recommend to a user.
pub fn read_recommend_filter<P: AsRef<Path>>(file: P) -> Result<RecommendFilter> {
    let mut reader = csv_reader(file)?;

    let mut filter = RecommendFilter::default();
    for record in reader.deserialize() {
        let (user, item): (EntityId, EntityId) = record?;
        filter.entry(user)
            .or_insert_with(FnvHashSet::default)
            .insert(item);
    }

    Ok(filter)
}

/// Writes the recommendations of each block as JSON lines to `<directory>/<block>.json`.
/// Blocks are first written to a sibling staging directory, which replaces `directory` as a
/// whole on commit. A failed run leaves the previous contents of `directory` untouched.
#[derive(Debug)]
pub struct JsonDirectorySink {
    directory: PathBuf,
    staging: PathBuf,
    previous: PathBuf,
    staged: bool,
}

impl JsonDirectorySink {

    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();

        let name = directory.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Configuration(
                format!("output path {} does not name a directory", directory.display())))?;

        if let Some(parent) = directory.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let staging = directory.with_file_name(format!(".{}.staging", name));
        let previous = directory.with_file_name(format!(".{}.previous", name));

        Ok(JsonDirectorySink { directory, staging, previous, staged: false })
    }

    pub fn block_path(&self, block: u32) -> PathBuf {
        self.directory.join(format!("{}.json", block))
    }

    fn staged_block_path(&self, block: u32) -> PathBuf {
        self.staging.join(format!("{}.json", block))
    }

    /// Starts from an empty staging directory, leftovers of an interrupted run are removed.
    fn prepare_staging(&mut self) -> Result<()> {
        if !self.staged {
            if self.staging.exists() {
                fs::remove_dir_all(&self.staging)?;
            }
            fs::create_dir_all(&self.staging)?;
            self.staged = true;
        }
        Ok(())
    }
}

impl RecommendationSink for JsonDirectorySink {

    fn write_block(&mut self, block: u32, recommendations: &[UserRecommendations]) -> Result<()> {
        self.prepare_staging()?;

        let mut out = BufWriter::new(File::create(self.staged_block_path(block))?);

        for user_recommendations in recommendations.iter() {
            serde_json::to_writer(&mut out, user_recommendations)?;
            writeln!(out)?;
        }

        out.flush()?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.prepare_staging()?;

        if self.directory.exists() {
            if self.previous.exists() {
                fs::remove_dir_all(&self.previous)?;
            }
            fs::rename(&self.directory, &self.previous)?;

            if let Err(error) = fs::rename(&self.staging, &self.directory) {
                if let Err(restore_error) = fs::rename(&self.previous, &self.directory) {
                    warn!(path = %self.previous.display(), %restore_error,
                        "unable to restore the previous output");
                }
                return Err(error.into());
            }

            fs::remove_dir_all(&self.previous)?;
        } else {
            fs::rename(&self.staging, &self.directory)?;
        }

        self.staged = false;
        Ok(())
    }

    fn abort(&mut self) {
        if self.staging.exists() {
            if let Err(error) = fs::remove_dir_all(&self.staging) {
                warn!(path = %self.staging.display(), %error, "unable to remove staged output");
            }
        }
        self.staged = false;
    }
}

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::blocks::BlockAssigner;
use crate::error::{Error, Result};

pub const DEFAULT_NUM_BLOCKS: i64 = 10;
pub const DEFAULT_NUM_RECOMMENDATIONS: i64 = 10;
pub const DEFAULT_NUM_THREADS: i64 = 1;

/// Options of a block-parallel recommendation run, as given by the user. Field names follow
/// the option names of the command line, so that a JSON config file can use the same keys.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct RecommenderConfig {
    pub num_blocks: i64,
    pub num_recommendations: i64,
    pub max_rating: Option<f64>,
    pub num_threads: i64,
    #[serde(rename = "usesLongIDs")]
    pub uses_long_ids: bool,
    #[serde(rename = "userIDIndex")]
    pub user_id_index: Option<String>,
    #[serde(rename = "itemIDIndex")]
    pub item_id_index: Option<String>,
    pub recommend_filter_path: Option<String>,
    pub exclude_rated_items: bool,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        RecommenderConfig {
            num_blocks: DEFAULT_NUM_BLOCKS,
            num_recommendations: DEFAULT_NUM_RECOMMENDATIONS,
            max_rating: None,
            num_threads: DEFAULT_NUM_THREADS,
            uses_long_ids: false,
            user_id_index: None,
            item_id_index: None,
            recommend_filter_path: None,
            exclude_rated_items: true,
        }
    }
}

/// Everything a single block prediction task needs to know besides its data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PredictionSettings {
    pub num_recommendations: usize,
    pub max_rating: f64,
    pub num_threads: usize,
    pub exclude_rated_items: bool,
}

impl RecommenderConfig {

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config = serde_json::from_reader(reader)?;
        Ok(config)
    }

    /// Checks all options eagerly, before any work is started.
    pub fn validate(&self) -> Result<(BlockAssigner, PredictionSettings)> {

        let assigner = BlockAssigner::new(self.num_blocks)?;

        if self.num_recommendations <= 0 {
            return Err(Error::Configuration(
                format!("numRecommendations must be positive, got {}", self.num_recommendations)));
        }

        if self.num_threads <= 0 {
            return Err(Error::Configuration(
                format!("numThreads must be positive, got {}", self.num_threads)));
        }

        let max_rating = match self.max_rating {
            Some(max_rating) if max_rating.is_finite() => max_rating,
            Some(max_rating) => {
                return Err(Error::Configuration(format!("maxRating must be finite, got {}", max_rating)))
            },
            None => return Err(Error::Configuration(String::from("maxRating is required"))),
        };

        if self.uses_long_ids && (self.user_id_index.is_none() || self.item_id_index.is_none()) {
            return Err(Error::Configuration(
                String::from("usesLongIDs requires both userIDIndex and itemIDIndex")));
        }

        let settings = PredictionSettings {
            num_recommendations: self.num_recommendations as usize,
            max_rating,
            num_threads: self.num_threads as usize,
            exclude_rated_items: self.exclude_rated_items,
        };

        Ok((assigner, settings))
    }
}

#[cfg(test)]
mod tests {

    use std::env;
    use std::fs;

    use crate::error::Error;
    use super::RecommenderConfig;

    fn valid() -> RecommenderConfig {
        RecommenderConfig { max_rating: Some(5.0), ..Default::default() }
    }

    #[test]
    fn defaults() {
        let (assigner, settings) = valid().validate().unwrap();

        assert_eq!(assigner.num_blocks(), 10);
        assert_eq!(settings.num_recommendations, 10);
        assert_eq!(settings.num_threads, 1);
        assert_eq!(settings.max_rating, 5.0);
        assert!(settings.exclude_rated_items);
    }

    #[test]
    fn max_rating_is_required() {
        match RecommenderConfig::default().validate() {
            Err(Error::Configuration(_)) => {},
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_invalid_options() {
        assert!(RecommenderConfig { num_blocks: 0, ..valid() }.validate().is_err());
        assert!(RecommenderConfig { num_recommendations: -1, ..valid() }.validate().is_err());
        assert!(RecommenderConfig { num_threads: 0, ..valid() }.validate().is_err());
        assert!(RecommenderConfig { max_rating: Some(::std::f64::NAN), ..valid() }.validate().is_err());
    }

    #[test]
    fn long_ids_require_both_indexes() {
        let only_users = RecommenderConfig {
            uses_long_ids: true,
            user_id_index: Some(String::from("users.tsv")),
            ..valid()
        };
        assert!(only_users.validate().is_err());

        let both = RecommenderConfig { item_id_index: Some(String::from("items.tsv")), ..only_users };
        assert!(both.validate().is_ok());
    }

    #[test]
    fn reads_json_config() {
        let dir = env::temp_dir().join("alsreco-config-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, r#"{"numBlocks": 3, "maxRating": 4.5, "usesLongIDs": false}"#).unwrap();

        let config = RecommenderConfig::from_json_file(&path).unwrap();
        assert_eq!(config.num_blocks, 3);
        assert_eq!(config.max_rating, Some(4.5));
        assert_eq!(config.num_recommendations, 10);

        fs::write(&path, r#"{"numBlock": 3}"#).unwrap();
        assert!(RecommenderConfig::from_json_file(&path).is_err());
    }
}

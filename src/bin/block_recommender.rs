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

extern crate alsreco;
extern crate getopts;
extern crate num_cpus;
#[macro_use]
extern crate tracing;
extern crate tracing_subscriber;

use std::env;
use std::process;
use std::str::FromStr;

use getopts::{Matches, Options};
use tracing_subscriber::EnvFilter;

use alsreco::io::{self, JsonDirectorySink};
use alsreco::{merge, CancellationToken, RecommenderConfig, RecommenderInputs, RunMetrics};

fn main() {

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("i", "input", "Ratings file (required). One user, item and rating triple per line, \
        separated by tabs.", "PATH");
    opts.optopt("", "userFeatures", "User feature matrix (required). One user id followed by its \
        features per line, separated by tabs.", "PATH");
    opts.optopt("", "itemFeatures", "Item feature matrix (required), same format as the user \
        feature matrix.", "PATH");
    opts.optopt("o", "output", "Output directory (required). One file of JSON lines is written \
        per block, the directory is replaced once all blocks succeeded.", "PATH");
    opts.optopt("", "config", "JSON file with default options, overridden by the command \
        line.", "PATH");
    opts.optopt("", "numBlocks", "Number of user blocks (defaults to 10).", "NUMBER");
    opts.optopt("", "numRecommendations", "Number of recommendations per user (defaults to 10).",
        "NUMBER");
    opts.optopt("", "maxRating", "Maximum rating available (required).", "NUMBER");
    opts.optopt("", "numThreads", "Threads per block (defaults to 1).", "NUMBER");
    opts.optflag("", "usesLongIDs", "Translate internal ids to the long ids of the id indexes.");
    opts.optopt("", "userIDIndex", "Index of user long ids (required with --usesLongIDs).", "PATH");
    opts.optopt("", "itemIDIndex", "Index of item long ids (required with --usesLongIDs).", "PATH");
    opts.optopt("", "recommendFilterPath", "User and item pairs which must not be recommended \
        (optional).", "PATH");
    opts.optflag("", "includeRatedItems", "Also recommend items the user has already rated.");
    opts.optflag("h", "help", "Print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(failure) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    if matches.opt_present("h") {
        return print_usage_and_exit(&program, opts, None);
    }

    for required in &["input", "userFeatures", "itemFeatures", "output"] {
        if !matches.opt_present(required) {
            let hint = format!("Please specify --{}.", required);
            return print_usage_and_exit(&program, opts, Some(&hint));
        }
    }

    let config = match config_from(&matches) {
        Ok(config) => config,
        Err(hint) => return print_usage_and_exit(&program, opts, Some(&hint)),
    };

    if let Err(error) = run(&matches, &config) {
        error!(%error, "recommendation run failed");
        process::exit(1);
    }
}

fn print_usage_and_exit(
    program: &str,
    opts: Options,
    hint: Option<&str>
) {

    if let Some(hint) = hint {
        eprintln!("\n{}\n", hint);
    }

    let brief = format!("Usage: {} [options]", program);
    eprint!("{}", opts.usage(&brief));
    process::exit(2);
}

fn parsed<T: FromStr>(matches: &Matches, name: &str) -> Result<Option<T>, String> {
    match matches.opt_str(name) {
        Some(value) => value.parse::<T>()
            .map(Some)
            .map_err(|_| format!("Problem with option '{}': cannot parse '{}'", name, value)),
        None => Ok(None),
    }
}

fn config_from(matches: &Matches) -> Result<RecommenderConfig, String> {

    let mut config = match matches.opt_str("config") {
        Some(path) => RecommenderConfig::from_json_file(&path)
            .map_err(|error| format!("Unable to read config file {}: {}", path, error))?,
        None => RecommenderConfig::default(),
    };

    if let Some(num_blocks) = parsed(matches, "numBlocks")? {
        config.num_blocks = num_blocks;
    }
    if let Some(num_recommendations) = parsed(matches, "numRecommendations")? {
        config.num_recommendations = num_recommendations;
    }
    if let Some(max_rating) = parsed(matches, "maxRating")? {
        config.max_rating = Some(max_rating);
    }
    if let Some(num_threads) = parsed(matches, "numThreads")? {
        config.num_threads = num_threads;
    }
    if matches.opt_present("usesLongIDs") {
        config.uses_long_ids = true;
    }
    if let Some(path) = matches.opt_str("userIDIndex") {
        config.user_id_index = Some(path);
    }
    if let Some(path) = matches.opt_str("itemIDIndex") {
        config.item_id_index = Some(path);
    }
    if let Some(path) = matches.opt_str("recommendFilterPath") {
        config.recommend_filter_path = Some(path);
    }
    if matches.opt_present("includeRatedItems") {
        config.exclude_rated_items = false;
    }

    Ok(config)
}

fn run(matches: &Matches, config: &RecommenderConfig) -> alsreco::Result<()> {

    // Fail on inconsistent options before reading any data
    config.validate()?;

    let input = matches.opt_str("input").unwrap_or_default();
    let output = matches.opt_str("output").unwrap_or_default();

    info!(path = %input, "reading ratings");
    let ratings = io::read_ratings(&input)?;

    let num_partitions = num_cpus::get();

    let user_features_path = matches.opt_str("userFeatures").unwrap_or_default();
    info!(path = %user_features_path, "reading user features");
    let user_features = io::read_features(&user_features_path)?;

    let item_features_path = matches.opt_str("itemFeatures").unwrap_or_default();
    info!(path = %item_features_path, "reading item features");
    let item_features = io::read_features(&item_features_path)?;

    let (user_index, item_index) = match (&config.user_id_index, &config.item_id_index) {
        (Some(user_index), Some(item_index)) if config.uses_long_ids => {
            (Some(io::read_id_index(user_index)?), Some(io::read_id_index(item_index)?))
        },
        _ => (None, None),
    };

    let recommend_filter = match config.recommend_filter_path {
        Some(ref path) => Some(io::read_recommend_filter(path)?),
        None => None,
    };

    let inputs = RecommenderInputs {
        ratings: merge::partition_ratings(&ratings, num_partitions),
        user_features,
        item_features,
        user_index,
        item_index,
        recommend_filter,
    };

    let mut sink = JsonDirectorySink::new(&output)?;
    let metrics = RunMetrics::new();

    alsreco::recommend(config, inputs, num_partitions, &mut sink, &metrics, &CancellationToken::new())?;

    info!(path = %output, "recommendations written");

    Ok(())
}

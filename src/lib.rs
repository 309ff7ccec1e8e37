#![allow(non_snake_case)]

pub mod data;
pub mod fitness;
pub mod individual;
pub mod node;
pub mod param;
pub mod population;
pub mod utils;

use crate::data::Data;
use crate::fitness::FitnessEvaluator;
use crate::individual::Individual;
use crate::param::Param;
use crate::population::Population;
use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::error::Error;

/// Outcome of one evaluation run
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct RunReport {
    pub population: Population,
    pub elite: Option<Individual>,
    pub evaluations: u64,
}

/// Loads the training data, generates a random population and evaluates it
///
/// This drives the fitness engine end to end (a random-search baseline); the
/// surrounding evolutionary loop is expected to call
/// [`fitness::FitnessEvaluator::evaluate`] itself, generation after
/// generation.
pub fn run(param: &Param) -> Result<RunReport, Box<dyn Error>> {
    let start = std::time::Instant::now();

    if param.general.thread_number > 1 {
        let _ = ThreadPoolBuilder::new()
            .num_threads(param.general.thread_number)
            .build_global();
    }

    let mut data = Data::new();
    data.load_data(&param.data.X, &param.data.y, param.data.features_in_rows)?;
    info!("{:?}", data);

    if data.feature_len == 0 {
        return Err("training data has no features".into());
    }
    let expected_channels = if param.gp.multi_tree {
        param.gp.num_sup_functions
    } else {
        1
    };
    if data.target_len != expected_channels {
        return Err(format!(
            "{} target channels in {} but {} output functions configured",
            data.target_len, param.data.y, expected_channels
        )
        .into());
    }

    let mut rng = ChaCha8Rng::seed_from_u64(param.general.seed);
    let mut population = Population::new();
    population.generate(param, data.feature_len, &mut rng);
    info!("Generated {} individuals", population.individuals.len());

    let mut evaluator = FitnessEvaluator::new(data, param);
    population.fit(&mut evaluator);
    let population = population.sort();

    let shown = (param.general.n_model_to_display as usize).min(population.individuals.len());
    for individual in population.individuals.iter().take(shown) {
        info!(
            "[cost:{:.6} size:{:.2}] {}",
            individual.objectives[0], individual.objectives[1], individual
        );
    }
    if let Some(elite) = &evaluator.elite {
        info!("Elite after {} evaluations: {}", evaluator.evaluations, elite);
    }
    info!(
        "Evaluated {} individuals in {:.2?}",
        evaluator.evaluations,
        start.elapsed()
    );

    Ok(RunReport {
        population,
        elite: evaluator.elite,
        evaluations: evaluator.evaluations,
    })
}

/// Crate version, suffixed with the git short sha when available
pub fn version() -> String {
    match option_env!("NSGP_GIT_SHA") {
        Some(sha) => format!("{}#{}", env!("CARGO_PKG_VERSION"), sha),
        None => env!("CARGO_PKG_VERSION").to_string(),
    }
}

use crate::fitness::FitnessEvaluator;
use crate::individual::Individual;
use crate::param::Param;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A set of candidate individuals
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct Population {
    pub individuals: Vec<Individual>,
}

impl Population {
    pub fn new() -> Population {
        Population {
            individuals: Vec::new(),
        }
    }

    /// Populates with random individuals drawn per the GP parameters
    pub fn generate(&mut self, param: &Param, num_features: usize, rng: &mut ChaCha8Rng) {
        let const_range = (param.gp.const_min, param.gp.const_max);
        for _ in 0..param.gp.population_size {
            let individual = if param.gp.multi_tree {
                Individual::random_multi(
                    param.gp.max_depth,
                    num_features,
                    param.gp.num_sup_functions,
                    param.gp.num_sub_functions,
                    const_range,
                    rng,
                )
            } else {
                Individual::random_single(param.gp.max_depth, num_features, const_range, rng)
            };
            self.individuals.push(individual);
        }
    }

    /// Evaluates every individual, in parallel, against one evaluator
    ///
    /// Seeds are pre-assigned from the evaluation counter before dispatch, so
    /// seed-dependent strategies stay deterministic regardless of worker
    /// scheduling; counter and elite commits happen sequentially afterwards,
    /// avoiding lost updates.
    pub fn fit(&mut self, evaluator: &mut FitnessEvaluator) {
        let first_seed = evaluator.evaluations + 1;
        self.individuals
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, individual)| {
                let objectives = evaluator.objectives_for(individual, first_seed + i as u64);
                individual.objectives = objectives.to_vec();
            });
        evaluator.evaluations += self.individuals.len() as u64;
        for individual in &self.individuals {
            evaluator.update_elite(individual);
        }
    }

    /// Sorts by objective[0], then objective[1] (both minimized)
    pub fn sort(mut self) -> Self {
        self.individuals.sort_by(|a, b| {
            a.objectives
                .partial_cmp(&b.objectives)
                .unwrap_or(Ordering::Equal)
        });
        self
    }

    pub fn best(&self) -> Option<&Individual> {
        self.individuals.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Data;
    use crate::node::Node;
    use rand::SeedableRng;

    fn identity_data(n: usize) -> Data {
        Data::from_matrices(
            (0..n).map(|i| vec![i as f64]).collect(),
            (0..n).map(|i| vec![i as f64]).collect(),
        )
    }

    #[test]
    fn test_generate_respects_population_size() {
        let mut param = Param::default();
        param.gp.population_size = 25;
        let mut rng = ChaCha8Rng::seed_from_u64(param.general.seed);
        let mut population = Population::new();
        population.generate(&param, 1, &mut rng);
        assert_eq!(population.individuals.len(), 25);
    }

    #[test]
    fn test_generate_is_reproducible() {
        let mut param = Param::default();
        param.gp.population_size = 10;
        param.gp.multi_tree = true;
        param.gp.num_sup_functions = 2;

        let mut first = Population::new();
        first.generate(&param, 3, &mut ChaCha8Rng::seed_from_u64(7));
        let mut second = Population::new();
        second.generate(&param, 3, &mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(first, second);
    }

    #[test]
    fn test_fit_assigns_objectives_and_advances_counter() {
        let mut param = Param::default();
        param.gp.population_size = 20;
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut population = Population::new();
        population.generate(&param, 1, &mut rng);

        let mut evaluator = FitnessEvaluator::new(identity_data(30), &param);
        population.fit(&mut evaluator);

        assert_eq!(evaluator.evaluations, 20);
        assert!(evaluator.elite.is_some());
        for individual in &population.individuals {
            assert_eq!(individual.objectives.len(), 2);
            assert!(!individual.objectives[0].is_nan());
            assert!(!individual.objectives[1].is_nan());
        }
    }

    #[test]
    fn test_sort_puts_lowest_cost_first() {
        let mut population = Population::new();
        for cost in [4.0, 1.0, 3.0] {
            let mut individual = Individual::single(Node::Constant(cost));
            individual.objectives = vec![cost, 1.0];
            population.individuals.push(individual);
        }
        let population = population.sort();
        assert_eq!(population.best().unwrap().objectives[0], 1.0);
        assert_eq!(population.individuals[2].objectives[0], 4.0);
    }

    #[test]
    fn test_fit_elite_matches_best_of_population() {
        let param = Param::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut population = Population::new();
        population.generate(&param, 1, &mut rng);

        let mut evaluator = FitnessEvaluator::new(identity_data(30), &param);
        population.fit(&mut evaluator);
        let sorted = population.sort();

        let elite = evaluator.elite.as_ref().unwrap();
        assert_eq!(
            elite.objectives[0],
            sorted.best().unwrap().objectives[0]
        );
    }
}

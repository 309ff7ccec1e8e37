use crate::data::Data;
use crate::individual::{Function, Genotype, Individual};
use crate::node::Node;
use crate::param::{FitnessMode, Param};
use crate::utils::{column, covariance, mean_squared_difference, pairwise_distances};
use log::debug;
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashSet;

/// Additive guard against near-zero output variance in the scaling fit
pub const SCALING_EPSILON: f64 = 1e-10;

/// Coefficients of the pretrained PHI interpretability model, applied to
/// `[n_nodes, n_ops, n_naops, n_nacomp]`. Treated as an opaque constant.
pub const PHI_COEFFICIENTS: [f64; 4] = [-0.00195041, -0.00502375, -0.03351907, -0.04472121];

/// Least-squares affine transform aligning raw tree output with targets
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearScaling {
    pub a: f64,
    pub b: f64,
}

impl LinearScaling {
    pub fn identity() -> LinearScaling {
        LinearScaling { a: 0.0, b: 1.0 }
    }

    /// Fits `target ~ a + b * output` in closed form
    ///
    /// `b = cov(target, output) / (var(output) + epsilon)` with population
    /// moments on both sides, `a = mean(target) - b * mean(output)`. The
    /// epsilon keeps a constant-output tree from dividing by zero.
    pub fn fit(target: &[f64], output: &[f64]) -> LinearScaling {
        let b = covariance(target, output) / (output.population_variance() + SCALING_EPSILON);
        let a = target.mean() - b * output.mean();
        LinearScaling { a, b }
    }

    pub fn apply(&self, output: &[f64]) -> Vec<f64> {
        output.iter().map(|o| self.a + self.b * o).collect()
    }
}

/// Structural counts of one expression tree
///
/// Collected in a single pass over the stable pre-order flattening. `n_dim`
/// counts distinct references: repeated use of the same variable (or of the
/// same sub-function through `Feature` leaves) does not increase it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TreeStats {
    pub n_nodes: usize,
    pub n_ops: usize,
    pub n_naops: usize,
    pub n_vars: usize,
    pub n_dim: usize,
    pub n_const: usize,
    pub n_nacomp: usize,
}

impl TreeStats {
    pub fn collect(function: &Function) -> TreeStats {
        let subtree = function.root.subtree();
        let mut stats = TreeStats {
            n_nodes: subtree.len(),
            ..TreeStats::default()
        };
        let mut dimensions: HashSet<usize> = HashSet::new();
        let mut sub_references: HashSet<usize> = HashSet::new();
        for node in subtree {
            match node {
                Node::Operator(op, _) => {
                    stats.n_ops += 1;
                    if !op.is_arithmetic() {
                        stats.n_naops += 1;
                    }
                }
                Node::Variable(index) => {
                    stats.n_vars += 1;
                    dimensions.insert(*index);
                }
                Node::Feature(index) => {
                    stats.n_vars += 1;
                    sub_references.insert(*index);
                }
                Node::Constant(_) => stats.n_const += 1,
            }
        }
        stats.n_dim = dimensions.len() + sub_references.len();
        stats.n_nacomp = function.root.count_nacomp();
        stats
    }

    /// Raw PHI score; higher means more interpretable
    pub fn interpretability_score(&self) -> f64 {
        let features = [
            self.n_nodes as f64,
            self.n_ops as f64,
            self.n_naops as f64,
            self.n_nacomp as f64,
        ];
        100.0
            * features
                .iter()
                .zip(PHI_COEFFICIENTS.iter())
                .map(|(feature, coeff)| feature * coeff)
                .sum::<f64>()
    }
}

/// Pluggable cost strategy for objective[0]
///
/// Implementations must be deterministic for a fixed seed and fixed data;
/// the evaluator passes its evaluation counter as the seed.
pub trait CostStrategy: Send + Sync {
    fn cost(&self, individual: &Individual, data: &Data, seed: u64) -> f64;
}

/// Evaluates individuals and maintains the best-so-far elite
///
/// One `evaluate` call per individual per generation: computes the
/// `[cost, complexity]` objective pair, stores it on the individual and
/// replaces the elite on strict improvement of objective[0].
pub struct FitnessEvaluator {
    data: Data,
    use_linear_scaling: bool,
    use_interpretability_model: bool,
    fitness: FitnessMode,
    batch_size: usize,
    decoder: Option<Box<dyn CostStrategy>>,
    /// Deep copy of the best individual seen so far by objective[0]
    pub elite: Option<Individual>,
    /// Monotonic counter, incremented once per evaluation; doubles as the
    /// seed passed to stochastic cost strategies
    pub evaluations: u64,
}

impl FitnessEvaluator {
    /// Builds an evaluator over fixed training data
    ///
    /// # Panics
    ///
    /// Panics when the configuration is unusable: `neural_decoder_fitness`
    /// without an injected strategy (use [`FitnessEvaluator::with_decoder`]),
    /// or a manifold batch size exceeding the sample count.
    pub fn new(data: Data, param: &Param) -> FitnessEvaluator {
        if param.fitness.fitness == FitnessMode::neural_decoder_fitness {
            panic!("neural_decoder_fitness requires an external strategy, use with_decoder()");
        }
        FitnessEvaluator::build(data, param, None)
    }

    /// Builds an evaluator whose objective[0] is delegated to `decoder`
    pub fn with_decoder(
        data: Data,
        param: &Param,
        decoder: Box<dyn CostStrategy>,
    ) -> FitnessEvaluator {
        FitnessEvaluator::build(data, param, Some(decoder))
    }

    fn build(
        data: Data,
        param: &Param,
        decoder: Option<Box<dyn CostStrategy>>,
    ) -> FitnessEvaluator {
        if param.fitness.fitness == FitnessMode::manifold_fitness
            && param.fitness.batch_size > data.sample_len
        {
            panic!(
                "manifold batch_size ({}) exceeds the number of training samples ({})",
                param.fitness.batch_size, data.sample_len
            );
        }
        FitnessEvaluator {
            data,
            use_linear_scaling: param.fitness.use_linear_scaling,
            use_interpretability_model: param.fitness.use_interpretability_model,
            fitness: param.fitness.fitness,
            batch_size: param.fitness.batch_size,
            decoder,
            elite: None,
            evaluations: 0,
        }
    }

    /// Evaluates one individual, storing its `[cost, complexity]` objectives
    /// and updating the elite on strict improvement
    pub fn evaluate(&mut self, individual: &mut Individual) {
        self.evaluations += 1;
        let objectives = self.objectives_for(individual, self.evaluations);
        individual.objectives = objectives.to_vec();
        self.update_elite(individual);
    }

    /// Computes the objective pair without touching the counter or the elite
    ///
    /// This is the parallel-dispatch entry point: callers pre-assign one seed
    /// per individual, run this concurrently, then commit counter and elite
    /// updates sequentially.
    pub fn objectives_for(&self, individual: &mut Individual, seed: u64) -> [f64; 2] {
        let cost = match self.fitness {
            FitnessMode::manifold_fitness => self.stress_cost(individual, seed),
            FitnessMode::neural_decoder_fitness => match &self.decoder {
                Some(decoder) => decoder.cost(individual, &self.data, seed),
                None => panic!("neural_decoder_fitness evaluator built without a strategy"),
            },
            FitnessMode::autoencoder_teacher_fitness | FitnessMode::gp_autoencoder_fitness => {
                self.mean_squared_error(individual)
            }
        };
        let complexity = if self.use_interpretability_model {
            self.phi_objective(individual)
        } else {
            self.length(individual) as f64
        };
        [cost, complexity]
    }

    /// Replaces the elite iff absent or strictly beaten on objective[0]
    ///
    /// Ties never replace, so the earliest individual at a given cost is kept.
    pub fn update_elite(&mut self, individual: &Individual) {
        let improved = match &self.elite {
            None => true,
            Some(elite) => individual.objectives[0] < elite.objectives[0],
        };
        if improved {
            debug!(
                "New elite at evaluation {}: objectives {:?}",
                self.evaluations, individual.objectives
            );
            self.elite = Some(individual.clone());
        }
    }

    /// Mean squared error after optional linear scaling, NaN mapped to +inf
    ///
    /// Multi-tree individuals get one affine fit per output channel (stored
    /// on the corresponding sup function) and the unweighted mean of the
    /// per-channel errors.
    pub fn mean_squared_error(&self, individual: &mut Individual) -> f64 {
        let output = individual.get_output(&self.data.X);
        let error = match &mut individual.genotype {
            Genotype::SingleTree(function) => scaled_channel_error(
                function,
                &column(&self.data.y, 0),
                &column(&output, 0),
                self.use_linear_scaling,
            ),
            Genotype::MultiTree { sup_functions, .. } => {
                let channel_errors: Vec<f64> = sup_functions
                    .iter_mut()
                    .enumerate()
                    .map(|(i, function)| {
                        scaled_channel_error(
                            function,
                            &column(&self.data.y, i),
                            &column(&output, i),
                            self.use_linear_scaling,
                        )
                    })
                    .collect();
                channel_errors.iter().sum::<f64>() / channel_errors.len() as f64
            }
        };
        if error.is_nan() {
            f64::INFINITY
        } else {
            error
        }
    }

    /// Size-based complexity
    ///
    /// Multi-tree, `gp_autoencoder_fitness`: sub-functions are the first-class
    /// outputs, so only their sizes are summed. Any other mode inlines: every
    /// `Feature` node in a sup function contributes the referenced
    /// sub-function's full size, once per reference site; every other node
    /// contributes 1. A `Feature` node with no sub-functions to reference
    /// falls back to unit cost.
    pub fn length(&self, individual: &Individual) -> usize {
        match &individual.genotype {
            Genotype::SingleTree(function) => function.size(),
            Genotype::MultiTree {
                sup_functions,
                sub_functions,
            } => {
                let sub_sizes: Vec<usize> = sub_functions.iter().map(|f| f.size()).collect();
                if self.fitness == FitnessMode::gp_autoencoder_fitness {
                    sub_sizes.iter().sum()
                } else {
                    let mut total = 0;
                    for sup_function in sup_functions {
                        for node in sup_function.root.subtree() {
                            total += match node {
                                Node::Feature(id) if !sub_sizes.is_empty() => {
                                    sub_sizes.get(*id).copied().unwrap_or(1)
                                }
                                _ => 1,
                            };
                        }
                    }
                    total
                }
            }
        }
    }

    /// Negated PHI interpretability score, summed over every tree of a
    /// multi-tree individual
    ///
    /// Each tree is scored independently on its own local statistics; shared
    /// sub-functions get no discount, the model assumes the reader studies
    /// each component once, materialized separately.
    pub fn phi_objective(&self, individual: &Individual) -> f64 {
        match &individual.genotype {
            Genotype::SingleTree(function) => -TreeStats::collect(function).interpretability_score(),
            Genotype::MultiTree {
                sup_functions,
                sub_functions,
            } => sup_functions
                .iter()
                .chain(sub_functions.iter())
                .map(|function| -TreeStats::collect(function).interpretability_score())
                .sum(),
        }
    }

    /// Distance-preservation cost on a seeded batch
    ///
    /// Samples `batch_size` training rows without replacement, then sums the
    /// absolute differences between pairwise Euclidean distances in input
    /// space and in the individual's output space.
    pub fn stress_cost(&self, individual: &Individual, seed: u64) -> f64 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let indices = sample(&mut rng, self.data.sample_len, self.batch_size);
        let batch: Vec<Vec<f64>> = indices.iter().map(|i| self.data.X[i].clone()).collect();

        let input_distances = pairwise_distances(&batch);
        let output = individual.get_output(&batch);
        let output_distances = pairwise_distances(&output);

        input_distances
            .iter()
            .zip(output_distances.iter())
            .map(|(input_d, output_d)| (input_d - output_d).abs())
            .sum()
    }
}

fn scaled_channel_error(
    function: &mut Function,
    target: &[f64],
    output: &[f64],
    use_linear_scaling: bool,
) -> f64 {
    let scaling = if use_linear_scaling {
        let scaling = LinearScaling::fit(target, output);
        function.ls_a = scaling.a;
        function.ls_b = scaling.b;
        scaling
    } else {
        LinearScaling::identity()
    };
    mean_squared_difference(target, &scaling.apply(output))
}

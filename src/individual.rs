use crate::node::Node;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One expression tree together with its fitted affine-scaling coefficients
///
/// `ls_a`/`ls_b` default to the identity transform and are overwritten by the
/// fitness layer when linear scaling is enabled; for multi-tree individuals
/// every superior function carries its own pair, one per output channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub root: Node,
    pub ls_a: f64,
    pub ls_b: f64,
}

impl Function {
    pub fn new(root: Node) -> Function {
        Function {
            root,
            ls_a: 0.0,
            ls_b: 1.0,
        }
    }

    pub fn size(&self) -> usize {
        self.root.size()
    }
}

/// Representation variant of an individual
///
/// Sub-functions are owned here, once; superior functions reference them by
/// index through `Node::Feature` leaves (arena and index, no ownership
/// cycles), which keeps `Clone` a plain structural deep copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Genotype {
    SingleTree(Function),
    MultiTree {
        sup_functions: Vec<Function>,
        sub_functions: Vec<Function>,
    },
}

/// One candidate solution of the genetic-programming population
///
/// `objectives` is `[cost, complexity]` after evaluation, both minimized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub genotype: Genotype,
    pub objectives: Vec<f64>,
}

impl Individual {
    pub fn single(root: Node) -> Individual {
        Individual {
            genotype: Genotype::SingleTree(Function::new(root)),
            objectives: Vec::new(),
        }
    }

    pub fn multi(sup_roots: Vec<Node>, sub_roots: Vec<Node>) -> Individual {
        Individual {
            genotype: Genotype::MultiTree {
                sup_functions: sup_roots.into_iter().map(Function::new).collect(),
                sub_functions: sub_roots.into_iter().map(Function::new).collect(),
            },
            objectives: Vec::new(),
        }
    }

    /// Number of output channels (1 for a single tree)
    pub fn num_sup_functions(&self) -> usize {
        match &self.genotype {
            Genotype::SingleTree(_) => 1,
            Genotype::MultiTree { sup_functions, .. } => sup_functions.len(),
        }
    }

    pub fn num_sub_functions(&self) -> usize {
        match &self.genotype {
            Genotype::SingleTree(_) => 0,
            Genotype::MultiTree { sub_functions, .. } => sub_functions.len(),
        }
    }

    /// Computes the raw output matrix on `X` (rows = samples)
    ///
    /// Returns one row per sample with one column per output channel. For
    /// multi-tree individuals the sub-function outputs are computed once per
    /// sample and shared across all superior functions that reference them.
    pub fn get_output(&self, X: &[Vec<f64>]) -> Vec<Vec<f64>> {
        match &self.genotype {
            Genotype::SingleTree(function) => X
                .iter()
                .map(|row| vec![function.root.evaluate(row, &[])])
                .collect(),
            Genotype::MultiTree {
                sup_functions,
                sub_functions,
            } => X
                .iter()
                .map(|row| {
                    let sub_values: Vec<f64> = sub_functions
                        .iter()
                        .map(|sub| sub.root.evaluate(row, &[]))
                        .collect();
                    sup_functions
                        .iter()
                        .map(|sup| sup.root.evaluate(row, &sub_values))
                        .collect()
                })
                .collect(),
        }
    }

    /// Grows a random single-tree individual
    pub fn random_single(
        max_depth: usize,
        num_features: usize,
        const_range: (f64, f64),
        rng: &mut ChaCha8Rng,
    ) -> Individual {
        Individual::single(Node::grow(max_depth, num_features, 0, const_range, rng))
    }

    /// Grows a random multi-tree individual
    ///
    /// Sub-functions read input features only; superior functions may draw
    /// `Feature` leaves referencing the sub-functions.
    pub fn random_multi(
        max_depth: usize,
        num_features: usize,
        num_sup_functions: usize,
        num_sub_functions: usize,
        const_range: (f64, f64),
        rng: &mut ChaCha8Rng,
    ) -> Individual {
        let sub_roots = (0..num_sub_functions)
            .map(|_| Node::grow(max_depth, num_features, 0, const_range, rng))
            .collect();
        let sup_roots = (0..num_sup_functions)
            .map(|_| Node::grow(max_depth, num_features, num_sub_functions, const_range, rng))
            .collect();
        Individual::multi(sup_roots, sub_roots)
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.genotype {
            Genotype::SingleTree(function) => {
                write!(
                    f,
                    "{:.5} + {:.5} * {}",
                    function.ls_a, function.ls_b, function.root
                )
            }
            Genotype::MultiTree {
                sup_functions,
                sub_functions,
            } => {
                for (i, sup) in sup_functions.iter().enumerate() {
                    writeln!(
                        f,
                        "sup{}: {:.5} + {:.5} * {}",
                        i, sup.ls_a, sup.ls_b, sup.root
                    )?;
                }
                for (i, sub) in sub_functions.iter().enumerate() {
                    writeln!(f, "sub{}: {}", i, sub.root)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Op;
    use rand::SeedableRng;

    impl Individual {
        /// Single-tree identity individual `x0`, used across unit tests
        pub fn test_identity() -> Individual {
            Individual::single(Node::Variable(0))
        }

        /// Multi-tree individual with one shared sub-function
        ///
        /// sub0 = x0 * x0; sup0 = f0 + x1; sup1 = f0 - 1.0
        pub fn test_multi() -> Individual {
            Individual::multi(
                vec![
                    Node::Operator(Op::Plus, vec![Node::Feature(0), Node::Variable(1)]),
                    Node::Operator(Op::Minus, vec![Node::Feature(0), Node::Constant(1.0)]),
                ],
                vec![Node::Operator(
                    Op::Multiply,
                    vec![Node::Variable(0), Node::Variable(0)],
                )],
            )
        }
    }

    #[test]
    fn test_single_tree_output_shape() {
        let individual = Individual::test_identity();
        let output = individual.get_output(&[vec![1.0], vec![2.0], vec![3.0]]);
        assert_eq!(output, vec![vec![1.0], vec![2.0], vec![3.0]]);
        assert_eq!(individual.num_sup_functions(), 1);
        assert_eq!(individual.num_sub_functions(), 0);
    }

    #[test]
    fn test_multi_tree_output_shares_sub_functions() {
        let individual = Individual::test_multi();
        let output = individual.get_output(&[vec![2.0, 10.0], vec![3.0, 1.0]]);
        // sub0 = x0^2 -> 4 and 9; sup0 = sub0 + x1; sup1 = sub0 - 1
        assert_eq!(output, vec![vec![14.0, 3.0], vec![10.0, 8.0]]);
        assert_eq!(individual.num_sup_functions(), 2);
        assert_eq!(individual.num_sub_functions(), 1);
    }

    #[test]
    fn test_clone_is_a_deep_copy() {
        let mut individual = Individual::test_multi();
        individual.objectives = vec![1.0, 2.0];
        let mut snapshot = individual.clone();
        if let Genotype::MultiTree { sub_functions, .. } = &mut snapshot.genotype {
            sub_functions[0].root = Node::Constant(0.0);
        }
        snapshot.objectives[0] = -1.0;
        // the original is untouched
        assert_eq!(individual.objectives, vec![1.0, 2.0]);
        let output = individual.get_output(&[vec![2.0, 10.0]]);
        assert_eq!(output, vec![vec![14.0, 3.0]]);
    }

    #[test]
    fn test_random_constructors() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let single = Individual::random_single(4, 3, (-1.0, 1.0), &mut rng);
        assert_eq!(single.num_sup_functions(), 1);
        let multi = Individual::random_multi(4, 3, 2, 2, (-1.0, 1.0), &mut rng);
        assert_eq!(multi.num_sup_functions(), 2);
        assert_eq!(multi.num_sub_functions(), 2);
        let output = multi.get_output(&[vec![0.5, 0.5, 0.5]]);
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].len(), 2);
    }
}

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operators available in expression trees
///
/// `Plus`, `Minus`, `Multiply` and `Divide` are arithmetic; the unary
/// operators are not. `Log`, `Sqrt` and `Divide` are unprotected: invalid
/// arguments produce NaN, which the fitness layer maps to an infinite cost.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Plus,
    Minus,
    Multiply,
    Divide,
    Sin,
    Cos,
    Exp,
    Log,
    Sqrt,
}

const ALL_OPS: [Op; 9] = [
    Op::Plus,
    Op::Minus,
    Op::Multiply,
    Op::Divide,
    Op::Sin,
    Op::Cos,
    Op::Exp,
    Op::Log,
    Op::Sqrt,
];

impl Op {
    /// Number of arguments taken by the operator
    pub fn arity(&self) -> usize {
        match self {
            Op::Plus | Op::Minus | Op::Multiply | Op::Divide => 2,
            Op::Sin | Op::Cos | Op::Exp | Op::Log | Op::Sqrt => 1,
        }
    }

    /// Whether the operator belongs to the basic arithmetic set {+,-,*,/}
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, Op::Plus | Op::Minus | Op::Multiply | Op::Divide)
    }

    /// Applies the operator to already-evaluated child values
    pub fn apply(&self, args: &[f64]) -> f64 {
        match self {
            Op::Plus => args[0] + args[1],
            Op::Minus => args[0] - args[1],
            Op::Multiply => args[0] * args[1],
            Op::Divide => args[0] / args[1],
            Op::Sin => args[0].sin(),
            Op::Cos => args[0].cos(),
            Op::Exp => args[0].exp(),
            Op::Log => args[0].ln(),
            Op::Sqrt => args[0].sqrt(),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Multiply => "*",
            Op::Divide => "/",
            Op::Sin => "sin",
            Op::Cos => "cos",
            Op::Exp => "exp",
            Op::Log => "log",
            Op::Sqrt => "sqrt",
        }
    }

    pub fn random(rng: &mut ChaCha8Rng) -> Op {
        ALL_OPS[rng.gen_range(0..ALL_OPS.len())]
    }
}

/// One node of an expression tree
///
/// `Variable` references an input dimension, `Feature` references a
/// sub-function of a multi-tree individual by position. A `Feature` node
/// never owns the sub-function it points to; sub-functions are owned once by
/// the individual and may be referenced from several superior functions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Operator(Op, Vec<Node>),
    Variable(usize),
    Constant(f64),
    Feature(usize),
}

impl Node {
    pub fn arity(&self) -> usize {
        match self {
            Node::Operator(op, _) => op.arity(),
            _ => 0,
        }
    }

    /// Number of nodes in the subtree rooted here
    pub fn size(&self) -> usize {
        match self {
            Node::Operator(_, children) => 1 + children.iter().map(|c| c.size()).sum::<usize>(),
            _ => 1,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Node::Operator(_, children) => {
                1 + children.iter().map(|c| c.depth()).max().unwrap_or(0)
            }
            _ => 1,
        }
    }

    /// Flattens the subtree rooted here in pre-order
    ///
    /// The traversal order is stable, which the structural objectives rely
    /// on for reproducibility.
    pub fn subtree(&self) -> Vec<&Node> {
        let mut nodes = Vec::with_capacity(self.size());
        self.collect(&mut nodes);
        nodes
    }

    fn collect<'a>(&'a self, nodes: &mut Vec<&'a Node>) {
        nodes.push(self);
        if let Node::Operator(_, children) = self {
            for child in children {
                child.collect(nodes);
            }
        }
    }

    /// Evaluates the subtree on one sample
    ///
    /// # Arguments
    ///
    /// * `row` - One input sample (one value per input dimension).
    /// * `sub_values` - Outputs of the individual's sub-functions on the same
    ///   sample, indexed by `Feature` nodes. Empty for plain trees; a
    ///   `Feature` node evaluated without sub-functions yields NaN.
    pub fn evaluate(&self, row: &[f64], sub_values: &[f64]) -> f64 {
        match self {
            Node::Operator(op, children) => {
                let args: Vec<f64> = children
                    .iter()
                    .map(|c| c.evaluate(row, sub_values))
                    .collect();
                op.apply(&args)
            }
            Node::Variable(index) => row.get(*index).copied().unwrap_or(f64::NAN),
            Node::Constant(value) => *value,
            Node::Feature(index) => sub_values.get(*index).copied().unwrap_or(f64::NAN),
        }
    }

    /// Counts non-arithmetic compositions in the subtree
    ///
    /// A non-arithmetic operator counts once if at least one of its ancestors
    /// is also non-arithmetic, e.g. `sin(x0 + log(x1))` contains one.
    pub fn count_nacomp(&self) -> usize {
        self.count_nacomp_below(false)
    }

    fn count_nacomp_below(&self, under_na: bool) -> usize {
        match self {
            Node::Operator(op, children) => {
                let na = !op.is_arithmetic();
                let mut count = if na && under_na { 1 } else { 0 };
                for child in children {
                    count += child.count_nacomp_below(under_na || na);
                }
                count
            }
            _ => 0,
        }
    }

    /// Grows a random tree of at most `max_depth` operator levels
    ///
    /// # Arguments
    ///
    /// * `max_depth` - Remaining depth budget; 0 forces a leaf.
    /// * `num_features` - Number of input dimensions (must be at least 1).
    /// * `num_sub_functions` - When positive, `Feature` leaves referencing
    ///   `0..num_sub_functions` may be drawn.
    /// * `const_range` - Inclusive range for random constants.
    /// * `rng` - Seeded generator, for reproducibility.
    pub fn grow(
        max_depth: usize,
        num_features: usize,
        num_sub_functions: usize,
        const_range: (f64, f64),
        rng: &mut ChaCha8Rng,
    ) -> Node {
        if max_depth == 0 || rng.gen_bool(0.25) {
            return Node::random_leaf(num_features, num_sub_functions, const_range, rng);
        }
        let op = Op::random(rng);
        let children = (0..op.arity())
            .map(|_| Node::grow(max_depth - 1, num_features, num_sub_functions, const_range, rng))
            .collect();
        Node::Operator(op, children)
    }

    fn random_leaf(
        num_features: usize,
        num_sub_functions: usize,
        const_range: (f64, f64),
        rng: &mut ChaCha8Rng,
    ) -> Node {
        let kinds = if num_sub_functions > 0 { 3 } else { 2 };
        match rng.gen_range(0..kinds) {
            0 => Node::Variable(rng.gen_range(0..num_features)),
            1 => Node::Constant(rng.gen_range(const_range.0..=const_range.1)),
            _ => Node::Feature(rng.gen_range(0..num_sub_functions)),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Operator(op, children) => {
                if op.arity() == 2 {
                    write!(f, "({} {} {})", children[0], op.symbol(), children[1])
                } else {
                    write!(f, "{}({})", op.symbol(), children[0])
                }
            }
            Node::Variable(index) => write!(f, "x{}", index),
            Node::Constant(value) => write!(f, "{}", value),
            Node::Feature(index) => write!(f, "f{}", index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    impl Node {
        /// Builds `sin(x0 + log(x1)) * 2.5` for unit tests
        pub fn test_nested() -> Node {
            Node::Operator(
                Op::Multiply,
                vec![
                    Node::Operator(
                        Op::Sin,
                        vec![Node::Operator(
                            Op::Plus,
                            vec![
                                Node::Variable(0),
                                Node::Operator(Op::Log, vec![Node::Variable(1)]),
                            ],
                        )],
                    ),
                    Node::Constant(2.5),
                ],
            )
        }
    }

    #[test]
    fn test_size_and_subtree_order() {
        let tree = Node::test_nested();
        assert_eq!(tree.size(), 7);
        let flat = tree.subtree();
        assert_eq!(flat.len(), 7);
        // pre-order: root first, then the sin branch, constant last
        assert_eq!(flat[0], &tree);
        assert!(matches!(flat[1], Node::Operator(Op::Sin, _)));
        assert!(matches!(flat[6], Node::Constant(_)));
    }

    #[test]
    fn test_evaluate() {
        let tree = Node::Operator(
            Op::Plus,
            vec![
                Node::Operator(Op::Multiply, vec![Node::Variable(0), Node::Constant(2.0)]),
                Node::Constant(1.0),
            ],
        );
        assert_eq!(tree.evaluate(&[3.0], &[]), 7.0);
    }

    #[test]
    fn test_evaluate_feature_reference() {
        let tree = Node::Operator(Op::Plus, vec![Node::Feature(0), Node::Feature(1)]);
        assert_eq!(tree.evaluate(&[], &[1.5, 2.5]), 4.0);
        // missing sub-function outputs degrade to NaN, never panic
        assert!(tree.evaluate(&[], &[]).is_nan());
    }

    #[test]
    fn test_count_nacomp() {
        // log nested under sin through an arithmetic operator counts once
        assert_eq!(Node::test_nested().count_nacomp(), 1);
        // no nesting
        let flat = Node::Operator(
            Op::Plus,
            vec![
                Node::Operator(Op::Sin, vec![Node::Variable(0)]),
                Node::Operator(Op::Cos, vec![Node::Variable(1)]),
            ],
        );
        assert_eq!(flat.count_nacomp(), 0);
        // sin(cos(sin(x0))) nests twice
        let chain = Node::Operator(
            Op::Sin,
            vec![Node::Operator(
                Op::Cos,
                vec![Node::Operator(Op::Sin, vec![Node::Variable(0)])],
            )],
        );
        assert_eq!(chain.count_nacomp(), 2);
    }

    #[test]
    fn test_grow_respects_depth_and_indices() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..100 {
            let tree = Node::grow(4, 3, 2, (-1.0, 1.0), &mut rng);
            assert!(tree.depth() <= 5);
            for node in tree.subtree() {
                match node {
                    Node::Variable(i) => assert!(*i < 3),
                    Node::Feature(i) => assert!(*i < 2),
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn test_grow_without_sub_functions_never_draws_features() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..100 {
            let tree = Node::grow(4, 3, 0, (-1.0, 1.0), &mut rng);
            assert!(!tree
                .subtree()
                .iter()
                .any(|n| matches!(n, Node::Feature(_))));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Node::test_nested().to_string(),
            "(sin((x0 + log(x1))) * 2.5)"
        );
    }
}

use crate::error::ThermiteError;

/// Closed domain `[a, b]` of the problem
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub a: f64,
    pub b: f64,
}

impl Interval {
    pub fn new(a: f64, b: f64) -> Interval {
        Interval { a, b }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval { a: 0.0, b: 1.0 }
    }
}

/// Uniform 1D mesh. Element `e` spans `coordinates[e]..coordinates[e + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub(crate) coordinates: Vec<f64>,
}

impl Mesh {
    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    pub fn num_nodes(&self) -> usize {
        self.coordinates.len()
    }

    pub fn num_elements(&self) -> usize {
        self.coordinates.len() - 1
    }

    pub fn elements(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.coordinates.windows(2).map(|w| (w[0], w[1]))
    }
}

/// Node targeted by a boundary condition
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryNode {
    Left,
    Right,
    Index(usize),
}

impl BoundaryNode {
    /// Resolves the selector into a global node index on a mesh with
    /// `num_nodes` nodes. Out of range indices are returned unchanged and
    /// rejected by the location map.
    pub fn resolve(&self, num_nodes: usize) -> usize {
        match self {
            BoundaryNode::Left => 0,
            BoundaryNode::Right => num_nodes.saturating_sub(1),
            BoundaryNode::Index(i) => *i,
        }
    }
}

/// Dirichlet constraint fixing the solution value at one node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryCondition {
    pub node: BoundaryNode,
    pub value: f64,
}

impl BoundaryCondition {
    pub fn left(value: f64) -> BoundaryCondition {
        BoundaryCondition {
            node: BoundaryNode::Left,
            value,
        }
    }

    pub fn right(value: f64) -> BoundaryCondition {
        BoundaryCondition {
            node: BoundaryNode::Right,
            value,
        }
    }

    pub fn at(node: usize, value: f64) -> BoundaryCondition {
        BoundaryCondition {
            node: BoundaryNode::Index(node),
            value,
        }
    }
}

/// Source term `s(x)` of `-T'' = s`
#[derive(Debug, Clone, PartialEq)]
pub enum SourceTerm {
    /// `s(x) = c[0] + c[1] x + c[2] x^2 + ...`
    Polynomial(Vec<f64>),
}

impl SourceTerm {
    pub fn evaluate(&self, x: f64) -> f64 {
        match self {
            SourceTerm::Polynomial(coefficients) => coefficients
                .iter()
                .rev()
                .fold(0.0, |acc, c| acc * x + c),
        }
    }
}

impl Default for SourceTerm {
    fn default() -> Self {
        SourceTerm::Polynomial(vec![0.0, 0.0, 1.0])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    /// Dense LU factorization
    #[default]
    Lu,
    /// Conjugate gradient on a sparse copy of the system
    ConjugateGradient,
}

/// Everything needed to run the solver once
#[derive(Debug, Clone)]
pub struct Problem {
    pub interval: Interval,
    pub num_elements: usize,
    pub source: SourceTerm,
    pub boundary_conditions: Vec<BoundaryCondition>,
    pub solver: SolverKind,
    /// Relative residual tolerance of the iterative solver
    pub tolerance: f64,
    /// Iteration cap of the iterative solver. `None` scales with system size.
    pub max_iterations: Option<u64>,
    pub show_progress: bool,
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            interval: Interval::default(),
            num_elements: 100,
            source: SourceTerm::default(),
            boundary_conditions: vec![BoundaryCondition::right(0.0)],
            solver: SolverKind::default(),
            tolerance: 1e-10,
            max_iterations: None,
            show_progress: false,
        }
    }
}

impl Problem {
    /// Rejects iterative solver settings that can never report convergence
    pub fn check_solver_settings(&self) -> Result<(), ThermiteError> {
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(ThermiteError::Input(format!(
                "tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == Some(0) {
            return Err(ThermiteError::Input(
                "max_iterations must be at least 1".to_owned(),
            ));
        }

        Ok(())
    }
}

/// Flux needed at a constrained node to hold its prescribed value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reaction {
    pub node: usize,
    pub x: f64,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub coordinates: Vec<f64>,
    pub values: Vec<f64>,
    pub reactions: Vec<Reaction>,
}

impl Solution {
    pub fn into_parts(self) -> (Vec<f64>, Vec<f64>) {
        (self.coordinates, self.values)
    }
}

//! One-dimensional linear finite element solver for the steady diffusion
//! equation `-T'' = s(x)`.
//!
//! The pipeline is [`mesher::generate_mesh`] → [`element`] matrices →
//! [`solver::assemble`] → dense solve, wrapped by [`solver::solve`] and
//! [`solver::solve_problem`].

pub mod datatypes;
pub mod element;
pub mod error;
pub mod mesher;
pub mod post_processor;
pub mod solver;

pub use datatypes::{BoundaryCondition, BoundaryNode, Interval, Problem, Solution, SolverKind};
pub use error::ThermiteError;
pub use solver::{solve, solve_problem, solve_problem_with};

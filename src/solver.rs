use std::time::Instant;

use argmin::{
    core::{
        observers::{Observe, ObserverMode},
        Error, Executor, Operator, State, KV,
    },
    solver::conjugategradient::ConjugateGradient,
};
use indicatif::ProgressBar;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use tracing::{debug, info};

use crate::{
    datatypes::{Interval, Mesh, Problem, Reaction, Solution, SolverKind},
    element::{local_load, local_stiffness, ElementMatrix, ElementVector},
    error::ThermiteError,
    mesher::{build_location_map, generate_mesh, LocationMap},
};

/// Smallest accepted ratio between the smallest and largest LU pivot
pub const SINGULAR_PIVOT_RATIO: f64 = 1e-12;
/// Slack between the residual the CG solver reports and the one recomputed
/// from its result
const CG_RESIDUAL_SLACK: f64 = 10.0;

fn progress_bar(len: usize, show: bool) -> ProgressBar {
    if show {
        ProgressBar::new(len as u64)
    } else {
        ProgressBar::hidden()
    }
}

/// Runs multiplication for Conjugate Gradient Solver
struct ConjugateGradientOperator {
    a: CsrMatrix<f64>,
}

impl Operator for ConjugateGradientOperator {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, x: &Self::Param) -> Result<Self::Output, Error> {
        let product = &self.a * &DVector::from_column_slice(x);
        Ok(product.iter().copied().collect())
    }
}

/// Observer bar for argmin solver
struct ConjugateGradientObserverBar {
    bar: ProgressBar,
    final_mag: f64,
}

impl ConjugateGradientObserverBar {
    fn new(bar: ProgressBar, target_cost: f64) -> ConjugateGradientObserverBar {
        ConjugateGradientObserverBar {
            bar,
            final_mag: target_cost.log10().floor(),
        }
    }
}

impl<I> Observe<I> for ConjugateGradientObserverBar
where
    I: State<Float = f64>,
{
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), Error> {
        let cost = state.get_cost();
        debug!("cg iteration {}: residual {cost:e}", state.get_iter());

        if cost.is_finite() && cost > 0.0 {
            let cost_mag = cost.log10().floor();
            let remaining = (cost_mag - self.final_mag).max(1.0);
            self.bar.set_position((1000. / f64::sqrt(remaining)) as u64);
        }

        Ok(())
    }
}

/// Solves a system of equations using the conjugate gradient method.
///
/// # Arguments
/// * `a` - A square symmetric positive definite matrix
/// * `b` - The right hand side
/// * `tolerance` - Relative residual `|Ax - b| / |b|` to reach
/// * `max_iters` - Iteration cap
/// * `show_progress` - Whether to draw a progress bar
///
/// # Returns
/// A DVector that represents `x` from the system
fn run_conjugate_gradient(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    tolerance: f64,
    max_iters: u64,
    show_progress: bool,
) -> Result<DVector<f64>, ThermiteError> {
    let b_norm = b.norm();
    if b_norm == 0.0 {
        return Ok(DVector::zeros(b.nrows()));
    }

    let target_cost = tolerance * b_norm;
    let solver: ConjugateGradient<_, f64> = ConjugateGradient::new(b.as_slice().to_vec());
    let initial_guess: Vec<f64> = vec![0.0; b.nrows()];

    let operator = ConjugateGradientOperator {
        a: CsrMatrix::from(a),
    };
    let bar = progress_bar(1000, show_progress);
    let observer = ConjugateGradientObserverBar::new(bar.clone(), target_cost);

    // Run solver
    let res = Executor::new(operator, solver)
        .configure(|state| {
            state
                .param(initial_guess)
                .max_iters(max_iters)
                .target_cost(target_cost)
        })
        .add_observer(observer, ObserverMode::NewBest)
        .run()
        .map_err(|err| {
            ThermiteError::SingularSystem(format!("Conjugate Gradient error: {err}"))
        })?;
    bar.finish_and_clear();

    let best_param = match res.state().get_best_param() {
        Some(vec) => DVector::from_column_slice(vec),
        None => {
            return Err(ThermiteError::SingularSystem(
                "Conjugate Gradient could not produce best parameter".to_owned(),
            ))
        }
    };

    let residual = (a * &best_param - b).norm();
    info!(
        "conjugate gradient finished after {} iterations, relative residual {:e}",
        res.state().get_iter(),
        residual / b_norm
    );
    if !residual.is_finite() || residual > CG_RESIDUAL_SLACK * target_cost {
        return Err(ThermiteError::SingularSystem(format!(
            "Conjugate Gradient did not converge within {max_iters} iterations \
             (relative residual {:e}, tolerance {tolerance:e})",
            residual / b_norm
        )));
    }

    Ok(best_param)
}

/// Solves a system of equations with a dense LU factorization
///
/// # Arguments
/// * `a` - A square matrix
/// * `b` - The right hand side
///
/// # Returns
/// A DVector that represents `x` from the system
fn run_lu(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, ThermiteError> {
    let lu = a.clone().lu();

    let pivots = lu.u().diagonal().abs();
    let max_pivot = pivots.max();
    let min_pivot = pivots.min();
    if !(min_pivot > SINGULAR_PIVOT_RATIO * max_pivot) {
        return Err(ThermiteError::SingularSystem(format!(
            "LU pivot ratio {:e} is below {SINGULAR_PIVOT_RATIO:e}",
            min_pivot / max_pivot
        )));
    }

    let x = lu.solve(b).ok_or_else(|| {
        ThermiteError::SingularSystem("LU factorization is not invertible".to_owned())
    })?;

    if x.iter().any(|v| !v.is_finite()) {
        return Err(ThermiteError::SingularSystem(
            "LU solve produced non-finite values".to_owned(),
        ));
    }

    Ok(x)
}

/// Local stiffness matrix and load vector of one element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementContribution {
    pub stiffness: ElementMatrix,
    pub load: ElementVector,
}

/// Computes the local matrices of every element of the mesh
///
/// # Arguments
/// * `mesh` - The mesh
/// * `source` - The source term `s(x)`
/// * `show_progress` - Whether to draw a progress bar
///
/// # Returns
/// One ElementContribution per element, in element order
pub fn compute_element_contributions<F>(
    mesh: &Mesh,
    source: F,
    show_progress: bool,
) -> Result<Vec<ElementContribution>, ThermiteError>
where
    F: Fn(f64) -> f64,
{
    let bar = progress_bar(mesh.num_elements(), show_progress);

    let mut contributions = Vec::with_capacity(mesh.num_elements());
    for (x_left, x_right) in mesh.elements() {
        bar.inc(1);
        contributions.push(ElementContribution {
            stiffness: local_stiffness(x_left, x_right)?,
            load: local_load(x_left, x_right, &source)?,
        });
    }
    bar.finish_and_clear();

    debug!("built {} element matrices", contributions.len());

    Ok(contributions)
}

/// Global stiffness matrix and load vector under assembly
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSystem {
    pub stiffness: DMatrix<f64>,
    pub load: DVector<f64>,
}

impl GlobalSystem {
    pub fn zeros(size: usize) -> GlobalSystem {
        GlobalSystem {
            stiffness: DMatrix::zeros(size, size),
            load: DVector::zeros(size),
        }
    }

    pub fn size(&self) -> usize {
        self.load.nrows()
    }
}

/// Scatters element contributions into the reduced system through the
/// location map. Columns of constrained nodes are moved to the load vector
/// using their prescribed values.
///
/// # Arguments
/// * `system` - The buffer to accumulate into, sized to the number of equations
/// * `location_map` - The location map of the mesh
/// * `contributions` - The element contributions, in element order
/// * `show_progress` - Whether to draw a progress bar
///
/// # Returns
/// The accumulated system
pub fn assemble(
    mut system: GlobalSystem,
    location_map: &LocationMap,
    contributions: &[ElementContribution],
    show_progress: bool,
) -> GlobalSystem {
    debug_assert_eq!(system.size(), location_map.num_equations());
    debug_assert_eq!(contributions.len(), location_map.num_elements());

    let prescribed = location_map.prescribed();
    let bar = progress_bar(contributions.len(), show_progress);

    for (e, contribution) in contributions.iter().enumerate() {
        bar.inc(1);

        for p in 0..2 {
            let Some(row) = location_map.global(p, e) else {
                continue;
            };

            for q in 0..2 {
                let k = contribution.stiffness[(p, q)];
                match location_map.global(q, e) {
                    Some(col) => system.stiffness[(row, col)] += k,
                    None => {
                        if let Some(g) = prescribed[location_map.node(q, e)] {
                            system.load[row] -= k * g;
                        }
                    }
                }
            }

            system.load[row] += contribution.load[p];
        }
    }
    bar.finish_and_clear();

    system
}

/// Solves the reduced system with the solver chosen by the problem
fn solve_system(system: &GlobalSystem, problem: &Problem) -> Result<DVector<f64>, ThermiteError> {
    if system.size() == 0 {
        debug!("every node is constrained; skipping linear solve");
        return Ok(DVector::zeros(0));
    }

    let start = Instant::now();
    info!("solving {} equations...", system.size());

    let unknowns = match problem.solver {
        SolverKind::Lu => run_lu(&system.stiffness, &system.load)?,
        SolverKind::ConjugateGradient => {
            let max_iters = problem
                .max_iterations
                .unwrap_or(10 * system.size() as u64 + 100);
            run_conjugate_gradient(
                &system.stiffness,
                &system.load,
                problem.tolerance,
                max_iters,
                problem.show_progress,
            )?
        }
    };

    info!("solved system in {:.3} seconds", start.elapsed().as_secs_f32());

    Ok(unknowns)
}

/// Merges solved unknowns and prescribed values into one nodal vector
fn expand_solution(location_map: &LocationMap, unknowns: &DVector<f64>) -> Vec<f64> {
    let mut cursor = 0;
    location_map
        .prescribed()
        .iter()
        .map(|value| match value {
            Some(v) => *v,
            None => {
                let t = unknowns[cursor];
                cursor += 1;
                t
            }
        })
        .collect()
}

/// Computes the flux needed at every constrained node to hold its value
///
/// # Arguments
/// * `mesh` - The mesh
/// * `location_map` - The location map of the mesh
/// * `contributions` - The element contributions
/// * `values` - The full nodal solution
///
/// # Returns
/// One Reaction per constrained node
pub fn compute_reactions(
    mesh: &Mesh,
    location_map: &LocationMap,
    contributions: &[ElementContribution],
    values: &[f64],
) -> Vec<Reaction> {
    let mut flux = vec![0.0; mesh.num_nodes()];

    for (e, contribution) in contributions.iter().enumerate() {
        for p in 0..2 {
            if location_map.global(p, e).is_some() {
                continue;
            }

            let node = location_map.node(p, e);
            for q in 0..2 {
                flux[node] += contribution.stiffness[(p, q)] * values[location_map.node(q, e)];
            }
            flux[node] -= contribution.load[p];
        }
    }

    location_map
        .constrained_nodes()
        .map(|(node, _)| Reaction {
            node,
            x: mesh.coordinates()[node],
            value: flux[node],
        })
        .collect()
}

/// Runs the solver for a problem with an explicit source function.
/// `problem.source` is ignored in favour of `source`.
///
/// # Arguments
/// * `problem` - Domain, discretization, boundary conditions and solver settings
/// * `source` - The source term `s(x)`
///
/// # Returns
/// The nodal solution aligned with the mesh coordinates
pub fn solve_problem_with<F>(problem: &Problem, source: F) -> Result<Solution, ThermiteError>
where
    F: Fn(f64) -> f64,
{
    problem.check_solver_settings()?;

    let mesh = generate_mesh(problem.interval, problem.num_elements)?;
    let location_map = build_location_map(&mesh, &problem.boundary_conditions)?;

    // Without a Dirichlet node the solution is only fixed up to a constant
    if location_map.num_equations() == mesh.num_nodes() {
        return Err(ThermiteError::SingularSystem(
            "no Dirichlet condition given; the solution is only determined up to a constant"
                .to_owned(),
        ));
    }

    info!(
        "building {} element matrices ({} unknowns)...",
        mesh.num_elements(),
        location_map.num_equations()
    );
    let contributions = compute_element_contributions(&mesh, source, problem.show_progress)?;

    let system = assemble(
        GlobalSystem::zeros(location_map.num_equations()),
        &location_map,
        &contributions,
        problem.show_progress,
    );

    let unknowns = solve_system(&system, problem)?;
    let values = expand_solution(&location_map, &unknowns);
    let reactions = compute_reactions(&mesh, &location_map, &contributions, &values);

    for reaction in &reactions {
        debug!(
            "reaction at node {} (x = {}): {}",
            reaction.node, reaction.x, reaction.value
        );
    }

    Ok(Solution {
        coordinates: mesh.coordinates,
        values,
        reactions,
    })
}

/// Runs the solver for a problem using its configured source term
pub fn solve_problem(problem: &Problem) -> Result<Solution, ThermiteError> {
    solve_problem_with(problem, |x| problem.source.evaluate(x))
}

/// Solves `-T'' = s` on `interval` with `num_elements` linear elements, a
/// zero value at the right end and zero flux at the left end.
///
/// # Returns
/// The mesh coordinates and the nodal values, both of length `num_elements + 1`
pub fn solve<F>(
    interval: Interval,
    num_elements: usize,
    source: F,
) -> Result<(Vec<f64>, Vec<f64>), ThermiteError>
where
    F: Fn(f64) -> f64,
{
    let problem = Problem {
        interval,
        num_elements,
        ..Problem::default()
    };

    Ok(solve_problem_with(&problem, source)?.into_parts())
}

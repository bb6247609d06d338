use thermite::{
    datatypes::SourceTerm, mesher, solve, solve_problem, solve_problem_with, BoundaryCondition,
    Interval, Problem, SolverKind, ThermiteError,
};

fn exact(x: f64) -> f64 {
    (1.0 - x.powi(4)) / 12.0
}

fn max_nodal_error(n: usize) -> f64 {
    let (x, t) = solve(Interval::new(0.0, 1.0), n, |x| x * x).unwrap();
    x.iter()
        .zip(&t)
        .map(|(x, t)| (t - exact(*x)).abs())
        .fold(0.0, f64::max)
}

#[test]
fn two_element_solution() {
    let (x, t) = solve(Interval::new(0.0, 1.0), 2, |x| x * x).unwrap();

    assert_eq!(x, vec![0.0, 0.5, 1.0]);
    assert_eq!(t.len(), 3);
    assert!((t[0] - 5.0 / 48.0).abs() < 1e-12);
    assert!((t[1] - 3.0 / 32.0).abs() < 1e-12);
    assert_eq!(t[2], 0.0);
    assert!(t[0] > t[1] && t[1] > t[2] && t[2] >= 0.0);
}

#[test]
fn right_boundary_is_always_zero() {
    for n in [1, 2, 5, 33] {
        let (x, t) = solve(Interval::new(-2.0, 3.0), n, |x| 1.0 + x.sin()).unwrap();
        assert_eq!(x.len(), n + 1);
        assert_eq!(t.len(), n + 1);
        assert_eq!(t[n], 0.0);
        assert!(t.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn converges_to_analytic_solution() {
    let coarse = max_nodal_error(10);
    let fine = max_nodal_error(160);

    println!("max error: N=10 {coarse:e}, N=160 {fine:e}");
    assert!(coarse < 1e-3);
    assert!(fine < 1e-5);
    // second order: refining 16x should cut the error by roughly 256x
    assert!(coarse / fine > 100.0);
}

#[test]
fn invalid_meshes_fail_before_solving() {
    assert!(matches!(
        solve(Interval::new(0.0, 1.0), 0, |x| x * x),
        Err(ThermiteError::InvalidMesh(_))
    ));
    assert!(matches!(
        solve(Interval::new(1.0, 1.0), 4, |x| x * x),
        Err(ThermiteError::InvalidMesh(_))
    ));
    assert!(matches!(
        solve(Interval::new(1.0, 0.0), 4, |x| x * x),
        Err(ThermiteError::InvalidMesh(_))
    ));
}

#[test]
fn non_finite_source_is_a_degenerate_element() {
    let res = solve(Interval::new(0.0, 1.0), 4, |x| 1.0 / x);
    assert!(matches!(res, Err(ThermiteError::DegenerateElement { .. })));
}

#[test]
fn two_dirichlet_ends_reproduce_linear_profile() {
    let problem = Problem {
        interval: Interval::new(0.0, 2.0),
        num_elements: 7,
        boundary_conditions: vec![BoundaryCondition::left(1.0), BoundaryCondition::right(5.0)],
        ..Problem::default()
    };

    let solution = solve_problem_with(&problem, |_| 0.0).unwrap();

    for (x, t) in solution.coordinates.iter().zip(&solution.values) {
        assert!((t - (1.0 + 2.0 * x)).abs() < 1e-12);
    }
    // flux in at one end, out at the other
    assert_eq!(solution.reactions.len(), 2);
    assert!((solution.reactions[0].value + 2.0).abs() < 1e-9);
    assert!((solution.reactions[1].value - 2.0).abs() < 1e-9);
}

#[test]
fn left_dirichlet_only_gives_constant_without_source() {
    let problem = Problem {
        num_elements: 4,
        boundary_conditions: vec![BoundaryCondition::left(2.5)],
        ..Problem::default()
    };

    let solution = solve_problem_with(&problem, |_| 0.0).unwrap();
    assert!(solution.values.iter().all(|t| (t - 2.5).abs() < 1e-12));
}

#[test]
fn interior_dirichlet_node() {
    let problem = Problem {
        num_elements: 4,
        source: SourceTerm::Polynomial(vec![0.0]),
        boundary_conditions: vec![
            BoundaryCondition::left(0.0),
            BoundaryCondition::at(2, 1.0),
            BoundaryCondition::right(0.0),
        ],
        ..Problem::default()
    };

    let solution = solve_problem(&problem).unwrap();
    let expected = [0.0, 0.5, 1.0, 0.5, 0.0];
    for (t, e) in solution.values.iter().zip(expected) {
        assert!((t - e).abs() < 1e-12);
    }
}

#[test]
fn missing_dirichlet_condition_is_singular() {
    let sources = [
        SourceTerm::default(),
        SourceTerm::Polynomial(vec![0.0]),
        // integrates to zero over [0, 1]
        SourceTerm::Polynomial(vec![-0.5, 1.0]),
    ];

    for solver in [SolverKind::Lu, SolverKind::ConjugateGradient] {
        for source in &sources {
            let problem = Problem {
                num_elements: 4,
                source: source.clone(),
                boundary_conditions: vec![],
                solver,
                ..Problem::default()
            };

            assert!(
                matches!(solve_problem(&problem), Err(ThermiteError::SingularSystem(_))),
                "{solver:?} solved {source:?} without a Dirichlet node"
            );
        }
    }
}

#[test]
fn bad_solver_settings_are_rejected_before_solving() {
    let problems = [
        Problem {
            num_elements: 4,
            tolerance: -1.0,
            solver: SolverKind::ConjugateGradient,
            ..Problem::default()
        },
        Problem {
            num_elements: 4,
            tolerance: 0.0,
            ..Problem::default()
        },
        Problem {
            num_elements: 4,
            max_iterations: Some(0),
            solver: SolverKind::ConjugateGradient,
            ..Problem::default()
        },
    ];

    for problem in problems {
        assert!(matches!(
            solve_problem(&problem),
            Err(ThermiteError::Input(_))
        ));
    }
}

#[test]
fn fully_constrained_mesh_skips_the_solve() {
    let problem = Problem {
        num_elements: 1,
        boundary_conditions: vec![BoundaryCondition::left(4.0), BoundaryCondition::right(-1.0)],
        ..Problem::default()
    };

    let solution = solve_problem(&problem).unwrap();
    assert_eq!(solution.values, vec![4.0, -1.0]);
}

#[test]
fn reaction_balances_total_load() {
    let problem = Problem {
        num_elements: 2,
        ..Problem::default()
    };

    let solution = solve_problem(&problem).unwrap();
    assert_eq!(solution.reactions.len(), 1);
    assert_eq!(solution.reactions[0].node, 2);
    // trapezoidal integral of x^2 on [0, 1] with two elements
    assert!((solution.reactions[0].value + 0.375).abs() < 1e-12);
}

#[test]
fn conjugate_gradient_agrees_with_lu() {
    let lu = Problem {
        num_elements: 40,
        ..Problem::default()
    };
    let cg = Problem {
        solver: SolverKind::ConjugateGradient,
        tolerance: 1e-12,
        ..lu.clone()
    };

    let direct = solve_problem(&lu).unwrap();
    let iterative = solve_problem(&cg).unwrap();

    for (a, b) in direct.values.iter().zip(&iterative.values) {
        assert!((a - b).abs() < 1e-8);
    }
}

#[test]
fn problem_from_input_file() {
    let path = std::env::temp_dir().join(format!("thermite-input-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"{
            "interval": [0.0, 1.0],
            "num_elements": 2,
            "source": { "polynomial": [0.0, 0.0, 1.0] },
            "boundary_conditions": [{ "node": "right", "value": 0.0 }],
            "solver": "lu"
        }"#,
    )
    .unwrap();

    let problem = mesher::load_problem(path.to_str().unwrap());
    std::fs::remove_file(&path).unwrap();

    let solution = solve_problem(&problem.unwrap()).unwrap();
    assert!((solution.values[0] - 5.0 / 48.0).abs() < 1e-12);
    assert!((solution.values[1] - 3.0 / 32.0).abs() < 1e-12);
    assert_eq!(solution.values[2], 0.0);
}

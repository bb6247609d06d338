use clap::{Parser, ValueEnum};
use thermite::{mesher, post_processor, solver, Interval, Problem, SolverKind, ThermiteError};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SolverChoice {
    Lu,
    Cg,
}

#[derive(Parser, Debug)]
#[command(
    name = "thermite",
    about = "Solve -T'' = s(x) on an interval with linear finite elements"
)]
struct Cli {
    /// Input json with interval, elements, source and boundary conditions
    input: Option<String>,

    /// Number of elements, overrides the input file
    #[arg(short = 'n', long)]
    elements: Option<usize>,

    /// Interval start, overrides the input file
    #[arg(long, allow_negative_numbers = true)]
    start: Option<f64>,

    /// Interval end, overrides the input file
    #[arg(long, allow_negative_numbers = true)]
    end: Option<f64>,

    /// Linear solver, overrides the input file
    #[arg(long, value_enum)]
    solver: Option<SolverChoice>,

    /// Output csv with one `x,T` row per node
    #[arg(short, long, default_value = "solution.csv")]
    output: String,

    /// Draw progress bars
    #[arg(long)]
    progress: bool,
}

fn build_problem(cli: &Cli) -> Result<Problem, ThermiteError> {
    let mut problem = match &cli.input {
        Some(input_file) => mesher::load_problem(input_file)?,
        None => Problem::default(),
    };

    if let Some(n) = cli.elements {
        problem.num_elements = n;
    }
    problem.interval = Interval::new(
        cli.start.unwrap_or(problem.interval.a),
        cli.end.unwrap_or(problem.interval.b),
    );
    if let Some(choice) = cli.solver {
        problem.solver = match choice {
            SolverChoice::Lu => SolverKind::Lu,
            SolverChoice::Cg => SolverKind::ConjugateGradient,
        };
    }
    problem.show_progress = cli.progress;

    Ok(problem)
}

fn run(cli: &Cli) -> Result<(), ThermiteError> {
    let problem = build_problem(cli)?;
    let solution = solver::solve_problem(&problem)?;

    for reaction in &solution.reactions {
        info!(
            "boundary flux at x = {}: {:.6e}",
            reaction.x, reaction.value
        );
    }

    post_processor::csv_output(&solution, &cli.output)
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        error!("{err}");
        std::process::exit(1)
    }
}

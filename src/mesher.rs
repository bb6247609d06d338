use json::JsonValue;
use tracing::{debug, info, warn};

use crate::{
    datatypes::{
        BoundaryCondition, BoundaryNode, Interval, Mesh, Problem, SolverKind, SourceTerm,
    },
    error::ThermiteError,
};

/// Partitions an interval into `num_elements` equal elements
///
/// # Arguments
/// * `interval` - The domain `[a, b]`
/// * `num_elements` - The number of elements, at least one
///
/// # Returns
/// A mesh with `num_elements + 1` strictly increasing coordinates whose first
/// and last entries are exactly `a` and `b`
pub fn generate_mesh(interval: Interval, num_elements: usize) -> Result<Mesh, ThermiteError> {
    let Interval { a, b } = interval;

    if num_elements < 1 {
        return Err(ThermiteError::InvalidMesh(format!(
            "number of elements must be at least 1, got {num_elements}"
        )));
    }
    if !a.is_finite() || !b.is_finite() {
        return Err(ThermiteError::InvalidMesh(format!(
            "interval bounds must be finite, got [{a}, {b}]"
        )));
    }
    if a >= b {
        return Err(ThermiteError::InvalidMesh(format!(
            "interval start {a} must be less than interval end {b}"
        )));
    }

    let h = (b - a) / num_elements as f64;
    let mut coordinates: Vec<f64> = (0..=num_elements).map(|i| a + i as f64 * h).collect();
    coordinates[num_elements] = b;

    if coordinates.windows(2).any(|w| w[1] <= w[0]) {
        return Err(ThermiteError::InvalidMesh(format!(
            "{num_elements} elements are too many to resolve [{a}, {b}] in floating point"
        )));
    }

    debug!("generated mesh with {} nodes, h = {h}", coordinates.len());

    Ok(Mesh { coordinates })
}

/// Maps (local node, element) pairs to equation numbers of the reduced
/// system. Constrained nodes map to `None` and are never assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationMap {
    nodes: Vec<[usize; 2]>,
    equations: Vec<Option<usize>>,
    prescribed: Vec<Option<f64>>,
    num_equations: usize,
}

impl LocationMap {
    /// Equation number of local node `local` of element `e`
    pub fn global(&self, local: usize, e: usize) -> Option<usize> {
        self.equations[self.nodes[e][local]]
    }

    /// Mesh node behind local node `local` of element `e`
    pub fn node(&self, local: usize, e: usize) -> usize {
        self.nodes[e][local]
    }

    pub fn num_elements(&self) -> usize {
        self.nodes.len()
    }

    /// Number of unconstrained nodes, the size of the reduced system
    pub fn num_equations(&self) -> usize {
        self.num_equations
    }

    /// Prescribed value of every node, `None` for unknowns
    pub fn prescribed(&self) -> &[Option<f64>] {
        &self.prescribed
    }

    /// Constrained nodes and their values, in node order
    pub fn constrained_nodes(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.prescribed
            .iter()
            .enumerate()
            .filter_map(|(node, value)| value.map(|v| (node, v)))
    }
}

/// Builds the location map of a mesh under a set of Dirichlet conditions
///
/// # Arguments
/// * `mesh` - The mesh to number
/// * `boundary_conditions` - The Dirichlet conditions to exclude from assembly
///
/// # Returns
/// A LocationMap with unconstrained nodes numbered in increasing node order
pub fn build_location_map(
    mesh: &Mesh,
    boundary_conditions: &[BoundaryCondition],
) -> Result<LocationMap, ThermiteError> {
    let num_nodes = mesh.num_nodes();
    let mut prescribed: Vec<Option<f64>> = vec![None; num_nodes];

    for bc in boundary_conditions {
        let node = bc.node.resolve(num_nodes);

        if node >= num_nodes {
            return Err(ThermiteError::InvalidBoundary(format!(
                "node {node} is outside of a mesh with {num_nodes} nodes"
            )));
        }
        if !bc.value.is_finite() {
            return Err(ThermiteError::InvalidBoundary(format!(
                "node {node} has non-finite prescribed value {}",
                bc.value
            )));
        }
        if let Some(existing) = prescribed[node] {
            return Err(ThermiteError::InvalidBoundary(format!(
                "node {node} is constrained twice (values {existing} and {})",
                bc.value
            )));
        }

        prescribed[node] = Some(bc.value);
    }

    let mut equations: Vec<Option<usize>> = Vec::with_capacity(num_nodes);
    let mut num_equations = 0;
    for value in &prescribed {
        if value.is_some() {
            equations.push(None);
        } else {
            equations.push(Some(num_equations));
            num_equations += 1;
        }
    }

    let nodes = (0..mesh.num_elements()).map(|e| [e, e + 1]).collect();

    Ok(LocationMap {
        nodes,
        equations,
        prescribed,
        num_equations,
    })
}

/// Parses the input json into a JsonValue object
///
/// # Arguments
/// * `input_file` - The path to the input file
///
/// # Returns
/// A JsonValue object
fn load_input_file(input_file: &str) -> Result<JsonValue, ThermiteError> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(err) => {
            return Err(ThermiteError::Input(format!(
                "Unable to open input file {input_file}: {err}"
            )))
        }
    };

    match json::parse(&file_string) {
        Ok(f) => Ok(f),
        Err(err) => Err(ThermiteError::Input(format!(
            "Error in input file json: {err}"
        ))),
    }
}

/// Reads a required float out of a json value
fn expect_f64(value: &JsonValue, what: &str) -> Result<f64, ThermiteError> {
    value
        .as_f64()
        .ok_or_else(|| ThermiteError::Input(format!("Bad value for {what}: {value}")))
}

fn parse_interval(input_json: &JsonValue) -> Result<Interval, ThermiteError> {
    let interval_json = &input_json["interval"];

    if !interval_json.is_array() || interval_json.len() != 2 {
        return Err(ThermiteError::Input(
            "interval must be an array of two numbers".to_owned(),
        ));
    }

    Ok(Interval {
        a: expect_f64(&interval_json[0], "interval start")?,
        b: expect_f64(&interval_json[1], "interval end")?,
    })
}

fn parse_source(input_json: &JsonValue) -> Result<SourceTerm, ThermiteError> {
    let source_json = &input_json["source"];

    if !source_json.has_key("polynomial") {
        return Err(ThermiteError::Input(
            "source must contain a polynomial field".to_owned(),
        ));
    }
    if !source_json["polynomial"].is_array() {
        return Err(ThermiteError::Input(
            "source polynomial must be an array of coefficients".to_owned(),
        ));
    }

    let coefficients = source_json["polynomial"]
        .members()
        .enumerate()
        .map(|(i, c)| expect_f64(c, &format!("polynomial coefficient {i}")))
        .collect::<Result<Vec<f64>, ThermiteError>>()?;

    Ok(SourceTerm::Polynomial(coefficients))
}

fn parse_boundary_conditions(
    input_json: &JsonValue,
) -> Result<Vec<BoundaryCondition>, ThermiteError> {
    let bcs_json = &input_json["boundary_conditions"];
    if !bcs_json.is_array() {
        return Err(ThermiteError::Input(
            "boundary_conditions must be an array".to_owned(),
        ));
    }

    let mut boundary_conditions = Vec::with_capacity(bcs_json.len());
    for (i, bc_json) in bcs_json.members().enumerate() {
        if !bc_json.has_key("node") {
            return Err(ThermiteError::Input(format!(
                "Boundary condition {i} is missing node field"
            )));
        }

        let node_json = &bc_json["node"];
        let node = if let Some(name) = node_json.as_str() {
            match name {
                "left" => BoundaryNode::Left,
                "right" => BoundaryNode::Right,
                other => {
                    return Err(ThermiteError::Input(format!(
                        "Boundary condition {i} has unknown node '{other}', \
                         expected 'left', 'right' or an index"
                    )))
                }
            }
        } else if let Some(index) = node_json.as_usize() {
            BoundaryNode::Index(index)
        } else {
            return Err(ThermiteError::Input(format!(
                "Bad value for node in boundary condition {i}: {node_json}"
            )));
        };

        let value = if bc_json.has_key("value") {
            expect_f64(&bc_json["value"], &format!("value in boundary condition {i}"))?
        } else {
            0.0
        };

        boundary_conditions.push(BoundaryCondition { node, value });
    }

    Ok(boundary_conditions)
}

fn parse_solver(input_json: &JsonValue) -> Result<SolverKind, ThermiteError> {
    match input_json["solver"].as_str() {
        Some("lu") => Ok(SolverKind::Lu),
        Some("cg") => Ok(SolverKind::ConjugateGradient),
        _ => Err(ThermiteError::Input(format!(
            "Bad value for solver: {}, expected \"lu\" or \"cg\"",
            input_json["solver"]
        ))),
    }
}

/// Builds a Problem from an input json object. Missing keys keep their
/// default values.
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
///
/// # Returns
/// A Problem instance
pub fn parse_problem(input_json: &JsonValue) -> Result<Problem, ThermiteError> {
    if !input_json.is_object() {
        return Err(ThermiteError::Input(
            "Input json must be an object".to_owned(),
        ));
    }

    let mut problem = Problem::default();

    for (key, _) in input_json.entries() {
        if !matches!(
            key,
            "interval"
                | "num_elements"
                | "source"
                | "boundary_conditions"
                | "solver"
                | "tolerance"
                | "max_iterations"
        ) {
            warn!("ignoring unknown input key '{key}'");
        }
    }

    if input_json.has_key("interval") {
        problem.interval = parse_interval(input_json)?;
    }
    if input_json.has_key("num_elements") {
        problem.num_elements = input_json["num_elements"].as_usize().ok_or_else(|| {
            ThermiteError::Input(format!(
                "Bad value for num_elements: {}",
                input_json["num_elements"]
            ))
        })?;
    }
    if input_json.has_key("source") {
        problem.source = parse_source(input_json)?;
    }
    if input_json.has_key("boundary_conditions") {
        problem.boundary_conditions = parse_boundary_conditions(input_json)?;
    }
    if input_json.has_key("solver") {
        problem.solver = parse_solver(input_json)?;
    }
    if input_json.has_key("tolerance") {
        problem.tolerance = expect_f64(&input_json["tolerance"], "tolerance")?;
    }
    if input_json.has_key("max_iterations") {
        problem.max_iterations = Some(input_json["max_iterations"].as_u64().ok_or_else(|| {
            ThermiteError::Input(format!(
                "Bad value for max_iterations: {}",
                input_json["max_iterations"]
            ))
        })?);
    }

    problem.check_solver_settings()?;

    Ok(problem)
}

/// Loads a Problem from an input file
///
/// # Arguments
/// * `input_file` - The path to the input json
pub fn load_problem(input_file: &str) -> Result<Problem, ThermiteError> {
    let input_json = load_input_file(input_file)?;
    let problem = parse_problem(&input_json)?;

    info!(
        "loaded problem from {input_file}: {} elements on [{}, {}], {} boundary conditions",
        problem.num_elements,
        problem.interval.a,
        problem.interval.b,
        problem.boundary_conditions.len()
    );

    Ok(problem)
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThermiteError {
    #[error("Input error: {0}")]
    Input(String),
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),
    #[error("Invalid boundary condition: {0}")]
    InvalidBoundary(String),
    #[error("Degenerate element [{left}, {right}]: {reason}")]
    DegenerateElement {
        left: f64,
        right: f64,
        reason: String,
    },
    #[error("Singular system: {0}")]
    SingularSystem(String),
    #[error("Post processor error: {0}")]
    PostProcessor(String),
}

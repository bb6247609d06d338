use nalgebra::{matrix, vector, SMatrix, SVector};

use crate::error::ThermiteError;

/// Local stiffness matrix of a two-node element
pub type ElementMatrix = SMatrix<f64, 2, 2>;
/// Local load vector of a two-node element
pub type ElementVector = SVector<f64, 2>;

/// Computes the length of an element, rejecting degenerate geometry
///
/// # Arguments
/// * `x_left` - The left node coordinate
/// * `x_right` - The right node coordinate
///
/// # Returns
/// The positive element length
fn element_length(x_left: f64, x_right: f64) -> Result<f64, ThermiteError> {
    let h = x_right - x_left;

    if !x_left.is_finite() || !x_right.is_finite() || !h.is_finite() {
        return Err(ThermiteError::DegenerateElement {
            left: x_left,
            right: x_right,
            reason: "non-finite node coordinate".to_owned(),
        });
    }
    if h <= 0.0 {
        return Err(ThermiteError::DegenerateElement {
            left: x_left,
            right: x_right,
            reason: format!("non-positive element length {h}"),
        });
    }

    Ok(h)
}

/// Calculates the stiffness matrix of a linear element for the diffusion
/// operator. Entry `(p, q)` is `(-1)^(p + q) / h`.
///
/// The matrix is singular on its own; its rows sum to zero.
///
/// # Arguments
/// * `x_left` - The left node coordinate
/// * `x_right` - The right node coordinate
///
/// # Returns
/// A 2x2 symmetric stiffness matrix
pub fn local_stiffness(x_left: f64, x_right: f64) -> Result<ElementMatrix, ThermiteError> {
    let h = element_length(x_left, x_right)?;

    let mut stiffness_mat: ElementMatrix = matrix![
        1.0, -1.0;
        -1.0, 1.0;
    ];
    stiffness_mat /= h;

    Ok(stiffness_mat)
}

/// Calculates the load vector of a linear element. The source term is
/// interpolated linearly between the two nodes and integrated exactly against
/// the hat functions.
///
/// # Arguments
/// * `x_left` - The left node coordinate
/// * `x_right` - The right node coordinate
/// * `source` - The source term `s(x)`
///
/// # Returns
/// A 2-entry load vector
pub fn local_load<F>(x_left: f64, x_right: f64, source: F) -> Result<ElementVector, ThermiteError>
where
    F: Fn(f64) -> f64,
{
    let h = element_length(x_left, x_right)?;

    let s_left = source(x_left);
    let s_right = source(x_right);
    if !s_left.is_finite() || !s_right.is_finite() {
        return Err(ThermiteError::DegenerateElement {
            left: x_left,
            right: x_right,
            reason: format!("source term is not finite (s_left={s_left}, s_right={s_right})"),
        });
    }

    let load_vec: ElementVector =
        vector![2.0 * s_left + s_right, s_left + 2.0 * s_right] * (h / 6.0);

    if load_vec.iter().any(|f| !f.is_finite()) {
        return Err(ThermiteError::DegenerateElement {
            left: x_left,
            right: x_right,
            reason: "load vector overflowed".to_owned(),
        });
    }

    Ok(load_vec)
}

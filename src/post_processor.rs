use std::io::Write;

use tracing::info;

use crate::{datatypes::Solution, error::ThermiteError};

/// Writes the nodal solution as `x,T` rows
///
/// # Arguments
/// * `solution` - The solved problem
/// * `writer` - Where to write the csv
pub fn write_csv<W: Write>(solution: &Solution, mut writer: W) -> Result<(), ThermiteError> {
    let to_error =
        |err: std::io::Error| ThermiteError::PostProcessor(format!("Failed to write csv: {err}"));

    writeln!(writer, "x,T").map_err(to_error)?;
    for (x, t) in solution.coordinates.iter().zip(&solution.values) {
        writeln!(writer, "{x},{t}").map_err(to_error)?;
    }
    writer.flush().map_err(to_error)?;

    Ok(())
}

/// Writes simulation results to a CSV file
///
/// # Arguments
/// * `solution` - The solved problem
/// * `output` - The filename of the output csv
pub fn csv_output(solution: &Solution, output: &str) -> Result<(), ThermiteError> {
    let file = match std::fs::File::create(output) {
        Ok(f) => f,
        Err(err) => {
            return Err(ThermiteError::PostProcessor(format!(
                "Failed to create {output}: {err}"
            )));
        }
    };

    write_csv(solution, std::io::BufWriter::new(file))?;

    info!("wrote {} nodes to {output}", solution.values.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Reaction;

    fn sample_solution() -> Solution {
        Solution {
            coordinates: vec![0.0, 0.5, 1.0],
            values: vec![0.25, 0.125, 0.0],
            reactions: vec![Reaction {
                node: 2,
                x: 1.0,
                value: -0.375,
            }],
        }
    }

    #[test]
    fn csv_has_header_and_one_row_per_node() {
        let mut buffer: Vec<u8> = Vec::new();
        write_csv(&sample_solution(), &mut buffer).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "x,T\n0,0.25\n0.5,0.125\n1,0\n");
    }

    #[test]
    fn csv_output_writes_file() {
        let path = std::env::temp_dir().join(format!("thermite-{}.csv", std::process::id()));
        let path_str = path.to_str().unwrap();

        csv_output(&sample_solution(), path_str).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("x,T\n"));
    }

    #[test]
    fn csv_output_to_missing_directory_fails() {
        let res = csv_output(&sample_solution(), "/nonexistent/thermite/out.csv");
        assert!(matches!(res, Err(ThermiteError::PostProcessor(_))));
    }
}

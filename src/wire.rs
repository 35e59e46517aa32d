//! The wire codec: two-way translation between in-memory entities and the
//! solver's text formats.
//!
//! A mesh travels to the solver as a `.msh` file (positional text layout);
//! meshes, sparse matrices and vectors travel back inside the solver's
//! stdout, each value delimited by a flag line the generating script prints
//! twice (open/close).

use std::collections::HashMap;

use nalgebra::DVector;
use nalgebra_sparse::CooMatrix;

use crate::error::FeldsparError;
use crate::label::Label;
use crate::mesh::{BoundaryEdges, TriMesh, Vertex};

/// How many leading lines of a matrix section may precede the numeric header.
const MATRIX_HEADER_SCAN: usize = 10;

/// Renders a mesh in the solver's `.msh` layout.
///
/// Line 1 is `nv nt ne`; then one line per node (`x y label`), one per
/// triangle (`i j k label`, 1-based node indices) and one per boundary edge
/// (`start end label`, 1-based, integer labels).
pub fn mesh_to_msh(mesh: &TriMesh) -> String {
    let edge_rows = mesh.boundary_edge_rows();

    let mut out = String::new();

    out += &format!(
        "{} {} {}\n",
        mesh.nodes.len(),
        mesh.triangles.len(),
        edge_rows.len()
    );

    for (node, label) in mesh.nodes.iter().zip(&mesh.node_labels) {
        out += &format!("{} {} {}\n", node.x, node.y, label);
    }

    for (triangle, label) in mesh.triangles.iter().zip(&mesh.triangle_labels) {
        out += &format!(
            "{} {} {} {}\n",
            triangle[0] + 1,
            triangle[1] + 1,
            triangle[2] + 1,
            label
        );
    }

    for (start, end, label) in edge_rows {
        out += &format!("{} {} {}\n", start + 1, end + 1, label);
    }

    out
}

/// Writes a mesh to `path` in the `.msh` layout.
pub fn savemesh(mesh: &TriMesh, path: &str) -> Result<(), FeldsparError> {
    match std::fs::write(path, mesh_to_msh(mesh)) {
        Ok(()) => Ok(()),
        Err(err) => Err(FeldsparError::Input(format!(
            "Unable to write mesh file {}: {}",
            path, err
        ))),
    }
}

/// Reads a mesh from a `.msh` file.
pub fn loadmesh(path: &str) -> Result<TriMesh, FeldsparError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            return Err(FeldsparError::Input(format!(
                "Unable to open mesh file {}: {}",
                path, err
            )))
        }
    };

    parse_msh(&contents)
}

/// Parses the `.msh` layout back into a mesh.
pub fn parse_msh(text: &str) -> Result<TriMesh, FeldsparError> {
    let mut tokens = text.split_whitespace();

    let mut next_f64 = move || -> Result<f64, FeldsparError> {
        match tokens.next() {
            Some(token) => token.parse().map_err(|_| {
                FeldsparError::Parse(format!("non-numeric value {:?} in mesh file", token))
            }),
            None => Err(FeldsparError::Parse("truncated mesh file".to_owned())),
        }
    };

    let nv = next_f64()? as usize;
    let nt = next_f64()? as usize;
    let ne = next_f64()? as usize;

    let mut nodes = Vec::with_capacity(nv);
    let mut node_labels = Vec::with_capacity(nv);
    for _ in 0..nv {
        let (x, y, label) = (next_f64()?, next_f64()?, next_f64()?);
        nodes.push(Vertex { x, y });
        node_labels.push(label as i64);
    }

    let mut triangles = Vec::with_capacity(nt);
    let mut triangle_labels = Vec::with_capacity(nt);
    for _ in 0..nt {
        let (i, j, k, label) = (next_f64()?, next_f64()?, next_f64()?, next_f64()?);
        triangles.push([i as usize - 1, j as usize - 1, k as usize - 1]);
        triangle_labels.push(label as i64);
    }

    let mut mesh = TriMesh::with_labels(nodes, triangles, node_labels, triangle_labels)?;

    let mut keyed = HashMap::new();
    for _ in 0..ne {
        let (start, end, label) = (next_f64()?, next_f64()?, next_f64()?);

        if let Some(key) = mesh.resolve_node_pair(start as usize - 1, end as usize - 1) {
            keyed.insert(key, Label::Int(label as i64));
        }
    }
    mesh.add_boundary_edges(BoundaryEdges::Keyed(keyed), None);

    Ok(mesh)
}

/// Extracts the window between the first two occurrences of `flag` on its
/// own line.
///
/// # Arguments
/// * `stream` - The full solver output
/// * `flag` - The sentinel line delimiting the window
///
/// # Returns
/// The window contents. If the closing flag is missing, the rest of the
/// stream is the window.
pub fn parse_flagged_section(stream: &str, flag: &str) -> Result<String, FeldsparError> {
    let padded = format!("\n{}\n", stream);
    let marker = format!("\n{}\n", flag);

    let mut parts = padded.splitn(3, &marker);
    parts.next();

    match parts.next() {
        Some(window) => Ok(window.to_owned()),
        None => Err(FeldsparError::Parse(format!(
            "flag {:?} not found in solver output",
            flag
        ))),
    }
}

fn parse_numeric_rows(
    text: &str,
    expected: usize,
    what: &str,
) -> Result<Vec<Vec<f64>>, FeldsparError> {
    let mut rows = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Result<Vec<f64>, _> = line.split_whitespace().map(str::parse).collect();

        match fields {
            Ok(fields) if fields.len() == expected => rows.push(fields),
            Ok(fields) => {
                return Err(FeldsparError::Parse(format!(
                    "expected {} fields per {} row, found {}",
                    expected,
                    what,
                    fields.len()
                )))
            }
            Err(_) => {
                return Err(FeldsparError::Parse(format!(
                    "non-numeric value in {} row: {:?}",
                    what, line
                )))
            }
        }
    }

    Ok(rows)
}

/// Decodes a mesh from the window of a mesh output.
///
/// The window holds three inner sections flagged `<flag> NODES`,
/// `<flag> TRIANGLES` and `<flag> BOUNDARIES`; node references on boundary
/// and triangle rows are 1-based.
pub fn parse_mesh_output(window: &str, flag: &str) -> Result<TriMesh, FeldsparError> {
    let nodes_text = parse_flagged_section(window, &format!("{} NODES", flag))?;
    let triangles_text = parse_flagged_section(window, &format!("{} TRIANGLES", flag))?;
    let boundaries_text = parse_flagged_section(window, &format!("{} BOUNDARIES", flag))?;

    let node_rows = parse_numeric_rows(&nodes_text, 3, "node")?;
    let triangle_rows = parse_numeric_rows(&triangles_text, 4, "triangle")?;
    let boundary_rows = parse_numeric_rows(&boundaries_text, 3, "boundary")?;

    let mut nodes = Vec::with_capacity(node_rows.len());
    let mut node_labels = Vec::with_capacity(node_rows.len());
    for row in node_rows {
        nodes.push(Vertex { x: row[0], y: row[1] });
        node_labels.push(row[2] as i64);
    }

    let mut triangles = Vec::with_capacity(triangle_rows.len());
    let mut triangle_labels = Vec::with_capacity(triangle_rows.len());
    for row in triangle_rows {
        triangles.push([
            row[0] as usize - 1,
            row[1] as usize - 1,
            row[2] as usize - 1,
        ]);
        triangle_labels.push(row[3] as i64);
    }

    let mut mesh = TriMesh::with_labels(nodes, triangles, node_labels, triangle_labels)?;

    let mut keyed = HashMap::new();
    for row in boundary_rows {
        let (start, end) = (row[0] as usize - 1, row[1] as usize - 1);

        if let Some(key) = mesh.resolve_node_pair(start, end) {
            keyed.insert(key, Label::Int(row[2] as i64));
        }
    }
    mesh.add_boundary_edges(BoundaryEdges::Keyed(keyed), None);

    Ok(mesh)
}

/// Decodes a sparse matrix from the window of a matrix output.
///
/// The solver has printed its matrix in one of two historical layouts:
/// a 4-field header `nrow ncol is_sym nnz` followed by 1-based triplets
/// (FreeFem++ 3.x), or a 7-field header with `nrow ncol nnz` leading,
/// followed by 0-based triplets (FreeFem++ 4.x). The header is the first
/// line whose fields all parse as integers.
pub fn parse_matrix_output(window: &str) -> Result<CooMatrix<f64>, FeldsparError> {
    let lines: Vec<&str> = window
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut header: Option<(usize, Vec<i64>)> = None;

    for (index, line) in lines.iter().take(MATRIX_HEADER_SCAN).enumerate() {
        let fields: Result<Vec<i64>, _> = line.split_whitespace().map(str::parse).collect();

        if let Ok(fields) = fields {
            if fields.len() >= 2 {
                header = Some((index, fields));
                break;
            }
        }
    }

    let (header_index, fields) = match header {
        Some(h) => h,
        None => {
            return Err(FeldsparError::Parse(
                "no matrix header found in flagged section".to_owned(),
            ))
        }
    };

    let (nb_row, nb_col, nb_coef, index_offset): (i64, i64, i64, i64) = match fields.len() {
        4 => (fields[0], fields[1], fields[3], 1),
        7 => (fields[0], fields[1], fields[2], 0),
        arity => {
            return Err(FeldsparError::Parse(format!(
                "unexpected matrix header arity {}",
                arity
            )))
        }
    };

    let triplet_rows = parse_numeric_rows(
        &lines[header_index + 1..].join("\n"),
        3,
        "matrix coefficient",
    )?;

    if triplet_rows.len() < nb_coef as usize {
        return Err(FeldsparError::Parse(format!(
            "matrix section truncated: header announces {} coefficients, found {}",
            nb_coef,
            triplet_rows.len()
        )));
    }

    let mut row_indices = Vec::with_capacity(nb_coef as usize);
    let mut col_indices = Vec::with_capacity(nb_coef as usize);
    let mut values = Vec::with_capacity(nb_coef as usize);

    for row in triplet_rows.iter().take(nb_coef as usize) {
        let i = row[0] as i64 - index_offset;
        let j = row[1] as i64 - index_offset;

        if i < 0 || j < 0 {
            return Err(FeldsparError::Parse(format!(
                "matrix triplet index ({}, {}) below the format's index base",
                row[0], row[1]
            )));
        }

        row_indices.push(i as usize);
        col_indices.push(j as usize);
        values.push(row[2]);
    }

    match CooMatrix::try_from_triplets(
        nb_row as usize,
        nb_col as usize,
        row_indices,
        col_indices,
        values,
    ) {
        Ok(matrix) => Ok(matrix),
        Err(err) => Err(FeldsparError::Parse(format!(
            "invalid matrix triplets: {}",
            err
        ))),
    }
}

/// Decodes a dense vector from the window of a vector output: one value per
/// line, blank lines ignored.
pub fn parse_vector_output(window: &str) -> Result<DVector<f64>, FeldsparError> {
    let mut values = Vec::new();

    for line in window.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.parse::<f64>() {
            Ok(value) => values.push(value),
            Err(_) => {
                return Err(FeldsparError::Parse(format!(
                    "non-numeric value in vector section: {:?}",
                    line
                )))
            }
        }
    }

    Ok(DVector::from_vec(values))
}

/// Builds a diagnostic for a failed solver run.
///
/// The solver reports errors against the generated script, not against
/// anything the caller wrote, so the offending line is quoted with some
/// context. When no line number can be recovered, the tail of the solver
/// output is quoted instead.
pub fn annotate_solver_error(script: &str, solver_output: &str) -> String {
    const NEEDLE: &str = "Error line number";

    let line_number = solver_output.find(NEEDLE).and_then(|position| {
        let rest = solver_output[position + NEEDLE.len()..].trim_start();
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits.parse::<usize>().ok()
    });

    match line_number {
        Some(n) if n >= 1 => {
            let lines: Vec<&str> = script.lines().collect();
            let first = n.saturating_sub(2);
            let last = (n + 1).min(lines.len());

            let mut context = String::new();
            for i in first..last {
                let marker = if i + 1 == n { ">" } else { " " };
                context += &format!("{} {:>4} | {}\n", marker, i + 1, lines[i]);
            }

            format!(
                "solver failed at line {} of the generated script:\n{}",
                n, context
            )
        }
        _ => {
            let tail: Vec<&str> = solver_output
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<&str>>()
                .into_iter()
                .rev()
                .collect();

            format!(
                "solver exited with an error; last output lines:\n{}",
                tail.join("\n")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::label::LabelMap;

    fn sample_mesh() -> TriMesh {
        let mut mesh = TriMesh::new(
            vec![
                Vertex { x: 0.0, y: 0.0 },
                Vertex { x: 1.0, y: 0.0 },
                Vertex { x: 1.0, y: 1.0 },
                Vertex { x: 0.0, y: 1.0 },
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        );

        mesh.add_boundary_edges(
            BoundaryEdges::NodePairs(vec![(0, 1), (1, 2)]),
            Some("river".into()),
        );
        mesh.add_boundary_edges(
            BoundaryEdges::NodePairs(vec![(2, 3), (3, 0)]),
            Some(1.into()),
        );

        mesh
    }

    #[test]
    fn msh_round_trip_preserves_geometry_and_labels() {
        let mesh = sample_mesh();
        let text = mesh_to_msh(&mesh);
        let restored = parse_msh(&text).unwrap();

        assert_eq!(restored.nodes.len(), mesh.nodes.len());
        assert_eq!(restored.triangles, mesh.triangles);
        assert_eq!(restored.node_labels, mesh.node_labels);
        assert_eq!(restored.triangle_labels, mesh.triangle_labels);

        for (node, restored_node) in mesh.nodes.iter().zip(&restored.nodes) {
            assert_relative_eq!(node.x, restored_node.x);
            assert_relative_eq!(node.y, restored_node.y);
        }

        // Labels compare after registry normalization: "river" became an
        // integer on the wire.
        let map = LabelMap::derive(mesh.boundary_edges().values());
        for (key, label) in mesh.boundary_edges() {
            let expected = Label::Int(map.to_int(label).unwrap());
            assert_eq!(restored.boundary_edges()[key], expected);
        }
    }

    #[test]
    fn msh_header_counts_match_body() {
        let mesh = sample_mesh();
        let text = mesh_to_msh(&mesh);
        let first_line = text.lines().next().unwrap();

        assert_eq!(first_line, "4 2 4");
        assert_eq!(text.lines().count(), 1 + 4 + 2 + 4);
    }

    #[test]
    fn flagged_section_is_window_between_flags() {
        let stream = "noise\n# FLAG > A\npayload\n# FLAG > A\nmore noise\n";
        let window = parse_flagged_section(stream, "# FLAG > A").unwrap();
        assert_eq!(window, "payload");
    }

    #[test]
    fn missing_flag_is_a_parse_error() {
        let err = parse_flagged_section("nothing here\n", "# FLAG > A").unwrap_err();
        assert!(matches!(err, FeldsparError::Parse(_)));
    }

    #[test]
    fn legacy_matrix_header_is_one_based() {
        let window = "\
# Sparse Matrix (Morse)
# first line: n m (is symmetic) nbcoef
2 2 0 3
1 1 4.0
1 2 -1.0
2 2 2.5
";
        let matrix = parse_matrix_output(window).unwrap();

        assert_eq!(matrix.nrows(), 2);
        assert_eq!(matrix.ncols(), 2);
        assert_eq!(matrix.nnz(), 3);

        let triplets: Vec<(usize, usize, f64)> = matrix
            .triplet_iter()
            .map(|(i, j, v)| (i, j, *v))
            .collect();
        assert!(triplets.contains(&(0, 0, 4.0)));
        assert!(triplets.contains(&(0, 1, -1.0)));
        assert!(triplets.contains(&(1, 1, 2.5)));
    }

    #[test]
    fn newer_matrix_header_is_zero_based() {
        let window = "\
#  HashMatrix Matrix (COO)
#    n       m        nnz     half     fortran   state
3 3 2 0 0 0 0
0 0 1.5
2 1 -3.0
";
        let matrix = parse_matrix_output(window).unwrap();

        assert_eq!(matrix.nrows(), 3);
        assert_eq!(matrix.nnz(), 2);

        let triplets: Vec<(usize, usize, f64)> = matrix
            .triplet_iter()
            .map(|(i, j, v)| (i, j, *v))
            .collect();
        assert!(triplets.contains(&(0, 0, 1.5)));
        assert!(triplets.contains(&(2, 1, -3.0)));
    }

    #[test]
    fn matrix_parse_is_idempotent() {
        let window = "2 3 0 2\n1 1 1.0\n2 3 -2.0\n";
        let first = parse_matrix_output(window).unwrap();

        // Re-encode in the legacy layout with the same ordering and decode
        // again.
        let mut re_encoded = format!(
            "{} {} 0 {}\n",
            first.nrows(),
            first.ncols(),
            first.nnz()
        );
        for (i, j, v) in first.triplet_iter() {
            re_encoded += &format!("{} {} {}\n", i + 1, j + 1, v);
        }
        let second = parse_matrix_output(&re_encoded).unwrap();

        assert_eq!(first.nrows(), second.nrows());
        assert_eq!(first.ncols(), second.ncols());

        let mut first_triplets: Vec<(usize, usize, String)> = first
            .triplet_iter()
            .map(|(i, j, v)| (i, j, format!("{}", v)))
            .collect();
        let mut second_triplets: Vec<(usize, usize, String)> = second
            .triplet_iter()
            .map(|(i, j, v)| (i, j, format!("{}", v)))
            .collect();
        first_triplets.sort();
        second_triplets.sort();
        assert_eq!(first_triplets, second_triplets);
    }

    #[test]
    fn truncated_matrix_section_is_a_parse_error() {
        let window = "2 2 0 3\n1 1 4.0\n";
        let err = parse_matrix_output(window).unwrap_err();
        assert!(matches!(err, FeldsparError::Parse(_)));
    }

    #[test]
    fn unexpected_header_arity_is_a_parse_error() {
        let window = "2 2 0\n1 1 4.0\n";
        let err = parse_matrix_output(window).unwrap_err();
        assert!(matches!(err, FeldsparError::Parse(_)));
    }

    #[test]
    fn vector_section_parses_one_value_per_line() {
        let window = "0.5\n-1\n2e3\n\n";
        let vector = parse_vector_output(window).unwrap();

        assert_eq!(vector.len(), 3);
        assert_relative_eq!(vector[0], 0.5);
        assert_relative_eq!(vector[1], -1.0);
        assert_relative_eq!(vector[2], 2000.0);
    }

    #[test]
    fn mesh_output_window_round_trips() {
        // Simulate the solver echoing a mesh between derived section flags.
        let mesh = sample_mesh();
        let flag = "# FLAG > TH";

        let mut stream = String::new();
        stream += &format!("{} NODES\n", flag);
        for (node, label) in mesh.nodes.iter().zip(&mesh.node_labels) {
            stream += &format!("{} {} {}\n", node.x, node.y, label);
        }
        stream += &format!("{} NODES\n", flag);
        stream += &format!("{} TRIANGLES\n", flag);
        for (triangle, label) in mesh.triangles.iter().zip(&mesh.triangle_labels) {
            stream += &format!(
                "{} {} {} {}\n",
                triangle[0] + 1,
                triangle[1] + 1,
                triangle[2] + 1,
                label
            );
        }
        stream += &format!("{} TRIANGLES\n", flag);
        stream += &format!("{} BOUNDARIES\n", flag);
        for (start, end, label) in mesh.boundary_edge_rows() {
            stream += &format!("{} {} {}\n", start + 1, end + 1, label);
        }
        stream += &format!("{} BOUNDARIES\n", flag);

        let restored = parse_mesh_output(&stream, flag).unwrap();

        assert_eq!(restored.triangles, mesh.triangles);
        assert_eq!(restored.boundary_edges().len(), mesh.boundary_edges().len());
    }

    #[test]
    fn solver_error_is_mapped_to_script_line() {
        let script = "line one\nline two\nbroken line\nline four\n";
        let output = "some noise\n  Error line number 3, in file ...\n";

        let message = annotate_solver_error(script, output);

        assert!(message.contains("line 3"));
        assert!(message.contains("broken line"));
    }

    #[test]
    fn missing_line_number_falls_back_to_output_tail() {
        let message = annotate_solver_error("body\n", "something exploded\n");
        assert!(message.contains("something exploded"));
    }
}

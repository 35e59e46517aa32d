//! Mesh export and import as JSON.
//!
//! Boundary edges are flattened to `[triangle, vertex, label]` rows because
//! JSON objects cannot key on tuples.

use json::JsonValue;

use crate::error::FeldsparError;
use crate::label::Label;
use crate::mesh::{BoundaryEdges, TriMesh, TriangleEdge, Vertex};

/// Renders a mesh as a JSON value.
pub fn mesh_to_json(mesh: &TriMesh) -> JsonValue {
    let mut obj = JsonValue::new_object();

    obj["x"] = mesh.nodes.iter().map(|node| node.x).collect::<Vec<f64>>().into();
    obj["y"] = mesh.nodes.iter().map(|node| node.y).collect::<Vec<f64>>().into();
    obj["node_labels"] = mesh.node_labels.clone().into();
    obj["triangles"] = mesh
        .triangles
        .iter()
        .map(|triangle| triangle.to_vec())
        .collect::<Vec<Vec<usize>>>()
        .into();
    obj["triangle_labels"] = mesh.triangle_labels.clone().into();

    let mut keys: Vec<&TriangleEdge> = mesh.boundary_edges().keys().collect();
    keys.sort();

    let mut edge_rows: Vec<JsonValue> = Vec::with_capacity(keys.len());
    for key in keys {
        let label_json = match &mesh.boundary_edges()[key] {
            Label::Int(i) => JsonValue::from(*i),
            Label::Symbolic(s) => JsonValue::from(s.as_str()),
        };

        edge_rows.push(JsonValue::Array(vec![
            JsonValue::from(key.triangle),
            JsonValue::from(key.vertex),
            label_json,
        ]));
    }
    obj["boundary_edges"] = JsonValue::Array(edge_rows);

    obj
}

/// Serializes a mesh to a JSON string.
pub fn mesh_to_json_string(mesh: &TriMesh) -> String {
    mesh_to_json(mesh).dump()
}

/// Parses a mesh back from its JSON form.
pub fn mesh_from_json(source: &str) -> Result<TriMesh, FeldsparError> {
    let parsed = match json::parse(source) {
        Ok(value) => value,
        Err(err) => return Err(FeldsparError::Input(format!("Error in mesh json: {}", err))),
    };

    for field in ["x", "y", "triangles", "node_labels", "triangle_labels"] {
        if !parsed.has_key(field) {
            return Err(FeldsparError::Input(format!(
                "Mesh json missing {} field",
                field
            )));
        }
    }

    let xs: Vec<f64> = parsed["x"]
        .members()
        .map(|v| v.as_f64())
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| FeldsparError::Input("Non-float value in mesh json x field".to_owned()))?;
    let ys: Vec<f64> = parsed["y"]
        .members()
        .map(|v| v.as_f64())
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| FeldsparError::Input("Non-float value in mesh json y field".to_owned()))?;

    if xs.len() != ys.len() {
        return Err(FeldsparError::Input(format!(
            "{} x coordinates for {} y coordinates in mesh json",
            xs.len(),
            ys.len()
        )));
    }

    let nodes: Vec<Vertex> = xs
        .into_iter()
        .zip(ys)
        .map(|(x, y)| Vertex { x, y })
        .collect();

    let mut triangles: Vec<[usize; 3]> = Vec::new();
    for member in parsed["triangles"].members() {
        let corners: Option<Vec<usize>> = member.members().map(|v| v.as_usize()).collect();
        match corners {
            Some(corners) if corners.len() == 3 => {
                triangles.push([corners[0], corners[1], corners[2]]);
            }
            _ => {
                return Err(FeldsparError::Input(
                    "Malformed triangle row in mesh json".to_owned(),
                ))
            }
        }
    }

    let node_labels: Vec<i64> = parsed["node_labels"]
        .members()
        .map(|v| v.as_i64())
        .collect::<Option<Vec<i64>>>()
        .ok_or_else(|| FeldsparError::Input("Non-integer node label in mesh json".to_owned()))?;
    let triangle_labels: Vec<i64> = parsed["triangle_labels"]
        .members()
        .map(|v| v.as_i64())
        .collect::<Option<Vec<i64>>>()
        .ok_or_else(|| {
            FeldsparError::Input("Non-integer triangle label in mesh json".to_owned())
        })?;

    let mut mesh = TriMesh::with_labels(nodes, triangles, node_labels, triangle_labels)?;

    let mut triples: Vec<(usize, usize, Label)> = Vec::new();
    for row in parsed["boundary_edges"].members() {
        let fields: Vec<&JsonValue> = row.members().collect();

        let parsed_row = match fields.as_slice() {
            [triangle, vertex, label] => {
                let label = if let Some(i) = label.as_i64() {
                    Some(Label::Int(i))
                } else {
                    label.as_str().map(Label::from)
                };

                match (triangle.as_usize(), vertex.as_usize(), label) {
                    (Some(t), Some(v), Some(l)) => Some((t, v, l)),
                    _ => None,
                }
            }
            _ => None,
        };

        match parsed_row {
            Some(triple) => triples.push(triple),
            None => {
                return Err(FeldsparError::Input(
                    "Malformed boundary edge row in mesh json".to_owned(),
                ))
            }
        }
    }
    mesh.add_boundary_edges(BoundaryEdges::Triples(triples), None);

    Ok(mesh)
}

/// Writes a mesh to `path` as JSON.
pub fn save_mesh_json(mesh: &TriMesh, path: &str) -> Result<(), FeldsparError> {
    match std::fs::write(path, mesh_to_json_string(mesh)) {
        Ok(()) => Ok(()),
        Err(err) => Err(FeldsparError::Input(format!(
            "Unable to write mesh json {}: {}",
            path, err
        ))),
    }
}

/// Reads a mesh from a JSON file.
pub fn load_mesh_json(path: &str) -> Result<TriMesh, FeldsparError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            return Err(FeldsparError::Input(format!(
                "Unable to open mesh json {}: {}",
                path, err
            )))
        }
    };

    mesh_from_json(&contents)
}

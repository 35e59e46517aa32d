use std::collections::HashMap;

use crate::error::FeldsparError;
use crate::label::{invent_label, Label, LabelMap};
use crate::segments::{edges_to_segments, reorder_boundary, NodeEdge};

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

/// A directed triangle edge: the edge starting at local vertex `vertex` of
/// triangle `triangle`, proceeding counter-clockwise. `vertex` is 0, 1 or 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriangleEdge {
    pub triangle: usize,
    pub vertex: usize,
}

/// The shapes `TriMesh::add_boundary_edges` accepts.
///
/// The caller states the shape explicitly instead of having it guessed from
/// the data.
#[derive(Debug, Clone)]
pub enum BoundaryEdges {
    /// Directed triangle-edge keys with their labels.
    Keyed(HashMap<TriangleEdge, Label>),
    /// `(triangle_index, local_vertex, label)` rows.
    Triples(Vec<(usize, usize, Label)>),
    /// `(start_node, end_node)` pairs, resolved against the triangulation.
    NodePairs(Vec<(usize, usize)>),
    /// A polyline of node indices, expanded into consecutive pairs.
    Polyline(Vec<usize>),
}

/// A triangular mesh suited for FreeFem++.
///
/// Node coordinates and triangles carry parallel label lists (0 means
/// interior). Boundary edges are a sparse map from directed triangle-edge to
/// raw label; the mesh owns this map exclusively, and every derived view is
/// computed fresh from it.
#[derive(Debug, Clone, Default)]
pub struct TriMesh {
    pub nodes: Vec<Vertex>,
    pub node_labels: Vec<i64>,
    pub triangles: Vec<[usize; 3]>,
    pub triangle_labels: Vec<i64>,
    boundary_edges: HashMap<TriangleEdge, Label>,
}

impl TriMesh {
    /// Creates a mesh with all node and triangle labels set to 0.
    pub fn new(nodes: Vec<Vertex>, triangles: Vec<[usize; 3]>) -> TriMesh {
        let node_labels = vec![0; nodes.len()];
        let triangle_labels = vec![0; triangles.len()];

        TriMesh {
            nodes,
            node_labels,
            triangles,
            triangle_labels,
            boundary_edges: HashMap::new(),
        }
    }

    /// Creates a mesh with explicit node and triangle labels.
    pub fn with_labels(
        nodes: Vec<Vertex>,
        triangles: Vec<[usize; 3]>,
        node_labels: Vec<i64>,
        triangle_labels: Vec<i64>,
    ) -> Result<TriMesh, FeldsparError> {
        if node_labels.len() != nodes.len() {
            return Err(FeldsparError::Input(format!(
                "{} node labels for {} nodes",
                node_labels.len(),
                nodes.len()
            )));
        }
        if triangle_labels.len() != triangles.len() {
            return Err(FeldsparError::Input(format!(
                "{} triangle labels for {} triangles",
                triangle_labels.len(),
                triangles.len()
            )));
        }

        Ok(TriMesh {
            nodes,
            node_labels,
            triangles,
            triangle_labels,
            boundary_edges: HashMap::new(),
        })
    }

    pub fn boundary_edges(&self) -> &HashMap<TriangleEdge, Label> {
        &self.boundary_edges
    }

    /// `(triangle_index, local_vertex) -> (start_node, end_node)`
    pub fn node_edge(&self, edge: TriangleEdge) -> NodeEdge {
        let triangle = self.triangles[edge.triangle];
        let start = triangle[edge.vertex];
        let end = triangle[(edge.vertex + 1) % 3];

        (start, end)
    }

    /// Finds the triangle edge running from `start` to `end`, in that
    /// orientation. There can be at most one, since orientation is strict.
    pub fn find_triangle_edge(&self, start: usize, end: usize) -> Option<TriangleEdge> {
        for (triangle_index, triangle) in self.triangles.iter().enumerate() {
            for vertex in 0..3 {
                if triangle[vertex] == start && triangle[(vertex + 1) % 3] == end {
                    return Some(TriangleEdge {
                        triangle: triangle_index,
                        vertex,
                    });
                }
            }
        }

        None
    }

    /// Resolves a node pair to its owning triangle edge, trying the reversed
    /// orientation if the pair as given matches no triangle. Pairs matching
    /// neither orientation are lost; the loss is reported, not silent.
    pub fn resolve_node_pair(&self, start: usize, end: usize) -> Option<TriangleEdge> {
        if let Some(edge) = self.find_triangle_edge(start, end) {
            return Some(edge);
        }

        if let Some(edge) = self.find_triangle_edge(end, start) {
            println!("warning [mesh]: reversing boundary edge ({}, {})", start, end);
            return Some(edge);
        }

        println!(
            "warning [mesh]: boundary edge ({}, {}) matches no triangle; dropping it",
            start, end
        );
        None
    }

    /// Adds boundary edges in any of the [`BoundaryEdges`] shapes.
    ///
    /// Node-indexed shapes are resolved against the triangulation; when no
    /// `label` is given, a fresh integer label is invented and used for every
    /// edge added in this call.
    ///
    /// # Arguments
    /// * `edges` - The edges to add, in the shape the caller has them
    /// * `label` - The label for node-indexed shapes; keyed shapes carry
    ///     their own labels and ignore this
    pub fn add_boundary_edges(&mut self, edges: BoundaryEdges, label: Option<Label>) {
        match edges {
            BoundaryEdges::Keyed(keyed) => {
                for (key, edge_label) in keyed {
                    self.insert_edge(key, edge_label);
                }
            }

            BoundaryEdges::Triples(triples) => {
                for (triangle, vertex, edge_label) in triples {
                    self.insert_edge(TriangleEdge { triangle, vertex }, edge_label);
                }
            }

            BoundaryEdges::NodePairs(pairs) => {
                let label =
                    label.unwrap_or_else(|| invent_label(self.boundary_edges.values()));

                for (start, end) in pairs {
                    if let Some(key) = self.resolve_node_pair(start, end) {
                        self.insert_edge(key, label.clone());
                    }
                }
            }

            BoundaryEdges::Polyline(nodes) => {
                let pairs = nodes.windows(2).map(|pair| (pair[0], pair[1])).collect();
                self.add_boundary_edges(BoundaryEdges::NodePairs(pairs), label);
            }
        }
    }

    fn insert_edge(&mut self, key: TriangleEdge, label: Label) {
        if key.triangle >= self.triangles.len() || key.vertex > 2 {
            println!(
                "warning [mesh]: boundary edge key ({}, {}) is out of range; dropping it",
                key.triangle, key.vertex
            );
            return;
        }

        self.boundary_edges.insert(key, label);
    }

    /// Relabels boundary edges in place. Labels absent from `new_names` are
    /// left untouched.
    pub fn rename_boundary(&mut self, new_names: &HashMap<Label, Label>) {
        for label in self.boundary_edges.values_mut() {
            if let Some(new_label) = new_names.get(label) {
                *label = new_label.clone();
            }
        }
    }

    /// The label registry for the current boundary-edge set.
    pub fn label_map(&self) -> LabelMap {
        LabelMap::derive(self.boundary_edges.values())
    }

    /// Boundary edges as `(start_node, end_node, integer_label)` rows, the
    /// form the wire format wants. Rows are ordered by triangle-edge key so
    /// the output is reproducible.
    pub fn boundary_edge_rows(&self) -> Vec<(usize, usize, i64)> {
        let map = self.label_map();

        let mut keys: Vec<&TriangleEdge> = self.boundary_edges.keys().collect();
        keys.sort();

        keys.into_iter()
            .map(|&key| {
                let (start, end) = self.node_edge(key);
                let label = &self.boundary_edges[&key];
                let int_label = map
                    .to_int(label)
                    .expect("label missing from its own derived map");

                (start, end, int_label)
            })
            .collect()
    }

    /// Reconstructs the ordered boundaries: for each label, the list of
    /// maximal node-chain segments carrying that label.
    ///
    /// The result is computed fresh on every call and never aliases the
    /// underlying edge map.
    pub fn get_boundaries(&self) -> HashMap<Label, Vec<Vec<usize>>> {
        let mut keys: Vec<&TriangleEdge> = self.boundary_edges.keys().collect();
        keys.sort();

        let mut by_label: HashMap<Label, Vec<NodeEdge>> = HashMap::new();

        for &key in keys {
            let label = self.boundary_edges[&key].clone();
            by_label.entry(label).or_default().push(self.node_edge(key));
        }

        by_label
            .into_iter()
            .map(|(label, edges)| (label, edges_to_segments(&reorder_boundary(edges))))
            .collect()
    }
}

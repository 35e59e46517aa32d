//! feldspar: compose FreeFem++ programs, run the solver as a subprocess,
//! and decode meshes, sparse matrices and vectors from its output stream.
//!
//! The solver is a black box: it is invoked once per script, reads its
//! program from a file, and writes a single text stream to stdout. This
//! crate owns everything around that round trip: script composition with
//! typed inputs and outputs, the wire codec, and the triangular-mesh
//! boundary bookkeeping.

pub mod error;
pub mod export;
pub mod label;
pub mod mesh;
pub mod runner;
pub mod script;
pub mod segments;
pub mod wire;

pub use error::FeldsparError;
pub use label::{invent_label, Label, LabelMap};
pub use mesh::{BoundaryEdges, TriMesh, TriangleEdge, Vertex};
pub use runner::{FreeFem, SolverOutput};
pub use script::{Block, Data, DataKind, Input, Output, Script, ScriptArgs};

//! Script composition: ordered blocks of solver code with typed inputs and
//! outputs.
//!
//! A script renders to a single program text. Every block contributes, in
//! order: the injection code of its inputs (declaration plus a load from a
//! temp file, for file-backed data), its free-form body, and the extraction
//! code of its outputs (data printed between two occurrences of the output's
//! flag line).

use std::collections::HashMap;
use std::io::{Seek, SeekFrom, Write};

use nalgebra::DVector;
use nalgebra_sparse::CooMatrix;
use tempfile::NamedTempFile;

use crate::error::FeldsparError;
use crate::mesh::TriMesh;
use crate::runner::FreeFem;
use crate::wire;

/// Values supplied at run time for late-bound inputs, by input name.
pub type ScriptArgs = HashMap<String, Data>;

/// A value crossing the solver boundary.
#[derive(Debug, Clone)]
pub enum Data {
    Mesh(TriMesh),
    Matrix(CooMatrix<f64>),
    Vector(DVector<f64>),
    Int(i64),
    Real(f64),
}

/// The type tag of an input or output declaration, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Mesh,
    Matrix,
    Vector,
    Int,
    Real,
}

impl Data {
    pub fn kind(&self) -> DataKind {
        match self {
            Data::Mesh(_) => DataKind::Mesh,
            Data::Matrix(_) => DataKind::Matrix,
            Data::Vector(_) => DataKind::Vector,
            Data::Int(_) => DataKind::Int,
            Data::Real(_) => DataKind::Real,
        }
    }
}

/// Normalizes a name into a solver variable: alphanumeric runs capitalized
/// and concatenated. Non-ASCII characters are dropped.
pub fn freefemize_variable(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(|chunk| {
            let mut chars = chunk.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect()
}

/// Normalizes a name into a header: uppercase, non-alphanumeric runs
/// collapsed to single spaces.
pub fn freefemize_header(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// The sentinel line delimiting one value in the solver's output stream.
pub fn flagize(name: &str) -> String {
    format!("# FLAG > {}", freefemize_header(name))
}

fn header_frame(header: &str) -> String {
    let mut edp = String::from("\n/////////////////////////////\n");
    edp += "//\n";
    edp += &format!("//    {}\n", header);
    edp += "//\n";
    edp += "/////////////////////////////\n\n";
    edp
}

/// An output to harvest from the solver: a named, typed binding with a
/// unique flag.
#[derive(Debug)]
pub struct Output {
    name: String,
    solver_name: String,
    flag: String,
    kind: DataKind,
}

impl Output {
    pub fn new(name: &str, kind: DataKind) -> Output {
        Output {
            name: name.to_owned(),
            solver_name: freefemize_variable(name),
            flag: flagize(name),
            kind,
        }
    }

    /// Overrides the solver-side variable name (defaults to the normalized
    /// output name).
    pub fn with_solver_name(mut self, solver_name: &str) -> Output {
        self.solver_name = solver_name.to_owned();
        self
    }

    /// Overrides the flag (defaults to one derived from the output name).
    pub fn with_flag(mut self, flag: &str) -> Output {
        self.flag = flag.to_owned();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flag(&self) -> &str {
        &self.flag
    }

    /// The extraction code for this output, wrapped in its open/close flags.
    fn render(&self) -> String {
        let mut body = String::new();

        match self.kind {
            DataKind::Mesh => {
                let var = &self.solver_name;

                body += &format!("cout << \"{} NODES\" << endl;\n", self.flag);
                body += &format!(
                    "for (int nv = 0; nv < {var}.nv; nv++)\n\t{{\n\tcout << {var}(nv).x << \" \" << {var}(nv).y << \" \" << {var}(nv).label << endl;\n\t}}\n",
                );
                body += &format!("cout << \"{} NODES\" << endl;\n", self.flag);

                body += &format!("cout << \"{} TRIANGLES\" << endl;\n", self.flag);
                body += &format!(
                    "for (int nt = 0; nt < {var}.nt; nt++)\n\t{{\n\tcout << {var}[nt][0] + 1 << \" \" << {var}[nt][1] + 1 << \" \" << {var}[nt][2] + 1 << \" \" << {var}[nt].label << endl;\n\t}}\n",
                );
                body += &format!("cout << \"{} TRIANGLES\" << endl;\n", self.flag);

                body += &format!("cout << \"{} BOUNDARIES\" << endl;\n", self.flag);
                body += &format!(
                    "for (int ne = 0; ne < {var}.nbe; ne++)\n\t{{\n\tcout << {var}.be(ne)[0] + 1 << \" \" << {var}.be(ne)[1] + 1 << \" \" << {var}.be(ne).label << endl;\n\t}}\n",
                );
                body += &format!("cout << \"{} BOUNDARIES\" << endl;\n", self.flag);
            }

            DataKind::Matrix => {
                body += &format!("cout << {};\n", self.solver_name);
            }

            DataKind::Vector => {
                let var = &self.solver_name;
                body += &format!(
                    "for (int nVector = 0; nVector < {var}.n; nVector++)\n\t{{\n\tcout << {var}[][nVector] << endl;\n\t}}\n",
                );
            }

            DataKind::Int | DataKind::Real => {
                body += &format!("cout << {} << endl;\n", self.solver_name);
            }
        }

        format!(
            "cout << \"{flag}\" << endl;\n{body}cout << \"{flag}\" << endl;\n",
            flag = self.flag,
            body = body
        )
    }

    /// Decodes this output's value from the full solver stream.
    pub fn parse(&self, stream: &str) -> Result<Data, FeldsparError> {
        let window = wire::parse_flagged_section(stream, &self.flag)?;

        match self.kind {
            DataKind::Mesh => Ok(Data::Mesh(wire::parse_mesh_output(&window, &self.flag)?)),
            DataKind::Matrix => Ok(Data::Matrix(wire::parse_matrix_output(&window)?)),
            DataKind::Vector => Ok(Data::Vector(wire::parse_vector_output(&window)?)),
            DataKind::Int => match window.trim().parse::<i64>() {
                Ok(value) => Ok(Data::Int(value)),
                Err(_) => Err(FeldsparError::Parse(format!(
                    "output {:?} is not an integer: {:?}",
                    self.name,
                    window.trim()
                ))),
            },
            DataKind::Real => match window.trim().parse::<f64>() {
                Ok(value) => Ok(Data::Real(value)),
                Err(_) => Err(FeldsparError::Parse(format!(
                    "output {:?} is not a number: {:?}",
                    self.name,
                    window.trim()
                ))),
            },
        }
    }
}

/// An input to inject into the solver: a named, typed binding whose value
/// comes either from the declaration itself or from the run arguments.
#[derive(Debug)]
pub struct Input {
    name: String,
    solver_name: String,
    kind: DataKind,
    source: Option<Data>,
    declare: bool,
    space: String,
    temp: Option<NamedTempFile>,
}

impl Input {
    pub fn new(name: &str, data: Data) -> Input {
        let kind = data.kind();

        Input {
            name: name.to_owned(),
            solver_name: freefemize_variable(name),
            kind,
            source: Some(data),
            declare: true,
            space: "Vh".to_owned(),
            temp: None,
        }
    }

    /// Declares an input whose value is supplied later, through the run
    /// arguments.
    pub fn late(name: &str, kind: DataKind) -> Input {
        Input {
            name: name.to_owned(),
            solver_name: freefemize_variable(name),
            kind,
            source: None,
            declare: true,
            space: "Vh".to_owned(),
            temp: None,
        }
    }

    /// Overrides the solver-side variable name.
    pub fn with_solver_name(mut self, solver_name: &str) -> Input {
        self.solver_name = solver_name.to_owned();
        self
    }

    /// Skips the declaration statement: the script only assigns the value,
    /// for variables declared earlier in the program.
    pub fn without_declaration(mut self) -> Input {
        self.declare = false;
        self
    }

    /// Sets the finite-element space a vector input is declared over
    /// (defaults to `Vh`).
    pub fn in_space(mut self, space: &str) -> Input {
        self.space = space.to_owned();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The injection code for this input. Allocates the input's temp file on
    /// first render; later renders reuse it.
    fn render(&mut self, args: &ScriptArgs) -> Result<String, FeldsparError> {
        let source = match (&self.source, args.get(&self.name)) {
            (Some(data), _) => data,
            (None, Some(data)) => data,
            (None, None) => {
                return Err(FeldsparError::Script(format!(
                    "no value supplied for input {:?}",
                    self.name
                )))
            }
        };

        if source.kind() != self.kind {
            return Err(FeldsparError::Script(format!(
                "input {:?} declared as {:?} but received {:?}",
                self.name,
                self.kind,
                source.kind()
            )));
        }

        match source {
            Data::Mesh(mesh) => {
                let contents = wire::mesh_to_msh(mesh);
                let path = self.write_temp(".msh", &contents)?;

                let mut edp = String::new();
                if self.declare {
                    edp += &format!("mesh {};\n", self.solver_name);
                }
                edp += &format!("{} = readmesh(\"{}\");\n", self.solver_name, path);
                Ok(edp)
            }

            Data::Vector(vector) => {
                let mut contents = String::new();
                for value in vector.iter() {
                    contents += &format!("{:?}\n", value);
                }
                let path = self.write_temp(".ffv", &contents)?;

                let var = &self.solver_name;
                let mut edp = String::new();
                if self.declare {
                    edp += &format!("{} {};\n", self.space, var);
                }
                edp += &format!(
                    "{{\n\tifstream InputFile(\"{path}\");\n\tfor (int i = 0; i < {var}.n; i++)\n\t\t{{\n\t\tInputFile >> {var}[][i];\n\t\t}}\n}}\n",
                );
                Ok(edp)
            }

            Data::Int(value) => {
                if self.declare {
                    Ok(format!("int {} = {};\n", self.solver_name, value))
                } else {
                    Ok(format!("{} = {};\n", self.solver_name, value))
                }
            }

            Data::Real(value) => {
                if self.declare {
                    Ok(format!("real {} = {:?};\n", self.solver_name, value))
                } else {
                    Ok(format!("{} = {:?};\n", self.solver_name, value))
                }
            }

            Data::Matrix(_) => Err(FeldsparError::Script(format!(
                "input {:?}: the solver has no matrix reader; pass matrices as vectors or rebuild them in the script",
                self.name
            ))),
        }
    }

    fn write_temp(&mut self, suffix: &str, contents: &str) -> Result<String, FeldsparError> {
        if self.temp.is_none() {
            let file = match tempfile::Builder::new().suffix(suffix).tempfile() {
                Ok(f) => f,
                Err(err) => {
                    return Err(FeldsparError::Script(format!(
                        "Failed to create temp file for input {:?}: {}",
                        self.name, err
                    )))
                }
            };
            self.temp = Some(file);
        }

        let file = self.temp.as_mut().unwrap();

        // Re-renders rewrite the file from the start.
        let result = file
            .as_file_mut()
            .seek(SeekFrom::Start(0))
            .and_then(|_| file.as_file_mut().set_len(0))
            .and_then(|_| file.as_file_mut().write_all(contents.as_bytes()))
            .and_then(|_| file.as_file_mut().sync_all());

        if let Err(err) = result {
            return Err(FeldsparError::Script(format!(
                "Failed to write temp file for input {:?}: {}",
                self.name, err
            )));
        }

        Ok(file.path().to_string_lossy().into_owned())
    }

    /// Releases the temp file, deleting it.
    fn clean_temp_file(&mut self) {
        self.temp.take();
    }
}

/// One block of solver code with its inputs and outputs.
#[derive(Debug)]
pub struct Block {
    header: String,
    body: String,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
}

impl Block {
    pub fn new(body: &str) -> Block {
        Block::named("unnamed block", body)
    }

    pub fn named(name: &str, body: &str) -> Block {
        Block {
            header: freefemize_header(name),
            body: body.to_owned(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, input: Input) -> Block {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: Output) -> Block {
        self.outputs.push(output);
        self
    }

    fn render(&mut self, args: &ScriptArgs) -> Result<String, FeldsparError> {
        let mut edp = header_frame(&format!("{} START", self.header));

        for input in &mut self.inputs {
            edp += &input.render(args)?;
        }

        edp += &self.body;
        edp += "\n\n";

        for output in &self.outputs {
            edp += &output.render();
        }

        edp += &header_frame(&format!("{} END", self.header));

        Ok(edp)
    }
}

/// An ordered list of blocks; renders to the program handed to the solver.
#[derive(Debug, Default)]
pub struct Script {
    name: Option<String>,
    blocks: Vec<Block>,
}

impl Script {
    pub fn new() -> Script {
        Script::default()
    }

    /// A script with a title banner at the top of the rendered program.
    pub fn named(name: &str) -> Script {
        Script {
            name: Some(name.to_owned()),
            blocks: Vec::new(),
        }
    }

    pub fn add_block(mut self, block: Block) -> Script {
        self.blocks.push(block);
        self
    }

    /// Appends a block holding only free-form code.
    pub fn add_body(self, body: &str) -> Script {
        self.add_block(Block::new(body))
    }

    /// Appends a block holding only one input.
    pub fn add_input(self, input: Input) -> Script {
        self.add_block(Block::new("").with_input(input))
    }

    /// Appends a block holding only one output.
    pub fn add_output(self, output: Output) -> Script {
        self.add_block(Block::new("").with_output(output))
    }

    /// Renders the full program text, in block order.
    pub fn render(&mut self, args: &ScriptArgs) -> Result<String, FeldsparError> {
        let mut edp = String::new();

        if let Some(name) = &self.name {
            edp += &header_frame(&freefemize_header(name));
        }

        for block in &mut self.blocks {
            edp += &block.render(args)?;
        }

        Ok(edp)
    }

    fn clean_temp_files(&mut self) {
        for block in &mut self.blocks {
            for input in &mut block.inputs {
                input.clean_temp_file();
            }
        }
    }

    /// Renders and runs the script through `solver`, returning the raw
    /// output stream. Temp files are released whether or not the run
    /// succeeds; a failed run carries a line-annotated diagnostic.
    pub fn run_with(
        &mut self,
        solver: &FreeFem,
        args: &ScriptArgs,
    ) -> Result<String, FeldsparError> {
        let edp = self.render(args)?;

        let result = solver.run(&edp, None);
        self.clean_temp_files();

        let output = result?;

        if !output.status.success() {
            return Err(FeldsparError::Solver(wire::annotate_solver_error(
                &edp,
                &output.stdout,
            )));
        }

        Ok(output.stdout)
    }

    /// `run_with` against the default solver installation.
    pub fn run(&mut self, args: &ScriptArgs) -> Result<String, FeldsparError> {
        self.run_with(&FreeFem::default(), args)
    }

    /// Decodes every declared output from a solver stream.
    pub fn parse(&self, stream: &str) -> Result<HashMap<String, Data>, FeldsparError> {
        let mut data = HashMap::new();

        for block in &self.blocks {
            for output in &block.outputs {
                data.insert(output.name.clone(), output.parse(stream)?);
            }
        }

        Ok(data)
    }

    /// Runs the script and decodes every declared output.
    pub fn get_output_with(
        &mut self,
        solver: &FreeFem,
        args: &ScriptArgs,
    ) -> Result<HashMap<String, Data>, FeldsparError> {
        let stream = self.run_with(solver, args)?;
        self.parse(&stream)
    }

    /// `get_output_with` against the default solver installation.
    pub fn get_output(&mut self, args: &ScriptArgs) -> Result<HashMap<String, Data>, FeldsparError> {
        self.get_output_with(&FreeFem::default(), args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{BoundaryEdges, Vertex};

    #[test]
    fn names_are_normalized() {
        assert_eq!(freefemize_variable("stiffness matrix"), "StiffnessMatrix");
        assert_eq!(freefemize_variable("a"), "A");
        assert_eq!(freefemize_variable("u_0"), "U0");
        assert_eq!(freefemize_header("stiffness  matrix"), "STIFFNESS MATRIX");
        assert_eq!(flagize("a"), "# FLAG > A");
    }

    #[test]
    fn render_emits_blocks_in_order() {
        let mut script = Script::named("poisson")
            .add_body("first block body")
            .add_body("second block body");

        let edp = script.render(&ScriptArgs::new()).unwrap();

        assert!(edp.contains("POISSON"));
        let first = edp.find("first block body").unwrap();
        let second = edp.find("second block body").unwrap();
        assert!(first < second);
    }

    #[test]
    fn int_input_renders_declaration_and_value() {
        let mut script = Script::new().add_input(Input::new("a", Data::Int(5)));

        let edp = script.render(&ScriptArgs::new()).unwrap();

        assert!(edp.contains("int A = 5;"));
    }

    #[test]
    fn output_renders_flags_around_extraction() {
        let mut script = Script::new().add_output(Output::new("a", DataKind::Int));

        let edp = script.render(&ScriptArgs::new()).unwrap();

        assert_eq!(edp.matches("cout << \"# FLAG > A\" << endl;").count(), 2);
        assert!(edp.contains("cout << A << endl;"));
    }

    #[test]
    fn late_bound_input_comes_from_args() {
        let mut script = Script::new().add_input(Input::late("a", DataKind::Real));

        let mut args = ScriptArgs::new();
        args.insert("a".to_owned(), Data::Real(2.5));

        let edp = script.render(&args).unwrap();
        assert!(edp.contains("real A = 2.5;"));
    }

    #[test]
    fn unresolved_late_input_is_a_script_error() {
        let mut script = Script::new().add_input(Input::late("a", DataKind::Int));

        let err = script.render(&ScriptArgs::new()).unwrap_err();
        assert!(matches!(err, FeldsparError::Script(_)));
    }

    #[test]
    fn mismatched_late_input_kind_is_a_script_error() {
        let mut script = Script::new().add_input(Input::late("a", DataKind::Int));

        let mut args = ScriptArgs::new();
        args.insert("a".to_owned(), Data::Real(1.0));

        let err = script.render(&args).unwrap_err();
        assert!(matches!(err, FeldsparError::Script(_)));
    }

    #[test]
    fn matrix_input_is_rejected() {
        let matrix = CooMatrix::try_from_triplets(1, 1, vec![0], vec![0], vec![1.0]).unwrap();
        let mut script = Script::new().add_input(Input::new("m", Data::Matrix(matrix)));

        let err = script.render(&ScriptArgs::new()).unwrap_err();
        assert!(matches!(err, FeldsparError::Script(_)));
    }

    #[test]
    fn mesh_input_renders_readmesh_and_reuses_its_temp_file() {
        let mesh = TriMesh::new(
            vec![
                Vertex { x: 0.0, y: 0.0 },
                Vertex { x: 1.0, y: 0.0 },
                Vertex { x: 0.0, y: 1.0 },
            ],
            vec![[0, 1, 2]],
        );

        let mut script = Script::new().add_input(Input::new("Th", Data::Mesh(mesh)));

        let first = script.render(&ScriptArgs::new()).unwrap();
        let second = script.render(&ScriptArgs::new()).unwrap();

        assert!(first.contains("mesh Th;"));
        assert!(first.contains("readmesh("));
        // Idempotent rendering: the same temp file backs both renders.
        assert_eq!(first, second);
    }

    #[test]
    fn vector_input_renders_fill_loop() {
        let mut script = Script::new().add_input(
            Input::new("u", Data::Vector(DVector::from_vec(vec![1.0, 2.0])))
                .in_space("Wh")
                .with_solver_name("u"),
        );

        let edp = script.render(&ScriptArgs::new()).unwrap();

        assert!(edp.contains("Wh u;"));
        assert!(edp.contains("ifstream"));
        assert!(edp.contains("u[][i]"));
    }

    #[test]
    fn scalar_scenario_parses_from_simulated_stream() {
        // One input (a = 5) and one output (a): the solver would echo the
        // flag, the value, and the flag again.
        let mut script = Script::new()
            .add_input(Input::new("a", Data::Int(5)))
            .add_block(Block::named("noop", "// nothing").with_output(Output::new(
                "a",
                DataKind::Int,
            )));

        let edp = script.render(&ScriptArgs::new()).unwrap();
        assert!(edp.contains("int A = 5;"));

        let simulated = "# FLAG > A\n5\n# FLAG > A\n";
        let data = script.parse(simulated).unwrap();

        match data["a"] {
            Data::Int(value) => assert_eq!(value, 5),
            ref other => panic!("expected Data::Int, got {:?}", other),
        }
    }

    #[test]
    fn parse_decodes_every_declared_output() {
        let script = Script::new()
            .add_output(Output::new("a", DataKind::Int))
            .add_output(Output::new("u", DataKind::Vector));

        let stream = "# FLAG > A\n7\n# FLAG > A\n# FLAG > U\n1.5\n-2.5\n# FLAG > U\n";
        let data = script.parse(stream).unwrap();

        assert_eq!(data.len(), 2);
        match &data["u"] {
            Data::Vector(v) => assert_eq!(v.len(), 2),
            other => panic!("expected Data::Vector, got {:?}", other),
        }
    }

    #[test]
    fn missing_output_flag_aborts_parsing() {
        let script = Script::new().add_output(Output::new("a", DataKind::Int));

        let err = script.parse("no flags here\n").unwrap_err();
        assert!(matches!(err, FeldsparError::Parse(_)));
    }

    #[test]
    fn mesh_output_round_trips_through_its_own_rendering_shape() {
        let mut mesh = TriMesh::new(
            vec![
                Vertex { x: 0.0, y: 0.0 },
                Vertex { x: 1.0, y: 0.0 },
                Vertex { x: 0.0, y: 1.0 },
            ],
            vec![[0, 1, 2]],
        );
        mesh.add_boundary_edges(
            BoundaryEdges::Polyline(vec![0, 1, 2, 0]),
            Some(1.into()),
        );

        let output = Output::new("Th", DataKind::Mesh);
        let flag = output.flag().to_owned();

        // Simulate the solver echoing what the extraction loops print.
        let mut stream = format!("{}\n", flag);
        stream += &format!("{} NODES\n", flag);
        for (node, label) in mesh.nodes.iter().zip(&mesh.node_labels) {
            stream += &format!("{} {} {}\n", node.x, node.y, label);
        }
        stream += &format!("{} NODES\n{} TRIANGLES\n", flag, flag);
        for (triangle, label) in mesh.triangles.iter().zip(&mesh.triangle_labels) {
            stream += &format!(
                "{} {} {} {}\n",
                triangle[0] + 1,
                triangle[1] + 1,
                triangle[2] + 1,
                label
            );
        }
        stream += &format!("{} TRIANGLES\n{} BOUNDARIES\n", flag, flag);
        for (start, end, label) in mesh.boundary_edge_rows() {
            stream += &format!("{} {} {}\n", start + 1, end + 1, label);
        }
        stream += &format!("{} BOUNDARIES\n{}\n", flag, flag);

        match output.parse(&stream).unwrap() {
            Data::Mesh(restored) => {
                assert_eq!(restored.triangles, mesh.triangles);
                assert_eq!(restored.boundary_edges().len(), 3);
            }
            other => panic!("expected Data::Mesh, got {:?}", other),
        }
    }
}

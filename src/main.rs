use clap::Parser;

use feldspar::export;
use feldspar::{Data, DataKind, FreeFem, Output, Script, ScriptArgs};

/// Run a FreeFem++ script and harvest its outputs.
#[derive(Parser)]
#[command(name = "feldspar")]
struct Cli {
    /// Path to the .edp script to run
    script: String,

    /// Mesh variable to harvest from the script after it runs
    #[arg(long)]
    mesh: Option<String>,

    /// Where to write the harvested mesh as JSON (defaults to <mesh>.json)
    #[arg(long)]
    output: Option<String>,

    /// Solver executable
    #[arg(long, default_value = "FreeFem++")]
    solver: String,
}

fn main() {
    let cli = Cli::parse();

    let body = match std::fs::read_to_string(&cli.script) {
        Ok(contents) => contents,
        Err(err) => {
            println!("Unable to open script {}: {}", cli.script, err);
            std::process::exit(1)
        }
    };

    let solver = FreeFem::new(&cli.solver);
    let mut script = Script::new().add_body(&body);

    match &cli.mesh {
        Some(mesh_name) => {
            script = script.add_output(
                Output::new(mesh_name, DataKind::Mesh).with_solver_name(mesh_name),
            );

            let data = match script.get_output_with(&solver, &ScriptArgs::new()) {
                Ok(data) => data,
                Err(err) => {
                    println!("{}", err);
                    std::process::exit(1)
                }
            };

            let mesh = match &data[mesh_name.as_str()] {
                Data::Mesh(mesh) => mesh,
                other => {
                    println!("harvested {:?} instead of a mesh", other);
                    std::process::exit(1)
                }
            };

            let output_path = cli
                .output
                .unwrap_or_else(|| format!("{}.json", mesh_name));

            if let Err(err) = export::save_mesh_json(mesh, &output_path) {
                println!("{}", err);
                std::process::exit(1)
            }

            println!(
                "info: wrote mesh {} ({} nodes, {} triangles) to {}",
                mesh_name,
                mesh.nodes.len(),
                mesh.triangles.len(),
                output_path
            );
        }

        None => match script.run_with(&solver, &ScriptArgs::new()) {
            Ok(stream) => print!("{}", stream),
            Err(err) => {
                println!("{}", err);
                std::process::exit(1)
            }
        },
    }
}

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use importer::{
    importer::ImportInput, persistent_import_task, runtime_import_task, source::Reference,
    GltfImporter, ImportOptions, ImportTask, ObjectId, OutputSink, TaskStatus, World,
};
use log::info;

#[derive(Parser)]
#[command(name = "importer")]
#[command(about = "Import a glTF, GLB or zipped glTF model frame by frame")]
#[command(version)]
struct Cli {
    /// Input file path or URL (.gltf, .glb or .zip)
    input: String,

    /// Persist the import under this directory instead of keeping it in memory
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Bytes read per frame from files and downloads
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Name of the root object
    #[arg(short, long)]
    name: Option<String>,

    /// Reuse an existing output directory
    #[arg(long)]
    overwrite: bool,

    /// Abort the import after this many frames
    #[arg(long)]
    abort_after: Option<usize>,
}

impl Cli {
    fn options(&self) -> ImportOptions {
        let mut options = ImportOptions {
            scene_name: self.name.clone(),
            overwrite_existing: self.overwrite,
            ..Default::default()
        };
        if let Some(chunk_size) = self.chunk_size {
            options.read_chunk_size = chunk_size;
        }
        options
    }
}

/// Advances `task` once per frame until it ends. Returns the output if the
/// import completed.
fn drive<S: OutputSink + 'static>(
    task: &mut ImportTask<GltfImporter<S>, S::Output>,
    abort_after: Option<usize>,
) -> Option<S::Output> {
    task.state_mut().on_progress(|step, completed, total| {
        if total > 0 {
            eprintln!("{}: {}/{}", step, completed, total);
        } else {
            eprintln!("{}: {}", step, completed);
        }
    });
    let mut frames = 0;
    loop {
        if abort_after.is_some_and(|limit| frames >= limit) {
            task.abort();
        }
        frames += 1;
        match task.advance() {
            TaskStatus::Running => continue,
            TaskStatus::Completed(output) => {
                info!("Import completed after {} frames", frames);
                return Some(output);
            }
            TaskStatus::Aborted => {
                eprintln!("Import aborted after {} frames", frames - 1);
                return None;
            }
            TaskStatus::Failed(error) => {
                eprintln!("Import failed: {}", error);
                return None;
            }
            TaskStatus::Finished => return None,
        }
    }
}

fn print_hierarchy(world: &World, root: ObjectId) {
    for id in world.descendants(root) {
        let Some(object) = world.get(id) else {
            continue;
        };
        let indent = "  ".repeat(world.ancestors(id).count());
        let transform = &object.transform;
        println!(
            "{}{}  position {} rotation {} scale {}",
            indent, object.name, transform.position, transform.rotation, transform.scale
        );
        let Some(renderer) = &object.renderer else {
            continue;
        };
        if let Some(mesh) = world.meshes.get(renderer.mesh()) {
            println!(
                "{}  mesh {}: {} vertices, {} triangles, {} blend shapes, {} bone weights",
                indent,
                mesh.name,
                mesh.vertex_count(),
                mesh.triangle_count(),
                mesh.blend_shapes.len(),
                mesh.bone_weights.len()
            );
        }
        if let Some(material) = world.materials.get(renderer.material()) {
            println!("{}  material {} ({})", indent, material.name, material.shader);
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let input = ImportInput::from_reference(Reference::parse(&cli.input));

    match &cli.out {
        Some(out) => {
            let mut task = match persistent_import_task(input, out, cli.options()) {
                Ok(task) => task,
                Err(error) => {
                    eprintln!("Can't import into {}: {}", out.display(), error);
                    return ExitCode::FAILURE;
                }
            };
            let Some(package) = drive(&mut task, cli.abort_after) else {
                return ExitCode::FAILURE;
            };
            println!("Import {} written to {}", package.id, package.root_dir.display());
            println!("Manifest: {}", package.manifest.display());
        }
        None => {
            let mut task = runtime_import_task(input, cli.options());
            let Some(scene) = drive(&mut task, cli.abort_after) else {
                return ExitCode::FAILURE;
            };
            println!("Import {}", scene.id);
            print_hierarchy(&scene.world, scene.root);
            println!(
                "{} objects, {} meshes, {} materials, {} textures",
                scene.world.live_object_count(),
                scene.world.meshes.len(),
                scene.world.materials.len(),
                scene.world.textures.len()
            );
        }
    }
    ExitCode::SUCCESS
}

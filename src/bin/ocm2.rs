use anyhow::Context;
use ocm2::{Ocm2Pipeline, PipelineParams};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let scene = args
        .next()
        .map(PathBuf::from)
        .context("usage: ocm2 <scene.hdf> [work_dir]")?;
    let work_dir = match args.next() {
        Some(dir) => PathBuf::from(dir),
        None => scene
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let pipeline = Ocm2Pipeline::new(PipelineParams::default());
    let output = pipeline
        .run_file(&scene, &work_dir)
        .with_context(|| format!("processing {}", scene.display()))?;

    println!(
        "Done! {} rasters saved in {} ({} cloud pixels)",
        output.georeferenced.len(),
        output.output_dir.display(),
        output.cloud_pixels
    );
    Ok(())
}

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use lineup_core::{build_gallery, recognize, validate_all, EmbeddingStore};
use lineup_detect::{Backend, OnnxDetector};

mod config;
mod render;

use config::{ensure_directories, Config};
use render::Renderer;

#[derive(Parser)]
#[command(name = "lineup", about = "Recognize faces in an image")]
struct Cli {
    /// Build the gallery from the training corpus and save it
    #[arg(long)]
    train: bool,

    /// Run recognition over every file in the validation corpus
    #[arg(long)]
    validate: bool,

    /// Identify faces in a single unlabeled image (requires -f)
    #[arg(long)]
    test: bool,

    /// Which detector backend to use: hog (CPU), cnn (GPU)
    #[arg(short = 'm', value_enum)]
    model: Option<BackendArg>,

    /// Path to an image with unknown faces
    #[arg(short = 'f')]
    file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Hog,
    Cnn,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Hog => Backend::Hog,
            BackendArg::Cnn => Backend::Cnn,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(backend) = cli.model {
        config.backend = backend.into();
    }

    if !(cli.train || cli.validate || cli.test) {
        bail!("nothing to do: pass --train, --validate, or --test -f <path>");
    }

    ensure_directories(&config).context("creating working directories")?;

    let mut detector = OnnxDetector::load(&config.model_dir, config.backend)
        .context("loading detector models")?;

    // Phases combine in one invocation, train first, exactly like the
    // original tool's flag surface.
    if cli.train {
        run_train(&config, &mut detector)?;
    }
    if cli.validate {
        run_validate(&config, &mut detector)?;
    }
    if cli.test {
        let path = cli
            .file
            .as_deref()
            .context("--test requires -f <path to an image>")?;
        run_test(&config, &mut detector, path)?;
    }

    Ok(())
}

fn run_train(config: &Config, detector: &mut OnnxDetector) -> Result<()> {
    let report = build_gallery(&config.training_root, detector).with_context(|| {
        format!(
            "reading training corpus {}",
            config.training_root.display()
        )
    })?;

    report
        .store
        .save(&config.gallery_path)
        .with_context(|| format!("saving gallery to {}", config.gallery_path.display()))?;

    tracing::info!(
        entries = report.store.len(),
        images = report.images_indexed,
        skipped = report.files_skipped,
        path = %config.gallery_path.display(),
        "gallery saved"
    );
    println!(
        "trained on {} images ({} embeddings, {} files skipped)",
        report.images_indexed,
        report.store.len(),
        report.files_skipped
    );
    Ok(())
}

fn run_validate(config: &Config, detector: &mut OnnxDetector) -> Result<()> {
    let store = EmbeddingStore::load(&config.gallery_path)?;
    let renderer = Renderer::new(config);
    let out_root = config.output_root.join("validated");
    let validation_root = config.validation_root.clone();

    let report = validate_all(
        &config.validation_root,
        &store,
        detector,
        config.match_tolerance,
        |path, recognition| {
            let annotated = renderer.annotate(&recognition);
            let relative = path.strip_prefix(&validation_root).unwrap_or(path);
            let mut out_path = out_root.join(relative);
            out_path.set_extension("png");
            if let Some(parent) = out_path.parent() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    tracing::warn!(path = %parent.display(), error = %err, "cannot create output directory");
                    return;
                }
            }
            match annotated.save(&out_path) {
                Ok(()) => tracing::info!(
                    source = %path.display(),
                    output = %out_path.display(),
                    faces = recognition.matches.len(),
                    "annotated"
                ),
                Err(err) => tracing::warn!(
                    path = %out_path.display(),
                    error = %err,
                    "cannot write annotated image"
                ),
            }
        },
    );

    println!(
        "validated {} files ({} failed); annotated copies under {}",
        report.files_visited,
        report.files_failed,
        out_root.display()
    );
    Ok(())
}

fn run_test(config: &Config, detector: &mut OnnxDetector, image_path: &Path) -> Result<()> {
    let store = EmbeddingStore::load(&config.gallery_path)?;
    let recognition = recognize(image_path, &store, detector, config.match_tolerance)?;

    for result in &recognition.matches {
        println!(
            "{} at (top {}, right {}, bottom {}, left {})",
            result.display_label(),
            result.location.top,
            result.location.right,
            result.location.bottom,
            result.location.left
        );
    }
    if recognition.matches.is_empty() {
        println!("no faces detected in {}", image_path.display());
    }

    let renderer = Renderer::new(config);
    let annotated = renderer.annotate(&recognition);
    let stem = image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let out_path = config.output_root.join(format!("{stem}.annotated.png"));
    annotated
        .save(&out_path)
        .with_context(|| format!("writing {}", out_path.display()))?;
    println!("annotated image written to {}", out_path.display());
    Ok(())
}

use std::env;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use lookalike::backend::{CameraOpener, Euclidean};
use lookalike::capture::capture_face;
use lookalike::gallery::Gallery;
use lookalike::prompt::{ask_consent, Consent};
use lookalike::report::MatchReport;
use lookalike::{annotate, config, matcher, Pipeline};

#[derive(Parser)]
#[command(name = "lookalike")]
#[command(
    version,
    about = "Scan your face and find the closest matching US president"
)]
struct Cli {
    /// Config file (defaults to the system config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a face from the camera and match it against the gallery
    Run {
        /// Skip the camera permission prompt
        #[arg(short, long)]
        yes: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Camera device (overrides config)
        #[arg(long)]
        camera: Option<String>,
        /// Portrait directory (overrides config)
        #[arg(long)]
        gallery: Option<PathBuf>,
    },
    /// List the gallery portraits that contain a usable face
    Gallery {
        /// Portrait directory (overrides config)
        dir: Option<PathBuf>,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run {
        yes: false,
        json: false,
        camera: None,
        gallery: None,
    }) {
        Commands::Run {
            yes,
            json,
            camera,
            gallery,
        } => {
            if let Some(camera) = camera {
                cfg.camera = camera;
            }
            if let Some(dir) = gallery {
                cfg.gallery_dir = dir;
            }
            run(&cfg, yes, json)
        }
        Commands::Gallery { dir } => {
            if let Some(dir) = dir {
                cfg.gallery_dir = dir;
            }
            list_gallery(&cfg)
        }
        Commands::Config => open_config(cli.config),
    }
}

fn new_pipeline(cfg: &config::Config) -> Result<Pipeline> {
    Pipeline::new(&cfg.models(), cfg.score_threshold, cfg.nms_threshold)
        .context("Failed to initialize face recognition pipeline")
}

fn run(cfg: &config::Config, yes: bool, json: bool) -> Result<()> {
    info!("Welcome to President Face Recognition!");
    info!(
        "Your camera will scan your face and compare it to every US President to find your closest match."
    );

    if !yes {
        let consent = ask_consent(&mut io::stdin().lock(), &mut io::stdout())?;
        if consent == Consent::No {
            info!("Please enable the webcam and try again.");
            return Ok(());
        }
    }

    let mut pipeline = new_pipeline(cfg)?;

    info!("Opening camera: {}", cfg.camera);
    let mut opener = CameraOpener {
        device: cfg.camera.clone(),
    };
    let capture = capture_face(&mut opener, &mut pipeline, &cfg.capture_policy())
        .context("Error when scanning your face")?;
    let encoding = capture.primary().context("Error when scanning your face")?;

    info!("Searching through each President to find your closest match...");
    let gallery = Gallery::load_dir(&cfg.gallery_dir, &mut pipeline)?;

    let found = matcher::find_match(encoding.as_slice(), &gallery.embeddings(), &Euclidean)?;
    let entry = gallery
        .get(found.index)
        .context("matched index outside the gallery")?;

    let mut report = MatchReport::new(&entry.label, &found, capture.attempt);

    let font = match annotate::load_font(&cfg.font) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("{:#}; saving images without captions", e);
            None
        }
    };
    let caption = font.as_ref().map(|font| annotate::Caption {
        font,
        label: &entry.label,
        similarity: found.similarity,
    });

    if let Some(user_face) = capture.faces.first() {
        let (user, portrait) = annotate::save_pair(
            &cfg.output_dir,
            (&capture.image, user_face),
            (&entry.image, &entry.face),
            caption.as_ref(),
        )?;
        report.user_image = Some(user);
        report.match_image = Some(portrait);
    } else {
        warn!("No face box to annotate");
    }

    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.to_text());
    }
    Ok(())
}

fn list_gallery(cfg: &config::Config) -> Result<()> {
    let mut pipeline = new_pipeline(cfg)?;
    let gallery = Gallery::load_dir(&cfg.gallery_dir, &mut pipeline)?;

    if gallery.is_empty() {
        anyhow::bail!("No usable portraits in {}", cfg.gallery_dir.display());
    }
    for entry in gallery.entries() {
        println!("{}\t{}", entry.label, entry.path.display());
    }
    Ok(())
}

fn open_config(path: Option<PathBuf>) -> Result<()> {
    let config_path = path.unwrap_or_else(|| config::CONFIG_PATH.to_path_buf());
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    if !config_path.exists() {
        info!("Writing default config to {}", config_path.display());
        config::save_config(&config::Config::default(), Some(&config_path))?;
    }

    info!("Opening config file: {}", config_path.display());

    let status = std::process::Command::new(editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}

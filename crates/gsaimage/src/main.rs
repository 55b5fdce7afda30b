//! gsaimage: build, replay and inspect micrograph modification chains.
//!
//! The chain library is sans-IO; this binary does the file work around
//! it: decoding the source image, reading recipes and chain documents,
//! and writing the leaf output and the resulting document.
//!
//! # Usage
//!
//! ```text
//! gsaimage run sample.png --recipe steps.json --output out.png --document chain.json
//! gsaimage replay chain.json --output out.png --verify
//! gsaimage inspect chain.json --json
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use gsaimage_chain::{ChainError, ChainSummary, ImageBuffer, ModificationNode, SkippedRecompute};
use serde::Serialize;

/// Build, replay and inspect image modification chains.
#[derive(Parser)]
#[command(name = "gsaimage", version)]
struct Cli {
    /// Log every recompute (same as `RUST_LOG=debug`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import an image and apply a recipe to it.
    Run {
        /// Source image (PNG, JPEG, BMP, TIFF).
        image_path: PathBuf,

        /// Recipe file: a JSON array of `{"@class": ..., params}` steps.
        #[arg(long)]
        recipe: Option<PathBuf>,

        /// Recipe given inline instead of as a file.
        #[arg(long, conflicts_with = "recipe")]
        recipe_json: Option<String>,

        /// Keep the source in colour instead of converting to gray.
        #[arg(long)]
        color: bool,

        /// Write the leaf output image here.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the chain document here.
        #[arg(long)]
        document: Option<PathBuf>,

        /// Print the chain summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rebuild a chain from its document and recompute it.
    Replay {
        /// Chain document.
        document: PathBuf,

        /// Write the leaf output image here.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Re-encode the rebuilt chain and check every node reproduces.
        #[arg(long)]
        verify: bool,
    },

    /// Print a per-node overview of a chain document.
    Inspect {
        /// Chain document.
        document: PathBuf,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Machine-readable result of `run`.
#[derive(Serialize)]
struct RunReport<'a> {
    summary: &'a ChainSummary,
    skipped: Vec<SkipReport>,
}

#[derive(Serialize)]
struct SkipReport {
    position: usize,
    kind: String,
    reason: String,
}

impl From<&SkippedRecompute> for SkipReport {
    fn from(skip: &SkippedRecompute) -> Self {
        Self {
            position: skip.position,
            kind: skip.kind.to_string(),
            reason: skip.reason.to_string(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match cli.command {
        Command::Run {
            image_path,
            recipe,
            recipe_json,
            color,
            output,
            document,
            json,
        } => run(&RunArgs {
            image_path,
            recipe,
            recipe_json,
            color,
            output,
            document,
            json,
        }),
        Command::Replay {
            document,
            output,
            verify,
        } => replay(&document, output.as_deref(), verify),
        Command::Inspect { document, json } => inspect(&document, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

struct RunArgs {
    image_path: PathBuf,
    recipe: Option<PathBuf>,
    recipe_json: Option<String>,
    color: bool,
    output: Option<PathBuf>,
    document: Option<PathBuf>,
    json: bool,
}

fn run(args: &RunArgs) -> Result<(), String> {
    let decoded = image::open(&args.image_path)
        .map_err(|e| format!("Error decoding {}: {e}", args.image_path.display()))?;
    let source = if args.color {
        ImageBuffer::Rgb(decoded.to_rgb8())
    } else {
        ImageBuffer::Gray(decoded.to_luma8())
    };
    let dims = source.dimensions();
    eprintln!(
        "Image: {} ({}x{}, {} channel(s))",
        args.image_path.display(),
        dims.width,
        dims.height,
        source.channels()
    );

    let recipe_text = match (&args.recipe, &args.recipe_json) {
        (Some(path), _) => Some(read_text(path)?),
        (None, Some(text)) => Some(text.clone()),
        (None, None) => None,
    };
    let steps = match recipe_text {
        Some(text) => gsaimage_chain::parse_recipe(&text)
            .map_err(|e| format!("Error parsing recipe: {e}"))?,
        None => Vec::new(),
    };

    let root = ModificationNode::initial(source).map_err(|e| format!("Error importing image: {e}"))?;
    let mut chain = gsaimage_chain::apply_recipe(root, steps)
        .map_err(|e| format!("Error applying recipe: {e}"))?;

    let skipped = chain
        .update_chain()
        .map_err(|e| format!("Error recomputing chain: {e}"))?;
    for skip in &skipped {
        eprintln!(
            "Warning: node {} ({}) kept its input: {}",
            skip.position, skip.kind, skip.reason
        );
    }

    if let Some(path) = &args.output {
        write_image(chain.output(), path)?;
    }
    if let Some(path) = &args.document {
        let text = gsaimage_chain::to_json(&chain)
            .map_err(|e| format!("Error encoding chain: {e}"))?;
        std::fs::write(path, &text)
            .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        eprintln!("Document written to {} ({} bytes)", path.display(), text.len());
    }

    let summary = chain.summary();
    if args.json {
        let report = RunReport {
            summary: &summary,
            skipped: skipped.iter().map(SkipReport::from).collect(),
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Error serializing report: {e}"))?;
        println!("{json}");
    } else {
        print!("{summary}");
        print_properties(&summary);
    }
    Ok(())
}

fn replay(document: &Path, output: Option<&Path>, verify: bool) -> Result<(), String> {
    let mut chain = load_chain(document)?;

    // Recompute once more through the view path so the leaf's display
    // levels are reported the way an interactive viewer would see them.
    let shown = chain.update_view(&mut |buf: &ImageBuffer, levels: (u8, u8)| {
        let dims = buf.dimensions();
        log::info!(
            "leaf output {}x{} at levels {}..={}",
            dims.width,
            dims.height,
            levels.0,
            levels.1
        );
    });
    let properties = match shown {
        Ok(properties) => properties,
        Err(ChainError::Kernel(reason)) => {
            eprintln!("Warning: leaf kept its input: {reason}");
            chain.properties().clone()
        }
        Err(e) => return Err(format!("Error recomputing leaf: {e}")),
    };
    eprintln!(
        "Replayed {} node(s); leaf has {} propert(ies)",
        chain.length(),
        properties.len()
    );

    if verify {
        let text = gsaimage_chain::to_json(&chain)
            .map_err(|e| format!("Error re-encoding chain: {e}"))?;
        let rebuilt = gsaimage_chain::from_json(&text)
            .map_err(|e| format!("Error decoding re-encoded chain: {e}"))?;
        let mismatches: Vec<usize> = chain
            .to_list()
            .iter()
            .zip(rebuilt.to_list())
            .enumerate()
            .filter(|(_, (a, b))| a.output() != b.output())
            .map(|(i, _)| i)
            .collect();
        if !mismatches.is_empty() {
            return Err(format!("Round trip changed node(s) {mismatches:?}"));
        }
        eprintln!("Verified: every node reproduces after a round trip");
    }

    if let Some(path) = output {
        write_image(chain.output(), path)?;
    }
    Ok(())
}

fn inspect(document: &Path, json: bool) -> Result<(), String> {
    let chain = load_chain(document)?;
    let summary = chain.summary();
    if json {
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| format!("Error serializing summary: {e}"))?;
        println!("{text}");
    } else {
        print!("{summary}");
        print_properties(&summary);
    }
    Ok(())
}

fn load_chain(path: &Path) -> Result<ModificationNode, String> {
    let text = read_text(path)?;
    let label = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    gsaimage_chain::import_document(label, &text).map_err(|e| e.to_string())
}

fn read_text(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("Error reading {}: {e}", path.display()))
}

fn write_image(buffer: &ImageBuffer, path: &Path) -> Result<(), String> {
    let saved = match buffer {
        ImageBuffer::Gray(img) => img.save(path),
        ImageBuffer::Rgb(img) => img.save(path),
    };
    saved.map_err(|e| format!("Error writing {}: {e}", path.display()))?;
    eprintln!("Output written to {}", path.display());
    Ok(())
}

fn print_properties(summary: &ChainSummary) {
    let Some(properties) = summary.leaf_properties() else {
        return;
    };
    if properties.is_empty() {
        return;
    }
    println!();
    println!("Properties");
    for (key, value) in properties {
        match serde_json::to_string(value) {
            Ok(text) if text.chars().count() <= 72 => println!("  {key}: {text}"),
            Ok(text) => println!("  {key}: {}...", text.chars().take(69).collect::<String>()),
            Err(_) => println!("  {key}: <unprintable>"),
        }
    }
}

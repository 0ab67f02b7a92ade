//! Binary entrypoint for the picture frame catalog.
//!
//! Delegates all logic to the library crate; no local modules here.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use picture_frame::PictureFrame;
use picture_frame::config::Configuration;
use picture_frame::rotation::AlbumFilter;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};

/// Catalog images into albums and rotate through them without repeats.
#[derive(Debug, Parser)]
#[command(name = "picture-frame", version, about)]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan the media roots and print album sizes
    Scan,
    /// Print the next image(s) as JSON lines
    Next {
        /// Restrict to this album (a path keeps only its last segment)
        #[arg(long, value_name = "NAME", conflicts_with = "all")]
        album: Option<String>,
        /// Rotate through every album
        #[arg(long)]
        all: bool,
        /// Number of images to draw
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Scan before drawing
        #[arg(long)]
        scan: bool,
    },
    /// List known albums
    Albums,
    /// Forget which images were shown
    Reset,
    /// Print catalog counters
    Status,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(
        format!("picture_frame={level}")
            .parse()
            .context("building log filter")?,
    );
    fmt().with_env_filter(filter).with_target(false).compact().init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = Configuration::from_yaml_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?
        .validated()
        .context("validating configuration")?;

    let mut frame = PictureFrame::open(&cfg).context("opening picture frame catalog")?;

    match cli.command {
        Command::Scan => {
            let counts = frame.scan_media().context("scanning media roots")?;
            for (album, count) in &counts {
                println!("{album}: {count}");
            }
            println!("total: {}", counts.values().sum::<usize>());
        }
        Command::Next {
            album,
            all,
            count,
            scan,
        } => {
            if scan {
                frame.scan_media().context("scanning media roots")?;
            }
            let mut filter = match (album, all) {
                (Some(name), _) => Some(AlbumFilter::parse(&name)),
                (None, true) => Some(AlbumFilter::All),
                (None, false) => None,
            };
            for _ in 0..count {
                let image = frame.next_image(filter.take());
                if image.is_empty() {
                    bail!("no images available");
                }
                println!("{}", serde_json::to_string(&image)?);
            }
        }
        Command::Albums => {
            for album in frame.available_albums() {
                println!("{album}");
            }
        }
        Command::Reset => {
            if !frame.clear_history() {
                bail!("could not clear displayed history");
            }
            info!("displayed history cleared");
        }
        Command::Status => {
            let status = frame.status();
            println!("images: {}", status.total_images);
            println!("undisplayed: {}", status.undisplayed_images);
            println!("albums: {}", status.albums);
            println!("schema version: {}", status.schema_version);
            println!(
                "current album: {}",
                status.current_album.as_deref().unwrap_or("(all)")
            );
            if let Some(path) = frame.store().path() {
                println!("catalog: {}", path.display());
            }
            match status.last_displayed_at {
                Some(at) => println!("last displayed: {}", at.to_rfc3339()),
                None => println!("last displayed: never"),
            }
        }
    }
    Ok(())
}

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use mpeg1_trickplay::config::{DEFAULT_BIN_SIZE, DEFAULT_TRICK_SPEED};
use mpeg1_trickplay::index::builder::SeekIndexBuilder;
use mpeg1_trickplay::index::IndexHeader;
use mpeg1_trickplay::{Direction, IndexConfig, SeekIndex, TimeMapper};

#[derive(Parser)]
#[command(name = "tsindex")]
#[command(author, version, about = "Seek index generator for trick-play transport streams")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index one title folder holding video.ts, video_fwd.ts and video_rwd.ts
    Title {
        #[arg(required = true)]
        dir: PathBuf,

        #[command(flatten)]
        options: BuildOptions,
    },

    /// Index every title listed in <root>/manifest.txt, found under <root>/media
    Batch {
        #[arg(required = true)]
        root: PathBuf,

        #[command(flatten)]
        options: BuildOptions,
    },

    /// Print the records of an index file
    Inspect {
        #[arg(required = true)]
        index: PathBuf,
    },

    /// Resolve a presentation time to a media file byte position
    Lookup {
        #[arg(required = true)]
        index: PathBuf,

        /// Main stream time in 90kHz ticks
        #[arg(required = true)]
        pts: i64,

        #[arg(short, long, value_enum, default_value = "normal")]
        direction: DirectionArg,
    },
}

#[derive(clap::Args)]
struct BuildOptions {
    /// 90kHz ticks per table entry
    #[arg(long, default_value_t = DEFAULT_BIN_SIZE)]
    bin_size: u32,

    /// Speed factor of the trick streams
    #[arg(long, default_value_t = DEFAULT_TRICK_SPEED)]
    trick_speed: u32,

    /// Rebuild indexes that already exist
    #[arg(long)]
    force: bool,
}

impl BuildOptions {
    fn builder(&self) -> SeekIndexBuilder {
        SeekIndexBuilder::new(
            IndexConfig::new()
                .with_bin_size(self.bin_size)
                .with_trick_speed(self.trick_speed),
        )
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Rewind,
    Normal,
    Forward,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Direction {
        match arg {
            DirectionArg::Rewind => Direction::Rewind,
            DirectionArg::Normal => Direction::Normal,
            DirectionArg::Forward => Direction::FastForward,
        }
    }
}

fn print_header(header: &IndexHeader) {
    for (name, record) in [
        ("video", &header.video),
        ("forward", &header.forward),
        ("rewind", &header.rewind),
    ]
    .iter()
    {
        println!(
            "{:8} pts {}..{} ({:.1}s) bin {} speed {}x, {} entries",
            name,
            record.first_pts,
            record.last_pts,
            record.span() as f64 / 90_000.0,
            record.bin_size,
            record.trick_speed,
            record.sample_count
        );
    }
    println!("{} bytes", header.file_size());
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Title { dir, options } => {
            if !dir.is_dir() {
                bail!("Title folder does not exist: {:?}", dir);
            }
            match options
                .builder()
                .build_title(&dir, options.force)
                .with_context(|| format!("indexing {}", dir.display()))?
            {
                Some(index) => print_header(&index.header),
                None => println!("index exists, use --force to rebuild"),
            }
        }
        Commands::Batch { root, options } => {
            let written = options
                .builder()
                .build_manifest(&root, options.force)
                .with_context(|| format!("reading manifest in {}", root.display()))?;
            println!("{} indexes written", written);
        }
        Commands::Inspect { index } => {
            let loaded = SeekIndex::load(&index)
                .with_context(|| format!("loading {}", index.display()))?;
            print_header(&loaded.header);
        }
        Commands::Lookup {
            index,
            pts,
            direction,
        } => {
            let mut file = BufReader::new(
                File::open(&index).with_context(|| format!("opening {}", index.display()))?,
            );
            let header = IndexHeader::read_from(&mut file)
                .with_context(|| format!("reading {}", index.display()))?;
            let mapper = TimeMapper::new(header);
            let direction = Direction::from(direction);
            let offset = mapper.pts_to_offset(pts, direction);
            let position = mapper.media_position(&mut file, pts, direction)?;
            println!(
                "{} at {}: index entry at byte {}, media byte {}, stream pts {}",
                direction,
                pts,
                offset,
                position,
                mapper.main_to_trick(pts, direction)
            );
        }
    }

    Ok(())
}

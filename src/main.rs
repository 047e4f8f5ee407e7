use clap::{Parser, Subcommand};
use pic_ladder::config::{self, Config};
use pic_ladder::naming::SourcePath;
use pic_ladder::process::Generator;
use pic_ladder::queue::{RunSummary, WorkerPool};
use pic_ladder::scan::{ScanReport, scan_content};
use pic_ladder::srcset::SrcsetResolver;
use pic_ladder::storage::{LocalDisk, Storage};
use pic_ladder::{dispatch, output};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pic-ladder")]
#[command(about = "Responsive WebP rendition ladders for editor content")]
#[command(long_about = "\
Responsive WebP rendition ladders for editor content

Content fields (editor JSON, repeater lists, HTML) are scanned for image
references. Each referenced original gets one WebP per ladder width, never
wider than the original:

  pics/a.jpg (2000px wide), ladder 160..1920
  → derivatives/pics/a.jpg-160.webp
  → derivatives/pics/a.jpg-320.webp
  → ...
  → derivatives/pics/a.jpg-1920.webp

Renditions that already exist are skipped unless --force is given.

Run 'pic-ladder gen-config' to generate a documented pic-ladder.toml.
Set RUST_LOG=pic_ladder=debug for per-rung logging.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = stock defaults)
    #[arg(long, default_value = "pic-ladder.toml", global = true)]
    config: PathBuf,

    /// Log job progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the image paths referenced by content JSON files
    Extract {
        /// JSON files, each holding one content value
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Generate the ladder for one source image, inline
    Generate {
        /// Disk-relative source path (storage/ prefixes are accepted)
        path: String,
        /// Re-encode rungs that already exist
        #[arg(long)]
        force: bool,
    },
    /// Print the srcset for one source image
    Srcset {
        /// Disk-relative source path
        path: String,
    },
    /// Scan content files and generate every referenced image on the worker pool
    Queue {
        /// JSON files, each holding one content value
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Re-encode rungs that already exist
        #[arg(long)]
        force: bool,
    },
    /// Validate the config file and print the effective settings
    Check,
    /// Print a stock pic-ladder.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Extract { files } => {
            let mut union = ScanReport::default();
            for file in &files {
                let report = scan_content(&read_json(file)?);
                output::print_extract(&file.display().to_string(), &report);
                union.paths.extend(report.paths);
                union.rejected += report.rejected;
                union.truncated += report.truncated;
            }
            if files.len() > 1 {
                output::print_extract("All files", &union);
            }
        }
        Command::Generate { path, force } => {
            let config = Arc::new(config::load_config(&cli.config)?);
            let source = SourcePath::parse(&path)?;
            let generator = Generator::new(config.clone(), open_storage(&config));
            let rungs = generator.generate(&source, force)?;
            output::print_generate(&source, &rungs);
        }
        Command::Srcset { path } => {
            let config = Arc::new(config::load_config(&cli.config)?);
            let source = SourcePath::parse(&path)?;
            let resolver = SrcsetResolver::new(config.clone(), open_storage(&config));
            for line in output::format_srcset(&source, resolver.build_webp_srcset(&source).as_deref())
            {
                println!("{}", line);
            }
        }
        Command::Queue { files, force } => {
            let config = Arc::new(config::load_config(&cli.config)?);
            let values = files
                .iter()
                .map(|file| read_json(file))
                .collect::<Result<Vec<_>, _>>()?;

            let generator = Arc::new(Generator::new(config.clone(), open_storage(&config)));
            let (pool, events) = WorkerPool::new(generator)?;
            let printer = std::thread::spawn(move || {
                let mut summary = RunSummary::default();
                for event in events {
                    summary.record(&event);
                    for line in output::format_job_event(&event) {
                        println!("{}", line);
                    }
                }
                summary
            });

            let queued = dispatch::queue_content_image_derivatives(&pool, &values, force)?;
            println!("{} queued on {} workers", queued, pool.threads());
            pool.close();
            pool.drain();
            drop(pool);

            let summary = printer
                .join()
                .map_err(|_| "event printer thread panicked")?;
            println!("Summary: {}", summary);
            if summary.has_failures() {
                return Err("some renditions failed".into());
            }
        }
        Command::Check => {
            let config = config::load_config(&cli.config)?;
            output::print_check(&config);
            println!("==> Config is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the fmt subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "pic_ladder=info" } else { "pic_ladder=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn open_storage(config: &Config) -> Arc<dyn Storage> {
    Arc::new(LocalDisk::from_config(config.active_disk()))
}

fn read_json(path: &Path) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

use std::fs;
use std::path::PathBuf;

use arduboy_fx::title::{DEFAULT_WHITE_THRESHOLD, image_to_title};
use arduboy_fx_tool::hex::{bin_to_hex, hex_to_bin};
use arduboy_fx_tool::{FlashcartReport, FxDataBuild, align_fx_files_to, run_flashcart_script_file};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arduboy-fx-tool")]
#[command(about = "Arduboy FX flashcart and fx data generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or build flashcart containers
    #[command(subcommand)]
    Flashcart(FlashcartCommand),
    /// Build development fx data
    #[command(subcommand)]
    Fxdata(FxdataCommand),
    /// Convert title images
    #[command(subcommand)]
    Image(ImageCommand),
    /// Convert sketches between Intel HEX and raw binary
    #[command(subcommand)]
    Sketch(SketchCommand),
}

#[derive(Subcommand)]
enum FlashcartCommand {
    /// Print the categories and programs of a flashcart file
    Scan {
        /// Flashcart binary
        input: PathBuf,

        /// Include title images as PNG data URLs
        #[arg(long)]
        images: bool,

        #[arg(short, long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,
    },
    /// Run a flashcart script
    Generate {
        /// Lua script
        script: PathBuf,

        /// Directory relative paths resolve against (defaults to the script's directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Arguments passed to the script
        #[arg(last = true)]
        arguments: Vec<String>,
    },
}

#[derive(Subcommand)]
enum FxdataCommand {
    /// Run an fx data script
    Generate {
        /// Lua script
        script: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Directory `file(...)` paths resolve against (defaults to the script's directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Skip the release binaries
        #[arg(long)]
        no_release: bool,
    },
    /// Join existing data and save binaries into a dev binary
    Align {
        #[arg(short, long)]
        data: Option<PathBuf>,

        #[arg(short, long)]
        save: Option<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum ImageCommand {
    /// Convert a 128x64 image into raw title data
    Title {
        input: PathBuf,
        output: PathBuf,

        /// Brightness at which pixels turn white
        #[arg(short, long, default_value_t = DEFAULT_WHITE_THRESHOLD)]
        threshold: u8,
    },
}

#[derive(Subcommand)]
enum SketchCommand {
    /// Convert an Intel HEX sketch into a raw binary
    Hex2bin { input: PathBuf, output: PathBuf },
    /// Convert a raw binary sketch into Intel HEX
    Bin2hex { input: PathBuf, output: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Csv,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Flashcart(FlashcartCommand::Scan {
            input,
            images,
            format,
        }) => {
            let report = FlashcartReport::from_file(&input, images)?;
            match format {
                ReportFormat::Json => println!("{}", report.to_json()?),
                ReportFormat::Csv => print!("{}", report.to_csv()?),
            }
            Ok(())
        }
        Commands::Flashcart(FlashcartCommand::Generate {
            script,
            dir,
            arguments,
        }) => {
            let output = run_flashcart_script_file(&script, &arguments, dir.as_deref())?;
            print!("{}", output);
            Ok(())
        }
        Commands::Fxdata(FxdataCommand::Generate {
            script,
            output,
            dir,
            no_release,
        }) => {
            let build = FxDataBuild::from_script_file(&script, dir.as_deref())?;
            build.write_to(&output, !no_release)?;
            println!("{}", serde_json::to_string_pretty(&build.offsets)?);
            Ok(())
        }
        Commands::Fxdata(FxdataCommand::Align { data, save, output }) => {
            let length = align_fx_files_to(data.as_deref(), save.as_deref(), &output)?;
            println!("Wrote {} bytes to {}", length, output.display());
            Ok(())
        }
        Commands::Image(ImageCommand::Title {
            input,
            output,
            threshold,
        }) => {
            let raw = image_to_title(&fs::read(&input)?, threshold)?;
            fs::write(&output, raw)?;
            println!("Converted {} to {}", input.display(), output.display());
            Ok(())
        }
        Commands::Sketch(SketchCommand::Hex2bin { input, output }) => {
            let data = hex_to_bin(&fs::read_to_string(&input)?)?;
            fs::write(&output, &data)?;
            println!("Wrote {} bytes to {}", data.len(), output.display());
            Ok(())
        }
        Commands::Sketch(SketchCommand::Bin2hex { input, output }) => {
            fs::write(&output, bin_to_hex(&fs::read(&input)?)?)?;
            println!("Converted {} to {}", input.display(), output.display());
            Ok(())
        }
    }
}

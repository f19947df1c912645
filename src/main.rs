//! kfxmeta - Extract data from KFX, KDF and Ion files

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser};
use tracing_subscriber::EnvFilter;

use kfxmeta::kfx::json::to_json_pretty;
use kfxmeta::{
    DecodeOptions, Decoded, IonValue, TypedValue, decode_file, extract_metadata,
    read_kindle_metadata,
};

#[derive(Parser)]
#[command(name = "kfxmeta")]
#[command(version, about = "Extract data from KFX, KDF or Ion files", long_about = None)]
#[command(after_help = "EXAMPLES:
    kfxmeta -c /mnt/kindle/documents    List cover metadata of every book
    kfxmeta -m book.kfx                 Write book metadata to book.json
    kfxmeta -f book.kdf --stdout        Print every fragment as JSON")]
struct Cli {
    #[command(flatten)]
    mode: Mode,

    /// File or directory to process
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Print JSON to stdout instead of writing <stem>.json
    #[arg(long)]
    stdout: bool,

    /// Log decoder diagnostics (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Mode {
    /// List cover metadata from a Kindle documents directory
    #[arg(short, long)]
    cover: bool,

    /// Dump all content of a .kfx, .kdf or .ion file as JSON
    #[arg(short, long)]
    full: bool,

    /// Dump book metadata from a .kfx file as JSON
    #[arg(short, long)]
    metadata: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = if cli.mode.cover {
        list_covers(&cli.path)
    } else {
        dump(&cli.path, cli.mode.metadata, cli.stdout)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn list_covers(dir: &Path) -> Result<(), String> {
    if !dir.is_dir() {
        return Err(format!("{} is not a directory", dir.display()));
    }
    println!("Cover metadata from Kindle directory: {}", dir.display());

    let mut names: Vec<_> = fs::read_dir(dir)
        .map_err(|e| e.to_string())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".kfx"))
        .collect();
    names.sort();

    for name in names {
        match read_kindle_metadata(dir.join(&name)) {
            Ok(metadata) => println!(
                "{name}: doctype={}, asin={}, cover={}",
                metadata.cde_content_type().unwrap_or("None"),
                metadata.asin().unwrap_or("None"),
                metadata.cover_image_data().is_some()
            ),
            Err(e) => println!("{name}: error -- {e}"),
        }
    }

    Ok(())
}

fn dump(path: &Path, metadata_only: bool, stdout: bool) -> Result<(), String> {
    if !path.is_file() {
        return Err(format!("{} is not a file", path.display()));
    }

    let options = if metadata_only {
        DecodeOptions::metadata_only()
    } else {
        DecodeOptions::default()
    };
    let decoded = decode_file(path, &options).map_err(|e| e.to_string())?;

    let json = if metadata_only {
        let entities = match decoded {
            Decoded::Entities(entities) => entities,
            Decoded::Values(values) => typed_values(values),
        };
        to_json_pretty(&extract_metadata(&entities))
    } else {
        to_json_pretty(&decoded)
    }
    .map_err(|e| e.to_string())?;

    if stdout {
        println!("{json}");
        return Ok(());
    }

    let outfile = path.with_extension("json");
    fs::write(&outfile, json).map_err(|e| e.to_string())?;
    eprintln!("Extracted data to JSON file \"{}\"", outfile.display());
    Ok(())
}

/// Annotated values of a bare Ion stream, named by their annotation like KDF
/// fragments.
fn typed_values(values: Vec<IonValue>) -> Vec<TypedValue> {
    values
        .into_iter()
        .filter_map(|value| match value {
            IonValue::Typed(typed) => {
                let TypedValue { id_name, value, .. } = *typed;
                Some(TypedValue::new(id_name.clone(), id_name, value))
            }
            _ => None,
        })
        .collect()
}

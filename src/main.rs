use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use x3p::batch::verify_all;
use x3p::{
    Compression, DataType, DecodeOptions, Document, EncodeOptions, StorageMode, Strictness,
};

#[derive(Parser)]
#[command(name = "x3p", about = "Inspect and convert ISO 5436-2 X3P surface files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the records and point data summary of a file
    Info {
        input: PathBuf,
        /// Print machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Check checksums and metadata of one or more files
    Verify {
        #[arg(required = true, num_args = 1..)]
        input: Vec<PathBuf>,
        /// Treat the first warning as a failure
        #[arg(long)]
        strict: bool,
    },
    /// Rewrite a file, optionally switching between binary and text storage
    Convert {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Point data storage: binary (DataLink) or text (DataList)
        #[arg(short, long)]
        storage: Option<String>,
        /// Write members uncompressed
        #[arg(long)]
        stored: bool,
        /// Write even if the metadata does not validate
        #[arg(long)]
        lenient: bool,
    },
    /// Print valid points as x,y,z CSV in real-world coordinates
    Dump {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct Summary<'a> {
    #[serde(flatten)]
    document:     &'a Document,
    shape:        Vec<usize>,
    data_type:    Option<DataType>,
    valid_points: usize,
    warnings:     Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    match Cli::parse().command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let (doc, warnings) = Document::open(&input)?;
            let data = doc.data();

            if json {
                let summary = Summary {
                    document:     &doc,
                    shape:        data.map(|d| d.shape().to_vec()).unwrap_or_default(),
                    data_type:    data.map(|d| d.data_type()),
                    valid_points: data.map(|d| d.valid_count()).unwrap_or(0),
                    warnings:     warnings.iter().map(ToString::to_string).collect(),
                };
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            let r1 = &doc.record1;
            println!("── X3P File ─────────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Revision       {}", r1.revision);
            println!("  Feature        {}", r1.feature_type().map(|f| f.code()).unwrap_or("—"));
            for axis in [&r1.axes.cx, &r1.axes.cy, &r1.axes.cz] {
                println!(
                    "  {}             type={} data={} increment={} offset={}",
                    axis.name().tag(),
                    axis.axis_type().map(|t| t.code()).unwrap_or("—"),
                    axis.data_type().map(|t| t.code()).unwrap_or("—"),
                    axis.increment.map(|v| v.to_string()).unwrap_or_else(|| "—".into()),
                    axis.offset.map(|v| v.to_string()).unwrap_or_else(|| "—".into()),
                );
            }
            if let Some(r) = r1.axes.rotation() {
                println!("  Rotation       {:?}", r);
            }
            if let Some(r2) = &doc.record2 {
                let inst = &r2.instrument;
                println!("  Date           {}", r2.date().unwrap_or("—"));
                println!("  Instrument     {} {} (serial {}, version {})",
                    inst.manufacturer.as_deref().unwrap_or("?"),
                    inst.model.as_deref().unwrap_or("?"),
                    inst.serial.as_deref().unwrap_or("?"),
                    inst.version.as_deref().unwrap_or("?"));
                if let Some(c) = &r2.creator {
                    println!("  Creator        {c}");
                }
            }
            println!("  Dimension      {:?}", doc.dimension());
            println!("  Storage        {:?}", doc.storage_mode());
            if let Some(d) = data {
                println!("  Data           {:?} {:?}, {} of {} valid",
                    d.data_type(), d.shape(), d.valid_count(), d.values().len());
            }
            if let Some(id) = &doc.vendor_specific_id {
                println!("  Vendor         {id}");
            }
            println!("  Warnings       {}", warnings.len());
            for w in &warnings {
                println!("    {w}");
            }
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { input, strict } => {
            let options = DecodeOptions {
                strictness: if strict { Strictness::Strict } else { Strictness::Lenient },
            };
            let mut failed = 0usize;
            for report in verify_all(&input, &options) {
                match &report.outcome {
                    Ok(w) if w.is_empty() => println!("  ok      {}", report.path.display()),
                    Ok(w) => {
                        println!("  warn    {} ({} warning(s))", report.path.display(), w.len());
                        for each in w {
                            println!("          {each}");
                        }
                    }
                    Err(e) => {
                        failed += 1;
                        println!("  FAIL    {}: {e}", report.path.display());
                    }
                }
            }
            if failed > 0 {
                return Err(format!("{failed} file(s) failed verification").into());
            }
        }

        // ── Convert ──────────────────────────────────────────────────────────
        Commands::Convert { input, output, storage, stored, lenient } => {
            let (doc, _) = Document::open(&input)?;
            let storage = storage.as_deref().map(parse_storage).transpose()?;
            let options = EncodeOptions {
                strictness:  if lenient { Strictness::Lenient } else { Strictness::Strict },
                storage,
                compression: if stored { Compression::Stored } else { Compression::Deflated },
                ..EncodeOptions::default()
            };
            doc.save_with(&output, options)?;
            println!("Converted → {}", output.display());
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, output } => {
            let (doc, _) = Document::open(&input)?;
            let sink: Box<dyn Write> = match &output {
                Some(path) => Box::new(File::create(path)?),
                None       => Box::new(io::stdout().lock()),
            };
            let mut out = BufWriter::new(sink);
            writeln!(out, "x,y,z")?;
            for [x, y, z] in doc.points() {
                writeln!(out, "{x},{y},{z}")?;
            }
            out.flush()?;
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_storage(s: &str) -> Result<StorageMode, String> {
    StorageMode::from_name(s).ok_or_else(|| format!("unknown storage '{s}', expected binary or text"))
}

//! pdf-raster - command line front end
//!
//! Usage:
//!   pdf-raster render <input> [--first-page N] [--pages N] [--out-dir DIR | --json]
//!   pdf-raster import <input>
//!   pdf-raster downgrade <input> --output FILE

use anyhow::{bail, Context, Result};
use base64::Engine;
use clap::{Args, Parser, Subcommand};
use pdf_raster_bridge::source::{resolve_base64, resolve_source};
use pdf_raster_bridge::{BridgeConfig, PdfBridge, SizeHint, RESOLUTION_ENV_VAR};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pdf-raster", version, about = "Rasterize PDF pages through PDFium")]
struct Cli {
    /// Rendering resolution in DPI (default: $PDFIMPORT_RESOLUTION_DPI or 96)
    #[arg(long, global = true)]
    dpi: Option<f64>,

    /// Directory containing the pdfium shared library
    #[arg(long, global = true)]
    pdfium_lib: Option<PathBuf>,

    /// Maximum pixel area of a single page bitmap
    #[arg(long, global = true)]
    max_pixels: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// PDF path or file:// URL, or base64 data with --base64
    input: String,

    /// Treat INPUT as base64-encoded PDF data
    #[arg(long)]
    base64: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render pages to PNG
    Render {
        #[command(flatten)]
        input: InputArgs,

        /// First page, zero-based
        #[arg(long, default_value_t = 0)]
        first_page: usize,

        /// Number of pages; 0 renders all remaining pages
        #[arg(long, default_value_t = 0)]
        pages: usize,

        /// Page width override, hundredths of a millimetre
        #[arg(long, requires = "height_mm100")]
        width_mm100: Option<f64>,

        /// Page height override, hundredths of a millimetre
        #[arg(long, requires = "width_mm100")]
        height_mm100: Option<f64>,

        /// Directory for page-N.png files
        #[arg(long, default_value = ".", conflicts_with = "json")]
        out_dir: PathBuf,

        /// Print pages as JSON with base64 PNG data instead of writing files
        #[arg(long)]
        json: bool,
    },
    /// Print page sizes and popup comments as JSON
    Import {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Write a copy readable as PDF 1.6
    Downgrade {
        #[command(flatten)]
        input: InputArgs,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Serialize)]
struct RenderedPageJson {
    page: usize,
    width: u32,
    height: u32,
    png_base64: String,
}

#[derive(Serialize)]
struct ImportedPageJson<'a> {
    page: usize,
    width_mm100: i64,
    height_mm100: i64,
    pixel_width: usize,
    pixel_height: usize,
    annotations: &'a [pdf_raster_bridge::PageAnnotation],
}

fn read_input(input: &InputArgs) -> Result<Vec<u8>> {
    let resolved = if input.base64 {
        resolve_base64(&input.input)
    } else {
        resolve_source(&input.input)
    };
    let resolved = resolved.with_context(|| format!("Failed to read {}", input.input))?;
    tracing::debug!(source = %resolved.source_name, bytes = resolved.data.len(), "input resolved");
    Ok(resolved.data)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_raster_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = BridgeConfig {
        resolution_dpi: cli.dpi,
        pdfium_library_path: cli.pdfium_lib,
        ..BridgeConfig::default()
    };
    if let Some(max_pixels) = cli.max_pixels {
        config.max_bitmap_pixels = max_pixels;
    }

    let bridge = PdfBridge::with_config(config).context("Failed to initialize rendering engine")?;
    tracing::debug!(
        dpi = bridge.resolution_dpi(),
        env = RESOLUTION_ENV_VAR,
        "bridge ready"
    );

    match cli.command {
        Command::Render {
            input,
            first_page,
            pages,
            width_mm100,
            height_mm100,
            out_dir,
            json,
        } => {
            let data = read_input(&input)?;
            let size_hint = width_mm100
                .zip(height_mm100)
                .map(|(width, height)| SizeHint::new(width, height));
            let rendered = bridge.rasterize(&data, first_page, Some(pages), size_hint);
            if rendered.is_empty() {
                bail!("No pages rendered from {}", input.input);
            }

            if json {
                let engine = base64::engine::general_purpose::STANDARD;
                let pages = rendered
                    .iter()
                    .map(|page| -> pdf_raster_bridge::Result<RenderedPageJson> {
                        Ok(RenderedPageJson {
                            page: page.page_index,
                            width: page.width(),
                            height: page.height(),
                            png_base64: engine.encode(page.to_png()?),
                        })
                    })
                    .collect::<pdf_raster_bridge::Result<Vec<_>>>()?;
                println!("{}", serde_json::to_string_pretty(&pages)?);
            } else {
                std::fs::create_dir_all(&out_dir)
                    .with_context(|| format!("Failed to create {}", out_dir.display()))?;
                for page in &rendered {
                    let path = out_dir.join(format!("page-{}.png", page.page_index + 1));
                    std::fs::write(&path, page.to_png()?)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    tracing::info!(page = page.page_index + 1, path = %path.display(), "page written");
                }
            }
        }
        Command::Import { input } => {
            let data = read_input(&input)?;
            let results = bridge.import_deferred_data(&data);
            let pages: Vec<ImportedPageJson<'_>> = results
                .iter()
                .map(|result| ImportedPageJson {
                    page: result.graphic.page_index(),
                    width_mm100: result.size_mm100.width,
                    height_mm100: result.size_mm100.height,
                    pixel_width: result.pixel_size.0,
                    pixel_height: result.pixel_size.1,
                    annotations: &result.annotations,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&pages)?);
        }
        Command::Downgrade { input, output } => {
            let data = read_input(&input)?;
            let compatible = bridge.downgrade(&data);
            if compatible.is_empty() {
                bail!("Could not produce a PDF 1.6 copy of {}", input.input);
            }
            std::fs::write(&output, &compatible)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            tracing::info!(path = %output.display(), bytes = compatible.len(), "downgraded copy written");
        }
    }

    Ok(())
}

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, ValueEnum};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use windgraph::aggregate::WindowAggregator;
use windgraph::config::Settings;
use windgraph::data::{self, MemoryStore};
use windgraph::eval::Evaluator;
use windgraph::functions::FunctionRegistry;
use windgraph::graph::{CsvRenderer, GraphRenderer, PngRenderer};
use windgraph::palette::ColorPalette;
use windgraph::runtime;
use windgraph::template::parse_template;

#[derive(Parser, Debug)]
#[command(name = "windgraph")]
#[command(about = "Render weather station graphs from a template and CSV data", long_about = None)]
struct Args {
    /// Graph template (TOML)
    template: PathBuf,

    #[arg(short = 'd', long = "data", value_name = "NAME=PATH", value_parser = parse_data_arg,
          help = "Named CSV data source; without any, CSV is read from stdin as 'raw'")]
    data: Vec<(String, PathBuf)>,

    #[arg(short = 'o', long = "output", help = "Output file (defaults to stdout)")]
    output: Option<PathBuf>,

    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Png)]
    format: OutputFormat,

    #[arg(long = "end", help = "Time the graph ends at (defaults to the latest data row)")]
    end: Option<String>,

    #[arg(short = 'c', long = "config", help = "Settings file (TOML)")]
    config: Option<PathBuf>,

    #[arg(long = "check", help = "Only parse and validate the template")]
    check: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Png,
    Csv,
}

fn parse_data_arg(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got '{}'", arg)),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;

    let text = fs::read_to_string(&args.template)
        .with_context(|| format!("Failed to read template {}", args.template.display()))?;
    let spec = parse_template(&text)
        .with_context(|| format!("Invalid template {}", args.template.display()))?;

    if args.check {
        let subplots: usize = spec.plots.iter().map(|p| p.subplots.len()).sum();
        println!(
            "{}: {} plot(s), {} subplot(s)",
            args.template.display(),
            spec.plots.len(),
            subplots
        );
        return Ok(());
    }

    let mut store = MemoryStore::new();
    if args.data.is_empty() {
        let table = data::read_table_from_stdin(&settings.data).context("Failed to read CSV from stdin")?;
        store.insert("raw", table);
    } else {
        for (name, path) in &args.data {
            store.insert(name.clone(), data::read_table_from_path(path, &settings.data)?);
        }
    }

    let functions = FunctionRegistry::with_conversions();
    let aggregator = WindowAggregator::from_settings(&settings.aggregate)?;
    let evaluator = Evaluator::new(&functions, &aggregator);

    let end = match &args.end {
        Some(text) => NaiveDateTime::parse_from_str(text, &settings.data.timestamp_format)
            .with_context(|| format!("Failed to parse --end '{}'", text))?,
        None => runtime::latest_timestamp(&spec, &store)
            .ok_or_else(|| anyhow!("No data rows to place the graph; pass --end"))?,
    };

    let graph = runtime::evaluate_graph(&spec, &store, &evaluator, end).context("Failed to evaluate graph")?;

    let renderer: Box<dyn GraphRenderer> = match args.format {
        OutputFormat::Png => Box::new(PngRenderer::new(ColorPalette::classic())),
        OutputFormat::Csv => Box::new(CsvRenderer),
    };
    let bytes = renderer.render(&spec, &graph).context("Failed to render graph")?;

    match &args.output {
        Some(path) => {
            fs::write(path, &bytes).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), bytes = bytes.len(), "Wrote graph");
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(&bytes).context("Failed to write graph to stdout")?;
            handle.flush().context("Failed to flush stdout")?;
        }
    }

    Ok(())
}

//! FLM CLI - render FLM markup to HTML or plain text

#[cfg(feature = "cli")]
use clap::{Parser, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use flm::{Config, Environment, FlmError, FlmResult, Renderer};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "flm")]
#[command(version)]
#[command(about = "Render FLM markup to HTML or plain text", long_about = None)]
struct Cli {
    /// Input files, rendered as one document (reads from stdin if none)
    inputs: Vec<String>,

    /// Output file path (writes to stdout if not provided)
    #[arg(short, long)]
    output: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Html)]
    format: Format,

    /// Configuration file (JSON; YAML and TOML with the config-formats feature)
    #[arg(short, long)]
    config: Option<String>,

    /// Append the endnote list
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    endnotes: bool,

    /// Number section headings
    #[arg(long)]
    numbered: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[cfg(feature = "cli")]
#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// HTML fragments
    Html,
    /// Plain text
    Text,
    /// Parsed node tree as JSON
    Json,
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::builder().filter_level(level).init();

    if let Err(err) = run(&cli) {
        match err.position() {
            Some(pos) => eprintln!("error at {}: {}", pos, err),
            None => eprintln!("error: {}", err),
        }
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("flm was built without the `cli` feature");
    std::process::exit(1);
}

#[cfg(feature = "cli")]
fn run(cli: &Cli) -> FlmResult<()> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    if cli.numbered {
        let numbered = Config::numbered();
        config.heading_numbering = numbered.heading_numbering;
    }
    let env = Environment::new(config);

    let sources = read_inputs(&cli.inputs)?;
    let fragments = sources
        .iter()
        .map(|(name, source)| env.make_fragment(source, name))
        .collect::<FlmResult<Vec<_>>>()?;

    let output = match cli.format {
        Format::Json => serde_json::to_string_pretty(&fragments)?,
        Format::Html => render(&env, fragments, &env.html_renderer(), cli.endnotes)?,
        Format::Text => render(&env, fragments, &env.text_renderer(), cli.endnotes)?,
    };

    match &cli.output {
        Some(path) => fs::write(path, output).map_err(|e| io_error(path, e))?,
        None => {
            let mut stdout = io::stdout();
            writeln!(stdout, "{}", output).map_err(|e| io_error("stdout", e))?;
        }
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn render<R: Renderer<Output = String>>(
    env: &Environment,
    fragments: Vec<flm::ir::Fragment>,
    renderer: &R,
    endnotes: bool,
) -> FlmResult<String> {
    let mut doc = env.make_document(fragments);
    let rendered = doc.render(renderer)?;
    if !endnotes {
        return Ok(rendered.output);
    }
    let notes = rendered.render_default_endnotes(renderer)?;
    Ok(renderer.join_blocks(vec![rendered.output, notes]))
}

#[cfg(feature = "cli")]
fn load_config(path: &str) -> FlmResult<Config> {
    let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("json");
    match ext {
        #[cfg(feature = "config-formats")]
        "yaml" | "yml" => Config::from_yaml_str(&text),
        #[cfg(feature = "config-formats")]
        "toml" => Config::from_toml_str(&text),
        _ => Config::from_json_str(&text),
    }
}

#[cfg(feature = "cli")]
fn read_inputs(inputs: &[String]) -> FlmResult<Vec<(String, String)>> {
    if inputs.is_empty() {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .map_err(|e| io_error("stdin", e))?;
        return Ok(vec![("stdin".to_string(), source)]);
    }
    inputs
        .iter()
        .map(|path| {
            fs::read_to_string(path)
                .map(|source| (path.clone(), source))
                .map_err(|e| io_error(path, e))
        })
        .collect()
}

#[cfg(feature = "cli")]
fn io_error(path: &str, source: io::Error) -> FlmError {
    FlmError::Io {
        path: path.to_string(),
        source,
    }
}

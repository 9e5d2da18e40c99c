use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use jsonschema_emit_core::{
    registry_to_json_schema, to_json_schema, ConvertOptions, CyclePolicy, GraphDocument, Io,
    LoadedGraph, NodeId, ReusePolicy, Target, UnrepresentablePolicy,
};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "jsonschema-emit")]
#[command(about = "Compile a schema-node graph document into JSON Schema")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit a self-contained JSON Schema for one root node
    Convert {
        /// Input graph document
        input: PathBuf,

        /// Output schema file (defaults to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Root node index (defaults to the document's `root`)
        #[arg(long)]
        root: Option<u32>,

        #[command(flatten)]
        options: OptionArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },

    /// Emit one schema per registered id, plus shared definitions
    Registry {
        /// Input graph document
        input: PathBuf,

        /// Output file for the whole export (defaults to stdout if not specified)
        #[arg(short, long, conflicts_with = "out_dir")]
        output: Option<PathBuf>,

        /// Write each schema to `<DIR>/<id>.json` instead
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// How schemas address each other; `{id}` is replaced by the schema id
        #[arg(long, default_value = "{id}")]
        uri_template: String,

        #[command(flatten)]
        options: OptionArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
}

#[derive(Args)]
struct OptionArgs {
    /// JSON Schema dialect
    #[arg(short, long, value_enum, default_value_t = TargetArg::Draft202012)]
    target: TargetArg,

    /// What to do with variants JSON Schema cannot express
    #[arg(long, value_enum, default_value_t = UnrepresentableArg::Throw)]
    unrepresentable: UnrepresentableArg,

    /// Which side of transforms to describe
    #[arg(long, value_enum, default_value_t = IoArg::Output)]
    io: IoArg,

    /// How to handle cycles
    #[arg(long, value_enum, default_value_t = CyclesArg::Ref)]
    cycles: CyclesArg,

    /// How to handle nodes used more than once
    #[arg(long, value_enum, default_value_t = ReusedArg::Inline)]
    reused: ReusedArg,
}

impl From<&OptionArgs> for ConvertOptions {
    fn from(args: &OptionArgs) -> Self {
        // All fields set explicitly; clippy enforces exhaustiveness
        ConvertOptions {
            target: args.target.into(),
            unrepresentable: args.unrepresentable.into(),
            io: args.io.into(),
            cycles: args.cycles.into(),
            reused: args.reused.into(),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum TargetArg {
    #[value(name = "draft-2020-12")]
    Draft202012,
    #[value(name = "draft-7")]
    Draft7,
}

impl From<TargetArg> for Target {
    fn from(val: TargetArg) -> Self {
        match val {
            TargetArg::Draft202012 => Target::Draft202012,
            TargetArg::Draft7 => Target::Draft7,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum UnrepresentableArg {
    Throw,
    Any,
}

impl From<UnrepresentableArg> for UnrepresentablePolicy {
    fn from(val: UnrepresentableArg) -> Self {
        match val {
            UnrepresentableArg::Throw => UnrepresentablePolicy::Throw,
            UnrepresentableArg::Any => UnrepresentablePolicy::Any,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum IoArg {
    Output,
    Input,
}

impl From<IoArg> for Io {
    fn from(val: IoArg) -> Self {
        match val {
            IoArg::Output => Io::Output,
            IoArg::Input => Io::Input,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum CyclesArg {
    Ref,
    Throw,
}

impl From<CyclesArg> for CyclePolicy {
    fn from(val: CyclesArg) -> Self {
        match val {
            CyclesArg::Ref => CyclePolicy::Ref,
            CyclesArg::Throw => CyclePolicy::Throw,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum ReusedArg {
    Inline,
    Ref,
}

impl From<ReusedArg> for ReusePolicy {
    fn from(val: ReusedArg) -> Self {
        match val {
            ReusedArg::Inline => ReusePolicy::Inline,
            ReusedArg::Ref => ReusePolicy::Ref,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    Pretty,
    Compact,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so stdout stays clean for JSON
    let log_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert {
            input,
            output,
            root,
            options,
            format,
        } => {
            let loaded = load_graph(&input)?;
            let root = match root.or_else(|| loaded.root.map(|id| id.as_u32())) {
                Some(index) if (index as usize) < loaded.graph.len() => NodeId::new(index),
                Some(index) => bail!(
                    "Root node {index} is out of range ({} nodes in {})",
                    loaded.graph.len(),
                    input.display()
                ),
                None => bail!(
                    "No root node: pass --root or set `root` in {}",
                    input.display()
                ),
            };

            let options = ConvertOptions::from(&options);
            let schema = to_json_schema(&loaded.graph, &loaded.metadata, root, &options)
                .map_err(|e| anyhow::Error::from(e).context("Conversion failed"))?;

            write_json(&schema, output.as_ref(), format)?;
        }
        Commands::Registry {
            input,
            output,
            out_dir,
            uri_template,
            options,
            format,
        } => {
            let loaded = load_graph(&input)?;
            if loaded.metadata.ids().next().is_none() {
                eprintln!(
                    "Warning: {} registers no ids; nothing to export.",
                    input.display()
                );
            }

            let options = ConvertOptions::from(&options);
            let export = registry_to_json_schema(
                &loaded.graph,
                &loaded.metadata,
                &options,
                |id| uri_template.replace("{id}", id),
            )
            .map_err(|e| anyhow::Error::from(e).context("Registry export failed"))?;

            match out_dir {
                Some(dir) => {
                    fs::create_dir_all(&dir).with_context(|| {
                        format!("Failed to create output directory: {}", dir.display())
                    })?;
                    for (id, schema) in &export.schemas {
                        if id.contains(['/', '\\']) || id == ".." {
                            bail!("Schema id {id:?} cannot be used as a file name");
                        }
                        let path = dir.join(format!("{id}.json"));
                        write_json(schema, Some(&path), format)?;
                    }
                }
                None => write_json(&export, output.as_ref(), format)?,
            }
        }
    }

    Ok(())
}

fn load_graph(input: &Path) -> Result<LoadedGraph> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open input file: {}", input.display()))?;
    let reader = BufReader::new(file);
    let document: GraphDocument = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse graph document from: {}", input.display()))?;
    document
        .load()
        .map_err(|e| anyhow::Error::from(e).context(format!("Invalid graph: {}", input.display())))
}

fn write_json<T: serde::Serialize>(
    val: &T,
    path: Option<&PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let mut writer: Box<dyn Write> = if let Some(p) = path {
        let file = File::create(p)
            .with_context(|| format!("Failed to create output file: {}", p.display()))?;
        Box::new(BufWriter::new(file))
    } else {
        Box::new(BufWriter::new(io::stdout()))
    };

    match format {
        OutputFormat::Pretty => {
            serde_json::to_writer_pretty(&mut writer, val).context("Failed to write JSON")?;
        }
        OutputFormat::Compact => {
            serde_json::to_writer(&mut writer, val).context("Failed to write JSON")?;
        }
    }

    // Ensure trailing newline
    writeln!(writer).context("Failed to write trailing newline")?;
    writer.flush().context("Failed to flush output")?;

    Ok(())
}

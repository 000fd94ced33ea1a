//! weft CLI
//!
//! Lowers a manifest of authored tasks, workflows and launch plans into a
//! dependency-ordered registration plan.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod manifest;
mod output;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use weft_core::{SerializationSettings, SettingsOverrides};
use weft_plan::{EntityMapping, Translator};
use weft_types::{NativeType, TypeEngine};

use crate::manifest::Manifest;

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "weft - lower authored workflow graphs into control plane registration specs", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    /// Human readable
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Serialize every entity of a manifest into a registration plan
    Serialize(SerializeArgs),
    /// Print the literal type of native type descriptions
    Types {
        /// Type descriptions, e.g. `dict[str, list[int]]`
        #[arg(required = true)]
        types: Vec<String>,
    },
}

#[derive(Args)]
struct SerializeArgs {
    /// Manifest file (JSON)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target project
    #[arg(long, env = "WEFT_PROJECT")]
    project: Option<String>,

    /// Target domain
    #[arg(long, env = "WEFT_DOMAIN")]
    domain: Option<String>,

    /// Registration version
    #[arg(long = "version", env = "WEFT_VERSION")]
    entity_version: Option<String>,

    /// Default container image
    #[arg(long, env = "WEFT_IMAGE")]
    image: Option<String>,

    /// Use fast-registration commands for container tasks
    #[arg(long)]
    fast: bool,

    /// Write one file per entry into this directory instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl SerializeArgs {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            project: self.project.clone(),
            domain: self.domain.clone(),
            version: self.entity_version.clone(),
            image: self.image.clone(),
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format)?;

    match cli.command {
        Commands::Serialize(args) => serialize(&args),
        Commands::Types { types } => print_types(&types),
    }
}

fn init_tracing(verbose: bool, format: LogFormat) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
    }
    Ok(())
}

fn serialize(args: &SerializeArgs) -> Result<()> {
    let settings = SerializationSettings::resolve(args.config.as_deref(), &args.overrides())
        .wrap_err("cannot resolve serialization settings")?;
    let graph = Manifest::load(&args.manifest)?.build()?;

    let mut mapping = EntityMapping::new();
    let roots = graph.roots();
    let registrable = Translator::new(&mut mapping, &settings)
        .with_fast(args.fast)
        .lower_all(&roots)
        .wrap_err_with(|| format!("cannot serialize {}", args.manifest.display()))?
        .len();
    info!(
        project = settings.project.as_str(),
        domain = settings.domain.as_str(),
        version = settings.version.as_str(),
        entities = mapping.len(),
        registrable,
        fast = args.fast,
        "serialized manifest"
    );

    match &args.output {
        Some(dir) => {
            for path in output::write_plan(&mapping, dir)? {
                println!("{}", path.display());
            }
        }
        None => output::print_plan(&mapping, &mut std::io::stdout().lock())?,
    }
    Ok(())
}

fn print_types(types: &[String]) -> Result<()> {
    let engine = TypeEngine::new();
    for text in types {
        let native: NativeType = text.parse()?;
        let literal = engine
            .to_literal_type(&native)
            .wrap_err_with(|| format!("cannot map '{text}'"))?;
        println!("{native} -> {literal}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MANIFEST: &str = r#"
    {
      "tasks": [
        { "name": "square", "inputs": { "x": "int" }, "outputs": { "o0": "int" } }
      ],
      "workflows": [
        {
          "name": "wf",
          "inputs": { "x": "int" },
          "outputs": { "o0": "int" },
          "nodes": [
            { "id": "first", "entity": "square", "inputs": { "x": { "promise": "start-node.x" } } },
            { "id": "second", "entity": "square", "inputs": { "x": { "promise": "first.o0" } } }
          ],
          "output_bindings": { "o0": { "promise": "second.o0" } }
        }
      ],
      "launch_plans": [ { "name": "wf_lp", "workflow": "wf", "fixed_inputs": { "x": 4 } } ]
    }
    "#;

    fn args(dir: &std::path::Path, fast: bool) -> SerializeArgs {
        let manifest = dir.join("manifest.json");
        fs::write(&manifest, MANIFEST).unwrap();
        SerializeArgs {
            manifest,
            config: None,
            project: Some("proj".to_string()),
            domain: Some("dev".to_string()),
            entity_version: Some("v1".to_string()),
            image: Some("registry/app:v1".to_string()),
            fast,
            output: Some(dir.join("out")),
        }
    }

    fn written(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_serialize_writes_plan_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path(), false);
        serialize(&args).unwrap();
        assert_eq!(
            written(&dir.path().join("out")),
            vec![
                "01_square_task.json",
                "02_wf_workflow.json",
                "03_wf_lp_launch_plan.json",
            ]
        );
    }

    #[test]
    fn test_serialize_fast_commands() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path(), true);
        serialize(&args).unwrap();
        let text = fs::read_to_string(dir.path().join("out/01_square_task.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value["spec"]["template"]["container"]["args"][0],
            "pyflyte-fast-execute"
        );
    }

    #[test]
    fn test_serialize_with_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("weft.toml");
        fs::write(
            &config,
            "project = \"from-file\"\ndomain = \"dev\"\nversion = \"v0\"\nimage = \"img:file\"\n",
        )
        .unwrap();
        let mut args = args(dir.path(), false);
        args.config = Some(config);
        args.project = None;
        serialize(&args).unwrap();

        let text = fs::read_to_string(dir.path().join("out/02_wf_workflow.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["spec"]["template"]["id"]["project"], "from-file");
        assert_eq!(value["spec"]["template"]["id"]["version"], "v1");
    }

    #[test]
    fn test_serialize_requires_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args(dir.path(), false);
        args.domain = None;
        let err = serialize(&args).unwrap_err();
        assert!(err.chain().any(|cause| cause.to_string().contains("domain")));
    }

    #[test]
    fn test_print_types() {
        assert!(print_types(&["dict[str, list[int]]".to_string()]).is_ok());
        assert!(print_types(&["tuple[int]".to_string()]).is_err());
        assert!(print_types(&["list[".to_string()]).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "weft",
            "--verbose",
            "serialize",
            "--manifest",
            "m.json",
            "--version",
            "v2",
            "--fast",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::Serialize(args) = cli.command else {
            panic!("expected serialize");
        };
        assert_eq!(args.entity_version.as_deref(), Some("v2"));
        assert!(args.fast);
    }
}

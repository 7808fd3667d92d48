use clap::{Args, Parser, Subcommand};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use assetgen::index::{expand_index, load_sheet_spec, AssetIndex, StatusFilter, ValidationReport};
use assetgen::pipeline::{worklist_from_index, GenerateOptions, Generator};
use assetgen::postprocess::AlphaSettings;
use assetgen::prompt::style::KNOWN_CHECKPOINTS;
use assetgen::prompt::{all_presets, classify, Style};
use assetgen::specs::SpecStore;
use assetgen::workflow::{parse_set_pairs, JobDocument, SamplerOverrides};
use assetgen::{ComfyUIClient, Config};

const PONY_WORKFLOW: &str = "assetgen_sdxl_api_pony.json";
const VARIANTS_DIR: &str = "assets/zelos_variants";

#[derive(Parser, Debug)]
#[command(name = "assetgen", about = "Generate missing game assets through ComfyUI", version)]
struct Cli {
    /// Override COMFYUI_URL
    #[arg(global = true, long)]
    comfyui_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Also consider entries with status "planned"
    #[arg(long)]
    include_planned: bool,
    /// Also consider entries with status "optional"
    #[arg(long)]
    include_optional: bool,
}

impl StatusArgs {
    fn filter(&self) -> StatusFilter {
        StatusFilter {
            include_planned: self.include_planned,
            include_optional: self.include_optional,
        }
    }
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct Worklist {
    /// Validation report whose `missing` list drives the run
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// Asset index to validate and fill in directly
    #[arg(long, value_name = "PATH")]
    index: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every asset path an index expands to
    Expand {
        #[arg(long, value_name = "PATH")]
        index: PathBuf,
        /// Output JSON descriptors instead of one path per line
        #[arg(long)]
        json: bool,
    },
    /// Check which indexed assets are missing on disk
    Validate(ValidateArgs),
    /// Generate missing assets with ComfyUI
    Generate(GenerateArgs),
    /// Show the prompt pair a path maps to
    Classify {
        rel_path: String,
        #[arg(long, value_enum)]
        style: Option<Style>,
    },
    /// Write spec records for every classifiable asset of an index
    Specs {
        #[arg(long, value_name = "PATH")]
        index: PathBuf,
        /// Kit name; defaults to the index file name without `-index.json`
        #[arg(long)]
        kit: Option<String>,
    },
    /// List prompt style presets
    Presets {
        #[arg(long)]
        json: bool,
    },
    /// List checkpoints known to ComfyUI
    Checkpoints {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[arg(long, value_name = "PATH")]
    index: PathBuf,
    /// Override the index root
    #[arg(long, value_name = "DIR")]
    root: Option<String>,
    #[command(flatten)]
    status: StatusArgs,
    /// Compare PNG dimensions against each entry's size
    #[arg(long)]
    check_size: bool,
    /// Markdown file with sprite-sheet tables to check as well
    #[arg(long, value_name = "PATH")]
    spritesheet_spec: Option<PathBuf>,
    /// Fail when a sprite sheet from the tables is missing on disk
    #[arg(long)]
    strict_spritesheets: bool,
    /// Write the report JSON here
    #[arg(long, value_name = "PATH")]
    report_path: Option<PathBuf>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    worklist: Worklist,
    #[command(flatten)]
    status: StatusArgs,
    /// API-format workflow JSON (defaults to WORKFLOW_PATH)
    #[arg(long, value_name = "PATH")]
    workflow: Option<PathBuf>,
    /// Prompt style; inferred from --ckpt when omitted
    #[arg(long, value_enum)]
    style: Option<Style>,
    /// Checkpoint filename to write into the workflow
    #[arg(long)]
    ckpt: Option<String>,
    /// VAE filename; needs a VAELoader node in the workflow
    #[arg(long)]
    vae: Option<String>,
    /// Fixed seed (default: keep the workflow's seed)
    #[arg(long)]
    seed: Option<i64>,
    /// Stop after N assets (0 = no limit)
    #[arg(long, default_value_t = 0)]
    limit: usize,
    /// Only generate rel_paths matching this regex
    #[arg(long, value_name = "REGEX")]
    only: Option<String>,
    /// Print what would be generated without calling ComfyUI
    #[arg(long)]
    dry_run: bool,
    /// Write outputs under this root instead of each item's full_path
    #[arg(long, value_name = "DIR")]
    output_root: Option<PathBuf>,
    /// Write outputs under assets/zelos_variants/<VARIANT> unless --output-root is given
    #[arg(long)]
    variant: Option<String>,
    /// Render at a reduced size and upscale back to the requested size
    #[arg(long)]
    fit_vram: bool,
    /// Max width/height used when --fit-vram is enabled
    #[arg(long, default_value_t = 768)]
    max_render_dim: u32,
    /// Flood-fill the background from the image edges to transparency
    #[arg(long)]
    auto_alpha: bool,
    /// Color tolerance (0-255) used by --auto-alpha
    #[arg(long, default_value_t = 24)]
    alpha_tolerance: u8,
    /// Samples per edge used to infer background colors for --auto-alpha
    #[arg(long, default_value_t = 12)]
    alpha_samples: u32,
    /// Max seconds to wait for one prompt to finish
    #[arg(long, default_value_t = 1800)]
    timeout_s: u64,
    /// Use the style preset's sampler, scheduler, steps and cfg
    #[arg(long)]
    preset_sampler: bool,
    #[arg(long)]
    sampler_name: Option<String>,
    #[arg(long)]
    scheduler: Option<String>,
    #[arg(long)]
    steps: Option<i64>,
    #[arg(long)]
    cfg: Option<f64>,
    /// Raw workflow overrides as key=value (repeatable), e.g. `3.inputs.denoise=0.8`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    sets: Vec<String>,
    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn kit_name(index: &Path) -> String {
    index
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim_end_matches(".json").trim_end_matches("-index").to_string())
        .unwrap_or_else(|| "default".to_string())
}

fn output_root_for(
    conf: &Config,
    output_root: Option<PathBuf>,
    variant: Option<&str>,
) -> Option<PathBuf> {
    output_root.or_else(|| variant.map(|v| conf.project_root.join(VARIANTS_DIR).join(v)))
}

fn validate(args: ValidateArgs) -> Result<bool, Box<dyn std::error::Error>> {
    let mut asset_index = AssetIndex::load(&args.index)?;
    if let Some(root) = args.root {
        asset_index.root = root;
    }
    let mut report =
        ValidationReport::build_with(&asset_index, args.status.filter(), args.check_size);
    report.index = Some(args.index.display().to_string());
    if let Some(spec) = &args.spritesheet_spec {
        let entries = load_sheet_spec(spec)?;
        report.check_spritesheets(&spec.display().to_string(), entries);
    }

    println!(
        "Checked: {} | Present: {} | Missing: {} | Expansion errors: {}",
        report.checked,
        report.present,
        report.missing.len(),
        report.expansion_errors.len()
    );
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for item in &report.missing {
            println!("MISSING: {}", item.rel_path);
        }
        for mismatch in report.size_mismatches.iter().chain(&report.spritesheet_size_mismatches) {
            let [ew, eh] = mismatch.expected_size;
            let actual = match mismatch.actual_size {
                Some([aw, ah]) => format!("{}x{}", aw, ah),
                None => "?x?".to_string(),
            };
            println!("SIZE: {} expected {}x{}, got {}", mismatch.rel_path, ew, eh, actual);
        }
        if report.spritesheet_spec.is_some() {
            println!(
                "Spritesheet metadata: {} | Checked: {} | Missing: {}",
                report.spritesheet_entries.len(),
                report.spritesheet_checked,
                report.spritesheet_missing.len()
            );
            for rel_path in &report.spritesheet_missing {
                println!("SHEET MISSING: {}", rel_path);
            }
        }
    }
    if let Some(path) = &args.report_path {
        report.write(path)?;
        println!("Wrote {}", path.display());
    }
    Ok(!report.has_failures(args.strict_spritesheets))
}

fn workflow_for(conf: &Config, style: Style, explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if style == Style::Pony {
        let pony = conf.workflow_path.with_file_name(PONY_WORKFLOW);
        if pony.is_file() {
            return pony;
        }
    }
    conf.workflow_path.clone()
}

async fn generate(conf: &Config, args: GenerateArgs) -> Result<bool, Box<dyn std::error::Error>> {
    let (items, expansion_errors) = match (&args.worklist.report, &args.worklist.index) {
        (Some(report), _) => {
            let report = ValidationReport::load(report)?;
            let errors = report.expansion_errors.len();
            (report.missing, errors)
        }
        (None, Some(index)) => worklist_from_index(&AssetIndex::load(index)?, args.status.filter()),
        (None, None) => return Err("one of --report or --index is required".into()),
    };

    let style = args
        .style
        .unwrap_or_else(|| args.ckpt.as_deref().map(Style::for_checkpoint).unwrap_or_default());
    let workflow_path = workflow_for(conf, style, args.workflow);
    let workflow = JobDocument::load(&workflow_path)?;
    tracing::info!("Using workflow {} with preset {}", workflow_path.display(), style.name());

    let mut sampler = if args.preset_sampler {
        SamplerOverrides::from(style.sampler())
    } else {
        SamplerOverrides::default()
    };
    sampler.sampler_name = args.sampler_name.or(sampler.sampler_name);
    sampler.scheduler = args.scheduler.or(sampler.scheduler);
    sampler.steps = args.steps.or(sampler.steps);
    sampler.cfg = args.cfg.or(sampler.cfg);

    let options = GenerateOptions {
        style,
        checkpoint: args.ckpt,
        vae: args.vae,
        seed: args.seed,
        sampler,
        limit: args.limit,
        only: args.only.as_deref().map(Regex::new).transpose()?,
        dry_run: args.dry_run,
        output_root: output_root_for(conf, args.output_root, args.variant.as_deref()),
        fit_vram: args.fit_vram,
        max_render_dim: args.max_render_dim,
        auto_alpha: args.auto_alpha,
        alpha: AlphaSettings {
            tolerance: args.alpha_tolerance,
            samples_per_edge: args.alpha_samples,
        },
        timeout: Duration::from_secs(args.timeout_s),
        overrides: parse_set_pairs(&args.sets)?,
    };

    let client = ComfyUIClient::new(&conf.comfyui_url);
    let generator = Generator::new(&client, workflow, options);
    let mut summary = generator.run(&items).await?;
    summary.expansion_errors = expansion_errors;
    if expansion_errors > 0 {
        tracing::warn!("{} index entries could not be expanded", expansion_errors);
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(summary.failed == 0)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    Config::dotenv_load();
    init_tracing();
    let cli = Cli::parse();

    let mut conf = Config::new();
    if let Some(url) = cli.comfyui_url {
        conf.comfyui_url = url;
    }

    match cli.command {
        Commands::Expand { index, json } => {
            let index = AssetIndex::load(&index)?;
            let expansion = expand_index(&index);
            if json {
                println!("{}", serde_json::to_string_pretty(&expansion)?);
            } else {
                for asset in &expansion.assets {
                    println!("{}", asset.rel_path);
                }
            }
            for error in &expansion.errors {
                eprintln!("entry {}: {}", error.entry, error.message);
            }
            if !expansion.errors.is_empty() {
                std::process::exit(1);
            }
        }
        Commands::Validate(args) => {
            if !validate(args)? {
                std::process::exit(1);
            }
        }
        Commands::Generate(args) => {
            if !generate(&conf, args).await? {
                std::process::exit(1);
            }
        }
        Commands::Classify { rel_path, style } => {
            match classify(&rel_path, style.unwrap_or_default()) {
                Some(pair) => println!("{}", serde_json::to_string_pretty(&pair)?),
                None => {
                    eprintln!("No prompt mapping for {}", rel_path);
                    std::process::exit(2);
                }
            }
        }
        Commands::Specs { index, kit } => {
            let kit = kit.unwrap_or_else(|| kit_name(&index));
            let store = SpecStore::from_config(&conf);
            let created = store.create_from_index(&AssetIndex::load(&index)?, &kit)?;
            println!("Created {} specs in {}", created, store.specs_dir().join(&kit).display());
        }
        Commands::Presets { json } => {
            let presets = all_presets();
            if json {
                println!("{}", serde_json::to_string_pretty(&presets)?);
            } else {
                for preset in presets {
                    println!(
                        "{:<12} {:?} {} / {} / {} steps / cfg {}",
                        preset.name,
                        preset.phrasing,
                        preset.sampler.sampler_name,
                        preset.sampler.scheduler,
                        preset.sampler.steps,
                        preset.sampler.cfg
                    );
                }
            }
        }
        Commands::Checkpoints { json } => {
            let client = ComfyUIClient::new(&conf.comfyui_url);
            let list = match client.get_checkpoints().await {
                Ok(list) => list,
                Err(e) => {
                    tracing::warn!("ComfyUI unavailable ({}), showing built-in list", e);
                    KNOWN_CHECKPOINTS.iter().map(|s| s.to_string()).collect()
                }
            };
            if json {
                println!("{}", serde_json::to_string(&list)?);
            } else {
                for name in list {
                    println!("{}", name);
                }
            }
        }
    }
    Ok(())
}

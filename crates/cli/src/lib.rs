use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use doc_model::{AnnotationRecord, InteractionMode, ResolverPolicy};
use pagemark_app::{Notice, ViewerApp};
use pdf_engine::{default_engine, surface_dimensions, OpenSource, PdfEngine};
use save_transport::{HttpTransport, SaveTransport};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use storage::{annotations_path, load_annotations, save_annotations, Storage, ViewerConfig};
use tracing::{debug, warn};

#[derive(Debug, Parser)]
#[command(name = "pagemark")]
#[command(about = "Highlight and comment on PDF pages")]
pub struct Cli {
    /// Directory holding config.json. Defaults to the platform config dir.
    #[arg(long, global = true, env = "PAGEMARK_CONFIG_DIR", value_name = "DIR")]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print page count and rendered page sizes as JSON.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Render scale; defaults to the configured one.
        #[arg(long)]
        scale: Option<f32>,
    },
    /// Replay a scripted annotation session against a PDF.
    Annotate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// JSON array of steps, e.g. `[{"action":"toggle_highlight"}]`.
        #[arg(long, value_name = "STEPS.json")]
        script: PathBuf,
        /// Previously saved annotations to start from.
        #[arg(long, value_name = "ANNOTATIONS.json")]
        seed: Option<PathBuf>,
        /// Where to write the final annotations. Defaults to the sidecar
        /// next to FILE.
        #[arg(long, value_name = "ANNOTATIONS.json")]
        output: Option<PathBuf>,
        /// Write every rendered page, with its overlay, as PNG.
        #[arg(long, value_name = "DIR")]
        render_dir: Option<PathBuf>,
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
        /// Base URL of the save endpoint.
        #[arg(long, env = "PAGEMARK_ENDPOINT")]
        endpoint: Option<String>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    IndexScaled,
    Cumulative,
}

impl From<PolicyArg> for ResolverPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::IndexScaled => ResolverPolicy::IndexScaled,
            PolicyArg::Cumulative => ResolverPolicy::Cumulative,
        }
    }
}

/// One user gesture in an `annotate` script.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Step {
    ToggleHighlight,
    ToggleComment,
    Click { x: f64, y: f64 },
    ConfirmComment { text: String },
    CloseComment,
    ClickOutside,
    Save,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    scale: f32,
    pages: Vec<PageOutput>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    page: u32,
    width_pt: f32,
    height_pt: f32,
    width_px: u32,
    height_px: u32,
}

#[derive(Debug, Serialize)]
struct AnnotateOutput<'a> {
    page_count: u32,
    mode: InteractionMode,
    annotations: &'a [AnnotationRecord],
    notices: Vec<Notice>,
    output: String,
    rendered: Vec<String>,
}

struct AnnotateArgs {
    file: PathBuf,
    script: PathBuf,
    seed: Option<PathBuf>,
    output: Option<PathBuf>,
    render_dir: Option<PathBuf>,
    policy: Option<PolicyArg>,
    endpoint: Option<String>,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file, scale } => {
            let config = load_config(cli.config_dir.as_deref())?;
            run_info(&file, scale.unwrap_or(config.render_scale))
        }
        Commands::Annotate { file, script, seed, output, render_dir, policy, endpoint } => {
            let config = load_config(cli.config_dir.as_deref())?;
            let args = AnnotateArgs { file, script, seed, output, render_dir, policy, endpoint };
            run_annotate(args, config)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(config_dir: Option<&Path>) -> Result<ViewerConfig> {
    let storage = match config_dir {
        Some(dir) => Storage::with_root(dir),
        None => match Storage::from_default_project() {
            Ok(storage) => storage,
            Err(err) => {
                warn!(%err, "using default config");
                return Ok(ViewerConfig::default());
            }
        },
    };

    storage
        .load_config()
        .with_context(|| format!("failed to read config in {}", storage.root().display()))
}

fn run_info(file: &Path, scale: f32) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let mut pages = Vec::with_capacity(page_count as usize);
    for index in 0..page_count {
        let size = engine.page_size(handle, index)?;
        let (width_px, height_px) = surface_dimensions(size, scale);
        pages.push(PageOutput {
            page: index + 1,
            width_pt: size.width_pt,
            height_pt: size.height_pt,
            width_px,
            height_px,
        });
    }

    let payload = InfoOutput { path: file.display().to_string(), page_count, scale, pages };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    engine.close(handle)?;

    Ok(())
}

fn run_annotate(args: AnnotateArgs, mut config: ViewerConfig) -> Result<()> {
    ensure_pdf_exists(&args.file)?;

    let script = fs::read(&args.script)
        .with_context(|| format!("failed to read script {}", args.script.display()))?;
    let steps: Vec<Step> = serde_json::from_slice(&script).context("invalid script")?;

    if let Some(policy) = args.policy {
        config.resolver = policy.into();
    }
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }

    let transport = HttpTransport::new(&config.endpoint);
    let mut app = ViewerApp::new(default_engine(), transport, config);
    app.select_path(&args.file)?;

    if let Some(seed) = &args.seed {
        let records = load_annotations(seed)
            .with_context(|| format!("failed to read annotations {}", seed.display()))?;
        app.seed_annotations(records)?;
    }

    app.wait_for_render();

    for step in steps {
        apply_step(&mut app, step);
    }

    let rendered = match &args.render_dir {
        Some(dir) => export_pages(&app, dir)?,
        None => Vec::new(),
    };

    let output = args.output.unwrap_or_else(|| annotations_path(&args.file));
    save_annotations(&output, app.session().store().serialize())
        .with_context(|| format!("failed to write annotations to {}", output.display()))?;

    let notices = app.take_notices();
    let payload = AnnotateOutput {
        page_count: app.session().page_count(),
        mode: app.session().mode(),
        annotations: app.session().store().serialize(),
        notices,
        output: output.display().to_string(),
        rendered: rendered.iter().map(|path| path.display().to_string()).collect(),
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn apply_step<E, T>(app: &mut ViewerApp<E, T>, step: Step)
where
    E: PdfEngine + Send + Sync + 'static,
    T: SaveTransport,
{
    debug!(?step, "applying step");

    // Failed steps surface as notices in the final report.
    match step {
        Step::ToggleHighlight => {
            app.toggle_highlight();
        }
        Step::ToggleComment => {
            app.toggle_comment();
        }
        Step::Click { x, y } => {
            let outcome = app.click(x, y);
            debug!(?outcome, "click handled");
        }
        Step::ConfirmComment { text } => {
            let _ = app.confirm_comment(&text);
        }
        Step::CloseComment => {
            app.close_comment_prompt();
        }
        Step::ClickOutside => {
            app.dismiss_comment_prompt();
        }
        Step::Save => {
            let _ = app.save();
        }
    }
}

fn export_pages<E, T>(app: &ViewerApp<E, T>, dir: &Path) -> Result<Vec<PathBuf>>
where
    E: PdfEngine + Send + Sync + 'static,
    T: SaveTransport,
{
    fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    for page in app.rendered_pages() {
        let Some(image) = app.export_page(page) else {
            continue;
        };

        let path = dir.join(format!("page-{page}.png"));
        image
            .save(&path)
            .with_context(|| format!("failed to write image to {}", path.display()))?;
        written.push(path);
    }

    Ok(written)
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

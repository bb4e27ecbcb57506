use anyhow::{anyhow, Context, Result};
use ebl_fracture::*;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str = "\
Usage: ebl-fracture <layout.json> <output-dir> [options]
  --config <file>       job configuration (default ~/.ebl-fracture/config.json)
  --format cabl|xenos   exposure job format
  --merge               union shapes per field and expose with the default dose
  --visible-only        only convert visible layers";

#[derive(Debug, Default)]
struct Args {
    layout: PathBuf,
    out_dir: PathBuf,
    config: Option<PathBuf>,
    format: Option<ExposureFormat>,
    merge: bool,
    visible_only: bool,
}

fn parse_args(args: &[String]) -> Result<Option<Args>> {
    let mut positional = Vec::new();
    let mut parsed = Args::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--config" => {
                let path = iter.next().ok_or_else(|| anyhow!("--config needs a path"))?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--format" => {
                let value = iter.next().ok_or_else(|| anyhow!("--format needs a value"))?;
                parsed.format = Some(value.parse().map_err(|e: String| anyhow!(e))?);
            }
            "--merge" => parsed.merge = true,
            "--visible-only" => parsed.visible_only = true,
            other if other.starts_with("--") => return Err(anyhow!("unknown option {other}")),
            other => positional.push(PathBuf::from(other)),
        }
    }

    let [layout, out_dir] = <[PathBuf; 2]>::try_from(positional)
        .map_err(|found| anyhow!("expected 2 paths, got {}", found.len()))?;
    parsed.layout = layout;
    parsed.out_dir = out_dir;
    Ok(Some(parsed))
}

fn load_config(args: &Args) -> Result<JobConfig> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => JobConfig::default_path(),
    };
    let mut config = match path {
        Some(path) => JobConfig::load_from_path(&path)
            .with_context(|| format!("load job config {}", path.display()))?,
        None => JobConfig::default(),
    };

    if let Some(format) = args.format {
        config.format = format;
        if format == ExposureFormat::Xenos {
            config.field.dots = XENOS_DOTS;
        }
    }
    config.merge |= args.merge;
    config.visible_only |= args.visible_only;
    Ok(config)
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

fn main() -> Result<()> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let Some(args) = parse_args(&raw)? else {
        println!("{USAGE}");
        return Ok(());
    };

    let config = load_config(&args)?;
    init_logging(&config.log_level);

    let layout = Layout::load_from_path(&args.layout)
        .with_context(|| format!("load layout {}", args.layout.display()))?;
    let report = run(&layout, &config, &args.out_dir, &CancelToken::new())
        .with_context(|| format!("convert {}", args.layout.display()))?;

    println!("{}", report.summary());
    if !report.rejections.is_empty() {
        println!("{} shapes skipped:", report.rejections.len());
        for rejection in &report.rejections {
            println!("  {rejection}");
        }
    }
    println!("\nWrote {} file(s):", report.files.len());
    for file in &report.files {
        println!("  {}", file.display());
    }
    Ok(())
}

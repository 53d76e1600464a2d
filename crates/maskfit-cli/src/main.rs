//! maskfit: fit a mask file to the resolution of an image file.
//!
//! Decodes both files, runs the mask fitting pipeline, prints the fit
//! summary, and optionally writes the fitted mask and the composited
//! preview back to disk. A zero latent of a chosen size can be
//! synthesized to exercise the latent projection.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin maskfit -- --image photo.png --mask mask.png [OPTIONS]
//! ```

#![allow(clippy::print_stdout)]

mod error;
mod raster;

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use maskfit_pipeline::diagnostics::{Clock, process_with_diagnostics};
use maskfit_pipeline::{Channel, Dimensions, FitConfig, Latent, ResampleMethod};
use ndarray::{ArrayD, IxDyn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::CliError;
use crate::raster::MaskSource;

/// Fit an inpainting mask to the resolution of a reference image.
///
/// Prints a short summary of the fit. Use `--fixed-mask` and
/// `--preview` to write the results.
#[derive(Parser)]
#[command(name = "maskfit", version)]
struct Cli {
    /// Reference image whose resolution the mask is fitted to.
    #[arg(long)]
    image: PathBuf,

    /// Mask image to fit.
    #[arg(long)]
    mask: PathBuf,

    /// Which signal of the mask file is used as the mask.
    #[arg(long, value_enum, default_value_t = MaskSource::Luma)]
    mask_source: MaskSource,

    /// Interpolation when scaling the mask to the image size.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_RESAMPLE)]
    resample: Method,

    /// Interpolation when projecting the mask onto the latent.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_LATENT_RESAMPLE)]
    latent_resample: Method,

    /// Channel read back from the resampled mask-image
    /// (red, green, blue or alpha).
    #[arg(long, value_parser = Channel::from_str, default_value_t = FitConfig::DEFAULT_INTERMEDIATE_CHANNEL)]
    intermediate_channel: Channel,

    /// Synthesize a zero latent of this spatial size (`WIDTHxHEIGHT`).
    #[arg(long, value_parser = parse_latent_size, conflicts_with = "latent_downscale")]
    latent_size: Option<Dimensions>,

    /// Synthesize a zero latent at the image size divided by this factor.
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    latent_downscale: Option<usize>,

    /// Channel count of the synthesized latent.
    #[arg(long, default_value_t = 4, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    latent_channels: usize,

    /// Write the fitted mask as a grayscale image.
    #[arg(long)]
    fixed_mask: Option<PathBuf>,

    /// Write the image with the fitted mask as alpha (needs a format
    /// with alpha, such as PNG).
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Print the summary (or diagnostics) as JSON.
    #[arg(long)]
    json: bool,

    /// Print per-stage timing and metrics.
    #[arg(long)]
    diagnostics: bool,

    /// Full fit config as a JSON string.
    ///
    /// When provided, `--resample`, `--latent-resample` and
    /// `--intermediate-channel` are ignored.
    /// The JSON must be a valid `FitConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

/// Interpolation method selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Method {
    /// Nearest neighbor sampled at pixel centers.
    NearestExact,
    /// Legacy nearest neighbor.
    Nearest,
    /// Bilinear with half-pixel centers.
    Bilinear,
    /// Catmull-Rom bicubic.
    Bicubic,
    /// Lanczos with 3 lobes.
    Lanczos3,
}

impl Method {
    const fn from_pipeline(method: ResampleMethod) -> Self {
        match method {
            ResampleMethod::NearestExact => Self::NearestExact,
            ResampleMethod::Nearest => Self::Nearest,
            ResampleMethod::Bilinear => Self::Bilinear,
            ResampleMethod::Bicubic => Self::Bicubic,
            ResampleMethod::Lanczos3 => Self::Lanczos3,
        }
    }

    const fn to_pipeline(self) -> ResampleMethod {
        match self {
            Self::NearestExact => ResampleMethod::NearestExact,
            Self::Nearest => ResampleMethod::Nearest,
            Self::Bilinear => ResampleMethod::Bilinear,
            Self::Bicubic => ResampleMethod::Bicubic,
            Self::Lanczos3 => ResampleMethod::Lanczos3,
        }
    }
}

/// CLI defaults derived from [`FitConfig`] so the two cannot silently
/// diverge.
const CLI_DEFAULT_RESAMPLE: Method = Method::from_pipeline(FitConfig::DEFAULT_RESAMPLE_METHOD);
const CLI_DEFAULT_LATENT_RESAMPLE: Method =
    Method::from_pipeline(FitConfig::DEFAULT_LATENT_RESAMPLE_METHOD);

/// Parse `WIDTHxHEIGHT` into non-empty [`Dimensions`].
fn parse_latent_size(value: &str) -> Result<Dimensions, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid size {part:?}: {e}"))
    };
    let dims = Dimensions::new(parse(width)?, parse(height)?);
    if dims.is_empty() {
        return Err(format!("latent size must be non-zero, got {value:?}"));
    }
    Ok(dims)
}

/// Build a [`FitConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual config flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<FitConfig, CliError> {
    if let Some(ref json) = cli.config_json {
        return Ok(serde_json::from_str(json)?);
    }

    Ok(FitConfig {
        resample_method: cli.resample.to_pipeline(),
        latent_resample_method: cli.latent_resample.to_pipeline(),
        intermediate_channel: cli.intermediate_channel,
    })
}

/// Spatial size of the latent to synthesize, if one was requested.
fn latent_size(cli: &Cli, image: Dimensions) -> Option<Dimensions> {
    cli.latent_size.or_else(|| {
        cli.latent_downscale.map(|factor| {
            Dimensions::new(
                (image.width / factor).max(1),
                (image.height / factor).max(1),
            )
        })
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("maskfit={log_level}").into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(err) = run(&cli) {
        tracing::error!("{err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = config_from_cli(cli)?;
    tracing::debug!(?config, "fit config");

    let image = raster::image_tensor(&raster::open(&cli.image)?)?;
    let mask = raster::mask_tensor(&raster::open(&cli.mask)?, cli.mask_source)?;
    tracing::info!(
        image = %cli.image.display(),
        shape = ?image.shape(),
        mask = %cli.mask.display(),
        mask_shape = ?mask.shape(),
        "loaded inputs"
    );

    let image_size = maskfit_pipeline::image_dimensions(&image)?;
    let latent = latent_size(cli, image_size).map(|size| {
        Latent::from_samples(ArrayD::zeros(IxDyn(&[
            1,
            cli.latent_channels,
            size.height,
            size.width,
        ])))
    });

    let (result, diagnostics) =
        process_with_diagnostics(&image, &mask, latent.as_ref(), &config, &StdClock)?;

    match (cli.json, cli.diagnostics) {
        (true, true) => println!("{}", serde_json::to_string_pretty(&diagnostics)?),
        (true, false) => println!("{}", serde_json::to_string_pretty(&result.summary)?),
        (false, true) => println!("{}\n\n{}", result.info(), diagnostics.report()),
        (false, false) => println!("{}", result.info()),
    }

    if let Some(ref path) = cli.fixed_mask {
        raster::save_mask(result.fixed_mask.view(), path)?;
        tracing::info!(path = %path.display(), "wrote fitted mask");
    }
    if let Some(ref path) = cli.preview {
        raster::save_preview(result.preview_image.view(), path)?;
        tracing::info!(path = %path.display(), "wrote preview");
    }

    Ok(())
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        let base = ["maskfit", "--image", "in.png", "--mask", "mask.png"];
        Cli::try_parse_from(base.iter().chain(args).copied())
    }

    #[test]
    fn defaults_match_fit_config() {
        let cli = parse(&[]).unwrap();
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config, FitConfig::default());
        assert_eq!(cli.mask_source, MaskSource::Luma);
        assert_eq!(cli.latent_channels, 4);
        assert!(!cli.verbose);
    }

    #[test]
    fn method_flags_reach_config() {
        let cli = parse(&["--resample", "bilinear", "--latent-resample", "lanczos3"]).unwrap();
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.resample_method, ResampleMethod::Bilinear);
        assert_eq!(config.latent_resample_method, ResampleMethod::Lanczos3);
    }

    #[test]
    fn intermediate_channel_flag_reaches_config() {
        let cli = parse(&["--intermediate-channel", "green"]).unwrap();
        assert_eq!(config_from_cli(&cli).unwrap().intermediate_channel, Channel::Green);

        let cli = parse(&[]).unwrap();
        assert_eq!(
            cli.intermediate_channel,
            FitConfig::DEFAULT_INTERMEDIATE_CHANNEL
        );
    }

    #[test]
    fn unknown_intermediate_channel_is_rejected() {
        assert!(parse(&["--intermediate-channel", "luma"]).is_err());
        assert!(parse(&["--intermediate-channel", "Green"]).is_err());
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = parse(&[
            "--resample",
            "bilinear",
            "--config-json",
            r#"{"intermediate_channel":"Green"}"#,
        ])
        .unwrap();
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.resample_method, ResampleMethod::NearestExact);
        assert_eq!(config.intermediate_channel, Channel::Green);
    }

    #[test]
    fn invalid_config_json_is_an_error() {
        let cli = parse(&["--config-json", "{"]).unwrap();
        assert!(matches!(config_from_cli(&cli), Err(CliError::Json(_))));
    }

    #[test]
    fn latent_size_parses() {
        assert_eq!(parse_latent_size("64x48").unwrap(), Dimensions::new(64, 48));
        assert_eq!(parse_latent_size("8X8").unwrap(), Dimensions::new(8, 8));
        assert!(parse_latent_size("64").is_err());
        assert!(parse_latent_size("0x8").is_err());
        assert!(parse_latent_size("ax8").is_err());
    }

    #[test]
    fn latent_size_and_downscale_conflict() {
        assert!(parse(&["--latent-size", "8x8", "--latent-downscale", "8"]).is_err());
    }

    #[test]
    fn zero_downscale_is_rejected() {
        assert!(parse(&["--latent-downscale", "0"]).is_err());
    }

    #[test]
    fn downscale_derives_latent_size() {
        let cli = parse(&["--latent-downscale", "8"]).unwrap();
        assert_eq!(
            latent_size(&cli, Dimensions::new(512, 260)),
            Some(Dimensions::new(64, 32)),
        );
        assert_eq!(
            latent_size(&cli, Dimensions::new(4, 4)),
            Some(Dimensions::new(1, 1)),
        );
        assert_eq!(latent_size(&parse(&[]).unwrap(), Dimensions::new(4, 4)), None);
    }

    #[test]
    fn mask_source_values() {
        let cli = parse(&["--mask-source", "alpha"]).unwrap();
        assert_eq!(cli.mask_source, MaskSource::Alpha);
        assert!(parse(&["--mask-source", "cyan"]).is_err());
    }

    #[test]
    fn image_and_mask_are_required() {
        assert!(Cli::try_parse_from(["maskfit", "--image", "in.png"]).is_err());
    }

    #[test]
    fn std_clock_measures_forward() {
        let start = StdClock.now();
        assert!(StdClock.elapsed(&start) >= Duration::ZERO);
    }
}

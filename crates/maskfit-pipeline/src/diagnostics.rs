//! Pipeline diagnostics: timing and shape metrics for each stage.
//!
//! [`process_with_diagnostics`] drives the staged [`Pipeline`] and
//! records how long every stage took along with the metrics the stage
//! reports through [`PipelineStage::metrics`].
//!
//! Timestamps come from a caller-supplied [`Clock`] so this crate stays
//! free of any platform timer. Durations are serialized as fractional
//! seconds (`f64`) since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::composite::AlphaMode;
use crate::latent::Latent;
use crate::lift::MaskLayout;
use crate::pipeline::{Pipeline, PipelineStage};
use crate::summary::FitSummary;
use crate::types::{Dimensions, FitConfig, FitError, FitResult};

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitDiagnostics {
    /// Every stage that did work, in execution order. The latent stage
    /// is absent when no latent was supplied.
    pub stages: Vec<StageDiagnostics>,
    /// Total wall-clock duration of the whole fit (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// The same summary carried by the [`FitResult`].
    pub summary: FitSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Stage name, as given by [`PipelineStage::NAME`].
    pub name: String,
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Dimension extraction.
    Measure {
        /// Spatial size of the reference image.
        image: Dimensions,
        /// Image batch size.
        image_batch: usize,
        /// Image channel count.
        image_channels: usize,
        /// Spatial size of the mask.
        mask: Dimensions,
        /// Number of axes in the mask as supplied.
        mask_rank: usize,
    },
    /// Mask-to-image lift.
    Lift {
        /// Rank normalization applied.
        layout: MaskLayout,
        /// Batch size after lifting.
        batch: usize,
        /// Channel count after lifting.
        channels: usize,
    },
    /// Resampling to the image size.
    Resample {
        /// Size before resampling.
        from: Dimensions,
        /// Size after resampling.
        to: Dimensions,
        /// Interpolation method name.
        method: String,
        /// Whether any resampling was performed.
        applied: bool,
    },
    /// Image-to-mask lower.
    Lower {
        /// Channel read back.
        channel: String,
        /// Channel count of the tensor it was read from.
        source_channels: usize,
    },
    /// Alpha composite.
    Composite {
        /// How the color channels were derived.
        mode: AlphaMode,
        /// Channel count of the source image.
        source_channels: usize,
    },
    /// Latent projection.
    Latent {
        /// Mask size before projection (the image size).
        from: Dimensions,
        /// Latent spatial size.
        to: Dimensions,
        /// Interpolation method name.
        method: String,
        /// Whether any resampling was performed.
        applied: bool,
    },
}

impl FitDiagnostics {
    /// Look up a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageDiagnostics> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Fit Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Mask {}x{} -> Image {}x{}",
            self.summary.mask.width,
            self.summary.mask.height,
            self.summary.image.width,
            self.summary.image.height,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<12} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(72));

        let total_ms = duration_ms(self.total_duration);
        for stage in &self.stages {
            let ms = duration_ms(stage.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&stage.metrics);
            lines.push(format!("{:<12} {ms:>8.3}ms {pct:>9.1}%  {details}", stage.name));
        }

        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Measure {
            image,
            image_batch,
            image_channels,
            mask,
            mask_rank,
        } => format!(
            "image {image_batch}x{}x{}x{image_channels}, mask {}x{} ({mask_rank} axes)",
            image.height, image.width, mask.height, mask.width,
        ),
        StageMetrics::Lift {
            layout,
            batch,
            channels,
        } => format!("{layout} -> {batch}xHxWx{channels}"),
        StageMetrics::Resample {
            from,
            to,
            method,
            applied,
        }
        | StageMetrics::Latent {
            from,
            to,
            method,
            applied,
        } => {
            let status = if *applied { "scaled" } else { "unchanged" };
            format!(
                "{method} {}x{} -> {}x{} ({status})",
                from.width, from.height, to.width, to.height,
            )
        }
        StageMetrics::Lower {
            channel,
            source_channels,
        } => format!("{channel} of {source_channels} channels"),
        StageMetrics::Composite {
            mode,
            source_channels,
        } => format!("alpha {mode} on {source_channels} channels"),
    }
}

/// Time one stage transition and record its metrics.
fn timed<C, P, F>(
    clock: &C,
    stages: &mut Vec<StageDiagnostics>,
    advance: F,
) -> Result<P, FitError>
where
    C: Clock,
    P: PipelineStage,
    F: FnOnce() -> Result<P, FitError>,
{
    let start = clock.now();
    let state = advance()?;
    let duration = clock.elapsed(&start);
    if let Some(metrics) = state.metrics() {
        stages.push(StageDiagnostics {
            name: P::NAME.to_owned(),
            duration,
            metrics,
        });
    }
    Ok(state)
}

/// Run the full pipeline, collecting per-stage diagnostics.
///
/// Produces the same [`FitResult`] as [`crate::process`].
///
/// # Errors
///
/// Returns the first [`FitError`] raised by any stage.
pub fn process_with_diagnostics<C: Clock>(
    image: &ArrayD<f32>,
    mask: &ArrayD<f32>,
    latent: Option<&Latent>,
    config: &FitConfig,
    clock: &C,
) -> Result<(FitResult, FitDiagnostics), FitError> {
    let start = clock.now();
    let mut stages = Vec::with_capacity(6);

    let pending = Pipeline::new(image, mask, latent, *config);
    let measured = timed(clock, &mut stages, || pending.measure())?;
    let lifted = timed(clock, &mut stages, || measured.lift())?;
    let resampled = timed(clock, &mut stages, || lifted.resample())?;
    let lowered = timed(clock, &mut stages, || resampled.lower())?;
    let composited = timed(clock, &mut stages, || lowered.composite())?;
    let projected = timed(clock, &mut stages, || composited.project_latent())?;

    let result = projected.into_result();
    let diagnostics = FitDiagnostics {
        stages,
        total_duration: clock.elapsed(&start),
        summary: result.summary.clone(),
    };
    Ok((result, diagnostics))
}

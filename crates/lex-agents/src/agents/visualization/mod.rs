//! Visualization agent: render distribution and prediction panels to a PNG.
//!
//! The panel layout depends only on which inputs are present:
//!
//! | predictions | labels | panels                                            |
//! |-------------|--------|---------------------------------------------------|
//! | no          | any    | data distribution                                 |
//! | yes         | no     | data distribution, prediction distribution       |
//! | yes         | yes    | data distribution, prediction distribution, scatter |
//!
//! The data panel histograms the first numeric column, or is a placeholder
//! when there is none. Without the `plotting` feature, or when the image
//! cannot be written, rendering is skipped with a warning and the report says
//! nothing was written.

#[cfg(feature = "plotting")]
mod canvas;

use super::Stage;
use crate::config::PipelineConfig;
use crate::error::{Capability, PipelineError, Result};
use crate::types::StageState;
use crate::utils::{LabelValues, is_numeric_dtype, numeric_values};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One panel of the output image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelKind {
    /// Histogram of the first numeric dataset column.
    DataDistribution,
    /// Stands in for the data panel when no numeric column exists.
    Placeholder,
    PredictionDistribution,
    /// Predictions against labels with an identity line.
    PredictedVsActual,
}

/// Decide the panels for the given inputs. Always 1, 2 or 3 panels.
pub fn plan_panels(has_numeric: bool, has_predictions: bool, has_labels: bool) -> Vec<PanelKind> {
    let mut panels = vec![if has_numeric {
        PanelKind::DataDistribution
    } else {
        PanelKind::Placeholder
    }];
    if has_predictions {
        panels.push(PanelKind::PredictionDistribution);
        if has_labels {
            panels.push(PanelKind::PredictedVsActual);
        }
    }
    panels
}

/// Equal-width bin counts over the finite values. A constant input puts
/// everything in the middle bin.
pub fn histogram_counts(values: &[f64], bins: usize) -> Vec<usize> {
    let bins = bins.max(1);
    let mut counts = vec![0; bins];
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return counts;
    }

    let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if hi - lo <= f64::EPSILON {
        counts[bins / 2] = finite.len();
        return counts;
    }

    let width = (hi - lo) / bins as f64;
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
}

/// Rendering backend selected when the agent is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotBackend {
    Raster,
    Unavailable,
}

impl PlotBackend {
    /// The best backend compiled into this build.
    pub fn probe() -> Self {
        if cfg!(feature = "plotting") {
            PlotBackend::Raster
        } else {
            PlotBackend::Unavailable
        }
    }
}

/// Input of [`VisualizationAgent`].
#[derive(Debug, Clone, Copy)]
pub struct VisualizationRequest<'a> {
    pub dataset: &'a DataFrame,
    pub predictions: Option<&'a [f64]>,
    pub labels: Option<&'a Series>,
    /// Vocabulary of the model that produced `predictions`, when it was
    /// trained on text labels. Text labels are re-coded onto it.
    pub label_vocabulary: Option<&'a [String]>,
    /// Falls back to the configured default path.
    pub output_path: Option<&'a Path>,
}

impl<'a> VisualizationRequest<'a> {
    pub fn new(dataset: &'a DataFrame) -> Self {
        Self {
            dataset,
            predictions: None,
            labels: None,
            label_vocabulary: None,
            output_path: None,
        }
    }

    pub fn predictions(mut self, predictions: &'a [f64]) -> Self {
        self.predictions = Some(predictions);
        self
    }

    pub fn labels(mut self, labels: &'a Series) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn label_vocabulary(mut self, vocabulary: &'a [String]) -> Self {
        self.label_vocabulary = Some(vocabulary);
        self
    }

    pub fn output_path(mut self, path: &'a Path) -> Self {
        self.output_path = Some(path);
        self
    }
}

/// What a render call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderReport {
    pub panels: Vec<PanelKind>,
    pub output_path: PathBuf,
    /// `false` when rendering was skipped: no backend, or the write failed.
    pub written: bool,
}

/// Renders the pipeline's data and predictions.
#[derive(Debug, Clone)]
pub struct VisualizationAgent {
    backend: PlotBackend,
    histogram_bins: usize,
    default_output: PathBuf,
    state: StageState,
}

impl Default for VisualizationAgent {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl VisualizationAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            backend: PlotBackend::probe(),
            histogram_bins: config.histogram_bins,
            default_output: config.default_visualization_path.clone(),
            state: StageState::new(),
        }
    }

    /// Force a backend, e.g. to exercise the degraded path.
    pub fn with_backend(mut self, backend: PlotBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn backend(&self) -> PlotBackend {
        self.backend
    }

    pub fn render(&mut self, request: VisualizationRequest<'_>) -> Result<RenderReport> {
        self.run(request)
    }

    #[cfg(feature = "plotting")]
    fn draw(&self, panels: &[PanelKind], inputs: &PanelInputs, path: &Path) -> Result<()> {
        use canvas::{Canvas, DATA_BARS, PREDICTION_BARS};

        let mut canvas = Canvas::new(panels.len());
        for (idx, panel) in panels.iter().enumerate() {
            let area = canvas.area(idx);
            match panel {
                PanelKind::DataDistribution => canvas.histogram(
                    area,
                    &histogram_counts(&inputs.data, self.histogram_bins),
                    DATA_BARS,
                ),
                PanelKind::Placeholder => canvas.placeholder(area),
                PanelKind::PredictionDistribution => canvas.histogram(
                    area,
                    &histogram_counts(&inputs.predictions, self.histogram_bins),
                    PREDICTION_BARS,
                ),
                PanelKind::PredictedVsActual => {
                    canvas.scatter_with_identity(area, &inputs.actual, &inputs.predictions)
                }
            }
        }
        canvas.save(path)
    }

    #[cfg(not(feature = "plotting"))]
    fn draw(&self, _panels: &[PanelKind], _inputs: &PanelInputs, _path: &Path) -> Result<()> {
        Err(PipelineError::CapabilityUnavailable(Capability::Plotting))
    }
}

/// Plain numbers behind the panels.
#[derive(Debug, Default)]
struct PanelInputs {
    data: Vec<f64>,
    predictions: Vec<f64>,
    actual: Vec<f64>,
    /// Problems worth a note that do not stop rendering.
    warnings: Vec<String>,
}

impl PanelInputs {
    fn gather(request: &VisualizationRequest<'_>) -> Result<(Option<String>, Self)> {
        let first_numeric = request
            .dataset
            .get_columns()
            .iter()
            .find(|col| is_numeric_dtype(col.dtype()));

        let mut inputs = PanelInputs::default();
        let column_name = match first_numeric {
            Some(column) => {
                inputs.data = numeric_values(column.as_materialized_series())?
                    .into_iter()
                    .flatten()
                    .collect();
                Some(column.name().to_string())
            }
            None => None,
        };

        if let Some(predictions) = request.predictions {
            inputs.predictions = predictions.to_vec();
            if let Some(labels) = request.labels {
                let labels = LabelValues::from_series(labels)?;
                inputs.actual = inputs.align_labels(&labels, request.label_vocabulary);
                if inputs.actual.len() != predictions.len() {
                    inputs.warnings.push(format!(
                        "Plotting {} labels against {} predictions; unpaired values are ignored",
                        inputs.actual.len(),
                        predictions.len()
                    ));
                }
            }
        }

        Ok((column_name, inputs))
    }

    /// Label values on the same scale as the predictions. Text labels become
    /// positions in the model's vocabulary when one is known, otherwise in
    /// their own sorted vocabulary.
    fn align_labels(&mut self, labels: &LabelValues, trained: Option<&[String]>) -> Vec<f64> {
        let plain = || -> Vec<f64> {
            labels
                .values()
                .iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect()
        };

        match (labels.vocabulary(), trained) {
            (Some(own), Some(trained)) if own != trained => {
                let mut unseen = 0;
                let actual: Vec<f64> = labels
                    .values()
                    .iter()
                    .map(|&code| {
                        code.and_then(|c| own.get(c as usize))
                            .and_then(|text| trained.iter().position(|t| t == text))
                            .map(|position| position as f64)
                            .unwrap_or_else(|| {
                                unseen += 1;
                                f64::NAN
                            })
                    })
                    .collect();
                self.warnings.push(format!(
                    "Label vocabulary differs from the model's; {} label(s) unseen in training are not plotted",
                    unseen
                ));
                actual
            }
            (None, Some(_)) => {
                self.warnings.push(
                    "Numeric labels plotted against a model trained on text labels".to_string(),
                );
                plain()
            }
            _ => plain(),
        }
    }
}

impl Stage for VisualizationAgent {
    type Input<'a> = VisualizationRequest<'a>;
    type Output = RenderReport;

    fn name(&self) -> &'static str {
        "VisualizationAgent"
    }

    fn run(&mut self, request: VisualizationRequest<'_>) -> Result<RenderReport> {
        self.state.clear();

        let output_path = request
            .output_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_output.clone());
        let (column, mut inputs) = PanelInputs::gather(&request)?;
        for warning in std::mem::take(&mut inputs.warnings) {
            warn!("{}", warning);
            self.note(warning);
        }
        let panels = plan_panels(
            column.is_some(),
            request.predictions.is_some(),
            request.labels.is_some(),
        );

        self.state.set("panel_count", panels.len());
        self.state.set("panels", serde_json::to_value(&panels)?);
        self.state.set("distribution_column", column);
        self.state.set("output_path", output_path.display().to_string());

        let outcome = match self.backend {
            PlotBackend::Raster => self.draw(&panels, &inputs, &output_path),
            PlotBackend::Unavailable => Err(PipelineError::CapabilityUnavailable(Capability::Plotting)),
        };

        let written = match outcome {
            Ok(()) => {
                self.note(format!(
                    "Saved {} panel(s) to {}",
                    panels.len(),
                    output_path.display()
                ));
                true
            }
            Err(e) if e.is_degraded() => {
                warn!("{}; skipping visualization", e);
                self.note(format!("{}; skipped rendering", e));
                false
            }
            Err(e @ PipelineError::RenderFailed(_)) => {
                warn!("{}; visualization not written", e);
                self.note(format!("{}; visualization not written", e));
                false
            }
            Err(e) => return Err(e),
        };
        self.state.set("written", written);

        Ok(RenderReport {
            panels,
            output_path,
            written,
        })
    }

    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }
}

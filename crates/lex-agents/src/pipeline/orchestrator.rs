//! The orchestrator drives the four agents in a fixed order.

use crate::agents::{
    DataCollector, FeatureProcessor, FeatureRequest, PredictionAgent, PredictionRequest,
    RenderReport, Stage, VisualizationAgent, VisualizationRequest,
};
use crate::config::{ConfigValidationError, PipelineConfig};
use crate::error::Result;
use crate::pipeline::progress::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::types::{FeatureResult, PipelineRequest, PipelineSummary, StageState};
use chrono::Utc;
use polars::prelude::{DataFrame, Series};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Intermediate results of the most recent run.
///
/// Reset at the start of every run and filled stage by stage, so after a
/// failure it holds everything up to the last stage that succeeded.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub dataset: Option<DataFrame>,
    pub features: Option<FeatureResult>,
    pub predictions: Option<Vec<f64>>,
    pub render: Option<RenderReport>,
}

/// Owns one instance of each agent and runs them in order:
/// collection, features, prediction, visualization.
///
/// Use [`Orchestrator::builder()`] to create one.
///
/// # Example
///
/// ```rust,ignore
/// use lex_agents::{Orchestrator, PipelineRequest};
///
/// let mut orchestrator = Orchestrator::builder()
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?;
///
/// let summary = orchestrator.run_pipeline(
///     &PipelineRequest::new("data.csv").label_column("target"),
/// )?;
/// println!("{:?}", summary.feature_shape);
/// ```
pub struct Orchestrator {
    config: PipelineConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    collector: DataCollector,
    features: FeatureProcessor,
    predictor: PredictionAgent,
    visualizer: VisualizationAgent,
    artifacts: Artifacts,
}

// Lets callers run the pipeline on a worker thread
static_assertions::assert_impl_all!(Orchestrator: Send);

impl Orchestrator {
    /// Create a new orchestrator builder.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Run the agents once.
    ///
    /// Collection and feature processing always run. Prediction runs when
    /// training with a label, or when inferring with a trained model; it is
    /// skipped otherwise. Visualization runs when requested.
    ///
    /// # Errors
    ///
    /// The first agent error is returned unchanged and the remaining agents
    /// do not run.
    pub fn run_pipeline(&mut self, request: &PipelineRequest) -> Result<PipelineSummary> {
        match self.run_internal(request) {
            Ok(summary) => {
                self.report_progress(ProgressUpdate::complete("Pipeline completed successfully"));
                Ok(summary)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn run_internal(&mut self, request: &PipelineRequest) -> Result<PipelineSummary> {
        let start_time = Instant::now();
        self.artifacts = Artifacts::default();

        info!("Starting agent pipeline on {}", request.source_path.display());
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Initializing,
            0.0,
            "Starting agent pipeline...",
        ));

        // Step 1: collection
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Collection,
            0.0,
            format!("Loading {}", request.source_path.display()),
        ));
        let dataset = self.collector.run(request.source_path.as_path())?;
        self.artifacts.dataset = Some(dataset.clone());
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Collection,
            1.0,
            format!("Collected {} rows", dataset.height()),
        ));

        // Step 2: features
        self.report_progress(ProgressUpdate::new(
            PipelineStage::FeatureProcessing,
            0.0,
            "Processing features...",
        ));
        let features = self.features.run(FeatureRequest::new(
            &dataset,
            request.label_column.as_deref(),
        ))?;
        self.artifacts.features = Some(features.clone());
        self.report_progress(ProgressUpdate::new(
            PipelineStage::FeatureProcessing,
            1.0,
            format!("Built {} feature columns", features.features.width()),
        ));

        // Step 3: prediction
        let should_predict = if request.train {
            features.has_label()
        } else {
            self.predictor.is_trained()
        };

        let predictions = if should_predict {
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Prediction,
                0.0,
                if request.train {
                    "Training model..."
                } else {
                    "Predicting..."
                },
            ));
            let predictions = self.predictor.run(PredictionRequest {
                features: &features.features,
                train: request.train,
                label: features.label.as_ref(),
            })?;
            self.artifacts.predictions = Some(predictions.clone());
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Prediction,
                1.0,
                format!("Produced {} predictions", predictions.len()),
            ));
            Some(predictions)
        } else {
            info!(
                "Skipping prediction: {}",
                if request.train {
                    "no label column"
                } else {
                    "no trained model"
                }
            );
            None
        };

        // Step 4: visualization
        let visualization_path = if request.visualize {
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Visualization,
                0.0,
                "Rendering visualization...",
            ));
            let output = request
                .viz_output
                .clone()
                .unwrap_or_else(|| self.config.default_visualization_path.clone());
            let report = self.visualizer.run(VisualizationRequest {
                dataset: &dataset,
                predictions: predictions.as_deref(),
                labels: features.label.as_ref(),
                label_vocabulary: self
                    .predictor
                    .model()
                    .and_then(|model| model.label_vocabulary.as_deref()),
                output_path: Some(&output),
            })?;
            let written = report.written.then(|| report.output_path.clone());
            self.artifacts.render = Some(report);
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Visualization,
                1.0,
                "Visualization finished",
            ));
            written
        } else {
            None
        };

        let summary = PipelineSummary {
            data_shape: dataset.shape(),
            feature_shape: features.shape(),
            has_predictions: predictions.is_some(),
            prediction_count: predictions.as_ref().map(Vec::len),
            task_kind: self.predictor.task_kind(),
            visualization_path,
            duration_ms: start_time.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        };

        info!(
            "Pipeline finished in {}ms: data {:?}, features {:?}",
            summary.duration_ms, summary.data_shape, summary.feature_shape
        );
        Ok(summary)
    }

    /// Stage state of every agent, keyed by agent name.
    pub fn agent_states(&self) -> BTreeMap<&'static str, &StageState> {
        BTreeMap::from([
            (self.collector.name(), self.collector.state()),
            (self.features.name(), self.features.state()),
            (self.predictor.name(), self.predictor.state()),
            (self.visualizer.name(), self.visualizer.state()),
        ])
    }

    /// Persist the prediction agent's model. `Ok(false)` when none is trained.
    pub fn save_model(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        self.predictor.save_model(path)
    }

    /// Restore a model into the prediction agent.
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.predictor.load_model(path)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    pub fn dataset(&self) -> Option<&DataFrame> {
        self.artifacts.dataset.as_ref()
    }

    pub fn feature_matrix(&self) -> Option<&DataFrame> {
        self.artifacts.features.as_ref().map(|f| &f.features)
    }

    pub fn label(&self) -> Option<&Series> {
        self.artifacts.features.as_ref().and_then(|f| f.label.as_ref())
    }

    pub fn predictions(&self) -> Option<&[f64]> {
        self.artifacts.predictions.as_deref()
    }

    pub fn predictor(&self) -> &PredictionAgent {
        &self.predictor
    }
}

/// Builder for [`Orchestrator`].
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Option<PipelineConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(OrchestratorBuilder: Send);

impl OrchestratorBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter for receiving updates during a run.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// For more complex scenarios, use [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Validate the configuration and create the agents.
    pub fn build(self) -> std::result::Result<Orchestrator, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Orchestrator {
            collector: DataCollector::from_config(&config),
            features: FeatureProcessor::new(),
            predictor: PredictionAgent::from_config(&config),
            visualizer: VisualizationAgent::from_config(&config),
            artifacts: Artifacts::default(),
            progress_reporter: self.progress_reporter,
            config,
        })
    }
}

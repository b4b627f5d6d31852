//! The four pipeline agents and the contract they share.
//!
//! Every agent implements [`Stage`]: it accepts a typed input, produces a
//! typed output, and keeps a [`StageState`] describing its last invocation.
//! Agents never call each other; the [`Orchestrator`](crate::Orchestrator)
//! hands each one the outputs of the previous agents.

pub mod collector;
pub mod features;
pub mod prediction;
pub mod visualization;

pub use collector::DataCollector;
pub use features::{CategoricalEncoder, CategoryCodes, FeatureProcessor, FeatureRequest};
#[cfg(feature = "label-encoder")]
pub use features::LabelEncoder;
pub use prediction::{PredictionAgent, PredictionRequest};
pub use visualization::{PanelKind, PlotBackend, RenderReport, VisualizationAgent, VisualizationRequest};

use crate::error::Result;
use crate::types::StageState;
use tracing::info;

/// The uniform contract every pipeline agent implements.
pub trait Stage {
    /// Input accepted by [`run`](Stage::run). May borrow from the caller.
    type Input<'a>;
    /// Output produced by [`run`](Stage::run).
    type Output;

    /// Stable agent name used in logs and state maps.
    fn name(&self) -> &'static str;

    /// Execute the agent once.
    fn run(&mut self, input: Self::Input<'_>) -> Result<Self::Output>;

    /// Diagnostics recorded by the last invocation.
    fn state(&self) -> &StageState;

    fn state_mut(&mut self) -> &mut StageState;

    /// Emit a progress note: logged and kept in the agent's state.
    fn note(&mut self, message: impl Into<String>)
    where
        Self: Sized,
    {
        let message = message.into();
        info!("[{}] {}", self.name(), message);
        self.state_mut().push_note(message);
    }
}

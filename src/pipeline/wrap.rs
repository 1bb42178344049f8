//! Instrumentation wrapper
//!
//! `wrap` pairs an effective config with a set of instruments. Executing the
//! wrapped config yields the same [`BuildOutput`] as executing the bare one,
//! plus the reports of whichever instruments were active.

use super::{BuildOutput, HandlerInvoker, Instruments, Pipeline, PipelineError, SourceFile};
use super::{AnalysisReport, InstrumentSet, TimingReport};
use crate::config::EffectiveConfig;

/// An effective config with instruments attached.
#[derive(Debug, Clone)]
pub struct WrappedConfig {
    config: EffectiveConfig,
    instruments: InstrumentSet,
}

/// Build output plus instrument reports.
#[derive(Debug, Clone)]
pub struct WrappedOutcome {
    pub output: BuildOutput,
    pub timing: Option<TimingReport>,
    pub analysis: Option<AnalysisReport>,
}

/// Attach `instruments` to `config`. The config itself is not modified.
pub fn wrap(config: EffectiveConfig, instruments: InstrumentSet) -> WrappedConfig {
    WrappedConfig {
        config,
        instruments,
    }
}

impl WrappedConfig {
    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    pub fn instruments(&self) -> InstrumentSet {
        self.instruments
    }

    /// Resolve the pipeline and run `files` through it.
    pub fn execute(
        &self,
        files: &[SourceFile],
        invoker: &dyn HandlerInvoker,
    ) -> Result<WrappedOutcome, PipelineError> {
        let pipeline = Pipeline::from_config(&self.config)?;
        Ok(self.execute_with(&pipeline, files, invoker))
    }

    /// Run against an already resolved pipeline.
    pub fn execute_with(
        &self,
        pipeline: &Pipeline,
        files: &[SourceFile],
        invoker: &dyn HandlerInvoker,
    ) -> WrappedOutcome {
        if self.instruments.is_empty() {
            return WrappedOutcome {
                output: pipeline.execute(files, invoker),
                timing: None,
                analysis: None,
            };
        }

        let mut instruments = Instruments::new(self.instruments);
        let output = pipeline.run(files, invoker, &mut instruments);
        let (timing, analysis) = instruments.finish();

        tracing::debug!(
            timing = timing.is_some(),
            analysis = analysis.is_some(),
            "instrument reports collected"
        );

        WrappedOutcome {
            output,
            timing,
            analysis,
        }
    }
}

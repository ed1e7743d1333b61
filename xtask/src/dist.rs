use std::path::PathBuf;

use log::{debug, warn};

use crate::{
    build::{BuildDriver, BuildOutcome},
    cancel::CancelToken,
    error::{PipelineError, Result},
    objcopy::ImageExtractor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Spawning,
    Streaming,
    Finished { success: bool },
    Extracting,
    Done,
    Failed,
}

/// Decides whether a finished build can move on to extraction and returns
/// the executable to extract.
pub fn complete(outcome: BuildOutcome) -> Result<PathBuf> {
    if !outcome.success {
        return Err(PipelineError::BuildFailed {
            status: outcome.status.to_string(),
        });
    }

    if !outcome.status.success() {
        warn!(
            "compiler reported success but exited with {}",
            outcome.status
        );
    }

    outcome
        .artifact
        .ok_or(PipelineError::ArtifactNotFound {
            target: outcome.target,
        })
}

/// Compile, then convert. Runs the compiler once and the extractor at most
/// once.
pub struct Pipeline<E> {
    driver: BuildDriver,
    extractor: E,
    stage: Stage,
}

impl<E: ImageExtractor> Pipeline<E> {
    pub fn new(driver: BuildDriver, extractor: E) -> Self {
        Self {
            driver,
            extractor,
            stage: Stage::Spawning,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Returns the path of the written image.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<PathBuf> {
        let result = self.advance(cancel);
        if result.is_err() {
            self.enter(Stage::Failed);
        }
        result
    }

    fn advance(&mut self, cancel: &CancelToken) -> Result<PathBuf> {
        let running = self.driver.spawn()?;

        self.enter(Stage::Streaming);
        let outcome = running.finish(cancel)?;

        self.enter(Stage::Finished {
            success: outcome.success,
        });
        let elf = complete(outcome)?;

        self.enter(Stage::Extracting);
        let image = self.extractor.extract(&elf)?;

        self.enter(Stage::Done);
        Ok(image)
    }

    fn enter(&mut self, stage: Stage) {
        debug!("{:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }
}

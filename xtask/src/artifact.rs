use std::path::{Path, PathBuf};

use log::debug;

use crate::{
    error::{PipelineError, Result},
    event::BuildEvent,
};

/// Remembers where the compiler put the executable for one target.
#[derive(Debug)]
pub struct ArtifactRegistry {
    expected: String,
    resolved: Option<PathBuf>,
}

impl ArtifactRegistry {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            resolved: None,
        }
    }

    pub fn observe(&mut self, event: &BuildEvent) -> Result<()> {
        let BuildEvent::CompilerArtifact {
            target_name,
            executable,
        } = event
        else {
            return Ok(());
        };

        if *target_name != self.expected {
            return Ok(());
        }

        let path = executable
            .as_ref()
            .ok_or_else(|| PipelineError::MissingExecutablePath {
                target: target_name.clone(),
            })?;

        debug!("{} -> {}", target_name, path.display());
        self.resolved = Some(path.clone());

        Ok(())
    }

    pub fn resolved_path(&self) -> Option<&Path> {
        self.resolved.as_deref()
    }

    pub fn into_resolved(self) -> Option<PathBuf> {
        self.resolved
    }
}

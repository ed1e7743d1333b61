use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

use log::info;

use crate::{
    config,
    error::{ConversionCause, PipelineError, Result},
};

/// Turns the linked ELF into something that can be loaded.
pub trait ImageExtractor {
    /// Returns the path of the written image.
    fn extract(&self, elf: &Path) -> Result<PathBuf>;
}

/// `objcopy -O binary`, run through a launcher such as `rustup run nightly`.
#[derive(Debug, Clone)]
pub struct Objcopy {
    program: OsString,
    launcher_args: Vec<OsString>,
    output: PathBuf,
}

impl Objcopy {
    pub fn new(
        program: impl Into<OsString>,
        launcher_args: impl IntoIterator<Item = impl Into<OsString>>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            launcher_args: launcher_args.into_iter().map(Into::into).collect(),
            output: output.into(),
        }
    }

    /// The objcopy shipped with the nightly toolchain's `llvm-tools`.
    pub fn rustup(output: impl Into<PathBuf>) -> Self {
        Self::new("rustup", ["run", config::TOOLCHAIN, "objcopy"], output)
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn args(&self, elf: &Path) -> Vec<OsString> {
        let mut args = self.launcher_args.clone();
        args.push("-O".into());
        args.push("binary".into());
        args.push(elf.into());
        args.push(self.output.clone().into());
        args
    }
}

impl Default for Objcopy {
    fn default() -> Self {
        Self::rustup(config::project_root().join(config::IMAGE_NAME))
    }
}

impl ImageExtractor for Objcopy {
    fn extract(&self, elf: &Path) -> Result<PathBuf> {
        let program = self.program.to_string_lossy().into_owned();
        let failed = |cause| PipelineError::ConversionFailed {
            program: program.clone(),
            cause,
        };

        info!("{} -> {}", elf.display(), self.output.display());

        let status = Command::new(&self.program)
            .args(self.args(elf))
            .status()
            .map_err(|e| failed(ConversionCause::Spawn(e)))?;

        if !status.success() {
            return Err(failed(ConversionCause::Status(status)));
        }
        if !self.output.is_file() {
            return Err(failed(ConversionCause::MissingOutput(self.output.clone())));
        }

        Ok(self.output.clone())
    }
}

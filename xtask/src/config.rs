use std::{
    fmt,
    path::{Path, PathBuf},
};

use clap::ValueEnum;

pub const TOOLCHAIN: &str = "nightly";
pub const TARGET_TRIPLE: &str = "x86_64-unknown-none";
pub const BUILD_STD: &str = "alloc,core,panic_abort";
pub const BUILD_STD_FEATURES: &str = "panic_immediate_abort";
pub const MESSAGE_FORMAT: &str = "json-render-diagnostics";

/// Crate directory of the payload, relative to the project root.
pub const DUMPER_DIR: &str = "dumper";
/// Binary target whose ELF gets converted.
pub const DUMPER_TARGET: &str = "dumper";
pub const IMAGE_NAME: &str = "firmware-dumper.bin";

/// Firmware version the payload is built against. Must match a value
/// declared by `cfg(fw, values(..))` in the dumper's build script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Firmware {
    #[default]
    #[value(name = "1100")]
    V1100,
}

impl Firmware {
    pub fn version(self) -> &'static str {
        match self {
            Firmware::V1100 => "1100",
        }
    }

    /// Value for `RUSTFLAGS`.
    pub fn rustflags(self) -> String {
        format!("--cfg fw=\"{}\"", self.version())
    }
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.version())
    }
}

pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(1)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

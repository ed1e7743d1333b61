//! Host-side tooling for the firmware dumper: builds the payload for the
//! bare-metal target, locates the linked ELF through cargo's JSON messages and
//! flattens it into `firmware-dumper.bin`.

pub mod artifact;
pub mod build;
pub mod cancel;
pub mod config;
pub mod dist;
pub mod error;
pub mod event;
pub mod objcopy;

pub use artifact::ArtifactRegistry;
pub use build::{BuildDriver, BuildOutcome, CompilerInvocation};
pub use cancel::{CancelToken, SignalWatcher};
pub use config::Firmware;
pub use dist::{Pipeline, Stage};
pub use error::{PipelineError, Result};
pub use event::{BuildEvent, EventStream};
pub use objcopy::{ImageExtractor, Objcopy};

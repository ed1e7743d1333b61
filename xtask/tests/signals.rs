//! Real signals sent to this process. Kept in its own test binary since every
//! signal watcher in the process sees them.
#![cfg(unix)]

use std::{
    cell::Cell,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use dumper_xtask::{
    BuildDriver, CancelToken, CompilerInvocation, ImageExtractor, Pipeline, PipelineError, Result,
    Stage,
};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    low_level,
};
use tempfile::TempDir;

#[derive(Default)]
struct Counter {
    calls: Cell<usize>,
}

impl ImageExtractor for Counter {
    fn extract(&self, _: &Path) -> Result<PathBuf> {
        self.calls.set(self.calls.get() + 1);
        Ok(PathBuf::from("firmware-dumper.bin"))
    }
}

/// A compiler that stays silent for a while, then reports success.
fn slow_compiler(dir: &Path, marker: &Path) -> BuildDriver {
    let script = format!(
        r#"sleep 5 >/dev/null; touch '{}'; printf '%s\n' '{{"reason":"compiler-artifact","target":{{"name":"dumper"}},"executable":"/tmp/out"}}' '{{"reason":"build-finished","success":true}}'"#,
        marker.display()
    );
    BuildDriver::new(
        CompilerInvocation {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            envs: Vec::new(),
            current_dir: dir.to_path_buf(),
        },
        "dumper",
    )
}

#[test]
fn signal_stops_a_silent_compiler() {
    for signal in [SIGTERM, SIGINT] {
        let dir = TempDir::new().expect("tempdir");
        let marker = dir.path().join("marker");

        let cancel = CancelToken::new();
        let watcher = cancel.watch_signals().expect("signal handlers");
        let mut pipeline = Pipeline::new(slow_compiler(dir.path(), &marker), Counter::default());

        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            low_level::raise(signal).expect("raise");
        });
        let started = Instant::now();
        let result = pipeline.run(&cancel);
        let elapsed = started.elapsed();
        sender.join().unwrap();
        drop(watcher);

        assert!(
            matches!(result, Err(PipelineError::Cancelled)),
            "signal {signal}: {result:?}"
        );
        assert!(
            elapsed < Duration::from_secs(3),
            "signal {signal}: compiler kept running for {elapsed:?}"
        );
        assert_eq!(pipeline.stage(), Stage::Failed);
        assert_eq!(pipeline.extractor().calls.get(), 0);
        assert!(!marker.exists(), "signal {signal}: compiler finished its work");
    }
}

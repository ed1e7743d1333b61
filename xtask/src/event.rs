//! Messages cargo prints with `--message-format json-render-diagnostics`.
//!
//! Every stdout line is one JSON object tagged by `reason`. Only the two
//! reasons the pipeline acts on are decoded; the rest collapse to
//! [`BuildEvent::Other`].

use std::{io::BufRead, path::PathBuf};

use log::trace;
use serde::Deserialize;

use crate::error::{PipelineError, Result};

const COMPILER_ARTIFACT: &str = "compiler-artifact";
const BUILD_FINISHED: &str = "build-finished";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    CompilerArtifact {
        target_name: String,
        executable: Option<PathBuf>,
    },
    BuildFinished {
        success: bool,
    },
    Other {
        reason: String,
    },
}

#[derive(Deserialize)]
struct Message {
    reason: String,
    target: Option<Target>,
    executable: Option<PathBuf>,
    success: Option<bool>,
}

#[derive(Deserialize)]
struct Target {
    name: String,
}

impl BuildEvent {
    /// Decodes a single line of compiler output, without its line ending.
    /// `line_no` is only used for error reporting.
    pub fn parse(line: impl AsRef<[u8]>, line_no: usize) -> Result<Self> {
        let malformed = |reason: String| PipelineError::MalformedEvent {
            line: line_no,
            reason,
        };

        let line = std::str::from_utf8(line.as_ref()).map_err(|e| malformed(e.to_string()))?;
        let message: Message = serde_json::from_str(line).map_err(|e| malformed(e.to_string()))?;

        match message.reason.as_str() {
            COMPILER_ARTIFACT => {
                let target = message
                    .target
                    .ok_or_else(|| malformed(format!("{COMPILER_ARTIFACT} without target")))?;
                Ok(BuildEvent::CompilerArtifact {
                    target_name: target.name,
                    executable: message.executable,
                })
            }
            BUILD_FINISHED => {
                let success = message
                    .success
                    .ok_or_else(|| malformed(format!("{BUILD_FINISHED} without success flag")))?;
                Ok(BuildEvent::BuildFinished { success })
            }
            _ => {
                trace!("ignoring compiler message `{}`", message.reason);
                Ok(BuildEvent::Other {
                    reason: message.reason,
                })
            }
        }
    }
}

/// Lazy, forward-only sequence of events read from a live output stream.
pub struct EventStream<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl<R: BufRead> EventStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
        }
    }

    /// Number of lines pulled from the reader so far.
    pub fn lines_read(&self) -> usize {
        self.line_no
    }
}

impl<R: BufRead> Iterator for EventStream<R> {
    type Item = Result<BuildEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        // raw bytes so a non-UTF-8 line is reported as malformed with its line
        // number instead of as an I/O error
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(e) => return Some(Err(e.into())),
        }
        self.line_no += 1;

        let mut line = self.buf.as_slice();
        if let Some(rest) = line.strip_suffix(b"\n") {
            line = rest.strip_suffix(b"\r").unwrap_or(rest);
        }
        Some(BuildEvent::parse(line, self.line_no))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_binary_artifact() {
        let line = r#"{"reason":"compiler-artifact","package_id":"dumper 0.1.0","target":{"kind":["bin"],"name":"dumper"},"profile":{"opt_level":"3"},"filenames":["/t/dumper"],"executable":"/t/dumper","fresh":false}"#;

        assert_eq!(
            BuildEvent::parse(line, 1).unwrap(),
            BuildEvent::CompilerArtifact {
                target_name: "dumper".into(),
                executable: Some(PathBuf::from("/t/dumper")),
            }
        );
    }

    #[test]
    fn library_artifact_has_no_executable() {
        let line = r#"{"reason":"compiler-artifact","target":{"name":"obfw"},"executable":null}"#;
        assert_eq!(
            BuildEvent::parse(line, 1).unwrap(),
            BuildEvent::CompilerArtifact {
                target_name: "obfw".into(),
                executable: None,
            }
        );

        let line = r#"{"reason":"compiler-artifact","target":{"name":"obfw"}}"#;
        assert!(matches!(
            BuildEvent::parse(line, 1).unwrap(),
            BuildEvent::CompilerArtifact { executable: None, .. }
        ));
    }

    #[test]
    fn parses_build_finished() {
        let event = BuildEvent::parse(r#"{"reason":"build-finished","success":false}"#, 1).unwrap();
        assert_eq!(event, BuildEvent::BuildFinished { success: false });
    }

    #[test]
    fn unknown_reasons_are_other() {
        let event = BuildEvent::parse(
            r#"{"reason":"build-script-executed","package_id":"x","out_dir":"/o"}"#,
            1,
        )
        .unwrap();
        assert_eq!(
            event,
            BuildEvent::Other {
                reason: "build-script-executed".into()
            }
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        for line in [
            "",
            "warning: unused variable",
            r#"{"target":{"name":"dumper"}}"#,
            r#"{"reason":42}"#,
            r#"{"reason":"compiler-artifact","executable":"/t/dumper"}"#,
            r#"{"reason":"build-finished"}"#,
        ] {
            match BuildEvent::parse(line, 7) {
                Err(PipelineError::MalformedEvent { line: 7, .. }) => {}
                other => panic!("expected malformed event for {line:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn stream_numbers_lines() {
        let input = "{\"reason\":\"compiler-message\"}\nnot json\n";
        let mut stream = EventStream::new(Cursor::new(input));

        assert!(matches!(stream.next(), Some(Ok(BuildEvent::Other { .. }))));
        assert!(matches!(
            stream.next(),
            Some(Err(PipelineError::MalformedEvent { line: 2, .. }))
        ));
        assert!(stream.next().is_none());
        assert_eq!(stream.lines_read(), 2);
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let input: &[u8] = b"{\"reason\":\"compiler-message\"}\n{\"reason\":\"compiler-message\",\"x\":\"\xff\"}\n";
        let mut stream = EventStream::new(Cursor::new(input));

        assert!(matches!(stream.next(), Some(Ok(BuildEvent::Other { .. }))));
        assert!(matches!(
            stream.next(),
            Some(Err(PipelineError::MalformedEvent { line: 2, .. }))
        ));
        assert!(stream.next().is_none());
    }

    #[test]
    fn crlf_and_missing_final_newline() {
        let input = "{\"reason\":\"compiler-message\"}\r\n{\"reason\":\"build-finished\",\"success\":true}";
        let events: Vec<_> = EventStream::new(Cursor::new(input))
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(
            events,
            [
                BuildEvent::Other {
                    reason: "compiler-message".into()
                },
                BuildEvent::BuildFinished { success: true },
            ]
        );
    }
}

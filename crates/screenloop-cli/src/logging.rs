use crate::error::{CliError, Result};
use crate::ui::UiEvent;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tokio::sync::mpsc;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, MakeWriter},
    prelude::*,
};

fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::OFF
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

/// Installs the global subscriber. Console output goes through the UI
/// manager when a sender is given so log lines do not tear progress bars.
pub fn setup_logging(
    verbosity: u8,
    quiet: bool,
    log_file: Option<&Path>,
    ui_sender: Option<mpsc::Sender<UiEvent>>,
) -> Result<()> {
    let (ui_layer, stderr_layer) = match ui_sender {
        Some(sender) => (
            Some(
                fmt::layer()
                    .with_writer(UiWriter::new(sender))
                    .with_ansi(true)
                    .with_target(false)
                    .compact(),
            ),
            None,
        ),
        None => (
            None,
            Some(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .compact(),
            ),
        ),
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path).map_err(CliError::Io)?;
            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_target(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(level_filter(verbosity, quiet))
        .with(ui_layer)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to install logger: {}", e)))
}

/// Sends each formatted event to the UI manager as one line.
#[derive(Clone)]
struct UiWriter {
    sender: mpsc::Sender<UiEvent>,
}

impl UiWriter {
    fn new(sender: mpsc::Sender<UiEvent>) -> Self {
        Self { sender }
    }
}

impl<'a> MakeWriter<'a> for UiWriter {
    type Writer = UiLine;

    fn make_writer(&'a self) -> Self::Writer {
        UiLine {
            sender: self.sender.clone(),
            buffer: Vec::new(),
        }
    }
}

struct UiLine {
    sender: mpsc::Sender<UiEvent>,
    buffer: Vec<u8>,
}

impl Write for UiLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for UiLine {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.buffer)
            .trim_end_matches('\n')
            .to_string();
        // Once the UI manager is gone, or its queue is full, write directly.
        if let Err(e) = self.sender.try_send(UiEvent::Log(line)) {
            if let UiEvent::Log(line) = e.into_inner() {
                eprintln!("{line}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Once;
    use std::thread;
    use std::time::Duration;
    use tracing::{debug, error, info, trace, warn};

    static INIT: Once = Once::new();

    fn ensure_global_logger_is_set() {
        INIT.call_once(|| {
            setup_logging(3, false, None, None).expect("Failed to set up global logger for tests");
        });
    }

    #[test]
    #[serial]
    fn initialization_and_macros_work() {
        ensure_global_logger_is_set();

        error!("This is an error");
        warn!("This is a warning");
        info!("This is info");
        debug!("This is debug");
        trace!("This is trace");
    }

    #[test]
    #[serial]
    fn verbosity_maps_to_level_filters() {
        assert_eq!(level_filter(0, false), LevelFilter::WARN);
        assert_eq!(level_filter(1, false), LevelFilter::INFO);
        assert_eq!(level_filter(2, false), LevelFilter::DEBUG);
        assert_eq!(level_filter(7, false), LevelFilter::TRACE);
        assert_eq!(level_filter(2, true), LevelFilter::OFF);
    }

    #[test]
    #[serial]
    fn file_logging_records_thread_ids() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("test.log");

        let file = File::create(&log_path).unwrap();
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_ids(true);
        let subscriber = tracing_subscriber::registry().with(file_layer);

        tracing::subscriber::with_default(subscriber, || {
            debug!("Message for file-only test.");
        });

        thread::sleep(Duration::from_millis(100));

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("Message for file-only test."));
        assert!(content.contains("DEBUG"));
        assert!(content.contains("ThreadId"));
    }

    #[test]
    #[serial]
    fn ui_writer_sends_one_event_per_line() {
        let (sender, mut receiver) = mpsc::channel(8);
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_writer(UiWriter::new(sender))
                .with_ansi(false),
        );

        tracing::subscriber::with_default(subscriber, || {
            warn!("routed through the ui");
        });

        match receiver.try_recv() {
            Ok(UiEvent::Log(line)) => {
                assert!(line.contains("routed through the ui"));
                assert!(!line.ends_with('\n'));
            }
            other => panic!("Unexpected event: {other:?}"),
        }
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    #[serial]
    fn invalid_log_file_path_propagates_error() {
        let invalid_path = Path::new("/");

        if cfg!(unix) && invalid_path.is_dir() {
            let result = setup_logging(0, false, Some(invalid_path), None);
            assert!(matches!(result, Err(CliError::Io(_))));
        }
    }
}

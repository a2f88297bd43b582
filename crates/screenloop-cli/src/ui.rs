use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use screenloop::engine::progress::{Progress, ProgressCallback};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::warn;

#[derive(Debug)]
pub enum UiEvent {
    Progress(Progress),
    Log(String),
}

pub struct UiManager {
    mp: Arc<MultiProgress>,
    state: BarState,
    event_receiver: mpsc::Receiver<UiEvent>,
    shutdown_receiver: watch::Receiver<bool>,
    _sentinel_bar: ProgressBar,
}

#[derive(Default)]
struct BarState {
    active_bar: Option<ProgressBar>,
    base_message: String,
}

impl UiManager {
    pub fn new() -> (Self, mpsc::Sender<UiEvent>, watch::Sender<bool>) {
        let (event_sender, event_receiver) = mpsc::channel(1024);
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let mp = Arc::new(MultiProgress::new());
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        let _sentinel_bar = mp.add(ProgressBar::hidden());
        let manager = Self {
            mp,
            state: BarState::default(),
            event_receiver,
            shutdown_receiver,
            _sentinel_bar,
        };

        (manager, event_sender, shutdown_sender)
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(event) = self.event_receiver.recv() => {
                    self.handle_event(event);
                }
                result = self.shutdown_receiver.changed() => {
                    if result.is_err() || *self.shutdown_receiver.borrow() {
                        break;
                    }
                }
            }
        }
        while let Ok(event) = self.event_receiver.try_recv() {
            self.handle_event(event);
        }
        if let Some(bar) = self.state.active_bar.take() {
            bar.finish_and_clear();
        }
        self._sentinel_bar.finish_and_clear();
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Log(msg) => self.println(msg),
            UiEvent::Progress(progress) => self.handle_progress(progress),
        }
    }

    /// Prints above the bars, or straight to stderr when nothing is drawn.
    fn println(&self, msg: String) {
        if self.mp.is_hidden() {
            eprintln!("{msg}");
        } else {
            self.mp.println(msg).ok();
        }
    }

    fn handle_progress(&mut self, progress: Progress) {
        match progress {
            Progress::PhaseStart { name } => {
                if let Some(bar) = self.state.active_bar.take() {
                    bar.finish_and_clear();
                }

                let pb = self.mp.add(ProgressBar::new_spinner());
                pb.enable_steady_tick(Duration::from_millis(80));
                pb.set_style(Self::spinner_style());
                pb.set_message(name.to_string());

                self.state.active_bar = Some(pb);
                self.state.base_message = name.to_string();
            }
            Progress::PhaseFinish => {
                if let Some(bar) = self.state.active_bar.take() {
                    bar.finish_and_clear();
                }

                let final_message = format!("✓ {}", self.state.base_message);
                self.println(final_message);

                self.state.base_message.clear();
            }
            Progress::TaskStart { total_steps } => {
                if let Some(bar) = self.state.active_bar.as_ref() {
                    bar.disable_steady_tick();
                    bar.set_style(Self::bar_style());
                    bar.set_length(total_steps);
                    bar.set_position(0);
                }
            }
            Progress::TaskIncrement => {
                if let Some(bar) = self.state.active_bar.as_ref() {
                    bar.inc(1);
                }
            }
            Progress::TaskFinish => {
                if let Some(bar) = self.state.active_bar.as_ref() {
                    if let Some(length) = bar.length() {
                        bar.set_position(length);
                    }
                    bar.finish();
                }
            }
            Progress::Message(msg) => {
                self.println(format!("  {}", msg));
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<32} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .with_key(
                "eta",
                |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
                },
            )
            .progress_chars("━╸ ")
    }
}

/// Forwards core progress events to the [`UiManager`].
#[derive(Clone)]
pub struct CliProgressHandler {
    sender: mpsc::Sender<UiEvent>,
}

impl CliProgressHandler {
    pub fn new(sender: mpsc::Sender<UiEvent>) -> Self {
        Self { sender }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let sender = self.sender.clone();
        Box::new(move |progress: Progress| {
            if let Err(e) = sender.try_send(UiEvent::Progress(progress)) {
                warn!("Failed to send progress update to UI channel: {}", e);
            }
        })
    }
}

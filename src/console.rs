//! Console surface
//!
//! Binds stdin lines and Ctrl-C to controller events and prints each outcome.

use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::ActivationConfig;
use crate::controller::{ControlEvent, RecordingController};
use crate::pipeline::{GREETING_MESSAGE, InteractionPipeline, TurnOutcome};
use crate::voice::AudioCapturePort;

/// Which input lines mean what
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleBindings {
    activate: String,
    cancel: String,
}

impl ConsoleBindings {
    #[must_use]
    pub fn new(activate: impl Into<String>, cancel: impl Into<String>) -> Self {
        Self {
            activate: activate.into(),
            cancel: cancel.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &ActivationConfig) -> Self {
        Self::new(config.key.clone(), config.cancel_key.clone())
    }

    /// Map one input line to an event
    ///
    /// Surrounding whitespace is ignored. Lines matching neither binding map to
    /// `None`.
    #[must_use]
    pub fn event_for(&self, line: &str) -> Option<ControlEvent> {
        let line = line.trim();
        if line.eq_ignore_ascii_case(self.cancel.trim()) {
            Some(ControlEvent::Cancel)
        } else if line.eq_ignore_ascii_case(self.activate.trim()) {
            Some(ControlEvent::Activate)
        } else {
            None
        }
    }

    fn activate_label(&self) -> String {
        if self.activate.trim().is_empty() {
            "Enter".to_string()
        } else {
            format!("'{}' + Enter", self.activate.trim())
        }
    }
}

/// Console lines for one outcome
#[must_use]
pub fn render_outcome(outcome: &TurnOutcome) -> Vec<String> {
    let mut lines = Vec::with_capacity(2);
    if let Some(transcript) = outcome.transcript() {
        lines.push(format!("Tú: {transcript}"));
    }
    lines.push(format!("Dependiente: {}", outcome.text()));
    if let TurnOutcome::Failed { detail, .. } = outcome {
        lines.push(format!("(error: {detail})"));
    }
    lines
}

/// Run the push-to-talk console until cancelled
///
/// Stdin is read on a plain thread so a pending read never holds up shutdown.
/// End of input counts as a cancel.
pub async fn run_console(
    pipeline: Arc<InteractionPipeline>,
    capture: Box<dyn AudioCapturePort>,
    bindings: ConsoleBindings,
) {
    println!("Dependiente: {GREETING_MESSAGE}");
    let _ = pipeline.greet().await;
    println!(
        "\nPulsa {} para empezar y terminar de hablar; '{}' para salir.\n",
        bindings.activate_label(),
        bindings.cancel
    );

    let (event_tx, event_rx) = mpsc::channel(8);
    let (outcome_tx, mut outcome_rx) = mpsc::channel(8);

    let controller = RecordingController::new(capture, pipeline);
    let controller_task = tokio::spawn(controller.run(event_rx, outcome_tx));

    let stdin_tx = event_tx.clone();
    std::thread::spawn(move || read_stdin(&bindings, &stdin_tx));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received");
            let _ = event_tx.send(ControlEvent::Cancel).await;
        }
    });

    // Ends once the controller stops and drops its sender
    while let Some(outcome) = outcome_rx.recv().await {
        for line in render_outcome(&outcome) {
            println!("{line}");
        }
        println!();
    }

    if let Err(e) = controller_task.await {
        tracing::error!(error = %e, "controller task failed");
    }
    println!("¡Hasta luego!");
}

fn read_stdin(bindings: &ConsoleBindings, events: &mpsc::Sender<ControlEvent>) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let Some(event) = bindings.event_for(&line) else {
            tracing::debug!(line = %line, "unbound input");
            continue;
        };
        if events.blocking_send(event).is_err() || event == ControlEvent::Cancel {
            return;
        }
    }
    let _ = events.blocking_send(ControlEvent::Cancel);
}

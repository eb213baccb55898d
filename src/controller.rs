//! Recording controller
//!
//! Push-to-talk state machine. The first activation opens the capture device,
//! the second closes it and hands the recording to the pipeline on a spawned
//! task. While that task runs further activations are ignored, so at most one
//! turn is ever in flight.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::pipeline::{InteractionPipeline, RecordingSession, TurnOutcome};
use crate::voice::{AudioCapturePort, CaptureError};

/// Where the controller is in the turn cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Recording,
    Processing,
    /// Cancelled; every further event is ignored
    Stopped,
}

/// Input to [`RecordingController::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Activate,
    Cancel,
}

/// What an activation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Recording began
    Started,
    /// Recording ended and a turn was spawned
    Submitted,
    /// A turn is in flight or the controller is stopped
    Ignored,
}

/// Owns the capture device and the current recording
pub struct RecordingController {
    capture: Box<dyn AudioCapturePort>,
    pipeline: Arc<InteractionPipeline>,
    state: PipelineState,
    started_at: Option<DateTime<Utc>>,
    turn: Option<AbortHandle>,
    done_tx: mpsc::Sender<TurnOutcome>,
    done_rx: mpsc::Receiver<TurnOutcome>,
}

impl RecordingController {
    #[must_use]
    pub fn new(capture: Box<dyn AudioCapturePort>, pipeline: Arc<InteractionPipeline>) -> Self {
        let (done_tx, done_rx) = mpsc::channel(1);
        Self {
            capture,
            pipeline,
            state: PipelineState::Idle,
            started_at: None,
            turn: None,
            done_tx,
            done_rx,
        }
    }

    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Handle one push-to-talk activation
    ///
    /// # Errors
    ///
    /// Returns the capture error if the device fails to start or stop. A
    /// failed start leaves the controller `Idle`; a failed stop returns it
    /// to `Idle`.
    pub async fn on_activate(&mut self) -> Result<Activation, CaptureError> {
        match self.state {
            PipelineState::Idle => {
                self.capture.start().await?;
                self.started_at = Some(Utc::now());
                self.state = PipelineState::Recording;
                tracing::info!("recording started");
                Ok(Activation::Started)
            }
            PipelineState::Recording => {
                let started_at = self.started_at.take().unwrap_or_else(Utc::now);
                let audio = match self.capture.stop().await {
                    Ok(audio) => audio,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to stop recording");
                        self.state = PipelineState::Idle;
                        return Err(e);
                    }
                };

                let session = RecordingSession::new(started_at, audio, self.capture.sample_rate());
                tracing::info!(session_id = %session.id, bytes = session.raw_audio.len(), "recording stopped");
                self.spawn_turn(session);
                self.state = PipelineState::Processing;
                Ok(Activation::Submitted)
            }
            PipelineState::Processing => {
                tracing::debug!("activation ignored while processing");
                Ok(Activation::Ignored)
            }
            PipelineState::Stopped => Ok(Activation::Ignored),
        }
    }

    /// Abort any in-flight turn, release the device and stop for good
    pub fn on_cancel(&mut self) {
        if let Some(turn) = self.turn.take() {
            turn.abort();
            tracing::info!("in-flight turn aborted");
        }
        self.capture.release();
        self.started_at = None;
        self.state = PipelineState::Stopped;
        tracing::info!("controller stopped");
    }

    /// Wait for the in-flight turn to finish
    ///
    /// Returns `None` immediately if no turn is running.
    pub async fn next_outcome(&mut self) -> Option<TurnOutcome> {
        if self.state != PipelineState::Processing {
            return None;
        }
        let outcome = self.done_rx.recv().await?;
        Some(self.complete(outcome))
    }

    /// Drive the controller from an event channel until cancelled
    ///
    /// Closing `events` counts as a cancel, as does a closed `outcomes`.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ControlEvent>,
        outcomes: mpsc::Sender<TurnOutcome>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ControlEvent::Activate) => {
                        if let Err(e) = self.on_activate().await {
                            tracing::warn!(error = %e, "activation failed");
                        }
                    }
                    Some(ControlEvent::Cancel) | None => {
                        self.on_cancel();
                        break;
                    }
                },
                Some(outcome) = self.done_rx.recv() => {
                    let outcome = self.complete(outcome);
                    if outcomes.send(outcome).await.is_err() {
                        self.on_cancel();
                        break;
                    }
                }
            }
        }
    }

    fn spawn_turn(&mut self, session: RecordingSession) {
        let pipeline = Arc::clone(&self.pipeline);
        let task = tokio::spawn(async move { pipeline.run_turn(session).await });
        self.turn = Some(task.abort_handle());

        // Watcher turns a panicked task into an outcome so the state machine
        // always gets back to Idle
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => return,
                Err(e) => {
                    tracing::error!(error = %e, "turn task failed");
                    TurnOutcome::technical(e.to_string())
                }
            };
            let _ = done_tx.send(outcome).await;
        });
    }

    fn complete(&mut self, outcome: TurnOutcome) -> TurnOutcome {
        self.turn = None;
        if self.state == PipelineState::Processing {
            self.state = PipelineState::Idle;
        }
        tracing::debug!(kind = outcome.kind(), "turn complete");
        outcome
    }
}

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver};

use crate::error::{PipelineError, UpdateLoopError, VisualizerError};
use crate::fft::SpectrumReader;
use crate::vis::{Visualizer, VisualizerEvent};

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateLoopConfig {
    /// How many window durations to wait for a spectrum before giving up.
    pub deadline_multiplier: u32,
    /// Extra allowance for the first window while the output device starts.
    pub startup_grace: Duration,
}

impl Default for UpdateLoopConfig {
    fn default() -> Self {
        Self {
            deadline_multiplier: 6,
            startup_grace: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The visualizer quit (or the session timed out) before the stream ended.
    VisualizerFinished,
    /// Every spectrum was delivered and the visualizer has since finished.
    EndOfStream,
}

/// Moves spectra from the analysis pipeline to a visualizer until one side
/// is done.
pub struct UpdateLoop {
    reader: SpectrumReader,
    visualizer: Arc<dyn Visualizer>,
    config: UpdateLoopConfig,
}

impl UpdateLoop {
    pub fn new(
        reader: SpectrumReader,
        visualizer: Arc<dyn Visualizer>,
        config: UpdateLoopConfig,
    ) -> Self {
        Self {
            reader,
            visualizer,
            config,
        }
    }

    pub fn reader(&self) -> &SpectrumReader {
        &self.reader
    }

    /// Runs until the stream ends or the visualizer finishes. The visualizer
    /// is released from its wait when `session_cancel` fires; that timeout
    /// counts as a normal finish, any other visualizer failure is an error.
    pub fn run(&self, session_cancel: Receiver<Instant>) -> Result<LoopExit, UpdateLoopError> {
        let (finished, waiter) = self.watch_visualizer(session_cancel)?;
        let window_deadline = self.reader.window_duration() * self.config.deadline_multiplier;
        let mut grace = self.config.startup_grace;
        let mut delivered: u64 = 0;

        loop {
            let deadline = Instant::now() + window_deadline + grace;
            grace = Duration::ZERO;

            match self.reader.next_window(deadline, &finished) {
                Ok(Some(spectrum)) => {
                    if spectrum.is_padded() {
                        log::debug!("Final window padded from {} frames", spectrum.frames);
                    }
                    self.visualizer.send(VisualizerEvent::Spectrum(spectrum));
                    delivered += 1;
                }
                Ok(None) => {
                    log::debug!(
                        "Stream finished: {} updates delivered, {} windows skipped",
                        delivered,
                        self.reader.dropped_windows()
                    );
                    self.visualizer.send(VisualizerEvent::EndOfStream);
                    join_waiter(waiter)?;
                    return Ok(LoopExit::EndOfStream);
                }
                Err(PipelineError::Cancelled) => {
                    log::debug!("Visualizer finished after {} updates", delivered);
                    join_waiter(waiter)?;
                    return Ok(LoopExit::VisualizerFinished);
                }
                Err(e) => {
                    log::debug!("Update loop failed after {} updates: {}", delivered, e);
                    return Err(e.into());
                }
            }
        }
    }

    /// Waits for the visualizer on a side thread. The returned channel
    /// disconnects once it has finished; the handle yields its result.
    fn watch_visualizer(&self, session_cancel: Receiver<Instant>) -> Result<(Receiver<()>, Waiter), UpdateLoopError> {
        let (tx, rx) = bounded::<()>(0);
        let visualizer = Arc::clone(&self.visualizer);
        let handle = thread::Builder::new()
            .name("vis-waiter".to_string())
            .spawn(move || {
                let result = visualizer.wait_until_finished(&session_cancel);
                drop(tx);
                result
            })?;
        Ok((rx, handle))
    }
}

type Waiter = JoinHandle<Result<(), VisualizerError>>;

fn join_waiter(waiter: Waiter) -> Result<(), UpdateLoopError> {
    match waiter.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(VisualizerError::Timeout)) => {
            log::debug!("Session timed out before the visualizer closed");
            Ok(())
        }
        Ok(Err(e)) => Err(UpdateLoopError::Visualizer(e)),
        Err(_) => Err(UpdateLoopError::Visualizer(VisualizerError::Disconnected)),
    }
}

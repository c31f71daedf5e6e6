use std::io::{self, Stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender, TrySendError};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::{cursor, execute, queue, terminal};

use super::bars::aggregate_bars;
use super::fps::FpsCounter;
use super::{BarRenderer, Cell, Visualizer, VisualizerEvent};
use crate::error::VisualizerError;
use crate::fft::Spectrum;

#[derive(Debug, Clone)]
pub struct TerminalOptions {
    pub show_fps: bool,
    /// Quit on our own after the end-of-stream frame instead of waiting
    /// for a key press.
    pub exit_on_end: bool,
    /// How long the render thread sleeps waiting for an update before it
    /// checks the keyboard again.
    pub input_poll: Duration,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            show_fps: false,
            exit_on_end: true,
            input_poll: Duration::from_millis(10),
        }
    }
}

type Outcome = Arc<Mutex<Option<Result<(), VisualizerError>>>>;

/// Full-screen bar display running on its own thread.
pub struct TerminalVisualizer {
    events: Sender<VisualizerEvent>,
    /// Disconnects when the render thread exits; never carries a message.
    done: Receiver<()>,
    outcome: Outcome,
    stop: Arc<AtomicBool>,
}

impl TerminalVisualizer {
    pub fn spawn(
        renderer: Box<dyn BarRenderer>,
        options: TerminalOptions,
    ) -> Result<Self, VisualizerError> {
        let (events_tx, events_rx) = bounded(4);
        let (done_tx, done_rx) = bounded::<()>(0);
        let outcome: Outcome = Arc::default();
        let slot = Arc::clone(&outcome);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        thread::Builder::new()
            .name("terminal-ui".to_string())
            .spawn(move || {
                let result = run(renderer, options, events_rx, &stop_flag);
                if let Err(ref e) = result {
                    log::error!("Terminal visualizer failed: {}", e);
                }
                if let Ok(mut slot) = slot.lock() {
                    *slot = Some(result);
                }
                drop(done_tx);
            })?;

        Ok(Self {
            events: events_tx,
            done: done_rx,
            outcome,
            stop,
        })
    }

    /// Asks the render thread to restore the terminal and exit.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// The render thread's result. An error is handed out once; later
    /// callers see `Ok`. Nothing recorded means the thread died mid-frame.
    fn take_outcome(&self) -> Result<(), VisualizerError> {
        let Ok(mut slot) = self.outcome.lock() else {
            return Err(VisualizerError::Disconnected);
        };
        match slot.take() {
            Some(result) => {
                *slot = Some(Ok(()));
                result
            }
            None => Err(VisualizerError::Disconnected),
        }
    }
}

impl Visualizer for TerminalVisualizer {
    fn send(&self, event: VisualizerEvent) {
        match event {
            VisualizerEvent::Spectrum(_) => match self.events.try_send(event) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(_)) => log::debug!("Renderer behind, frame skipped"),
            },
            VisualizerEvent::EndOfStream => {
                let _ = self.events.send(event);
            }
        }
    }

    fn wait_until_finished(&self, cancel: &Receiver<Instant>) -> Result<(), VisualizerError> {
        select! {
            recv(self.done) -> _ => self.take_outcome(),
            recv(cancel) -> _ => Err(VisualizerError::Timeout),
        }
    }
}

/// Puts the terminal back the way we found it, even on error paths.
struct TerminalGuard;

impl TerminalGuard {
    fn enter(out: &mut Stdout) -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(
            out,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            terminal::Clear(terminal::ClearType::All)
        )?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut out = io::stdout();
        let _ = execute!(out, ResetColor, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

fn run(
    renderer: Box<dyn BarRenderer>,
    options: TerminalOptions,
    events: Receiver<VisualizerEvent>,
    stop: &AtomicBool,
) -> Result<(), VisualizerError> {
    let mut out = io::stdout();
    let _guard = TerminalGuard::enter(&mut out)?;
    let mut fps = FpsCounter::new(Instant::now());
    let mut bars = vec![0.0; renderer.num_bars()];

    draw(&mut out, &renderer.render(&bars), None)?;

    loop {
        if stop.load(Ordering::Relaxed) {
            return Ok(());
        }
        if quit_requested()? {
            log::debug!("Quit requested");
            return Ok(());
        }

        let first = match events.recv_timeout(options.input_poll) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        };
        let (latest, ended) = coalesce(std::iter::once(first).chain(events.try_iter()));

        if let Some(spectrum) = latest {
            bars = aggregate_bars(&spectrum.bins, renderer.num_bars());
            let now = Instant::now();
            fps.tick(now);
            let overlay = options.show_fps.then(|| fps.overlay_lines(now));
            draw(&mut out, &renderer.render(&bars), overlay.as_ref())?;
        }
        if ended {
            log::debug!("End of stream after {} frames", fps.frame_count());
            if options.exit_on_end {
                return Ok(());
            }
            bars.iter_mut().for_each(|b| *b = 0.0);
            draw(&mut out, &renderer.render(&bars), None)?;
        }
    }
}

/// Reduces a burst of queued events to the newest spectrum and whether the
/// stream ended. Nothing after `EndOfStream` is consumed.
fn coalesce(events: impl IntoIterator<Item = VisualizerEvent>) -> (Option<Spectrum>, bool) {
    let mut latest = None;
    for event in events {
        match event {
            VisualizerEvent::Spectrum(spectrum) => latest = Some(spectrum),
            VisualizerEvent::EndOfStream => return (latest, true),
        }
    }
    (latest, false)
}

fn quit_requested() -> io::Result<bool> {
    while event::poll(Duration::ZERO)? {
        if let Event::Key(key) = event::read()? {
            if is_quit_key(&key) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn is_quit_key(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

fn draw(out: &mut Stdout, rows: &[Vec<Cell>], overlay: Option<&[String; 3]>) -> io::Result<()> {
    let (cols, height) = terminal::size()?;
    queue!(out, cursor::MoveTo(0, 0))?;

    let mut color = Color::Reset;
    queue!(out, SetForegroundColor(color))?;
    for row in rows.iter().take(height as usize) {
        for cell in row.iter().take(cols as usize) {
            if cell.color != color {
                color = cell.color;
                queue!(out, SetForegroundColor(color))?;
            }
            queue!(out, Print(cell.ch))?;
        }
        queue!(
            out,
            terminal::Clear(terminal::ClearType::UntilNewLine),
            cursor::MoveToNextLine(1)
        )?;
    }

    queue!(out, ResetColor)?;
    if let Some(lines) = overlay {
        for line in lines {
            queue!(
                out,
                Print(line),
                terminal::Clear(terminal::ClearType::UntilNewLine),
                cursor::MoveToNextLine(1)
            )?;
        }
    }
    queue!(out, terminal::Clear(terminal::ClearType::FromCursorDown))?;
    out.flush()
}

//! Display sinks for the composed panel.

use crate::config::{Config, DisplayMode};
use image::{ImageFormat, RgbImage};
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

const WINDOW_TITLE: &str = "depthseg: fused | depth cutout | depth";
/// Minimum gap between window event pumps while no new panel arrives.
const EVENT_PUMP_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("failed to publish {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("preview window: {0}")]
    Window(#[from] minifb::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    /// The user asked to stop.
    Quit,
}

pub trait DisplaySink {
    /// Show the panel of FrameSet `version`. Versions passed in only grow;
    /// a sink never shows an older version after a newer one.
    fn present(&mut self, panel: &RgbImage, version: u64) -> Result<(), SinkError>;

    /// Pending user input, if any. Never blocks.
    fn poll_event(&mut self) -> Option<SinkEvent>;

    /// Called once per loop iteration; sinks that hold panels back publish
    /// them here once they are due.
    fn refresh(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Publish whatever is still held back. Called before the loop exits.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Whether a window system is reachable from this process.
pub fn display_available() -> bool {
    if cfg!(target_os = "linux") {
        ["DISPLAY", "WAYLAND_DISPLAY"]
            .iter()
            .any(|var| std::env::var_os(var).is_some_and(|v| !v.is_empty()))
    } else {
        true
    }
}

/// Pick and open the sink for `config`. `Auto` prefers a window when a
/// display is reachable and falls back to the file sink.
pub fn open_sink(
    config: &Config,
    panel_size: (u32, u32),
    has_display: bool,
) -> Result<Box<dyn DisplaySink>, SinkError> {
    match config.display {
        DisplayMode::Window => Ok(Box::new(WindowSink::open(panel_size)?)),
        DisplayMode::File => Ok(headless(config)),
        DisplayMode::Off => Ok(Box::new(NullSink::default())),
        DisplayMode::Auto if has_display => match WindowSink::open(panel_size) {
            Ok(window) => Ok(Box::new(window)),
            Err(e) => {
                tracing::warn!(error = %e, "preview window unavailable, falling back");
                Ok(headless(config))
            }
        },
        DisplayMode::Auto => Ok(headless(config)),
    }
}

fn headless(config: &Config) -> Box<dyn DisplaySink> {
    match &config.output_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "writing preview; type q + Enter to quit");
            Box::new(FileSink::new(path, config.write_interval).watch_stdin())
        }
        None => Box::new(NullSink::default()),
    }
}

/// Live preview window. `q` or Escape, or closing the window, quits.
pub struct WindowSink {
    window: Window,
    buffer: Vec<u32>,
    size: (usize, usize),
    last_version: u64,
    last_pump: Instant,
}

impl WindowSink {
    pub fn open((width, height): (u32, u32)) -> Result<Self, SinkError> {
        let size = (width as usize, height as usize);
        let mut window = Window::new(WINDOW_TITLE, size.0, size.1, WindowOptions::default())?;
        window.limit_update_rate(None);
        tracing::info!(width, height, "preview window open; press q to quit");
        Ok(Self {
            window,
            buffer: vec![0; size.0 * size.1],
            size,
            last_version: 0,
            last_pump: Instant::now(),
        })
    }
}

impl DisplaySink for WindowSink {
    fn present(&mut self, panel: &RgbImage, version: u64) -> Result<(), SinkError> {
        if version <= self.last_version {
            return Ok(());
        }
        rgb_to_argb(panel, &mut self.buffer);
        self.size = (panel.width() as usize, panel.height() as usize);
        self.window
            .update_with_buffer(&self.buffer, self.size.0, self.size.1)?;
        self.last_version = version;
        self.last_pump = Instant::now();
        Ok(())
    }

    fn poll_event(&mut self) -> Option<SinkEvent> {
        if self.last_pump.elapsed() >= EVENT_PUMP_INTERVAL {
            self.window.update();
            self.last_pump = Instant::now();
        }
        let quit = !self.window.is_open()
            || self
                .window
                .get_keys_pressed(KeyRepeat::No)
                .into_iter()
                .any(|key| matches!(key, Key::Q | Key::Escape));
        quit.then_some(SinkEvent::Quit)
    }
}

/// Pack RGB pixels as `0x00RRGGBB`, resizing `out` to fit.
fn rgb_to_argb(panel: &RgbImage, out: &mut Vec<u32>) {
    out.clear();
    out.extend(panel.pixels().map(|p| {
        let [r, g, b] = p.0;
        (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
    }));
}

/// Overwrites a single PNG with the latest panel, at most once per interval.
///
/// Panels arriving inside the interval replace the held-back one, which is
/// written by [`refresh`](DisplaySink::refresh) once the interval expires
/// or by [`flush`](DisplaySink::flush). Typing `q` followed by Enter on
/// stdin requests a quit once [`watch_stdin`](Self::watch_stdin) is enabled.
pub struct FileSink {
    path: PathBuf,
    interval: Duration,
    last_write: Option<Instant>,
    /// Newest version accepted, written or held.
    last_version: u64,
    held: Option<(RgbImage, u64)>,
    quit: Arc<AtomicBool>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_write: None,
            last_version: 0,
            held: None,
            quit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Read stdin on a background thread and flag a quit on a `q` line.
    pub fn watch_stdin(self) -> Self {
        let quit = Arc::clone(&self.quit);
        let spawned = std::thread::Builder::new()
            .name("depthseg-keys".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if line.trim().eq_ignore_ascii_case("q") {
                        quit.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "keyboard watcher unavailable; use Ctrl-C to stop");
        }
        self
    }

    fn due(&self) -> bool {
        self.last_write.map_or(true, |at| at.elapsed() >= self.interval)
    }

    fn write(&mut self, panel: &RgbImage, version: u64) -> Result<(), SinkError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        panel
            .save_with_format(&tmp, ImageFormat::Png)
            .map_err(|source| SinkError::Encode {
                path: tmp.clone(),
                source,
            })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.last_write = Some(Instant::now());
        tracing::debug!(path = %self.path.display(), version, "panel written");
        Ok(())
    }

    fn write_held(&mut self) -> Result<(), SinkError> {
        if let Some((panel, version)) = self.held.take() {
            self.write(&panel, version)?;
        }
        Ok(())
    }
}

impl DisplaySink for FileSink {
    fn present(&mut self, panel: &RgbImage, version: u64) -> Result<(), SinkError> {
        if version <= self.last_version {
            return Ok(());
        }
        self.last_version = version;
        if self.due() {
            self.held = None;
            self.write(panel, version)
        } else {
            self.held = Some((panel.clone(), version));
            Ok(())
        }
    }

    fn poll_event(&mut self) -> Option<SinkEvent> {
        self.quit.load(Ordering::SeqCst).then_some(SinkEvent::Quit)
    }

    fn refresh(&mut self) -> Result<(), SinkError> {
        if self.held.is_some() && self.due() {
            self.write_held()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.write_held()
    }
}

/// Discards panels; keeps a count for diagnostics.
#[derive(Default)]
pub struct NullSink {
    pub presented: u64,
    pub last_version: u64,
}

impl DisplaySink for NullSink {
    fn present(&mut self, _panel: &RgbImage, version: u64) -> Result<(), SinkError> {
        if version > self.last_version {
            self.presented += 1;
            self.last_version = version;
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<SinkEvent> {
        None
    }
}

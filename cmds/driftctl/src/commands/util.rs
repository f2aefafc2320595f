//! Utilities for command handlers.

use std::io::{self, ErrorKind, IsTerminal, Write};

use clap::ValueEnum;
use manifest_drift::ScanProgress;

/// A writer wrapper that silently handles broken pipe errors.
///
/// When the underlying writer returns a broken pipe error (EPIPE), this wrapper
/// converts it to a successful write. This allows commands to exit cleanly when
/// output is piped to a process that closes early (e.g., `driftctl scan | head -1`).
pub struct BrokenPipeGuard<W> {
	inner: W,
}

impl<W> BrokenPipeGuard<W> {
	pub fn new(inner: W) -> Self {
		Self { inner }
	}
}

impl<W: Write> Write for BrokenPipeGuard<W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self.inner.write(buf) {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(buf.len()),
			other => other,
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self.inner.flush() {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
			other => other,
		}
	}
}

/// Controls ANSI color in table output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
	/// Color when stdout is a terminal
	#[default]
	Auto,
	Always,
	Never,
}

impl ColorMode {
	pub fn should_colorize(self) -> bool {
		match self {
			ColorMode::Auto => io::stdout().is_terminal(),
			ColorMode::Always => true,
			ColorMode::Never => false,
		}
	}
}

/// Single status line on stderr, rewritten in place for every manifest.
///
/// Does nothing unless stderr is a terminal.
pub struct ProgressLine {
	enabled: bool,
	drawn: bool,
}

impl ProgressLine {
	pub fn stderr() -> Self {
		Self {
			enabled: io::stderr().is_terminal(),
			drawn: false,
		}
	}

	pub fn update(&mut self, progress: ScanProgress<'_>) {
		if !self.enabled {
			return;
		}
		let mut err = io::stderr().lock();
		// progress output is best effort
		let _ = write!(
			err,
			"\r\x1b[Kchecking {}/{}: {}",
			progress.index + 1,
			progress.total,
			progress.record
		);
		let _ = err.flush();
		self.drawn = true;
	}

	pub fn clear(&mut self) {
		if self.drawn {
			let mut err = io::stderr().lock();
			let _ = write!(err, "\r\x1b[K");
			let _ = err.flush();
			self.drawn = false;
		}
	}
}

impl Drop for ProgressLine {
	fn drop(&mut self) {
		self.clear();
	}
}

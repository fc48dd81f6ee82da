use std::io::Write;

use owo_colors::OwoColorize;
use tocgen_core::{Phase, RoundReport, TextWindow, WindowStrategy};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print how a document was split before any request is made.
pub fn print_window_summary(
    w: &mut dyn Write,
    name: &str,
    strategy: &WindowStrategy,
    windows: &[TextWindow],
    color: ColorMode,
) -> std::io::Result<()> {
    let total_chars: usize = windows.iter().map(TextWindow::char_len).sum();
    if color.enabled() {
        writeln!(
            w,
            "{} {} ({} windows, {} chars, {})",
            "Loaded".bold().cyan(),
            name.bold(),
            windows.len(),
            total_chars,
            strategy.to_string().dimmed()
        )
    } else {
        writeln!(
            w,
            "Loaded {} ({} windows, {} chars, {})",
            name,
            windows.len(),
            total_chars,
            strategy
        )
    }
}

/// One line per window, for `tocgen windows`.
pub fn print_window_list(
    w: &mut dyn Write,
    windows: &[TextWindow],
    show_text: bool,
    color: ColorMode,
) -> std::io::Result<()> {
    for (i, window) in windows.iter().enumerate() {
        let header = format!("[{}/{}] {}", i + 1, windows.len(), window.label());
        if color.enabled() {
            writeln!(w, "{} {}", header.bold(), format!("{} chars", window.char_len()).dimmed())?;
        } else {
            writeln!(w, "{} {} chars", header, window.char_len())?;
        }
        if show_text {
            writeln!(w, "{}", window.text)?;
        }
    }
    Ok(())
}

/// Print the outcome of one round.
pub fn print_round(w: &mut dyn Write, report: &RoundReport, color: ColorMode) -> std::io::Result<()> {
    let status = match report.phase {
        Phase::Complete(reason) => format!("({reason})"),
        _ => format!("({} window(s) remaining)", report.remaining),
    };
    if color.enabled() {
        writeln!(
            w,
            "{} {} {}",
            format!("Round {}:", report.round).bold().green(),
            report.message(),
            status.dimmed()
        )?;
    } else {
        writeln!(w, "Round {}: {} {}", report.round, report.message(), status)?;
    }
    if let Some(warning) = &report.warning {
        if color.enabled() {
            writeln!(w, "{}", warning.yellow())?;
        } else {
            writeln!(w, "{warning}")?;
        }
    }
    Ok(())
}

pub fn print_error(w: &mut dyn Write, message: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}", "error:".bold().red(), message)
    } else {
        writeln!(w, "error: {message}")
    }
}

// src/agent/progress.rs
// Renders the progress-bar comment body posted between agent steps.

/// Width of the bar in cells.
const BAR_WIDTH: usize = 20;

/// Percent is clamped to 95 so the bar never claims completion before the
/// final result is in; the host posts the 100% state itself.
pub fn create_progress_bar(percent: u32, msg: &str) -> String {
    let percent = percent.min(95) as usize;
    let filled = percent * BAR_WIDTH / 100;
    let bar: String = "█".repeat(filled) + &"░".repeat(BAR_WIDTH - filled);
    if msg.is_empty() {
        format!("{bar} {percent}%")
    } else {
        format!("{bar} {percent}%\n\n{msg}")
    }
}

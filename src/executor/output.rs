//! Trimming of captured process output for error messages.

const MAX_LINE_CHARS: usize = 200;
const MAX_TOTAL_CHARS: usize = 1000;

/// First `max_lines` lines of `output`, each cut to a bounded width.
pub fn summarize_output(output: &str, max_lines: usize) -> String {
    let mut summary = String::new();
    let mut lines = output.trim().lines();

    for line in lines.by_ref().take(max_lines) {
        let line = match line.char_indices().nth(MAX_LINE_CHARS) {
            Some((cut, _)) => format!("{}...", &line[..cut]),
            None => line.to_string(),
        };
        if summary.len() + line.len() > MAX_TOTAL_CHARS {
            summary.push_str("...[truncated]");
            return summary;
        }
        if !summary.is_empty() {
            summary.push('\n');
        }
        summary.push_str(&line);
    }

    if lines.next().is_some() {
        summary.push_str("\n...[truncated]");
    }
    summary
}

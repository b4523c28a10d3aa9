use colored::{ColoredString, Colorize};
use converge::{ActionKind, ActionState, PassSummary};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Plan symbol for an action kind: `+` create, `^` image, `~` scale, `-` delete
pub fn action_symbol(kind: &ActionKind) -> ColoredString {
    match kind {
        ActionKind::Create => "+".green(),
        ActionKind::UpdateImage { .. } => "^".cyan(),
        ActionKind::Scale { .. } => "~".yellow(),
        ActionKind::Delete => "-".red(),
    }
}

/// Result symbol for an action state
pub fn state_symbol(state: ActionState) -> ColoredString {
    match state {
        ActionState::Succeeded => "✓".green(),
        ActionState::Failed => "✗".red(),
        ActionState::Pending => "○".dimmed(),
        ActionState::InProgress => "…".yellow(),
    }
}

/// One-line summary such as "3 succeeded, 1 failed, 2 not started"
pub fn summary_line(summary: &PassSummary) -> String {
    let mut parts = vec![format!("{} succeeded", summary.succeeded)];
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    if summary.not_started > 0 {
        parts.push(format!("{} not started", summary.not_started));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line() {
        let summary = PassSummary {
            succeeded: 3,
            failed: 0,
            not_started: 0,
        };
        assert_eq!(summary_line(&summary), "3 succeeded");

        let summary = PassSummary {
            succeeded: 1,
            failed: 2,
            not_started: 4,
        };
        assert_eq!(
            summary_line(&summary),
            "1 succeeded, 2 failed, 4 not started"
        );
    }

    #[test]
    fn test_action_symbols() {
        colored::control::set_override(false);
        assert_eq!(action_symbol(&ActionKind::Create).to_string(), "+");
        assert_eq!(action_symbol(&ActionKind::Delete).to_string(), "-");
        assert_eq!(
            action_symbol(&ActionKind::UpdateImage {
                image: "a:2".into()
            })
            .to_string(),
            "^"
        );
    }
}

//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_rows<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        print_warning(empty_message);
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color a status or outcome word
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "success" | "healthy" | "ready" | "feasible" => status.green().to_string(),
        "degraded" | "unschedulable" => status.yellow().to_string(),
        "unhealthy" | "error" | "not ready" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a node score: high scores mean more headroom
pub fn color_score(score: Option<i64>) -> String {
    match score {
        Some(s) if s >= 70 => s.to_string().green().to_string(),
        Some(s) if s >= 40 => s.to_string().yellow().to_string(),
        Some(s) => s.to_string().red().to_string(),
        None => "-".dimmed().to_string(),
    }
}

/// Age of a timestamp relative to `now`, e.g. `42s`, `5m`, `3h`
pub fn format_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - timestamp).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_age() {
        let now = Utc::now();
        assert_eq!(format_age(now - Duration::seconds(42), now), "42s");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5m");
        assert_eq!(format_age(now - Duration::hours(3), now), "3h");
        assert_eq!(format_age(now - Duration::days(2), now), "2d");
        // Clock skew never yields a negative age
        assert_eq!(format_age(now + Duration::seconds(5), now), "0s");
    }

    #[test]
    fn test_color_score_placeholder() {
        colored::control::set_override(false);
        assert_eq!(color_score(None), "-");
        assert_eq!(color_score(Some(88)), "88");
    }
}

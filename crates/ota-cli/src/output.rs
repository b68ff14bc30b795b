//! Output formatting for ota-cli (text, json)

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Progress lines and a final status (default)
    #[default]
    Text,
    /// One JSON object describing the outcome
    Json,
}

impl OutputFormat {
    /// Parse a format name from the config file
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

impl From<OutputFormat> for &str {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        }
    }
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Whether progress and human-readable lines go to stdout
    pub fn is_chatty(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }

    /// Print a success message (text mode, unless quiet)
    pub fn success(&self, msg: &str) {
        if self.is_chatty() {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (text mode, unless quiet)
    pub fn info(&self, msg: &str) {
        if self.is_chatty() {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print a value as pretty JSON on stdout
    pub fn print_json<T: Serialize>(&self, data: &T) {
        println!(
            "{}",
            serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_name() {
        assert_eq!(OutputFormat::from_name("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_name("TEXT"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::from_name("table"), None);
    }

    #[test]
    fn test_chatty() {
        assert!(OutputContext::new(OutputFormat::Text, true, false).is_chatty());
        assert!(!OutputContext::new(OutputFormat::Text, true, true).is_chatty());
        assert!(!OutputContext::new(OutputFormat::Json, true, false).is_chatty());
    }
}

use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Table => match value.as_object() {
            Some(map) => {
                let rows = map.iter().map(|(k, v)| (k.clone(), display_value(v)));
                print_table(["Key", "Value"], rows);
            }
            None => print_json(value),
        },
    }
}

pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}

pub fn print_table<I>(headers: [&str; 2], rows: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut builder = Builder::default();
    builder.push_record(headers);
    let mut empty = true;
    for (k, v) in rows {
        builder.push_record([k, v]);
        empty = false;
    }
    if empty {
        println!("  (none)");
        return;
    }
    let table = builder.build().with(Style::rounded()).to_string();
    println!("{table}");
}

pub fn print_heading(title: &str) {
    println!("\n{}", title.bold().cyan());
}

pub fn print_field(label: &str, value: &str) {
    println!("{}: {}", label.cyan(), value);
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "!".yellow(), msg.yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Strings unquoted, everything else as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Long tokens shortened to head and tail for table display.
pub fn abbreviate(raw: &str, keep: usize) -> String {
    let chars: Vec<char> = raw.chars().collect();
    if chars.len() <= keep * 2 + 3 {
        return raw.to_string();
    }
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[chars.len() - keep..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("Patient/1")), "Patient/1");
        assert_eq!(display_value(&json!(42)), "42");
        assert_eq!(display_value(&json!(["a", "b"])), r#"["a","b"]"#);
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("short", 4), "short");
        assert_eq!(abbreviate("abcdefghijklmnop", 3), "abc...nop");
    }
}

//! Line-oriented mode.
//!
//! Each non-empty line on stdin is recorded as a dream. Lines starting with
//! `#` are commands (`#graph`, `#help`, `#quit`). Every result is printed as
//! a single JSON document on stdout.

use dreamscape_core::{Dreamscape, DreamscapeError, Submission};
use serde_json::{json, Value};
use std::io::{self, BufRead};

/// Read dreams from stdin until EOF or `#quit`.
pub async fn run(dreamscape: &Dreamscape) {
    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            match command.trim() {
                "quit" | "exit" => break,
                "graph" => match dreamscape.graph().await {
                    Ok(graph) => print_json(&json!(graph)),
                    Err(e) => print_json(&error_body(&e)),
                },
                "help" => print_commands(),
                other => print_json(&json!({ "error": format!("Unknown command: #{other}") })),
            }
            continue;
        }

        submit_and_print(dreamscape, line).await;
    }
}

/// Submit one dream and print the outcome. Returns whether it succeeded.
pub async fn submit_and_print(dreamscape: &Dreamscape, text: &str) -> bool {
    match dreamscape.submit(text).await {
        Ok(submission) => {
            print_json(&success_body(&submission));
            true
        }
        Err(e) => {
            print_json(&error_body(&e));
            false
        }
    }
}

fn success_body(submission: &Submission) -> Value {
    let mut body = json!(submission);
    body["status"] = json!("success");
    body
}

fn error_body(error: &DreamscapeError) -> Value {
    json!({ "error": error.to_string() })
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("Error encoding output: {e}"),
    }
}

fn print_commands() {
    println!("Commands:");
    println!("  #graph  - Print the stored graph");
    println!("  #help   - Show this help");
    println!("  #quit   - Exit");
    println!("Any other line is recorded as a dream.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dreamscape_core::{build, DreamEntry, Strategy};

    #[test]
    fn test_success_body_shape() {
        let submission = Submission {
            entry: DreamEntry::new("Owls over Rome", vec!["Owls".into(), "Rome".into()]),
            graph: build([["Owls", "Rome"]]),
            strategy: Some(Strategy::Fallback),
        };
        let body = success_body(&submission);

        assert_eq!(body["status"], "success");
        assert_eq!(body["entry"]["dream"], "Owls over Rome");
        assert_eq!(body["entry"]["entities"], json!(["Owls", "Rome"]));
        assert_eq!(body["graph"]["links"][0]["value"], 1);
        assert_eq!(body["strategy"], "fallback");
    }

    #[test]
    fn test_error_body() {
        let body = error_body(&DreamscapeError::EmptyDream);
        assert_eq!(body, json!({ "error": "Dream text is required" }));
    }
}

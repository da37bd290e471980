//! Dreamscape command-line front end.
//!
//! Records dreams and prints the resulting co-occurrence graph as JSON.
//!
//! ```bash
//! cargo run -p dreamscape -- --submit "I met Sarah Connor near the Eiffel Tower."
//! cargo run -p dreamscape -- --graph
//! cargo run -p dreamscape                 # one dream per line on stdin
//! ```

mod interactive;

use dreamscape_core::{Dreamscape, DreamscapeConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// What the user asked for on the command line.
#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Graph,
    Submit(String),
    Interactive,
}

#[derive(Debug, PartialEq)]
struct Args {
    data_dir: Option<String>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut data_dir = None;
    let mut command = Command::Interactive;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => command = Command::Help,
            "--graph" => command = Command::Graph,
            "--submit" => {
                let text = iter.next().ok_or("--submit requires dream text")?;
                command = Command::Submit(text.clone());
            }
            "--data-dir" => {
                let dir = iter.next().ok_or("--data-dir requires a path")?;
                data_dir = Some(dir.clone());
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
    }

    Ok(Args { data_dir, command })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let raw: Vec<String> = std::env::args().collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}");
            print_help();
            std::process::exit(2);
        }
    };

    if args.command == Command::Help {
        print_help();
        return Ok(());
    }

    let mut config = DreamscapeConfig::from_env();
    if let Some(dir) = args.data_dir {
        config = config.with_data_dir(dir);
    }

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let dreamscape = Dreamscape::open(&config).await?;

    match args.command {
        Command::Graph => {
            let graph = dreamscape.graph().await?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
        Command::Submit(text) => {
            let ok = interactive::submit_and_print(&dreamscape, &text).await;
            if !ok {
                std::process::exit(1);
            }
        }
        Command::Interactive => interactive::run(&dreamscape).await,
        Command::Help => print_help(),
    }

    Ok(())
}

fn print_help() {
    println!("dreamscape - record dreams and map the names in them");
    println!();
    println!("Usage:");
    println!("  dreamscape [--data-dir DIR] [--submit TEXT | --graph]");
    println!();
    println!("Options:");
    println!("  --data-dir DIR   Directory holding dreams.json and cooccurrences.json");
    println!("  --submit TEXT    Record one dream and print the result");
    println!("  --graph          Print the stored graph");
    println!("  -h, --help       Show this help");
    println!();
    println!("Without --submit or --graph, each line read from stdin is recorded as a dream.");
    println!();
    println!("Environment:");
    println!("  AI_KEY / OPENAI_API_KEY / GENAI_API_KEY   Extraction API key (optional)");
    println!("  DREAMSCAPE_DATA_DIR, DREAMSCAPE_MODEL, DREAMSCAPE_EXTRACTION_TIMEOUT_SECS,");
    println!("  DREAMSCAPE_LOG");
}

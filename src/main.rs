//! MarkerEngine CLI
//!
//! Usage:
//!   marker-engine --registry markers.json --text "your text"   # Single analysis
//!   marker-engine --registry markers.json --batch input.txt    # One text per line
//!   marker-engine --registry markers.json --interactive        # Read lines from stdin
//!   marker-engine --registry markers.json --validate           # Validate only
//!   marker-engine --registry markers.json --text "..." --json  # JSON output

use clap::Parser;
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use marker_engine::core::{
    cache_key, EngineConfig, Orchestrator, Registry, ResponseCache,
};
use marker_engine::types::{AnalyzeRequest, AnalyzeResponse, DetectionPhase};
use marker_engine::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "marker-engine",
    version = VERSION,
    about = "Detect semantic markers in free text and evaluate activation rules",
    long_about = "MarkerEngine runs a three-phase pipeline over each text:\n\n  \
                  1. initial scan    - atomic markers via examples and regex patterns\n  \
                  2. enrichment      - tokens, sentences, entities, sentiment\n  \
                  3. contextual scan - activation rules compose higher-order markers\n\n\
                  The result is a scored, phase-annotated marker report."
)]
struct Args {
    /// Marker registry file (JSON or YAML)
    #[arg(short, long)]
    registry: String,

    /// Text to analyze (single mode)
    #[arg(short, long)]
    text: Option<String>,

    /// File with one text per line (batch mode)
    #[arg(short, long)]
    batch: Option<String>,

    /// Interactive mode - read lines from stdin
    #[arg(short, long)]
    interactive: bool,

    /// Validate the registry and exit
    #[arg(long)]
    validate: bool,

    /// Schema filter applied to categorized markers
    #[arg(long, default_value = "")]
    schema: String,

    /// Engine config file (JSON or YAML)
    #[arg(long)]
    config: Option<String>,

    /// Skip live enrichment (degraded annotations)
    #[arg(long)]
    no_nlp: bool,

    /// Skip the contextual rescan
    #[arg(long)]
    no_contextual: bool,

    /// Generate a narrative interpretation
    #[arg(long)]
    interpret: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }

    let config = match &args.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("Config error: {}", error);
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    let registry = match Registry::load_path(&args.registry) {
        Ok(registry) => registry,
        Err(error) => {
            eprintln!("Registry error: {}", error);
            std::process::exit(1);
        }
    };

    if args.validate {
        println!(
            "Registry OK: {} markers, version {}, loaded at {}",
            registry.len(),
            registry.version(),
            registry.loaded_at().format("%Y-%m-%d %H:%M:%S UTC")
        );
        return;
    }

    let mut orchestrator = Orchestrator::new(registry.clone(), config.clone());
    if args.interpret {
        orchestrator = orchestrator.with_bridge(
            marker_engine::core::BridgeRunner::with_template_fallback(Arc::new(
                marker_engine::core::TemplateBridge,
            )),
        );
    }

    if let Some(path) = &args.batch {
        run_batch(path, &orchestrator, &config, &args).await;
    } else if args.interactive {
        run_interactive(&orchestrator, &args).await;
    } else if let Some(text) = &args.text {
        run_single(text, &orchestrator, &args).await;
    } else {
        run_interactive(&orchestrator, &args).await;
    }
}

fn build_request(text: &str, args: &Args) -> AnalyzeRequest {
    let mut request = AnalyzeRequest::new(text, &args.schema);
    request.enable_nlp = !args.no_nlp;
    request.enable_contextual = !args.no_contextual;
    request
}

/// Analyze one text and print the result
async fn run_single(text: &str, orchestrator: &Orchestrator, args: &Args) {
    match orchestrator.analyze(build_request(text, args)).await {
        Ok(response) => print_response(&response, args),
        Err(error) => {
            eprintln!("Analysis error: {}", error);
            std::process::exit(1);
        }
    }
}

/// Analyze a file line by line; identical lines hit the response cache
async fn run_batch(path: &str, orchestrator: &Orchestrator, config: &EngineConfig, args: &Args) {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) => {
            eprintln!("Cannot read batch file {}: {}", path, error);
            std::process::exit(1);
        }
    };

    let cache = ResponseCache::new(config.cache_capacity);
    let version = orchestrator.registry().version().to_string();

    let mut pending: Vec<(usize, String)> = Vec::new();
    let mut lines: Vec<(String, Option<AnalyzeResponse>)> = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let key = cache_key(line, &args.schema, &version);
        match cache.get(&key) {
            Some(hit) => lines.push((line.to_string(), Some(hit.response))),
            None => {
                pending.push((lines.len(), line.to_string()));
                lines.push((line.to_string(), None));
            }
        }
    }

    let requests: Vec<AnalyzeRequest> = pending
        .iter()
        .map(|(_, text)| build_request(text, args))
        .collect();
    let responses = match orchestrator.analyze_batch(requests).await {
        Ok(responses) => responses,
        Err(error) => {
            eprintln!("Batch error: {}", error);
            std::process::exit(1);
        }
    };

    for ((index, text), response) in pending.into_iter().zip(responses) {
        let key = cache_key(&text, &args.schema, &version);
        cache.put(key, response.clone());
        lines[index].1 = Some(response);
    }

    for (text, response) in lines {
        let Some(response) = response else { continue };
        if args.json {
            if let Ok(json) = serde_json::to_string(&response) {
                println!("{}", json);
            }
        } else {
            println!("{}", format!("» {}", text).bold());
            print_response(&response, args);
            println!();
        }
    }
}

/// Read lines from stdin and analyze each
async fn run_interactive(orchestrator: &Orchestrator, args: &Args) {
    println!("{}", format!("MarkerEngine v{} - interactive", VERSION).bold());
    println!("Type text and press Enter to analyze. Type 'quit' to exit.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        let _ = stdout.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }

        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        match orchestrator.analyze(build_request(line, args)).await {
            Ok(response) => print_response(&response, args),
            Err(error) => eprintln!("Analysis error: {}", error),
        }
    }
}

/// Render one response to the terminal
fn print_response(response: &AnalyzeResponse, args: &Args) {
    if args.json {
        if let Ok(json) = serde_json::to_string_pretty(response) {
            println!("{}", json);
        }
        return;
    }

    if response.markers.is_empty() {
        println!("{}", "no markers detected".dimmed());
        return;
    }

    for marker in &response.markers {
        let phase = match marker.detection_phase {
            DetectionPhase::Initial => "initial".cyan(),
            DetectionPhase::Contextual => "contextual".green(),
        };
        let mut line = format!(
            "  {} [{}] confidence={:.2}",
            marker.marker_id.bold(),
            phase,
            marker.confidence
        );
        if let Some(position) = &marker.position {
            line.push_str(&format!(" @{}..{}", position.start, position.end));
        }
        if !marker.components.is_empty() {
            line.push_str(&format!(" ← {}", marker.components.join(", ")));
        }
        println!("{}", line);
    }

    println!(
        "  {} markers | score {:.2} | nlp {}",
        response.marker_count,
        response.total_score,
        if response.nlp_enriched {
            "enriched".green()
        } else {
            "degraded".yellow()
        }
    );

    for (phase, error) in [
        ("initial", &response.phases.initial.error),
        ("enrichment", &response.phases.enrichment.error),
        ("contextual", &response.phases.contextual.error),
    ] {
        if let Some(error) = error {
            println!("  {} {}: {}", "⚠".yellow(), phase, error);
        }
    }

    if let Some(interpretation) = &response.interpretation {
        println!("  {}", interpretation.italic());
    }
}

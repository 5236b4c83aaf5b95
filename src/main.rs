use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use course_tutor::config::TutorConfig;
use course_tutor::embeddings::OllamaEmbedder;
use course_tutor::engine::TutorEngine;
use course_tutor::llm::OllamaGenerator;

fn get_log_dir() -> String {
    std::env::var("LOG_DIR").unwrap_or_else(|_| {
        if std::path::Path::new("/var/log").exists() && is_writable("/var/log") {
            "/var/log/course-tutor".to_string()
        } else {
            "./logs".to_string()
        }
    })
}

fn get_log_level() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

fn get_log_max_mb() -> u64 {
    std::env::var("LOG_MAX_MB")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5)
}

fn is_writable(path: &str) -> bool {
    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(format!("{}/test_write", path))
        .map(|_| {
            let _ = std::fs::remove_file(format!("{}/test_write", path));
            true
        })
        .unwrap_or(false)
}

fn setup_logging() -> Result<()> {
    let log_dir = get_log_dir();
    let log_level = get_log_level();
    let log_max_mb = get_log_max_mb();

    std::fs::create_dir_all(&log_dir)?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    let is_development = std::env::var("DEVELOPMENT").is_ok() || std::env::var("DEV").is_ok();
    let force_console = std::env::var("CONSOLE_LOGS").is_ok();

    if is_development || force_console {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .compact()
            .init();
        tracing::info!("Development mode: logging to console");
    } else {
        let log_file = format!("{}/course-tutor.log", log_dir);
        let file_appender = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)?;

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(file_appender)
            .json()
            .init();
    }

    tracing::info!("Logging initialized");
    tracing::info!("Log directory: {}", log_dir);
    tracing::info!("Log level: {}", log_level);
    tracing::info!("Log max size: {}MB (auto-truncate)", log_max_mb);

    Ok(())
}

async fn start_log_cleanup_task(log_dir: String, max_mb: u64) {
    let max_bytes = max_mb * 1024 * 1024;
    let log_file = format!("{}/course-tutor.log", log_dir);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Ok(metadata) = std::fs::metadata(&log_file) {
                if metadata.len() > max_bytes {
                    if let Err(e) = std::fs::write(
                        &log_file,
                        format!("[LOG TRUNCATED - Size exceeded {}MB]\n", max_mb),
                    ) {
                        eprintln!("Failed to truncate log file: {}", e);
                    }
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }
    setup_logging()?;

    let log_dir = get_log_dir();
    let log_max_mb = get_log_max_mb();
    start_log_cleanup_task(log_dir, log_max_mb).await;

    let config = TutorConfig::from_env();
    tracing::info!("Lectures directory: {:?}", config.lectures_dir);
    tracing::info!("Exercises directory: {:?}", config.exercises_dir);

    let embedder = Arc::new(OllamaEmbedder::new().await?);
    let generator = Arc::new(OllamaGenerator::new().await?);
    tracing::info!(
        "Models ready: embedding '{}', generation '{}'",
        embedder.model_name(),
        generator.model_name()
    );

    let engine = TutorEngine::build(config, embedder, generator).await?;
    tracing::info!("Course index built, {} chunks", engine.index().chunks.len());

    println!("Course tutor ready. Type a question ('quit' to exit).");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            println!("Please enter a question.");
            continue;
        }
        if question.eq_ignore_ascii_case("quit") || question.eq_ignore_ascii_case("exit") {
            break;
        }

        let response = engine.answer_question(question).await;

        println!(
            "\n[{} | confidence {:.2}]\n{}\n",
            response.label, response.confidence, response.answer
        );
        if !response.sources.is_empty() {
            println!("Sources:");
            for source in &response.sources {
                println!(
                    "  {} ({:.2}): {}",
                    source.document_name, source.similarity_score, source.preview
                );
            }
            println!();
        }
    }

    tracing::info!("Shutting down");
    Ok(())
}

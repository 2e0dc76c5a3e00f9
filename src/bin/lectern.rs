//! lectern: ask questions about documents through the quota/cache/retry stack
//!
//! Also exposes the tier table, cache key derivation, and context
//! truncation for inspection.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lectern::text::DEFAULT_MAX_TOKENS;
use lectern::{
    Action, Config, GeminiModel, GenerateRequest, Lectern, Secrets, Tier, cache_key,
    truncate_context,
};

/// Lectern CLI
#[derive(Parser)]
#[command(name = "lectern")]
#[command(version)]
#[command(about = "Quota-gated, cached, retrying document Q&A over Gemini")]
struct Args {
    /// Config file (default: ~/.lectern/config.toml, then /etc/lectern/config.toml)
    #[arg(short, long, env = "LECTERN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question, optionally about a document
    Ask {
        /// Question (or omit to read from stdin)
        question: Option<String>,
        /// Document to use as context
        #[arg(short, long)]
        document: Option<PathBuf>,
        /// Model to use (default: from config)
        #[arg(short, long)]
        model: Option<String>,
        /// Subject the request is counted against
        #[arg(short, long, default_value = "cli")]
        subject: String,
        /// Attempt cap for this request
        #[arg(long)]
        max_retries: Option<u32>,
        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Show the effective tier table
    Limits,

    /// Print the cache key for a prompt
    CacheKey {
        /// Prompt text (or omit to read from stdin)
        prompt: Option<String>,
        /// Model identifier
        #[arg(short, long, default_value = lectern::cache::DEFAULT_MODEL)]
        model: String,
    },

    /// Truncate text to a context budget
    Truncate {
        /// Text (or omit to read from stdin)
        text: Option<String>,
        /// Character budget (overrides --max-tokens)
        #[arg(long)]
        max_length: Option<usize>,
        /// Token budget, at four characters per token
        #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
        max_tokens: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref())?;

    match args.command {
        Command::Ask {
            question,
            document,
            model,
            subject,
            max_retries,
            no_cache,
        } => {
            let question = resolve_text(question, "ask")?;
            let api_key = Secrets::load()?
                .gemini_api_key()
                .ok_or("ask: no Gemini API key (set GEMINI_API_KEY or ~/.lectern/secrets.toml)")?;

            let model_id = model.unwrap_or_else(|| config.gemini.model.clone());
            let gemini = match &config.gemini.base_url {
                Some(url) => GeminiModel::with_base_url(api_key, &model_id, url)?,
                None => GeminiModel::new(api_key, &model_id)?,
            };

            let mut request = GenerateRequest::new(question).use_cache(!no_cache);
            if let Some(path) = document {
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| format!("ask: failed to read {}: {e}", path.display()))?;
                request = request.context(truncate_context(&text, None, DEFAULT_MAX_TOKENS));
            }
            if let Some(n) = max_retries {
                request = request.max_retries(n);
            }

            let lectern = Lectern::builder().apply_config(&config)?.build()?;
            match lectern.ask(subject, &gemini, &request).await {
                Ok(response) => {
                    println!("{}", response.message);
                    eprintln!(
                        "[{model_id} in {}ms{}]",
                        response.response_time_ms,
                        if response.cached { ", cached" } else { "" }
                    );
                }
                Err(e) => {
                    eprintln!("{}", e.user_message());
                    return Err(e.into());
                }
            }
        }

        Command::Limits => {
            let table = config.tier_table()?;
            println!("{:<10} {:<16} {:>8} {:>8}", "tier", "action", "limit", "window");
            for tier in Tier::ALL {
                for action in Action::ALL {
                    let limit = table.limit(tier, action);
                    println!(
                        "{:<10} {:<16} {:>8} {:>7}s",
                        tier.as_str(),
                        action.as_str(),
                        limit.limit,
                        limit.window_secs
                    );
                }
            }
            println!("store failure policy: {:?}", config.quota.failure_policy);
        }

        Command::CacheKey { prompt, model } => {
            let prompt = resolve_text(prompt, "cache-key")?;
            println!("{}", cache_key(&config.cache.namespace, &prompt, &model));
        }

        Command::Truncate {
            text,
            max_length,
            max_tokens,
        } => {
            let text = resolve_text(text, "truncate")?;
            println!("{}", truncate_context(&text, max_length, max_tokens));
        }
    }

    Ok(())
}

/// Resolve input text from a positional argument and/or piped stdin.
///
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}

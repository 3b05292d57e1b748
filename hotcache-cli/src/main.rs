use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hotcache::{Backend, CacheConfig, HotCache, Ttl};

#[derive(Parser)]
#[command(name = "hotcache")]
#[command(about = "Session and hot-content cache operations", long_about = None)]
struct Cli {
    /// Redis server URL (overrides HOTCACHE_REDIS_URL; without either an in-process store is used)
    #[arg(long, global = true)]
    redis_url: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the store answers
    Ping,

    /// Show store diagnostics
    Info,

    /// Count live keys
    Dbsize,

    /// List keys matching a glob pattern
    Keys {
        /// Pattern, e.g. "session:*"
        #[arg(default_value = "*")]
        pattern: String,
    },

    /// Print a string value
    Get {
        key: String,
    },

    /// Print the remaining lifetime of a key
    Ttl {
        key: String,
    },

    /// List a user's live sessions
    Sessions {
        user_id: String,
    },

    /// Show the cached hot ranking for a content type
    Hot {
        content_type: String,

        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Recompute the hot ranking for a content type
    Refresh {
        content_type: String,
    },

    /// Run the background sweep and ranking refresh until Ctrl-C
    Serve,
}

impl Commands {
    /// Commands that only report state some other process wrote
    fn reads_shared_state(&self) -> bool {
        matches!(
            self,
            Commands::Info
                | Commands::Dbsize
                | Commands::Keys { .. }
                | Commands::Get { .. }
                | Commands::Ttl { .. }
                | Commands::Sessions { .. }
                | Commands::Hot { .. }
                | Commands::Refresh { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "hotcache=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cache = open_cache(&cli).await?;

    let outcome = run(&cli, &cache).await;
    cache.close().await.context("Failed to close cache")?;
    outcome
}

async fn run(cli: &Cli, cache: &HotCache) -> Result<()> {
    match &cli.command {
        Commands::Ping => {
            println!("{}", cache.ping().await?);
        }

        Commands::Info => {
            let info = cache.info().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print!("{}", info);
            }
        }

        Commands::Dbsize => {
            println!("{}", cache.dbsize().await?);
        }

        Commands::Keys { pattern } => {
            let keys = cache.keys(pattern).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&keys)?);
            } else {
                for key in keys {
                    println!("{}", key);
                }
            }
        }

        Commands::Get { key } => match cache.get(key).await? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },

        Commands::Ttl { key } => {
            println!("{}", describe_ttl(cache.ttl(key).await?));
        }

        Commands::Sessions { user_id } => {
            let sessions = cache.get_user_sessions(user_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                println!("User {} is offline", user_id);
            } else {
                println!("Sessions for {}:", user_id);
                for s in sessions {
                    println!(
                        "  {}  {:<12} {:<8} {:<15} last active {}",
                        s.session_id,
                        s.device_id,
                        s.platform,
                        s.ip,
                        s.last_active_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }

        Commands::Hot {
            content_type,
            count,
        } => {
            let items = cache.get_hot_content(content_type, *count).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if items.is_empty() {
                println!(
                    "No ranking computed for '{}'. Run 'hotcache refresh {}' first.",
                    content_type, content_type
                );
            } else {
                if let Some(ranking) = cache.get_ranking(content_type).await? {
                    println!(
                        "Hot {} (computed {}):",
                        content_type,
                        ranking.computed_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
                for (rank, item) in items.iter().enumerate() {
                    println!("  {:>3}. {:<24} {:.1}", rank + 1, item.content_id, item.score);
                }
            }
        }

        Commands::Refresh { content_type } => {
            let ranking = cache.refresh_hot_ranking(content_type).await?;
            println!(
                "Refreshed '{}': {} item(s) ranked",
                content_type,
                ranking.items.len()
            );
        }

        Commands::Serve => {
            cache.start_background()?;
            info!(
                "Serving with {} background task(s); press Ctrl-C to stop",
                cache.background_tasks()
            );
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
        }
    }

    Ok(())
}

async fn open_cache(cli: &Cli) -> Result<HotCache> {
    let config = build_config(cli)?;
    if config.backend == Backend::Memory && cli.command.reads_shared_state() {
        warn!(
            "No Redis URL configured; reading a fresh in-process store, results will be empty. \
             Pass --redis-url or set HOTCACHE_REDIS_URL"
        );
    }
    HotCache::open(config)
        .await
        .context("Failed to open cache")
}

fn build_config(cli: &Cli) -> Result<CacheConfig> {
    let mut config = CacheConfig::from_env().context("Invalid HOTCACHE_* configuration")?;
    if let Some(url) = &cli.redis_url {
        config.backend = Backend::Redis;
        config.remote.url = Some(url.clone());
    }
    Ok(config)
}

fn describe_ttl(ttl: Option<Ttl>) -> String {
    match ttl {
        None => "-2 (missing)".to_string(),
        Some(Ttl::Persistent) => "-1 (no expiry)".to_string(),
        Some(ttl @ Ttl::Remaining(_)) => format!("{}s", ttl.as_secs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_hot_command() {
        let cli =
            Cli::try_parse_from(["hotcache", "hot", "work", "--count", "5", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Hot {
                content_type,
                count,
            } => {
                assert_eq!(content_type, "work");
                assert_eq!(count, 5);
            }
            _ => panic!("expected hot command"),
        }
    }

    #[test]
    fn test_parse_redis_url() {
        let cli =
            Cli::try_parse_from(["hotcache", "--redis-url", "redis://cache:6379", "ping"])
                .unwrap();
        assert_eq!(cli.redis_url.as_deref(), Some("redis://cache:6379"));
        assert!(matches!(cli.command, Commands::Ping));
    }

    #[test]
    fn test_keys_default_pattern() {
        let cli = Cli::try_parse_from(["hotcache", "keys"]).unwrap();
        assert!(matches!(cli.command, Commands::Keys { ref pattern } if pattern == "*"));
    }

    #[test]
    fn test_read_commands_need_shared_store() {
        let hot = Cli::try_parse_from(["hotcache", "hot", "work"]).unwrap();
        assert!(hot.command.reads_shared_state());
        let sessions = Cli::try_parse_from(["hotcache", "sessions", "u1"]).unwrap();
        assert!(sessions.command.reads_shared_state());

        let ping = Cli::try_parse_from(["hotcache", "ping"]).unwrap();
        assert!(!ping.command.reads_shared_state());
        let serve = Cli::try_parse_from(["hotcache", "serve"]).unwrap();
        assert!(!serve.command.reads_shared_state());
    }

    #[test]
    fn test_describe_ttl() {
        assert_eq!(describe_ttl(None), "-2 (missing)");
        assert_eq!(describe_ttl(Some(Ttl::Persistent)), "-1 (no expiry)");
        assert_eq!(
            describe_ttl(Some(Ttl::Remaining(Duration::from_secs(42)))),
            "42s"
        );
    }
}

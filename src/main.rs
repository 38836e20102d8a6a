mod cli;

use mediafetch::{
    config,
    fetch::{self, FetchPool, ImageFetcher},
    resolve::{self, ResolverRegistry},
};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;

async fn fetch_uris(uris: Vec<String>, config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let fetcher = Arc::new(ImageFetcher::from_config(&config)?);
    tracing::info!(
        platforms = ?fetcher.registry().platforms(),
        "Resolvers registered"
    );
    let pool = Arc::new(FetchPool::new(fetcher.clone(), &config.pool));

    let handles: Vec<_> = uris
        .into_iter()
        .map(|uri| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let result = pool.fetch(uri.clone()).await;
                (uri, result)
            })
        })
        .collect();

    let mut failures = 0;
    for handle in handles {
        let (uri, result) = handle.await?;
        match result {
            Ok((image, from_cache)) => {
                let (width, height) = image.dimensions();
                println!(
                    "✓ {} {}x{} {} frame(s) via {}{}",
                    uri,
                    width,
                    height,
                    image.frame_count(),
                    image.decoder,
                    if from_cache { " [cached]" } else { "" }
                );
            }
            Err((failure, true)) => {
                println!("▶ {} is video or audio: {}", uri, failure.error);
            }
            Err((failure, false)) => {
                failures += 1;
                println!("✗ {}", failure);
            }
        }
    }

    pool.shutdown().await;
    fetcher.registry().clear();

    if failures > 0 {
        anyhow::bail!("{} fetch(es) failed", failures);
    }
    Ok(())
}

async fn resolve_uri(uri: &str, config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let client = fetch::build_client(&config.fetch)?;
    let registry = ResolverRegistry::with_builtins(&config.resolver, client);

    let input = resolve::parse_uri(uri)?;
    let resolution = registry.resolve(&input).await?;

    println!("Input:    {}", input);
    println!("Resolved: {}", resolution.uri);
    println!(
        "Platform: {}",
        resolution.fallback.platform().unwrap_or("(extension heuristic)")
    );
    println!("Video:    {}", resolution.assumed_video);
    println!("Fallback: {}", resolution.fallback_available);

    registry.clear();
    Ok(())
}

fn list_platforms(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let client = fetch::build_client(&config.fetch)?;
    let registry = ResolverRegistry::with_builtins(&config.resolver, client);

    for (i, platform) in registry.platforms().iter().enumerate() {
        println!("{}. {}", i + 1, platform);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediafetch=trace,mediafetch_common=debug,reqwest=debug".to_string()
        } else {
            "mediafetch=info,reqwest=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fetch { uris } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(fetch_uris(uris, cli.config.as_deref()))
        }
        Commands::Resolve { uri } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(resolve_uri(&uri, cli.config.as_deref()))
        }
        Commands::Platforms => list_platforms(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediafetch {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!(
        "  Fetch: timeout {}s, user agent {:?}",
        config.fetch.timeout_secs, config.fetch.user_agent
    );
    println!(
        "  Pool: {} worker(s), queue depth {}",
        config.pool.worker_count(),
        config.pool.queue_depth
    );
    println!(
        "  Resolver: ttl {}s, temp dir {}",
        config.resolver.ttl_secs,
        config.resolver.temp_dir().display()
    );
    match &config.cache.dir {
        Some(dir) => println!("  Cache: disk at {}", dir.display()),
        None => println!("  Cache: in memory"),
    }

    Ok(())
}

//! Memoria CLI and REST API entry point.
//!
//! Binary name: `memoria`
//!
//! Parses CLI arguments, initializes tracing, opens the database and
//! services, then dispatches to a command handler or starts the server.

mod cli;
mod http;
mod scheduler;
mod state;

use clap::Parser;
use clap_complete::generate;

use memoria_observe::{TracingOptions, init_tracing, shutdown_tracing};
use memoria_types::memory::ListQuery;
use memoria_types::search::{ContextRequest, SearchQuery};

use cli::memory::RememberArgs;
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(TracingOptions {
        verbosity: cli.verbose,
        quiet: cli.quiet,
        json: false,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "memoria", &mut std::io::stdout());
        return Ok(());
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let background = matches!(cli.command, Commands::Serve { .. });
    let state = AppState::init(background).await?;

    match cli.command {
        Commands::Remember {
            content,
            memory_type,
            content_type,
            scope,
            metadata,
            ttl_hours,
            no_embed,
        } => {
            let args = RememberArgs {
                content,
                memory_type,
                content_type,
                scope: scope.into(),
                metadata,
                ttl_hours,
                no_embed,
            };
            cli::memory::remember(&state, args, cli.json).await?;
        }

        Commands::Search {
            query,
            memory_types,
            content_type,
            scope,
            limit,
            min_relevance,
            text_only,
            metadata,
            related,
        } => {
            let query = SearchQuery {
                query: query.join(" "),
                memory_types: (!memory_types.is_empty()).then_some(memory_types),
                content_types: (!content_type.is_empty()).then_some(content_type),
                scope: scope.into(),
                max_results: limit,
                min_relevance,
                use_vector_search: text_only.then_some(false),
                include_metadata: metadata.then_some(true),
                include_knowledge_graph: related.then_some(true),
                ..Default::default()
            };
            cli::memory::search(&state, query, cli.json).await?;
        }

        Commands::Context {
            messages,
            kind,
            scope,
            related,
        } => {
            let request = ContextRequest {
                messages,
                conversation_type: kind,
                scope: scope.into(),
                include_knowledge_graph: related.then_some(true),
            };
            cli::memory::context(&state, request, cli.json).await?;
        }

        Commands::List {
            memory_type,
            content_type,
            scope,
            limit,
        } => {
            let query = ListQuery {
                memory_type,
                content_type,
                scope: scope.into(),
                limit,
            };
            cli::memory::list(&state, query, cli.json).await?;
        }

        Commands::Backfill {
            batch_size,
            start_id,
            all,
        } => {
            cli::memory::backfill(&state, batch_size, start_id, all, cli.json).await?;
        }

        Commands::Serve { port, host } => {
            let backfill = scheduler::start_backfill_scheduler(&state, &state.config.backfill).await?;

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Memoria API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            if let Some(mut backfill) = backfill {
                backfill.shutdown().await?;
            }
            println!("\n  Server stopped.");
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

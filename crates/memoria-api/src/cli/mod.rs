//! CLI command definitions for the `memoria` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod memory;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use memoria_types::memory::MemoryScope;
use memoria_types::search::ConversationKind;

/// Hybrid semantic and keyword memory for conversational agents.
#[derive(Parser)]
#[command(name = "memoria", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a new memory record.
    Remember {
        /// Text content of the memory.
        content: String,

        /// Retention tier: working, short-term, or long-term.
        #[arg(long = "type", default_value = "short-term")]
        memory_type: String,

        /// Free-form content type tag.
        #[arg(long, default_value = "note")]
        content_type: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Metadata entry as key=value (repeatable). JSON values are parsed.
        #[arg(long = "meta", value_parser = parse_key_val)]
        metadata: Vec<(String, String)>,

        /// Expire the record after this many hours.
        #[arg(long)]
        ttl_hours: Option<i64>,

        /// Skip computing the embedding now; backfill fills it later.
        #[arg(long)]
        no_embed: bool,
    },

    /// Hybrid search over stored memories.
    #[command(alias = "find")]
    Search {
        /// Search text.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Restrict to these tiers (repeatable).
        #[arg(long = "type")]
        memory_types: Vec<String>,

        /// Restrict to these content types (repeatable).
        #[arg(long)]
        content_type: Vec<String>,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Maximum results.
        #[arg(short, long)]
        limit: Option<u32>,

        /// Minimum combined relevance.
        #[arg(long)]
        min_relevance: Option<f32>,

        /// Keyword matching only.
        #[arg(long)]
        text_only: bool,

        /// Include record metadata in results.
        #[arg(long)]
        metadata: bool,

        /// Annotate results with related memory ids.
        #[arg(long)]
        related: bool,
    },

    /// Recall memories relevant to the latest conversation messages.
    Context {
        /// Conversation messages, oldest first. The last three are used.
        #[arg(required = true, num_args = 1..)]
        messages: Vec<String>,

        /// Conversation kind: reminiscence, orientation, cst_session, or general.
        #[arg(long = "kind", default_value = "general")]
        kind: ConversationKind,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Annotate results with related memory ids.
        #[arg(long)]
        related: bool,
    },

    /// List stored memories, newest first.
    #[command(alias = "ls")]
    List {
        /// Restrict to one tier.
        #[arg(long = "type")]
        memory_type: Option<String>,

        /// Restrict to one content type.
        #[arg(long)]
        content_type: Option<String>,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Maximum records.
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Fill in missing embeddings.
    Backfill {
        /// Records per batch.
        #[arg(long)]
        batch_size: Option<u32>,

        /// Resume after this record id.
        #[arg(long)]
        start_id: Option<String>,

        /// Keep running batches until nothing is left.
        #[arg(long)]
        all: bool,
    },

    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Scope filters shared by several commands.
#[derive(Args, Debug, Default, Clone)]
pub struct ScopeArgs {
    /// Owner (user) id.
    #[arg(long)]
    pub owner: Option<String>,

    /// Session id.
    #[arg(long)]
    pub session: Option<String>,

    /// Conversation id.
    #[arg(long)]
    pub conversation: Option<String>,

    /// Topic id.
    #[arg(long)]
    pub topic: Option<String>,
}

impl From<ScopeArgs> for MemoryScope {
    fn from(s: ScopeArgs) -> Self {
        MemoryScope {
            owner_id: s.owner,
            session_id: s.session,
            conversation_id: s.conversation,
            topic_id: s.topic,
        }
    }
}

/// Parse `key=value`.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_search_with_filters() {
        let cli = Cli::try_parse_from([
            "memoria", "search", "budget", "review", "--type", "long-term", "--owner", "alice", "-l", "5", "--json",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Search {
                query,
                memory_types,
                scope,
                limit,
                ..
            } => {
                assert_eq!(query.join(" "), "budget review");
                assert_eq!(memory_types, vec!["long-term"]);
                assert_eq!(scope.owner.as_deref(), Some("alice"));
                assert_eq!(limit, Some(5));
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn parses_context_with_kind() {
        let cli = Cli::try_parse_from([
            "memoria", "context", "who visited", "on sunday", "--kind", "orientation", "--owner", "alice",
        ])
        .unwrap();

        match cli.command {
            Commands::Context {
                messages, kind, scope, ..
            } => {
                assert_eq!(messages, vec!["who visited", "on sunday"]);
                assert_eq!(kind, ConversationKind::Orientation);
                assert_eq!(scope.owner.as_deref(), Some("alice"));
            }
            _ => panic!("expected context"),
        }

        assert!(Cli::try_parse_from(["memoria", "context", "hi", "--kind", "smalltalk"]).is_err());
    }

    #[test]
    fn key_val_requires_equals_and_key() {
        assert_eq!(
            parse_key_val("region=emea").unwrap(),
            ("region".to_string(), "emea".to_string())
        );
        assert_eq!(parse_key_val("q=a=b").unwrap().1, "a=b");
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }
}

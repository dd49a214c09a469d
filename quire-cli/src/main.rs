//! Quire command line client.
//!
//! Talks to a collaboration server to inspect document history, list the
//! template catalog, and preview a template merged into a document.
//! Output is HTML on stdout; logs go to stderr (`RUST_LOG`).

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::info;
use tokio::time::timeout;
use uuid::Uuid;

use quire_collab::driver::REQUEST_TIMEOUT;
use quire_collab::{fetch_templates, history, open_document, ClientConfig, SessionError};
use quire_core::to_html;

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Quire collaborative document client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server URL (overrides QUIRE_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the colorized diff of a history entry as HTML
    History {
        doc_id: Uuid,

        /// Entry to show, 0 = most recent
        #[arg(long, default_value_t = 0)]
        index: usize,
    },

    /// List the template catalog, newest first
    Templates,

    /// Merge a template into a document and print the result as HTML
    InsertTemplate {
        doc_id: Uuid,
        template_id: Uuid,

        /// Insertion point, defaults to the end of the document
        #[arg(long)]
        cursor: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(server) = cli.server {
        config = config.with_server_url(server);
    }
    info!("Using server {}", config.server_url);

    match run(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: &ClientConfig) -> Result<ExitCode, SessionError> {
    match command {
        Commands::History { doc_id, index } => {
            let mut view = history::load(config, doc_id).await?;
            if view.snapshots().is_empty() {
                eprintln!("no history for {doc_id}");
                return Ok(ExitCode::FAILURE);
            }
            view.select(index)?;
            println!("{}", view.rendered_html());
        }
        Commands::Templates => {
            for template in fetch_templates(config).await? {
                println!("{}\t{}\t{}", template.id, template.timestamp, template.name);
            }
        }
        Commands::InsertTemplate {
            doc_id,
            template_id,
            cursor,
        } => {
            let handle = open_document(config, doc_id);
            let merged = async {
                handle.wait_live().await?;
                if let Some(cursor) = cursor {
                    handle.set_cursor(cursor).await?;
                }
                Ok::<bool, SessionError>(handle.insert_template(template_id).await?)
            };
            let merged = timeout(REQUEST_TIMEOUT, merged)
                .await
                .unwrap_or(Err(SessionError::Timeout));
            let document = handle.document();
            handle.close().await;

            if !merged? {
                eprintln!("template {template_id} not found");
                return Ok(ExitCode::FAILURE);
            }
            println!("{}", to_html(&document));
        }
    }
    Ok(ExitCode::SUCCESS)
}

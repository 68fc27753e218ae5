//! AnyLink bridge: drives the link controller over JSON lines.
//!
//! Loads a seeded document, then reads one panel message per stdin line
//! and writes every message the controller publishes to stdout.

mod store;

use anyhow::Context;
use anylink_core::LinkConfig;
use anylink_engine::memory::DocumentSeed;
use anylink_engine::{LinkController, LinkStorage, MemoryDocument, UiMessage};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use store::FileStorage;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "anylink-bridge", about = "Attach hyperlinks to document objects through JSON messages")]
struct Cli {
    /// JSON document seed to load.
    seed: PathBuf,

    /// JSON file overriding the link configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// File persisting link records across runs.
    #[arg(long)]
    store: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    let seed_text = tokio::fs::read_to_string(&cli.seed)
        .await
        .with_context(|| format!("reading seed {}", cli.seed.display()))?;
    let seed: DocumentSeed = serde_json::from_str(&seed_text)
        .with_context(|| format!("parsing seed {}", cli.seed.display()))?;

    let config = match &cli.config {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config {}", path.display()))?;
            LinkConfig::from_json(&text).map_err(anyhow::Error::msg)?
        }
        None => LinkConfig::default(),
    };

    let storage = match cli.store {
        Some(path) => FileStorage::open(path).await?,
        None => FileStorage::in_memory(),
    };

    info!("loaded document {:?} with {} page(s)", seed.name, seed.pages.len());
    let controller = LinkController::new(MemoryDocument::from_seed(&seed), storage, config);
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    run(controller, stdin, &mut stdout).await
}

/// Initialize the controller, then answer each input line in order.
///
/// Malformed lines and failed commands are logged and skipped; only I/O
/// errors end the loop.
async fn run<S, R, W>(
    mut controller: LinkController<MemoryDocument, S>,
    input: R,
    output: &mut W,
) -> anyhow::Result<()>
where
    S: LinkStorage,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(e) = controller.initialize().await {
        warn!("initialize: {e}");
    }
    flush(&mut controller, output).await?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<UiMessage>(&line) {
            Ok(message) => {
                if let Err(e) = controller.handle(message).await {
                    warn!("{e}");
                }
            }
            Err(e) => warn!("skipping message: {e}"),
        }
        flush(&mut controller, output).await?;
    }
    Ok(())
}

async fn flush<S, W>(controller: &mut LinkController<MemoryDocument, S>, output: &mut W) -> anyhow::Result<()>
where
    S: LinkStorage,
    W: AsyncWrite + Unpin,
{
    for message in controller.drain_messages() {
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
    }
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn seed() -> DocumentSeed {
        serde_json::from_value(json!({
            "name": "Bridge",
            "fileKey": "BRIDGE",
            "pages": [{
                "id": "0:1",
                "name": "Page 1",
                "nodes": [
                    { "id": "1:2", "name": "Button", "kind": "rect", "width": 80, "height": 40 }
                ]
            }]
        }))
        .unwrap()
    }

    async fn transcript(storage: FileStorage, input: &str) -> Vec<Value> {
        let controller = LinkController::new(MemoryDocument::from_seed(&seed()), storage, LinkConfig::default());
        let mut out = Vec::new();
        run(controller, input.as_bytes(), &mut out).await.unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn types(messages: &[Value]) -> Vec<&str> {
        messages.iter().filter_map(|m| m["type"].as_str()).collect()
    }

    #[tokio::test]
    async fn initialize_publishes_list_and_selection() {
        let out = transcript(FileStorage::in_memory(), "").await;
        assert_eq!(types(&out), vec!["linksListUpdate", "selectionUpdate"]);
        assert_eq!(out[0]["activeDocumentName"], "Bridge");
        assert_eq!(out[0]["links"], json!([]));
    }

    #[tokio::test]
    async fn add_link_round_trip() {
        let input = concat!(
            r#"{"type":"selectionChange","ids":["1:2"]}"#,
            "\n",
            r#"{"type":"addLink","url":"example.com"}"#,
            "\n",
        );
        let out = transcript(FileStorage::in_memory(), input).await;

        let list = out
            .iter()
            .rev()
            .find(|m| m["type"] == "linksListUpdate")
            .unwrap();
        let links = list["links"].as_array().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0]["url"], "https://example.com");
    }

    #[tokio::test]
    async fn bad_lines_are_skipped() {
        let input = "not json\n{\"type\":\"nope\"}\n\n{\"type\":\"refreshLinks\"}\n";
        let out = transcript(FileStorage::in_memory(), input).await;
        assert_eq!(types(&out).last(), Some(&"linksListUpdate"));
    }

    #[tokio::test]
    async fn links_persist_in_the_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.json");
        let input = concat!(
            r#"{"type":"selectionChange","ids":["1:2"]}"#,
            "\n",
            r#"{"type":"addLink","url":"https://a.io"}"#,
            "\n",
        );
        transcript(FileStorage::open(path.clone()).await.unwrap(), input).await;

        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let records = saved["anylink_links_BRIDGE"].as_object().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records["1:2"]["url"], "https://a.io");
    }
}

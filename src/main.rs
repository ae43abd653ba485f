mod config;
mod logging;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use futures::StreamExt;
use gqlkit::{Client, EchoTransport, Variables};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gqlkit")]
#[command(about = "Run GraphQL queries with reusable fragments")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/gqlkit/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// GraphQL endpoint URL
  #[arg(short, long, global = true)]
  endpoint: Option<String>,

  /// Print the composed operation instead of sending it
  #[arg(long, global = true)]
  dry_run: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run a query once
  Query(Operation),
  /// Run a mutation given as a selection set
  Mutate(Operation),
  /// Watch a query, refetching it periodically, until interrupted
  Watch {
    #[command(flatten)]
    operation: Operation,

    /// Seconds between refetches
    #[arg(long, default_value_t = 30)]
    interval: u64,
  },
}

#[derive(clap::Args, Debug)]
struct Operation {
  /// File containing the operation, or `-` for stdin
  input: PathBuf,

  /// Variables as a JSON object
  #[arg(long)]
  vars: Option<String>,

  /// File with a named fragment definition (repeatable)
  #[arg(long = "fragment")]
  fragments: Vec<PathBuf>,
}

impl Operation {
  fn text(&self) -> Result<String> {
    read_input(&self.input)
  }

  fn variables(&self) -> Result<Variables> {
    match &self.vars {
      Some(json) => {
        serde_json::from_str(json).map_err(|e| eyre!("--vars must be a JSON object: {}", e))
      }
      None => Ok(Variables::new()),
    }
  }

  fn register_fragments(&self, client: &Client) -> Result<()> {
    for path in &self.fragments {
      let text = read_input(path)?;
      let name = declared_name(&text)
        .ok_or_else(|| eyre!("{} does not declare a fragment name", path.display()))?;
      client.register_fragment(name, &text)?;
      info!(fragment = name, file = %path.display(), "Loaded fragment");
    }
    Ok(())
  }
}

fn read_input(path: &Path) -> Result<String> {
  if path == Path::new("-") {
    let mut text = String::new();
    std::io::stdin()
      .read_to_string(&mut text)
      .map_err(|e| eyre!("Failed to read stdin: {}", e))?;
    return Ok(text);
  }

  std::fs::read_to_string(path).map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))
}

/// The name in `fragment <name> on <Type>`, if the fragment declares one.
fn declared_name(text: &str) -> Option<&str> {
  let mut words = text.split_whitespace();
  words.find(|w| *w == "fragment")?;
  words.next().filter(|name| *name != "on")
}

fn print_value(value: &Value) -> Result<()> {
  match value {
    // Dry runs echo the composed text back
    Value::String(text) => println!("{text}"),
    other => println!("{}", serde_json::to_string_pretty(other)?),
  }
  Ok(())
}

async fn watch(client: &Client, query: &str, vars: &Variables, interval: u64) -> Result<()> {
  let mut watched = client.watch(query, vars)?;
  let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
  // The first tick completes immediately and the initial fetch is already running
  ticker.tick().await;

  let ctrl_c = tokio::signal::ctrl_c();
  tokio::pin!(ctrl_c);

  loop {
    tokio::select! {
      _ = &mut ctrl_c => break,
      _ = ticker.tick() => client.refetch_query(query, vars)?,
      update = watched.next() => match update {
        Some(Ok(payload)) => print_value(&payload)?,
        Some(Err(error)) => eprintln!("error: {error}"),
        None => break,
      },
    }
  }

  watched.stop();
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _guard = logging::init(&config.logging)?;

  let client = if args.dry_run {
    Client::from_shared(Arc::new(EchoTransport::new()), config.client_config())
  } else {
    let transport = config.http_transport(args.endpoint.as_deref())?;
    Client::from_shared(Arc::new(transport), config.client_config())
  };

  match &args.command {
    Command::Query(op) => {
      op.register_fragments(&client)?;
      let payload = client.query(&op.text()?, &op.variables()?).await?;
      print_value(&payload)?;
    }
    Command::Mutate(op) => {
      op.register_fragments(&client)?;
      let payload = client.mutate(&op.text()?, &op.variables()?).await?;
      print_value(&payload)?;
    }
    Command::Watch {
      operation,
      interval,
    } => {
      operation.register_fragments(&client)?;
      watch(&client, &operation.text()?, &operation.variables()?, *interval).await?;
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_declared_name() {
    assert_eq!(declared_name("fragment post on Post { title }"), Some("post"));
    assert_eq!(declared_name("\n  fragment\n  post on Post {}"), Some("post"));
    assert_eq!(declared_name("fragment on Post { title }"), None);
    assert_eq!(declared_name("{ posts { title } }"), None);
  }

  #[test]
  fn test_args_parse() {
    let args = Args::try_parse_from([
      "gqlkit",
      "watch",
      "query.graphql",
      "--vars",
      r#"{"id": 1}"#,
      "--fragment",
      "post.graphql",
      "--interval",
      "5",
      "--dry-run",
    ])
    .unwrap();

    assert!(args.dry_run);
    match args.command {
      Command::Watch {
        operation,
        interval,
      } => {
        assert_eq!(interval, 5);
        assert_eq!(operation.fragments, vec![PathBuf::from("post.graphql")]);
        assert_eq!(operation.variables().unwrap()["id"], 1);
      }
      other => panic!("unexpected command {other:?}"),
    }
  }

  #[test]
  fn test_invalid_vars() {
    let op = Operation {
      input: PathBuf::from("-"),
      vars: Some("[1, 2]".into()),
      fragments: Vec::new(),
    };
    assert!(op.variables().is_err());
  }
}

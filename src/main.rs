//! authdb command line: push the schema, print it, or count rows

mod cli;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value as JsonValue};

use authdb::{Client, ClientConfig, db, logging};

use crate::cli::{CliOptions, Command, USAGE};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let options = match CliOptions::from_args() {
        Ok(options) => options,
        Err(e) => bail!("{}\n\n{}", e, USAGE),
    };

    let command = match options.command {
        None | Some(Command::Help) => {
            println!("{}", USAGE);
            return Ok(());
        }
        Some(command) => command,
    };

    if command == Command::Schema {
        print!("{}", db::schema_ddl());
        return Ok(());
    }

    let mut config = ClientConfig::from_env().context("Failed to load configuration")?;
    if let Some(url) = options.database_url {
        config.database_url = url;
    }

    let client = Client::connect(config)
        .await
        .context("Failed to connect to the database")?;

    match command {
        Command::Push => {
            let result = client.push_schema().await;
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("Failed to encode sync result")?
            );
            if !result.errors.is_empty() {
                client.disconnect().await;
                bail!("schema push finished with {} errors", result.errors.len());
            }
        }
        Command::Stats => {
            let counts = stats(&client).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&counts).context("Failed to encode stats")?
            );
        }
        Command::Schema | Command::Help => {}
    }

    client.disconnect().await;
    Ok(())
}

/// Row count of every table, keyed by model name
async fn stats(client: &Client) -> Result<JsonValue> {
    let counts = client
        .row_counts()
        .await
        .context("Failed to count rows")?;

    let mut map = Map::new();
    for (model, count) in counts {
        map.insert(model.to_string(), JsonValue::from(count));
    }
    Ok(JsonValue::Object(map))
}

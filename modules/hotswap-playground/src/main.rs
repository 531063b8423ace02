use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hotswap_core::{
    load_config, Action, App, AppOptions, EffectOptions, Hooks, Model, RuntimeConfig, Unlisten,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hotswap-playground", about = "Inject and remove models on a live store")]
struct Cli {
    /// Path to config TOML file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn counter() -> Model {
    Model::new("count")
        .state(json!(0))
        .reducer("add", |state, action| {
            json!(state.as_i64().unwrap_or(0) + action.payload.as_i64().unwrap_or(1))
        })
        .effect_with("addLater", EffectOptions::take_latest(), |action, ctx| async move {
            if ctx.delay(Duration::from_millis(100)).await {
                ctx.put(Action::new("add").with_payload(action.payload))?;
            }
            Ok(())
        })
}

fn feed() -> Model {
    Model::new("feed")
        .state(json!([]))
        .reducer("received", |state, action| {
            let mut items = state.as_array().cloned().unwrap_or_default();
            items.push(action.payload.clone());
            Value::Array(items)
        })
        .subscription("socket", |ctx| {
            ctx.dispatch
                .send("received", json!("hello"))
                .ok()?;
            Some(Unlisten::new(|| {
                tracing::info!("Feed socket closed");
                Ok(())
            }))
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Could not load config: {}", path.display()))?,
        None => RuntimeConfig::default(),
    };

    let app = App::new(AppOptions::builder().config(config).build());
    app.use_hooks(Hooks::new().on_error(|err, _| {
        tracing::error!(error = %err, "Effect failed");
    }))?;
    app.model(counter())?;
    app.start()?;

    app.dispatch(Action::new("count/add").with_payload(json!(2)))?;
    for n in 1..=3 {
        app.dispatch(Action::new("count/addLater").with_payload(json!(n)))?;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    tracing::info!(state = %app.state()?, "After counter effects");

    app.model(feed())?;
    tracing::info!(state = %app.state()?, "After injecting feed");

    app.unmodel("feed")?;
    tracing::info!(state = %app.state()?, "After removing feed");

    println!("{}", serde_json::to_string_pretty(&app.state()?)?);
    Ok(())
}

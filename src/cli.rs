use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::app_state::{predictor_from_config, AppState};
use crate::auth::hash_password;
use crate::classifier::ModelFamily;
use crate::config::{figment, load_config, LogFormat, TierConfig, CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE};
use crate::logging::init_tracing;
use crate::story::StoryForm;
use crate::vocabulary::Field;
use crate::web::build_router;

/// Top-level CLI for the viewership tier service
#[derive(Parser)]
#[command(name = "story_tier", version, about = "Hindi news story viewership tier prediction")]
pub struct Cli {
    /// Configuration file (defaults to $STORY_TIER_CONFIG or story_tier.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the login-gated prediction form
    Serve {
        /// Host/IP to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to bind
        #[arg(long)]
        port: Option<u16>,
    },

    /// Predict the tier of one story and print it
    Predict {
        #[command(flatten)]
        story: StoryArgs,
        /// Print the full prediction as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load the encoders and all ten models, then report
    CheckArtifacts,

    /// Print a bcrypt hash for the users file
    HashPassword {
        password: String,
        #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
        cost: u32,
    },
}

#[derive(Args)]
pub struct StoryArgs {
    #[arg(long)]
    pub genre: String,
    #[arg(long)]
    pub geography: String,
    /// H, M or L
    #[arg(long)]
    pub personality_popularity: String,
    #[arg(long)]
    pub personality_genre: String,
    #[arg(long)]
    pub logistics: String,
    #[arg(long)]
    pub story_format: String,
}

impl From<StoryArgs> for StoryForm {
    fn from(args: StoryArgs) -> Self {
        Self {
            genre: args.genre,
            geography: args.geography,
            personality_popularity: args.personality_popularity,
            personality_genre: args.personality_genre,
            logistics: args.logistics,
            story_format: args.story_format,
        }
    }
}

fn config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Unvalidated config for commands that never touch sessions or audit.
fn read_config(path: &std::path::Path) -> anyhow::Result<TierConfig> {
    figment(path)
        .extract()
        .with_context(|| format!("reading configuration from {}", path.display()))
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = config_path(cli.config);

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = load_config(Some(path.as_path()))?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            init_tracing(&config.log_level, config.log_format);
            serve(config).await
        }
        Commands::Predict { story, json } => {
            let config = read_config(&path)?;
            init_tracing(&config.log_level, config.log_format);
            let story = StoryForm::from(story).into_attributes()?;
            let predictor = Arc::new(predictor_from_config(&config)?);
            let prediction = predictor.predict_async(story).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            } else {
                for field in Field::ALL {
                    println!(
                        "{:<24} {:<32} model3={} model4={}",
                        field.column(),
                        prediction.story.value(field),
                        prediction.encoded.model3.code(field),
                        prediction.encoded.model4.code(field),
                    );
                }
                println!("{}", prediction.result.tier.headline());
            }
            Ok(())
        }
        Commands::CheckArtifacts => {
            let config = read_config(&path)?;
            init_tracing(&config.log_level, config.log_format);
            config.weights()?;
            let predictor = predictor_from_config(&config)?;
            let encoder = predictor.encoder();
            for field in Field::ALL {
                println!(
                    "{:<24} model3 classes={:<3} model4 classes={}",
                    field.column(),
                    encoder.table(ModelFamily::Model3).cardinality(field),
                    encoder.table(ModelFamily::Model4).cardinality(field),
                );
            }
            let ensemble = tokio::task::spawn_blocking(move || predictor.models().ensemble()).await??;
            for id in ensemble.model_ids() {
                println!("{id} ok");
            }
            println!("{} models loaded from {}", ensemble.model_ids().len(), config.artifacts.models_dir.display());
            Ok(())
        }
        Commands::HashPassword { password, cost } => {
            init_tracing("warn", LogFormat::Pretty);
            println!("{}", hash_password(&password, cost)?);
            Ok(())
        }
    }
}

async fn serve(config: TierConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let state = tokio::task::spawn_blocking(move || AppState::from_config(config))
        .await?
        .context("initialising application state")?;

    let app = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "serving story tier predictions");
    axum::serve(listener, app).await?;
    Ok(())
}

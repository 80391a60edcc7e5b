use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use launchpad_sso::auth::claims;
use launchpad_sso::{api, build_pipeline, config};

#[derive(Parser)]
#[command(name = "launchpad-sso")]
#[command(about = "SSO identity and authorization resolution service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the SSO resolution server (public + admin listeners)
    Serve {
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Bind address for the admin API (internal / trusted only)
        #[arg(long, default_value = "127.0.0.1:8081")]
        admin_bind: String,
        /// Config file path (default: $SSO_CONFIG, then XDG, then ./sso.json)
        #[arg(long, env = "SSO_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Validate a role mapping file and print its entries
    CheckMapping {
        /// Path to the JSON mapping file
        file: PathBuf,
    },
    /// Decode a token's payload without verification and print the claims
    DecodeToken {
        /// The raw token value
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("launchpad_sso=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            admin_bind,
            config: config_path,
        } => {
            let cfg = config::load_config(config_path.as_deref())?;
            let pipeline = build_pipeline(&cfg);

            let public_app = api::create_public_router(pipeline.clone());
            let admin_app = api::create_admin_router(pipeline.clone());

            let public_listener =
                tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
            let admin_listener = tokio::net::TcpListener::bind(&admin_bind).await?;

            info!("Public server listening on http://0.0.0.0:{}", port);
            info!("Admin server listening on http://{}", admin_bind);

            tokio::try_join!(
                axum::serve(public_listener, public_app),
                axum::serve(admin_listener, admin_app),
            )?;
        }
        Commands::CheckMapping { file } => {
            let table = config::load_role_mapping(&file);
            if table.is_empty() {
                println!("No usable entries in {}", file.display());
                return Ok(());
            }

            println!("{} mapping entries:", table.len());
            let mut entries: Vec<_> = table.iter().collect();
            entries.sort();
            for (origin, target) in entries {
                println!("  {} -> {}", origin, target);
            }
        }
        Commands::DecodeToken { token } => {
            let decoded = claims::decode(&token);
            if decoded.is_empty() {
                println!("Token payload could not be decoded (or carries no claims)");
                return Ok(());
            }

            println!("{}", serde_json::to_string_pretty(&decoded)?);
        }
    }

    Ok(())
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use codepad::auth::TokenGenerator;
use codepad::config::{EmailConfig, ExecutionConfig, ServerConfig};
use codepad::exec::Judge0Executor;
use codepad::notify::EmailJsNotifier;
use codepad::server::{AppState, create_router};
use codepad::store::{SqliteStore, Store};
use codepad::types::Identity;

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "codepad")]
#[command(about = "A collaborative code editor server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1", env = "CODEPAD_HOST")]
    host: String,

    /// Port to bind to
    #[arg(long, short, default_value = "8080", env = "CODEPAD_PORT")]
    port: u16,

    /// Data directory for the database
    #[arg(long, default_value = "./data", env = "CODEPAD_DATA_DIR")]
    data_dir: PathBuf,

    /// Public base URL used in invitation links (e.g., "https://codepad.example.com").
    /// Defaults to the bind address.
    #[arg(long, env = "CODEPAD_PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    /// EmailJS service id. Email is only logged unless service, template and key are all set.
    #[arg(long, env = "EMAILJS_SERVICE_ID")]
    emailjs_service_id: Option<String>,

    /// EmailJS template id
    #[arg(long, env = "EMAILJS_TEMPLATE_ID")]
    emailjs_template_id: Option<String>,

    /// EmailJS public key
    #[arg(long, env = "EMAILJS_PUBLIC_KEY", hide_env_values = true)]
    emailjs_public_key: Option<String>,

    /// Judge0 RapidAPI key. Code execution is disabled when unset.
    #[arg(long, env = "JUDGE0_API_KEY", hide_env_values = true)]
    judge0_api_key: Option<String>,

    /// Judge0 base URL
    #[arg(long, env = "JUDGE0_URL")]
    judge0_url: Option<String>,

    /// Value for the x-rapidapi-host header
    #[arg(long, env = "JUDGE0_HOST")]
    judge0_host: Option<String>,
}

impl ServeArgs {
    fn into_config(self) -> ServerConfig {
        let email = match (
            self.emailjs_service_id,
            self.emailjs_template_id,
            self.emailjs_public_key,
        ) {
            (Some(service), Some(template), Some(key)) => {
                Some(EmailConfig::new(service, template, key))
            }
            _ => None,
        };

        let execution = self.judge0_api_key.map(|key| {
            let mut config = ExecutionConfig::rapidapi(key);
            if let Some(url) = self.judge0_url {
                config.base_url = url;
            }
            if let Some(host) = self.judge0_host {
                config.api_host = host;
            }
            config
        });

        ServerConfig {
            host: self.host,
            port: self.port,
            data_dir: self.data_dir,
            public_base_url: self.public_base_url,
            email,
            execution,
        }
    }
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and admin token)
    Init {
        /// Data directory for the database
        #[arg(long, default_value = "./data", env = "CODEPAD_DATA_DIR")]
        data_dir: PathBuf,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },
}

fn run_init(data_dir: &Path, non_interactive: bool) -> anyhow::Result<()> {
    fs::create_dir_all(data_dir)?;

    let config = ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..ServerConfig::default()
    };
    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let token_file = data_dir.join(".admin_token");

    if store.has_admin_token()? {
        bail!(
            "Server already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    let generator = TokenGenerator::new();
    let issued = generator.issue(None, None)?;

    store.create_token(&issued.token)?;
    fs::write(&token_file, &issued.raw)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!();
    println!("========================================");
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {}", issued.raw);
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    if !non_interactive {
        create_first_identity_prompt(&store, &generator)?;
    }

    Ok(())
}

fn create_first_identity_prompt(
    store: &SqliteStore,
    generator: &TokenGenerator,
) -> anyhow::Result<()> {
    let create = inquire::Confirm::new("Would you like to create a first user?")
        .with_default(false)
        .prompt()?;

    if !create {
        return Ok(());
    }

    let email = inquire::Text::new("Email:")
        .with_validator(|input: &str| {
            let input = input.trim();
            if input.is_empty() || !input.contains('@') {
                Err("Enter a valid email address".into())
            } else {
                Ok(inquire::validator::Validation::Valid)
            }
        })
        .prompt()?;

    let display_name = inquire::Text::new("Display name:")
        .with_default(email.trim())
        .prompt()?;

    let identity = Identity {
        uid: Uuid::new_v4().to_string(),
        email: email.trim().to_string(),
        display_name,
        created_at: Utc::now(),
    };
    store.create_identity(&identity)?;

    let issued = generator.issue(Some(&identity.uid), None)?;
    store.create_token(&issued.token)?;

    println!();
    println!("========================================");
    println!("Created user '{}' with token:", identity.email);
    println!();
    println!("  {}", issued.raw);
    println!();
    println!("========================================");
    println!();

    Ok(())
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let token_file = config.data_dir.join(".admin_token");
    if !token_file.exists() {
        bail!(
            "Server not initialized. Run 'codepad admin init' first to create the database and admin token."
        );
    }

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    if !store.has_admin_token()? {
        bail!(
            "Server not initialized. Run 'codepad admin init' first to create the database and admin token."
        );
    }

    info!("Admin token available at {}", token_file.display());

    let mut state = AppState::new(Arc::new(store), config.base_url());

    match &config.email {
        Some(email) => {
            state = state.with_notifier(Arc::new(EmailJsNotifier::new(email.clone())?));
            info!("Email notifications enabled");
        }
        None => info!("No email service configured; notifications will be logged"),
    }

    match &config.execution {
        Some(execution) => {
            state = state.with_executor(Arc::new(Judge0Executor::new(execution.clone())?));
            info!("Code execution enabled via {}", execution.base_url);
        }
        None => info!("No execution service configured; run requests will be rejected"),
    }

    let app = create_router(Arc::new(state));
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("codepad=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                non_interactive,
            } => run_init(&data_dir, non_interactive)?,
        },
        Commands::Serve(args) => serve(args.into_config()).await?,
    }

    Ok(())
}

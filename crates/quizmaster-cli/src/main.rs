//! Quiz Master CLI - a terminal front end for the Quiz Master service.
//!
//! Each invocation behaves like one page load: the persisted session is
//! picked up, the router lands on the requested view, and the command runs
//! through the same guarded, intercepted gateway a browser front end uses.

mod cli;

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quizmaster_core::api::{DirectorySaver, ExportKind, Filters};
use quizmaster_core::models::RegisterRequest;
use quizmaster_core::router::Navigation;
use quizmaster_core::{ApiClient, ApiError, Config, CredentialStore, Navigator, Router};

use cli::{Cli, Command, ExportTarget};

/// Log file name inside the cache directory
const LOG_FILE: &str = "quizmaster.log";

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = Config::cache_dir()
        .ok()
        .filter(|dir| std::fs::create_dir_all(dir).is_ok())
        .map(|dir| {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (fmt::layer().with_ansi(false).with_writer(writer), guard)
        });
    let (file_layer, guard) = match file_layer {
        Some((layer, guard)) => (Some(layer), Some(guard)),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

/// Everything one invocation needs, wired together once.
struct App {
    config: Config,
    store: Arc<CredentialStore>,
    router: Arc<Router>,
    api: ApiClient,
}

impl App {
    fn new(config: Config, landing: &str) -> Result<Self> {
        let store = Arc::new(CredentialStore::open(config.storage_backend()?));
        let router = Arc::new(Router::new(config.route_table()?, store.clone()));
        let api = ApiClient::from_config(&config, store.clone(), router.clone())?;

        let landed = router
            .push(landing)
            .with_context(|| format!("Cannot open {}", landing))?;
        debug!(path = %landed.path, route = %landed.route, "Landed");

        Ok(Self {
            config,
            store,
            router,
            api,
        })
    }

    async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Login { username } => self.login(username).await,
            Command::Register {
                username,
                email,
                full_name,
                qualification,
                date_of_birth,
            } => {
                let password = rpassword::prompt_password("Password: ")?;
                let registration = RegisterRequest {
                    username,
                    email,
                    password,
                    full_name,
                    qualification,
                    date_of_birth,
                };
                let auth = self.api.register(&registration).await?;
                println!("Registered and signed in as {}", auth.user.display_name());
                self.land_home(auth.user.is_admin);
                Ok(())
            }
            Command::Logout => {
                self.api.logout().await;
                self.router.push("/login")?;
                println!("Logged out");
                Ok(())
            }
            Command::Profile => print_json(&serde_json::to_value(self.api.profile().await?)?),
            Command::Status => {
                self.print_status();
                Ok(())
            }
            Command::Navigate { path } => {
                let navigation = self.router.push(&path)?;
                print_navigation(&navigation);
                Ok(())
            }
            Command::Routes => {
                for route in self.router.routes().iter() {
                    let r = route.requirements();
                    let mut flags = Vec::new();
                    if r.requires_guest {
                        flags.push("guest");
                    }
                    if r.requires_auth {
                        flags.push("auth");
                    }
                    if r.requires_admin {
                        flags.push("admin");
                    }
                    if r.requires_user {
                        flags.push("user");
                    }
                    println!("{:<22} {:<20} {}", route.path(), route.name(), flags.join(","));
                }
                Ok(())
            }
            Command::List { kind, filters } => {
                print_json(&self.api.list(kind, &to_filters(filters)).await?)
            }
            Command::Get { kind, id } => print_json(&self.api.get(kind, id).await?),
            Command::Create { kind, payload } => {
                print_json(&self.api.create(kind, parse_payload(&payload)?).await?)
            }
            Command::Update { kind, id, payload } => {
                print_json(&self.api.update(kind, id, parse_payload(&payload)?).await?)
            }
            Command::Delete { kind, id } => print_json(&self.api.delete(kind, id).await?),
            Command::Dashboard => print_json(&self.api.dashboard().await?),
            Command::Search { params } => print_json(&self.api.search(&to_filters(params)).await?),
            Command::Attempt { quiz_id } => {
                let navigation = self.router.push(&format!("/quiz/{}/attempt", quiz_id))?;
                if navigation.route != "QuizAttempt" {
                    print_navigation(&navigation);
                    return Ok(());
                }
                print_json(&self.api.quiz_for_attempt(quiz_id).await?)
            }
            Command::SubmitScore { payload } => {
                print_json(&self.api.submit_score(parse_payload(&payload)?).await?)
            }
            Command::Export { target, dir } => {
                let kind = match target {
                    ExportTarget::User => ExportKind::UserCsv,
                    ExportTarget::Admin => ExportKind::AdminCsv,
                };
                let saver = DirectorySaver::new(dir.unwrap_or_else(|| self.config.download_dir()));
                let saved = self.api.export(kind, &saver).await?;
                println!("Saved {} ({} bytes) to {}", saved.filename, saved.size, saved.location.display());
                Ok(())
            }
        }
    }

    async fn login(&self, username: Option<String>) -> Result<()> {
        let username = match username {
            Some(username) => username,
            None => prompt("Username: ")?,
        };
        let password = rpassword::prompt_password("Password: ")?;

        let auth = self.api.login(&username, &password).await?;
        println!("Logged in as {}", auth.user.display_name());
        self.land_home(auth.user.is_admin);
        Ok(())
    }

    /// After signing in, admins start on the admin dashboard.
    fn land_home(&self, is_admin: bool) {
        let home = if is_admin { "/admin" } else { "/dashboard" };
        match self.router.push(home) {
            Ok(navigation) => print_navigation(&navigation),
            Err(e) => eprintln!("Warning: {}", e),
        }
    }

    fn print_status(&self) {
        let snapshot = self.store.snapshot();
        if !snapshot.authenticated {
            println!("Not logged in");
        } else {
            let name = self
                .store
                .get_identity()
                .map(|identity| identity.display_name().to_string())
                .unwrap_or_else(|| "unknown user".to_string());
            let role = if snapshot.is_admin { "admin" } else { "user" };
            println!("Logged in as {} ({})", name, role);
        }
        println!("API:     {}", self.api.base_url());
        println!("Storage: {:?}", self.config.storage);
        if let Some(route) = self.router.current_route() {
            println!("View:    {}", route);
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn to_filters(pairs: Vec<(String, String)>) -> Filters {
    pairs.into_iter().collect()
}

fn parse_payload(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("Payload must be valid JSON")
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_navigation(navigation: &Navigation) {
    match navigation.redirected_from {
        Some(ref from) => println!("{} -> {} ({})", from, navigation.path, navigation.route),
        None => println!("{} ({})", navigation.path, navigation.route),
    }
}

/// Credentials the service rejected, as opposed to any other failure.
fn is_rejected_credential(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<ApiError>(), Some(ApiError::Unauthorized))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    // Started before the config is read so override warnings are recorded.
    // Held until main returns so the file writer flushes.
    let _log_guard = init_tracing();

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url.clone() {
        config.api_base_url = url;
    }
    info!(api = %config.api_base_url, "Quiz Master CLI starting");

    let app = App::new(config, &cli.at)?;
    match app.run(cli.command).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) if is_rejected_credential(&e) => {
            eprintln!("Session expired or credentials rejected - please log in again");
            Ok(ExitCode::from(2))
        }
        Err(e) => Err(e),
    }
}

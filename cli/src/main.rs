mod platform;

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use console_session::platform::SystemClock;
use console_session::{
    ApiRequest, AuthClient, AuthError, ConfigError, GuardDecision, Method, Platform, RouteGuard, RouteTable,
    SessionConfig, ThemeController, ThemeError, User,
};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use crate::platform::{FileStore, HttpTransport, TerminalNavigator, TokioScheduler};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Theme(#[from] ThemeError),
    #[error("http client setup failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("not logged in; run `login` first")]
    NotLoggedIn,
    #[error("unsupported method `{0}`; expected GET, POST, PUT or DELETE")]
    InvalidMethod(String),
    #[error("{0} was refused by the server")]
    Refused(&'static str),
    #[error("navigation to {0} blocked: no permitted view")]
    Blocked(String),
}

#[derive(Parser, Debug)]
#[command(name = "console-cli", about = "MCP Platform admin console session client")]
struct Cli {
    #[arg(long, env = "CONSOLE_API_BASE_URL")]
    base_url: Option<String>,

    /// Directory for the persistent session file and theme preference.
    #[arg(long, env = "CONSOLE_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in; the password is read from stdin when not given.
    Login(LoginArgs),
    Logout,
    /// Restore the stored session and print the user and permissions.
    Whoami,
    /// Update the account email.
    Profile {
        #[arg(long)]
        email: String,
    },
    Password {
        #[arg(long, env = "CONSOLE_OLD_PASSWORD")]
        old: String,
        #[arg(long, env = "CONSOLE_NEW_PASSWORD")]
        new: String,
    },
    /// Run the navigation guard against a route path.
    Visit {
        path: String,
    },
    /// Show, set (`dark`/`light`) or `toggle` the theme preference.
    Theme {
        value: Option<String>,
    },
    /// Restore the session and follow the countdown until it ends.
    Watch,
    /// Send an authenticated API request and print the JSON response.
    Api(ApiArgs),
}

#[derive(Args, Debug)]
struct LoginArgs {
    username: String,

    #[arg(long, env = "CONSOLE_PASSWORD")]
    password: Option<String>,

    /// Keep the token across restarts instead of only for this session.
    #[arg(long, default_value_t = false)]
    remember: bool,
}

#[derive(Args, Debug)]
struct ApiArgs {
    method: String,
    path: String,
    #[arg(long)]
    data: Option<String>,
}

struct Session {
    auth: AuthClient,
    persistent: Rc<FileStore>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let local = tokio::task::LocalSet::new();
    local.run_until(run(cli)).await
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let session = build_session(cli.base_url.as_deref(), cli.state_dir)?;

    match cli.command {
        Command::Login(args) => run_login(&session, args).await,
        Command::Logout => {
            session.auth.logout().await;
            println!("logged out");
            Ok(())
        }
        Command::Whoami => run_whoami(&session).await,
        Command::Profile { email } => {
            require_session(&session).await?;
            if !session.auth.update_profile(&email).await? {
                return Err(CliError::Refused("profile update"));
            }
            println!("profile updated");
            Ok(())
        }
        Command::Password { old, new } => {
            require_session(&session).await?;
            if !session.auth.change_password(&old, &new).await? {
                return Err(CliError::Refused("password change"));
            }
            println!("password changed");
            Ok(())
        }
        Command::Visit { path } => run_visit(&session, &path).await,
        Command::Theme { value } => run_theme(&session, value.as_deref()),
        Command::Watch => run_watch(&session).await,
        Command::Api(args) => run_api(&session, args).await,
    }
}

fn build_session(base_url: Option<&str>, state_dir: Option<PathBuf>) -> Result<Session, CliError> {
    let mut config = SessionConfig::from_env()?;
    if let Some(base_url) = base_url {
        config = config.with_base_url(base_url);
    }
    let state_dir = state_dir.unwrap_or_else(default_state_dir);
    let persistent = Rc::new(FileStore::new(state_dir.join("state.json")));
    let scoped = Rc::new(FileStore::new(std::env::temp_dir().join("console-session").join("session.json")));
    let transport = HttpTransport::new(Duration::from_secs(config.request_timeout_secs))?;
    tracing::debug!(base_url = %config.api_base_url, state = %persistent.path().display(), "session configured");

    let platform = Platform {
        persistent: persistent.clone(),
        scoped,
        transport: Rc::new(transport),
        navigator: Rc::new(TerminalNavigator::new(&config.landing_path)),
        clock: Rc::new(SystemClock),
        scheduler: Rc::new(TokioScheduler),
    };
    Ok(Session { auth: AuthClient::new(config, platform), persistent })
}

fn default_state_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".console-session"))
        .unwrap_or_else(|| std::env::temp_dir().join("console-session-state"))
}

async fn require_session(session: &Session) -> Result<User, CliError> {
    if session.auth.token().is_none() {
        return Err(CliError::NotLoggedIn);
    }
    session.auth.fetch_current_user().await.ok_or(CliError::NotLoggedIn)
}

async fn run_login(session: &Session, args: LoginArgs) -> Result<(), CliError> {
    let password = match args.password {
        Some(password) => password,
        None => read_password()?,
    };
    let user = session.auth.login(&args.username, &password, args.remember).await?;
    println!("logged in as {} ({})", user.username, join_roles(&user));
    Ok(())
}

fn read_password() -> Result<String, CliError> {
    eprint!("password: ");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

async fn run_whoami(session: &Session) -> Result<(), CliError> {
    let user = require_session(session).await?;
    let permissions = session.auth.permissions();
    let pages: Vec<&str> = permissions.pages.iter().map(|p| p.code.as_str()).collect();
    let functions: Vec<&str> = permissions.functions.iter().map(|f| f.code.as_str()).collect();
    print_json(&json!({
        "user": user,
        "super_admin": session.auth.has_role(&session.auth.config().super_admin_role),
        "pages": pages,
        "functions": functions,
        "remaining_secs": session.auth.remaining_secs(),
    }))
}

async fn run_visit(session: &Session, path: &str) -> Result<(), CliError> {
    let guard = RouteGuard::new(session.auth.clone(), RouteTable::platform_default());
    let decision = guard.check(path).await;
    println!("{}", describe_decision(&decision));
    match decision {
        GuardDecision::Blocked { path } => Err(CliError::Blocked(path)),
        _ => Ok(()),
    }
}

fn describe_decision(decision: &GuardDecision) -> String {
    match decision {
        GuardDecision::Allow { path, title } => format!("allow {path} ({title})"),
        GuardDecision::Redirect { to } => format!("redirect {to}"),
        GuardDecision::Blocked { path } => format!("blocked {path}"),
    }
}

fn run_theme(session: &Session, value: Option<&str>) -> Result<(), CliError> {
    let controller = ThemeController::new(session.persistent.clone(), |_| {});
    controller.init();
    let theme = match value {
        None => controller.current(),
        Some("toggle") => controller.toggle(),
        Some(name) => controller.set(name)?,
    };
    println!("{theme}");
    Ok(())
}

async fn run_watch(session: &Session) -> Result<(), CliError> {
    let user = require_session(session).await?;
    eprintln!("watching session for {}; ctrl-c to stop", user.username);
    session.auth.subscribe(|snapshot| {
        if snapshot.authenticated {
            eprint!("\rsession ends in {}   ", format_remaining(snapshot.remaining_secs));
        }
    });

    let auth = session.auth.clone();
    let ended = async move {
        while auth.is_authenticated() {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    };
    tokio::select! {
        () = ended => eprintln!("\nsession ended"),
        result = tokio::signal::ctrl_c() => {
            result?;
            eprintln!();
        }
    }
    Ok(())
}

fn format_remaining(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

async fn run_api(session: &Session, args: ApiArgs) -> Result<(), CliError> {
    let method = parse_method(&args.method)?;
    let body = args.data.as_deref().map(serde_json::from_str::<Value>).transpose()?;
    let request = ApiRequest { method, path: args.path, body };
    let response = session.auth.api().send(request).await?;
    print_json(&response.body)
}

fn parse_method(raw: &str) -> Result<Method, CliError> {
    match raw.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::Get),
        "POST" => Ok(Method::Post),
        "PUT" => Ok(Method::Put),
        "DELETE" => Ok(Method::Delete),
        _ => Err(CliError::InvalidMethod(raw.to_owned())),
    }
}

fn join_roles(user: &User) -> String {
    let roles: Vec<&str> = user.roles.iter().collect();
    if roles.is_empty() { "no roles".to_owned() } else { roles.join(", ") }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

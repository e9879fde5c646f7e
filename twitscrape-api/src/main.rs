use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use server::ServerState;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use thiserror::Error;
use tokio::sync::{mpsc::UnboundedReceiver, watch};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twitscrape_client::{
    ClientError,
    batch::BatchFetcher,
    config::{ClientConfig, DEFAULT_BATCH_COUNT, DEFAULT_USER_AGENT, WEB_BEARER_TOKEN},
    query::QueryExecutor,
    stream::{PostStream, StreamOptions},
    timeline::last_posts,
    transport::{GuestTransport, TransportError},
};
use twitscrape_common::{
    model::{ModelValidationError, post::Post, user::ScreenName},
    util::PositiveDuration,
};

mod relay;
mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid polling interval of {0} minutes")]
    InvalidMinutes(f64),
    #[error(transparent)]
    Model(#[from] ModelValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("Error building async runtime: {0}")]
    Runtime(std::io::Error),
    #[error("Error spawning stream worker: {0}")]
    Worker(std::io::Error),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
#[serde(default)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    post_count: usize,
    polling_seconds: u64,
    batch_count: u32,
    proxy_url: Option<String>,
    bearer_token: String,
    user_agent: String,
    relay_poll_millis: u64,
}

impl Default for Env {
    fn default() -> Self {
        Self {
            server_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            server_port: 8000,
            post_count: 5,
            polling_seconds: 600,
            batch_count: DEFAULT_BATCH_COUNT,
            proxy_url: None,
            bearer_token: WEB_BEARER_TOKEN.to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            relay_poll_millis: 500,
        }
    }
}

impl Env {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            bearer_token: self.bearer_token.clone(),
            user_agent: self.user_agent.clone(),
            proxy_url: self.proxy_url.clone(),
            batch_count: self.batch_count,
            ..ClientConfig::default()
        }
    }

    fn relay_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay_poll_millis)
    }
}

/// Follow a user's public posts without logging in.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the most recent posts of a user, newest first.
    Get {
        user: ScreenName,
        /// Number of posts to get [default: `POST_COUNT` or 5]
        #[arg(long)]
        count: Option<usize>,
        #[command(flatten)]
        reshares: ReshareFlags,
    },
    /// Print a user's posts as they appear, oldest first.
    Stream {
        user: ScreenName,
        /// Also serve every post received so far over HTTP.
        #[arg(long)]
        serve: bool,
        /// Number of existing posts to print first [default: `POST_COUNT` or 5]
        #[arg(long)]
        count: Option<usize>,
        #[command(flatten)]
        reshares: ReshareFlags,
        /// Minutes between checks for new posts [default: `POLLING_SECONDS` / 60 or 10]
        #[arg(long)]
        minutes: Option<f64>,
    },
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Args)]
struct ReshareFlags {
    /// Include reshares.
    #[arg(long = "retweets", overrides_with = "no_retweets")]
    retweets: bool,
    /// Leave out reshares (the default).
    #[arg(long = "no-retweets", overrides_with = "retweets")]
    no_retweets: bool,
}

impl ReshareFlags {
    fn include(self) -> bool {
        self.retweets && !self.no_retweets
    }
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "twitscrape=info,\
                twitscrape_client=info,\
                twitscrape_common=info,\
                tower_http=debug,axum::rejection=trace"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

fn polling_interval(minutes: Option<f64>, env: &Env) -> Result<PositiveDuration, InitError> {
    let interval = match minutes {
        Some(minutes) => time::Duration::checked_seconds_f64(minutes * 60.0)
            .ok_or(InitError::InvalidMinutes(minutes))?,
        None => time::Duration::new(env.polling_seconds.cast_signed(), 0),
    };

    PositiveDuration::try_from(interval).map_err(|err| InitError::Model(err.into()))
}

fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;
    let cli = Cli::parse();

    let config = env.client_config();
    debug!(?config, "Using client config");
    let executor = QueryExecutor::new(GuestTransport::new(&config)?, &config);

    match cli.command {
        Command::Get {
            user,
            count,
            reshares,
        } => {
            let user_id = executor.lookup_user_id(&user)?;
            let fetcher = BatchFetcher::new(executor, config.batch_count);
            let posts = last_posts(
                &fetcher,
                user_id,
                count.unwrap_or(env.post_count),
                reshares.include(),
            )?;

            for post in posts {
                println!("{}", post.body());
            }
        }
        Command::Stream {
            user,
            serve,
            count,
            reshares,
            minutes,
        } => {
            let options = StreamOptions {
                initial_count: count.unwrap_or(env.post_count),
                polling_interval: polling_interval(minutes, &env)?.as_std(),
                include_reshares: reshares.include(),
            };
            let user_id = executor.lookup_user_id(&user)?;
            info!(%user, %user_id, "Streaming posts");
            let fetcher = BatchFetcher::new(executor, config.batch_count);
            let stream = PostStream::new(fetcher, user_id, options);

            if serve {
                serve_stream(stream, &env)?;
            } else {
                for post in stream {
                    println!("{}", post?.body());
                }
            }
        }
    }

    Ok(())
}

/// Runs `stream` on a worker thread and serves what it yields until Ctrl-C.
///
/// The runtime is built here rather than in `main` since the blocking HTTP
/// client must not run inside it.
fn serve_stream<I>(stream: I, env: &Env) -> Result<(), InitError>
where
    I: Iterator<Item = twitscrape_client::Result<Post>> + Send + 'static,
{
    let (_worker, receiver) = relay::spawn_worker(stream).map_err(InitError::Worker)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(InitError::Runtime)?
        .block_on(run_server(receiver, env))
}

async fn run_server(receiver: UnboundedReceiver<Post>, env: &Env) -> Result<(), InitError> {
    let (posts, posts_receiver) = watch::channel(Vec::new());
    let shutdown = CancellationToken::new();
    let relay = tokio::spawn(relay::relay_posts(
        receiver,
        posts,
        env.relay_poll_interval(),
        shutdown.clone(),
    ));

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::routes()
        .with_state(ServerState {
            posts: posts_receiver,
        })
        .layer(tracing_layer);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Serving received posts");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .map_err(InitError::TcpServe)?;

    shutdown.cancel();
    if let Err(err) = relay.await {
        error!(error = %err, "Relay task failed");
    }

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(err) => {
                error!(error = %err, "Could not listen for Ctrl-C");
                shutdown.cancelled().await;
            }
        },
        () = shutdown.cancelled() => {}
    }
}

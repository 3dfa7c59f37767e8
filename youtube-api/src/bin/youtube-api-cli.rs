use clap::{Parser, Subcommand};
use eyre::{Context, OptionExt};
use std::io::IsTerminal;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_api::oauth::scope;
use youtube_api::{
    AccessType, AuthRequestParams, Canceller, CaptionFormat, CaptionPart, CaptionsClient,
    ClientOptions, OAuthConfig, OAuthManager, Payload, RequestOptions, SearchClient, SearchResult,
    Token, VideoPart, VideosClient,
};

/// Manual driver for the YouTube Data API client.
#[derive(Parser, Debug)]
#[command(name = "youtube-api-cli", version, about, long_about = None)]
struct Cli {
    /// API key sent as the `key` parameter
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// OAuth access token sent as a bearer token
    #[arg(
        long,
        env = "YOUTUBE_ACCESS_TOKEN",
        hide_env_values = true,
        global = true
    )]
    access_token: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(
        long,
        env = "YOUTUBE_TIMEOUT_MS",
        default_value_t = 5000,
        global = true
    )]
    timeout_ms: u64,

    #[arg(long, env = "YOUTUBE_CLIENT_ID", global = true)]
    client_id: Option<String>,

    #[arg(
        long,
        env = "YOUTUBE_CLIENT_SECRET",
        hide_env_values = true,
        global = true
    )]
    client_secret: Option<String>,

    #[arg(
        long,
        env = "YOUTUBE_REDIRECT_URI",
        default_value = "http://localhost:5500/oauth",
        global = true
    )]
    redirect_uri: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search videos, channels and playlists
    Search {
        query: String,
        /// Number of pages to fetch
        #[arg(long, default_value_t = 1)]
        pages: usize,
        #[arg(long, default_value_t = 10)]
        max_results: u32,
        /// Stream every result instead of fetching page by page
        #[arg(long)]
        all: bool,
    },
    /// Show video resources
    Videos {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Comma-separated parts, e.g. `snippet,statistics`
        #[arg(long, value_delimiter = ',')]
        parts: Vec<VideoPart>,
    },
    /// List the caption tracks of a video
    Captions {
        video_id: String,
        /// Include track details, not just ids
        #[arg(long)]
        snippet: bool,
    },
    /// Download one caption track (needs an access token)
    Caption {
        id: String,
        format: Option<CaptionFormat>,
    },
    /// Print an authorization URL to open in a browser
    AuthUrl {
        /// Ask for a refresh token (authorization-code grant)
        #[arg(long)]
        offline: bool,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        state: Option<String>,
    },
    /// Exchange an authorization code for tokens
    Exchange { code: String },
    /// Obtain a new access token with a refresh token
    Refresh { refresh_token: String },
    /// Introspect the configured access token
    Tokeninfo,
}

impl Cli {
    /// Options shared by every command, plus `extra` request parameters.
    fn client_options(&self, extra: RequestOptions) -> eyre::Result<ClientOptions> {
        let mut params = RequestOptions::new();
        if let Some(key) = &self.api_key {
            params.set("key", key);
        }
        let options = ClientOptions::try_from(params.merged(&extra))
            .context("build client options")?
            .with_timeout(Duration::from_millis(self.timeout_ms));
        Ok(match &self.access_token {
            Some(token) => options.with_access_token(token),
            None => options,
        })
    }

    fn oauth(&self) -> eyre::Result<OAuthManager> {
        let client_id = self
            .client_id
            .clone()
            .ok_or_eyre("YOUTUBE_CLIENT_ID is required for OAuth commands")?;
        let mut config = OAuthConfig::new(client_id, &self.redirect_uri);
        if let Some(secret) = &self.client_secret {
            config = config.with_client_secret(secret);
        }
        OAuthManager::with_options(config, &self.client_options(RequestOptions::new())?)
            .context("set up OAuth manager")
    }
}

/// Cancels whatever `canceller` tracks when the user hits ctrl-c.
fn cancel_on_ctrl_c(canceller: Canceller) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("cancelling");
            canceller.cancel();
        }
    });
}

fn print_json(value: &impl serde::Serialize) -> eyre::Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}

fn print_result(result: SearchResult) {
    let id = result
        .id
        .video_id
        .or(result.id.channel_id)
        .or(result.id.playlist_id)
        .unwrap_or_default();
    let title = result.snippet.map(|s| s.title).unwrap_or_default();
    println!("{id}\t{title}");
}

fn print_token(token: &Token) -> eyre::Result<()> {
    if let Ok(at) = token.expires_at() {
        eprintln!("token valid until {at}");
    }
    print_json(token)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Search {
            query,
            pages,
            max_results,
            all,
        } => {
            let extra = RequestOptions::new().with("maxResults", *max_results);
            let mut client = SearchClient::from_options(cli.client_options(extra)?)?;
            cancel_on_ctrl_c(client.canceller());

            if *all {
                let results = client.search_all(query);
                let mut results = std::pin::pin!(results);
                while let Some(result) = results.next().await {
                    print_result(result.context("fetch search results")?);
                }
                return Ok(());
            }

            for page in 1..=*pages {
                let Some(results) = client
                    .search(query)
                    .await
                    .with_context(|| format!("fetch page {page} for {query:?}"))?
                else {
                    eprintln!("cancelled");
                    break;
                };
                if results.is_empty() {
                    eprintln!("no more results");
                    break;
                }
                eprintln!("==> page {page}");
                results.into_iter().for_each(print_result);
            }
        }
        Command::Videos { ids, parts } => {
            let client = VideosClient::from_options(cli.client_options(RequestOptions::new())?)?;
            cancel_on_ctrl_c(client.canceller());
            let ids = ids.as_slice();
            let videos = if parts.is_empty() {
                client.list(ids).await
            } else {
                eprintln!("quota cost: {}", VideoPart::total_cost(parts));
                client.list_parts(ids, parts).await
            }
            .context("list videos")?;
            match videos {
                Some(videos) => print_json(&videos)?,
                None => eprintln!("cancelled"),
            }
        }
        Command::Captions { video_id, snippet } => {
            let client = CaptionsClient::from_options(cli.client_options(RequestOptions::new())?)?;
            cancel_on_ctrl_c(client.canceller());
            let part = if *snippet {
                CaptionPart::Snippet
            } else {
                CaptionPart::Id
            };
            match client.list(video_id, part).await.context("list captions")? {
                Some(captions) => print_json(&captions)?,
                None => eprintln!("cancelled"),
            }
        }
        Command::Caption { id, format } => {
            let client = CaptionsClient::from_options(cli.client_options(RequestOptions::new())?)?;
            cancel_on_ctrl_c(client.canceller());
            match client
                .download(id, *format)
                .await
                .with_context(|| format!("download caption {id}"))?
            {
                Some(Payload::Raw { body, .. }) => {
                    print!("{}", String::from_utf8_lossy(&body));
                }
                Some(Payload::Json(value)) => print_json(&value)?,
                None => eprintln!("cancelled"),
            }
        }
        Command::AuthUrl {
            offline,
            scope: requested_scope,
            state,
        } => {
            let oauth = cli.oauth()?;
            let state = state
                .clone()
                .unwrap_or_else(|| oauth2::CsrfToken::new_random().secret().clone());
            let access_type = if *offline {
                AccessType::Offline
            } else {
                AccessType::Online
            };
            let requested = requested_scope.as_deref();
            let mut params = AuthRequestParams::new(&state, access_type)
                .with_scope(requested.unwrap_or(scope::YOUTUBE_FORCE_SSL));
            if *offline {
                // without consent, Google only issues a refresh token on first authorization
                params = params.with_prompt("consent");
            }
            let url = oauth
                .build_authorization_url(&params)
                .context("build authorization url")?;
            eprintln!("state: {state}");
            println!("{url}");
        }
        Command::Exchange { code } => {
            let oauth = cli.oauth()?;
            cancel_on_ctrl_c(oauth.canceller());
            match oauth
                .exchange_code_for_token(code)
                .await
                .context("exchange authorization code")?
            {
                Some(token) => print_token(&token)?,
                None => eprintln!("cancelled"),
            }
        }
        Command::Refresh { refresh_token } => {
            let oauth = cli.oauth()?;
            cancel_on_ctrl_c(oauth.canceller());
            match oauth
                .refresh_token(refresh_token)
                .await
                .context("refresh access token")?
            {
                Some(token) => print_token(&token)?,
                None => eprintln!("cancelled"),
            }
        }
        Command::Tokeninfo => {
            let oauth = cli.oauth()?;
            let access_token = cli
                .access_token
                .clone()
                .ok_or_eyre("YOUTUBE_ACCESS_TOKEN is required for tokeninfo")?;
            let token = Token::issued(access_token, "Bearer", None, jiff::Timestamp::now());
            match oauth
                .validate_access_token(&token)
                .await
                .context("introspect access token")?
            {
                Some(info) => {
                    println!("aud:        {}", info.aud.as_deref().unwrap_or("-"));
                    println!("scope:      {}", info.scope.as_deref().unwrap_or("-"));
                    if let Some(expires_in) = info.expires_in {
                        println!("expires_in: {expires_in}s");
                    }
                }
                None => eprintln!("cancelled"),
            }
        }
    }

    Ok(())
}

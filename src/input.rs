//! Loading documents from disk or over HTTP.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::InputError;

const TIMEOUT: Duration = Duration::from_secs(60);
const CONCURRENCY: usize = 10;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const USER_AGENT: &str = concat!("jasonify/", env!("CARGO_PKG_VERSION"));

/// Markup plus where it came from.
#[derive(Debug, Clone)]
pub struct Loaded {
    /// The path or URL as given.
    pub source: String,
    pub markup: String,
    /// Set for fetched pages; relative links resolve against it.
    pub url: Option<Url>,
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

pub fn client() -> Result<Client, InputError> {
    Client::builder()
        .timeout(TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(InputError::Client)
}

/// Load one document: an `http(s)` URL is fetched, anything else is read as a
/// file path.
pub async fn load(source: &str) -> Result<Loaded, InputError> {
    if is_remote(source) {
        fetch(&client()?, source).await
    } else {
        read_file(source).await
    }
}

/// Load many documents with at most `CONCURRENCY` fetches in flight. Results
/// come back in input order.
pub async fn load_all(
    sources: Vec<String>,
    progress: Option<&ProgressBar>,
) -> Result<Vec<Result<Loaded, InputError>>, InputError> {
    let total = sources.len();
    let client = client()?;
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let (tx, mut rx) =
        tokio::sync::mpsc::channel::<(usize, Result<Loaded, InputError>)>(CONCURRENCY * 2);

    for (i, source) in sources.iter().cloned().enumerate() {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let result = match sem.acquire().await {
                Ok(_permit) if is_remote(&source) => fetch_with_retry(&client, &source).await,
                Ok(_permit) => read_file(&source).await,
                Err(_) => return,
            };
            let _ = tx.send((i, result)).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut slots: Vec<Option<Result<Loaded, InputError>>> = (0..total).map(|_| None).collect();
    while let Some((i, result)) = rx.recv().await {
        if let Err(e) = &result {
            warn!("{}", e);
        }
        slots[i] = Some(result);
        if let Some(pb) = progress {
            pb.inc(1);
        }
    }

    let results = fill_slots(&sources, slots);
    let failed = results.iter().filter(|r| r.is_err()).count();
    info!("Loaded {} documents ({} failed)", total, failed);
    Ok(results)
}

/// One result per source, in order. A slot no task filled becomes an error
/// instead of shifting later results onto the wrong source.
fn fill_slots(
    sources: &[String],
    slots: Vec<Option<Result<Loaded, InputError>>>,
) -> Vec<Result<Loaded, InputError>> {
    sources
        .iter()
        .zip(slots)
        .map(|(source, slot)| {
            slot.unwrap_or_else(|| {
                let err = InputError::Incomplete(source.clone());
                warn!("{}", err);
                Err(err)
            })
        })
        .collect()
}

async fn read_file(path: &str) -> Result<Loaded, InputError> {
    let markup = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| InputError::Io {
            path: Path::new(path).to_path_buf(),
            source,
        })?;
    Ok(Loaded {
        source: path.to_string(),
        markup,
        url: None,
    })
}

async fn fetch(client: &Client, url: &str) -> Result<Loaded, InputError> {
    let http = |source| InputError::Http {
        url: url.to_string(),
        source,
    };

    let start = Instant::now();
    let response = client.get(url).send().await.map_err(http)?;
    let status = response.status();
    if !status.is_success() {
        return Err(InputError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    // Redirects move the base for relative links.
    let final_url = response.url().clone();
    let markup = response.text().await.map_err(http)?;
    debug!(
        url,
        bytes = markup.len(),
        latency_ms = start.elapsed().as_millis() as u64,
        "fetched"
    );

    Ok(Loaded {
        source: url.to_string(),
        markup,
        url: Some(final_url),
    })
}

fn should_retry(err: &InputError) -> bool {
    match err {
        InputError::Status { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(status)
        }
        InputError::Http { source, .. } => source.is_timeout() || source.is_connect(),
        InputError::Io { .. } | InputError::Client(_) | InputError::Incomplete(_) => false,
    }
}

async fn fetch_with_retry(client: &Client, url: &str) -> Result<Loaded, InputError> {
    let mut attempt = 0;
    loop {
        match fetch(client, url).await {
            Err(e) if should_retry(&e) && attempt < MAX_RETRIES => {
                let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                warn!(
                    "{} (attempt {}/{}), backing off {:.1}s",
                    e,
                    attempt + 1,
                    MAX_RETRIES,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

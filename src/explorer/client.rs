//!
//! HTTP client for a blockchain explorer with session management.
//!
//! This module provides an async client for a transaction-indexing explorer service. It
//! supports sync sessions (an opaque token scoping a sequence of paginated requests),
//! paginated transaction history for a set of watched addresses, and chain-head queries.
//! All methods are async and designed for use with Tokio.

use super::types::*;
use super::Explorer;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Request header carrying the explorer session token.
const SYNC_TOKEN_HEADER: &str = "X-LedgerWallet-SyncToken";

/// Blockchain explorer HTTP client
#[derive(Clone)]
pub struct HttpExplorer {
	/// The underlying HTTP client.
	http_client: Client,
	/// The base URL of the explorer service.
	base_url: String,
	/// The currency path segment, e.g. "atom".
	currency: String,
}

impl HttpExplorer {
	/// Create a new explorer client.
	///
	/// # Arguments
	/// * `base_url` - The explorer service root, e.g. `https://explorers.example.com`.
	/// * `currency` - The currency identifier used in request paths.
	pub fn new(base_url: impl Into<String>, currency: impl Into<String>) -> Self {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.expect("Failed to create HTTP client");

		Self {
			http_client,
			base_url: base_url.into(),
			currency: currency.into(),
		}
	}

	fn endpoint(&self, path: &str) -> String {
		format!(
			"{}/blockchain/v3/{}/{}",
			self.base_url.trim_end_matches('/'),
			self.currency,
			path
		)
	}

	/// Retry policy for transient failures. `4xx` responses are never retried; they are
	/// either the reorg signal (404) or a caller error.
	fn retry_policy(&self) -> ExponentialBackoff {
		ExponentialBackoff {
			max_elapsed_time: Some(Duration::from_secs(20)),
			..ExponentialBackoff::default()
		}
	}

	/// Execute a GET request and parse the JSON response, retrying transient failures
	/// (connect errors, timeouts and 5xx responses) with exponential backoff.
	async fn get_json(
		&self,
		url: &str,
		token: Option<&SessionToken>,
	) -> Result<serde_json::Value, ExplorerError> {
		let operation = || async {
			debug!("GET {}", url);
			let mut request = self.http_client.get(url);
			if let Some(token) = token {
				request = request.header(SYNC_TOKEN_HEADER, token.as_str());
			}

			let response = request.send().await.map_err(|e| {
				if e.is_connect() || e.is_timeout() {
					backoff::Error::transient(ExplorerError::HttpError(e))
				} else {
					backoff::Error::permanent(ExplorerError::HttpError(e))
				}
			})?;

			let status = response.status();
			if status.is_server_error() {
				return Err(backoff::Error::transient(ExplorerError::ApiError {
					status: status.as_u16(),
					message: status.canonical_reason().unwrap_or("server error").to_string(),
				}));
			}
			if !status.is_success() {
				let message = response.text().await.unwrap_or_default();
				return Err(backoff::Error::permanent(ExplorerError::ApiError {
					status: status.as_u16(),
					message,
				}));
			}

			response
				.json::<serde_json::Value>()
				.await
				.map_err(|e| backoff::Error::permanent(ExplorerError::HttpError(e)))
		};

		backoff::future::retry(self.retry_policy(), operation).await
	}
}

#[async_trait::async_trait]
impl Explorer for HttpExplorer {
	/// Open an explorer session and return its token.
	async fn start_session(&self) -> Result<SessionToken, ExplorerError> {
		let response = self.get_json(&self.endpoint("syncToken"), None).await?;

		let token = response
			.get("token")
			.and_then(|token| token.as_str())
			.ok_or(ExplorerError::NoData)?
			.to_string();

		info!("Started explorer session");
		Ok(SessionToken::new(token))
	}

	/// Close an explorer session. The token must not be reused afterwards.
	async fn kill_session(&self, token: &SessionToken) -> Result<(), ExplorerError> {
		let response = self
			.http_client
			.delete(self.endpoint("syncToken"))
			.header(SYNC_TOKEN_HEADER, token.as_str())
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			return Err(ExplorerError::SessionError(format!(
				"failed to close session: HTTP {}",
				status
			)));
		}

		debug!("Closed explorer session");
		Ok(())
	}

	/// Fetch one page of transaction history for the given addresses, starting after
	/// `from_height`.
	///
	/// A 404 response means the cursor block no longer exists on the chain served by the
	/// explorer; this is surfaced as [`ExplorerError::BlockNotFound`] and drives reorg
	/// recovery in the synchronizer.
	async fn get_transactions(
		&self,
		addresses: &[String],
		from_height: u64,
		token: Option<&SessionToken>,
	) -> Result<TransactionsBulk, ExplorerError> {
		let path = format!(
			"addresses/{}/transactions?from_height={}",
			addresses.join(","),
			from_height
		);

		let response = match self.get_json(&self.endpoint(&path), token).await {
			Ok(response) => response,
			Err(ExplorerError::ApiError { status: 404, .. }) => {
				return Err(ExplorerError::BlockNotFound {
					height: from_height,
				});
			}
			Err(e) => return Err(e),
		};

		let bulk: TransactionsBulk = serde_json::from_value(response)?;
		debug!(
			"Fetched {} transactions (truncated: {})",
			bulk.transactions.len(),
			bulk.has_next
		);
		Ok(bulk)
	}

	/// Fetch the current chain head.
	async fn get_current_block(&self) -> Result<Block, ExplorerError> {
		let response = self.get_json(&self.endpoint("blocks/current"), None).await?;
		let block: Block = serde_json::from_value(response)?;
		Ok(block)
	}
}

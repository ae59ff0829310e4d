//! Stock Quote Stream Client
//!
//! Connects to Alpaca's stock data stream, authenticates, subscribes to
//! quotes for the configured symbols and forwards each quote as a
//! [`QuoteObservation`].
//!
//! # Stream URL
//!
//! - IEX: `wss://stream.data.alpaca.markets/v2/iex`
//! - SIP: `wss://stream.data.alpaca.markets/v2/sip`
//!
//! A dropped connection ends the stream with an error; there is no
//! reconnect loop.
//!
//! Every accepted quote is logged at `info`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::auth::{AUTH_TIMEOUT, AuthError, AuthHandler, Credentials};
use super::codec::JsonCodec;
use super::messages::{AlpacaMessage, StockQuoteMessage, SubscriptionRequest};
use crate::application::ports::{FeedError, QuoteFeed};
use crate::domain::quote::{QuoteObservation, Symbol};
use crate::infrastructure::metrics;

/// How long to wait for the close handshake when cancelled.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings for [`AlpacaQuoteFeed`].
#[derive(Debug, Clone)]
pub struct AlpacaFeedConfig {
    /// WebSocket URL.
    pub url: String,
    /// API credentials.
    pub credentials: Credentials,
    /// End the stream if no frame arrives for this long.
    pub idle_timeout: Option<Duration>,
}

impl AlpacaFeedConfig {
    /// Create a configuration with no idle timeout.
    #[must_use]
    pub const fn new(url: String, credentials: Credentials) -> Self {
        Self {
            url,
            credentials,
            idle_timeout: None,
        }
    }

    /// Set the idle timeout.
    #[must_use]
    pub const fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

// =============================================================================
// Feed
// =============================================================================

/// Alpaca stock quote feed.
pub struct AlpacaQuoteFeed {
    config: AlpacaFeedConfig,
    codec: JsonCodec,
}

/// What the caller should do after a text frame.
enum Flow {
    Continue,
    ReceiverClosed,
    Cancelled,
}

impl AlpacaQuoteFeed {
    /// Create a feed.
    #[must_use]
    pub const fn new(config: AlpacaFeedConfig) -> Self {
        Self {
            config,
            codec: JsonCodec::new(),
        }
    }

    /// Connect, authenticate and close.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Connect`] or [`FeedError::Auth`].
    pub async fn check_connection(&self) -> Result<(), FeedError> {
        let mut ws = self.connect().await?;
        self.authenticate(&mut ws).await?;
        tracing::info!(url = %self.config.url, "Feed handshake succeeded");

        if let Err(e) = ws.close(None).await {
            tracing::debug!(error = %e, "Close after handshake failed");
        }
        Ok(())
    }

    async fn connect(
        &self,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        FeedError,
    > {
        tracing::info!(url = %self.config.url, "Connecting to quote stream");
        let (ws, _response) = tokio_tungstenite::connect_async(self.config.url.as_str())
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;
        Ok(ws)
    }

    /// Run the greeting and auth exchange, bounded by [`AUTH_TIMEOUT`].
    async fn authenticate<S>(&self, ws: &mut S) -> Result<(), FeedError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>>
            + Sink<Message, Error = tungstenite::Error>
            + Unpin,
    {
        let mut handler = AuthHandler::new(self.config.credentials.clone());

        tokio::time::timeout(AUTH_TIMEOUT, self.handshake(ws, &mut handler))
            .await
            .map_err(|_| FeedError::Auth(AuthError::Timeout.to_string()))?
    }

    async fn handshake<S>(&self, ws: &mut S, handler: &mut AuthHandler) -> Result<(), FeedError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>>
            + Sink<Message, Error = tungstenite::Error>
            + Unpin,
    {
        loop {
            let text = match next_frame(ws, None).await? {
                Message::Text(text) => text,
                Message::Ping(data) => {
                    send(ws, Message::Pong(data)).await?;
                    continue;
                }
                Message::Close(frame) => return Err(FeedError::Disconnected(close_reason(frame))),
                _ => continue,
            };

            let messages = self
                .codec
                .decode(&text)
                .map_err(|e| FeedError::Protocol(e.to_string()))?;

            for message in messages {
                match message {
                    AlpacaMessage::Success(success) => {
                        let authenticated = handler
                            .on_success(&success)
                            .map_err(|e| FeedError::Auth(e.to_string()))?;

                        if authenticated {
                            tracing::info!("Quote stream authenticated");
                            return Ok(());
                        }
                        if handler.state().can_authenticate() {
                            let request = self
                                .codec
                                .encode(&handler.create_auth_request())
                                .map_err(|e| FeedError::Protocol(e.to_string()))?;
                            send(ws, Message::Text(request.into())).await?;
                        }
                    }
                    AlpacaMessage::Error(error) => {
                        tracing::error!(code = error.code, msg = %error.msg, "Authentication rejected");
                        return Err(FeedError::Auth(handler.on_error(&error).to_string()));
                    }
                    other => {
                        tracing::trace!(?other, "Ignoring message before authentication");
                    }
                }
            }
        }
    }

    async fn subscribe<S>(&self, ws: &mut S, symbols: &[Symbol]) -> Result<(), FeedError>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let request = SubscriptionRequest::quotes(symbols);
        let json = self
            .codec
            .encode(&request)
            .map_err(|e| FeedError::Protocol(e.to_string()))?;

        tracing::debug!(quotes = ?request.quotes, "Sending subscribe request");
        send(ws, Message::Text(json.into())).await
    }

    /// Forward the contents of one text frame.
    ///
    /// A full quote channel blocks here until the consumer catches up or
    /// `cancel` fires.
    async fn dispatch(
        &self,
        text: &str,
        tx: &mpsc::Sender<QuoteObservation>,
        cancel: &CancellationToken,
    ) -> Result<Flow, FeedError> {
        let messages = match self.codec.decode(text) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable frame");
                metrics::record_quote_rejected();
                return Ok(Flow::Continue);
            }
        };

        for message in messages {
            match message {
                AlpacaMessage::StockQuote(quote) => {
                    let Some(observation) = to_observation(&quote) else {
                        continue;
                    };
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Ok(Flow::Cancelled),
                        sent = tx.send(observation) => {
                            if sent.is_err() {
                                return Ok(Flow::ReceiverClosed);
                            }
                        }
                    }
                }
                AlpacaMessage::Subscription(sub) => {
                    tracing::info!(quotes = ?sub.quotes, "Subscription confirmed");
                }
                AlpacaMessage::Error(error) if error.is_fatal() => {
                    tracing::error!(code = error.code, msg = %error.msg, "Stream error");
                    return Err(FeedError::Protocol(format!(
                        "server error ({}): {}",
                        error.code, error.msg
                    )));
                }
                AlpacaMessage::Error(error) => {
                    tracing::warn!(code = error.code, msg = %error.msg, "Stream error");
                }
                AlpacaMessage::Success(_) | AlpacaMessage::Ignored(_) => {
                    tracing::trace!("Ignoring unhandled message type");
                }
            }
        }

        Ok(Flow::Continue)
    }
}

#[async_trait]
impl QuoteFeed for AlpacaQuoteFeed {
    async fn stream_quotes(
        &self,
        symbols: &[Symbol],
        tx: mpsc::Sender<QuoteObservation>,
        cancel: CancellationToken,
    ) -> Result<(), FeedError> {
        let mut ws = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            ws = async {
                let mut ws = self.connect().await?;
                self.authenticate(&mut ws).await?;
                self.subscribe(&mut ws, symbols).await?;
                Ok::<_, FeedError>(ws)
            } => ws?,
        };

        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => {
                    close_on_cancel(&mut ws).await;
                    return Ok(());
                }
                frame = next_frame(&mut ws, self.config.idle_timeout) => frame?,
            };

            match frame {
                Message::Text(text) => match self.dispatch(&text, &tx, &cancel).await? {
                    Flow::Continue => {}
                    Flow::ReceiverClosed => {
                        tracing::info!("Quote receiver closed, leaving stream");
                        return Ok(());
                    }
                    Flow::Cancelled => {
                        close_on_cancel(&mut ws).await;
                        return Ok(());
                    }
                },
                Message::Ping(data) => send(&mut ws, Message::Pong(data)).await?,
                Message::Close(frame) => {
                    tracing::warn!("Server sent close frame");
                    return Err(FeedError::Disconnected(close_reason(frame)));
                }
                _ => {}
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn to_observation(quote: &StockQuoteMessage) -> Option<QuoteObservation> {
    match quote.to_observation(Utc::now()) {
        Ok(observation) => {
            tracing::info!(
                symbol = %observation.ticker(),
                bid_price = observation.price(),
                bid_size = observation.volume(),
                timestamp = %observation.event_timestamp(),
                "Quote received"
            );
            metrics::record_quote_received(observation.ticker().as_str());
            metrics::record_receive_lag(observation.receive_lag());
            Some(observation)
        }
        Err(e) => {
            tracing::warn!(error = %e, symbol = %quote.symbol, "Skipping invalid quote");
            metrics::record_quote_rejected();
            None
        }
    }
}

async fn close_on_cancel<S>(ws: &mut S)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    tracing::info!("Quote stream cancelled");
    match tokio::time::timeout(CLOSE_TIMEOUT, ws.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Close on cancel failed"),
        Err(_) => tracing::debug!("Close on cancel timed out"),
    }
}

async fn next_frame<S>(ws: &mut S, idle_timeout: Option<Duration>) -> Result<Message, FeedError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let next = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, ws.next())
            .await
            .map_err(|_| FeedError::IdleTimeout(limit))?,
        None => ws.next().await,
    };

    match next {
        Some(Ok(message)) => Ok(message),
        Some(Err(e)) => Err(FeedError::Disconnected(e.to_string())),
        None => Err(FeedError::Disconnected("stream ended".to_string())),
    }
}

async fn send<S>(ws: &mut S, message: Message) -> Result<(), FeedError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    ws.send(message)
        .await
        .map_err(|e| FeedError::Disconnected(e.to_string()))
}

fn close_reason(frame: Option<tungstenite::protocol::CloseFrame>) -> String {
    frame.map_or_else(
        || "close frame".to_string(),
        |f| format!("close frame ({}): {}", u16::from(f.code), f.reason.as_str()),
    )
}

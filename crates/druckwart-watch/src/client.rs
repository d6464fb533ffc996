// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP client for the reservation service.
//
// One request per connection over plain TCP with `Connection: close`; the
// three API routes all take small JSON bodies, so no connection pooling or
// keep-alive is worth carrying.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use druckwart_core::error::{DruckwartError, Result};
use druckwart_core::types::{
    ApiErrorBody, JobClass, ReserveRequest, ReserveResponse, SettleRequest,
};

/// Timeout for one complete request/response round trip.
const API_TIMEOUT: Duration = Duration::from_secs(10);

/// The three reservation operations the tracking loop needs.
///
/// Settle errors are typed: `TransactionNotFound` and `TransactionNotPending`
/// are state conflicts the caller must not retry; everything else is
/// transient and safe to retry next cycle.
pub trait ReservationApi {
    async fn reserve(
        &self,
        user_id: &str,
        pages: i64,
        job_class: JobClass,
    ) -> Result<ReserveResponse>;

    async fn confirm(&self, transaction_id: i64) -> Result<()>;

    async fn cancel(&self, transaction_id: i64) -> Result<()>;
}

/// Client speaking to a druckwart-server instance.
#[derive(Debug, Clone)]
pub struct ReservationClient {
    /// `host:port` of the server.
    authority: String,
    api_key: String,
}

impl ReservationClient {
    /// Build a client from a base URL such as `http://127.0.0.1:7631`.
    pub fn new(api_url: &str, api_key: &str) -> Result<Self> {
        let rest = api_url.strip_prefix("http://").ok_or_else(|| {
            DruckwartError::Config(format!(
                "reservation API URL must start with http://, got '{api_url}'"
            ))
        })?;
        let authority = rest.split('/').next().unwrap_or("").to_string();
        if authority.is_empty() {
            return Err(DruckwartError::Config(format!(
                "reservation API URL has no host: '{api_url}'"
            )));
        }
        let authority = if authority.contains(':') {
            authority
        } else {
            format!("{authority}:80")
        };

        Ok(Self {
            authority,
            api_key: api_key.to_string(),
        })
    }

    /// POST a JSON body and return (status code, response body).
    async fn post(&self, path: &str, json_body: &str) -> Result<(u16, String)> {
        let request = format!(
            "POST {path} HTTP/1.1\r\n\
             Host: {}\r\n\
             Authorization: Bearer {}\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {json_body}",
            self.authority,
            self.api_key,
            json_body.len()
        );

        let exchange = async {
            let mut stream = TcpStream::connect(&self.authority)
                .await
                .map_err(|e| DruckwartError::Api(format!("connect {}: {e}", self.authority)))?;
            stream
                .write_all(request.as_bytes())
                .await
                .map_err(|e| DruckwartError::Api(format!("write request: {e}")))?;
            stream
                .shutdown()
                .await
                .map_err(|e| DruckwartError::Api(format!("shutdown write: {e}")))?;

            let mut response = String::new();
            stream
                .read_to_string(&mut response)
                .await
                .map_err(|e| DruckwartError::Api(format!("read response: {e}")))?;
            Ok::<String, DruckwartError>(response)
        };

        let response = tokio::time::timeout(API_TIMEOUT, exchange)
            .await
            .map_err(|_| {
                DruckwartError::Api(format!(
                    "request to {} timed out after {}s",
                    self.authority,
                    API_TIMEOUT.as_secs()
                ))
            })??;

        parse_response(&response)
    }
}

impl ReservationApi for ReservationClient {
    async fn reserve(
        &self,
        user_id: &str,
        pages: i64,
        job_class: JobClass,
    ) -> Result<ReserveResponse> {
        let body = serde_json::to_string(&ReserveRequest {
            user_id: user_id.to_string(),
            pages,
            job_class,
        })?;

        let (status, response_body) = self.post("/api/print/reserve", &body).await?;
        debug!(user_id, pages, status, "reserve response");
        if status != 200 {
            return Err(DruckwartError::Api(format!(
                "reserve returned {status}: {}",
                error_text(&response_body)
            )));
        }
        Ok(serde_json::from_str(&response_body)?)
    }

    async fn confirm(&self, transaction_id: i64) -> Result<()> {
        self.settle("/api/print/confirm", transaction_id).await
    }

    async fn cancel(&self, transaction_id: i64) -> Result<()> {
        self.settle("/api/print/cancel", transaction_id).await
    }
}

impl ReservationClient {
    async fn settle(&self, path: &str, transaction_id: i64) -> Result<()> {
        let body = serde_json::to_string(&SettleRequest { transaction_id })?;
        let (status, response_body) = self.post(path, &body).await?;
        debug!(transaction_id, status, path, "settle response");

        match status {
            200 => Ok(()),
            404 => Err(DruckwartError::TransactionNotFound(transaction_id)),
            400 => Err(DruckwartError::TransactionNotPending {
                id: transaction_id,
                status: error_text(&response_body),
            }),
            other => Err(DruckwartError::Api(format!(
                "{path} returned {other}: {}",
                error_text(&response_body)
            ))),
        }
    }
}

/// Split a raw HTTP response into status code and body.
fn parse_response(raw: &str) -> Result<(u16, String)> {
    let (head, body) = raw
        .split_once("\r\n\r\n")
        .ok_or_else(|| DruckwartError::Api("malformed HTTP response".into()))?;

    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| DruckwartError::Api(format!("bad status line: '{head}'")))?;

    Ok((status, body.to_string()))
}

/// Pull the `error` field out of an API error body, falling back to the raw
/// text.
fn error_text(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_parsing() {
        let client = ReservationClient::new("http://127.0.0.1:7631", "k").expect("parse");
        assert_eq!(client.authority, "127.0.0.1:7631");

        let client = ReservationClient::new("http://credits.local/api", "k").expect("parse");
        assert_eq!(client.authority, "credits.local:80");

        assert!(ReservationClient::new("https://host:1", "k").is_err());
        assert!(ReservationClient::new("http://", "k").is_err());
    }

    #[test]
    fn response_parsing() {
        let (status, body) =
            parse_response("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n{}").expect("parse");
        assert_eq!(status, 200);
        assert_eq!(body, "{}");

        assert!(parse_response("garbage").is_err());
    }

    #[test]
    fn error_text_prefers_structured_body() {
        assert_eq!(error_text(r#"{"error":"no such route"}"#), "no such route");
        assert_eq!(error_text("plain text"), "plain text");
    }
}

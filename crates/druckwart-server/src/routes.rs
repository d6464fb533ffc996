// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Route dispatch for the reservation API.
//
//   POST /api/print/reserve   {userId, pages, jobClass}
//   POST /api/print/confirm   {transactionId}
//   POST /api/print/cancel    {transactionId}
//
// All routes require `Authorization: Bearer <key>`.  Auth is checked before
// any body parsing or ledger access.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use druckwart_core::error::DruckwartError;
use druckwart_core::types::{
    ApiErrorBody, ReserveRequest, ReserveResponse, SettleRequest, SettleResponse,
};
use druckwart_ledger::Ledger;

use crate::http::HttpRequest;

/// State shared across all connection-handling tasks.
pub struct ApiState {
    /// rusqlite connections are Send but not Sync, so the ledger serializes
    /// behind a mutex.  The store's own transactions keep each operation
    /// atomic; the mutex only orders them.
    pub ledger: Arc<Mutex<Ledger>>,
    /// SHA-256 digest of the configured bearer key.
    api_key_digest: [u8; 32],
}

impl ApiState {
    pub fn new(ledger: Arc<Mutex<Ledger>>, api_key: &str) -> Self {
        Self {
            ledger,
            api_key_digest: digest(api_key),
        }
    }

    /// Check a presented `Authorization` header value against the configured
    /// key.  Comparing digests rather than the strings themselves keeps the
    /// comparison independent of where the two differ.
    fn authorized(&self, authorization: Option<&str>) -> bool {
        let Some(value) = authorization else {
            return false;
        };
        let Some(token) = value.strip_prefix("Bearer ") else {
            return false;
        };
        digest(token.trim()) == self.api_key_digest
    }
}

fn digest(key: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}

/// Route a parsed request to its handler: returns status code + JSON body.
pub fn dispatch(request: &HttpRequest, state: &ApiState) -> (u16, String) {
    if !state.authorized(request.authorization.as_deref()) {
        warn!(path = %request.path, "rejected unauthorized request");
        return error_body(401, "unauthorized");
    }

    if request.method != "POST" {
        return error_body(405, "method not allowed");
    }

    match request.path.as_str() {
        "/api/print/reserve" => handle_reserve(&request.body, state),
        "/api/print/confirm" => handle_settle(&request.body, state, Settle::Confirm),
        "/api/print/cancel" => handle_settle(&request.body, state, Settle::Cancel),
        _ => error_body(404, "no such route"),
    }
}

#[derive(Clone, Copy)]
enum Settle {
    Confirm,
    Cancel,
}

fn handle_reserve(body: &[u8], state: &ApiState) -> (u16, String) {
    let request: ReserveRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => return error_body(400, &format!("invalid reserve body: {e}")),
    };
    if request.pages <= 0 {
        return error_body(400, "pages must be positive");
    }

    let mut ledger = match state.ledger.lock() {
        Ok(guard) => guard,
        Err(e) => {
            warn!(error = %e, "ledger lock poisoned");
            return error_body(500, "ledger unavailable");
        }
    };

    match ledger.reserve(&request.user_id, request.pages, request.job_class) {
        Ok(outcome) => {
            info!(
                user_id = %request.user_id,
                pages = request.pages,
                job_class = %request.job_class,
                outcome = ?outcome,
                "reserve"
            );
            json_response(200, &ReserveResponse::from_outcome(&outcome))
        }
        Err(e) => error_from(e),
    }
}

fn handle_settle(body: &[u8], state: &ApiState, op: Settle) -> (u16, String) {
    let request: SettleRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => return error_body(400, &format!("invalid settle body: {e}")),
    };

    let mut ledger = match state.ledger.lock() {
        Ok(guard) => guard,
        Err(e) => {
            warn!(error = %e, "ledger lock poisoned");
            return error_body(500, "ledger unavailable");
        }
    };

    let result = match op {
        Settle::Confirm => ledger.confirm(request.transaction_id),
        Settle::Cancel => ledger.cancel(request.transaction_id),
    };
    match result {
        Ok(()) => {
            info!(
                transaction_id = request.transaction_id,
                op = match op {
                    Settle::Confirm => "confirm",
                    Settle::Cancel => "cancel",
                },
                "settled"
            );
            json_response(200, &SettleResponse { success: true })
        }
        Err(e) => error_from(e),
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn json_response<T: Serialize>(status: u16, body: &T) -> (u16, String) {
    match serde_json::to_string(body) {
        Ok(json) => (status, json),
        Err(e) => {
            warn!(error = %e, "response serialization failed");
            error_body(500, "response serialization failed")
        }
    }
}

fn error_body(status: u16, message: &str) -> (u16, String) {
    let body = ApiErrorBody {
        error: message.to_string(),
    };
    // ApiErrorBody is a single string field; serialization cannot fail.
    let json = serde_json::to_string(&body)
        .unwrap_or_else(|_| "{\"error\":\"internal\"}".to_string());
    (status, json)
}

/// Map a ledger error to the wire status it documents.
///
/// Not-found and not-pending are distinct on purpose: a 400 on settle means
/// the transaction exists but was already settled, which a correct watcher
/// must treat as a double-settlement bug, not a retry.
fn error_from(e: DruckwartError) -> (u16, String) {
    let status = match &e {
        DruckwartError::TransactionNotFound(_) | DruckwartError::AccountNotFound(_) => 404,
        DruckwartError::TransactionNotPending { .. }
        | DruckwartError::AccountExists(_)
        | DruckwartError::BadRequest(_) => 400,
        _ => 500,
    };
    if status == 500 {
        warn!(error = %e, "internal error serving request");
    }
    error_body(status, &e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use druckwart_core::types::{JobClass, ReserveOutcome};

    fn state_with_accounts() -> ApiState {
        let mut ledger = Ledger::open_in_memory().expect("open");
        ledger.create_account("alice", false).expect("create");
        ledger.create_account("prof1", true).expect("create");
        ledger.deposit("alice", 100, None).expect("deposit");
        ApiState::new(Arc::new(Mutex::new(ledger)), "test-key")
    }

    fn post(path: &str, auth: Option<&str>, body: &str) -> HttpRequest {
        HttpRequest {
            method: "POST".to_string(),
            path: path.to_string(),
            authorization: auth.map(|s| s.to_string()),
            body: body.as_bytes().to_vec(),
        }
    }

    fn parsed(body: &str) -> serde_json::Value {
        serde_json::from_str(body).expect("valid json")
    }

    #[test]
    fn rejects_missing_and_wrong_credentials() {
        let state = state_with_accounts();

        let (status, _) = dispatch(&post("/api/print/reserve", None, "{}"), &state);
        assert_eq!(status, 401);

        let (status, _) = dispatch(
            &post("/api/print/reserve", Some("Bearer wrong"), "{}"),
            &state,
        );
        assert_eq!(status, 401);

        // Auth is checked before the body: a garbage body still gets 401.
        let (status, _) = dispatch(&post("/api/print/reserve", None, "not json"), &state);
        assert_eq!(status, 401);
    }

    #[test]
    fn reserve_happy_path() {
        let state = state_with_accounts();
        let (status, body) = dispatch(
            &post(
                "/api/print/reserve",
                Some("Bearer test-key"),
                r#"{"userId":"alice","pages":10,"jobClass":"standard"}"#,
            ),
            &state,
        );
        assert_eq!(status, 200);
        let json = parsed(&body);
        assert_eq!(json["allowed"], true);
        assert_eq!(json["isFree"], false);
        assert!(json["transactionId"].is_i64());
    }

    #[test]
    fn reserve_insufficient_balance_reports_diagnostics() {
        let state = state_with_accounts();
        let (status, body) = dispatch(
            &post(
                "/api/print/reserve",
                Some("Bearer test-key"),
                r#"{"userId":"alice","pages":30,"jobClass":"standard"}"#,
            ),
            &state,
        );
        // A business-rule denial is a 200 with allowed=false, not an error.
        assert_eq!(status, 200);
        let json = parsed(&body);
        assert_eq!(json["allowed"], false);
        assert_eq!(json["reason"], "insufficient balance");
        assert_eq!(json["balance"], 100);
        assert_eq!(json["required"], 150);
    }

    #[test]
    fn reserve_free_account() {
        let state = state_with_accounts();
        let (status, body) = dispatch(
            &post(
                "/api/print/reserve",
                Some("Bearer test-key"),
                r#"{"userId":"prof1","pages":100,"jobClass":"premium"}"#,
            ),
            &state,
        );
        assert_eq!(status, 200);
        let json = parsed(&body);
        assert_eq!(json["allowed"], true);
        assert_eq!(json["isFree"], true);
        assert!(json.get("transactionId").is_none());
    }

    #[test]
    fn confirm_and_double_confirm() {
        let state = state_with_accounts();

        let transaction_id = {
            let mut ledger = state.ledger.lock().expect("lock");
            match ledger.reserve("alice", 10, JobClass::Standard).expect("reserve") {
                ReserveOutcome::Reserved { transaction_id } => transaction_id,
                other => panic!("expected Reserved, got {other:?}"),
            }
        };

        let body = format!(r#"{{"transactionId":{transaction_id}}}"#);
        let (status, resp) = dispatch(
            &post("/api/print/confirm", Some("Bearer test-key"), &body),
            &state,
        );
        assert_eq!(status, 200);
        assert_eq!(parsed(&resp)["success"], true);

        // Second confirm is a state conflict, not a silent success.
        let (status, _) = dispatch(
            &post("/api/print/confirm", Some("Bearer test-key"), &body),
            &state,
        );
        assert_eq!(status, 400);
    }

    #[test]
    fn settle_unknown_transaction_is_404() {
        let state = state_with_accounts();
        let (status, _) = dispatch(
            &post(
                "/api/print/cancel",
                Some("Bearer test-key"),
                r#"{"transactionId":9999}"#,
            ),
            &state,
        );
        assert_eq!(status, 404);
    }

    #[test]
    fn validation_errors_are_400() {
        let state = state_with_accounts();

        let (status, _) = dispatch(
            &post("/api/print/reserve", Some("Bearer test-key"), "not json"),
            &state,
        );
        assert_eq!(status, 400);

        let (status, _) = dispatch(
            &post(
                "/api/print/reserve",
                Some("Bearer test-key"),
                r#"{"userId":"alice","pages":0,"jobClass":"standard"}"#,
            ),
            &state,
        );
        assert_eq!(status, 400);
    }

    #[test]
    fn unknown_route_and_method() {
        let state = state_with_accounts();

        let (status, _) = dispatch(
            &post("/api/print/refund", Some("Bearer test-key"), "{}"),
            &state,
        );
        assert_eq!(status, 404);

        let mut get = post("/api/print/reserve", Some("Bearer test-key"), "");
        get.method = "GET".to_string();
        let (status, _) = dispatch(&get, &state);
        assert_eq!(status, 405);
    }
}

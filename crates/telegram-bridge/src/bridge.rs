//! HTTP client for the MTProto bridge sidecar
//!
//! The bridge owns the actual Telegram sessions; this client drives it over
//! a small REST surface. Phone lookups go through the contact-import flow
//! and always remove the imported contact afterwards so the account's
//! address book stays empty.

use crate::classify::{is_not_found_message, parse_flood_wait};
use crate::{LookupClient, LookupError, Result, UserRecord};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// Client for a locally reachable MTProto bridge.
#[derive(Clone)]
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ImportRequest<'a> {
    phone: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    client_id: i64,
}

#[derive(Deserialize)]
struct ImportResponse {
    #[serde(default)]
    users: Vec<UserRecord>,
}

#[derive(Serialize)]
struct DeleteRequest {
    user_ids: Vec<i64>,
}

#[derive(Deserialize)]
struct EntityResponse {
    kind: String,
    user: Option<UserRecord>,
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(default)]
    authorized: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    retry_after: Option<u64>,
}

impl BridgeClient {
    /// Build a client for the bridge at `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Bridge(format!("client build failed: {e}")))?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { http, base_url })
    }

    async fn import_contact(&self, session: &str, phone: &str) -> Result<Vec<UserRecord>> {
        let url = format!("{}/sessions/{}/contacts/import", self.base_url, session);
        let body = ImportRequest {
            phone,
            first_name: "Check",
            last_name: "",
            client_id: rand::rng().random_range(0..i64::MAX),
        };
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        let parsed: ImportResponse = resp
            .json()
            .await
            .map_err(|e| LookupError::Bridge(format!("bad import response: {e}")))?;
        Ok(parsed.users)
    }

    /// Remove imported contacts. Failures are logged, never surfaced: the
    /// lookup result is already decided by the time cleanup runs.
    async fn delete_contacts(&self, session: &str, user_ids: Vec<i64>) {
        if user_ids.is_empty() {
            return;
        }
        let url = format!("{}/sessions/{}/contacts/delete", self.base_url, session);
        let result = self
            .http
            .post(&url)
            .json(&DeleteRequest { user_ids })
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(session, "deleted imported contacts");
            }
            Ok(resp) => {
                warn!(session, status = %resp.status(), "contact cleanup rejected");
            }
            Err(e) => {
                warn!(session, error = %e, "contact cleanup failed");
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> LookupError {
    LookupError::Bridge(format!("bridge unreachable: {e}"))
}

/// Map a non-success bridge response to a `LookupError`.
///
/// The bridge passes Telegram error messages through in its JSON `message`
/// field, so the body is classified with the same pattern tables used for
/// raw protocol errors.
async fn map_error_response(resp: reqwest::Response) -> LookupError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or(ErrorBody {
        message: body.clone(),
        retry_after: None,
    });

    match status {
        404 => LookupError::NotFound,
        401 | 403 => LookupError::Unauthorized,
        420 | 429 => LookupError::RateLimited {
            retry_after_secs: parsed.retry_after.or_else(|| parse_flood_wait(&parsed.message)),
        },
        _ => {
            if is_not_found_message(&parsed.message) {
                LookupError::NotFound
            } else if let Some(wait) = parse_flood_wait(&parsed.message) {
                LookupError::RateLimited {
                    retry_after_secs: Some(wait),
                }
            } else {
                LookupError::Bridge(format!("bridge returned {status}: {}", parsed.message))
            }
        }
    }
}

impl LookupClient for BridgeClient {
    fn lookup_phone<'a>(
        &'a self,
        session: &'a str,
        phone: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<UserRecord>> + Send + 'a>> {
        Box::pin(async move {
            let users = self.import_contact(session, phone).await?;
            let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
            self.delete_contacts(session, ids).await;
            users.into_iter().next().ok_or(LookupError::NotFound)
        })
    }

    fn lookup_username<'a>(
        &'a self,
        session: &'a str,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<UserRecord>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/sessions/{}/entities/{}", self.base_url, session, username);
            let resp = self.http.get(&url).send().await.map_err(transport_error)?;
            if !resp.status().is_success() {
                return Err(map_error_response(resp).await);
            }
            let parsed: EntityResponse = resp
                .json()
                .await
                .map_err(|e| LookupError::Bridge(format!("bad entity response: {e}")))?;
            if parsed.kind != "user" {
                return Err(LookupError::NotUser);
            }
            parsed.user.ok_or(LookupError::NotFound)
        })
    }

    fn ping_session<'a>(
        &'a self,
        session: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/sessions/{}", self.base_url, session);
            let resp = self.http.get(&url).send().await.map_err(transport_error)?;
            if !resp.status().is_success() {
                return Err(map_error_response(resp).await);
            }
            let parsed: SessionResponse = resp
                .json()
                .await
                .map_err(|e| LookupError::Bridge(format!("bad session response: {e}")))?;
            Ok(parsed.authorized)
        })
    }
}

//! Bot API notifier with per-category cooldowns

use std::collections::HashMap;
use std::time::{Duration, Instant};

use common::Secret;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// Alert severity. Each category cools down independently so a flood-wait
/// storm cannot drown out a disable alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Critical,
    Warning,
    Info,
    Success,
}

impl Category {
    fn heading(&self) -> &'static str {
        match self {
            Category::Critical => "\u{1F6A8} <b>CRITICAL</b>",
            Category::Warning => "\u{26A0}\u{FE0F} <b>WARNING</b>",
            Category::Info => "\u{2139}\u{FE0F} <b>INFO</b>",
            Category::Success => "\u{2705} <b>OK</b>",
        }
    }
}

/// Sends operator alerts to a Telegram chat.
pub struct Notifier {
    http: reqwest::Client,
    api_base: String,
    bot_token: Secret<String>,
    chat_id: String,
    cooldown: Duration,
    last_sent: Mutex<HashMap<Category, Instant>>,
}

impl Notifier {
    pub fn new(bot_token: Secret<String>, chat_id: String, cooldown: Option<Duration>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token,
            chat_id,
            cooldown: cooldown.unwrap_or(DEFAULT_COOLDOWN),
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Point at a different Bot API host (tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        let mut base = api_base.into();
        while base.ends_with('/') {
            base.pop();
        }
        self.api_base = base;
        self
    }

    /// Send a message in the given category.
    ///
    /// Returns true only when the message actually went out. A message
    /// suppressed by the cooldown, rejected by the API or lost to a network
    /// error returns false; failed sends do not start a cooldown.
    pub async fn send(&self, category: Category, text: &str) -> bool {
        {
            let last_sent = self.last_sent.lock().await;
            if let Some(at) = last_sent.get(&category) {
                if at.elapsed() < self.cooldown {
                    debug!(?category, "alert suppressed by cooldown");
                    return false;
                }
            }
        }

        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base,
            self.bot_token.expose()
        );
        let body = json!({
            "chat_id": self.chat_id,
            "text": format!("{}\n\n{}", category.heading(), text),
            "parse_mode": "HTML",
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                self.last_sent.lock().await.insert(category, Instant::now());
                debug!(?category, "alert sent");
                true
            }
            Ok(resp) => {
                warn!(?category, status = %resp.status(), "alert rejected by Bot API");
                false
            }
            Err(e) => {
                warn!(?category, error = %e, "alert send failed");
                false
            }
        }
    }

    pub async fn send_critical(&self, text: &str) -> bool {
        self.send(Category::Critical, text).await
    }

    pub async fn send_warning(&self, text: &str) -> bool {
        self.send(Category::Warning, text).await
    }

    pub async fn send_info(&self, text: &str) -> bool {
        self.send(Category::Info, text).await
    }

    pub async fn send_success(&self, text: &str) -> bool {
        self.send(Category::Success, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct BotApiState {
        sent: Arc<tokio::sync::Mutex<Vec<serde_json::Value>>>,
        failures_left: Arc<AtomicUsize>,
    }

    async fn spawn_bot_api(state: BotApiState) -> String {
        let app = Router::new()
            .route(
                "/bot{token}/sendMessage",
                post(
                    |State(s): State<BotApiState>, Json(body): Json<serde_json::Value>| async move {
                        if s.failures_left
                            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                                n.checked_sub(1)
                            })
                            .is_ok()
                        {
                            return StatusCode::BAD_GATEWAY;
                        }
                        s.sent.lock().await.push(body);
                        StatusCode::OK
                    },
                ),
            )
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock bot api");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock bot api");
        });
        format!("http://{addr}")
    }

    fn notifier(base: &str, cooldown: Duration) -> Notifier {
        Notifier::new(
            Secret::new("123456:test-token".to_string()),
            "-100123".to_string(),
            Some(cooldown),
        )
        .with_api_base(base)
    }

    #[tokio::test]
    async fn sends_html_message_with_heading() {
        let state = BotApiState::default();
        let base = spawn_bot_api(state.clone()).await;
        let notifier = notifier(&base, Duration::from_secs(300));

        assert!(notifier.send_critical("pool is empty").await);

        let sent = state.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["chat_id"], "-100123");
        assert_eq!(sent[0]["parse_mode"], "HTML");
        let text = sent[0]["text"].as_str().expect("text field");
        assert!(text.contains("CRITICAL"));
        assert!(text.contains("pool is empty"));
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeats() {
        let state = BotApiState::default();
        let base = spawn_bot_api(state.clone()).await;
        let notifier = notifier(&base, Duration::from_secs(300));

        assert!(notifier.send_warning("first").await);
        assert!(!notifier.send_warning("second").await);
        assert_eq!(state.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn categories_cool_down_independently() {
        let state = BotApiState::default();
        let base = spawn_bot_api(state.clone()).await;
        let notifier = notifier(&base, Duration::from_secs(300));

        assert!(notifier.send_warning("flood wait").await);
        assert!(notifier.send_critical("account disabled").await);
        assert_eq!(state.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn zero_cooldown_always_sends() {
        let state = BotApiState::default();
        let base = spawn_bot_api(state.clone()).await;
        let notifier = notifier(&base, Duration::from_secs(0));

        assert!(notifier.send_info("one").await);
        assert!(notifier.send_info("two").await);
        assert_eq!(state.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn failed_send_does_not_start_cooldown() {
        let state = BotApiState::default();
        state.failures_left.store(1, Ordering::SeqCst);
        let base = spawn_bot_api(state.clone()).await;
        let notifier = notifier(&base, Duration::from_secs(300));

        assert!(!notifier.send_critical("first try").await);
        assert!(notifier.send_critical("second try").await, "retry must not be suppressed");
        assert_eq!(state.sent.lock().await.len(), 1);
    }
}

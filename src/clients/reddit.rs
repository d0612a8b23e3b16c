//! Reddit OAuth API client (script app, password grant).

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{classify_status, ClientError, Comment, ForumClient, PostRef, PostSnapshot};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const OAUTH_BASE: &str = "https://oauth.reddit.com";

/// Refresh the token this long before Reddit says it expires
const TOKEN_SLACK: Duration = Duration::from_secs(60);

/// Script-app credentials
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl RedditCredentials {
    /// Read `REDDIT_CLIENT_ID`, `REDDIT_CLIENT_SECRET`, `REDDIT_USERNAME` and
    /// `REDDIT_PASSWORD`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let get = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ClientError::Auth(format!("{} is not set", name)))
        };
        Ok(Self {
            client_id: get("REDDIT_CLIENT_ID")?,
            client_secret: get("REDDIT_CLIENT_SECRET")?,
            username: get("REDDIT_USERNAME")?,
            password: get("REDDIT_PASSWORD")?,
        })
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

/// Blocking Reddit client. The access token is fetched lazily and cached.
pub struct RedditClient {
    http: reqwest::blocking::Client,
    credentials: RedditCredentials,
    token: Mutex<Option<AccessToken>>,
}

impl fmt::Debug for RedditClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditClient")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl RedditClient {
    pub fn new(
        credentials: RedditCredentials,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout.min(Duration::from_secs(15)))
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Protocol(format!("building HTTP client: {}", e)))?;
        Ok(Self {
            http,
            credentials,
            token: Mutex::new(None),
        })
    }

    fn access_token(&self) -> Result<String, ClientError> {
        let mut cached = self
            .token
            .lock()
            .map_err(|_| ClientError::Protocol("token cache poisoned".to_string()))?;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!(username = %self.credentials.username, "requesting reddit access token");
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), "reddit token request"));
        }
        let body: TokenResponse = response.json().map_err(transport_error)?;
        if let Some(error) = body.error {
            return Err(ClientError::Auth(format!("reddit token request: {}", error)));
        }
        let value = body
            .access_token
            .ok_or_else(|| ClientError::Protocol("token response without access_token".into()))?;
        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));

        *cached = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_SLACK),
        });
        Ok(value)
    }

    fn get(&self, path: &str) -> Result<Option<Value>, ClientError> {
        let token = self.access_token()?;
        let response = self
            .http
            .get(format!("{}{}", OAUTH_BASE, path))
            .bearer_auth(token)
            .send()
            .map_err(transport_error)?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), path));
        }
        response.json().map(Some).map_err(transport_error)
    }

    fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Value, ClientError> {
        let token = self.access_token()?;
        let response = self
            .http
            .post(format!("{}{}", OAUTH_BASE, path))
            .bearer_auth(token)
            .form(form)
            .send()
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), path));
        }
        let body: Value = response.json().map_err(transport_error)?;
        check_api_errors(&body)?;
        Ok(body)
    }
}

fn transport_error(err: reqwest::Error) -> ClientError {
    if err.is_decode() {
        ClientError::Protocol(err.to_string())
    } else {
        ClientError::Transient(err.to_string())
    }
}

/// Surface errors Reddit reports inside a 200 response
/// (`{"json": {"errors": [["CODE", "message", "field"]]}}`).
fn check_api_errors(body: &Value) -> Result<(), ClientError> {
    let Some(errors) = body.pointer("/json/errors").and_then(Value::as_array) else {
        return Ok(());
    };
    let Some(first) = errors.first() else {
        return Ok(());
    };
    let code = first.get(0).and_then(Value::as_str).unwrap_or("UNKNOWN");
    let message = first.get(1).and_then(Value::as_str).unwrap_or("");
    let text = format!("{}: {}", code, message);
    Err(match code {
        "RATELIMIT" => ClientError::Transient(text),
        "USER_REQUIRED" | "SUBREDDIT_NOTALLOWED" | "SUBREDDIT_NOEXIST" => {
            ClientError::Auth(text)
        }
        "NOT_AUTHOR" | "DELETED_LINK" => ClientError::NotFound(text),
        _ => ClientError::Protocol(text),
    })
}

/// Build a snapshot from a `/by_id` listing.
fn snapshot_from_listing(listing: &Value) -> PostSnapshot {
    let Some(post) = listing.pointer("/data/children/0/data") else {
        return PostSnapshot::missing();
    };
    let body = post
        .get("selftext")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let category = post.get("removed_by_category").and_then(Value::as_str);
    if category == Some("deleted") || body == "[deleted]" {
        return PostSnapshot::missing();
    }
    PostSnapshot {
        exists: true,
        removed: category.is_some() || body == "[removed]",
        body,
    }
}

/// Flatten the comment tree from a `/comments/{id}` response.
fn comments_from_thread(thread: &Value) -> Vec<Comment> {
    let mut comments = Vec::new();
    if let Some(listing) = thread.get(1) {
        collect_comments(listing, &mut comments);
    }
    comments
}

fn collect_comments(listing: &Value, out: &mut Vec<Comment>) {
    let Some(children) = listing.pointer("/data/children").and_then(Value::as_array) else {
        return;
    };
    for child in children {
        if child.get("kind").and_then(Value::as_str) != Some("t1") {
            continue;
        }
        let Some(data) = child.get("data") else {
            continue;
        };
        let field = |name: &str| {
            data.get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        out.push(Comment {
            id: field("id"),
            author: field("author"),
            body: field("body"),
        });
        if let Some(replies) = data.get("replies") {
            collect_comments(replies, out);
        }
    }
}

impl ForumClient for RedditClient {
    fn submit_post(
        &self,
        subreddit: &str,
        title: &str,
        body: &str,
    ) -> Result<PostRef, ClientError> {
        let response = self.post_form(
            "/api/submit",
            &[
                ("sr", subreddit),
                ("kind", "self"),
                ("title", title),
                ("text", body),
                ("api_type", "json"),
                ("resubmit", "true"),
            ],
        )?;
        let data = response
            .pointer("/json/data")
            .ok_or_else(|| ClientError::Protocol("submit response without data".into()))?;
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Protocol("submit response without id".into()))?;
        let url = data
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://www.reddit.com/comments/{}", id));
        Ok(PostRef {
            id: id.to_string(),
            url,
        })
    }

    fn edit_post(&self, post_id: &str, body: &str) -> Result<(), ClientError> {
        let thing_id = format!("t3_{}", post_id);
        self.post_form(
            "/api/editusertext",
            &[
                ("thing_id", thing_id.as_str()),
                ("text", body),
                ("api_type", "json"),
            ],
        )
        .map(|_| ())
    }

    fn get_post(&self, post_id: &str) -> Result<PostSnapshot, ClientError> {
        match self.get(&format!("/by_id/t3_{}?raw_json=1", post_id))? {
            Some(listing) => Ok(snapshot_from_listing(&listing)),
            None => Ok(PostSnapshot::missing()),
        }
    }

    fn get_comments(&self, post_id: &str) -> Result<Vec<Comment>, ClientError> {
        match self.get(&format!("/comments/{}?raw_json=1&limit=500", post_id))? {
            Some(thread) => Ok(comments_from_thread(&thread)),
            None => Err(ClientError::NotFound(format!("post {}", post_id))),
        }
    }
}

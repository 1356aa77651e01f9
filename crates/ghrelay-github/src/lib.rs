//! GitHub adapter (user events feed).
//!
//! Implements the `ghrelay-core` ActivitySource over the REST endpoint
//! `GET /users/{username}/events`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT},
    StatusCode,
};
use serde_json::Value;
use tracing::{debug, warn};

use ghrelay_core::{domain::ActivityRecord, errors::Error, source::ActivitySource, Result};

const RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATELIMIT_RESET: &str = "x-ratelimit-reset";

#[derive(Clone, Debug)]
pub struct GithubConfig {
    pub api_base: String,
    pub username: String,
    pub token: Option<String>,
    pub user_agent: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct GithubEventSource {
    cfg: GithubConfig,
    http: reqwest::Client,
}

impl GithubEventSource {
    pub fn new(cfg: GithubConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .default_headers(default_headers(&cfg)?)
            .build()
            .map_err(|e| Error::External(format!("github client build error: {e}")))?;
        Ok(Self { cfg, http })
    }

    pub fn events_url(&self) -> String {
        format!(
            "{}/users/{}/events",
            self.cfg.api_base.trim_end_matches('/'),
            self.cfg.username
        )
    }
}

fn default_headers(cfg: &GithubConfig) -> Result<HeaderMap> {
    let mut h = HeaderMap::new();
    h.insert(
        USER_AGENT,
        HeaderValue::from_str(&cfg.user_agent)
            .map_err(|e| Error::Config(format!("invalid GitHub user agent: {e}")))?,
    );
    h.insert(
        ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );
    if let Some(token) = &cfg.token {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| Error::Config(format!("invalid GitHub token: {e}")))?;
        auth.set_sensitive(true);
        h.insert(AUTHORIZATION, auth);
    }
    Ok(h)
}

#[async_trait]
impl ActivitySource for GithubEventSource {
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<ActivityRecord>> {
        let resp = self
            .http
            .get(self.events_url())
            .query(&[("page", page), ("per_page", per_page)])
            .send()
            .await
            .map_err(|e| Error::External(format!("github request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            if let Some(err) = rate_limit_error(status, resp.headers()) {
                return Err(err);
            }
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "github events request failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        if let Some(remaining) = header_u64(resp.headers(), RATELIMIT_REMAINING) {
            debug!(page, remaining, "github rate limit budget");
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::External(format!("github read error: {e}")))?;
        parse_events(&bytes)
    }
}

/// Decode one events page. Unknown fields are ignored; payloads stay raw.
///
/// The page must be a JSON array. An entry that doesn't decode is dropped with
/// a warning so one odd event can't block the feed.
pub fn parse_events(body: &[u8]) -> Result<Vec<ActivityRecord>> {
    let entries: Vec<Value> = serde_json::from_slice(body)?;
    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        let id = entry
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string();
        match serde_json::from_value::<ActivityRecord>(entry) {
            Ok(record) => records.push(record),
            Err(e) => warn!(id = %id, error = %e, "dropping undecodable github event"),
        }
    }
    Ok(records)
}

/// Map a 403/429 with an exhausted budget to `Error::SourceRateLimited`.
pub fn rate_limit_error(status: StatusCode, headers: &HeaderMap) -> Option<Error> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    if header_u64(headers, RATELIMIT_REMAINING) != Some(0) {
        return None;
    }

    let reset_at = header_u64(headers, RATELIMIT_RESET)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    Some(Error::SourceRateLimited { reset_at })
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> GithubConfig {
        GithubConfig {
            api_base: "https://api.github.com/".to_string(),
            username: "octocat".to_string(),
            token: Some("ghp_test".to_string()),
            user_agent: "ghrelay-test".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_static(*v));
        }
        h
    }

    #[test]
    fn builds_events_url_without_double_slash() {
        let src = GithubEventSource::new(cfg()).unwrap();
        assert_eq!(
            src.events_url(),
            "https://api.github.com/users/octocat/events"
        );
    }

    #[test]
    fn default_headers_carry_agent_and_bearer_token() {
        let h = default_headers(&cfg()).unwrap();
        assert_eq!(h.get(USER_AGENT).unwrap(), "ghrelay-test");
        assert_eq!(h.get(AUTHORIZATION).unwrap(), "Bearer ghp_test");
        assert!(h.get(AUTHORIZATION).unwrap().is_sensitive());

        let mut anon = cfg();
        anon.token = None;
        assert!(default_headers(&anon).unwrap().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn exhausted_budget_maps_to_source_rate_limited() {
        let h = headers(&[
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", "1767225600"),
        ]);
        match rate_limit_error(StatusCode::FORBIDDEN, &h) {
            Some(Error::SourceRateLimited { reset_at: Some(t) }) => {
                assert_eq!(t.to_rfc3339(), "2026-01-01T00:00:00+00:00");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn forbidden_with_budget_left_is_not_a_rate_limit() {
        let h = headers(&[("x-ratelimit-remaining", "42")]);
        assert!(rate_limit_error(StatusCode::FORBIDDEN, &h).is_none());
        let h = headers(&[("x-ratelimit-remaining", "0")]);
        assert!(rate_limit_error(StatusCode::NOT_FOUND, &h).is_none());
    }

    #[test]
    fn missing_reset_header_still_signals_rate_limit() {
        let h = headers(&[("x-ratelimit-remaining", "0")]);
        assert!(matches!(
            rate_limit_error(StatusCode::TOO_MANY_REQUESTS, &h),
            Some(Error::SourceRateLimited { reset_at: None })
        ));
    }

    #[test]
    fn parses_events_page() {
        let body = br#"[
          {
            "id": "22249084964",
            "type": "PushEvent",
            "actor": { "id": 583231, "login": "octocat", "display_login": "octocat" },
            "repo": { "id": 1296269, "name": "octocat/Hello-World" },
            "payload": {
              "push_id": 10115855396,
              "size": 1,
              "ref": "refs/heads/master",
              "commits": [
                { "sha": "7a8f3ac80e2ad2f6842cb86f576d4bfe2c03e4ae", "message": "commit", "distinct": true }
              ]
            },
            "public": true,
            "created_at": "2022-06-09T12:47:28Z"
          },
          {
            "id": "22237752260",
            "type": "WatchEvent",
            "actor": { "id": 583231, "login": "octocat" },
            "repo": { "id": 1296269, "name": "octocat/linguist" },
            "payload": { "action": "started" },
            "public": true,
            "created_at": "2022-06-08T23:29:25Z"
          }
        ]"#;
        let events = parse_events(body).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, "PushEvent");
        assert!(events[0].created_at > events[1].created_at);
        assert_eq!(events[1].repo.name, "octocat/linguist");
    }

    #[test]
    fn undecodable_entry_is_dropped_not_the_page() {
        let body = br#"[
          { "id": "1", "type": "WatchEvent", "actor": { "login": "a" },
            "repo": { "name": "a/b" }, "created_at": "2022-06-08T23:29:25Z" },
          { "id": "2", "type": "WatchEvent", "actor": { "login": "a" },
            "repo": { "name": "a/b" }, "created_at": "not a date" },
          { "id": "3", "type": "WatchEvent", "repo": { "name": "a/b" },
            "created_at": "2022-06-08T23:29:25Z" }
        ]"#;
        let events = parse_events(body).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "1");
    }

    #[test]
    fn malformed_page_is_an_error() {
        assert!(matches!(
            parse_events(br#"{"message":"Not Found"}"#),
            Err(Error::Json(_))
        ));
    }

    /// One-shot HTTP server: captures the request head, answers with `response`.
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            sock.write_all(response.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
            String::from_utf8_lossy(&buf).into_owned()
        });
        (base, handle)
    }

    fn http_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut out = format!("HTTP/1.1 {status}\r\n");
        for (k, v) in headers {
            out.push_str(&format!("{k}: {v}\r\n"));
        }
        out.push_str(&format!(
            "content-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        ));
        out
    }

    fn source_for(base: String) -> GithubEventSource {
        GithubEventSource::new(GithubConfig {
            api_base: base,
            ..cfg()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_page_sends_paging_query_and_credentials() {
        let body = r#"[{ "id": "7", "type": "WatchEvent", "actor": { "login": "octocat" },
            "repo": { "name": "octocat/hello" }, "created_at": "2026-01-01T00:00:00Z" }]"#;
        let (base, server) = serve_once(http_response(
            "200 OK",
            &[("content-type", "application/json"), ("x-ratelimit-remaining", "59")],
            body,
        ))
        .await;

        let records = source_for(base).fetch_page(2, 50).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "7");

        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("GET /users/octocat/events?"));
        assert!(request_line.contains("page=2"));
        assert!(request_line.contains("per_page=50"));

        let head = request.to_ascii_lowercase();
        assert!(head.contains("authorization: bearer ghp_test"));
        assert!(head.contains("user-agent: ghrelay-test"));
        assert!(head.contains("accept: application/vnd.github+json"));
    }

    #[tokio::test]
    async fn fetch_page_maps_exhausted_budget_to_source_rate_limited() {
        let (base, server) = serve_once(http_response(
            "403 Forbidden",
            &[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", "1767225600")],
            r#"{"message":"API rate limit exceeded"}"#,
        ))
        .await;

        let err = source_for(base).fetch_page(1, 100).await.unwrap_err();
        server.await.unwrap();
        match err {
            Error::SourceRateLimited { reset_at: Some(t) } => {
                assert_eq!(t.to_rfc3339(), "2026-01-01T00:00:00+00:00");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_page_reports_other_failures_with_status() {
        let (base, server) = serve_once(http_response(
            "404 Not Found",
            &[],
            r#"{"message":"Not Found"}"#,
        ))
        .await;

        let err = source_for(base).fetch_page(1, 100).await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, Error::External(ref s) if s.contains("404") && s.contains("Not Found")));
    }
}

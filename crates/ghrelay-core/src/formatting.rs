//! Formatting utilities (GitHub event → Telegram HTML).

use serde_json::Value;

use crate::{domain::ActivityRecord, Error, Result};

const GITHUB_WEB: &str = "https://github.com";
const MAX_COMMIT_LINES: usize = 10;
const MAX_TITLE_LEN: usize = 200;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render one activity record as a Telegram HTML message.
///
/// `Ok(None)` means the record is intentionally not announced. A known event
/// type whose payload lacks the fields it needs is a `Error::Format`.
pub fn format_event(record: &ActivityRecord) -> Result<Option<String>> {
    let p = &record.payload;
    let actor = bold(&record.actor.login);
    let repo = repo_link(&record.repo.name);

    let text = match record.kind.as_str() {
        "PushEvent" => format_push(record, &actor, &repo)?,

        "CreateEvent" => {
            let ref_type = req_str(record, p, "ref_type")?;
            match (ref_type, opt_str(p, "ref")) {
                ("repository", _) | (_, None) => {
                    format!("🆕 {actor} created {ref_type} {repo}")
                }
                (_, Some(r)) => format!("🌱 {actor} created {ref_type} {} in {repo}", code(r)),
            }
        }

        "DeleteEvent" => {
            let ref_type = req_str(record, p, "ref_type")?;
            let r = req_str(record, p, "ref")?;
            format!("🗑 {actor} deleted {ref_type} {} in {repo}", code(r))
        }

        "IssuesEvent" => {
            let action = req_str(record, p, "action")?;
            let issue = req_obj(record, p, "issue")?;
            format!(
                "📝 {actor} {action} issue {} in {repo}",
                titled_link(record, issue)?
            )
        }

        "IssueCommentEvent" => {
            let issue = req_obj(record, p, "issue")?;
            let comment = req_obj(record, p, "comment")?;
            let url = opt_str(comment, "html_url")
                .or_else(|| opt_str(issue, "html_url"))
                .unwrap_or_default();
            let number = req_u64(record, issue, "number")?;
            let title = req_str(record, issue, "title")?;
            format!(
                "💬 {actor} commented on {} in {repo}\n{}",
                link(url, &format!("#{number}")),
                escape_html(&truncate_one_line(title, MAX_TITLE_LEN))
            )
        }

        "PullRequestEvent" => {
            let pr = req_obj(record, p, "pull_request")?;
            let mut action = req_str(record, p, "action")?;
            if action == "closed" && pr.get("merged").and_then(Value::as_bool) == Some(true) {
                action = "merged";
            }
            format!(
                "🔀 {actor} {action} pull request {} in {repo}",
                titled_link(record, pr)?
            )
        }

        "ReleaseEvent" => {
            let action = req_str(record, p, "action")?;
            let release = req_obj(record, p, "release")?;
            let tag = req_str(record, release, "tag_name")?;
            let label = opt_str(release, "name")
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(tag);
            let url = opt_str(release, "html_url").unwrap_or_default();
            format!("🏷 {actor} {action} release {} in {repo}", link(url, label))
        }

        "ForkEvent" => {
            let forkee = req_obj(record, p, "forkee")?;
            let dest = req_str(record, forkee, "full_name")?;
            format!("🍴 {actor} forked {repo} → {}", repo_link(dest))
        }

        "WatchEvent" => format!("⭐ {actor} starred {repo}"),

        other => format!("📌 {actor} did {} on {repo}", code(other)),
    };

    Ok(Some(text))
}

fn format_push(record: &ActivityRecord, actor: &str, repo: &str) -> Result<String> {
    let p = &record.payload;
    let branch = req_str(record, p, "ref")?;
    let branch = branch.strip_prefix("refs/heads/").unwrap_or(branch);
    let commits = p
        .get("commits")
        .and_then(Value::as_array)
        .ok_or_else(|| missing(record, "commits"))?;

    let total = p
        .get("size")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(commits.len())
        .max(commits.len());
    let noun = if total == 1 { "commit" } else { "commits" };

    let mut lines = vec![format!(
        "🔨 {actor} pushed {total} {noun} to {} in {repo}",
        code(branch)
    )];

    for c in commits.iter().take(MAX_COMMIT_LINES) {
        let sha = c.get("sha").and_then(Value::as_str).unwrap_or("");
        let short = sha.get(..7).unwrap_or(sha);
        let message = c.get("message").and_then(Value::as_str).unwrap_or("");
        let first_line = message.lines().next().unwrap_or("");
        lines.push(format!(
            "• {} {}",
            code(short),
            escape_html(&truncate_one_line(first_line, MAX_TITLE_LEN))
        ));
    }

    let hidden = total.saturating_sub(commits.len().min(MAX_COMMIT_LINES));
    if hidden > 0 {
        lines.push(format!("… and {hidden} more"));
    }

    Ok(lines.join("\n"))
}

// ============== Payload access ==============

fn missing(record: &ActivityRecord, field: &str) -> Error {
    Error::Format(format!(
        "{} {} is missing `{field}`",
        record.kind, record.id
    ))
}

fn opt_str<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}

fn req_str<'a>(record: &ActivityRecord, v: &'a Value, key: &str) -> Result<&'a str> {
    opt_str(v, key).ok_or_else(|| missing(record, key))
}

fn req_u64(record: &ActivityRecord, v: &Value, key: &str) -> Result<u64> {
    v.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| missing(record, key))
}

fn req_obj<'a>(record: &ActivityRecord, v: &'a Value, key: &str) -> Result<&'a Value> {
    v.get(key)
        .filter(|o| o.is_object())
        .ok_or_else(|| missing(record, key))
}

/// `#12 Title` linked to the issue/PR page.
fn titled_link(record: &ActivityRecord, item: &Value) -> Result<String> {
    let number = req_u64(record, item, "number")?;
    let title = req_str(record, item, "title")?;
    let url = opt_str(item, "html_url").unwrap_or_default();
    Ok(format!(
        "{} {}",
        link(url, &format!("#{number}")),
        escape_html(&truncate_one_line(title, MAX_TITLE_LEN))
    ))
}

// ============== HTML helpers ==============

fn bold(text: &str) -> String {
    format!("<b>{}</b>", escape_html(text))
}

fn code(text: &str) -> String {
    format!("<code>{}</code>", escape_html(text))
}

fn link(url: &str, text: &str) -> String {
    if url.is_empty() {
        return escape_html(text);
    }
    format!(r#"<a href="{}">{}</a>"#, escape_html(url), escape_html(text))
}

fn repo_link(full_name: &str) -> String {
    link(&format!("{GITHUB_WEB}/{full_name}"), full_name)
}

fn truncate_one_line(text: &str, max_len: usize) -> String {
    let cleaned = text.replace('\n', " ").trim().to_string();
    if cleaned.chars().count() <= max_len {
        return cleaned;
    }
    format!("{}...", cleaned.chars().take(max_len).collect::<String>())
}

/// Cut `html` to at most `max_chars` characters and append `…`.
///
/// The cut lands between tags and whole entities only, and every tag still
/// open at that point is closed again, so the result stays valid Telegram HTML.
pub fn truncate_message(html: &str, max_chars: usize) -> String {
    if html.chars().count() <= max_chars {
        return html.to_string();
    }
    // One char is reserved for the ellipsis.
    let budget = max_chars.saturating_sub(1);

    let mut out = String::new();
    let mut used = 0;
    let mut open: Vec<&str> = Vec::new();
    // Length of the closing tags `open` still needs.
    let mut closing = 0;
    let mut rest = html;

    while !rest.is_empty() {
        let (raw, token) = next_token(rest);
        let len = raw.chars().count();
        match token {
            Token::Open(name) => {
                if used + len + closing + close_len(name) > budget {
                    break;
                }
                open.push(name);
                closing += close_len(name);
            }
            Token::Close(name) => {
                let Some(pos) = open.iter().rposition(|n| *n == name) else {
                    rest = &rest[raw.len()..];
                    continue;
                };
                closing -= open.drain(pos..).map(close_len).sum::<usize>();
            }
            Token::Text => {
                if used + len + closing > budget {
                    break;
                }
            }
        }
        out.push_str(raw);
        used += len;
        rest = &rest[raw.len()..];
    }

    for name in open.iter().rev() {
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
    out.push('…');
    out
}

enum Token<'a> {
    Open(&'a str),
    Close(&'a str),
    Text,
}

/// Split the next tag, entity or single char off the front of `html`.
fn next_token(html: &str) -> (&str, Token<'_>) {
    if html.starts_with('<') {
        if let Some(end) = html.find('>') {
            let raw = &html[..=end];
            let inner = &raw[1..raw.len() - 1];
            return match inner.strip_prefix('/') {
                Some(name) => (raw, Token::Close(tag_name(name))),
                None => (raw, Token::Open(tag_name(inner))),
            };
        }
    }
    if html.starts_with('&') {
        if let Some(end) = html.find(';').filter(|&end| end <= 10) {
            let body = &html[1..end];
            if !body.is_empty() && body.chars().all(|c| c.is_ascii_alphanumeric() || c == '#') {
                return (&html[..=end], Token::Text);
            }
        }
    }
    let n = html.chars().next().map_or(0, char::len_utf8);
    (&html[..n], Token::Text)
}

fn tag_name(inner: &str) -> &str {
    inner
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .next()
        .unwrap_or("")
}

fn close_len(name: &str) -> usize {
    name.len() + 3
}

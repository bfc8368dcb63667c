//! Telegram channel: long-polls the Bot API for updates.
//!
//! Text messages, shared contacts and inline-button presses are turned into
//! `IncomingMessage`s. Menus go out as inline keyboards; a contact request
//! uses a one-time reply keyboard because inline buttons cannot ask for it.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::engine::EventKind;
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Label of the reply-keyboard button that shares the user's phone.
const SHARE_CONTACT_LABEL: &str = "📱 Отправить контакт";

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// Check if a username or numeric id is in the allowed list.
    pub fn is_user_allowed(&self, username: &str) -> bool {
        check_user_allowed(&self.allowed_users, [username])
    }

    /// Send a message, splitting text over Telegram's limit. The keyboard is
    /// attached to the last chunk only.
    async fn send_message(
        &self,
        chat_id: &str,
        response: &OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(&response.content, TELEGRAM_MAX_MESSAGE_LENGTH);
        let markup = reply_markup(response);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last { markup.as_ref() } else { None };
            self.send_message_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    /// Send a single message chunk (≤4096 bytes), HTML first with a plain
    /// text fallback.
    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        markup: Option<&Value>,
    ) -> Result<(), ChannelError> {
        let mut html_body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML"
        });
        if let Some(markup) = markup {
            html_body["reply_markup"] = markup.clone();
        }

        let html_resp = self.post("sendMessage", &html_body).await?;
        if html_resp.status().is_success() {
            return Ok(());
        }

        let html_status = html_resp.status();
        tracing::warn!(
            status = ?html_status,
            "Telegram sendMessage with HTML failed; retrying without parse_mode"
        );

        let mut plain_body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(markup) = markup {
            plain_body["reply_markup"] = markup.clone();
        }
        let plain_resp = self.post("sendMessage", &plain_body).await?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendMessage failed (html: {html_status}, plain: {plain_err})"),
            });
        }

        Ok(())
    }

    async fn post(&self, method: &str, body: &Value) -> Result<reqwest::Response, ChannelError> {
        self.client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            let url = api_url(&bot_token, "getUpdates");

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let results = match poll_results(&data) {
                    Ok(results) => results,
                    Err(reason) => {
                        tracing::warn!("Telegram getUpdates failed: {reason}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(parsed) = parse_update(update) else {
                        continue;
                    };

                    // Stop the button spinner whether or not the sender is allowed
                    if let Some(ref callback_id) = parsed.callback_id {
                        let _ = client
                            .post(api_url(&bot_token, "answerCallbackQuery"))
                            .json(&json!({ "callback_query_id": callback_id }))
                            .send()
                            .await;
                    }

                    let identities = [parsed.username.as_str(), parsed.message.user_id.as_str()];
                    if !check_user_allowed(&allowed_users, identities) {
                        tracing::warn!(
                            "Telegram: ignoring message from unauthorized user: \
                             username={}, user_id={}",
                            parsed.username,
                            parsed.message.user_id
                        );
                        continue;
                    }

                    if tx.send(parsed.message).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, recipient: &str, response: OutgoingResponse) -> Result<(), ChannelError> {
        self.send_message(recipient, &response).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &SecretString, method: &str) -> String {
    format!("https://api.telegram.org/bot{}/{method}", token.expose_secret())
}

/// The updates in a `getUpdates` reply, or why the API refused the call
/// (bad token, a competing poller, a webhook still set).
fn poll_results(data: &Value) -> Result<&Vec<Value>, String> {
    let ok = data.get("ok").and_then(Value::as_bool) == Some(true);
    if let Some(results) = data.get("result").and_then(Value::as_array).filter(|_| ok) {
        return Ok(results);
    }
    let code = data
        .get("error_code")
        .and_then(Value::as_i64)
        .map_or_else(|| "no error code".to_string(), |c| c.to_string());
    let description = data
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("no description");
    Err(format!("{code}: {description}"))
}

/// An update translated into a message, plus what is needed to acknowledge it.
#[derive(Debug)]
struct ParsedUpdate {
    message: IncomingMessage,
    username: String,
    /// Set for inline-button presses, which must be answered.
    callback_id: Option<String>,
}

/// Translate one `getUpdates` entry. Updates without usable content (stickers,
/// photos, edits) yield `None`.
///
/// The sender's chat id becomes the user id so replies route back to the
/// same chat.
fn parse_update(update: &Value) -> Option<ParsedUpdate> {
    if let Some(callback) = update.get("callback_query") {
        let data = callback.get("data").and_then(Value::as_str)?;
        let message = callback.get("message")?;
        // Buttons carry their index; the label lives in the message's markup
        let label = pressed_label(message, data).unwrap_or(data);
        let parsed = build_message(callback.get("from")?, message, label, EventKind::Choice)?;
        return Some(ParsedUpdate {
            callback_id: callback.get("id").and_then(Value::as_str).map(String::from),
            ..parsed
        });
    }

    let message = update.get("message")?;
    let from = message.get("from")?;
    if let Some(phone) = message
        .get("contact")
        .and_then(|c| c.get("phone_number"))
        .and_then(Value::as_str)
    {
        return build_message(from, message, phone, EventKind::Contact);
    }
    let text = message.get("text").and_then(Value::as_str)?;
    build_message(from, message, text, EventKind::Text)
}

fn build_message(
    from: &Value,
    message: &Value,
    content: &str,
    kind: EventKind,
) -> Option<ParsedUpdate> {
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?
        .to_string();
    let username = from
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let first_name = from.get("first_name").and_then(Value::as_str);
    let from_id = from.get("id").and_then(Value::as_i64);

    let mut incoming = IncomingMessage::new("telegram", &chat_id, content)
        .with_kind(kind)
        .with_metadata(json!({
            "chat_id": chat_id,
            "from_id": from_id,
            "username": username,
        }));
    if let Some(name) = first_name {
        incoming = incoming.with_user_name(name);
    }

    Some(ParsedUpdate {
        message: incoming,
        username,
        callback_id: None,
    })
}

/// Find the label of the inline button whose callback data is `data`.
fn pressed_label<'a>(message: &'a Value, data: &str) -> Option<&'a str> {
    message
        .get("reply_markup")?
        .get("inline_keyboard")?
        .as_array()?
        .iter()
        .filter_map(Value::as_array)
        .flatten()
        .find(|button| button.get("callback_data").and_then(Value::as_str) == Some(data))
        .and_then(|button| button.get("text"))
        .and_then(Value::as_str)
}

/// Keyboard for a response: inline buttons for menus, a one-time reply
/// keyboard when a contact is requested.
fn reply_markup(response: &OutgoingResponse) -> Option<Value> {
    let options = response.options.as_deref().unwrap_or_default();

    if response.request_contact {
        let mut rows = vec![json!([{ "text": SHARE_CONTACT_LABEL, "request_contact": true }])];
        rows.extend(options.iter().map(|o| json!([{ "text": o }])));
        return Some(json!({
            "keyboard": rows,
            "resize_keyboard": true,
            "one_time_keyboard": true
        }));
    }

    if options.is_empty() {
        return None;
    }
    // Callback data is capped at 64 bytes, so buttons carry their index
    let rows: Vec<Value> = options
        .iter()
        .enumerate()
        .map(|(i, o)| json!([{ "text": o, "callback_data": i.to_string() }]))
        .collect();
    Some(json!({ "inline_keyboard": rows }))
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's length limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(allowed: &[&str]) -> TelegramChannel {
        TelegramChannel::new(
            SecretString::from("123:ABC"),
            allowed.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel(&["*"]).name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        assert_eq!(
            channel(&[]).api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    #[test]
    fn poll_results_accepts_ok_reply() {
        let data = json!({"ok": true, "result": [{"update_id": 1}]});
        assert_eq!(poll_results(&data).unwrap().len(), 1);
    }

    #[test]
    fn poll_results_reports_api_error() {
        let data = json!({
            "ok": false,
            "error_code": 409,
            "description": "Conflict: terminated by other getUpdates request"
        });
        assert_eq!(
            poll_results(&data).unwrap_err(),
            "409: Conflict: terminated by other getUpdates request"
        );
    }

    #[test]
    fn poll_results_rejects_reply_without_result() {
        let err = poll_results(&json!({"ok": true})).unwrap_err();
        assert_eq!(err, "no error code: no description");
    }

    // ── User allowlist tests ────────────────────────────────────────

    #[test]
    fn telegram_user_allowed_wildcard() {
        assert!(channel(&["*"]).is_user_allowed("anyone"));
    }

    #[test]
    fn telegram_user_allowed_specific() {
        let ch = channel(&["alice", "bob"]);
        assert!(ch.is_user_allowed("alice"));
        assert!(!ch.is_user_allowed("eve"));
    }

    #[test]
    fn telegram_user_denied_empty() {
        assert!(!channel(&[]).is_user_allowed("anyone"));
    }

    #[test]
    fn telegram_user_allowed_by_numeric_id_identity() {
        let allowed = vec!["555".to_string()];
        assert!(check_user_allowed(&allowed, ["unknown", "555"]));
        assert!(!check_user_allowed(&allowed, ["mallory", "556"]));
    }

    // ── Update parsing ──────────────────────────────────────────────

    fn from() -> Value {
        json!({ "id": 555, "username": "anna_k", "first_name": "Анна" })
    }

    #[test]
    fn parse_text_message() {
        let update = json!({
            "update_id": 1,
            "message": { "from": from(), "chat": { "id": 555 }, "text": "/start" }
        });
        let parsed = parse_update(&update).unwrap();
        assert_eq!(parsed.message.kind, EventKind::Text);
        assert_eq!(parsed.message.content, "/start");
        assert_eq!(parsed.message.session_id(), "telegram:555");
        assert_eq!(parsed.message.user_name.as_deref(), Some("Анна"));
        assert_eq!(parsed.username, "anna_k");
        assert!(parsed.callback_id.is_none());
    }

    #[test]
    fn parse_contact_message() {
        let update = json!({
            "update_id": 2,
            "message": {
                "from": from(),
                "chat": { "id": 555 },
                "contact": { "phone_number": "+79123456789", "user_id": 555 }
            }
        });
        let parsed = parse_update(&update).unwrap();
        assert_eq!(parsed.message.kind, EventKind::Contact);
        assert_eq!(parsed.message.content, "+79123456789");
    }

    #[test]
    fn parse_button_press_resolves_label() {
        let update = json!({
            "update_id": 3,
            "callback_query": {
                "id": "cb-1",
                "from": from(),
                "data": "1",
                "message": {
                    "chat": { "id": 555 },
                    "reply_markup": { "inline_keyboard": [
                        [{ "text": "Да", "callback_data": "0" }],
                        [{ "text": "Нет", "callback_data": "1" }]
                    ]}
                }
            }
        });
        let parsed = parse_update(&update).unwrap();
        assert_eq!(parsed.message.kind, EventKind::Choice);
        assert_eq!(parsed.message.content, "Нет");
        assert_eq!(parsed.callback_id.as_deref(), Some("cb-1"));
    }

    #[test]
    fn parse_ignores_unsupported_updates() {
        let sticker = json!({
            "update_id": 4,
            "message": { "from": from(), "chat": { "id": 555 }, "sticker": {} }
        });
        assert!(parse_update(&sticker).is_none());
        assert!(parse_update(&json!({ "update_id": 5, "edited_message": {} })).is_none());
    }

    // ── Keyboards ───────────────────────────────────────────────────

    #[test]
    fn menu_becomes_inline_keyboard() {
        let response = OutgoingResponse {
            content: "?".into(),
            options: Some(vec!["Нет, только начал(а) интересоваться".into(), "Да".into()]),
            request_contact: false,
        };
        let markup = reply_markup(&response).unwrap();
        let rows = markup["inline_keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0]["callback_data"], "0");
        assert_eq!(rows[1][0]["text"], "Да");
    }

    #[test]
    fn contact_request_uses_reply_keyboard() {
        let response = OutgoingResponse {
            content: "phone?".into(),
            options: Some(vec!["⬅️ Назад".into()]),
            request_contact: true,
        };
        let markup = reply_markup(&response).unwrap();
        let rows = markup["keyboard"].as_array().unwrap();
        assert_eq!(rows[0][0]["request_contact"], true);
        assert_eq!(rows[1][0]["text"], "⬅️ Назад");
        assert_eq!(markup["one_time_keyboard"], true);
    }

    #[test]
    fn plain_text_has_no_keyboard() {
        assert!(reply_markup(&OutgoingResponse::text("hi")).is_none());
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        // Cyrillic letters are two bytes each
        let msg = "я".repeat(2500);
        let chunks = split_message(&msg, 4095);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 2047);
        assert_eq!(chunks.concat(), msg);
    }
}

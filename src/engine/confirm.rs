//! Confirm screen: summary rendering, submit and section edits.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::dispatch::Submission;
use crate::error::Error;
use crate::flow::{BACK_LABEL, FlowDefinition, Section};
use crate::session::Session;
use crate::validate::Rejection;

use super::command::{HELP_LABEL, NEW_REQUEST_LABEL};
use super::dialogue::{DialogueEngine, Outcome};
use super::event::{InboundEvent, PromptRequest};

/// Placeholder for fields the user never answered.
pub const UNSPECIFIED: &str = "Не указано";

pub const SUBMIT_LABEL: &str = "✅ Подтвердить";

const SUMMARY_QUESTION: &str = "Всё верно?";

const SUBMITTED_TEXT: &str = "✅ <b>Спасибо! Ваша заявка принята.</b>\n\n\
Наш специалист свяжется с вами в указанное время.";

const SUBMIT_FAILED_TEXT: &str = "⚠️ Не удалось отправить заявку. Ваши ответы сохранены, \
попробуйте подтвердить ещё раз чуть позже.";

/// What the user picked on the confirm screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAction {
    Submit,
    Edit(Section),
}

impl ConfirmAction {
    pub fn parse(payload: &str) -> Option<Self> {
        let label = payload.trim();
        if label == SUBMIT_LABEL {
            return Some(Self::Submit);
        }
        Section::from_edit_label(label).map(Self::Edit)
    }
}

/// Escape text for messages sent with HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Format one answer for an HTML message. Phones are stored without the
/// plus sign.
pub fn display_value(field: &str, value: Option<&str>) -> String {
    match value {
        Some(v) if field == "phone" => format!("+{}", escape_html(v)),
        Some(v) => escape_html(v),
        None => UNSPECIFIED.to_string(),
    }
}

/// Every section with its fields, in flow order.
pub fn render_sections(flow: &FlowDefinition, answers: &HashMap<String, String>) -> String {
    Section::ALL
        .iter()
        .map(|section| {
            let mut block = format!("<b>{}</b>", section.title());
            for step in flow.section_fields(*section) {
                let value = display_value(step.field, answers.get(step.field).map(String::as_str));
                block.push_str(&format!("\n{}: {value}", step.label));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Full confirm screen text.
pub fn render_summary(flow: &FlowDefinition, answers: &HashMap<String, String>) -> String {
    format!(
        "{}\n\n{}\n\n{SUMMARY_QUESTION}",
        flow.confirm().prompt,
        render_sections(flow, answers)
    )
}

/// Buttons on the confirm screen: submit, one edit per section, then Back.
pub fn confirm_options() -> Vec<String> {
    std::iter::once(SUBMIT_LABEL)
        .chain(Section::ALL.iter().map(Section::edit_label))
        .chain(std::iter::once(BACK_LABEL))
        .map(str::to_string)
        .collect()
}

impl DialogueEngine {
    /// Render the confirm screen, optionally with a retry hint on top.
    pub(crate) async fn show_confirm(
        &self,
        session: &Session,
        hint: Option<&str>,
    ) -> Result<(), Error> {
        let summary = render_summary(&self.flow, &session.answers);
        let text = match hint {
            Some(hint) => format!("{hint}\n\n{summary}"),
            None => summary,
        };
        let prompt = PromptRequest {
            session_id: session.session_id.clone(),
            step_id: Some(self.flow.confirm().id),
            text,
            options: Some(confirm_options()),
            request_contact: false,
        };
        self.outbound.present(prompt).await?;
        Ok(())
    }

    /// Input received while the session sits on the confirm step. Back is
    /// handled before this is reached.
    pub(crate) async fn handle_confirm(
        &self,
        session: Session,
        event: &InboundEvent,
    ) -> Result<Outcome, Error> {
        match ConfirmAction::parse(&event.payload) {
            Some(ConfirmAction::Submit) => self.submit(session).await,
            Some(ConfirmAction::Edit(section)) => self.edit_section(session, section).await,
            None => {
                let reason = Rejection::NotAnOption;
                self.show_confirm(&session, Some(&reason.message())).await?;
                Ok(Outcome::Reprompted {
                    step: self.flow.confirm().id,
                    reason,
                })
            }
        }
    }

    /// Re-enter the flow at the first step of `section`. Once the section is
    /// answered the user lands back on the confirm screen.
    async fn edit_section(&self, mut session: Session, section: Section) -> Result<Outcome, Error> {
        let Some(start) = self.flow.section_start(section) else {
            warn!(%section, "Section has no steps to edit");
            self.show_confirm(&session, None).await?;
            return Ok(Outcome::ConfirmShown);
        };

        session.editing = Some(section);
        session.jump_to(start.id);
        self.store.put(&session).await?;
        self.present_step(&session.session_id, start).await?;
        Ok(Outcome::EditStarted {
            section,
            step: start.id,
        })
    }

    /// Deliver the answers. At least one recipient must accept for the
    /// submission to count; otherwise the session is left untouched so the
    /// user can retry.
    async fn submit(&self, session: Session) -> Result<Outcome, Error> {
        let submission =
            Submission::application(session.session_id.clone(), session.answers.clone());
        let results = self.outbound.deliver(&submission).await;
        let delivered = results.iter().filter(|r| r.is_ok()).count();
        let failed = results.len() - delivered;

        if delivered == 0 {
            warn!(
                session = %session.session_id,
                submission = %submission.id,
                failed,
                "Submission reached no recipient"
            );
            self.show_confirm(&session, Some(SUBMIT_FAILED_TEXT)).await?;
            return Ok(Outcome::SubmitFailed { failed });
        }

        self.store.clear(&session.session_id).await?;
        info!(
            session = %session.session_id,
            submission = %submission.id,
            delivered,
            failed,
            "Application submitted"
        );
        let closing = PromptRequest::message(session.session_id.clone(), SUBMITTED_TEXT)
            .with_options(vec![NEW_REQUEST_LABEL.to_string(), HELP_LABEL.to_string()]);
        self.outbound.present(closing).await?;
        Ok(Outcome::Submitted {
            submission_id: submission.id,
            delivered,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::intake_flow;

    #[test]
    fn parse_confirm_actions() {
        assert_eq!(ConfirmAction::parse(SUBMIT_LABEL), Some(ConfirmAction::Submit));
        assert_eq!(
            ConfirmAction::parse(" ✏️ Контакты "),
            Some(ConfirmAction::Edit(Section::Contact))
        );
        assert_eq!(ConfirmAction::parse("да"), None);
        assert_eq!(ConfirmAction::parse(BACK_LABEL), None);
    }

    #[test]
    fn options_order() {
        assert_eq!(
            confirm_options(),
            vec![
                SUBMIT_LABEL,
                "✏️ Ситуация",
                "✏️ Готовность",
                "✏️ Контакты",
                BACK_LABEL
            ]
        );
    }

    #[test]
    fn display_value_formats_phone_and_missing() {
        assert_eq!(display_value("phone", Some("79123456789")), "+79123456789");
        assert_eq!(display_value("name", Some("Анна")), "Анна");
        assert_eq!(display_value("budget", None), UNSPECIFIED);
    }

    #[test]
    fn user_text_is_escaped_in_summary() {
        let flow = intake_flow().unwrap();
        let answers = HashMap::from([
            ("name".to_string(), "Tom <3 & Jerry".to_string()),
            ("contact_time".to_string(), "<b>всегда</b>".to_string()),
        ]);
        let text = render_summary(&flow, &answers);
        let name = text.lines().find(|l| l.starts_with("👤 Имя:")).unwrap();
        assert_eq!(name, "👤 Имя: Tom &lt;3 &amp; Jerry");
        assert!(text.contains("📅 Удобное время для связи: &lt;b&gt;всегда&lt;/b&gt;"));
        // Markup of the template itself is untouched
        assert!(text.contains("<b>Блок 3. Контактные данные</b>"));
    }

    #[test]
    fn escape_html_leaves_plain_text() {
        assert_eq!(escape_html("Анна Петрова"), "Анна Петрова");
        assert_eq!(escape_html("a<b>&c"), "a&lt;b&gt;&amp;c");
    }

    #[test]
    fn summary_lists_every_section() {
        let flow = intake_flow().unwrap();
        let answers = HashMap::from([
            ("location".to_string(), "В другом городе: Казань".to_string()),
            ("name".to_string(), "Анна".to_string()),
        ]);
        let text = render_summary(&flow, &answers);
        assert!(text.starts_with("📋 <b>Проверьте введенные данные:</b>"));
        assert!(text.ends_with(SUMMARY_QUESTION));
        for section in Section::ALL {
            assert!(text.contains(section.title()));
        }
        assert!(text.contains("📍 Желаемое расположение: В другом городе: Казань"));
        assert!(text.contains("👤 Имя: Анна"));
        assert!(text.contains("💰 Бюджет: Не указано"));
        // Satellite steps never get their own line
        assert_eq!(text.matches("Желаемое расположение").count(), 1);
    }
}

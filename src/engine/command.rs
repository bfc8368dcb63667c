//! Out-of-flow commands: restart, help, cancel and urgent requests.

use tracing::{info, warn};

use crate::dispatch::Submission;
use crate::error::Error;
use crate::session::Session;

use super::dialogue::{DialogueEngine, Outcome};
use super::event::{EventKind, InboundEvent, PromptRequest};

pub const NEW_REQUEST_LABEL: &str = "📋 Новая заявка";
pub const HELP_LABEL: &str = "❓ Помощь";

const GREETING: &str = "👋 <b>Здравствуйте!</b>\n\n\
Я помогу подобрать недвижимость. Ответьте на несколько вопросов, \
это займёт пару минут.\n\n\
<b>Блок 1. Жилищная ситуация</b>";

const HELP_TEXT: &str = "ℹ️ <b>Помощь</b>\n\n\
/start — начать новую заявку\n\
/help — показать эту справку\n\
/cancel — отменить текущую заявку\n\
/sos — срочно попросить специалиста перезвонить\n\n\
Кнопка «⬅️ Назад» возвращает к предыдущему вопросу.";

const CANCELLED_TEXT: &str = "Заявка отменена. Чтобы начать заново, нажмите «📋 Новая заявка».";

const URGENT_SENT_TEXT: &str = "🆘 Ваш запрос отправлен! Специалист свяжется с вами в ближайшее время.";

const URGENT_FAILED_TEXT: &str = "⚠️ Не удалось отправить срочный запрос. Пожалуйста, попробуйте ещё раз чуть позже.";

/// A command recognized regardless of the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Cancel,
    Sos,
}

impl Command {
    /// Recognize a command in a text or button event. Contacts are never
    /// commands.
    pub fn parse(event: &InboundEvent) -> Option<Self> {
        if event.kind == EventKind::Contact {
            return None;
        }
        let trimmed = event.payload.trim();
        match trimmed {
            NEW_REQUEST_LABEL => return Some(Self::Start),
            HELP_LABEL => return Some(Self::Help),
            _ => {}
        }

        // Group chats append the bot name: /start@intake_bot
        let word = trimmed.split_whitespace().next()?;
        let command = word.split('@').next().unwrap_or(word).to_lowercase();
        match command.as_str() {
            "/start" => Some(Self::Start),
            "/help" => Some(Self::Help),
            "/cancel" => Some(Self::Cancel),
            "/sos" => Some(Self::Sos),
            _ => None,
        }
    }
}

fn menu() -> Vec<String> {
    vec![NEW_REQUEST_LABEL.to_string(), HELP_LABEL.to_string()]
}

impl DialogueEngine {
    pub(crate) async fn handle_command(
        &self,
        command: Command,
        event: &InboundEvent,
    ) -> Result<Outcome, Error> {
        match command {
            Command::Start => self.restart(&event.session_id).await,
            Command::Help => self.help(&event.session_id).await,
            Command::Cancel => self.cancel(&event.session_id).await,
            Command::Sos => self.urgent(event).await,
        }
    }

    /// Throw away any progress and ask the entry question.
    pub(crate) async fn restart(&self, session_id: &str) -> Result<Outcome, Error> {
        self.store.clear(session_id).await?;
        let session = Session::new(session_id, self.flow.entry().id);
        self.store.put(&session).await?;
        info!(session = %session_id, "Session started");

        self.outbound
            .present(PromptRequest::message(session_id, GREETING))
            .await?;
        self.present_step(session_id, self.flow.entry()).await?;
        Ok(Outcome::Restarted)
    }

    /// Show help, then repeat whatever the user was being asked.
    async fn help(&self, session_id: &str) -> Result<Outcome, Error> {
        let session = self.store.get(session_id).await?;
        let help = PromptRequest::message(session_id, HELP_TEXT);
        let help = match session {
            Some(_) => help,
            None => help.with_options(menu()),
        };
        self.outbound.present(help).await?;

        if let Some(session) = session {
            self.present_current(&session).await?;
        }
        Ok(Outcome::HelpShown)
    }

    async fn cancel(&self, session_id: &str) -> Result<Outcome, Error> {
        let existed = self.store.clear(session_id).await?;
        info!(session = %session_id, existed, "Session cancelled");
        self.outbound
            .present(PromptRequest::message(session_id, CANCELLED_TEXT).with_options(menu()))
            .await?;
        Ok(Outcome::Cancelled)
    }

    /// Send whatever is known about the user to operators right away. The
    /// session itself is left as it was.
    async fn urgent(&self, event: &InboundEvent) -> Result<Outcome, Error> {
        let mut answers = self
            .store
            .get(&event.session_id)
            .await?
            .map(|s| s.answers)
            .unwrap_or_default();
        if let Some(name) = event.display_name.as_ref().filter(|n| !n.trim().is_empty()) {
            answers.entry("name".to_string()).or_insert_with(|| name.clone());
        }

        let submission = Submission::urgent(event.session_id.clone(), answers);
        let results = self.outbound.deliver(&submission).await;
        let delivered = results.iter().any(|r| r.is_ok());
        let text = if delivered {
            URGENT_SENT_TEXT
        } else {
            warn!(
                session = %event.session_id,
                submission = %submission.id,
                "Urgent request reached no recipient"
            );
            URGENT_FAILED_TEXT
        };

        self.outbound
            .present(PromptRequest::message(event.session_id.clone(), text).with_options(menu()))
            .await?;
        Ok(Outcome::UrgentSent { delivered })
    }
}

//! Operator notifications.

use std::sync::Arc;

use async_trait::async_trait;

use crate::channels::{Channel, OutgoingResponse};
use crate::engine::confirm::{display_value, render_sections};
use crate::error::DeliveryError;
use crate::flow::FlowDefinition;

use super::{Recipient, Submission, SubmissionKind};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Build the operator-facing text for a submission.
pub fn format_submission(flow: &FlowDefinition, submission: &Submission) -> String {
    let when = submission.submitted_at.format(TIMESTAMP_FORMAT);
    let field = |name: &str| display_value(name, submission.answer(name));

    match submission.kind {
        SubmissionKind::Application => format!(
            "🔔 <b>Новая заявка!</b>\n\n{}\n\n🆔 ID пользователя: {}\n⏰ Время заявки: {when}",
            render_sections(flow, &submission.answers),
            submission.user_id(),
        ),
        SubmissionKind::Urgent => format!(
            "🆘 <b>SOS запрос!</b>\n\nОт: {}\n📱 Телефон: {}\n🆔 ID пользователя: {}\n⏰ Время запроса: {when}",
            field("name"),
            field("phone"),
            submission.user_id(),
        ),
    }
}

/// Sends each submission to one operator chat.
pub struct AdminNotifier {
    name: String,
    chat_id: String,
    channel: Arc<dyn Channel>,
    flow: Arc<FlowDefinition>,
}

impl AdminNotifier {
    pub fn new(
        channel: Arc<dyn Channel>,
        chat_id: impl Into<String>,
        flow: Arc<FlowDefinition>,
    ) -> Self {
        let chat_id = chat_id.into();
        Self {
            name: format!("admin:{chat_id}"),
            chat_id,
            channel,
            flow,
        }
    }
}

#[async_trait]
impl Recipient for AdminNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, submission: &Submission) -> Result<(), DeliveryError> {
        let text = format_submission(&self.flow, submission);
        self.channel
            .send(&self.chat_id, OutgoingResponse::text(text))
            .await
            .map_err(|e| DeliveryError::Unreachable {
                recipient: self.name.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio::sync::Mutex;

    use super::*;
    use crate::channels::MessageStream;
    use crate::error::ChannelError;
    use crate::flow::intake_flow;

    #[derive(Default)]
    struct Capture {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Channel for Capture {
        fn name(&self) -> &str {
            "capture"
        }
        async fn start(&self) -> Result<MessageStream, ChannelError> {
            Ok(Box::pin(futures::stream::empty()))
        }
        async fn send(
            &self,
            recipient: &str,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            if self.fail {
                return Err(ChannelError::SendFailed {
                    name: "capture".into(),
                    reason: "chat not found".into(),
                });
            }
            self.sent
                .lock()
                .await
                .push((recipient.to_string(), response.content));
            Ok(())
        }
        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn answers() -> HashMap<String, String> {
        HashMap::from([
            ("name".to_string(), "Анна".to_string()),
            ("phone".to_string(), "79123456789".to_string()),
            ("mortgage".to_string(), "Да".to_string()),
        ])
    }

    #[test]
    fn application_lists_sections_and_user() {
        let flow = intake_flow().unwrap();
        let submission = Submission::application("telegram:555", answers());
        let text = format_submission(&flow, &submission);
        assert!(text.starts_with("🔔 <b>Новая заявка!</b>"));
        assert!(text.contains("Блок 2. Готовность к покупке"));
        assert!(text.contains("🏦 Ипотека: Да"));
        assert!(text.contains("📱 Телефон: +79123456789"));
        assert!(text.contains("🏠 Текущее жилье: Не указано"));
        assert!(text.contains("🆔 ID пользователя: 555"));
    }

    #[test]
    fn urgent_is_short() {
        let flow = intake_flow().unwrap();
        let submission = Submission::urgent("telegram:555", HashMap::new());
        let text = format_submission(&flow, &submission);
        assert!(text.starts_with("🆘 <b>SOS запрос!</b>"));
        assert!(text.contains("От: Не указано"));
        assert!(text.contains("📱 Телефон: Не указано"));
        assert!(!text.contains("Блок 1"));
    }

    #[test]
    fn answers_are_escaped_for_html() {
        let flow = intake_flow().unwrap();
        let answers = HashMap::from([("name".to_string(), "Tom <3 & Jerry".to_string())]);

        let urgent = format_submission(&flow, &Submission::urgent("telegram:5", answers.clone()));
        assert!(urgent.contains("От: Tom &lt;3 &amp; Jerry"));
        assert!(!urgent.contains("<3"));

        let application = format_submission(&flow, &Submission::application("telegram:5", answers));
        assert!(application.contains("👤 Имя: Tom &lt;3 &amp; Jerry"));
    }

    #[tokio::test]
    async fn notifier_sends_to_its_chat() {
        let channel = Arc::new(Capture::default());
        let flow = Arc::new(intake_flow().unwrap());
        let notifier = AdminNotifier::new(channel.clone(), "900", flow);
        assert_eq!(notifier.name(), "admin:900");

        notifier
            .deliver(&Submission::application("telegram:1", answers()))
            .await
            .unwrap();
        let sent = channel.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "900");
    }

    #[tokio::test]
    async fn notifier_maps_channel_failure() {
        let channel = Arc::new(Capture {
            fail: true,
            ..Default::default()
        });
        let notifier = AdminNotifier::new(channel, "900", Arc::new(intake_flow().unwrap()));
        let err = notifier
            .deliver(&Submission::urgent("telegram:1", HashMap::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Unreachable { .. }));
    }
}

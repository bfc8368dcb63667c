//! Dialogue engine: drives one user through the flow, one event at a time.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch::Outbound;
use crate::error::Error;
use crate::flow::{BACK_LABEL, FlowDefinition, Section, Step, StepId};
use crate::session::{Session, SessionLocks, SessionStore};
use crate::validate::{Rejection, ValidationOutcome, Validator};

use super::command::Command;
use super::event::{EventKind, InboundEvent, PromptRequest};

/// What handling one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// First contact: a session was created and the entry step asked.
    Started { step: StepId },
    /// Answer accepted, next step asked.
    Prompted { step: StepId },
    /// Answer rejected, same step asked again.
    Reprompted { step: StepId, reason: Rejection },
    WentBack { step: StepId },
    ConfirmShown,
    EditStarted { section: Section, step: StepId },
    Submitted {
        submission_id: Uuid,
        delivered: usize,
        failed: usize,
    },
    SubmitFailed { failed: usize },
    Restarted,
    Cancelled,
    HelpShown,
    UrgentSent { delivered: bool },
}

/// Owns no per-user state itself; everything lives in the session store.
pub struct DialogueEngine {
    pub(super) flow: Arc<FlowDefinition>,
    pub(super) store: Arc<dyn SessionStore>,
    pub(super) outbound: Arc<dyn Outbound>,
    locks: Arc<SessionLocks>,
}

impl DialogueEngine {
    pub fn new(
        flow: Arc<FlowDefinition>,
        store: Arc<dyn SessionStore>,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self::with_locks(flow, store, outbound, SessionLocks::new())
    }

    /// Share a lock table with other components (the idle sweeper).
    pub fn with_locks(
        flow: Arc<FlowDefinition>,
        store: Arc<dyn SessionStore>,
        outbound: Arc<dyn Outbound>,
        locks: Arc<SessionLocks>,
    ) -> Self {
        Self {
            flow,
            store,
            outbound,
            locks,
        }
    }

    pub fn flow(&self) -> &FlowDefinition {
        &self.flow
    }

    pub fn locks(&self) -> Arc<SessionLocks> {
        Arc::clone(&self.locks)
    }

    /// Process one inbound event. Events for the same session are handled
    /// strictly one after another.
    pub async fn handle(&self, event: InboundEvent) -> Result<Outcome, Error> {
        let _guard = self.locks.acquire(&event.session_id).await;

        if let Some(command) = Command::parse(&event) {
            debug!(session = %event.session_id, ?command, "Command received");
            return self.handle_command(command, &event).await;
        }

        let Some(session) = self.store.get(&event.session_id).await? else {
            return self.start(&event.session_id).await;
        };
        let Some(step) = self.flow.step(&session.current) else {
            warn!(
                session = %event.session_id,
                step = %session.current,
                "Session points at an unknown step, starting over"
            );
            return self.restart(&event.session_id).await;
        };

        if is_back(&event) {
            return self.go_back(session, step).await;
        }
        if step.terminal {
            return self.handle_confirm(session, &event).await;
        }

        match step.validator.validate(step, event.kind, &event.payload) {
            ValidationOutcome::Accepted(value) => self.accept(session, step, value).await,
            ValidationOutcome::Rejected(reason) => {
                debug!(session = %session.session_id, step = %step.id, ?reason, "Input rejected");
                self.present_rejection(&session.session_id, step, &reason).await?;
                Ok(Outcome::Reprompted { step: step.id, reason })
            }
        }
    }

    /// First event from an unknown user. The event only opens the dialogue;
    /// it is not taken as an answer.
    async fn start(&self, session_id: &str) -> Result<Outcome, Error> {
        let session = Session::new(session_id, self.flow.entry().id);
        self.store.put(&session).await?;
        info!(session = %session_id, "Session created");
        self.present_step(session_id, self.flow.entry()).await?;
        Ok(Outcome::Started {
            step: self.flow.entry().id,
        })
    }

    /// Follow the step's static back edge. A step without one starts over.
    async fn go_back(&self, mut session: Session, step: &Step) -> Result<Outcome, Error> {
        let Some(target) = step.back.and_then(|id| self.flow.step(id.as_str())) else {
            return self.restart(&session.session_id).await;
        };

        session.rewind_to(target.id);
        self.store.put(&session).await?;
        debug!(session = %session.session_id, from = %step.id, to = %target.id, "Went back");
        self.present_step(&session.session_id, target).await?;
        Ok(Outcome::WentBack { step: target.id })
    }

    async fn accept(
        &self,
        mut session: Session,
        step: &Step,
        value: String,
    ) -> Result<Outcome, Error> {
        let confirm = self.flow.confirm();
        let mut next = step
            .transition
            .next(&value)
            .and_then(|id| self.flow.step(id.as_str()))
            .unwrap_or(confirm);

        // While editing a section, leaving it returns straight to the summary
        if let Some(section) = session.editing {
            if next.section != section {
                next = confirm;
            }
        }

        let stored = match step.value_prefix {
            Some(prefix) => format!("{prefix}{value}"),
            None => value,
        };
        session.advance(step.field, stored, next.id);
        if next.terminal {
            session.editing = None;
        }
        self.store.put(&session).await?;
        debug!(session = %session.session_id, from = %step.id, to = %next.id, "Answer accepted");

        if let Some(note) = step.note {
            self.outbound
                .present(PromptRequest::message(session.session_id.clone(), note))
                .await?;
        }

        if next.terminal {
            self.show_confirm(&session, None).await?;
            Ok(Outcome::ConfirmShown)
        } else {
            self.present_step(&session.session_id, next).await?;
            Ok(Outcome::Prompted { step: next.id })
        }
    }

    /// Ask whatever the session is currently waiting for.
    pub(crate) async fn present_current(&self, session: &Session) -> Result<(), Error> {
        match self.flow.step(&session.current) {
            Some(step) if step.terminal => self.show_confirm(session, None).await,
            Some(step) => self.present_step(&session.session_id, step).await,
            None => self.present_step(&session.session_id, self.flow.entry()).await,
        }
    }

    pub(crate) async fn present_step(&self, session_id: &str, step: &Step) -> Result<(), Error> {
        self.outbound.present(step_prompt(session_id, step, None)).await?;
        Ok(())
    }

    async fn present_rejection(
        &self,
        session_id: &str,
        step: &Step,
        reason: &Rejection,
    ) -> Result<(), Error> {
        self.outbound
            .present(step_prompt(session_id, step, Some(&reason.message())))
            .await?;
        Ok(())
    }
}

fn step_prompt(session_id: &str, step: &Step, hint: Option<&str>) -> PromptRequest {
    let text = match hint {
        Some(hint) => format!("{hint}\n\n{}", step.prompt),
        None => step.prompt.to_string(),
    };
    PromptRequest {
        session_id: session_id.to_string(),
        step_id: Some(step.id),
        text,
        options: step.display_options(),
        request_contact: step.validator == Validator::Phone,
    }
}

fn is_back(event: &InboundEvent) -> bool {
    event.kind != EventKind::Contact && event.payload.trim() == BACK_LABEL
}

//! Step nodes of the dialogue graph.

use serde::{Deserialize, Serialize};

use crate::validate::Validator;

/// Reserved option label that asks to go back one step.
pub const BACK_LABEL: &str = "⬅️ Назад";

/// Unique name of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StepId(pub &'static str);

impl StepId {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Logical group of steps, used for the confirm summary and section edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Situation,
    Readiness,
    Contact,
}

impl Section {
    /// All sections in summary order.
    pub const ALL: [Section; 3] = [Section::Situation, Section::Readiness, Section::Contact];

    /// Heading shown in the confirm summary.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Situation => "Блок 1. Жилищная ситуация",
            Self::Readiness => "Блок 2. Готовность к покупке",
            Self::Contact => "Блок 3. Контактные данные",
        }
    }

    /// Label of the confirm-screen button that edits this section.
    pub fn edit_label(&self) -> &'static str {
        match self {
            Self::Situation => "✏️ Ситуация",
            Self::Readiness => "✏️ Готовность",
            Self::Contact => "✏️ Контакты",
        }
    }

    /// Resolve an edit button label back to its section.
    pub fn from_edit_label(label: &str) -> Option<Section> {
        Self::ALL.into_iter().find(|s| s.edit_label() == label)
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Situation => "situation",
            Self::Readiness => "readiness",
            Self::Contact => "contact",
        };
        write!(f, "{s}")
    }
}

/// How the next step is chosen once a step's input is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Always advance to the same step.
    Next(StepId),
    /// Route on the accepted value; anything unlisted goes to `otherwise`.
    Branch {
        routes: Vec<(&'static str, StepId)>,
        otherwise: StepId,
    },
    /// No outgoing edge (terminal step).
    End,
}

impl Transition {
    /// Compute the next step for an accepted value.
    pub fn next(&self, value: &str) -> Option<StepId> {
        match self {
            Self::Next(id) => Some(*id),
            Self::Branch { routes, otherwise } => Some(
                routes
                    .iter()
                    .find(|(label, _)| *label == value)
                    .map(|(_, id)| *id)
                    .unwrap_or(*otherwise),
            ),
            Self::End => None,
        }
    }

    /// Every step this transition may lead to.
    pub fn targets(&self) -> Vec<StepId> {
        match self {
            Self::Next(id) => vec![*id],
            Self::Branch { routes, otherwise } => routes
                .iter()
                .map(|(_, id)| *id)
                .chain(std::iter::once(*otherwise))
                .collect(),
            Self::End => Vec::new(),
        }
    }
}

/// One question of the form.
#[derive(Debug, Clone)]
pub struct Step {
    pub id: StepId,
    /// Answer key this step writes. Satellite steps share their parent's field.
    pub field: &'static str,
    /// Human-readable field label for summaries.
    pub label: &'static str,
    pub section: Section,
    pub prompt: &'static str,
    /// Closed set of choices, in display order. Empty for free-text steps.
    pub options: Vec<&'static str>,
    pub validator: Validator,
    pub transition: Transition,
    /// Back-edge target, if any.
    pub back: Option<StepId>,
    /// Prepended to the accepted value before it is stored.
    pub value_prefix: Option<&'static str>,
    /// Informational message sent after the step is answered.
    pub note: Option<&'static str>,
    pub terminal: bool,
}

impl Step {
    /// Start a step with the given id, field and section. Defaults to a
    /// non-blank free-text question.
    pub fn new(id: &'static str, field: &'static str, section: Section) -> Self {
        Self {
            id: StepId(id),
            field,
            label: field,
            section,
            prompt: "",
            options: Vec::new(),
            validator: Validator::FreeText { min_chars: 1 },
            transition: Transition::End,
            back: None,
            value_prefix: None,
            note: None,
            terminal: false,
        }
    }

    pub fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn prompt(mut self, prompt: &'static str) -> Self {
        self.prompt = prompt;
        self
    }

    /// Make this a closed-choice step.
    pub fn choices(mut self, options: &[&'static str]) -> Self {
        self.options = options.to_vec();
        self.validator = Validator::Choice {
            allow_free_text: false,
        };
        self
    }

    /// Closed-choice step that also accepts typed free text.
    pub fn choices_or_text(mut self, options: &[&'static str]) -> Self {
        self.options = options.to_vec();
        self.validator = Validator::Choice {
            allow_free_text: true,
        };
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn next(mut self, target: &'static str) -> Self {
        self.transition = Transition::Next(StepId(target));
        self
    }

    pub fn branch(
        mut self,
        routes: &[(&'static str, &'static str)],
        otherwise: &'static str,
    ) -> Self {
        self.transition = Transition::Branch {
            routes: routes.iter().map(|(l, t)| (*l, StepId(*t))).collect(),
            otherwise: StepId(otherwise),
        };
        self
    }

    pub fn back(mut self, target: &'static str) -> Self {
        self.back = Some(StepId(target));
        self
    }

    pub fn value_prefix(mut self, prefix: &'static str) -> Self {
        self.value_prefix = Some(prefix);
        self
    }

    pub fn note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self.transition = Transition::End;
        self
    }

    /// Whether this step stores into a field first written by another step.
    pub fn is_satellite(&self) -> bool {
        self.field != self.id.as_str()
    }

    /// Options as shown to the user, with the Back button appended when the
    /// step has a back edge. `None` for free-text steps without Back.
    pub fn display_options(&self) -> Option<Vec<String>> {
        let mut options: Vec<String> = self.options.iter().map(|o| o.to_string()).collect();
        if self.back.is_some() {
            options.push(BACK_LABEL.to_string());
        }
        if options.is_empty() {
            None
        } else {
            Some(options)
        }
    }
}

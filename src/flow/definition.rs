//! Immutable, validated step graph.

use std::collections::{HashMap, HashSet};

use crate::error::FlowError;

use super::step::{Section, Step, StepId, Transition};

/// The whole form: steps, their transitions and back edges.
///
/// Built once at startup and shared read-only across sessions.
#[derive(Debug)]
pub struct FlowDefinition {
    steps: Vec<Step>,
    index: HashMap<&'static str, usize>,
    entry: StepId,
    confirm: StepId,
}

impl FlowDefinition {
    /// Build and validate a flow. Any structural problem is a configuration
    /// error.
    pub fn new(steps: Vec<Step>, entry: &'static str) -> Result<Self, FlowError> {
        if steps.is_empty() {
            return Err(FlowError::Empty);
        }

        let mut index = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.id.as_str(), i).is_some() {
                return Err(FlowError::DuplicateStep(step.id.to_string()));
            }
        }

        if !index.contains_key(entry) {
            return Err(FlowError::UnknownEntry(entry.to_string()));
        }

        let terminals: Vec<&Step> = steps.iter().filter(|s| s.terminal).collect();
        if terminals.len() != 1 {
            return Err(FlowError::TerminalCount(terminals.len()));
        }
        let confirm = terminals[0].id;

        for step in &steps {
            let targets = step.transition.targets();
            if targets.is_empty() && !step.terminal {
                return Err(FlowError::DeadEnd(step.id.to_string()));
            }
            for target in targets {
                if !index.contains_key(target.as_str()) {
                    return Err(FlowError::UnknownTarget {
                        from: step.id.to_string(),
                        target: target.to_string(),
                    });
                }
            }
            if let Some(back) = step.back.filter(|b| !index.contains_key(b.as_str())) {
                return Err(FlowError::UnknownBackTarget {
                    from: step.id.to_string(),
                    target: back.to_string(),
                });
            }
            if let Transition::Branch { routes, .. } = &step.transition {
                let declared: HashSet<&str> = step.options.iter().copied().collect();
                let undeclared = routes.iter().find(|(label, _)| !declared.contains(label));
                if let Some((label, _)) = undeclared {
                    return Err(FlowError::UndeclaredBranch {
                        step: step.id.to_string(),
                        label: label.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            steps,
            index,
            entry: StepId(entry),
            confirm,
        })
    }

    /// Look up a step by name.
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.index.get(name).map(|&i| &self.steps[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// The first step of the flow.
    pub fn entry(&self) -> &Step {
        &self.steps[self.index[self.entry.as_str()]]
    }

    /// The terminal confirmation step.
    pub fn confirm(&self) -> &Step {
        &self.steps[self.index[self.confirm.as_str()]]
    }

    /// All steps in declaration order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Non-terminal steps of a section, in declaration order.
    pub fn section_steps(&self, section: Section) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(move |s| !s.terminal && s.section == section)
    }

    /// The step a section edit jumps to.
    pub fn section_start(&self, section: Section) -> Option<&Step> {
        self.section_steps(section).next()
    }

    /// Fields of a section in summary order (satellites share their parent's
    /// field and are not listed separately).
    pub fn section_fields(&self, section: Section) -> impl Iterator<Item = &Step> {
        self.section_steps(section).filter(|s| !s.is_satellite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> Vec<Step> {
        vec![
            Step::new("a", "a", Section::Situation).next("b"),
            Step::new("b", "b", Section::Readiness).back("a").next("confirm"),
            Step::new("confirm", "confirm", Section::Contact).back("b").terminal(),
        ]
    }

    #[test]
    fn valid_flow_builds() {
        let flow = FlowDefinition::new(linear(), "a").unwrap();
        assert_eq!(flow.entry().id, StepId("a"));
        assert_eq!(flow.confirm().id, StepId("confirm"));
        assert!(flow.contains("b"));
        assert!(flow.step("missing").is_none());
        assert_eq!(flow.section_start(Section::Readiness).map(|s| s.id), Some(StepId("b")));
        // Terminal steps never count as section members
        assert!(flow.section_start(Section::Contact).is_none());
    }

    #[test]
    fn empty_flow_rejected() {
        assert_eq!(FlowDefinition::new(vec![], "a").unwrap_err(), FlowError::Empty);
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut steps = linear();
        steps.push(Step::new("b", "b", Section::Contact).next("confirm"));
        assert_eq!(
            FlowDefinition::new(steps, "a").unwrap_err(),
            FlowError::DuplicateStep("b".into())
        );
    }

    #[test]
    fn unknown_entry_rejected() {
        assert_eq!(
            FlowDefinition::new(linear(), "zzz").unwrap_err(),
            FlowError::UnknownEntry("zzz".into())
        );
    }

    #[test]
    fn unknown_transition_target_rejected() {
        let mut steps = linear();
        steps[0] = Step::new("a", "a", Section::Situation).next("nowhere");
        assert_eq!(
            FlowDefinition::new(steps, "a").unwrap_err(),
            FlowError::UnknownTarget {
                from: "a".into(),
                target: "nowhere".into()
            }
        );
    }

    #[test]
    fn unknown_back_target_rejected() {
        let mut steps = linear();
        steps[1] = Step::new("b", "b", Section::Readiness).back("ghost").next("confirm");
        assert!(matches!(
            FlowDefinition::new(steps, "a").unwrap_err(),
            FlowError::UnknownBackTarget { .. }
        ));
    }

    #[test]
    fn branch_on_undeclared_option_rejected() {
        let mut steps = linear();
        steps[0] = Step::new("a", "a", Section::Situation)
            .choices(&["x", "y"])
            .branch(&[("z", "b")], "b");
        assert_eq!(
            FlowDefinition::new(steps, "a").unwrap_err(),
            FlowError::UndeclaredBranch {
                step: "a".into(),
                label: "z".into()
            }
        );
    }

    #[test]
    fn dead_end_rejected() {
        let mut steps = linear();
        steps[1] = Step::new("b", "b", Section::Readiness).back("a");
        assert_eq!(
            FlowDefinition::new(steps, "a").unwrap_err(),
            FlowError::DeadEnd("b".into())
        );
    }

    #[test]
    fn terminal_count_enforced() {
        let steps = vec![
            Step::new("a", "a", Section::Situation).next("b"),
            Step::new("b", "b", Section::Readiness).next("a"),
        ];
        assert_eq!(
            FlowDefinition::new(steps, "a").unwrap_err(),
            FlowError::TerminalCount(0)
        );
    }
}

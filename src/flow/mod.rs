//! Flow definition: the declarative step graph of the intake form.

pub mod definition;
pub mod intake;
pub mod step;

pub use definition::FlowDefinition;
pub use intake::intake_flow;
pub use step::{BACK_LABEL, Section, Step, StepId, Transition};

//! Instruction text for agents. Real prompt construction lives outside the
//! engine; `PlainInstructions` is a minimal stand-in.

use crate::plan::Task;

use super::traits::{Purpose, TaskInvocation};

/// Plan-wide context every instruction may draw on.
#[derive(Debug, Clone, Default)]
pub struct PlanContext {
    pub goal: String,
    pub data_schemas: String,
}

pub trait InstructionSource: Send + Sync {
    fn task_instructions(&self, plan: &PlanContext, invocation: &TaskInvocation) -> String;

    fn fix_instructions(
        &self,
        plan: &PlanContext,
        invocation: &TaskInvocation,
        failure: &str,
    ) -> String;

    fn instructions(&self, plan: &PlanContext, invocation: &TaskInvocation) -> String {
        match &invocation.purpose {
            Purpose::Primary => self.task_instructions(plan, invocation),
            Purpose::Fix { failure } => self.fix_instructions(plan, invocation, failure),
        }
    }

    /// Instructions for the single retry after a stall or timeout.
    fn retry_context(&self, instructions: &str, report: &str) -> String {
        format!(
            "{instructions}\n\n## Previous attempt\n\
             A previous attempt at this task was stopped:\n{report}\n\n\
             Check for partially completed work before repeating it, and do not \
             repeat the approach that got stuck."
        )
    }
}

pub struct PlainInstructions;

fn list(label: &str, items: &[String]) -> String {
    if items.is_empty() {
        String::new()
    } else {
        format!("\n{label}: {}", items.join(", "))
    }
}

fn header(plan: &PlanContext, invocation: &TaskInvocation) -> String {
    let mut out = format!("Goal: {}\nWave: {}", plan.goal, invocation.wave);
    if let Some(feature) = &invocation.feature {
        out.push_str(&format!("\nFeature: {feature}"));
    }
    if !plan.data_schemas.is_empty() {
        out.push_str(&format!("\n\n## Data schemas\n{}", plan.data_schemas));
    }
    out
}

fn describe(task: &Task) -> String {
    format!(
        "## Task {}: {}\n{}{}{}",
        task.id,
        task.title,
        task.description,
        list("Files", &task.files),
        list("Test files", &task.test_files),
    )
}

impl InstructionSource for PlainInstructions {
    fn task_instructions(&self, plan: &PlanContext, invocation: &TaskInvocation) -> String {
        format!(
            "{}\n\nRole: {}\n\n{}",
            header(plan, invocation),
            invocation.role(),
            describe(&invocation.task)
        )
    }

    fn fix_instructions(
        &self,
        plan: &PlanContext,
        invocation: &TaskInvocation,
        failure: &str,
    ) -> String {
        format!(
            "{}\n\nRole: implementer\n\nVerification task {} failed. Fix the \
             implementation so it passes; do not modify its tests.\n\n{}\n\n\
             ## Failure output\n{failure}{}",
            header(plan, invocation),
            invocation.task.id,
            describe(&invocation.task),
            list("You may modify", &invocation.access.write_allow),
        )
    }
}

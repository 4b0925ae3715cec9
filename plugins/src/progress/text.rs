use weaver_core::executor::{ProgressEvent, ProgressSink, TaskResult};

/// One line per event on stderr.
pub struct TextProgress {
    ascii_only: bool,
}

impl TextProgress {
    pub fn new(ascii_only: bool) -> Self {
        Self { ascii_only }
    }

    fn status(&self, result: &TaskResult) -> &'static str {
        match (result.succeeded(), result.is_skipped(), self.ascii_only) {
            (true, _, true) => "OK",
            (true, _, false) => "✔",
            (_, true, true) => "SKIP",
            (_, true, false) => "↷",
            (_, _, true) => "FAIL",
            (_, _, false) => "✘",
        }
    }

    pub(crate) fn format_event(&self, event: &ProgressEvent) -> String {
        match event {
            ProgressEvent::PhaseStarted { wave, name, phase } => {
                format!("WAVE {wave} {name}: {phase}")
            }
            ProgressEvent::TaskStarted {
                task_id,
                title,
                role,
                feature,
            } => match feature {
                Some(f) => format!("  TASK START {task_id} [{role}] ({f}) {title}"),
                None => format!("  TASK START {task_id} [{role}] {title}"),
            },
            ProgressEvent::TaskFinished { result, .. } => {
                let mut line = format!(
                    "  TASK END {} {} (exit {}, {}ms)",
                    self.status(result),
                    result.id,
                    result.exit_code,
                    result.duration_ms
                );
                if !result.succeeded() {
                    if let Some(first) = result.diagnostic.lines().next() {
                        line.push_str(&format!(": {first}"));
                    }
                }
                line
            }
            ProgressEvent::FixCycleStarted { task_id, .. } => {
                format!("  FIX {task_id}: verification failed, repairing")
            }
            ProgressEvent::StallRetry { task_id, report } => {
                format!("  RETRY {task_id}: {report}")
            }
            ProgressEvent::MergeFinished { merge } => {
                if merge.success {
                    format!("  MERGE {} -> {}", merge.source, merge.target)
                } else {
                    format!(
                        "  MERGE FAILED {} -> {}: {}",
                        merge.source,
                        merge.target,
                        merge.error.as_deref().unwrap_or("unknown error")
                    )
                }
            }
            ProgressEvent::WaveFinished { wave, name, passed } => {
                let verdict = if *passed { "passed" } else { "failed" };
                format!("WAVE {wave} {name} {verdict}")
            }
        }
    }
}

impl ProgressSink for TextProgress {
    fn name(&self) -> &str {
        "text"
    }

    fn emit(&self, event: &ProgressEvent) {
        eprintln!("{}", self.format_event(event));
    }
}

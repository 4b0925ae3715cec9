use weaver_core::plan::collect_plan_errors;

use crate::commands::cli::ValidateArgs;
use crate::error::CliError;
use crate::plan_file::load_plan;

pub fn validate(args: &ValidateArgs) -> Result<i32, CliError> {
    let plan = load_plan(&args.plan)?;
    let errors = collect_plan_errors(&plan);
    if errors.is_empty() {
        let features: usize = plan.waves.iter().map(|w| w.features.len()).sum();
        println!(
            "plan ok: {} waves, {} features, {} tasks",
            plan.waves.len(),
            features,
            plan.tasks().count()
        );
        return Ok(0);
    }

    for err in &errors {
        println!("error: {err}");
    }
    Err(CliError::Plan(format!(
        "{} has {} problem(s)",
        args.plan.display(),
        errors.len()
    )))
}

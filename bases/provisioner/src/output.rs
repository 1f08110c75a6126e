// bases/provisioner/src/output.rs
use crate::workspace::OpenResult;
use deployment::{ProvisioningEvent, RunOutcome};
use settings_store::Settings;
use solution_model::Solution;

pub struct OutputHandler {
    verbose: bool,
}

impl OutputHandler {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn print_open(&self, result: &OpenResult, solution: &Solution) {
        if !result.result {
            eprintln!(
                "Could not open solution: {}",
                result.message.as_deref().unwrap_or("unknown error")
            );
            return;
        }
        if solution.is_empty() {
            println!("No solution open");
            return;
        }

        println!("Opened: {} ({})", solution.name, solution.id);
        for (index, item) in solution.config_items.iter().enumerate() {
            let marker = if item.is_provisioned() { "x" } else { " " };
            println!("  [{}] {:>2}. {} ({})", marker, index + 1, item.name, item.item_type);
        }
    }

    pub fn print_event(&self, solution: &Solution, event: &ProvisioningEvent) {
        let name = |id: &str| {
            solution
                .item(id)
                .map(|item| item.name.clone())
                .unwrap_or_else(|| id.to_string())
        };

        match event {
            ProvisioningEvent::ItemStarted { item_id } => println!("-> {}", name(item_id)),
            ProvisioningEvent::ItemResultSaved { item_id, response } => {
                println!("   saved result for {}", name(item_id));
                if self.verbose {
                    println!("   {}", response);
                }
            }
            ProvisioningEvent::ItemEnded { .. } => {}
            ProvisioningEvent::Progress(progress) => {
                if self.verbose {
                    println!(
                        "   {} {:.0}/{:.0}",
                        progress.label, progress.value, progress.total
                    );
                }
            }
            ProvisioningEvent::ServiceError(error) => {
                eprintln!("   {} failed ({}): {}", error.title, error.status, error.message)
            }
        }
    }

    pub fn print_outcome(&self, solution: &Solution, outcome: &RunOutcome) {
        match &outcome.failure {
            None => println!(
                "Provisioned {} of {} steps",
                outcome.completed,
                solution.config_items.len()
            ),
            Some(error) => eprintln!(
                "Stopped after {} of {} steps: {}",
                outcome.completed,
                solution.config_items.len(),
                error
            ),
        }
    }

    pub fn print_settings(&self, settings: &Settings) {
        println!(
            "Last configuration: {}",
            settings
                .last_configuration
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        println!(
            "Subscription: {}",
            settings.subscription_id.as_deref().unwrap_or("none")
        );
        if settings.provisioning_state.is_active() {
            println!("Provisioning: ACTIVE (a previous run may have been interrupted)");
        } else {
            println!("Provisioning: inactive");
        }
    }

    pub fn print_error(&self, error: &color_eyre::Report) {
        eprintln!("Error: {}", error);

        if self.verbose {
            eprintln!("\nError details:");
            error.chain().skip(1).for_each(|cause| {
                eprintln!("  caused by: {}", cause);
            });
        }
    }
}

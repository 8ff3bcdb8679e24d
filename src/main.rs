use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use vminspect::config::InspectionConfig;
use vminspect::inspection::actions::{self, ActionKind};
use vminspect::inspection::Inspection;
use vminspect::ui::console::{render_actions, render_focus, ConsoleGui, ConsoleView};
use vminspect::vm::scripted::{Scenario, ScriptedVm};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario of the inspected VM (TOML)
    #[clap(long)]
    scenario: PathBuf,

    /// Path to config file, `~/.config/vminspect/config.toml` if not set
    #[clap(long)]
    config: Option<PathBuf>,

    /// Select memory at address (hex) after start
    #[clap(long)]
    memory: Option<String>,

    /// Select heap object by id (hex) after start
    #[clap(long)]
    object: Option<String>,

    /// Actions to perform in order, for example `resume`, `stepi`, `toggle-break`
    #[clap(short, long)]
    action: Vec<ActionKind>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = InspectionConfig::load_or_default(args.config.as_deref());
    let scenario = Scenario::from_file(&args.scenario)
        .with_context(|| format!("load scenario {}", args.scenario.display()))?;
    let vm = Rc::new(ScriptedVm::from_scenario(scenario));

    let mut inspection = Inspection::new(vm.clone(), Rc::new(ConsoleGui), config);
    let view = Rc::new(ConsoleView::default());
    inspection.add_listener(view.clone());
    inspection.focus().add_listener(view);

    vm.start();
    inspection.wait_and_process(Duration::from_millis(100));

    if let Some(addr) = args.memory {
        inspection.perform(&actions::view_memory_at(addr));
    }
    if let Some(id) = args.object {
        inspection.perform(&actions::inspect_object_by_hex_id(id));
    }
    for kind in args.action {
        inspection.perform_kind(kind);
    }

    println!("\n{}", render_focus(&inspection));
    println!("{}", render_actions(&inspection));

    inspection.quit();
    Ok(())
}

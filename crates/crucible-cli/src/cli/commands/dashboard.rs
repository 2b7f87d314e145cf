use super::exit_codes;
use crate::cli::args::DashboardArgs;
use crucible_core::report::console;
use crucible_core::storage::Store;

pub fn cmd_dashboard(args: DashboardArgs) -> anyhow::Result<i32> {
    let store = Store::open(&args.db)?;
    store.init_schema()?;

    let metrics = store.dashboard_metrics()?;
    let recent = store.recent_runs(args.last)?;
    console::print_dashboard(&metrics, &recent);

    Ok(exit_codes::OK)
}

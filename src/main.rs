use {
    log::*,
    solana_cli_config::CONFIG_FILE,
    solana_durable_nonce_e2e::{
        arg_parser::parse_args,
        config::Config,
        harness::Harness,
        scenarios::{run_scenarios, ScenarioReport},
        Result,
    },
    std::{env, path::Path, process::exit},
};

fn load_cli_config(config_file: Option<&str>) -> Result<Option<solana_cli_config::Config>> {
    let Some(config_file) = config_file else {
        return Ok(None);
    };
    if Path::new(config_file).exists() {
        return Ok(Some(solana_cli_config::Config::load(config_file)?));
    }
    if CONFIG_FILE.as_deref() != Some(config_file) {
        eprintln!("Error: config file not found: {config_file}");
        exit(1);
    }
    Ok(None)
}

fn print_report(report: &ScenarioReport) {
    println!(
        "{:<20} {:<44} {:<44} {:>10.3}s  {}",
        report.scenario.name(),
        report.nonce_before.to_string(),
        report.nonce_after.to_string(),
        report.elapsed.as_secs_f64(),
        report.outcome,
    );
}

fn main() -> Result<()> {
    solana_logger::setup_with_default("solana=info,solana_durable_nonce_e2e=info");

    let args = parse_args(env::args_os());
    let cli_config = load_cli_config(args.config_file.as_deref())?;
    let config = Config::resolve(args.overrides, cli_config.as_ref())?;
    info!("running {} scenarios against {}", args.scenarios.len(), config.json_rpc_url);

    let harness = Harness::new(config)?;
    let results = run_scenarios(&harness, &args.scenarios);

    println!(
        "{:<20} {:<44} {:<44} {:>11}  OUTCOME",
        "SCENARIO", "NONCE BEFORE", "NONCE AFTER", "ELAPSED"
    );
    let mut failures = 0;
    for (scenario, result) in &results {
        match result {
            Ok(report) => print_report(report),
            Err(err) => {
                failures += 1;
                println!("{:<20} FAILED: {err}", scenario.name());
            }
        }
    }

    if failures > 0 {
        eprintln!("{failures} of {} scenarios failed", results.len());
        exit(1);
    }
    Ok(())
}

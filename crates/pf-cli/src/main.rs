use atty::Stream;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use serde_json::json;

mod cli;
mod dispatch;
mod style;

use cli::PfCli;
use dispatch::Outcome;
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = PfCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let outcome = dispatch::execute(&cli).map_err(|err| eyre!("{err:?}"))?;
    let code = emit_output(&cli, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("pf={level},pf_core={level},pf_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_output(cli: &PfCli, outcome: &Outcome) -> Result<i32> {
    let code = outcome.exit_code();
    if cli.json {
        let payload = json!({
            "status": outcome.status,
            "message": outcome.message,
            "details": outcome.details,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if !cli.quiet {
        let style = Style::new(cli.no_color, atty::is(Stream::Stdout));
        println!("{}", style.status(outcome.status, &outcome.message));
    }
    Ok(code)
}

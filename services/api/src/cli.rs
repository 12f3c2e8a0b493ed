use crate::demo::{run_demo, DemoArgs};
use crate::infra::LATEST_START_YEAR;
use crate::server;
use clap::{Args, Parser, Subcommand};
use ucaes_admissions::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "UCAES Admissions",
    about = "Run the admissions service or walk through an application cycle",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run an in-memory draft, submit, review, accept, and transfer cycle
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// First calendar year of the open academic year (e.g. 2025 for 2025/2026)
    #[arg(long, value_parser = academic_year_start)]
    pub(crate) academic_year_start: Option<u16>,
}

/// Accepts starts whose academic year ends on a four-digit year.
pub(crate) fn academic_year_start(raw: &str) -> Result<u16, String> {
    let start: u16 = raw
        .trim()
        .parse()
        .map_err(|_| format!("`{raw}` is not a year"))?;
    if !(1900..=LATEST_START_YEAR).contains(&start) {
        return Err(format!("academic year start must be 1900..={LATEST_START_YEAR}"));
    }
    Ok(start)
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["ucaes-admissions-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn out_of_range_academic_year_is_rejected() {
        for raw in ["65535", "9999", "1899", "twenty"] {
            let parsed = Cli::try_parse_from([
                "ucaes-admissions-api",
                "serve",
                "--academic-year-start",
                raw,
            ]);
            assert!(parsed.is_err(), "{raw} should be rejected");
        }

        let cli = Cli::try_parse_from([
            "ucaes-admissions-api",
            "demo",
            "--academic-year-start",
            "9998",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Demo(args)) => assert_eq!(args.academic_year_start, Some(9998)),
            other => panic!("expected demo command, got {other:?}"),
        }
    }

    #[test]
    fn demo_flags_parse() {
        let cli = Cli::try_parse_from([
            "ucaes-admissions-api",
            "demo",
            "--academic-year-start",
            "2025",
            "--applicants",
            "3",
            "--portal-offline",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Demo(args)) => {
                assert_eq!(args.academic_year_start, Some(2025));
                assert_eq!(args.applicants, 3);
                assert!(args.portal_offline);
            }
            other => panic!("expected demo command, got {other:?}"),
        }
    }
}

use crate::commands::{
    run_batch, run_rules_check, run_search, run_validate, BatchArgs, RulesCheckArgs, SearchArgs,
    ValidateArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use deal_validator::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Deal Validator",
    about = "Validate loan records against the configured rule store",
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
    /// Validate a single loan by id, by name, or from a payload file
    Validate(ValidateArgs),
    /// Validate several loans by id, in order
    Batch(BatchArgs),
    /// List loans whose name starts with a prefix
    Search(SearchArgs),
    /// Inspect the rule store
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// Load the rule store and report configuration errors
    Check(RulesCheckArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Validate(args) => run_validate(args),
        Command::Batch(args) => run_batch(args),
        Command::Search(args) => run_search(args),
        Command::Rules {
            command: RulesCommand::Check(args),
        } => run_rules_check(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::try_parse_from(["deal-validator-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn validate_requires_exactly_one_target() {
        assert!(Cli::try_parse_from(["deal-validator-api", "validate"]).is_err());
        assert!(Cli::try_parse_from([
            "deal-validator-api",
            "validate",
            "--id",
            "a0i-1",
            "--name",
            "Canyon"
        ])
        .is_err());

        let cli = Cli::try_parse_from([
            "deal-validator-api",
            "validate",
            "--name",
            "Canyon",
            "--contains",
        ])
        .expect("parses");
        let Some(Command::Validate(args)) = cli.command else {
            panic!("expected validate command");
        };
        assert_eq!(args.name.as_deref(), Some("Canyon"));
        assert!(args.contains);
    }

    #[test]
    fn contains_only_applies_to_name_lookups() {
        assert!(Cli::try_parse_from([
            "deal-validator-api",
            "validate",
            "--id",
            "a0i-1",
            "--contains"
        ])
        .is_err());
    }

    #[test]
    fn batch_needs_at_least_one_id() {
        assert!(Cli::try_parse_from(["deal-validator-api", "batch"]).is_err());
        let cli = Cli::try_parse_from(["deal-validator-api", "batch", "a0i-1", "a0i-2"])
            .expect("parses");
        let Some(Command::Batch(args)) = cli.command else {
            panic!("expected batch command");
        };
        assert_eq!(args.loan_ids, vec!["a0i-1", "a0i-2"]);
    }

    #[test]
    fn rules_check_accepts_a_path() {
        let cli = Cli::try_parse_from([
            "deal-validator-api",
            "rules",
            "check",
            "--path",
            "custom.json",
        ])
        .expect("parses");
        let Some(Command::Rules {
            command: RulesCommand::Check(args),
        }) = cli.command
        else {
            panic!("expected rules check command");
        };
        assert_eq!(args.path.as_deref(), Some(std::path::Path::new("custom.json")));
    }
}

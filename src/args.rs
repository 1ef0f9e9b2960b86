use clap::{Parser, Subcommand};

/// Administrative front end for ranked-preference surveys.
///
/// Storage is chosen from the environment: EASYSURVEY_DATABASE_URL (or
/// POSTGRES_URL / DATABASE_URL) selects PostgreSQL, otherwise the embedded
/// database at EASYSURVEY_DB_PATH is used.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Do not print log events; only the JSON result is written.
    #[clap(long, takes_value = false)]
    pub quiet: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a survey and print its token.
    Create {
        #[clap(short, long, value_parser)]
        title: String,
        /// Comma-separated choice labels, in display order.
        #[clap(short, long, value_parser)]
        choices: String,
    },
    /// List all surveys, newest first.
    List,
    /// Show a survey as participants see it.
    Show {
        #[clap(value_parser)]
        token: String,
    },
    /// Record a ballot. Choices are ranked in the order given.
    Respond {
        #[clap(value_parser)]
        token: String,
        #[clap(short, long, value_parser)]
        pseudonym: String,
        #[clap(value_parser, required = true)]
        choices: Vec<String>,
    },
    /// Print aggregate scores for a survey.
    Stats {
        #[clap(value_parser)]
        token: String,
        /// Sort by score and include places and relative shares.
        #[clap(long, takes_value = false)]
        ranked: bool,
    },
}

use anyhow::Context;
use clap::Parser;
use evlog::{meta, LogEventConsolePrinter, Logger};
use serde::Serialize;

use easysurvey::commands::{self, Access, ChoiceList, CreateSurveyRequest, RecordResponseRequest};
use easysurvey::runtime::{get_logger, set_logger};
use easysurvey::support::ballot::votes_from_selection;
use easysurvey::{Config, DBClient};

use crate::args::{Args, Command};

mod args;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(db: &DBClient, command: Command) -> anyhow::Result<()> {
    // The command line is an operator tool, so it acts as administrator.
    let access = Access::Admin;

    match command {
        Command::Create { title, choices } => {
            let request = CreateSurveyRequest {
                title: Some(title),
                choices: Some(ChoiceList::Text(choices)),
            };
            print_json(&commands::create_survey(db, access, request).await?)
        }
        Command::List => print_json(&commands::list_surveys(db, access).await?),
        Command::Show { token } => print_json(&commands::get_survey(db, &token).await?),
        Command::Respond {
            token,
            pseudonym,
            choices,
        } => {
            let request = RecordResponseRequest {
                pseudonym: Some(pseudonym),
                votes: Some(serde_json::to_value(votes_from_selection(&choices))?),
            };
            print_json(&commands::record_response(db, &token, request).await?)
        }
        Command::Stats { token, ranked } => {
            let stats = commands::get_stats(db, access, &token).await?;
            if ranked {
                print_json(&stats.ranked())
            } else {
                print_json(&stats)
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();

    let mut logger = Logger::default();
    if !args.quiet {
        logger.register(LogEventConsolePrinter::default());
    }
    set_logger(logger);

    let config = Config::from_env().context("invalid configuration")?;

    let db = DBClient::connect(&config)
        .await
        .context("failed to initialize storage")?;

    if let Err(e) = run(&db, args.command).await {
        get_logger().error("Command failed.", meta! {
            "Error" => &e,
        });
        return Err(e);
    }

    Ok(())
}

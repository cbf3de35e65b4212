#![warn(missing_docs)]
//! # flowlens binary
//!
//! Terminal driver: reads intents from stdin and prints every published
//! session snapshot.

use clap::Parser;
use flowlens_app::{AppConfig, AppError, app_version, build_controller, init_logging};
use flowlens_core::HistoryRecord;
use flowlens_session::{PipelineOutcome, SessionController, SessionError};
use flowlens_ui::{
    HELP_TEXT, SessionView, UserIntent, filter_history, parse_intent, render_history,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() {
    let config = AppConfig::parse();
    init_logging();

    if let Err(error) = run(config).await {
        eprintln!("flowlens: {error}");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    let controller = build_controller(&config)?;
    println!("flowlens {} - type `help` for commands", app_version());

    let mut updates = controller.subscribe();
    let renderer = tokio::spawn(async move {
        loop {
            let view = SessionView::project(&updates.borrow_and_update());
            println!("{}", view.render());
            if updates.changed().await.is_err() {
                break;
            }
        }
    });

    let mut listing: Vec<HistoryRecord> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let intent = match parse_intent(&line) {
            Ok(intent) => intent,
            Err(error) => {
                println!("{error}");
                continue;
            }
        };
        if intent == UserIntent::Quit {
            break;
        }
        if let Err(error) = dispatch(&controller, intent, &mut listing).await {
            println!("{error}");
        }
    }

    controller.reset().await;
    renderer.abort();
    Ok(())
}

async fn dispatch(
    controller: &SessionController,
    intent: UserIntent,
    listing: &mut Vec<HistoryRecord>,
) -> Result<(), SessionError> {
    match intent {
        // Long-running intents run in the background so `stop` and
        // `history` stay responsive.
        UserIntent::StartCapture { auto_scan } => {
            let controller = controller.clone();
            tokio::spawn(async move {
                if let Err(error) = controller.start_capture(auto_scan).await {
                    tracing::debug!(%error, "start capture rejected");
                    if !matches!(error, SessionError::Capture(_)) {
                        println!("{error}");
                    }
                }
            });
        }
        UserIntent::Scan => {
            let controller = controller.clone();
            tokio::spawn(async move {
                report(controller.request_scan().await);
            });
        }
        UserIntent::Select(id) => {
            let controller = controller.clone();
            tokio::spawn(async move {
                report(controller.select_suggestion(&id).await);
            });
        }
        UserIntent::SetAutoScan(enabled) => controller.set_auto_scan(enabled).await,
        UserIntent::Back => controller.back().await?,
        UserIntent::Stop => {
            if !controller.stop_capture().await {
                println!("capture is not running");
            }
        }
        UserIntent::OpenHistory => {
            controller.open_history().await?;
            show_listing(controller, "", listing).await?;
        }
        UserIntent::Find(query) => show_listing(controller, &query, listing).await?,
        UserIntent::OpenRecord(number) => {
            let record = listing
                .get(number - 1)
                .ok_or_else(|| SessionError::UnknownHistoryRecord(number.to_string()))?;
            controller.open_history_record(&record.id).await?;
        }
        UserIntent::CloseHistory => controller.close_history().await?,
        UserIntent::ClearHistory => {
            controller.clear_history().await?;
            listing.clear();
            println!("history cleared");
        }
        UserIntent::Reset => controller.reset().await,
        UserIntent::Help => println!("{HELP_TEXT}"),
        UserIntent::Quit => {}
    }
    Ok(())
}

async fn show_listing(
    controller: &SessionController,
    query: &str,
    listing: &mut Vec<HistoryRecord>,
) -> Result<(), SessionError> {
    *listing = filter_history(&controller.history().await?, query);
    print!("{}", render_history(listing));
    Ok(())
}

fn report(result: Result<PipelineOutcome, SessionError>) {
    match result {
        Ok(outcome) => tracing::debug!(?outcome, "pipeline finished"),
        Err(error) => println!("{error}"),
    }
}

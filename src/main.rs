use std::env;
use std::io;
use std::process;
use std::sync::Arc;

use chrono::NaiveDate;
use hotel_settle::csv::{read_commands, write_reservations};
use hotel_settle::{Clock, Engine, FixedClock, Settings, Store, SystemClock};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: hotel-settle <commands.csv> [today YYYY-MM-DD]";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(
            "warn".parse().expect("static directive"),
        ))
        .with_writer(io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("{USAGE}");
        process::exit(2);
    };
    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    // replays are pinned to a day so past-date checks are reproducible
    let clock: Arc<dyn Clock> = match args.next() {
        Some(day) => match day.parse::<NaiveDate>() {
            Ok(day) => Arc::new(FixedClock(day.and_time(Default::default()).and_utc())),
            Err(e) => {
                eprintln!("invalid date '{day}': {e}\n{USAGE}");
                process::exit(2);
            }
        },
        None => Arc::new(SystemClock),
    };

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let commands = match read_commands(path) {
        Ok(commands) => commands,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let engine = Engine::new(Arc::new(Store::new()), settings.booking, clock);
    let (cmd_sender, cmd_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in commands {
            match result {
                Ok(command) => {
                    if cmd_sender.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    engine.run(ReceiverStream::new(cmd_receiver)).await;

    let reservations = engine.reservations().await;
    if let Err(e) = write_reservations(io::stdout().lock(), &reservations) {
        error!("{e}");
        process::exit(1);
    }
}

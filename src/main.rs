//! Zhouyi divination client
//!
//! A terminal front-end for a remote divination service. The session state
//! machine runs in one runtime task; this binary reads lines from stdin,
//! turns them into events and prints the conversation log as it grows.

mod cli;
mod config;
mod conversation;
mod domain;
mod error;
mod gateway;
mod runtime;
mod session;
mod store;

use cli::Input;
use config::ClientConfig;
use conversation::ConversationLog;
use domain::{
    decode, longitude_offset_minutes, throw_hexagram, ConvertedDate, SolarCorrection, TodayInfo,
    TrueSolarTimeRequest,
};
use error::{DivinationError, DivinationResult};
use gateway::{DivinationGateway, HttpGateway, LoggingGateway};
use runtime::{DatabaseStorage, SessionHandle, SessionRuntime, SessionUpdate};
use session::{Event, Session, SessionContext, Step};
use std::io::Write;
use std::sync::Arc;
use store::Store;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = ClientConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening session store");
    let store = Store::open(&config.db_path)?;

    // Calls in flight when the last process exited will never answer
    let repaired = store.clear_pending_calls()?;
    if repaired > 0 {
        tracing::info!(repaired, "Cleared interrupted gateway calls");
    }

    let record = match store.latest_session()? {
        Some(record) => {
            tracing::info!(
                session_id = %record.id,
                step = %record.session.step,
                created_at = %record.created_at,
                updated_at = %record.updated_at,
                "Resuming session"
            );
            record
        }
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            tracing::info!(session_id = %id, "Starting new session");
            store.create_session(&id, &Session::default())?
        }
    };

    let log = ConversationLog::from_messages(store.messages(&record.id)?);
    for line in cli::resume_lines(&log, record.session.step) {
        println!("{line}");
    }

    let http: Arc<dyn DivinationGateway> = Arc::new(HttpGateway::new(&config)?);
    let gateway = Arc::new(LoggingGateway::new(http));
    tracing::info!(api_base = %config.api_base, "Gateway configured");

    let context = SessionContext::new(record.id.clone())
        .with_true_solar_time(config.use_true_solar_time);
    let handle = SessionRuntime::spawn(
        context,
        record.session,
        log,
        DatabaseStorage::new(store),
        gateway.clone(),
    );

    let printer = tokio::spawn(print_updates(handle.subscribe()));

    if handle.snapshot().await?.step == Step::Greeting {
        submit(&handle, Event::Begin).await;
    }

    run_repl(&handle, gateway.as_ref(), &config).await?;

    printer.abort();
    tracing::info!(session_id = %handle.session_id, "Session saved");
    Ok(())
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "zhouyi=info".into());

    // stdout belongs to the conversation
    let layer = if std::env::var("ZHOUYI_LOG_JSON").is_ok_and(|v| v == "1") {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry().with(filter).with(layer).init();
}

async fn print_updates(mut updates: broadcast::Receiver<SessionUpdate>) {
    loop {
        match updates.recv().await {
            Ok(SessionUpdate::Message(message)) => println!("{}", cli::render_message(&message)),
            Ok(SessionUpdate::Error(error)) => eprintln!("{}", cli::render_error(&error)),
            Ok(SessionUpdate::StateChange { step, busy }) => {
                tracing::debug!(step = %step, busy, "Session state changed");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Display fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Submit an event. Refusals and failures reach the screen through the
/// update stream, so they are only logged here.
async fn submit(handle: &SessionHandle, event: Event) {
    if let Err(e) = handle.submit(event).await {
        tracing::debug!(error = %e, "Event not applied");
    }
}

async fn run_repl<G: DivinationGateway + ?Sized>(
    handle: &SessionHandle,
    gateway: &G,
    config: &ClientConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let session = handle.snapshot().await?;
        print!("{}", cli::prompt(session.step, session.is_busy()));
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let (session, input) = match read_input(handle, &line).await {
            Ok((session, Some(input))) => (session, input),
            Ok((_, None)) => continue,
            Err(e) => {
                eprintln!("{}", cli::render_error(&e));
                continue;
            }
        };

        match input {
            Input::Quit => break,
            Input::Help => println!("{}", cli::HELP),
            Input::Event(Event::Reset) => {
                submit(handle, Event::Reset).await;
                submit(handle, Event::Begin).await;
            }
            Input::Event(event) => submit(handle, event).await,
            Input::Toss { question } => {
                let tosses = throw_hexagram(&mut rand::thread_rng())
                    .iter()
                    .map(|toss| i64::from(toss.value()))
                    .collect();
                submit(handle, Event::SubmitTosses { question, tosses }).await;
            }
            Input::Today | Input::Convert(_) | Input::SolarTime => {
                match calendar_query(input, &session, gateway, config).await {
                    Ok(output) => println!("{}", output.join("\n")),
                    Err(e) => eprintln!("{}", cli::render_error(&e)),
                }
            }
        }
    }
    Ok(())
}

/// Parse a line against the session as it stands once the line has arrived.
/// Updates may have moved it on while the prompt was waiting.
async fn read_input(
    handle: &SessionHandle,
    line: &str,
) -> DivinationResult<(Session, Option<Input>)> {
    let session = handle.snapshot().await?;
    let input = cli::parse_input(line, session.step)?;
    Ok((session, input))
}

/// Calendar utilities go straight to the gateway and leave the session alone
async fn calendar_query<G: DivinationGateway + ?Sized>(
    input: Input,
    session: &Session,
    gateway: &G,
    config: &ClientConfig,
) -> DivinationResult<Vec<String>> {
    match input {
        Input::Today => {
            let today: TodayInfo = decode(gateway.today().await?, "today")?;
            Ok(cli::render_today(&today))
        }
        Input::Convert(request) => {
            let date: ConvertedDate =
                decode(gateway.convert_calendar(&request).await?, "calendar conversion")?;
            Ok(cli::render_converted(&date))
        }
        Input::SolarTime => {
            let (Some(birth), Some(location)) = (&session.birth, &session.location) else {
                return Err(DivinationError::validation(
                    "birth data and location are needed for true solar time",
                ));
            };
            let request = TrueSolarTimeRequest::for_birth(birth, location)?;
            let correction: SolarCorrection =
                decode(gateway.true_solar_time(&request).await?, "true solar time")?;
            let local = longitude_offset_minutes(location.longitude, config.standard_meridian);
            Ok(cli::render_correction(&correction, local))
        }
        other => Err(DivinationError::validation(format!(
            "{other:?} is not a calendar query"
        ))),
    }
}

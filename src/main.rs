use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tracing::info;
use ulid::Ulid;

use rentspan::config::EngineConfig;
use rentspan::engine::{Rejection, SessionError};
use rentspan::model::*;
use rentspan::service::BookingService;

/// One date pick, read as JSON from stdin.
#[derive(Debug, Deserialize)]
struct PickRequest {
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    reservations: Vec<ReservedInterval>,
    preset: StayPreset,
    start: CalendarDate,
    #[serde(default)]
    end: Option<CalendarDate>,
    #[serde(default)]
    today: Option<CalendarDate>,
}

#[derive(Debug, Serialize)]
struct PickResponse {
    today: CalendarDate,
    blocked: Vec<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejection: Option<Rejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::from_env()?;
    rentspan::observability::init(config.metrics_port)?;

    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    let request: PickRequest = serde_json::from_str(&input)?;

    let (mut service, schedule) = BookingService::in_memory(config)?;
    if let Some(today) = request.today {
        service = service.with_fixed_today(today);
    }
    let item = ItemKey::new(Ulid::new(), request.size.unwrap_or_else(|| "default".into()));
    for interval in &request.reservations {
        schedule.insert_reservation(&item, *interval)?;
    }
    info!(
        %item,
        reservations = request.reservations.len(),
        today = %service.today(),
        "evaluating pick"
    );

    let (mut session, _events) = service.open_session(item).await?;
    session.choose_preset(request.preset)?;
    let mut outcome = session.pick_start(request.start);
    if let (Ok(_), Some(end)) = (&outcome, request.end) {
        outcome = session.pick_end(end);
    }

    let mut response = PickResponse {
        today: session.today(),
        blocked: session.blocked().runs(),
        range: None,
        rejection: None,
        message: None,
    };
    match outcome {
        Ok(range) => response.range = Some(range),
        Err(SessionError::Rejected(rejection)) => {
            response.rejection = Some(rejection);
            response.message = Some(rejection.message());
        }
        Err(e) => return Err(e.into()),
    }

    println!("{}", serde_json::to_string_pretty(&response)?);
    service.close(session);
    Ok(())
}

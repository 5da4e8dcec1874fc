use std::path::Path;

use chrono::{DateTime, Utc};
use peerbook_core::booking::BookingQuote;
use peerbook_core::config::LoadOptions;
use peerbook_core::domain::service::ServiceId;
use peerbook_core::forms::BookingSubmission;
use peerbook_db::SqlStores;

use crate::commands::{
    booking_engine, build_runtime, find_service, load_config, open_database, read_json_file,
    to_data, CommandFailure, CommandResult,
};

pub struct QuoteArgs<'a> {
    pub service_id: &'a str,
    pub submission_file: &'a Path,
    /// Pricing instant; defaults to now.
    pub at: Option<&'a str>,
}

/// Live price and delivery estimate for a submission without storing anything.
pub fn run(options: &LoadOptions, args: &QuoteArgs<'_>) -> CommandResult {
    match execute(options, args) {
        Ok(quote) => match to_data(&quote) {
            Ok(data) => CommandResult::success_with_data(
                "quote",
                format!(
                    "{} {} with delivery by {}",
                    quote.final_price(),
                    quote.currency,
                    quote.promised_delivery_at.to_rfc3339()
                ),
                Some(data),
            ),
            Err(failure) => failure.into_result("quote"),
        },
        Err(failure) => failure.into_result("quote"),
    }
}

fn execute(options: &LoadOptions, args: &QuoteArgs<'_>) -> Result<BookingQuote, CommandFailure> {
    let submission: BookingSubmission = read_json_file(args.submission_file)?;
    let now = parse_instant(args.at)?;
    let config = load_config(options)?;
    let runtime = build_runtime()?;

    runtime.block_on(async {
        let pool = open_database(&config).await?;
        let stores = SqlStores::new(pool.clone());
        let service_id = ServiceId(args.service_id.to_owned());
        let service = find_service(stores.services.as_ref(), &service_id).await;
        pool.close().await;
        let service = service?;

        let engine = booking_engine(&config);
        engine.check_selection(&service, &submission)?;
        let quote = engine.validate_and_price(&service, &submission, now)?;
        Ok::<_, CommandFailure>(quote)
    })
}

pub(crate) fn parse_instant(raw: Option<&str>) -> Result<DateTime<Utc>, CommandFailure> {
    match raw {
        None => Ok(Utc::now()),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|error| CommandFailure::input(format!("`{raw}` is not RFC 3339: {error}"))),
    }
}

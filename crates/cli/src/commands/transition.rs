use std::sync::Arc;

use peerbook_core::booking::ports::StaticIdentity;
use peerbook_core::config::LoadOptions;
use peerbook_core::domain::booking::{Booking, BookingId, BookingStatus};
use peerbook_core::BookingActor;
use peerbook_db::SqlStores;

use crate::commands::{
    build_runtime, load_config, open_database, orchestrator, to_data, CommandFailure,
    CommandResult,
};

pub struct TransitionArgs<'a> {
    pub booking_id: &'a str,
    pub to: &'a str,
    pub actor: &'a str,
    pub reason: Option<&'a str>,
}

pub struct ReviewArgs<'a> {
    pub booking_id: &'a str,
    pub rating: u8,
    pub text: Option<&'a str>,
}

enum Change {
    Status { to: BookingStatus, actor: BookingActor, reason: Option<String> },
    Review { rating: u8, text: Option<String> },
}

pub fn run(options: &LoadOptions, args: &TransitionArgs<'_>) -> CommandResult {
    let change = match parse_transition(args) {
        Ok(change) => change,
        Err(failure) => return failure.into_result("transition"),
    };
    finish("transition", apply(options, args.booking_id, change))
}

pub fn run_review(options: &LoadOptions, args: &ReviewArgs<'_>) -> CommandResult {
    let change = Change::Review { rating: args.rating, text: args.text.map(str::to_owned) };
    finish("review", apply(options, args.booking_id, change))
}

fn finish(command: &str, outcome: Result<Booking, CommandFailure>) -> CommandResult {
    let booking = match outcome {
        Ok(booking) => booking,
        Err(failure) => return failure.into_result(command),
    };
    match to_data(&booking) {
        Ok(data) => CommandResult::success_with_data(
            command,
            format!("booking {} is {}", booking.id, booking.status.as_str()),
            Some(data),
        ),
        Err(failure) => failure.into_result(command),
    }
}

fn parse_transition(args: &TransitionArgs<'_>) -> Result<Change, CommandFailure> {
    let to = BookingStatus::parse(args.to)
        .ok_or_else(|| CommandFailure::input(format!("unknown booking status `{}`", args.to)))?;
    let actor = BookingActor::parse(args.actor).ok_or_else(|| {
        CommandFailure::input(format!(
            "unknown actor `{}`; expected student, consultant or system",
            args.actor
        ))
    })?;
    Ok(Change::Status { to, actor, reason: args.reason.map(str::to_owned) })
}

fn apply(
    options: &LoadOptions,
    booking_id: &str,
    change: Change,
) -> Result<Booking, CommandFailure> {
    let config = load_config(options)?;
    let runtime = build_runtime()?;
    let booking_id = BookingId(booking_id.to_owned());

    runtime.block_on(async {
        let pool = open_database(&config).await?;
        let stores = SqlStores::new(pool.clone());
        let orchestrator = orchestrator(&config, &stores, Arc::new(StaticIdentity::default()));

        let outcome = match change {
            Change::Status { to, actor, reason } => {
                orchestrator.transition_booking(&booking_id, to, actor, reason).await
            }
            Change::Review { rating, text } => {
                orchestrator.attach_review(&booking_id, BookingActor::Student, rating, text).await
            }
        };
        pool.close().await;
        outcome.map_err(CommandFailure::from)
    })
}

use std::path::Path;
use std::sync::Arc;

use peerbook_core::booking::ports::StaticIdentity;
use peerbook_core::config::LoadOptions;
use peerbook_core::forms::BookingSubmission;
use peerbook_core::BookingReceipt;
use peerbook_db::SqlStores;

use crate::commands::{
    build_runtime, find_service, load_config, open_database, orchestrator, read_json_file,
    to_data, CommandFailure, CommandResult,
};

pub struct BookArgs<'a> {
    pub student_id: &'a str,
    pub submission_file: &'a Path,
}

/// Commits a booking for `student_id`. The service comes from the submission itself.
pub fn run(options: &LoadOptions, args: &BookArgs<'_>) -> CommandResult {
    let receipt = match execute(options, args) {
        Ok(receipt) => receipt,
        Err(failure) => return failure.into_result("book"),
    };
    let data = match to_data(&receipt) {
        Ok(data) => data,
        Err(failure) => return failure.into_result("book"),
    };

    CommandResult::success_with_data("book", summarize(&receipt), Some(data))
}

fn execute(options: &LoadOptions, args: &BookArgs<'_>) -> Result<BookingReceipt, CommandFailure> {
    if args.student_id.trim().is_empty() {
        return Err(CommandFailure::input("--student must not be empty"));
    }
    let submission: BookingSubmission = read_json_file(args.submission_file)?;
    let config = load_config(options)?;
    let runtime = build_runtime()?;

    runtime.block_on(async {
        let pool = open_database(&config).await?;
        let stores = SqlStores::new(pool.clone());
        let identity = Arc::new(StaticIdentity::student(args.student_id));
        let orchestrator = orchestrator(&config, &stores, identity);

        let outcome = match find_service(stores.services.as_ref(), &submission.service_id).await {
            Ok(service) => orchestrator
                .create_booking_for_current_user(&service, &submission)
                .await
                .map_err(CommandFailure::from),
            Err(failure) => Err(failure),
        };
        pool.close().await;
        outcome
    })
}

fn summarize(receipt: &BookingReceipt) -> String {
    let verb = if receipt.replayed { "already existed" } else { "created" };
    let mut message = format!(
        "booking {} {verb}: {} {}, delivery by {}",
        receipt.booking.id,
        receipt.booking.final_price,
        receipt.booking.currency,
        receipt.booking.promised_delivery_at.to_rfc3339()
    );
    if !receipt.is_complete() {
        let failed: Vec<&str> =
            receipt.side_effect_failures.iter().map(|failure| failure.effect.as_str()).collect();
        message.push_str(&format!("; follow-up failed for {}", failed.join(", ")));
    }
    message
}

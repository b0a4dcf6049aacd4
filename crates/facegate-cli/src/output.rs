use std::error::Error;
use std::io::{self, Write};

use facegate_core::faces::MatchOutcome;
use serde::Serialize;
use serde_json::json;

use crate::cli::OutputMode;
use crate::errors::{AppError, AppResult};
use crate::faces::{FaceEnrollmentOutcome, FaceListOutcome, FaceMatchOutcome, FaceRemovalOutcome};
use crate::replay::ReplayOutcome;

fn write_json<T: Serialize + ?Sized>(value: &T) -> AppResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let payload = serde_json::to_string(value)?;
    handle.write_all(payload.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

pub fn render_face_enroll(outcome: &FaceEnrollmentOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            println!(
                "Enrolled '{}' on the {} list ({} values); {} record(s) in {}",
                outcome.label,
                outcome.list_kind,
                outcome.embedding_dimension,
                outcome.total_records,
                outcome.store_path.display()
            );
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_face_remove(outcome: &FaceRemovalOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            println!(
                "Removed {} record(s) labelled '{}' from {}",
                outcome.removed,
                outcome.label,
                outcome.store_path.display()
            );
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_face_list(outcome: &FaceListOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if outcome.records.is_empty() {
                println!("No records in {}", outcome.store_path.display());
                return Ok(());
            }
            for record in &outcome.records {
                println!(
                    "{:<5} {:<24} dim={:<4} {}",
                    record.list_kind.to_string(),
                    record.label,
                    record.embedding_dimension,
                    record.created_at
                );
            }
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_face_match(outcome: &FaceMatchOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            let similarity = outcome.verdict.similarity;
            match &outcome.verdict.outcome {
                MatchOutcome::Allowed(label) => {
                    println!("allowed: {label} (similarity {similarity:.4})")
                }
                MatchOutcome::Denied(label) => {
                    println!("denied: {label} (similarity {similarity:.4})")
                }
                MatchOutcome::Unknown => println!(
                    "unknown (best allow similarity {similarity:.4}, threshold {:.4})",
                    outcome.allow_threshold
                ),
            }
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_replay(outcome: &ReplayOutcome, mode: OutputMode, verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for frame in &outcome.frames {
                if let Some(elapsed) = &frame.elapsed {
                    println!("{:>8}ms  {elapsed}", frame.at_ms);
                }
                let mut line = format!("{:>8}ms  {:<8}", frame.at_ms, frame.stage);
                if let Some(verdict) = &frame.outcome {
                    line.push_str(&format!(" {verdict}"));
                }
                if verbose {
                    if let Some(similarity) = frame.similarity {
                        line.push_str(&format!(" sim={similarity:.4}"));
                    }
                    if let Some(confidence) = frame.confidence {
                        line.push_str(&format!(" conf={confidence:.4}"));
                    }
                }
                if let Some(event) = &frame.event {
                    line.push_str(&format!(" -> {event}"));
                }
                line.push_str(&format!(" [{}]", frame.state));
                println!("{line}");
            }
            println!(
                "Final state: {} (unlock requests: {})",
                outcome.final_state, outcome.unlock_calls
            );
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_error(err: &AppError, mode: OutputMode) {
    match mode {
        OutputMode::Human => {
            eprintln!("error: {}", err.human_message());
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "success": false,
                "error": err.human_message(),
            });
            if let Ok(json) = serde_json::to_string(&payload) {
                println!("{json}");
            }
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
    }
}

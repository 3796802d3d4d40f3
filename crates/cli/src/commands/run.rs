//! `assay run`: Solve one task and print its event stream.

use std::sync::Arc;

use assay_agent::{Controller, run_streaming};
use assay_config::AppConfig;
use assay_core::message::SessionId;
use assay_stream::{EventPayload, StepStatus, StreamEvent};

pub async fn run(
    message: String,
    json: bool,
    self_critic: bool,
    rounds: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if self_critic {
        config.agent.self_critic = true;
        config.agent.critic_rounds = rounds.unwrap_or(config.agent.critic_rounds.max(1));
    }

    // Fail before any model call when no key is set.
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export OPENAI_API_KEY=sk-...        (OpenAI)");
        eprintln!("    export OPENROUTER_API_KEY=sk-or-... (OpenRouter, with ASSAY_PROVIDER=openrouter)");
        eprintln!("    export ASSAY_API_KEY=...            (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let controller = Arc::new(Controller::build(&config)?);
    let mut session = run_streaming(controller, message, SessionId::new(), &config.stream);

    loop {
        tokio::select! {
            next = session.events.recv() => match next {
                Some(event) if json => println!("{}", serde_json::to_string(&event)?),
                Some(event) => print_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n  Interrupted, stopping after the current step...");
                session.abandon.abandon();
            }
        }
    }

    let outcome = session.controller.await??;
    tracing::debug!(
        session_id = %outcome.session_id,
        reason = ?outcome.reason,
        steps = outcome.steps,
        "Run finished"
    );

    Ok(())
}

fn print_event(event: &StreamEvent) {
    match &event.payload {
        EventPayload::Planning { steps, .. } => {
            println!("📋 Plan");
            for step in steps {
                println!("   {} {}", status_mark(step.status), step.step);
            }
        }
        EventPayload::Reasoning { content } => {
            println!("💭 {}", content.trim());
        }
        EventPayload::ToolCall {
            language,
            code,
            tools_referenced,
        } => {
            if tools_referenced.is_empty() {
                println!("▶  Running {language}");
            } else {
                println!("▶  Running {language} (uses {})", tools_referenced.join(", "));
            }
            for line in code.lines() {
                println!("   │ {line}");
            }
        }
        EventPayload::ToolOutput { content, timed_out } => {
            if *timed_out {
                println!("⏱  {content}");
            } else {
                println!("◀  Output");
                for line in content.lines() {
                    println!("   │ {line}");
                }
            }
        }
        EventPayload::FinalAnswer { content } => {
            println!();
            println!("✅ {}", content.trim());
        }
        EventPayload::Error { message } => {
            eprintln!("❌ {message}");
        }
        EventPayload::Done { events_emitted, .. } => {
            println!();
            println!("   ({events_emitted} events)");
        }
    }
    println!();
}

fn status_mark(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "[ ]",
        StepStatus::InProgress => "[~]",
        StepStatus::Completed => "[✓]",
        StepStatus::Failed => "[✗]",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_marks_round_trip_through_plan_parser() {
        for status in [
            StepStatus::Pending,
            StepStatus::InProgress,
            StepStatus::Completed,
            StepStatus::Failed,
        ] {
            let line = format!("1. {} step", status_mark(status));
            let steps = assay_stream::plan::extract_steps(&line);
            assert_eq!(steps[0].status, status);
        }
    }
}

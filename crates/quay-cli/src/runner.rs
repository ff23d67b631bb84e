//! Scenario execution against an in-memory ledger

use crate::scenario::{Action, Expectation, ScenarioFile};
use anyhow::{Context, Result};
use quay_core::{
    Address, ChannelId, Credential, EventRecord, LedgerConfig, MessageId, PublisherIndex,
    QuayError,
};
use quay_ledger::ChannelService;
use quay_testkit::ManualClock;
use std::io::Write;

/// A step whose outcome did not match its expectation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    /// Zero-based step index
    pub step: usize,
    /// Operation name
    pub op: &'static str,
    /// What went wrong
    pub reason: String,
}

/// Summary of a scenario run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Steps executed
    pub steps: usize,
    /// Events committed
    pub events: usize,
    /// Mismatched expectations
    pub failures: Vec<StepFailure>,
}

impl ScenarioReport {
    /// True when every expectation held
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Replays scenario steps, writing every committed event as a JSON line
pub struct ScenarioRunner<W> {
    service: ChannelService<ManualClock>,
    clock: ManualClock,
    out: W,
}

type StepOutcome = std::result::Result<(Vec<EventRecord>, Option<u64>), QuayError>;

impl<W: Write> ScenarioRunner<W> {
    /// Runner with a fresh ledger whose clock starts at `start_secs`
    pub fn new(config: LedgerConfig, start_secs: u64, out: W) -> Self {
        let clock = ManualClock::at_secs(start_secs);
        Self {
            service: ChannelService::new(clock.clone(), config),
            clock,
            out,
        }
    }

    /// The ledger being driven
    pub fn service(&self) -> &ChannelService<ManualClock> {
        &self.service
    }

    /// Run every step, collecting expectation mismatches
    pub async fn run(&mut self, scenario: &ScenarioFile) -> Result<ScenarioReport> {
        let mut failures = Vec::new();

        for (index, step) in scenario.steps.iter().enumerate() {
            let caller = Address::from_label(step.actor.as_deref().unwrap_or_default());
            tracing::debug!(step = index, op = step.action.name(), "running step");

            let Some(outcome) = self.execute(caller, &step.action).await else {
                continue;
            };
            if let Ok((events, _)) = &outcome {
                for record in events {
                    serde_json::to_writer(&mut self.out, record)
                        .context("failed to encode event")?;
                    writeln!(self.out)?;
                }
            }
            if let Err(reason) = check(&step.expect, &outcome) {
                tracing::warn!(step = index, op = step.action.name(), %reason, "expectation failed");
                failures.push(StepFailure {
                    step: index,
                    op: step.action.name(),
                    reason,
                });
            }
        }

        Ok(ScenarioReport {
            name: scenario.metadata.name.clone(),
            steps: scenario.steps.len(),
            events: self.service.events().len(),
            failures,
        })
    }

    async fn execute(&mut self, caller: Address, action: &Action) -> Option<StepOutcome> {
        let service = &mut self.service;
        let outcome = match action.clone() {
            Action::CreateChannel { index, metadata } => service
                .create_channel(caller, PublisherIndex(index), metadata.into_bytes())
                .await
                .map(|r| (r.events, Some(r.output.value()))),
            Action::Join { channel, index } => service
                .join(caller, ChannelId(channel), PublisherIndex(index))
                .await
                .map(|r| (r.events, None)),
            Action::Publish { channel, payload } => service
                .publish(caller, ChannelId(channel), payload.into_bytes())
                .await
                .map(|r| (r.events, Some(r.output.value()))),
            Action::Subscribe {
                channel,
                credential,
                credential_index,
                lease_secs,
                retries,
            } => service
                .subscribe(
                    caller,
                    ChannelId(channel),
                    Credential::new(credential.into_bytes(), credential_index),
                    lease_secs,
                    retries,
                )
                .await
                .map(|r| (r.events, None)),
            Action::GetNext { channel, max_scan } => service
                .get_next(caller, ChannelId(channel), max_scan)
                .await
                .map(|r| (r.events, Some(r.output.message_id.value()))),
            Action::Confirm { channel, message } => service
                .confirm(caller, ChannelId(channel), MessageId(message))
                .await
                .map(|r| (r.events, None)),
            Action::Skip { channel, message } => service
                .skip(caller, ChannelId(channel), MessageId(message))
                .await
                .map(|r| (r.events, None)),
            Action::Advance { secs } => {
                self.clock.advance_secs(secs);
                return None;
            }
        };
        Some(outcome)
    }
}

fn check(expect: &Expectation, outcome: &StepOutcome) -> std::result::Result<(), String> {
    match (outcome, &expect.error) {
        (Err(err), None) => Err(format!("unexpected error: {err}")),
        (Err(err), Some(kind)) if err.kind() != kind => {
            Err(format!("expected {kind}, got {}: {err}", err.kind()))
        }
        (Err(_), Some(_)) => Ok(()),
        (Ok(_), Some(kind)) => Err(format!("expected {kind}, but the step succeeded")),
        (Ok((events, value)), None) => {
            if let Some(expected) = &expect.events {
                let actual: Vec<&str> = events.iter().map(|r| r.event.name()).collect();
                if actual != *expected {
                    return Err(format!("expected events {expected:?}, got {actual:?}"));
                }
            }
            match (expect.value, value) {
                (Some(want), Some(got)) if want != *got => {
                    Err(format!("expected value {want}, got {got}"))
                }
                (Some(want), None) => Err(format!("expected value {want}, but none returned")),
                _ => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::parse_scenario;

    const RETRY: &str = r#"
[metadata]
name = "retry"

[[steps]]
op = "create_channel"
actor = "pub"
index = 10
expect = { value = 0 }

[[steps]]
op = "publish"
actor = "pub"
channel = 0
payload = "m0"

[[steps]]
op = "publish"
actor = "pub"
channel = 0
payload = "m1"
expect = { value = 1 }

[[steps]]
op = "subscribe"
actor = "alice"
channel = 0
credential = "xpub"
lease_secs = 2
retries = 2

[[steps]]
op = "get_next"
actor = "alice"
channel = 0
max_scan = 5
expect = { value = 0 }

[[steps]]
op = "get_next"
actor = "alice"
channel = 0
max_scan = 5
expect = { value = 0 }

[[steps]]
op = "get_next"
actor = "alice"
channel = 0
max_scan = 5
expect = { events = ["MessageSkipped", "MessagePopped"], value = 1 }

[[steps]]
op = "confirm"
actor = "bob"
channel = 0
message = 1
expect = { error = "unauthorized" }
"#;

    #[tokio::test]
    async fn test_runner_checks_expectations() {
        let scenario = parse_scenario(RETRY).unwrap();
        let mut out = Vec::new();
        let report = {
            let mut runner = ScenarioRunner::new(LedgerConfig::default(), 0, &mut out);
            runner.run(&scenario).await.unwrap()
        };

        assert!(report.passed(), "{:?}", report.failures);
        assert_eq!(report.events, 8);
        let lines: Vec<&str> = std::str::from_utf8(&out).unwrap().lines().collect();
        assert_eq!(lines.len(), 8);
        assert!(lines[0].contains("\"event\":\"ChannelCreated\""));
    }

    #[tokio::test]
    async fn test_bundled_scenarios_pass() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
        for name in ["delivery.toml", "deferred_skip.toml"] {
            let scenario = crate::scenario::load_scenario(&dir.join(name)).unwrap();
            let config = scenario.setup.config.clone().unwrap_or_default();
            let mut runner =
                ScenarioRunner::new(config, scenario.setup.start_secs, std::io::sink());
            let report = runner.run(&scenario).await.unwrap();
            assert!(report.passed(), "{name}: {:?}", report.failures);
        }
    }

    #[tokio::test]
    async fn test_mismatch_is_reported() {
        let scenario = parse_scenario(
            r#"
[metadata]
name = "mismatch"

[[steps]]
op = "publish"
actor = "pub"
channel = 3
payload = "x"

[[steps]]
op = "advance"
secs = 5

[[steps]]
op = "create_channel"
actor = "pub"
index = 1
expect = { value = 7 }
"#,
        )
        .unwrap();
        let mut runner = ScenarioRunner::new(LedgerConfig::default(), 0, std::io::sink());
        let report = runner.run(&scenario).await.unwrap();

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].step, 0);
        assert!(report.failures[0].reason.contains("unexpected error"));
        assert_eq!(report.failures[1].op, "create_channel");
        assert_eq!(
            runner.service().events()[0].at,
            quay_core::PhysicalTime::from_secs(5)
        );
    }
}

//! Declarative ledger scenarios in TOML
//!
//! A scenario names its actors by label, and each step runs one ledger
//! operation (or moves the clock) with an optional expectation:
//!
//! ```toml
//! [metadata]
//! name = "retry-exhaustion"
//!
//! [[steps]]
//! op = "get_next"
//! actor = "alice"
//! channel = 0
//! max_scan = 5
//! expect = { events = ["MessageSkipped", "MessagePopped"], value = 1 }
//! ```

use anyhow::{bail, Context, Result};
use quay_core::LedgerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// TOML file structure for a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioFile {
    /// Scenario metadata
    pub metadata: ScenarioMetadata,
    /// Initial conditions
    #[serde(default)]
    pub setup: ScenarioSetup,
    /// Steps, run in order
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

/// Scenario metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    /// Scenario name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
}

/// Initial conditions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioSetup {
    /// Clock reading before the first step
    #[serde(default)]
    pub start_secs: u64,
    /// Ledger configuration; replaces the command-line configuration when set
    pub config: Option<LedgerConfig>,
}

/// One scenario step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    /// Label of the calling actor; required for every ledger operation
    #[serde(default)]
    pub actor: Option<String>,
    /// What to do
    #[serde(flatten)]
    pub action: Action,
    /// What should happen
    #[serde(default)]
    pub expect: Expectation,
}

/// Ledger operations and clock control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    CreateChannel {
        index: u32,
        #[serde(default)]
        metadata: String,
    },
    Join {
        channel: u64,
        index: u32,
    },
    Publish {
        channel: u64,
        payload: String,
    },
    Subscribe {
        channel: u64,
        credential: String,
        #[serde(default)]
        credential_index: u32,
        lease_secs: u64,
        retries: u32,
    },
    GetNext {
        channel: u64,
        max_scan: u64,
    },
    Confirm {
        channel: u64,
        message: u64,
    },
    Skip {
        channel: u64,
        message: u64,
    },
    /// Move the scenario clock forward
    Advance {
        secs: u64,
    },
}

impl Action {
    /// Operation name as written in the file
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateChannel { .. } => "create_channel",
            Self::Join { .. } => "join",
            Self::Publish { .. } => "publish",
            Self::Subscribe { .. } => "subscribe",
            Self::GetNext { .. } => "get_next",
            Self::Confirm { .. } => "confirm",
            Self::Skip { .. } => "skip",
            Self::Advance { .. } => "advance",
        }
    }

    /// Whether the step calls into the ledger
    pub fn needs_actor(&self) -> bool {
        !matches!(self, Self::Advance { .. })
    }
}

/// Expected outcome of a step
///
/// An empty expectation means "succeeds".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    /// Error kind the step must fail with, e.g. `"unauthorized"`
    pub error: Option<String>,
    /// Event names the step must emit, in order
    pub events: Option<Vec<String>>,
    /// Returned channel or message id
    pub value: Option<u64>,
}

impl ScenarioFile {
    /// Structural checks that do not need a ledger
    pub fn validate(&self) -> Result<()> {
        if self.metadata.name.trim().is_empty() {
            bail!("scenario name must not be empty");
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.action.needs_actor() && step.actor.is_none() {
                bail!("step {i} ({}) has no actor", step.action.name());
            }
            if step.expect.error.is_some() && step.expect.events.is_some() {
                bail!("step {i} expects both an error and events");
            }
        }
        if let Some(config) = &self.setup.config {
            config.validate()?;
        }
        Ok(())
    }
}

/// Parse and validate scenario text
pub fn parse_scenario(content: &str) -> Result<ScenarioFile> {
    let scenario: ScenarioFile = toml::from_str(content).context("invalid scenario TOML")?;
    scenario.validate()?;
    Ok(scenario)
}

/// Load a scenario file from disk
pub fn load_scenario(path: &Path) -> Result<ScenarioFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    parse_scenario(&content).with_context(|| format!("in scenario {}", path.display()))
}

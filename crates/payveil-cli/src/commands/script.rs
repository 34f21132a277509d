//! Scripted sessions.
//!
//! A script is a TOML list of steps run in order against one session.
//! Records are addressed by creation index.
//!
//! ```toml
//! [[step]]
//! op = "create"
//! owner = "Alice"
//! rate = 50
//! hours = 40
//!
//! [[step]]
//! op = "decrypt"
//! record = 0
//! ```

use crate::session::{print_records, Session};
use anyhow::{bail, Context, Result};
use payveil_core::effects::{LedgerError, RejectReason};
use payveil_core::{CreateRecordInput, LifecycleConfig, LifecycleError, LifecycleStatus, RecordId};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
    /// Stop at the first failing step
    #[serde(default)]
    pub fail_fast: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Create {
        owner: String,
        rate: i64,
        hours: i64,
        #[serde(default)]
        description: String,
    },
    Decrypt {
        record: usize,
    },
    Transition {
        record: usize,
        status: String,
    },
    Refresh,
    Stats,
    Search {
        term: String,
    },
    Check,
    /// Make the next encryption fail
    BreakEncryption {
        reason: String,
    },
    /// Make the next submission be declined by the actor
    DeclineNextSignature,
    /// Verify a record as another actor would
    VerifyElsewhere {
        record: usize,
    },
}

impl Script {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid session script")
    }
}

pub async fn run(config: LifecycleConfig, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let script = Script::parse(&content)?;
    let session = Session::new(config);
    let mut created = Vec::new();

    for (index, step) in script.steps.iter().enumerate() {
        tracing::debug!(index, ?step, "running step");
        match execute(&session, &mut created, step).await {
            Ok(()) => {}
            Err(err) if script.fail_fast => {
                return Err(err.context(format!("step {index} failed")));
            }
            Err(err) => println!("step {index} failed: {err:#}"),
        }
        session.print_status();
    }
    Ok(())
}

async fn execute(session: &Session, created: &mut Vec<RecordId>, step: &Step) -> Result<()> {
    let controller = &session.controller;
    match step {
        Step::Create {
            owner,
            rate,
            hours,
            description,
        } => {
            let input = CreateRecordInput::new(owner.clone(), *rate, *hours, description.clone());
            let id = controller.create(input, &session.actor).await?;
            println!("created {id}");
            created.push(id);
        }
        Step::Decrypt { record } => {
            let id = lookup(created, *record)?;
            let value = controller.decrypt(id).await?;
            println!("{id} = {value}");
        }
        Step::Transition { record, status } => {
            let id = lookup(created, *record)?;
            let target: LifecycleStatus = status.parse()?;
            let applied = controller.transition_status(id, target).await?;
            println!("{id} is {applied}");
        }
        Step::Refresh => {
            let records = controller.refresh_all().await?;
            print_records(&records)?;
        }
        Step::Stats => {
            println!("{}", serde_json::to_string_pretty(&controller.store().stats())?);
        }
        Step::Search { term } => {
            print_records(&controller.store().search(term))?;
        }
        Step::Check => {
            let available = controller.check_availability().await?;
            println!("available: {available}");
        }
        Step::BreakEncryption { reason } => session.mocks.encryption.fail_next(reason.clone()),
        Step::DeclineNextSignature => session
            .mocks
            .ledger
            .fail_next_submit(LedgerError::Rejected(RejectReason::UserCancelled)),
        Step::VerifyElsewhere { record } => {
            let id = lookup(created, *record)?;
            session
                .mocks
                .ledger
                .verify_externally(id)
                .map_err(LifecycleError::from)?;
        }
    }
    Ok(())
}

fn lookup(created: &[RecordId], index: usize) -> Result<&RecordId> {
    match created.get(index) {
        Some(id) => Ok(id),
        None => bail!("no record #{index}; {} created so far", created.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_steps() {
        let script = Script::parse(
            r#"
            fail_fast = true

            [[step]]
            op = "create"
            owner = "Alice"
            rate = 50
            hours = 40

            [[step]]
            op = "decrypt"
            record = 0

            [[step]]
            op = "decline_next_signature"
            "#,
        )
        .unwrap();

        assert!(script.fail_fast);
        assert_eq!(script.steps.len(), 3);
        assert!(matches!(script.steps[1], Step::Decrypt { record: 0 }));
    }

    #[tokio::test]
    async fn failing_steps_do_not_stop_the_session() {
        let session = Session::new(LifecycleConfig::default());
        let mut created = Vec::new();

        let steps = [
            Step::Decrypt { record: 0 },
            Step::Create {
                owner: "Alice".into(),
                rate: 50,
                hours: 40,
                description: String::new(),
            },
            Step::Decrypt { record: 0 },
        ];
        let results = [
            execute(&session, &mut created, &steps[0]).await.is_ok(),
            execute(&session, &mut created, &steps[1]).await.is_ok(),
            execute(&session, &mut created, &steps[2]).await.is_ok(),
        ];

        assert_eq!(results, [false, true, true]);
        assert!(session.controller.store().get(&created[0]).unwrap().verified());
    }
}

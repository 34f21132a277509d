//! One lifecycle session wired to an in-process ledger.

use anyhow::Result;
use payveil_app::{LifecycleController, StatusSnapshot};
use payveil_core::{ActorId, ConfidentialRecord, LifecycleConfig};
use payveil_testkit::MockCollaborators;
use serde::Serialize;
use std::sync::Arc;

pub struct Session {
    pub mocks: MockCollaborators,
    pub controller: LifecycleController,
    pub actor: ActorId,
}

impl Session {
    pub fn new(config: LifecycleConfig) -> Self {
        let mocks = MockCollaborators::new();
        let controller = controller_for(&mocks, config);
        let actor = mocks.ledger.signer().clone();
        Self {
            mocks,
            controller,
            actor,
        }
    }

    /// A second actor on the same ledger.
    pub fn join(&self, actor: ActorId) -> Self {
        let mocks = self.mocks.for_actor(actor.clone());
        let controller = controller_for(&mocks, self.controller.config().clone());
        Self {
            mocks,
            controller,
            actor,
        }
    }

    pub fn print_status(&self) {
        print_status(&self.controller.status().current());
    }
}

fn controller_for(mocks: &MockCollaborators, config: LifecycleConfig) -> LifecycleController {
    LifecycleController::new(
        config,
        Arc::new(mocks.encryption.clone()),
        Arc::new(mocks.ledger.clone()),
        Arc::new(mocks.verifier.clone()),
    )
}

#[derive(Serialize)]
struct RecordLine<'a> {
    id: &'a str,
    owner: &'a str,
    rate: u64,
    hours: u64,
    status: String,
    creator: String,
    disclosed: Option<u64>,
}

pub fn print_records(records: &[ConfidentialRecord]) -> Result<()> {
    for record in records {
        let line = RecordLine {
            id: record.id.as_str(),
            owner: &record.owner_display_name,
            rate: record.public_rate,
            hours: record.public_hours,
            status: record.lifecycle_status.to_string(),
            creator: record.creator.short(),
            disclosed: record.decrypted_value(),
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

pub fn print_status(status: &StatusSnapshot) {
    if status.visible {
        println!("[{:?}] {}", status.status, status.message);
    }
}

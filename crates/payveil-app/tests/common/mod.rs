//! Shared fixtures for controller integration tests.

#![allow(dead_code)]

use payveil_app::LifecycleController;
use payveil_core::{CreateRecordInput, LifecycleConfig, RecordId};
use payveil_testkit::{test_actor, MockCollaborators};
use std::sync::Arc;

pub fn controller(mocks: &MockCollaborators) -> LifecycleController {
    controller_with(mocks, LifecycleConfig::default())
}

pub fn controller_with(mocks: &MockCollaborators, config: LifecycleConfig) -> LifecycleController {
    LifecycleController::new(
        config,
        Arc::new(mocks.encryption.clone()),
        Arc::new(mocks.ledger.clone()),
        Arc::new(mocks.verifier.clone()),
    )
}

pub fn alice(rate: i64) -> CreateRecordInput {
    CreateRecordInput::new("Alice", rate, 40, "Q1")
}

/// Create one record as the default actor.
pub async fn seeded(rate: i64) -> (MockCollaborators, LifecycleController, RecordId) {
    let mocks = MockCollaborators::new();
    let controller = controller(&mocks);
    let id = controller
        .create(alice(rate), &test_actor())
        .await
        .expect("seed record");
    (mocks, controller, id)
}

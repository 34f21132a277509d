//! Guided walkthrough of the lifecycle with two actors.

use crate::session::{print_records, Session};
use anyhow::Result;
use payveil_core::{ActorId, CreateRecordInput, LifecycleConfig, LifecycleStatus};

pub async fn run(config: LifecycleConfig) -> Result<()> {
    let alice = Session::new(config);
    let bob = alice.join(ActorId::new("0x0000000000000000000000000000000000000b0b"));

    println!("== create");
    let first = alice
        .controller
        .create(CreateRecordInput::new("Alice", 75_000, 40, "Q1 contract"), &alice.actor)
        .await?;
    alice.print_status();
    let second = bob
        .controller
        .create(CreateRecordInput::new("Bob", 62_000, 20, "maintenance"), &bob.actor)
        .await?;
    bob.print_status();

    println!("== rejected input");
    if let Err(err) = alice
        .controller
        .create(CreateRecordInput::new("Mallory", -1, 1, ""), &alice.actor)
        .await
    {
        println!("create refused: {err}");
    }

    println!("== decrypt");
    let value = alice.controller.decrypt(&first).await?;
    println!("{first} disclosed {value}");
    alice.print_status();

    println!("== concurrent decrypt");
    let before = alice.mocks.ledger.submissions_of("verifyDecryption");
    let (a, b) = tokio::join!(
        alice.controller.decrypt(&second),
        alice.controller.decrypt(&second)
    );
    println!(
        "both callers saw {} and {}; verifications submitted: {}",
        a?,
        b?,
        alice.mocks.ledger.submissions_of("verifyDecryption") - before
    );

    println!("== verified elsewhere");
    bob.controller.refresh_all().await?;
    let value = bob.controller.decrypt(&first).await?;
    println!("{} reads {first} = {value} without a new submission", bob.actor.short());

    println!("== lifecycle");
    alice
        .controller
        .transition_status(&first, LifecycleStatus::Paused)
        .await?;
    alice.print_status();

    println!("== records");
    let records = alice.controller.refresh_all().await?;
    print_records(&records)?;
    println!("{}", serde_json::to_string_pretty(&alice.controller.store().stats())?);
    Ok(())
}

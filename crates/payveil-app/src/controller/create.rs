//! Record creation: validate, encrypt, submit once, await finality, refresh.

use super::LifecycleController;
use payveil_core::effects::{CreateRecordCall, LedgerCall};
use payveil_core::{
    ActorId, CreateRecordInput, LifecycleError, OperationKind, RecordId, ValidatedCreate,
};

impl LifecycleController {
    /// Create a confidential record on behalf of `actor`.
    ///
    /// All-or-nothing: any failure before finality leaves no record behind,
    /// and validation failures never reach a collaborator.
    pub async fn create(
        &self,
        input: CreateRecordInput,
        actor: &ActorId,
    ) -> Result<RecordId, LifecycleError> {
        let status = &self.inner.status;
        let validated = match validate(&input, actor) {
            Ok(validated) => validated,
            Err(err) => {
                tracing::debug!(error = %err, "create rejected before submission");
                status.report_error(OperationKind::Create, err.user_message());
                return Err(err);
            }
        };

        let ticket = status.begin(OperationKind::Create, "Creating record with encryption...");
        let record_id = RecordId::generate(&self.inner.config.record_id_prefix);

        let result = async {
            let encrypted_rate = self
                .inner
                .encryption
                .encrypt(&self.inner.context, actor, validated.rate)
                .await
                .map_err(LifecycleError::from)?;
            tracing::debug!(%record_id, payload_len = encrypted_rate.payload.len(), "rate encrypted");

            let call = LedgerCall::CreateRecord(CreateRecordCall {
                record_id: record_id.clone(),
                owner_display_name: validated.owner_display_name,
                encrypted_rate,
                public_rate: validated.rate,
                public_hours: validated.hours,
                description: validated.description,
            });
            let tx = self.submit(call).await?;
            ticket.update("Waiting for transaction confirmation...");
            self.await_final(&tx, &record_id).await
        }
        .await;

        if let Err(err) = result {
            tracing::warn!(%record_id, error = %err, "record creation failed");
            ticket.fail(err.user_message());
            return Err(err);
        }

        tracing::info!(%record_id, creator = %actor.short(), "record created");
        self.reload_after_write(&record_id).await;
        ticket.succeed("Record created successfully");
        Ok(record_id)
    }
}

fn validate(
    input: &CreateRecordInput,
    actor: &ActorId,
) -> Result<ValidatedCreate, LifecycleError> {
    if !actor.is_authenticated() {
        return Err(LifecycleError::validation("connect a wallet first"));
    }
    input.validate()
}

use db_connection::{
    Connection,
    ConnectionProvider,
    SchemaName,
};
use errors::ErrorMetadata;
use serde_json::Value as JsonValue;
use sync_types::{
    Mutation,
    MutationErrorKind,
    MutationKind,
    MutationResponse,
    MutationResult,
    PushBody,
    PushError,
    PushResponse,
    PUSH_VERSION,
};

use crate::{
    clients::advance_last_mutation_id,
    crud::{
        apply_crud_ops,
        TableRegistry,
    },
    metrics::{
        log_mutation_outcome,
        process_push_timer,
    },
    mutators::{
        MutatorRegistry,
        MutatorTx,
    },
};

/// Request parameters the push endpoint was addressed with: the query
/// parameters the pusher appends to every upstream URL.
#[derive(Clone, Debug)]
pub struct ProcessParams {
    /// Database schema holding the application tables and the `clients`
    /// table.
    pub schema: String,
    pub app_id: String,
}

#[derive(Clone, Debug, Default)]
pub struct ProcessorConfig {
    /// Schema versions this deployment accepts. `None` accepts any; a push
    /// naming a version outside the set is rejected as fatal.
    pub supported_schema_versions: Option<Vec<u32>>,
}

enum MutationOutcome {
    Applied,
    DuplicateSkip,
    AppError,
    OutOfOrder,
}

impl MutationOutcome {
    /// Application errors and out-of-order mutations end the push; nothing
    /// after them is processed.
    fn halts_push(&self) -> bool {
        matches!(self, Self::AppError | Self::OutOfOrder)
    }

    fn metric_value(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::DuplicateSkip => "duplicate_skip",
            Self::AppError => "app_error",
            Self::OutOfOrder => "out_of_order",
        }
    }
}

/// Processes pushes forwarded by the pusher: one connection per push, one
/// transaction per mutation, strict per-client ordering enforced through
/// the persisted `lastMutationID`.
pub struct PushProcessor<P: ConnectionProvider> {
    provider: P,
    mutators: MutatorRegistry,
    tables: TableRegistry,
    config: ProcessorConfig,
}

impl<P: ConnectionProvider> PushProcessor<P> {
    pub fn new(
        provider: P,
        mutators: MutatorRegistry,
        tables: TableRegistry,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            provider,
            mutators,
            tables,
            config,
        }
    }

    /// Handle one push request body. Returns the `PushResponse` to reply
    /// with; `Err` means the request itself was malformed (surfaced as an
    /// HTTP error by the serving layer, not as a push response).
    pub async fn process(
        &self,
        params: &ProcessParams,
        body: JsonValue,
    ) -> anyhow::Result<PushResponse> {
        let timer = process_push_timer();
        let body: PushBody = serde_json::from_value(body).map_err(|e| {
            anyhow::anyhow!(ErrorMetadata::bad_request(
                "InvalidPushBody",
                format!("Failed to parse push body: {e}"),
            ))
        })?;

        if body.push_version != PUSH_VERSION {
            tracing::warn!(
                "Rejecting push from client group {} with pushVersion {}",
                body.client_group_id,
                body.push_version
            );
            return Ok(PushResponse::Error(PushError::unsupported_push_version(
                body.mutation_ids(),
            )));
        }
        if let (Some(supported), Some(version)) =
            (&self.config.supported_schema_versions, body.schema_version)
        {
            if !supported.contains(&version) {
                tracing::warn!(
                    "Rejecting push from client group {} with schemaVersion {version}",
                    body.client_group_id
                );
                return Ok(PushResponse::Error(PushError::unsupported_schema_version(
                    body.mutation_ids(),
                )));
            }
        }

        let schema = SchemaName::new(&params.schema)?;
        let mut connection = self.provider.acquire().await?;
        let mut responses = Vec::with_capacity(body.mutations.len());
        for mutation in &body.mutations {
            let (response, outcome) = self
                .process_mutation(connection.as_mut(), &schema, &body, mutation)
                .await?;
            log_mutation_outcome(outcome.metric_value());
            responses.push(response);
            if outcome.halts_push() {
                break;
            }
        }
        timer.finish();
        Ok(PushResponse::ok(responses))
    }

    async fn process_mutation(
        &self,
        connection: &mut dyn Connection,
        schema: &SchemaName,
        body: &PushBody,
        mutation: &Mutation,
    ) -> anyhow::Result<(MutationResponse, MutationOutcome)> {
        let mutation_id = mutation.mutation_id();
        let mut tx = connection.transaction().await?;
        let expected =
            advance_last_mutation_id(tx.as_mut(), schema, &body.client_group_id, &mutation.client_id)
                .await?;

        if (mutation.id as i128) < (expected as i128) {
            // Already applied; roll back the increment and acknowledge so
            // client retries converge.
            tx.rollback().await?;
            return Ok((
                MutationResponse {
                    id: mutation_id,
                    result: MutationResult::ok(),
                },
                MutationOutcome::DuplicateSkip,
            ));
        }
        if (mutation.id as i128) > (expected as i128) {
            tx.rollback().await?;
            let details = format!(
                "Client {} sent mutation ID {} but expected {expected}",
                mutation.client_id, mutation.id
            );
            tracing::warn!("{details}");
            return Ok((
                MutationResponse {
                    id: mutation_id,
                    result: MutationResult::error(MutationErrorKind::OooMutation, details),
                },
                MutationOutcome::OutOfOrder,
            ));
        }

        let result = self.dispatch_mutator(tx.as_mut(), schema, mutation).await;
        match result {
            Ok(()) => {
                tx.commit().await?;
                Ok((
                    MutationResponse {
                        id: mutation_id,
                        result: MutationResult::ok(),
                    },
                    MutationOutcome::Applied,
                ))
            },
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::warn!("Rollback after mutator failure failed: {rollback_error:#}");
                }
                // Error mode: advance the LMID in a fresh transaction, with
                // no mutator call, so the client doesn't retry the poisoned
                // mutation forever.
                let mut tx = connection.transaction().await?;
                advance_last_mutation_id(
                    tx.as_mut(),
                    schema,
                    &body.client_group_id,
                    &mutation.client_id,
                )
                .await?;
                tx.commit().await?;
                tracing::warn!(
                    "Mutator {} failed for mutation {mutation_id}: {e:#}",
                    mutation.name
                );
                Ok((
                    MutationResponse {
                        id: mutation_id,
                        result: MutationResult::error(MutationErrorKind::App, format!("{e:#}")),
                    },
                    MutationOutcome::AppError,
                ))
            },
        }
    }

    async fn dispatch_mutator(
        &self,
        tx: &mut dyn db_connection::Transaction,
        schema: &SchemaName,
        mutation: &Mutation,
    ) -> anyhow::Result<()> {
        let mut mtx = MutatorTx {
            tx,
            schema,
            tables: &self.tables,
            client_id: mutation.client_id.clone(),
            mutation_id: mutation.id,
        };
        match mutation.kind {
            MutationKind::Custom => {
                let mutator = self
                    .mutators
                    .get(&mutation.name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown mutator {}", mutation.name))?;
                mutator.run(&mut mtx, mutation.args.clone()).await
            },
            MutationKind::Crud => apply_crud_ops(&mut mtx, mutation.args.clone()).await,
        }
    }
}

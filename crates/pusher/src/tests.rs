use std::sync::Arc;

use async_trait::async_trait;
use errors::ErrorMetadataAnyhowExt;
use proptest::prelude::*;
use sync_types::{
    testing::arb_push_body,
    ClientId,
    Downstream,
    Mutation,
    MutationErrorKind,
    MutationKind,
    MutationResponse,
    MutationResult,
    PushBody,
    PushError,
    PushErrorKind,
    PushResponse,
};
use tokio::sync::{
    mpsc,
    Semaphore,
};

use crate::{
    coalesce::coalesce,
    dispatch::PushDispatcher,
    fanout::fan_out,
    queue::{
        PushEntry,
        QueueEntry,
    },
    state::{
        DownstreamRegistry,
        UserPushParams,
    },
    worker::PushService,
};

fn mutation(client: &str, id: u64) -> Mutation {
    Mutation {
        kind: MutationKind::Custom,
        id,
        client_id: client.into(),
        name: "issue.create".to_owned(),
        args: serde_json::json!({}),
        timestamp: 0.0,
    }
}

fn push_body(client: &str, ids: &[u64]) -> PushBody {
    PushBody {
        client_group_id: "cg".into(),
        mutations: ids.iter().map(|&id| mutation(client, id)).collect(),
        push_version: 1,
        schema_version: None,
        timestamp: 0.0,
        request_id: "r".to_owned(),
    }
}

fn push_entry(client: &str, ids: &[u64]) -> PushEntry {
    PushEntry {
        client_id: client.into(),
        push: push_body(client, ids),
        jwt: None,
    }
}

fn ok_result(client: &str, id: u64) -> MutationResponse {
    MutationResponse {
        id: mutation(client, id).mutation_id(),
        result: MutationResult::ok(),
    }
}

fn ooo_result(client: &str, id: u64) -> MutationResponse {
    MutationResponse {
        id: mutation(client, id).mutation_id(),
        result: MutationResult::error(MutationErrorKind::OooMutation, "gap"),
    }
}

mod coalesce_tests {
    use super::*;

    #[test]
    fn test_merges_same_client() {
        let entries = vec![
            QueueEntry::Push(push_entry("c1", &[1])),
            QueueEntry::Push(push_entry("c1", &[2, 3])),
        ];
        let (batches, terminate) = coalesce(entries).unwrap();
        assert!(!terminate);
        assert_eq!(batches.len(), 1);
        let ids: Vec<u64> = batches[0].push.mutations.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_groups_by_client_across_interleaving() {
        let entries = vec![
            QueueEntry::Push(push_entry("c1", &[1])),
            QueueEntry::Push(push_entry("c2", &[5])),
            QueueEntry::Push(push_entry("c1", &[2])),
        ];
        let (batches, _) = coalesce(entries).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].client_id, ClientId::from("c1"));
        assert_eq!(
            batches[0].push.mutations.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![1, 2],
        );
        assert_eq!(batches[1].client_id, ClientId::from("c2"));
    }

    #[test]
    fn test_sentinel_discards_trailing_entries() {
        let entries = vec![
            QueueEntry::Push(push_entry("c1", &[1])),
            QueueEntry::Stop,
            QueueEntry::Push(push_entry("c2", &[9])),
        ];
        let (batches, terminate) = coalesce(entries).unwrap();
        assert!(terminate);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].client_id, ClientId::from("c1"));
    }

    #[test]
    fn test_jwt_mismatch_fails() {
        let mut second = push_entry("c1", &[2]);
        second.jwt = Some(sync_types::AuthToken::new("tok"));
        let entries = vec![
            QueueEntry::Push(push_entry("c1", &[1])),
            QueueEntry::Push(second),
        ];
        let err = coalesce(entries).unwrap_err();
        assert!(err.is_bad_request());
        assert_eq!(err.short_msg(), Some("PushCoalesceMismatch"));
    }

    #[test]
    fn test_schema_version_mismatch_fails() {
        let mut second = push_entry("c1", &[2]);
        second.push.schema_version = Some(4);
        let entries = vec![
            QueueEntry::Push(push_entry("c1", &[1])),
            QueueEntry::Push(second),
        ];
        assert!(coalesce(entries).is_err());
    }

    #[test]
    fn test_push_version_mismatch_fails() {
        let mut second = push_entry("c1", &[2]);
        second.push.push_version = 2;
        let entries = vec![
            QueueEntry::Push(push_entry("c1", &[1])),
            QueueEntry::Push(second),
        ];
        assert!(coalesce(entries).is_err());
    }

    fn arb_entries(clients: &'static [&'static str]) -> impl Strategy<Value = Vec<QueueEntry>> {
        let entry = prop::sample::select(clients).prop_flat_map(|client| {
            arb_push_body("cg".into(), client.into()).prop_map(move |push| {
                QueueEntry::Push(PushEntry {
                    client_id: client.into(),
                    push,
                    jwt: None,
                })
            })
        });
        prop::collection::vec(entry, 0..8)
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, failure_persistence: None, ..ProptestConfig::default() })]

        #[test]
        fn proptest_sentinel_cut(
            xs in arb_entries(&["c1", "c2"]),
            ys in arb_entries(&["c1", "c3"]),
        ) {
            let mut with_sentinel = xs.clone();
            with_sentinel.push(QueueEntry::Stop);
            with_sentinel.extend(ys);
            let (cut_batches, terminate) = coalesce(with_sentinel).unwrap();
            prop_assert!(terminate);
            let (batches, no_terminate) = coalesce(xs).unwrap();
            prop_assert!(!no_terminate);
            prop_assert_eq!(cut_batches, batches);
        }

        #[test]
        fn proptest_one_composite_per_client(entries in arb_entries(&["c1", "c2", "c3"])) {
            let input_mutations: usize = entries
                .iter()
                .map(|e| match e {
                    QueueEntry::Push(e) => e.push.mutations.len(),
                    QueueEntry::Stop => 0,
                })
                .sum();
            let (batches, _) = coalesce(entries.clone()).unwrap();
            let mut seen = std::collections::BTreeSet::new();
            for batch in &batches {
                prop_assert!(seen.insert(batch.client_id.clone()));
            }
            let total: usize = batches.iter().map(|b| b.push.mutations.len()).sum();
            prop_assert_eq!(total, input_mutations);
        }
    }
}

mod registry_tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_epoch_rejected() {
        let registry = DownstreamRegistry::new();
        let _stream = registry
            .init_connection("c1".into(), "w1".to_owned(), None)
            .unwrap();
        let err = registry
            .init_connection("c1".into(), "w1".to_owned(), None)
            .unwrap_err();
        assert!(err.is_bad_request());
        assert_eq!(err.short_msg(), Some("ClientEpochAlreadyInitialized"));
    }

    #[tokio::test]
    async fn test_epoch_replacement_ends_prior_stream() {
        let registry = DownstreamRegistry::new();
        let mut s1 = registry
            .init_connection("c1".into(), "w1".to_owned(), None)
            .unwrap();
        let mut s2 = registry
            .init_connection("c1".into(), "w2".to_owned(), None)
            .unwrap();

        // The first stream ends cleanly without yielding anything further.
        assert!(s1.next().await.is_none());

        // Subsequent responses arrive on the new epoch's stream.
        let sender = registry.sender(&"c1".into()).unwrap();
        sender
            .send(Ok(Downstream::PushResponse(PushResponse::ok(vec![]))))
            .await
            .unwrap();
        assert!(matches!(s2.next().await, Some(Ok(_))));
    }

    #[tokio::test]
    async fn test_consumer_cancel_removes_entry() {
        let registry = DownstreamRegistry::new();
        let stream = registry
            .init_connection("c1".into(), "w1".to_owned(), None)
            .unwrap();
        assert!(registry.contains(&"c1".into()));
        drop(stream);
        assert!(!registry.contains(&"c1".into()));
    }

    #[tokio::test]
    async fn test_replaced_stream_drop_keeps_new_entry() {
        let registry = DownstreamRegistry::new();
        let s1 = registry
            .init_connection("c1".into(), "w1".to_owned(), None)
            .unwrap();
        let _s2 = registry
            .init_connection("c1".into(), "w2".to_owned(), None)
            .unwrap();
        drop(s1);
        assert!(registry.contains(&"c1".into()));
    }
}

mod fanout_tests {
    use super::*;

    #[tokio::test]
    async fn test_ok_response_delivered() {
        let registry = DownstreamRegistry::new();
        let mut stream = registry
            .init_connection("c1".into(), "w1".to_owned(), None)
            .unwrap();
        let entry = push_entry("c1", &[1, 2]);
        let response = PushResponse::ok(vec![ok_result("c1", 1), ok_result("c1", 2)]);
        fan_out(&registry, &entry, response).await;

        let Some(Ok(Downstream::PushResponse(PushResponse::Ok(ok)))) = stream.next().await else {
            panic!("expected a pushResponse message");
        };
        assert_eq!(ok.mutations.len(), 2);
        assert!(registry.contains(&"c1".into()));
    }

    #[tokio::test]
    async fn test_ooo_sends_prefix_then_fails_stream() {
        let registry = DownstreamRegistry::new();
        let mut stream = registry
            .init_connection("c1".into(), "w1".to_owned(), None)
            .unwrap();
        let entry = push_entry("c1", &[1, 2, 5, 6]);
        // Results past the out-of-order error violate the upstream's
        // contract and must be dropped.
        let response = PushResponse::ok(vec![
            ok_result("c1", 1),
            ok_result("c1", 2),
            ooo_result("c1", 5),
            ok_result("c1", 6),
        ]);
        fan_out(&registry, &entry, response).await;

        let Some(Ok(Downstream::PushResponse(PushResponse::Ok(ok)))) = stream.next().await else {
            panic!("expected the success prefix first");
        };
        assert_eq!(ok.mutations.len(), 2);
        assert!(ok.mutations.iter().all(|m| m.id.id <= 2));

        let Some(Err(invalid)) = stream.next().await else {
            panic!("expected the stream to fail");
        };
        assert_eq!(invalid.reason, "mutation was out of order");
        assert!(stream.next().await.is_none());
        assert!(!registry.contains(&"c1".into()));
    }

    #[tokio::test]
    async fn test_retriable_error_keeps_stream_open() {
        let registry = DownstreamRegistry::new();
        let mut stream = registry
            .init_connection("c1".into(), "w1".to_owned(), None)
            .unwrap();
        let entry = push_entry("c1", &[3]);
        let response = PushResponse::Error(PushError::http(
            503,
            "unavailable",
            entry.push.mutation_ids(),
        ));
        fan_out(&registry, &entry, response).await;

        let Some(Ok(Downstream::PushResponse(PushResponse::Error(err)))) = stream.next().await
        else {
            panic!("expected a retriable error message");
        };
        assert_eq!(err.error, PushErrorKind::Http);
        assert_eq!(err.status, Some(503));
        assert!(registry.contains(&"c1".into()));
    }

    #[tokio::test]
    async fn test_fatal_error_fails_stream() {
        let registry = DownstreamRegistry::new();
        let mut stream = registry
            .init_connection("c1".into(), "w1".to_owned(), None)
            .unwrap();
        let entry = push_entry("c1", &[1]);
        let response = PushResponse::Error(PushError::unsupported_push_version(
            entry.push.mutation_ids(),
        ));
        fan_out(&registry, &entry, response).await;

        let Some(Err(invalid)) = stream.next().await else {
            panic!("expected the stream to fail");
        };
        assert_eq!(invalid.reason, "unsupportedPushVersion");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_connection_dropped_silently() {
        let registry = DownstreamRegistry::new();
        let entry = push_entry("c1", &[1]);
        fan_out(&registry, &entry, PushResponse::ok(vec![ok_result("c1", 1)])).await;
    }

    #[tokio::test]
    async fn test_multi_client_response_partitions_by_client() {
        let registry = DownstreamRegistry::new();
        let mut s1 = registry
            .init_connection("c1".into(), "w1".to_owned(), None)
            .unwrap();
        let mut s2 = registry
            .init_connection("c2".into(), "w1".to_owned(), None)
            .unwrap();
        let entry = push_entry("c1", &[1]);
        let response = PushResponse::ok(vec![
            ok_result("c1", 1),
            ok_result("c2", 7),
            ok_result("c1", 2),
        ]);
        fan_out(&registry, &entry, response).await;

        let Some(Ok(Downstream::PushResponse(PushResponse::Ok(ok1)))) = s1.next().await else {
            panic!("expected a message for c1");
        };
        assert_eq!(
            ok1.mutations.iter().map(|m| m.id.id).collect::<Vec<_>>(),
            vec![1, 2],
        );
        let Some(Ok(Downstream::PushResponse(PushResponse::Ok(ok2)))) = s2.next().await else {
            panic!("expected a message for c2");
        };
        assert_eq!(
            ok2.mutations.iter().map(|m| m.id.id).collect::<Vec<_>>(),
            vec![7],
        );
    }
}

/// Dispatcher that reports each call's mutation count and blocks on a
/// semaphore until the test releases it.
struct GatedDispatcher {
    gate: Arc<Semaphore>,
    entered: mpsc::UnboundedSender<usize>,
}

#[async_trait]
impl PushDispatcher for GatedDispatcher {
    async fn dispatch(
        &self,
        entry: &PushEntry,
        _user_params: Option<Arc<UserPushParams>>,
    ) -> anyhow::Result<PushResponse> {
        self.entered.send(entry.push.mutations.len()).unwrap();
        let _permit = self.gate.acquire().await?;
        Ok(echo_ok(entry))
    }
}

/// Dispatcher that acknowledges every mutation.
struct EchoDispatcher;

#[async_trait]
impl PushDispatcher for EchoDispatcher {
    async fn dispatch(
        &self,
        entry: &PushEntry,
        _user_params: Option<Arc<UserPushParams>>,
    ) -> anyhow::Result<PushResponse> {
        Ok(echo_ok(entry))
    }
}

/// Dispatcher standing in for an unparseable upstream response.
struct FailingDispatcher;

#[async_trait]
impl PushDispatcher for FailingDispatcher {
    async fn dispatch(
        &self,
        _entry: &PushEntry,
        _user_params: Option<Arc<UserPushParams>>,
    ) -> anyhow::Result<PushResponse> {
        anyhow::bail!("Push endpoint returned an unparseable response")
    }
}

fn echo_ok(entry: &PushEntry) -> PushResponse {
    PushResponse::ok(
        entry
            .push
            .mutations
            .iter()
            .map(|m| MutationResponse {
                id: m.mutation_id(),
                result: MutationResult::ok(),
            })
            .collect(),
    )
}

mod service_tests {
    use super::*;

    #[tokio::test]
    async fn test_pushes_coalesce_while_dispatch_blocked() {
        let gate = Arc::new(Semaphore::new(0));
        let (entered_tx, mut entered) = mpsc::unbounded_channel();
        let service = PushService::new(
            "cg".into(),
            Arc::new(GatedDispatcher {
                gate: gate.clone(),
                entered: entered_tx,
            }),
        );

        service
            .enqueue_push("c1".into(), push_body("c1", &[1]), None)
            .unwrap();
        // Wait until the worker is inside the (blocked) dispatch call, so
        // the remaining pushes pile up in the queue behind it.
        assert_eq!(entered.recv().await, Some(1));
        for id in [2, 3, 4] {
            service
                .enqueue_push("c1".into(), push_body("c1", &[id]), None)
                .unwrap();
        }

        gate.add_permits(1);
        // The three queued pushes coalesce into a single second dispatch.
        assert_eq!(entered.recv().await, Some(3));
        gate.add_permits(1);

        service.stop().await.unwrap();
        assert!(entered.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_end_to_end_push_response() {
        let service = PushService::new("cg".into(), Arc::new(EchoDispatcher));
        let mut stream = service
            .init_connection("c1".into(), "w1".to_owned(), None)
            .unwrap();
        service
            .enqueue_push("c1".into(), push_body("c1", &[1]), None)
            .unwrap();

        let Some(Ok(Downstream::PushResponse(PushResponse::Ok(ok)))) = stream.next().await else {
            panic!("expected a pushResponse message");
        };
        assert_eq!(ok.mutations.len(), 1);
        assert!(matches!(ok.mutations[0].result, MutationResult::Ok(_)));

        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_rejects_further_pushes() {
        let service = PushService::new("cg".into(), Arc::new(EchoDispatcher));
        service.stop().await.unwrap();
        let err = service
            .enqueue_push("c1".into(), push_body("c1", &[1]), None)
            .unwrap_err();
        assert_eq!(err.short_msg(), Some("PusherStopping"));
    }

    #[tokio::test]
    async fn test_unparseable_response_aborts_worker() {
        let service = PushService::new("cg".into(), Arc::new(FailingDispatcher));
        service
            .enqueue_push("c1".into(), push_body("c1", &[1]), None)
            .unwrap();
        let err = service.stop().await.unwrap_err();
        assert!(err.to_string().contains("unparseable"));
    }

    #[tokio::test]
    async fn test_enqueue_validation() {
        let service = PushService::new("cg".into(), Arc::new(EchoDispatcher));

        let mut wrong_group = push_body("c1", &[1]);
        wrong_group.client_group_id = "other".into();
        let err = service
            .enqueue_push("c1".into(), wrong_group, None)
            .unwrap_err();
        assert_eq!(err.short_msg(), Some("ClientGroupMismatch"));

        let err = service
            .enqueue_push("c2".into(), push_body("c1", &[1]), None)
            .unwrap_err();
        assert_eq!(err.short_msg(), Some("PushClientMismatch"));

        service.stop().await.unwrap();
    }
}

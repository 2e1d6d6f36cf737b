//! # Cross-Talk Properties
//!
//! Many calls in flight on one channel, replies delivered in an arbitrary
//! order (plus strays and duplicates): every caller must receive exactly the
//! reply carrying its own id.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bridge_bus::{LocalBus, PeerId};
    use bridge_core::{CorrelationEngine, MainIpc, RendererIpc};
    use bridge_types::{reply_channel, CallEnvelope, CallId, ReplyEnvelope};
    use proptest::prelude::*;
    use rand::Rng;
    use serde_json::json;

    use crate::integration::support::ManualTransport;

    const PEER: PeerId = PeerId(1);

    struct Settled {
        /// (sent, received) per call, in issue order
        results: Vec<(i64, i64)>,
        unmatched: u64,
        pending_after: usize,
    }

    /// Issue one `negate` call per value, then answer them in `order`.
    /// A stray reply goes first and every reply is delivered twice.
    fn settle_in_order(values: Vec<i64>, order: Vec<usize>) -> Settled {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let engine = CorrelationEngine::new(ManualTransport::with_peers(vec![PEER]));
            let reply_sub = reply_channel("negate");

            let calls: Vec<_> = values
                .iter()
                .map(|&value| {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        (value, engine.call::<_, i64>(&PEER, "negate", value).await)
                    })
                })
                .collect();

            while engine.transport().sent_count() < values.len() {
                tokio::task::yield_now().await;
            }
            let sent = engine.transport().sent();

            let stray = ReplyEnvelope::success(CallId::new(), json!(0));
            engine
                .transport()
                .deliver(PEER, &reply_sub, serde_json::to_value(stray).unwrap());

            for &index in &order {
                let call: CallEnvelope = serde_json::from_value(sent[index].payload.clone()).unwrap();
                let input: i64 = serde_json::from_value(call.data).unwrap();
                let reply = serde_json::to_value(ReplyEnvelope::success(call.id, json!(-input))).unwrap();

                engine.transport().deliver(PEER, &reply_sub, reply.clone());
                engine.transport().deliver(PEER, &reply_sub, reply);
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                let (value, outcome) = call.await.unwrap();
                results.push((value, outcome.unwrap()));
            }

            Settled {
                results,
                unmatched: engine.stats().replies_unmatched,
                pending_after: engine.pending_count(),
            }
        })
    }

    fn values_and_order() -> impl Strategy<Value = (Vec<i64>, Vec<usize>)> {
        prop::collection::vec(-1_000_000i64..1_000_000, 1..24).prop_flat_map(|values| {
            let order: Vec<usize> = (0..values.len()).collect();
            (Just(values), Just(order).prop_shuffle())
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn reordered_replies_reach_their_own_caller((values, order) in values_and_order()) {
            let n = values.len() as u64;
            let settled = settle_in_order(values.clone(), order);

            prop_assert_eq!(settled.results.len(), values.len());
            for (sent, received) in &settled.results {
                prop_assert_eq!(*received, -*sent);
            }
            // One stray plus one duplicate per call
            prop_assert_eq!(settled.unmatched, n + 1);
            prop_assert_eq!(settled.pending_after, 0);
        }
    }

    #[test]
    fn test_sent_requests_carry_distinct_ids() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let engine = CorrelationEngine::new(ManualTransport::with_peers(vec![PEER]));
            for n in 0..100 {
                let engine = engine.clone();
                tokio::spawn(async move {
                    let _ = engine.call::<_, ()>(&PEER, "fire", n).await;
                });
            }
            while engine.transport().sent_count() < 100 {
                tokio::task::yield_now().await;
            }

            let mut ids: Vec<CallId> = engine
                .transport()
                .sent()
                .into_iter()
                .map(|sent| serde_json::from_value::<CallEnvelope>(sent.payload).unwrap().id)
                .collect();
            ids.sort_by_key(|id| *id.as_uuid());
            ids.dedup();
            assert_eq!(ids.len(), 100);
            assert_eq!(engine.pending_count(), 100);
        });
    }

    /// Both directions at once over `LocalBus`, handlers finishing in random
    /// order.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_traffic_in_both_directions() {
        let bus = LocalBus::new();
        let main = MainIpc::new(bus.hub_endpoint());
        let renderers: Vec<_> = (0..3)
            .map(|_| {
                let endpoint = bus.add_spoke();
                (endpoint.id(), RendererIpc::new(endpoint))
            })
            .collect();

        main.answer_renderer("scale", |n: i64, peer: PeerId| async move {
            let delay = rand::thread_rng().gen_range(0..15);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(n * i64::from(peer.0))
        })
        .unwrap();
        for (peer, renderer) in &renderers {
            let peer = *peer;
            renderer
                .answer_main("tag", move |n: i64| async move {
                    let delay = rand::thread_rng().gen_range(0..15);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok(format!("{peer}:{n}"))
                })
                .unwrap();
        }

        let upward = renderers.iter().flat_map(|(peer, renderer)| {
            (0..20i64).map(move |n| async move {
                let scaled: i64 = renderer.call_main("scale", n).await.unwrap();
                assert_eq!(scaled, n * i64::from(peer.0));
            })
        });
        let downward = renderers.iter().flat_map(|(peer, _)| {
            let main = &main;
            (0..20i64).map(move |n| async move {
                let tag: String = main.call_renderer(peer, "tag", n).await.unwrap();
                assert_eq!(tag, format!("{peer}:{n}"));
            })
        });

        tokio::join!(
            futures::future::join_all(upward),
            futures::future::join_all(downward)
        );

        assert_eq!(main.engine().pending_count(), 0);
        for (_, renderer) in &renderers {
            assert_eq!(renderer.engine().pending_count(), 0);
            assert_eq!(renderer.engine().stats().replies_unmatched, 0);
        }
    }
}

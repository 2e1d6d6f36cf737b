//! # Integration Test Flows
//!
//! Hub and spokes wired over `LocalBus`, each side with its own engine.
//!
//! ## Flows Tested:
//!
//! 1. **Spoke → Hub**: `call_main` answered by `answer_renderer`
//! 2. **Hub → Spoke**: `call_renderer` / `call_focused_renderer`
//! 3. **Broadcast**: `send_to_renderers` with one unreachable spoke
//! 4. **Failures**: handler errors, missing handlers, departed spokes

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use bridge_bus::{HubEndpoint, LocalBus, PeerId, SpokeEndpoint};
    use bridge_core::{CallError, MainIpc, RendererIpc};
    use bridge_types::{reply_channel, request_channel, CallEnvelope, ReplyEnvelope};
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::integration::support::ManualTransport;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const BOUNDED_WAIT: Duration = Duration::from_millis(100);

    struct Topology {
        bus: LocalBus,
        main: MainIpc<HubEndpoint>,
        renderers: Vec<(PeerId, RendererIpc<SpokeEndpoint>)>,
    }

    fn topology(spokes: usize) -> Topology {
        let bus = LocalBus::new();
        let main = MainIpc::new(bus.hub_endpoint());
        let renderers = (0..spokes)
            .map(|_| {
                let endpoint = bus.add_spoke();
                (endpoint.id(), RendererIpc::new(endpoint))
            })
            .collect();
        Topology {
            bus,
            main,
            renderers,
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Settings {
        zoom: f64,
        recent: Vec<String>,
        shortcuts: std::collections::BTreeMap<String, String>,
    }

    // =============================================================================
    // SPOKE → HUB
    // =============================================================================

    #[tokio::test]
    async fn test_renderer_calls_main_with_structured_payload() {
        let t = topology(1);
        t.main
            .answer_renderer_sync("settings:save", |mut settings: Settings, _peer: PeerId| {
                settings.zoom *= 2.0;
                Ok(settings)
            })
            .unwrap();

        let settings = Settings {
            zoom: 1.5,
            recent: vec!["a.txt".into(), "b.txt".into()],
            shortcuts: [("save".to_string(), "Ctrl+S".to_string())].into(),
        };
        let saved: Settings = t.renderers[0]
            .1
            .call_main("settings:save", settings.clone())
            .await
            .unwrap();

        assert_eq!(saved.zoom, 3.0);
        assert_eq!(saved.recent, settings.recent);
        assert_eq!(saved.shortcuts, settings.shortcuts);
    }

    #[tokio::test]
    async fn test_main_sees_which_renderer_called() {
        let t = topology(3);
        t.main
            .answer_renderer_sync("whoami", |_: (), peer: PeerId| Ok(peer))
            .unwrap();

        for (peer, renderer) in &t.renderers {
            let seen: PeerId = renderer.call_main("whoami", ()).await.unwrap();
            assert_eq!(seen, *peer);
        }
    }

    #[tokio::test]
    async fn test_handler_failure_then_other_channel_still_works() {
        let t = topology(1);
        let renderer = &t.renderers[0].1;
        t.main
            .answer_renderer("fs:read", |path: String, _peer: PeerId| async move {
                Err::<String, _>(anyhow::anyhow!("ENOENT: no such file `{path}`"))
            })
            .unwrap();
        t.main
            .answer_renderer_sync("app:version", |_: (), _peer: PeerId| Ok("1.2.3"))
            .unwrap();

        let err = renderer
            .call_main::<_, String>("fs:read", "/missing")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ENOENT: no such file `/missing`");

        let version: String = renderer.call_main("app:version", ()).await.unwrap();
        assert_eq!(version, "1.2.3");
    }

    // =============================================================================
    // HUB → SPOKE
    // =============================================================================

    #[tokio::test]
    async fn test_main_calls_each_renderer() {
        let t = topology(3);
        for (peer, renderer) in &t.renderers {
            let label = format!("window of {peer}");
            renderer
                .answer_main_sync("title", move |_: ()| Ok(label.clone()))
                .unwrap();
        }

        for (peer, _) in &t.renderers {
            let title: String = t.main.call_renderer(peer, "title", ()).await.unwrap();
            assert_eq!(title, format!("window of {peer}"));
        }
    }

    #[tokio::test]
    async fn test_focused_renderer_follows_focus() {
        let t = topology(2);
        for (peer, renderer) in &t.renderers {
            let peer = *peer;
            renderer
                .answer_main_sync("focused:id", move |_: ()| Ok(peer))
                .unwrap();
        }

        let err = t
            .main
            .call_focused_renderer::<_, PeerId>("focused:id", ())
            .await
            .unwrap_err();
        assert_eq!(err, CallError::NoPeerResolved);
        assert_eq!(t.main.engine().stats().calls_issued, 0);

        for (peer, _) in &t.renderers {
            t.bus.focus(Some(*peer));
            let answered: PeerId = t
                .main
                .call_focused_renderer("focused:id", ())
                .await
                .unwrap();
            assert_eq!(answered, *peer);
        }
    }

    #[tokio::test]
    async fn test_focused_call_is_addressed_to_focused_peer() {
        let transport =
            ManualTransport::with_peers(vec![PeerId(1), PeerId(2), PeerId(3)]).with_focus(PeerId(2));
        let main = Arc::new(MainIpc::new(transport));

        let caller = main.clone();
        let call = tokio::spawn(async move {
            caller
                .call_focused_renderer::<_, String>("window:title", ())
                .await
        });

        while main.engine().transport().sent_count() == 0 {
            tokio::task::yield_now().await;
        }
        let sent = main.engine().transport().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, PeerId(2));
        assert_eq!(sent[0].sub_channel, request_channel("window:title"));

        let request: CallEnvelope = serde_json::from_value(sent[0].payload.clone()).unwrap();
        let reply = ReplyEnvelope::success(request.id, json!("Editor"));
        main.engine().transport().deliver(
            PeerId(2),
            &reply_channel("window:title"),
            serde_json::to_value(reply).unwrap(),
        );

        assert_eq!(call.await.unwrap().unwrap(), "Editor");
        assert_eq!(main.engine().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_call_to_departed_renderer_fails_fast() {
        let mut t = topology(2);
        let (gone, renderer) = t.renderers.remove(0);
        drop(renderer);

        let err = t
            .main
            .call_renderer::<_, Value>(&gone, "anything", ())
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::PeerUnreachable { ref peer, .. } if *peer == gone.to_string()));
        assert_eq!(t.main.engine().pending_count(), 0);
    }

    // =============================================================================
    // BROADCAST
    // =============================================================================

    #[tokio::test]
    async fn test_broadcast_reaches_live_renderers_when_one_is_gone() {
        let mut t = topology(3);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut listeners = Vec::new();
        for (peer, renderer) in &t.renderers {
            let tx = tx.clone();
            let peer = *peer;
            listeners.push(
                renderer
                    .on_broadcast("theme", move |theme: String| {
                        let _ = tx.send((peer, theme));
                    })
                    .unwrap(),
            );
        }

        // Peer 2 stays listed but can no longer receive
        let (_, departed) = t.renderers.remove(1);
        drop(departed);

        let delivered = t.main.send_to_renderers("theme", "dark").unwrap();
        assert_eq!(delivered, 2);

        let mut received = Vec::new();
        for _ in 0..2 {
            let message = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
            received.push(message);
        }
        received.sort_by_key(|(peer, _)| *peer);
        assert_eq!(
            received,
            vec![
                (PeerId(1), "dark".to_string()),
                (PeerId(3), "dark".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_removed_broadcast_listener_gets_nothing() {
        let t = topology(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let listener = t.renderers[0]
            .1
            .on_broadcast("tick", move |_: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(listener.remove());
        t.main.send_to_renderers("tick", 1u32).unwrap();
        tokio::time::sleep(BOUNDED_WAIT).await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_broadcast_with_one_refusing_peer() {
        let transport = ManualTransport::with_peers(vec![PeerId(1), PeerId(2), PeerId(3)]);
        transport.refuse(PeerId(2));
        let main = MainIpc::new(transport);

        assert_eq!(main.send_to_renderers("reload", json!({"hard": true})).unwrap(), 2);

        let sent = main.engine().transport().sent();
        assert_eq!(
            sent.iter().map(|s| s.to).collect::<Vec<_>>(),
            vec![PeerId(1), PeerId(3)]
        );
    }

    // =============================================================================
    // UNANSWERED CALLS
    // =============================================================================

    #[tokio::test]
    async fn test_call_without_handler_stays_pending() {
        let t = topology(1);
        let renderer = &t.renderers[0].1;

        let call = renderer.call_main::<_, Value>("nobody", ());
        tokio::pin!(call);
        assert!(timeout(BOUNDED_WAIT, &mut call).await.is_err());

        t.main
            .answer_renderer_sync("nobody", |_: (), _peer: PeerId| Ok("too late"))
            .unwrap();
        assert!(timeout(BOUNDED_WAIT, &mut call).await.is_err());
        assert_eq!(renderer.engine().pending_count(), 1);

        // Fresh calls are answered normally
        let answer: String = renderer.call_main("nobody", ()).await.unwrap();
        assert_eq!(answer, "too late");
    }

    #[tokio::test]
    async fn test_deregistered_handler_never_runs_again() {
        let t = topology(1);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = t
            .main
            .answer_renderer_sync("count", move |_: (), _peer: PeerId| {
                Ok(counter.fetch_add(1, Ordering::SeqCst))
            })
            .unwrap();

        let renderer = &t.renderers[0].1;
        let _: usize = renderer.call_main("count", ()).await.unwrap();

        assert!(handle.deregister());
        assert!(!handle.deregister());

        let late = timeout(BOUNDED_WAIT, renderer.call_main::<_, usize>("count", ())).await;
        assert!(late.is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}

//! Concurrency tests for the context module.

#[cfg(test)]
mod tests {
    use crate::context::ExecutionContext;
    use crate::core::EventType;
    use crate::events::CollectingEventSink;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_are_not_lost() {
        let ctx = Arc::new(ExecutionContext::new());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    for i in 0..100 {
                        ctx.add_object(format!("{worker}-{i}"), i);
                        ctx.create_event(format!("w{worker}"), EventType::CalledStage, i.to_string());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(ctx.objects().len(), 800);
        assert_eq!(ctx.event_log().len(), 800);
        assert_eq!(ctx.stage_events("w3").len(), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_worker_order_is_preserved() {
        let ctx = Arc::new(ExecutionContext::new());

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    for i in 0..50 {
                        ctx.create_event(format!("w{worker}"), EventType::CalledStage, i.to_string());
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        for worker in 0..4 {
            let details: Vec<usize> = ctx
                .stage_events(&format!("w{worker}"))
                .iter()
                .map(|e| e.details.parse().unwrap())
                .collect();
            assert_eq!(details, (0..50).collect::<Vec<_>>());
        }

        let ids: HashSet<_> = ctx.event_log().into_iter().map(|e| e.node_id).collect();
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sink_sees_events_in_log_order() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = Arc::new(ExecutionContext::new().with_event_sink(sink.clone()));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    for i in 0..100 {
                        ctx.create_event(format!("w{worker}"), EventType::CalledStage, i.to_string());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let key = |e: &crate::core::ExecutionEvent| (e.node_id.clone(), e.details.clone());
        let logged: Vec<_> = ctx.event_log().iter().map(key).collect();
        let emitted: Vec<_> = sink.events().iter().map(key).collect();
        assert_eq!(logged.len(), 800);
        assert_eq!(emitted, logged);
    }
}

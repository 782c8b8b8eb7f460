//! End-to-end scenarios with the buffered client
//!
//! A listener wired to a [`BufferedClient`] and an in-memory transport, driven
//! through request, command and worker lifecycles.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use crate::client::{MemoryLimiter, ProcessMemoryLimit};
    use crate::config::Configuration;
    use crate::context::{self, RequestContext};
    use crate::fault::Fault;
    use crate::listener::FaultListener;
    use crate::reporting::{BufferedClient, MemoryTransport};
    use crate::sanitization::FILTERED;
    use crate::signal::{CommandFault, FaultSignal, JobFailure, RequestFault};
    use crate::subscriptions::HostCapabilities;

    fn wire(config: Configuration) -> (Arc<FaultListener>, Arc<BufferedClient>, Arc<MemoryTransport>, Arc<ProcessMemoryLimit>) {
        let transport = Arc::new(MemoryTransport::new());
        let client = Arc::new(BufferedClient::new(config, transport.clone()));
        let limiter = Arc::new(ProcessMemoryLimit::new(134_217_728));
        let listener = Arc::new(FaultListener::new(client.clone(), limiter.clone(), &HostCapabilities::all()));
        (listener, client, transport, limiter)
    }

    #[test_log::test]
    fn test_request_lifecycle() {
        context::clear_request_scope();
        let (listener, client, transport, limiter) =
            wire(Configuration::default().memory_limit_increase(Some(67_108_864)));

        let request = RequestContext::new("POST", "https://shop.test/login")
            .route("app_login")
            .header("Authorization", "Basic YWRtaW46YWRtaW4=")
            .param("username", "ada")
            .param("password", "hunter2");

        listener
            .dispatch(FaultSignal::RequestReceived { request, is_primary: true })
            .unwrap();
        listener
            .dispatch(FaultSignal::RequestFaulted(RequestFault::Throwable {
                throwable: Fault::out_of_memory(
                    "Allowed memory size of 134217728 bytes exhausted (tried to allocate 20480 bytes)",
                ),
            }))
            .unwrap();

        // Request faults wait for the host's shutdown flush
        assert_eq!(client.queued(), 1);
        assert!(transport.batches().is_empty());
        assert_eq!(limiter.memory_limit(), Some(201_326_592));

        let reports = client.recent_reports();
        let report = &reports[0];
        assert_eq!(report.app_type.as_deref(), Some("HTTP"));

        let request = report.request.as_ref().unwrap();
        assert_eq!(request.route.as_deref(), Some("app_login"));
        assert_eq!(request.headers["Authorization"], FILTERED);
        assert_eq!(request.params["username"], "ada");
        assert_eq!(request.params["password"], FILTERED);

        context::clear_request_scope();
    }

    #[test]
    fn test_worker_lifecycle_flushes_each_unit() {
        context::clear_request_scope();
        let (listener, client, transport, _) = wire(Configuration::default());

        listener.dispatch(FaultSignal::JobHandled).unwrap();
        assert!(transport.batches().is_empty());

        listener
            .dispatch(FaultSignal::JobFailed(
                JobFailure::new(Fault::new("TransportException", "SMTP timeout"), true).job("SendEmail"),
            ))
            .unwrap();

        assert_eq!(client.queued(), 0);
        let delivered = transport.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].metadata_value("Messenger", "willRetry"), Some(&serde_json::json!(true)));
        assert_eq!(delivered[0].metadata_value("Messenger", "job"), Some(&serde_json::json!("SendEmail")));
        assert!(delivered[0].request.is_none());
        assert!(delivered[0].app_type.is_none());
    }

    #[test]
    fn test_job_on_reused_thread_drops_earlier_request() {
        context::clear_request_scope();
        let (listener, _, transport, _) = wire(Configuration::default());

        listener
            .dispatch(FaultSignal::RequestReceived {
                request: RequestContext::new("GET", "/old"),
                is_primary: true,
            })
            .unwrap();
        listener
            .dispatch(FaultSignal::JobFailed(JobFailure::new(Fault::new("RuntimeException", "job"), false)))
            .unwrap();

        let delivered = transport.delivered();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].request.is_none());
        assert!(delivered[0].app_type.is_none());
        assert!(context::current_request_context().is_none());
    }

    #[test]
    fn test_command_fault_is_delivered_on_next_flush() {
        context::clear_request_scope();
        let (listener, client, transport, _) = wire(Configuration::default());

        listener
            .dispatch(FaultSignal::CommandFaulted(CommandFault::Error {
                error: Fault::new("InvalidArgumentException", "unknown option --force"),
                exit_code: 1,
                command: Some("migrate".to_string()),
            }))
            .unwrap();
        assert_eq!(client.queued(), 1);

        listener.dispatch(FaultSignal::JobHandled).unwrap();
        assert_eq!(transport.delivered()[0].metadata_value("command", "name"), Some(&serde_json::json!("migrate")));
    }

    #[test]
    fn test_concurrent_workers_keep_their_own_request() {
        let (listener, client, _, _) = wire(Configuration::default());

        let handles: Vec<_> = ["/alpha", "/beta", "/gamma"]
            .iter()
            .map(|path| {
                let listener = Arc::clone(&listener);
                let path = path.to_string();
                thread::spawn(move || {
                    listener
                        .dispatch(FaultSignal::RequestReceived {
                            request: RequestContext::new("GET", path.clone()),
                            is_primary: true,
                        })
                        .unwrap();
                    listener
                        .dispatch(FaultSignal::RequestFaulted(RequestFault::Exception {
                            exception: Fault::new("RuntimeException", path),
                        }))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reports = client.recent_reports();
        assert_eq!(reports.len(), 3);
        for report in reports {
            assert_eq!(report.request.unwrap().url, report.error.message);
        }
    }

    #[test]
    fn test_disabled_notify_delivers_nothing() {
        context::clear_request_scope();
        let (listener, client, transport, _) = wire(Configuration::default().without_notify());

        listener
            .dispatch(FaultSignal::JobFailed(JobFailure::new(Fault::new("RuntimeException", "x"), false)))
            .unwrap();

        assert!(client.recent_reports().is_empty());
        assert!(transport.batches().is_empty());
    }
}

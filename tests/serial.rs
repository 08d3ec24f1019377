//! Serial client behavior: FIFO ordering, deadlines, retry across
//! connection loss, and close semantics.

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::time::Instant;

use common::{ChannelQueue, EchoConnector, FailingConnector, QueueConnector, run_paused};
use ratline::{Channel, RequestError, SerialClient, SupervisorConfig};

#[test]
fn echoes_in_submission_order() {
    run_paused(async {
        let client = SerialClient::new(EchoConnector::new(0), SupervisorConfig::named("echo"));

        let a = client.request("a".to_string(), None);
        let b = client.request("b".to_string(), None);
        let c = client.request("c".to_string(), None);

        assert_eq!(a.await, Ok("a".to_string()));
        assert_eq!(b.await, Ok("b".to_string()));
        assert_eq!(c.await, Ok("c".to_string()));
    });
}

#[test]
fn completions_follow_submission_order() {
    run_paused(async {
        let client = SerialClient::new(EchoConnector::new(0), SupervisorConfig::named("fifo"));
        let order: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

        let mut watchers = Vec::new();
        for i in 0..5 {
            let future = client.request(format!("m{i}"), None);
            let order = Rc::clone(&order);
            watchers.push(tokio::task::spawn_local(async move {
                let reply = future.await.expect("reply");
                order.borrow_mut().push(reply);
            }));
        }
        for watcher in watchers {
            watcher.await.expect("watcher");
        }

        assert_eq!(*order.borrow(), ["m0", "m1", "m2", "m3", "m4"]);
    });
}

#[test]
fn timeout_fires_during_outage() {
    run_paused(async {
        let client = SerialClient::new(FailingConnector, SupervisorConfig::named("outage"));

        let start = Instant::now();
        let reply = client
            .request("y".to_string(), Some(Duration::from_millis(200)))
            .await;
        let elapsed = start.elapsed();

        assert_eq!(reply, Err(RequestError::Timeout));
        assert!(
            elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(300),
            "deadline fired at {elapsed:?}"
        );
    });
}

#[test]
fn timeout_fires_against_a_silent_server() {
    run_paused(async {
        let queue = ChannelQueue::new();
        queue.push_pair(|server| async move {
            // Accept requests, never reply.
            while server.recv().await.is_some() {}
        });
        let client = SerialClient::new(QueueConnector(queue), SupervisorConfig::named("silent"));

        let start = Instant::now();
        let reply = client
            .request("quiet".to_string(), Some(Duration::from_millis(200)))
            .await;

        assert_eq!(reply, Err(RequestError::Timeout));
        assert!(start.elapsed() < Duration::from_millis(300));
    });
}

#[test]
fn retries_across_mid_flight_loss() {
    run_paused(async {
        let queue = ChannelQueue::new();
        // First connection swallows the request and dies without replying.
        queue.push_pair(|server| async move {
            assert_eq!(server.recv().await, Some("p".to_string()));
            server.close();
        });
        // Second connection answers uppercased.
        queue.push_pair(|server| async move {
            while let Some(msg) = server.recv().await {
                if server.send(msg.to_uppercase()).await.is_err() {
                    break;
                }
            }
        });
        let client = SerialClient::new(QueueConnector(queue), SupervisorConfig::named("flappy"));

        let reply = client.request("p".to_string(), None).await;
        assert_eq!(reply, Ok("P".to_string()));
    });
}

#[test]
fn request_survives_repeated_connect_failures() {
    run_paused(async {
        let connector = EchoConnector::new(5);
        let client = SerialClient::new(connector, SupervisorConfig::named("stubborn"));

        let start = Instant::now();
        let reply = client.request("x".to_string(), None).await;
        let elapsed = start.elapsed();

        assert_eq!(reply, Ok("x".to_string()));
        // Five failures cost 500 + 1000 + 2000 + 4000 + 8000 ms of backoff.
        assert!(
            elapsed >= Duration::from_millis(15_500) && elapsed < Duration::from_millis(15_700),
            "recovered at {elapsed:?}"
        );
    });
}

#[test]
fn transport_error_reply_reaches_the_error_side() {
    run_paused(async {
        let queue: ChannelQueue<Result<String, String>> = ChannelQueue::new();
        queue.push_pair(|server| async move {
            while server.recv().await.is_some() {
                if server.send(Err("boom".to_string())).await.is_err() {
                    break;
                }
            }
        });
        let client = SerialClient::new(QueueConnector(queue), SupervisorConfig::named("faulty"));

        let reply = client.request(Ok("hi".to_string()), None).await;
        assert_eq!(
            reply,
            Err(RequestError::Transport(Err("boom".to_string())))
        );
    });
}

#[test]
fn close_is_idempotent_and_rejects_later_submissions() {
    run_paused(async {
        let client = SerialClient::new(EchoConnector::new(0), SupervisorConfig::named("closing"));

        assert_eq!(
            client.request("a".to_string(), None).await,
            Ok("a".to_string())
        );

        client.close();
        client.close();

        assert_eq!(
            client.request("b".to_string(), None).await,
            Err(RequestError::Deactivated)
        );
    });
}

#[test]
fn requests_accepted_before_close_still_complete() {
    run_paused(async {
        let client = SerialClient::new(EchoConnector::new(0), SupervisorConfig::named("draining"));

        let accepted = client.request("last".to_string(), None);
        client.close();
        let rejected = client.request("late".to_string(), None);

        assert_eq!(accepted.await, Ok("last".to_string()));
        assert_eq!(rejected.await, Err(RequestError::Deactivated));
    });
}

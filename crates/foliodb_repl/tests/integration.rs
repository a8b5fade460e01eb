//! Integration tests driving the change negotiation through its mailbox.

use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use foliodb_protocol::{ChangesRequest, ChangesResponse, Profile};
use foliodb_repl::{
    ChangeSequence, LocalRevision, MemoryAncestryOracle, MessageBus, PullConfig, ReplError,
    RevFinder, RevFinderDelegate, WorkerMailbox,
};
use parking_lot::Mutex;
use serde_json::json;

/// A combined delegate + bus recording events in one ordered journal, so
/// tests can assert cross-seam ordering.
#[derive(Debug, Clone, PartialEq)]
enum Event {
    CaughtUp,
    ExpectSequences(Vec<ChangeSequence>),
    Responded(u64),
    Ack(u64),
    Error(u64, u16),
    Failed(String),
}

#[derive(Default)]
struct Endpoint {
    events: Mutex<Vec<Event>>,
}

impl Endpoint {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl RevFinderDelegate for Endpoint {
    fn caught_up(&self) {
        self.events.lock().push(Event::CaughtUp);
    }

    fn expect_sequences(&self, sequences: Vec<ChangeSequence>) {
        self.events.lock().push(Event::ExpectSequences(sequences));
    }

    fn remote_ancestor_changed(&self, _doc_id: &str, _rev_id: &str) {}

    fn replication_failed(&self, error: &ReplError) {
        self.events.lock().push(Event::Failed(error.to_string()));
    }
}

impl MessageBus for Endpoint {
    fn respond(&self, number: u64, _response: ChangesResponse) {
        self.events.lock().push(Event::Responded(number));
    }

    fn respond_ack(&self, number: u64) {
        self.events.lock().push(Event::Ack(number));
    }

    fn respond_error(&self, number: u64, code: u16, _message: &str) {
        self.events.lock().push(Event::Error(number, code));
    }
}

type Finder = RevFinder<Arc<MemoryAncestryOracle>, Arc<Endpoint>, Arc<Endpoint>>;

fn spawn_finder(config: PullConfig) -> (WorkerMailbox<Finder>, Arc<MemoryAncestryOracle>, Arc<Endpoint>) {
    let oracle = Arc::new(MemoryAncestryOracle::new());
    let endpoint = Arc::new(Endpoint::default());
    let finder = RevFinder::new(
        config,
        Arc::clone(&oracle),
        Arc::clone(&endpoint),
        Arc::clone(&endpoint),
    );
    (WorkerMailbox::spawn(finder), oracle, endpoint)
}

/// Blocks until every previously posted unit of work has run.
fn drain(mailbox: &WorkerMailbox<Finder>) {
    let (tx, rx) = channel();
    mailbox.post(move |_| tx.send(()).unwrap());
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
}

fn changes(number: u64, body: serde_json::Value) -> ChangesRequest {
    ChangesRequest::new(Profile::Changes, number, body)
}

#[test]
fn demand_is_registered_before_the_response_is_sent() {
    let (mailbox, _oracle, endpoint) = spawn_finder(PullConfig::new());

    let request = changes(1, json!([[10, "docA", "1-a"]]));
    mailbox.post(move |finder| finder.handle_changes(request));
    drain(&mailbox);

    let events = endpoint.events();
    assert_eq!(events.len(), 2);
    let Event::ExpectSequences(sequences) = &events[0] else {
        panic!("expected demand registration first, got {events:?}");
    };
    assert_eq!(sequences.len(), 1);
    assert!(sequences[0].is_requested());
    assert_eq!(events[1], Event::Responded(1));
}

#[test]
fn second_message_waits_for_the_first_batch_of_revs() {
    let (mailbox, _oracle, endpoint) = spawn_finder(PullConfig::new().with_max_revs_in_flight(1));

    // Two messages race in from the transport; each requests one unknown
    // rev, and capacity is one.
    let first = changes(1, json!([[1, "docA", "1-a"]]));
    let second = changes(2, json!([[2, "docB", "1-b"]]));
    mailbox.post(move |finder| finder.handle_changes(first));
    mailbox.post(move |finder| finder.handle_changes(second));
    drain(&mailbox);

    let responded = endpoint
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Responded(_)))
        .count();
    assert_eq!(responded, 1, "second message must wait for capacity");

    // The peer delivers the requested rev; the queued message drains.
    mailbox.post(|finder| finder.rev_received());
    drain(&mailbox);

    let events = endpoint.events();
    let responded: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            Event::Responded(n) => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(responded, vec![1, 2]);
}

#[test]
fn side_effects_of_earlier_messages_come_first() {
    let (mailbox, oracle, endpoint) = spawn_finder(PullConfig::new());
    oracle.insert("docA", LocalRevision::new("1-a"));

    let producers: Vec<_> = (0..4u64)
        .map(|p| {
            let handle = mailbox.handle();
            thread::spawn(move || {
                for i in 0..25u64 {
                    let number = p * 100 + i;
                    let request = changes(number, json!([[number, "docA", "1-a"]]));
                    handle.post(move |finder| finder.handle_changes(request));
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }
    drain(&mailbox);

    let events = endpoint.events();
    // Every message produced exactly one demand registration immediately
    // followed by its response.
    assert_eq!(events.len(), 200);
    for pair in events.chunks(2) {
        let Event::ExpectSequences(_) = &pair[0] else {
            panic!("expected demand registration, got {pair:?}");
        };
        let Event::Responded(_) = &pair[1] else {
            panic!("expected response, got {pair:?}");
        };
    }
}

#[test]
fn caught_up_flows_through_the_mailbox() {
    let (mailbox, _oracle, endpoint) = spawn_finder(PullConfig::new());
    let request = changes(9, json!([]));
    mailbox.post(move |finder| finder.handle_changes(request));
    drain(&mailbox);
    assert_eq!(endpoint.events(), vec![Event::CaughtUp, Event::Ack(9)]);
}

#[test]
fn shutdown_drops_queued_messages_silently() {
    let (mailbox, _oracle, endpoint) = spawn_finder(PullConfig::new());
    let (started_tx, started_rx) = channel();
    let (release_tx, release_rx) = channel::<()>();

    mailbox.post(move |_| {
        started_tx.send(()).unwrap();
        let _ = release_rx.recv_timeout(Duration::from_secs(5));
    });
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let request = changes(1, json!([[1, "docA", "1-a"]]));
    mailbox.post(move |finder| finder.handle_changes(request));

    let unblocker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let _ = release_tx.send(());
    });
    mailbox.shutdown();
    unblocker.join().unwrap();

    // The queued message was dropped: no partial response, no demand.
    assert!(endpoint.events().is_empty());
}

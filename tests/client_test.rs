//! Collaboration clients talking through a real relay.

mod common;

use common::{start_test_server, Peer};
use notes_relay::client::{ClientConfig, ClientEvent, CollabClient, MemoryStore, NoteBook};
use notes_relay::models::{EditField, Note};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::broadcast;

const TEST_DEBOUNCE: Duration = Duration::from_millis(50);

fn client(addr: SocketAddr, note_ids: &[&str]) -> CollabClient {
    let notes = note_ids.iter().map(|id| Note::with_id(*id)).collect();
    let book = NoteBook::open(MemoryStore::with_notes(notes)).unwrap();
    let config = ClientConfig::new(format!("ws://{}/ws", addr)).with_debounce(TEST_DEBOUNCE);
    CollabClient::new(config, book)
}

async fn wait_presence(client: &CollabClient, count: usize) {
    let mut presence = client.presence();
    tokio::time::timeout(Duration::from_secs(2), presence.wait_for(|c| *c == count))
        .await
        .expect("Timed out waiting for presence")
        .expect("Presence channel closed");
}

async fn wait_remote_edit(events: &mut broadcast::Receiver<ClientEvent>, field: EditField) {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(ClientEvent::RemoteEdit { field: f, .. }) if f == field => return,
                Ok(_) => continue,
                Err(e) => panic!("Event stream ended: {e}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .expect("Timed out waiting for remote edit");
}

fn note(client: &CollabClient, id: &str) -> Note {
    let book = client.book();
    let book = book.lock().unwrap();
    book.get(id).cloned().unwrap()
}

#[tokio::test]
async fn test_remote_edit_reaches_sibling_client() {
    let addr = start_test_server().await;
    let mut a = client(addr, &["42"]);
    let mut b = client(addr, &["42"]);
    let mut b_events = b.subscribe();

    a.select_note("42").await.unwrap();
    wait_presence(&a, 1).await;
    b.select_note("42").await.unwrap();
    wait_presence(&a, 2).await;
    wait_presence(&b, 2).await;

    let before = note(&b, "42").updated_at;
    assert!(a.local_edit("42", EditField::Content, "hello"));
    wait_remote_edit(&mut b_events, EditField::Content).await;

    let remote = note(&b, "42");
    assert_eq!(remote.content, "hello");
    assert!(remote.updated_at >= before);

    b.close();
    wait_presence(&a, 1).await;
}

#[tokio::test]
async fn test_rapid_typing_sends_one_pair() {
    let addr = start_test_server().await;
    let mut writer = client(addr, &["n"]);
    writer.select_note("n").await.unwrap();
    wait_presence(&writer, 1).await;

    let mut observer = Peer::connect(addr, "n").await;
    observer.expect_presence(2).await;

    for word in ["h", "he", "hel", "hell", "hello"] {
        writer.local_edit("n", EditField::Content, word);
    }
    writer.local_edit("n", EditField::Title, "Greeting");

    assert_eq!(
        observer.next_json().await,
        serde_json::json!({ "type": "title", "content": "Greeting" })
    );
    assert_eq!(
        observer.next_json().await,
        serde_json::json!({ "type": "content", "content": "hello" })
    );
    observer.expect_silence().await;
}

#[tokio::test]
async fn test_reselecting_moves_the_connection() {
    let addr = start_test_server().await;
    let mut roaming = client(addr, &["1", "2"]);
    let mut watcher = Peer::connect(addr, "1").await;
    watcher.expect_presence(1).await;

    roaming.select_note("1").await.unwrap();
    watcher.expect_presence(2).await;

    roaming.select_note("2").await.unwrap();
    watcher.expect_presence(1).await;
    assert_eq!(roaming.connected_note(), Some("2"));

    // Edits to note 2 no longer reach note 1's session
    roaming.local_edit("2", EditField::Title, "elsewhere");
    watcher.expect_silence().await;
}

#[tokio::test]
async fn test_peer_edits_apply_to_client_note() {
    let addr = start_test_server().await;
    let mut c = client(addr, &["42"]);
    let mut events = c.subscribe();
    c.select_note("42").await.unwrap();
    wait_presence(&c, 1).await;

    let mut peer = Peer::connect(addr, "42").await;
    peer.expect_presence(2).await;
    peer.send_edit("title", "From the web").await;
    wait_remote_edit(&mut events, EditField::Title).await;
    assert_eq!(note(&c, "42").title, "From the web");

    c.deselect();
    peer.expect_presence(1).await;
    assert_eq!(*c.presence().borrow(), 0);
}

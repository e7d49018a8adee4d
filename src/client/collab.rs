use std::sync::{Arc, Mutex, MutexGuard};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::models::{EditField, ReceivedMessage, SendMessage};
use super::debounce::Debouncer;
use super::notebook::NoteBook;
use super::store::NoteStore;
use super::{ClientConfig, ClientError, ClientEvent};

/// Keeps the open note in sync with every other peer editing it.
///
/// Local edits hit the note book first and are relayed after the debounce
/// delay. One relay connection at most, scoped to the selected note.
pub struct CollabClient {
    config: ClientConfig,
    book: Arc<Mutex<NoteBook>>,
    presence: Arc<watch::Sender<usize>>,
    events: broadcast::Sender<ClientEvent>,
    session: Option<RelaySession>,
}

struct RelaySession {
    note_id: String,
    outbound: mpsc::UnboundedSender<Message>,
    debouncer: Debouncer,
    reader: Option<JoinHandle<()>>,
}

impl CollabClient {
    pub fn new(config: ClientConfig, book: NoteBook) -> Self {
        let (presence, _) = watch::channel(0);
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            book: Arc::new(Mutex::new(book)),
            presence: Arc::new(presence),
            events,
            session: None,
        }
    }

    /// Load the note book from `store` and build a client around it.
    pub fn open(config: ClientConfig, store: impl NoteStore + 'static) -> Result<Self, ClientError> {
        Ok(Self::new(config, NoteBook::open(store)?))
    }

    pub fn book(&self) -> Arc<Mutex<NoteBook>> {
        self.book.clone()
    }

    /// Collaborator count of the open note, 0 while disconnected.
    pub fn presence(&self) -> watch::Receiver<usize> {
        self.presence.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn connected_note(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.note_id.as_str())
    }

    /// Select a note and join its relay session.
    ///
    /// The previous connection is closed first. If the relay cannot be
    /// reached the note stays selected and editable; the error is returned
    /// for display and no retry happens.
    pub async fn select_note(&mut self, note_id: &str) -> Result<(), ClientError> {
        self.close();
        if lock(&self.book).select(note_id).is_none() {
            return Err(ClientError::UnknownNote(note_id.to_string()));
        }

        let url = self.config.session_url(note_id);
        let (stream, _) = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok(connected) => connected,
            Err(e) => {
                error!("Relay connection to {} failed: {}", url, e);
                return Err(ClientError::Connect(e));
            }
        };
        info!("Connected to relay for note {:?}", note_id);

        let (sink, stream) = stream.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        // The writer exits by itself once the outbound queue closes
        tokio::spawn(write_frames(sink, outbound_rx));
        let reader = tokio::spawn(read_frames(
            stream,
            note_id.to_string(),
            self.book.clone(),
            self.presence.clone(),
            self.events.clone(),
        ));
        self.install_session(note_id.to_string(), outbound, Some(reader));
        Ok(())
    }

    fn install_session(&mut self, note_id: String, outbound: mpsc::UnboundedSender<Message>, reader: Option<JoinHandle<()>>) {
        self.session = Some(RelaySession {
            note_id,
            outbound,
            debouncer: Debouncer::new(self.config.debounce),
            reader,
        });
    }

    /// Apply an editor change at once and schedule its relay.
    ///
    /// Returns `false` if the note is unknown. Edits to a note other than the
    /// connected one are saved locally only.
    pub fn local_edit(&mut self, note_id: &str, field: EditField, value: &str) -> bool {
        if lock(&self.book).apply(note_id, field, value).is_none() {
            return false;
        }

        if let Some(session) = self.session.as_mut().filter(|s| s.note_id == note_id) {
            let flush = flush_note(self.book.clone(), session.note_id.clone(), session.outbound.clone());
            session.debouncer.schedule(async move {
                flush();
            });
        }
        true
    }

    /// Leave the relay session. Safe to call when nothing is open.
    ///
    /// A pending debounced edit is sent before the connection closes.
    pub fn close(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };

        if session.debouncer.cancel() {
            flush_note(self.book.clone(), session.note_id.clone(), session.outbound.clone())();
        }
        let _ = session.outbound.send(Message::Close(None));
        drop(session.outbound);

        if let Some(reader) = session.reader.take() {
            reader.abort();
        }
        self.presence.send_replace(0);
        info!("Left relay session for note {:?}", session.note_id);
        true
    }

    /// Close the relay and clear the selection.
    pub fn deselect(&mut self) {
        self.close();
        lock(&self.book).deselect();
    }
}

impl Drop for CollabClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock(book: &Mutex<NoteBook>) -> MutexGuard<'_, NoteBook> {
    book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sends the note's current title and content, in that order.
fn flush_note(
    book: Arc<Mutex<NoteBook>>,
    note_id: String,
    outbound: mpsc::UnboundedSender<Message>,
) -> impl FnOnce() + Send + 'static {
    move || {
        let frames = {
            let book = lock(&book);
            let Some(note) = book.get(&note_id) else {
                debug!("Note {:?} disappeared before its edit was sent", note_id);
                return;
            };
            [EditField::Title, EditField::Content].map(|field| ReceivedMessage::edit(field, note.get(field)).to_text())
        };
        for frame in frames {
            if outbound.send(Message::text(frame)).is_err() {
                warn!("Relay connection for note {:?} is gone, edit kept locally", note_id);
                return;
            }
        }
        debug!("Sent title and content for note {:?}", note_id);
    }
}

async fn write_frames<S>(mut sink: S, mut outbound: mpsc::UnboundedReceiver<Message>)
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(msg) = outbound.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = sink.send(msg).await {
            warn!("Relay send failed: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_frames<S>(
    mut stream: S,
    note_id: String,
    book: Arc<Mutex<NoteBook>>,
    presence: Arc<watch::Sender<usize>>,
    events: broadcast::Sender<ClientEvent>,
) where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_inbound(text.as_str(), &note_id, &book, &presence, &events),
            Ok(Message::Close(frame)) => {
                debug!("Relay closed the connection: {:?}", frame);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Relay connection error for note {:?}: {}", note_id, e);
                break;
            }
        }
    }
    presence.send_replace(0);
    let _ = events.send(ClientEvent::Disconnected { note_id });
}

fn handle_inbound(
    text: &str,
    note_id: &str,
    book: &Mutex<NoteBook>,
    presence: &watch::Sender<usize>,
    events: &broadcast::Sender<ClientEvent>,
) {
    let msg = match SendMessage::parse(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Ignoring malformed relay frame for note {:?}: {}", note_id, e);
            return;
        }
    };

    let (field, edit) = match msg {
        SendMessage::Collaborators(c) => {
            presence.send_replace(c.count);
            let _ = events.send(ClientEvent::Presence { note_id: note_id.to_string(), count: c.count });
            return;
        }
        SendMessage::Title(edit) => (EditField::Title, edit),
        SendMessage::Content(edit) => (EditField::Content, edit),
    };

    if lock(book).apply(note_id, field, &edit.content).is_some() {
        let _ = events.send(ClientEvent::RemoteEdit { note_id: note_id.to_string(), field });
    }
}

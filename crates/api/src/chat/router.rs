use std::fmt::Display;
use std::sync::Arc;

use bazaar_core::error::CoreError;
use bazaar_core::protocol::{
    event_names, peek_event_name, ClientEvent, CreateRoomPayload, ErrorAck, LoginNotice,
    NewMessagePayload, PresenceNotice, SeenMessagesNotice, SeenMessagesPayload,
    SetUsernamesPayload, TypingPayload,
};
use bazaar_core::room::derive_room_id;
use bazaar_core::types::ConnectionId;
use bazaar_db::models::{Message, NewRoom, Room};
use bazaar_db::{ChatStore, MessageStore, PersistOutcome, RoomStore};
use bazaar_events::bus::system_events;
use bazaar_events::{
    Backplane, Envelope, EventBus, FrameReceiver, OutboundEvent, SystemEvent, Topic, TopicHub,
};
use bazaar_presence::{PresenceCounter, PresenceDirectory};
use serde::Serialize;
use serde_json::json;

use super::session::{ChatSession, SessionState};

/// Orchestrates inbound chat events.
///
/// One instance is shared by every connection task. Handlers run inline in
/// the calling connection's task, so events from one connection are handled
/// in arrival order and a handler that is running when its client goes away
/// still completes. No lock is held across an await.
///
/// Outbound delivery goes through personal topics: every identified handle
/// of a user is subscribed to `Topic::User(user_id)`, and every connection to
/// `Topic::All`. Events are broadcast first and persisted afterwards; a
/// storage failure is reported, not rolled back.
pub struct EventRouter {
    backplane: Arc<dyn Backplane>,
    presence: Arc<dyn PresenceDirectory>,
    store: Arc<dyn ChatStore>,
    rooms: RoomStore,
    messages: MessageStore,
    counter: Arc<PresenceCounter>,
    event_bus: Arc<EventBus>,
}

impl EventRouter {
    pub fn new(
        backplane: Arc<dyn Backplane>,
        presence: Arc<dyn PresenceDirectory>,
        store: Arc<dyn ChatStore>,
        counter: Arc<PresenceCounter>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            rooms: RoomStore::new(Arc::clone(&store)),
            messages: MessageStore::new(Arc::clone(&store)),
            backplane,
            presence,
            store,
            counter,
            event_bus,
        }
    }

    pub fn hub(&self) -> &Arc<TopicHub> {
        self.backplane.hub()
    }

    pub fn presence(&self) -> &Arc<dyn PresenceDirectory> {
        &self.presence
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    pub fn counter(&self) -> &PresenceCounter {
        &self.counter
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Attach a new connection to the hub and subscribe it to the broadcast
    /// topic. The session starts unidentified.
    pub async fn connect(&self) -> (ChatSession, FrameReceiver) {
        let conn_id = ConnectionId::new();
        let hub = self.hub();
        let rx = hub.attach(conn_id).await;
        hub.subscribe(conn_id, Topic::All).await;
        tracing::info!(conn_id = %conn_id, "Chat connection opened");
        (ChatSession::new(conn_id), rx)
    }

    /// Tear a connection down. Runs at most once per session.
    ///
    /// Detaches the handle from every topic, unregisters it from the
    /// presence directory and, if it was the user's last handle, broadcasts
    /// `user left`. If the directory cannot say whether it was the last
    /// handle, `user left` is still broadcast and the counter is left alone.
    pub async fn disconnect(&self, session: &mut ChatSession) {
        let conn_id = session.connection_id();
        let Some(previous) = session.close() else {
            return;
        };
        self.hub().detach(conn_id).await;

        let SessionState::Identified(identity) = previous else {
            tracing::info!(conn_id = %conn_id, "Unidentified chat connection closed");
            return;
        };
        let user_id = identity.user_id;

        let num_users = match self.presence.unregister(&user_id, conn_id).await {
            Ok(transition) => {
                tracing::info!(
                    conn_id = %conn_id,
                    user_id = %user_id,
                    role = ?identity.role,
                    joined_at = %identity.joined_at,
                    remaining_handles = transition.handles,
                    "Chat connection closed"
                );
                if !transition.became_absent() {
                    return;
                }
                self.event_bus.publish(
                    SystemEvent::new(system_events::USER_ABSENT)
                        .with_connection(conn_id)
                        .with_user(user_id.clone()),
                );
                self.counter.decrement()
            }
            Err(e) => {
                self.report_failure(
                    system_events::DIRECTORY_FAILED,
                    Some(conn_id),
                    Some(&user_id),
                    &e,
                    json!({"operation": "unregister"}),
                );
                self.counter.current()
            }
        };

        self.announce(conn_id, &user_id, event_names::USER_LEFT, num_users, false)
            .await;
    }

    /// Refresh the shared presence entries of every identified handle this
    /// process holds. Called on each heartbeat tick.
    pub async fn refresh_presence(&self) {
        for (user_id, handles) in self.hub().user_handles().await {
            if let Err(e) = self.presence.refresh(&user_id, &handles).await {
                self.report_failure(
                    system_events::DIRECTORY_FAILED,
                    None,
                    Some(&user_id),
                    &e,
                    json!({"operation": "refresh", "handles": handles.len()}),
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Inbound events
    // -----------------------------------------------------------------------

    /// Parse one text frame and dispatch it. Rejected frames produce an
    /// `error` acknowledgement to this connection only.
    pub async fn handle_text(&self, session: &mut ChatSession, text: &str) {
        match ClientEvent::parse(text) {
            Ok(event) => self.handle(session, event).await,
            Err(e) => {
                let event = peek_event_name(text);
                tracing::debug!(
                    conn_id = %session.connection_id(),
                    event = ?event,
                    error = %e,
                    "Rejected inbound frame"
                );
                self.send_error(session, &e, event).await;
            }
        }
    }

    /// Dispatch a parsed event.
    pub async fn handle(&self, session: &mut ChatSession, event: ClientEvent) {
        let name = event.name();
        let result = match event {
            ClientEvent::SetUsernames(p) => self.on_set_usernames(session, p).await,
            ClientEvent::CreateRoom(p) => self.on_create_room(session, p).await,
            ClientEvent::NewMessage(p) => self.on_new_message(session, p).await,
            ClientEvent::Typing(p) => self.on_typing(session, event_names::TYPING, p).await,
            ClientEvent::StopTyping(p) => {
                self.on_typing(session, event_names::STOP_TYPING, p).await
            }
            ClientEvent::SeenMessages(p) => self.on_seen_messages(session, p).await,
        };

        if let Err(e) = result {
            tracing::debug!(
                conn_id = %session.connection_id(),
                event = name,
                code = e.code(),
                error = %e,
                "Event rejected"
            );
            self.send_error(session, &e, Some(name.to_string())).await;
        }
    }

    async fn on_set_usernames(
        &self,
        session: &mut ChatSession,
        payload: SetUsernamesPayload,
    ) -> Result<(), CoreError> {
        let conn_id = session.connection_id();
        let user_id = payload.from;

        if !session.identify(&user_id, payload.role)? {
            tracing::debug!(conn_id = %conn_id, user_id = %user_id, "Connection re-identified");
            return self.send_login(conn_id).await;
        }

        self.hub().subscribe(conn_id, Topic::user(&user_id)).await;

        let joined = match self.presence.register(&user_id, conn_id).await {
            Ok(transition) => {
                tracing::info!(
                    conn_id = %conn_id,
                    user_id = %user_id,
                    handles = transition.handles,
                    "User identified"
                );
                transition.became_present().then(|| {
                    self.event_bus.publish(
                        SystemEvent::new(system_events::USER_PRESENT)
                            .with_connection(conn_id)
                            .with_user(user_id.clone()),
                    );
                    self.counter.increment()
                })
            }
            Err(e) => {
                // Delivery still works through the personal topic; only the
                // presence bookkeeping is skipped.
                self.report_failure(
                    system_events::DIRECTORY_FAILED,
                    Some(conn_id),
                    Some(&user_id),
                    &e,
                    json!({"operation": "register"}),
                );
                Some(self.counter.current())
            }
        };

        self.send_login(conn_id).await?;
        if let Some(num_users) = joined {
            self.announce(conn_id, &user_id, event_names::USER_JOINED, num_users, true)
                .await;
        }
        Ok(())
    }

    async fn on_create_room(
        &self,
        session: &ChatSession,
        payload: CreateRoomPayload,
    ) -> Result<(), CoreError> {
        let conn_id = session.connection_id();
        session.authorize_sender(&payload.creator)?;

        let creator = payload.creator.clone();
        let candidate = NewRoom::from(payload);
        let room = match self.rooms.ensure_room(&candidate).await {
            Ok(room) => room,
            Err(e) => {
                self.report_failure(
                    system_events::STORAGE_FAILED,
                    Some(conn_id),
                    Some(&creator),
                    &e,
                    json!({"operation": "ensure_room", "room_id": &candidate.id}),
                );
                // Not durable: the creator sees the room it asked for, but a
                // later create_room may return a different created_at.
                Room::from_new(&candidate, chrono::Utc::now())
            }
        };

        let event = self.outbound(event_names::CREATE_ROOM, &room)?;
        self.publish(conn_id, Some(&creator), Envelope::new(Topic::user(&creator), event))
            .await
    }

    async fn on_new_message(
        &self,
        session: &ChatSession,
        payload: NewMessagePayload,
    ) -> Result<(), CoreError> {
        let conn_id = session.connection_id();
        session.authorize_sender(&payload.from)?;

        let message = Message::from_payload(payload, chrono::Utc::now());
        let event = self.outbound(event_names::NEW_MESSAGE, &message)?;

        // Publish to both topics even if one fails: once either side has
        // seen the message it must be stored.
        let mut delivered = 0;
        let mut failure = None;
        for participant in [&message.sender_id, &message.receiver_id] {
            let envelope = Envelope::new(Topic::user(participant), event.clone());
            match self.publish(conn_id, Some(&message.sender_id), envelope).await {
                Ok(()) => delivered += 1,
                Err(e) => failure = Some(e),
            }
        }
        if delivered == 0 {
            return failure.map_or(Ok(()), Err);
        }

        match self.messages.persist_new_message(&message).await {
            Ok(PersistOutcome::Recorded) => {
                tracing::debug!(message_id = %message.id, room_id = %message.room_id, "Message persisted");
            }
            Ok(PersistOutcome::RoomMissing) => {}
            Err(e) => self.report_failure(
                system_events::STORAGE_FAILED,
                Some(conn_id),
                Some(&message.sender_id),
                &e,
                json!({
                    "operation": "persist_new_message",
                    "message_id": &message.id,
                    "room_id": &message.room_id,
                }),
            ),
        }
        failure.map_or(Ok(()), Err)
    }

    async fn on_typing(
        &self,
        session: &ChatSession,
        name: &'static str,
        payload: TypingPayload,
    ) -> Result<(), CoreError> {
        let conn_id = session.connection_id();
        session.authorize_sender(&payload.from)?;

        let event = self.outbound(name, &payload)?;
        for participant in [&payload.from, &payload.to] {
            let envelope = Envelope::new(Topic::user(participant), event.clone());
            self.publish(conn_id, Some(&payload.from), envelope).await?;
        }
        Ok(())
    }

    async fn on_seen_messages(
        &self,
        session: &ChatSession,
        payload: SeenMessagesPayload,
    ) -> Result<(), CoreError> {
        let conn_id = session.connection_id();
        session.authorize_sender(&payload.from)?;

        let notice = SeenMessagesNotice {
            room_id: derive_room_id(&payload.from, &payload.to),
            from: payload.from,
            to: payload.to,
            message_ids: payload.message_ids,
        };
        let event = self.outbound(event_names::SEEN_MESSAGES, &notice)?;
        self.publish(conn_id, Some(&notice.from), Envelope::new(Topic::user(&notice.to), event))
            .await?;

        if let Err(e) = self.acknowledge_seen(&notice).await {
            self.report_failure(
                system_events::STORAGE_FAILED,
                Some(conn_id),
                Some(&notice.from),
                &e,
                json!({"operation": "acknowledge_seen", "room_id": &notice.room_id}),
            );
        }
        Ok(())
    }

    /// Flip the acknowledged messages (those addressed to the acknowledging
    /// user) and reset that user's side of the room counter once.
    async fn acknowledge_seen(
        &self,
        notice: &SeenMessagesNotice,
    ) -> Result<(), bazaar_db::StoreError> {
        let flipped = self
            .rooms
            .apply_seen_acknowledgement(&notice.room_id, &notice.from, &notice.message_ids)
            .await?;

        let Some(room) = self.rooms.find_room(&notice.room_id).await? else {
            tracing::warn!(room_id = %notice.room_id, flipped, "Seen acknowledgement for unknown room");
            return Ok(());
        };
        if let Some(side) = room.side_of(&notice.from) {
            self.rooms.reset_unseen(&room.id, side).await?;
        }
        tracing::debug!(room_id = %room.id, flipped, "Messages marked seen");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Outbound helpers
    // -----------------------------------------------------------------------

    async fn send_login(&self, conn_id: ConnectionId) -> Result<(), CoreError> {
        let login = LoginNotice {
            num_users: self.counter.current(),
        };
        let event = self.outbound(event_names::LOGIN, &login)?;
        self.hub().send_to(conn_id, &event).await;
        Ok(())
    }

    /// Send an `error` acknowledgement to this connection only.
    pub async fn send_error(&self, session: &ChatSession, err: &CoreError, event: Option<String>) {
        let ack = ErrorAck::from_error(err, event);
        match OutboundEvent::encode(event_names::ERROR, &ack) {
            Ok(outbound) => {
                self.hub().send_to(session.connection_id(), &outbound).await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to encode error acknowledgement"),
        }
    }

    /// Broadcast `user joined` / `user left` to every connection, optionally
    /// skipping the one the change came from.
    ///
    /// A failed publish is reported by [`publish`](Self::publish) and not
    /// acknowledged: the joining connection already has its `login`, and a
    /// leaving one is gone.
    async fn announce(
        &self,
        conn_id: ConnectionId,
        user_id: &str,
        name: &'static str,
        num_users: u64,
        exclude_self: bool,
    ) {
        let notice = PresenceNotice {
            username: user_id.to_string(),
            num_users,
        };
        let Ok(event) = self.outbound(name, &notice) else {
            return;
        };
        let mut envelope = Envelope::new(Topic::All, event);
        if exclude_self {
            envelope = envelope.excluding(conn_id);
        }
        let _ = self.publish(conn_id, Some(user_id), envelope).await;
    }

    fn outbound<T: Serialize>(&self, name: &str, data: &T) -> Result<OutboundEvent, CoreError> {
        OutboundEvent::encode(name, data)
            .map_err(|e| CoreError::Internal(format!("failed to encode '{name}': {e}")))
    }

    /// Publish through the backplane; a failure is reported and turned into
    /// an internal error for the emitting connection.
    async fn publish(
        &self,
        conn_id: ConnectionId,
        user_id: Option<&str>,
        envelope: Envelope,
    ) -> Result<(), CoreError> {
        let topic = envelope.topic.to_string();
        let event = envelope.event.event.clone();
        self.backplane.publish(envelope).await.map_err(|e| {
            self.report_failure(
                system_events::BACKPLANE_FAILED,
                Some(conn_id),
                user_id,
                &e,
                json!({"topic": topic, "event": &event}),
            );
            CoreError::Internal(format!("event '{event}' could not be delivered"))
        })
    }

    /// Log an infrastructure failure and publish it on the event bus.
    fn report_failure(
        &self,
        event_type: &'static str,
        conn_id: Option<ConnectionId>,
        user_id: Option<&str>,
        error: &dyn Display,
        mut payload: serde_json::Value,
    ) {
        tracing::error!(
            event_type,
            conn_id = ?conn_id,
            user_id = ?user_id,
            error = %error,
            "Chat infrastructure failure"
        );

        if let Some(fields) = payload.as_object_mut() {
            fields.insert("error".into(), error.to_string().into());
        }
        let mut event = SystemEvent::new(event_type).with_payload(payload);
        if let Some(conn_id) = conn_id {
            event = event.with_connection(conn_id);
        }
        if let Some(user_id) = user_id {
            event = event.with_user(user_id);
        }
        self.event_bus.publish(event);
    }
}

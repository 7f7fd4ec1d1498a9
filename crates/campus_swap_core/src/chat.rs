//! crates/campus_swap_core/src/chat.rs
//!
//! Per-trade message threads.
//!
//! The panel lists every trade the user takes part in. Selecting one opens a
//! live subscription for that trade's message inserts, then loads its history.
//! Subscribing first means an insert that lands between the history query and
//! the subscription is not lost; the two sources are merged by message id.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{Message, NewMessage, Profile, TradeWithParties};
use crate::ports::{PortError, Subscription, Toast};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("no conversation selected")]
    NoConversation,
    #[error("trade {0} is not one of your conversations")]
    UnknownTrade(Uuid),
    #[error("chat backend error: {0}")]
    Backend(#[from] PortError),
}

/// The messages of the selected trade, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatThread {
    pub trade_id: Option<Uuid>,
    pub messages: Vec<Message>,
}

impl ChatThread {
    /// Appends a live insert unless it belongs to another trade or is already
    /// present. Returns whether the thread changed.
    fn accept(&mut self, message: Message) -> bool {
        if self.trade_id != Some(message.trade_id) {
            return false;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Loaded history plus whatever arrived live in the meantime.
    fn merge_history(&mut self, history: Vec<Message>) {
        let seen: HashSet<Uuid> = history.iter().map(|m| m.id).collect();
        let live = std::mem::take(&mut self.messages);
        self.messages = history;
        self.messages
            .extend(live.into_iter().filter(|m| !seen.contains(&m.id)));
        self.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }
}

struct LiveThread {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl LiveThread {
    fn spawn(mut subscription: Subscription<Message>, thread: Arc<watch::Sender<ChatThread>>) -> Self {
        let token = subscription.token();
        let task = tokio::spawn(async move {
            while let Some(insert) = subscription.next().await {
                match insert {
                    Ok(message) => {
                        thread.send_if_modified(|t| t.accept(message));
                    }
                    Err(e) => warn!("Message feed error: {:?}", e),
                }
            }
        });
        Self { token, task }
    }

    /// The task exits on its own once the token is cancelled.
    fn stop(self) {
        self.token.cancel();
        drop(self.task);
    }
}

pub struct ChatPanel {
    app: Arc<AppState>,
    user_id: Uuid,
    conversations: Vec<TradeWithParties>,
    thread: Arc<watch::Sender<ChatThread>>,
    live: Option<LiveThread>,
    draft: String,
    sending: bool,
}

impl ChatPanel {
    pub fn new(app: Arc<AppState>, user_id: Uuid) -> Self {
        let (thread, _) = watch::channel(ChatThread::default());
        Self {
            app,
            user_id,
            conversations: Vec::new(),
            thread: Arc::new(thread),
            live: None,
            draft: String::new(),
            sending: false,
        }
    }

    //=====================================================================================
    // Conversations
    //=====================================================================================

    /// Every trade the user proposed or received, newest first.
    pub async fn load_conversations(&mut self) -> Result<(), ChatError> {
        match self.app.db.list_trades_for_participant(self.user_id).await {
            Ok(trades) => {
                debug!("Loaded {} conversations for {}", trades.len(), self.user_id);
                self.conversations = trades;
                Ok(())
            }
            Err(e) => {
                error!("Failed to load conversations: {:?}", e);
                self.app.notifier.notify(Toast::destructive(
                    "Erro ao carregar conversas",
                    "Não foi possível carregar suas conversas.",
                ));
                Err(ChatError::Backend(e))
            }
        }
    }

    pub fn conversations(&self) -> &[TradeWithParties] {
        &self.conversations
    }

    /// The participant that is not the current user.
    pub fn other_party<'a>(&self, conversation: &'a TradeWithParties) -> &'a Profile {
        if conversation.trade.proposer_id == self.user_id {
            &conversation.recipient
        } else {
            &conversation.proposer
        }
    }

    pub fn is_own_message(&self, message: &Message) -> bool {
        message.sender_id == self.user_id
    }

    pub fn selected(&self) -> Option<Uuid> {
        self.thread.borrow().trade_id
    }

    //=====================================================================================
    // Thread
    //=====================================================================================

    /// Switches the panel to `trade_id`. The previous subscription is torn
    /// down before anything else happens.
    pub async fn select_trade(&mut self, trade_id: Uuid) -> Result<(), ChatError> {
        if !self.conversations.iter().any(|c| c.trade.id == trade_id) {
            return Err(ChatError::UnknownTrade(trade_id));
        }

        self.teardown();
        self.thread.send_replace(ChatThread {
            trade_id: Some(trade_id),
            messages: Vec::new(),
        });

        let subscription = match self.app.realtime.subscribe_message_inserts(trade_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!("Failed to subscribe to messages of {}: {:?}", trade_id, e);
                self.notify_load_error();
                return Err(ChatError::Backend(e));
            }
        };
        self.live = Some(LiveThread::spawn(subscription, Arc::clone(&self.thread)));
        info!("Opened chat for trade {}", trade_id);

        match self.app.db.list_messages(trade_id).await {
            Ok(history) => {
                self.thread.send_modify(|t| {
                    if t.trade_id == Some(trade_id) {
                        t.merge_history(history);
                    }
                });
                Ok(())
            }
            Err(e) => {
                error!("Failed to load messages of {}: {:?}", trade_id, e);
                self.teardown();
                self.thread.send_replace(ChatThread::default());
                self.notify_load_error();
                Err(ChatError::Backend(e))
            }
        }
    }

    fn notify_load_error(&self) {
        self.app.notifier.notify(Toast::destructive(
            "Erro ao carregar mensagens",
            "Não foi possível carregar as mensagens.",
        ));
    }

    pub fn messages(&self) -> Vec<Message> {
        self.thread.borrow().messages.clone()
    }

    pub fn subscribe_thread(&self) -> watch::Receiver<ChatThread> {
        self.thread.subscribe()
    }

    /// The id the view scrolls to: the newest message. It changes whenever the
    /// thread grows, which pins the view to the bottom.
    pub fn scroll_anchor(&self) -> Option<Uuid> {
        self.thread.borrow().messages.last().map(|m| m.id)
    }

    pub fn is_live(&self) -> bool {
        self.live.as_ref().is_some_and(|l| !l.token.is_cancelled())
    }

    //=====================================================================================
    // Sending
    //=====================================================================================

    pub fn set_draft(&mut self, text: &str) {
        self.draft = text.to_string();
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn can_send(&self) -> bool {
        !self.sending && !self.draft.trim().is_empty() && self.selected().is_some()
    }

    /// Inserts the draft into the selected thread. The message is not added
    /// locally; it shows up when the subscription delivers the insert.
    pub async fn send(&mut self) -> Result<Message, ChatError> {
        let content = self.draft.trim().to_string();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let trade_id = self.selected().ok_or(ChatError::NoConversation)?;

        self.sending = true;
        let result = self
            .app
            .db
            .insert_message(NewMessage {
                trade_id,
                sender_id: self.user_id,
                content,
            })
            .await;
        self.sending = false;

        match result {
            Ok(message) => {
                debug!("Sent message {} in trade {}", message.id, trade_id);
                self.draft.clear();
                Ok(message)
            }
            Err(e) => {
                error!("Failed to send message: {:?}", e);
                self.app.notifier.notify(Toast::destructive(
                    "Erro ao enviar mensagem",
                    "Não foi possível enviar a mensagem. Tente novamente.",
                ));
                Err(ChatError::Backend(e))
            }
        }
    }

    /// Closes the panel: drops the subscription and clears the thread.
    pub fn close(&mut self) {
        self.teardown();
        self.thread.send_replace(ChatThread::default());
        self.draft.clear();
    }

    fn teardown(&mut self) {
        if let Some(live) = self.live.take() {
            live.stop();
        }
    }
}

impl Drop for ChatPanel {
    fn drop(&mut self) {
        self.teardown();
    }
}

//! Conversation data model
//!
//! Conversations own an ordered list of messages. Order is insertion order
//! and is never rewritten; only the content of a message can change, and
//! only while a reply is being streamed into it.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod attachment;
pub use attachment::Attachment;

/// Who a message is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text typed by the user
    User,
    /// Reply produced by the text-generation endpoint
    Assistant,
    /// Instructions or notices that are not part of the dialogue
    System,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::ParleyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(crate::error::ParleyError::Storage(format!(
                "Unknown message role: {}",
                other
            ))),
        }
    }
}

/// One turn in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier
    pub id: String,
    /// Sender of the message
    pub role: Role,
    /// Text content
    pub content: String,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
    /// Attached files, in the order they were added
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Creates a message stamped with the current time
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::conversation::{Message, Role};
    ///
    /// let msg = Message::new(Role::User, "Hello!");
    /// assert_eq!(msg.role, Role::User);
    /// assert!(msg.attachments.is_empty());
    /// ```
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            attachments: Vec::new(),
        }
    }

    /// Attaches files to the message
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// A titled, ordered collection of messages belonging to one chat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    id: String,
    title: String,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Creates an empty conversation with the given placeholder title
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::conversation::Conversation;
    ///
    /// let conversation = Conversation::new("New Conversation");
    /// assert_eq!(conversation.title(), "New Conversation");
    /// assert!(conversation.messages().is_empty());
    /// ```
    pub fn new(placeholder_title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: placeholder_title.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a conversation from persisted parts
    pub fn from_parts(
        id: impl Into<String>,
        title: impl Into<String>,
        messages: Vec<Message>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            messages,
            created_at,
            updated_at,
        }
    }

    /// Unique identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Messages in insertion order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last change to the message list
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether any message so far was written by the user
    pub fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }

    /// Looks up a message by id
    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Appends a message, deriving the title when it is the first user message
    ///
    /// Returns `true` when the title was set by this call.
    pub fn push_message(&mut self, message: Message, title_max_chars: usize) -> bool {
        let derive = message.role == Role::User && !self.has_user_message();
        if derive {
            self.title = derive_title(&message.content, title_max_chars);
        }
        self.messages.push(message);
        self.touch();
        derive
    }

    /// Overwrites the content of an existing message
    ///
    /// Returns `false` if no message has that id.
    pub fn set_message_content(&mut self, message_id: &str, content: impl Into<String>) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) => {
                message.content = content.into();
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Case-insensitive substring match against the title or any message
    ///
    /// `needle` must already be lowercased.
    pub fn matches_lowercase(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self
                .messages
                .iter()
                .any(|m| m.content.to_lowercase().contains(needle))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }
}

/// Builds a conversation title from the first user message
///
/// Keeps the first `max_chars` characters and appends `...` when the
/// message is longer.
///
/// # Examples
///
/// ```
/// use parley::conversation::derive_title;
///
/// assert_eq!(derive_title("Hello there", 20), "Hello there");
/// assert_eq!(
///     derive_title("Hello, can you help me plan a trip?", 20),
///     "Hello, can you help ..."
/// );
/// ```
pub fn derive_title(content: &str, max_chars: usize) -> String {
    if content.chars().count() > max_chars {
        let mut title: String = content.chars().take(max_chars).collect();
        title.push_str("...");
        title
    } else {
        content.to_string()
    }
}

/// Conversations created in the same calendar month
#[derive(Debug, Clone)]
pub struct MonthGroup<'a> {
    /// Calendar year
    pub year: i32,
    /// Calendar month, 1-12
    pub month: u32,
    /// Members, in collection order
    pub conversations: Vec<&'a Conversation>,
}

impl MonthGroup<'_> {
    /// Human-readable label such as `March 2025`
    pub fn label(&self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|d| d.format("%B %Y").to_string())
            .unwrap_or_else(|| format!("{}-{:02}", self.year, self.month))
    }
}

/// Groups conversations by the month they were created, most recent first
pub fn group_by_month(conversations: &[Conversation]) -> Vec<MonthGroup<'_>> {
    let mut groups: Vec<MonthGroup<'_>> = Vec::new();

    for conversation in conversations {
        let created = conversation.created_at();
        let (year, month) = (created.year(), created.month());
        match groups
            .iter_mut()
            .find(|g| g.year == year && g.month == month)
        {
            Some(group) => group.conversations.push(conversation),
            None => groups.push(MonthGroup {
                year,
                month,
                conversations: vec![conversation],
            }),
        }
    }

    groups.sort_by(|a, b| (b.year, b.month).cmp(&(a.year, a.month)));
    groups
}

/// Case-insensitive substring search over titles and message content
///
/// A blank query matches nothing. Results keep collection order.
///
/// # Examples
///
/// ```
/// use parley::conversation::{search, Conversation};
///
/// let conversations = vec![Conversation::new("Trip planning"), Conversation::new("Recipe ideas")];
/// assert_eq!(search(&conversations, "trip").len(), 1);
/// assert!(search(&conversations, "").is_empty());
/// ```
pub fn search<'a>(conversations: &'a [Conversation], query: &str) -> Vec<&'a Conversation> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let needle = query.to_lowercase();
    conversations
        .iter()
        .filter(|c| c.matches_lowercase(&needle))
        .collect()
}

/// Finds the conversation whose id equals or uniquely starts with `id_or_prefix`
pub fn find_by_prefix<'a>(
    conversations: &'a [Conversation],
    id_or_prefix: &str,
) -> Option<&'a Conversation> {
    if let Some(exact) = conversations.iter().find(|c| c.id() == id_or_prefix) {
        return Some(exact);
    }
    if id_or_prefix.is_empty() {
        return None;
    }

    let mut matches = conversations
        .iter()
        .filter(|c| c.id().starts_with(id_or_prefix));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

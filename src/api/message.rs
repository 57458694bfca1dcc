use serde::{Deserialize, Deserializer, Serialize};

/// Sends to every member of the application's visible range.
pub const ALL_USERS: &str = "@all";

/// An application message, as accepted by `message/send`.
///
/// Recipients are `|`-separated lists on the wire. At least one of
/// `touser`, `toparty` or `totag` should be set.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Message {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub touser: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub toparty: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub totag: String,
    /// The application sending this message.
    pub agentid: i64,
    #[serde(flatten)]
    pub content: MessageContent,
    /// `1` marks the message confidential (no forwarding, watermarked).
    #[serde(skip_serializing_if = "is_zero")]
    pub safe: u8,
}

/// The body of a message, tagged on the wire by `msgtype`.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "msgtype", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: Text },
    Markdown { markdown: Markdown },
    TextCard { textcard: TextCard },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Text {
    pub content: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Markdown {
    pub content: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TextCard {
    pub title: String,
    pub description: String,
    pub url: String,
    /// Button label; the client shows "Details" when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub btntxt: Option<String>,
}

/// Successful `message/send` payload. Recipients that could not be
/// delivered to are echoed back, `|`-separated.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SendMessageResponse {
    #[serde(rename = "invaliduser", default, deserialize_with = "null_as_empty")]
    pub invalid_user: String,
    #[serde(rename = "invalidparty", default, deserialize_with = "null_as_empty")]
    pub invalid_party: String,
    #[serde(rename = "invalidtag", default, deserialize_with = "null_as_empty")]
    pub invalid_tag: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub msgid: String,
}

impl SendMessageResponse {
    /// Whether every addressed recipient was accepted.
    pub fn all_delivered(&self) -> bool {
        self.invalid_user.is_empty() && self.invalid_party.is_empty() && self.invalid_tag.is_empty()
    }
}

impl Message {
    pub fn new(agentid: i64, content: MessageContent) -> Self {
        Self {
            touser: String::new(),
            toparty: String::new(),
            totag: String::new(),
            agentid,
            content,
            safe: 0,
        }
    }

    pub fn text(agentid: i64, content: impl Into<String>) -> Self {
        Self::new(
            agentid,
            MessageContent::Text {
                text: Text {
                    content: content.into(),
                },
            },
        )
    }

    pub fn markdown(agentid: i64, content: impl Into<String>) -> Self {
        Self::new(
            agentid,
            MessageContent::Markdown {
                markdown: Markdown {
                    content: content.into(),
                },
            },
        )
    }

    pub fn text_card(
        agentid: i64,
        title: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self::new(
            agentid,
            MessageContent::TextCard {
                textcard: TextCard {
                    title: title.into(),
                    description: description.into(),
                    url: url.into(),
                    btntxt: None,
                },
            },
        )
    }

    pub fn to_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.touser = join_recipients(users);
        self
    }

    pub fn to_parties<I, S>(mut self, parties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.toparty = join_recipients(parties);
        self
    }

    pub fn to_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.totag = join_recipients(tags);
        self
    }

    pub fn safe(mut self, safe: bool) -> Self {
        self.safe = u8::from(safe);
        self
    }
}

fn join_recipients<I, S>(recipients: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    recipients
        .into_iter()
        .map(|recipient| recipient.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("|")
}

/// The API sometimes sends `null` where it means "nothing".
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_zero(value: &u8) -> bool {
    *value == 0
}

use crate::status::Status;
use routeguide_types::{Feature, Point, Rectangle, RouteNote, RouteSummary};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a call, unique per connection and chosen by the client.
pub type CallId = u64;

/// The four RouteGuide methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Method {
    GetFeature = 0x01,
    ListFeatures = 0x02,
    RecordRoute = 0x03,
    RouteChat = 0x04,
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::GetFeature => "GetFeature",
            Method::ListFeatures => "ListFeatures",
            Method::RecordRoute => "RecordRoute",
            Method::RouteChat => "RouteChat",
        }
    }

    /// Whether the client sends more than one request message.
    pub fn client_streaming(&self) -> bool {
        matches!(self, Method::RecordRoute | Method::RouteChat)
    }

    /// Whether the server sends more than one response message.
    pub fn server_streaming(&self) -> bool {
        matches!(self, Method::ListFeatures | Method::RouteChat)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Envelope for every request and response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Point(Point),
    Rectangle(Rectangle),
    Feature(Feature),
    RouteNote(RouteNote),
    RouteSummary(RouteSummary),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Point(_) => "Point",
            Message::Rectangle(_) => "Rectangle",
            Message::Feature(_) => "Feature",
            Message::RouteNote(_) => "RouteNote",
            Message::RouteSummary(_) => "RouteSummary",
        }
    }
}

macro_rules! message_conversions {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Message {
                fn from(value: $variant) -> Self {
                    Message::$variant(value)
                }
            }

            impl TryFrom<Message> for $variant {
                type Error = Status;

                fn try_from(message: Message) -> Result<Self, Status> {
                    match message {
                        Message::$variant(value) => Ok(value),
                        other => Err(Status::invalid_argument(format!(
                            "expected {}, got {}",
                            stringify!($variant),
                            other.kind()
                        ))),
                    }
                }
            }
        )*
    };
}

message_conversions!(Point, Rectangle, Feature, RouteNote, RouteSummary);

/// Frames sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientFrame {
    /// Start a new call. `window` is how many response messages the server
    /// may send before waiting for a [`ClientFrame::Credit`].
    Open {
        call_id: CallId,
        method: Method,
        window: u32,
    },
    /// One request message.
    Message { call_id: CallId, message: Message },
    /// The client has no more request messages.
    HalfClose { call_id: CallId },
    /// The client abandons the call; no further frames are expected for it.
    Cancel { call_id: CallId },
    /// The client consumed `credit` response messages; the server may send
    /// that many more.
    Credit { call_id: CallId, credit: u32 },
}

impl ClientFrame {
    pub fn call_id(&self) -> CallId {
        match self {
            ClientFrame::Open { call_id, .. }
            | ClientFrame::Message { call_id, .. }
            | ClientFrame::HalfClose { call_id }
            | ClientFrame::Cancel { call_id }
            | ClientFrame::Credit { call_id, .. } => *call_id,
        }
    }
}

/// Frames sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerFrame {
    /// One response message.
    Message { call_id: CallId, message: Message },
    /// The call is finished. Always the last frame of a call that was not
    /// cancelled.
    Close { call_id: CallId, status: Status },
    /// The server has room for `credit` more request messages. The first
    /// credit of a call follows its `Open`; a client sends nothing before it.
    Credit { call_id: CallId, credit: u32 },
}

impl ServerFrame {
    pub fn call_id(&self) -> CallId {
        match self {
            ServerFrame::Message { call_id, .. }
            | ServerFrame::Close { call_id, .. }
            | ServerFrame::Credit { call_id, .. } => *call_id,
        }
    }
}

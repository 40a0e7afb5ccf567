use crate::frame::OpCode;
use crate::utf8::Utf8Validator;

/// The two application-level payload kinds a peer can send, per spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Text,
    Binary,
}

/// A complete application message, assembled from one or more frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    pub fn data_type(&self) -> DataType {
        match self {
            Message::Text(_) => DataType::Text,
            Message::Binary(_) => DataType::Binary,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(data) => data,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(data) => data,
        }
    }
}

/// State for a message currently being assembled out of a sequence of
/// fragments (one non-continuation frame followed by zero or more
/// continuation frames, the last with FIN=1). See spec §3 `PartialMessage`.
pub(crate) struct PartialMessage {
    pub data_type: DataType,
    pub payload: Vec<u8>,
    /// `Some` only for Text messages; carries the incremental UTF-8
    /// validator state across fragments.
    pub utf8: Option<Utf8Validator>,
}

impl PartialMessage {
    pub fn new(opcode: OpCode) -> Self {
        let data_type = match opcode {
            OpCode::Text => DataType::Text,
            OpCode::Binary => DataType::Binary,
            _ => unreachable!("PartialMessage only starts on Text/Binary frames"),
        };
        let utf8 = matches!(data_type, DataType::Text).then(Utf8Validator::new);
        Self {
            data_type,
            payload: Vec::new(),
            utf8,
        }
    }

    pub fn into_message(self) -> Message {
        match self.data_type {
            DataType::Text => {
                // connection.rs::deliver already checked the validator's
                // terminal state is Ok before calling this; from_utf8 is
                // infallible here by construction, so a failure means that
                // invariant regressed and should panic loudly rather than
                // hand the application a silently-emptied message.
                Message::Text(
                    String::from_utf8(self.payload)
                        .expect("payload already validated as UTF-8 per connection.rs::deliver"),
                )
            }
            DataType::Binary => Message::Binary(self.payload),
        }
    }
}

/// Commands the public handle sends to a connection's worker task. This is
/// the single queue through which `send`/`send_fragmented_*`/`close` are
/// all made cooperative with the worker's read loop (spec §5: "close is
/// cooperative, observed by the worker").
#[derive(Debug)]
pub enum OutboundCommand {
    Send(Message),
    SendFragmentedStart(DataType, Vec<u8>),
    SendFragmentedCont { fin: bool, data: Vec<u8> },
    Ping(Vec<u8>),
    Close(u16),
}

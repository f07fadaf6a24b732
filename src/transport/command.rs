//! Request grammar.
//!
//! ```text
//! pub <topic> <data...>      data is the rest of the line, kept as-is
//! sub <topic> [<topic> ...]
//! ```
//!
//! Topic names must be valid UTF-8; `data` is raw bytes.
//! Leading and trailing whitespace is ignored. A command must fit in a single
//! read of the connection's read buffer; anything past it is not part of the
//! command.

use bytes::Bytes;

use crate::utils::error::Problem;

pub const OP_PUBLISH: &str = "pub";
pub const OP_SUBSCRIBE: &str = "sub";

const SUBSCRIBE_ACK_PREFIX: &str = "successfully subscribed to";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Publish { topic: String, data: Bytes },
    Subscribe { topics: Vec<String> },
}

impl Command {
    pub fn parse(raw: &[u8]) -> Result<Self, Problem> {
        let (operation, rest) = split_token(raw.trim_ascii());

        if operation == OP_PUBLISH.as_bytes() {
            let (topic, data) = split_token(rest);
            if topic.is_empty() || data.is_empty() {
                return Err(Problem::publish_requires_arguments());
            }
            Ok(Command::Publish {
                topic: topic_name(topic)?,
                data: Bytes::copy_from_slice(data),
            })
        } else if operation == OP_SUBSCRIBE.as_bytes() {
            let topics = rest
                .split(u8::is_ascii_whitespace)
                .filter(|token| !token.is_empty())
                .map(topic_name)
                .collect::<Result<Vec<_>, _>>()?;
            if topics.is_empty() {
                return Err(Problem::subscribe_requires_arguments());
            }
            Ok(Command::Subscribe { topics })
        } else {
            Err(Problem::invalid_operation())
        }
    }

    /// Renders the command the way a client sends it.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Publish { topic, data } => {
                let mut line =
                    Vec::with_capacity(OP_PUBLISH.len() + topic.len() + data.len() + 2);
                line.extend_from_slice(OP_PUBLISH.as_bytes());
                line.push(b' ');
                line.extend_from_slice(topic.as_bytes());
                line.push(b' ');
                line.extend_from_slice(data);
                line
            }
            Command::Subscribe { topics } => {
                format!("{OP_SUBSCRIBE} {}", topics.join(" ")).into_bytes()
            }
        }
    }
}

/// The acknowledgment written once a subscription is in place.
pub fn subscribe_ack<S: AsRef<str>>(topics: &[S]) -> String {
    let names: Vec<&str> = topics.iter().map(|topic| topic.as_ref()).collect();
    format!("{SUBSCRIBE_ACK_PREFIX} {}", names.join(", "))
}

/// Topic names are compared byte for byte, so they must decode exactly.
fn topic_name(token: &[u8]) -> Result<String, Problem> {
    std::str::from_utf8(token)
        .map(str::to_string)
        .map_err(|_| Problem::topic_not_utf8())
}

fn split_token(input: &[u8]) -> (&[u8], &[u8]) {
    match input.iter().position(u8::is_ascii_whitespace) {
        Some(end) => (&input[..end], input[end..].trim_ascii_start()),
        None => (input, &input[input.len()..]),
    }
}

//! Wire protocol: command/response codes and byte framing

mod codes;
pub mod framing;

pub use codes::{Command, Response};
pub use framing::{
    escape, escaped_len, Deframer, FrameEvent, RxBuffer, Step, TxBuffer, Unescaper,
};

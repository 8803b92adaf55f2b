use drscope_common::Channel;
use std::io;
use thiserror::Error;

/// Fatal decode failures. Any of these aborts the remainder of the capture;
/// there is no resynchronisation with a corrupt stream.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unrecognised file header {0:?}")]
    BadFileHeader([u8; 4]),

    #[error("unrecognised time header {0:?}")]
    BadTimeHeader([u8; 4]),

    #[error("no boards found in capture")]
    NoBoards,

    #[error("multi-board captures are unsupported")]
    MultipleBoards,

    #[error("board {0} has no channels")]
    NoChannels(u16),

    #[error("channel {0} requested but not present in capture")]
    MissingChannel(Channel),

    #[error("bad event header")]
    BadEventHeader,

    #[error("bad event data")]
    BadEventData,

    #[error("event {serial} has an impossible timestamp")]
    BadTimestamp { serial: u32 },

    #[error("event {serial} trigger cell {trigger_cell} out of range")]
    BadTriggerCell { serial: u32, trigger_cell: u16 },

    #[error("capture truncated: {0}")]
    Truncated(#[from] io::Error),
}

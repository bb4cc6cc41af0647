//! Parsed 6P requests, responses, and transaction outcomes.

use std::fmt;

use crate::core::{CellOptions, LinkAddr};

/// 6P message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Request.
    Request = 0x00,
    /// Response.
    Response = 0x01,
    /// Confirmation (3-step transactions only).
    Confirmation = 0x02,
}

impl MessageType {
    /// Convert from byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Request),
            0x01 => Some(Self::Response),
            0x02 => Some(Self::Confirmation),
            _ => None,
        }
    }
}

/// 6P command identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Add cells.
    Add = 0x01,
    /// Delete cells.
    Delete = 0x02,
    /// Move cells to new coordinates.
    Relocate = 0x03,
    /// Count scheduled cells.
    Count = 0x04,
    /// List scheduled cells.
    List = 0x05,
    /// Signal (SF-specific payload).
    Signal = 0x06,
    /// Drop every cell shared with the peer.
    Clear = 0x07,
}

impl Command {
    /// Convert from byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Add),
            0x02 => Some(Self::Delete),
            0x03 => Some(Self::Relocate),
            0x04 => Some(Self::Count),
            0x05 => Some(Self::List),
            0x06 => Some(Self::Signal),
            0x07 => Some(Self::Clear),
            _ => None,
        }
    }

    /// Convert to byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Add => "ADD",
            Command::Delete => "DELETE",
            Command::Relocate => "RELOCATE",
            Command::Count => "COUNT",
            Command::List => "LIST",
            Command::Signal => "SIGNAL",
            Command::Clear => "CLEAR",
        };
        f.write_str(name)
    }
}

/// 6P return codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReturnCode {
    /// Operation succeeded.
    Success = 0x00,
    /// End of list.
    Eol = 0x01,
    /// Generic error.
    Err = 0x02,
    /// Critical error, reset.
    Reset = 0x03,
    /// Unsupported 6P version.
    ErrVersion = 0x04,
    /// Unsupported scheduling function.
    ErrSfid = 0x05,
    /// Sequence number mismatch; schedules may have diverged.
    ErrSeqnum = 0x06,
    /// Invalid cell list.
    ErrCelllist = 0x07,
    /// Responder busy.
    ErrBusy = 0x08,
    /// Cells locked by another transaction.
    ErrLocked = 0x09,
}

impl ReturnCode {
    /// Convert from byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::Eol),
            0x02 => Some(Self::Err),
            0x03 => Some(Self::Reset),
            0x04 => Some(Self::ErrVersion),
            0x05 => Some(Self::ErrSfid),
            0x06 => Some(Self::ErrSeqnum),
            0x07 => Some(Self::ErrCelllist),
            0x08 => Some(Self::ErrBusy),
            0x09 => Some(Self::ErrLocked),
            _ => None,
        }
    }

    /// Convert to byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReturnCode::Success => "RC_SUCCESS",
            ReturnCode::Eol => "RC_EOL",
            ReturnCode::Err => "RC_ERR",
            ReturnCode::Reset => "RC_RESET",
            ReturnCode::ErrVersion => "RC_ERR_VERSION",
            ReturnCode::ErrSfid => "RC_ERR_SFID",
            ReturnCode::ErrSeqnum => "RC_ERR_SEQNUM",
            ReturnCode::ErrCelllist => "RC_ERR_CELLLIST",
            ReturnCode::ErrBusy => "RC_ERR_BUSY",
            ReturnCode::ErrLocked => "RC_ERR_LOCKED",
        };
        f.write_str(name)
    }
}

/// Cell coordinates as carried in 6P cell lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SixpCell {
    /// Slot offset.
    pub timeslot: u16,
    /// Channel offset.
    pub channel_offset: u16,
}

impl SixpCell {
    /// Create a cell descriptor.
    pub const fn new(timeslot: u16, channel_offset: u16) -> Self {
        Self {
            timeslot,
            channel_offset,
        }
    }
}

impl From<&crate::core::Cell> for SixpCell {
    fn from(cell: &crate::core::Cell) -> Self {
        Self::new(cell.timeslot, cell.channel_offset)
    }
}

impl fmt::Display for SixpCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slot_offset:{}, channel_offset:{}",
            self.timeslot, self.channel_offset
        )
    }
}

/// Body of a 6P request, per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// ADD request.
    Add {
        /// Options of the cells to add, from the sender's point of view.
        cell_options: CellOptions,
        /// Number of cells requested.
        num_cells: u8,
        /// Candidate cells.
        cell_list: Vec<SixpCell>,
    },
    /// DELETE request.
    Delete {
        /// Options of the cells to delete.
        cell_options: CellOptions,
        /// Number of cells to delete.
        num_cells: u8,
        /// Cells to delete.
        cell_list: Vec<SixpCell>,
    },
    /// RELOCATE request.
    Relocate {
        /// Options of the cells to relocate.
        cell_options: CellOptions,
        /// Number of cells to relocate.
        num_cells: u8,
        /// Cells to vacate.
        relocation_cell_list: Vec<SixpCell>,
        /// Replacement candidates.
        candidate_cell_list: Vec<SixpCell>,
    },
    /// CLEAR request.
    Clear,
    /// COUNT, LIST, or SIGNAL; MSF does not serve these.
    Unsupported(Command),
}

impl RequestBody {
    /// Command carried by this body.
    pub fn command(&self) -> Command {
        match self {
            RequestBody::Add { .. } => Command::Add,
            RequestBody::Delete { .. } => Command::Delete,
            RequestBody::Relocate { .. } => Command::Relocate,
            RequestBody::Clear => Command::Clear,
            RequestBody::Unsupported(cmd) => *cmd,
        }
    }
}

/// A parsed 6P message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SixpMessage {
    /// Request.
    Request(RequestBody),
    /// Response to the transaction's request.
    Response {
        /// Return code.
        code: ReturnCode,
        /// Returned cells, possibly empty.
        cell_list: Vec<SixpCell>,
    },
    /// Confirmation of a 3-step transaction.
    Confirmation {
        /// Return code.
        code: ReturnCode,
        /// Confirmed cells.
        cell_list: Vec<SixpCell>,
    },
}

/// A 6P packet addressed to a scheduling function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SixpPacket {
    /// Scheduling function identifier.
    pub sfid: u8,
    /// Message.
    pub message: SixpMessage,
}

impl SixpPacket {
    /// Build a request.
    pub fn request(sfid: u8, body: RequestBody) -> Self {
        Self {
            sfid,
            message: SixpMessage::Request(body),
        }
    }

    /// Build a response.
    pub fn response(sfid: u8, code: ReturnCode, cell_list: Vec<SixpCell>) -> Self {
        Self {
            sfid,
            message: SixpMessage::Response { code, cell_list },
        }
    }

    /// Message type of this packet.
    pub fn message_type(&self) -> MessageType {
        match self.message {
            SixpMessage::Request(_) => MessageType::Request,
            SixpMessage::Response { .. } => MessageType::Response,
            SixpMessage::Confirmation { .. } => MessageType::Confirmation,
        }
    }

    /// Command if this is a request.
    pub fn command(&self) -> Option<Command> {
        match &self.message {
            SixpMessage::Request(body) => Some(body.command()),
            _ => None,
        }
    }

    /// Return code if this is a response or confirmation.
    pub fn return_code(&self) -> Option<ReturnCode> {
        match &self.message {
            SixpMessage::Request(_) => None,
            SixpMessage::Response { code, .. } | SixpMessage::Confirmation { code, .. } => {
                Some(*code)
            }
        }
    }
}

/// Send status reported by the 6P layer for an output packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    /// The packet was delivered (MAC-acknowledged).
    Success,
    /// The packet could not be delivered.
    Failure,
    /// The transaction was aborted before delivery.
    Aborted,
}

/// A 6P transaction as seen from the scheduling function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SixpTransaction {
    /// Peer of the transaction.
    pub peer: LinkAddr,
    /// Command of the transaction.
    pub command: Command,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        for b in 0x01..=0x07 {
            let cmd = Command::from_byte(b).unwrap();
            assert_eq!(cmd.to_byte(), b);
        }
        assert_eq!(Command::from_byte(0x00), None);
        assert_eq!(Command::from_byte(0x08), None);
    }

    #[test]
    fn test_return_code_bytes() {
        assert_eq!(ReturnCode::from_byte(0x06), Some(ReturnCode::ErrSeqnum));
        assert_eq!(ReturnCode::from_byte(0x08), Some(ReturnCode::ErrBusy));
        assert_eq!(ReturnCode::from_byte(0x0a), None);
        assert_eq!(ReturnCode::ErrCelllist.to_string(), "RC_ERR_CELLLIST");
    }

    #[test]
    fn test_packet_accessors() {
        let req = SixpPacket::request(0, RequestBody::Clear);
        assert_eq!(req.message_type(), MessageType::Request);
        assert_eq!(req.command(), Some(Command::Clear));
        assert_eq!(req.return_code(), None);

        let resp = SixpPacket::response(0, ReturnCode::ErrBusy, Vec::new());
        assert_eq!(resp.message_type(), MessageType::Response);
        assert_eq!(resp.command(), None);
        assert_eq!(resp.return_code(), Some(ReturnCode::ErrBusy));
    }

    #[test]
    fn test_unsupported_body_command() {
        assert_eq!(
            RequestBody::Unsupported(Command::Count).command(),
            Command::Count
        );
    }
}

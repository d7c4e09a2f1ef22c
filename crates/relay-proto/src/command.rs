/// Set on a frame's `type` field when the frame targets an attached object
/// rather than the local node's own control queue.
pub const OBJECT_COMMAND_BIT: u32 = 1 << 31;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Control,
    Object,
}

impl CommandKind {
    pub fn from_type_field(type_field: u32) -> Self {
        if type_field & OBJECT_COMMAND_BIT != 0 { Self::Object } else { Self::Control }
    }

    pub fn to_type_field(self) -> u32 {
        match self {
            Self::Control => 0,
            Self::Object => OBJECT_COMMAND_BIT,
        }
    }
}

/// Node-to-node control commands, dispatched onto a `LocalNode`'s own
/// command queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ControlCommand {
    ConnectReq = 0,
    ConnectReply = 1,
    ConnectAck = 2,
    Disconnect = 3,
    GetNodeData = 4,
    GetNodeDataReply = 5,
    Ping = 6,
    Pong = 7,
    AcquireSendToken = 8,
    AcquireSendTokenReply = 9,
    ReleaseSendToken = 10,
    AddListener = 11,
    RemoveListener = 12,
    /// Opaque application payload routed to a user-registered handler.
    Command = 13,
    StopRcv = 14,
    StopCmd = 15,
    SetAffinity = 16,
}

impl ControlCommand {
    pub fn from_u32(v: u32) -> Option<Self> {
        use ControlCommand::*;
        Some(match v {
            0 => ConnectReq,
            1 => ConnectReply,
            2 => ConnectAck,
            3 => Disconnect,
            4 => GetNodeData,
            5 => GetNodeDataReply,
            6 => Ping,
            7 => Pong,
            8 => AcquireSendToken,
            9 => AcquireSendTokenReply,
            10 => ReleaseSendToken,
            11 => AddListener,
            12 => RemoveListener,
            13 => Command,
            14 => StopRcv,
            15 => StopCmd,
            16 => SetAffinity,
            _ => return None,
        })
    }
}

/// Commands dispatched onto an attached object's queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ObjectCommand {
    Instance = 0,
    Delta = 1,
    Commit = 2,
    MapObj = 3,
    MapObjReply = 4,
    MapObjSuccess = 5,
    UnmapObj = 6,
    BarrierEnter = 7,
    BarrierEnterReply = 8,
}

impl ObjectCommand {
    pub fn from_u32(v: u32) -> Option<Self> {
        use ObjectCommand::*;
        Some(match v {
            0 => Instance,
            1 => Delta,
            2 => Commit,
            3 => MapObj,
            4 => MapObjReply,
            5 => MapObjSuccess,
            6 => UnmapObj,
            7 => BarrierEnter,
            8 => BarrierEnterReply,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_bit_round_trips() {
        assert_eq!(CommandKind::from_type_field(CommandKind::Object.to_type_field()), CommandKind::Object);
        assert_eq!(CommandKind::from_type_field(CommandKind::Control.to_type_field()), CommandKind::Control);
    }
}

//! Wire protocol shared by the arena server and its clients.
//!
//! Every message travels as one frame: a 4-byte big-endian length followed by
//! exactly that many bytes of UTF-8 JSON. The JSON object carries a `"type"`
//! field naming the message (`JOIN`, `INPUT`, `STATE`, ...).

pub mod codec;

pub use codec::{
    decode, encode, read_frame, read_message, write_frame, write_message, ProtocolError,
};

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 5555;
pub const FRAME_HEADER_LEN: usize = 4;
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Messages a client may send to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    Join {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Input(InputMessage),
    Leave,
}

/// Messages the server sends to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    JoinAck {
        player_id: u32,
        arena_width: f32,
        arena_height: f32,
        tick_rate: u32,
        color: String,
    },
    JoinReject {
        reason: String,
    },
    State(StateMessage),
}

/// Held-key form of movement, as sent by keyboard clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyFlags {
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub up: bool,
    #[serde(default)]
    pub down: bool,
}

impl KeyFlags {
    /// Converts held keys into a movement vector. Screen coordinates: +y is down.
    pub fn to_vector(self) -> [f32; 2] {
        let mut x = 0.0;
        let mut y = 0.0;
        if self.left {
            x -= 1.0;
        }
        if self.right {
            x += 1.0;
        }
        if self.up {
            y -= 1.0;
        }
        if self.down {
            y += 1.0;
        }
        [x, y]
    }
}

/// Desired action for one player. Every field is optional on the wire.
///
/// Movement is either `move` (a vector whose magnitude is a fraction of max
/// speed) or `keys`; `move` wins when both are present. Aim is either `aim`
/// (radians), `target` (a point in arena coordinates) or `shoot_dir` (a
/// direction vector), checked in that order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    #[serde(rename = "move", default, skip_serializing_if = "Option::is_none")]
    pub movement: Option<[f32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<KeyFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aim: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<[f32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shoot_dir: Option<[f32; 2]>,
    #[serde(default, alias = "shoot")]
    pub fire: bool,
}

/// Full world state for one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    pub tick: u64,
    pub players: Vec<PlayerState>,
    pub bullets: Vec<BulletState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: u32,
    pub name: String,
    pub color: String,
    pub x: f32,
    pub y: f32,
    pub aim: f32,
    pub alive: bool,
    pub score: u32,
    pub ammo: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletState {
    pub id: u64,
    pub owner: u32,
    pub x: f32,
    pub y: f32,
}

use serde::{Deserialize, Serialize};

/// The kind of content a block holds
///
/// Wire names follow the editor's short tags (`p`, `h1`, ...). The set is
/// closed: anything else fails deserialization at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockType {
    #[serde(rename = "p")]
    Paragraph,
    #[serde(rename = "h1")]
    Heading1,
    #[serde(rename = "h2")]
    Heading2,
    #[serde(rename = "h3")]
    Heading3,
    #[serde(rename = "ul")]
    ListItem,
}

/// One block of a document
///
/// `rank` is an opaque sort key; the display/storage order of a document is
/// exactly its blocks sorted ascending by `rank` (lexicographic byte
/// comparison). Ids are caller-generated and unique within a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub rank: String,
}

/// The fields an `Edit::Update` may change
///
/// This is the explicit allow-list for updates: `deny_unknown_fields` makes
/// any other field a decode error, so nothing outside {content, type, rank}
/// can ever reach peers or storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
}

impl BlockPatch {
    /// A patch carrying only a new content value
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A patch carrying only a new rank
    pub fn rank(rank: impl Into<String>) -> Self {
        Self {
            rank: Some(rank.into()),
            ..Self::default()
        }
    }
}

/// A single-block change, the only unit crossing the connection boundary
///
/// Edits are immutable once created and are applied identically on every
/// side: optimistically by the originating client, by each peer on receipt,
/// and by the persistence adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Edit {
    #[serde(rename = "INSERT")]
    Insert { block: Block },
    #[serde(rename = "UPDATE")]
    Update {
        #[serde(rename = "blockId")]
        block_id: String,
        data: BlockPatch,
    },
    #[serde(rename = "DELETE")]
    Delete {
        #[serde(rename = "blockId")]
        block_id: String,
    },
}

impl Edit {
    /// The id of the block this edit touches
    pub fn block_id(&self) -> &str {
        match self {
            Edit::Insert { block } => &block.id,
            Edit::Update { block_id, .. } => block_id,
            Edit::Delete { block_id } => block_id,
        }
    }
}

/// The wire envelope exchanged over the realtime channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    #[serde(rename = "OP")]
    Op { payload: Edit },
}

/// Encode a message as a JSON text frame
pub fn encode_message<T: Serialize>(message: &T) -> crate::SyncResult<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a message from a JSON text frame
///
/// Malformed frames (unknown `type`, missing fields, fields outside the
/// update allow-list) are rejected here; callers drop the frame and keep the
/// connection alive.
pub fn decode_message<T: for<'de> Deserialize<'de>>(data: &str) -> crate::SyncResult<T> {
    serde_json::from_str(data).map_err(|e| crate::SyncError::Protocol {
        message: format!("Failed to decode message: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_envelope_round_trip() {
        let msg = WireMessage::Op {
            payload: Edit::Insert {
                block: Block {
                    id: "b1".to_string(),
                    content: "hello".to_string(),
                    block_type: BlockType::Paragraph,
                    rank: "U".to_string(),
                },
            },
        };

        let encoded = encode_message(&msg).unwrap();
        let decoded: WireMessage = decode_message(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_update_wire_shape() {
        let raw = r#"{"type":"OP","payload":{"type":"UPDATE","blockId":"b1","data":{"content":"x"}}}"#;
        let msg: WireMessage = decode_message(raw).unwrap();

        let WireMessage::Op { payload } = msg;
        match payload {
            Edit::Update { block_id, data } => {
                assert_eq!(block_id, "b1");
                assert_eq!(data.content.as_deref(), Some("x"));
                assert!(data.block_type.is_none());
                assert!(data.rank.is_none());
            }
            other => panic!("Expected UPDATE, got: {:?}", other),
        }
    }

    #[test]
    fn test_update_rejects_unknown_fields() {
        let raw =
            r#"{"type":"OP","payload":{"type":"UPDATE","blockId":"b1","data":{"owner_id":"evil"}}}"#;
        let result: crate::SyncResult<WireMessage> = decode_message(raw);
        assert!(matches!(
            result,
            Err(crate::SyncError::Protocol { .. })
        ));
    }

    #[test]
    fn test_unknown_edit_type_rejected() {
        let raw = r#"{"type":"OP","payload":{"type":"TRUNCATE"}}"#;
        let result: crate::SyncResult<WireMessage> = decode_message(raw);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_block_type_rejected() {
        let raw = r#"{"id":"b1","content":"","type":"iframe","rank":"U"}"#;
        let result: crate::SyncResult<Block> = decode_message(raw);
        assert!(result.is_err());
    }

    #[test]
    fn test_delete_wire_shape() {
        let edit = Edit::Delete {
            block_id: "b9".to_string(),
        };
        let encoded = encode_message(&edit).unwrap();
        assert_eq!(encoded, r#"{"type":"DELETE","blockId":"b9"}"#);
    }
}

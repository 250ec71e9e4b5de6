//! Block type - the unit of content-addressed storage

use super::Hash;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Which tree engine a block belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// A node of the ordered sequence (2-3 tree)
    SeqNode,
    /// A node of the bloom-indexed set
    SetNode,
}

impl BlockKind {
    pub fn as_byte(&self) -> u8 {
        match self {
            BlockKind::SeqNode => 0,
            BlockKind::SetNode => 1,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(BlockKind::SeqNode),
            1 => Some(BlockKind::SetNode),
            _ => None,
        }
    }
}

/// A named pointer from a block to one of its children
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub hash: Hash,
    /// Size of the linked subtree, in elements
    pub size: u64,
}

/// A typed record plus its links. Children are never inlined in `data`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub data: Vec<u8>,
    pub links: Vec<Link>,
}

impl Block {
    pub fn new(kind: BlockKind, data: Vec<u8>) -> Self {
        Block {
            kind,
            data,
            links: Vec::new(),
        }
    }

    /// Attach a child link
    pub fn with_link(mut self, name: impl Into<String>, hash: Hash, size: u64) -> Self {
        self.links.push(Link {
            name: name.into(),
            hash,
            size,
        });
        self
    }

    /// Look up a link by name
    pub fn link(&self, name: &str) -> Result<&Link> {
        self.links
            .iter()
            .find(|link| link.name == name)
            .ok_or_else(|| Error::Corruption(format!("Missing link '{}'", name)))
    }

    /// Fail unless this block has the given kind
    pub fn expect_kind(&self, expected: BlockKind) -> Result<()> {
        if self.kind != expected {
            return Err(Error::UnexpectedKind {
                expected,
                found: self.kind,
            });
        }
        Ok(())
    }

    fn body(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&(&self.data, &self.links))?)
    }

    /// Compute the content address
    pub fn hash(&self) -> Result<Hash> {
        // Kind takes part in the address, so equal bytes of different kinds differ
        Ok(Hash::digest_many(&[&[self.kind.as_byte()], &self.body()?]))
    }

    /// Address and storage bytes in one pass
    pub fn encode(&self, level: i32) -> Result<(Hash, Vec<u8>)> {
        let body = self.body()?;
        let hash = Hash::digest_many(&[&[self.kind.as_byte()], &body]);

        let mut output = Vec::with_capacity(body.len() / 2 + 1);
        output.push(self.kind.as_byte());
        output.extend(zstd::encode_all(body.as_slice(), level)?);
        Ok((hash, output))
    }

    /// Decode storage bytes produced by [`Block::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (&kind_byte, compressed) = bytes
            .split_first()
            .ok_or_else(|| Error::Corruption("Empty block data".into()))?;

        let kind = BlockKind::from_byte(kind_byte)
            .ok_or_else(|| Error::Corruption(format!("Invalid block kind: {}", kind_byte)))?;

        let body = zstd::decode_all(compressed)?;
        let (data, links): (Vec<u8>, Vec<Link>) = bincode::deserialize(&body)?;

        Ok(Block { kind, data, links })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_roundtrip_keeps_links() {
        let child = Hash::digest_many(&[b"child"]);
        let block = Block::new(BlockKind::SeqNode, b"payload".to_vec())
            .with_link("0", child, 4)
            .with_link("1", Hash::ZERO, 1);

        let (hash, bytes) = block.encode(3).unwrap();
        let restored = Block::decode(&bytes).unwrap();

        assert_eq!(restored, block);
        assert_eq!(restored.hash().unwrap(), hash);
        assert_eq!(restored.link("0").unwrap().size, 4);
        assert!(restored.link("2").is_err());
    }

    #[test]
    fn test_hash_includes_kind() {
        let seq = Block::new(BlockKind::SeqNode, b"data".to_vec());
        let set = Block::new(BlockKind::SetNode, b"data".to_vec());
        assert_ne!(seq.hash().unwrap(), set.hash().unwrap());
    }

    #[test]
    fn test_hash_includes_links() {
        let bare = Block::new(BlockKind::SetNode, b"data".to_vec());
        let linked = bare.clone().with_link("0", Hash::ZERO, 1);
        assert_ne!(bare.hash().unwrap(), linked.hash().unwrap());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(Block::decode(&[]), Err(Error::Corruption(_))));
        assert!(matches!(Block::decode(&[9, 1, 2]), Err(Error::Corruption(_))));
        assert!(Block::decode(&[0, 1, 2, 3]).is_err());
    }

    #[test]
    fn test_expect_kind() {
        let block = Block::new(BlockKind::SeqNode, Vec::new());
        assert!(block.expect_kind(BlockKind::SeqNode).is_ok());
        assert!(matches!(
            block.expect_kind(BlockKind::SetNode),
            Err(Error::UnexpectedKind { .. })
        ));
    }
}

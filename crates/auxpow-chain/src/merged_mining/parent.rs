//! Parent-chain block headers. A parent block either looks like a plain
//! Bitcoin header or like an Equihash-family header with a solution trailer;
//! merged mining treats the solution as opaque bytes and only ever reads the
//! version (for the declared chain id) and the transaction merkle root.

use bitcoin::block::Header as BlockHeader;
use bitcoin::consensus;
use bitcoin::consensus::Decodable;
use bitcoin::consensus::Encodable;
use bitcoin::hashes::sha256d;
use bitcoin::hashes::Hash;
use bitcoin::BlockHash;
use bitcoin::CompactTarget;
use bitcoin::TxMerkleNode;

use crate::prelude::*;

/// Header of an Equihash-family parent block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EquihashHeader {
    pub version: i32,
    pub prev_blockhash: BlockHash,
    pub merkle_root: TxMerkleNode,
    /// Reserved commitment carried since the Sapling-era layout.
    pub reserved: sha256d::Hash,
    pub time: u32,
    pub bits: CompactTarget,
    pub nonce: [u8; 32],
    pub solution: Vec<u8>,
}

impl EquihashHeader {
    pub fn block_hash(&self) -> BlockHash {
        let mut engine = BlockHash::engine();
        self.consensus_encode(&mut engine)
            .expect("engines don't error");
        BlockHash::from_engine(engine)
    }
}

impl Default for EquihashHeader {
    fn default() -> Self {
        EquihashHeader {
            version: 0,
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: TxMerkleNode::all_zeros(),
            reserved: sha256d::Hash::all_zeros(),
            time: 0,
            bits: CompactTarget::from_consensus(0),
            nonce: [0; 32],
            solution: Vec::new(),
        }
    }
}

impl Encodable for EquihashHeader {
    fn consensus_encode<W: bitcoin::io::Write + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<usize, bitcoin::io::Error> {
        let mut len = 0;
        len += self.version.consensus_encode(writer)?;
        len += self.prev_blockhash.consensus_encode(writer)?;
        len += self.merkle_root.consensus_encode(writer)?;
        len += self.reserved.consensus_encode(writer)?;
        len += self.time.consensus_encode(writer)?;
        len += self.bits.consensus_encode(writer)?;
        len += self.nonce.consensus_encode(writer)?;
        len += self.solution.consensus_encode(writer)?;
        Ok(len)
    }
}

impl Decodable for EquihashHeader {
    fn consensus_decode<R: bitcoin::io::Read + ?Sized>(
        reader: &mut R,
    ) -> Result<Self, consensus::encode::Error> {
        Ok(EquihashHeader {
            version: i32::consensus_decode(reader)?,
            prev_blockhash: BlockHash::consensus_decode(reader)?,
            merkle_root: TxMerkleNode::consensus_decode(reader)?,
            reserved: sha256d::Hash::consensus_decode(reader)?,
            time: u32::consensus_decode(reader)?,
            bits: CompactTarget::consensus_decode(reader)?,
            nonce: <[u8; 32]>::consensus_decode(reader)?,
            solution: Vec::<u8>::consensus_decode(reader)?,
        })
    }
}

/// The two parent block header shapes. Which one an [AuxPow] carries is
/// decided by its Equihash flag at decode time; after that, code matches on
/// the variant and never looks at the flag again.
///
/// [AuxPow]: crate::AuxPow
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParentHeader {
    Default(BlockHeader),
    Equihash(EquihashHeader),
}

impl ParentHeader {
    /// Chain id the parent block declares in the high bits of its version.
    pub fn chain_id(&self) -> i32 {
        match self {
            ParentHeader::Default(header) => header.version.to_consensus() >> 16,
            ParentHeader::Equihash(header) => header.version >> 16,
        }
    }

    /// Root of the parent block's transaction merkle tree.
    pub fn merkle_root(&self) -> TxMerkleNode {
        match self {
            ParentHeader::Default(header) => header.merkle_root,
            ParentHeader::Equihash(header) => header.merkle_root,
        }
    }

    pub fn block_hash(&self) -> BlockHash {
        match self {
            ParentHeader::Default(header) => header.block_hash(),
            ParentHeader::Equihash(header) => header.block_hash(),
        }
    }
}

impl Encodable for ParentHeader {
    fn consensus_encode<W: bitcoin::io::Write + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<usize, bitcoin::io::Error> {
        match self {
            ParentHeader::Default(header) => header.consensus_encode(writer),
            ParentHeader::Equihash(header) => header.consensus_encode(writer),
        }
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::consensus::deserialize;
    use bitcoin::consensus::serialize;

    use super::*;

    #[test]
    fn chain_id_lives_in_the_high_bits() {
        let header = EquihashHeader {
            version: (0x002a << 16) | 4,
            ..Default::default()
        };
        assert_eq!(ParentHeader::Equihash(header).chain_id(), 0x002a);
    }

    #[test]
    fn equihash_header_roundtrip() {
        let header = EquihashHeader {
            version: 4,
            time: 1716000000,
            nonce: [7; 32],
            solution: vec![0xab; 1344],
            ..Default::default()
        };
        let decoded: EquihashHeader = deserialize(&serialize(&header)).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.block_hash(), header.block_hash());
    }
}

//! This chain's block header: a Bitcoin-shaped base header whose version
//! packs three things: the base version in the low byte, the merged-mining
//! bit at 0x100, and our chain id in the high bits. When the merged-mining
//! bit is set the header owns an [AuxPow] that is serialized right after the
//! 80 base bytes; the block hash never covers it.

use bitcoin::block::Header as BlockHeader;
use bitcoin::block::Version as BlockVersion;
use bitcoin::consensus;
use bitcoin::consensus::Decodable;
use bitcoin::consensus::Encodable;
use bitcoin::BlockHash;
use log::warn;

use super::auxpow::AuxPow;
use super::chainparams::ChainParams;
use super::error::AuxPowError;
use crate::prelude::*;

/// Version bit signaling that the header carries an [AuxPow].
pub const VERSION_AUXPOW_FLAG: i32 = 0x100;

/// First version bit of the chain id.
pub const VERSION_CHAIN_START: i32 = 1 << 16;

/// A block header of this chain, exclusively owning its merged-mining
/// evidence when it carries any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuxBlockHeader {
    pub header: BlockHeader,
    pub auxpow: Option<Box<AuxPow>>,
}

impl AuxBlockHeader {
    pub fn new(header: BlockHeader) -> Self {
        AuxBlockHeader {
            header,
            auxpow: None,
        }
    }

    /// Hash of the 80-byte base header; the AuxPow is never hashed.
    pub fn block_hash(&self) -> BlockHash {
        self.header.block_hash()
    }

    fn version(&self) -> i32 {
        self.header.version.to_consensus()
    }

    /// Version with the chain id and flag bits stripped.
    pub fn base_version(&self) -> i32 {
        self.version() % VERSION_AUXPOW_FLAG
    }

    /// Chain id packed in the high version bits.
    pub fn chain_id(&self) -> i32 {
        self.version() >> 16
    }

    pub fn is_auxpow(&self) -> bool {
        self.version() & VERSION_AUXPOW_FLAG != 0
    }

    pub fn set_auxpow_flag(&mut self, set: bool) {
        let version = if set {
            self.version() | VERSION_AUXPOW_FLAG
        } else {
            self.version() & !VERSION_AUXPOW_FLAG
        };
        self.header.version = BlockVersion::from_consensus(version);
    }

    pub fn set_chain_id(&mut self, chain_id: i32) {
        let version = (self.version() % VERSION_CHAIN_START) | (chain_id * VERSION_CHAIN_START);
        self.header.version = BlockVersion::from_consensus(version);
    }

    /// Full merged-mining validation of this header: the version must carry
    /// our chain id, the auxpow bit must agree with the payload, and the
    /// evidence itself must pass [AuxPow::check]. Rejections are logged with
    /// their reason before being returned.
    pub fn verify_auxpow(&self, params: &ChainParams) -> Result<(), AuxPowError> {
        let result = self.verify_auxpow_inner(params);
        if let Err(ref reason) = result {
            warn!(
                "rejecting auxpow for block {}: {}",
                self.block_hash(),
                reason
            );
        }
        result
    }

    fn verify_auxpow_inner(&self, params: &ChainParams) -> Result<(), AuxPowError> {
        if self.chain_id() != params.chain_id {
            return Err(AuxPowError::WrongHeaderChainId);
        }
        match (self.is_auxpow(), self.auxpow.as_deref()) {
            (true, Some(auxpow)) => {
                auxpow.check(self.block_hash(), params.chain_id, params)?;
                Ok(())
            }
            (true, None) => Err(AuxPowError::MissingAuxPow),
            (false, Some(_)) => Err(AuxPowError::UnexpectedAuxPow),
            (false, None) => Ok(()),
        }
    }
}

impl Encodable for AuxBlockHeader {
    fn consensus_encode<W: bitcoin::io::Write + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<usize, bitcoin::io::Error> {
        let mut len = self.header.consensus_encode(writer)?;
        if self.is_auxpow() {
            let auxpow = self
                .auxpow
                .as_ref()
                .expect("a header with the auxpow bit must carry an auxpow");
            len += auxpow.consensus_encode(writer)?;
        }
        Ok(len)
    }
}

impl Decodable for AuxBlockHeader {
    fn consensus_decode<R: bitcoin::io::Read + ?Sized>(
        reader: &mut R,
    ) -> Result<Self, consensus::encode::Error> {
        let header = BlockHeader::consensus_decode(reader)?;
        let auxpow = if header.version.to_consensus() & VERSION_AUXPOW_FLAG != 0 {
            Some(Box::new(AuxPow::consensus_decode(reader)?))
        } else {
            None
        };
        Ok(AuxBlockHeader { header, auxpow })
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::consensus::deserialize;
    use bitcoin::consensus::serialize;
    use bitcoin::hashes::Hash;
    use bitcoin::CompactTarget;
    use bitcoin::TxMerkleNode;

    use super::super::auxpow::AUXPOW_STAKE_FLAG;
    use super::*;

    fn base_header(version: i32) -> AuxBlockHeader {
        AuxBlockHeader::new(BlockHeader {
            version: BlockVersion::from_consensus(version),
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: TxMerkleNode::all_zeros(),
            time: 1716000000,
            bits: CompactTarget::from_consensus(0x1d00ffff),
            nonce: 0,
        })
    }

    #[test]
    fn version_packing() {
        let mut header = base_header(2);
        header.set_chain_id(0x0001);
        assert_eq!(header.base_version(), 2);
        assert_eq!(header.chain_id(), 0x0001);
        assert!(!header.is_auxpow());

        header.set_auxpow_flag(true);
        assert!(header.is_auxpow());
        assert_eq!(header.base_version(), 2);
        assert_eq!(header.chain_id(), 0x0001);

        header.set_auxpow_flag(false);
        assert!(!header.is_auxpow());
        assert_eq!(header.version(), 2 | (0x0001 << 16));
    }

    #[test]
    fn roundtrip_without_auxpow() {
        let header = base_header(2);
        let decoded: AuxBlockHeader = deserialize(&serialize(&header)).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.auxpow.is_none());
    }

    #[test]
    fn roundtrip_with_auxpow() {
        let mut header = base_header(2);
        header.set_chain_id(0x0001);
        AuxPow::init(&mut header, AUXPOW_STAKE_FLAG);

        let decoded: AuxBlockHeader = deserialize(&serialize(&header)).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.block_hash(), header.block_hash());
        assert!(decoded.auxpow.is_some());
    }
}

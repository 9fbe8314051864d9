//! The merged-mining evidence object and its two consensus operations:
//! [AuxPow::check], which decides whether a parent-chain block really
//! committed to a given auxiliary block, and [AuxPow::init], which
//! synthesizes the minimal evidence that passes the check.
//!
//! The commitment lives in the parent coinbase's input script as
//! `[marker][root][size][nonce]`: the 4-byte merged-mining marker (optional
//! for legacy coinbases), the big-endian chain merkle root, and two
//! little-endian u32 fields binding the tree size and the slot nonce. The
//! script is scanned as raw bytes; no opcode parsing is involved.

use bitcoin::absolute::LockTime;
use bitcoin::block::Header as BlockHeader;
use bitcoin::block::Version as BlockVersion;
use bitcoin::consensus;
use bitcoin::consensus::Decodable;
use bitcoin::consensus::Encodable;
use bitcoin::hashes::sha256d;
use bitcoin::hashes::Hash;
use bitcoin::script::Builder;
use bitcoin::script::PushBytesBuf;
use bitcoin::transaction::Version as TxVersion;
use bitcoin::BlockHash;
use bitcoin::CompactTarget;
use bitcoin::OutPoint;
use bitcoin::Script;
use bitcoin::Sequence;
use bitcoin::Transaction;
use bitcoin::TxIn;
use bitcoin::TxMerkleNode;
use bitcoin::VarInt;
use bitcoin::Witness;

use super::chainparams::ChainParams;
use super::error::AuxPowValidationErrors;
use super::header::AuxBlockHeader;
use super::merkle;
use super::parent::EquihashHeader;
use super::parent::ParentHeader;
use super::stake::StakeTransaction;
use crate::prelude::*;

/// Marker preceding the chain merkle root in modern parent coinbases.
pub const MERGED_MINING_HEADER: [u8; 4] = [0xfa, 0xbe, b'm', b'm'];

/// Longest accepted chain merkle branch, bounding the tree at 2^30 chains.
pub const MAX_CHAIN_MERKLE_BRANCH: usize = 30;

/// Personalization string for Zhash parent blocks.
pub const ZHASH_PERSONALIZATION: &str = "ZcashPoW";
const _: () = assert!(ZHASH_PERSONALIZATION.len() == 8);

/// Parent block uses an Equihash-family header.
pub const AUXPOW_EQUIHASH_FLAG: u32 = 0x0001;
/// Equihash with the 8-byte Zhash personalization.
pub const AUXPOW_ZHASH_FLAG: u32 = 0x0002;
/// Parent coinbase uses the proof-of-stake transaction layout.
pub const AUXPOW_STAKE_FLAG: u32 = 0x0004;

// Decode-time allocation guard; the consensus cap is enforced in check
const MAX_DECODED_BRANCH: u64 = 1 << 16;

/// A parent-chain transaction together with the merkle branch proving its
/// inclusion in the parent block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoinbaseMerkleTx<T> {
    pub tx: T,
    /// Hash of the parent block carrying `tx`.
    pub block_hash: BlockHash,
    /// Sibling path from `tx` up to the parent's transaction merkle root.
    pub merkle_branch: Vec<sha256d::Hash>,
    /// Position of `tx` in the parent block; a coinbase is always leaf 0.
    pub index: i32,
}

impl<T> CoinbaseMerkleTx<T> {
    /// Wraps `tx` with an empty proof, as for a single-transaction block.
    pub fn new(tx: T) -> Self {
        CoinbaseMerkleTx {
            tx,
            block_hash: BlockHash::all_zeros(),
            merkle_branch: Vec::new(),
            index: 0,
        }
    }

    /// Fills in the inclusion proof for `tx` sitting at `pos` in the parent
    /// block with the given ordered transaction hashes.
    pub fn init_merkle_branch(
        &mut self,
        block_hash: BlockHash,
        tx_hashes: &[sha256d::Hash],
        pos: u32,
    ) {
        self.block_hash = block_hash;
        self.index = pos as i32;
        self.merkle_branch = merkle::merkle_branch(tx_hashes, pos);
    }
}

impl<T: Encodable> Encodable for CoinbaseMerkleTx<T> {
    fn consensus_encode<W: bitcoin::io::Write + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<usize, bitcoin::io::Error> {
        let mut len = 0;
        len += self.tx.consensus_encode(writer)?;
        len += self.block_hash.consensus_encode(writer)?;
        len += encode_branch(&self.merkle_branch, writer)?;
        len += self.index.consensus_encode(writer)?;
        Ok(len)
    }
}

impl<T: Decodable> Decodable for CoinbaseMerkleTx<T> {
    fn consensus_decode<R: bitcoin::io::Read + ?Sized>(
        reader: &mut R,
    ) -> Result<Self, consensus::encode::Error> {
        Ok(CoinbaseMerkleTx {
            tx: T::consensus_decode(reader)?,
            block_hash: BlockHash::consensus_decode(reader)?,
            merkle_branch: decode_branch(reader)?,
            index: i32::consensus_decode(reader)?,
        })
    }
}

/// The parent coinbase evidence in either transaction layout. Which layout an
/// [AuxPow] carries is decided by its stake flag at decode time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Coinbase {
    Standard(CoinbaseMerkleTx<Transaction>),
    Stake(CoinbaseMerkleTx<StakeTransaction>),
}

impl Coinbase {
    pub fn index(&self) -> i32 {
        match self {
            Coinbase::Standard(coinbase) => coinbase.index,
            Coinbase::Stake(coinbase) => coinbase.index,
        }
    }

    pub fn merkle_branch(&self) -> &[sha256d::Hash] {
        match self {
            Coinbase::Standard(coinbase) => &coinbase.merkle_branch,
            Coinbase::Stake(coinbase) => &coinbase.merkle_branch,
        }
    }

    pub fn tx_hash(&self) -> sha256d::Hash {
        match self {
            Coinbase::Standard(coinbase) => coinbase.tx.compute_txid().to_raw_hash(),
            Coinbase::Stake(coinbase) => coinbase.tx.compute_txid().to_raw_hash(),
        }
    }

    /// Script of the coinbase's first input, if it has one.
    pub fn input_script(&self) -> Option<&Script> {
        match self {
            Coinbase::Standard(coinbase) => coinbase
                .tx
                .input
                .first()
                .map(|input| input.script_sig.as_script()),
            Coinbase::Stake(coinbase) => coinbase
                .tx
                .input
                .first()
                .map(|input| input.script_sig.as_script()),
        }
    }
}

impl Encodable for Coinbase {
    fn consensus_encode<W: bitcoin::io::Write + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<usize, bitcoin::io::Error> {
        match self {
            Coinbase::Standard(coinbase) => coinbase.consensus_encode(writer),
            Coinbase::Stake(coinbase) => coinbase.consensus_encode(writer),
        }
    }
}

/// The full bundle of evidence that work on a parent chain committed to an
/// auxiliary block: the parent coinbase with its inclusion proof, the branch
/// placing our chain in the chain merkle tree, and the parent block header.
///
/// An AuxPow is built by [AuxPow::init] or decoded as part of an
/// [AuxBlockHeader]; after that it is immutable and [AuxPow::check] is the
/// only consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuxPow {
    /// Flag bitfield selecting the parent and coinbase layouts.
    pub version: u32,
    pub coinbase: Coinbase,
    /// Sibling path placing this chain's slot in the chain merkle tree.
    pub chain_merkle_branch: Vec<sha256d::Hash>,
    /// Leaf position of this chain in the chain merkle tree.
    pub chain_index: i32,
    pub parent: ParentHeader,
    /// Zhash personalization; exactly 8 bytes when the Zhash flag is set,
    /// empty otherwise.
    pub zhash_config: String,
}

impl AuxPow {
    pub fn is_equihash(&self) -> bool {
        self.version & AUXPOW_EQUIHASH_FLAG != 0
    }

    pub fn is_zhash(&self) -> bool {
        self.version & AUXPOW_ZHASH_FLAG != 0
    }

    pub fn is_stake(&self) -> bool {
        self.version & AUXPOW_STAKE_FLAG != 0
    }

    /// Pseudo-random slot for a chain in a merkle tree of height `h`, fixed
    /// for a given size/nonce/chain combination. This keeps the same work
    /// from being submitted twice for one chain while spreading chains over
    /// the tree.
    ///
    /// The arithmetic wraps at 32 bits and the result feeds consensus, so
    /// the overflow behavior is part of the protocol. `h` never exceeds 30
    /// (the chain merkle branch cap), so the modulus fits a u32.
    pub fn expected_index(nonce: u32, chain_id: i32, h: u32) -> i32 {
        let mut rand = nonce;
        rand = rand.wrapping_mul(1103515245).wrapping_add(12345);
        rand = rand.wrapping_add(chain_id as u32);
        rand = rand.wrapping_mul(1103515245).wrapping_add(12345);

        (rand % (1u32 << h)) as i32
    }

    /// Verifies that this bundle proves parent-chain work for the block with
    /// hash `aux_block_hash` on the chain with id `chain_id`. Every failure
    /// is a consensus rejection; the error variant only carries the reason.
    pub fn check(
        &self,
        aux_block_hash: BlockHash,
        chain_id: i32,
        params: &ChainParams,
    ) -> Result<(), AuxPowValidationErrors> {
        if self.coinbase.index() != 0 {
            return Err(AuxPowValidationErrors::NotGenerate);
        }

        if params.strict_chain_id && self.parent.chain_id() == chain_id {
            return Err(AuxPowValidationErrors::OwnChainId);
        }

        if self.chain_merkle_branch.len() > MAX_CHAIN_MERKLE_BRANCH {
            return Err(AuxPowValidationErrors::ChainMerkleBranchTooLong);
        }

        if self.is_zhash() {
            if !self.is_equihash() {
                return Err(AuxPowValidationErrors::ZhashWithoutEquihash);
            }
            if self.zhash_config.len() != 8 {
                return Err(AuxPowValidationErrors::BadZhashPersonalizationSize);
            }
        }

        // Root of the chain merkle tree; the script commits to it in
        // reversed byte order
        let root = merkle::check_merkle_branch(
            aux_block_hash.to_raw_hash(),
            &self.chain_merkle_branch,
            self.chain_index,
        );
        let mut committed_root = root.to_byte_array();
        committed_root.reverse();

        // The coinbase has to be in the parent block's transaction tree
        let coinbase_root = merkle::check_merkle_branch(
            self.coinbase.tx_hash(),
            self.coinbase.merkle_branch(),
            self.coinbase.index(),
        );
        if coinbase_root != self.parent.merkle_root().to_raw_hash() {
            return Err(AuxPowValidationErrors::BadCoinbaseMerkleRoot);
        }

        let script = self
            .coinbase
            .input_script()
            .ok_or(AuxPowValidationErrors::MissingCoinbaseInput)?
            .as_bytes();

        // The same work must not be usable twice for our chain, so the
        // commitment's position has to be unambiguous
        let head = find_subslice(script, &MERGED_MINING_HEADER, 0);
        let root_at = match find_subslice(script, &committed_root, 0) {
            Some(pos) => pos,
            None => return Err(AuxPowValidationErrors::ChainMerkleRootNotFound),
        };

        match head {
            Some(head_at) => {
                if find_subslice(script, &MERGED_MINING_HEADER, head_at + 1).is_some() {
                    return Err(AuxPowValidationErrors::MultipleMergedMiningHeaders);
                }
                if head_at + MERGED_MINING_HEADER.len() != root_at {
                    return Err(AuxPowValidationErrors::HeaderNotBeforeRoot);
                }
            }
            None => {
                // Backward compatibility: markerless coinbases must commit
                // early; 8-12 bytes are enough for extraNonce and nBits
                if root_at > 20 {
                    return Err(AuxPowValidationErrors::ChainMerkleRootTooLate);
                }
            }
        }

        // The size and nonce trail the committed root and pin our slot
        let trailer = &script[root_at + committed_root.len()..];
        if trailer.len() < 8 {
            return Err(AuxPowValidationErrors::MissingSizeAndNonce);
        }

        let merkle_height = self.chain_merkle_branch.len() as u32;
        let size = u32::from_le_bytes(trailer[..4].try_into().expect("4 bytes"));
        if size != 1 << merkle_height {
            return Err(AuxPowValidationErrors::TreeSizeMismatch);
        }

        let nonce = u32::from_le_bytes(trailer[4..8].try_into().expect("4 bytes"));
        if self.chain_index != Self::expected_index(nonce, chain_id, merkle_height) {
            return Err(AuxPowValidationErrors::WrongChainIndex);
        }

        Ok(())
    }

    /// Attaches a minimal AuxPow to `header`: a fake single-transaction
    /// parent block whose coinbase commits to nothing but `header` itself
    /// (tree size 1, nonce 0). The flags in `aux_version` select the parent
    /// and coinbase layouts; the resulting evidence passes [AuxPow::check]
    /// for any chain id the parent's (zero) id does not clash with.
    pub fn init(header: &mut AuxBlockHeader, aux_version: u32) {
        // The committed hash must already carry the auxpow bit
        header.set_auxpow_flag(true);
        let block_hash = header.block_hash();

        // reverse(hash) || size=1 || nonce=0, as a single pushed element
        let mut input_data = block_hash.to_byte_array().to_vec();
        input_data.reverse();
        input_data.push(1);
        input_data.extend_from_slice(&[0u8; 7]);

        let script_sig = Builder::new()
            .push_slice(PushBytesBuf::try_from(input_data).expect("a 40-byte push always fits"))
            .into_script();

        let input = TxIn {
            previous_output: OutPoint::null(),
            script_sig,
            sequence: Sequence::MAX,
            witness: Witness::new(),
        };

        let (coinbase, coinbase_hash) = if aux_version & AUXPOW_STAKE_FLAG != 0 {
            let tx = StakeTransaction {
                version: 1,
                time: 0,
                input: vec![input],
                output: Vec::new(),
                lock_time: LockTime::ZERO,
            };
            let hash = tx.compute_txid().to_raw_hash();
            (Coinbase::Stake(CoinbaseMerkleTx::new(tx)), hash)
        } else {
            let tx = Transaction {
                version: TxVersion::ONE,
                lock_time: LockTime::ZERO,
                input: vec![input],
                output: Vec::new(),
            };
            let hash = tx.compute_txid().to_raw_hash();
            (Coinbase::Standard(CoinbaseMerkleTx::new(tx)), hash)
        };

        let merkle_root = TxMerkleNode::from_raw_hash(merkle::block_merkle_root(&[coinbase_hash]));

        let parent = if aux_version & (AUXPOW_EQUIHASH_FLAG | AUXPOW_ZHASH_FLAG) != 0 {
            // Only the version and merkle root survive into the stored
            // header; everything else stays zeroed
            ParentHeader::Equihash(EquihashHeader {
                version: 1,
                merkle_root,
                ..Default::default()
            })
        } else {
            ParentHeader::Default(BlockHeader {
                version: BlockVersion::from_consensus(1),
                prev_blockhash: BlockHash::all_zeros(),
                merkle_root,
                time: 0,
                bits: CompactTarget::from_consensus(0),
                nonce: 0,
            })
        };

        let zhash_config = if aux_version & AUXPOW_ZHASH_FLAG != 0 {
            ZHASH_PERSONALIZATION.to_string()
        } else {
            String::new()
        };

        header.auxpow = Some(Box::new(AuxPow {
            version: aux_version,
            coinbase,
            chain_merkle_branch: Vec::new(),
            chain_index: 0,
            parent,
            zhash_config,
        }));
    }
}

impl Encodable for AuxPow {
    fn consensus_encode<W: bitcoin::io::Write + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<usize, bitcoin::io::Error> {
        let mut len = 0;
        len += self.version.consensus_encode(writer)?;
        len += self.coinbase.consensus_encode(writer)?;
        len += encode_branch(&self.chain_merkle_branch, writer)?;
        len += self.chain_index.consensus_encode(writer)?;
        len += self.parent.consensus_encode(writer)?;
        if self.is_zhash() {
            len += VarInt(self.zhash_config.len() as u64).consensus_encode(writer)?;
            writer.write_all(self.zhash_config.as_bytes())?;
            len += self.zhash_config.len();
        }
        Ok(len)
    }
}

impl Decodable for AuxPow {
    fn consensus_decode<R: bitcoin::io::Read + ?Sized>(
        reader: &mut R,
    ) -> Result<Self, consensus::encode::Error> {
        let version = u32::consensus_decode(reader)?;
        let coinbase = if version & AUXPOW_STAKE_FLAG != 0 {
            Coinbase::Stake(CoinbaseMerkleTx::consensus_decode(reader)?)
        } else {
            Coinbase::Standard(CoinbaseMerkleTx::consensus_decode(reader)?)
        };
        let chain_merkle_branch = decode_branch(reader)?;
        let chain_index = i32::consensus_decode(reader)?;
        let parent = if version & AUXPOW_EQUIHASH_FLAG != 0 {
            ParentHeader::Equihash(EquihashHeader::consensus_decode(reader)?)
        } else {
            ParentHeader::Default(BlockHeader::consensus_decode(reader)?)
        };
        let zhash_config = if version & AUXPOW_ZHASH_FLAG != 0 {
            let bytes = Vec::<u8>::consensus_decode(reader)?;
            String::from_utf8(bytes).map_err(|_| {
                consensus::encode::Error::ParseFailed("zhash personalization is not valid utf-8")
            })?
        } else {
            String::new()
        };
        Ok(AuxPow {
            version,
            coinbase,
            chain_merkle_branch,
            chain_index,
            parent,
            zhash_config,
        })
    }
}

/// First occurrence of `needle` in `haystack` at or after `start`.
fn find_subslice(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if start >= haystack.len() {
        return None;
    }
    haystack[start..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + start)
}

fn encode_branch<W: bitcoin::io::Write + ?Sized>(
    branch: &[sha256d::Hash],
    writer: &mut W,
) -> Result<usize, bitcoin::io::Error> {
    let mut len = VarInt(branch.len() as u64).consensus_encode(writer)?;
    for hash in branch {
        len += hash.consensus_encode(writer)?;
    }
    Ok(len)
}

fn decode_branch<R: bitcoin::io::Read + ?Sized>(
    reader: &mut R,
) -> Result<Vec<sha256d::Hash>, consensus::encode::Error> {
    let len = VarInt::consensus_decode(reader)?.0;
    if len > MAX_DECODED_BRANCH {
        return Err(consensus::encode::Error::ParseFailed(
            "merkle branch is unreasonably long",
        ));
    }
    let mut branch = Vec::with_capacity(len as usize);
    for _ in 0..len {
        branch.push(sha256d::Hash::consensus_decode(reader)?);
    }
    Ok(branch)
}

#[cfg(test)]
mod tests {
    use bitcoin::consensus::deserialize;
    use bitcoin::consensus::serialize;

    use super::*;

    fn fresh_header() -> AuxBlockHeader {
        let mut header = AuxBlockHeader::new(BlockHeader {
            version: BlockVersion::from_consensus(2),
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: TxMerkleNode::all_zeros(),
            time: 1716000000,
            bits: CompactTarget::from_consensus(0x1d00ffff),
            nonce: 0,
        });
        header.set_chain_id(0x0001);
        header
    }

    #[test]
    fn expected_index_wraps_at_32_bits() {
        // The first multiplication overflows; the reference value assumes
        // mod 2^32 arithmetic throughout
        assert_eq!(AuxPow::expected_index(0xFFFFFFFF, 1, 4), 2);
    }

    #[test]
    fn expected_index_is_pure_and_bounded() {
        for h in 0..=10 {
            for nonce in [0u32, 1, 42, 0xDEADBEEF, u32::MAX] {
                let slot = AuxPow::expected_index(nonce, 1, h);
                assert_eq!(slot, AuxPow::expected_index(nonce, 1, h));
                assert!((0..1 << h).contains(&slot));
            }
        }
    }

    #[test]
    fn flags_are_orthogonal() {
        let mut header = fresh_header();
        AuxPow::init(
            &mut header,
            AUXPOW_EQUIHASH_FLAG | AUXPOW_ZHASH_FLAG | AUXPOW_STAKE_FLAG,
        );
        let auxpow = header.auxpow.unwrap();
        assert!(auxpow.is_equihash());
        assert!(auxpow.is_zhash());
        assert!(auxpow.is_stake());
        assert!(matches!(auxpow.parent, ParentHeader::Equihash(_)));
        assert!(matches!(auxpow.coinbase, Coinbase::Stake(_)));
        assert_eq!(auxpow.zhash_config, ZHASH_PERSONALIZATION);
    }

    #[test]
    fn builder_produces_a_trivial_commitment() {
        let mut header = fresh_header();
        AuxPow::init(&mut header, 0);
        let auxpow = header.auxpow.as_ref().unwrap();

        assert!(auxpow.chain_merkle_branch.is_empty());
        assert_eq!(auxpow.chain_index, 0);
        assert_eq!(auxpow.coinbase.index(), 0);
        assert!(auxpow.coinbase.merkle_branch().is_empty());
        assert!(auxpow.zhash_config.is_empty());

        // Single-tx parent block: the merkle root is the coinbase hash
        assert_eq!(
            auxpow.parent.merkle_root().to_raw_hash(),
            auxpow.coinbase.tx_hash()
        );

        // Script layout: one push of reverse(hash) || 01 || 00*7
        let script = auxpow.coinbase.input_script().unwrap().as_bytes();
        assert_eq!(script.len(), 41);
        assert_eq!(script[0], 40);
        let mut expected = header.block_hash().to_byte_array();
        expected.reverse();
        assert_eq!(&script[1..33], &expected[..]);
        assert_eq!(&script[33..], &[1u8, 0, 0, 0, 0, 0, 0, 0][..]);
    }

    #[test]
    fn serialization_roundtrip_for_every_layout() {
        for aux_version in [
            0,
            AUXPOW_EQUIHASH_FLAG,
            AUXPOW_EQUIHASH_FLAG | AUXPOW_ZHASH_FLAG,
            AUXPOW_STAKE_FLAG,
            AUXPOW_EQUIHASH_FLAG | AUXPOW_STAKE_FLAG,
            AUXPOW_EQUIHASH_FLAG | AUXPOW_ZHASH_FLAG | AUXPOW_STAKE_FLAG,
        ] {
            let mut header = fresh_header();
            AuxPow::init(&mut header, aux_version);
            let auxpow = header.auxpow.unwrap();
            let decoded: AuxPow = deserialize(&serialize(&*auxpow)).unwrap();
            assert_eq!(decoded, *auxpow, "layout {:#x} did not roundtrip", aux_version);
        }
    }

    #[test]
    fn oversized_branch_fails_to_decode() {
        let mut bytes = Vec::new();
        VarInt(MAX_DECODED_BRANCH + 1)
            .consensus_encode(&mut bytes)
            .unwrap();
        assert!(decode_branch(&mut bytes.as_slice()).is_err());
    }
}

//! The proof-of-stake transaction layout used by staked parent blocks. It is
//! the standard transaction with a 4-byte timestamp serialized between the
//! version and the inputs, so it needs its own codec and txid computation.

use bitcoin::absolute::LockTime;
use bitcoin::consensus;
use bitcoin::consensus::Decodable;
use bitcoin::consensus::Encodable;
use bitcoin::hashes::Hash;
use bitcoin::TxIn;
use bitcoin::TxOut;
use bitcoin::Txid;

use crate::prelude::*;

/// A parent-chain transaction in the proof-of-stake layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakeTransaction {
    pub version: i32,
    /// Timestamp the staking kernel signs over.
    pub time: u32,
    pub input: Vec<TxIn>,
    pub output: Vec<TxOut>,
    pub lock_time: LockTime,
}

impl StakeTransaction {
    /// Hash of the consensus serialization, used as this transaction's id.
    /// Unlike segwit txids there is nothing to strip; the layout has no
    /// witness data.
    pub fn compute_txid(&self) -> Txid {
        let mut engine = Txid::engine();
        self.consensus_encode(&mut engine)
            .expect("engines don't error");
        Txid::from_engine(engine)
    }
}

impl Encodable for StakeTransaction {
    fn consensus_encode<W: bitcoin::io::Write + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<usize, bitcoin::io::Error> {
        let mut len = 0;
        len += self.version.consensus_encode(writer)?;
        len += self.time.consensus_encode(writer)?;
        len += self.input.consensus_encode(writer)?;
        len += self.output.consensus_encode(writer)?;
        len += self.lock_time.consensus_encode(writer)?;
        Ok(len)
    }
}

impl Decodable for StakeTransaction {
    fn consensus_decode<R: bitcoin::io::Read + ?Sized>(
        reader: &mut R,
    ) -> Result<Self, consensus::encode::Error> {
        Ok(StakeTransaction {
            version: i32::consensus_decode(reader)?,
            time: u32::consensus_decode(reader)?,
            input: Vec::<TxIn>::consensus_decode(reader)?,
            output: Vec::<TxOut>::consensus_decode(reader)?,
            lock_time: LockTime::consensus_decode(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::consensus::deserialize;
    use bitcoin::consensus::serialize;
    use bitcoin::OutPoint;
    use bitcoin::ScriptBuf;
    use bitcoin::Sequence;
    use bitcoin::Witness;

    use super::*;

    fn coinbase_like(time: u32) -> StakeTransaction {
        StakeTransaction {
            version: 1,
            time,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::from_bytes(vec![0x01, 0x02, 0x03]),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: Vec::new(),
            lock_time: LockTime::ZERO,
        }
    }

    #[test]
    fn txid_commits_to_the_timestamp() {
        assert_ne!(
            coinbase_like(0).compute_txid(),
            coinbase_like(1).compute_txid()
        );
    }

    #[test]
    fn serialization_roundtrip() {
        let tx = coinbase_like(1716000000);
        let decoded: StakeTransaction = deserialize(&serialize(&tx)).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.compute_txid(), tx.compute_txid());
    }
}

use auxpow_common::impl_error_from;

use crate::prelude::*;

/// Errors from validating a header that takes part in merged mining.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuxPowError {
    Validation(AuxPowValidationErrors),
    MissingAuxPow,
    UnexpectedAuxPow,
    WrongHeaderChainId,
}

/// Reasons an [AuxPow] commitment proof is rejected. They are all equivalent
/// externally (the proof is invalid and the block is not accepted); the
/// variants only carry the diagnostic.
///
/// [AuxPow]: crate::AuxPow
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuxPowValidationErrors {
    NotGenerate,
    OwnChainId,
    ChainMerkleBranchTooLong,
    ZhashWithoutEquihash,
    BadZhashPersonalizationSize,
    MissingCoinbaseInput,
    BadCoinbaseMerkleRoot,
    ChainMerkleRootNotFound,
    MultipleMergedMiningHeaders,
    HeaderNotBeforeRoot,
    ChainMerkleRootTooLate,
    MissingSizeAndNonce,
    TreeSizeMismatch,
    WrongChainIndex,
}

impl Display for AuxPowValidationErrors {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AuxPowValidationErrors::NotGenerate => {
                write!(f, "AuxPow is not a generate")
            }
            AuxPowValidationErrors::OwnChainId => {
                write!(f, "Aux POW parent has our chain ID")
            }
            AuxPowValidationErrors::ChainMerkleBranchTooLong => {
                write!(f, "Aux POW chain merkle branch too long")
            }
            AuxPowValidationErrors::ZhashWithoutEquihash => {
                write!(f, "Aux POW has the Zhash flag without the Equihash flag")
            }
            AuxPowValidationErrors::BadZhashPersonalizationSize => {
                write!(f, "Aux POW Zhash personalization string has the wrong size")
            }
            AuxPowValidationErrors::MissingCoinbaseInput => {
                write!(f, "Aux POW parent coinbase has no input")
            }
            AuxPowValidationErrors::BadCoinbaseMerkleRoot => {
                write!(f, "Aux POW merkle root incorrect")
            }
            AuxPowValidationErrors::ChainMerkleRootNotFound => {
                write!(f, "Aux POW missing chain merkle root in parent coinbase")
            }
            AuxPowValidationErrors::MultipleMergedMiningHeaders => {
                write!(f, "Multiple merged mining headers in coinbase")
            }
            AuxPowValidationErrors::HeaderNotBeforeRoot => {
                write!(f, "Merged mining header is not just before chain merkle root")
            }
            AuxPowValidationErrors::ChainMerkleRootTooLate => {
                write!(
                    f,
                    "Aux POW chain merkle root must start in the first 20 bytes of the parent coinbase"
                )
            }
            AuxPowValidationErrors::MissingSizeAndNonce => {
                write!(
                    f,
                    "Aux POW missing chain merkle tree size and nonce in parent coinbase"
                )
            }
            AuxPowValidationErrors::TreeSizeMismatch => {
                write!(f, "Aux POW merkle branch size does not match parent coinbase")
            }
            AuxPowValidationErrors::WrongChainIndex => {
                write!(f, "Aux POW wrong index")
            }
        }
    }
}

impl_error_from!(AuxPowError, AuxPowValidationErrors, Validation);

impl Display for AuxPowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AuxPowError::Validation(e) => write!(f, "{}", e),
            AuxPowError::MissingAuxPow => {
                write!(f, "Block version signals merged mining but carries no AuxPow")
            }
            AuxPowError::UnexpectedAuxPow => {
                write!(f, "Block carries an AuxPow without signaling it in the version")
            }
            AuxPowError::WrongHeaderChainId => {
                write!(f, "Block version does not have our chain ID")
            }
        }
    }
}

impl std::error::Error for AuxPowValidationErrors {}
impl std::error::Error for AuxPowError {}

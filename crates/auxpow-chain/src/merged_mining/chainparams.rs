//! Network-specific parameters for merged mining. The interesting knob is
//! `strict_chain_id`: production networks refuse parent blocks that declare
//! our own chain id, so a chain cannot merge-mine itself, while regtest
//! keeps the check off so tests can exercise both sides of it.

/// The networks this chain runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

#[derive(Clone, Debug)]
/// Chain-specific constants consumed by the merged-mining validation.
pub struct ChainParams {
    /// The network these parameters are for.
    pub network: Network,

    /// Our chain id. Parent coinbases commit to a slot derived from it, and
    /// under `strict_chain_id` a parent block declaring the same id is
    /// rejected.
    pub chain_id: i32,

    /// Whether to reject parent blocks carrying our own chain id.
    pub strict_chain_id: bool,
}

impl From<Network> for ChainParams {
    fn from(network: Network) -> Self {
        match network {
            Network::Mainnet => ChainParams {
                network,
                chain_id: 0x0001,
                strict_chain_id: true,
            },
            Network::Testnet => ChainParams {
                network,
                chain_id: 0x0001,
                strict_chain_id: true,
            },
            Network::Regtest => ChainParams {
                network,
                chain_id: 0x0001,
                strict_chain_id: false,
            },
        }
    }
}

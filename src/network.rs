use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Collection of fields corresponding to a particular network/chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// The name of the network (i.e. `"testnet"`, `"mainnet"`, etc.).
    pub name: Cow<'static, str>,
    /// The hex encoded hash of the genesis block.
    pub genesis_hash: Cow<'static, str>,
    /// URL of a JSON-RPC proxy instance connected to this network.
    pub json_rpc_url: Cow<'static, str>,
    /// gRPC-web endpoint of a node connected to this network, if any.
    #[serde(default)]
    pub grpc_opts: Option<GrpcOptions>,
    /// Base URL of a CCDScan instance for this network. Mostly used
    /// to construct links to the frontend.
    pub ccd_scan_base_url: Cow<'static, str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrpcOptions {
    pub base_url: Cow<'static, str>,
}

pub const TESTNET: Network = Network {
    name: Cow::Borrowed("testnet"),
    genesis_hash: Cow::Borrowed("4221332d34e1694168c2a0c0b3fd0f273809612cb13d000d5c2e00e85f50f796"),
    json_rpc_url: Cow::Borrowed("https://json-rpc.testnet.concordium.com"),
    grpc_opts: Some(GrpcOptions {
        base_url: Cow::Borrowed("https://grpc.testnet.concordium.com:20000"),
    }),
    ccd_scan_base_url: Cow::Borrowed("https://testnet.ccdscan.io"),
};

pub const MAINNET: Network = Network {
    name: Cow::Borrowed("mainnet"),
    genesis_hash: Cow::Borrowed("9dd9ca4d19e9393877d2c44b70f89acbfc0883c2243e5eeaecc0d1cd0503f478"),
    json_rpc_url: Cow::Borrowed("https://json-rpc.mainnet.concordium.software"),
    grpc_opts: Some(GrpcOptions {
        base_url: Cow::Borrowed("https://grpc.mainnet.concordium.software:20000"),
    }),
    ccd_scan_base_url: Cow::Borrowed("https://ccdscan.io"),
};

/// Namespace identifying Concordium chains in WalletConnect.
pub const WALLET_CONNECT_SESSION_NAMESPACE: &str = "ccd";

impl Network {
    /// The WalletConnect chain identifier, i.e. `ccd:<name>`.
    pub fn chain_id(&self) -> String {
        format!("{WALLET_CONNECT_SESSION_NAMESPACE}:{}", self.name)
    }

    /// Link to the given transaction on CCDScan.
    pub fn transaction_url(&self, hash: &str) -> String {
        format!(
            "{}/?dcount=1&dentity=transaction&dhash={hash}",
            self.ccd_scan_base_url.trim_end_matches('/')
        )
    }
}

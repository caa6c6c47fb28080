use {
  super::*,
  bitcoincore_rpc::json::{GetBlockchainInfoResult, ScanTxOutRequest},
};

/// Height and hash of the chain tip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockStamp {
  pub height: u32,
  pub hash: BlockHash,
}

impl TryFrom<GetBlockchainInfoResult> for BlockStamp {
  type Error = Error;

  fn try_from(info: GetBlockchainInfoResult) -> Result<Self> {
    Ok(Self {
      height: info
        .blocks
        .try_into()
        .context("chain height does not fit in u32")?,
      hash: info.best_block_hash,
    })
  }
}

pub trait ChainClient: Send + Sync {
  fn block_stamp(&self) -> Result<BlockStamp>;

  fn send_raw_transaction(&self, transaction: &Transaction) -> Result<Txid>;

  fn is_connected(&self) -> bool;

  /// Unspent outputs currently paying to any of `addresses`.
  fn scan_unspent(&self, addresses: &[Address]) -> Result<Vec<Credit>>;
}

impl ChainClient for Client {
  fn block_stamp(&self) -> Result<BlockStamp> {
    self.get_blockchain_info()?.try_into()
  }

  fn send_raw_transaction(&self, transaction: &Transaction) -> Result<Txid> {
    Ok(RpcApi::send_raw_transaction(self, transaction)?)
  }

  fn is_connected(&self) -> bool {
    self.get_block_count().is_ok()
  }

  fn scan_unspent(&self, addresses: &[Address]) -> Result<Vec<Credit>> {
    if addresses.is_empty() {
      return Ok(Vec::new());
    }

    let descriptors = addresses
      .iter()
      .map(|address| ScanTxOutRequest::Single(format!("addr({address})")))
      .collect::<Vec<ScanTxOutRequest>>();

    let result = self.scan_tx_out_set_blocking(&descriptors)?;

    result
      .unspents
      .into_iter()
      .map(|utxo| {
        Ok(Credit {
          outpoint: OutPoint::new(utxo.txid, utxo.vout),
          tx_out: TxOut {
            value: utxo.amount,
            script_pubkey: utxo.script_pub_key,
          },
          height: Some(
            utxo
              .height
              .try_into()
              .context("output height does not fit in u32")?,
          ),
        })
      })
      .collect()
  }
}
